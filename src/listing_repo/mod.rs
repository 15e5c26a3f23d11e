mod listing_types;
mod normalize;
mod sources;

use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, info};

use super::cli_utils;

pub use self::listing_types::{Layout, Property, PropertyId, RawRow, RawTable};
pub use self::normalize::{parse_rent, ColumnMap, LoadReport, SchemaError};
pub use self::sources::{
    open_source, ListingSource, RepositoryError, SourceConfig, SourceFormat, SourceKey,
};

/// One successful load: the normalized listings and what was dropped on the way.
#[derive(Debug, Default)]
pub struct Listings {
    pub properties: Vec<Property>,
    pub report: LoadReport,
}

/// Normalizes source tables into listings, memoized by source identity.
pub struct ListingRepository {
    columns: ColumnMap,
    cache: HashMap<SourceKey, Rc<Listings>>,
    quiet: bool,
}

impl ListingRepository {
    pub fn new(columns: ColumnMap) -> ListingRepository {
        ListingRepository {
            columns,
            cache: HashMap::new(),
            quiet: false,
        }
    }

    /// Hides progress output. Used by tests and the line-oriented session.
    pub fn quiet(mut self, quiet: bool) -> ListingRepository {
        self.quiet = quiet;
        self
    }

    pub fn load(&mut self, source: &dyn ListingSource) -> Result<Rc<Listings>, RepositoryError> {
        let key = source.key();
        if let Some(listings) = self.cache.get(&key) {
            debug!("Using cached listings for {}", key);
            return Ok(Rc::clone(listings));
        }

        let listings = Rc::new(self.fetch_and_normalize(source)?);
        self.cache.insert(key, Rc::clone(&listings));
        Ok(listings)
    }

    /// Forgets the cached load so the next `load` fetches again.
    pub fn invalidate(&mut self, key: &SourceKey) {
        if self.cache.remove(key).is_some() {
            debug!("Invalidated cached listings for {}", key);
        }
    }

    fn fetch_and_normalize(&self, source: &dyn ListingSource) -> Result<Listings, RepositoryError> {
        let spinner = cli_utils::create_spinner(self.quiet, "Fetching listings...");
        spinner.enable_steady_tick(200);
        let fetched = source.fetch();
        spinner.finish_and_clear();
        let table = fetched?;

        let progress_bar = cli_utils::create_progress_bar_count(
            self.quiet,
            "Normalizing...",
            Some(table.len() as u64),
        );
        let (properties, report) = normalize::normalize_table(&table, &self.columns, &progress_bar);
        progress_bar.finish_and_clear();

        info!(
            "Loaded {} listings from {} rows ({} dropped)",
            report.loaded,
            report.total_rows,
            report.dropped_count()
        );

        Ok(Listings { properties, report })
    }
}

#[cfg(test)]
pub mod test_support {
    use std::cell::{Cell, RefCell};

    use super::*;

    pub const LISTINGS_CSV: &str = "name,rent,address,floor,layout,lat,lon\n\
        Maison Aoba,50000,Shibuya 1-2-3,2,1K,35.66,139.70\n\
        Villa Kita,80000,Kita 4-5,5,2LDK,35.75,139.73\n\
        Sakura Heights,120000,Meguro 6-7,1,1K,35.63,139.69\n";

    /// In-memory source that counts fetches and can be switched off.
    pub struct StaticSource {
        pub csv: RefCell<String>,
        pub available: Cell<bool>,
        pub fetches: Cell<usize>,
    }

    impl StaticSource {
        pub fn new(csv: &str) -> StaticSource {
            StaticSource {
                csv: RefCell::new(csv.to_owned()),
                available: Cell::new(true),
                fetches: Cell::new(0),
            }
        }
    }

    impl ListingSource for StaticSource {
        fn key(&self) -> SourceKey {
            SourceKey::new("static")
        }

        fn fetch(&self) -> Result<RawTable, RepositoryError> {
            self.fetches.set(self.fetches.get() + 1);
            if !self.available.get() {
                return Err(RepositoryError::SourceUnavailable("offline".to_owned()));
            }
            sources::parse_csv(self.csv.borrow().as_bytes(), b',')
        }
    }

    impl ListingSource for Rc<StaticSource> {
        fn key(&self) -> SourceKey {
            self.as_ref().key()
        }

        fn fetch(&self) -> Result<RawTable, RepositoryError> {
            self.as_ref().fetch()
        }
    }

    pub fn load(csv: &str) -> Rc<Listings> {
        let mut repository = ListingRepository::new(ColumnMap::default()).quiet(true);
        repository.load(&StaticSource::new(csv)).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn it_should_load_and_normalize_a_source() {
        let mut repository = ListingRepository::new(ColumnMap::default()).quiet(true);
        let listings = repository.load(&StaticSource::new(LISTINGS_CSV)).unwrap();

        assert_eq!(listings.properties.len(), 3);
        assert_eq!(listings.report.dropped_count(), 0);
    }

    #[test]
    fn it_should_fetch_once_per_source_key() {
        let source = StaticSource::new(LISTINGS_CSV);
        let mut repository = ListingRepository::new(ColumnMap::default()).quiet(true);

        let first = repository.load(&source).unwrap();
        let second = repository.load(&source).unwrap();

        assert_eq!(source.fetches.get(), 1);
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn it_should_refetch_after_invalidation() {
        let source = StaticSource::new(LISTINGS_CSV);
        let mut repository = ListingRepository::new(ColumnMap::default()).quiet(true);

        let first = repository.load(&source).unwrap();
        repository.invalidate(&source.key());
        let second = repository.load(&source).unwrap();

        assert_eq!(source.fetches.get(), 2);
        assert_eq!(first.properties, second.properties);
    }

    #[test]
    fn it_should_surface_an_unavailable_source() {
        let source = StaticSource::new(LISTINGS_CSV);
        source.available.set(false);
        let mut repository = ListingRepository::new(ColumnMap::default()).quiet(true);

        assert_matches!(
            repository.load(&source),
            Err(RepositoryError::SourceUnavailable(_))
        );
    }

    #[test]
    fn it_should_drop_a_row_with_non_numeric_rent_and_keep_the_rest() {
        let csv = "name,rent,address,floor,layout,lat,lon\n\
            Maison Aoba,50000,Shibuya 1-2-3,2,1K,35.66,139.70\n\
            Villa Kita,ask the agent,Kita 4-5,5,2LDK,35.75,139.73\n\
            Sakura Heights,120000,Meguro 6-7,1,1K,35.63,139.69\n";

        let listings = load(csv);

        assert_eq!(listings.report.dropped_count(), 1);
        assert_matches!(
            listings.report.dropped[0],
            SchemaError::InvalidRent { row: 1, .. }
        );
        let names: Vec<_> = listings.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Maison Aoba", "Sakura Heights"]);
    }
}
