use std::rc::Rc;

use log::{info, warn};

use super::filter_engine::{self, CriteriaError, FilterCriteria, RentBounds};
use super::listing_repo::{Layout, ListingRepository, ListingSource, Listings, RepositoryError};
use super::result_indexer::{FilteredResultSet, IndexedProperty};
use super::table_view::{self, TableSort};

/// Owns the dataset snapshot and the last accepted criteria, kept as requested
/// and intersected with the current bounds on every evaluation.
///
/// Every verb recomputes the whole pipeline against the current snapshot; the
/// state before any event is the same as after `reset`.
pub struct SearchController {
    repository: ListingRepository,
    source: Box<dyn ListingSource>,
    listings: Rc<Listings>,
    configured_bounds: RentBounds,
    bounds: RentBounds,
    criteria: FilterCriteria,
    sort: Option<TableSort>,
    warning: Option<String>,
}

impl SearchController {
    /// Loads the source once. A failed load leaves an empty dataset and a warning.
    pub fn open(
        mut repository: ListingRepository,
        source: Box<dyn ListingSource>,
        configured_bounds: RentBounds,
    ) -> SearchController {
        let (listings, warning) = match repository.load(source.as_ref()) {
            Ok(listings) => (listings, None),
            Err(err) => {
                warn!("Listings unavailable: {}", err);
                (Rc::new(Listings::default()), Some(err.to_string()))
            }
        };

        let bounds = configured_bounds.covering(&listings.properties);
        SearchController {
            repository,
            source,
            listings,
            configured_bounds,
            bounds,
            criteria: FilterCriteria::identity(&bounds),
            sort: None,
            warning,
        }
    }

    pub fn listings(&self) -> &Listings {
        &self.listings
    }

    pub fn bounds(&self) -> RentBounds {
        self.bounds
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// The condition reported by the last load, if it failed.
    pub fn warning(&self) -> Option<&str> {
        self.warning.as_ref().map(String::as_str)
    }

    pub fn search<I>(
        &mut self,
        rent_min: u64,
        rent_max: u64,
        layouts: I,
    ) -> Result<FilteredResultSet<'_>, CriteriaError>
    where
        I: IntoIterator<Item = Layout>,
    {
        let criteria = FilterCriteria::new(rent_min, rent_max, layouts)?;
        info!(
            "Search rent {}..={} layouts {:?}",
            criteria.rent_min(),
            criteria.rent_max(),
            criteria.layouts()
        );
        self.criteria = criteria;
        Ok(self.results())
    }

    pub fn reset(&mut self) -> FilteredResultSet<'_> {
        info!("Reset to the full listing");
        self.criteria = FilterCriteria::identity(&self.bounds);
        self.sort = None;
        self.results()
    }

    pub fn sort_by(&mut self, sort: TableSort) -> Vec<IndexedProperty<'_>> {
        self.sort = Some(sort);
        self.table()
    }

    /// Refetches the source. On failure the previous snapshot stays in use.
    pub fn reload(&mut self) -> Result<(), RepositoryError> {
        self.repository.invalidate(&self.source.key());
        match self.repository.load(self.source.as_ref()) {
            Ok(listings) => {
                let was_identity = self.criteria == FilterCriteria::identity(&self.bounds);
                self.listings = listings;
                self.warning = None;
                self.bounds = self.configured_bounds.covering(&self.listings.properties);
                if was_identity {
                    self.criteria = FilterCriteria::identity(&self.bounds);
                }
                Ok(())
            }
            Err(err) => {
                warn!(
                    "Reload failed, keeping {} previously loaded listings: {}",
                    self.listings.properties.len(),
                    err
                );
                self.warning = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Current criteria applied to the current snapshot.
    pub fn results(&self) -> FilteredResultSet<'_> {
        filter_engine::evaluate_within(&self.listings.properties, &self.criteria, &self.bounds)
    }

    /// Current results in the current table order.
    pub fn table(&self) -> Vec<IndexedProperty<'_>> {
        let results = self.results();
        match self.sort {
            Some(sort) => table_view::sort_by(&results, sort),
            None => results.entries().to_vec(),
        }
    }
}
