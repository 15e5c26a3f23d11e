use std::slice;

use serde::Serialize;

use super::listing_repo::Property;

/// A surviving listing and its position in the filtered sequence.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct IndexedProperty<'a> {
    pub display_index: usize,
    pub property: &'a Property,
}

/// Output of one filter evaluation. Borrows the listings, never owns them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilteredResultSet<'a> {
    entries: Vec<IndexedProperty<'a>>,
}

impl<'a> FilteredResultSet<'a> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexedProperty<'a>] {
        &self.entries
    }

    pub fn iter(&self) -> slice::Iter<'_, IndexedProperty<'a>> {
        self.entries.iter()
    }
}

/// Numbers the given listings 0, 1, 2... in the order they arrive.
pub fn index<'a, I>(results: I) -> FilteredResultSet<'a>
where
    I: IntoIterator<Item = &'a Property>,
{
    let entries = results
        .into_iter()
        .enumerate()
        .map(|(display_index, property)| IndexedProperty {
            display_index,
            property,
        })
        .collect();

    FilteredResultSet { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing_repo::test_support::{load, LISTINGS_CSV};

    #[test]
    fn it_should_assign_dense_indices_in_input_order() {
        let listings = load(LISTINGS_CSV);
        let results = index(listings.properties.iter().rev());

        let indices: Vec<_> = results.iter().map(|e| e.display_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(results.entries()[0].property.name, "Sakura Heights");
    }

    #[test]
    fn it_should_be_deterministic() {
        let listings = load(LISTINGS_CSV);
        let subset: Vec<&Property> = listings.properties.iter().skip(1).collect();

        let first = index(subset.iter().cloned());
        let second = index(subset.iter().cloned());

        assert_eq!(first, second);
        assert_eq!(first.entries()[0].property.id, subset[0].id);
    }

    #[test]
    fn it_should_index_nothing_for_an_empty_input() {
        let results = index(Vec::new());

        assert!(results.is_empty());
        assert_eq!(results.len(), 0);
    }
}
