use std::collections::BTreeSet;

use failure::Fail;
use serde::{Deserialize, Serialize};

use super::listing_repo::{Layout, Property};
use super::result_indexer::{self, FilteredResultSet};

const DEFAULT_RENT_CEILING: u64 = 1_000_000;

#[derive(Debug, Fail, PartialEq)]
pub enum CriteriaError {
    #[fail(display = "Invalid criteria: rent minimum {} exceeds maximum {}", min, max)]
    InvalidCriteria { min: u64, max: u64 },
}

/// Global slider bounds for rent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RentBounds {
    pub floor: u64,
    pub ceiling: u64,
}

impl Default for RentBounds {
    fn default() -> Self {
        RentBounds {
            floor: 0,
            ceiling: DEFAULT_RENT_CEILING,
        }
    }
}

impl RentBounds {
    /// Widens the bounds so that every given listing lies inside them.
    pub fn covering(self, properties: &[Property]) -> RentBounds {
        properties.iter().fold(self, |bounds, p| RentBounds {
            floor: bounds.floor.min(p.rent),
            ceiling: bounds.ceiling.max(p.rent),
        })
    }

    #[inline]
    pub fn clamp(&self, rent: u64) -> u64 {
        rent.max(self.floor).min(self.ceiling)
    }
}

/// One immutable user query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterCriteria {
    rent_min: u64,
    rent_max: u64,
    layouts: BTreeSet<Layout>,
}

impl FilterCriteria {
    pub fn new<I>(rent_min: u64, rent_max: u64, layouts: I) -> Result<FilterCriteria, CriteriaError>
    where
        I: IntoIterator<Item = Layout>,
    {
        if rent_min > rent_max {
            return Err(CriteriaError::InvalidCriteria {
                min: rent_min,
                max: rent_max,
            });
        }

        Ok(FilterCriteria {
            rent_min,
            rent_max,
            layouts: layouts.into_iter().collect(),
        })
    }

    /// Full rent range, no layout restriction.
    pub fn identity(bounds: &RentBounds) -> FilterCriteria {
        FilterCriteria {
            rent_min: bounds.floor,
            rent_max: bounds.ceiling,
            layouts: BTreeSet::new(),
        }
    }

    /// Intersection of the rent range with the bounds; `None` when they do not overlap.
    pub fn clamped(&self, bounds: &RentBounds) -> Option<FilterCriteria> {
        if self.rent_min > bounds.ceiling || self.rent_max < bounds.floor {
            return None;
        }
        Some(FilterCriteria {
            rent_min: bounds.clamp(self.rent_min),
            rent_max: bounds.clamp(self.rent_max),
            layouts: self.layouts.clone(),
        })
    }

    pub fn rent_min(&self) -> u64 {
        self.rent_min
    }

    pub fn rent_max(&self) -> u64 {
        self.rent_max
    }

    pub fn layouts(&self) -> &BTreeSet<Layout> {
        &self.layouts
    }

    #[inline]
    pub fn matches(&self, property: &Property) -> bool {
        let rent_ok = property.rent >= self.rent_min && property.rent <= self.rent_max;
        let layout_ok = self.layouts.is_empty() || self.layouts.contains(&property.layout);
        rent_ok && layout_ok
    }
}

/// Keeps the listings that satisfy the criteria, in their source order.
pub fn apply<'a>(records: &'a [Property], criteria: &FilterCriteria) -> Vec<&'a Property> {
    records.iter().filter(|p| criteria.matches(p)).collect()
}

pub fn evaluate<'a>(records: &'a [Property], criteria: &FilterCriteria) -> FilteredResultSet<'a> {
    result_indexer::index(apply(records, criteria))
}

/// Evaluates the criteria restricted to the bounds. Disjoint ranges match nothing.
pub fn evaluate_within<'a>(
    records: &'a [Property],
    criteria: &FilterCriteria,
    bounds: &RentBounds,
) -> FilteredResultSet<'a> {
    match criteria.clamped(bounds) {
        Some(clamped) => evaluate(records, &clamped),
        None => result_indexer::index(Vec::new()),
    }
}
