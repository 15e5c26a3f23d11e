use std::cmp::Ordering;
use std::io;
use std::str::FromStr;

use failure::Fail;
use serde::Serialize;

use super::listing_repo::Property;
use super::result_indexer::{FilteredResultSet, IndexedProperty};

#[derive(Debug, Fail)]
pub enum TableError {
    #[fail(display = "Unknown column: {}", _0)]
    UnknownColumn(String),
    #[fail(display = "Csv error: {}", _0)]
    Csv(csv::Error),
    #[fail(display = "I/O error: {}", _0)]
    Io(io::Error),
}

impl From<csv::Error> for TableError {
    fn from(err: csv::Error) -> TableError {
        TableError::Csv(err)
    }
}

impl From<io::Error> for TableError {
    fn from(err: io::Error) -> TableError {
        TableError::Io(err)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortColumn {
    Index,
    Id,
    Name,
    Rent,
    Address,
    Floor,
    Layout,
    Latitude,
    Longitude,
}

impl FromStr for SortColumn {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(|c: char| c == '_' || c == ' ', "");
        let column = match normalized.as_str() {
            "newindex" | "index" => SortColumn::Index,
            "id" => SortColumn::Id,
            "name" => SortColumn::Name,
            "rent" => SortColumn::Rent,
            "address" => SortColumn::Address,
            "floor" => SortColumn::Floor,
            "layout" => SortColumn::Layout,
            "latitude" | "lat" => SortColumn::Latitude,
            "longitude" | "lon" | "lng" => SortColumn::Longitude,
            _ => return Err(TableError::UnknownColumn(s.to_owned())),
        };
        Ok(column)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableSort {
    pub column: SortColumn,
    pub order: SortOrder,
}

impl TableSort {
    pub fn ascending(column: SortColumn) -> TableSort {
        TableSort {
            column,
            order: SortOrder::Ascending,
        }
    }
}

/// Floors like "3" compare as numbers, anything else ("B1", "ground") as text after them.
fn compare_floor(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn compare(column: SortColumn, a: &IndexedProperty, b: &IndexedProperty) -> Ordering {
    let (pa, pb): (&Property, &Property) = (a.property, b.property);
    match column {
        SortColumn::Index => a.display_index.cmp(&b.display_index),
        SortColumn::Id => pa.id.cmp(&pb.id),
        SortColumn::Name => pa.name.cmp(&pb.name),
        SortColumn::Rent => pa.rent.cmp(&pb.rent),
        SortColumn::Address => pa.address.cmp(&pb.address),
        SortColumn::Floor => compare_floor(&pa.floor, &pb.floor),
        SortColumn::Layout => pa.layout.cmp(&pb.layout),
        SortColumn::Latitude => pa.latitude.total_cmp(&pb.latitude),
        SortColumn::Longitude => pa.longitude.total_cmp(&pb.longitude),
    }
}

/// Reorders a copy of the results for display. Ties keep display-index order.
pub fn sort_by<'a>(results: &FilteredResultSet<'a>, sort: TableSort) -> Vec<IndexedProperty<'a>> {
    let mut rows = results.entries().to_vec();
    rows.sort_by(|a, b| {
        let ordering = compare(sort.column, a, b);
        match sort.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    });
    rows
}

/// Column names in `TableRow` field order.
const TABLE_HEADERS: [&str; 9] = [
    "New Index",
    "id",
    "name",
    "rent",
    "address",
    "floor",
    "layout",
    "latitude",
    "longitude",
];

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TableRow<'a> {
    #[serde(rename = "New Index")]
    pub new_index: usize,
    pub id: usize,
    pub name: &'a str,
    pub rent: u64,
    pub address: &'a str,
    pub floor: &'a str,
    pub layout: &'static str,
    pub latitude: f64,
    pub longitude: f64,
}

impl<'a> From<&IndexedProperty<'a>> for TableRow<'a> {
    fn from(entry: &IndexedProperty<'a>) -> TableRow<'a> {
        let property = entry.property;
        TableRow {
            new_index: entry.display_index,
            id: property.id.0,
            name: &property.name,
            rent: property.rent,
            address: &property.address,
            floor: &property.floor,
            layout: property.layout.label(),
            latitude: property.latitude,
            longitude: property.longitude,
        }
    }
}

pub fn table_rows<'a>(rows: &[IndexedProperty<'a>]) -> Vec<TableRow<'a>> {
    rows.iter().map(TableRow::from).collect()
}

pub fn write_csv<W: io::Write>(rows: &[IndexedProperty], output: W) -> Result<(), TableError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(output);
    // Header even when there are no rows.
    csv_writer.write_record(&TABLE_HEADERS)?;
    for row in rows {
        csv_writer.serialize(TableRow::from(row))?;
    }
    csv_writer.flush()?;
    Ok(())
}
