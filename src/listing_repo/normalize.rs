use failure::Fail;
use indicatif::ProgressBar;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::listing_types::{Layout, Property, PropertyId, RawRow, RawTable};

#[derive(Debug, Fail, PartialEq)]
pub enum SchemaError {
    #[fail(display = "row {}: missing required field '{}'", row, field)]
    MissingField { row: usize, field: &'static str },
    #[fail(display = "row {}: rent '{}' is not a non-negative integer", row, value)]
    InvalidRent { row: usize, value: String },
    #[fail(display = "row {}: unknown layout '{}'", row, value)]
    UnknownLayout { row: usize, value: String },
    #[fail(display = "row {}: invalid {} '{}'", row, field, value)]
    InvalidCoordinate {
        row: usize,
        field: &'static str,
        value: String,
    },
}

/// Accepted header names for each required field. Matching ignores ASCII case.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub name: Vec<String>,
    pub rent: Vec<String>,
    pub address: Vec<String>,
    pub floor: Vec<String>,
    pub layout: Vec<String>,
    pub latitude: Vec<String>,
    pub longitude: Vec<String>,
}

fn aliases(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| (*n).to_owned()).collect()
}

impl Default for ColumnMap {
    fn default() -> Self {
        ColumnMap {
            name: aliases(&["name", "物件名"]),
            rent: aliases(&["rent", "家賃"]),
            address: aliases(&["address", "住所"]),
            floor: aliases(&["floor", "階数", "階"]),
            layout: aliases(&["layout", "間取り"]),
            latitude: aliases(&["latitude", "lat", "緯度"]),
            longitude: aliases(&["longitude", "lon", "lng", "経度"]),
        }
    }
}

impl ColumnMap {
    fn lookup<'r>(row: &'r RawRow, names: &[String]) -> Option<&'r str> {
        names.iter().find_map(|wanted| {
            row.iter()
                .find(|(header, _)| header.trim().eq_ignore_ascii_case(wanted))
                .map(|(_, value)| value.trim())
                .filter(|value| !value.is_empty())
        })
    }
}

/// Counts of one normalization pass. Dropped rows keep their reason.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub total_rows: usize,
    pub loaded: usize,
    pub dropped: Vec<SchemaError>,
}

impl LoadReport {
    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }
}

/// Coerces a rent cell to an integer amount.
///
/// Thousands separators, a leading `¥` and a trailing `円` are tolerated, as is
/// an integral decimal rendering such as `80000.0`.
pub fn parse_rent(value: &str) -> Option<u64> {
    let trimmed = value.trim().trim_start_matches('¥').trim_end_matches('円');
    let cleaned: String = trimmed.chars().filter(|c| *c != ',').collect();
    let cleaned = cleaned.trim();

    if let Ok(rent) = cleaned.parse::<u64>() {
        return Some(rent);
    }

    let (whole, fraction) = cleaned.split_once('.')?;
    if fraction.chars().all(|c| c == '0') {
        whole.parse::<u64>().ok()
    } else {
        None
    }
}

fn parse_coordinate(
    row: usize,
    field: &'static str,
    value: &str,
    limit: f64,
) -> Result<f64, SchemaError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.abs() <= limit)
        .ok_or_else(|| SchemaError::InvalidCoordinate {
            row,
            field,
            value: value.to_owned(),
        })
}

pub fn normalize_row(row_idx: usize, row: &RawRow, columns: &ColumnMap) -> Result<Property, SchemaError> {
    let required = |field: &'static str, names: &[String]| {
        ColumnMap::lookup(row, names).ok_or(SchemaError::MissingField { row: row_idx, field })
    };

    let name = required("name", &columns.name)?;
    let rent_text = required("rent", &columns.rent)?;
    let address = required("address", &columns.address)?;
    let floor = required("floor", &columns.floor)?;
    let layout_text = required("layout", &columns.layout)?;
    let latitude_text = required("latitude", &columns.latitude)?;
    let longitude_text = required("longitude", &columns.longitude)?;

    let rent = parse_rent(rent_text).ok_or_else(|| SchemaError::InvalidRent {
        row: row_idx,
        value: rent_text.to_owned(),
    })?;

    let layout = layout_text
        .parse::<Layout>()
        .map_err(|err| SchemaError::UnknownLayout {
            row: row_idx,
            value: err.0,
        })?;

    Ok(Property {
        id: PropertyId(row_idx),
        name: name.to_owned(),
        rent,
        address: address.to_owned(),
        floor: floor.to_owned(),
        layout,
        latitude: parse_coordinate(row_idx, "latitude", latitude_text, 90.0)?,
        longitude: parse_coordinate(row_idx, "longitude", longitude_text, 180.0)?,
    })
}

/// Normalizes every row of the table. Invalid rows are dropped, not fatal.
pub fn normalize_table(
    table: &RawTable,
    columns: &ColumnMap,
    progress_bar: &ProgressBar,
) -> (Vec<Property>, LoadReport) {
    let mut report = LoadReport {
        total_rows: table.len(),
        ..LoadReport::default()
    };

    let mut properties = Vec::with_capacity(table.len());
    for (row_idx, row) in table.rows.iter().enumerate() {
        match normalize_row(row_idx, row, columns) {
            Ok(property) => properties.push(property),
            Err(err) => {
                warn!("Dropping listing: {}", err);
                report.dropped.push(err);
            }
        }
        progress_bar.inc(1);
    }

    report.loaded = properties.len();
    debug!(
        "Normalized {} of {} rows ({} dropped)",
        report.loaded,
        report.total_rows,
        report.dropped_count()
    );

    (properties, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn row(fields: &[(&str, &str)]) -> RawRow {
        fields
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn valid_row(rent: &str) -> RawRow {
        row(&[
            ("name", "Maison Aoba"),
            ("rent", rent),
            ("address", "Shibuya 1-2-3"),
            ("floor", "3"),
            ("layout", "1K"),
            ("lat", "35.66"),
            ("lon", "139.70"),
            ("extra", "ignored"),
        ])
    }

    #[test]
    fn it_should_coerce_rent_text() {
        assert_eq!(parse_rent("80000"), Some(80000));
        assert_eq!(parse_rent(" 80,000 "), Some(80000));
        assert_eq!(parse_rent("¥120,000"), Some(120000));
        assert_eq!(parse_rent("65000円"), Some(65000));
        assert_eq!(parse_rent("50000.0"), Some(50000));
    }

    #[test]
    fn it_should_reject_non_integer_rent() {
        assert_eq!(parse_rent("cheap"), None);
        assert_eq!(parse_rent("-5000"), None);
        assert_eq!(parse_rent("50000.5"), None);
        assert_eq!(parse_rent(""), None);
    }

    #[test]
    fn it_should_normalize_a_valid_row() {
        let property = normalize_row(4, &valid_row("80000"), &ColumnMap::default()).unwrap();

        assert_eq!(property.id, PropertyId(4));
        assert_eq!(property.rent, 80000);
        assert_eq!(property.layout, Layout::OneK);
        assert_eq!(property.latitude, 35.66);
        assert_eq!(property.longitude, 139.70);
    }

    #[test]
    fn it_should_match_headers_ignoring_case() {
        let mut raw = valid_row("80000");
        let rent = raw.remove("rent").unwrap();
        raw.insert("Rent".to_owned(), rent);

        assert!(normalize_row(0, &raw, &ColumnMap::default()).is_ok());
    }

    #[test]
    fn it_should_report_missing_fields() {
        let mut raw = valid_row("80000");
        raw.remove("address");

        let result = normalize_row(2, &raw, &ColumnMap::default());
        assert_matches!(
            result,
            Err(SchemaError::MissingField { row: 2, field: "address" })
        );
    }

    #[test]
    fn it_should_treat_blank_cells_as_missing() {
        let mut raw = valid_row("80000");
        raw.insert("name".to_owned(), "   ".to_owned());

        let result = normalize_row(0, &raw, &ColumnMap::default());
        assert_matches!(result, Err(SchemaError::MissingField { field: "name", .. }));
    }

    #[test]
    fn it_should_reject_out_of_range_coordinates() {
        let mut raw = valid_row("80000");
        raw.insert("lat".to_owned(), "135.0".to_owned());

        let result = normalize_row(0, &raw, &ColumnMap::default());
        assert_matches!(
            result,
            Err(SchemaError::InvalidCoordinate { field: "latitude", .. })
        );
    }

    #[test]
    fn it_should_reject_unknown_layouts() {
        let mut raw = valid_row("80000");
        raw.insert("layout".to_owned(), "castle".to_owned());

        let result = normalize_row(0, &raw, &ColumnMap::default());
        assert_matches!(result, Err(SchemaError::UnknownLayout { .. }));
    }

    #[test]
    fn it_should_drop_only_the_row_with_unparsable_rent() {
        let table = RawTable {
            headers: vec![],
            rows: vec![valid_row("50000"), valid_row("call us"), valid_row("120000")],
        };

        let (properties, report) = normalize_table(&table, &ColumnMap::default(), &ProgressBar::hidden());

        assert_eq!(report.total_rows, 3);
        assert_eq!(report.loaded, 2);
        assert_eq!(report.dropped_count(), 1);
        assert_matches!(report.dropped[0], SchemaError::InvalidRent { row: 1, .. });
        let ids: Vec<_> = properties.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![PropertyId(0), PropertyId(2)]);
    }
}
