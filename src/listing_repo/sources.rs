use std::fmt;
use std::fs::File;
use std::io;
use std::io::prelude::*;
use std::path::{Path, PathBuf};
use std::convert::TryInto;
use std::str::FromStr;
use std::time::Duration;

use failure::Fail;
use geojson::Error as GeoJsonError;
use geojson::GeoJson;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::listing_types::{RawRow, RawTable};
use crate::snapshot_utils;

const USER_AGENT: &str = concat!("listing-search/", env!("CARGO_PKG_VERSION"));

/// Every variant means the backing store could not be read; none of them is fatal.
#[derive(Debug, Fail)]
pub enum RepositoryError {
    #[fail(display = "Source unavailable: {}", _0)]
    SourceUnavailable(String),
    #[fail(display = "I/O error: {}", _0)]
    Io(io::Error),
    #[fail(display = "Csv error: {}", _0)]
    Csv(csv::Error),
    #[fail(display = "JSON error: {}", _0)]
    Json(serde_json::Error),
    #[fail(display = "GeoJSON error: {}", _0)]
    GeoJson(GeoJsonError),
    #[fail(display = "HTTP error: {}", _0)]
    Http(reqwest::Error),
    #[fail(display = "Snapshot error: {}", _0)]
    Snapshot(bincode::Error),
}

impl From<io::Error> for RepositoryError {
    fn from(err: io::Error) -> RepositoryError {
        RepositoryError::Io(err)
    }
}

impl From<csv::Error> for RepositoryError {
    fn from(err: csv::Error) -> RepositoryError {
        RepositoryError::Csv(err)
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> RepositoryError {
        RepositoryError::Json(err)
    }
}

impl From<GeoJsonError> for RepositoryError {
    fn from(err: GeoJsonError) -> RepositoryError {
        info!("Error parsing geo-json: {}", err);
        RepositoryError::GeoJson(err)
    }
}

impl From<reqwest::Error> for RepositoryError {
    fn from(err: reqwest::Error) -> RepositoryError {
        RepositoryError::Http(err)
    }
}

impl From<bincode::Error> for RepositoryError {
    fn from(err: bincode::Error) -> RepositoryError {
        RepositoryError::Snapshot(err)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    Json,
    GeoJson,
    Snapshot,
}

/// Formats read as text; snapshots are binary and never reach the text decoders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextFormat {
    Csv,
    Json,
    GeoJson,
}

impl SourceFormat {
    pub fn text(self) -> Option<TextFormat> {
        match self {
            SourceFormat::Csv => Some(TextFormat::Csv),
            SourceFormat::Json => Some(TextFormat::Json),
            SourceFormat::GeoJson => Some(TextFormat::GeoJson),
            SourceFormat::Snapshot => None,
        }
    }

    /// Guesses the format from a path or URL extension. Query strings are ignored.
    pub fn from_location(location: &str) -> Option<SourceFormat> {
        let path = location.split(|c: char| c == '?' || c == '#').next().unwrap_or(location);
        let extension = Path::new(path).extension()?.to_str()?.to_lowercase();
        match extension.as_str() {
            "csv" | "tsv" | "txt" => Some(SourceFormat::Csv),
            "json" => Some(SourceFormat::Json),
            "geojson" => Some(SourceFormat::GeoJson),
            "bin" | "snapshot" => Some(SourceFormat::Snapshot),
            _ => None,
        }
    }
}

impl FromStr for SourceFormat {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(SourceFormat::Csv),
            "json" => Ok(SourceFormat::Json),
            "geojson" => Ok(SourceFormat::GeoJson),
            "snapshot" => Ok(SourceFormat::Snapshot),
            other => Err(RepositoryError::SourceUnavailable(format!(
                "unsupported source format '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            SourceFormat::Csv => "csv",
            SourceFormat::Json => "json",
            SourceFormat::GeoJson => "geojson",
            SourceFormat::Snapshot => "snapshot",
        };
        f.write_str(name)
    }
}

/// Identity of a backing store, used to memoize loads.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceKey(String);

impl SourceKey {
    pub fn new<S: Into<String>>(key: S) -> SourceKey {
        SourceKey(key.into())
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait ListingSource {
    fn key(&self) -> SourceKey;

    fn fetch(&self) -> Result<RawTable, RepositoryError>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// File path or http(s) URL.
    pub location: Option<String>,
    pub format: Option<SourceFormat>,
    pub delimiter: char,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            location: None,
            format: None,
            delimiter: ',',
            timeout_secs: 60,
        }
    }
}

fn delimiter_byte(delimiter: char) -> Result<u8, RepositoryError> {
    if delimiter.is_ascii() {
        Ok(delimiter as u8)
    } else {
        Err(RepositoryError::SourceUnavailable(format!(
            "delimiter {:?} must be a single ASCII character",
            delimiter
        )))
    }
}

/// Picks the backing implementation the configuration describes.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn ListingSource>, RepositoryError> {
    let location = config.location.as_ref().ok_or_else(|| {
        RepositoryError::SourceUnavailable("no listing source configured".to_owned())
    })?;

    let format = config
        .format
        .or_else(|| SourceFormat::from_location(location))
        .unwrap_or(SourceFormat::Csv);
    let delimiter = delimiter_byte(config.delimiter)?;

    let is_remote = location.starts_with("http://") || location.starts_with("https://");
    debug!(
        "Opening {} source {} as {}",
        if is_remote { "remote" } else { "file" },
        location,
        format
    );

    if is_remote {
        return Ok(Box::new(RemoteSource {
            url: location.clone(),
            format,
            delimiter,
            timeout: Duration::from_secs(config.timeout_secs),
        }));
    }

    match format.text() {
        None => Ok(Box::new(SnapshotSource {
            path: PathBuf::from(location),
        })),
        Some(format) => Ok(Box::new(FileSource {
            path: PathBuf::from(location),
            format,
            delimiter,
        })),
    }
}

pub struct FileSource {
    pub path: PathBuf,
    pub format: TextFormat,
    pub delimiter: u8,
}

impl ListingSource for FileSource {
    fn key(&self) -> SourceKey {
        SourceKey::new(format!("file:{}:{:?}", self.path.display(), self.format))
    }

    fn fetch(&self) -> Result<RawTable, RepositoryError> {
        info!("Reading listings from '{}'", self.path.display());
        let file = File::open(&self.path)?;

        match self.format {
            TextFormat::Csv => parse_csv(file, self.delimiter),
            format => {
                let mut contents = String::new();
                io::BufReader::new(file).read_to_string(&mut contents)?;
                decode_text(format, &contents, self.delimiter)
            }
        }
    }
}

pub struct SnapshotSource {
    pub path: PathBuf,
}

impl ListingSource for SnapshotSource {
    fn key(&self) -> SourceKey {
        SourceKey::new(format!("snapshot:{}", self.path.display()))
    }

    fn fetch(&self) -> Result<RawTable, RepositoryError> {
        snapshot_utils::load_snapshot(&self.path)
    }
}

/// A published spreadsheet export or any other HTTP endpoint serving listings.
pub struct RemoteSource {
    pub url: String,
    pub format: SourceFormat,
    pub delimiter: u8,
    pub timeout: Duration,
}

impl ListingSource for RemoteSource {
    fn key(&self) -> SourceKey {
        SourceKey::new(format!("remote:{}:{}", self.url, self.format))
    }

    fn fetch(&self) -> Result<RawTable, RepositoryError> {
        info!("Fetching listings from {}", self.url);
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.timeout)
            .build()?;

        let response = client.get(&self.url).send()?.error_for_status()?;

        match self.format.text() {
            None => {
                let body = response.bytes()?;
                snapshot_utils::read_snapshot(body.as_ref())
            }
            Some(format) => {
                let body = response.text()?;
                decode_text(format, &body, self.delimiter)
            }
        }
    }
}

pub fn decode_text(format: TextFormat, text: &str, delimiter: u8) -> Result<RawTable, RepositoryError> {
    match format {
        TextFormat::Csv => parse_csv(text.as_bytes(), delimiter),
        TextFormat::Json => parse_json(text),
        TextFormat::GeoJson => parse_geojson(text),
    }
}

pub fn parse_csv<R: io::Read>(input: R, delimiter: u8) -> Result<RawTable, RepositoryError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers: Vec<String> = csv_reader.headers()?.iter().map(String::from).collect();

    let mut rows = Vec::new();
    for (line_number, record_result) in csv_reader.records().enumerate() {
        match record_result {
            Ok(record) => {
                let row: RawRow = headers
                    .iter()
                    .cloned()
                    .zip(record.iter().map(String::from))
                    .collect();
                rows.push(row);
            }
            Err(e) => {
                // Empty row keeps the numbering; normalization reports it as dropped.
                warn!("Unable to read line {}: {}", line_number, e);
                rows.push(RawRow::new());
            }
        }
    }

    Ok(RawTable { headers, rows })
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn push_header(headers: &mut Vec<String>, name: &str) {
    if !headers.iter().any(|h| h == name) {
        headers.push(name.to_owned());
    }
}

/// Accepts both record-oriented (`[{...}, ...]`) and column-oriented
/// (`{"col": {"0": ..., "1": ...}}`) JSON tables.
pub fn parse_json(text: &str) -> Result<RawTable, RepositoryError> {
    let document: Value = serde_json::from_str(text)?;

    let mut table = RawTable::default();
    match document {
        Value::Array(records) => {
            for record in records {
                let mut row = RawRow::new();
                if let Value::Object(fields) = record {
                    for (name, value) in fields.iter() {
                        push_header(&mut table.headers, name);
                        if let Some(text) = cell_text(value) {
                            row.insert(name.clone(), text);
                        }
                    }
                }
                table.rows.push(row);
            }
        }
        Value::Object(columns) => {
            let mut row_keys: Vec<String> = Vec::new();
            for column in columns.values() {
                if let Value::Object(cells) = column {
                    for key in cells.keys() {
                        push_header(&mut row_keys, key);
                    }
                }
            }
            row_keys.sort_by_key(|key| (key.parse::<u64>().unwrap_or(u64::MAX), key.clone()));

            table.rows = row_keys.iter().map(|_| RawRow::new()).collect();
            for (name, column) in columns.iter() {
                let cells = match column {
                    Value::Object(cells) => cells,
                    _ => {
                        return Err(RepositoryError::SourceUnavailable(format!(
                            "column '{}' is not an object of cells",
                            name
                        )))
                    }
                };
                push_header(&mut table.headers, name);
                for (row, key) in table.rows.iter_mut().zip(row_keys.iter()) {
                    if let Some(text) = cells.get(key).and_then(cell_text) {
                        row.insert(name.clone(), text);
                    }
                }
            }
        }
        _ => {
            return Err(RepositoryError::SourceUnavailable(
                "expected a JSON array of records or an object of columns".to_owned(),
            ))
        }
    }

    Ok(table)
}

/// Point features become rows; the geometry supplies the coordinates.
pub fn parse_geojson(text: &str) -> Result<RawTable, RepositoryError> {
    let geo_json = text.parse::<GeoJson>()?;

    let feature_collection = if let GeoJson::FeatureCollection(ctn) = geo_json {
        ctn
    } else {
        return Err(RepositoryError::SourceUnavailable(
            "Feature collection not found".to_owned(),
        ));
    };

    let mut table = RawTable::default();
    for feature in feature_collection.features {
        let mut row = RawRow::new();

        for (name, value) in feature.properties.unwrap_or_default() {
            push_header(&mut table.headers, &name);
            if let Some(text) = cell_text(&value) {
                row.insert(name, text);
            }
        }

        match feature.geometry.map(|g| g.value) {
            Some(geojson::Value::Point(position)) if position.len() >= 2 => {
                let point: geo_types::Point<f64> = geojson::Value::Point(position).try_into()?;
                push_header(&mut table.headers, "longitude");
                push_header(&mut table.headers, "latitude");
                row.insert("longitude".to_owned(), point.x().to_string());
                row.insert("latitude".to_owned(), point.y().to_string());
            }
            Some(_) => warn!("Ignoring non-point geometry of feature {}", table.rows.len()),
            None => {}
        }

        table.rows.push(row);
    }

    Ok(table)
}
