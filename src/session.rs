use std::io;
use std::str::FromStr;

use failure::Fail;
use log::{info, warn};
use serde::Serialize;

use super::controller::SearchController;
use super::filter_engine::CriteriaError;
use super::listing_repo::Layout;
use super::map_layer::{self, MapLayerSpec, MapSettings};
use super::table_view::{self, SortColumn, SortOrder, TableRow, TableSort};

#[derive(Debug, Fail)]
pub enum SessionError {
    #[fail(display = "Unknown event: {}", _0)]
    UnknownEvent(String),
    #[fail(display = "Missing argument: {}", _0)]
    MissingArgument(&'static str),
    #[fail(display = "Invalid rent: {}", _0)]
    InvalidRent(String),
    #[fail(display = "Unknown layout: {}", _0)]
    UnknownLayout(String),
    #[fail(display = "{}", _0)]
    UnknownColumn(String),
    #[fail(display = "{}", _0)]
    Criteria(CriteriaError),
    #[fail(display = "I/O error: {}", _0)]
    Io(io::Error),
    #[fail(display = "JSON error: {}", _0)]
    Json(serde_json::Error),
}

impl From<io::Error> for SessionError {
    fn from(err: io::Error) -> SessionError {
        SessionError::Io(err)
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> SessionError {
        SessionError::Json(err)
    }
}

/// A rent limit as typed by the user: a number, or `min` / `max` for the slider ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RentLimit {
    Floor,
    Ceiling,
    Value(u64),
}

impl FromStr for RentLimit {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "min" => Ok(RentLimit::Floor),
            "max" => Ok(RentLimit::Ceiling),
            other => other
                .replace(',', "")
                .parse::<u64>()
                .map(RentLimit::Value)
                .map_err(|_| SessionError::InvalidRent(other.to_owned())),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Search {
        rent_min: RentLimit,
        rent_max: RentLimit,
        layouts: Vec<Layout>,
    },
    Reset,
    Sort(TableSort),
    Reload,
}

impl SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            SessionEvent::Search { .. } => "search",
            SessionEvent::Reset => "reset",
            SessionEvent::Sort(_) => "sort",
            SessionEvent::Reload => "reload",
        }
    }
}

impl FromStr for SessionEvent {
    type Err = SessionError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut tokens = line.split_whitespace();
        let verb = tokens.next().unwrap_or_default();

        match verb {
            "search" => {
                let rent_min = tokens.next().ok_or(SessionError::MissingArgument("min rent"))?.parse()?;
                let rent_max = tokens.next().ok_or(SessionError::MissingArgument("max rent"))?.parse()?;
                let layouts = tokens
                    .map(|t| t.parse::<Layout>().map_err(|_| SessionError::UnknownLayout(t.to_owned())))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(SessionEvent::Search {
                    rent_min,
                    rent_max,
                    layouts,
                })
            }
            "reset" => Ok(SessionEvent::Reset),
            "reload" => Ok(SessionEvent::Reload),
            "sort" => {
                let mut words: Vec<&str> = tokens.collect();
                let order = match words.last().map(|w| w.to_lowercase()).as_deref() {
                    Some("desc") => {
                        words.pop();
                        SortOrder::Descending
                    }
                    Some("asc") => {
                        words.pop();
                        SortOrder::Ascending
                    }
                    _ => SortOrder::Ascending,
                };
                if words.is_empty() {
                    return Err(SessionError::MissingArgument("column"));
                }
                let column = words
                    .join(" ")
                    .parse::<SortColumn>()
                    .map_err(|e| SessionError::UnknownColumn(e.to_string()))?;
                Ok(SessionEvent::Sort(TableSort { column, order }))
            }
            other => Err(SessionError::UnknownEvent(other.to_owned())),
        }
    }
}

#[derive(Serialize)]
struct EventOutput<'a> {
    event: &'a str,
    count: usize,
    /// Source rows left out of the current snapshot by normalization.
    dropped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<&'a str>,
    layer: MapLayerSpec,
    rows: Vec<TableRow<'a>>,
}

#[derive(Serialize)]
struct RejectedOutput<'a> {
    event: &'a str,
    error: String,
}

#[derive(Debug, Default, PartialEq)]
pub struct SessionStats {
    pub total_events: u32,
    pub rejected_events: u32,
}

fn apply_event(controller: &mut SearchController, event: &SessionEvent) -> Result<(), SessionError> {
    match event {
        SessionEvent::Search {
            rent_min,
            rent_max,
            layouts,
        } => {
            let bounds = controller.bounds();
            let resolve = |limit: &RentLimit| match limit {
                RentLimit::Floor => bounds.floor,
                RentLimit::Ceiling => bounds.ceiling,
                RentLimit::Value(v) => *v,
            };
            controller
                .search(resolve(rent_min), resolve(rent_max), layouts.iter().cloned())
                .map_err(SessionError::Criteria)?;
        }
        SessionEvent::Reset => {
            controller.reset();
        }
        SessionEvent::Sort(sort) => {
            controller.sort_by(*sort);
        }
        SessionEvent::Reload => {
            // A failed reload is reported through the warning field; the old snapshot stays.
            controller.reload().ok();
        }
    }
    Ok(())
}

fn write_line<W: io::Write, T: Serialize>(output: &mut W, value: &T) -> Result<(), SessionError> {
    serde_json::to_writer(&mut *output, value)?;
    output.write_all(b"\n")?;
    output.flush()?;
    Ok(())
}

/// Reads one event per line and answers each with one JSON line.
///
/// The first line is written before any event is read and shows the initial
/// state, which is the full listing.
pub fn run_session<R: io::BufRead, W: io::Write>(
    controller: &mut SearchController,
    settings: &MapSettings,
    input: R,
    mut output: W,
) -> Result<SessionStats, SessionError> {
    let mut stats = SessionStats::default();

    write_state(controller, settings, "initial", &mut output)?;

    for line in input.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        stats.total_events += 1;

        let outcome = line
            .parse::<SessionEvent>()
            .and_then(|event| apply_event(controller, &event).map(|_| event));

        match outcome {
            Ok(event) => write_state(controller, settings, event.name(), &mut output)?,
            Err(err) => {
                warn!("Rejected event '{}': {}", line, err);
                stats.rejected_events += 1;
                let rejected = RejectedOutput {
                    event: line,
                    error: err.to_string(),
                };
                write_line(&mut output, &rejected)?;
            }
        }
    }

    info!("Session stats: {:?}", stats);
    Ok(stats)
}

fn write_state<W: io::Write>(
    controller: &SearchController,
    settings: &MapSettings,
    event: &str,
    output: &mut W,
) -> Result<(), SessionError> {
    let results = controller.results();
    let rows = controller.table();
    let state = EventOutput {
        event,
        count: results.len(),
        dropped: controller.listings().report.dropped_count(),
        warning: controller.warning(),
        layer: map_layer::build(&results, settings),
        rows: table_view::table_rows(&rows),
    };
    write_line(output, &state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter_engine::RentBounds;
    use crate::listing_repo::test_support::{StaticSource, LISTINGS_CSV};
    use crate::listing_repo::{ColumnMap, ListingRepository};
    use assert_matches::assert_matches;
    use serde_json::Value;

    fn controller() -> SearchController {
        SearchController::open(
            ListingRepository::new(ColumnMap::default()).quiet(true),
            Box::new(StaticSource::new(LISTINGS_CSV)),
            RentBounds::default(),
        )
    }

    fn run(script: &str) -> (SessionStats, Vec<Value>) {
        let mut controller = controller();
        let mut output = Vec::new();
        let stats = run_session(
            &mut controller,
            &MapSettings::default(),
            script.as_bytes(),
            &mut output,
        )
        .unwrap();
        let lines = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        (stats, lines)
    }

    #[test]
    fn it_should_parse_search_events() {
        let event: SessionEvent = "search 60000 max 1K 2ldk".parse().unwrap();

        assert_eq!(
            event,
            SessionEvent::Search {
                rent_min: RentLimit::Value(60000),
                rent_max: RentLimit::Ceiling,
                layouts: vec![Layout::OneK, Layout::TwoLDK],
            }
        );
    }

    #[test]
    fn it_should_parse_sort_events_with_spaced_columns() {
        let event: SessionEvent = "sort New Index desc".parse().unwrap();

        assert_eq!(
            event,
            SessionEvent::Sort(TableSort {
                column: SortColumn::Index,
                order: SortOrder::Descending,
            })
        );
        assert_eq!(
            "sort rent".parse::<SessionEvent>().unwrap(),
            SessionEvent::Sort(TableSort::ascending(SortColumn::Rent))
        );
    }

    #[test]
    fn it_should_reject_malformed_events() {
        assert_matches!("search 1000".parse::<SessionEvent>(), Err(SessionError::MissingArgument(_)));
        assert_matches!("search a b".parse::<SessionEvent>(), Err(SessionError::InvalidRent(_)));
        assert_matches!("search 0 max 9Z".parse::<SessionEvent>(), Err(SessionError::UnknownLayout(_)));
        assert_matches!("sort".parse::<SessionEvent>(), Err(SessionError::MissingArgument(_)));
        assert_matches!("zoom 3".parse::<SessionEvent>(), Err(SessionError::UnknownEvent(_)));
    }

    #[test]
    fn it_should_answer_every_event_with_one_line() {
        let (stats, lines) = run("search 60000 100000\n\n# comment\nsort rent desc\nreset\n");

        assert_eq!(stats, SessionStats { total_events: 3, rejected_events: 0 });
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["event"], "initial");
        assert_eq!(lines[0]["count"], 3);
        assert_eq!(lines[1]["count"], 1);
        assert_eq!(lines[1]["rows"][0]["New Index"], 0);
        assert_eq!(lines[1]["rows"][0]["name"], "Villa Kita");
        assert_eq!(lines[1]["layer"]["points"][0]["tooltip"], "0: Villa Kita / 2LDK / 80000");
        assert_eq!(lines[3]["event"], "reset");
        assert_eq!(lines[3]["rows"], lines[0]["rows"]);
        assert_eq!(lines[3]["layer"], lines[0]["layer"]);
    }

    #[test]
    fn it_should_report_rejected_events_without_stopping() {
        let (stats, lines) = run("search 100000 60000\nreset\n");

        assert_eq!(stats.rejected_events, 1);
        assert!(lines[1]["error"].as_str().unwrap().contains("exceeds"));
        assert_eq!(lines[2]["count"], 3);
    }

    #[test]
    fn it_should_keep_layer_and_table_sizes_equal() {
        let (_, lines) = run("search 0 max 1K\nsort name\n");

        for line in &lines {
            let points = line["layer"]["points"].as_array().unwrap().len();
            let rows = line["rows"].as_array().unwrap().len();
            assert_eq!(points, rows);
            assert_eq!(line["count"], points as u64);
        }
    }

    #[test]
    fn it_should_report_dropped_rows() {
        let csv = format!("{}Broken,lots,Nowhere,1,1K,35.6,139.7\n", LISTINGS_CSV);
        let mut controller = SearchController::open(
            ListingRepository::new(ColumnMap::default()).quiet(true),
            Box::new(StaticSource::new(&csv)),
            RentBounds::default(),
        );
        let mut output = Vec::new();

        run_session(
            &mut controller,
            &MapSettings::default(),
            "reset\n".as_bytes(),
            &mut output,
        )
        .unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            assert_eq!(line["dropped"], 1);
            assert_eq!(line["count"], 3);
        }
    }
}
