#[macro_use]
extern crate clap;
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};

#[macro_use]
extern crate failure;
use failure::Error;

use log::{error, info, warn};
use simplelog;
use std::fs::File;
use std::io;
use std::path::Path;

mod cli_utils;
mod config;
mod controller;
mod filter_engine;
mod listing_repo;
mod map_layer;
mod result_indexer;
mod session;
mod snapshot_utils;
mod table_view;

use chrono::offset::Local;

use config::AppConfig;
use controller::SearchController;
use listing_repo::{Layout, ListingRepository};
use table_view::{SortColumn, SortOrder, TableSort};

const DEFAULT_SNAPSHOT_NAME: &str = "listings.snapshot.bin";

fn init_logging(verbose: bool) {
    let local_time = Local::now();
    let time_offset = local_time.offset();
    let level = if verbose {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };
    simplelog::TermLogger::init(
        level,
        simplelog::Config {
            offset: time_offset.clone(),
            ..simplelog::Config::default()
        },
        simplelog::TerminalMode::Stderr,
    )
    .ok();
}

fn main() {
    let matches = build_cli().get_matches();

    // Global flags given after the subcommand only show up in its matches.
    let verbose = matches.is_present("verbose")
        || matches
            .subcommand()
            .1
            .map_or(false, |sub_matches| sub_matches.is_present("verbose"));
    init_logging(verbose);

    match do_main(&matches) {
        Ok(_) => info!("Process finished OK"),
        Err(err) => {
            error!("Process finished with an error: {}", err);
            std::process::exit(1);
        }
    };
}

fn source_args<'a, 'b>() -> Vec<Arg<'a, 'b>> {
    vec![
        Arg::with_name("source")
            .short("s")
            .long("source")
            .help("Listing file path or http(s) URL. Overrides the config file.")
            .takes_value(true),
        Arg::with_name("format")
            .short("f")
            .long("format")
            .help("Source format. Guessed from the extension when omitted.")
            .takes_value(true)
            .possible_values(&["csv", "json", "geojson", "snapshot"]),
        Arg::with_name("delimiter")
            .short("d")
            .long("delimiter")
            .help("Delimiter for csv sources")
            .takes_value(true),
        Arg::with_name("config")
            .short("c")
            .long("config")
            .help("JSON config file")
            .takes_value(true),
    ]
}

fn output_args<'a, 'b>() -> Vec<Arg<'a, 'b>> {
    vec![
        Arg::with_name("output")
            .short("o")
            .long("output")
            .help("Writes the table as csv to this file instead of stdout.")
            .takes_value(true),
        Arg::with_name("layer-output")
            .short("l")
            .long("layer-output")
            .help("Writes the map layer as JSON to this file.")
            .takes_value(true),
        Arg::with_name("sort")
            .long("sort")
            .help("Table column to sort by, e.g. rent or \"New Index\".")
            .takes_value(true),
        Arg::with_name("desc")
            .long("desc")
            .help("Sort descending.")
            .requires("sort"),
        Arg::with_name("recenter")
            .long("recenter")
            .help("Center the map view on the listings."),
    ]
}

fn build_cli<'a, 'b>() -> App<'a, 'b> {
    App::new("listing-search")
        .version(crate_version!())
        .about("Filter rental listings by rent and layout and lay them out on a map")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .global(true)
                .help("Debug logging"),
        )
        .subcommand(
            SubCommand::with_name("search")
                .about("Filter listings and write the table and map layer")
                .args(&source_args())
                .args(&output_args())
                .arg(
                    Arg::with_name("min")
                        .long("min")
                        .help("Minimum rent. Defaults to the lowest bound.")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("max")
                        .long("max")
                        .help("Maximum rent. Defaults to the highest bound.")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("layout")
                        .short("L")
                        .long("layout")
                        .help("Layout to include (1R, 1K, 1DK, 1LDK, 2K, 2DK, 2LDK, 3K, 3DK, 4K). Repeatable.")
                        .takes_value(true)
                        .multiple(true)
                        .number_of_values(1),
                ),
        )
        .subcommand(
            SubCommand::with_name("reset")
                .about("Write the full, unfiltered listing")
                .args(&source_args())
                .args(&output_args()),
        )
        .subcommand(
            SubCommand::with_name("session")
                .about("Read search/reset/sort/reload events from stdin, one JSON answer per line")
                .args(&source_args())
                .arg(
                    Arg::with_name("recenter")
                        .long("recenter")
                        .help("Center the map view on the listings."),
                ),
        )
        .subcommand(
            SubCommand::with_name("snapshot")
                .about("Fetch the source once and store it as a local snapshot")
                .args(&source_args())
                .arg(
                    Arg::with_name("output")
                        .short("o")
                        .long("output")
                        .help("Output path or file for the snapshot")
                        .takes_value(true)
                        .default_value("."),
                )
                .arg(
                    Arg::with_name("force")
                        .long("force")
                        .help("Overwrite an existing snapshot")
                        .takes_value(false),
                ),
        )
}

fn build_config(matches: &ArgMatches) -> Result<AppConfig, Error> {
    let mut config = match matches.value_of("config") {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    if let Some(location) = matches.value_of("source") {
        config.source.location = Some(location.to_owned());
    }
    if let Some(format) = matches.value_of("format") {
        config.source.format = Some(format.parse()?);
    }
    if let Some(delimiter) = matches.value_of("delimiter") {
        // Parse the delimiter. Should be exactly one character.
        let delimiter = delimiter.replace("\\t", "\t");
        config.source.delimiter = delimiter
            .chars()
            .next()
            .ok_or_else(|| format_err!("empty delimiter"))?;
        info!("Using the following delimiter: {:?}", config.source.delimiter);
    }
    if matches.is_present("recenter") {
        config.map.recenter = true;
    }

    Ok(config)
}

fn open_controller(config: &AppConfig, quiet: bool) -> Result<SearchController, Error> {
    let source = listing_repo::open_source(&config.source)?;
    let repository = ListingRepository::new(config.columns.clone()).quiet(quiet);
    Ok(SearchController::open(repository, source, config.rent_bounds))
}

fn rent_arg(matches: &ArgMatches, name: &str, default: u64) -> Result<u64, Error> {
    match matches.value_of(name) {
        Some(value) => listing_repo::parse_rent(value)
            .ok_or_else(|| format_err!("Invalid {} rent '{}'", name, value)),
        None => Ok(default),
    }
}

fn layout_args(matches: &ArgMatches) -> Result<Vec<Layout>, Error> {
    matches
        .values_of("layout")
        .map(|values| values.collect::<Vec<_>>())
        .unwrap_or_default()
        .into_iter()
        .map(|value| {
            value
                .parse::<Layout>()
                .map_err(|_| format_err!("Unknown layout '{}'", value))
        })
        .collect()
}

fn sort_arg(matches: &ArgMatches) -> Result<Option<TableSort>, Error> {
    let column = match matches.value_of("sort") {
        Some(column) => column.parse::<SortColumn>()?,
        None => return Ok(None),
    };
    let mut sort = TableSort::ascending(column);
    if matches.is_present("desc") {
        sort.order = SortOrder::Descending;
    }
    Ok(Some(sort))
}

fn write_outputs(
    controller: &SearchController,
    config: &AppConfig,
    matches: &ArgMatches,
) -> Result<(), Error> {
    let results = controller.results();
    let rows = controller.table();

    if let Some(path) = matches.value_of("layer-output") {
        info!("Writing map layer with {} points to {}.", results.len(), path);
        let layer = map_layer::build(&results, &config.map);
        let layer_file = io::BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(layer_file, &layer)?;
    }

    match matches.value_of("output") {
        Some(path) => {
            info!("Writing table to file {}.", path);
            table_view::write_csv(&rows, File::create(path)?)?;
        }
        None => {
            let stdout = io::stdout();
            table_view::write_csv(&rows, stdout.lock())?;
        }
    }

    let criteria = controller.criteria();
    info!(
        "Showing {} of {} listings (rent {}..={}, {} layouts selected)",
        results.len(),
        controller.listings().properties.len(),
        criteria.rent_min(),
        criteria.rent_max(),
        criteria.layouts().len()
    );
    Ok(())
}

fn search_command(matches: &ArgMatches) -> Result<(), Error> {
    let config = build_config(matches)?;
    let mut controller = open_controller(&config, false)?;

    let bounds = controller.bounds();
    let rent_min = rent_arg(matches, "min", bounds.floor)?;
    let rent_max = rent_arg(matches, "max", bounds.ceiling)?;
    let layouts = layout_args(matches)?;

    let found = controller.search(rent_min, rent_max, layouts)?.len();
    info!("{} listings match", found);

    if let Some(sort) = sort_arg(matches)? {
        controller.sort_by(sort);
    }

    write_outputs(&controller, &config, matches)
}

fn reset_command(matches: &ArgMatches) -> Result<(), Error> {
    let config = build_config(matches)?;
    let mut controller = open_controller(&config, false)?;

    controller.reset();
    if let Some(sort) = sort_arg(matches)? {
        controller.sort_by(sort);
    }

    write_outputs(&controller, &config, matches)
}

fn session_command(matches: &ArgMatches) -> Result<(), Error> {
    let config = build_config(matches)?;
    let mut controller = open_controller(&config, true)?;

    info!("Reading events from stdin");
    let stdin = io::stdin();
    let stdout = io::stdout();
    let stats = session::run_session(&mut controller, &config.map, stdin.lock(), stdout.lock())?;

    info!("Stats: {:?}", stats);
    Ok(())
}

fn snapshot_command(matches: &ArgMatches) -> Result<(), Error> {
    let config = build_config(matches)?;
    let dest_path = Path::new(matches.value_of("output").unwrap_or("."));
    let force = matches.is_present("force");

    let dest_file_buffer = if dest_path.is_dir() {
        dest_path.join(DEFAULT_SNAPSHOT_NAME)
    } else {
        dest_path.to_path_buf()
    };
    let dest_file: &Path = dest_file_buffer.as_path();

    if dest_file.exists() && !force {
        warn!(
            "Snapshot exists in {}. Skipping. Use --force to overwrite",
            dest_file.display()
        );
        return Ok(());
    }

    let source = listing_repo::open_source(&config.source)?;
    let table = source.fetch()?;
    if table.is_empty() {
        warn!("Source {} returned no rows", source.key());
    }
    info!("Fetched {} rows from {}", table.len(), source.key());

    snapshot_utils::save_snapshot(&table, dest_file)?;
    Ok(())
}

fn do_main(matches: &ArgMatches) -> Result<(), Error> {
    match matches.subcommand() {
        ("search", Some(sub_matches)) => search_command(sub_matches),
        ("reset", Some(sub_matches)) => reset_command(sub_matches),
        ("session", Some(sub_matches)) => session_command(sub_matches),
        ("snapshot", Some(sub_matches)) => snapshot_command(sub_matches),
        _ => Ok(()),
    }
}
