use std::io;
use std::path;

use log::info;

use super::cli_utils;
use super::listing_repo::{RawTable, RepositoryError};

pub fn read_snapshot<R: io::Read>(reader: R) -> Result<RawTable, RepositoryError> {
    Ok(bincode::deserialize_from(reader)?)
}

pub fn load_snapshot(input_path: &path::Path) -> Result<RawTable, RepositoryError> {
    let progress_bar = cli_utils::create_spinner(false, "Loading snapshot...");
    progress_bar.enable_steady_tick(200);

    let file_reader = std::fs::File::open(input_path)?;
    let buf_reader = io::BufReader::new(file_reader);
    let result = read_snapshot(buf_reader);

    progress_bar.finish_and_clear();
    result
}

pub fn save_snapshot(table: &RawTable, output_file: &path::Path) -> Result<(), RepositoryError> {
    info!(
        "Saving {} rows into snapshot {}",
        table.len(),
        output_file.display()
    );
    let file_writer = std::fs::File::create(output_file)?;
    let buf_writer = io::BufWriter::new(file_writer);
    bincode::serialize_into(buf_writer, table)?;
    Ok(())
}
