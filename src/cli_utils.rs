use indicatif::{ProgressBar, ProgressStyle};

const ROWS_TEMPLATE: &str =
    "[{elapsed_precise}] {msg} {spinner:.green} [{wide_bar:.cyan/blue}] {pos}/{len} rows";
const SPINNER_TEMPLATE: &str = "[{elapsed_precise}] {msg} {spinner:.green}";

pub fn create_spinner(quiet_mode: bool, msg: &str) -> ProgressBar {
    create_progress_bar_count(quiet_mode, msg, None)
}

/// Row counter when the row count is known, spinner otherwise. Hidden in quiet mode.
pub fn create_progress_bar_count(quiet_mode: bool, msg: &str, rows: Option<u64>) -> ProgressBar {
    let bar = if quiet_mode {
        ProgressBar::hidden()
    } else {
        rows.map_or_else(ProgressBar::new_spinner, ProgressBar::new)
    };

    let style = match rows {
        Some(_) => ProgressStyle::default_bar()
            .template(ROWS_TEMPLATE)
            .progress_chars("=> "),
        None => ProgressStyle::default_spinner().template(SPINNER_TEMPLATE),
    };
    bar.set_style(style);
    bar.set_message(msg);

    bar.inc(0); // Draw now, before the next log line.

    bar
}
