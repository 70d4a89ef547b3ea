use std::io::{self, Write};

use serde::Serialize;

use crate::app::Report;
use crate::progress::{ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &Report) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human summary of a finished run.
pub fn print_summary(report: &Report) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}Sortly parser summary{reset}");
    println!(
        "{green}Folders: {}  Items: {}  Images: {}{reset}",
        report.folders, report.items, report.total_images
    );
    println!(
        "{green}Downloaded: {}  Already present: {}{reset}",
        report.downloaded, report.already_present
    );
    let failed_color = if report.failed > 0 { red } else { green };
    println!("{failed_color}Failed downloads: {}{reset}", report.failed);
    let issue_color = if report.issues.is_empty() { green } else { yellow };
    println!(
        "{issue_color}Skipped rows: {} (dangling ancestors: {}){reset}",
        report.issues.len(),
        report.dangling_ancestors
    );

    for issue in &report.issues {
        println!("{yellow}   row {}: {}{reset}", issue.row, issue.message);
    }
    for failure in &report.failures {
        println!(
            "{red}   row {} column {}: {} ({}){reset}",
            failure.row, failure.column, failure.url, failure.reason
        );
    }
    match &report.output_path {
        Some(path) => println!("{cyan}Output workbook: {path}{reset}"),
        None => println!("{yellow}No output workbook written (empty catalog){reset}"),
    }
}
