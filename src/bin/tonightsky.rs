// Copyright (c) 2024 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{FixedOffset, Local, NaiveDate, NaiveTime, TimeZone};
use clap::Parser;
use log::info;

use tonightsky::astro_util::{format_hours_hms, ObserverContext};
use tonightsky::catalog::load_catalog;
use tonightsky::query::parse_query_conditions;
use tonightsky::scan_engine::{sort_rows, valid_columns, ScanEngine,
                              SearchSession, COLUMNS};

/// Lists celestial catalog objects above the horizon for an observer,
/// with transit times, filtered by a free-text condition expression.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Observer latitude, degrees (positive north).
    #[arg(long, default_value_t = -33.713611, allow_negative_numbers = true)]
    latitude: f64,

    /// Observer longitude, degrees (positive east).
    #[arg(long, default_value_t = 151.090278, allow_negative_numbers = true)]
    longitude: f64,

    /// Observation date, yyyy-mm-dd. Defaults to today.
    #[arg(long)]
    date: Option<String>,

    /// Observation local time, 24h HH:MM.
    #[arg(long, default_value = "22:00")]
    time: String,

    /// Observer's UTC offset in hours, e.g. 10 or -7.5.
    #[arg(long, default_value_t = 10.0, allow_negative_numbers = true)]
    utc_offset: f64,

    /// Catalog label to include (repeatable), e.g. Messier, NGC, IC,
    /// Caldwell, Abell, Sharpless. No --catalog args includes everything.
    #[arg(long)]
    catalog: Vec<String>,

    /// Filter expression, e.g. "altitude > 30 AND catalog = 'Messier'".
    #[arg(long, default_value = "altitude > 30")]
    filter: String,

    /// Path to the celestial catalog CSV file.
    #[arg(long)]
    catalog_file: PathBuf,

    /// Column to sort the output by, e.g. "Time to Transit". Unsorted
    /// output preserves catalog order.
    #[arg(long)]
    sort: Option<String>,

    /// Reverse the sort order.
    #[arg(long, default_value_t = false, requires = "sort")]
    reverse: bool,
}

fn observer_from_args(args: &Args) -> Result<ObserverContext, String> {
    let date_str = match &args.date {
        Some(d) => d.clone(),
        None => Local::now().format("%Y-%m-%d").to_string(),
    };
    let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
        .map_err(|e| format!("Invalid date {:?}: {}", date_str, e))?;
    let time = NaiveTime::parse_from_str(&args.time, "%H:%M")
        .map_err(|e| format!("Invalid time {:?}: {}", args.time, e))?;
    let offset = FixedOffset::east_opt((args.utc_offset * 3600.0) as i32)
        .ok_or_else(|| format!("Invalid UTC offset {}", args.utc_offset))?;
    let local_time = offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .ok_or_else(|| format!("Invalid local time {} {}", date_str, args.time))?;
    Ok(ObserverContext {
        latitude: args.latitude,
        longitude: args.longitude,
        time: local_time,
    })
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let observer = match observer_from_args(&args) {
        Ok(observer) => observer,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            std::process::exit(1);
        },
    };

    // Parse the filter before touching the catalog; an invalid column
    // aborts the search up front.
    let conditions =
        match parse_query_conditions(&args.filter, &valid_columns()) {
            Ok(conditions) => conditions,
            Err(e) => {
                eprintln!("Error: {}", e.message);
                std::process::exit(1);
            },
        };

    // Resolve the sort column to its canonical name up front, like the
    // filter columns.
    let sort_column = match &args.sort {
        Some(column) => {
            match valid_columns().get(&column.trim().to_lowercase()) {
                Some(canonical) => Some(canonical.clone()),
                None => {
                    eprintln!("Error: Invalid sort column: {}", column);
                    std::process::exit(1);
                },
            }
        },
        None => None,
    };

    let records = match load_catalog(&args.catalog_file) {
        Ok(records) => records,
        Err(e) => {
            eprintln!("Error: {}", e.message);
            std::process::exit(1);
        },
    };

    println!("Sidereal time: {}", format_hours_hms(observer.lst_hours()));
    info!("Scanning {} records for observer at ({}, {})",
          records.len(), observer.latitude, observer.longitude);

    let session = SearchSession {
        records,
        catalog_filters: args.catalog,
        conditions,
        observer,
        progress_callback: Some(Arc::new(|percent| {
            eprint!("\rLoading... {}%", percent);
            let _ = std::io::stderr().flush();
        })),
    };
    let engine = ScanEngine::start(session);

    // Ctrl-c stops the scan at its next per-record checkpoint; whatever
    // was collected so far is still printed.
    let cancel = engine.cancel_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        cancel.store(true, std::sync::atomic::Ordering::Relaxed);
    }) {
        eprintln!("Warning: could not install ctrl-c handler: {}", e);
    }

    let mut rows = engine.join();
    eprintln!();
    if let Some(column) = &sort_column {
        sort_rows(&mut rows, column, args.reverse);
    }

    println!("{}", COLUMNS.join("\t"));
    for row in &rows {
        println!("{}", row.values().join("\t"));
    }
    println!("{} objects listed.", rows.len());
}
