// Copyright (c) 2024 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::{debug, error, info};

use crate::astro_util::{format_dec, format_offset_minutes, format_ra,
                        transit_and_alt_az, ObserverContext};
use crate::catalog::CatalogRecord;
use crate::query::{evaluate_conditions, Condition};

// Display columns of a search result, in output order.
pub const COLUMNS: [&str; 13] = [
    "Name", "RA", "Dec", "Transit Time", "Time to Transit", "Before/After",
    "Altitude", "Azimuth", "Alt Name", "Type", "Magnitude", "Info", "Catalog",
];

/// Returns the mapping from lowercased column name to canonical column
/// name, for validating filter expressions.
pub fn valid_columns() -> HashMap<String, String> {
    COLUMNS.iter()
        .map(|col| (col.to_lowercase(), col.to_string()))
        .collect()
}

// One fully materialized search result. Every field is a display-formatted
// string; the condition evaluator operates on these strings, re-deriving
// numeric values as needed. Built once per admitted record, never mutated
// afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectRow {
    pub name: String,
    // HH:MM:SS.
    pub ra: String,
    // DD.DD with degree glyph.
    pub dec: String,
    // Local clock time of meridian transit, HH:MM:SS.
    pub transit_time: String,
    // Unsigned offset to transit, HH:MM:SS.
    pub time_to_transit: String,
    // "Before" or "After".
    pub before_after: String,
    // DD.DD with degree glyph.
    pub altitude: String,
    // DD.DD with degree glyph.
    pub azimuth: String,
    pub alt_name: String,
    pub object_type: String,
    pub magnitude: String,
    pub info: String,
    pub catalog: String,
}

impl ObjectRow {
    /// Returns the display value for a canonical column name.
    pub fn value(&self, column: &str) -> Option<&str> {
        match column {
            "Name" => Some(&self.name),
            "RA" => Some(&self.ra),
            "Dec" => Some(&self.dec),
            "Transit Time" => Some(&self.transit_time),
            "Time to Transit" => Some(&self.time_to_transit),
            "Before/After" => Some(&self.before_after),
            "Altitude" => Some(&self.altitude),
            "Azimuth" => Some(&self.azimuth),
            "Alt Name" => Some(&self.alt_name),
            "Type" => Some(&self.object_type),
            "Magnitude" => Some(&self.magnitude),
            "Info" => Some(&self.info),
            "Catalog" => Some(&self.catalog),
            _ => None,
        }
    }

    /// All column values in COLUMNS order.
    pub fn values(&self) -> [&str; 13] {
        [&self.name, &self.ra, &self.dec, &self.transit_time,
         &self.time_to_transit, &self.before_after, &self.altitude,
         &self.azimuth, &self.alt_name, &self.object_type, &self.magnitude,
         &self.info, &self.catalog]
    }
}

// Progress callbacks receive a percentage 0..100. Delivery is
// fire-and-forget; the callback must not assume any particular thread.
pub type ProgressFn = dyn Fn(i32) + Send + Sync;

// Everything one search invocation needs. Owned by the caller; a scan
// borrows it for its duration and retains nothing afterwards.
pub struct SearchSession {
    pub records: Vec<CatalogRecord>,

    // Catalog labels to admit. Empty admits all catalogs.
    pub catalog_filters: Vec<String>,

    pub conditions: Vec<Condition>,
    pub observer: ObserverContext,
    pub progress_callback: Option<Arc<ProgressFn>>,
}

/// Runs the scan pipeline over `records` in arrival order: apply the
/// catalog allow-list, compute altitude/azimuth/transit for each record,
/// drop records below the horizon, and admit rows passing `conditions`.
/// Admitted rows preserve source order.
///
/// `cancel` is polled once per record; when set, the rows collected so far
/// are returned (a partial result, not an error). Progress is reported
/// every 100 processed records, admitted or not.
pub fn scan_catalog(records: &[CatalogRecord],
                    observer: &ObserverContext,
                    catalog_filters: &[String],
                    conditions: &[Condition],
                    on_progress: Option<&ProgressFn>,
                    cancel: &AtomicBool)
                    -> Vec<ObjectRow> {
    let total = records.len();
    let mut processed = 0_usize;
    let mut rows = Vec::<ObjectRow>::new();

    for record in records {
        if cancel.load(Ordering::Relaxed) {
            info!("Scan cancelled after {} of {} records", processed, total);
            break;
        }
        processed += 1;
        if processed % 100 == 0 {
            if let Some(progress) = on_progress {
                progress((processed * 100 / total) as i32);
            }
        }

        let catalog = record.catalog.trim();
        if !catalog_filters.is_empty()
            && !catalog_filters.iter().any(|f| f == catalog)
        {
            continue;
        }

        // Malformed source data is tolerated, not fatal.
        let ra: f64 = match record.ra.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                debug!("Skipping {:?}: unparseable RA {:?}",
                       record.name, record.ra);
                continue;
            },
        };
        let dec: f64 = match record.dec.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                debug!("Skipping {:?}: unparseable Dec {:?}",
                       record.name, record.dec);
                continue;
            },
        };

        let transit = transit_and_alt_az(ra, dec, observer);
        if transit.altitude < 0.0 {
            continue;  // Below horizon.
        }

        let row = ObjectRow {
            name: record.name.clone(),
            ra: format_ra(ra),
            dec: format_dec(dec),
            transit_time: transit.transit_time.format("%H:%M:%S").to_string(),
            time_to_transit: format_offset_minutes(transit.transit_minutes),
            before_after: transit.side.as_str().to_string(),
            altitude: format!("{:.2}°", transit.altitude),
            azimuth: format!("{:.2}°", transit.azimuth),
            alt_name: record.alt_name.clone(),
            object_type: record.object_type.clone(),
            magnitude: record.magnitude.clone(),
            info: record.info.clone(),
            catalog: record.catalog.clone(),
        };
        if evaluate_conditions(&row, conditions) {
            rows.push(row);
        }
    }
    rows
}

/// Sorts rows lexicographically by a display column. Rows missing the
/// column (unknown column name) compare as empty.
pub fn sort_rows(rows: &mut [ObjectRow], column: &str, reverse: bool) {
    rows.sort_by(|a, b| {
        let ord = a.value(column).unwrap_or("")
            .cmp(b.value(column).unwrap_or(""));
        if reverse { ord.reverse() } else { ord }
    });
}

// Runs one search on a dedicated worker thread. The invoking context stays
// free to cancel the scan mid-flight; join() returns whatever rows were
// collected. A new search requires a new ScanEngine; overlapping scans are
// not serialized here.
pub struct ScanEngine {
    cancel: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<Vec<ObjectRow>>>,
}

impl ScanEngine {
    /// Starts the scan; returns immediately.
    pub fn start(session: SearchSession) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = cancel.clone();
        let worker = thread::spawn(move || {
            let SearchSession {
                records, catalog_filters, conditions, observer,
                progress_callback,
            } = session;
            let rows = scan_catalog(&records, &observer, &catalog_filters,
                                    &conditions,
                                    progress_callback.as_deref(),
                                    &worker_cancel);
            info!("Scan complete: {} of {} records admitted",
                  rows.len(), records.len());
            rows
        });
        ScanEngine { cancel, worker: Some(worker) }
    }

    /// Requests cooperative cancellation. The worker stops at its next
    /// per-record checkpoint.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Returns a handle that cancels this scan when set, e.g. from a
    /// ctrl-c handler.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Waits for the scan to finish (or to observe cancellation) and
    /// returns the collected rows.
    pub fn join(mut self) -> Vec<ObjectRow> {
        match self.worker.take() {
            Some(worker) => match worker.join() {
                Ok(rows) => rows,
                Err(_) => {
                    error!("Scan worker panicked");
                    Vec::new()
                },
            },
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};

    use super::*;
    use crate::query::{parse_query_conditions, CompareOp};

    fn test_observer() -> ObserverContext {
        ObserverContext {
            latitude: 37.0,
            longitude: -122.0,
            time: FixedOffset::west_opt(8 * 3600).unwrap()
                .with_ymd_and_hms(2024, 3, 7, 23, 56, 0).unwrap(),
        }
    }

    fn record(name: &str, ra: &str, dec: &str, catalog: &str) -> CatalogRecord {
        CatalogRecord {
            name: name.to_string(),
            alt_name: String::new(),
            ra: ra.to_string(),
            dec: dec.to_string(),
            object_type: "Galaxy".to_string(),
            magnitude: "8.0".to_string(),
            info: String::new(),
            catalog: catalog.to_string(),
        }
    }

    #[test]
    fn test_horizon_filter() {
        // At latitude 37N an object at Dec +89 is circumpolar and one at
        // Dec -89 never rises.
        let records = vec![record("up", "10.0", "89.0", "NGC"),
                           record("down", "10.0", "-89.0", "NGC")];
        let rows = scan_catalog(&records, &test_observer(), &[], &[], None,
                                &AtomicBool::new(false));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "up");
    }

    #[test]
    fn test_catalog_allowlist_and_ordering() {
        let records = vec![
            record("a", "10.0", "89.0", "NGC"),
            record("b", "20.0", "89.0", "IC"),
            record("c", "30.0", "89.0", " NGC "),  // Label gets trimmed.
            record("d", "40.0", "89.0", "Messier"),
            record("e", "50.0", "89.0", "NGC"),
        ];
        let filters = vec!["NGC".to_string()];
        let rows = scan_catalog(&records, &test_observer(), &filters, &[],
                                None, &AtomicBool::new(false));
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["a", "c", "e"]);
    }

    #[test]
    fn test_malformed_ra_dec_skipped() {
        let records = vec![record("bad_ra", "n/a", "89.0", "NGC"),
                           record("bad_dec", "10.0", "", "NGC"),
                           record("good", "10.0", "89.0", "NGC")];
        let rows = scan_catalog(&records, &test_observer(), &[], &[], None,
                                &AtomicBool::new(false));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "good");
    }

    #[test]
    fn test_conditions_applied_to_rows() {
        let records = vec![record("m", "10.0", "89.0", "Messier"),
                           record("n", "20.0", "89.0", "NGC")];
        let conditions = parse_query_conditions(
            "catalog = 'Messier'", &valid_columns()).unwrap();
        let rows = scan_catalog(&records, &test_observer(), &[], &conditions,
                                None, &AtomicBool::new(false));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "m");
        assert_eq!(rows[0].catalog, "Messier");
    }

    #[test]
    fn test_row_formatting() {
        let records = vec![record("m", "200.98125", "54.93", "NGC")];
        let rows = scan_catalog(&records, &test_observer(), &[], &[], None,
                                &AtomicBool::new(false));
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.ra, "13:23:55");
        assert_eq!(row.dec, "54.93°");
        assert_eq!(row.before_after, "After");
        assert!(row.altitude.ends_with('°'));
        assert!(row.azimuth.ends_with('°'));
        // All columns are present and resolvable by name.
        for column in COLUMNS {
            assert!(row.value(column).is_some(), "missing {}", column);
        }
        assert_eq!(row.values().len(), COLUMNS.len());
    }

    #[test]
    fn test_progress_and_cancellation() {
        let mut records = Vec::new();
        for i in 0..1000 {
            records.push(record(&format!("obj{}", i), "10.0", "89.0", "NGC"));
        }
        let cancel = Arc::new(AtomicBool::new(false));
        // Cancel as soon as the first progress report (100 records) lands.
        // The flag is shared because ProgressFn callbacks must be 'static.
        let progress_cancel = cancel.clone();
        let progress: Arc<ProgressFn> = Arc::new(move |percent| {
            assert!((0..=100).contains(&percent));
            progress_cancel.store(true, Ordering::Relaxed);
        });
        let rows = scan_catalog(&records, &test_observer(), &[], &[],
                                Some(progress.as_ref()), &cancel);
        assert!(!rows.is_empty());
        assert!(rows.len() <= 150);
        // No row beyond the cancellation point appears, and order holds.
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.name, format!("obj{}", i));
        }
    }

    #[test]
    fn test_end_to_end_pole_object() {
        // A pole object is never below the horizon for an equatorial
        // observer, whatever the time.
        let records = vec![record("Polaris-ish", "0.0", "90.0", "NGC")];
        let observer = ObserverContext {
            latitude: 0.0,
            longitude: 0.0,
            time: FixedOffset::east_opt(0).unwrap()
                .with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap(),
        };
        let filters = vec!["NGC".to_string()];
        let rows = scan_catalog(&records, &observer, &filters, &[], None,
                                &AtomicBool::new(false));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value("Catalog"), Some("NGC"));
    }

    #[test]
    fn test_sort_rows() {
        let records = vec![record("b", "10.0", "89.0", "NGC"),
                           record("a", "20.0", "89.0", "NGC"),
                           record("c", "30.0", "89.0", "NGC")];
        let mut rows = scan_catalog(&records, &test_observer(), &[], &[],
                                    None, &AtomicBool::new(false));
        sort_rows(&mut rows, "Name", /*reverse=*/false);
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        sort_rows(&mut rows, "Name", /*reverse=*/true);
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["c", "b", "a"]);
    }

    #[test]
    fn test_sort_column_resolution() {
        // Sort columns are named case-insensitively and resolve to their
        // canonical display form.
        let columns = valid_columns();
        assert_eq!(columns.get("time to transit").map(String::as_str),
                   Some("Time to Transit"));
        assert_eq!(columns.get("before/after").map(String::as_str),
                   Some("Before/After"));
        assert!(!columns.contains_key("transit"));
    }

    #[test]
    fn test_scan_engine_worker() {
        let mut records = Vec::new();
        for i in 0..500 {
            records.push(record(&format!("obj{}", i), "10.0", "89.0", "NGC"));
        }
        let session = SearchSession {
            records,
            catalog_filters: vec![],
            conditions: parse_query_conditions(
                "altitude > 0", &valid_columns()).unwrap(),
            observer: test_observer(),
            progress_callback: None,
        };
        assert_eq!(session.conditions[0].op, CompareOp::Gt);
        let engine = ScanEngine::start(session);
        let rows = engine.join();
        assert_eq!(rows.len(), 500);
    }

    #[test]
    fn test_scan_engine_cancel() {
        // An engine cancelled before its worker gets far returns a partial
        // (possibly empty) result rather than an error.
        let mut records = Vec::new();
        for i in 0..50_000 {
            records.push(record(&format!("obj{}", i), "10.0", "89.0", "NGC"));
        }
        let session = SearchSession {
            records,
            catalog_filters: vec![],
            conditions: vec![],
            observer: test_observer(),
            progress_callback: None,
        };
        let engine = ScanEngine::start(session);
        engine.cancel();
        let rows = engine.join();
        assert!(rows.len() <= 50_000);
    }
}  // mod tests.
