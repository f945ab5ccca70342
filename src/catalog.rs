// Copyright (c) 2024 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::path::Path;

use canonical_error::{failed_precondition_error, CanonicalError};
use log::info;

// Column headers the catalog CSV must carry, in no particular order.
const REQUIRED_HEADERS: [&str; 8] =
    ["Name", "Alt Name", "RA", "Dec", "Type", "Magnitude", "Info", "Catalog"];

// One catalog entry as read from the source file. All fields are kept as
// raw source strings; RA/Dec are parsed to numbers by the scan pipeline so
// a malformed value skips the record instead of failing the whole load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogRecord {
    pub name: String,
    pub alt_name: String,
    // Right ascension in degrees.
    pub ra: String,
    // Declination in degrees.
    pub dec: String,
    pub object_type: String,
    pub magnitude: String,
    pub info: String,
    pub catalog: String,
}

/// Loads all records from a celestial catalog CSV file. The file must have
/// a header row containing at least `Name, Alt Name, RA, Dec, Type,
/// Magnitude, Info, Catalog`.
///
/// Catalog files are commonly distributed in Latin-1 encoding, so fields
/// are decoded lossily rather than rejecting non-UTF-8 bytes.
pub fn load_catalog(path: &Path) -> Result<Vec<CatalogRecord>, CanonicalError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| failed_precondition_error(
            &format!("Could not open catalog file {:?}: {}", path, e)))?;

    let headers = reader.byte_headers()
        .map_err(|e| failed_precondition_error(
            &format!("Could not read catalog header row: {}", e)))?
        .clone();
    let mut column_index = [0_usize; REQUIRED_HEADERS.len()];
    for (i, header) in REQUIRED_HEADERS.iter().enumerate() {
        match headers.iter().position(|h| h == header.as_bytes()) {
            Some(pos) => column_index[i] = pos,
            None => {
                return Err(failed_precondition_error(
                    &format!("Catalog file {:?} is missing column {:?}",
                             path, header)));
            },
        }
    }

    let field = |record: &csv::ByteRecord, i: usize| -> String {
        match record.get(column_index[i]) {
            Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            None => String::new(),
        }
    };

    let mut records = Vec::<CatalogRecord>::new();
    for result in reader.byte_records() {
        let record = result.map_err(|e| failed_precondition_error(
            &format!("Could not read catalog row: {}", e)))?;
        records.push(CatalogRecord {
            name: field(&record, 0),
            alt_name: field(&record, 1),
            ra: field(&record, 2),
            dec: field(&record, 3),
            object_type: field(&record, 4),
            magnitude: field(&record, 5),
            info: field(&record, 6),
            catalog: field(&record, 7),
        });
    }
    info!("Loaded {} catalog records from {:?}", records.len(), path);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_temp_csv(tag: &str, contents: &[u8]) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("tonightsky_{}_{}.csv", tag, std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    #[test]
    fn test_load_catalog() {
        let path = write_temp_csv(
            "load",
            b"Name,Alt Name,RA,Dec,Type,Magnitude,Info,Catalog\n\
              M31,Andromeda Galaxy,10.684,41.269,Galaxy,3.4,Bright nebula,Messier\n\
              NGC 253,Sculptor Galaxy,11.888,-25.288,Galaxy,7.1,,NGC\n");
        let records = load_catalog(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "M31");
        assert_eq!(records[0].ra, "10.684");
        assert_eq!(records[0].catalog, "Messier");
        assert_eq!(records[1].dec, "-25.288");
        assert_eq!(records[1].info, "");
    }

    #[test]
    fn test_missing_column() {
        let path = write_temp_csv("missing_column",
                                  b"Name,RA,Dec\nM31,10.684,41.269\n");
        let result = load_catalog(&path);
        std::fs::remove_file(&path).unwrap();

        let err = result.unwrap_err();
        assert!(err.message.contains("Alt Name"), "{}", err.message);
    }

    #[test]
    fn test_latin1_field_tolerated() {
        // "Caldwell" info field with a Latin-1 e-acute (0xE9).
        let path = write_temp_csv(
            "latin1",
            b"Name,Alt Name,RA,Dec,Type,Magnitude,Info,Catalog\n\
              C14,,34.75,57.13,Open Cluster,4.3,P\xE9rez notes,Caldwell\n");
        let records = load_catalog(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].catalog, "Caldwell");
        assert!(records[0].info.starts_with('P'));
    }
}  // mod tests.
