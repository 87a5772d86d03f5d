use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, field, info};

use crate::{
    club::{ClubRecord, Snapshot},
    sink::Registration,
};

use super::{Sink, SinkConfig, SinkResult};

#[derive(Error, Debug)]
enum Error {
    #[error("failed to open file {1}: {0}")]
    Open(#[source] std::io::Error, PathBuf),

    #[error("failed to write: {0}")]
    Write(#[source] csv::Error),
}

#[derive(Serialize, Debug, PartialEq)]
struct Row<'a> {
    timestamp: &'a str,

    address: String,

    occupancy: i64,
}

impl<'a> Row<'a> {
    fn new(timestamp: &'a str, club: &ClubRecord) -> Self {
        Self {
            timestamp,
            address: club.address.to_lowercase(),
            occupancy: club.occupancy,
        }
    }
}

/// Opens `path` for appending (creating it if needed), writes a single row
/// and closes it again, so rows already written survive a later failure.
fn append(path: &Path, row: &Row) -> Result<(), Error> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::Open(e, path.to_path_buf()))?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    writer.serialize(row).map_err(Error::Write)?;
    writer.flush().map_err(|e| Error::Write(e.into()))?;

    Ok(())
}

struct FileSink {
    path: PathBuf,
}

impl Sink for FileSink {
    fn write(&self, snapshot: &Snapshot) -> SinkResult<()> {
        let timestamp = snapshot.taken_at.to_string();
        let mut written = 0;
        let mut failed = 0;

        for club in snapshot.iter() {
            match append(&self.path, &Row::new(&timestamp, club)) {
                Ok(()) => written += 1,
                Err(e) => {
                    failed += 1;
                    error!(
                        address = club.address.as_str(),
                        error = field::display(&e),
                        "error while writing to output"
                    );
                }
            }
        }

        info!(
            path = field::display(self.path.display()),
            written, failed, "appended rows to output file"
        );

        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct Config {
    path: PathBuf,
}

impl SinkConfig for Config {
    fn build(self) -> SinkResult<Box<dyn Sink>> {
        Ok(Box::new(FileSink { path: self.path }))
    }
}

inventory::submit! {
    Registration::new::<Config>("file")
}

#[cfg(test)]
mod test {
    use std::{fs::OpenOptions, io::ErrorKind, path::Path};

    use chrono::TimeZone;
    use chrono_tz::Europe::Warsaw;
    use tempfile::TempDir;

    use super::{append, Error, FileSink, Row};
    use crate::{
        club::{club, Snapshot},
        sink::Sink,
    };

    fn row() -> Row<'static> {
        Row::new("2024-01-15 12:00:00 CET", &club("123 Gym St", None, 10))
    }

    /// Returns false when the file stays writable anyway (running as root).
    fn make_read_only(path: &Path) -> bool {
        let mut permissions = std::fs::metadata(path).unwrap().permissions();
        permissions.set_readonly(true);
        std::fs::set_permissions(path, permissions).unwrap();

        OpenOptions::new().append(true).open(path).is_err()
    }

    #[test]
    fn test_append_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output.csv");

        append(&path, &row()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "2024-01-15 12:00:00 CET,123 gym st,10\n");
    }

    #[test]
    fn test_append_never_deduplicates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output.csv");
        let row_len = "2024-01-15 12:00:00 CET,123 gym st,10\n".len() as u64;

        for _ in 0..3 {
            append(&path, &row()).unwrap();
        }

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 3 * row_len);
    }

    #[test]
    fn test_append_keeps_existing_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output.csv");
        std::fs::write(&path, "header\n").unwrap();

        append(&path, &row()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("header\n"));
        assert!(content.ends_with(",123 gym st,10\n"));
    }

    #[test]
    fn test_append_missing_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("output.csv");

        let err = append(&path, &row()).unwrap_err();
        assert!(matches!(err, Error::Open(ref e, _) if e.kind() == ErrorKind::NotFound));
    }

    #[test]
    fn test_append_read_only_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output.csv");
        std::fs::write(&path, "").unwrap();

        if !make_read_only(&path) {
            return;
        }

        let err = append(&path, &row()).unwrap_err();
        assert!(matches!(err, Error::Open(ref e, _) if e.kind() == ErrorKind::PermissionDenied));
    }

    #[test]
    fn test_quotes_delimiter_in_address() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output.csv");

        append(&path, &Row::new("ts", &club("Main St, 5", None, 1))).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "ts,\"main st, 5\",1\n");
    }

    #[test]
    fn test_write_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output.csv");
        let sink = FileSink { path: path.clone() };

        let taken_at = Warsaw.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let snapshot = Snapshot::new(
            taken_at,
            vec![
                club("Wrocławska 1", Some("A"), 7),
                club("Korfantego 2", None, 0),
            ],
        );

        sink.write(&snapshot).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "2024-01-15 12:00:00 CET,wrocławska 1,7\n2024-01-15 12:00:00 CET,korfantego 2,0\n"
        );
    }

    #[test]
    fn test_write_failures_are_not_fatal() {
        let dir = TempDir::new().unwrap();
        let sink = FileSink {
            path: dir.path().join("missing").join("output.csv"),
        };

        let taken_at = Warsaw.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let snapshot = Snapshot::new(
            taken_at,
            vec![club("123 Gym St", None, 10), club("1 Pool Rd", None, 3)],
        );

        assert!(sink.write(&snapshot).is_ok());
    }

    #[test]
    fn test_failed_rows_keep_written_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output.csv");
        let sink = FileSink { path: path.clone() };
        let taken_at = Warsaw.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();

        sink.write(&Snapshot::new(taken_at, vec![club("123 Gym St", None, 10)]))
            .unwrap();

        if !make_read_only(&path) {
            return;
        }

        let later = Snapshot::new(
            taken_at,
            vec![club("123 Gym St", None, 11), club("1 Pool Rd", None, 3)],
        );
        assert!(sink.write(&later).is_ok());

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "2024-01-15 12:00:00 CET,123 gym st,10\n");
    }
}
