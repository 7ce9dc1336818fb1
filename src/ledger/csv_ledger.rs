//! Append-only CSV storage of measurements, one file per entity kind.
//!
//! Each file starts with a header row and then holds one row per
//! (entity, timestamp). The ledger is also the source of truth for watermarks:
//! the first lookup on a file scans it once and keeps the latest timestamp of
//! every entity in memory; appends keep that index current.

use crate::ledger::error::LedgerError;
use crate::ledger::frame::LedgerFrame;
use crate::types::device::EntityKind;
use crate::types::error::DataError;
use crate::types::measurement::{ensure_increasing, from_unix, MeasureRow, Watermark};
use crate::types::metric::Metric;
use crate::utils::{ensure_dir_exists, get_data_dir};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const DEVICE_FILE_NAME: &str = "netatmo_station.csv";
pub const MODULE_FILE_NAME: &str = "netatmo_module.csv";

/// Metric columns of the station file, in order.
pub const DEVICE_COLUMNS: [Metric; 5] = [
    Metric::Temperature,
    Metric::Co2,
    Metric::Humidity,
    Metric::Noise,
    Metric::Pressure,
];
/// Metric columns of the module file, in order.
pub const MODULE_COLUMNS: [Metric; 3] = [Metric::Temperature, Metric::Co2, Metric::Humidity];

pub(crate) const DELIMITER: u8 = b';';
pub(crate) const TIMESTAMP_COLUMN: &str = "Timestamp";
pub(crate) const DATETIME_COLUMN: &str = "DateTime";
pub(crate) const ENTITY_COLUMN: &str = "EntityId";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Durable store of every measurement fetched so far.
///
/// # Examples
///
/// ```no_run
/// use netatmo_ledger::{CsvLedger, EntityKind};
///
/// # fn main() -> Result<(), netatmo_ledger::LedgerError> {
/// let mut ledger = CsvLedger::open("netatmo-data")?;
/// let last = ledger.last_timestamp(EntityKind::Device, "70:ee:50:aa:aa:aa")?;
/// println!("already stored up to {:?}", last);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CsvLedger {
    dir: PathBuf,
    devices: LedgerFile,
    modules: LedgerFile,
}

#[derive(Debug)]
struct LedgerFile {
    path: PathBuf,
    columns: &'static [Metric],
    // Latest timestamp per entity; `None` until the file has been scanned.
    index: Option<HashMap<String, i64>>,
}

impl CsvLedger {
    /// Opens (creating the directory if needed) a ledger in `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let dir = dir.into();
        ensure_dir_exists(&dir).map_err(|e| LedgerError::DirCreation(dir.clone(), e))?;
        Ok(Self {
            devices: LedgerFile::new(dir.join(DEVICE_FILE_NAME), &DEVICE_COLUMNS),
            modules: LedgerFile::new(dir.join(MODULE_FILE_NAME), &MODULE_COLUMNS),
            dir,
        })
    }

    /// Opens the ledger in the platform data directory (e.g. `~/.local/share/netatmo`).
    pub fn open_default() -> Result<Self, LedgerError> {
        let dir = get_data_dir().ok_or(LedgerError::DataDirResolution)?;
        Self::open(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, kind: EntityKind) -> &Path {
        &self.file(kind).path
    }

    /// Metric columns stored for entities of `kind`.
    pub fn columns(kind: EntityKind) -> &'static [Metric] {
        match kind {
            EntityKind::Device => &DEVICE_COLUMNS,
            EntityKind::Module => &MODULE_COLUMNS,
        }
    }

    /// Latest stored timestamp of `entity_id`, or `None` if it has no rows yet.
    ///
    /// # Errors
    ///
    /// [`DataError::CorruptLedger`] (wrapped) if the file does not have the expected format.
    pub fn last_timestamp(
        &mut self,
        kind: EntityKind,
        entity_id: &str,
    ) -> Result<Option<DateTime<Utc>>, LedgerError> {
        let last = self.file_mut(kind).last(entity_id)?;
        Ok(last.map(from_unix).transpose()?)
    }

    pub fn watermark(
        &mut self,
        kind: EntityKind,
        entity_id: &str,
    ) -> Result<Option<Watermark>, LedgerError> {
        Ok(self
            .last_timestamp(kind, entity_id)?
            .map(|last_timestamp| Watermark {
                entity_id: entity_id.to_string(),
                last_timestamp,
            }))
    }

    /// Appends `rows` for `entity_id` and returns how many were written.
    ///
    /// Rows must be strictly increasing and strictly after the entity's watermark.
    /// Either every row reaches the file or none does.
    pub fn append(
        &mut self,
        kind: EntityKind,
        entity_id: &str,
        rows: &[MeasureRow],
    ) -> Result<usize, LedgerError> {
        self.file_mut(kind).append(entity_id, rows)
    }

    /// The history of one entity kind as a lazy polars frame.
    pub fn frame(&self, kind: EntityKind) -> Result<LedgerFrame, LedgerError> {
        let path = &self.file(kind).path;
        if !path.exists() {
            return Err(LedgerError::Read(
                path.clone(),
                io::Error::from(io::ErrorKind::NotFound),
            ));
        }
        LedgerFrame::scan(path).map_err(|e| LedgerError::FrameScan(path.clone(), e))
    }

    fn file(&self, kind: EntityKind) -> &LedgerFile {
        match kind {
            EntityKind::Device => &self.devices,
            EntityKind::Module => &self.modules,
        }
    }

    fn file_mut(&mut self, kind: EntityKind) -> &mut LedgerFile {
        match kind {
            EntityKind::Device => &mut self.devices,
            EntityKind::Module => &mut self.modules,
        }
    }
}

impl LedgerFile {
    fn new(path: PathBuf, columns: &'static [Metric]) -> Self {
        Self {
            path,
            columns,
            index: None,
        }
    }

    fn header(&self) -> Vec<&'static str> {
        [TIMESTAMP_COLUMN, DATETIME_COLUMN, ENTITY_COLUMN]
            .into_iter()
            .chain(self.columns.iter().map(Metric::api_name))
            .collect()
    }

    fn index(&mut self) -> Result<&mut HashMap<String, i64>, LedgerError> {
        if self.index.is_none() {
            let scanned = self.scan()?;
            debug!(
                "Indexed {} entities from {}",
                scanned.len(),
                self.path.display()
            );
            self.index = Some(scanned);
        }
        Ok(self.index.get_or_insert_with(HashMap::new))
    }

    fn last(&mut self, entity_id: &str) -> Result<Option<i64>, LedgerError> {
        Ok(self.index()?.get(entity_id).copied())
    }

    fn corrupt(&self, line: u64, reason: impl Into<String>) -> LedgerError {
        LedgerError::Data(DataError::CorruptLedger {
            path: self.path.clone(),
            line,
            reason: reason.into(),
        })
    }

    fn csv_error(&self, err: csv::Error) -> LedgerError {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        match err.into_kind() {
            csv::ErrorKind::Io(e) => LedgerError::Read(self.path.clone(), e),
            csv::ErrorKind::UnequalLengths {
                expected_len, len, ..
            } => self.corrupt(line, format!("{} fields, expected {}", len, expected_len)),
            other => self.corrupt(line, format!("{:?}", other)),
        }
    }

    /// Reads the whole file and returns the latest timestamp per entity.
    fn scan(&self) -> Result<HashMap<String, i64>, LedgerError> {
        let mut latest = HashMap::new();
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(latest),
            Err(e) => return Err(LedgerError::Read(self.path.clone(), e)),
        };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(false)
            .from_reader(file);

        let mut records = reader.records();
        let header = match records.next() {
            None => return Ok(latest),
            Some(header) => header.map_err(|e| self.csv_error(e))?,
        };
        let expected = self.header();
        if header.iter().ne(expected.iter().copied()) {
            return Err(self.corrupt(
                1,
                format!(
                    "header '{}' does not match '{}'",
                    header.iter().collect::<Vec<_>>().join(";"),
                    expected.join(";")
                ),
            ));
        }

        for record in records {
            let record = record.map_err(|e| self.csv_error(e))?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let timestamp = record
                .get(0)
                .and_then(|t| t.parse::<i64>().ok())
                .ok_or_else(|| self.corrupt(line, "timestamp is not a number"))?;
            let entity_id = record.get(2).unwrap_or_default();
            if entity_id.is_empty() {
                return Err(self.corrupt(line, "missing entity id"));
            }
            match latest.get(entity_id) {
                Some(&previous) if timestamp <= previous => {
                    return Err(self.corrupt(
                        line,
                        format!(
                            "timestamp {} for '{}' does not follow {}",
                            timestamp, entity_id, previous
                        ),
                    ));
                }
                _ => {
                    latest.insert(entity_id.to_string(), timestamp);
                }
            }
        }
        Ok(latest)
    }

    fn record(&self, entity_id: &str, row: &MeasureRow) -> Vec<String> {
        let mut record = Vec::with_capacity(3 + self.columns.len());
        record.push(row.timestamp.timestamp().to_string());
        record.push(row.timestamp.format(DATETIME_FORMAT).to_string());
        record.push(entity_id.to_string());
        for metric in self.columns {
            record.push(row.get(*metric).map(|v| v.to_string()).unwrap_or_default());
        }
        record
    }

    fn encode(
        &self,
        with_header: bool,
        entity_id: &str,
        rows: &[MeasureRow],
    ) -> Result<Vec<u8>, LedgerError> {
        let encode_error = |e: csv::Error| LedgerError::Encode(self.path.clone(), e);
        let mut writer = csv::WriterBuilder::new()
            .delimiter(DELIMITER)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        if with_header {
            writer.write_record(self.header()).map_err(encode_error)?;
        }
        for row in rows {
            writer
                .write_record(self.record(entity_id, row))
                .map_err(encode_error)?;
        }
        writer
            .into_inner()
            .map_err(|e| LedgerError::Write(self.path.clone(), e.into_error()))
    }

    fn append(&mut self, entity_id: &str, rows: &[MeasureRow]) -> Result<usize, LedgerError> {
        self.append_with(entity_id, rows, |path| {
            OpenOptions::new().create(true).append(true).open(path)
        })
    }

    fn append_with<S: LedgerSink>(
        &mut self,
        entity_id: &str,
        rows: &[MeasureRow],
        open: impl FnOnce(&Path) -> io::Result<S>,
    ) -> Result<usize, LedgerError> {
        let Some(last_row) = rows.last() else {
            return Ok(0);
        };
        let watermark = self.last(entity_id)?.map(from_unix).transpose()?;
        ensure_increasing(entity_id, watermark, rows)?;

        let write_error = |e: io::Error| LedgerError::Write(self.path.clone(), e);
        let mut sink = open(&self.path).map_err(write_error)?;
        let previous_len = sink.size().map_err(write_error)?;
        let buffer = self.encode(previous_len == 0, entity_id, rows)?;

        if let Err(e) = write_synced(&mut sink, &buffer) {
            if let Err(rollback) = sink.truncate(previous_len) {
                warn!(
                    "Failed to roll back {} to {} bytes: {}",
                    self.path.display(),
                    previous_len,
                    rollback
                );
            }
            return Err(write_error(e));
        }

        let last = last_row.timestamp.timestamp();
        self.index()?.insert(entity_id.to_string(), last);
        info!(
            "Appended {} rows for {} to {}",
            rows.len(),
            entity_id,
            self.path.display()
        );
        Ok(rows.len())
    }
}

/// File operations an append relies on.
trait LedgerSink: Write {
    fn size(&self) -> io::Result<u64>;
    fn sync(&mut self) -> io::Result<()>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LedgerSink for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

fn write_synced(sink: &mut impl LedgerSink, buffer: &[u8]) -> io::Result<()> {
    sink.write_all(buffer)?;
    sink.flush()?;
    sink.sync()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    const STATION: &str = "70:ee:50:aa:aa:aa";

    fn row(seconds: i64, temperature: f64) -> MeasureRow {
        MeasureRow::new(
            from_unix(seconds).unwrap(),
            BTreeMap::from([
                (Metric::Temperature, Some(temperature)),
                (Metric::Humidity, Some(51.0)),
                (Metric::Co2, None),
            ]),
        )
    }

    fn ledger() -> (TempDir, CsvLedger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = CsvLedger::open(dir.path().join("ledger")).unwrap();
        (dir, ledger)
    }

    #[test]
    fn test_header_written_once() -> Result<(), LedgerError> {
        let (_dir, mut ledger) = ledger();
        assert_eq!(ledger.last_timestamp(EntityKind::Device, STATION)?, None);

        ledger.append(EntityKind::Device, STATION, &[row(1_577_836_800, 20.5)])?;
        ledger.append(EntityKind::Device, STATION, &[row(1_577_837_100, 20.75)])?;

        let content = std::fs::read_to_string(ledger.path(EntityKind::Device)).unwrap();
        assert_eq!(
            content,
            "Timestamp;DateTime;EntityId;Temperature;CO2;Humidity;Noise;Pressure\n\
             1577836800;2020-01-01 00:00:00;70:ee:50:aa:aa:aa;20.5;;51;;\n\
             1577837100;2020-01-01 00:05:00;70:ee:50:aa:aa:aa;20.75;;51;;\n"
        );
        Ok(())
    }

    #[test]
    fn test_watermark_survives_reopen() -> Result<(), LedgerError> {
        let (dir, mut ledger) = ledger();
        ledger.append(EntityKind::Module, "03:00:00:bb:bb:bb", &[row(100, 1.0), row(200, 2.0)])?;
        ledger.append(EntityKind::Module, "03:00:00:cc:cc:cc", &[row(150, 1.0)])?;

        let mut reopened = CsvLedger::open(dir.path().join("ledger"))?;
        assert_eq!(
            reopened.last_timestamp(EntityKind::Module, "03:00:00:bb:bb:bb")?,
            Some(from_unix(200).unwrap())
        );
        assert_eq!(
            reopened
                .watermark(EntityKind::Module, "03:00:00:cc:cc:cc")?
                .map(|w| w.last_timestamp),
            Some(from_unix(150).unwrap())
        );
        // Kinds are stored separately.
        assert_eq!(reopened.last_timestamp(EntityKind::Device, "03:00:00:bb:bb:bb")?, None);
        Ok(())
    }

    #[test]
    fn test_append_rejects_rows_at_or_before_watermark() -> Result<(), LedgerError> {
        let (_dir, mut ledger) = ledger();
        ledger.append(EntityKind::Device, STATION, &[row(100, 1.0)])?;
        let before = std::fs::read(ledger.path(EntityKind::Device)).unwrap();

        let err = ledger
            .append(EntityKind::Device, STATION, &[row(100, 1.0), row(200, 2.0)])
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Data(DataError::NonMonotonic { previous: 100, found: 100, .. })
        ));
        assert_eq!(std::fs::read(ledger.path(EntityKind::Device)).unwrap(), before);
        assert_eq!(
            ledger.last_timestamp(EntityKind::Device, STATION)?,
            Some(from_unix(100).unwrap())
        );
        Ok(())
    }

    #[test]
    fn test_empty_append_creates_nothing() -> Result<(), LedgerError> {
        let (_dir, mut ledger) = ledger();
        assert_eq!(ledger.append(EntityKind::Device, STATION, &[])?, 0);
        assert!(!ledger.path(EntityKind::Device).exists());
        Ok(())
    }

    fn corrupt_with(content: &str) -> LedgerError {
        let (_dir, mut ledger) = ledger();
        std::fs::write(ledger.path(EntityKind::Device), content).unwrap();
        ledger
            .last_timestamp(EntityKind::Device, STATION)
            .unwrap_err()
    }

    const HEADER: &str = "Timestamp;DateTime;EntityId;Temperature;CO2;Humidity;Noise;Pressure\n";

    #[test]
    fn test_corruption_is_reported() {
        let cases = [
            "Timestamp;DateTime;Temperature\n1;x;2\n".to_string(),
            format!("{HEADER}abc;2020-01-01 00:00:00;{STATION};1;;;;\n"),
            format!(
                "{HEADER}100;2020-01-01 00:00:00;{STATION};1;;;;\n\
                 100;2020-01-01 00:00:00;{STATION};1;;;;\n"
            ),
            format!("{HEADER}100;2020-01-01 00:00:00;{STATION};1;;;;\n200;2020-01-01 00:0"),
        ];
        for content in cases {
            let err = corrupt_with(&content);
            assert!(
                matches!(err, LedgerError::Data(DataError::CorruptLedger { .. })),
                "{content:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_corrupt_line_number() {
        let content = format!(
            "{HEADER}100;2020-01-01 00:00:00;{STATION};1;;;;\n\
             50;2020-01-01 00:00:00;{STATION};1;;;;\n"
        );
        match corrupt_with(&content) {
            LedgerError::Data(DataError::CorruptLedger { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_frame_reads_history() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, mut ledger) = ledger();
        ledger.append(EntityKind::Device, STATION, &[row(100, 1.0), row(200, 2.0), row(300, 3.0)])?;
        ledger.append(EntityKind::Device, "70:ee:50:dd:dd:dd", &[row(150, 9.0)])?;

        let frame = ledger.frame(EntityKind::Device)?;
        assert_eq!(frame.frame.clone().collect()?.height(), 4);

        let station = frame
            .for_entity(STATION)
            .get_range(from_unix(150).unwrap(), from_unix(300).unwrap())
            .frame
            .collect()?;
        assert_eq!(station.height(), 2);
        Ok(())
    }

    /// Writes at most `budget` bytes, then fails like a full disk.
    struct FailingFile {
        file: File,
        budget: usize,
    }

    impl Write for FailingFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::other("no space left on device"));
            }
            let written = self.file.write(&buf[..buf.len().min(self.budget)])?;
            self.budget -= written;
            Ok(written)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.file.flush()
        }
    }

    impl LedgerSink for FailingFile {
        fn size(&self) -> io::Result<u64> {
            self.file.size()
        }

        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn truncate(&mut self, len: u64) -> io::Result<()> {
            self.file.truncate(len)
        }
    }

    #[test]
    fn test_failed_write_is_rolled_back() -> Result<(), LedgerError> {
        let (dir, mut ledger) = ledger();
        ledger.append(EntityKind::Device, STATION, &[row(100, 1.0)])?;
        let path = ledger.path(EntityKind::Device).to_path_buf();
        let before = std::fs::read_to_string(&path).unwrap();

        let err = ledger
            .file_mut(EntityKind::Device)
            .append_with(STATION, &[row(200, 2.0), row(300, 3.0)], |path| {
                let file = OpenOptions::new().append(true).open(path)?;
                Ok(FailingFile { file, budget: 20 })
            })
            .unwrap_err();
        assert!(matches!(err, LedgerError::Write(ref p, _) if *p == path));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
        assert_eq!(
            ledger.last_timestamp(EntityKind::Device, STATION)?,
            Some(from_unix(100).unwrap())
        );

        ledger.append(EntityKind::Device, STATION, &[row(200, 2.0)])?;
        let mut reopened = CsvLedger::open(dir.path().join("ledger"))?;
        assert_eq!(
            reopened.last_timestamp(EntityKind::Device, STATION)?,
            Some(from_unix(200).unwrap())
        );
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 3);
        Ok(())
    }
}
