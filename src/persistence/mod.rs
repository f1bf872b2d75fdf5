//! CSV Ledger Module
//!
//! Append-only record of every qualifying transaction, one row per alert.

use chrono::{DateTime, SecondsFormat, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::types::{AlertTier, NormalizedTransaction};

/// Column order of the ledger file
pub const LEDGER_HEADER: [&str; 7] = [
    "tier",
    "direction",
    "amount_usd",
    "pool",
    "transaction_id",
    "block_number",
    "timestamp_utc",
];

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger CSV error on {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// One ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub tier: String,
    pub direction: String,
    pub amount_usd: String,
    pub pool: String,
    pub transaction_id: String,
    pub block_number: u64,
    pub timestamp_utc: String,
}

impl LedgerRecord {
    pub fn new(tx: &NormalizedTransaction, tier: AlertTier) -> Self {
        Self {
            tier: tier.to_string(),
            direction: tx.direction.to_string(),
            amount_usd: tx.amount_usd.to_string(),
            pool: tx.pool.clone(),
            transaction_id: tx.id.clone(),
            block_number: tx.block_number,
            timestamp_utc: tx.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp_utc)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }
}

/// Open `path` for appending, creating it (and a header row) when new or empty
fn open_writer(path: &Path) -> Result<csv::Writer<File>, LedgerError> {
    let io_err = |source| LedgerError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let file_has_data = path.exists() && fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;

    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
    if !file_has_data {
        writer
            .write_record(LEDGER_HEADER)
            .map_err(|source| LedgerError::Csv {
                path: path.display().to_string(),
                source,
            })?;
        writer.flush().map_err(io_err)?;
        info!(path = %path.display(), "Created ledger file");
    }
    Ok(writer)
}

/// Appends ledger rows to a single CSV file.
///
/// The file may be unavailable; every append then retries opening it.
pub struct LedgerWriter {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
    rows_written: u64,
}

impl LedgerWriter {
    /// Open `path`, failing if it cannot be created or appended to
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let writer = open_writer(&path)?;
        Ok(Self {
            path,
            writer: Some(writer),
            rows_written: 0,
        })
    }

    /// Like [`LedgerWriter::open`], but an unusable file is logged and opening
    /// is retried on the next append.
    pub fn open_or_defer(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let writer = match open_writer(&path) {
            Ok(writer) => Some(writer),
            Err(e) => {
                warn!(
                    kind = "IOError",
                    error = %e,
                    "Ledger unavailable, alerts continue and appends will retry"
                );
                None
            }
        };
        Self {
            path,
            writer,
            rows_written: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    fn writer(&mut self) -> Result<&mut csv::Writer<File>, LedgerError> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => {
                let writer = open_writer(&self.path)?;
                info!(path = %self.path.display(), "Ledger reopened");
                writer
            }
        };
        Ok(self.writer.insert(writer))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Append and flush one row
    pub fn append(&mut self, tx: &NormalizedTransaction, tier: AlertTier) -> Result<(), LedgerError> {
        let record = LedgerRecord::new(tx, tier);
        let path = self.path.display().to_string();
        let writer = self.writer()?;
        writer
            .serialize(&record)
            .map_err(|source| LedgerError::Csv {
                path: path.clone(),
                source,
            })?;
        writer
            .flush()
            .map_err(|source| LedgerError::Io { path, source })?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), LedgerError> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush().map_err(|source| LedgerError::Io {
                path: self.path.display().to_string(),
                source,
            }),
            None => Ok(()),
        }
    }

    /// Newest `timestamp_utc` in an existing ledger, `None` if absent or empty.
    ///
    /// Rows that fail to parse are skipped.
    pub fn last_timestamp(path: impl AsRef<Path>) -> Result<Option<DateTime<Utc>>, LedgerError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(|source| LedgerError::Csv {
                path: path.display().to_string(),
                source,
            })?;

        let mut latest: Option<DateTime<Utc>> = None;
        let mut skipped = 0usize;
        for row in reader.deserialize::<LedgerRecord>() {
            match row.ok().and_then(|r| r.timestamp()) {
                Some(ts) => latest = Some(latest.map_or(ts, |l| l.max(ts))),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(path = %path.display(), skipped, "Skipped unreadable ledger rows");
        }
        Ok(latest)
    }
}
