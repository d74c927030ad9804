//! Monthly snapshot download and import.
//!
//! The snapshot is a gzip-compressed CSV without header:
//! `ip_start,ip_end,continent,country,state_prov,city,latitude,longitude`.
//!
//! Import is a two-stage pipeline. A blocking thread decompresses and parses
//! the downloaded file and sends fixed-size batches over a bounded channel; the
//! async side inserts each batch into the target table inside one transaction.

use std::io::{BufReader, Read};
use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use csv::StringRecord;
use flate2::read::GzDecoder;
use log::{debug, info, warn};
use sqlx::SqlitePool;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::Retry;

use crate::config::{
    IMPORT_BATCH_SIZE, IMPORT_CHANNEL_CAPACITY, MAX_SNAPSHOT_DOWNLOAD_ATTEMPTS, RETRY_FACTOR,
    RETRY_INITIAL_DELAY_MS, RETRY_MAX_DELAY_SECS,
};
use crate::error_handling::{DatabaseError, IngestionError};
use crate::geoip::{LocationRecord, RangeTable};
use crate::storage::tables::insert_batch;

/// Number of columns in a snapshot row.
const SNAPSHOT_COLUMNS: usize = 8;

/// Expands `{year}` (four digits) and `{month}` (zero-padded) in `template`
/// with the UTC calendar month of `now`.
pub fn snapshot_url(template: &str, now: DateTime<Utc>) -> String {
    template
        .replace("{year}", &format!("{:04}", now.year()))
        .replace("{month}", &format!("{:02}", now.month()))
}

/// Delays between download attempts.
///
/// Exponential backoff capped at `RETRY_MAX_DELAY_SECS`, sized so the
/// initial attempt plus retries equals `MAX_SNAPSHOT_DOWNLOAD_ATTEMPTS`.
pub fn default_retry_delays() -> Vec<Duration> {
    ExponentialBackoff::from_millis(RETRY_INITIAL_DELAY_MS)
        .factor(RETRY_FACTOR)
        .max_delay(Duration::from_secs(RETRY_MAX_DELAY_SECS))
        .take(MAX_SNAPSHOT_DOWNLOAD_ATTEMPTS.saturating_sub(1))
        .collect()
}

/// Where snapshots come from and how downloads are retried.
#[derive(Clone)]
pub struct SnapshotSource {
    client: reqwest::Client,
    url_template: String,
    retry_delays: Vec<Duration>,
}

impl SnapshotSource {
    /// Source expanding `url_template`, with the default retry schedule.
    pub fn new(client: reqwest::Client, url_template: impl Into<String>) -> Self {
        Self {
            client,
            url_template: url_template.into(),
            retry_delays: default_retry_delays(),
        }
    }

    /// Replaces the delays between download attempts.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    /// Snapshot URL for the month of `now`.
    pub fn url_for(&self, now: DateTime<Utc>) -> String {
        snapshot_url(&self.url_template, now)
    }

    /// Downloads `url` into a temporary file, retrying failed attempts.
    ///
    /// The file is removed when the returned handle is dropped.
    pub async fn download(&self, url: &str) -> Result<NamedTempFile, IngestionError> {
        let mut attempt = 0usize;
        Retry::spawn(self.retry_delays.clone(), || {
            attempt += 1;
            let current = attempt;
            async move {
                let result = self.download_once(url).await;
                if let Err(ref e) = result {
                    warn!("Snapshot download attempt {current} failed: {e}");
                }
                result
            }
        })
        .await
    }

    async fn download_once(&self, url: &str) -> Result<NamedTempFile, IngestionError> {
        let mut response = self.client.get(url).send().await?.error_for_status()?;

        let temp = NamedTempFile::new()?;
        let mut file = tokio::fs::File::from_std(temp.reopen()?);
        let mut bytes = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        file.flush().await?;

        debug!("Downloaded {bytes} bytes from {url}");
        Ok(temp)
    }
}

/// Loads the downloaded snapshot into `table` and returns the row count.
///
/// All inserts share one transaction: on any error nothing is committed and
/// the table keeps whatever it held before (empty, during a refresh).
pub async fn import_snapshot(
    pool: &SqlitePool,
    table: RangeTable,
    snapshot: NamedTempFile,
) -> Result<u64, IngestionError> {
    let (sender, mut receiver) = mpsc::channel::<Vec<LocationRecord>>(IMPORT_CHANNEL_CAPACITY);

    let parser = tokio::task::spawn_blocking(move || -> Result<(), IngestionError> {
        let file = snapshot.reopen()?;
        parse_snapshot(file, sender)
    });

    let mut tx = pool.begin().await.map_err(DatabaseError::from)?;
    let mut rows = 0u64;
    let mut insert_result: Result<(), IngestionError> = Ok(());
    while let Some(batch) = receiver.recv().await {
        if let Err(e) = insert_batch(&mut *tx, table, &batch).await {
            insert_result = Err(DatabaseError::from(e).into());
            break;
        }
        rows += batch.len() as u64;
    }
    // Unblocks the parser if we stopped early
    drop(receiver);

    let parse_result = parser
        .await
        .map_err(|e| IngestionError::ParserTask(e.to_string()))?;
    insert_result?;
    parse_result?;

    if rows == 0 {
        return Err(IngestionError::EmptySnapshot);
    }

    tx.commit().await.map_err(DatabaseError::from)?;
    info!("Imported {rows} rows into {table}");
    Ok(rows)
}

/// Decompresses and parses a snapshot, sending batches of at most
/// `IMPORT_BATCH_SIZE` records to `sender`.
///
/// Blocking: call from a blocking thread. Returns early without error when
/// the receiving side has gone away.
pub(crate) fn parse_snapshot<R: Read>(
    reader: R,
    sender: mpsc::Sender<Vec<LocationRecord>>,
) -> Result<(), IngestionError> {
    let decoder = GzDecoder::new(BufReader::new(reader));
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(decoder);

    let mut batch = Vec::with_capacity(IMPORT_BATCH_SIZE);
    let mut raw = StringRecord::new();
    while csv_reader.read_record(&mut raw)? {
        let line = raw.position().map(|p| p.line()).unwrap_or_default();
        batch.push(parse_row(&raw, line)?);

        if batch.len() == IMPORT_BATCH_SIZE {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(IMPORT_BATCH_SIZE));
            if sender.blocking_send(full).is_err() {
                return Ok(());
            }
        }
    }

    if !batch.is_empty() {
        let _ = sender.blocking_send(batch);
    }
    Ok(())
}

fn parse_row(raw: &StringRecord, line: u64) -> Result<LocationRecord, IngestionError> {
    if raw.len() != SNAPSHOT_COLUMNS {
        return Err(IngestionError::MalformedRow {
            line,
            reason: format!("expected {SNAPSHOT_COLUMNS} columns, found {}", raw.len()),
        });
    }

    Ok(LocationRecord {
        ip_start: parse_address(raw, 0, line)?,
        ip_end: parse_address(raw, 1, line)?,
        continent: text_field(raw, 2),
        country: text_field(raw, 3),
        state_prov: text_field(raw, 4),
        city: text_field(raw, 5),
        latitude: coordinate(raw, 6, line)?,
        longitude: coordinate(raw, 7, line)?,
    })
}

/// Field text with `null` and empty both loaded as the empty string.
fn text_field(raw: &StringRecord, index: usize) -> String {
    match raw.get(index).map(str::trim) {
        None | Some("") | Some("null") => String::new(),
        Some(value) => value.to_string(),
    }
}

fn parse_address(raw: &StringRecord, index: usize, line: u64) -> Result<IpAddr, IngestionError> {
    let value = text_field(raw, index);
    value
        .parse::<IpAddr>()
        .map(|ip| ip.to_canonical())
        .map_err(|_| IngestionError::MalformedRow {
            line,
            reason: format!("invalid address '{value}'"),
        })
}

fn coordinate(raw: &StringRecord, index: usize, line: u64) -> Result<f64, IngestionError> {
    let value = text_field(raw, index);
    if value.is_empty() {
        return Ok(0.0);
    }
    value.parse::<f64>().map_err(|_| IngestionError::MalformedRow {
        line,
        reason: format!("invalid coordinate '{value}'"),
    })
}
