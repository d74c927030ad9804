//! Dataset data structures.
//!
//! This module defines the bookkeeping record that names the serving table,
//! the rows stored in the range tables and the DTO returned to callers.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display as DisplayMacro, EnumIter as EnumIterMacro};

use crate::config::{TABLE_ONE, TABLE_TWO};

/// One of the two interchangeable physical range tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeTable {
    /// `ip_to_city_one`
    One,
    /// `ip_to_city_two`
    Two,
}

impl RangeTable {
    /// Physical table name.
    pub fn name(self) -> &'static str {
        match self {
            RangeTable::One => TABLE_ONE,
            RangeTable::Two => TABLE_TWO,
        }
    }

    /// Name of the index on `ip_start_key`.
    pub fn index_name(self) -> &'static str {
        match self {
            RangeTable::One => "ip_to_city_one_ip_start_idx",
            RangeTable::Two => "ip_to_city_two_ip_start_idx",
        }
    }

    /// The table that is not `self`.
    pub fn other(self) -> RangeTable {
        match self {
            RangeTable::One => RangeTable::Two,
            RangeTable::Two => RangeTable::One,
        }
    }
}

impl fmt::Display for RangeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RangeTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            TABLE_ONE => Ok(RangeTable::One),
            TABLE_TWO => Ok(RangeTable::Two),
            other => Err(format!("unknown range table '{other}'")),
        }
    }
}

/// The refresh bookkeeping record.
///
/// Values are immutable: a swap builds a new record and publishes it whole,
/// so readers never see the table names half-updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetMetadata {
    /// When the active table was last rebuilt (UTC)
    pub last_update: DateTime<Utc>,
    /// Table serving lookups
    pub active_table: RangeTable,
    /// Table rebuilt by the next refresh
    pub backup_table: RangeTable,
}

impl DatasetMetadata {
    /// Builds a record serving from `active_table`; the backup is the other table.
    pub fn new(last_update: DateTime<Utc>, active_table: RangeTable) -> Self {
        Self {
            last_update,
            active_table,
            backup_table: active_table.other(),
        }
    }

    /// Builds a record from stored table names, rejecting unknown names and
    /// an active table equal to the backup table.
    pub fn from_names(
        last_update: DateTime<Utc>,
        active_table: &str,
        backup_table: &str,
    ) -> Result<Self, String> {
        let active = active_table.parse::<RangeTable>()?;
        let backup = backup_table.parse::<RangeTable>()?;
        if active == backup {
            return Err(format!("active and backup table are both '{active}'"));
        }
        Ok(Self {
            last_update,
            active_table: active,
            backup_table: backup,
        })
    }

    /// The record after a successful refresh: roles exchanged, `last_update = now`.
    pub fn swapped(&self, now: DateTime<Utc>) -> Self {
        Self {
            last_update: now,
            active_table: self.backup_table,
            backup_table: self.active_table,
        }
    }

    /// True when the dataset was refreshed in the same UTC calendar month as `now`.
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.last_update.year() == now.year() && self.last_update.month() == now.month()
    }
}

impl Default for DatasetMetadata {
    /// The seeded state of a fresh database: never refreshed, serving table one.
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH, RangeTable::One)
    }
}

/// One row of a range table.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationRecord {
    /// First address of the range
    pub ip_start: IpAddr,
    /// Last address of the range
    pub ip_end: IpAddr,
    /// Two-letter continent code
    pub continent: String,
    /// ISO 3166-1 alpha-2 country code
    pub country: String,
    /// State or province name
    pub state_prov: String,
    /// City name
    pub city: String,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

/// Location returned to callers, also the cached value format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpInfo {
    /// The queried address in canonical text form
    pub ip: String,
    /// Two-letter continent code
    pub continent: String,
    /// ISO 3166-1 alpha-2 country code
    pub country: String,
    /// State or province name
    pub state_prov: String,
    /// City name
    pub city: String,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

impl IpInfo {
    /// Answer for `ip` from the range `record` that covers it.
    pub fn from_record(ip: IpAddr, record: LocationRecord) -> Self {
        Self {
            ip: ip.to_string(),
            continent: record.continent,
            country: record.country,
            state_prov: record.state_prov,
            city: record.city,
            latitude: record.latitude,
            longitude: record.longitude,
        }
    }
}

/// Step of a refresh cycle, used to label failures and cancellations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DisplayMacro, EnumIterMacro)]
pub enum RefreshStage {
    /// Taking the refresh lock
    #[strum(to_string = "lock acquisition")]
    Acquire,
    /// Emptying the backup table
    #[strum(to_string = "truncate")]
    Truncate,
    /// Dropping the backup table's index
    #[strum(to_string = "drop index")]
    DropIndex,
    /// Downloading and loading the snapshot
    #[strum(to_string = "import")]
    Import,
    /// Recreating the backup table's index
    #[strum(to_string = "build index")]
    BuildIndex,
    /// Promoting the backup table
    #[strum(to_string = "swap")]
    Swap,
}
