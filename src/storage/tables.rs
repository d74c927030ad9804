//! Range table maintenance and bulk inserts.

use std::net::IpAddr;
use std::time::Duration;

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};

use crate::error_handling::DatabaseError;
use crate::geoip::{address_key, LocationRecord, RangeTable};
use crate::storage::deadline::with_deadline;

/// Columns selected when reading a range row.
pub(crate) const RECORD_COLUMNS: &str =
    "ip_start, ip_end, continent, country, state_prov, city, latitude, longitude";

/// Deletes every row of `table`.
pub async fn truncate(
    pool: &SqlitePool,
    table: RangeTable,
    deadline: Duration,
) -> Result<(), DatabaseError> {
    let sql = format!("DELETE FROM {}", table.name());
    with_deadline(deadline, sqlx::query(&sql).execute(pool)).await?;
    Ok(())
}

/// Drops the `ip_start_key` index of `table` if present.
pub async fn drop_index(
    pool: &SqlitePool,
    table: RangeTable,
    deadline: Duration,
) -> Result<(), DatabaseError> {
    let sql = format!("DROP INDEX IF EXISTS {}", table.index_name());
    with_deadline(deadline, sqlx::query(&sql).execute(pool)).await?;
    Ok(())
}

/// (Re)creates the `ip_start_key` index of `table`.
pub async fn create_index(
    pool: &SqlitePool,
    table: RangeTable,
    deadline: Duration,
) -> Result<(), DatabaseError> {
    let sql = format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} (ip_start_key)",
        table.index_name(),
        table.name()
    );
    with_deadline(deadline, sqlx::query(&sql).execute(pool)).await?;
    Ok(())
}

/// Number of rows in `table`.
pub async fn count_rows(
    pool: &SqlitePool,
    table: RangeTable,
    deadline: Duration,
) -> Result<i64, DatabaseError> {
    let sql = format!("SELECT COUNT(*) FROM {}", table.name());
    with_deadline(deadline, sqlx::query_scalar::<_, i64>(&sql).fetch_one(pool)).await
}

/// Inserts `records` into `table` with one multi-row statement.
///
/// Runs on the caller's connection so a whole import can share one transaction.
pub async fn insert_batch(
    conn: &mut SqliteConnection,
    table: RangeTable,
    records: &[LocationRecord],
) -> Result<(), sqlx::Error> {
    if records.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "INSERT INTO {} (ip_start, ip_end, ip_start_key, continent, country, state_prov, city, latitude, longitude) ",
        table.name()
    ));
    builder.push_values(records, |mut row, record| {
        row.push_bind(record.ip_start.to_string())
            .push_bind(record.ip_end.to_string())
            .push_bind(address_key(record.ip_start))
            .push_bind(record.continent.clone())
            .push_bind(record.country.clone())
            .push_bind(record.state_prov.clone())
            .push_bind(record.city.clone())
            .push_bind(record.latitude)
            .push_bind(record.longitude);
    });
    builder.build().execute(conn).await?;
    Ok(())
}

/// Decodes a row selected with [`RECORD_COLUMNS`].
pub(crate) fn record_from_row(row: &SqliteRow) -> Result<LocationRecord, sqlx::Error> {
    Ok(LocationRecord {
        ip_start: parse_stored_ip(row, "ip_start")?,
        ip_end: parse_stored_ip(row, "ip_end")?,
        continent: row.try_get("continent")?,
        country: row.try_get("country")?,
        state_prov: row.try_get("state_prov")?,
        city: row.try_get("city")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
    })
}

fn parse_stored_ip(row: &SqliteRow, column: &str) -> Result<IpAddr, sqlx::Error> {
    let text: String = row.try_get(column)?;
    text.parse::<IpAddr>().map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}
