//! Partitions: a `(objects, indexes)` column-family pair scoped to a date
//! range derived from a model's partitioning field.

use chrono::{Datelike, TimeZone, Utc};

pub const DEFAULT_PARTITION: &str = "default";

/// A `YYYY-MM` bucket, or the sentinel default partition for records
/// lacking a partitioning field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey(pub String);

impl PartitionKey {
    pub fn default_partition() -> Self {
        Self(DEFAULT_PARTITION.to_string())
    }

    /// The calendar-month bucket containing `unix_millis`.
    pub fn from_unix_millis(unix_millis: i64) -> Self {
        let secs = unix_millis.div_euclid(1000);
        let dt = Utc
            .timestamp_opt(secs, 0)
            .single()
            .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap());
        Self(format!("{:04}-{:02}", dt.year(), dt.month()))
    }

    /// The first instant (unix-millis) of this bucket's month, or `None`
    /// for the default partition, which covers no date range.
    pub fn start_unix_millis(&self) -> Option<i64> {
        let (y, m) = self.0.split_once('-')?;
        let y: i32 = y.parse().ok()?;
        let m: u32 = m.parse().ok()?;
        Utc.with_ymd_and_hms(y, m, 1, 0, 0, 0)
            .single()
            .map(|dt| dt.timestamp_millis())
    }

    /// The first instant of the following month, for range-membership
    /// tests and for `add_date_partitions`'s month-by-month walk.
    pub fn next_start_unix_millis(&self) -> Option<i64> {
        let (y, m) = self.0.split_once('-')?;
        let y: i32 = y.parse().ok()?;
        let m: u32 = m.parse().ok()?;
        let (ny, nm) = if m == 12 { (y + 1, 1) } else { (y, m + 1) };
        Utc.with_ymd_and_hms(ny, nm, 1, 0, 0, 0)
            .single()
            .map(|dt| dt.timestamp_millis())
    }

    pub fn objects_cf(&self, model_id: &str) -> String {
        format!("objects::{model_id}::{}", self.0)
    }

    pub fn indexes_cf(&self, model_id: &str) -> String {
        format!("indexes::{model_id}::{}", self.0)
    }
}
