// src/history/run_id.rs

//! Time-based run identifiers.
//!
//! Format: `<UTC time as %Y-%m-%d_%H-%M-%S%.3f>_<job type>`, e.g.
//! `2024-05-01_09-30-12.042_install`. The millisecond part is fixed width so
//! that sorting ids as strings sorts them chronologically. UTC has no
//! daylight-saving jumps, so that order holds across clock changes.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

use crate::errors::ExecError;
use crate::lock::is_plain_name;

pub const RUN_ID_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S%.3f";

/// Millisecond timestamp of the last id handed out by this process.
static LAST_ISSUED_MILLIS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Reject job types that would not stay a single path component once
/// appended to the run id.
pub fn validate_job_type(job_type: &str) -> Result<(), ExecError> {
    if !is_plain_name(job_type) {
        return Err(ExecError::InvalidJobType(job_type.to_string()));
    }
    Ok(())
}

/// Generate a fresh run id for `job_type`.
///
/// Ids issued by one process are strictly increasing, even when two are
/// requested within the same millisecond.
pub fn next_run_id(job_type: &str) -> String {
    format_run_id(&next_timestamp(), job_type)
}

pub fn format_run_id(at: &DateTime<Utc>, job_type: &str) -> String {
    format!("{}_{}", at.format(RUN_ID_TIME_FORMAT), job_type)
}

fn next_timestamp() -> DateTime<Utc> {
    let now = Utc::now().timestamp_millis();
    let bump = |last: i64| now.max(last.saturating_add(1));

    let previous =
        match LAST_ISSUED_MILLIS.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(bump(last))
        }) {
            Ok(prev) | Err(prev) => prev,
        };

    DateTime::from_timestamp_millis(bump(previous)).unwrap_or_else(Utc::now)
}
