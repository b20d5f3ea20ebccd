//! Publish-date scheduling.
//!
//! Publish dates sit on the grid `start_date + k * frequency`. A request is
//! mapped to the nearest grid point that is not before it, and rejected when
//! that point is further out than `now + range`.

use chrono::{DateTime, Utc};

use crate::error::ScheduleError;
use crate::event::AssetConfig;
use crate::iso8601::duration_nanos;

const NANOS_PER_SEC: i128 = 1_000_000_000;

fn to_nanos(t: DateTime<Utc>) -> i128 {
    i128::from(t.timestamp()) * NANOS_PER_SEC + i128::from(t.timestamp_subsec_nanos())
}

fn from_nanos(nanos: i128) -> Result<DateTime<Utc>, ScheduleError> {
    let secs = i64::try_from(nanos.div_euclid(NANOS_PER_SEC)).map_err(|_| ScheduleError::OutOfRange)?;
    let subsec = nanos.rem_euclid(NANOS_PER_SEC) as u32;
    DateTime::from_timestamp(secs, subsec).ok_or(ScheduleError::OutOfRange)
}

/// Round `diff` to the nearest multiple of `step`, halves away from zero.
fn round_to_multiple(diff: i128, step: i128) -> i128 {
    let q = diff / step;
    let r = diff % step;
    if 2 * r.abs() < step {
        q
    } else {
        q + diff.signum()
    }
}

/// Map `requested` to its canonical publish date.
///
/// The result is never before `requested`; a request exactly on the grid maps
/// to itself. Requests before `start_date` are allowed.
pub fn compute_publish_date(
    requested: DateTime<Utc>,
    config: &AssetConfig,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ScheduleError> {
    let step = duration_nanos(config.frequency);
    if step <= 0 {
        return Err(ScheduleError::InvalidFrequency);
    }

    let start = to_nanos(config.start_date);
    let requested_nanos = to_nanos(requested);
    let k = round_to_multiple(requested_nanos - start, step);

    let mut publish = start + k * step;
    if publish < requested_nanos {
        publish += step;
    }

    let limit = to_nanos(now) + duration_nanos(config.range);
    if publish > limit {
        return Err(ScheduleError::TooLate {
            publish_date: from_nanos(publish)?,
            limit: from_nanos(limit)?,
        });
    }
    from_nanos(publish)
}
