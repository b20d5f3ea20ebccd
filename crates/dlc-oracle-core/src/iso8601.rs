//! ISO 8601 durations (`PT1H30M`, `P1DT4H`, ...).
//!
//! Calendar units are fixed-length: a year is 365 days, a month 30 days,
//! a week 7 days. Fractional components are accepted (`PT1.5H`).

use chrono::Duration;

use crate::error::DurationError;

const NANOS_PER_SEC: i128 = 1_000_000_000;
const MINUTE: i128 = 60 * NANOS_PER_SEC;
const HOUR: i128 = 60 * MINUTE;
const DAY: i128 = 24 * HOUR;
const WEEK: i128 = 7 * DAY;
const MONTH: i128 = 30 * DAY;
const YEAR: i128 = 365 * DAY;

/// Units allowed before `T`, in the order they must appear.
const DATE_UNITS: &[(char, i128)] = &[('Y', YEAR), ('M', MONTH), ('W', WEEK), ('D', DAY)];
/// Units allowed after `T`, in the order they must appear.
const TIME_UNITS: &[(char, i128)] = &[('H', HOUR), ('M', MINUTE), ('S', NANOS_PER_SEC)];

/// Total nanoseconds in a duration.
pub(crate) fn duration_nanos(d: Duration) -> i128 {
    i128::from(d.num_seconds()) * NANOS_PER_SEC + i128::from(d.subsec_nanos())
}

/// Parse an ISO 8601 duration.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let s = input.trim();
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let body = s
        .strip_prefix('P')
        .ok_or_else(|| DurationError::MissingPrefix(input.to_string()))?;

    let (date_part, time_part) = match body.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (body, None),
    };

    let mut total: i128 = 0;
    let mut components = 0usize;
    let offset = input.len() - body.len();
    components += parse_part(input, date_part, offset, DATE_UNITS, &mut total)?;
    if let Some(time) = time_part {
        let time_offset = offset + date_part.len() + 1;
        let n = parse_part(input, time, time_offset, TIME_UNITS, &mut total)?;
        if n == 0 {
            return Err(DurationError::Empty(input.to_string()));
        }
        components += n;
    }
    if components == 0 {
        return Err(DurationError::Empty(input.to_string()));
    }

    let nanos = i64::try_from(total).map_err(|_| DurationError::Overflow(input.to_string()))?;
    let d = Duration::nanoseconds(nanos);
    Ok(if negative { -d } else { d })
}

/// Parse `<number><unit>` pairs, enforcing unit order.
fn parse_part(
    input: &str,
    part: &str,
    offset: usize,
    units: &[(char, i128)],
    total: &mut i128,
) -> Result<usize, DurationError> {
    let invalid = |at: usize| DurationError::InvalidComponent {
        input: input.to_string(),
        position: offset + at,
    };

    let mut next_unit = 0usize;
    let mut count = 0usize;
    let mut start = 0usize;
    for (i, c) in part.char_indices() {
        if c.is_ascii_digit() || c == '.' {
            continue;
        }
        let number = &part[start..i];
        if number.is_empty() {
            return Err(invalid(i));
        }
        let position = units[next_unit..]
            .iter()
            .position(|(u, _)| *u == c)
            .ok_or_else(|| invalid(i))?;
        let unit = units[next_unit + position].1;
        next_unit += position + 1;

        let nanos = component_nanos(number, unit).ok_or_else(|| invalid(start))?;
        *total = total
            .checked_add(nanos)
            .ok_or_else(|| DurationError::Overflow(input.to_string()))?;
        count += 1;
        start = i + c.len_utf8();
    }
    if start != part.len() {
        return Err(invalid(start));
    }
    Ok(count)
}

fn component_nanos(number: &str, unit: i128) -> Option<i128> {
    match number.split_once('.') {
        None => number.parse::<i128>().ok()?.checked_mul(unit),
        Some((whole, frac)) => {
            if frac.contains('.') || (whole.is_empty() && frac.is_empty()) {
                return None;
            }
            let whole: i128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
            let frac_value: f64 = format!("0.{}", frac).parse().ok()?;
            let frac_nanos = (frac_value * unit as f64).round() as i128;
            whole.checked_mul(unit)?.checked_add(frac_nanos)
        }
    }
}

/// Encode a duration greedily as years, months, days, hours, minutes, seconds.
///
/// The zero duration encodes as `PT0S`.
pub fn encode_duration(d: Duration) -> String {
    let nanos = duration_nanos(d);
    if nanos == 0 {
        return "PT0S".to_string();
    }

    let mut out = String::new();
    if nanos < 0 {
        out.push('-');
    }
    out.push('P');

    let mut rest = nanos.abs();
    for (suffix, unit) in [('Y', YEAR), ('M', MONTH), ('D', DAY)] {
        let n = rest / unit;
        if n != 0 {
            out.push_str(&format!("{}{}", n, suffix));
            rest -= n * unit;
        }
    }
    if rest == 0 {
        return out;
    }

    out.push('T');
    for (suffix, unit) in [('H', HOUR), ('M', MINUTE)] {
        let n = rest / unit;
        if n != 0 {
            out.push_str(&format!("{}{}", n, suffix));
            rest -= n * unit;
        }
    }
    if rest != 0 {
        let secs = rest / NANOS_PER_SEC;
        let frac = rest % NANOS_PER_SEC;
        if frac == 0 {
            out.push_str(&format!("{}S", secs));
        } else {
            let frac = format!("{:09}", frac);
            out.push_str(&format!("{}.{}S", secs, frac.trim_end_matches('0')));
        }
    }
    out
}
