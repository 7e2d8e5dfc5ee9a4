//! Parsing for the HL7 `TS` (timestamp) and `DT` (date) datatypes.
//!
//! HL7 timestamps are fixed-width digit strings, `YYYY[MM[DD[HH[MM[SS[.S[S[S[S]]]]]]]]]`,
//! optionally followed by a `+ZZZZ`/`-ZZZZ` offset. Senders routinely truncate them, so every
//! absent trailing part defaults to its minimum: `"2024"` is 2024-01-01 00:00:00 and
//! `"20240305"` is midnight on 2024-03-05.
//!
//! A year of zero means "no value" rather than an error, which is how empty or placeholder
//! timestamps such as `"0000"` are sent in practice.
//!
//! The offset is dropped: values are read as the sender's local wall-clock time.

use crate::{Hl7Error, Hl7Result};
use chrono::{NaiveDate, NaiveDateTime};

const TIMESTAMP_WIDTHS: [usize; 6] = [4, 6, 8, 10, 12, 14];
const DATE_WIDTHS: [usize; 3] = [4, 6, 8];

/// Parses an HL7 `TS` value.
///
/// # Returns
///
/// - `Ok(None)` for an empty value or a zero year
/// - `Ok(Some(datetime))` otherwise, with absent trailing parts at their minimum
///
/// # Errors
///
/// Returns [`Hl7Error::InvalidTimestamp`] if the value is not a digit string of a permitted
/// width, has a fraction without seconds, or names an impossible date or time.
pub fn parse_timestamp(raw: &str) -> Hl7Result<Option<NaiveDateTime>> {
    let invalid = || Hl7Error::InvalidTimestamp(raw.to_owned());

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let offset_at = trimmed
        .char_indices()
        .skip(1)
        .find(|(_, c)| matches!(c, '+' | '-'))
        .map(|(pos, _)| pos);
    let without_offset = match offset_at {
        Some(pos) => {
            let offset = &trimmed[pos + 1..];
            if offset.len() != 4 || !is_digits(offset) {
                return Err(invalid());
            }
            &trimmed[..pos]
        }
        None => trimmed,
    };
    let (digits, fraction) = match without_offset.split_once('.') {
        Some((digits, fraction)) => (digits, Some(fraction)),
        None => (without_offset, None),
    };

    if !is_digits(digits) || !TIMESTAMP_WIDTHS.contains(&digits.len()) {
        return Err(invalid());
    }

    let nanos = match fraction {
        None => 0,
        Some(f) if digits.len() == 14 && !f.is_empty() && f.len() <= 9 && is_digits(f) => {
            let scale = 10u32.pow(9 - f.len() as u32);
            f.parse::<u32>().map_err(|_| invalid())? * scale
        }
        Some(_) => return Err(invalid()),
    };

    let year = number(digits, 0, 4).ok_or_else(invalid)?;
    if year == 0 {
        return Ok(None);
    }
    let month = number(digits, 4, 6).unwrap_or(1);
    let day = number(digits, 6, 8).unwrap_or(1);
    let hour = number(digits, 8, 10).unwrap_or(0);
    let minute = number(digits, 10, 12).unwrap_or(0);
    let second = number(digits, 12, 14).unwrap_or(0);

    NaiveDate::from_ymd_opt(year as i32, month, day)
        .and_then(|date| date.and_hms_nano_opt(hour, minute, second, nanos))
        .map(Some)
        .ok_or_else(invalid)
}

/// Parses an HL7 `DT` value, `YYYY[MM[DD]]`.
///
/// Follows the same defaulting and zero-year rules as [`parse_timestamp`].
pub fn parse_date(raw: &str) -> Hl7Result<Option<NaiveDate>> {
    let invalid = || Hl7Error::InvalidDate(raw.to_owned());

    let digits = raw.trim();
    if digits.is_empty() {
        return Ok(None);
    }
    if !is_digits(digits) || !DATE_WIDTHS.contains(&digits.len()) {
        return Err(invalid());
    }

    let year = number(digits, 0, 4).ok_or_else(invalid)?;
    if year == 0 {
        return Ok(None);
    }
    let month = number(digits, 4, 6).unwrap_or(1);
    let day = number(digits, 6, 8).unwrap_or(1);

    NaiveDate::from_ymd_opt(year as i32, month, day)
        .map(Some)
        .ok_or_else(invalid)
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Reads `digits[start..end]`, or `None` when the value is too short to contain it.
fn number(digits: &str, start: usize, end: usize) -> Option<u32> {
    digits.get(start..end).and_then(|s| s.parse().ok())
}
