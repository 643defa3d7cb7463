// src/rules/limits.rs

//! Parsing of the free-form `rate_limit` and `settle_time` rule fields.
//!
//! `rate_limit` is `N` or `N/u`, `settle_time` is `X` or `Xu`, where `u` is
//! one of `s`, `m`, `h`, `d`, `w`. Both default to minutes. Parsing never
//! fails: malformed values disable the respective check.

/// Unit used when a value carries none.
pub const DEFAULT_UNIT: char = 'm';

/// Length of a unit in seconds, `None` for unknown units.
pub fn unit_secs(unit: char) -> Option<f64> {
    match unit {
        's' => Some(1.0),
        'm' => Some(60.0),
        'h' => Some(60.0 * 60.0),
        'd' => Some(24.0 * 60.0 * 60.0),
        'w' => Some(7.0 * 24.0 * 60.0 * 60.0),
        _ => None,
    }
}

/// Longest settle time honoured; larger values are clamped to it.
pub const MAX_SETTLE_SECS: f64 = 365.0 * 24.0 * 60.0 * 60.0;

/// Parsed `rate_limit`: at most `max_hits` per `period_secs`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    /// `-1` (or any value <= 0) disables the limit.
    pub max_hits: i64,
    pub period_secs: f64,
}

impl RateLimit {
    pub fn is_enabled(&self) -> bool {
        self.max_hits > 0 && self.period_secs > 0.0
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        parse_rate_limit("")
    }
}

/// Parse a rate limit like `"10/h"` or `"3"`.
///
/// A non-numeric hit count yields `-1` (disabled) but the period is still
/// parsed, since it bounds how long hit history is kept.
pub fn parse_rate_limit(raw: &str) -> RateLimit {
    let (number, unit) = match raw.split_once('/') {
        Some((n, u)) => (n, u),
        None => (raw, ""),
    };

    let max_hits = if !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit()) {
        number.parse::<i64>().unwrap_or(-1)
    } else {
        -1
    };

    let mut unit_chars = unit.chars();
    let period_secs = match (unit_chars.next(), unit_chars.next()) {
        (Some(u), None) => unit_secs(u),
        _ => None,
    }
    .unwrap_or(60.0);

    RateLimit {
        max_hits,
        period_secs,
    }
}

/// Parse a settle time like `"5s"`, `"1.5"` (minutes) or `"2h"` into seconds.
///
/// Empty, unparsable or unknown-unit values give `0.0`; negative values
/// clamp to `0.0` and values beyond [`MAX_SETTLE_SECS`] clamp to it.
pub fn parse_settle_time(raw: &str) -> f64 {
    let raw = raw.trim();
    let Some(last) = raw.chars().last() else {
        return 0.0;
    };

    let (value, factor) = if last.is_ascii_digit() {
        (raw, 60.0)
    } else {
        match unit_secs(last) {
            Some(secs) => (&raw[..raw.len() - last.len_utf8()], secs),
            None => return 0.0,
        }
    };

    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => {
            let secs = (v * factor).max(0.0);
            if secs > MAX_SETTLE_SECS {
                tracing::warn!(
                    settle_time = raw,
                    max_secs = MAX_SETTLE_SECS,
                    "settle time too long; clamping"
                );
                MAX_SETTLE_SECS
            } else {
                secs
            }
        }
        _ => {
            tracing::warn!(settle_time = raw, "failed to parse settle time; using 0");
            0.0
        }
    }
}
