//! Duration parsing for timeout settings.
//!
//! Timeouts arrive as plain seconds (`300`), ISO-8601 durations
//! (`PT1H30M`, `PT45S`, `P1D`) or suffixed values (`90s`, `5m`, `2h`).

use std::time::Duration;

use super::ConfigError;

/// Parses a timeout value in any of the accepted notations.
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(invalid(raw, "value is empty"));
    }

    if let Ok(seconds) = value.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    let upper = value.to_ascii_uppercase();
    if upper.starts_with('P') {
        return parse_iso8601(&upper).ok_or_else(|| invalid(raw, "malformed ISO-8601 duration"));
    }

    parse_suffixed(value).ok_or_else(|| invalid(raw, "expected seconds, ISO-8601 or <n>s/m/h/d"))
}

/// Formats a duration as ISO-8601 seconds, e.g. `PT3600S`.
pub fn format_duration(duration: Duration) -> String {
    format!("PT{}S", duration.as_secs())
}

fn parse_suffixed(value: &str) -> Option<Duration> {
    let split = value.find(|c: char| !c.is_ascii_digit())?;
    let (number, unit) = value.split_at(split);
    let amount: u64 = number.parse().ok()?;
    let multiplier = match unit.trim() {
        "ms" => return Some(Duration::from_millis(amount)),
        "s" | "sec" | "secs" => 1,
        "m" | "min" | "mins" => 60,
        "h" | "hr" | "hrs" => 3600,
        "d" | "day" | "days" => 86_400,
        _ => return None,
    };
    amount.checked_mul(multiplier).map(Duration::from_secs)
}

fn parse_iso8601(value: &str) -> Option<Duration> {
    let body = value.strip_prefix('P')?;
    let (date_part, time_part) = match body.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (body, None),
    };
    if date_part.is_empty() && time_part.map_or(true, str::is_empty) {
        return None;
    }

    let mut total = 0f64;
    total += sum_components(date_part, &[('D', 86_400.0)])?;
    if let Some(time) = time_part {
        if time.is_empty() {
            return None;
        }
        total += sum_components(time, &[('H', 3600.0), ('M', 60.0), ('S', 1.0)])?;
    }
    Duration::try_from_secs_f64(total).ok()
}

/// Sums `<number><unit>` components, requiring units in the given order.
fn sum_components(part: &str, units: &[(char, f64)]) -> Option<f64> {
    let mut total = 0f64;
    let mut rest = part;
    let mut next_unit = 0;
    while !rest.is_empty() {
        let unit_at = rest.find(|c: char| c.is_ascii_alphabetic())?;
        let (number, tail) = rest.split_at(unit_at);
        let unit = tail.chars().next()?;
        let position = units[next_unit..].iter().position(|(u, _)| *u == unit)? + next_unit;
        let unsigned = number
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == ',');
        if number.is_empty() || !unsigned {
            return None;
        }
        let amount: f64 = number.replace(',', ".").parse().ok()?;
        total += amount * units[position].1;
        next_unit = position + 1;
        rest = &tail[unit.len_utf8()..];
    }
    Some(total)
}

fn invalid(raw: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidDuration {
        value: raw.to_string(),
        reason: reason.to_string(),
    }
}
