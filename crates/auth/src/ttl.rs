//! Token lifetimes written in compact form (`15m`, `7d`).

use chrono::Duration;

/// Default access-token lifetime.
pub const DEFAULT_ACCESS_TTL: &str = "15m";
/// Default refresh-token lifetime.
pub const DEFAULT_REFRESH_TTL: &str = "7d";

/// Parse a lifetime written as `<integer><unit>` with unit one of `s`, `m`,
/// `h`, `d`.
///
/// Anything else is read as a raw number of milliseconds. A value that is
/// neither (or is negative) yields a zero lifetime, which callers must treat
/// as "already expired". Never fails.
pub fn parse_ttl(value: &str) -> Duration {
    let value = value.trim();
    if value.is_empty() {
        return Duration::zero();
    }
    if let Some(ttl) = parse_compact(value) {
        return ttl;
    }

    match value.parse::<f64>() {
        Ok(ms) if ms.is_finite() && ms > 0.0 => {
            Duration::try_milliseconds(ms as i64).unwrap_or_else(Duration::zero)
        }
        _ => Duration::zero(),
    }
}

fn parse_compact(value: &str) -> Option<Duration> {
    let unit = value.chars().last()?;
    let amount = &value[..value.len() - unit.len_utf8()];
    if amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let unit_ms: i64 = match unit {
        's' => 1_000,
        'm' => 60_000,
        'h' => 3_600_000,
        'd' => 86_400_000,
        _ => return None,
    };
    let amount: i64 = amount.parse().ok()?;
    Duration::try_milliseconds(amount.checked_mul(unit_ms)?)
}
