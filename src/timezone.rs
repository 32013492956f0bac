//! Timezone resolution for display metadata.
//!
//! The engine computes in UTC throughout; the configured timezone only
//! shapes the metadata block. Fixed offsets (`UTC+5:30`, `-0330`, `GMT-7`)
//! resolve directly; anything else falls back per the configured
//! resolution mode, with a warning. Named-zone database lookup is the
//! caller's concern.

use chrono::FixedOffset;

use crate::config::TzResolution;

/// Outcome of timezone resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTimezone {
    /// Display name of the resolved zone.
    pub name: String,
    pub offset: FixedOffset,
}

impl ResolvedTimezone {
    pub fn utc() -> Self {
        ResolvedTimezone {
            name: "UTC".to_string(),
            offset: FixedOffset::east_opt(0).expect("zero offset"),
        }
    }

    pub fn offset_minutes(&self) -> i32 {
        self.offset.local_minus_utc() / 60
    }
}

/// Parse a UTC-offset expression: `UTC+5:30`, `GMT-7`, `+0530`, `-03:30`.
fn parse_utc_offset(value: &str) -> Option<FixedOffset> {
    let mut text = value.trim().to_ascii_uppercase();
    if let Some(stripped) = text.strip_prefix("UTC").or_else(|| text.strip_prefix("GMT")) {
        text = stripped.to_string();
    }
    if text.is_empty() || text == "Z" {
        return FixedOffset::east_opt(0);
    }
    let sign = match text.as_bytes()[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let rest = &text[1..];
    let (hours_part, minutes_part) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() > 2 => (&rest[..2], &rest[2..]),
        None => (rest, "0"),
    };
    let hours: i32 = hours_part.parse().ok()?;
    let minutes: i32 = if minutes_part.is_empty() {
        0
    } else {
        minutes_part.parse().ok()?
    };
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Resolve the configured timezone into a fixed offset.
///
/// Unresolvable names push a `timezone_fallback` warning; in strict mode
/// the result additionally degrades to UTC with a
/// `timezone_resolved_to_utc` warning rather than failing the run.
pub fn resolve_timezone(
    tz: Option<&str>,
    mode: TzResolution,
    warnings: &mut Vec<String>,
) -> ResolvedTimezone {
    let Some(tz) = tz else {
        return ResolvedTimezone::utc();
    };
    let trimmed = tz.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("utc") || trimmed.eq_ignore_ascii_case("gmt") {
        return ResolvedTimezone::utc();
    }

    if let Some(offset) = parse_utc_offset(trimmed) {
        return ResolvedTimezone {
            name: trimmed.to_string(),
            offset,
        };
    }

    warnings.push("timezone_fallback".to_string());
    match mode {
        TzResolution::Strict => {
            warnings.push("timezone_resolved_to_utc".to_string());
            ResolvedTimezone::utc()
        }
        TzResolution::Heuristic | TzResolution::Fallback => ResolvedTimezone::utc(),
    }
}
