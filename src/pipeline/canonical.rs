//! Canonical event identifiers.
//!
//! The id is a deterministic content hash over a fixed set of normalized
//! fields, so recomputing an identical event yields an identical id across
//! runs. That property is what makes the month cache and any external
//! deduplication safe.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::config::CanonicalField;
use crate::models::chart::ReferenceChart;
use crate::models::chart::ZodiacMode;
use crate::models::event::Event;

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn system_name(zodiac: ZodiacMode) -> &'static str {
    match zodiac {
        ZodiacMode::Tropical => "tropical",
        ZodiacMode::Sidereal => "sidereal",
    }
}

/// Build the canonical payload for an event: the configured fields only, in
/// a sorted-key map so serialization is stable.
pub fn canonical_payload(
    event: &Event,
    chart: &ReferenceChart,
    fields: &[CanonicalField],
) -> Map<String, Value> {
    let mut payload = Map::new();
    for field in fields {
        let value = match field {
            CanonicalField::Type => Value::from(event.event_type.name()),
            CanonicalField::P1 => Value::from(event.transit_body.name()),
            CanonicalField::P2 => Value::from(
                event
                    .natal_target
                    .map(|t| t.to_string())
                    .unwrap_or_default(),
            ),
            CanonicalField::Aspect => Value::from(event.aspect_label()),
            CanonicalField::House => Value::from(
                event
                    .house
                    .map(|h| h.to_string())
                    .unwrap_or_default(),
            ),
            // Orb closeness rounded to a fixed precision, so refinement
            // jitter below 0.01° does not change identity.
            CanonicalField::Deg => Value::from(round2(event.orb_limit - event.orb)),
            CanonicalField::TsMinute => {
                Value::from(event.timestamp.format("%Y-%m-%dT%H:%M").to_string())
            }
            CanonicalField::System => Value::from(system_name(chart.zodiac)),
            CanonicalField::HouseSystem => Value::from(chart.house_system.to_string()),
            CanonicalField::LocKey => Value::from(chart.location.key()),
        };
        payload.insert(field.key().to_string(), value);
    }
    payload
}

/// Hash a canonical payload into the event id.
pub fn event_id(payload: &Map<String, Value>) -> String {
    let blob = serde_json::to_string(payload).unwrap_or_default();
    let digest = Sha256::digest(blob.as_bytes());
    hex::encode(&digest[..6])
}

/// Assign the canonical id to an event in place.
pub fn assign_id(event: &mut Event, chart: &ReferenceChart, fields: &[CanonicalField]) {
    let payload = canonical_payload(event, chart, fields);
    event.id = event_id(&payload);
}

/// Deterministic month-cache key for one (chart, month, configuration).
pub fn month_cache_key(
    chart: &ReferenceChart,
    year: i32,
    month: u32,
    bodies: &[crate::models::body::Body],
    step_hours: u32,
    orb_fingerprint: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chart.signature().as_bytes());
    hasher.update(format!("|{}-{:02}|", year, month).as_bytes());
    for body in bodies {
        hasher.update(body.name().as_bytes());
        hasher.update(b",");
    }
    hasher.update(format!("|step={}|", step_hours).as_bytes());
    hasher.update(orb_fingerprint.as_bytes());
    hex::encode(&hasher.finalize()[..8])
}
