//! Significance scoring.
//!
//! Maps a refined candidate to a normalized score in `[0, 1]`. The
//! minimum-strength cutoff lives here on purpose: candidates below it are
//! discarded before they ever become events, which is the pipeline's
//! primary volume-control lever.

use serde_json::{Map, Value};

use crate::config::{AspectPolicy, ScoringConfig};
use crate::models::aspect::Aspect;
use crate::models::body::Body;
use crate::models::chart::AngleName;
use crate::models::event::{Stream, Tag, TagSet};

/// Candidate fields the scorer looks at.
#[derive(Debug, Clone)]
pub struct ScoreInput {
    pub stream: Stream,
    pub transit_body: Body,
    pub aspect: Option<Aspect>,
    pub orb: f64,
    pub orb_limit: f64,
    pub applying: bool,
    pub angle: Option<AngleName>,
    pub house_change: bool,
    pub tags: TagSet,
}

/// A computed score plus the per-factor breakdown recorded in event
/// metadata.
#[derive(Debug, Clone)]
pub struct Scored {
    pub score: f64,
    pub breakdown: Map<String, Value>,
}

fn round4(v: f64) -> Value {
    Value::from((v * 10_000.0).round() / 10_000.0)
}

/// Score a candidate. Returns `None` when the result falls below the
/// configured minimum strength.
pub fn score(
    input: &ScoreInput,
    scoring: &ScoringConfig,
    policy: &AspectPolicy,
    min_strength: f64,
) -> Option<Scored> {
    let aspect_weight = input
        .aspect
        .and_then(|a| scoring.aspect_weight.get(&a))
        .copied()
        .unwrap_or(0.5);
    let planet_weight = scoring
        .planet_weight
        .get(&input.transit_body.class())
        .copied()
        .unwrap_or(0.4);

    let orb_factor = (1.0 - (input.orb / input.orb_limit.max(1e-6)).min(1.0)).max(0.0);
    let base = aspect_weight * planet_weight * orb_factor;
    let mut value = base;

    let mut breakdown = Map::new();
    breakdown.insert("base".into(), round4(base));
    breakdown.insert("orb_factor".into(), round4(orb_factor));

    if let Some(angle) = input.angle {
        if policy.to_angles.contains(&angle) {
            let weight = scoring.angle_weights.get(&angle).copied().unwrap_or(1.0);
            value += scoring.angle_bonus;
            value *= weight;
            breakdown.insert("angle_bonus".into(), round4(scoring.angle_bonus));
            breakdown.insert("angle_weight".into(), round4(weight));
        }
    }

    if input.house_change {
        value += scoring.house_change_bonus;
        breakdown.insert(
            "house_change_bonus".into(),
            round4(scoring.house_change_bonus),
        );
    }

    if input.tags.contains(Tag::Progressed) {
        value += scoring.progressed_bonus;
        breakdown.insert("progressed_bonus".into(), round4(scoring.progressed_bonus));
    }
    if input.tags.contains(Tag::Eclipse) {
        value += scoring.eclipse_bonus;
        breakdown.insert("eclipse_bonus".into(), round4(scoring.eclipse_bonus));
    }
    if input.tags.contains(Tag::Midpoint) {
        value += scoring.midpoint_bonus;
        breakdown.insert("midpoint_bonus".into(), round4(scoring.midpoint_bonus));
    }
    if input.tags.contains(Tag::Declination) {
        value += scoring.declination_bonus;
        breakdown.insert(
            "declination_bonus".into(),
            round4(scoring.declination_bonus),
        );
    }

    // Floored streams: the event is the anchor of its stream and should
    // not sink below a baseline however modest its geometry.
    if input.tags.contains(Tag::SolarReturn) {
        value = value.max(scoring.solar_return_floor);
        breakdown.insert(
            "solar_return_floor".into(),
            round4(scoring.solar_return_floor),
        );
    }
    if input.tags.contains(Tag::Houses) {
        let floor = scoring.house_floor.max(scoring.house_change_bonus);
        value = value.max(floor);
        breakdown.insert("house_floor".into(), round4(floor));
    }

    if input.applying {
        value += scoring.applying_bonus;
        breakdown.insert("applying_bonus".into(), round4(scoring.applying_bonus));
    } else if !policy.applying_only {
        value += scoring.separating_penalty;
        breakdown.insert(
            "separating_penalty".into(),
            round4(scoring.separating_penalty),
        );
    }

    let value = value.clamp(0.0, 1.0);
    if value < min_strength {
        return None;
    }

    Some(Scored {
        score: value,
        breakdown,
    })
}
