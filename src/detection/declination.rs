//! Declination parallels and contra-parallels against natal Sun/Moon.

use chrono::{DateTime, Utc};

use crate::config::DeclinationConfig;
use crate::models::body::Body;
use crate::providers::SampledTimeline;

/// Kind of declination contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclinationKind {
    /// Same declination: supportive.
    Parallel,
    /// Opposite declinations of similar magnitude: tension.
    ContraParallel,
}

impl DeclinationKind {
    pub fn name(&self) -> &'static str {
        match self {
            DeclinationKind::Parallel => "parallel",
            DeclinationKind::ContraParallel => "contra_parallel",
        }
    }
}

/// A declination contact between a transiting body and a natal luminary.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclinationHit {
    pub timestamp: DateTime<Utc>,
    pub transit_body: Body,
    /// The natal luminary contacted (Sun or Moon).
    pub natal_body: Body,
    pub kind: DeclinationKind,
    pub orb: f64,
}

/// Compare one declination pair.
fn classify(
    transit_dec: f64,
    natal_dec: f64,
    orb: f64,
) -> Option<(DeclinationKind, f64)> {
    let diff = (transit_dec - natal_dec).abs();
    if diff <= orb {
        return Some((DeclinationKind::Parallel, diff));
    }
    let contra_diff = (transit_dec.abs() - natal_dec.abs()).abs();
    let opposite_sides = transit_dec * natal_dec < 0.0;
    if opposite_sides && contra_diff <= orb {
        return Some((DeclinationKind::ContraParallel, contra_diff));
    }
    None
}

/// Detect declination contacts over the timeline. One hit per sample per
/// (body, luminary) while in orb; temporal deduplication collapses the
/// repeats downstream.
pub fn detect_declination_contacts(
    timeline: &SampledTimeline,
    natal_sun_dec: Option<f64>,
    natal_moon_dec: Option<f64>,
    config: &DeclinationConfig,
) -> Vec<DeclinationHit> {
    if !config.parallels && !config.contraparallels {
        return Vec::new();
    }
    let natal: Vec<(Body, f64)> = [
        natal_sun_dec.map(|d| (Body::Sun, d)),
        natal_moon_dec.map(|d| (Body::Moon, d)),
    ]
    .into_iter()
    .flatten()
    .collect();
    if natal.is_empty() {
        return Vec::new();
    }

    let mut hits = Vec::new();
    for (ts, frame) in timeline {
        for position in frame.values() {
            let transit_dec = position.declination_or_latitude();
            for (natal_body, natal_dec) in &natal {
                let Some((kind, orb)) = classify(transit_dec, *natal_dec, config.orb) else {
                    continue;
                };
                let wanted = match kind {
                    DeclinationKind::Parallel => config.parallels,
                    DeclinationKind::ContraParallel => config.contraparallels,
                };
                if !wanted {
                    continue;
                }
                hits.push(DeclinationHit {
                    timestamp: *ts,
                    transit_body: position.body,
                    natal_body: *natal_body,
                    kind,
                    orb,
                });
            }
        }
    }
    hits
}
