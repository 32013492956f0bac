//! Aspect detection over sampled position frames.

use chrono::{DateTime, Utc};

use crate::config::{AspectPolicy, OrbTable};
use crate::models::angles::angle_diff;
use crate::models::aspect::Aspect;
use crate::models::body::Body;
use crate::models::chart::{NatalTarget, TargetId};
use crate::providers::PositionFrame;

/// A coarse detection awaiting refinement. Discarded once the exact
/// timestamp has been resolved and the event scored.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub transit_body: Body,
    pub natal_target: TargetId,
    pub aspect: Aspect,
    /// Grid timestamp of the detection (pre-refinement).
    pub timestamp: DateTime<Utc>,
    /// Orb at the grid timestamp, degrees.
    pub orb: f64,
    pub orb_limit: f64,
    pub applying: bool,
    pub transit_longitude: f64,
    pub transit_speed: f64,
    pub natal_longitude: f64,
}

/// Test one sampled frame against every natal target and aspect type.
///
/// The frame is fetched once per `(timestamp, body)` upstream and shared
/// across all targets here, so provider traffic stays linear in the grid.
pub fn scan_frame(
    timestamp: DateTime<Utc>,
    frame: &PositionFrame,
    targets: &[NatalTarget],
    policy: &AspectPolicy,
    orbs: &OrbTable,
) -> Vec<RawHit> {
    let mut hits = Vec::new();
    for position in frame.values() {
        for target in targets {
            let separation = angle_diff(position.longitude, target.longitude);
            for &aspect in &policy.types {
                let angle = target.id.angle();
                // Angle targets only participate when requested.
                if let Some(name) = angle {
                    if !policy.to_angles.contains(&name) {
                        continue;
                    }
                }
                let orb_limit = orbs.resolve(position.body, Some(target.id), angle);
                let orb = (separation - aspect.angle()).abs();
                if orb > orb_limit {
                    continue;
                }
                let applying = position.speed > target.speed;
                if policy.applying_only && !applying {
                    continue;
                }
                hits.push(RawHit {
                    transit_body: position.body,
                    natal_target: target.id,
                    aspect,
                    timestamp,
                    orb,
                    orb_limit,
                    applying,
                    transit_longitude: position.longitude,
                    transit_speed: position.speed,
                    natal_longitude: target.longitude,
                });
            }
        }
    }
    hits
}

/// Aspect matches of a single static position against the natal targets.
/// Used by the progression and solar-return streams, which compare one
/// snapshot rather than a scanned grid.
pub fn match_position(
    longitude: f64,
    speed: f64,
    body: Body,
    targets: &[NatalTarget],
    policy: &AspectPolicy,
    orbs: &OrbTable,
) -> Vec<(TargetId, Aspect, f64, f64, bool)> {
    let mut matches = Vec::new();
    for target in targets {
        let separation = angle_diff(longitude, target.longitude);
        for &aspect in &policy.types {
            let orb_limit = orbs.resolve(body, Some(target.id), target.id.angle());
            let orb = (separation - aspect.angle()).abs();
            if orb <= orb_limit {
                matches.push((target.id, aspect, orb, orb_limit, speed >= target.speed));
            }
        }
    }
    matches
}
