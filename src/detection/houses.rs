//! House crossings: a transiting body moving between adjacent houses.

use chrono::{DateTime, Utc};
use std::future::Future;

use crate::detection::refine::{bisect_predicate, Refined};
use crate::error::ProviderError;
use crate::models::body::Body;
use crate::providers::{HouseFrame, SampledTimeline};

/// A coarse house-change detection between two grid samples.
#[derive(Debug, Clone, PartialEq)]
pub struct HouseCrossing {
    pub body: Body,
    pub from_house: u8,
    pub to_house: u8,
    /// Last sample still in the old house.
    pub before: DateTime<Utc>,
    /// First sample in the new house.
    pub after: DateTime<Utc>,
}

/// Detect house transitions for one body over the timeline.
pub fn detect_house_crossings(
    timeline: &SampledTimeline,
    body: Body,
    frame: &HouseFrame,
) -> Vec<HouseCrossing> {
    let mut crossings = Vec::new();
    let mut prev: Option<(DateTime<Utc>, u8)> = None;
    for (ts, positions) in timeline {
        let Some(pos) = positions.get(&body) else { continue };
        let house = frame.house_of(pos.longitude);
        if let Some((prev_ts, prev_house)) = prev {
            if house != prev_house {
                crossings.push(HouseCrossing {
                    body,
                    from_house: prev_house,
                    to_house: house,
                    before: prev_ts,
                    after: *ts,
                });
            }
        }
        prev = Some((*ts, house));
    }
    crossings
}

/// Refine a house crossing to minute precision by bisecting on the
/// house-membership predicate against the cusp boundary.
///
/// `longitude_at` resolves the body's longitude at an arbitrary timestamp
/// (a provider call). Divergence keeps the coarse boundary sample.
pub async fn refine_house_crossing<F, Fut>(
    crossing: &HouseCrossing,
    frame: &HouseFrame,
    longitude_at: F,
) -> Result<Refined, ProviderError>
where
    F: Fn(DateTime<Utc>) -> Fut,
    Fut: Future<Output = Result<f64, ProviderError>>,
{
    let target = crossing.to_house;
    bisect_predicate(crossing.before, crossing.after, |ts| {
        let lon = longitude_at(ts);
        async move { Ok(frame.house_of(lon.await?) == target) }
    })
    .await
}
