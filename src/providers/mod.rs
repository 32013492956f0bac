//! External provider interfaces.
//!
//! Position and house computation are external collaborators: given a
//! timestamp and identifiers they return geometry, and the engine never
//! reimplements the underlying astronomy. Providers must be deterministic
//! for identical inputs; cache correctness and reproducible runs depend on
//! it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ProviderError;
use crate::models::body::Body;
use crate::models::chart::{HouseSystem, ZodiacMode};

/// Ecliptic position of a body at an instant, as returned by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyPosition {
    pub body: Body,
    pub timestamp: DateTime<Utc>,
    /// Ecliptic longitude in `[0, 360)`.
    pub longitude: f64,
    /// Ecliptic latitude, degrees.
    pub latitude: f64,
    /// Distance in AU.
    pub distance: f64,
    /// Longitudinal speed in degrees/day; negative while retrograde.
    pub speed: f64,
    /// Declination, degrees. Falls back to ecliptic latitude when the
    /// provider does not compute it.
    pub declination: Option<f64>,
}

impl BodyPosition {
    pub fn is_retrograde(&self) -> bool {
        self.speed < 0.0
    }

    /// Declination value used by the parallel detector.
    pub fn declination_or_latitude(&self) -> f64 {
        self.declination.unwrap_or(self.latitude)
    }
}

/// House cusps and angles at an instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseFrame {
    pub ascendant: f64,
    pub midheaven: f64,
    /// Cusp longitudes for houses 1 through 12.
    pub cusps: [f64; 12],
}

impl HouseFrame {
    /// House number (1-12) containing a longitude.
    pub fn house_of(&self, lon: f64) -> u8 {
        use crate::models::angles::norm360;
        let lon = norm360(lon);
        for i in 0..12 {
            let start = norm360(self.cusps[i]);
            let end = norm360(self.cusps[(i + 1) % 12]);
            let contains = if start <= end {
                lon >= start && lon < end
            } else {
                // cusp interval wraps 0°
                lon >= start || lon < end
            };
            if contains {
                return (i + 1) as u8;
            }
        }
        12
    }
}

/// Computes ecliptic positions. Deterministic for identical inputs.
#[async_trait]
pub trait PositionProvider: Send + Sync {
    async fn position(
        &self,
        timestamp: DateTime<Utc>,
        body: Body,
        zodiac: ZodiacMode,
        sidereal_frame: Option<&str>,
    ) -> Result<BodyPosition, ProviderError>;
}

/// Computes house cusps and chart angles. Deterministic for identical inputs.
#[async_trait]
pub trait HouseProvider: Send + Sync {
    async fn houses(
        &self,
        timestamp: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
        system: HouseSystem,
    ) -> Result<HouseFrame, ProviderError>;
}

/// Positions of a set of bodies at one instant.
pub type PositionFrame = BTreeMap<Body, BodyPosition>;

/// A sampled timeline: positions of every tracked body at each grid
/// timestamp, fetched once per `(timestamp, body)` and shared by all
/// detectors.
pub type SampledTimeline = Vec<(DateTime<Utc>, PositionFrame)>;

/// Retry policy for provider lookups.
const PROVIDER_RETRIES: u32 = 3;
const PROVIDER_BACKOFF: Duration = Duration::from_millis(50);

/// Fetch a position with bounded retry/backoff.
///
/// Returns the last error once retries are exhausted; callers skip the
/// affected grid point and record a warning rather than failing the run.
pub async fn position_with_retry(
    provider: &Arc<dyn PositionProvider>,
    timestamp: DateTime<Utc>,
    body: Body,
    zodiac: ZodiacMode,
    sidereal_frame: Option<&str>,
) -> Result<BodyPosition, ProviderError> {
    let mut last = ProviderError::Timeout;
    for attempt in 0..PROVIDER_RETRIES {
        match provider
            .position(timestamp, body, zodiac, sidereal_frame)
            .await
        {
            Ok(pos) => return Ok(pos),
            Err(err) => {
                last = err;
                if attempt + 1 < PROVIDER_RETRIES {
                    tokio::time::sleep(PROVIDER_BACKOFF * (attempt + 1)).await;
                }
            }
        }
    }
    Err(last)
}

/// Sample every body at one timestamp. Bodies that still fail after
/// retries are omitted and a warning pushed for each.
pub async fn sample_frame(
    provider: &Arc<dyn PositionProvider>,
    timestamp: DateTime<Utc>,
    bodies: &[Body],
    zodiac: ZodiacMode,
    sidereal_frame: Option<&str>,
    warnings: &mut Vec<String>,
) -> PositionFrame {
    let mut frame = PositionFrame::new();
    for &body in bodies {
        match position_with_retry(provider, timestamp, body, zodiac, sidereal_frame).await {
            Ok(pos) => {
                frame.insert(body, pos);
            }
            Err(err) => {
                tracing::warn!(%body, %timestamp, error = %err, "provider lookup skipped");
                warnings.push(format!(
                    "provider_skip:{}:{}",
                    body,
                    timestamp.format("%Y-%m-%dT%H:%M")
                ));
            }
        }
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_cusps(cusps: [f64; 12]) -> HouseFrame {
        HouseFrame {
            ascendant: cusps[0],
            midheaven: cusps[9],
            cusps,
        }
    }

    #[test]
    fn test_house_of_equal_houses() {
        let cusps: [f64; 12] = std::array::from_fn(|i| i as f64 * 30.0);
        let frame = frame_with_cusps(cusps);
        assert_eq!(frame.house_of(0.0), 1);
        assert_eq!(frame.house_of(29.9), 1);
        assert_eq!(frame.house_of(30.0), 2);
        assert_eq!(frame.house_of(359.9), 12);
    }

    #[test]
    fn test_house_of_wrapping_cusp() {
        // First house spans 340° -> 10°.
        let mut cusps: [f64; 12] = std::array::from_fn(|i| 340.0 + i as f64 * 30.0);
        for c in &mut cusps {
            *c %= 360.0;
        }
        let frame = frame_with_cusps(cusps);
        assert_eq!(frame.house_of(350.0), 1);
        assert_eq!(frame.house_of(5.0), 1);
        assert_eq!(frame.house_of(15.0), 2);
    }

    #[test]
    fn test_declination_fallback() {
        let pos = BodyPosition {
            body: Body::Mars,
            timestamp: chrono::Utc::now(),
            longitude: 12.0,
            latitude: 1.4,
            distance: 1.2,
            speed: 0.5,
            declination: None,
        };
        assert_eq!(pos.declination_or_latitude(), 1.4);
        assert!(!pos.is_retrograde());
    }
}
