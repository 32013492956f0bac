//! Shared fixtures: a deterministic synthetic sky and chart/options
//! builders.
#![allow(dead_code)] // not every test binary uses every fixture
//!
//! The synthetic provider models each body as linear motion plus an
//! optional sinusoidal oscillation, which is enough to produce ingresses,
//! stations, lunations, and retrograde passes with fully reproducible
//! geometry.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use astrocast::api::{
    Body, BodyPosition, ChartSpec, GeoLocation, HouseFrame, HouseProvider, HouseSystem,
    PositionProvider, ProviderError, RawOptions, ZodiacMode,
};

/// Reference instant for motion models.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
}

fn days_since_epoch(ts: DateTime<Utc>) -> f64 {
    (ts - epoch()).num_seconds() as f64 / 86_400.0
}

/// Linear-plus-sinusoid longitude model.
#[derive(Debug, Clone, Copy)]
pub struct MotionModel {
    /// Longitude at the epoch, degrees.
    pub base: f64,
    /// Mean motion, degrees/day.
    pub trend: f64,
    /// Oscillation amplitude, degrees (zero for no retrograde loops).
    pub amp: f64,
    pub period_days: f64,
    pub phase_offset_days: f64,
    /// Ecliptic latitude amplitude, degrees.
    pub lat_amp: f64,
    pub lat_period_days: f64,
}

impl MotionModel {
    pub fn linear(base: f64, trend: f64) -> Self {
        MotionModel {
            base,
            trend,
            amp: 0.0,
            period_days: 1.0,
            phase_offset_days: 0.0,
            lat_amp: 0.0,
            lat_period_days: 1.0,
        }
    }

    fn longitude(&self, d: f64) -> f64 {
        let osc = if self.amp == 0.0 {
            0.0
        } else {
            self.amp
                * (std::f64::consts::TAU * (d - self.phase_offset_days) / self.period_days).sin()
        };
        (self.base + self.trend * d + osc).rem_euclid(360.0)
    }

    fn speed(&self, d: f64) -> f64 {
        let osc = if self.amp == 0.0 {
            0.0
        } else {
            self.amp * std::f64::consts::TAU / self.period_days
                * (std::f64::consts::TAU * (d - self.phase_offset_days) / self.period_days).cos()
        };
        self.trend + osc
    }

    fn latitude(&self, d: f64) -> f64 {
        if self.lat_amp == 0.0 {
            0.0
        } else {
            self.lat_amp
                * (std::f64::consts::TAU * (d - self.phase_offset_days) / self.lat_period_days)
                    .sin()
        }
    }
}

/// Deterministic position provider with a call counter.
pub struct SyntheticSky {
    models: BTreeMap<Body, MotionModel>,
    pub calls: AtomicUsize,
}

impl SyntheticSky {
    /// A sky with plausible mean motions for every natal body.
    pub fn standard() -> Self {
        let mut models = BTreeMap::new();
        models.insert(Body::Sun, MotionModel::linear(280.46, 0.9856));
        let mut moon = MotionModel::linear(218.32, 13.176);
        moon.lat_amp = 5.1;
        moon.lat_period_days = 27.21;
        models.insert(Body::Moon, moon);
        models.insert(Body::Mercury, MotionModel::linear(252.25, 1.383));
        models.insert(Body::Venus, MotionModel::linear(181.98, 1.602));
        models.insert(Body::Mars, MotionModel::linear(355.45, 0.524));
        models.insert(Body::Jupiter, MotionModel::linear(34.35, 0.083));
        models.insert(Body::Saturn, MotionModel::linear(50.08, 0.0334));
        models.insert(Body::Uranus, MotionModel::linear(314.05, 0.0117));
        models.insert(Body::Neptune, MotionModel::linear(304.35, 0.006));
        models.insert(Body::Pluto, MotionModel::linear(238.93, 0.004));
        models.insert(Body::TrueNode, MotionModel::linear(125.04, -0.0529));
        models.insert(Body::MeanNode, MotionModel::linear(125.04, -0.0529));
        models.insert(Body::Chiron, MotionModel::linear(50.0, 0.055));
        SyntheticSky {
            models,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_model(&mut self, body: Body, model: MotionModel) {
        self.models.insert(body, model);
    }

    /// Longitude straight from the model, without going through the trait.
    pub fn model_longitude(&self, body: Body, ts: DateTime<Utc>) -> f64 {
        self.models[&body].longitude(days_since_epoch(ts))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PositionProvider for SyntheticSky {
    async fn position(
        &self,
        timestamp: DateTime<Utc>,
        body: Body,
        _zodiac: ZodiacMode,
        _sidereal_frame: Option<&str>,
    ) -> Result<BodyPosition, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let model = self
            .models
            .get(&body)
            .ok_or_else(|| ProviderError::UnsupportedBody(body.to_string()))?;
        let d = days_since_epoch(timestamp);
        Ok(BodyPosition {
            body,
            timestamp,
            longitude: model.longitude(d),
            latitude: model.latitude(d),
            distance: 1.0,
            speed: model.speed(d),
            declination: None,
        })
    }
}

/// Equal houses anchored at a fixed ascendant.
pub struct EqualHouses {
    pub ascendant: f64,
}

#[async_trait]
impl HouseProvider for EqualHouses {
    async fn houses(
        &self,
        _timestamp: DateTime<Utc>,
        _latitude: f64,
        _longitude: f64,
        _system: HouseSystem,
    ) -> Result<HouseFrame, ProviderError> {
        let cusps: [f64; 12] = std::array::from_fn(|i| (self.ascendant + i as f64 * 30.0) % 360.0);
        Ok(HouseFrame {
            ascendant: self.ascendant,
            midheaven: (self.ascendant + 270.0) % 360.0,
            cusps,
        })
    }
}

/// Fixed reference chart used across the suite.
pub fn chart_spec() -> ChartSpec {
    ChartSpec {
        birth: Utc.with_ymd_and_hms(1990, 5, 15, 9, 0, 0).unwrap(),
        location: GeoLocation {
            latitude: 28.6139,
            longitude: 77.209,
        },
        zodiac: ZodiacMode::Tropical,
        house_system: HouseSystem::Placidus,
        sidereal_frame: None,
        time_known: true,
    }
}

/// Options mirroring a full production request: tight step, low strength
/// cutoffs, every stream enabled.
pub fn full_options(year: i32) -> RawOptions {
    let mut raw = RawOptions {
        year,
        ..RawOptions::default()
    };
    raw.timezone = Some("UTC+5:30".to_string());
    raw.detection.scan_step_hours = 6;
    raw.detection.min_strength = 0.2;
    raw.performance.early_drop_below_score = 0.2;
    raw.performance.max_grid_points = 20_000;
    raw.transits.bodies = vec![
        "Sun".into(),
        "Moon".into(),
        "Mars".into(),
        "Jupiter".into(),
        "Saturn".into(),
    ];
    raw.transits.include_ingresses = true;
    raw.transits.include_stations = true;
    raw.transits.include_retrogrades = true;
    raw.aspects.to_angles = vec!["ASC".into(), "MC".into(), "DSC".into(), "IC".into()];
    raw.versioning
        .insert("algo_version".to_string(), "fc-2025.08".to_string());
    raw
}

/// Narrow options for cheap runs: few bodies, coarse step, transit stream
/// only.
pub fn lean_options(year: i32) -> RawOptions {
    let mut raw = RawOptions {
        year,
        ..RawOptions::default()
    };
    raw.detection.scan_step_hours = 24;
    raw.transits.bodies = vec!["Sun".into(), "Saturn".into()];
    raw.transits.include_lunations = false;
    raw.transits.include_eclipses = false;
    raw.performance.max_grid_points = 20_000;
    raw
}

/// Install a test subscriber once so `RUST_LOG` surfaces engine warnings
/// during debugging.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn standard_sky() -> Arc<SyntheticSky> {
    Arc::new(SyntheticSky::standard())
}

pub fn equal_houses() -> Arc<EqualHouses> {
    Arc::new(EqualHouses { ascendant: 0.0 })
}
