//! Lunar phase classification and eclipse detection.

use chrono::{DateTime, Utc};

use crate::detection::derived::interpolate_longitude_crossing;
use crate::models::angles::{angle_diff, norm360};
use crate::models::body::Body;
use crate::models::chart::TargetId;
use crate::providers::SampledTimeline;

/// The eight named lunar phases, by sun–moon elongation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LunarPhaseName {
    NewMoon,
    WaxingCrescent,
    FirstQuarter,
    WaxingGibbous,
    FullMoon,
    WaningGibbous,
    LastQuarter,
    WaningCrescent,
}

impl LunarPhaseName {
    const ALL: [LunarPhaseName; 8] = [
        LunarPhaseName::NewMoon,
        LunarPhaseName::WaxingCrescent,
        LunarPhaseName::FirstQuarter,
        LunarPhaseName::WaxingGibbous,
        LunarPhaseName::FullMoon,
        LunarPhaseName::WaningGibbous,
        LunarPhaseName::LastQuarter,
        LunarPhaseName::WaningCrescent,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LunarPhaseName::NewMoon => "new_moon",
            LunarPhaseName::WaxingCrescent => "waxing_crescent",
            LunarPhaseName::FirstQuarter => "first_quarter",
            LunarPhaseName::WaxingGibbous => "waxing_gibbous",
            LunarPhaseName::FullMoon => "full_moon",
            LunarPhaseName::WaningGibbous => "waning_gibbous",
            LunarPhaseName::LastQuarter => "last_quarter",
            LunarPhaseName::WaningCrescent => "waning_crescent",
        }
    }

    /// Base influence weight. Quarter phases dominate; the intermediate
    /// phases carry a token weight so they rank below real checkpoints.
    pub fn weight(&self) -> f64 {
        match self {
            LunarPhaseName::FullMoon => 1.0,
            LunarPhaseName::NewMoon => 0.8,
            LunarPhaseName::FirstQuarter | LunarPhaseName::LastQuarter => 0.5,
            _ => 0.3,
        }
    }
}

/// Classify an elongation (moon ahead of sun, counterclockwise) into the
/// nearest of the eight phases, each centered on a multiple of 45°.
pub fn classify_phase(elongation: f64) -> LunarPhaseName {
    let idx = ((norm360(elongation) + 22.5) / 45.0) as usize % 8;
    LunarPhaseName::ALL[idx]
}

/// A phase-entry moment, with moon geometry interpolated to the crossing.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseHit {
    pub timestamp: DateTime<Utc>,
    pub phase: LunarPhaseName,
    pub elongation: f64,
    pub moon_longitude: f64,
    pub moon_latitude: f64,
}

/// Detect lunar phase entries over the timeline.
///
/// A hit is emitted whenever the phase classification changes between
/// consecutive samples; the timestamp is interpolated to the phase's entry
/// boundary (`center - 22.5°`) on the elongation curve.
pub fn detect_phase_changes(timeline: &SampledTimeline) -> Vec<PhaseHit> {
    let mut hits = Vec::new();
    let mut prev: Option<(DateTime<Utc>, f64, f64, f64)> = None;

    for (ts, frame) in timeline {
        let (Some(sun), Some(moon)) = (frame.get(&Body::Sun), frame.get(&Body::Moon)) else {
            continue;
        };
        let elong = norm360(moon.longitude - sun.longitude);
        if let Some((prev_ts, prev_elong, prev_lat, prev_lon)) = prev {
            let prev_phase = classify_phase(prev_elong);
            let curr_phase = classify_phase(elong);
            if curr_phase != prev_phase {
                let boundary = norm360((curr_phase as usize as f64) * 45.0 - 22.5);
                let crossing =
                    interpolate_longitude_crossing(prev_elong, elong, prev_ts, *ts, boundary);
                let span = (*ts - prev_ts).num_seconds().max(1) as f64;
                let ratio = ((crossing - prev_ts).num_seconds() as f64 / span).clamp(0.0, 1.0);
                let lat = prev_lat + (moon.latitude - prev_lat) * ratio;
                let lon = interpolated_longitude(prev_lon, moon.longitude, ratio);
                hits.push(PhaseHit {
                    timestamp: crossing,
                    phase: curr_phase,
                    elongation: boundary,
                    moon_longitude: lon,
                    moon_latitude: lat,
                });
            }
        }
        prev = Some((*ts, elong, moon.latitude, moon.longitude));
    }
    hits
}

/// Detect exact lunations: the elongation crossing 0° (New Moon) or 180°
/// (Full Moon). Eclipse classification happens at these instants, where
/// the sun–moon axis is exact, not at the broader phase-entry boundary.
pub fn detect_lunations(timeline: &SampledTimeline) -> Vec<PhaseHit> {
    let mut hits = Vec::new();
    let mut prev: Option<(DateTime<Utc>, f64, f64, f64)> = None;

    for (ts, frame) in timeline {
        let (Some(sun), Some(moon)) = (frame.get(&Body::Sun), frame.get(&Body::Moon)) else {
            continue;
        };
        let elong = norm360(moon.longitude - sun.longitude);
        if let Some((prev_ts, prev_elong, prev_lat, prev_lon)) = prev {
            let span = (elong - prev_elong).rem_euclid(360.0);
            for (boundary, phase) in [(0.0, LunarPhaseName::NewMoon), (180.0, LunarPhaseName::FullMoon)] {
                let offset = (boundary - prev_elong).rem_euclid(360.0);
                if offset <= 0.0 || offset > span {
                    continue;
                }
                let crossing =
                    interpolate_longitude_crossing(prev_elong, elong, prev_ts, *ts, boundary);
                let sample_span = (*ts - prev_ts).num_seconds().max(1) as f64;
                let ratio =
                    ((crossing - prev_ts).num_seconds() as f64 / sample_span).clamp(0.0, 1.0);
                hits.push(PhaseHit {
                    timestamp: crossing,
                    phase,
                    elongation: boundary,
                    moon_longitude: interpolated_longitude(prev_lon, moon.longitude, ratio),
                    moon_latitude: prev_lat + (moon.latitude - prev_lat) * ratio,
                });
            }
        }
        prev = Some((*ts, elong, moon.latitude, moon.longitude));
    }
    hits
}

fn interpolated_longitude(prev: f64, curr: f64, ratio: f64) -> f64 {
    let mut delta = (curr - prev).rem_euclid(360.0);
    if delta > 180.0 {
        delta -= 360.0;
    }
    norm360(prev + delta * ratio)
}

/// Eclipse category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EclipseCategory {
    Solar,
    Lunar,
}

impl EclipseCategory {
    pub fn name(&self) -> &'static str {
        match self {
            EclipseCategory::Solar => "solar",
            EclipseCategory::Lunar => "lunar",
        }
    }
}

/// A classified eclipse at a lunation.
#[derive(Debug, Clone, PartialEq)]
pub struct EclipseHit {
    pub timestamp: DateTime<Utc>,
    pub category: EclipseCategory,
    /// `total/annular`, `total`, or `partial`.
    pub kind: &'static str,
    /// Fixed severity weight for the magnitude class.
    pub weight: f64,
    /// Boost when the eclipse falls close to a natal key point.
    pub personalization: f64,
    pub moon_latitude: f64,
}

impl EclipseHit {
    /// Severity with the personalization boost applied.
    pub fn severity(&self) -> f64 {
        self.weight * (1.0 + self.personalization)
    }
}

// Eclipse geometry thresholds (degrees of lunar ecliptic latitude).
const SOLAR_ECLIPSE_LAT: f64 = 1.5;
const LUNAR_ECLIPSE_LAT: f64 = 1.0;
const SOLAR_CENTRAL_LAT: f64 = 0.5;
const LUNAR_TOTAL_LAT: f64 = 0.3;

/// Classify an eclipse at a New or Full Moon.
///
/// `natal_key_points` are the longitudes of natal Sun/Moon/ASC/MC; an
/// eclipse within 2° of one gains a personalization boost, within 1° a
/// larger one.
pub fn check_eclipse(
    phase: &PhaseHit,
    natal_key_points: &[(TargetId, f64)],
) -> Option<EclipseHit> {
    let abs_lat = phase.moon_latitude.abs();
    let (category, kind, weight) = match phase.phase {
        LunarPhaseName::NewMoon if abs_lat <= SOLAR_ECLIPSE_LAT => {
            if abs_lat <= SOLAR_CENTRAL_LAT {
                (EclipseCategory::Solar, "total/annular", 2.2)
            } else {
                (EclipseCategory::Solar, "partial", 1.4)
            }
        }
        LunarPhaseName::FullMoon if abs_lat <= LUNAR_ECLIPSE_LAT => {
            if abs_lat <= LUNAR_TOTAL_LAT {
                (EclipseCategory::Lunar, "total", 2.0)
            } else {
                (EclipseCategory::Lunar, "partial", 1.2)
            }
        }
        _ => return None,
    };

    let mut personalization: f64 = 0.0;
    for (_, lon) in natal_key_points {
        let diff = angle_diff(phase.moon_longitude, *lon);
        if diff <= 1.0 {
            personalization = personalization.max(0.4);
        } else if diff <= 2.0 {
            personalization = personalization.max(0.2);
        }
    }

    Some(EclipseHit {
        timestamp: phase.timestamp,
        category,
        kind,
        weight,
        personalization,
        moon_latitude: phase.moon_latitude,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{BodyPosition, PositionFrame};
    use chrono::TimeZone;

    #[test]
    fn test_phase_classification() {
        assert_eq!(classify_phase(0.0), LunarPhaseName::NewMoon);
        assert_eq!(classify_phase(350.0), LunarPhaseName::NewMoon);
        assert_eq!(classify_phase(45.0), LunarPhaseName::WaxingCrescent);
        assert_eq!(classify_phase(90.0), LunarPhaseName::FirstQuarter);
        assert_eq!(classify_phase(180.0), LunarPhaseName::FullMoon);
        assert_eq!(classify_phase(200.0), LunarPhaseName::WaningGibbous);
        assert_eq!(classify_phase(270.0), LunarPhaseName::LastQuarter);
        assert_eq!(classify_phase(315.0), LunarPhaseName::WaningCrescent);
    }

    #[test]
    fn test_quarter_weights_dominate() {
        assert!(LunarPhaseName::FullMoon.weight() > LunarPhaseName::WaxingGibbous.weight());
        assert!(LunarPhaseName::NewMoon.weight() > LunarPhaseName::WaningCrescent.weight());
    }

    fn lunation_timeline(
        elongs: &[(u32, f64, f64)], // (hour, elongation, moon_lat)
    ) -> SampledTimeline {
        elongs
            .iter()
            .map(|(hour, elong, lat)| {
                let ts = Utc.with_ymd_and_hms(2025, 9, 7, *hour, 0, 0).unwrap();
                let mut frame = PositionFrame::new();
                frame.insert(
                    Body::Sun,
                    BodyPosition {
                        body: Body::Sun,
                        timestamp: ts,
                        longitude: 165.0,
                        latitude: 0.0,
                        distance: 1.0,
                        speed: 1.0,
                        declination: None,
                    },
                );
                frame.insert(
                    Body::Moon,
                    BodyPosition {
                        body: Body::Moon,
                        timestamp: ts,
                        longitude: norm360(165.0 + elong),
                        latitude: *lat,
                        distance: 0.0026,
                        speed: 13.2,
                        declination: None,
                    },
                );
                (ts, frame)
            })
            .collect()
    }

    #[test]
    fn test_full_moon_entry_detected() {
        // Elongation crosses the full-moon entry boundary (157.5°).
        let timeline = lunation_timeline(&[(0, 150.0, 0.2), (12, 160.0, 0.2)]);
        let hits = detect_phase_changes(&timeline);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].phase, LunarPhaseName::FullMoon);
        assert!((hits[0].elongation - 157.5).abs() < 1e-9);
    }

    #[test]
    fn test_exact_lunation_detected_at_opposition() {
        // Elongation 176° -> 184° across 12 h: the exact Full Moon at 180°
        // sits halfway.
        let timeline = lunation_timeline(&[(0, 176.0, 0.4), (12, 184.0, 0.6)]);
        let lunations = detect_lunations(&timeline);
        assert_eq!(lunations.len(), 1);
        assert_eq!(lunations[0].phase, LunarPhaseName::FullMoon);
        assert!((lunations[0].elongation - 180.0).abs() < 1e-9);
        assert_eq!(
            lunations[0].timestamp,
            Utc.with_ymd_and_hms(2025, 9, 7, 6, 0, 0).unwrap()
        );
        // Latitude interpolated to the crossing.
        assert!((lunations[0].moon_latitude - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_new_moon_crossing_across_wrap() {
        let timeline = lunation_timeline(&[(0, 356.0, 0.1), (12, 4.0, 0.1)]);
        let lunations = detect_lunations(&timeline);
        assert_eq!(lunations.len(), 1);
        assert_eq!(lunations[0].phase, LunarPhaseName::NewMoon);
    }

    #[test]
    fn test_no_lunation_without_boundary_crossing() {
        let timeline = lunation_timeline(&[(0, 100.0, 0.1), (12, 108.0, 0.1)]);
        assert!(detect_lunations(&timeline).is_empty());
    }

    #[test]
    fn test_lunar_eclipse_at_low_latitude() {
        let hit = PhaseHit {
            timestamp: Utc.with_ymd_and_hms(2025, 9, 7, 18, 0, 0).unwrap(),
            phase: LunarPhaseName::FullMoon,
            elongation: 157.5,
            moon_longitude: 345.0,
            moon_latitude: 0.2,
        };
        let eclipse = check_eclipse(&hit, &[]).unwrap();
        assert_eq!(eclipse.category, EclipseCategory::Lunar);
        assert_eq!(eclipse.kind, "total");
        assert_eq!(eclipse.weight, 2.0);
        assert_eq!(eclipse.personalization, 0.0);
    }

    #[test]
    fn test_solar_eclipse_partial_band() {
        let hit = PhaseHit {
            timestamp: Utc.with_ymd_and_hms(2025, 3, 29, 10, 0, 0).unwrap(),
            phase: LunarPhaseName::NewMoon,
            elongation: 337.5,
            moon_longitude: 9.0,
            moon_latitude: 1.1,
        };
        let eclipse = check_eclipse(&hit, &[]).unwrap();
        assert_eq!(eclipse.category, EclipseCategory::Solar);
        assert_eq!(eclipse.kind, "partial");
        assert_eq!(eclipse.weight, 1.4);
    }

    #[test]
    fn test_no_eclipse_when_moon_far_from_node() {
        let hit = PhaseHit {
            timestamp: Utc.with_ymd_and_hms(2025, 9, 7, 18, 0, 0).unwrap(),
            phase: LunarPhaseName::FullMoon,
            elongation: 157.5,
            moon_longitude: 345.0,
            moon_latitude: 4.8,
        };
        assert!(check_eclipse(&hit, &[]).is_none());
    }

    #[test]
    fn test_personalization_boost_tiers() {
        let hit = PhaseHit {
            timestamp: Utc.with_ymd_and_hms(2025, 9, 7, 18, 0, 0).unwrap(),
            phase: LunarPhaseName::NewMoon,
            elongation: 337.5,
            moon_longitude: 100.0,
            moon_latitude: 0.4,
        };
        let near = vec![(TargetId::Body(Body::Sun), 100.6)];
        let close = vec![(TargetId::Body(Body::Sun), 101.8)];
        assert_eq!(check_eclipse(&hit, &near).unwrap().personalization, 0.4);
        assert_eq!(check_eclipse(&hit, &close).unwrap().personalization, 0.2);
        let e = check_eclipse(&hit, &near).unwrap();
        assert!((e.severity() - 2.2 * 1.4).abs() < 1e-9);
    }
}
