//! Sign ingresses, stations, and retrograde window tracking.
//!
//! These detectors walk consecutive samples of a shared position timeline.
//! Ingress timestamps are interpolated rather than bisected: the boundary
//! is a fixed longitude, so linear interpolation between the bracketing
//! samples is sufficient at scan resolution.

use chrono::{DateTime, Duration, Utc};

use crate::models::angles::{norm360, sign_index, sign_name};
use crate::models::body::Body;
use crate::providers::SampledTimeline;

/// A body crossing from one zodiac sign into the next.
#[derive(Debug, Clone, PartialEq)]
pub struct IngressHit {
    pub body: Body,
    pub timestamp: DateTime<Utc>,
    pub from_sign: &'static str,
    pub to_sign: &'static str,
}

/// A reversal of apparent motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationPhase {
    Retrograde,
    Direct,
}

impl StationPhase {
    pub fn label(&self) -> &'static str {
        match self {
            StationPhase::Retrograde => "station_retrograde",
            StationPhase::Direct => "station_direct",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StationHit {
    pub body: Body,
    pub timestamp: DateTime<Utc>,
    pub phase: StationPhase,
}

/// A retrograde period for a body; `end` is `None` while the body is still
/// retrograde at the window boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrogradeWindow {
    pub body: Body,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

/// Interpolate the instant a longitude crossed a fixed boundary between two
/// samples, unwrapping the 0°/360° seam.
pub fn interpolate_longitude_crossing(
    prev_lon: f64,
    curr_lon: f64,
    prev_ts: DateTime<Utc>,
    curr_ts: DateTime<Utc>,
    boundary: f64,
) -> DateTime<Utc> {
    let prev = norm360(prev_lon);
    let mut curr = norm360(curr_lon);
    let mut bound = norm360(boundary);

    if curr < prev && prev - curr > 180.0 {
        curr += 360.0;
    }
    if bound < prev {
        bound += 360.0;
    }
    if bound > curr && (bound - 360.0) >= prev {
        bound -= 360.0;
    }

    let denom = curr - prev;
    if denom.abs() < 1e-6 {
        return curr_ts;
    }
    let ratio = ((bound - prev) / denom).clamp(0.0, 1.0);
    let span = (curr_ts - prev_ts).num_seconds() as f64;
    prev_ts + Duration::seconds((span * ratio) as i64)
}

/// Interpolate a station instant between two samples with opposite speed
/// signs, proportionally to the speed magnitudes (the speed curve is
/// treated as locally linear).
pub fn interpolate_station(
    prev_speed: f64,
    curr_speed: f64,
    prev_ts: DateTime<Utc>,
    curr_ts: DateTime<Utc>,
) -> DateTime<Utc> {
    let denom = prev_speed.abs() + curr_speed.abs();
    if denom == 0.0 {
        return curr_ts;
    }
    let ratio = (prev_speed.abs() / denom).clamp(0.0, 1.0);
    let span = (curr_ts - prev_ts).num_seconds() as f64;
    prev_ts + Duration::seconds((span * ratio) as i64)
}

/// Detect sign-boundary crossings for one body over the timeline.
pub fn detect_ingresses(timeline: &SampledTimeline, body: Body) -> Vec<IngressHit> {
    let mut hits = Vec::new();
    let mut prev: Option<(DateTime<Utc>, f64)> = None;
    for (ts, frame) in timeline {
        let Some(pos) = frame.get(&body) else { continue };
        if let Some((prev_ts, prev_lon)) = prev {
            let prev_idx = sign_index(prev_lon);
            let curr_idx = sign_index(pos.longitude);
            if curr_idx != prev_idx {
                let boundary = curr_idx as f64 * 30.0;
                let crossing =
                    interpolate_longitude_crossing(prev_lon, pos.longitude, prev_ts, *ts, boundary);
                hits.push(IngressHit {
                    body,
                    timestamp: crossing,
                    from_sign: sign_name(prev_lon),
                    to_sign: sign_name(pos.longitude),
                });
            }
        }
        prev = Some((*ts, pos.longitude));
    }
    hits
}

/// Detect speed-sign reversals for one body over the timeline.
pub fn detect_stations(timeline: &SampledTimeline, body: Body) -> Vec<StationHit> {
    if !body.can_station() {
        return Vec::new();
    }
    let mut hits = Vec::new();
    let mut prev: Option<(DateTime<Utc>, f64)> = None;
    for (ts, frame) in timeline {
        let Some(pos) = frame.get(&body) else { continue };
        if let Some((prev_ts, prev_speed)) = prev {
            let was_retro = prev_speed < 0.0;
            let is_retro = pos.speed < 0.0;
            if was_retro != is_retro {
                let station_ts = interpolate_station(prev_speed, pos.speed, prev_ts, *ts);
                hits.push(StationHit {
                    body,
                    timestamp: station_ts,
                    phase: if is_retro {
                        StationPhase::Retrograde
                    } else {
                        StationPhase::Direct
                    },
                });
            }
        }
        prev = Some((*ts, pos.speed));
    }
    hits
}

/// Track retrograde periods for one body over the timeline.
pub fn track_retrograde_windows(timeline: &SampledTimeline, body: Body) -> Vec<RetrogradeWindow> {
    let mut windows: Vec<RetrogradeWindow> = Vec::new();
    let mut open: Option<DateTime<Utc>> = None;
    for (ts, frame) in timeline {
        let Some(pos) = frame.get(&body) else { continue };
        match (open, pos.is_retrograde()) {
            (None, true) => open = Some(*ts),
            (Some(start), false) => {
                windows.push(RetrogradeWindow {
                    body,
                    start,
                    end: Some(*ts),
                });
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        windows.push(RetrogradeWindow {
            body,
            start,
            end: None,
        });
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{BodyPosition, PositionFrame};
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, day, hour, 0, 0).unwrap()
    }

    fn timeline_of(body: Body, samples: &[(DateTime<Utc>, f64, f64)]) -> SampledTimeline {
        samples
            .iter()
            .map(|(t, lon, speed)| {
                let mut frame = PositionFrame::new();
                frame.insert(
                    body,
                    BodyPosition {
                        body,
                        timestamp: *t,
                        longitude: *lon,
                        latitude: 0.0,
                        distance: 1.0,
                        speed: *speed,
                        declination: None,
                    },
                );
                (*t, frame)
            })
            .collect::<Vec<(DateTime<Utc>, BTreeMap<Body, BodyPosition>)>>()
    }

    #[test]
    fn test_ingress_detected_and_interpolated() {
        // Mars moves 29.5° -> 30.5° across a 6-hour step; the boundary at
        // 30° sits halfway.
        let timeline = timeline_of(
            Body::Mars,
            &[(ts(1, 0), 29.5, 0.5), (ts(1, 6), 30.5, 0.5)],
        );
        let hits = detect_ingresses(&timeline, Body::Mars);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].from_sign, "Aries");
        assert_eq!(hits[0].to_sign, "Taurus");
        assert_eq!(hits[0].timestamp, ts(1, 3));
    }

    #[test]
    fn test_ingress_across_pisces_aries_wrap() {
        let timeline = timeline_of(
            Body::Sun,
            &[(ts(1, 0), 359.5, 1.0), (ts(1, 12), 0.5, 1.0)],
        );
        let hits = detect_ingresses(&timeline, Body::Sun);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].from_sign, "Pisces");
        assert_eq!(hits[0].to_sign, "Aries");
        assert_eq!(hits[0].timestamp, ts(1, 6));
    }

    #[test]
    fn test_station_interpolated_by_speed_ratio() {
        // Speed +0.09 -> -0.03 over 12 hours: zero crossing at 3/4 of the
        // interval.
        let timeline = timeline_of(
            Body::Mercury,
            &[(ts(1, 0), 100.0, 0.09), (ts(1, 12), 100.3, -0.03)],
        );
        let hits = detect_stations(&timeline, Body::Mercury);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].phase, StationPhase::Retrograde);
        assert_eq!(hits[0].timestamp, ts(1, 9));
    }

    #[test]
    fn test_sun_never_stations() {
        let timeline = timeline_of(
            Body::Sun,
            &[(ts(1, 0), 10.0, 1.0), (ts(1, 12), 10.5, -1.0)],
        );
        assert!(detect_stations(&timeline, Body::Sun).is_empty());
    }

    #[test]
    fn test_retrograde_window_open_at_boundary() {
        let timeline = timeline_of(
            Body::Saturn,
            &[
                (ts(1, 0), 200.0, 0.05),
                (ts(2, 0), 200.0, -0.02),
                (ts(3, 0), 199.9, -0.02),
            ],
        );
        let windows = track_retrograde_windows(&timeline, Body::Saturn);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start, ts(2, 0));
        assert_eq!(windows[0].end, None);
    }
}
