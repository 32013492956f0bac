//! Pipeline orchestration.
//!
//! [`ForecastEngine`] owns the providers, the validated configuration, and
//! the month cache, and drives detection end to end: scan, refine, score,
//! deduplicate, aggregate. Months are computed concurrently; a failed or
//! timed-out month degrades to a warning instead of aborting the run.

pub mod cache;
pub mod canonical;
pub mod dedup;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{ForecastConfig, Section};
use crate::detection::aspects::{scan_frame, match_position, RawHit};
use crate::detection::declination::{detect_declination_contacts, DeclinationKind};
use crate::detection::derived::{
    detect_ingresses, detect_stations, track_retrograde_windows, RetrogradeWindow, StationPhase,
};
use crate::detection::grid::{plan_grid, ScanGrid};
use crate::detection::houses::{detect_house_crossings, refine_house_crossing};
use crate::detection::lunar::{check_eclipse, detect_lunations, detect_phase_changes};
use crate::detection::midpoint::{detect_midpoint_crossings, NatalMidpoint};
use crate::detection::refine::{bisect_separation, Refined};
use crate::error::{EngineError, Result};
use crate::models::angles::{angle_diff, sign_name};
use crate::models::body::Body;
use crate::models::chart::{
    AngleName, GeoLocation, HouseSystem, NatalTarget, ReferenceChart, TargetId, TargetKind,
    ZodiacMode,
};
use crate::models::event::{Event, EventType, Stream, Tag, TagSet};
use crate::providers::{
    position_with_retry, sample_frame, HouseFrame, HouseProvider, PositionProvider,
    SampledTimeline,
};
use crate::report::{self, ForecastReport, RunMeta, TimezoneMeta};
use crate::scoring::{score, ScoreInput};
use crate::timezone::resolve_timezone;
use cache::{Clock, MonthCache, SystemClock};

/// Bodies resolved into the natal chart.
const NATAL_BODIES: [Body; 12] = [
    Body::Sun,
    Body::Moon,
    Body::Mercury,
    Body::Venus,
    Body::Mars,
    Body::Jupiter,
    Body::Saturn,
    Body::Uranus,
    Body::Neptune,
    Body::Pluto,
    Body::TrueNode,
    Body::Chiron,
];

/// Chart input: everything needed to resolve the reference chart.
#[derive(Debug, Clone)]
pub struct ChartSpec {
    pub birth: DateTime<Utc>,
    pub location: GeoLocation,
    pub zodiac: ZodiacMode,
    pub house_system: HouseSystem,
    pub sidereal_frame: Option<String>,
    pub time_known: bool,
}

/// Cached result of one month's detection.
#[derive(Debug, Clone)]
struct MonthOutcome {
    events: Vec<Event>,
    warnings: Vec<String>,
    retro_windows: Vec<RetrogradeWindow>,
}

/// The forecast engine: a deterministic function from (reference chart,
/// window, configuration) to a scored, deduplicated event set.
pub struct ForecastEngine {
    chart: ReferenceChart,
    config: Arc<ForecastConfig>,
    positions: Arc<dyn PositionProvider>,
    houses: Option<Arc<dyn HouseProvider>>,
    natal_frame: Option<HouseFrame>,
    cache: MonthCache<MonthOutcome>,
    construction_warnings: Vec<String>,
}

impl ForecastEngine {
    /// Resolve the reference chart and build an engine with the system
    /// clock.
    pub async fn new(
        spec: ChartSpec,
        config: ForecastConfig,
        positions: Arc<dyn PositionProvider>,
        houses: Option<Arc<dyn HouseProvider>>,
    ) -> Result<Self> {
        Self::with_clock(spec, config, positions, houses, Arc::new(SystemClock)).await
    }

    /// Resolve the reference chart and build an engine with an injected
    /// clock (tests drive TTL expiry through this).
    pub async fn with_clock(
        spec: ChartSpec,
        config: ForecastConfig,
        positions: Arc<dyn PositionProvider>,
        houses: Option<Arc<dyn HouseProvider>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let mut warnings = Vec::new();
        let mut targets = Vec::new();

        for body in NATAL_BODIES {
            match position_with_retry(
                &positions,
                spec.birth,
                body,
                spec.zodiac,
                spec.sidereal_frame.as_deref(),
            )
            .await
            {
                Ok(pos) => targets.push(NatalTarget {
                    id: TargetId::Body(body),
                    longitude: pos.longitude,
                    speed: pos.speed,
                    latitude: pos.declination_or_latitude(),
                }),
                Err(err) => {
                    tracing::warn!(%body, error = %err, "natal position unavailable");
                    warnings.push(format!("natal_skip:{}", body));
                }
            }
        }
        if targets.is_empty() {
            return Err(EngineError::InvalidChart(
                "no natal positions could be resolved".to_string(),
            ));
        }

        let mut natal_frame = None;
        if spec.time_known {
            if let Some(houses) = &houses {
                match houses
                    .houses(
                        spec.birth,
                        spec.location.latitude,
                        spec.location.longitude,
                        spec.house_system,
                    )
                    .await
                {
                    Ok(frame) => {
                        let angles = [
                            (AngleName::Asc, frame.ascendant),
                            (AngleName::Mc, frame.midheaven),
                            (AngleName::Dsc, (frame.ascendant + 180.0) % 360.0),
                            (AngleName::Ic, (frame.midheaven + 180.0) % 360.0),
                        ];
                        for (name, lon) in angles {
                            targets.push(NatalTarget {
                                id: TargetId::Angle(name),
                                longitude: lon,
                                speed: 0.0,
                                latitude: 0.0,
                            });
                        }
                        natal_frame = Some(frame);
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "house frame unavailable");
                        warnings.push("houses_unavailable".to_string());
                    }
                }
            }
        }

        let chart = ReferenceChart {
            birth: spec.birth,
            location: spec.location,
            zodiac: spec.zodiac,
            house_system: spec.house_system,
            sidereal_frame: spec.sidereal_frame,
            time_known: spec.time_known,
            targets,
        };

        let ttl = Duration::days(config.performance.month_cache_ttl_days);
        Ok(ForecastEngine {
            chart,
            config: Arc::new(config),
            positions,
            houses,
            natal_frame,
            cache: MonthCache::new(ttl, clock),
            construction_warnings: warnings,
        })
    }

    pub fn chart(&self) -> &ReferenceChart {
        &self.chart
    }

    /// Run the full pipeline for the configured year.
    pub async fn run(&self) -> Result<ForecastReport> {
        let (events, warnings, timezone) = self.collect().await?;
        Ok(self.assemble_report(events, warnings, timezone))
    }

    /// Run detection only, returning the final deduplicated event list.
    pub async fn collect_events(&self) -> Result<Vec<Event>> {
        self.collect().await.map(|(events, _, _)| events)
    }

    async fn collect(
        &self,
    ) -> Result<(Vec<Event>, Vec<String>, crate::timezone::ResolvedTimezone)> {
        let config = &self.config;
        let mut warnings = self.construction_warnings.clone();
        let timezone = resolve_timezone(
            config.timezone.as_deref(),
            config.tz_resolution,
            &mut warnings,
        );

        // Twelve months, concurrently, each behind the single-flight cache
        // and an independent timeout.
        let month_futures = (1..=12u32).map(|month| self.month_events(month));
        let outcomes = futures::future::join_all(month_futures).await;

        let mut events: Vec<Event> = Vec::new();
        let mut retro_windows: Vec<RetrogradeWindow> = Vec::new();
        for (idx, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Some(outcome) => {
                    events.extend(outcome.events);
                    warnings.extend(outcome.warnings);
                    retro_windows.extend(outcome.retro_windows);
                }
                None => warnings.push(format!("month_failed:{:02}", idx + 1)),
            }
        }

        events.extend(self.progression_events(&mut warnings).await);
        events.extend(self.solar_return_events(&mut warnings).await);
        events.extend(self.house_events(&mut warnings).await);

        if config.detection.group_retrograde_campaigns {
            events = dedup::group_campaigns(
                events,
                &config.detection,
                &retro_windows,
                &self.chart,
                &config.canonical_fields,
            );
        }

        let tolerance = Duration::minutes((config.detection.dedup_tolerance_hours * 60.0) as i64);
        let mut events = dedup::deduplicate(events, tolerance);
        report::sort_events(&mut events);

        dedup_warnings(&mut warnings);
        Ok((events, warnings, timezone))
    }

    // ------------------------------------------------------------------
    // Month computation
    // ------------------------------------------------------------------

    /// Compute (or fetch) one month, bounded by the configured timeout.
    /// Returns `None` when the month timed out.
    async fn month_events(&self, month: u32) -> Option<MonthOutcome> {
        let config = &self.config;
        let key = canonical::month_cache_key(
            &self.chart,
            config.year,
            month,
            &config.transits.bodies,
            config.detection.scan_step_hours,
            &config.orb_table.fingerprint(),
        );
        let timeout = std::time::Duration::from_secs(config.performance.month_timeout_secs);
        tokio::time::timeout(
            timeout,
            self.cache
                .get_or_compute(&key, || self.compute_month(month)),
        )
        .await
        .ok()
    }

    fn month_window(&self, month: u32) -> (DateTime<Utc>, DateTime<Utc>) {
        let year = self.config.year;
        let start = Utc
            .with_ymd_and_hms(year, month, 1, 0, 0, 0)
            .single()
            .expect("valid month start");
        let end = if month == 12 {
            Utc.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0)
        } else {
            Utc.with_ymd_and_hms(year, month + 1, 1, 0, 0, 0)
        }
        .single()
        .expect("valid month end");
        (start, end)
    }

    /// Sample the month's timeline and run every enabled detector on it.
    async fn compute_month(&self, month: u32) -> MonthOutcome {
        let config = &self.config;
        let mut warnings = Vec::new();
        let (start, end) = self.month_window(month);

        let plan = plan_grid(
            start,
            end,
            config.detection.scan_step_hours,
            config.transits.bodies.len(),
            config.performance.max_grid_points,
        );
        if plan.capped {
            tracing::warn!(month, step_hours = plan.step_hours, "grid points capped");
            warnings.push("grid_points_capped".to_string());
        }

        let timeline = self.sample_timeline(start, end, plan.step_hours, &mut warnings).await;
        let mut events = Vec::new();

        // Aspect scan: one provider frame per timestamp, shared by all
        // natal targets.
        for (ts, frame) in &timeline {
            let hits = scan_frame(*ts, frame, &self.chart.targets, &config.aspects, &config.orb_table);
            for hit in hits {
                if let Some(event) = self.transit_event_from_hit(&hit).await {
                    events.push(event);
                }
            }
        }

        events.extend(self.ingress_station_events(&timeline));
        events.extend(self.midpoint_events(&timeline, plan.step_hours));
        events.extend(self.declination_events(&timeline));
        events.extend(self.lunation_events(&timeline));

        // Retrograde windows only feed campaign metadata and the
        // retrograde tracking output.
        let retro_windows = if config.transits.include_retrogrades
            || config.detection.group_retrograde_campaigns
        {
            config
                .transits
                .bodies
                .iter()
                .flat_map(|body| track_retrograde_windows(&timeline, *body))
                .collect()
        } else {
            Vec::new()
        };

        MonthOutcome {
            events,
            warnings,
            retro_windows,
        }
    }

    async fn sample_timeline(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step_hours: u32,
        warnings: &mut Vec<String>,
    ) -> SampledTimeline {
        let mut timeline = Vec::new();
        for ts in ScanGrid::new(start, end, step_hours) {
            let frame = sample_frame(
                &self.positions,
                ts,
                &self.config.transits.bodies,
                self.chart.zodiac,
                self.chart.sidereal_frame.as_deref(),
                warnings,
            )
            .await;
            timeline.push((ts, frame));
        }
        timeline
    }

    /// Longitude of a body at an arbitrary instant (refinement evaluator).
    async fn longitude_at(&self, ts: DateTime<Utc>, body: Body) -> std::result::Result<f64, crate::error::ProviderError> {
        position_with_retry(
            &self.positions,
            ts,
            body,
            self.chart.zodiac,
            self.chart.sidereal_frame.as_deref(),
        )
        .await
        .map(|p| p.longitude)
    }

    /// Build a scored transit event from a raw aspect hit, refining the
    /// timestamp by bisection between the neighboring grid samples.
    async fn transit_event_from_hit(&self, hit: &RawHit) -> Option<Event> {
        let config = &self.config;

        let orb_strength = 1.0 - (hit.orb / hit.orb_limit.max(1e-6)).min(1.0);
        if orb_strength < config.filters.min_orb_strength {
            return None;
        }

        let mut tags = TagSet::new();
        if hit.transit_speed < 0.0 {
            tags.insert(Tag::Retrograde);
        }
        let angle = hit.natal_target.angle();
        if angle.is_some() {
            tags.insert(Tag::Angle);
        }

        let mut timestamp = hit.timestamp;
        if config.detection.refine_exact {
            // Bracket one grid step to either side of the coarse hit; the
            // refined instant may overshoot the month boundary by at most
            // that tolerance.
            let step = Duration::hours(config.detection.scan_step_hours as i64);
            let lo = hit.timestamp - step;
            let hi = hit.timestamp + step;
            let natal_lon = hit.natal_longitude;
            let body = hit.transit_body;
            let refined = bisect_separation(lo, hi, hit.aspect.angle(), |ts| async move {
                self.longitude_at(ts, body).await.map(|lon| angle_diff(lon, natal_lon))
            })
            .await;
            match refined {
                Ok(Refined::Converged(ts)) => timestamp = ts,
                Ok(Refined::Exhausted(_)) => {
                    // Keep the coarse grid timestamp; mark the precision.
                    tags.insert(Tag::LowPrecision);
                }
                Err(_) => {
                    tags.insert(Tag::LowPrecision);
                }
            }
        }

        let input = ScoreInput {
            stream: Stream::Transit,
            transit_body: hit.transit_body,
            aspect: Some(hit.aspect),
            orb: hit.orb,
            orb_limit: hit.orb_limit,
            applying: hit.applying,
            angle,
            house_change: false,
            tags,
        };
        let scored = score(
            &input,
            &config.scoring,
            &config.aspects,
            config.detection.min_strength,
        )?;
        if scored.score < config.performance.early_drop_below_score {
            return None;
        }

        let phase = if hit.applying { "Applying" } else { "Separating" };
        let motion = if hit.transit_speed < 0.0 { "retrograde" } else { "direct" };
        let mut event = Event {
            id: String::new(),
            stream: Stream::Transit,
            event_type: EventType::Transit,
            timestamp,
            transit_body: hit.transit_body,
            natal_target: Some(hit.natal_target),
            aspect: Some(hit.aspect),
            orb: hit.orb,
            orb_limit: hit.orb_limit,
            score: scored.score,
            applying: hit.applying,
            tags,
            angle,
            house: None,
            metadata: serde_json::Map::new(),
        };
        event.set_note(format!(
            "{} {} at {:.2}° orb. {} in {}; {} in {}.",
            phase,
            hit.aspect,
            hit.orb,
            hit.transit_body,
            sign_name(hit.transit_longitude),
            hit.natal_target,
            sign_name(hit.natal_longitude),
        ));
        event
            .metadata
            .insert("transit_sign".into(), Value::from(sign_name(hit.transit_longitude)));
        event
            .metadata
            .insert("natal_sign".into(), Value::from(sign_name(hit.natal_longitude)));
        event
            .metadata
            .insert("transit_motion".into(), Value::from(motion));
        event
            .metadata
            .insert("score_breakdown".into(), Value::Object(scored.breakdown));
        canonical::assign_id(&mut event, &self.chart, &config.canonical_fields);
        Some(event)
    }

    // ------------------------------------------------------------------
    // Derived detectors
    // ------------------------------------------------------------------

    fn ingress_station_events(&self, timeline: &SampledTimeline) -> Vec<Event> {
        let config = &self.config;
        let mut events = Vec::new();

        for &body in &config.transits.bodies {
            if config.transits.include_ingresses {
                for hit in detect_ingresses(timeline, body) {
                    let mut event = self.derived_event(
                        EventType::Ingress,
                        hit.timestamp,
                        body,
                        None,
                        TagSet::new(),
                        false,
                    );
                    event.set_note(format!("{} enters {}", body, hit.to_sign));
                    event.metadata.insert("from_sign".into(), Value::from(hit.from_sign));
                    event.metadata.insert("to_sign".into(), Value::from(hit.to_sign));
                    events.extend(self.finish_derived(event));
                }
            }
            if config.transits.include_stations {
                for hit in detect_stations(timeline, body) {
                    let tags = TagSet::new().with(Tag::Retrograde).with(Tag::Station);
                    let mut event = self.derived_event(
                        EventType::Station,
                        hit.timestamp,
                        body,
                        None,
                        tags,
                        false,
                    );
                    let direction = match hit.phase {
                        StationPhase::Retrograde => "retrograde",
                        StationPhase::Direct => "direct",
                    };
                    event.set_note(format!("{} station {}", body, direction));
                    event
                        .metadata
                        .insert("station_phase".into(), Value::from(hit.phase.label()));
                    events.extend(self.finish_derived(event));
                }
            }
        }
        events
    }

    fn midpoint_events(&self, timeline: &SampledTimeline, step_hours: u32) -> Vec<Event> {
        let config = &self.config;
        if !config.midpoints.enabled || config.midpoints.pairs.is_empty() {
            return Vec::new();
        }
        let midpoints: Vec<NatalMidpoint> = config
            .midpoints
            .pairs
            .iter()
            .filter_map(|(left, right)| {
                let left_lon = self.chart.body_longitude(*left)?;
                let right_lon = self.chart.body_longitude(*right)?;
                Some(NatalMidpoint::new(*left, left_lon, *right, right_lon))
            })
            .collect();

        let hits = detect_midpoint_crossings(
            timeline,
            &midpoints,
            config.midpoints.orb,
            Duration::hours(step_hours as i64),
        );
        let mut events = Vec::new();
        for hit in hits {
            let tags = TagSet::new().with(Tag::Midpoint);
            let mut event =
                self.derived_event(EventType::Midpoint, hit.timestamp, hit.transit_body, None, tags, false);
            event.aspect = Some(crate::models::aspect::Aspect::Conjunction);
            event.orb = hit.orb;
            event.orb_limit = config.midpoints.orb;
            event.set_note(format!(
                "{} activates {} midpoint",
                hit.transit_body,
                hit.midpoint.label()
            ));
            event
                .metadata
                .insert("midpoint_of".into(), Value::from(hit.midpoint.label()));
            events.extend(self.finish_derived(event));
        }
        events
    }

    fn declination_events(&self, timeline: &SampledTimeline) -> Vec<Event> {
        let config = &self.config;
        let natal_sun = self
            .chart
            .target(TargetId::Body(Body::Sun))
            .map(|t| t.latitude);
        let natal_moon = self
            .chart
            .target(TargetId::Body(Body::Moon))
            .map(|t| t.latitude);
        let hits =
            detect_declination_contacts(timeline, natal_sun, natal_moon, &config.declination);

        let mut events = Vec::new();
        for hit in hits {
            let mut tags = TagSet::new().with(Tag::Declination);
            if hit.kind == DeclinationKind::ContraParallel {
                tags.insert(Tag::ContraParallel);
            }
            let mut event = self.derived_event(
                EventType::DeclinationAspect,
                hit.timestamp,
                hit.transit_body,
                Some(TargetId::Body(hit.natal_body)),
                tags,
                false,
            );
            event.orb = hit.orb;
            event.orb_limit = config.declination.orb;
            event.set_note(format!(
                "{} {} natal {}",
                hit.transit_body,
                hit.kind.name().replace('_', " "),
                hit.natal_body
            ));
            event
                .metadata
                .insert("declination_kind".into(), Value::from(hit.kind.name()));
            events.extend(self.finish_derived(event));
        }
        events
    }

    fn lunation_events(&self, timeline: &SampledTimeline) -> Vec<Event> {
        let config = &self.config;
        if !config.transits.include_lunations && !config.transits.include_eclipses {
            return Vec::new();
        }
        let key_points: Vec<(TargetId, f64)> = [
            TargetId::Body(Body::Sun),
            TargetId::Body(Body::Moon),
            TargetId::Angle(AngleName::Asc),
            TargetId::Angle(AngleName::Mc),
        ]
        .iter()
        .filter_map(|id| self.chart.target(*id).map(|t| (*id, t.longitude)))
        .collect();

        let mut events = Vec::new();
        if config.transits.include_lunations {
            for phase in detect_phase_changes(timeline) {
                let tags = TagSet::new().with(Tag::LunarPhase);
                let mut event = self.derived_event(
                    EventType::LunarPhase,
                    phase.timestamp,
                    Body::Moon,
                    None,
                    tags,
                    false,
                );
                event.set_note(format!("Moon enters {} phase", phase.phase.name().replace('_', " ")));
                event
                    .metadata
                    .insert("phase_name".into(), Value::from(phase.phase.name()));
                event
                    .metadata
                    .insert("phase_weight".into(), Value::from(phase.phase.weight()));
                events.extend(self.finish_derived(event));
            }
        }

        if config.transits.include_eclipses {
            for lunation in detect_lunations(timeline) {
                if let Some(eclipse) = check_eclipse(&lunation, &key_points) {
                    let tags = TagSet::new().with(Tag::Eclipse);
                    let mut event = self.derived_event(
                        EventType::Eclipse,
                        eclipse.timestamp,
                        Body::Moon,
                        None,
                        tags,
                        false,
                    );
                    event.set_note(format!(
                        "{} eclipse ({})",
                        eclipse.category.name(),
                        eclipse.kind
                    ));
                    event
                        .metadata
                        .insert("eclipse_category".into(), Value::from(eclipse.category.name()));
                    event
                        .metadata
                        .insert("eclipse_type".into(), Value::from(eclipse.kind));
                    event
                        .metadata
                        .insert("severity".into(), Value::from(eclipse.severity()));
                    events.extend(self.finish_derived(event));
                }
            }
        }
        events
    }

    /// Skeleton for a derived (non-aspect) event.
    fn derived_event(
        &self,
        event_type: EventType,
        timestamp: DateTime<Utc>,
        body: Body,
        natal_target: Option<TargetId>,
        tags: TagSet,
        applying: bool,
    ) -> Event {
        Event {
            id: String::new(),
            stream: Stream::Transit,
            event_type,
            timestamp,
            transit_body: body,
            natal_target,
            aspect: None,
            orb: 0.0,
            orb_limit: 1.0,
            score: 0.0,
            applying,
            tags,
            angle: None,
            house: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Score a derived event and assign its id; drops candidates below the
    /// strength thresholds.
    fn finish_derived(&self, mut event: Event) -> Option<Event> {
        let config = &self.config;
        let input = ScoreInput {
            stream: event.stream,
            transit_body: event.transit_body,
            aspect: event.aspect,
            orb: event.orb,
            orb_limit: event.orb_limit,
            applying: event.applying,
            angle: event.angle,
            house_change: event.event_type == EventType::HouseChange,
            tags: event.tags,
        };
        let scored = score(
            &input,
            &config.scoring,
            &config.aspects,
            config.detection.min_strength,
        )?;
        if scored.score < config.performance.early_drop_below_score {
            return None;
        }
        event.score = scored.score;
        event
            .metadata
            .insert("score_breakdown".into(), Value::Object(scored.breakdown));
        canonical::assign_id(&mut event, &self.chart, &config.canonical_fields);
        Some(event)
    }

    // ------------------------------------------------------------------
    // Progressions
    // ------------------------------------------------------------------

    /// Secondary progressions via the day-for-a-year method: positions at
    /// `birth + age_in_years` days stand in for the progressed chart.
    async fn progression_events(&self, warnings: &mut Vec<String>) -> Vec<Event> {
        let config = &self.config;
        if !config.progressions.secondary && !config.progressions.solar_arc {
            return Vec::new();
        }

        let anchor = Utc
            .with_ymd_and_hms(config.year, 7, 1, 0, 0, 0)
            .single()
            .expect("mid-year anchor");
        let age_days = (anchor - self.chart.birth).num_seconds() as f64 / 86_400.0;
        let progressed_instant =
            self.chart.birth + Duration::seconds((age_days / 365.25 * 86_400.0) as i64);

        let planet_targets: Vec<NatalTarget> = self
            .chart
            .targets
            .iter()
            .filter(|t| t.kind() == TargetKind::Planet)
            .copied()
            .collect();

        let mut progressed: BTreeMap<Body, (f64, f64)> = BTreeMap::new();
        for target in &planet_targets {
            let TargetId::Body(body) = target.id else { continue };
            match position_with_retry(
                &self.positions,
                progressed_instant,
                body,
                self.chart.zodiac,
                self.chart.sidereal_frame.as_deref(),
            )
            .await
            {
                Ok(pos) => {
                    progressed.insert(body, (pos.longitude, pos.speed));
                }
                Err(err) => {
                    tracing::warn!(%body, error = %err, "progressed position unavailable");
                    warnings.push(format!("progression_skip:{}", body));
                }
            }
        }
        if progressed.is_empty() {
            warnings.push("progressions_unavailable".to_string());
            return Vec::new();
        }

        let mut events = Vec::new();
        if config.progressions.secondary {
            for (body, (lon, speed)) in &progressed {
                let matches = match_position(
                    *lon,
                    *speed,
                    *body,
                    &self.chart.targets,
                    &config.aspects,
                    &config.orb_table,
                );
                for (target, aspect, orb, orb_limit, applying) in matches {
                    let tags = TagSet::new().with(Tag::Progressed);
                    let mut event = Event {
                        id: String::new(),
                        stream: Stream::Progressed,
                        event_type: EventType::Progression,
                        timestamp: anchor,
                        transit_body: *body,
                        natal_target: Some(target),
                        aspect: Some(aspect),
                        orb,
                        orb_limit,
                        score: 0.0,
                        applying,
                        tags,
                        angle: target.angle(),
                        house: None,
                        metadata: serde_json::Map::new(),
                    };
                    event.set_note(format!("Progressed {} {} {}", body, aspect, target));
                    event
                        .metadata
                        .insert("progressed_lon".into(), Value::from(*lon));
                    events.extend(self.finish_derived(event));
                }
            }
        }

        if config.progressions.solar_arc {
            events.extend(self.solar_arc_events(&progressed, anchor));
        }
        events
    }

    /// Solar arc: the progressed Sun's arc applied to every natal body.
    fn solar_arc_events(
        &self,
        progressed: &BTreeMap<Body, (f64, f64)>,
        anchor: DateTime<Utc>,
    ) -> Vec<Event> {
        let Some((sun_prog, _)) = progressed.get(&Body::Sun) else {
            return Vec::new();
        };
        let Some(sun_natal) = self.chart.body_longitude(Body::Sun) else {
            return Vec::new();
        };
        let arc = (sun_prog - sun_natal).rem_euclid(360.0);
        let ts = anchor + Duration::days(31);

        let mut events = Vec::new();
        for target in &self.chart.targets {
            let TargetId::Body(body) = target.id else { continue };
            if body == Body::Sun {
                continue;
            }
            let arc_lon = (target.longitude + arc).rem_euclid(360.0);
            let tags = TagSet::new().with(Tag::Progressed).with(Tag::SolarArc);
            let mut event = Event {
                id: String::new(),
                stream: Stream::Progressed,
                event_type: EventType::SolarArc,
                timestamp: ts,
                transit_body: body,
                natal_target: Some(target.id),
                aspect: None,
                orb: 0.0,
                orb_limit: 1.0,
                score: 0.0,
                applying: true,
                tags,
                angle: None,
                house: None,
                metadata: serde_json::Map::new(),
            };
            event.set_note(format!("Solar arc progression for {}", body));
            event.metadata.insert("solar_arc".into(), Value::from(arc));
            event.metadata.insert("arc_lon".into(), Value::from(arc_lon));
            events.extend(self.finish_derived(event));
        }
        events
    }

    // ------------------------------------------------------------------
    // Solar return
    // ------------------------------------------------------------------

    /// Solve the instant the Sun returns to its natal longitude and emit
    /// the anchor event plus an aspect snapshot of the return chart.
    async fn solar_return_events(&self, warnings: &mut Vec<String>) -> Vec<Event> {
        let config = &self.config;
        if !config.solar_return.enabled {
            return Vec::new();
        }
        let Some(natal_sun) = self.chart.body_longitude(Body::Sun) else {
            warnings.push("solar_return_unavailable".to_string());
            return Vec::new();
        };

        let Some(sr_instant) = self.solve_solar_return(natal_sun).await else {
            warnings.push("solar_return_unresolved".to_string());
            return Vec::new();
        };

        let mut events = Vec::new();
        let tags = TagSet::new().with(Tag::SolarReturn);
        let mut anchor = Event {
            id: String::new(),
            stream: Stream::SolarReturn,
            event_type: EventType::SolarReturn,
            timestamp: sr_instant,
            transit_body: Body::Sun,
            natal_target: Some(TargetId::Body(Body::Sun)),
            aspect: None,
            orb: 0.0,
            orb_limit: 1.0,
            score: 0.0,
            applying: true,
            tags,
            angle: None,
            house: None,
            metadata: serde_json::Map::new(),
        };
        anchor.set_note("Solar return snapshot");
        events.extend(self.finish_derived(anchor));

        // Aspect snapshot of the return sky against the natal chart.
        for &body in &config.transits.bodies {
            let Ok(pos) = position_with_retry(
                &self.positions,
                sr_instant,
                body,
                self.chart.zodiac,
                self.chart.sidereal_frame.as_deref(),
            )
            .await
            else {
                warnings.push(format!("solar_return_skip:{}", body));
                continue;
            };
            let matches = match_position(
                pos.longitude,
                pos.speed,
                body,
                &self.chart.targets,
                &config.aspects,
                &config.orb_table,
            );
            for (target, aspect, orb, orb_limit, applying) in matches {
                let tags = TagSet::new().with(Tag::SolarReturn);
                let mut event = Event {
                    id: String::new(),
                    stream: Stream::SolarReturn,
                    event_type: EventType::SolarReturnAspect,
                    timestamp: sr_instant,
                    transit_body: body,
                    natal_target: Some(target),
                    aspect: Some(aspect),
                    orb,
                    orb_limit,
                    score: 0.0,
                    applying,
                    tags,
                    angle: target.angle(),
                    house: None,
                    metadata: serde_json::Map::new(),
                };
                event.set_note(format!("Solar return {} {} {}", body, aspect, target));
                events.extend(self.finish_derived(event));
            }
        }
        events
    }

    /// Coarse scan near the birthday for a sign change of the Sun's offset
    /// from the natal longitude, then bisection down to the minute.
    async fn solve_solar_return(&self, natal_sun: f64) -> Option<DateTime<Utc>> {
        let year = self.config.year;
        let birth = self.chart.birth;
        let start = Utc
            .with_ymd_and_hms(year, birth.month(), birth.day().min(28), 0, 0, 0)
            .single()?
            - Duration::days(2);
        let end = start + Duration::days(5);

        let offset_at = |ts: DateTime<Utc>| async move {
            self.longitude_at(ts, Body::Sun)
                .await
                .map(|lon| crate::models::angles::signed_angle_diff(lon, natal_sun))
        };

        // Bracket the zero crossing at six-hour resolution.
        let mut prev_ts = start;
        let mut prev_offset = offset_at(prev_ts).await.ok()?;
        let mut bracket = None;
        let mut ts = start + Duration::hours(6);
        while ts <= end {
            let offset = match offset_at(ts).await {
                Ok(v) => v,
                Err(_) => {
                    ts += Duration::hours(6);
                    continue;
                }
            };
            if prev_offset * offset <= 0.0 && prev_offset.abs() < 90.0 && offset.abs() < 90.0 {
                bracket = Some((prev_ts, ts));
                break;
            }
            prev_ts = ts;
            prev_offset = offset;
            ts += Duration::hours(6);
        }
        let (lo, hi) = bracket?;

        let refined = bisect_separation(lo, hi, 0.0, offset_at).await.ok()?;
        Some(refined.timestamp())
    }

    // ------------------------------------------------------------------
    // Houses stream
    // ------------------------------------------------------------------

    /// House blueprint anchor plus cusp-crossing events over the year.
    async fn house_events(&self, warnings: &mut Vec<String>) -> Vec<Event> {
        let config = &self.config;
        if !config.houses.track_entries && !config.houses.track_exits {
            return Vec::new();
        }
        if !self.chart.time_known {
            return Vec::new();
        }
        let Some(frame) = &self.natal_frame else {
            if self.houses.is_some() {
                warnings.push("houses_unavailable".to_string());
            }
            return Vec::new();
        };

        let (start, _) = self.month_window(1);
        let end = Utc
            .with_ymd_and_hms(config.year + 1, 1, 1, 0, 0, 0)
            .single()
            .expect("year end");

        let mut events = Vec::new();
        let blueprint_tags = TagSet::new().with(Tag::Houses);
        let mut blueprint = self.derived_event(
            EventType::HouseBlueprint,
            start,
            Body::Sun,
            None,
            blueprint_tags,
            true,
        );
        blueprint.stream = Stream::Houses;
        blueprint.set_note("House blueprint established");
        blueprint.metadata.insert(
            "cusps".into(),
            serde_json::to_value(&frame.cusps).unwrap_or(Value::Null),
        );
        events.extend(self.finish_derived(blueprint));

        // Year-long scan at a coarsened step so the house sweep stays
        // within the grid budget.
        let plan = plan_grid(
            start,
            end,
            config.detection.scan_step_hours,
            config.transits.bodies.len(),
            config.performance.max_grid_points,
        );
        if plan.capped {
            warnings.push("grid_points_capped".to_string());
        }
        let timeline = self.sample_timeline(start, end, plan.step_hours, warnings).await;

        for &body in &config.transits.bodies {
            for crossing in detect_house_crossings(&timeline, body, frame) {
                let refined = refine_house_crossing(&crossing, frame, |ts| {
                    self.longitude_at(ts, body)
                })
                .await;
                let (timestamp, low_precision) = match refined {
                    Ok(Refined::Converged(ts)) => (ts, false),
                    Ok(Refined::Exhausted(ts)) => (ts, true),
                    Err(_) => (crossing.after, true),
                };

                let mut tags = TagSet::new().with(Tag::Houses).with(Tag::HouseChange);
                if low_precision {
                    tags.insert(Tag::LowPrecision);
                }
                let mut event =
                    self.derived_event(EventType::HouseChange, timestamp, body, None, tags, true);
                event.stream = Stream::Houses;
                event.house = Some(crossing.to_house);
                event.set_note(format!(
                    "{} moves from house {} to {}",
                    body, crossing.from_house, crossing.to_house
                ));
                event
                    .metadata
                    .insert("from_house".into(), Value::from(crossing.from_house));
                event
                    .metadata
                    .insert("to_house".into(), Value::from(crossing.to_house));
                events.extend(self.finish_derived(event));
            }
        }
        events
    }

    // ------------------------------------------------------------------
    // Report assembly
    // ------------------------------------------------------------------

    fn assemble_report(
        &self,
        events: Vec<Event>,
        warnings: Vec<String>,
        timezone: crate::timezone::ResolvedTimezone,
    ) -> ForecastReport {
        let config = &self.config;
        let outputs = &config.outputs;
        let (months, top_events) = report::build_month_index(&events, outputs);

        let timeline = if report::section_enabled(outputs, Section::Timeline) {
            events.iter().map(report::timeline_entry).collect()
        } else {
            Vec::new()
        };
        let themes = if report::section_enabled(outputs, Section::Themes) {
            report::build_themes(&events, &self.chart.signature())
        } else {
            Vec::new()
        };
        let windows = if report::section_enabled(outputs, Section::Windows) {
            report::build_windows(&events, config.detection.window_merge_minutes)
        } else {
            Vec::new()
        };
        let cautions = if report::section_enabled(outputs, Section::Cautions) {
            report::build_cautions(&events)
        } else {
            Vec::new()
        };
        let summary = report::section_enabled(outputs, Section::Summary)
            .then(|| report::build_summary(&events));
        let raw_events = outputs
            .raw_events
            .then(|| events.iter().map(report::timeline_entry).collect());

        let meta = RunMeta {
            year: config.year,
            timezone: TimezoneMeta {
                resolved: timezone.name.clone(),
                input: config.timezone.clone(),
                resolution: format!("{:?}", config.tz_resolution).to_lowercase(),
                offset_minutes: timezone.offset_minutes(),
            },
            warnings,
            event_count: events.len(),
            versioning: config.versioning.clone(),
            options: config.options_echo.clone(),
        };

        ForecastReport {
            months,
            top_events,
            timeline,
            themes,
            windows,
            cautions,
            summary,
            raw_events,
            meta,
        }
    }
}

/// Collapse repeated warnings, preserving first-occurrence order.
fn dedup_warnings(warnings: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    warnings.retain(|w| seen.insert(w.clone()));
}
