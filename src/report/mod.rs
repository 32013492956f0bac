//! Output DTOs and aggregation.
//!
//! The aggregator buckets deduplicated events into months, ranks and
//! truncates them, and derives the synthesized sections: themes, supportive
//! windows, caution windows, and the numeric summary.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::config::{OutputConfig, Section};
use crate::models::aspect::Aspect;
use crate::models::body::Body;
use crate::models::event::{Event, EventType, Stream, Tag, TagSet};

/// One row of a month bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthBucketEntry {
    pub date: String,
    pub transit_body: String,
    pub natal_target: String,
    pub aspect: String,
    pub orb: f64,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub house: Option<u8>,
    pub tags: TagSet,
}

/// One row of the full chronological timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub stream: Stream,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub score: f64,
    pub transit_body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub natal_target: Option<String>,
    pub aspect: String,
    pub tags: TagSet,
    pub details: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub house: Option<u8>,
}

/// A recurring (body, aspect, target) motif across the window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeEntry {
    pub key: String,
    pub score: f64,
    pub summary: String,
}

/// A contiguous run of favorable, high-scoring events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub score: f64,
    pub events: Vec<TimelineEntry>,
}

/// A contiguous run of red-flag events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CautionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub score: f64,
    pub events: Vec<TimelineEntry>,
    pub notes: Vec<String>,
}

/// Numeric roll-up of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_events: usize,
    pub peak_count: usize,
    pub supportive_count: usize,
    pub tension_count: usize,
    pub text: String,
}

/// Resolved timezone metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimezoneMeta {
    pub resolved: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    pub resolution: String,
    pub offset_minutes: i32,
}

/// Run metadata: resolved settings, warnings, and the echoed options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub year: i32,
    pub timezone: TimezoneMeta,
    pub warnings: Vec<String>,
    pub event_count: usize,
    pub versioning: BTreeMap<String, String>,
    pub options: Value,
}

/// The complete forecast payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastReport {
    /// `YYYY-MM` buckets, ranked then chronologically ordered.
    pub months: BTreeMap<String, Vec<MonthBucketEntry>>,
    pub top_events: Vec<MonthBucketEntry>,
    pub timeline: Vec<TimelineEntry>,
    pub themes: Vec<ThemeEntry>,
    pub windows: Vec<SupportWindow>,
    pub cautions: Vec<CautionWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_events: Option<Vec<TimelineEntry>>,
    pub meta: RunMeta,
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

pub fn timeline_entry(event: &Event) -> TimelineEntry {
    TimelineEntry {
        event_id: event.id.clone(),
        timestamp: event.timestamp,
        stream: event.stream,
        event_type: event.event_type,
        score: round4(event.score),
        transit_body: event.transit_body.to_string(),
        natal_target: event.natal_target.map(|t| t.to_string()),
        aspect: event.aspect_label().to_string(),
        tags: event.tags,
        details: Value::Object(event.metadata.clone()),
        angle: event.angle.map(|a| a.label().to_string()),
        house: event.house,
    }
}

pub fn month_entry(event: &Event) -> MonthBucketEntry {
    MonthBucketEntry {
        date: event.timestamp.format("%Y-%m-%d").to_string(),
        transit_body: event.transit_body.to_string(),
        natal_target: event
            .natal_target
            .map(|t| t.to_string())
            .unwrap_or_else(|| "—".to_string()),
        aspect: event.aspect_label().to_string(),
        orb: round2(event.orb),
        score: round4(event.score),
        note: event.note().map(|s| s.to_string()),
        event_id: event.id.clone(),
        angle: event.angle.map(|a| a.label().to_string()),
        house: event.house,
        tags: event.tags,
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

// ---------------------------------------------------------------------------
// Ordering and month buckets
// ---------------------------------------------------------------------------

/// Final deterministic event order: timestamp, then descending score, then
/// id.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Bucket transit-stream events into months and select the global top
/// events.
///
/// Within a month the events are ranked by score and truncated to the
/// configured limit *before* the retained subset is re-sorted
/// chronologically. Truncating while sorted by date would keep only the
/// earliest events and silently lose high-scoring late-month ones.
pub fn build_month_index(
    events: &[Event],
    outputs: &OutputConfig,
) -> (BTreeMap<String, Vec<MonthBucketEntry>>, Vec<MonthBucketEntry>) {
    let transits: Vec<&Event> = events.iter().filter(|e| e.stream == Stream::Transit).collect();

    let mut months: BTreeMap<String, Vec<MonthBucketEntry>> = BTreeMap::new();
    for event in &transits {
        months
            .entry(event.month_key())
            .or_default()
            .push(month_entry(event));
    }

    let limit = outputs.max_events_per_month;
    for bucket in months.values_mut() {
        bucket.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        if limit > 0 && bucket.len() > limit {
            bucket.truncate(limit);
        }
        bucket.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
        });
    }

    let mut ranked: Vec<&Event> = transits.clone();
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    let top = ranked
        .into_iter()
        .take(outputs.top_events_limit)
        .map(|e| month_entry(e))
        .collect();

    (months, top)
}

// ---------------------------------------------------------------------------
// Window classification
// ---------------------------------------------------------------------------

fn is_supportive(event: &Event) -> bool {
    if event.aspect.map(|a| a.is_supportive()).unwrap_or(false) {
        return true;
    }
    if event.tags.contains(Tag::SolarReturn) {
        return true;
    }
    matches!(
        event.event_type,
        EventType::HouseChange | EventType::Midpoint
    ) && event.score >= 0.6
}

fn is_red_flag(event: &Event) -> bool {
    let tension = event.aspect.map(|a| a.is_tension()).unwrap_or(false);
    if tension && (event.transit_body.is_malefic() || event.tags.contains(Tag::Retrograde)) {
        return true;
    }
    if event.tags.contains(Tag::Station) {
        return true;
    }
    if event.event_type == EventType::RetrogradeCampaign {
        return true;
    }
    if event.tags.contains(Tag::Eclipse) && event.score >= 0.6 {
        return true;
    }
    event.tags.contains(Tag::ContraParallel)
}

const WINDOW_SCORE_THRESHOLD: f64 = 0.65;

/// Gap that breaks a contiguous window.
fn window_gap() -> Duration {
    Duration::hours(24)
}

/// Build supportive windows: contiguous runs of favorable, high-scoring
/// events. A red-flag event or a gap beyond 24 hours closes the current
/// window; windows closer together than the configured merge span are
/// joined.
pub fn build_windows(events: &[Event], merge_minutes: i64) -> Vec<SupportWindow> {
    let mut windows: Vec<SupportWindow> = Vec::new();
    let mut current: Option<SupportWindow> = None;
    let mut last_ts: Option<DateTime<Utc>> = None;

    for event in events {
        if is_red_flag(event) {
            if let Some(window) = current.take() {
                windows.push(window);
            }
            last_ts = None;
            continue;
        }
        if !is_supportive(event) || event.score < WINDOW_SCORE_THRESHOLD {
            if let (Some(window), Some(prev)) = (&current, last_ts) {
                if event.timestamp - prev > window_gap() {
                    windows.push(window.clone());
                    current = None;
                }
            }
            continue;
        }

        let entry = timeline_entry(event);
        match &mut current {
            None => {
                current = Some(SupportWindow {
                    start: event.timestamp,
                    end: event.timestamp,
                    score: round4(event.score),
                    events: vec![entry],
                });
            }
            Some(window) => {
                window.end = event.timestamp;
                window.score = window.score.max(round4(event.score));
                window.events.push(entry);
            }
        }
        last_ts = Some(event.timestamp);
    }
    if let Some(window) = current {
        windows.push(window);
    }

    // Join windows separated by less than the merge span.
    let merge_span = Duration::minutes(merge_minutes.max(0));
    let mut joined: Vec<SupportWindow> = Vec::with_capacity(windows.len());
    for window in windows {
        match joined.last_mut() {
            Some(prev) if window.start - prev.end <= merge_span => {
                prev.end = window.end;
                prev.score = prev.score.max(window.score);
                prev.events.extend(window.events);
            }
            _ => joined.push(window),
        }
    }
    joined
}

/// Build caution windows: contiguous runs of red-flag events, joined when
/// within 24 hours of each other.
pub fn build_cautions(events: &[Event]) -> Vec<CautionWindow> {
    let mut cautions: Vec<CautionWindow> = Vec::new();
    let mut current: Option<CautionWindow> = None;

    for event in events {
        if !is_red_flag(event) {
            continue;
        }
        let entry = timeline_entry(event);
        let note = event.note().map(|s| s.to_string());

        match &mut current {
            Some(window) if event.timestamp - window.end <= window_gap() => {
                window.end = event.timestamp;
                window.score = window.score.max(round4(event.score));
                window.events.push(entry);
                if let Some(note) = note {
                    if !window.notes.contains(&note) {
                        window.notes.push(note);
                    }
                }
            }
            _ => {
                if let Some(mut window) = current.take() {
                    window.notes.sort();
                    cautions.push(window);
                }
                current = Some(CautionWindow {
                    start: event.timestamp,
                    end: event.timestamp,
                    score: round4(event.score),
                    events: vec![entry],
                    notes: note.into_iter().collect(),
                });
            }
        }
    }
    if let Some(mut window) = current {
        window.notes.sort();
        cautions.push(window);
    }
    cautions
}

// ---------------------------------------------------------------------------
// Themes
// ---------------------------------------------------------------------------

const THEME_TEMPLATES: &[(Aspect, [&str; 2])] = &[
    (
        Aspect::Conjunction,
        [
            "{body} aligns closely with natal {target}, spotlighting {theme}.",
            "A fused {body}–{target} focus heightens {theme} for the year.",
        ],
    ),
    (
        Aspect::Trine,
        [
            "Supportive flow between {body} and {target} opens {theme} doors.",
            "Graceful {body} trine {target} eases growth around {theme}.",
        ],
    ),
    (
        Aspect::Sextile,
        [
            "{body} sextile {target} sparks collaborative {theme} opportunities.",
            "Fresh chances arise as {body} sextiles {target}, energising {theme}.",
        ],
    ),
    (
        Aspect::Square,
        [
            "Pressure from {body} square {target} demands work in {theme}.",
            "{body} squares {target}, challenging habits tied to {theme}.",
        ],
    ),
    (
        Aspect::Opposition,
        [
            "{body} opposing {target} calls for balance across {theme} matters.",
            "Polarised pulls from {body} and {target} test {theme} equilibrium.",
        ],
    ),
    (
        Aspect::Quincunx,
        [
            "Adjustments surface as {body} quincunx {target} reshapes {theme}.",
            "{body} quincunx {target} nudges creative pivots around {theme}.",
        ],
    ),
];

const DEFAULT_THEME_TEMPLATE: &str = "{body} {aspect} {target} keeps {theme} in focus.";

fn theme_keyword(target: &str) -> &'static str {
    if let Ok(body) = target.parse::<Body>() {
        return match body {
            Body::Sun => "vitality and direction",
            Body::Moon => "emotional foundations",
            Body::Mercury => "communication and learning",
            Body::Venus => "relationships and values",
            Body::Mars => "drive and initiative",
            Body::Jupiter => "growth and opportunity",
            Body::Saturn => "structure and responsibility",
            Body::Uranus => "change and independence",
            Body::Neptune => "imagination and ideals",
            Body::Pluto => "transformation and power",
            Body::TrueNode | Body::MeanNode => "life direction",
            Body::Chiron => "healing and mentorship",
            _ => "core priorities",
        };
    }
    match target {
        "ASC" => "self-expression",
        "DSC" => "partnership dynamics",
        "MC" => "public ambitions",
        "IC" => "foundational roots",
        _ => "core priorities",
    }
}

/// Deterministic index from a seed material string.
fn seeded_index(material: &str, len: usize) -> usize {
    let digest = Sha256::digest(material.as_bytes());
    let n = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    (n as usize) % len.max(1)
}

/// Group events by (body, aspect, target) and synthesize one theme line
/// per group. Template choice is seeded by the chart signature so repeated
/// runs phrase themes identically.
pub fn build_themes(events: &[Event], seed: &str) -> Vec<ThemeEntry> {
    let mut grouped: BTreeMap<(String, String, String), Vec<&Event>> = BTreeMap::new();
    for event in events {
        let target = event
            .natal_target
            .map(|t| t.to_string())
            .or_else(|| event.angle.map(|a| a.label().to_string()))
            .or_else(|| event.house.map(|h| format!("house {}", h)))
            .unwrap_or_default();
        grouped
            .entry((
                event.transit_body.to_string(),
                event.aspect_label().to_string(),
                target,
            ))
            .or_default()
            .push(event);
    }

    let mut themes = Vec::new();
    for ((body, aspect_name, target), bucket) in grouped {
        if bucket.is_empty() {
            continue;
        }
        let avg_score = bucket.iter().map(|e| e.score).sum::<f64>() / bucket.len() as f64;
        let templates: Vec<&str> = THEME_TEMPLATES
            .iter()
            .find(|(aspect, _)| aspect.name() == aspect_name)
            .map(|(_, t)| t.to_vec())
            .unwrap_or_else(|| vec![DEFAULT_THEME_TEMPLATE]);
        let material = format!("{}|{}|{}|{}", body, aspect_name, target, seed);
        let template = templates[seeded_index(&material, templates.len())];

        let display_target = if target.is_empty() {
            "natal focus".to_string()
        } else {
            target.clone()
        };
        let summary = template
            .replace("{body}", &body)
            .replace("{target}", &display_target)
            .replace("{theme}", theme_keyword(&target))
            .replace("{aspect}", &aspect_name.replace('_', " "));

        themes.push(ThemeEntry {
            key: format!("{}:{}:{}", body, aspect_name, target),
            score: round4(avg_score),
            summary,
        });
    }

    themes.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });
    themes
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

pub fn build_summary(events: &[Event]) -> RunSummary {
    if events.is_empty() {
        return RunSummary {
            total_events: 0,
            peak_count: 0,
            supportive_count: 0,
            tension_count: 0,
            text: "A quiet year with minimal notable alignments.".to_string(),
        };
    }
    let peak = events.iter().filter(|e| e.score >= 0.75).count();
    let supportive = events
        .iter()
        .filter(|e| matches!(e.aspect, Some(Aspect::Trine) | Some(Aspect::Sextile)))
        .count();
    let tension = events
        .iter()
        .filter(|e| matches!(e.aspect, Some(Aspect::Square) | Some(Aspect::Opposition)))
        .count();
    RunSummary {
        total_events: events.len(),
        peak_count: peak,
        supportive_count: supportive,
        tension_count: tension,
        text: format!(
            "{} notable alignments detected. {} peak moments, {} supportive influences, and {} tension checkpoints.",
            events.len(),
            peak,
            supportive,
            tension
        ),
    }
}

/// Whether a section was requested.
pub fn section_enabled(outputs: &OutputConfig, section: Section) -> bool {
    outputs.sections.contains(&section)
}
