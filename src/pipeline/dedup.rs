//! Temporal deduplication and retrograde campaign grouping.

use chrono::Duration;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::config::{CanonicalField, DetectionConfig};
use crate::detection::derived::RetrogradeWindow;
use crate::models::chart::ReferenceChart;
use crate::models::event::{Event, EventType, Stream, Tag, TagSet};
use crate::pipeline::canonical;

/// Two events are duplicates when they describe the same contact (same
/// transit body, natal target, aspect label, house, and angle) within the
/// merge tolerance.
fn compatible(a: &Event, b: &Event, tolerance: Duration) -> bool {
    if a.transit_body != b.transit_body {
        return false;
    }
    if a.natal_target != b.natal_target {
        return false;
    }
    if a.aspect_label() != b.aspect_label() {
        return false;
    }
    if let (Some(ha), Some(hb)) = (a.house, b.house) {
        if ha != hb {
            return false;
        }
    }
    if let (Some(aa), Some(ab)) = (a.angle, b.angle) {
        if aa != ab {
            return false;
        }
    }
    // Midpoint activations dedup per watched pair, not per body.
    if a.metadata.get("midpoint_of") != b.metadata.get("midpoint_of") {
        return false;
    }
    (a.timestamp - b.timestamp).num_seconds().abs() <= tolerance.num_seconds()
}

/// Merge near-duplicate events.
///
/// The surviving event keeps the higher-scoring side's identity and
/// timestamp, unions the tag sets, and appends the discarded side to its
/// `sources` metadata so no information is silently dropped.
pub fn deduplicate(events: Vec<Event>, tolerance: Duration) -> Vec<Event> {
    let mut deduped: Vec<Event> = Vec::with_capacity(events.len());

    for event in events {
        let found = deduped
            .iter()
            .position(|existing| compatible(existing, &event, tolerance));
        let Some(idx) = found else {
            deduped.push(event);
            continue;
        };
        let existing = &mut deduped[idx];

        let source = event.detail_json();
        if event.score > existing.score {
            existing.timestamp = event.timestamp;
            existing.score = event.score;
            existing.id = event.id.clone();
            for (key, value) in event.metadata {
                existing.metadata.insert(key, value);
            }
        }
        existing.tags.union(event.tags);
        match existing.metadata.get_mut("sources") {
            Some(Value::Array(sources)) => sources.push(source),
            _ => {
                existing
                    .metadata
                    .insert("sources".to_string(), Value::Array(vec![source]));
            }
        }
    }

    deduped
}

/// Fold retrograde multi-pass hits into composite campaign events.
///
/// A campaign forms when a (body, target, aspect) bucket holds three or
/// more retrograde-tagged hits: the approach, retrograde, and direct
/// passes of one cycle. Constituents are labeled by position from the
/// configured phase sequence, clamping to the last label.
pub fn group_campaigns(
    events: Vec<Event>,
    detection: &DetectionConfig,
    retro_windows: &[RetrogradeWindow],
    chart: &ReferenceChart,
    canonical_fields: &[CanonicalField],
) -> Vec<Event> {
    let mut buckets: BTreeMap<String, Vec<Event>> = BTreeMap::new();
    for event in events {
        let key = format!(
            "{}|{}|{}",
            event.transit_body,
            event
                .natal_target
                .map(|t| t.to_string())
                .unwrap_or_default(),
            event.aspect_label()
        );
        buckets.entry(key).or_default().push(event);
    }

    let phases = &detection.campaign_phases;
    let mut combined = Vec::new();

    for (_, mut bucket) in buckets {
        let retro_count = bucket
            .iter()
            .filter(|e| e.stream == Stream::Transit && e.tags.contains(Tag::Retrograde))
            .count();
        if retro_count < 3 {
            combined.append(&mut bucket);
            continue;
        }

        bucket.sort_by_key(|e| e.timestamp);
        let template = bucket[0].clone();
        let start = bucket[0].timestamp;
        let end = bucket[bucket.len() - 1].timestamp;

        let max_retro_score = bucket
            .iter()
            .filter(|e| e.tags.contains(Tag::Retrograde))
            .map(|e| e.score)
            .fold(0.0_f64, f64::max);

        let window = retro_windows
            .iter()
            .find(|w| w.body == template.transit_body);
        let window_json = serde_json::json!({
            "start": window.map(|w| w.start).unwrap_or(start).to_rfc3339(),
            "end": window
                .and_then(|w| w.end)
                .unwrap_or(end)
                .to_rfc3339(),
        });

        let children: Vec<Value> = bucket
            .iter()
            .enumerate()
            .map(|(idx, child)| {
                let phase = &phases[idx.min(phases.len() - 1)];
                let mut detail = child.detail_json();
                if let Value::Object(map) = &mut detail {
                    map.insert("campaign_phase".to_string(), Value::from(phase.as_str()));
                }
                detail
            })
            .collect();
        let phase_labels: Vec<Value> = bucket
            .iter()
            .enumerate()
            .map(|(idx, _)| Value::from(phases[idx.min(phases.len() - 1)].as_str()))
            .collect();

        let mut campaign = Event {
            id: String::new(),
            stream: Stream::Transit,
            event_type: EventType::RetrogradeCampaign,
            timestamp: start,
            transit_body: template.transit_body,
            natal_target: template.natal_target,
            aspect: template.aspect,
            orb: 0.0,
            orb_limit: 1.0,
            // Repeated activation scores above its strongest pass.
            score: (max_retro_score * 1.15).min(1.0),
            applying: true,
            tags: TagSet::new().with(Tag::Retrograde).with(Tag::Campaign),
            angle: template.angle,
            house: None,
            metadata: serde_json::Map::new(),
        };
        campaign.set_note("Retrograde campaign");
        campaign
            .metadata
            .insert("phases".to_string(), Value::Array(phase_labels));
        campaign
            .metadata
            .insert("children".to_string(), Value::Array(children));
        campaign
            .metadata
            .insert("campaign".to_string(), window_json);
        canonical::assign_id(&mut campaign, chart, canonical_fields);
        combined.push(campaign);
    }

    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::aspect::Aspect;
    use crate::models::body::Body;
    use crate::models::chart::{GeoLocation, HouseSystem, TargetId, ZodiacMode};
    use chrono::{DateTime, TimeZone, Utc};

    fn chart() -> ReferenceChart {
        ReferenceChart {
            birth: Utc.with_ymd_and_hms(1990, 5, 15, 9, 0, 0).unwrap(),
            location: GeoLocation {
                latitude: 28.6,
                longitude: 77.2,
            },
            zodiac: ZodiacMode::Tropical,
            house_system: HouseSystem::WholeSign,
            sidereal_frame: None,
            time_known: true,
            targets: vec![],
        }
    }

    fn transit_event(id: &str, day: u32, score: f64, tags: TagSet) -> Event {
        Event {
            id: id.to_string(),
            stream: Stream::Transit,
            event_type: EventType::Transit,
            timestamp: Utc.with_ymd_and_hms(2025, 6, day, 12, 0, 0).unwrap(),
            transit_body: Body::Saturn,
            natal_target: Some(TargetId::Body(Body::Sun)),
            aspect: Some(Aspect::Square),
            orb: 0.5,
            orb_limit: 3.0,
            score,
            applying: true,
            tags,
            angle: None,
            house: None,
            metadata: serde_json::Map::new(),
        }
    }

    fn detection() -> DetectionConfig {
        crate::config::ForecastConfig::defaults_for_year(2025).detection
    }

    #[test]
    fn test_duplicates_within_tolerance_merge_keeping_max_score() {
        let a = transit_event("a", 10, 0.6, TagSet::new());
        let b = transit_event("b", 11, 0.8, TagSet::new().with(Tag::Retrograde));
        let merged = deduplicate(vec![a, b], Duration::hours(48));

        assert_eq!(merged.len(), 1);
        let survivor = &merged[0];
        assert_eq!(survivor.score, 0.8);
        assert_eq!(survivor.id, "b");
        assert!(survivor.tags.contains(Tag::Retrograde));
        let sources = survivor.metadata["sources"].as_array().unwrap();
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn test_events_beyond_tolerance_stay_separate() {
        let a = transit_event("a", 1, 0.6, TagSet::new());
        let b = transit_event("b", 20, 0.8, TagSet::new());
        let merged = deduplicate(vec![a, b], Duration::hours(48));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_different_aspects_never_merge() {
        let a = transit_event("a", 10, 0.6, TagSet::new());
        let mut b = transit_event("b", 10, 0.7, TagSet::new());
        b.aspect = Some(Aspect::Trine);
        let merged = deduplicate(vec![a, b], Duration::hours(48));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_three_retrograde_hits_collapse_to_campaign() {
        let retro = TagSet::new().with(Tag::Retrograde);
        let events = vec![
            transit_event("a", 1, 0.6, retro),
            transit_event("b", 10, 0.8, retro),
            transit_event("c", 20, 0.7, retro),
        ];
        let out = group_campaigns(
            events,
            &detection(),
            &[],
            &chart(),
            &CanonicalField::DEFAULT,
        );

        assert_eq!(out.len(), 1);
        let campaign = &out[0];
        assert_eq!(campaign.event_type, EventType::RetrogradeCampaign);
        assert!(campaign.tags.contains(Tag::Campaign));
        assert!(!campaign.id.is_empty());
        // Max constituent 0.8, scaled by 1.15.
        assert!((campaign.score - 0.92).abs() < 1e-9);
        let children = campaign.metadata["children"].as_array().unwrap();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0]["campaign_phase"], "approach");
        assert_eq!(children[1]["campaign_phase"], "exact-1");
    }

    #[test]
    fn test_two_retrograde_hits_do_not_form_campaign() {
        let retro = TagSet::new().with(Tag::Retrograde);
        let events = vec![
            transit_event("a", 1, 0.6, retro),
            transit_event("b", 10, 0.8, retro),
        ];
        let out = group_campaigns(
            events,
            &detection(),
            &[],
            &chart(),
            &CanonicalField::DEFAULT,
        );
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| e.event_type == EventType::Transit));
    }

    #[test]
    fn test_campaign_phase_labels_clamp_to_last() {
        let retro = TagSet::new().with(Tag::Retrograde);
        let mut events = Vec::new();
        for day in 1..=9 {
            events.push(transit_event(&format!("e{}", day), day, 0.6, retro));
        }
        let out = group_campaigns(
            events,
            &detection(),
            &[],
            &chart(),
            &CanonicalField::DEFAULT,
        );
        assert_eq!(out.len(), 1);
        let children = out[0].metadata["children"].as_array().unwrap();
        assert_eq!(children.len(), 9);
        // Sequence has seven labels; positions beyond it take the last.
        assert_eq!(children[7]["campaign_phase"], "decay");
        assert_eq!(children[8]["campaign_phase"], "decay");
    }

    #[test]
    fn test_campaign_window_from_retrograde_tracking() {
        let retro = TagSet::new().with(Tag::Retrograde);
        let events = vec![
            transit_event("a", 5, 0.6, retro),
            transit_event("b", 12, 0.7, retro),
            transit_event("c", 22, 0.65, retro),
        ];
        let start: DateTime<Utc> = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let end: DateTime<Utc> = Utc.with_ymd_and_hms(2025, 6, 28, 0, 0, 0).unwrap();
        let windows = vec![RetrogradeWindow {
            body: Body::Saturn,
            start,
            end: Some(end),
        }];
        let out = group_campaigns(
            events,
            &detection(),
            &windows,
            &chart(),
            &CanonicalField::DEFAULT,
        );
        let campaign = &out[0];
        assert_eq!(
            campaign.metadata["campaign"]["start"],
            Value::from(start.to_rfc3339())
        );
        assert_eq!(
            campaign.metadata["campaign"]["end"],
            Value::from(end.to_rfc3339())
        );
    }
}
