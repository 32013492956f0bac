//! The event record produced by the detection pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::models::aspect::Aspect;
use crate::models::body::Body;
use crate::models::chart::{AngleName, TargetId};

/// Which detection stream an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    Transit,
    Progressed,
    SolarReturn,
    Houses,
}

impl Stream {
    pub fn name(&self) -> &'static str {
        match self {
            Stream::Transit => "transit",
            Stream::Progressed => "progressed",
            Stream::SolarReturn => "solar_return",
            Stream::Houses => "houses",
        }
    }
}

/// Closed set of event types the pipeline can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Transit,
    Ingress,
    Station,
    Eclipse,
    LunarPhase,
    Midpoint,
    DeclinationAspect,
    HouseChange,
    HouseBlueprint,
    Progression,
    SolarArc,
    SolarReturn,
    SolarReturnAspect,
    RetrogradeCampaign,
}

impl EventType {
    pub fn name(&self) -> &'static str {
        match self {
            EventType::Transit => "transit",
            EventType::Ingress => "ingress",
            EventType::Station => "station",
            EventType::Eclipse => "eclipse",
            EventType::LunarPhase => "lunar_phase",
            EventType::Midpoint => "midpoint",
            EventType::DeclinationAspect => "declination_aspect",
            EventType::HouseChange => "house_change",
            EventType::HouseBlueprint => "house_blueprint",
            EventType::Progression => "progression",
            EventType::SolarArc => "solar_arc",
            EventType::SolarReturn => "solar_return",
            EventType::SolarReturnAspect => "solar_return_aspect",
            EventType::RetrogradeCampaign => "retrograde_campaign",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Semantic tags attached to events.
///
/// The set is closed so that merges during deduplication are a cheap
/// bit-union and matching stays exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Tag {
    Eclipse = 0,
    Retrograde,
    Station,
    Angle,
    HouseChange,
    Midpoint,
    Declination,
    Campaign,
    Progressed,
    SolarArc,
    SolarReturn,
    Houses,
    LunarPhase,
    ContraParallel,
    LowPrecision,
}

impl Tag {
    const ALL: [Tag; 15] = [
        Tag::Eclipse,
        Tag::Retrograde,
        Tag::Station,
        Tag::Angle,
        Tag::HouseChange,
        Tag::Midpoint,
        Tag::Declination,
        Tag::Campaign,
        Tag::Progressed,
        Tag::SolarArc,
        Tag::SolarReturn,
        Tag::Houses,
        Tag::LunarPhase,
        Tag::ContraParallel,
        Tag::LowPrecision,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tag::Eclipse => "eclipse",
            Tag::Retrograde => "retrograde",
            Tag::Station => "station",
            Tag::Angle => "angle",
            Tag::HouseChange => "house_change",
            Tag::Midpoint => "midpoint",
            Tag::Declination => "declination",
            Tag::Campaign => "campaign",
            Tag::Progressed => "progressed",
            Tag::SolarArc => "solar_arc",
            Tag::SolarReturn => "solar_return",
            Tag::Houses => "houses",
            Tag::LunarPhase => "lunar_phase",
            Tag::ContraParallel => "contra_parallel",
            Tag::LowPrecision => "low_precision",
        }
    }
}

/// Bitset over [`Tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct TagSet(u32);

impl TagSet {
    pub const EMPTY: TagSet = TagSet(0);

    pub fn new() -> Self {
        TagSet(0)
    }

    pub fn with(mut self, tag: Tag) -> Self {
        self.insert(tag);
        self
    }

    pub fn insert(&mut self, tag: Tag) {
        self.0 |= 1 << (tag as u32);
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.0 & (1 << (tag as u32)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Union with another set (used by dedup merges).
    pub fn union(&mut self, other: TagSet) {
        self.0 |= other.0;
    }

    /// Tags in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = Tag> + '_ {
        Tag::ALL.iter().copied().filter(|t| self.contains(*t))
    }

    /// Sorted tag names, the external representation.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.iter().map(|t| t.name()).collect();
        names.sort_unstable();
        names
    }
}

impl Serialize for TagSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.names().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TagSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        let mut set = TagSet::new();
        for name in names {
            if let Some(tag) = Tag::ALL.iter().find(|t| t.name() == name) {
                set.insert(*tag);
            }
        }
        Ok(set)
    }
}

impl FromIterator<Tag> for TagSet {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for tag in iter {
            set.insert(tag);
        }
        set
    }
}

/// A scored, refined astrological event.
///
/// Immutable once scored, except for the single merge mutation performed by
/// the deduplicator (timestamp, score, tags, metadata).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Deterministic content hash over the canonical fields.
    pub id: String,
    pub stream: Stream,
    pub event_type: EventType,
    /// Exact UTC timestamp after refinement.
    pub timestamp: DateTime<Utc>,
    pub transit_body: Body,
    pub natal_target: Option<TargetId>,
    pub aspect: Option<Aspect>,
    /// Deviation from the exact aspect angle, degrees.
    pub orb: f64,
    /// Resolved maximum allowed orb, degrees.
    pub orb_limit: f64,
    /// Normalized significance score in `[0, 1]`.
    pub score: f64,
    pub applying: bool,
    pub tags: TagSet,
    /// Angle label when the natal target is a chart angle.
    pub angle: Option<AngleName>,
    /// House number for house-stream events.
    pub house: Option<u8>,
    /// Structured metadata bag (notes, score breakdown, merge sources).
    pub metadata: Map<String, Value>,
}

impl Event {
    /// Label used for dedup compatibility and canonical ids: the aspect
    /// name when present, otherwise the event type.
    pub fn aspect_label(&self) -> &'static str {
        match self.aspect {
            Some(a) => a.name(),
            None => self.event_type.name(),
        }
    }

    /// `YYYY-MM` bucket key of the event timestamp.
    pub fn month_key(&self) -> String {
        self.timestamp.format("%Y-%m").to_string()
    }

    /// Human-readable note, if one was recorded.
    pub fn note(&self) -> Option<&str> {
        self.metadata.get("note").and_then(|v| v.as_str())
    }

    pub fn set_note(&mut self, note: impl Into<String>) {
        self.metadata
            .insert("note".to_string(), Value::String(note.into()));
    }

    /// Compact JSON view used when embedding this event inside another
    /// event's metadata (campaign children, dedup sources).
    pub fn detail_json(&self) -> Value {
        serde_json::json!({
            "event_id": self.id,
            "timestamp": self.timestamp.to_rfc3339(),
            "type": self.event_type.name(),
            "transit_body": self.transit_body.name(),
            "natal_target": self.natal_target.map(|t| t.to_string()),
            "aspect": self.aspect_label(),
            "orb": self.orb,
            "score": self.score,
            "tags": self.tags.names(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event() -> Event {
        Event {
            id: "abc123".into(),
            stream: Stream::Transit,
            event_type: EventType::Transit,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 0).unwrap(),
            transit_body: Body::Saturn,
            natal_target: Some(TargetId::Body(Body::Sun)),
            aspect: Some(Aspect::Square),
            orb: 0.4,
            orb_limit: 3.0,
            score: 0.72,
            applying: true,
            tags: TagSet::new().with(Tag::Retrograde),
            angle: None,
            house: None,
            metadata: Map::new(),
        }
    }

    #[test]
    fn test_tagset_union_and_contains() {
        let mut a = TagSet::new().with(Tag::Eclipse);
        let b = TagSet::new().with(Tag::Retrograde).with(Tag::Station);
        a.union(b);
        assert!(a.contains(Tag::Eclipse));
        assert!(a.contains(Tag::Retrograde));
        assert!(a.contains(Tag::Station));
        assert!(!a.contains(Tag::Campaign));
    }

    #[test]
    fn test_tagset_names_sorted() {
        let set = TagSet::new().with(Tag::Station).with(Tag::Eclipse);
        assert_eq!(set.names(), vec!["eclipse", "station"]);
    }

    #[test]
    fn test_tagset_serde_round_trip() {
        let set = TagSet::new().with(Tag::Campaign).with(Tag::Retrograde);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["campaign","retrograde"]"#);
        let back: TagSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn test_aspect_label_falls_back_to_type() {
        let mut ev = event();
        assert_eq!(ev.aspect_label(), "square");
        ev.aspect = None;
        ev.event_type = EventType::Ingress;
        assert_eq!(ev.aspect_label(), "ingress");
    }

    #[test]
    fn test_month_key() {
        assert_eq!(event().month_key(), "2025-03");
    }
}
