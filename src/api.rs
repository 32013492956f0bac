//! Public API surface for the forecast engine.
//!
//! This file consolidates the types callers interact with: chart input,
//! configuration, providers, and the output DTOs. All output types derive
//! Serialize/Deserialize for JSON serialization.

pub use crate::config::{
    AspectPolicy, CanonicalField, DetectionConfig, ForecastConfig, OrbTable, RawOptions,
    ScoringConfig, Section, TzResolution,
};
pub use crate::error::{ConfigError, EngineError, ProviderError, Result};
pub use crate::models::aspect::Aspect;
pub use crate::models::body::{Body, PlanetClass};
pub use crate::models::chart::{
    AngleName, GeoLocation, HouseSystem, NatalTarget, ReferenceChart, TargetId, TargetKind,
    ZodiacMode,
};
pub use crate::models::event::{Event, EventType, Stream, Tag, TagSet};
pub use crate::pipeline::cache::{Clock, MonthCache, SystemClock};
pub use crate::pipeline::{ChartSpec, ForecastEngine};
pub use crate::providers::{
    BodyPosition, HouseFrame, HouseProvider, PositionFrame, PositionProvider, SampledTimeline,
};
pub use crate::report::{
    CautionWindow, ForecastReport, MonthBucketEntry, RunMeta, RunSummary, SupportWindow,
    ThemeEntry, TimelineEntry, TimezoneMeta,
};
