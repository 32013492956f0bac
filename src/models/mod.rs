//! Core value types for the forecast engine.
//!
//! Everything in this module is an immutable value: positions sampled from
//! the provider, natal targets computed once per chart, and the event record
//! that flows through detection, scoring, and aggregation.

pub mod angles;
pub mod aspect;
pub mod body;
pub mod chart;
pub mod event;

pub use aspect::Aspect;
pub use body::{Body, PlanetClass};
pub use chart::{
    AngleName, GeoLocation, HouseSystem, NatalTarget, ReferenceChart, TargetId, TargetKind,
    ZodiacMode,
};
pub use event::{Event, EventType, Stream, Tag, TagSet};
