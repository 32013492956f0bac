//! Detection layer: pure detectors over sampled position timelines.
//!
//! Every detector consumes the shared timeline sampled once per
//! `(timestamp, body)` and produces coarse hits; timestamp refinement and
//! scoring happen downstream in the pipeline.

pub mod aspects;
pub mod declination;
pub mod derived;
pub mod grid;
pub mod houses;
pub mod lunar;
pub mod midpoint;
pub mod refine;

pub use aspects::RawHit;
pub use grid::{plan_grid, GridPlan, ScanGrid};
pub use refine::Refined;
