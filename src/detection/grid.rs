//! Scan grid generation.
//!
//! A grid is a lazy, ordered, finite sequence of UTC timestamps over a
//! bounded window. Oversized grids are coarsened automatically instead of
//! failing the run.

use chrono::{DateTime, Duration, Utc};

/// Lazy iterator over grid timestamps, inclusive of the window end.
///
/// The final timestamp is always `end` itself so detectors see the window
/// boundary even when the step does not divide the window evenly.
#[derive(Debug, Clone)]
pub struct ScanGrid {
    next: Option<DateTime<Utc>>,
    end: DateTime<Utc>,
    step: Duration,
    end_emitted: bool,
}

impl ScanGrid {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, step_hours: u32) -> Self {
        ScanGrid {
            next: if start <= end { Some(start) } else { None },
            end,
            step: Duration::hours(step_hours.max(1) as i64),
            end_emitted: false,
        }
    }
}

impl Iterator for ScanGrid {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<DateTime<Utc>> {
        let current = self.next?;
        if current >= self.end {
            self.next = None;
            if self.end_emitted {
                return None;
            }
            self.end_emitted = true;
            return Some(self.end);
        }
        let advanced = current + self.step;
        self.next = Some(if advanced > self.end { self.end } else { advanced });
        if current == self.end {
            self.end_emitted = true;
        }
        Some(current)
    }
}

/// Outcome of planning a grid against the configured point ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridPlan {
    /// Effective step after any coarsening.
    pub step_hours: u32,
    /// True when the requested grid exceeded the ceiling and the step was
    /// coarsened.
    pub capped: bool,
}

/// Plan a grid step for a window.
///
/// When `(window_hours / step) * body_count` exceeds `max_points`, the step
/// doubles until the grid fits. This is a recoverable degradation: callers
/// record a `grid_points_capped` warning and continue.
pub fn plan_grid(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step_hours: u32,
    body_count: usize,
    max_points: usize,
) -> GridPlan {
    let window_hours = (end - start).num_hours().max(1) as u64;
    let bodies = body_count.max(1) as u64;
    let mut step = step_hours.max(1) as u64;
    let mut capped = false;

    while (window_hours / step).max(1) * bodies > max_points as u64 {
        step *= 2;
        capped = true;
        if step >= window_hours {
            break;
        }
    }

    GridPlan {
        step_hours: step.min(u32::MAX as u64) as u32,
        capped,
    }
}
