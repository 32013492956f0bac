//! Sub-day timestamp refinement via bisection.
//!
//! All solvers take explicit bounds, a target, and an evaluator, and return
//! a result that distinguishes convergence from an exhausted iteration
//! budget. Exhaustion is recoverable: callers keep the coarse timestamp and
//! tag the event low-precision.

use chrono::{DateTime, Duration, Utc};
use std::future::Future;

use crate::error::ProviderError;

/// Maximum bisection iterations before giving up.
pub const MAX_ITERATIONS: u32 = 24;

/// Convergence tolerance: one minute.
pub const TOLERANCE_SECS: i64 = 60;

/// Result of a refinement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refined {
    /// Interval narrowed below the tolerance.
    Converged(DateTime<Utc>),
    /// Iteration budget spent; best midpoint so far.
    Exhausted(DateTime<Utc>),
}

impl Refined {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Refined::Converged(t) | Refined::Exhausted(t) => *t,
        }
    }

    pub fn converged(&self) -> bool {
        matches!(self, Refined::Converged(_))
    }
}

fn midpoint(lo: DateTime<Utc>, hi: DateTime<Utc>) -> DateTime<Utc> {
    lo + Duration::seconds((hi - lo).num_seconds() / 2)
}

/// Bisect the zero crossing of `f(t) = separation(t) - target_angle`
/// between two bracketing timestamps.
///
/// `eval` returns the angular separation at a timestamp; the sign of
/// `separation - target` must differ at the two bounds for the bracket to
/// be valid. An invalid bracket degrades to `Exhausted` at the midpoint
/// rather than erroring: refinement failure is never fatal.
pub async fn bisect_separation<F, Fut>(
    lo: DateTime<Utc>,
    hi: DateTime<Utc>,
    target_angle: f64,
    eval: F,
) -> Result<Refined, ProviderError>
where
    F: Fn(DateTime<Utc>) -> Fut,
    Fut: Future<Output = Result<f64, ProviderError>>,
{
    let mut lo = lo;
    let mut hi = hi;
    let mut f_lo = eval(lo).await? - target_angle;
    let f_hi = eval(hi).await? - target_angle;

    if f_lo * f_hi > 0.0 {
        return Ok(Refined::Exhausted(midpoint(lo, hi)));
    }

    for _ in 0..MAX_ITERATIONS {
        if (hi - lo).num_seconds() <= TOLERANCE_SECS {
            return Ok(Refined::Converged(midpoint(lo, hi)));
        }
        let mid = midpoint(lo, hi);
        let f_mid = eval(mid).await? - target_angle;
        if f_lo * f_mid <= 0.0 {
            hi = mid;
        } else {
            lo = mid;
            f_lo = f_mid;
        }
    }

    Ok(Refined::Exhausted(midpoint(lo, hi)))
}

/// Bisect the earliest timestamp where a predicate flips from false to
/// true. Used for house-cusp crossings, where the boundary is a region
/// change rather than a signed function.
pub async fn bisect_predicate<F, Fut>(
    lo: DateTime<Utc>,
    hi: DateTime<Utc>,
    pred: F,
) -> Result<Refined, ProviderError>
where
    F: Fn(DateTime<Utc>) -> Fut,
    Fut: Future<Output = Result<bool, ProviderError>>,
{
    let mut lo = lo;
    let mut hi = hi;
    for _ in 0..MAX_ITERATIONS {
        if (hi - lo).num_seconds() <= TOLERANCE_SECS {
            return Ok(Refined::Converged(hi));
        }
        let mid = midpoint(lo, hi);
        if pred(mid).await? {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Ok(Refined::Exhausted(hi))
}
