//! Orb table: resolved maximum angular tolerances.

use std::collections::BTreeMap;

use crate::error::ConfigError;
use crate::models::body::Body;
use crate::models::chart::{AngleName, TargetId};

/// Maximum allowed orb per (transit body, natal target, angle) triple.
///
/// Resolution precedence: pair override > angle override > body override
/// (transit first, then natal when it is a body) > outer-class default >
/// global default. Construction validates every value; `resolve` never
/// fails.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbTable {
    default: f64,
    body: BTreeMap<Body, f64>,
    pair: BTreeMap<(Body, TargetId), f64>,
    angle: BTreeMap<AngleName, f64>,
    outer: Option<f64>,
}

impl OrbTable {
    pub fn new(
        default: f64,
        body: BTreeMap<Body, f64>,
        pair: BTreeMap<(Body, TargetId), f64>,
        angle: BTreeMap<AngleName, f64>,
        outer: Option<f64>,
    ) -> Result<Self, ConfigError> {
        let table = OrbTable {
            default,
            body,
            pair,
            angle,
            outer,
        };
        table.validate()?;
        Ok(table)
    }

    /// Uniform table with a single default orb.
    pub fn uniform(default: f64) -> Result<Self, ConfigError> {
        Self::new(
            default,
            BTreeMap::new(),
            BTreeMap::new(),
            BTreeMap::new(),
            None,
        )
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let check = |key: String, value: f64| {
            if !value.is_finite() || value < 0.0 {
                Err(ConfigError::InvalidOrb { key, value })
            } else {
                Ok(())
            }
        };
        check("default".to_string(), self.default)?;
        for (body, v) in &self.body {
            check(body.to_string(), *v)?;
        }
        for ((t, n), v) in &self.pair {
            check(format!("{}|{}", t, n), *v)?;
        }
        for (a, v) in &self.angle {
            check(a.to_string(), *v)?;
        }
        if let Some(outer) = self.outer {
            check("outer".to_string(), outer)?;
        }
        Ok(())
    }

    /// Resolve the orb limit for a candidate. Pure lookup, no side effects.
    pub fn resolve(
        &self,
        transit: Body,
        natal: Option<TargetId>,
        angle: Option<AngleName>,
    ) -> f64 {
        if let Some(natal) = natal {
            if let Some(v) = self.pair.get(&(transit, natal)) {
                return *v;
            }
        }
        if let Some(angle) = angle {
            if let Some(v) = self.angle.get(&angle) {
                return *v;
            }
        }
        if let Some(v) = self.body.get(&transit) {
            return *v;
        }
        if let Some(TargetId::Body(natal_body)) = natal {
            if let Some(v) = self.body.get(&natal_body) {
                return *v;
            }
        }
        if let Some(outer) = self.outer {
            if transit.is_outer() {
                return outer;
            }
        }
        self.default
    }

    /// Deterministic text fingerprint used in month-cache keys.
    pub fn fingerprint(&self) -> String {
        let mut parts = vec![format!("default={}", self.default)];
        for (b, v) in &self.body {
            parts.push(format!("body:{}={}", b, v));
        }
        for ((t, n), v) in &self.pair {
            parts.push(format!("pair:{}|{}={}", t, n, v));
        }
        for (a, v) in &self.angle {
            parts.push(format!("angle:{}={}", a, v));
        }
        if let Some(outer) = self.outer {
            parts.push(format!("outer={}", outer));
        }
        parts.join(";")
    }
}
