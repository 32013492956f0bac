//! Aspect vocabulary: named angular relationships between longitudes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// A named angular relationship between two ecliptic longitudes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aspect {
    Conjunction,
    Sextile,
    Square,
    Trine,
    Quincunx,
    Opposition,
}

impl Aspect {
    /// All aspects, in ascending target-angle order.
    pub const ALL: [Aspect; 6] = [
        Aspect::Conjunction,
        Aspect::Sextile,
        Aspect::Square,
        Aspect::Trine,
        Aspect::Quincunx,
        Aspect::Opposition,
    ];

    /// Exact target angle in degrees.
    pub fn angle(&self) -> f64 {
        match self {
            Aspect::Conjunction => 0.0,
            Aspect::Sextile => 60.0,
            Aspect::Square => 90.0,
            Aspect::Trine => 120.0,
            Aspect::Quincunx => 150.0,
            Aspect::Opposition => 180.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Aspect::Conjunction => "conjunction",
            Aspect::Sextile => "sextile",
            Aspect::Square => "square",
            Aspect::Trine => "trine",
            Aspect::Quincunx => "quincunx",
            Aspect::Opposition => "opposition",
        }
    }

    /// Supportive aspects for window classification.
    pub fn is_supportive(&self) -> bool {
        matches!(self, Aspect::Trine | Aspect::Sextile | Aspect::Conjunction)
    }

    /// Tension aspects for caution classification.
    pub fn is_tension(&self) -> bool {
        matches!(self, Aspect::Square | Aspect::Opposition)
    }
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Aspect {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conjunction" => Ok(Aspect::Conjunction),
            "sextile" => Ok(Aspect::Sextile),
            "square" => Ok(Aspect::Square),
            "trine" => Ok(Aspect::Trine),
            // "inconjunct" is the traditional alias
            "quincunx" | "inconjunct" => Ok(Aspect::Quincunx),
            "opposition" => Ok(Aspect::Opposition),
            other => Err(ConfigError::UnknownAspect(other.to_string())),
        }
    }
}
