//! Celestial body identifiers and planet classes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// A celestial body tracked by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Body {
    Sun,
    Moon,
    Mercury,
    Venus,
    Mars,
    Jupiter,
    Saturn,
    Uranus,
    Neptune,
    Pluto,
    TrueNode,
    MeanNode,
    Chiron,
    Ceres,
    Pallas,
    Juno,
    Vesta,
}

/// Weighting class of a body, used by the scoring engine and the
/// outer-class orb default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanetClass {
    Luminary,
    Inner,
    Outer,
    Node,
    Chiron,
    Extra,
}

impl Body {
    /// All bodies in the default transit set.
    pub const DEFAULT_TRANSIT_SET: [Body; 7] = [
        Body::Sun,
        Body::Moon,
        Body::Mercury,
        Body::Venus,
        Body::Mars,
        Body::Jupiter,
        Body::Saturn,
    ];

    /// Weighting class for this body.
    pub fn class(&self) -> PlanetClass {
        match self {
            Body::Sun | Body::Moon => PlanetClass::Luminary,
            Body::Mercury | Body::Venus | Body::Mars => PlanetClass::Inner,
            Body::Jupiter | Body::Saturn | Body::Uranus | Body::Neptune | Body::Pluto => {
                PlanetClass::Outer
            }
            Body::TrueNode | Body::MeanNode => PlanetClass::Node,
            Body::Chiron => PlanetClass::Chiron,
            Body::Ceres | Body::Pallas | Body::Juno | Body::Vesta => PlanetClass::Extra,
        }
    }

    /// Whether this body belongs to the outer-planet orb class.
    pub fn is_outer(&self) -> bool {
        self.class() == PlanetClass::Outer
    }

    /// Whether this body can station (reverse apparent direction).
    /// The Sun and Moon always move eastward geocentrically.
    pub fn can_station(&self) -> bool {
        !matches!(self, Body::Sun | Body::Moon)
    }

    /// Bodies considered malefic for caution-window classification.
    pub fn is_malefic(&self) -> bool {
        matches!(self, Body::Mars | Body::Saturn | Body::Pluto)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Body::Sun => "Sun",
            Body::Moon => "Moon",
            Body::Mercury => "Mercury",
            Body::Venus => "Venus",
            Body::Mars => "Mars",
            Body::Jupiter => "Jupiter",
            Body::Saturn => "Saturn",
            Body::Uranus => "Uranus",
            Body::Neptune => "Neptune",
            Body::Pluto => "Pluto",
            Body::TrueNode => "TrueNode",
            Body::MeanNode => "MeanNode",
            Body::Chiron => "Chiron",
            Body::Ceres => "Ceres",
            Body::Pallas => "Pallas",
            Body::Juno => "Juno",
            Body::Vesta => "Vesta",
        }
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Body {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Sun" => Ok(Body::Sun),
            "Moon" => Ok(Body::Moon),
            "Mercury" => Ok(Body::Mercury),
            "Venus" => Ok(Body::Venus),
            "Mars" => Ok(Body::Mars),
            "Jupiter" => Ok(Body::Jupiter),
            "Saturn" => Ok(Body::Saturn),
            "Uranus" => Ok(Body::Uranus),
            "Neptune" => Ok(Body::Neptune),
            "Pluto" => Ok(Body::Pluto),
            "TrueNode" => Ok(Body::TrueNode),
            "MeanNode" => Ok(Body::MeanNode),
            "Chiron" => Ok(Body::Chiron),
            "Ceres" => Ok(Body::Ceres),
            "Pallas" => Ok(Body::Pallas),
            "Juno" => Ok(Body::Juno),
            "Vesta" => Ok(Body::Vesta),
            other => Err(ConfigError::UnknownBody(other.to_string())),
        }
    }
}
