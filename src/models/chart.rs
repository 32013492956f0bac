//! Reference chart and natal targets.
//!
//! A [`ReferenceChart`] is computed once per run from the birth data and the
//! external providers; the resulting [`NatalTarget`] list is immutable for
//! the remainder of the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::models::body::Body;

/// Zodiac reckoning mode passed to the position provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZodiacMode {
    Tropical,
    Sidereal,
}

/// House system passed to the house provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HouseSystem {
    Placidus,
    WholeSign,
}

impl fmt::Display for HouseSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HouseSystem::Placidus => f.write_str("Placidus"),
            HouseSystem::WholeSign => f.write_str("WholeSign"),
        }
    }
}

/// Geographic location of the chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoLocation {
    /// Location key with coordinates rounded to 3 decimals, used in
    /// canonical ids and cache keys.
    pub fn key(&self) -> String {
        format!(
            "{:.3},{:.3}",
            (self.latitude * 1000.0).round() / 1000.0,
            (self.longitude * 1000.0).round() / 1000.0
        )
    }
}

/// Chart angle names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AngleName {
    Asc,
    Mc,
    Dsc,
    Ic,
}

impl AngleName {
    pub fn label(&self) -> &'static str {
        match self {
            AngleName::Asc => "ASC",
            AngleName::Mc => "MC",
            AngleName::Dsc => "DSC",
            AngleName::Ic => "IC",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "ASC" | "Ascendant" => Some(AngleName::Asc),
            "MC" | "Midheaven" => Some(AngleName::Mc),
            "DSC" | "Descendant" => Some(AngleName::Dsc),
            "IC" => Some(AngleName::Ic),
            _ => None,
        }
    }
}

impl fmt::Display for AngleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kind of a natal target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Planet,
    Angle,
    HouseCusp,
}

/// Identifier of a natal target: a planet, a chart angle, or a house cusp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TargetId {
    Body(Body),
    Angle(AngleName),
    Cusp(u8),
}

impl TargetId {
    pub fn kind(&self) -> TargetKind {
        match self {
            TargetId::Body(_) => TargetKind::Planet,
            TargetId::Angle(_) => TargetKind::Angle,
            TargetId::Cusp(_) => TargetKind::HouseCusp,
        }
    }

    /// Angle label when the target is a chart angle.
    pub fn angle(&self) -> Option<AngleName> {
        match self {
            TargetId::Angle(a) => Some(*a),
            _ => None,
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetId::Body(b) => f.write_str(b.name()),
            TargetId::Angle(a) => f.write_str(a.label()),
            TargetId::Cusp(n) => write!(f, "Cusp{}", n),
        }
    }
}

impl std::str::FromStr for TargetId {
    type Err = crate::error::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(angle) = AngleName::from_label(s) {
            return Ok(TargetId::Angle(angle));
        }
        if let Some(rest) = s.strip_prefix("Cusp") {
            if let Ok(n) = rest.parse::<u8>() {
                if (1..=12).contains(&n) {
                    return Ok(TargetId::Cusp(n));
                }
            }
        }
        s.parse::<Body>().map(TargetId::Body)
    }
}

/// A fixed reference point from the natal chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NatalTarget {
    pub id: TargetId,
    /// Ecliptic longitude in `[0, 360)`.
    pub longitude: f64,
    /// Longitudinal speed at birth in degrees/day; zero for angles and cusps.
    pub speed: f64,
    /// Ecliptic latitude at birth, used as declination proxy when the
    /// provider does not report declination separately.
    pub latitude: f64,
}

impl NatalTarget {
    pub fn kind(&self) -> TargetKind {
        self.id.kind()
    }
}

/// The fixed reference chart a run is computed against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceChart {
    /// Birth instant, UTC.
    pub birth: DateTime<Utc>,
    pub location: GeoLocation,
    pub zodiac: ZodiacMode,
    pub house_system: HouseSystem,
    /// Optional sidereal frame identifier forwarded to the provider.
    pub sidereal_frame: Option<String>,
    /// Whether the birth time is known; angle and house targets are only
    /// resolved when it is.
    pub time_known: bool,
    /// Natal targets, resolved once at engine construction.
    pub targets: Vec<NatalTarget>,
}

impl ReferenceChart {
    /// Look up a natal target by id.
    pub fn target(&self, id: TargetId) -> Option<&NatalTarget> {
        self.targets.iter().find(|t| t.id == id)
    }

    /// Natal longitude of a body, if present in the chart.
    pub fn body_longitude(&self, body: Body) -> Option<f64> {
        self.target(TargetId::Body(body)).map(|t| t.longitude)
    }

    /// Deterministic signature over the chart identity, used for cache keys
    /// and seeded template selection.
    pub fn signature(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.birth.to_rfc3339().as_bytes());
        hasher.update(self.location.key().as_bytes());
        hasher.update(format!("{:?}|{}", self.zodiac, self.house_system).as_bytes());
        if let Some(frame) = &self.sidereal_frame {
            hasher.update(frame.as_bytes());
        }
        hex::encode(&hasher.finalize()[..8])
    }
}
