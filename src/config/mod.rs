//! Run configuration.
//!
//! Options arrive as loosely-typed input (TOML file or JSON value), are
//! deserialized into [`RawOptions`], and compiled exactly once into a
//! validated [`ForecastConfig`] that the rest of the pipeline passes by
//! reference. Validation failures are fatal at construction time; lookups
//! afterwards never fail.

pub mod orbs;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use crate::error::ConfigError;
use crate::models::aspect::Aspect;
use crate::models::body::{Body, PlanetClass};
use crate::models::chart::{AngleName, TargetId};
pub use orbs::OrbTable;

/// Timezone resolution behavior for unrecognized zone names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TzResolution {
    #[default]
    Strict,
    Heuristic,
    Fallback,
}

/// Output sections that can be enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Themes,
    Timeline,
    Windows,
    Cautions,
    Summary,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::Themes,
        Section::Timeline,
        Section::Windows,
        Section::Cautions,
        Section::Summary,
    ];
}

/// Fields that participate in the canonical event id, in hash order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Type,
    P1,
    P2,
    Aspect,
    House,
    Deg,
    TsMinute,
    System,
    HouseSystem,
    LocKey,
}

impl CanonicalField {
    pub const DEFAULT: [CanonicalField; 10] = [
        CanonicalField::Type,
        CanonicalField::P1,
        CanonicalField::P2,
        CanonicalField::Aspect,
        CanonicalField::House,
        CanonicalField::Deg,
        CanonicalField::TsMinute,
        CanonicalField::System,
        CanonicalField::HouseSystem,
        CanonicalField::LocKey,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            CanonicalField::Type => "type",
            CanonicalField::P1 => "p1",
            CanonicalField::P2 => "p2",
            CanonicalField::Aspect => "aspect",
            CanonicalField::House => "house",
            CanonicalField::Deg => "deg",
            CanonicalField::TsMinute => "ts_minute",
            CanonicalField::System => "system",
            CanonicalField::HouseSystem => "house_system",
            CanonicalField::LocKey => "loc_key",
        }
    }
}

/// Detection grid and refinement options.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionConfig {
    pub scan_step_hours: u32,
    pub refine_exact: bool,
    pub min_strength: f64,
    pub window_merge_minutes: i64,
    pub group_retrograde_campaigns: bool,
    pub dedup_tolerance_hours: f64,
    pub campaign_phases: Vec<String>,
}

fn default_campaign_phases() -> Vec<String> {
    [
        "approach",
        "exact-1",
        "retro-phase",
        "exact-2",
        "direct-phase",
        "exact-3",
        "decay",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Scoring weights and bonuses. Every constant here is an overridable
/// default, not a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    pub aspect_weight: HashMap<Aspect, f64>,
    pub planet_weight: HashMap<PlanetClass, f64>,
    pub angle_bonus: f64,
    pub angle_weights: HashMap<AngleName, f64>,
    pub house_change_bonus: f64,
    pub progressed_bonus: f64,
    pub eclipse_bonus: f64,
    pub midpoint_bonus: f64,
    pub declination_bonus: f64,
    pub applying_bonus: f64,
    pub separating_penalty: f64,
    pub solar_return_floor: f64,
    pub house_floor: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let aspect_weight = HashMap::from([
            (Aspect::Conjunction, 1.0),
            (Aspect::Opposition, 0.9),
            (Aspect::Square, 0.85),
            (Aspect::Trine, 0.7),
            (Aspect::Sextile, 0.5),
            (Aspect::Quincunx, 0.4),
        ]);
        let planet_weight = HashMap::from([
            (PlanetClass::Luminary, 1.0),
            (PlanetClass::Inner, 0.7),
            (PlanetClass::Outer, 1.2),
            (PlanetClass::Chiron, 0.6),
            (PlanetClass::Node, 0.8),
            (PlanetClass::Extra, 0.4),
        ]);
        let angle_weights = HashMap::from([
            (AngleName::Asc, 1.0),
            (AngleName::Mc, 0.95),
            (AngleName::Dsc, 0.95),
            (AngleName::Ic, 0.9),
        ]);
        ScoringConfig {
            aspect_weight,
            planet_weight,
            angle_bonus: 0.3,
            angle_weights,
            house_change_bonus: 0.2,
            progressed_bonus: 0.4,
            eclipse_bonus: 0.6,
            midpoint_bonus: 0.25,
            declination_bonus: 0.2,
            applying_bonus: 0.08,
            separating_penalty: -0.04,
            solar_return_floor: 0.75,
            house_floor: 0.6,
        }
    }
}

/// Performance guards.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceConfig {
    pub early_drop_below_score: f64,
    pub month_cache_ttl_days: i64,
    pub max_grid_points: usize,
    /// Timeout for one month's computation, seconds.
    pub month_timeout_secs: u64,
}

/// Output shaping.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub sections: Vec<Section>,
    pub max_events_per_month: usize,
    pub raw_events: bool,
    pub top_events_limit: usize,
}

/// Aspect scan policy.
#[derive(Debug, Clone, PartialEq)]
pub struct AspectPolicy {
    pub types: Vec<Aspect>,
    pub to_angles: Vec<AngleName>,
    pub applying_only: bool,
}

/// Transit body set and per-type include toggles.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitConfig {
    pub bodies: Vec<Body>,
    pub include_ingresses: bool,
    pub include_retrogrades: bool,
    pub include_stations: bool,
    pub include_lunations: bool,
    pub include_eclipses: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    pub min_orb_strength: f64,
    pub exclude_void_moon_windows: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MidpointConfig {
    pub enabled: bool,
    /// Natal body pairs whose midpoints are watched.
    pub pairs: Vec<(Body, Body)>,
    pub orb: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeclinationConfig {
    pub parallels: bool,
    pub contraparallels: bool,
    pub orb: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressionConfig {
    pub secondary: bool,
    pub solar_arc: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolarReturnConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HousesConfig {
    pub track_entries: bool,
    pub track_exits: bool,
}

/// The fully validated run configuration, constructed once.
#[derive(Debug, Clone)]
pub struct ForecastConfig {
    pub year: i32,
    pub timezone: Option<String>,
    pub tz_resolution: TzResolution,
    pub detection: DetectionConfig,
    pub scoring: ScoringConfig,
    pub performance: PerformanceConfig,
    pub outputs: OutputConfig,
    pub aspects: AspectPolicy,
    pub orb_table: OrbTable,
    pub transits: TransitConfig,
    pub filters: FilterConfig,
    pub midpoints: MidpointConfig,
    pub declination: DeclinationConfig,
    pub progressions: ProgressionConfig,
    pub solar_return: SolarReturnConfig,
    pub houses: HousesConfig,
    pub canonical_fields: Vec<CanonicalField>,
    pub versioning: BTreeMap<String, String>,
    /// Echo of the raw options for the meta block.
    pub options_echo: serde_json::Value,
}

impl ForecastConfig {
    /// Compile a config from raw options, validating everything up front.
    pub fn from_options(raw: RawOptions) -> Result<Self, ConfigError> {
        raw.compile()
    }

    /// Compile a config from a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: RawOptions = toml::from_str(input)?;
        raw.compile()
    }

    /// Default configuration for a year (used heavily by tests).
    pub fn defaults_for_year(year: i32) -> Self {
        RawOptions {
            year,
            ..RawOptions::default()
        }
        .compile()
        .expect("default options always compile")
    }
}

// ---------------------------------------------------------------------------
// Raw (serde) layer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOptions {
    pub year: i32,
    pub timezone: Option<String>,
    pub time: RawTime,
    pub detection: RawDetection,
    pub scoring: RawScoring,
    pub performance: RawPerformance,
    pub outputs: RawOutputs,
    pub aspects: RawAspects,
    pub transits: RawTransits,
    pub filters: RawFilters,
    pub midpoints: RawMidpoints,
    pub declination_aspects: RawDeclination,
    pub progressions: RawProgressions,
    pub solar_return: RawSolarReturn,
    pub houses: RawHouses,
    pub ids: RawIds,
    pub versioning: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTime {
    pub timezone: Option<String>,
    pub tz_resolution: TzResolution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDetection {
    pub scan_step_hours: u32,
    pub refine_exact: bool,
    pub min_strength: f64,
    pub window_merge_minutes: i64,
    pub group_retrograde_campaigns: bool,
    pub dedup_tolerance_hours: f64,
    pub campaign_phases: Vec<String>,
}

impl Default for RawDetection {
    fn default() -> Self {
        RawDetection {
            scan_step_hours: 6,
            refine_exact: true,
            min_strength: 0.6,
            window_merge_minutes: 20,
            group_retrograde_campaigns: false,
            dedup_tolerance_hours: 48.0,
            campaign_phases: default_campaign_phases(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawScoring {
    pub aspect_weight: BTreeMap<String, f64>,
    pub planet_weight: BTreeMap<String, f64>,
    pub angle_bonus: Option<f64>,
    pub angle_weights: BTreeMap<String, f64>,
    pub house_change_bonus: Option<f64>,
    pub progressed_bonus: Option<f64>,
    pub eclipse_bonus: Option<f64>,
    pub midpoint_bonus: Option<f64>,
    pub declination_bonus: Option<f64>,
    pub applying_bonus: Option<f64>,
    pub separating_penalty: Option<f64>,
    pub solar_return_floor: Option<f64>,
    pub house_floor: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPerformance {
    pub early_drop_below_score: f64,
    pub month_cache_ttl_days: i64,
    pub max_grid_points: usize,
    pub month_timeout_secs: u64,
}

impl Default for RawPerformance {
    fn default() -> Self {
        RawPerformance {
            early_drop_below_score: 0.35,
            month_cache_ttl_days: 7,
            max_grid_points: 2000,
            month_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOutputs {
    pub sections: Vec<Section>,
    pub max_events_per_month: usize,
    pub raw_events: bool,
    pub top_events_limit: usize,
}

impl Default for RawOutputs {
    fn default() -> Self {
        RawOutputs {
            sections: Section::ALL.to_vec(),
            max_events_per_month: 12,
            raw_events: true,
            top_events_limit: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAspects {
    pub types: Vec<String>,
    /// `default` and `outer` keys are reserved; every other key is a body
    /// override.
    pub orb: BTreeMap<String, f64>,
    pub pair_overrides: BTreeMap<String, f64>,
    pub angle_orbs: BTreeMap<String, f64>,
    pub to_angles: Vec<String>,
    pub applying_only: bool,
}

impl Default for RawAspects {
    fn default() -> Self {
        RawAspects {
            types: Aspect::ALL.iter().map(|a| a.name().to_string()).collect(),
            orb: BTreeMap::new(),
            pair_overrides: BTreeMap::new(),
            angle_orbs: BTreeMap::new(),
            to_angles: vec![],
            applying_only: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTransits {
    pub bodies: Vec<String>,
    pub bodies_extras: Vec<String>,
    /// `"true"` or `"mean"` lunar node.
    pub node_type: String,
    pub include_ingresses: bool,
    pub include_retrogrades: bool,
    pub include_stations: bool,
    pub include_lunations: bool,
    pub include_eclipses: bool,
}

impl Default for RawTransits {
    fn default() -> Self {
        RawTransits {
            bodies: vec![],
            bodies_extras: vec![],
            node_type: "true".to_string(),
            include_ingresses: false,
            include_retrogrades: false,
            include_stations: false,
            include_lunations: true,
            include_eclipses: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFilters {
    pub min_orb_strength: f64,
    pub exclude_void_moon_windows: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMidpoints {
    pub enabled: bool,
    /// Pairs as `"Sun/Moon"` strings.
    pub pairs: Vec<String>,
    pub orb: f64,
}

impl Default for RawMidpoints {
    fn default() -> Self {
        RawMidpoints {
            enabled: false,
            pairs: vec![],
            orb: 1.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDeclination {
    pub parallels: bool,
    pub contraparallels: bool,
    pub orb: f64,
}

impl Default for RawDeclination {
    fn default() -> Self {
        RawDeclination {
            parallels: false,
            contraparallels: false,
            orb: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawProgressions {
    pub secondary: bool,
    pub solar_arc: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSolarReturn {
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawHouses {
    pub track_entries: bool,
    pub track_exits: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawIds {
    pub canonical_fields: Vec<CanonicalField>,
}

impl RawOptions {
    /// Validate and compile the raw options into a [`ForecastConfig`].
    pub fn compile(self) -> Result<ForecastConfig, ConfigError> {
        let echo = serde_json::to_value(&self).unwrap_or(serde_json::Value::Null);

        if self.detection.scan_step_hours == 0 {
            return Err(ConfigError::InvalidOption {
                key: "detection.scan_step_hours".into(),
                reason: "must be at least 1".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.detection.min_strength) {
            return Err(ConfigError::InvalidOption {
                key: "detection.min_strength".into(),
                reason: format!("{} not in [0, 1]", self.detection.min_strength),
            });
        }
        if self.detection.campaign_phases.is_empty() {
            return Err(ConfigError::InvalidOption {
                key: "detection.campaign_phases".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.performance.max_grid_points == 0 {
            return Err(ConfigError::InvalidOption {
                key: "performance.max_grid_points".into(),
                reason: "must be at least 1".into(),
            });
        }

        let orb_table = compile_orb_table(&self.aspects)?;
        let aspects = compile_aspect_policy(&self.aspects)?;
        let scoring = compile_scoring(&self.scoring)?;
        let transits = compile_transits(&self.transits)?;
        let midpoints = compile_midpoints(&self.midpoints)?;

        let timezone = self.time.timezone.clone().or(self.timezone.clone());
        let canonical_fields = if self.ids.canonical_fields.is_empty() {
            CanonicalField::DEFAULT.to_vec()
        } else {
            self.ids.canonical_fields.clone()
        };

        Ok(ForecastConfig {
            year: self.year,
            timezone,
            tz_resolution: self.time.tz_resolution,
            detection: DetectionConfig {
                scan_step_hours: self.detection.scan_step_hours,
                refine_exact: self.detection.refine_exact,
                min_strength: self.detection.min_strength,
                window_merge_minutes: self.detection.window_merge_minutes,
                group_retrograde_campaigns: self.detection.group_retrograde_campaigns,
                dedup_tolerance_hours: self.detection.dedup_tolerance_hours,
                campaign_phases: self.detection.campaign_phases,
            },
            scoring,
            performance: PerformanceConfig {
                early_drop_below_score: self.performance.early_drop_below_score,
                month_cache_ttl_days: self.performance.month_cache_ttl_days,
                max_grid_points: self.performance.max_grid_points,
                month_timeout_secs: self.performance.month_timeout_secs,
            },
            outputs: OutputConfig {
                sections: self.outputs.sections,
                max_events_per_month: self.outputs.max_events_per_month,
                raw_events: self.outputs.raw_events,
                top_events_limit: self.outputs.top_events_limit,
            },
            aspects,
            orb_table,
            transits,
            filters: FilterConfig {
                min_orb_strength: self.filters.min_orb_strength,
                exclude_void_moon_windows: self.filters.exclude_void_moon_windows,
            },
            midpoints,
            declination: DeclinationConfig {
                parallels: self.declination_aspects.parallels,
                contraparallels: self.declination_aspects.contraparallels,
                orb: self.declination_aspects.orb,
            },
            progressions: ProgressionConfig {
                secondary: self.progressions.secondary,
                solar_arc: self.progressions.solar_arc,
            },
            solar_return: SolarReturnConfig {
                enabled: self.solar_return.enabled,
            },
            houses: HousesConfig {
                track_entries: self.houses.track_entries,
                track_exits: self.houses.track_exits,
            },
            canonical_fields,
            versioning: self.versioning,
            options_echo: echo,
        })
    }
}

fn compile_orb_table(raw: &RawAspects) -> Result<OrbTable, ConfigError> {
    let default = raw.orb.get("default").copied().unwrap_or(3.0);
    let outer = raw.orb.get("outer").copied();

    let mut body = BTreeMap::new();
    for (key, value) in &raw.orb {
        if key == "default" || key == "outer" {
            continue;
        }
        body.insert(Body::from_str(key)?, *value);
    }

    let mut pair = BTreeMap::new();
    for (key, value) in &raw.pair_overrides {
        let (left, right) = key.split_once('|').ok_or_else(|| ConfigError::InvalidOption {
            key: format!("aspects.pair_overrides.{}", key),
            reason: "expected `Transit|Natal`".into(),
        })?;
        let transit = Body::from_str(left)?;
        let natal = TargetId::from_str(right)?;
        pair.insert((transit, natal), *value);
    }

    let mut angle = BTreeMap::new();
    for (key, value) in &raw.angle_orbs {
        let name = AngleName::from_label(key).ok_or_else(|| ConfigError::InvalidOption {
            key: format!("aspects.angle_orbs.{}", key),
            reason: "unknown angle".into(),
        })?;
        angle.insert(name, *value);
    }

    OrbTable::new(default, body, pair, angle, outer)
}

fn compile_aspect_policy(raw: &RawAspects) -> Result<AspectPolicy, ConfigError> {
    let mut types = Vec::new();
    for name in &raw.types {
        let aspect = Aspect::from_str(name)?;
        if !types.contains(&aspect) {
            types.push(aspect);
        }
    }
    let mut to_angles = Vec::new();
    for label in &raw.to_angles {
        let angle = AngleName::from_label(label).ok_or_else(|| ConfigError::InvalidOption {
            key: format!("aspects.to_angles.{}", label),
            reason: "unknown angle".into(),
        })?;
        to_angles.push(angle);
    }
    Ok(AspectPolicy {
        types,
        to_angles,
        applying_only: raw.applying_only,
    })
}

fn parse_planet_class(name: &str) -> Result<PlanetClass, ConfigError> {
    match name {
        "luminary" => Ok(PlanetClass::Luminary),
        "inner" => Ok(PlanetClass::Inner),
        "outer" => Ok(PlanetClass::Outer),
        "node" => Ok(PlanetClass::Node),
        "chiron" => Ok(PlanetClass::Chiron),
        "extra" | "extras" => Ok(PlanetClass::Extra),
        other => Err(ConfigError::InvalidOption {
            key: format!("scoring.planet_weight.{}", other),
            reason: "unknown planet class".into(),
        }),
    }
}

fn compile_scoring(raw: &RawScoring) -> Result<ScoringConfig, ConfigError> {
    let mut scoring = ScoringConfig::default();
    for (name, weight) in &raw.aspect_weight {
        scoring.aspect_weight.insert(Aspect::from_str(name)?, *weight);
    }
    for (name, weight) in &raw.planet_weight {
        scoring.planet_weight.insert(parse_planet_class(name)?, *weight);
    }
    for (label, weight) in &raw.angle_weights {
        let angle = AngleName::from_label(label).ok_or_else(|| ConfigError::InvalidOption {
            key: format!("scoring.angle_weights.{}", label),
            reason: "unknown angle".into(),
        })?;
        scoring.angle_weights.insert(angle, *weight);
    }
    if let Some(v) = raw.angle_bonus {
        scoring.angle_bonus = v;
    }
    if let Some(v) = raw.house_change_bonus {
        scoring.house_change_bonus = v;
    }
    if let Some(v) = raw.progressed_bonus {
        scoring.progressed_bonus = v;
    }
    if let Some(v) = raw.eclipse_bonus {
        scoring.eclipse_bonus = v;
    }
    if let Some(v) = raw.midpoint_bonus {
        scoring.midpoint_bonus = v;
    }
    if let Some(v) = raw.declination_bonus {
        scoring.declination_bonus = v;
    }
    if let Some(v) = raw.applying_bonus {
        scoring.applying_bonus = v;
    }
    if let Some(v) = raw.separating_penalty {
        scoring.separating_penalty = v;
    }
    if let Some(v) = raw.solar_return_floor {
        scoring.solar_return_floor = v;
    }
    if let Some(v) = raw.house_floor {
        scoring.house_floor = v;
    }
    Ok(scoring)
}

fn compile_transits(raw: &RawTransits) -> Result<TransitConfig, ConfigError> {
    let node = match raw.node_type.to_ascii_lowercase().as_str() {
        "mean" => Body::MeanNode,
        _ => Body::TrueNode,
    };
    let mut bodies: Vec<Body> = Vec::new();
    for name in &raw.bodies {
        bodies.push(Body::from_str(name)?);
    }
    if bodies.is_empty() {
        bodies = Body::DEFAULT_TRANSIT_SET.to_vec();
    }
    if !bodies.contains(&node) {
        bodies.push(node);
    }
    for name in &raw.bodies_extras {
        let body = Body::from_str(name)?;
        if !bodies.contains(&body) {
            bodies.push(body);
        }
    }
    Ok(TransitConfig {
        bodies,
        include_ingresses: raw.include_ingresses,
        include_retrogrades: raw.include_retrogrades,
        include_stations: raw.include_stations,
        include_lunations: raw.include_lunations,
        include_eclipses: raw.include_eclipses,
    })
}

fn compile_midpoints(raw: &RawMidpoints) -> Result<MidpointConfig, ConfigError> {
    let mut pairs = Vec::new();
    for spec in &raw.pairs {
        let (left, right) = spec.split_once('/').ok_or_else(|| ConfigError::InvalidOption {
            key: format!("midpoints.pairs.{}", spec),
            reason: "expected `A/B`".into(),
        })?;
        pairs.push((Body::from_str(left)?, Body::from_str(right)?));
    }
    Ok(MidpointConfig {
        enabled: raw.enabled,
        pairs,
        orb: raw.orb,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_compile() {
        let config = ForecastConfig::defaults_for_year(2025);
        assert_eq!(config.year, 2025);
        assert_eq!(config.detection.scan_step_hours, 6);
        assert_eq!(config.outputs.max_events_per_month, 12);
        // Node is appended to the default body set.
        assert!(config.transits.bodies.contains(&Body::TrueNode));
        assert_eq!(config.canonical_fields.len(), 10);
    }

    #[test]
    fn test_toml_round() {
        let config = ForecastConfig::from_toml_str(
            r#"
            year = 2025
            timezone = "Asia/Kolkata"

            [detection]
            scan_step_hours = 3
            min_strength = 0.2
            group_retrograde_campaigns = true

            [aspects]
            types = ["conjunction", "opposition", "square", "trine", "sextile", "quincunx"]
            to_angles = ["ASC", "MC", "DSC", "IC"]

            [aspects.orb]
            default = 3.0
            Sun = 4.0
            Moon = 5.0
            outer = 2.0

            [aspects.pair_overrides]
            "Sun|Saturn" = 3.5

            [aspects.angle_orbs]
            ASC = 3.0
            MC = 3.0

            [transits]
            bodies = ["Sun", "Moon", "Mercury", "Venus", "Mars", "Jupiter", "Saturn"]
            bodies_extras = ["Ceres"]
            include_ingresses = true
            include_stations = true

            [scoring]
            angle_bonus = 0.3
            eclipse_bonus = 0.6

            [progressions]
            secondary = true
            solar_arc = true

            [solar_return]
            enabled = true

            [houses]
            track_entries = true
            track_exits = true
            "#,
        )
        .unwrap();

        assert_eq!(config.detection.scan_step_hours, 3);
        assert!(config.detection.group_retrograde_campaigns);
        assert!(config.transits.bodies.contains(&Body::Ceres));
        assert!(config.progressions.secondary);
        assert_eq!(
            config.orb_table.resolve(
                Body::Sun,
                Some(TargetId::Body(Body::Saturn)),
                None
            ),
            3.5
        );
        assert_eq!(config.aspects.to_angles.len(), 4);
    }

    #[test]
    fn test_unknown_aspect_is_fatal() {
        let result = ForecastConfig::from_toml_str(
            r#"
            year = 2025
            [aspects]
            types = ["septile"]
            "#,
        );
        assert!(matches!(result, Err(ConfigError::UnknownAspect(_))));
    }

    #[test]
    fn test_zero_step_rejected() {
        let result = ForecastConfig::from_toml_str(
            r#"
            year = 2025
            [detection]
            scan_step_hours = 0
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_negative_orb_rejected() {
        let result = ForecastConfig::from_toml_str(
            r#"
            year = 2025
            [aspects.orb]
            default = -2.0
            "#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidOrb { .. })));
    }

    #[test]
    fn test_mean_node_selection() {
        let config = ForecastConfig::from_toml_str(
            r#"
            year = 2025
            [transits]
            node_type = "mean"
            "#,
        )
        .unwrap();
        assert!(config.transits.bodies.contains(&Body::MeanNode));
        assert!(!config.transits.bodies.contains(&Body::TrueNode));
    }

    #[test]
    fn test_midpoint_pair_parsing() {
        let config = ForecastConfig::from_toml_str(
            r#"
            year = 2025
            [midpoints]
            enabled = true
            pairs = ["Sun/Moon", "Venus/Mars"]
            orb = 1.0
            "#,
        )
        .unwrap();
        assert_eq!(config.midpoints.pairs.len(), 2);
        assert_eq!(config.midpoints.pairs[0], (Body::Sun, Body::Moon));
    }
}
