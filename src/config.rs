//! Static scoring and trend configuration, loaded once at startup.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_fields")]
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub trend: TrendConfig,
    #[serde(default)]
    pub engagement: EngagementBands,
}

/// One rated field of the daily reflection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub weight: f64,
    /// Set when a higher raw value means lower engagement (e.g. disruption).
    #[serde(default)]
    pub invert: bool,
    pub range: FieldRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldRange {
    /// Closed integer range.
    Scale { min: i64, max: i64 },
    /// Ordered categorical values, lowest first.
    Levels { levels: Vec<String> },
    /// Head count present, out of the class size on the roster.
    Attendance,
}

impl fmt::Display for FieldRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRange::Scale { min, max } => write!(f, "{min}..={max}"),
            FieldRange::Levels { levels } => write!(f, "[{}]", levels.join(", ")),
            FieldRange::Attendance => f.write_str("0..=class size"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendConfig {
    #[serde(default = "default_week_start")]
    pub week_start: Weekday,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

/// Mean-CEI bands used to interpret a dashboard window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementBands {
    #[serde(default = "default_green_min")]
    pub green_min: f64,
    #[serde(default = "default_yellow_min")]
    pub yellow_min: f64,
}

fn default_week_start() -> Weekday {
    Weekday::Mon
}
fn default_threshold() -> f64 {
    3.0
}
fn default_green_min() -> f64 {
    75.0
}
fn default_yellow_min() -> f64 {
    60.0
}

fn scale(name: &str, weight: f64, invert: bool) -> FieldSpec {
    FieldSpec {
        name: name.to_string(),
        weight,
        invert,
        range: FieldRange::Scale { min: 1, max: 5 },
    }
}

fn default_fields() -> Vec<FieldSpec> {
    vec![
        scale("participation", 0.3, false),
        scale("attentiveness", 0.2, false),
        scale("energy", 0.2, false),
        scale("understanding", 0.2, false),
        scale("disruption", 0.1, true),
    ]
}

fn levels(name: &str, weight: f64) -> FieldSpec {
    FieldSpec {
        name: name.to_string(),
        weight,
        invert: false,
        range: FieldRange::Levels {
            levels: vec!["low".into(), "medium".into(), "high".into()],
        },
    }
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            week_start: default_week_start(),
            threshold: default_threshold(),
        }
    }
}

impl Default for EngagementBands {
    fn default() -> Self {
        Self {
            green_min: default_green_min(),
            yellow_min: default_yellow_min(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fields: default_fields(),
            trend: TrendConfig::default(),
            engagement: EngagementBands::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(raw)?;
        config.check()?;
        Ok(config)
    }

    /// The paper form teachers already fill in: participation and
    /// attentiveness as low/medium/high (40% each) and attendance against
    /// the class roster (20%). Field names match the form's columns.
    pub fn classroom_form() -> Self {
        Self {
            fields: vec![
                levels("participation_level", 0.4),
                levels("attentiveness_level", 0.4),
                FieldSpec {
                    name: "number_present".to_string(),
                    weight: 0.2,
                    invert: false,
                    range: FieldRange::Attendance,
                },
            ],
            ..Self::default()
        }
    }

    /// Whether scoring needs a class size from the roster.
    pub fn needs_roster(&self) -> bool {
        self.fields
            .iter()
            .any(|field| field.range == FieldRange::Attendance)
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        if self.fields.is_empty() {
            return Err(ConfigError::Invalid("at least one rated field is required".into()));
        }

        let mut seen = HashSet::new();
        let mut total = 0.0;
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate field {}", field.name)));
            }
            if !field.weight.is_finite() || field.weight < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "field {} has invalid weight {}",
                    field.name, field.weight
                )));
            }
            match &field.range {
                FieldRange::Scale { min, max } if min >= max => {
                    return Err(ConfigError::Invalid(format!(
                        "field {} has empty range {min}..={max}",
                        field.name
                    )));
                }
                FieldRange::Levels { levels } if levels.len() < 2 => {
                    return Err(ConfigError::Invalid(format!(
                        "field {} needs at least two levels",
                        field.name
                    )));
                }
                _ => {}
            }
            total += field.weight;
        }

        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::Invalid(format!("weights sum to {total}, expected 1")));
        }
        if !self.trend.threshold.is_finite() || self.trend.threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "trend threshold {} must be non-negative",
                self.trend.threshold
            )));
        }
        if self.engagement.yellow_min > self.engagement.green_min {
            return Err(ConfigError::Invalid(
                "engagement yellow_min must not exceed green_min".into(),
            ));
        }
        Ok(())
    }
}
