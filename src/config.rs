//! Conflation configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConflationError, Result};

/// Default proximity threshold, in degrees.
///
/// This is planar distance in degrees, not meters. 0.02 degrees is about
/// 2.2 km of latitude and shrinks in longitude away from the equator.
pub const DEFAULT_RADIUS_DEGREES: f64 = 0.02;

/// Maximum distance at which an observation counts as the same location.
///
/// The unit is part of the value so a radius can never be read in the wrong
/// unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum ProximityRadius {
    /// Euclidean distance in raw longitude/latitude degrees.
    Degrees(f64),
    /// Haversine great-circle distance in meters.
    Meters(f64),
}

impl ProximityRadius {
    pub fn value(&self) -> f64 {
        match self {
            ProximityRadius::Degrees(r) | ProximityRadius::Meters(r) => *r,
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            ProximityRadius::Degrees(_) => "deg",
            ProximityRadius::Meters(_) => "m",
        }
    }
}

impl Default for ProximityRadius {
    fn default() -> Self {
        ProximityRadius::Degrees(DEFAULT_RADIUS_DEGREES)
    }
}

/// How candidates returned by the spatial index turn into a merge decision.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Merge only when exactly one node lies within the radius.
    #[default]
    UniqueWithinRadius,
    /// Merge into the nearest node unless another lies within
    /// `tie_tolerance` (same unit as the radius) of the nearest distance.
    UniqueNearest { tie_tolerance: f64 },
}

/// Configuration for the conflation engine.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflationConfig {
    /// Proximity radius for merge candidates.
    /// Default: 0.02 degrees
    pub radius: ProximityRadius,

    /// Ambiguity resolution policy.
    /// Default: merge only with a single candidate in range
    pub policy: MatchPolicy,
}

impl ConflationConfig {
    /// Config with the given radius and the default policy.
    pub fn with_radius(radius: ProximityRadius) -> Self {
        Self {
            radius,
            ..Self::default()
        }
    }

    /// Parse a config from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConflationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Reject radii and tolerances that cannot produce a sensible query.
    pub fn validate(&self) -> Result<()> {
        let radius = self.radius.value();
        if !radius.is_finite() || radius < 0.0 {
            return Err(ConflationError::Config(format!(
                "radius must be a non-negative number, got {}",
                radius
            )));
        }
        if let MatchPolicy::UniqueNearest { tie_tolerance } = self.policy {
            if !tie_tolerance.is_finite() || tie_tolerance < 0.0 {
                return Err(ConflationError::Config(format!(
                    "tie_tolerance must be a non-negative number, got {}",
                    tie_tolerance
                )));
            }
        }
        Ok(())
    }
}
