use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::markets::{DEFAULT_GOAL_BUCKETS, GoalBucket, validate_buckets};
use crate::parlay::ParlayConfig;
use crate::scoreline::{XgWeights, check_goal_cap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_goals: u32,
    /// Share of full-time scoring expected before the break.
    pub half_time_fraction: f64,
    pub top_scores: usize,
    pub value_threshold: f64,
    pub goal_buckets: Vec<GoalBucket>,
    pub xg: XgWeights,
    // Dixon-Coles rho; 0 keeps goals independent.
    pub low_score_rho: f64,
    /// League goals per match used when a fixture has no team statistics.
    pub baseline_total_goals: f64,
    pub strict_normalization: bool,
    pub parlay: ParlayConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_goals: 10,
            half_time_fraction: 0.45,
            top_scores: 5,
            value_threshold: 0.05,
            goal_buckets: DEFAULT_GOAL_BUCKETS.clone(),
            xg: XgWeights::default(),
            low_score_rho: 0.0,
            baseline_total_goals: 2.60,
            strict_normalization: false,
            parlay: ParlayConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults, then the JSON file if given, then `MATCHDAY_*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("read config {}", path.display()))?;
                serde_json::from_str::<EngineConfig>(&raw)
                    .with_context(|| format!("parse config {}", path.display()))?
            }
            None => EngineConfig::default(),
        };
        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    /// Values that fail to parse are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string());

        if let Some(v) = read("MATCHDAY_MAX_GOALS").and_then(|v| v.parse::<u32>().ok()) {
            self.max_goals = v;
        }
        if let Some(v) = read("MATCHDAY_HALF_TIME_FRACTION").and_then(|v| v.parse::<f64>().ok()) {
            self.half_time_fraction = v;
        }
        if let Some(v) = read("MATCHDAY_VALUE_THRESHOLD").and_then(|v| v.parse::<f64>().ok()) {
            self.value_threshold = v;
        }
        if let Some(v) = read("MATCHDAY_MAX_COMBINATIONS").and_then(|v| v.parse::<usize>().ok()) {
            self.parlay.max_combinations = v;
        }
        if let Some(v) = read("MATCHDAY_TOP_K").and_then(|v| v.parse::<usize>().ok()) {
            self.parlay.top_k = v;
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        check_goal_cap(self.max_goals)?;
        if !(self.half_time_fraction > 0.0 && self.half_time_fraction <= 1.0) {
            return Err(EngineError::InvalidConfig {
                field: "half_time_fraction",
                reason: format!("{} must be in (0, 1]", self.half_time_fraction),
            });
        }
        if !self.value_threshold.is_finite() {
            return Err(EngineError::InvalidConfig {
                field: "value_threshold",
                reason: "must be finite".to_string(),
            });
        }
        if !self.low_score_rho.is_finite() {
            return Err(EngineError::InvalidConfig {
                field: "low_score_rho",
                reason: "must be finite".to_string(),
            });
        }
        if !self.baseline_total_goals.is_finite() || self.baseline_total_goals < 0.0 {
            return Err(EngineError::InvalidConfig {
                field: "baseline_total_goals",
                reason: format!("{} must be non-negative", self.baseline_total_goals),
            });
        }
        if self.parlay.max_combinations == 0 {
            return Err(EngineError::InvalidConfig {
                field: "parlay.max_combinations",
                reason: "must be at least 1".to_string(),
            });
        }
        self.xg.validate()?;
        validate_buckets(&self.goal_buckets)
    }
}
