use thiserror::Error;

/// Input-validation failures raised by the engine. All of them describe bad
/// caller input; none are retried internally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid decimal odds {odds}: must be finite and greater than 1.0")]
    InvalidOdds { odds: f64 },

    #[error("invalid team statistic {field}={value}: must be finite and non-negative")]
    InvalidTeamStatistics { field: &'static str, value: f64 },

    #[error("parlay would enumerate {requested} combinations, limit is {limit}")]
    CombinationLimitExceeded { requested: usize, limit: usize },

    #[error("probabilities for market {market} sum to zero")]
    DegenerateProbability { market: String },

    #[error("invalid probability {value} for {market} selection {key}")]
    InvalidProbability {
        market: String,
        key: String,
        value: f64,
    },

    #[error("exact score key {0:?} is not of the form home-away")]
    InvalidScoreLabel(String),

    #[error("scoreline goal cap {max_goals} is outside {min}..={max}")]
    InvalidGoalCap { max_goals: u32, min: u32, max: u32 },

    #[error("invalid goal buckets: {0}")]
    InvalidGoalBuckets(String),

    #[error("match {match_index} has no candidate legs")]
    EmptyCandidateSet { match_index: usize },

    #[error("invalid config value for {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
}

pub type EngineResult<T> = Result<T, EngineError>;
