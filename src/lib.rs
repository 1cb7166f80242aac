pub mod calibration;
pub mod config;
pub mod engine;
pub mod error;
pub mod form;
pub mod markets;
pub mod odds;
pub mod parlay;
pub mod probability;
pub mod report;
pub mod scoreline;
pub mod value;

pub use config::EngineConfig;
pub use engine::{
    Fixture, MarketEstimate, MarketOdds, MatchAnalysis, MatchEngine, SlateReport, analyze,
    compose_parlay,
};
pub use error::{EngineError, EngineResult};
pub use odds::OddsTriple;
pub use parlay::{ParlayCombination, ParlayComposer, ParlayConfig, ParlayResult};
pub use probability::{Outcome, OutcomeProbs, ProbabilityMap};
pub use scoreline::TeamForm;
pub use value::{MatchOutcomeCandidate, ValueBet};
