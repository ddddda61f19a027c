pub mod config;
pub mod evaluator;
pub mod models;
pub mod session;

pub use config::{ConfigError, EvaluatorConfig, LevelParams, ScoreWeights, StructureRule};
pub use evaluator::{Decision, RejectReason, Rejection, SetupEvaluator, STRUCTURAL_PREDICATES};
pub use models::{AtrLevelModel, RuleScoreModel};
pub use session::{HourWindow, SessionClock};
