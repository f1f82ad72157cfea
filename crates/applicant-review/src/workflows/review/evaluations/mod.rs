//! Reviewer evaluations: rubric, per-criterion scores, reviewer weighting and
//! the consensus view.

pub mod catalog;
pub mod consensus;
pub mod domain;
pub mod repository;
pub mod router;
pub mod scores;
pub mod service;
pub mod weighting;

#[cfg(test)]
mod tests;

pub use catalog::{CatalogError, CriteriaCatalog};
pub use consensus::{
    ConsensusAggregator, ConsensusConfig, ConsensusIndicator, ConsensusView, RecommendationTally,
    ReviewerContribution,
};
pub use domain::{
    Category, CompletionRequest, CriterionId, Evaluation, EvaluationCriterion, EvaluationId,
    EvaluationScore, EvaluationStatus, Leaning, Recommendation, ReviewStage, ReviewerCompetency,
};
pub use repository::EvaluationRepository;
pub use router::evaluation_router;
pub use scores::ScoreStore;
pub use service::{EvaluationService, ScoreUpdate};
pub use weighting::{CompetencyWeighter, WeightingConfig};
