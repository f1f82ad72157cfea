use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::review::applications::domain::{ApplicationId, EventId, UserId};

string_id!(EvaluationId);
string_id!(CriterionId);
string_id!(
    /// Scoring domain such as `technical` or `communication`.
    Category
);

/// Review phase. Later stages compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStage {
    Screening,
    DetailedReview,
    VideoReview,
    Consensus,
    FinalDecision,
}

impl ReviewStage {
    pub const fn label(self) -> &'static str {
        match self {
            ReviewStage::Screening => "screening",
            ReviewStage::DetailedReview => "detailed_review",
            ReviewStage::VideoReview => "video_review",
            ReviewStage::Consensus => "consensus",
            ReviewStage::FinalDecision => "final_decision",
        }
    }
}

impl fmt::Display for ReviewStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationStatus {
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Accept,
    Reject,
    Waitlist,
    NeedsMoreInfo,
}

/// Side of the accept/decline split a recommendation falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leaning {
    Accept,
    Decline,
}

impl Recommendation {
    /// Waitlist counts against acceptance; `NeedsMoreInfo` abstains.
    pub const fn leaning(self) -> Option<Leaning> {
        match self {
            Recommendation::Accept => Some(Leaning::Accept),
            Recommendation::Reject | Recommendation::Waitlist => Some(Leaning::Decline),
            Recommendation::NeedsMoreInfo => None,
        }
    }
}

/// One rubric line for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationCriterion {
    pub id: CriterionId,
    pub event_id: EventId,
    pub name: String,
    pub category: Category,
    /// Relative weight; criteria need not sum to one.
    pub weight: f64,
    pub min_score: f64,
    pub max_score: f64,
    pub order: u32,
    /// Stages this criterion is scored in. Empty means every stage.
    #[serde(default)]
    pub stages: Vec<ReviewStage>,
}

impl EvaluationCriterion {
    pub fn applies_to(&self, stage: ReviewStage) -> bool {
        self.stages.is_empty() || self.stages.contains(&stage)
    }
}

/// One reviewer's assessment of one application at one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: EvaluationId,
    pub application_id: ApplicationId,
    pub event_id: EventId,
    pub reviewer_id: UserId,
    pub stage: ReviewStage,
    pub status: EvaluationStatus,
    pub overall_score: Option<f64>,
    pub confidence: Option<u8>,
    pub recommendation: Option<Recommendation>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Evaluation {
    pub fn is_completed(&self) -> bool {
        self.status == EvaluationStatus::Completed
    }
}

/// Latest score for `(evaluation, criterion)`. Previous values are not kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScore {
    pub evaluation_id: EvaluationId,
    pub criterion_id: CriterionId,
    pub score: f64,
    pub reasoning: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewerCompetency {
    pub reviewer_id: UserId,
    pub category: Category,
    pub competency_level: i32,
    pub base_weight: f64,
}

/// Reviewer input when closing an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub recommendation: Recommendation,
    #[serde(default)]
    pub confidence: Option<u8>,
    /// Overrides the score derived from the rubric.
    #[serde(default)]
    pub overall_score: Option<f64>,
}
