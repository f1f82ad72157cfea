mod config;
mod policy;
mod rules;

pub use config::ConsensusConfig;
pub use policy::ConsensusIndicator;
pub use rules::{RecommendationTally, ReviewerContribution};

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::catalog::CriteriaCatalog;
use super::domain::{Evaluation, EvaluationId, ReviewStage, ReviewerCompetency};
use super::weighting::{CompetencyWeighter, WeightingConfig};
use crate::workflows::review::applications::domain::{Application, ApplicationId, UserId};
use policy::{classify, summary, PanelSignals};

/// Derived, never stored. Recomputed from the current evaluations on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusView {
    pub application_id: ApplicationId,
    pub applicant_id: UserId,
    /// Stage filter the view was computed for; `None` spans every stage.
    pub stage: Option<ReviewStage>,
    /// Each reviewer's latest scored evaluation, plus their latest completed
    /// one when that is an earlier stage.
    pub contributions: Vec<ReviewerContribution>,
    pub completed_count: usize,
    /// Weighted mean over each reviewer's latest completed evaluation.
    pub consensus_score: Option<f64>,
    /// Weighted mean over each reviewer's latest scored evaluation, completed or not.
    pub provisional_score: Option<f64>,
    pub spread: Option<f64>,
    pub recommendations: RecommendationTally,
    pub indicator: ConsensusIndicator,
    pub summary: String,
}

/// Stateless aggregator that applies weighting and classification to a panel.
pub struct ConsensusAggregator<'a> {
    catalog: &'a CriteriaCatalog,
    weighting: &'a WeightingConfig,
    config: &'a ConsensusConfig,
}

impl<'a> ConsensusAggregator<'a> {
    pub fn new(
        catalog: &'a CriteriaCatalog,
        weighting: &'a WeightingConfig,
        config: &'a ConsensusConfig,
    ) -> Self {
        Self {
            catalog,
            weighting,
            config,
        }
    }

    pub fn aggregate(
        &self,
        application: &Application,
        evaluations: &[Evaluation],
        competencies: &HashMap<UserId, Vec<ReviewerCompetency>>,
        stage: Option<ReviewStage>,
    ) -> ConsensusView {
        let weighter = CompetencyWeighter::new(self.weighting);
        let mut shares = BTreeMap::new();

        let panel = Panel::select(evaluations, stage);
        let mut contributions: Vec<ReviewerContribution> = panel
            .members()
            .filter_map(|evaluation| {
                let overall_score = evaluation.overall_score?;
                let stage_shares = shares
                    .entry(evaluation.stage)
                    .or_insert_with(|| self.catalog.category_shares(evaluation.stage));
                let reviewer_competencies = competencies
                    .get(&evaluation.reviewer_id)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let weight = weighter.reviewer_weight(
                    evaluation.confidence,
                    reviewer_competencies,
                    stage_shares,
                );

                Some(ReviewerContribution {
                    reviewer_id: evaluation.reviewer_id.clone(),
                    evaluation_id: evaluation.id.clone(),
                    stage: evaluation.stage,
                    status: evaluation.status,
                    overall_score,
                    confidence: evaluation.confidence,
                    recommendation: evaluation.recommendation,
                    weight,
                    weighted_score: overall_score * weight,
                    completed_at: evaluation.completed_at,
                })
            })
            .collect();
        contributions.sort_by(rules::presentation_order);

        let completed: Vec<&ReviewerContribution> = contributions
            .iter()
            .filter(|contribution| panel.is_settled(&contribution.evaluation_id))
            .collect();
        let current = contributions
            .iter()
            .filter(|contribution| panel.is_current(&contribution.evaluation_id));
        let recommendations = RecommendationTally::tally(completed.iter().copied());
        let signals = PanelSignals {
            completed: completed.len(),
            score: rules::weighted_mean(completed.iter().copied()),
            spread: rules::spread(completed.iter().copied()),
            tally: &recommendations,
        };
        let indicator = classify(self.config, &signals);
        let summary = summary(indicator, &signals, self.config.min_reviewers);

        ConsensusView {
            application_id: application.id.clone(),
            applicant_id: application.applicant_id.clone(),
            stage,
            completed_count: signals.completed,
            consensus_score: signals.score,
            provisional_score: rules::weighted_mean(current),
            spread: signals.spread,
            recommendations,
            indicator,
            summary,
            contributions,
        }
    }
}

/// Scored evaluations that make up the panel, one or two per reviewer.
struct Panel<'e> {
    /// Most advanced scored stage per reviewer; feeds the provisional score.
    current: BTreeMap<&'e UserId, &'e Evaluation>,
    /// Most advanced completed stage per reviewer; feeds the decision signals.
    settled: BTreeMap<&'e UserId, &'e Evaluation>,
}

impl<'e> Panel<'e> {
    fn select(evaluations: &'e [Evaluation], stage: Option<ReviewStage>) -> Self {
        let scored = || {
            evaluations.iter().filter(move |evaluation| {
                evaluation.overall_score.is_some()
                    && stage.map_or(true, |stage| evaluation.stage == stage)
            })
        };

        Self {
            current: Self::latest_per_reviewer(scored()),
            settled: Self::latest_per_reviewer(
                scored().filter(|evaluation| evaluation.is_completed()),
            ),
        }
    }

    fn latest_per_reviewer<I>(evaluations: I) -> BTreeMap<&'e UserId, &'e Evaluation>
    where
        I: Iterator<Item = &'e Evaluation>,
    {
        let mut latest: BTreeMap<&UserId, &Evaluation> = BTreeMap::new();
        for evaluation in evaluations {
            latest
                .entry(&evaluation.reviewer_id)
                .and_modify(|current| {
                    if evaluation.stage > current.stage {
                        *current = evaluation;
                    }
                })
                .or_insert(evaluation);
        }
        latest
    }

    fn members(&self) -> impl Iterator<Item = &'e Evaluation> + '_ {
        let extra = self.settled.values().copied().filter(|settled| {
            self.current
                .get(&settled.reviewer_id)
                .map_or(true, |current| current.id != settled.id)
        });
        self.current.values().copied().chain(extra)
    }

    fn is_current(&self, id: &EvaluationId) -> bool {
        self.current.values().any(|evaluation| &evaluation.id == id)
    }

    fn is_settled(&self, id: &EvaluationId) -> bool {
        self.settled.values().any(|evaluation| &evaluation.id == id)
    }
}
