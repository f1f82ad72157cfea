use std::collections::{BTreeMap, HashSet};

use super::domain::{Category, CriterionId, EvaluationCriterion, EvaluationScore, ReviewStage};
use crate::workflows::review::applications::domain::EventId;
use crate::workflows::review::error::ValidationError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("criterion {criterion} belongs to event {found}, not {expected}")]
    ForeignCriterion {
        criterion: CriterionId,
        expected: EventId,
        found: EventId,
    },
    #[error("criterion {0} is declared more than once")]
    DuplicateCriterion(CriterionId),
    #[error("criterion {criterion} has invalid bounds [{min}, {max}]")]
    InvalidBounds {
        criterion: CriterionId,
        min: f64,
        max: f64,
    },
    #[error("criterion {criterion} has invalid weight {weight}")]
    InvalidWeight { criterion: CriterionId, weight: f64 },
}

/// Validated rubric for one event, kept in presentation order.
#[derive(Debug, Clone, PartialEq)]
pub struct CriteriaCatalog {
    event_id: EventId,
    criteria: Vec<EvaluationCriterion>,
}

impl CriteriaCatalog {
    pub fn new(
        event_id: EventId,
        mut criteria: Vec<EvaluationCriterion>,
    ) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for criterion in &criteria {
            if criterion.event_id != event_id {
                return Err(CatalogError::ForeignCriterion {
                    criterion: criterion.id.clone(),
                    expected: event_id,
                    found: criterion.event_id.clone(),
                });
            }
            if !seen.insert(criterion.id.clone()) {
                return Err(CatalogError::DuplicateCriterion(criterion.id.clone()));
            }
            let bounded = criterion.min_score.is_finite()
                && criterion.max_score.is_finite()
                && criterion.min_score < criterion.max_score;
            if !bounded {
                return Err(CatalogError::InvalidBounds {
                    criterion: criterion.id.clone(),
                    min: criterion.min_score,
                    max: criterion.max_score,
                });
            }
            if !criterion.weight.is_finite() || criterion.weight < 0.0 {
                return Err(CatalogError::InvalidWeight {
                    criterion: criterion.id.clone(),
                    weight: criterion.weight,
                });
            }
        }

        criteria.sort_by(|left, right| {
            left.order
                .cmp(&right.order)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(Self { event_id, criteria })
    }

    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }

    pub fn criteria(&self) -> &[EvaluationCriterion] {
        &self.criteria
    }

    pub fn criterion(&self, id: &CriterionId) -> Option<&EvaluationCriterion> {
        self.criteria.iter().find(|criterion| &criterion.id == id)
    }

    pub fn for_stage(&self, stage: ReviewStage) -> impl Iterator<Item = &EvaluationCriterion> {
        self.criteria
            .iter()
            .filter(move |criterion| criterion.applies_to(stage))
    }

    /// Share of the stage's total criterion weight held by each category.
    ///
    /// Falls back to an even split per criterion when every weight is zero.
    pub fn category_shares(&self, stage: ReviewStage) -> BTreeMap<Category, f64> {
        let mut totals: BTreeMap<Category, f64> = BTreeMap::new();
        let mut counts: BTreeMap<Category, f64> = BTreeMap::new();
        for criterion in self.for_stage(stage) {
            *totals.entry(criterion.category.clone()).or_default() += criterion.weight;
            *counts.entry(criterion.category.clone()).or_default() += 1.0;
        }

        let weight_sum: f64 = totals.values().sum();
        if weight_sum > 0.0 {
            return totals
                .into_iter()
                .map(|(category, weight)| (category, weight / weight_sum))
                .collect();
        }

        let count_sum: f64 = counts.values().sum();
        counts
            .into_iter()
            .map(|(category, count)| (category, count / count_sum))
            .collect()
    }

    /// Check that `score` is a valid value for a criterion scored at `stage`.
    pub fn validate_score(
        &self,
        stage: ReviewStage,
        criterion_id: &CriterionId,
        score: f64,
    ) -> Result<&EvaluationCriterion, ValidationError> {
        let criterion = self
            .criterion(criterion_id)
            .filter(|criterion| criterion.applies_to(stage))
            .ok_or_else(|| ValidationError::UnknownCriterion(criterion_id.clone()))?;

        if !score.is_finite() || score < criterion.min_score || score > criterion.max_score {
            return Err(ValidationError::ScoreOutOfBounds {
                criterion: criterion_id.clone(),
                score,
                min: criterion.min_score,
                max: criterion.max_score,
            });
        }

        Ok(criterion)
    }

    /// Stage criteria that have no score yet, in rubric order.
    pub fn unscored(&self, stage: ReviewStage, scores: &[EvaluationScore]) -> Vec<String> {
        self.for_stage(stage)
            .filter(|criterion| {
                !scores
                    .iter()
                    .any(|score| score.criterion_id == criterion.id)
            })
            .map(|criterion| criterion.id.to_string())
            .collect()
    }

    /// Weighted mean of the normalised criterion scores, projected onto `[0, scale]`.
    pub fn overall_score(
        &self,
        stage: ReviewStage,
        scores: &[EvaluationScore],
        scale: f64,
    ) -> Option<f64> {
        let normalised: Vec<(f64, f64)> = self
            .for_stage(stage)
            .filter_map(|criterion| {
                scores
                    .iter()
                    .find(|score| score.criterion_id == criterion.id)
                    .map(|score| {
                        let span = criterion.max_score - criterion.min_score;
                        ((score.score - criterion.min_score) / span, criterion.weight)
                    })
            })
            .collect();

        if normalised.is_empty() {
            return None;
        }

        let weight_sum: f64 = normalised.iter().map(|(_, weight)| weight).sum();
        let mean = if weight_sum > 0.0 {
            normalised
                .iter()
                .map(|(value, weight)| value * weight)
                .sum::<f64>()
                / weight_sum
        } else {
            normalised.iter().map(|(value, _)| value).sum::<f64>() / normalised.len() as f64
        };

        Some(mean * scale)
    }
}
