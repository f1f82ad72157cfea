use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{Category, ReviewerCompetency};

/// Confidence assumed when a reviewer did not report one.
pub const DEFAULT_CONFIDENCE: u8 = 3;
const MAX_CONFIDENCE: u8 = 5;

/// Constants for turning competency and confidence into a reviewer weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightingConfig {
    /// Weight contributed regardless of competency.
    pub base_weight_floor: f64,
    /// Extra weight earned by the top competency level.
    pub competency_span: f64,
    pub max_competency_level: i32,
    /// Confidence factor applied at confidence 1; confidence 5 maps to 1.0.
    pub min_confidence_factor: f64,
}

impl Default for WeightingConfig {
    fn default() -> Self {
        Self {
            base_weight_floor: 0.5,
            competency_span: 1.0,
            max_competency_level: 4,
            min_confidence_factor: 0.5,
        }
    }
}

pub struct CompetencyWeighter<'a> {
    config: &'a WeightingConfig,
}

impl<'a> CompetencyWeighter<'a> {
    pub fn new(config: &'a WeightingConfig) -> Self {
        Self { config }
    }

    /// Monotonic in confidence, from `min_confidence_factor` up to 1.0.
    pub fn confidence_factor(&self, confidence: Option<u8>) -> f64 {
        let confidence = confidence
            .unwrap_or(DEFAULT_CONFIDENCE)
            .clamp(1, MAX_CONFIDENCE);
        let floor = self.config.min_confidence_factor.clamp(0.0, 1.0);
        floor + (1.0 - floor) * f64::from(confidence - 1) / f64::from(MAX_CONFIDENCE - 1)
    }

    /// Level used for categories the reviewer has no recorded competency in.
    pub fn neutral_level(&self) -> f64 {
        (1.0 + f64::from(self.max_level())) / 2.0
    }

    /// Single weight for a reviewer at a stage.
    ///
    /// Per-category competency is blended by the category's share of the
    /// stage rubric, so the categories that dominate the stage dominate the
    /// weight.
    pub fn reviewer_weight(
        &self,
        confidence: Option<u8>,
        competencies: &[ReviewerCompetency],
        shares: &BTreeMap<Category, f64>,
    ) -> f64 {
        let competency = if shares.is_empty() {
            self.level_weight(self.neutral_level(), 1.0)
        } else {
            shares
                .iter()
                .map(|(category, share)| share * self.category_weight(category, competencies))
                .sum()
        };

        competency * self.confidence_factor(confidence)
    }

    fn category_weight(&self, category: &Category, competencies: &[ReviewerCompetency]) -> f64 {
        match competencies
            .iter()
            .find(|competency| &competency.category == category)
        {
            Some(competency) => {
                let level = competency.competency_level.clamp(1, self.max_level());
                let base = if competency.base_weight.is_finite() {
                    competency.base_weight.max(0.0)
                } else {
                    0.0
                };
                self.level_weight(f64::from(level), base)
            }
            None => self.level_weight(self.neutral_level(), 1.0),
        }
    }

    fn level_weight(&self, level: f64, base_weight: f64) -> f64 {
        let max = f64::from(self.max_level());
        (self.config.base_weight_floor + level / max * self.config.competency_span) * base_weight
    }

    fn max_level(&self) -> i32 {
        self.config.max_competency_level.max(1)
    }
}
