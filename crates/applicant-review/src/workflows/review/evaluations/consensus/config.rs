use serde::{Deserialize, Serialize};

/// Classification boundaries for the consensus indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Score at or above which a low-spread accept majority is a strong accept.
    pub strong_threshold: f64,
    pub midpoint: f64,
    /// Spread at or below which reviewers are considered aligned.
    pub low_spread: f64,
    /// Spread above which the panel is divergent whatever the score.
    pub high_spread: f64,
    /// Minority share of accept/decline votes treated as an even split.
    pub split_share: f64,
    /// Completed evaluations needed before any decision-grade signal.
    pub min_reviewers: usize,
    /// Upper end of the overall score range.
    pub score_scale: f64,
}

impl ConsensusConfig {
    /// Mirror of `strong_threshold` on the reject side.
    pub fn strong_reject_threshold(&self) -> f64 {
        self.score_scale - self.strong_threshold
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            strong_threshold: 7.5,
            midpoint: 5.0,
            low_spread: 2.0,
            high_spread: 4.0,
            split_share: 0.4,
            min_reviewers: 1,
            score_scale: 10.0,
        }
    }
}
