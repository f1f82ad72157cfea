use serde::{Deserialize, Serialize};

use super::config::ConsensusConfig;
use super::rules::{Majority, RecommendationTally};

/// Qualitative reading of the panel, ordered from most to least favourable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusIndicator {
    StrongAccept,
    LeanAccept,
    Divergent,
    LeanReject,
    StrongReject,
    InsufficientData,
}

impl ConsensusIndicator {
    pub const fn label(self) -> &'static str {
        match self {
            ConsensusIndicator::StrongAccept => "strong_accept",
            ConsensusIndicator::LeanAccept => "lean_accept",
            ConsensusIndicator::Divergent => "divergent",
            ConsensusIndicator::LeanReject => "lean_reject",
            ConsensusIndicator::StrongReject => "strong_reject",
            ConsensusIndicator::InsufficientData => "insufficient_data",
        }
    }
}

/// Decision-grade inputs, computed over completed evaluations only.
pub(crate) struct PanelSignals<'a> {
    pub completed: usize,
    pub score: Option<f64>,
    pub spread: Option<f64>,
    pub tally: &'a RecommendationTally,
}

pub(crate) fn classify(config: &ConsensusConfig, signals: &PanelSignals<'_>) -> ConsensusIndicator {
    if signals.completed < config.min_reviewers.max(1) {
        return ConsensusIndicator::InsufficientData;
    }
    let Some(score) = signals.score else {
        return ConsensusIndicator::InsufficientData;
    };
    let spread = signals.spread.unwrap_or(0.0);

    if spread > config.high_spread {
        return ConsensusIndicator::Divergent;
    }

    let aligned = spread <= config.low_spread;
    match signals.tally.majority(config.split_share) {
        Majority::Split => ConsensusIndicator::Divergent,
        Majority::Accept if score < config.midpoint => ConsensusIndicator::Divergent,
        Majority::Accept if score >= config.strong_threshold && aligned => {
            ConsensusIndicator::StrongAccept
        }
        Majority::Accept => ConsensusIndicator::LeanAccept,
        Majority::Decline if score > config.midpoint => ConsensusIndicator::Divergent,
        Majority::Decline if score <= config.strong_reject_threshold() && aligned => {
            ConsensusIndicator::StrongReject
        }
        Majority::Decline => ConsensusIndicator::LeanReject,
        // no side taken: the score alone can only lean, and an exact midpoint stays undecided
        Majority::Abstained if score > config.midpoint => ConsensusIndicator::LeanAccept,
        Majority::Abstained if score < config.midpoint => ConsensusIndicator::LeanReject,
        Majority::Abstained => ConsensusIndicator::Divergent,
    }
}

pub(crate) fn summary(
    indicator: ConsensusIndicator,
    signals: &PanelSignals<'_>,
    min_reviewers: usize,
) -> String {
    let tally = signals.tally;
    match indicator {
        ConsensusIndicator::InsufficientData => format!(
            "{} of {} required completed evaluations",
            signals.completed,
            min_reviewers.max(1)
        ),
        _ => format!(
            "{} across {} reviewers (score {:.2}, spread {:.2}; {} accept, {} decline, {} abstain)",
            indicator.label(),
            signals.completed,
            signals.score.unwrap_or_default(),
            signals.spread.unwrap_or_default(),
            tally.accept,
            tally.declines(),
            tally.needs_more_info
        ),
    }
}
