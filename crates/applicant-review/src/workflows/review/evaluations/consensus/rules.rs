use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::{EvaluationId, EvaluationStatus, Recommendation, ReviewStage};
use crate::workflows::review::applications::domain::UserId;

/// One reviewer's weighted input to the consensus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewerContribution {
    pub reviewer_id: UserId,
    pub evaluation_id: EvaluationId,
    pub stage: ReviewStage,
    pub status: EvaluationStatus,
    pub overall_score: f64,
    pub confidence: Option<u8>,
    pub recommendation: Option<Recommendation>,
    pub weight: f64,
    pub weighted_score: f64,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ReviewerContribution {
    pub fn is_completed(&self) -> bool {
        self.status == EvaluationStatus::Completed
    }
}

/// Counts of recommendations across the completed evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecommendationTally {
    pub accept: usize,
    pub reject: usize,
    pub waitlist: usize,
    pub needs_more_info: usize,
}

/// Which side the recommendations fall on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Majority {
    Accept,
    Decline,
    /// Votes split exactly, or the minority reaches the split share.
    Split,
    /// Nobody took a side.
    Abstained,
}

impl RecommendationTally {
    pub(crate) fn record(&mut self, recommendation: Recommendation) {
        match recommendation {
            Recommendation::Accept => self.accept += 1,
            Recommendation::Reject => self.reject += 1,
            Recommendation::Waitlist => self.waitlist += 1,
            Recommendation::NeedsMoreInfo => self.needs_more_info += 1,
        }
    }

    pub fn declines(&self) -> usize {
        self.reject + self.waitlist
    }

    pub(crate) fn majority(&self, split_share: f64) -> Majority {
        let accept = self.accept;
        let decline = self.declines();
        let decided = accept + decline;
        if decided == 0 {
            return Majority::Abstained;
        }

        let minority = accept.min(decline) as f64 / decided as f64;
        if accept == decline || (minority > 0.0 && minority >= split_share) {
            return Majority::Split;
        }

        if accept > decline {
            Majority::Accept
        } else {
            Majority::Decline
        }
    }

    pub(crate) fn tally<'a, I>(contributions: I) -> Self
    where
        I: IntoIterator<Item = &'a ReviewerContribution>,
    {
        let mut tally = Self::default();
        for recommendation in contributions
            .into_iter()
            .filter_map(|contribution| contribution.recommendation)
        {
            tally.record(recommendation);
        }
        tally
    }
}

/// Weighted mean of the overall scores. Falls back to the plain mean when the
/// weights sum to zero.
pub(crate) fn weighted_mean<'a, I>(contributions: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a ReviewerContribution>,
{
    let mut weighted = 0.0;
    let mut weights = 0.0;
    let mut plain = 0.0;
    let mut count = 0usize;
    for contribution in contributions {
        weighted += contribution.weighted_score;
        weights += contribution.weight;
        plain += contribution.overall_score;
        count += 1;
    }

    if count == 0 {
        None
    } else if weights > 0.0 {
        Some(weighted / weights)
    } else {
        Some(plain / count as f64)
    }
}

/// Range between the highest and lowest overall score.
pub(crate) fn spread<'a, I>(contributions: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a ReviewerContribution>,
{
    contributions
        .into_iter()
        .map(|contribution| contribution.overall_score)
        .fold(None, |range: Option<(f64, f64)>, score| match range {
            None => Some((score, score)),
            Some((low, high)) => Some((low.min(score), high.max(score))),
        })
        .map(|(low, high)| high - low)
}

/// Weighted score descending, then earlier completion, then reviewer id.
pub(crate) fn presentation_order(
    left: &ReviewerContribution,
    right: &ReviewerContribution,
) -> Ordering {
    right
        .weighted_score
        .total_cmp(&left.weighted_score)
        .then_with(|| match (left.completed_at, right.completed_at) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| left.reviewer_id.cmp(&right.reviewer_id))
}
