//! Dense manual ordering over the waitlisted applications of one event.
//!
//! Ranks are always `1..=n` over the applications that carry one. Every call
//! returns only the rows whose rank changed so the caller can persist them in a
//! single batch.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use super::domain::{Application, ApplicationId, ApplicationStatus};
use crate::workflows::review::error::{ConflictError, ReviewError, ValidationError};

pub struct WaitlistRanker;

impl WaitlistRanker {
    /// List-insert `target` at `position`, shifting the applications at or
    /// after that rank down by one.
    ///
    /// The target leaves its previous slot first. Positions past the end clamp
    /// to the end so the ordering never develops gaps.
    pub fn place(
        event_applications: &[Application],
        target: &ApplicationId,
        position: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Application>, ReviewError> {
        if position == 0 {
            return Err(ValidationError::InvalidPosition.into());
        }

        let subject = Self::waitlisted_target(event_applications, target)?;
        let mut ranked: Vec<&Application> = Self::ranked(event_applications)
            .into_iter()
            .filter(|application| &application.id != target)
            .collect();

        let index = (position as usize - 1).min(ranked.len());
        ranked.insert(index, subject);

        Ok(Self::renumber(&ranked, now))
    }

    /// Drop the manual rank of `target` and close the gap it leaves.
    pub fn clear(
        event_applications: &[Application],
        target: &ApplicationId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Application>, ReviewError> {
        let subject = Self::waitlisted_target(event_applications, target)?;

        let ranked: Vec<&Application> = Self::ranked(event_applications)
            .into_iter()
            .filter(|application| &application.id != target)
            .collect();
        let mut changed = Self::renumber(&ranked, now);

        if subject.waitlist_order.is_some() {
            let mut cleared = subject.clone();
            cleared.waitlist_order = None;
            cleared.updated_at = now;
            changed.push(cleared);
        }

        Ok(changed)
    }

    /// Re-densify ranks after applications left the waitlist.
    pub fn compact(event_applications: &[Application], now: DateTime<Utc>) -> Vec<Application> {
        Self::renumber(&Self::ranked(event_applications), now)
    }

    /// Display order: manual ranks first, then natural submission order.
    pub fn ordered(event_applications: &[Application]) -> Vec<Application> {
        let mut waitlisted: Vec<Application> = event_applications
            .iter()
            .filter(|application| application.status == ApplicationStatus::Waitlisted)
            .cloned()
            .collect();
        waitlisted.sort_by(Self::display_order);
        waitlisted
    }

    fn waitlisted_target<'a>(
        event_applications: &'a [Application],
        target: &ApplicationId,
    ) -> Result<&'a Application, ReviewError> {
        let subject = event_applications
            .iter()
            .find(|application| &application.id == target)
            .ok_or_else(|| ReviewError::not_found("application", target))?;

        if subject.status != ApplicationStatus::Waitlisted {
            return Err(ConflictError::NotWaitlisted {
                status: subject.status,
            }
            .into());
        }

        Ok(subject)
    }

    fn ranked(event_applications: &[Application]) -> Vec<&Application> {
        let mut ranked: Vec<&Application> = event_applications
            .iter()
            .filter(|application| {
                application.status == ApplicationStatus::Waitlisted
                    && application.waitlist_order.is_some()
            })
            .collect();
        ranked.sort_by(|left, right| {
            left.waitlist_order
                .cmp(&right.waitlist_order)
                .then_with(|| left.id.cmp(&right.id))
        });
        ranked
    }

    fn renumber(ranked: &[&Application], now: DateTime<Utc>) -> Vec<Application> {
        ranked
            .iter()
            .zip(1u32..)
            .filter(|(application, rank)| application.waitlist_order != Some(*rank))
            .map(|(application, rank)| {
                let mut updated = (*application).clone();
                updated.waitlist_order = Some(rank);
                updated.updated_at = now;
                updated
            })
            .collect()
    }

    fn display_order(left: &Application, right: &Application) -> Ordering {
        match (left.waitlist_order, right.waitlist_order) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => match (left.submitted_at, right.submitted_at) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        }
        .then_with(|| left.id.cmp(&right.id))
    }
}
