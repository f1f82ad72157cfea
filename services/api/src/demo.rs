use crate::infra::{
    roster_resolver, seed_demo_event, LoggingEnricher, TracingNotifier, DEMO_ADMIN, DEMO_REVIEWERS,
};
use applicant_review::config::{AccessConfig, ReviewConfig};
use applicant_review::error::AppError;
use applicant_review::workflows::review::applications::{
    Application, ApplicationService, ApplicationStatus, ApplicationType, EditIntent, EventId,
    NewApplication, ResponseEntry, UserId,
};
use applicant_review::workflows::review::evaluations::{
    CompletionRequest, ConsensusView, CriterionId, EvaluationService, Recommendation, ReviewStage,
};
use applicant_review::workflows::review::InMemoryReviewStore;
use clap::Args;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Completed evaluations required before the consensus is classified
    #[arg(long)]
    pub(crate) min_reviewers: Option<usize>,
    /// Skip the waitlist ranking portion of the demo.
    #[arg(long)]
    pub(crate) skip_waitlist: bool,
}

struct DemoRig {
    event: EventId,
    applications: ApplicationService<InMemoryReviewStore, TracingNotifier>,
    evaluations: EvaluationService<InMemoryReviewStore, InMemoryReviewStore>,
}

impl DemoRig {
    fn new(min_reviewers: Option<usize>) -> Result<Self, AppError> {
        let store = Arc::new(InMemoryReviewStore::new());
        let event = seed_demo_event(&store)?;
        let resolver = Arc::new(roster_resolver(&AccessConfig::default(), true));

        let mut config = ReviewConfig::default();
        if let Some(min_reviewers) = min_reviewers {
            config.consensus.min_reviewers = min_reviewers;
        }

        let applications = ApplicationService::new(
            store.clone(),
            Arc::new(TracingNotifier),
            resolver.clone(),
            config.retry,
        )
        .with_enricher(Arc::new(LoggingEnricher));
        let evaluations = EvaluationService::new(store.clone(), store, resolver, config);

        Ok(Self {
            event,
            applications,
            evaluations,
        })
    }

    fn submitted_applicant(
        &self,
        applicant: &str,
        answers: &[(&str, &str)],
    ) -> Result<Application, AppError> {
        let caller = UserId::new(applicant);
        let draft = self.applications.create_or_get(
            &caller,
            NewApplication {
                applicant_id: caller.clone(),
                applicant_email: format!("{applicant}@example.org"),
                event_id: self.event.clone(),
                application_type: ApplicationType::Resident,
            },
        )?;
        let entries = answers
            .iter()
            .map(|(field_key, value)| ResponseEntry {
                field_key: field_key.to_string(),
                value: value.to_string(),
            })
            .collect();
        let saved = self.applications.bulk_upsert_responses(
            &caller,
            &draft.id,
            entries,
            EditIntent::Autosave,
        )?;
        println!(
            "- {} saved {} answers | complete: {} | missing: {}",
            applicant,
            saved.responses.len(),
            saved.completeness.is_complete,
            display_list(&saved.completeness.missing_field_keys)
        );

        Ok(self.applications.submit(&caller, &draft.id)?)
    }

    fn review(
        &self,
        reviewer: &str,
        application: &Application,
        scores: &[(&str, f64)],
        recommendation: Recommendation,
        confidence: u8,
    ) -> Result<(), AppError> {
        let caller = UserId::new(reviewer);
        let evaluation = self.evaluations.assign(
            &caller,
            &application.id,
            None,
            ReviewStage::Screening,
        )?;
        for (criterion, score) in scores {
            self.evaluations.upsert_score(
                &caller,
                &evaluation.id,
                &CriterionId::new(*criterion),
                *score,
                None,
            )?;
        }
        let completed = self.evaluations.complete(
            &caller,
            &evaluation.id,
            CompletionRequest {
                recommendation,
                confidence: Some(confidence),
                overall_score: None,
            },
        )?;
        println!(
            "- {} completed {} | overall {:.2} | {:?} (confidence {})",
            reviewer,
            completed.id,
            completed.overall_score.unwrap_or_default(),
            recommendation,
            confidence
        );
        Ok(())
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        min_reviewers,
        skip_waitlist,
    } = args;

    let rig = DemoRig::new(min_reviewers)?;
    let admin = UserId::new(DEMO_ADMIN);

    println!("Applicant review demo for event {}", rig.event);
    println!("\nIntake");
    let ada = rig.submitted_applicant(
        "u-ada",
        &[
            ("full_name", "Ada Lovelace"),
            ("project_pitch", "A notation for composing music with the analytical engine"),
            ("needs_visa", "yes"),
            ("passport_country", "GB"),
        ],
    )?;
    println!("- {} is {}", ada.id, ada.status);

    println!("\nScreening");
    rig.review(
        DEMO_REVIEWERS[0],
        &ada,
        &[("originality", 9.0), ("feasibility", 7.0), ("clarity", 8.0)],
        Recommendation::Accept,
        4,
    )?;
    rig.review(
        DEMO_REVIEWERS[1],
        &ada,
        &[("originality", 6.0), ("feasibility", 5.0), ("clarity", 7.0)],
        Recommendation::Waitlist,
        3,
    )?;

    let view = rig.evaluations.consensus_view(&admin, &ada.id, None)?;
    render_consensus(&view);

    if skip_waitlist {
        return Ok(());
    }

    println!("\nWaitlist");
    let grace = rig.submitted_applicant(
        "u-grace",
        &[
            ("full_name", "Grace Hopper"),
            ("project_pitch", "A compiler for business data processing"),
        ],
    )?;
    rig.applications.bulk_update_status(
        &admin,
        &[ada.id.clone(), grace.id.clone()],
        ApplicationStatus::Waitlisted,
    )?;
    rig.applications.set_waitlist_position(&admin, &grace.id, 1)?;
    for application in rig.applications.ordered_waitlist(&admin, &rig.event)? {
        println!(
            "- #{} {} ({})",
            application
                .waitlist_order
                .map(|rank| rank.to_string())
                .unwrap_or_else(|| "-".to_string()),
            application.id,
            application.applicant_id
        );
    }

    let accepted = rig
        .applications
        .update_status(&admin, &grace.id, ApplicationStatus::Accepted)?;
    println!("- {} promoted to {}", accepted.id, accepted.status);

    Ok(())
}

fn render_consensus(view: &ConsensusView) {
    println!("\nConsensus");
    println!("- {}", view.summary);
    println!(
        "- score {} | provisional {} | spread {}",
        display_score(view.consensus_score),
        display_score(view.provisional_score),
        display_score(view.spread)
    );
    for contribution in &view.contributions {
        println!(
            "  - {} weight {:.3} | score {:.2} | {:?}",
            contribution.reviewer_id,
            contribution.weight,
            contribution.overall_score,
            contribution.status
        );
    }
}

fn display_score(score: Option<f64>) -> String {
    score
        .map(|value| format!("{value:.2}"))
        .unwrap_or_else(|| "n/a".to_string())
}

fn display_list(values: &[String]) -> String {
    if values.is_empty() {
        "none".to_string()
    } else {
        values.join(", ")
    }
}
