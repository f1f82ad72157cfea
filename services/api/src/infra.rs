use applicant_review::config::AccessConfig;
use applicant_review::workflows::review::applications::{
    Application, ApplicationType, EnrichmentError, EventId, FieldDefinition, FormTemplate,
    NotificationSender, NotifyError, Outcome, ProfileEnricher, UserId,
};
use applicant_review::workflows::review::evaluations::{
    Category, CriterionId, EvaluationCriterion, ReviewStage, ReviewerCompetency,
};
use applicant_review::workflows::review::{InMemoryReviewStore, ReviewError, RosterResolver};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

pub(crate) const DEMO_EVENT: &str = "evt-demo";
pub(crate) const DEMO_ADMIN: &str = "admin-demo";
pub(crate) const DEMO_REVIEWERS: [&str; 2] = ["rev-ana", "rev-ben"];

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Applicant messaging stand-in that records each outcome in the service log.
#[derive(Debug, Default, Clone)]
pub(crate) struct TracingNotifier;

impl NotificationSender for TracingNotifier {
    fn send(&self, application: &Application, outcome: Outcome) -> Result<(), NotifyError> {
        info!(
            application_id = %application.id,
            applicant_id = %application.applicant_id,
            template = %outcome.template(),
            "applicant notification queued"
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct LoggingEnricher;

impl ProfileEnricher for LoggingEnricher {
    fn enrich(&self, application: &Application) -> Result<(), EnrichmentError> {
        info!(
            application_id = %application.id,
            applicant_id = %application.applicant_id,
            "profile enrichment requested"
        );
        Ok(())
    }
}

/// Build the roster resolver, falling back to the demo rosters when none are configured.
pub(crate) fn roster_resolver(access: &AccessConfig, seeded: bool) -> RosterResolver {
    let mut admins: Vec<UserId> = access.admins.iter().map(UserId::new).collect();
    let mut reviewers: Vec<UserId> = access.reviewers.iter().map(UserId::new).collect();
    if seeded && admins.is_empty() && reviewers.is_empty() {
        admins.push(UserId::new(DEMO_ADMIN));
        reviewers.extend(DEMO_REVIEWERS.iter().map(|id| UserId::new(*id)));
    }
    RosterResolver::new(admins, reviewers)
}

/// Load the demo event's forms, rubric and reviewer competencies into the store.
pub(crate) fn seed_demo_event(store: &InMemoryReviewStore) -> Result<EventId, ReviewError> {
    let event = EventId::new(DEMO_EVENT);

    store.set_form_template(
        event.clone(),
        ApplicationType::Resident,
        FormTemplate::new(vec![
            FieldDefinition::required("full_name", "Full name"),
            FieldDefinition::required("project_pitch", "What will you build during the residency?"),
            FieldDefinition::optional("needs_visa", "Do you need a visa letter?"),
            FieldDefinition::required_when(
                "passport_country",
                "Passport issuing country",
                "needs_visa",
                "yes",
            ),
            FieldDefinition::optional("portfolio_url", "Portfolio link"),
        ])?,
    )?;
    store.set_form_template(
        event.clone(),
        ApplicationType::Speaker,
        FormTemplate::new(vec![
            FieldDefinition::required("full_name", "Full name"),
            FieldDefinition::required("talk_title", "Talk title"),
            FieldDefinition::required("talk_abstract", "Abstract"),
            FieldDefinition::required("arrival_date", "Arrival date").editable_after_submit(),
            FieldDefinition::optional("av_requirements", "A/V requirements")
                .editable_after_submit(),
        ])?,
    )?;

    store.set_criteria(
        event.clone(),
        vec![
            criterion(&event, "originality", "Originality", "technical", 2.0, 1, &[]),
            criterion(&event, "feasibility", "Feasibility", "technical", 1.0, 2, &[]),
            criterion(&event, "clarity", "Clarity", "communication", 1.0, 3, &[]),
            criterion(
                &event,
                "delivery",
                "On-camera delivery",
                "communication",
                1.0,
                4,
                &[ReviewStage::VideoReview],
            ),
        ],
    )?;

    for (reviewer, technical, communication) in [(DEMO_REVIEWERS[0], 5, 3), (DEMO_REVIEWERS[1], 2, 4)]
    {
        let reviewer = UserId::new(reviewer);
        store.set_competencies(
            reviewer.clone(),
            vec![
                competency(&reviewer, "technical", technical),
                competency(&reviewer, "communication", communication),
            ],
        )?;
    }

    info!(event_id = %event, "demo event seeded");
    Ok(event)
}

fn criterion(
    event: &EventId,
    id: &str,
    name: &str,
    category: &str,
    weight: f64,
    order: u32,
    stages: &[ReviewStage],
) -> EvaluationCriterion {
    EvaluationCriterion {
        id: CriterionId::new(id),
        event_id: event.clone(),
        name: name.to_string(),
        category: Category::new(category),
        weight,
        min_score: 0.0,
        max_score: 10.0,
        order,
        stages: stages.to_vec(),
    }
}

fn competency(reviewer: &UserId, category: &str, level: i32) -> ReviewerCompetency {
    ReviewerCompetency {
        reviewer_id: reviewer.clone(),
        category: Category::new(category),
        competency_level: level,
        base_weight: 1.0,
    }
}
