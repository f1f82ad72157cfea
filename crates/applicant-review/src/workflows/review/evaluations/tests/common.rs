use std::sync::Arc;
use std::time::Duration;

use axum::response::Response;
use serde_json::Value;

use crate::config::ReviewConfig;
use crate::workflows::review::access::{AuthorizationResolver, RosterResolver};
use crate::workflows::review::applications::completeness::{FieldDefinition, FormTemplate};
use crate::workflows::review::applications::domain::{
    Application, ApplicationType, EditIntent, EventId, NewApplication, Outcome, UserId,
};
use crate::workflows::review::applications::repository::{NotificationSender, NotifyError};
use crate::workflows::review::applications::ApplicationService;
use crate::workflows::review::evaluations::domain::{
    Category, CompletionRequest, CriterionId, Evaluation, EvaluationCriterion, Recommendation,
    ReviewStage, ReviewerCompetency,
};
use crate::workflows::review::evaluations::EvaluationService;
use crate::workflows::review::memory::InMemoryReviewStore;
use crate::workflows::review::mutation::RetryPolicy;

pub(super) const ADMIN: &str = "admin-1";
pub(super) const REVIEWER_A: &str = "rev-a";
pub(super) const REVIEWER_B: &str = "rev-b";
pub(super) const APPLICANT: &str = "u-1";

pub(super) struct SilentNotifier;

impl NotificationSender for SilentNotifier {
    fn send(&self, _application: &Application, _outcome: Outcome) -> Result<(), NotifyError> {
        Ok(())
    }
}

pub(super) struct Fixture {
    pub(super) store: Arc<InMemoryReviewStore>,
    pub(super) applications: ApplicationService<InMemoryReviewStore, SilentNotifier>,
    pub(super) evaluations: Arc<EvaluationService<InMemoryReviewStore, InMemoryReviewStore>>,
}

pub(super) fn user(id: &str) -> UserId {
    UserId::new(id)
}

pub(super) fn event() -> EventId {
    EventId::new("evt-2026")
}

pub(super) fn criterion(
    id: &str,
    category: &str,
    weight: f64,
    order: u32,
    stages: Vec<ReviewStage>,
) -> EvaluationCriterion {
    EvaluationCriterion {
        id: CriterionId::new(id),
        event_id: event(),
        name: id.replace('_', " "),
        category: Category::new(category),
        weight,
        min_score: 0.0,
        max_score: 10.0,
        order,
        stages,
    }
}

/// Two criteria apply to every stage; `stage_presence` only to video review.
pub(super) fn rubric() -> Vec<EvaluationCriterion> {
    vec![
        criterion("impact", "technical", 2.0, 1, Vec::new()),
        criterion("clarity", "communication", 1.0, 2, Vec::new()),
        criterion(
            "stage_presence",
            "communication",
            1.0,
            3,
            vec![ReviewStage::VideoReview],
        ),
    ]
}

pub(super) fn competency(reviewer: &str, category: &str, level: i32) -> ReviewerCompetency {
    ReviewerCompetency {
        reviewer_id: user(reviewer),
        category: Category::new(category),
        competency_level: level,
        base_weight: 1.0,
    }
}

pub(super) fn review_config() -> ReviewConfig {
    ReviewConfig {
        retry: RetryPolicy::new(5, Duration::ZERO),
        ..ReviewConfig::default()
    }
}

pub(super) fn resolver() -> Arc<dyn AuthorizationResolver> {
    Arc::new(RosterResolver::new(
        [user(ADMIN)],
        [user(REVIEWER_A), user(REVIEWER_B)],
    ))
}

pub(super) fn fixture() -> Fixture {
    let store = Arc::new(InMemoryReviewStore::new());
    let template = FormTemplate::new(vec![FieldDefinition::required("full_name", "Full name")])
        .expect("valid template");
    store
        .set_form_template(event(), ApplicationType::Resident, template)
        .expect("seed template");
    store.set_criteria(event(), rubric()).expect("seed rubric");

    let config = review_config();
    let applications = ApplicationService::new(
        store.clone(),
        Arc::new(SilentNotifier),
        resolver(),
        config.retry,
    );
    let evaluations = Arc::new(EvaluationService::new(
        store.clone(),
        store.clone(),
        resolver(),
        config,
    ));

    Fixture {
        store,
        applications,
        evaluations,
    }
}

impl Fixture {
    pub(super) fn submitted(&self, applicant: &str) -> Application {
        let caller = user(applicant);
        let draft = self
            .applications
            .create_or_get(
                &caller,
                NewApplication {
                    applicant_id: caller.clone(),
                    applicant_email: format!("{applicant}@example.org"),
                    event_id: event(),
                    application_type: ApplicationType::Resident,
                },
            )
            .expect("draft created");
        self.applications
            .upsert_response(
                &caller,
                &draft.id,
                "full_name",
                applicant.to_string(),
                EditIntent::Autosave,
            )
            .expect("answer saved");
        self.applications
            .submit(&caller, &draft.id)
            .expect("submitted")
    }

    /// Self-assign `reviewer` and score every listed criterion.
    pub(super) fn scored(
        &self,
        reviewer: &str,
        application: &Application,
        stage: ReviewStage,
        scores: &[(&str, f64)],
    ) -> Evaluation {
        let caller = user(reviewer);
        let mut evaluation = self
            .evaluations
            .assign(&caller, &application.id, None, stage)
            .expect("assigned");
        for (criterion_id, score) in scores {
            evaluation = self
                .evaluations
                .upsert_score(
                    &caller,
                    &evaluation.id,
                    &CriterionId::new(*criterion_id),
                    *score,
                    None,
                )
                .expect("scored")
                .evaluation;
        }
        evaluation
    }

    /// Score both general criteria with `score` and complete the evaluation.
    pub(super) fn completed(
        &self,
        reviewer: &str,
        application: &Application,
        score: f64,
        recommendation: Recommendation,
        confidence: Option<u8>,
    ) -> Evaluation {
        let evaluation = self.scored(
            reviewer,
            application,
            ReviewStage::Screening,
            &[("impact", score), ("clarity", score)],
        );
        self.evaluations
            .complete(
                &user(reviewer),
                &evaluation.id,
                CompletionRequest {
                    recommendation,
                    confidence,
                    overall_score: None,
                },
            )
            .expect("completed")
    }
}

pub(super) fn assert_close(actual: Option<f64>, expected: f64) {
    let actual = actual.expect("score present");
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
