use super::common::*;
use std::sync::Arc;

use crate::workflows::review::applications::domain::{
    ApplicationStatus, ApplicationType, EditIntent, NewApplication, Outcome, ResponseEntry,
};
use crate::workflows::review::applications::repository::ApplicationRepository;
use crate::workflows::review::applications::ApplicationService;
use crate::workflows::review::error::{
    ConflictError, RepositoryError, ReviewError, ValidationError,
};

fn entry(field_key: &str, value: &str) -> ResponseEntry {
    ResponseEntry {
        field_key: field_key.to_string(),
        value: value.to_string(),
    }
}

#[test]
fn create_or_get_returns_the_existing_application() {
    let (service, store, _) = build_service();
    let caller = user(APPLICANT);

    let first = service
        .create_or_get(&caller, new_application(APPLICANT, ApplicationType::Resident))
        .expect("created");
    let second = service
        .create_or_get(&caller, new_application(APPLICANT, ApplicationType::Resident))
        .expect("fetched");

    assert_eq!(first.id, second.id);
    assert_eq!(first.status, ApplicationStatus::Draft);
    assert_eq!(store.application_count().unwrap(), 1);
}

#[test]
fn email_taken_by_another_applicant_is_a_conflict() {
    let (service, _, _) = build_service();
    service
        .create_or_get(&user("u-1"), new_application("u-1", ApplicationType::Resident))
        .expect("first applicant");

    let request = NewApplication {
        applicant_email: "U-1@Example.org".to_string(),
        ..new_application("u-2", ApplicationType::Resident)
    };
    match service.create_or_get(&user("u-2"), request) {
        Err(ReviewError::Conflict(ConflictError::DuplicateEmail { email, .. })) => {
            assert_eq!(email, "U-1@Example.org")
        }
        other => panic!("expected duplicate email, got {other:?}"),
    }
}

#[test]
fn only_admins_create_on_behalf_of_others() {
    let (service, _, _) = build_service();

    let denied =
        service.create_or_get(&user(REVIEWER), new_application("u-7", ApplicationType::Mentor));
    assert!(matches!(denied, Err(ReviewError::Authorization(_))));

    let created = service
        .create_or_get(&user(ADMIN), new_application("u-7", ApplicationType::Mentor))
        .expect("admin creates");
    assert_eq!(created.applicant_id, user("u-7"));
}

#[test]
fn forms_without_a_template_cannot_be_filled_or_submitted() {
    let (service, _, _) = build_service();
    let caller = user("u-8");
    let draft = service
        .create_or_get(&caller, new_application("u-8", ApplicationType::Mentor))
        .expect("drafts do not need a form");

    let submitted = service.submit(&caller, &draft.id);
    match submitted {
        Err(ReviewError::NotFound { entity, id }) => {
            assert_eq!(entity, "form template");
            assert_eq!(id, "evt-2026/mentor");
        }
        other => panic!("expected missing template, got {other:?}"),
    }

    let saved = service.upsert_response(
        &caller,
        &draft.id,
        "full_name",
        "Mentor".into(),
        EditIntent::Autosave,
    );
    assert!(matches!(saved, Err(ReviewError::NotFound { .. })));
    let stored = service.get(&caller, &draft.id).expect("draft readable");
    assert_eq!(stored.status, ApplicationStatus::Draft);
}

#[test]
fn strangers_cannot_read_an_application() {
    let (service, _, _) = build_service();
    let draft = complete_draft(&service, APPLICANT, ApplicationType::Resident);

    assert!(service.get(&user(APPLICANT), &draft.id).is_ok());
    assert!(service.get(&user(REVIEWER), &draft.id).is_ok());
    assert!(matches!(
        service.get(&user("u-99"), &draft.id),
        Err(ReviewError::Authorization(_))
    ));
}

#[test]
fn completing_the_form_notifies_once() {
    let (service, _, notifier) = build_service();
    let caller = user(APPLICANT);
    let application = service
        .create_or_get(&caller, new_application(APPLICANT, ApplicationType::Resident))
        .expect("created");

    let partial = service
        .upsert_response(&caller, &application.id, "full_name", "Ada".into(), EditIntent::Autosave)
        .expect("saved");
    assert!(!partial.completeness.is_complete);
    assert_eq!(partial.completeness.missing_field_keys, vec!["motivation"]);

    let done = service
        .upsert_response(&caller, &application.id, "motivation", "Engines".into(), EditIntent::Autosave)
        .expect("saved");
    assert!(done.completeness.was_just_completed);
    assert!(done.application.is_complete);
    assert!(done.application.completed_at.is_some());

    let again = service
        .upsert_response(&caller, &application.id, "motivation", "Looms".into(), EditIntent::Autosave)
        .expect("saved");
    assert!(!again.completeness.was_just_completed);
    assert_eq!(notifier.count(Outcome::FormCompleted), 1);
}

#[test]
fn conditional_requirement_reopens_completeness() {
    let (service, _, _) = build_service();
    let caller = user(APPLICANT);
    let draft = complete_draft(&service, APPLICANT, ApplicationType::Resident);
    assert!(draft.is_complete);

    let update = service
        .upsert_response(&caller, &draft.id, "has_dietary_needs", "Yes".into(), EditIntent::Autosave)
        .expect("saved");
    assert!(!update.completeness.is_complete);
    assert_eq!(update.completeness.missing_field_keys, vec!["dietary_details"]);
    assert!(!update.application.is_complete);
    assert_eq!(update.application.completed_at, None);
}

#[test]
fn submit_reports_missing_fields() {
    let (service, _, notifier) = build_service();
    let caller = user(APPLICANT);
    let application = service
        .create_or_get(&caller, new_application(APPLICANT, ApplicationType::Resident))
        .expect("created");
    service
        .upsert_response(&caller, &application.id, "full_name", "Ada".into(), EditIntent::Autosave)
        .expect("saved");

    match service.submit(&caller, &application.id) {
        Err(ReviewError::Validation(ValidationError::MissingFields { missing })) => {
            assert_eq!(missing, vec!["motivation"])
        }
        other => panic!("expected missing fields, got {other:?}"),
    }
    assert_eq!(notifier.count(Outcome::Submitted), 0);
}

#[test]
fn submit_moves_a_complete_draft_once() {
    let (service, _, notifier) = build_service();
    let application = submitted(&service, APPLICANT, ApplicationType::Resident);

    assert_eq!(application.status, ApplicationStatus::Submitted);
    assert!(application.submitted_at.is_some());
    assert_eq!(notifier.count(Outcome::Submitted), 1);

    match service.submit(&user(APPLICANT), &application.id) {
        Err(ReviewError::Conflict(ConflictError::NotDraft { status })) => {
            assert_eq!(status, ApplicationStatus::Submitted)
        }
        other => panic!("expected not draft, got {other:?}"),
    }
}

#[test]
fn autosave_of_required_field_reverts_submission() {
    let (service, _, _) = build_service();
    let application = submitted(&service, APPLICANT, ApplicationType::Resident);

    let update = service
        .upsert_response(
            &user(APPLICANT),
            &application.id,
            "motivation",
            "Changed my mind".into(),
            EditIntent::Autosave,
        )
        .expect("saved");

    assert_eq!(update.application.status, ApplicationStatus::Draft);
    assert_eq!(update.application.submitted_at, None);
}

#[test]
fn autosave_of_optional_field_keeps_submission() {
    let (service, _, _) = build_service();
    let application = submitted(&service, APPLICANT, ApplicationType::Resident);

    let update = service
        .upsert_response(
            &user(APPLICANT),
            &application.id,
            "portfolio_url",
            "https://example.org".into(),
            EditIntent::Autosave,
        )
        .expect("saved");

    assert_eq!(update.application.status, ApplicationStatus::Submitted);
}

#[test]
fn intentional_staff_edit_keeps_submission() {
    let (service, _, _) = build_service();
    let application = submitted(&service, APPLICANT, ApplicationType::Resident);

    let update = service
        .upsert_response(
            &user(ADMIN),
            &application.id,
            "motivation",
            "Typo fixed".into(),
            EditIntent::Intentional,
        )
        .expect("saved");

    assert_eq!(update.application.status, ApplicationStatus::Submitted);
    assert_eq!(update.response.value, "Typo fixed");
}

#[test]
fn applicant_cannot_skip_reversion() {
    let (service, _, _) = build_service();
    let application = submitted(&service, APPLICANT, ApplicationType::Resident);

    let update = service
        .upsert_response(
            &user(APPLICANT),
            &application.id,
            "motivation",
            String::new(),
            EditIntent::Intentional,
        )
        .expect("saved");

    assert_eq!(update.application.status, ApplicationStatus::Draft);
    assert!(!update.completeness.is_complete);
    assert_eq!(update.application.submitted_at, None);
}

#[test]
fn speaker_logistics_stay_editable_under_review() {
    let (service, _, _) = build_service();
    let application = submitted(&service, "speaker-1", ApplicationType::Speaker);
    service
        .update_status(&user(ADMIN), &application.id, ApplicationStatus::UnderReview)
        .expect("admin opens review");

    let update = service
        .upsert_response(
            &user("speaker-1"),
            &application.id,
            "arrival_time",
            "14:30".into(),
            EditIntent::Autosave,
        )
        .expect("logistics edit allowed");
    assert_eq!(update.application.status, ApplicationStatus::UnderReview);

    let locked = service.upsert_response(
        &user("speaker-1"),
        &application.id,
        "talk_title",
        "New title".into(),
        EditIntent::Autosave,
    );
    assert!(matches!(
        locked,
        Err(ReviewError::Conflict(ConflictError::Locked {
            status: ApplicationStatus::UnderReview
        }))
    ));
}

#[test]
fn submitted_speaker_logistics_edit_does_not_revert() {
    let (service, _, _) = build_service();
    let application = submitted(&service, "speaker-2", ApplicationType::Speaker);

    let update = service
        .upsert_response(
            &user("speaker-2"),
            &application.id,
            "arrival_time",
            "18:00".into(),
            EditIntent::Autosave,
        )
        .expect("saved");

    assert_eq!(update.application.status, ApplicationStatus::Submitted);
}

#[test]
fn decided_applications_are_locked_for_everyone() {
    let (service, _, _) = build_service();
    let application = submitted(&service, APPLICANT, ApplicationType::Resident);
    service
        .update_status(&user(ADMIN), &application.id, ApplicationStatus::Rejected)
        .expect("rejected");

    let result = service.upsert_response(
        &user(ADMIN),
        &application.id,
        "motivation",
        "late edit".into(),
        EditIntent::Intentional,
    );
    assert!(matches!(
        result,
        Err(ReviewError::Conflict(ConflictError::Locked { .. }))
    ));
}

#[test]
fn unknown_fields_are_rejected() {
    let (service, _, _) = build_service();
    let draft = complete_draft(&service, APPLICANT, ApplicationType::Resident);

    match service.upsert_response(
        &user(APPLICANT),
        &draft.id,
        "shoe_size",
        "44".into(),
        EditIntent::Autosave,
    ) {
        Err(ReviewError::Validation(ValidationError::UnknownField(key))) => {
            assert_eq!(key, "shoe_size")
        }
        other => panic!("expected unknown field, got {other:?}"),
    }
}

#[test]
fn bulk_save_last_entry_wins_and_completes() {
    let (service, store, notifier) = build_service();
    let caller = user(APPLICANT);
    let application = service
        .create_or_get(&caller, new_application(APPLICANT, ApplicationType::Resident))
        .expect("created");

    let update = service
        .bulk_upsert_responses(
            &caller,
            &application.id,
            vec![
                entry("full_name", "Ada"),
                entry("motivation", "first"),
                entry("motivation", "second"),
            ],
            EditIntent::Autosave,
        )
        .expect("bulk saved");

    assert_eq!(update.responses.len(), 2);
    assert!(update.completeness.was_just_completed);
    let stored = store
        .response(&application.id, "motivation")
        .unwrap()
        .expect("stored");
    assert_eq!(stored.value, "second");
    assert_eq!(notifier.count(Outcome::FormCompleted), 1);
}

#[test]
fn bulk_save_is_all_or_nothing() {
    let (service, store, _) = build_service();
    let caller = user(APPLICANT);
    let application = service
        .create_or_get(&caller, new_application(APPLICANT, ApplicationType::Resident))
        .expect("created");
    store.fail_write_at(2).unwrap();

    let entries = vec![
        entry("full_name", "Ada"),
        entry("motivation", "Engines"),
        entry("has_dietary_needs", "yes"),
        entry("dietary_details", "vegetarian"),
        entry("portfolio_url", "https://example.org"),
    ];
    let result = service.bulk_upsert_responses(&caller, &application.id, entries, EditIntent::Autosave);

    assert!(matches!(
        result,
        Err(ReviewError::Repository(RepositoryError::Unavailable(_)))
    ));
    assert!(store.responses(&application.id).unwrap().is_empty());
    let stored = store.fetch(&application.id).unwrap().expect("present");
    assert!(!stored.is_complete);
}

#[test]
fn bulk_save_rejects_unknown_field_before_writing() {
    let (service, store, _) = build_service();
    let caller = user(APPLICANT);
    let application = service
        .create_or_get(&caller, new_application(APPLICANT, ApplicationType::Resident))
        .expect("created");

    let result = service.bulk_upsert_responses(
        &caller,
        &application.id,
        vec![entry("full_name", "Ada"), entry("shoe_size", "44")],
        EditIntent::Autosave,
    );

    assert!(matches!(
        result,
        Err(ReviewError::Validation(ValidationError::UnknownField(_)))
    ));
    assert!(store.responses(&application.id).unwrap().is_empty());
    assert!(matches!(
        service.bulk_upsert_responses(&caller, &application.id, Vec::new(), EditIntent::Autosave),
        Err(ReviewError::Validation(ValidationError::EmptyBatch))
    ));
}

#[test]
fn bulk_status_aborts_on_any_invalid_transition() {
    let (service, store, notifier) = build_service();
    let first = submitted(&service, "u-1", ApplicationType::Resident);
    let second = submitted(&service, "u-2", ApplicationType::Resident);
    let draft = complete_draft(&service, "u-3", ApplicationType::Resident);

    let result = service.bulk_update_status(
        &user(ADMIN),
        &[first.id.clone(), draft.id.clone(), second.id.clone()],
        ApplicationStatus::Accepted,
    );
    assert!(matches!(
        result,
        Err(ReviewError::Conflict(ConflictError::InvalidTransition {
            from: ApplicationStatus::Draft,
            to: ApplicationStatus::Accepted
        }))
    ));

    for id in [&first.id, &second.id] {
        let stored = store.fetch(id).unwrap().expect("present");
        assert_eq!(stored.status, ApplicationStatus::Submitted);
    }
    assert_eq!(
        notifier.count(Outcome::StatusChanged(ApplicationStatus::Accepted)),
        0
    );
}

#[test]
fn bulk_status_decides_every_application() {
    let (service, _, notifier) = build_service();
    let first = submitted(&service, "u-1", ApplicationType::Resident);
    let second = submitted(&service, "u-2", ApplicationType::Resident);

    let decided = service
        .bulk_update_status(
            &user(ADMIN),
            &[first.id.clone(), second.id.clone()],
            ApplicationStatus::Rejected,
        )
        .expect("batch decided");

    assert!(decided
        .iter()
        .all(|app| app.status == ApplicationStatus::Rejected));
    assert_eq!(
        notifier.count(Outcome::StatusChanged(ApplicationStatus::Rejected)),
        2
    );
}

#[test]
fn reviewers_cannot_decide() {
    let (service, _, _) = build_service();
    let application = submitted(&service, APPLICANT, ApplicationType::Resident);

    let result =
        service.update_status(&user(REVIEWER), &application.id, ApplicationStatus::Accepted);
    assert!(matches!(result, Err(ReviewError::Authorization(_))));
}

#[test]
fn terminal_statuses_do_not_move() {
    let (service, _, _) = build_service();
    let application = submitted(&service, APPLICANT, ApplicationType::Resident);
    service
        .update_status(&user(ADMIN), &application.id, ApplicationStatus::Cancelled)
        .expect("cancelled");

    let result =
        service.update_status(&user(ADMIN), &application.id, ApplicationStatus::UnderReview);
    assert!(matches!(
        result,
        Err(ReviewError::Conflict(ConflictError::InvalidTransition { .. }))
    ));
}

#[test]
fn acceptance_enriches_the_profile_once() {
    let store = seeded_store();
    let notifier = Arc::new(RecordingNotifier::default());
    let enricher = Arc::new(RecordingEnricher::default());
    let service = ApplicationService::new(store.clone(), notifier.clone(), resolver(), instant_retry())
        .with_enricher(enricher.clone());

    let first = submitted(&service, "u-1", ApplicationType::Resident);
    let second = submitted(&service, "u-2", ApplicationType::Resident);
    store
        .claim_enrichment(&second.applicant_id, &second.id)
        .expect("pre-claimed by an earlier run");

    service
        .bulk_update_status(
            &user(ADMIN),
            &[first.id.clone(), second.id.clone()],
            ApplicationStatus::Accepted,
        )
        .expect("accepted");
    // re-deciding the same status is a no-op
    service
        .update_status(&user(ADMIN), &first.id, ApplicationStatus::Accepted)
        .expect("idempotent");

    assert_eq!(enricher.calls(), vec![first.id.clone()]);
    assert_eq!(
        notifier.count(Outcome::StatusChanged(ApplicationStatus::Accepted)),
        2
    );
}

#[test]
fn notification_failures_do_not_fail_the_operation() {
    let store = seeded_store();
    let service = ApplicationService::new(
        store.clone(),
        Arc::new(FailingNotifier),
        resolver(),
        instant_retry(),
    );

    let application = submitted(&service, APPLICANT, ApplicationType::Resident);
    assert_eq!(application.status, ApplicationStatus::Submitted);

    let accepted = service
        .update_status(&user(ADMIN), &application.id, ApplicationStatus::Accepted)
        .expect("decision stands");
    assert_eq!(accepted.status, ApplicationStatus::Accepted);
}

#[test]
fn missing_application_is_not_found() {
    let (service, _, _) = build_service();
    let missing = crate::workflows::review::applications::domain::ApplicationId::new("app-missing");

    match service.get(&user(ADMIN), &missing) {
        Err(ReviewError::NotFound { entity, id }) => {
            assert_eq!(entity, "application");
            assert_eq!(id, "app-missing");
        }
        other => panic!("expected not found, got {other:?}"),
    }
}
