use std::collections::HashSet;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::applications::domain::{Application, EventId, UserId};
use super::error::ReviewError;

/// Header carrying the authenticated caller id, set by the upstream gateway.
pub const CALLER_HEADER: &str = "x-caller-id";

/// Relationship between a caller and the application they are acting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Reviewer,
    Admin,
    None,
}

/// Operation classes guarded by a single authorization predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    View,
    EditResponses,
    Score,
    ViewConsensus,
    Decide,
}

impl Capability {
    pub const fn label(self) -> &'static str {
        match self {
            Capability::View => "view",
            Capability::EditResponses => "edit responses of",
            Capability::Score => "score",
            Capability::ViewConsensus => "view consensus for",
            Capability::Decide => "decide on",
        }
    }
}

impl Role {
    pub const fn capabilities(self) -> &'static [Capability] {
        match self {
            Role::Owner => &[Capability::View, Capability::EditResponses],
            Role::Reviewer => &[
                Capability::View,
                Capability::EditResponses,
                Capability::Score,
                Capability::ViewConsensus,
            ],
            Role::Admin => &[
                Capability::View,
                Capability::EditResponses,
                Capability::Score,
                Capability::ViewConsensus,
                Capability::Decide,
            ],
            Role::None => &[],
        }
    }

    pub fn allows(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Applicants are held to stricter edit rules than staff acting on their behalf.
    pub const fn is_staff(self) -> bool {
        matches!(self, Role::Reviewer | Role::Admin)
    }
}

/// External identity provider that resolves the caller's relationship to a target.
pub trait AuthorizationResolver: Send + Sync {
    fn role_of(&self, caller: &UserId, application: &Application) -> Role;

    /// Event-scoped role for listings that are not tied to a single application.
    fn event_role(&self, _caller: &UserId, _event: &EventId) -> Role {
        Role::None
    }
}

/// Resolver backed by fixed admin and reviewer rosters; everyone else is
/// recognised only as the owner of their own applications.
#[derive(Debug, Clone, Default)]
pub struct RosterResolver {
    admins: HashSet<UserId>,
    reviewers: HashSet<UserId>,
}

impl RosterResolver {
    pub fn new<A, V>(admins: A, reviewers: V) -> Self
    where
        A: IntoIterator<Item = UserId>,
        V: IntoIterator<Item = UserId>,
    {
        Self {
            admins: admins.into_iter().collect(),
            reviewers: reviewers.into_iter().collect(),
        }
    }

    fn staff_role(&self, caller: &UserId) -> Role {
        if self.admins.contains(caller) {
            Role::Admin
        } else if self.reviewers.contains(caller) {
            Role::Reviewer
        } else {
            Role::None
        }
    }
}

impl AuthorizationResolver for RosterResolver {
    fn role_of(&self, caller: &UserId, application: &Application) -> Role {
        match self.staff_role(caller) {
            Role::Admin => Role::Admin,
            // reviewers never review their own application
            _ if &application.applicant_id == caller => Role::Owner,
            role => role,
        }
    }

    fn event_role(&self, caller: &UserId, _event: &EventId) -> Role {
        self.staff_role(caller)
    }
}

/// Read the caller id from the request headers or answer `401`.
pub fn caller_from_headers(headers: &HeaderMap) -> Result<UserId, Response> {
    headers
        .get(CALLER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(UserId::new)
        .ok_or_else(|| {
            let payload = json!({ "error": format!("missing {CALLER_HEADER} header") });
            (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
        })
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{caller} is not allowed to {} {target}", .capability.label())]
pub struct AuthorizationError {
    pub caller: UserId,
    pub target: String,
    pub role: Role,
    pub capability: Capability,
}

/// Resolve the caller's role and reject the call before any state is touched.
pub fn authorize<Z>(
    resolver: &Z,
    caller: &UserId,
    application: &Application,
    capability: Capability,
) -> Result<Role, ReviewError>
where
    Z: AuthorizationResolver + ?Sized,
{
    let role = resolver.role_of(caller, application);
    check(role, caller, capability, || format!("application {}", application.id))
}

pub fn authorize_event<Z>(
    resolver: &Z,
    caller: &UserId,
    event: &EventId,
    capability: Capability,
) -> Result<Role, ReviewError>
where
    Z: AuthorizationResolver + ?Sized,
{
    let role = resolver.event_role(caller, event);
    check(role, caller, capability, || format!("event {event}"))
}

fn check(
    role: Role,
    caller: &UserId,
    capability: Capability,
    target: impl FnOnce() -> String,
) -> Result<Role, ReviewError> {
    if role.allows(capability) {
        return Ok(role);
    }

    Err(AuthorizationError {
        caller: caller.clone(),
        target: target(),
        role,
        capability,
    }
    .into())
}
