//! Applicant review pipeline: application lifecycle, reviewer evaluations and
//! the consensus view that collapses them into a single decision signal.

/// Declares a string-backed identifier with the usual derives and `Display`.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

pub mod access;
pub mod applications;
pub mod error;
pub mod evaluations;
pub mod memory;
pub mod mutation;

pub use access::{AuthorizationResolver, Capability, Role, RosterResolver};
pub use error::{ConflictError, RepositoryError, ReviewError, ValidationError};
pub use memory::InMemoryReviewStore;
pub use mutation::RetryPolicy;
