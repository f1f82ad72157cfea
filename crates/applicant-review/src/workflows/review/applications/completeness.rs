//! Form templates and the completeness check that runs after every edit.
//!
//! Conditional questions declare their dependency explicitly
//! (`RequiredWhen` / `RequiredUnless`) instead of being inferred from question
//! wording. The template rejects unknown dependencies and cycles up front so
//! requirement resolution always terminates.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// When a field must be answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requirement {
    Optional,
    Required,
    /// Required only when `field` is answered with `equals`.
    RequiredWhen { field: String, equals: String },
    /// Required unless `field` is answered with `equals`.
    RequiredUnless { field: String, equals: String },
}

impl Requirement {
    fn dependency(&self) -> Option<&str> {
        match self {
            Requirement::RequiredWhen { field, .. } | Requirement::RequiredUnless { field, .. } => {
                Some(field)
            }
            Requirement::Optional | Requirement::Required => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub key: String,
    pub label: String,
    pub requirement: Requirement,
    /// Speaker logistics fields that may change after submission without re-review.
    #[serde(default)]
    pub editable_after_submit: bool,
}

impl FieldDefinition {
    pub fn required(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self::with_requirement(key, label, Requirement::Required)
    }

    pub fn optional(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self::with_requirement(key, label, Requirement::Optional)
    }

    pub fn required_when(
        key: impl Into<String>,
        label: impl Into<String>,
        field: impl Into<String>,
        equals: impl Into<String>,
    ) -> Self {
        Self::with_requirement(
            key,
            label,
            Requirement::RequiredWhen {
                field: field.into(),
                equals: equals.into(),
            },
        )
    }

    pub fn required_unless(
        key: impl Into<String>,
        label: impl Into<String>,
        field: impl Into<String>,
        equals: impl Into<String>,
    ) -> Self {
        Self::with_requirement(
            key,
            label,
            Requirement::RequiredUnless {
                field: field.into(),
                equals: equals.into(),
            },
        )
    }

    pub fn editable_after_submit(mut self) -> Self {
        self.editable_after_submit = true;
        self
    }

    fn with_requirement(
        key: impl Into<String>,
        label: impl Into<String>,
        requirement: Requirement,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            requirement,
            editable_after_submit: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormTemplateError {
    #[error("field {0} is declared more than once")]
    DuplicateField(String),
    #[error("field {field} depends on undeclared field {depends_on}")]
    UnknownDependency { field: String, depends_on: String },
    #[error("field dependencies form a cycle through {0}")]
    CyclicDependency(String),
}

/// Validated, ordered set of questions for one (event, application type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormTemplate {
    fields: Vec<FieldDefinition>,
}

impl FormTemplate {
    pub fn new(fields: Vec<FieldDefinition>) -> Result<Self, FormTemplateError> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.key.as_str()) {
                return Err(FormTemplateError::DuplicateField(field.key.clone()));
            }
        }

        for field in &fields {
            if let Some(depends_on) = field.requirement.dependency() {
                if !seen.contains(depends_on) {
                    return Err(FormTemplateError::UnknownDependency {
                        field: field.key.clone(),
                        depends_on: depends_on.to_string(),
                    });
                }
            }
        }

        let template = Self { fields };
        template.ensure_acyclic()?;
        Ok(template)
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.key == key)
    }

    /// Whether `key` must be answered given the current answers.
    pub fn is_required(&self, key: &str, answers: &BTreeMap<String, String>) -> bool {
        self.field(key)
            .map(|field| self.requirement_holds(field, answers))
            .unwrap_or(false)
    }

    fn requirement_holds(&self, field: &FieldDefinition, answers: &BTreeMap<String, String>) -> bool {
        match &field.requirement {
            Requirement::Optional => false,
            Requirement::Required => true,
            Requirement::RequiredWhen { field, equals } => self.answered_with(field, equals, answers),
            Requirement::RequiredUnless { field, equals } => {
                !self.answered_with(field, equals, answers)
            }
        }
    }

    /// A controlling answer only counts while the controlling field is itself in play.
    fn answered_with(&self, key: &str, expected: &str, answers: &BTreeMap<String, String>) -> bool {
        let Some(controller) = self.field(key) else {
            return false;
        };
        let in_play = match controller.requirement {
            Requirement::Optional | Requirement::Required => true,
            _ => self.requirement_holds(controller, answers),
        };

        in_play
            && answers
                .get(key)
                .map(|value| value.trim().eq_ignore_ascii_case(expected.trim()))
                .unwrap_or(false)
    }

    fn ensure_acyclic(&self) -> Result<(), FormTemplateError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        for field in &self.fields {
            let mut cursor = Some(field.key.as_str());
            let mut path = Vec::new();
            while let Some(key) = cursor {
                match marks.get(key) {
                    Some(Mark::Done) => break,
                    Some(Mark::Visiting) => {
                        return Err(FormTemplateError::CyclicDependency(key.to_string()))
                    }
                    None => {
                        marks.insert(key, Mark::Visiting);
                        path.push(key);
                        cursor = self
                            .field(key)
                            .and_then(|definition| definition.requirement.dependency());
                    }
                }
            }
            for key in path {
                marks.insert(key, Mark::Done);
            }
        }

        Ok(())
    }
}

/// Result of a completeness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletenessReport {
    pub is_complete: bool,
    pub missing_field_keys: Vec<String>,
    /// True only on the incomplete -> complete transition.
    pub was_just_completed: bool,
}

/// Determines whether every currently-required field has a non-blank answer.
pub struct CompletenessChecker<'a> {
    template: &'a FormTemplate,
}

impl<'a> CompletenessChecker<'a> {
    pub fn new(template: &'a FormTemplate) -> Self {
        Self { template }
    }

    pub fn check(
        &self,
        answers: &BTreeMap<String, String>,
        previously_complete: bool,
    ) -> CompletenessReport {
        let missing_field_keys: Vec<String> = self
            .template
            .fields()
            .iter()
            .filter(|field| self.template.requirement_holds(field, answers))
            .filter(|field| {
                answers
                    .get(&field.key)
                    .map(|value| value.trim().is_empty())
                    .unwrap_or(true)
            })
            .map(|field| field.key.clone())
            .collect();

        let is_complete = missing_field_keys.is_empty();
        CompletenessReport {
            is_complete,
            missing_field_keys,
            was_just_completed: is_complete && !previously_complete,
        }
    }
}
