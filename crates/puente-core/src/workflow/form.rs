//! Citizen form checks: build-time form validation and per-field submission
//! validation.

use std::collections::HashSet;

use puente_types::form::{FieldType, FormField, InputForm};
use puente_types::step::Step;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use super::definition::WorkflowError;

/// Why a submitted field was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldErrorKind {
    /// Required field absent, null or blank.
    Missing,
    /// Value is not a string.
    WrongType,
    /// Select value outside the allowed options.
    NotAnOption(Vec<String>),
    /// Value does not match the field pattern.
    PatternMismatch(String),
    /// Submission contains a field the form does not declare.
    UnknownField,
}

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field_id}: {message}")]
pub struct FieldError {
    pub field_id: String,
    pub kind: FieldErrorKind,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, kind: FieldErrorKind) -> Self {
        let message = match &kind {
            FieldErrorKind::Missing => "field is required".to_string(),
            FieldErrorKind::WrongType => "value must be text".to_string(),
            FieldErrorKind::NotAnOption(options) => {
                format!("value must be one of: {}", options.join(", "))
            }
            FieldErrorKind::PatternMismatch(pattern) => {
                format!("value does not match pattern {pattern}")
            }
            FieldErrorKind::UnknownField => "field is not part of this form".to_string(),
        };
        Self {
            field_id: field.to_string(),
            kind,
            message,
        }
    }
}

fn compile(field: &FormField, pattern: &str) -> Result<Regex, WorkflowError> {
    // Anchor so the whole value must match.
    Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
        WorkflowError::InvalidForm(format!("field '{}' has an invalid pattern: {e}", field.id))
    })
}

/// Validate a form against the step that carries it.
///
/// Field IDs must be unique, select fields need options and other fields must
/// not have any, patterns must compile, every required input of the step must
/// be a required field, and every field must be a declared input.
pub fn check_form(step: &Step, form: &InputForm) -> Result<(), WorkflowError> {
    let mut ids = HashSet::new();
    for field in &form.fields {
        if !ids.insert(field.id.as_str()) {
            return Err(WorkflowError::InvalidForm(format!(
                "step '{}' declares field '{}' twice",
                step.id, field.id
            )));
        }
        match field.field_type {
            FieldType::Select if field.options.is_empty() => {
                return Err(WorkflowError::InvalidForm(format!(
                    "select field '{}' has no options",
                    field.id
                )));
            }
            FieldType::Text | FieldType::Textarea if !field.options.is_empty() => {
                return Err(WorkflowError::InvalidForm(format!(
                    "field '{}' lists options but is not a select",
                    field.id
                )));
            }
            _ => {}
        }
        if let Some(pattern) = &field.pattern {
            compile(field, pattern)?;
        }
        if let Some(cond) = &field.required_when {
            let known = form
                .get(&cond.field)
                .is_some_and(|f| f.id != field.id && f.field_type == FieldType::Select && f.options.contains(&cond.equals));
            if !known {
                return Err(WorkflowError::InvalidForm(format!(
                    "field '{}' depends on '{}' = '{}', which is not an option of another select field",
                    field.id, cond.field, cond.equals
                )));
            }
        }
        let declared = step.required_inputs.contains(&field.id) || step.optional_inputs.contains(&field.id);
        if !declared {
            return Err(WorkflowError::InvalidForm(format!(
                "field '{}' is not an input of step '{}'",
                field.id, step.id
            )));
        }
    }

    for input in &step.required_inputs {
        match form.get(input) {
            Some(field) if field.required => {}
            Some(_) => {
                return Err(WorkflowError::InvalidForm(format!(
                    "required input '{input}' of step '{}' is an optional field",
                    step.id
                )));
            }
            None => {
                return Err(WorkflowError::InvalidForm(format!(
                    "required input '{input}' of step '{}' has no form field",
                    step.id
                )));
            }
        }
    }

    Ok(())
}

/// Validate a submission, reporting every failing field.
///
/// A field with `required_when` counts as required when the submission gives
/// the referenced field exactly the expected value.
///
/// Fields are checked in form order; unknown fields are reported last in
/// submission key order.
pub fn validate_submission(form: &InputForm, values: &Map<String, Value>) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    for field in &form.fields {
        let required = field.required
            || field.required_when.as_ref().is_some_and(|cond| {
                values.get(&cond.field).and_then(Value::as_str) == Some(cond.equals.as_str())
            });
        let value = values.get(&field.id).filter(|v| !v.is_null());
        let Some(value) = value else {
            if required {
                errors.push(FieldError::new(&field.id, FieldErrorKind::Missing));
            }
            continue;
        };
        let Some(text) = value.as_str() else {
            errors.push(FieldError::new(&field.id, FieldErrorKind::WrongType));
            continue;
        };
        if text.trim().is_empty() {
            if required {
                errors.push(FieldError::new(&field.id, FieldErrorKind::Missing));
            }
            continue;
        }
        if field.field_type == FieldType::Select && !field.options.iter().any(|o| o == text) {
            errors.push(FieldError::new(
                &field.id,
                FieldErrorKind::NotAnOption(field.options.clone()),
            ));
            continue;
        }
        if let Some(pattern) = &field.pattern {
            match compile(field, pattern) {
                Ok(re) if re.is_match(text) => {}
                _ => errors.push(FieldError::new(
                    &field.id,
                    FieldErrorKind::PatternMismatch(pattern.clone()),
                )),
            }
        }
    }

    for key in values.keys() {
        if form.get(key).is_none() {
            errors.push(FieldError::new(key, FieldErrorKind::UnknownField));
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
