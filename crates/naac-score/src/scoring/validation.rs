use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::catalog::{MetricCatalog, MetricDefinition};
use super::domain::{
    InstitutionId, MetricCode, MetricCodeError, MetricPayload, MetricResponse, ResponseId,
    ResponseSubmission, SessionYear, SessionYearError,
};

/// Write-boundary rejections. Each names the offending field.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("institution_id must not be empty")]
    MissingInstitution,
    #[error(transparent)]
    Session(#[from] SessionYearError),
    #[error(transparent)]
    MetricCode(#[from] MetricCodeError),
    #[error("metric {0} is not part of the catalog")]
    UnknownMetric(String),
    #[error("metric {code} expects a {expected} payload, found {found}")]
    PayloadKind {
        code: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("{field} must be a finite number")]
    NonFinite { field: &'static str },
    #[error("{field} must not be negative")]
    Negative { field: &'static str },
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("checklist item '{item}' is not defined for metric {code}")]
    UnknownChecklistItem { code: String, item: String },
}

impl ValidationError {
    /// Request field the error refers to.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingInstitution => "institution_id",
            ValidationError::Session(_) => "session",
            ValidationError::MetricCode(_) | ValidationError::UnknownMetric(_) => "metric_code",
            ValidationError::PayloadKind { .. } => "payload.type",
            ValidationError::NonFinite { field }
            | ValidationError::Negative { field }
            | ValidationError::Zero { field } => *field,
            ValidationError::UnknownChecklistItem { .. } => "payload.items",
        }
    }
}

/// Checks raw form data against the catalog before anything reaches the store.
#[derive(Debug, Clone)]
pub struct SubmissionGuard {
    catalog: Arc<MetricCatalog>,
}

impl SubmissionGuard {
    pub fn new(catalog: Arc<MetricCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &MetricCatalog {
        &self.catalog
    }

    pub fn definition(&self, code: &MetricCode) -> Result<&MetricDefinition, ValidationError> {
        self.catalog
            .metric(code)
            .ok_or_else(|| ValidationError::UnknownMetric(code.to_string()))
    }

    /// Convert an inbound submission into an unsaved response (id is assigned on insert).
    pub fn response_from_submission(
        &self,
        submission: ResponseSubmission,
        now: DateTime<Utc>,
    ) -> Result<MetricResponse, ValidationError> {
        let institution = submission.institution_id.trim();
        if institution.is_empty() {
            return Err(ValidationError::MissingInstitution);
        }
        let session_year = SessionYear::parse(&submission.session)?;
        let metric_code = MetricCode::parse(&submission.metric_code)?;
        let definition = self.definition(&metric_code)?;
        check_payload(definition, &submission.payload)?;

        Ok(MetricResponse {
            id: ResponseId(0),
            institution_id: InstitutionId(institution.to_string()),
            session_year,
            metric_code,
            payload: submission.payload,
            submitted_at: now,
            updated_at: now,
            version: 1,
        })
    }

    /// Validate a replacement payload for an already stored response.
    pub fn check_update(
        &self,
        code: &MetricCode,
        payload: &MetricPayload,
    ) -> Result<(), ValidationError> {
        let definition = self.definition(code)?;
        check_payload(definition, payload)
    }
}

fn check_payload(
    definition: &MetricDefinition,
    payload: &MetricPayload,
) -> Result<(), ValidationError> {
    if !payload.fits(definition.kind) {
        return Err(ValidationError::PayloadKind {
            code: definition.code.to_string(),
            expected: definition.kind.label(),
            found: payload.kind_label(),
        });
    }

    match payload {
        MetricPayload::OptionCount { .. } => Ok(()),
        MetricPayload::Ratio {
            numerator,
            denominator,
        } => {
            check_amount("payload.numerator", *numerator)?;
            check_divisor("payload.denominator", *denominator)
        }
        MetricPayload::Figures { amount, base } => {
            check_amount("payload.amount", *amount)?;
            check_divisor("payload.base", *base)
        }
        MetricPayload::Checklist { items } => {
            match items
                .keys()
                .find(|item| !definition.checklist_items.iter().any(|known| known == *item))
            {
                Some(item) => Err(ValidationError::UnknownChecklistItem {
                    code: definition.code.to_string(),
                    item: item.clone(),
                }),
                None => Ok(()),
            }
        }
    }
}

fn check_amount(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFinite { field });
    }
    if value < 0.0 {
        return Err(ValidationError::Negative { field });
    }
    Ok(())
}

fn check_divisor(field: &'static str, value: f64) -> Result<(), ValidationError> {
    check_amount(field, value)?;
    if value == 0.0 {
        return Err(ValidationError::Zero { field });
    }
    Ok(())
}
