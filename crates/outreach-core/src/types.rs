//! Recipient rows, templates, validation, and personalization
//!
//! A spreadsheet row becomes a [`RecipientRow`], which must carry a
//! well-formed `Email` and a non-blank `First Name` to take part in a batch.
//! Valid rows are personalized into [`PersonalizedRecipient`] entries; the
//! orchestrator turns each of those into exactly one [`SendOutcome`].

use std::collections::HashMap;

use chrono::Local;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Spreadsheet column names recognized by the pipeline.
pub mod columns {
    pub const FIRST_NAME: &str = "First Name";
    pub const EMAIL: &str = "Email";
    pub const COMPANY: &str = "Company";
    pub const ROLE: &str = "Role";
    pub const STATUS: &str = "Status";
}

/// Template placeholders and the column each one draws from.
pub const PLACEHOLDERS: &[(&str, &str)] = &[
    ("{First Name}", columns::FIRST_NAME),
    ("{Email}", columns::EMAIL),
    ("{Company}", columns::COMPANY),
    ("{Role}", columns::ROLE),
];

lazy_static! {
    /// Simple `local@domain.tld` shape check. Deliberately not an RFC
    /// parser: addresses without a dotted domain are rejected.
    static ref EMAIL_PATTERN: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

/// Check that an address looks like `local@domain.tld`.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// Subject/body pair, possibly containing placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub subject: String,
    pub body: String,
}

impl Template {
    pub fn new(subject: &str, body: &str) -> Self {
        Self {
            subject: subject.to_string(),
            body: body.to_string(),
        }
    }
}

/// One spreadsheet row: a column-name-to-value mapping plus the 1-indexed
/// source row number (header row counts as row 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientRow {
    pub row_index: u32,
    pub fields: HashMap<String, String>,
}

impl RecipientRow {
    pub fn new(row_index: u32, fields: HashMap<String, String>) -> Self {
        Self { row_index, fields }
    }

    /// Value of a column, `None` when the cell is absent.
    pub fn field(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// Validate the row, accumulating every violated rule.
    pub fn validate(&self) -> RowValidation {
        let mut errors = Vec::new();

        match self.field(columns::EMAIL) {
            Some(email) if is_valid_email(email) => {}
            _ => errors.push(RowError::InvalidEmail),
        }

        match self.field(columns::FIRST_NAME) {
            Some(name) if !name.trim().is_empty() => {}
            _ => errors.push(RowError::MissingFirstName),
        }

        RowValidation { errors }
    }
}

/// A rule violated by a [`RecipientRow`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Missing first name")]
    MissingFirstName,
}

/// Outcome of validating one row. All violations are reported together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowValidation {
    pub errors: Vec<RowError>,
}

impl RowValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Replace every occurrence of each recognized placeholder with the row's
/// value for that column, or the empty string when the cell is absent.
/// Unrecognized placeholders pass through unchanged. Pure and total.
pub fn personalize(template: &str, row: &RecipientRow) -> String {
    let mut personalized = template.to_string();
    for (placeholder, column) in PLACEHOLDERS {
        let value = row.field(column).unwrap_or("");
        personalized = personalized.replace(placeholder, value);
    }
    personalized
}

/// A valid row with its personalized subject/body and the address the
/// mail sender needs. Immutable once built; consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalizedRecipient {
    pub row: RecipientRow,
    pub email: String,
    pub subject: String,
    pub body: String,
}

/// Filter to valid rows and personalize subject and body independently.
/// Invalid rows are silently excluded; callers decide whether an empty
/// result is an error.
pub fn personalize_rows(template: &Template, rows: &[RecipientRow]) -> Vec<PersonalizedRecipient> {
    rows.iter()
        .filter(|row| row.validate().is_valid())
        .map(|row| PersonalizedRecipient {
            email: row.field(columns::EMAIL).unwrap_or_default().to_string(),
            subject: personalize(&template.subject, row),
            body: personalize(&template.body, row),
            row: row.clone(),
        })
        .collect()
}

/// Result of one send attempt. Collected in input order, one per recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub recipient: PersonalizedRecipient,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn delivered(recipient: PersonalizedRecipient, message_id: String) -> Self {
        Self {
            recipient,
            success: true,
            message_id: Some(message_id),
            error: None,
        }
    }

    pub fn failed(recipient: PersonalizedRecipient, error: impl Into<String>) -> Self {
        Self {
            recipient,
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// Aggregate counts over a batch of outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

impl BatchResult {
    pub fn from_outcomes(outcomes: &[SendOutcome]) -> Self {
        let total = outcomes.len();
        let successful = outcomes.iter().filter(|o| o.success).count();
        Self {
            total,
            successful,
            failed: total - successful,
        }
    }
}

/// One status cell to write back, addressed by 1-indexed source row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowStatus {
    pub row_index: u32,
    pub status: String,
}

/// Human-readable per-row status strings, in input order so row indices
/// line up with the original recipient list.
pub fn status_updates(outcomes: &[SendOutcome]) -> Vec<RowStatus> {
    let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    outcomes
        .iter()
        .map(|outcome| RowStatus {
            row_index: outcome.recipient.row.row_index,
            status: if outcome.success {
                format!("Sent {stamp}")
            } else {
                format!(
                    "Failed: {}",
                    outcome.error.as_deref().unwrap_or("unknown error")
                )
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(pairs: &[(&str, &str)]) -> RecipientRow {
        RecipientRow::new(
            2,
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_valid_row() {
        let r = row(&[("Email", "ada@acme.com"), ("First Name", "Ada")]);
        assert!(r.validate().is_valid());
    }

    #[test]
    fn test_invalid_email_shapes() {
        for email in ["", "no-at-sign", "a@b", "a b@c.com", "a@b c.com"] {
            assert!(!is_valid_email(email), "{email:?} should be invalid");
        }
        assert!(is_valid_email("a@b.c"));
        assert!(is_valid_email("first.last@sub.domain.io"));
    }

    #[test]
    fn test_validation_accumulates_all_errors() {
        let r = row(&[("Email", "not-an-email"), ("First Name", "   ")]);
        let validation = r.validate();
        assert!(!validation.is_valid());
        assert_eq!(
            validation.errors,
            vec![RowError::InvalidEmail, RowError::MissingFirstName]
        );
    }

    #[test]
    fn test_missing_fields_are_errors() {
        let r = row(&[("Company", "Acme")]);
        assert_eq!(r.validate().errors.len(), 2);
    }

    #[test]
    fn test_personalize_replaces_all_placeholders() {
        let r = row(&[
            ("First Name", "Ada"),
            ("Email", "ada@acme.com"),
            ("Company", "Acme"),
            ("Role", "CTO"),
        ]);
        let out = personalize(
            "Hi {First Name} ({Email}), {Role} at {Company}. Bye {First Name}",
            &r,
        );
        assert_eq!(out, "Hi Ada (ada@acme.com), CTO at Acme. Bye Ada");
        for (placeholder, _) in PLACEHOLDERS {
            assert!(!out.contains(placeholder));
        }
    }

    #[test]
    fn test_personalize_scenario() {
        let r = row(&[("First Name", "Ada"), ("Company", "Acme")]);
        assert_eq!(
            personalize("Hi {First Name} from {Company}", &r),
            "Hi Ada from Acme"
        );
    }

    #[test]
    fn test_personalize_absent_field_becomes_empty() {
        let r = row(&[("First Name", "Ada")]);
        assert_eq!(personalize("{Company}!", &r), "!");
    }

    #[test]
    fn test_personalize_leaves_unrecognized_placeholders() {
        let r = row(&[("First Name", "Ada")]);
        assert_eq!(
            personalize("Hi {First Name}, re: {Project}", &r),
            "Hi Ada, re: {Project}"
        );
    }

    #[test]
    fn test_personalize_rows_filters_invalid() {
        let template = Template::new("Hello {First Name}", "From {Company}");
        let rows = vec![
            row(&[("Email", "ada@acme.com"), ("First Name", "Ada"), ("Company", "Acme")]),
            row(&[("Email", "bad"), ("First Name", "Bob")]),
            row(&[("Email", "eve@corp.io"), ("First Name", "Eve")]),
        ];
        let recipients = personalize_rows(&template, &rows);
        assert_eq!(recipients.len(), 2);
        assert_eq!(recipients[0].email, "ada@acme.com");
        assert_eq!(recipients[0].subject, "Hello Ada");
        assert_eq!(recipients[0].body, "From Acme");
        assert_eq!(recipients[1].body, "From ");
    }

    #[test]
    fn test_batch_result_counts() {
        let template = Template::new("s", "b");
        let rows = vec![row(&[("Email", "a@b.co"), ("First Name", "A")])];
        let recipients = personalize_rows(&template, &rows);
        let outcomes = vec![
            SendOutcome::delivered(recipients[0].clone(), "id-1".into()),
            SendOutcome::failed(recipients[0].clone(), "quota exceeded"),
            SendOutcome::delivered(recipients[0].clone(), "id-2".into()),
        ];
        let result = BatchResult::from_outcomes(&outcomes);
        assert_eq!(
            result,
            BatchResult {
                total: 3,
                successful: 2,
                failed: 1
            }
        );
    }

    #[test]
    fn test_status_updates_preserve_order_and_rows() {
        let template = Template::new("s", "b");
        let mut first = row(&[("Email", "a@b.co"), ("First Name", "A")]);
        first.row_index = 2;
        let mut second = first.clone();
        second.row_index = 3;
        let recipients = personalize_rows(&template, &[first, second]);

        let outcomes = vec![
            SendOutcome::delivered(recipients[0].clone(), "id".into()),
            SendOutcome::failed(recipients[1].clone(), "mailbox full"),
        ];
        let updates = status_updates(&outcomes);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].row_index, 2);
        assert!(updates[0].status.starts_with("Sent "));
        assert_eq!(updates[1].row_index, 3);
        assert_eq!(updates[1].status, "Failed: mailbox full");
    }
}
