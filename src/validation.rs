//! Request input validation.
//!
//! Handlers collect per-field problems into a [`Validator`] and convert the
//! result into a 422 response carrying the full field/message map, so a client
//! sees every failed field at once rather than one at a time.

use std::collections::BTreeMap;

use crate::error::AppError;

/// Accumulates field validation errors for a single request.
///
/// The first message recorded for a field wins; later checks on the same
/// field do not overwrite it.
#[derive(Debug, Default)]
pub struct Validator {
    errors: BTreeMap<String, String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no check has failed so far.
    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record an error for a field unless one is already present.
    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    /// Record an error for `field` when `ok` is false.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add_error(field, message);
        }
    }

    /// Consume the validator, returning `Ok(())` when everything passed.
    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.into_error())
        }
    }

    /// Consume the validator into a validation error unconditionally.
    ///
    /// For failures discovered after input validation, like a duplicate
    /// email surfacing from the store, that are still reported as a field
    /// error.
    pub fn into_error(self) -> AppError {
        AppError::Validation(self.errors)
    }
}

/// Structural email check: one `@`, non-empty local part, and a domain with
/// at least one dot that neither starts nor ends a label.
///
/// Deliverability cannot be validated syntactically anyway, so this stays a
/// cheap shape check rather than a full grammar.
pub fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    if local.is_empty() || domain.is_empty() || email.len() > 254 {
        return false;
    }

    if local.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }

    // Every domain label must be non-empty and contain only ASCII
    // alphanumerics or hyphens, with at least two labels overall.
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    labels.iter().all(|label| {
        !label.is_empty()
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    })
}

/// Check that every value in the list appears only once.
pub fn all_unique<T: Eq + std::hash::Hash>(values: &[T]) -> bool {
    let mut seen = std::collections::HashSet::with_capacity(values.len());
    values.iter().all(|v| seen.insert(v))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validator_starts_valid() {
        let v = Validator::new();
        assert!(v.valid());
        assert!(v.finish().is_ok());
    }

    #[test]
    fn test_failed_check_records_error() {
        let mut v = Validator::new();
        v.check(false, "title", "must be provided");
        assert!(!v.valid());

        match v.finish() {
            Err(AppError::Validation(fields)) => {
                assert_eq!(fields.get("title").unwrap(), "must be provided");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_first_error_per_field_wins() {
        let mut v = Validator::new();
        v.add_error("year", "must be provided");
        v.add_error("year", "must be greater than 1888");

        match v.finish() {
            Err(AppError::Validation(fields)) => {
                assert_eq!(fields.get("year").unwrap(), "must be provided");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_passing_check_records_nothing() {
        let mut v = Validator::new();
        v.check(true, "title", "must be provided");
        assert!(v.valid());
    }

    #[test]
    fn test_plausible_emails() {
        assert!(is_plausible_email("a.wong@mail.com"));
        assert!(is_plausible_email("user+tag@sub.example.org"));
        assert!(is_plausible_email("x@y.zz"));
    }

    #[test]
    fn test_implausible_emails() {
        assert!(!is_plausible_email(""));
        assert!(!is_plausible_email("j.chan"));
        assert!(!is_plausible_email("@example.com"));
        assert!(!is_plausible_email("user@"));
        assert!(!is_plausible_email("user@localhost"));
        assert!(!is_plausible_email("user@-bad.com"));
        assert!(!is_plausible_email("user name@example.com"));
    }

    #[test]
    fn test_all_unique() {
        assert!(all_unique(&["drama", "comedy"]));
        assert!(!all_unique(&["drama", "drama"]));
        assert!(all_unique::<&str>(&[]));
    }
}
