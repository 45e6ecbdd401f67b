//! CareShare Field Validation
//!
//! Pure-Rust validators shared by the integrity zomes (entry validation)
//! and the coordinator zomes (form validation before anything is written).
//! Nothing here touches Holochain types, so every rule runs under a plain
//! `cargo test`.

use serde::{Deserialize, Serialize};

/// Upper bound for names, titles and single list items
pub const MAX_SHORT_TEXT: usize = 200;
/// Upper bound for free-text descriptions and summaries
pub const MAX_LONG_TEXT: usize = 4000;
/// Upper bound for allergy / medication / condition lists
pub const MAX_LIST_ITEMS: usize = 100;
/// Upper bound for a single attachment reference (blob store URI)
pub const MAX_ATTACHMENT_REF: usize = 2048;
pub const MIN_PHONE_LEN: usize = 10;
pub const MAX_PHONE_LEN: usize = 20;

/// Validation error with field context, surfaced inline per form field
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub code: ValidationErrorCode,
}

/// Specific validation error codes for programmatic handling
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ValidationErrorCode {
    Required,
    InvalidFormat,
    OutOfRange,
    TooLong,
    TooShort,
    InvalidCharacters,
    DuplicateValue,
    UnknownValue,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Returned by [`ValidationResult::into_result`] when at least one field failed
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Validation failed: {}", summarize(.errors))]
pub struct ValidationFailure {
    pub errors: Vec<ValidationError>,
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validation result that accumulates every failing field
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add_error(&mut self, field: &str, message: &str, code: ValidationErrorCode) {
        self.errors.push(ValidationError {
            field: field.to_string(),
            message: message.to_string(),
            code,
        });
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
    }

    /// Errors attached to one field, in the order they were found
    pub fn field_errors<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ValidationError> {
        self.errors.iter().filter(move |e| e.field == field)
    }

    pub fn has_code(&self, field: &str, code: ValidationErrorCode) -> bool {
        self.field_errors(field).any(|e| e.code == code)
    }

    /// Single-line summary for integrity callbacks
    pub fn summary(&self) -> String {
        summarize(&self.errors)
    }

    pub fn into_result(self) -> Result<(), ValidationFailure> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ValidationFailure { errors: self.errors })
        }
    }
}

/// Required single-line text: non-blank and at most [`MAX_SHORT_TEXT`] chars
pub fn validate_required(value: &str, field: &str, label: &str) -> ValidationResult {
    let mut result = ValidationResult::new();
    let trimmed = value.trim();

    if trimmed.is_empty() {
        result.add_error(field, &format!("{} is required", label), ValidationErrorCode::Required);
        return result;
    }
    if trimmed.chars().count() > MAX_SHORT_TEXT {
        result.add_error(
            field,
            &format!("{} must be at most {} characters", label, MAX_SHORT_TEXT),
            ValidationErrorCode::TooLong,
        );
    }
    result
}

/// Optional text: when present it may be blank but not longer than `max`
pub fn validate_optional_text(value: Option<&str>, field: &str, max: usize) -> ValidationResult {
    let mut result = ValidationResult::new();
    if let Some(text) = value {
        if text.chars().count() > max {
            result.add_error(
                field,
                &format!("Must be at most {} characters", max),
                ValidationErrorCode::TooLong,
            );
        }
    }
    result
}

/// Validate a contact phone number
///
/// At least [`MIN_PHONE_LEN`] characters, digits plus the usual separators.
pub fn validate_phone(phone: &str, field: &str) -> ValidationResult {
    let mut result = ValidationResult::new();
    let trimmed = phone.trim();

    if trimmed.len() < MIN_PHONE_LEN {
        result.add_error(field, "Valid phone number required", ValidationErrorCode::TooShort);
        return result;
    }
    if trimmed.len() > MAX_PHONE_LEN {
        result.add_error(
            field,
            &format!("Phone number must be at most {} characters", MAX_PHONE_LEN),
            ValidationErrorCode::TooLong,
        );
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')' | '.'))
    {
        result.add_error(
            field,
            "Phone number may only contain digits, spaces and + - ( ) .",
            ValidationErrorCode::InvalidCharacters,
        );
    }
    result
}

/// Validate a simple email address (`local@domain.tld`)
pub fn validate_email(email: &str, field: &str) -> ValidationResult {
    let mut result = ValidationResult::new();
    let trimmed = email.trim();

    let valid = match trimmed.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !trimmed.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        result.add_error(field, "Invalid email address", ValidationErrorCode::InvalidFormat);
    }
    result
}

/// Validate a list of short free-text items (allergies, medications, conditions)
pub fn validate_text_list(items: &[String], field: &str) -> ValidationResult {
    let mut result = ValidationResult::new();

    if items.len() > MAX_LIST_ITEMS {
        result.add_error(
            field,
            &format!("At most {} entries allowed", MAX_LIST_ITEMS),
            ValidationErrorCode::OutOfRange,
        );
    }

    let mut seen: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let trimmed = item.trim();
        if trimmed.is_empty() {
            result.add_error(field, "Entries cannot be blank", ValidationErrorCode::Required);
            continue;
        }
        if trimmed.chars().count() > MAX_SHORT_TEXT {
            result.add_error(
                field,
                &format!("Entries must be at most {} characters", MAX_SHORT_TEXT),
                ValidationErrorCode::TooLong,
            );
        }
        let key = trimmed.to_lowercase();
        if seen.contains(&key) {
            result.add_error(
                field,
                &format!("Duplicate entry: {}", trimmed),
                ValidationErrorCode::DuplicateValue,
            );
        } else {
            seen.push(key);
        }
    }
    result
}

/// Validate a 24-hour `HH:MM` time of day
pub fn validate_time_of_day(value: &str, field: &str) -> ValidationResult {
    let mut result = ValidationResult::new();

    let parsed = value.split_once(':').and_then(|(h, m)| {
        if h.len() != 2 || m.len() != 2 {
            return None;
        }
        let hour: u8 = h.parse().ok()?;
        let minute: u8 = m.parse().ok()?;
        Some((hour, minute))
    });

    match parsed {
        None => result.add_error(field, "Time must use HH:MM format", ValidationErrorCode::InvalidFormat),
        Some((hour, minute)) if hour > 23 || minute > 59 => {
            result.add_error(field, "Time must be between 00:00 and 23:59", ValidationErrorCode::OutOfRange)
        }
        Some(_) => {}
    }
    result
}

/// Validate attachment references returned by the blob store
pub fn validate_attachments(refs: &[String], field: &str, min: usize) -> ValidationResult {
    let mut result = ValidationResult::new();

    if refs.len() < min {
        let message = if min == 1 {
            "At least one file is required".to_string()
        } else {
            format!("At least {} files are required", min)
        };
        result.add_error(field, &message, ValidationErrorCode::Required);
    }
    for reference in refs {
        if reference.trim().is_empty() {
            result.add_error(field, "Attachment reference cannot be blank", ValidationErrorCode::Required);
        } else if reference.len() > MAX_ATTACHMENT_REF {
            result.add_error(field, "Attachment reference is too long", ValidationErrorCode::TooLong);
        } else if reference.contains(char::is_whitespace) {
            result.add_error(
                field,
                "Attachment reference cannot contain whitespace",
                ValidationErrorCode::InvalidCharacters,
            );
        }
    }
    result
}

/// Validate that `value` is one of `allowed`
pub fn validate_choice(value: &str, allowed: &[&str], field: &str) -> ValidationResult {
    let mut result = ValidationResult::new();
    if !allowed.contains(&value) {
        result.add_error(
            field,
            &format!("Must be one of: {}", allowed.join(", ")),
            ValidationErrorCode::UnknownValue,
        );
    }
    result
}

/// Split a comma separated form field into trimmed, non-empty items
///
/// Repeats are dropped ignoring case; the first spelling is kept.
pub fn parse_comma_list(input: Option<&str>) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    for item in input.unwrap_or_default().split(',').map(str::trim) {
        let key = item.to_lowercase();
        if item.is_empty() || seen.contains(&key) {
            continue;
        }
        seen.push(key);
        items.push(item.to_string());
    }
    items
}

/// Display name shown for an account
///
/// Falls back to the local part of the email, then to `"User"`.
pub fn default_display_name(display_name: Option<&str>, email: Option<&str>) -> String {
    if let Some(name) = display_name.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    email
        .and_then(|e| e.split('@').next())
        .map(str::trim)
        .filter(|local| !local.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "User".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_required_text() {
        assert!(validate_required("St. Mary's", "hospital_name", "Hospital name").is_valid());

        let result = validate_required("   ", "hospital_name", "Hospital name");
        assert!(result.has_code("hospital_name", ValidationErrorCode::Required));
        assert_eq!(result.errors[0].message, "Hospital name is required");

        let result = validate_required(&"x".repeat(MAX_SHORT_TEXT + 1), "doctor_name", "Doctor name");
        assert!(result.has_code("doctor_name", ValidationErrorCode::TooLong));
    }

    #[test]
    fn test_phone_valid() {
        assert!(validate_phone("+1 (555) 010-1234", "phone").is_valid());
        assert!(validate_phone("5550101234", "phone").is_valid());
    }

    #[test]
    fn test_phone_invalid() {
        let result = validate_phone("555-0101", "phone");
        assert!(result.has_code("phone", ValidationErrorCode::TooShort));
        assert_eq!(result.errors[0].message, "Valid phone number required");

        let result = validate_phone("555-010-CALL-ME", "phone");
        assert!(result.has_code("phone", ValidationErrorCode::InvalidCharacters));

        let result = validate_phone(&"1".repeat(MAX_PHONE_LEN + 1), "phone");
        assert!(result.has_code("phone", ValidationErrorCode::TooLong));
    }

    #[test]
    fn test_email() {
        assert!(validate_email("jane@example.com", "email").is_valid());
        assert!(!validate_email("jane.example.com", "email").is_valid());
        assert!(!validate_email("@example.com", "email").is_valid());
        assert!(!validate_email("jane@localhost", "email").is_valid());
        assert!(!validate_email("jane@@example.com", "email").is_valid());
        assert!(!validate_email("ja ne@example.com", "email").is_valid());
    }

    #[test]
    fn test_text_list_duplicates_and_blanks() {
        let items = vec!["Penicillin".to_string(), "penicillin".to_string(), " ".to_string()];
        let result = validate_text_list(&items, "allergies");
        assert!(result.has_code("allergies", ValidationErrorCode::DuplicateValue));
        assert!(result.has_code("allergies", ValidationErrorCode::Required));
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_text_list_too_many() {
        let items: Vec<String> = (0..=MAX_LIST_ITEMS).map(|i| format!("med-{}", i)).collect();
        let result = validate_text_list(&items, "medications");
        assert!(result.has_code("medications", ValidationErrorCode::OutOfRange));
    }

    #[test]
    fn test_time_of_day() {
        assert!(validate_time_of_day("00:00", "collection_time").is_valid());
        assert!(validate_time_of_day("23:59", "collection_time").is_valid());

        let result = validate_time_of_day("24:00", "collection_time");
        assert!(result.has_code("collection_time", ValidationErrorCode::OutOfRange));

        let result = validate_time_of_day("9:30", "collection_time");
        assert!(result.has_code("collection_time", ValidationErrorCode::InvalidFormat));

        let result = validate_time_of_day("noon", "collection_time");
        assert!(result.has_code("collection_time", ValidationErrorCode::InvalidFormat));
    }

    #[test]
    fn test_attachments() {
        let refs = vec!["blob://reports/cbc-2024.pdf".to_string()];
        assert!(validate_attachments(&refs, "attachments", 1).is_valid());

        let result = validate_attachments(&[], "attachments", 1);
        assert_eq!(result.errors[0].message, "At least one file is required");

        assert!(validate_attachments(&[], "attachments", 0).is_valid());

        let refs = vec!["blob://a b.pdf".to_string()];
        let result = validate_attachments(&refs, "attachments", 1);
        assert!(result.has_code("attachments", ValidationErrorCode::InvalidCharacters));
    }

    #[test]
    fn test_choice() {
        assert!(validate_choice("1h", &["15m", "1h", "24h"], "expires_in").is_valid());
        let result = validate_choice("2h", &["15m", "1h", "24h"], "expires_in");
        assert!(result.has_code("expires_in", ValidationErrorCode::UnknownValue));
        assert_eq!(result.errors[0].message, "Must be one of: 15m, 1h, 24h");
    }

    #[test]
    fn test_parse_comma_list() {
        assert_eq!(
            parse_comma_list(Some(" Penicillin, Peanuts ,,Latex ")),
            vec!["Penicillin", "Peanuts", "Latex"]
        );
        assert!(parse_comma_list(Some(" , ")).is_empty());
        assert!(parse_comma_list(None).is_empty());
    }

    #[test]
    fn test_parse_comma_list_drops_case_variant_repeats() {
        let items = parse_comma_list(Some("Penicillin, penicillin, Latex, PENICILLIN"));
        assert_eq!(items, vec!["Penicillin", "Latex"]);
        assert!(validate_text_list(&items, "allergies").is_valid());
    }

    #[test]
    fn test_default_display_name() {
        assert_eq!(default_display_name(Some("Jane Doe"), Some("jd@example.com")), "Jane Doe");
        assert_eq!(default_display_name(Some("  "), Some("jd@example.com")), "jd");
        assert_eq!(default_display_name(None, None), "User");
        assert_eq!(default_display_name(None, Some("@example.com")), "User");
    }

    #[test]
    fn test_failure_summary() {
        let mut result = ValidationResult::new();
        result.add_error("scopes", "Select at least one data type to share", ValidationErrorCode::Required);
        result.add_error("expires_in", "Must be one of: 15m, 1h, 24h", ValidationErrorCode::UnknownValue);

        let err = result.into_result().unwrap_err();
        assert_eq!(err.errors.len(), 2);
        assert_eq!(
            err.to_string(),
            "Validation failed: scopes: Select at least one data type to share; expires_in: Must be one of: 15m, 1h, 24h"
        );
    }

    #[test]
    fn test_merge() {
        let mut a = validate_required("", "name", "Name");
        a.merge(validate_phone("123", "phone"));
        assert_eq!(a.errors.len(), 2);
        assert_eq!(a.field_errors("phone").count(), 1);
    }

    proptest! {
        #[test]
        fn prop_parse_comma_list_items_are_trimmed_and_non_empty(input in ".{0,200}") {
            for item in parse_comma_list(Some(&input)) {
                prop_assert!(!item.is_empty());
                prop_assert_eq!(item.trim(), item.as_str());
                prop_assert!(!item.contains(','));
            }
        }

        #[test]
        fn prop_parsed_lists_pass_list_validation(input in "[A-Za-z ,]{0,200}") {
            prop_assert!(validate_text_list(&parse_comma_list(Some(&input)), "allergies").is_valid());
        }

        #[test]
        fn prop_valid_times_accepted(hour in 0u8..24, minute in 0u8..60) {
            let value = format!("{:02}:{:02}", hour, minute);
            prop_assert!(validate_time_of_day(&value, "t").is_valid());
        }

        #[test]
        fn prop_out_of_range_hours_rejected(hour in 24u8..100, minute in 0u8..60) {
            let value = format!("{:02}:{:02}", hour, minute);
            prop_assert!(!validate_time_of_day(&value, "t").is_valid());
        }

        #[test]
        fn prop_short_phones_rejected(digits in "[0-9]{0,9}") {
            prop_assert!(validate_phone(&digits, "phone").has_code("phone", ValidationErrorCode::TooShort));
        }
    }
}
