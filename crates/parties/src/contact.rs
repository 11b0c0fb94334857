//! Contact-field normalization shared by sellers and customers.

use billbook_core::DomainError;

/// Trim and lowercase an email address, rejecting obviously malformed input.
///
/// Stored emails are always in this form so uniqueness checks compare equal
/// strings.
pub fn normalize_email(raw: &str) -> Result<String, DomainError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(DomainError::validation("email", "email is required"));
    }
    let Some((local, domain)) = email.split_once('@') else {
        return Err(DomainError::validation("email", "email must contain '@'"));
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(DomainError::validation("email", "malformed email address"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(DomainError::validation("email", "email must not contain spaces"));
    }
    Ok(email)
}

pub(crate) fn required(field: &str, raw: &str) -> Result<String, DomainError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(DomainError::validation(field, format!("{field} cannot be empty")));
    }
    Ok(value.to_string())
}

/// Optional free-text field: blank means absent.
pub(crate) fn optional(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
