//! Core operations.
//!
//! Every operation takes the repository and an explicit caller [`Session`], loads
//! the caller's affiliations, runs the view gate and the business rules, then
//! delegates the write to the repository. Handlers stay thin.
//!
//! [`Session`]: crate::models::Session

pub mod identity;
pub mod missions;
pub mod organizations;
pub mod requests;
pub mod teams;

use crate::errors::AppError;

/// Trim a required text field, rejecting blanks.
pub(crate) fn required(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Trim an optional text field, mapping blanks to `None`.
pub(crate) fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_trims_and_rejects_blank() {
        assert_eq!(required("name", "  Team A ").unwrap(), "Team A");
        assert!(matches!(
            required("name", "   "),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_optional_drops_blank() {
        assert_eq!(optional(Some(" 0812 ")), Some("0812".to_string()));
        assert_eq!(optional(Some("  ")), None);
        assert_eq!(optional(None), None);
    }
}
