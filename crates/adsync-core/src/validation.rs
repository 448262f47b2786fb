//! Input checks for campaign writes.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::AppError;

static CURRENCY_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{3}$").expect("currency regex is valid"));

/// Budget in cents must be zero or positive.
pub fn validate_budget_cents(value: Option<i64>, field: &str) -> Result<Option<i64>, AppError> {
    match value {
        Some(cents) if cents < 0 => Err(AppError::Validation(format!(
            "{} must be a positive integer",
            field
        ))),
        other => Ok(other),
    }
}

/// Currency must be a 3-letter uppercase code once trimmed. Returns the trimmed code.
pub fn validate_currency_code(value: Option<&str>, field: &str) -> Result<Option<String>, AppError> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let code = raw.trim();
    if code.is_empty() {
        return Err(AppError::Validation(format!("{} must not be empty", field)));
    }
    if !CURRENCY_CODE.is_match(code) {
        return Err(AppError::Validation(format!(
            "{} must be a valid 3-letter uppercase code (e.g. USD)",
            field
        )));
    }
    Ok(Some(code.to_string()))
}

/// Title must be present and non-blank. Returns the trimmed title.
pub fn validate_title(value: Option<&str>, field: &str) -> Result<String, AppError> {
    value
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation(format!("{} must not be empty", field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget() {
        assert_eq!(validate_budget_cents(None, "b").unwrap(), None);
        assert_eq!(validate_budget_cents(Some(0), "b").unwrap(), Some(0));
        let err = validate_budget_cents(Some(-10), "total_budget_cents").unwrap_err();
        assert!(err.to_string().contains("positive integer"));
    }

    #[test]
    fn test_currency() {
        assert_eq!(
            validate_currency_code(Some(" USD "), "c").unwrap().as_deref(),
            Some("USD")
        );
        assert_eq!(validate_currency_code(None, "c").unwrap(), None);
        for bad in ["US", "usd", "USDX", "U5D", "  "] {
            assert!(validate_currency_code(Some(bad), "c").is_err(), "{bad}");
        }
        let err = validate_currency_code(Some("US"), "total_budget_currency").unwrap_err();
        assert!(err.to_string().contains("valid 3-letter uppercase code"));
    }

    #[test]
    fn test_title() {
        assert_eq!(validate_title(Some("  Launch "), "title").unwrap(), "Launch");
        assert!(validate_title(Some(" "), "title").is_err());
        assert!(validate_title(None, "title").is_err());
    }
}
