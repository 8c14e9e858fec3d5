// =============================================================================
// Input validation — §6
// =============================================================================

use once_cell::sync::Lazy;
use regex::Regex;

static TICKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{1,5}(\.[A-Z])?$").unwrap());
static SEARCH_QUERY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9 .,_-]*$").unwrap());
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap());

/// Normalize (trim + upper) and validate a ticker against `^[A-Z]{1,5}(\.[A-Z])?$`.
pub fn validate_ticker(raw: &str) -> Result<String, String> {
    let ticker = raw.trim().to_uppercase();
    if TICKER_RE.is_match(&ticker) {
        Ok(ticker)
    } else {
        Err(format!("invalid ticker: {raw}"))
    }
}

pub fn validate_email(raw: &str) -> Result<String, String> {
    if raw.contains('\'') || raw.contains(';') || raw.contains("--") {
        return Err("email contains disallowed sequence".into());
    }
    let email = raw.trim().to_lowercase();
    if EMAIL_RE.is_match(&email) {
        Ok(email)
    } else {
        Err(format!("invalid email: {raw}"))
    }
}

pub fn validate_password(raw: &str) -> Result<(), String> {
    if raw.len() < 8 || raw.len() > 128 {
        return Err("password must be between 8 and 128 characters".into());
    }
    let has_upper = raw.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = raw.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = raw.chars().any(|c| c.is_ascii_digit());
    if !(has_upper && has_lower && has_digit) {
        return Err("password must contain upper, lower, and digit".into());
    }
    Ok(())
}

pub fn validate_search_query(raw: &str) -> Result<String, String> {
    let query = raw.trim();
    if query.is_empty() {
        return Err("search query must not be blank".into());
    }
    if query.len() > 100 {
        return Err("search query too long".into());
    }
    if !SEARCH_QUERY_RE.is_match(query) {
        return Err("search query contains disallowed characters".into());
    }
    Ok(query.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_accepts_plain_and_class_suffix() {
        assert_eq!(validate_ticker(" aapl ").unwrap(), "AAPL");
        assert_eq!(validate_ticker("brk.a").unwrap(), "BRK.A");
    }

    #[test]
    fn ticker_rejects_too_long() {
        assert!(validate_ticker("TOOLONG").is_err());
    }

    #[test]
    fn email_rejects_sql_injection_sequence() {
        assert!(validate_email("a';drop@example.com").is_err());
    }

    #[test]
    fn password_requires_mixed_case_and_digit() {
        assert!(validate_password("alllowercase1").is_err());
        assert!(validate_password("Alllowercase").is_err());
        assert!(validate_password("Abcdefg1").is_ok());
    }

    #[test]
    fn search_query_rejects_disallowed_chars() {
        assert!(validate_search_query("<script>").is_err());
        assert!(validate_search_query("apple inc.").is_ok());
    }
}
