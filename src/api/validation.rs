use regex::Regex;
use std::sync::OnceLock;

use crate::services::RegisterRequest;

pub const DEFAULT_ROWS_ON_PAGE: u64 = 20;
const MAX_ROWS_ON_PAGE: u64 = 200;

fn username_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._@-]{1,64}$").expect("Invalid regex"))
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Invalid regex")
    })
}

pub fn validate_username(username: &str) -> Result<&str, String> {
    if username_regex().is_match(username) {
        Ok(username)
    } else {
        Err(
            "The user name may only contain letters, digits and the characters . _ @ -"
                .to_string(),
        )
    }
}

pub fn validate_email(email: &str) -> Result<&str, String> {
    if email.len() <= 254 && email_regex().is_match(email) {
        Ok(email)
    } else {
        Err("The e-mail address is not valid.".to_string())
    }
}

/// Format checks on the fields that were filled in; missing fields are
/// reported by the account service with its own messages.
pub fn validate_registration(request: &RegisterRequest) -> Result<(), String> {
    let username = request.username.trim();
    if !username.is_empty() {
        validate_username(username)?;
    }
    let email = request.email.trim();
    if !email.is_empty() {
        validate_email(email)?;
    }
    Ok(())
}

/// `(lpage, lrowsonpage)` with defaults for missing or unparsable values.
#[must_use]
pub fn page_params(page: &str, rows: &str) -> (u64, u64) {
    let page = page.parse::<u64>().ok().filter(|p| *p > 0).unwrap_or(1);
    let rows = rows
        .parse::<u64>()
        .ok()
        .filter(|r| *r > 0)
        .map_or(DEFAULT_ROWS_ON_PAGE, |r| r.min(MAX_ROWS_ON_PAGE));
    (page, rows)
}

/// Comma, semicolon or whitespace separated addresses.
#[must_use]
pub fn split_addresses(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("a.b-c_d@x").is_ok());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("<script>").is_err());
        assert!(validate_username(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("alice@localhost").is_err());
        assert!(validate_email("no at sign").is_err());
    }

    #[test]
    fn test_registration_skips_empty_fields() {
        let request = RegisterRequest::default();
        assert!(validate_registration(&request).is_ok());

        let request = RegisterRequest {
            username: "bad name".to_string(),
            ..RegisterRequest::default()
        };
        assert!(validate_registration(&request).is_err());
    }

    #[test]
    fn test_page_params() {
        assert_eq!(page_params("", ""), (1, DEFAULT_ROWS_ON_PAGE));
        assert_eq!(page_params("3", "10"), (3, 10));
        assert_eq!(page_params("0", "-5"), (1, DEFAULT_ROWS_ON_PAGE));
        assert_eq!(page_params("2", "5000"), (2, MAX_ROWS_ON_PAGE));
    }

    #[test]
    fn test_split_addresses() {
        assert_eq!(
            split_addresses("10.0.0.1, 10.0.0.2;::1\n"),
            vec!["10.0.0.1", "10.0.0.2", "::1"]
        );
        assert!(split_addresses("  ").is_empty());
    }
}
