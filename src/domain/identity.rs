use serde::{Deserialize, Serialize};

/// Who is behind the current request, as carried by the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub logged_in: bool,
    pub username: String,
    pub display_name: String,
    pub language: String,
    pub temporary_password: bool,
}

impl Identity {
    #[must_use]
    pub fn anonymous(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn signed_in(
        username: impl Into<String>,
        display_name: &str,
        language: impl Into<String>,
        temporary_password: bool,
    ) -> Self {
        let display_name = display_name.trim();
        Self {
            logged_in: true,
            username: username.into(),
            display_name: if display_name.is_empty() {
                crate::domain::NONE_MARKER.to_string()
            } else {
                display_name.to_string()
            },
            language: language.into(),
            temporary_password,
        }
    }

    /// Username used for role lookups; `None` for anonymous visitors.
    #[must_use]
    pub fn member(&self) -> Option<&str> {
        (self.logged_in && !self.username.is_empty()).then_some(self.username.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_has_no_member() {
        let identity = Identity::anonymous("EN");
        assert!(!identity.logged_in);
        assert_eq!(identity.member(), None);
    }

    #[test]
    fn test_signed_in_display_name_fallback() {
        let identity = Identity::signed_in("alice", "  ", "EN", false);
        assert_eq!(identity.display_name, "-");
        assert_eq!(identity.member(), Some("alice"));
    }
}
