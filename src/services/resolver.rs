//! Maps an identity plus (method, url) to the rule it may run.
//!
//! A request that does not exist and one the identity holds no grant for come
//! back as the same [`AccessError::Denied`].

use serde::Serialize;
use thiserror::Error;

use crate::db::{MenuEntry, ResolveQuery, ResolvedRow, Store};
use crate::domain::{Identity, ROLE_ALL, RequestMethod, from_marker, now_timestamp};

/// URL of the site root once normalized.
pub const INDEX_URL: &str = "index";

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Not found")]
    Denied,

    #[error("Database error: {0}")]
    Database(String),
}

impl From<anyhow::Error> for AccessError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// An authorized rule, with stored markers turned into `Option`s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRule {
    pub request_id: i32,
    pub method: String,
    pub url: String,
    pub template: Option<String>,
    pub controller: String,
    pub action: Option<String>,
    pub success_url: Option<String>,
    pub error_url: Option<String>,
    pub display_name: String,
}

impl From<ResolvedRow> for ResolvedRule {
    fn from(row: ResolvedRow) -> Self {
        Self {
            request_id: row.id,
            method: row.method,
            url: row.url,
            template: from_marker(&row.template),
            controller: row.controller,
            action: from_marker(&row.action),
            success_url: from_marker(&row.success_url),
            error_url: from_marker(&row.error_url),
            display_name: row.display_name,
        }
    }
}

/// Lower-case, drop query and fragment, trailing separators and a `.html`
/// suffix, and map the root to [`INDEX_URL`].
#[must_use]
pub fn normalize_url(raw: &str) -> String {
    let mut url = raw.trim().to_lowercase();

    if let Some(pos) = url.find('?') {
        url.truncate(pos);
    }
    if let Some(pos) = url.rfind('#') {
        url.truncate(pos);
    }

    let mut url = url
        .trim_start_matches('/')
        .trim_end_matches(['/', '#', '?'])
        .to_string();

    if let Some(stripped) = url.strip_suffix(".html") {
        url = stripped.to_string();
    }

    if url.is_empty() {
        INDEX_URL.to_string()
    } else {
        url
    }
}

#[derive(Clone)]
pub struct Resolver {
    store: Store,
    base_language: String,
}

impl Resolver {
    #[must_use]
    pub fn new(store: Store, base_language: impl Into<String>) -> Self {
        Self {
            store,
            base_language: base_language.into(),
        }
    }

    fn language<'a>(&'a self, identity: &'a Identity) -> &'a str {
        if identity.language.trim().is_empty() {
            &self.base_language
        } else {
            &identity.language
        }
    }

    /// The rule for `(method, raw_url)` if the identity's roles, or the
    /// universal role, are granted on it.
    pub async fn resolve(
        &self,
        identity: &Identity,
        method: RequestMethod,
        raw_url: &str,
    ) -> Result<ResolvedRule, AccessError> {
        let url = normalize_url(raw_url);
        let as_of = now_timestamp();

        let query = ResolveQuery {
            username: identity.member(),
            universal_role: ROLE_ALL,
            language: self.language(identity),
            base_language: &self.base_language,
            as_of: &as_of,
        };

        self.store
            .resolve_request(method, &url, &query)
            .await?
            .map(ResolvedRule::from)
            .ok_or(AccessError::Denied)
    }

    /// Menu pages the identity can open, in display order.
    pub async fn menu(&self, identity: &Identity) -> Result<Vec<MenuEntry>, AccessError> {
        let as_of = now_timestamp();
        let query = ResolveQuery {
            username: identity.member(),
            universal_role: ROLE_ALL,
            language: self.language(identity),
            base_language: &self.base_language,
            as_of: &as_of,
        };

        Ok(self.store.menu(&query).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_root() {
        assert_eq!(normalize_url("/"), "index");
        assert_eq!(normalize_url(""), "index");
        assert_eq!(normalize_url("/?lang=EN"), "index");
    }

    #[test]
    fn test_normalize_strips_query_fragment_and_case() {
        assert_eq!(normalize_url("/About?x=1"), "about");
        assert_eq!(normalize_url("/Users/Activate/#top"), "users/activate");
        assert_eq!(normalize_url("/login#"), "login");
        assert_eq!(normalize_url("/register?"), "register");
    }

    #[test]
    fn test_normalize_drops_html_suffix() {
        assert_eq!(normalize_url("/about.html"), "about");
        assert_eq!(normalize_url("/index.html"), "index");
    }

    #[test]
    fn test_resolved_rule_reads_markers() {
        let rule = ResolvedRule::from(ResolvedRow {
            id: 1,
            method: "POST".to_string(),
            url: "login".to_string(),
            template: "-".to_string(),
            controller: "Home".to_string(),
            action: "Login".to_string(),
            success_url: "index".to_string(),
            error_url: "-".to_string(),
            display_name: "Login".to_string(),
        });
        assert_eq!(rule.template, None);
        assert_eq!(rule.action.as_deref(), Some("Login"));
        assert_eq!(rule.success_url.as_deref(), Some("index"));
        assert_eq!(rule.error_url, None);
    }
}
