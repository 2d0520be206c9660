//! Static registry of the actions access rules can name.

use anyhow::bail;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tower_sessions::Session;

use super::{ActionResponse, ApiError, AppState, home};
use crate::db::ActionRef;
use crate::domain::Identity;
use crate::services::{HOME_CONTROLLER, ResolvedRule};

/// What an action gets to work with.
pub struct ActionContext {
    pub state: Arc<AppState>,
    pub session: Session,
    pub identity: Identity,
    pub fields: HashMap<String, String>,
    pub client_ip: String,
    pub rule: ResolvedRule,
}

impl ActionContext {
    /// Trimmed form or query value; empty when absent.
    #[must_use]
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map_or("", |v| v.trim())
    }

    /// Raw value, for passwords.
    #[must_use]
    pub fn raw_field(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }
}

pub type ActionHandler =
    fn(ActionContext) -> BoxFuture<'static, Result<ActionResponse, ApiError>>;

#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<(String, String), ActionHandler>,
}

impl ActionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every action the site's own pages and forms use.
    #[must_use]
    pub fn with_home_actions() -> Self {
        let mut registry = Self::new();
        registry
            .register(HOME_CONTROLLER, "Index", |ctx| home::index(ctx).boxed())
            .register(HOME_CONTROLLER, "Users", |ctx| home::users(ctx).boxed())
            .register(HOME_CONTROLLER, "Login", |ctx| home::login(ctx).boxed())
            .register(HOME_CONTROLLER, "Logout", |ctx| home::logout(ctx).boxed())
            .register(HOME_CONTROLLER, "Register", |ctx| home::register(ctx).boxed())
            .register(HOME_CONTROLLER, "ChangePassword", |ctx| home::change_password(ctx).boxed())
            .register(HOME_CONTROLLER, "ActivateUser", |ctx| home::activate_user(ctx).boxed())
            .register(HOME_CONTROLLER, "ResetPassword", |ctx| home::reset_password(ctx).boxed())
            .register(HOME_CONTROLLER, "GrantRole", |ctx| home::grant_role(ctx).boxed())
            .register(HOME_CONTROLLER, "RevokeRole", |ctx| home::revoke_role(ctx).boxed())
            .register(HOME_CONTROLLER, "SetAllowedIps", |ctx| home::set_allowed_ips(ctx).boxed());
        registry
    }

    pub fn register(
        &mut self,
        controller: &str,
        action: &str,
        handler: ActionHandler,
    ) -> &mut Self {
        self.handlers
            .insert((controller.to_string(), action.to_string()), handler);
        self
    }

    #[must_use]
    pub fn get(&self, controller: &str, action: &str) -> Option<ActionHandler> {
        self.handlers
            .get(&(controller.to_string(), action.to_string()))
            .copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Fails if a stored rule names an action with no handler.
    pub fn validate(&self, referenced: &[ActionRef]) -> anyhow::Result<()> {
        let missing: Vec<String> = referenced
            .iter()
            .filter(|r| self.get(&r.controller, &r.action).is_none())
            .map(|r| format!("{}.{}", r.controller, r.action))
            .collect();

        if !missing.is_empty() {
            bail!("Access rules reference unknown actions: {}", missing.join(", "));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog;

    fn refs(pairs: &[(&str, &str)]) -> Vec<ActionRef> {
        pairs
            .iter()
            .map(|(c, a)| ActionRef {
                controller: (*c).to_string(),
                action: (*a).to_string(),
            })
            .collect()
    }

    #[test]
    fn test_every_catalog_action_is_registered() {
        let registry = ActionRegistry::with_home_actions();
        let referenced: Vec<ActionRef> = catalog()
            .iter()
            .filter_map(|seed| {
                seed.action.map(|action| ActionRef {
                    controller: seed.controller.to_string(),
                    action: action.to_string(),
                })
            })
            .collect();
        assert!(registry.validate(&referenced).is_ok());
    }

    #[test]
    fn test_validate_names_missing_actions() {
        let registry = ActionRegistry::with_home_actions();
        let err = registry
            .validate(&refs(&[("Home", "Login"), ("Shop", "Checkout")]))
            .unwrap_err();
        assert!(err.to_string().contains("Shop.Checkout"));
        assert!(!err.to_string().contains("Home.Login"));
    }

    #[test]
    fn test_lookup_is_exact() {
        let registry = ActionRegistry::with_home_actions();
        assert!(registry.get("Home", "Login").is_some());
        assert!(registry.get("home", "login").is_none());
        assert_eq!(registry.len(), 11);
    }
}
