//! The single entry point for site pages and forms.
//!
//! Every GET and POST outside `/static` lands here: session gating first, then
//! resolution against the access rules, then the rule's action, then either a
//! rendered page, a redirect or a JSON answer.

use axum::{
    Form, Json,
    extract::{FromRequest, Request, State},
    http::Method,
    response::{Html, IntoResponse, Redirect, Response},
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_sessions::Session;
use tracing::{debug, warn};

use super::actions::ActionContext;
use super::observability::RuleLabel;
use super::render::PageData;
use super::{ActionResponse, ApiError, AppState, Flash, client_ip, session};
use crate::domain::{Identity, RequestMethod};
use crate::services::{AccessError, INDEX_URL, ResolvedRule, normalize_url};

const LOGIN_URL: &str = "login";
const REGISTER_URL: &str = "register";
const LOGOUT_URL: &str = "logout";
const CHANGE_PASSWORD_URL: &str = "change-password";

/// Turns a stored redirect target into a site path.
#[must_use]
pub fn redirect_path(target: &str) -> String {
    let target = target.trim();
    if target.starts_with('/') || target.contains("://") {
        target.to_string()
    } else if target.is_empty() || target == INDEX_URL {
        "/".to_string()
    } else {
        format!("/{target}")
    }
}

/// Where the session must go instead, if anywhere.
fn gate(identity: &Identity, method: RequestMethod, url: &str) -> Option<Gate> {
    if !identity.logged_in {
        if url == LOGIN_URL || url == REGISTER_URL {
            return None;
        }
        return Some(match method {
            RequestMethod::Get => Gate::Redirect(format!("/{LOGIN_URL}")),
            _ => Gate::FlashAndRedirect(
                Flash::error("You must be logged in."),
                "/".to_string(),
            ),
        });
    }

    if url == LOGIN_URL {
        return Some(Gate::Redirect("/".to_string()));
    }

    if identity.temporary_password
        && method == RequestMethod::Get
        && url != CHANGE_PASSWORD_URL
        && url != LOGOUT_URL
    {
        return Some(Gate::Redirect(format!("/{CHANGE_PASSWORD_URL}")));
    }

    None
}

#[derive(Debug, PartialEq, Eq)]
enum Gate {
    Redirect(String),
    FlashAndRedirect(Flash, String),
}

pub async fn handle(
    State(state): State<Arc<AppState>>,
    session: Session,
    request: Request,
) -> Result<Response, ApiError> {
    let path = request.uri().path().to_string();
    let method = if request.method() == Method::GET {
        RequestMethod::Get
    } else if request.method() == Method::POST {
        RequestMethod::Post
    } else {
        return Err(ApiError::page_not_found(&path));
    };
    let url = normalize_url(&path);
    let peer = client_ip(request.extensions());

    let identity = session::identity(&session, &state.config.general.default_language).await;

    if let Some(username) = identity.member() {
        tracing::Span::current().record("user_id", username);
    }

    match gate(&identity, method, &url) {
        Some(Gate::Redirect(to)) => return Ok(Redirect::to(&to).into_response()),
        Some(Gate::FlashAndRedirect(flash, to)) => {
            session::set_flash(&session, &flash).await?;
            return Ok(Redirect::to(&to).into_response());
        }
        None => {}
    }

    let rule = match state.resolver.resolve(&identity, method, &path).await {
        Ok(rule) => rule,
        Err(AccessError::Denied) => {
            debug!(path = %path, user = ?identity.member(), "No granted rule");
            return Err(ApiError::page_not_found(&path));
        }
        Err(err) => return Err(err.into()),
    };

    let fields = match Form::<HashMap<String, String>>::from_request(request, &state).await {
        Ok(Form(fields)) => fields,
        Err(rejection) => {
            debug!(error = %rejection, "Request carries no form fields");
            HashMap::new()
        }
    };

    let label = RuleLabel::new(&rule.url);
    let result = match run_action(&state, &session, identity, fields, peer, &rule).await {
        Ok(response) => respond(&state, &session, &rule, response).await,
        Err(err) => Err(err),
    };

    let mut response = result.into_response();
    response.extensions_mut().insert(label);
    Ok(response)
}

async fn run_action(
    state: &Arc<AppState>,
    session: &Session,
    identity: Identity,
    fields: HashMap<String, String>,
    client_ip: String,
    rule: &ResolvedRule,
) -> Result<ActionResponse, ApiError> {
    let Some(action) = rule.action.as_deref() else {
        return Ok(ActionResponse::ok());
    };

    let handler = state.actions.get(&rule.controller, action).ok_or_else(|| {
        ApiError::internal(format!(
            "No handler registered for {}.{}",
            rule.controller, action
        ))
    })?;

    handler(ActionContext {
        state: Arc::clone(state),
        session: session.clone(),
        identity,
        fields,
        client_ip,
        rule: rule.clone(),
    })
    .await
}

async fn respond(
    state: &AppState,
    session: &Session,
    rule: &ResolvedRule,
    response: ActionResponse,
) -> Result<Response, ApiError> {
    if let Some(template) = rule.template.as_deref() {
        // The action may have changed who is logged in.
        let identity = session::identity(session, &state.config.general.default_language).await;

        let pending = session::take_flash(session).await;
        let flash = if response.message.is_some() {
            response.flash()
        } else {
            pending
        };

        let menu = match state.resolver.menu(&identity).await {
            Ok(menu) => menu,
            Err(err) => {
                warn!(error = %err, "Menu unavailable");
                Vec::new()
            }
        };

        let data = PageData::new(
            &rule.display_name,
            &state.config.general.app_name,
            &identity,
            flash,
            &response.payload,
            &menu,
        );
        let html = state.renderer.render(template, &data)?;
        return Ok(Html(html).into_response());
    }

    let target = if response.error {
        response.redirect.clone().or_else(|| rule.error_url.clone())
    } else {
        response.redirect.clone().or_else(|| rule.success_url.clone())
    };

    match target {
        Some(target) => {
            session::set_flash(session, &response.flash()).await?;
            Ok(Redirect::to(&redirect_path(&target)).into_response())
        }
        None => Ok(Json(response.to_json()).into_response()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_path() {
        assert_eq!(redirect_path("index"), "/");
        assert_eq!(redirect_path("/"), "/");
        assert_eq!(redirect_path("login"), "/login");
        assert_eq!(redirect_path("users"), "/users");
    }

    #[test]
    fn test_anonymous_gate() {
        let anonymous = Identity::anonymous("EN");
        assert_eq!(gate(&anonymous, RequestMethod::Get, "login"), None);
        assert_eq!(gate(&anonymous, RequestMethod::Post, "register"), None);
        assert_eq!(
            gate(&anonymous, RequestMethod::Get, "index"),
            Some(Gate::Redirect("/login".to_string()))
        );
        assert!(matches!(
            gate(&anonymous, RequestMethod::Post, "users/activate"),
            Some(Gate::FlashAndRedirect(_, to)) if to == "/"
        ));
    }

    #[test]
    fn test_signed_in_gate() {
        let member = Identity::signed_in("bob", "Bob", "EN", false);
        assert_eq!(
            gate(&member, RequestMethod::Get, "login"),
            Some(Gate::Redirect("/".to_string()))
        );
        assert_eq!(gate(&member, RequestMethod::Get, "about"), None);
    }

    #[test]
    fn test_temporary_password_gate() {
        let member = Identity::signed_in("bob", "Bob", "EN", true);
        assert_eq!(
            gate(&member, RequestMethod::Get, "index"),
            Some(Gate::Redirect("/change-password".to_string()))
        );
        assert_eq!(gate(&member, RequestMethod::Get, "change-password"), None);
        assert_eq!(gate(&member, RequestMethod::Get, "logout"), None);
        assert_eq!(gate(&member, RequestMethod::Post, "change-password"), None);
    }
}
