//! Actions behind the site's own pages and forms.

use serde_json::{Value, json};
use tracing::info;

use super::actions::ActionContext;
use super::{ActionResponse, ApiError, session, validation};
use crate::services::{
    AuthError, ChangePasswordRequest, LoginRequest, MembershipError, RegisterRequest,
    auth_service::INVALID_LOGIN_MESSAGE,
};

type ActionResult = Result<ActionResponse, ApiError>;

/// Form-level failures become a message; everything else propagates.
fn failure(err: AuthError) -> ActionResult {
    if err.is_user_facing() {
        Ok(ActionResponse::failure(err.to_string()))
    } else {
        Err(err.into())
    }
}

fn membership_failure(err: MembershipError) -> ActionResult {
    match err {
        MembershipError::UnknownUser(_) | MembershipError::UnknownRole(_) => {
            Ok(ActionResponse::failure(err.to_string()))
        }
        other => Err(other.into()),
    }
}

pub async fn index(_ctx: ActionContext) -> ActionResult {
    Ok(ActionResponse::ok())
}

pub async fn users(ctx: ActionContext) -> ActionResult {
    let (page, per_page) = validation::page_params(ctx.field("lpage"), ctx.field("lrowsonpage"));

    let listing = match ctx.state.auth.list_users(page, per_page).await {
        Ok(listing) => listing,
        Err(err) => return failure(err),
    };

    let last_page = listing.total.div_ceil(per_page).max(1);
    let mut model = serde_json::to_value(&listing)
        .map_err(|e| ApiError::internal(format!("Failed to serialize users: {e}")))?;
    if let Value::Object(fields) = &mut model {
        fields.insert(
            "prev_page".to_string(),
            json!((page > 1).then(|| page - 1)),
        );
        fields.insert(
            "next_page".to_string(),
            json!((page < last_page).then(|| page + 1)),
        );
    }

    Ok(ActionResponse::ok().with_payload(model))
}

pub async fn login(ctx: ActionContext) -> ActionResult {
    let request = LoginRequest {
        username: ctx.field("username").to_string(),
        password: ctx.raw_field("password"),
        client_ip: ctx.client_ip.clone(),
        language: ctx.identity.language.clone(),
    };

    match ctx.state.auth.login(request).await {
        Ok(identity) => {
            session::sign_in(&ctx.session, &identity).await?;
            Ok(ActionResponse::ok())
        }
        Err(AuthError::InvalidCredentials) => Ok(ActionResponse::failure(INVALID_LOGIN_MESSAGE)),
        Err(err) => Err(err.into()),
    }
}

pub async fn logout(ctx: ActionContext) -> ActionResult {
    if let Some(username) = ctx.identity.member() {
        info!(user = %username, "User logged out");
    }
    session::sign_out(&ctx.session).await?;
    Ok(ActionResponse::ok())
}

pub async fn register(ctx: ActionContext) -> ActionResult {
    let request = RegisterRequest {
        username: ctx.field("username").to_string(),
        password: ctx.raw_field("password"),
        confirm_password: ctx.raw_field("confirm_password"),
        email: ctx.field("email").to_string(),
        name: ctx.field("name").to_string(),
        surname: ctx.field("surname").to_string(),
        client_ip: ctx.client_ip.clone(),
    };

    if let Err(message) = validation::validate_registration(&request) {
        return Ok(ActionResponse::failure(message));
    }

    match ctx.state.auth.register(request).await {
        Ok(user) if user.activated => Ok(ActionResponse::success(
            "Your account was created. You can log in now.",
        )
        .with_payload(json!({ "user": user }))),
        Ok(user) => Ok(ActionResponse::success(
            "Your account was created. An administrator must activate it before you can log in.",
        )
        .with_payload(json!({ "user": user }))),
        Err(err) => failure(err),
    }
}

pub async fn change_password(ctx: ActionContext) -> ActionResult {
    let request = ChangePasswordRequest {
        old_password: ctx.raw_field("old_password"),
        new_password: ctx.raw_field("new_password"),
        confirm_password: ctx.raw_field("confirm_password"),
        client_ip: ctx.client_ip.clone(),
    };

    match ctx.state.auth.change_password(&ctx.identity, request).await {
        Ok(identity) => {
            session::update_identity(&ctx.session, &identity).await?;
            Ok(ActionResponse::success("Your password was changed."))
        }
        Err(err) => failure(err),
    }
}

pub async fn activate_user(ctx: ActionContext) -> ActionResult {
    let username = ctx.field("username");
    match ctx.state.auth.activate_user(username).await {
        Ok(()) => Ok(ActionResponse::success(format!("{username} was activated."))),
        Err(err) => failure(err),
    }
}

/// Answers with the generated password; there is no page to show it on.
pub async fn reset_password(ctx: ActionContext) -> ActionResult {
    let username = ctx.field("username");
    match ctx.state.auth.reset_password(username).await {
        Ok(password) => {
            info!(
                admin = %ctx.identity.username,
                user = %username,
                "Temporary password issued"
            );
            let message = format!("{username} must change this password at the next login.");
            Ok(ActionResponse::success(message).with_payload(json!({
                "username": username,
                "temporary_password": password,
            })))
        }
        Err(err) => failure(err),
    }
}

pub async fn grant_role(ctx: ActionContext) -> ActionResult {
    let (username, role) = (ctx.field("username"), ctx.field("role"));
    match ctx.state.membership.assign_role(username, role).await {
        Ok(true) => Ok(ActionResponse::success(format!(
            "{username} now holds {role}."
        ))),
        Ok(false) => Ok(ActionResponse::failure(format!(
            "{username} already holds {role}."
        ))),
        Err(err) => membership_failure(err),
    }
}

pub async fn revoke_role(ctx: ActionContext) -> ActionResult {
    let (username, role) = (ctx.field("username"), ctx.field("role"));
    match ctx.state.membership.revoke_role(username, role).await {
        Ok(true) => Ok(ActionResponse::success(format!(
            "{role} was revoked from {username}."
        ))),
        Ok(false) => Ok(ActionResponse::failure(format!(
            "{username} does not hold {role}."
        ))),
        Err(err) => membership_failure(err),
    }
}

pub async fn set_allowed_ips(ctx: ActionContext) -> ActionResult {
    let username = ctx.field("username");
    let addresses = validation::split_addresses(ctx.field("ips"));
    let restricted = !addresses.is_empty();

    match ctx.state.auth.set_allowed_ips(username, addresses).await {
        Ok(()) if restricted => Ok(ActionResponse::success(format!(
            "Logins for {username} are now restricted."
        ))),
        Ok(()) => Ok(ActionResponse::success(format!(
            "Logins for {username} are no longer restricted."
        ))),
        Err(err) => failure(err),
    }
}
