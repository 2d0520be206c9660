//! The fixed set of pages and form targets the site ships with.
//!
//! Seeding is insert-if-absent: rules edited in the database after the first
//! run are left alone, and re-running never duplicates anything.

use anyhow::Result;

use crate::db::{RequestSeed, SeedReport, Store};
use crate::domain::RequestMethod::{Get, Post};
use crate::domain::{ROLE_ADMINISTRATOR, ROLE_ALL, ROLE_MEMBER};

pub const HOME_CONTROLLER: &str = "Home";

/// Roles created before any grant is applied.
pub const SEEDED_ROLES: [&str; 3] = [ROLE_ADMINISTRATOR, ROLE_MEMBER, ROLE_ALL];

/// Role given to every request still lacking a grant after explicit seeding.
pub const CATCH_ALL_ROLE: &str = ROLE_MEMBER;

const fn page(
    url: &'static str,
    template: &'static str,
    action: Option<&'static str>,
    names: &'static [(&'static str, &'static str)],
    roles: &'static [&'static str],
    sort_order: i32,
    in_menu: bool,
) -> RequestSeed {
    RequestSeed {
        method: Get,
        url,
        parent: None,
        template: Some(template),
        controller: HOME_CONTROLLER,
        action,
        success_url: None,
        error_url: None,
        names,
        roles,
        sort_order,
        in_menu,
    }
}

const fn form(
    url: &'static str,
    action: &'static str,
    success_url: Option<&'static str>,
    error_url: Option<&'static str>,
    names: &'static [(&'static str, &'static str)],
    roles: &'static [&'static str],
) -> RequestSeed {
    RequestSeed {
        method: Post,
        url,
        parent: None,
        template: None,
        controller: HOME_CONTROLLER,
        action: Some(action),
        success_url,
        error_url,
        names,
        roles,
        sort_order: 0,
        in_menu: false,
    }
}

/// Administrative form posted from the user list; inherits the list's grants.
const fn admin_form(
    url: &'static str,
    action: &'static str,
    redirect: Option<&'static str>,
    names: &'static [(&'static str, &'static str)],
) -> RequestSeed {
    RequestSeed {
        parent: Some((Get, "users")),
        ..form(url, action, redirect, redirect, names, &[])
    }
}

#[must_use]
pub fn catalog() -> Vec<RequestSeed> {
    vec![
        page(
            "index",
            "home/index.html",
            Some("Index"),
            &[("EN", "Home")],
            &[ROLE_MEMBER],
            10,
            true,
        ),
        page(
            "users",
            "home/users.html",
            Some("Users"),
            &[("EN", "Users")],
            &[ROLE_ADMINISTRATOR],
            20,
            true,
        ),
        page(
            "about",
            "home/about.html",
            None,
            &[("EN", "About")],
            &[ROLE_MEMBER],
            30,
            true,
        ),
        page(
            "login",
            "home/login.html",
            None,
            &[("EN", "Login")],
            &[ROLE_ALL],
            40,
            false,
        ),
        page(
            "register",
            "home/register.html",
            None,
            &[("EN", "Register")],
            &[ROLE_ALL],
            50,
            false,
        ),
        page(
            "change-password",
            "home/change-password.html",
            None,
            &[("EN", "Change password")],
            &[ROLE_MEMBER],
            60,
            true,
        ),
        RequestSeed {
            method: Get,
            url: "logout",
            parent: None,
            template: None,
            controller: HOME_CONTROLLER,
            action: Some("Logout"),
            success_url: Some("/"),
            error_url: None,
            names: &[("EN", "Logout")],
            roles: &[],
            sort_order: 70,
            in_menu: true,
        },
        form(
            "login",
            "Login",
            Some("index"),
            Some("login"),
            &[("EN", "Login")],
            &[ROLE_ALL],
        ),
        form(
            "logout",
            "Logout",
            Some("login"),
            Some("login"),
            &[("EN", "Logout")],
            &[ROLE_ALL],
        ),
        form(
            "register",
            "Register",
            Some("login"),
            Some("register"),
            &[("EN", "Register")],
            &[ROLE_ALL],
        ),
        form(
            "change-password",
            "ChangePassword",
            Some("change-password"),
            Some("change-password"),
            &[("EN", "Change password")],
            &[],
        ),
        admin_form(
            "users/activate",
            "ActivateUser",
            Some("users"),
            &[("EN", "Activate user")],
        ),
        admin_form(
            "users/reset-password",
            "ResetPassword",
            None,
            &[("EN", "Reset password")],
        ),
        admin_form(
            "users/grant-role",
            "GrantRole",
            Some("users"),
            &[("EN", "Grant role")],
        ),
        admin_form(
            "users/revoke-role",
            "RevokeRole",
            Some("users"),
            &[("EN", "Revoke role")],
        ),
        admin_form(
            "users/allowed-ips",
            "SetAllowedIps",
            Some("users"),
            &[("EN", "Allowed addresses")],
        ),
    ]
}

/// Seed the catalog, its roles and all derived grants in one transaction.
pub async fn seed(store: &Store) -> Result<SeedReport> {
    store
        .seed_access_rules(&catalog(), &SEEDED_ROLES, CATCH_ALL_ROLE)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_has_unique_method_url_pairs() {
        let entries = catalog();
        let keys: HashSet<_> = entries.iter().map(|e| (e.method, e.url)).collect();
        assert_eq!(keys.len(), entries.len());
    }

    #[test]
    fn test_parents_exist_in_catalog() {
        let entries = catalog();
        for entry in &entries {
            if let Some((method, url)) = entry.parent {
                assert!(
                    entries.iter().any(|e| e.method == method && e.url == url),
                    "missing parent for {}",
                    entry.url
                );
            }
        }
    }

    #[test]
    fn test_every_entry_has_a_base_language_name() {
        assert!(catalog().iter().all(|e| e.names.iter().any(|(l, _)| *l == "EN")));
    }

    #[test]
    fn test_anonymous_entry_points() {
        let open: Vec<_> = catalog()
            .into_iter()
            .filter(|e| e.roles.contains(&ROLE_ALL))
            .map(|e| (e.method, e.url))
            .collect();
        assert!(open.contains(&(Get, "login")));
        assert!(open.contains(&(Post, "register")));
        assert!(!open.contains(&(Get, "index")));
    }
}
