pub mod access_catalog;
pub use access_catalog::{CATCH_ALL_ROLE, HOME_CONTROLLER, SEEDED_ROLES, catalog};

pub mod password_policy;
pub use password_policy::{PasswordPolicy, PolicyViolation};

pub mod credential_service;
pub mod credential_service_impl;
pub use credential_service::{CredentialError, CredentialService};
pub use credential_service_impl::SeaOrmCredentialService;

pub mod membership_service;
pub mod membership_service_impl;
pub use membership_service::{MembershipError, MembershipService};
pub use membership_service_impl::SeaOrmMembershipService;

pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{
    AuthError, AuthService, ChangePasswordRequest, LoginRequest, RegisterRequest, RegisteredUser,
    UserListing, UserPage,
};
pub use auth_service_impl::{BOOTSTRAP_ADMIN, SeaOrmAuthService};

pub mod resolver;
pub use resolver::{AccessError, INDEX_URL, ResolvedRule, Resolver, normalize_url};
