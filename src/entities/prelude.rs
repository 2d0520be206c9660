pub use super::request_names::Entity as RequestNames;
pub use super::request_roles::Entity as RequestRoles;
pub use super::requests::Entity as Requests;
pub use super::roles::Entity as Roles;
pub use super::user_ips::Entity as UserIps;
pub use super::user_passwords::Entity as UserPasswords;
pub use super::user_role_history::Entity as UserRoleHistory;
pub use super::user_roles::Entity as UserRoles;
pub use super::users::Entity as Users;
