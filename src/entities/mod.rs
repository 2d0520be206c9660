pub mod prelude;

pub mod request_names;
pub mod request_roles;
pub mod requests;
pub mod roles;
pub mod user_ips;
pub mod user_passwords;
pub mod user_role_history;
pub mod user_roles;
pub mod users;
