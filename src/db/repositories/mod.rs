pub mod credential;
pub mod request;
pub mod role;
pub mod user;
