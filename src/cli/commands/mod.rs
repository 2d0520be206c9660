mod reset_password;
mod seed;
mod stop;

pub use reset_password::cmd_reset_password;
pub use seed::cmd_seed;
pub use stop::cmd_stop;
