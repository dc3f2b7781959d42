pub mod activate;
pub mod authenticated;
pub mod health;
pub mod password_reset;
pub mod register;
pub mod tokens;
pub mod users;

pub use activate::activate;
pub use authenticated::Authenticated;
pub use health::health_check;
pub use password_reset::{request_password_reset, reset_password};
pub use register::register;
pub use tokens::{create_authentication_token, revoke_authentication_tokens};
pub use users::current_user;
