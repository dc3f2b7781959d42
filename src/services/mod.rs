pub mod auth;
pub mod email;
pub mod password_reset;
pub mod token;

pub use auth::AuthService;
pub use email::EmailService;
pub use password_reset::PasswordResetService;
pub use token::{TokenGenerator, TokenService};
