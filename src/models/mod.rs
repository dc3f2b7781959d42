pub mod token;
pub mod user;

pub use token::{Scope, Token};
pub use user::User;
