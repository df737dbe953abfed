//! Domain types shared by handlers, middleware and stores.

pub mod movie;
pub mod principal;
pub mod token;
pub mod user;

pub use movie::{Movie, Runtime};
pub use principal::Principal;
pub use token::{Scope, Token};
pub use user::User;
