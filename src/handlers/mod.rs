//! HTTP request handlers.
//!
//! Handlers stay thin: decode input, validate, call a store, wrap the result
//! in its response envelope. Authentication and authorization have already
//! happened by the time a handler runs.

pub mod health;
pub mod movies;
pub mod tokens;
pub mod users;

pub use health::{debug_metrics, healthcheck};
pub use movies::{create_movie, delete_movie, list_movies, show_movie, update_movie};
pub use tokens::{
    create_activation_token, create_authentication_token, create_password_reset_token,
};
pub use users::{activate_user, register_user, update_user_password};
