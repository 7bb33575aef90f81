pub mod auth;
pub mod credentials;
mod health_check;
pub mod token_store;

pub use health_check::health_check;
