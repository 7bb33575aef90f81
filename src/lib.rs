pub mod auth;
pub mod configuration;
pub mod credentials;
pub mod error;
pub mod issuance;
pub mod middleware;
pub mod remote;
pub mod routes;
pub mod security;
pub mod startup;
pub mod telemetry;
pub mod token_store;
pub mod validators;
