/// Calls across the network boundary
///
/// `CallPolicy` holds the retry rules, `HttpTokenStore` is the refresh
/// token store reached through another instance's `/tokens` API.

mod policy;
mod token_store_client;

pub use policy::{CallKind, CallPolicy};
pub use token_store_client::HttpTokenStore;
