/// Middleware module
///
/// Bearer token authentication and request timing.

mod jwt_middleware;
mod server_timing;

pub use jwt_middleware::JwtMiddleware;
pub use server_timing::ServerTiming;
