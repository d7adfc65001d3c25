pub mod auth;
pub mod trace_id;

pub use auth::{admin_middleware, auth_middleware, AuthInfo};
pub use trace_id::trace_id_middleware;
