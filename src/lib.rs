pub mod config;
pub mod config_validator;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod health;
pub mod key_generator;
pub mod metrics;
pub mod middleware;
pub mod profile;
pub mod rate_limiter;
pub mod redis;
pub mod response;
pub mod server;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{ApiError, Result, StoreError};
pub use handlers::{AppState, SharedState};
pub use rate_limiter::RateLimiter;
pub use server::create_app;
