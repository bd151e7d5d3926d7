pub mod config;
pub mod errors;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use errors::ApiError;
pub use handlers::AppState;
