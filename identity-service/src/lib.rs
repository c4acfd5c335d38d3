pub mod app;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod store;
pub mod tokens;
pub mod user_handlers;

pub use app::AppState;
