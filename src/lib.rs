pub mod api;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use error::ApiError;
pub use utils::startup_utils::{AppState, create_app};
