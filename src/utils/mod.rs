pub mod env_utils;
pub mod startup_utils;
