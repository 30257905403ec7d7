pub mod body_composition;
pub mod endpoint;
pub mod profile;
pub mod session;
pub mod sleep;
