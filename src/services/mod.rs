pub mod dispatcher;
pub mod garmin_client;
pub mod reshape;
pub mod session_manager;
