pub mod alert;
pub mod analyze;
pub mod audio;
pub mod auth;
pub mod config;
pub mod error;
pub mod haptics;
pub mod rate;
pub mod session;
pub mod status;
