pub mod activity;
pub mod error;
pub mod segment;
pub mod session;
pub mod settings;
pub mod types;
