pub mod app_service;
pub mod history;
pub mod orchestrator;
