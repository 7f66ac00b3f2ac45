pub mod api;
pub mod app;
pub mod broadcast;
pub mod config;
pub mod logging;
pub mod source;
pub mod state;
