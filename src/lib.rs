pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod repositories;
pub mod server;
pub mod services;
pub mod shutdown;
pub mod state;
