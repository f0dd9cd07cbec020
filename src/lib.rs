pub mod api;
pub mod app;
pub mod clients;
pub mod config;
pub mod correlation;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod observability;
pub mod pool;
pub mod recording;
pub mod utils;
pub mod verifier;
