pub mod api;
pub mod app;
pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod models;
pub mod notify;
pub mod observability;
pub mod screens;
pub mod server;
pub mod session;
pub mod state;
