pub mod api;
pub mod config;
pub mod error;
pub mod geo;
pub mod lifecycle;
pub mod models;
pub mod observability;
pub mod presentation;
pub mod pricing;
pub mod realtime;
pub mod session;
pub mod state;
pub mod store;
pub mod upstream;
