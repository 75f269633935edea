pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod models;
pub mod observability;
pub mod registry;
pub mod state;
pub mod store;
