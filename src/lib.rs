pub mod adapters;
pub mod aggregation;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod usage;
