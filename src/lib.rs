pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod geometry;
pub mod infra;
pub mod ingest;
pub mod model;
pub mod ordering;
pub mod output;
pub mod services;
pub mod store;
