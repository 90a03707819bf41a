// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod dataset;
pub mod dispatcher;
pub mod influx_repository;
pub mod memory_store;
pub mod sse;
