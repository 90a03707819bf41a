// Application layer - Use cases and collaborator traits
pub mod alert_router;
pub mod baseline;
pub mod classifier;
pub mod digest_service;
pub mod ingest_service;
pub mod monitor_service;
pub mod normalizer;
pub mod sensor_repository;
