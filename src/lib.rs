pub mod authentication;
pub mod configuration;
pub mod delivery_worker;
pub mod domain;
pub mod idempotency;
pub mod relay;
pub mod revocation;
pub mod routes;
pub mod startup;
pub mod telemetry;
