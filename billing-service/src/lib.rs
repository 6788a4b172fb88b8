pub mod api;
pub mod config;
pub mod ledger;
pub mod observability;
pub mod session;
pub mod telemetry;
