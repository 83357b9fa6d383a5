pub mod config;
pub mod dispatcher;
pub mod link;
pub mod messages;
pub mod motor;
pub mod runtime;
pub mod shutdown;
pub mod telemetry;
