pub mod conditions;
pub mod errors;
pub mod labels;
pub mod metrics;
pub mod telemetry;
