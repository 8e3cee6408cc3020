pub mod metrics;
pub mod provider;
