pub mod error;
pub mod job;
pub mod model;
pub mod request;
pub mod settings;

mod serde_tests;
