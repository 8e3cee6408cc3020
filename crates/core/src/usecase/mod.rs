pub mod job_runner;
pub mod presenter;
