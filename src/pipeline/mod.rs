pub mod job_runner;
pub mod orchestrator;
pub mod page_processor;
pub mod session;
