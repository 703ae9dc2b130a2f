pub mod heuristics;
pub mod job_store;
pub mod pipeline;
pub mod providers;
pub mod runner;
pub mod storage;
