pub mod timestamp;
pub mod event;
pub mod reader;
pub mod normalize;
pub mod timeline;
pub mod ingest;
pub mod trend;
pub mod config;
pub mod summarizer;
pub mod remediation;
pub mod monitor;
