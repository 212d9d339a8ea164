pub mod config;
pub mod llm;
pub mod panel;
pub mod telemetry;
