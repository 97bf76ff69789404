//! GitHub Global: repository documentation translation pipeline.

pub mod api;
pub mod config;
pub mod error;
pub mod llm;
pub mod queue;
pub mod ratelimit;
pub mod store;
pub mod translation;
