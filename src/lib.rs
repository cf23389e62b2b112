pub mod colorizer;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fallback;
pub mod fetcher;
pub mod literal;
pub mod models;
pub mod pipeline;
pub mod projection;
pub mod reconciler;
pub mod render;
pub mod scheduler;
pub mod store;
