pub mod config;
pub mod fallback;
pub mod fetcher;
pub mod merge;
pub mod metrics;
pub mod resource;
pub mod resources;
pub mod scheduler;
pub mod session;
pub mod view;

pub mod error;
