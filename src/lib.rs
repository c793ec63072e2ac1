// Kasumi edge full-page cache library

pub mod admin;
pub mod cache;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod headers;
pub mod logging;
pub mod metrics;
pub mod origin;
pub mod pipeline;
pub mod plugins;
pub mod proxy;
pub mod response;
