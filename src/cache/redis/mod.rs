// Redis store module
//
// Shares cache records across edge instances through Redis.

pub mod config;
pub mod store;

pub use config::RedisConfig;
pub use store::RedisStore;
