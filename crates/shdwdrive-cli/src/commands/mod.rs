pub mod config;
pub mod cost;
pub mod files;
pub mod wait;
