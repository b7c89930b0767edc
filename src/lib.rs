pub mod clock;
pub mod config;
pub mod dataset;
mod header_tools;
pub mod intervals;
pub mod loader;
pub mod service;
pub mod store;
