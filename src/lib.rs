// Library exports for the CLI and tests
pub mod config;
pub mod models;
pub mod services;
pub mod storage;
