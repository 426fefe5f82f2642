//! Shared models and configuration for the Parley chat platform.

pub mod config;
pub mod models;
