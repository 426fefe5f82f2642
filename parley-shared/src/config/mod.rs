//! Configuration loading for the Parley server.

pub mod server;
