//! CLI command implementations

pub mod db;
pub mod demo;
pub mod server;
pub mod status;
pub mod token;
