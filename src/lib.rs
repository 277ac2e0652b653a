pub mod cli;
pub mod commands;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod services;

pub use error::{Error, Result};
