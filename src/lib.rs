//! distpack library
//!
//! Core functionality for the distpack bundler: configuration, job planning,
//! the plugin pipeline, module linking and bundle emission.

pub mod analyzer;
pub mod bundler;
pub mod cli;
pub mod config;
pub mod plugins;
pub mod resolver;
pub mod transform;
pub mod utils;

pub use bundler::{BuildError, Bundler};
pub use cli::Cli;
pub use config::Config;
