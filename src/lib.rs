pub mod cli;
pub mod conda;
pub mod config;
pub mod domain;
pub mod error;
pub mod git;
pub mod logging;
pub mod metadata;
pub mod recipe;
pub mod render;
pub mod sources;
pub mod tagging;
pub mod ui;
pub mod warning;
pub mod workspace;

pub use error::{PrepareError, Result};
pub use tagging::resolve_version;
