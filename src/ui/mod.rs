//! User interface module - formatting of user-facing output.
//!
//! Preparation runs unattended, so there are no interactive prompts; every
//! decision is made from the command line and the configuration file.

pub mod formatter;

// Re-export formatter functions for convenience
pub use formatter::{
    display_error, display_next_steps, display_normalization, display_status, display_success,
    display_warning,
};
