//! Pure formatting functions for UI output.
//!
//! This module contains all display/formatting logic for user-facing status.
//! Diagnostics go through `tracing` instead.

use console::style;
use std::path::Path;

use crate::tagging::Normalization;
use crate::warning::PrepareWarning;

/// Format and print an error message in red.
pub fn display_error(message: &str) {
    eprintln!("{} {}", style("ERROR:").red(), message);
}

/// Format and print a success message with green checkmark.
pub fn display_success(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

/// Format and print a status message with yellow arrow.
pub fn display_status(message: &str) {
    println!("{} {}", style("→").yellow(), message);
}

/// Display a non-fatal warning to the user.
pub fn display_warning(warning: &PrepareWarning) {
    eprintln!("{} {}", style("⚠ WARNING:").yellow(), warning);
}

/// Describe what the tag normalization did, one line.
pub fn format_normalization(normalization: &Normalization) -> String {
    let canonical = normalization.outcome.canonical();
    let anchor = match &normalization.baseline {
        Some(baseline) if baseline.tag.name != canonical.name => {
            format!("'{}' from tag '{}'", canonical.name, baseline.tag.name)
        }
        Some(_) => format!("'{}'", canonical.name),
        None => format!("'{}' on the root commit", canonical.name),
    };
    let action = if normalization.outcome.created() {
        "created"
    } else {
        "kept"
    };

    format!(
        "Canonical tag {} {}; package version is {}",
        anchor, action, normalization.version
    )
}

/// Display the tag normalization result.
pub fn display_normalization(normalization: &Normalization) {
    display_success(&format_normalization(normalization));
}

/// Build the instructions for using the prepared directory.
///
/// # Arguments
/// * `env_dir` - Prepared environment prefix
/// * `recipe_dir` - Prepared recipe directory
pub fn format_next_steps(env_dir: &Path, recipe_dir: &Path) -> String {
    let env = env_dir.display();
    let recipe = recipe_dir.display();

    format!(
        "To build the package in the prepared environment, run:\n  \
         conda activate {env}\n  \
         conda build {recipe}\n\
         or:\n  \
         conda run -p {env} conda build {recipe}"
    )
}

/// Display the instructions for using the prepared directory.
pub fn display_next_steps(env_dir: &Path, recipe_dir: &Path) {
    println!("\n{}\n", format_next_steps(env_dir, recipe_dir));
}
