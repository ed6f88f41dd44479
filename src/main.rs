use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use conda_build_prepare::cli::orchestration::{self, PrepareWorkflowArgs};
use conda_build_prepare::{config, logging, ui};

#[derive(clap::Parser)]
#[command(
    name = "conda-build-prepare",
    version,
    about = "Prepare a self-contained directory for building a conda package",
    after_help = "Use `conda-build-prepare restore` to undo the changes made to conda \
                  configuration files by earlier runs."
)]
struct Args {
    /// Package recipe directory, or `restore`
    package: String,

    #[arg(long, help = "Build directory to create; must not exist")]
    dir: Option<PathBuf>,

    #[arg(long, num_args = 1.., help = "Channels to add on top of the environment's channels")]
    channels: Vec<String>,

    #[arg(short, long, help = "Custom configuration file path")]
    config: Option<String>,

    #[arg(short, long, help = "Print debug logs")]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_tracing(args.verbose);

    if args.package == "restore" {
        return restore();
    }

    let Some(directory) = args.dir else {
        ui::display_error("--dir is required when preparing a package");
        std::process::exit(1);
    };

    // Load configuration
    let config = match config::load_config(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    };

    let workflow_args = PrepareWorkflowArgs {
        package_dir: PathBuf::from(&args.package),
        directory,
        channels: args.channels,
    };

    ui::display_status(&format!(
        "Preparing {} in {}",
        workflow_args.package_dir.display(),
        workflow_args.directory.display()
    ));

    let result = match orchestration::run_prepare_workflow(&workflow_args, &config) {
        Ok(result) => result,
        Err(e) => {
            ui::display_error(&format!("Preparation failed: {}", e));
            if e.is_fatal_for_versioning() {
                ui::display_status(
                    "The source repository cannot produce a reproducible version; \
                     fix its tags or history and run again",
                );
            }
            std::process::exit(1);
        }
    };

    for warning in &result.warnings {
        ui::display_warning(warning);
    }
    if let Some(normalization) = &result.normalization {
        ui::display_normalization(normalization);
    }

    ui::display_success(&format!(
        "Prepared {}",
        result.workspace.root.display()
    ));
    ui::display_next_steps(&result.workspace.env_dir, &result.workspace.recipe_dir);

    Ok(())
}

fn restore() -> Result<()> {
    ui::display_status("Restoring conda configuration files...");

    match orchestration::run_restore() {
        Ok(warnings) => {
            for warning in &warnings {
                ui::display_warning(warning);
            }
            ui::display_success("Restored conda configuration files");
            Ok(())
        }
        Err(e) => {
            ui::display_error(&format!("Restore failed: {}", e));
            std::process::exit(1);
        }
    }
}
