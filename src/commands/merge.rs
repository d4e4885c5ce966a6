//! Merge command implementation
//!
//! Runs the full pipeline once: fetch every enabled subscription,
//! deduplicate, compose the template and operator layers, run the
//! transform script, sanitize, and replace the engine config (backing up
//! the previous one first).

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use subforge::pipeline::MergeRunner;
use subforge::settings::Settings;

/// Arguments for the merge command
#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Engine config directory (where config.yaml is written)
    #[arg(long, value_name = "PATH", env = "MIHOMO_DIR")]
    pub base_dir: Option<PathBuf>,

    /// Directory holding the operator documents (subscriptions.json,
    /// template.yaml, override.yaml, override.js, site_policy.yaml)
    #[arg(long, value_name = "PATH", env = "SCRIPTS_DIR")]
    pub scripts_dir: Option<PathBuf>,

    /// Suppress the run summary (logging is controlled by --log-level)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Execute the merge command
pub fn execute(args: MergeArgs) -> Result<()> {
    let mut settings = Settings::from_env();
    if let Some(base_dir) = &args.base_dir {
        let scripts_dir = args
            .scripts_dir
            .clone()
            .unwrap_or_else(|| base_dir.join("scripts"));
        settings.paths = subforge::settings::Paths::new(base_dir.clone(), scripts_dir);
    } else if let Some(scripts_dir) = &args.scripts_dir {
        settings.paths = subforge::settings::Paths::new(
            settings.paths.base_dir.clone(),
            scripts_dir.clone(),
        );
    }

    let runner = MergeRunner::new(settings);
    let report = runner.run()?;

    if !args.quiet {
        println!(
            "Merged {} node(s) from {} subscription(s) into {}",
            report.merged_node_count,
            report.enabled_subscription_count,
            runner.settings().paths.config_file.display()
        );
        for fetched in &report.fetched {
            println!(
                "  {}: {} node(s)",
                fetched.name, fetched.fetched_node_count
            );
        }
        for failure in &report.subscription_errors {
            println!("  warning: {}: {}", failure.name, failure.reason);
        }
        if let Some(backup_error) = &report.backup_error {
            println!("  warning: backup failed: {}", backup_error);
        }
        if let Some(backup_path) = &report.backup_path {
            println!("  previous config backed up to {}", backup_path.display());
        }
    }

    Ok(())
}
