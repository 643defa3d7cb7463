// src/lib.rs

pub mod access;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod monitor;
pub mod rules;
pub mod types;
pub mod watch;

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_and_validate};
use crate::fs::{FileSystem, RealFileSystem};
use crate::monitor::{Supervisor, find_rule_files};
use crate::rules::load_rule_file;
use crate::watch::path_utils::workspace_of_rule_file;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the supervisor with one monitor per workspace
/// - Ctrl-C handling (inside the supervisor)
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = Arc::new(load_and_validate(&args.config)?);
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    if args.dry_run {
        print_dry_run(&cfg, fs.as_ref());
        return Ok(());
    }

    info!(
        home = %cfg.paths.workspace_home.display(),
        data = %cfg.paths.data_root.display(),
        "vgrid-events starting"
    );
    Supervisor::new(cfg, fs).run(args.workspace).await?;
    Ok(())
}

/// Simple dry-run output: print every workspace's rules.
fn print_dry_run(cfg: &ConfigFile, fs: &dyn FileSystem) {
    println!("vgrid-events dry-run");
    println!("  workspace_home = {}", cfg.paths.workspace_home.display());
    println!("  data_root = {}", cfg.paths.data_root.display());
    println!("  max_workers = {}", cfg.engine.max_workers);
    println!("  queue_length = {}", cfg.engine.queue_length);
    println!();

    let files = find_rule_files(fs, &cfg.paths.workspace_home, &cfg.paths.rule_file_name);
    for file in files {
        let Some(workspace) = workspace_of_rule_file(&cfg.paths.workspace_home, &file) else {
            continue;
        };
        let rules = match load_rule_file(fs, &file, &workspace) {
            Ok(rules) => rules,
            Err(err) => {
                warn!(path = %file.display(), error = %err, "skipping unreadable rule file");
                continue;
            }
        };

        println!("workspace {workspace} ({} rules):", rules.len());
        for rule in rules {
            println!("  - {}", rule.rule_id);
            println!("      path: {}", rule.path);
            let changes: Vec<&str> = rule.changes.iter().map(|c| c.as_str()).collect();
            println!("      changes: {}", changes.join(", "));
            println!("      action: {}", rule.action);
            println!("      run_as: {}", rule.run_as);
            if !rule.arguments.is_empty() {
                println!("      arguments: {:?}", rule.arguments);
            }
            if !rule.templates.is_empty() {
                println!("      templates: {}", rule.templates.len());
            }
            if rule.rate.is_enabled() {
                println!("      rate_limit: {}", rule.rate_limit);
            }
            if rule.settle_secs > 0.0 {
                println!("      settle_time: {}", rule.settle_time);
            }
            if rule.match_recursive {
                println!("      match_recursive: true");
            }
            if rule.match_dirs {
                println!("      match_dirs: true");
            }
        }
    }

    debug!("dry-run complete (no monitoring)");
}
