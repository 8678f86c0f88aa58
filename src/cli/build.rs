//! Build command implementation

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::bundler::Bundler;
use crate::config::{Config, Mode};
use crate::utils::{format_duration, format_size};

/// Clean the output directory and build every bundle
#[derive(Args, Debug)]
pub struct BuildCommand {
    /// Output directory (defaults to `out_dir` from the config)
    #[arg(short, long)]
    pub outdir: Option<PathBuf>,

    /// `production` skips source maps and the bundle report
    #[arg(long, env = "NODE_ENV", default_value = "production")]
    pub mode: String,

    /// Rebuild whenever a file under the source directory changes
    #[arg(short, long)]
    pub watch: bool,
}

impl BuildCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        let result = self.build_once(config_path).await;

        if !self.watch {
            return result;
        }
        if let Err(err) = result {
            error!("{:?}", err);
        }
        self.watch_and_rebuild(config_path).await
    }

    async fn build_once(&self, config_path: &str) -> Result<()> {
        let start = Instant::now();

        info!("Loading configuration from {}", config_path);
        let config = Config::load(config_path)?;

        eprintln!("{} Building {}...", "→".blue(), config.project.name.cyan());

        let bundler = Bundler::new(config, self.into());
        let result = bundler.build().await?;

        eprintln!(
            "\n{} Built {} bundle(s) in {}\n",
            "✓".green().bold(),
            result.bundles.len(),
            format_duration(start.elapsed())
        );

        // Print bundle summary
        for bundle in &result.bundles {
            let map = if bundle.sourcemap_path.is_some() { " + map" } else { "" };
            eprintln!(
                "  {} {} {}{}",
                "•".dimmed(),
                bundle.output_path.display().to_string().cyan(),
                format_size(bundle.size).dimmed(),
                map.dimmed()
            );
        }
        if let Some(manifest) = &result.manifest_path {
            eprintln!("  {} {}", "•".dimmed(), manifest.display().to_string().cyan());
        }

        eprintln!();

        Ok(())
    }

    /// Rebuild on debounced changes under `src_dir`; failed builds are logged
    async fn watch_and_rebuild(&self, config_path: &str) -> Result<()> {
        let config = Config::load(config_path)?;
        let src_dir = config.source_dir();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = new_debouncer(Duration::from_millis(100), move |result: DebounceEventResult| {
            let _ = tx.send(result);
        })
        .context("Failed to start file watcher")?;
        debouncer
            .watcher()
            .watch(&src_dir, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", src_dir.display()))?;

        eprintln!(
            "{} Watching {} for changes...",
            "👀".cyan(),
            src_dir.display().to_string().cyan()
        );

        while let Some(result) = rx.recv().await {
            let changed = changed_files(result);
            if changed.is_empty() {
                continue;
            }
            for path in &changed {
                debug!("Changed: {}", path.display());
            }
            eprintln!("{} {} file(s) changed, rebuilding...", "↻".yellow(), changed.len());
            if let Err(err) = self.build_once(config_path).await {
                error!("{:?}", err);
            }
        }

        Ok(())
    }
}

/// Files touched by one debounced batch, sorted and deduplicated; a watcher
/// error is logged and yields no files
fn changed_files(result: DebounceEventResult) -> Vec<PathBuf> {
    match result {
        Ok(events) => {
            let mut paths: Vec<PathBuf> = events.into_iter().map(|event| event.path).collect();
            paths.sort();
            paths.dedup();
            paths
        }
        Err(err) => {
            error!("Watch error: {:?}", err);
            Vec::new()
        }
    }
}

/// Build options derived from command arguments
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub outdir: Option<PathBuf>,
    pub mode: Mode,
}

impl From<&BuildCommand> for BuildOptions {
    fn from(cmd: &BuildCommand) -> Self {
        Self {
            outdir: cmd.outdir.clone(),
            mode: Mode::from_env_value(&cmd.mode),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use notify_debouncer_mini::{DebouncedEvent, DebouncedEventKind};

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        build: BuildCommand,
    }

    #[test]
    fn test_mode_flag() {
        let harness = Harness::parse_from(["distpack", "--mode", "development", "--outdir", "out"]);
        let options = BuildOptions::from(&harness.build);

        assert_eq!(options.mode, Mode::Development);
        assert_eq!(options.outdir, Some(PathBuf::from("out")));
    }

    #[test]
    fn test_empty_node_env_is_production() {
        let harness = Harness::parse_from(["distpack", "--mode", ""]);
        assert_eq!(BuildOptions::from(&harness.build).mode, Mode::Production);
    }

    #[test]
    fn test_changed_files_dedupes_batch() {
        let event = |path: &str| DebouncedEvent {
            path: PathBuf::from(path),
            kind: DebouncedEventKind::Any,
        };
        let batch = vec![event("src/b.js"), event("src/a.js"), event("src/b.js")];

        assert_eq!(
            changed_files(Ok(batch)),
            vec![PathBuf::from("src/a.js"), PathBuf::from("src/b.js")]
        );
        assert!(changed_files(Ok(Vec::new())).is_empty());
        assert!(changed_files(Err(notify::Error::generic("watch failed"))).is_empty());
    }
}
