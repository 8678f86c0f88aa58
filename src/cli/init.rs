//! Project initialization command

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use crate::config::Config;

/// Write a distpack.toml with the default configuration
#[derive(Args, Debug)]
pub struct InitCommand {
    /// Project directory
    #[arg(default_value = ".")]
    pub dir: String,

    /// Overwrite an existing distpack.toml
    #[arg(short, long)]
    pub force: bool,
}

impl InitCommand {
    pub async fn execute(&self) -> Result<()> {
        let project_dir = Path::new(&self.dir);
        let config_path = project_dir.join("distpack.toml");

        if config_path.exists() && !self.force {
            bail!(
                "{} already exists (use --force to overwrite)",
                config_path.display()
            );
        }

        // Create project directory if needed
        if self.dir != "." {
            fs::create_dir_all(project_dir).context("Failed to create project directory")?;
        }

        fs::write(&config_path, Self::generate_config()?)
            .context("Failed to write distpack.toml")?;
        eprintln!("  {} Created {}", "✓".green(), config_path.display().to_string().cyan());

        eprintln!("\n  Next steps:");
        if self.dir != "." {
            eprintln!("    {} cd {}", "→".dimmed(), self.dir.cyan());
        }
        eprintln!("    {} edit inputs in distpack.toml", "→".dimmed());
        eprintln!("    {} distpack build", "→".dimmed());
        eprintln!();

        Ok(())
    }

    fn generate_config() -> Result<String> {
        let body = toml::to_string_pretty(&Config::default_config())
            .context("Failed to serialize default configuration")?;
        Ok(format!("# distpack configuration\n\n{}", body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_config_parses() {
        let text = InitCommand::generate_config().unwrap();
        let config = Config::from_toml(&text).unwrap();

        assert_eq!(config.inputs, Config::default_config().inputs);
        assert!(text.starts_with("# distpack configuration"));
    }
}
