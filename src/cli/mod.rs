//! CLI command handling
//!
//! Dispatches CLI commands to the suite runner and formats output.

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::suite::{self, Suite};

/// Dispatch a CLI command
pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            suite: path,
            verbose,
            report,
        } => {
            let config = Config::load()?;
            let outcome = suite::run_suite(&path, &config, verbose).await?;

            if let Some(report_path) = &report {
                suite::write_report(report_path, &outcome)?;
                println!("Report written to {}", report_path.display());
            }

            if outcome.passed {
                Ok(())
            } else {
                Err(Error::SuiteFailed {
                    name: outcome.name,
                    message: outcome.error.unwrap_or_else(|| "unknown failure".to_string()),
                })
            }
        }

        Commands::Validate { suite: path } => {
            let mut loaded = Suite::load(&path)?;
            loaded.apply_overrides(|key| std::env::var(key).ok())?;
            loaded.validate()?;

            let setup_steps: usize = loaded.setup_routines.values().map(Vec::len).sum();
            println!(
                "Suite '{}' is valid: {} test cases, {} setup routines ({} steps)",
                loaded.name,
                loaded.test_cases.len(),
                loaded.setup_routines.len(),
                setup_steps
            );
            if loaded.needs_callback_listener() {
                if let Some(callback) = &loaded.callback {
                    println!(
                        "Callbacks expected on {}:{}{}",
                        callback.host, callback.port, callback.route
                    );
                }
            }
            Ok(())
        }
    }
}
