//! Config check command handler.

use std::path::Path;

use anyhow::{bail, Context, Result};

use clawgate::config::validate::{validate_config, validate_semantics, Diagnostic, DiagnosticLevel};
use clawgate::config::Config;

use super::ConfigAction;

/// Validate configuration file.
pub(crate) fn cmd_config(action: ConfigAction, config_path: &Path) -> Result<()> {
    match action {
        ConfigAction::Check => {
            println!("Config file: {}", config_path.display());

            let diagnostics = check_file(config_path)?;
            for diag in &diagnostics {
                println!("{}", diag);
            }

            let errors = count(&diagnostics, DiagnosticLevel::Error);
            let warnings = count(&diagnostics, DiagnosticLevel::Warn);

            if errors == 0 && warnings == 0 {
                println!("\nConfiguration looks good!");
            } else {
                println!("\nFound {} error(s), {} warning(s)", errors, warnings);
            }
            if errors > 0 {
                bail!("Configuration has {} error(s)", errors);
            }
        }
    }
    Ok(())
}

/// Runs structural and semantic checks against the file at `path`.
///
/// A missing file is valid (defaults apply). Structural errors skip the
/// semantic pass since the file would not load anyway.
pub(crate) fn check_file(path: &Path) -> Result<Vec<Diagnostic>> {
    if !path.exists() {
        return Ok(vec![Diagnostic {
            level: DiagnosticLevel::Ok,
            path: String::new(),
            message: "No config file found (using defaults)".to_string(),
        }]);
    }

    let content = std::fs::read_to_string(path).context("Failed to read config file")?;
    let raw: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            return Ok(vec![Diagnostic {
                level: DiagnosticLevel::Error,
                path: String::new(),
                message: format!("Invalid JSON: {}", e),
            }]);
        }
    };

    let mut diagnostics = validate_config(&raw);
    if count(&diagnostics, DiagnosticLevel::Error) > 0 {
        return Ok(diagnostics);
    }

    match Config::load_from_path(path) {
        Ok(config) => diagnostics.extend(validate_semantics(&config)),
        Err(e) => diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Error,
            path: String::new(),
            message: e.to_string(),
        }),
    }
    Ok(diagnostics)
}

fn count(diagnostics: &[Diagnostic], level: DiagnosticLevel) -> usize {
    diagnostics.iter().filter(|d| d.level == level).count()
}
