//! Configuration error types.

use super::FieldPath;
use owo_colors::OwoColorize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config file parsing error")]
    Toml(#[from] toml::de::Error),

    #[error("Config file `{0}` not found")]
    NotFound(PathBuf),

    // No #[from]: source() would print the diagnostics twice
    #[error("{0}")]
    Diagnostics(ConfigDiagnostics),
}

/// One validation finding, fatal or not.
#[derive(Debug, Clone)]
pub struct Finding {
    pub field: FieldPath,
    pub message: String,
    pub hint: Option<String>,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field.as_str().cyan(), self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " {}", format!("({hint})").dimmed())?;
        }
        Ok(())
    }
}

/// Findings of a whole-config validation pass.
///
/// Sections report into one collector so every problem surfaces at once.
#[derive(Debug, Default)]
pub struct ConfigDiagnostics {
    errors: Vec<Finding>,
    warnings: Vec<Finding>,
}

impl ConfigDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    fn finding(field: FieldPath, message: impl Into<String>, hint: Option<String>) -> Finding {
        Finding {
            field,
            message: message.into(),
            hint,
        }
    }

    pub fn error(&mut self, field: FieldPath, message: impl Into<String>) {
        self.errors.push(Self::finding(field, message, None));
    }

    pub fn error_with_hint(
        &mut self,
        field: FieldPath,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) {
        self.errors
            .push(Self::finding(field, message, Some(hint.into())));
    }

    pub fn warn(&mut self, field: FieldPath, message: impl Into<String>) {
        self.warnings.push(Self::finding(field, message, None));
    }

    pub fn print_warnings(&self) {
        for warning in &self.warnings {
            crate::log!("config"; "{}", warning);
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn warnings(&self) -> &[Finding] {
        &self.warnings
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ConfigDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} error{})",
            "invalid hotswap.toml".red().bold(),
            self.errors.len(),
            if self.errors.len() == 1 { "" } else { "s" }
        )?;
        for error in &self.errors {
            write!(f, "\n  {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigDiagnostics {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_config_error_display() {
        let io_err = ConfigError::Io(
            PathBuf::from("hotswap.toml"),
            Error::new(ErrorKind::NotFound, "file not found"),
        );
        let display = format!("{io_err}");
        assert!(display.contains("IO error"));
        assert!(display.contains("hotswap.toml"));

        let not_found = ConfigError::NotFound(PathBuf::from("hotswap.toml"));
        assert!(format!("{not_found}").contains("not found"));
    }

    #[test]
    fn test_diagnostics_collect_all_errors() {
        owo_colors::set_override(false);
        let mut diag = ConfigDiagnostics::new();
        diag.error(FieldPath::new("build.manifest"), "must not be empty");
        diag.error_with_hint(FieldPath::new("retention.keep"), "invalid pattern", "unclosed group");
        diag.warn(FieldPath::new("retention.generations"), "0 is treated as 1");

        assert_eq!(diag.len(), 2);
        assert_eq!(diag.warnings().len(), 1);

        let err = diag.into_result().unwrap_err();
        let display = format!("{err}");
        assert!(display.contains("(2 errors)"));
        assert!(display.contains("build.manifest must not be empty"));
        assert!(display.contains("invalid pattern (unclosed group)"));
    }
}
