//! Dispatcher configuration.
//!
//! Configuration is plain TOML; every key is optional:
//!
//! ```toml
//! thread_name = "modq-ui"
//! flush_pass_limit = 1024
//! catch_action_panics = true
//! start_suspended = false
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Default name of the dedicated UI thread.
pub const DEFAULT_THREAD_NAME: &str = "modq-ui";

/// Default cap on re-scan passes within one flush.
pub const DEFAULT_FLUSH_PASS_LIMIT: usize = 1024;

/// Tunables for [`Dispatcher`](crate::Dispatcher) and [`UiThread`](crate::UiThread).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatcherConfig {
	/// Name given to the UI thread.
	pub thread_name: String,
	/// Maximum number of passes a single flush makes over the queue. Actions
	/// submitted by running actions are picked up by the next pass.
	pub flush_pass_limit: usize,
	/// Run each action under `catch_unwind` so a panicking action does not
	/// abort the rest of the flush.
	pub catch_action_panics: bool,
	/// Start the UI thread with its automatic pump suspended.
	pub start_suspended: bool,
}

impl Default for DispatcherConfig {
	fn default() -> Self {
		Self {
			thread_name: DEFAULT_THREAD_NAME.to_string(),
			flush_pass_limit: DEFAULT_FLUSH_PASS_LIMIT,
			catch_action_panics: true,
			start_suspended: false,
		}
	}
}

impl DispatcherConfig {
	/// Parses configuration from a TOML string.
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads and parses a TOML configuration file.
	pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let input = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&input)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.flush_pass_limit == 0 {
			return Err(ConfigError::Invalid {
				field: "flush_pass_limit",
				reason: "must be > 0",
			});
		}
		if self.thread_name.is_empty() {
			return Err(ConfigError::Invalid {
				field: "thread_name",
				reason: "must not be empty",
			});
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[test]
	fn empty_document_yields_defaults() {
		let config = DispatcherConfig::from_toml_str("").unwrap();
		assert_eq!(config, DispatcherConfig::default());
		assert_eq!(config.thread_name, DEFAULT_THREAD_NAME);
	}

	#[test]
	fn partial_document_overrides_fields() {
		let config = DispatcherConfig::from_toml_str("flush_pass_limit = 8\nstart_suspended = true\n").unwrap();
		assert_eq!(config.flush_pass_limit, 8);
		assert!(config.start_suspended);
		assert!(config.catch_action_panics);
	}

	#[test]
	fn unknown_key_is_rejected() {
		let err = DispatcherConfig::from_toml_str("flush_passes = 3").unwrap_err();
		assert!(matches!(err, ConfigError::Toml(_)), "unexpected error: {err}");
	}

	#[test]
	fn zero_pass_limit_is_rejected() {
		let err = DispatcherConfig::from_toml_str("flush_pass_limit = 0").unwrap_err();
		assert!(matches!(err, ConfigError::Invalid { field: "flush_pass_limit", .. }));
	}

	#[test]
	fn loads_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "thread_name = \"ui-test\"").unwrap();
		let config = DispatcherConfig::from_path(file.path()).unwrap();
		assert_eq!(config.thread_name, "ui-test");
	}

	#[test]
	fn missing_file_reports_path() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("absent.toml");
		match DispatcherConfig::from_path(&path) {
			Err(ConfigError::Io { path: reported, .. }) => assert_eq!(reported, path),
			other => panic!("expected I/O error, got {other:?}"),
		}
	}
}
