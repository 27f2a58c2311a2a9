//! Core implementation of the chore task runner
//!
//! Chore runs commands defined either as functions registered through the
//! library API or as shell templates declared in a project config file. A
//! command's CLI argument parser is derived from its declared parameter
//! list; commands can extend one another (the base runs first), and nested
//! invocations are traced through a running-commands stack.

use std::path::Path;

use log::debug;

use crate::config_file::{Config, ConfigError};

pub mod args;
pub mod cli;
pub mod command;
pub mod config_file;
pub mod console;
pub mod logger;
pub mod registry;
pub mod shell;

pub use crate::args::{ArgType, Argument, Param, ParamKind, Value};
pub use crate::cli::Cli;
pub use crate::command::{Command, Context, RunError};
pub use crate::registry::{Registry, RegistryError};

/// Load a configuration source into the registry and return the configured
/// default command name, if any.
///
/// An explicit `file` may be a config file or a directory to search; either
/// must exist. With no explicit path, the current directory and its parents
/// are searched, and finding nothing leaves the registry empty rather than
/// failing.
///
/// # Errors
///
/// Returns `ConfigError` if an explicit path does not resolve to a config
/// file, or if the file cannot be parsed or contains invalid declarations.
pub fn load_config(
    file: Option<&Path>,
    registry: &mut Registry,
) -> Result<Option<String>, ConfigError> {
    let config_path = match file {
        Some(path) if path.is_dir() => config_file::find_in_dir(path)
            .ok_or_else(|| ConfigError::ConfigNotFound(path.to_path_buf()))?,
        Some(path) if path.is_file() => path.to_path_buf(),
        Some(path) => return Err(ConfigError::ConfigNotFound(path.to_path_buf())),
        None => match Config::find_config() {
            Ok(path) => path,
            Err(ConfigError::ConfigNotFound(_)) => {
                debug!("No config file found; starting with an empty command set");
                return Ok(None);
            }
            Err(e) => return Err(e),
        },
    };

    let base_dir = config_path
        .parent()
        .ok_or_else(|| ConfigError::ConfigNotFound(config_path.clone()))?
        .to_path_buf();
    debug!("Loading '{}'", config_path.display());
    let parsed = Config::from_file(&config_path)?;
    parsed.apply(&base_dir, registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".chore.yaml");
        std::fs::write(
            &path,
            "default: build\ncommands:\n  - name: build\n    cmd: echo hi\n",
        )
        .unwrap();

        let mut registry = Registry::new();
        let default = load_config(Some(&path), &mut registry).unwrap();
        assert_eq!(default.as_deref(), Some("build"));
        assert!(registry.contains("build"));
    }

    #[test]
    fn test_load_config_directory_search() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".chore.yml"),
            "commands:\n  - name: build\n    cmd: echo hi\n",
        )
        .unwrap();

        let mut registry = Registry::new();
        load_config(Some(dir.path()), &mut registry).unwrap();
        assert!(registry.contains("build"));
    }

    #[test]
    fn test_load_config_missing_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::new();
        let result = load_config(Some(&dir.path().join("nope.yaml")), &mut registry);
        assert!(matches!(result, Err(ConfigError::ConfigNotFound(_))));
    }

    #[test]
    fn test_load_config_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::new();
        let result = load_config(Some(dir.path()), &mut registry);
        assert!(matches!(result, Err(ConfigError::ConfigNotFound(_))));
    }
}
