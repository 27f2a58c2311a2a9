//! Configuration file handling
//!
//! A config file declares shell-template commands. Loading one is the
//! scripted-plugin step of the CLI front end: every entry is converted into a
//! bound [`Command`] and registered, in declaration order, as a side effect
//! of [`Config::apply`]. Command bodies expand `{placeholder}` references
//! against the parsed argument values and run the result through `sh -c`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::args::{ArgType, Argument, Param, Value};
use crate::command::{Command, Context, RunError};
use crate::registry::Registry;
use crate::shell;

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No config file found in current directory or its parents: {0}")]
    ConfigNotFound(PathBuf),
    #[error("Unknown working directory: {0}")]
    UnknownWorkingDirectory(String),
    #[error("Unable to parse YAML config file {path}: {source}")]
    Yaml {
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("Unable to parse JSON config file {path}: {source}")]
    Json {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("Command '{command}' extends '{base}', which is not defined before it")]
    UnknownExtends { command: String, base: String },
    #[error("Unknown type '{ty}' for argument '{argument}'")]
    UnknownType { argument: String, ty: String },
    #[error("Unsupported default for argument '{argument}'")]
    UnsupportedDefault { argument: String },
    #[error("Invalid config: {0}")]
    Validation(String),
}

/// Declaration of one command argument
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct ConfigArg {
    pub name: String,
    pub positional: Option<bool>,
    pub multiple: Option<bool>,
    pub default: Option<serde_yaml::Value>,
    #[serde(rename = "type")]
    pub ty: Option<String>,
    pub short: Option<char>,
    pub help: Option<String>,
    pub metavar: Option<String>,
}

/// Declaration of one command
#[derive(Debug, Deserialize, Serialize)]
pub struct ConfigCommand {
    pub name: String,
    pub cmd: String,
    pub help: Option<String>,
    pub description: Option<String>,
    pub extends: Option<String>,
    pub args: Option<Vec<ConfigArg>>,
    pub cwd: Option<PathBuf>,
    pub env: Option<HashMap<String, String>>,
}

/// Root configuration structure
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Command to run when argv names none
    pub default: Option<String>,
    /// Environment applied to every command, overlaid by per-command env
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub commands: Vec<ConfigCommand>,
}

/// List of supported configuration file names
const FILENAMES: [&str; 4] = [".chore.yaml", ".chore.yml", ".chore.json", "Chorefile"];

/// Look for a conventionally named config file directly in `dir`.
#[must_use]
pub fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file())
}

fn convert_default(argument: &str, value: &serde_yaml::Value) -> Result<Value, ConfigError> {
    let unsupported = || ConfigError::UnsupportedDefault {
        argument: argument.to_string(),
    };
    match value {
        serde_yaml::Value::Null => Ok(Value::Null),
        serde_yaml::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else {
                n.as_f64().map(Value::Float).ok_or_else(unsupported)
            }
        }
        serde_yaml::Value::String(s) => Ok(Value::String(s.clone())),
        serde_yaml::Value::Sequence(items) => {
            let converted: Result<Vec<Value>, ConfigError> = items
                .iter()
                .map(|item| convert_default(argument, item))
                .collect();
            Ok(Value::List(converted?))
        }
        _ => Err(unsupported()),
    }
}

fn parse_type(argument: &str, ty: &str) -> Result<ArgType, ConfigError> {
    match ty {
        "string" | "str" => Ok(ArgType::String),
        "int" | "integer" => Ok(ArgType::Int),
        "float" => Ok(ArgType::Float),
        "bool" | "boolean" => Ok(ArgType::Bool),
        _ => Err(ConfigError::UnknownType {
            argument: argument.to_string(),
            ty: ty.to_string(),
        }),
    }
}

impl ConfigArg {
    /// Classify this declaration as one formal parameter plus its explicit
    /// argument metadata.
    fn to_param(&self) -> Result<(Param, Argument), ConfigError> {
        let default = match &self.default {
            Some(value) => Some(convert_default(&self.name, value)?),
            None => None,
        };

        let param = if self.multiple.unwrap_or(false) {
            Param::rest(&self.name)
        } else if self.positional.unwrap_or(false) {
            match &default {
                Some(value) => Param::optional(&self.name, value.clone()),
                None => Param::required(&self.name),
            }
        } else {
            Param::keyword(&self.name, default.clone().unwrap_or(Value::Null))
        };

        let mut argument = Argument::new(&self.name);
        if let Some(ty) = &self.ty {
            argument.ty = Some(parse_type(&self.name, ty)?);
        }
        if let Some(short) = self.short {
            argument.short_option = Some(short);
        }
        if let Some(help) = &self.help {
            argument.help = Some(help.clone());
        }
        if let Some(metavar) = &self.metavar {
            argument.metavar = metavar.clone();
        }

        Ok((param, argument))
    }
}

/// Expand `{name}` placeholders against the resolved argument values.
/// `{{` and `}}` escape literal braces.
pub(crate) fn expand_template(template: &str, ctx: &Context<'_>) -> Result<String, RunError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    name.push(inner);
                }
                if !closed {
                    return Err(RunError::Failed(format!(
                        "Unterminated placeholder '{{{name}' in command template"
                    )));
                }
                let value = ctx.get(&name).map_err(|e| match e {
                    RunError::MissingArgument { command, name } => {
                        RunError::UnknownPlaceholder { command, name }
                    }
                    other => other,
                })?;
                out.push_str(&value.bare());
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

impl ConfigCommand {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Command with an empty name".to_string(),
            ));
        }
        if self.cmd.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Command '{}' has an empty cmd string",
                self.name
            )));
        }

        let args = self.args.as_deref().unwrap_or_default();
        let mut seen = Vec::new();
        let mut rest = 0usize;
        for arg in args {
            if seen.contains(&&arg.name) {
                return Err(ConfigError::Validation(format!(
                    "Command '{}' declares argument '{}' twice",
                    self.name, arg.name
                )));
            }
            seen.push(&arg.name);
            if arg.multiple.unwrap_or(false) {
                rest += 1;
            }
        }
        if rest > 1 {
            return Err(ConfigError::Validation(format!(
                "Command '{}' declares more than one variadic argument",
                self.name
            )));
        }
        Ok(())
    }

    fn into_command(self, base_dir: &Path, base_env: &HashMap<String, String>) -> Result<(Command, Option<String>), ConfigError> {
        self.validate()?;

        let template = self.cmd;
        let cwd = self.cwd.map(|dir| {
            if dir.is_relative() {
                base_dir.join(dir)
            } else {
                dir
            }
        });
        let mut env = base_env.clone();
        env.extend(self.env.unwrap_or_default());

        let function = move |ctx: &Context<'_>| -> Result<(), RunError> {
            let line = expand_template(&template, ctx)?;
            shell::run(&line, cwd.as_deref(), &env)
        };

        let mut command = Command::new(&self.name, function);
        for declaration in self.args.unwrap_or_default() {
            let (param, argument) = declaration.to_param()?;
            command = command.param(param).arg(argument);
        }
        if let Some(help) = &self.help {
            command = command.with_help(help);
        }
        if let Some(description) = &self.description {
            command = command.with_description(description);
        }

        Ok((command, self.extends))
    }
}

impl Config {
    /// Loads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if the file cannot be read, or
    /// `ConfigError::Yaml`/`ConfigError::Json` if parsing fails.
    pub fn from_file(file: &Path) -> Result<Config, ConfigError> {
        let contents = std::fs::read_to_string(file)
            .map_err(|_| ConfigError::ConfigNotFound(file.to_path_buf()))?;
        let config: Config = if file.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents).map_err(|e| ConfigError::Json {
                source: e,
                path: file.to_path_buf(),
            })?
        } else {
            serde_yaml::from_str(&contents).map_err(|e| ConfigError::Yaml {
                source: e,
                path: file.to_path_buf(),
            })?
        };
        Ok(config)
    }

    /// Searches for a configuration file in the current directory and its
    /// parents.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownWorkingDirectory` if the cwd cannot be
    /// determined, or `ConfigError::ConfigNotFound` if no config file is
    /// found.
    pub fn find_config() -> Result<PathBuf, ConfigError> {
        let start = std::env::current_dir()
            .map_err(|e| ConfigError::UnknownWorkingDirectory(e.to_string()))?;
        let mut path = start.clone();
        debug!("Searching for config file in {}", start.display());
        loop {
            for file in &FILENAMES {
                let candidate = path.join(file);
                if candidate.exists() {
                    info!("Found config file: {}", candidate.display());
                    return Ok(candidate);
                }
            }
            if !path.pop() {
                return Err(ConfigError::ConfigNotFound(start));
            }
        }
    }

    /// Register every declared command, in order. Returns the configured
    /// default command name, if any.
    ///
    /// # Errors
    ///
    /// Fails on invalid declarations or an `extends` reference to a command
    /// not defined before its extension.
    pub fn apply(self, base_dir: &Path, registry: &mut Registry) -> Result<Option<String>, ConfigError> {
        let base_env = self.env;

        for entry in self.commands {
            let name = entry.name.clone();
            let (mut command, extends) = entry.into_command(base_dir, &base_env)?;

            if let Some(base_name) = extends {
                let base = registry
                    .lookup(&base_name.replace('_', "-"))
                    .map_err(|_| ConfigError::UnknownExtends {
                        command: name,
                        base: base_name,
                    })?;
                command = command.extends(&base);
            }

            registry.register(command);
        }

        if let Some(default) = &self.default {
            if !registry.contains(&default.replace('_', "-")) {
                return Err(ConfigError::Validation(format!(
                    "Default command '{default}' is not defined"
                )));
            }
        }

        Ok(self.default.map(|name| name.replace('_', "-")))
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::args::ParamKind;

    fn load_yaml(content: &str) -> Config {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".chore.yaml");
        std::fs::write(&path, content).unwrap();
        Config::from_file(&path).unwrap()
    }

    #[test]
    fn test_from_file_yaml() {
        let config = load_yaml(
            "commands:\n  - name: test\n    cmd: echo hello\n",
        );
        assert_eq!(config.commands.len(), 1);
        assert_eq!(config.commands[0].name, "test");
    }

    #[test]
    fn test_from_file_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".chore.json");
        std::fs::write(
            &path,
            r#"{"commands": [{"name": "test", "cmd": "echo hello"}]}"#,
        )
        .unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.commands[0].cmd, "echo hello");
    }

    #[test]
    fn test_arg_classification() {
        let config = load_yaml(
            r"
commands:
  - name: copy
    cmd: cp {source} {dest}
    args:
      - name: source
        positional: true
      - name: dest
        positional: true
        default: out
      - name: extra
        multiple: true
      - name: force
        default: false
",
        );

        let args = config.commands[0].args.clone().unwrap();
        let (source, _) = args[0].to_param().unwrap();
        assert_eq!(source.kind, ParamKind::Required);
        let (dest, _) = args[1].to_param().unwrap();
        assert_eq!(dest.kind, ParamKind::Optional(Value::String("out".to_string())));
        let (extra, _) = args[2].to_param().unwrap();
        assert_eq!(extra.kind, ParamKind::Rest);
        let (force, _) = args[3].to_param().unwrap();
        assert_eq!(force.kind, ParamKind::Keyword(Value::Bool(false)));
    }

    #[test]
    fn test_apply_registers_in_order() {
        let config = load_yaml(
            "commands:\n  - name: build\n    cmd: echo build\n  - name: test\n    cmd: echo test\n    extends: build\n",
        );
        let mut registry = Registry::new();
        let dir = tempfile::tempdir().unwrap();
        let default = config.apply(dir.path(), &mut registry).unwrap();

        assert_eq!(default, None);
        let names: Vec<String> = registry.iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, ["build", "test"]);
        assert!(registry.lookup("test").unwrap().extends.is_some());
    }

    #[test]
    fn test_extends_must_be_defined_before() {
        let config = load_yaml(
            "commands:\n  - name: test\n    cmd: echo test\n    extends: build\n",
        );
        let mut registry = Registry::new();
        let dir = tempfile::tempdir().unwrap();
        match config.apply(dir.path(), &mut registry) {
            Err(ConfigError::UnknownExtends { command, base }) => {
                assert_eq!(command, "test");
                assert_eq!(base, "build");
            }
            other => panic!("Expected UnknownExtends, got: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_default_command() {
        let config = load_yaml(
            "default: nope\ncommands:\n  - name: build\n    cmd: echo build\n",
        );
        let mut registry = Registry::new();
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            config.apply(dir.path(), &mut registry),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_duplicate_argument_rejected() {
        let config = load_yaml(
            r"
commands:
  - name: copy
    cmd: cp {source}
    args:
      - name: source
      - name: source
",
        );
        let mut registry = Registry::new();
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            config.apply(dir.path(), &mut registry),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_template_expansion() {
        let mut registry = Registry::new();
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let config = load_yaml(&format!(
            "commands:\n  - name: mark\n    cmd: echo {{word}} > {}\n    args:\n      - name: word\n        positional: true\n",
            marker.display()
        ));
        config.apply(dir.path(), &mut registry).unwrap();

        registry
            .invoke("mark", &[Value::from("hello")], &IndexMap::new())
            .unwrap();
        let contents = std::fs::read_to_string(&marker).unwrap();
        assert_eq!(contents.trim(), "hello");
    }

    #[test]
    fn test_unknown_placeholder() {
        let mut registry = Registry::new();
        let dir = tempfile::tempdir().unwrap();
        let config = load_yaml(
            "commands:\n  - name: bad\n    cmd: echo {nope}\n",
        );
        config.apply(dir.path(), &mut registry).unwrap();

        match registry.invoke("bad", &[], &IndexMap::new()) {
            Err(RunError::UnknownPlaceholder { name, .. }) => assert_eq!(name, "nope"),
            other => panic!("Expected UnknownPlaceholder, got: {other:?}"),
        }
    }

    #[test]
    fn test_escaped_braces() {
        let mut registry = Registry::new();
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let config = load_yaml(&format!(
            "commands:\n  - name: braces\n    cmd: echo '{{{{literal}}}}' > {}\n",
            marker.display()
        ));
        config.apply(dir.path(), &mut registry).unwrap();
        registry.invoke("braces", &[], &IndexMap::new()).unwrap();
        let contents = std::fs::read_to_string(&marker).unwrap();
        assert_eq!(contents.trim(), "{literal}");
    }
}
