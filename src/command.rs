//! Bound commands and the dispatch protocol
//!
//! A [`Command`] wraps a function with the argument collection derived from
//! its declared parameter list. Invoking a command resolves the current
//! registry entry for its name (so a re-registered command wins over a stale
//! reference), pushes it onto the running-commands stack, renders a
//! diagnostic trace line, runs the extended command first when one is
//! declared, and finally calls the wrapped function with values re-assembled
//! according to each parameter's kind.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use log::debug;
use thiserror::Error;

use crate::args::{ArgError, Argument, Param, ParamKind, Value, introspect};
use crate::console::Style;
use crate::registry::{Registry, RegistryError};

/// Errors surfaced while dispatching or running a command
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Arg(#[from] ArgError),
    #[error("Missing value for argument '{name}' of command '{command}'")]
    MissingArgument { command: String, name: String },
    #[error("Unknown placeholder '{{{name}}}' in command '{command}'")]
    UnknownPlaceholder { command: String, name: String },
    #[error("Command '{command}' exited with code {code}")]
    Process { command: String, code: i32 },
    #[error("{0}")]
    Failed(String),
    /// A deliberate process-termination request from a command body. The
    /// front end exits with this code without the generic error report.
    #[error("exit {0}")]
    Exit(i32),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type CommandFn = Rc<dyn Fn(&Context<'_>) -> Result<(), RunError>>;

/// The value environment a command body runs in
pub struct Context<'a> {
    registry: &'a Registry,
    command: String,
    values: IndexMap<String, Value>,
}

impl<'a> Context<'a> {
    /// Look up a parameter's resolved value.
    ///
    /// # Errors
    ///
    /// Returns `RunError::MissingArgument` for a name that is not one of the
    /// command's parameters.
    pub fn get(&self, name: &str) -> Result<&Value, RunError> {
        self.values.get(name).ok_or_else(|| RunError::MissingArgument {
            command: self.command.clone(),
            name: name.to_string(),
        })
    }

    /// # Errors
    ///
    /// Fails when the parameter is unknown or does not hold a string.
    pub fn get_str(&self, name: &str) -> Result<&str, RunError> {
        match self.get(name)? {
            Value::String(s) => Ok(s),
            other => Err(RunError::Failed(format!(
                "Argument '{name}' is not a string: {}",
                other.repr()
            ))),
        }
    }

    /// # Errors
    ///
    /// Fails when the parameter is unknown or does not hold a boolean.
    pub fn get_bool(&self, name: &str) -> Result<bool, RunError> {
        match self.get(name)? {
            Value::Bool(b) => Ok(*b),
            other => Err(RunError::Failed(format!(
                "Argument '{name}' is not a boolean: {}",
                other.repr()
            ))),
        }
    }

    /// # Errors
    ///
    /// Fails when the parameter is unknown or does not hold an integer.
    pub fn get_int(&self, name: &str) -> Result<i64, RunError> {
        match self.get(name)? {
            Value::Int(n) => Ok(*n),
            other => Err(RunError::Failed(format!(
                "Argument '{name}' is not an integer: {}",
                other.repr()
            ))),
        }
    }

    /// # Errors
    ///
    /// Fails when the parameter is unknown or does not hold a list.
    pub fn get_list(&self, name: &str) -> Result<&[Value], RunError> {
        match self.get(name)? {
            Value::List(items) => Ok(items),
            other => Err(RunError::Failed(format!(
                "Argument '{name}' is not a list: {}",
                other.repr()
            ))),
        }
    }

    /// Iterate the resolved parameter values in declaration order.
    pub fn values(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Invoke another command through the registry, zero-argument.
    ///
    /// # Errors
    ///
    /// Propagates any dispatch or command-body error unchanged.
    pub fn invoke(&self, name: &str) -> Result<(), RunError> {
        self.registry.invoke(name, &[], &IndexMap::new())
    }

    /// Invoke another command through the registry with arguments.
    ///
    /// # Errors
    ///
    /// Propagates any dispatch or command-body error unchanged.
    pub fn invoke_with(
        &self,
        name: &str,
        positional: &[Value],
        keyword: &IndexMap<String, Value>,
    ) -> Result<(), RunError> {
        self.registry.invoke(name, positional, keyword)
    }

    #[must_use]
    pub fn registry(&self) -> &'a Registry {
        self.registry
    }
}

/// Help text applied to conventionally named commands that declare none
fn stock_help(name: &str) -> Option<&'static str> {
    match name {
        "build" => Some("Build artifacts from source"),
        "clean" => Some("Clean up the source tree"),
        "dist" => Some("Generate distribution artifacts"),
        "install" => Some("Install the built artifacts on your system"),
        "test" => Some("Run the tests"),
        _ => None,
    }
}

/// A registered, CLI-invokable wrapper around a function
#[derive(Clone)]
pub struct Command {
    pub name: String,
    pub help: Option<String>,
    pub description: Option<String>,
    /// The function's own formal parameter list
    pub params: Vec<Param>,
    /// The CLI surface, derived at bind time (inherited verbatim from the
    /// base when `extends` is set)
    pub args: IndexMap<String, Argument>,
    pub extends: Option<Rc<Command>>,
    function: CommandFn,
    overrides: Vec<Argument>,
    bound: bool,
}

impl Command {
    /// Create a command wrapping `function`. Underscores in the name are
    /// normalized to hyphens.
    pub fn new(
        name: &str,
        function: impl Fn(&Context<'_>) -> Result<(), RunError> + 'static,
    ) -> Self {
        Command {
            name: name.replace('_', "-"),
            help: None,
            description: None,
            params: Vec::new(),
            args: IndexMap::new(),
            extends: None,
            function: Rc::new(function),
            overrides: Vec::new(),
            bound: false,
        }
    }

    #[must_use]
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Supply explicit metadata for one of the declared parameters.
    #[must_use]
    pub fn arg(mut self, argument: Argument) -> Self {
        self.overrides.push(argument);
        self
    }

    #[must_use]
    pub fn with_help(mut self, help: &str) -> Self {
        self.help = Some(help.to_string());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Declare that this command extends `base`: the base runs first on every
    /// invocation, and this command's CLI surface is the base's, inherited
    /// verbatim.
    #[must_use]
    pub fn extends(mut self, base: &Rc<Command>) -> Self {
        self.extends = Some(base.clone());
        self
    }

    /// Derive the argument collection. Called once at registration.
    pub(crate) fn bind(&mut self) {
        if self.bound {
            return;
        }
        self.bound = true;

        if let Some(base) = &self.extends {
            self.args = base.args.clone();
            if self.help.is_none() {
                self.help = base.help.clone();
            }
            if self.description.is_none() {
                self.description = base.description.clone();
            }
        } else {
            self.args = introspect(&self.params, &self.overrides);
            if self.help.is_none() {
                self.help = stock_help(&self.name).map(str::to_string);
            }
        }

        debug!("Defining {self}");
        for arg in self.args.values() {
            debug!("  {arg}");
        }
    }

    /// Run the full dispatch protocol for this command.
    ///
    /// # Errors
    ///
    /// Any error from the wrapped function (or the extended command)
    /// propagates unchanged. The running-commands stack is restored to its
    /// pre-call depth on every path.
    pub fn invoke(
        self: Rc<Self>,
        registry: &Registry,
        positional: &[Value],
        keyword: &IndexMap<String, Value>,
    ) -> Result<(), RunError> {
        // A re-registration under this name displaces us; delegate to the
        // current entry.
        let current = registry.lookup(&self.name)?;
        if !Rc::ptr_eq(&current, &self) {
            return current.invoke(registry, positional, keyword);
        }

        self.dispatch(registry, positional, keyword)
    }

    /// Dispatch this object regardless of what the registry currently maps
    /// the name to. The extends chain comes through here: a base linked
    /// under the same name as its extension must not resolve back to the
    /// extension.
    fn dispatch(
        &self,
        registry: &Registry,
        positional: &[Value],
        keyword: &IndexMap<String, Value>,
    ) -> Result<(), RunError> {
        debug!("Running {self}");

        let guard = registry.push_running(&self.name);
        let depth = registry.running_depth();
        let dashes = "--".repeat(depth);
        let sty = Style::new();

        let display = self.display_args(positional, keyword);
        let mut line = format!("{dashes}> {}", self.name);
        if !display.is_empty() {
            line.push_str(&format!(" ({})", display.join(", ")));
        }
        eprintln!("{}", sty.magenta(&line));

        let result = self.run_body(registry, positional, keyword);

        match result {
            Ok(()) => {
                eprintln!("{}", sty.magenta(&format!("<{dashes} {}", self.name)));
                drop(guard);
                if let Some(top) = registry.running_top() {
                    let resumed = format!("{}| {top}", "--".repeat(depth - 1));
                    eprintln!("{}", sty.magenta(&resumed));
                }
                Ok(())
            }
            // The guard pops the stack when it drops here
            Err(e) => Err(e),
        }
    }

    fn run_body(
        &self,
        registry: &Registry,
        positional: &[Value],
        keyword: &IndexMap<String, Value>,
    ) -> Result<(), RunError> {
        if let Some(base) = &self.extends {
            let (base_positional, base_keyword) = base.accepted_args(positional, keyword);
            base.dispatch(registry, &base_positional, &base_keyword)?;
        }

        let ctx = self.call_context(registry, positional, keyword)?;
        (self.function)(&ctx)
    }

    /// Render the non-default argument values for the diagnostic trace line.
    fn display_args(&self, positional: &[Value], keyword: &IndexMap<String, Value>) -> Vec<String> {
        let mut out = Vec::new();
        let mut index = 0usize;

        for arg in self.args.values() {
            if arg.positional {
                if arg.multiple {
                    for value in positional.iter().skip(index) {
                        out.push(value.repr());
                    }
                } else {
                    if let Some(value) = positional.get(index) {
                        if arg.default.is_null() || *value != arg.default {
                            out.push(value.repr());
                        }
                    }
                    index += 1;
                }
            } else {
                let value = keyword.get(&arg.name).unwrap_or(&arg.default);
                if *value == arg.default {
                    continue;
                }
                out.push(format!("{}={}", arg.display_name, value.repr()));
            }
        }

        out
    }

    /// Select the subset of incoming arguments this command's own parameter
    /// list accepts: positional values by index, keyword values by name.
    fn accepted_args(
        &self,
        positional: &[Value],
        keyword: &IndexMap<String, Value>,
    ) -> (Vec<Value>, IndexMap<String, Value>) {
        let mut accepted_positional = Vec::new();
        let mut accepted_keyword = IndexMap::new();
        let mut index = 0usize;

        for param in &self.params {
            match &param.kind {
                ParamKind::Required | ParamKind::Optional(_) => {
                    if let Some(value) = positional.get(index) {
                        accepted_positional.push(value.clone());
                    }
                    index += 1;
                }
                ParamKind::Rest => {
                    accepted_positional.extend(positional.iter().skip(index).cloned());
                }
                ParamKind::Keyword(_) => {
                    if let Some(value) = keyword.get(&param.name) {
                        accepted_keyword.insert(param.name.clone(), value.clone());
                    }
                }
            }
        }

        (accepted_positional, accepted_keyword)
    }

    /// Re-assemble call values according to each parameter's kind.
    fn call_context<'a>(
        &self,
        registry: &'a Registry,
        positional: &[Value],
        keyword: &IndexMap<String, Value>,
    ) -> Result<Context<'a>, RunError> {
        let mut values = IndexMap::new();
        let mut index = 0usize;

        for param in &self.params {
            let value = match &param.kind {
                ParamKind::Required => {
                    let value = positional.get(index).cloned().ok_or_else(|| {
                        RunError::MissingArgument {
                            command: self.name.clone(),
                            name: param.name.clone(),
                        }
                    })?;
                    index += 1;
                    value
                }
                ParamKind::Optional(default) => {
                    let value = positional.get(index).cloned().unwrap_or_else(|| default.clone());
                    index += 1;
                    value
                }
                ParamKind::Rest => Value::List(positional.iter().skip(index).cloned().collect()),
                ParamKind::Keyword(default) => keyword
                    .get(&param.name)
                    .cloned()
                    .unwrap_or_else(|| default.clone()),
            };
            values.insert(param.name.clone(), value);
        }

        Ok(Context {
            registry,
            command: self.name.clone(),
            values,
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "command '{}'", self.name)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("args", &self.args.keys().collect::<Vec<_>>())
            .field("extends", &self.extends.as_ref().map(|b| &b.name))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::registry::Registry;

    fn noop() -> impl Fn(&Context<'_>) -> Result<(), RunError> {
        |_ctx| Ok(())
    }

    #[test]
    fn test_name_normalization() {
        let cmd = Command::new("run_tests", noop());
        assert_eq!(cmd.name, "run-tests");
    }

    #[test]
    fn test_display_args_skips_defaults() {
        let mut registry = Registry::new();
        let cmd = registry.register(
            Command::new("greet", noop())
                .param(Param::required("name"))
                .param(Param::keyword("excited", false)),
        );

        let mut keyword = IndexMap::new();
        keyword.insert("excited".to_string(), Value::Bool(true));
        let shown = cmd.display_args(&[Value::from("World")], &keyword);
        assert_eq!(shown, ["'World'", "excited=true"]);

        let shown = cmd.display_args(&[Value::from("World")], &IndexMap::new());
        assert_eq!(shown, ["'World'"]);
    }

    #[test]
    fn test_display_args_variadic_tail() {
        let mut registry = Registry::new();
        let cmd = registry.register(
            Command::new("archive", noop())
                .param(Param::required("dest"))
                .param(Param::rest("sources")),
        );

        let shown = cmd.display_args(
            &[Value::from("out.tar"), Value::from("a"), Value::from("b")],
            &IndexMap::new(),
        );
        assert_eq!(shown, ["'out.tar'", "'a'", "'b'"]);
    }

    #[test]
    fn test_dispatch_calls_function_with_resolved_values() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();

        let mut registry = Registry::new();
        registry.register(
            Command::new("greet", move |ctx| {
                log.borrow_mut().push(format!(
                    "{}:{}",
                    ctx.get_str("name")?,
                    ctx.get_bool("excited")?
                ));
                Ok(())
            })
            .param(Param::required("name"))
            .param(Param::keyword("excited", false)),
        );

        registry
            .invoke("greet", &[Value::from("World")], &IndexMap::new())
            .unwrap();
        let mut keyword = IndexMap::new();
        keyword.insert("excited".to_string(), Value::Bool(true));
        registry
            .invoke("greet", &[Value::from("World")], &keyword)
            .unwrap();

        assert_eq!(*seen.borrow(), ["World:false", "World:true"]);
    }

    #[test]
    fn test_stack_depth_restored_after_failure() {
        let mut registry = Registry::new();
        registry.register(Command::new("broken", |_ctx| {
            Err(RunError::Failed("boom".to_string()))
        }));

        assert_eq!(registry.running_depth(), 0);
        let result = registry.invoke("broken", &[], &IndexMap::new());
        assert!(result.is_err());
        assert_eq!(registry.running_depth(), 0);
    }

    #[test]
    fn test_extends_runs_base_first_with_subset() {
        let order = Rc::new(RefCell::new(Vec::new()));

        let base_log = order.clone();
        let mut registry = Registry::new();
        let build = registry.register(
            Command::new("build", move |ctx| {
                base_log
                    .borrow_mut()
                    .push(format!("build:{}", ctx.get_bool("verbose")?));
                Ok(())
            })
            .param(Param::keyword("verbose", false)),
        );

        let derived_log = order.clone();
        registry.register(
            Command::new("test", move |_ctx| {
                derived_log.borrow_mut().push("test".to_string());
                Ok(())
            })
            .extends(&build),
        );

        let mut keyword = IndexMap::new();
        keyword.insert("verbose".to_string(), Value::Bool(true));
        registry.invoke("test", &[], &keyword).unwrap();

        assert_eq!(*order.borrow(), ["build:true", "test"]);
    }

    #[test]
    fn test_extends_inherits_args_verbatim() {
        let mut registry = Registry::new();
        let build = registry.register(
            Command::new("build", noop())
                .param(Param::keyword("jobs", 2))
                .with_help("Compile everything"),
        );
        let test = registry.register(Command::new("test", noop()).extends(&build));

        assert_eq!(
            test.args.keys().collect::<Vec<_>>(),
            build.args.keys().collect::<Vec<_>>()
        );
        assert_eq!(test.help.as_deref(), Some("Compile everything"));
    }

    #[test]
    fn test_stale_reference_delegates_to_current_entry() {
        let mut registry = Registry::new();
        let old = registry.register(Command::new("job", |_ctx| {
            Err(RunError::Failed("old body must not run".to_string()))
        }));

        let ran = Rc::new(RefCell::new(false));
        let flag = ran.clone();
        registry.register(Command::new("job", move |_ctx| {
            *flag.borrow_mut() = true;
            Ok(())
        }));

        old.invoke(&registry, &[], &IndexMap::new()).unwrap();
        assert!(*ran.borrow());
    }

    #[test]
    fn test_extending_under_the_same_name_augments_it() {
        // Extending an existing command under its own name layers a new
        // body over the old one without looping back through the registry
        let order = Rc::new(RefCell::new(Vec::new()));

        let mut registry = Registry::new();
        let original_log = order.clone();
        let original = registry.register(Command::new("build", move |_ctx| {
            original_log.borrow_mut().push("original");
            Ok(())
        }));

        let extension_log = order.clone();
        registry.register(
            Command::new("build", move |_ctx| {
                extension_log.borrow_mut().push("extension");
                Ok(())
            })
            .extends(&original),
        );

        registry.invoke("build", &[], &IndexMap::new()).unwrap();
        assert_eq!(*order.borrow(), ["original", "extension"]);
        assert_eq!(registry.running_depth(), 0);
    }

    #[test]
    fn test_missing_required_argument() {
        let mut registry = Registry::new();
        registry.register(Command::new("copy", noop()).param(Param::required("source")));

        let result = registry.invoke("copy", &[], &IndexMap::new());
        match result {
            Err(RunError::MissingArgument { command, name }) => {
                assert_eq!(command, "copy");
                assert_eq!(name, "source");
            }
            other => panic!("Expected MissingArgument, got: {other:?}"),
        }
    }

    #[test]
    fn test_stock_help_applied() {
        let mut registry = Registry::new();
        let cmd = registry.register(Command::new("clean", noop()));
        assert_eq!(cmd.help.as_deref(), Some("Clean up the source tree"));
    }
}
