//! The CLI front end
//!
//! Bridges the process argument vector to command dispatch. Parsing happens
//! in two passes: a preliminary pass that recognizes only the global flags
//! (it cannot fail on an unknown command name, since the command set is not
//! known before the config source is loaded), then a full parse against a
//! parser assembled from the registry, one subcommand per registered
//! command.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Arg, ArgAction, ArgMatches, Parser};
use indexmap::IndexMap;
use log::debug;

use crate::args::{ArgError, Argument, Value};
use crate::command::{Command, RunError};
use crate::config_file::ConfigError;
use crate::console::{Style, format_duration};
use crate::load_config;
use crate::logger;
use crate::registry::Registry;

const ABOUT: &str = "Run commands defined in a project config file";

/// Preliminary parse: global flags only, unknown tokens ignored
#[derive(Parser, Debug)]
#[command(
    name = "chore",
    about = ABOUT,
    disable_help_flag = true,
    disable_version_flag = true,
    ignore_errors = true
)]
struct PreArgs {
    #[arg(short = 'h', long)]
    help: bool,

    #[arg(long)]
    verbose: bool,

    #[arg(long)]
    quiet: bool,

    #[arg(long, hide = true)]
    init_only: bool,

    #[arg(short = 'f', long)]
    file: Option<PathBuf>,

    #[arg(short = 'm', long)]
    module: Option<String>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    rest: Vec<String>,
}

type ModuleFn = Box<dyn Fn(&mut Registry)>;

/// The CLI front end: owns the registry, the available modules, and an
/// optional default command
pub struct Cli {
    registry: Registry,
    modules: Vec<(String, ModuleFn)>,
    startup: Option<ModuleFn>,
    default_command: Option<(String, Vec<Value>, IndexMap<String, Value>)>,
}

impl Default for Cli {
    fn default() -> Self {
        Cli::new()
    }
}

impl Cli {
    #[must_use]
    pub fn new() -> Self {
        Cli {
            registry: Registry::new(),
            modules: Vec::new(),
            startup: None,
            default_command: None,
        }
    }

    /// Register commands directly instead of loading a config file. The
    /// closure runs each time the front end loads its configuration.
    #[must_use]
    pub fn with_commands(mut self, f: impl Fn(&mut Registry) + 'static) -> Self {
        self.startup = Some(Box::new(f));
        self
    }

    /// Make a named command set available to `--module`.
    pub fn add_module(&mut self, name: &str, f: impl Fn(&mut Registry) + 'static) {
        self.modules.push((name.to_string(), Box::new(f)));
    }

    /// Command to run when argv names none.
    pub fn set_default_command(
        &mut self,
        name: &str,
        positional: Vec<Value>,
        keyword: IndexMap<String, Value>,
    ) {
        self.default_command = Some((name.replace('_', "-"), positional, keyword));
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Run against the process arguments and convert to an exit status.
    pub fn main(&mut self) -> ExitCode {
        let code = self.run(std::env::args());
        ExitCode::from(u8::try_from(code).unwrap_or(1))
    }

    /// Run the full front-end protocol against an argument vector (the
    /// first element is the program name). Returns the process exit code.
    #[allow(clippy::too_many_lines)]
    pub fn run<I, S>(&mut self, argv: I) -> i32
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();

        let pre = match PreArgs::try_parse_from(&argv) {
            Ok(pre) => pre,
            Err(e) => {
                let _ = e.print();
                return 2;
            }
        };

        logger::init(logger::level_for(pre.verbose, pre.quiet));

        if let Err(e) = self.load(&pre) {
            eprintln!("Error: {e}");
            return 1;
        }

        // Comma-chained command token: the leading names run first, each
        // with no arguments; only the final name takes command arguments.
        let mut argv = argv;
        let mut preceding = Vec::new();
        if let Some(token) = pre.rest.first() {
            if token.contains(',') {
                let names: Vec<&str> = token.split(',').collect();
                for name in &names[..names.len() - 1] {
                    match self.registry.lookup(name) {
                        Ok(command) => preceding.push(command),
                        Err(e) => {
                            eprintln!("error: {e}");
                            return 2;
                        }
                    }
                }
                let last = (*names.last().expect("split is never empty")).to_string();
                if let Some(position) = argv.iter().position(|t| t == token) {
                    argv[position] = last;
                }
            }
        }

        let parser = self.build_parser();
        let matches = match parser.clone().try_get_matches_from(&argv) {
            Ok(matches) => matches,
            Err(e) => {
                use clap::error::ErrorKind;
                let code = match e.kind() {
                    ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                    _ => 2,
                };
                let _ = e.print();
                return code;
            }
        };

        let timer = Instant::now();

        if pre.help
            || matches.get_flag("help")
            || (matches.subcommand().is_none() && self.default_command.is_none())
        {
            let mut parser = parser;
            let _ = parser.print_help();
            if !pre.init_only {
                print_ok(timer.elapsed());
            }
            return 0;
        }

        if pre.init_only {
            return 0;
        }

        for command in preceding {
            if let Some(code) = report(command.invoke(&self.registry, &[], &IndexMap::new())) {
                return code;
            }
        }

        let outcome = match matches.subcommand() {
            Some((name, sub_matches)) => {
                let command = match self.registry.lookup(name) {
                    Ok(command) => command,
                    Err(e) => {
                        eprintln!("Error: {e}");
                        return 1;
                    }
                };
                match extract_values(&command, sub_matches) {
                    Ok((positional, keyword)) => {
                        command.invoke(&self.registry, &positional, &keyword)
                    }
                    Err(e) => {
                        eprintln!("error: {e}");
                        return 2;
                    }
                }
            }
            None => {
                let (name, positional, keyword) = self
                    .default_command
                    .clone()
                    .expect("checked above");
                self.registry
                    .invoke(&name, &positional, &keyword)
            }
        };

        if let Some(code) = report(outcome) {
            return code;
        }

        print_ok(timer.elapsed());
        0
    }

    /// Load the configuration source: an explicit module, an explicit file
    /// or directory, the embedded command set, or a discovered config file.
    /// The registry is cleared and repopulated on every load.
    fn load(&mut self, pre: &PreArgs) -> Result<(), CliError> {
        self.registry.clear();

        if let Some(name) = &pre.module {
            let module = self
                .modules
                .iter()
                .find(|(module_name, _)| module_name == name)
                .ok_or_else(|| CliError::UnknownModule(name.clone()))?;
            debug!("Loading module '{name}'");
            (module.1)(&mut self.registry);
            return Ok(());
        }

        if pre.file.is_none() {
            if let Some(startup) = &self.startup {
                debug!("Loading embedded commands");
                startup(&mut self.registry);
                return Ok(());
            }
        }

        let default = load_config(pre.file.as_deref(), &mut self.registry)?;
        if let Some(name) = default {
            self.default_command = Some((name, Vec::new(), IndexMap::new()));
        }
        Ok(())
    }

    /// Build the full parser: global flags plus one subcommand per
    /// registered command.
    fn build_parser(&self) -> clap::Command {
        let mut root = clap::Command::new("chore")
            .about(ABOUT)
            .disable_help_flag(true)
            .disable_version_flag(true)
            .disable_help_subcommand(true)
            .subcommand_value_name("COMMAND")
            .subcommand_help_heading("Commands")
            .arg(
                Arg::new("help")
                    .short('h')
                    .long("help")
                    .action(ArgAction::SetTrue)
                    .help("Show this help message and exit"),
            )
            .arg(
                Arg::new("verbose")
                    .long("verbose")
                    .action(ArgAction::SetTrue)
                    .help("Print detailed logging to the console"),
            )
            .arg(
                Arg::new("quiet")
                    .long("quiet")
                    .action(ArgAction::SetTrue)
                    .help("Print no logging to the console"),
            )
            .arg(
                Arg::new("init-only")
                    .long("init-only")
                    .action(ArgAction::SetTrue)
                    .hide(true),
            )
            .arg(
                Arg::new("file")
                    .short('f')
                    .long("file")
                    .value_name("FILE")
                    .help("Load commands from FILE (default '.chore.yaml')"),
            )
            .arg(
                Arg::new("module")
                    .short('m')
                    .long("module")
                    .value_name("MODULE")
                    .help("Load commands from MODULE"),
            );

        for command in self.registry.iter() {
            root = root.subcommand(build_subcommand(command));
        }

        root
    }
}

/// Convert a dispatch outcome into an exit code, reporting errors. `None`
/// means success.
fn report(outcome: Result<(), RunError>) -> Option<i32> {
    match outcome {
        Ok(()) => None,
        // A deliberate termination request bypasses the generic report
        Err(RunError::Exit(code)) => Some(code),
        Err(e) => {
            eprintln!("Error: {e}");
            Some(1)
        }
    }
}

fn print_ok(elapsed: std::time::Duration) {
    let sty = Style::new();
    eprintln!(
        "{}{}",
        sty.green("OK"),
        sty.magenta(&format!(" ({})", format_duration(elapsed)))
    );
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Module '{0}' not found")]
    UnknownModule(String),
}

fn build_subcommand(command: &Command) -> clap::Command {
    let mut sub = clap::Command::new(command.name.clone());
    if let Some(help) = &command.help {
        sub = sub.about(help.clone());
    }
    if let Some(description) = command.description.as_ref().or(command.help.as_ref()) {
        sub = sub.long_about(description.clone());
    }
    for argument in command.args.values() {
        sub = sub.arg(build_arg(argument));
    }
    sub
}

fn build_arg(argument: &Argument) -> Arg {
    let mut arg = Arg::new(argument.name.clone());

    if argument.positional {
        arg = arg.value_name(argument.metavar.clone());
        if argument.multiple {
            arg = arg.num_args(0..);
        } else if argument.default.is_null() {
            arg = arg.required(true);
        } else {
            arg = arg.required(false);
        }
        if let Some(help) = &argument.help {
            arg = arg.help(help.clone());
        }
        return arg;
    }

    arg = arg.long(argument.display_name.clone());
    if let Some(short) = argument.short_option {
        arg = arg.short(short);
    }

    let mut help = argument.help.clone();
    if !matches!(argument.default, Value::Null | Value::Bool(false)) {
        let rendered = argument.default.repr();
        help = Some(match help {
            Some(text) => format!("{text} (default {rendered})"),
            None => format!("Default value is {rendered}"),
        });
    }

    // A false default makes a presence flag; everything else takes a value
    if argument.default == Value::Bool(false) {
        arg = arg.action(ArgAction::SetTrue);
    } else {
        arg = arg
            .value_name(argument.metavar.clone())
            .action(ArgAction::Set);
    }

    if let Some(text) = help {
        arg = arg.help(text);
    }
    arg
}

fn coerce(argument: &Argument, raw: &str) -> Result<Value, ArgError> {
    match argument.ty {
        Some(ty) => ty.parse(raw, &argument.name),
        None => Ok(Value::String(raw.to_string())),
    }
}

/// Convert a parsed namespace into positional and keyword call values per
/// each argument's role.
fn extract_values(
    command: &Command,
    matches: &ArgMatches,
) -> Result<(Vec<Value>, IndexMap<String, Value>), ArgError> {
    let mut positional = Vec::new();
    let mut keyword = IndexMap::new();

    for argument in command.args.values() {
        if argument.positional {
            if argument.multiple {
                if let Some(values) = matches.get_many::<String>(&argument.name) {
                    for raw in values {
                        positional.push(coerce(argument, raw)?);
                    }
                }
            } else {
                match matches.get_one::<String>(&argument.name) {
                    Some(raw) => positional.push(coerce(argument, raw)?),
                    None => positional.push(argument.default.clone()),
                }
            }
        } else if argument.default == Value::Bool(false) {
            keyword.insert(argument.name.clone(), Value::Bool(matches.get_flag(&argument.name)));
        } else {
            let value = match matches.get_one::<String>(&argument.name) {
                Some(raw) => coerce(argument, raw)?,
                None => argument.default.clone(),
            };
            keyword.insert(argument.name.clone(), value);
        }
    }

    Ok((positional, keyword))
}
