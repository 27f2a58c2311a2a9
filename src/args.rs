//! Argument model and signature introspection
//!
//! A command's CLI surface is derived from its declared parameter list. Each
//! [`Param`] describes one formal parameter (name plus kind); [`introspect`]
//! turns an ordered parameter list, merged with any partially-specified
//! [`Argument`] overrides from the command author, into the final ordered
//! argument collection the CLI front end builds its parser from.

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

/// Errors produced when coercing a raw CLI token into a typed value
#[derive(Error, Debug)]
pub enum ArgError {
    #[error("Invalid {ty} value '{raw}' for argument '{name}'")]
    Invalid {
        ty: &'static str,
        raw: String,
        name: String,
    },
}

/// A dynamically typed argument value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render for diagnostic output: strings quoted, booleans lower-cased.
    #[must_use]
    pub fn repr(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(n) => n.to_string(),
            Value::String(s) => format!("'{s}'"),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", inner.join(", "))
            }
        }
    }

    /// Render for substitution into a shell template: strings bare, lists
    /// space-joined, null empty.
    #[must_use]
    pub fn bare(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(n) => n.to_string(),
            Value::String(s) => s.clone(),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::bare).collect();
                inner.join(" ")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// Value-coercion type for an argument that takes a raw CLI token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Bool,
    Int,
    Float,
    String,
}

impl ArgType {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ArgType::Bool => "boolean",
            ArgType::Int => "integer",
            ArgType::Float => "float",
            ArgType::String => "string",
        }
    }

    /// Infer the coercion type from a default value's runtime type.
    #[must_use]
    pub fn of(value: &Value) -> Option<ArgType> {
        match value {
            Value::Bool(_) => Some(ArgType::Bool),
            Value::Int(_) => Some(ArgType::Int),
            Value::Float(_) => Some(ArgType::Float),
            Value::String(_) => Some(ArgType::String),
            Value::Null | Value::List(_) => None,
        }
    }

    /// Coerce a raw CLI token.
    ///
    /// # Errors
    ///
    /// Returns `ArgError::Invalid` when the token does not parse as this type.
    pub fn parse(self, raw: &str, name: &str) -> Result<Value, ArgError> {
        let invalid = || ArgError::Invalid {
            ty: self.name(),
            raw: raw.to_string(),
            name: name.to_string(),
        };
        match self {
            ArgType::String => Ok(Value::String(raw.to_string())),
            ArgType::Int => raw.parse::<i64>().map(Value::Int).map_err(|_| invalid()),
            ArgType::Float => raw.parse::<f64>().map(Value::Float).map_err(|_| invalid()),
            ArgType::Bool => match raw.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "0" => Ok(Value::Bool(false)),
                _ => Err(invalid()),
            },
        }
    }
}

/// One formal parameter's CLI-facing descriptor
#[derive(Debug, Clone)]
pub struct Argument {
    pub name: String,
    /// Hyphenated form used for `--flag` rendering
    pub display_name: String,
    pub ty: Option<ArgType>,
    pub metavar: String,
    pub help: Option<String>,
    pub short_option: Option<char>,
    /// `Value::Null` means no default
    pub default: Value,
    pub positional: bool,
    pub optional: bool,
    pub multiple: bool,
}

impl Argument {
    #[must_use]
    pub fn new(name: &str) -> Self {
        let display_name = name.replace('_', "-");
        let metavar = display_name.to_uppercase();
        Argument {
            name: name.to_string(),
            display_name,
            ty: None,
            metavar,
            help: None,
            short_option: None,
            default: Value::Null,
            positional: false,
            optional: false,
            multiple: false,
        }
    }

    #[must_use]
    pub fn help(mut self, help: &str) -> Self {
        self.help = Some(help.to_string());
        self
    }

    #[must_use]
    pub fn short(mut self, short: char) -> Self {
        self.short_option = Some(short);
        self
    }

    #[must_use]
    pub fn metavar(mut self, metavar: &str) -> Self {
        self.metavar = metavar.to_string();
        self
    }

    #[must_use]
    pub fn typed(mut self, ty: ArgType) -> Self {
        self.ty = Some(ty);
        self
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "argument '{}' (default {})", self.name, self.default.repr())
    }
}

/// The kind of one formal parameter, in place of runtime signature reflection
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    /// Positional, no default
    Required,
    /// Positional with a default
    Optional(Value),
    /// Variadic tail, collects remaining positional values
    Rest,
    /// Keyword-only with a default
    Keyword(Value),
}

/// One formal parameter of a command function
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
}

impl Param {
    #[must_use]
    pub fn required(name: &str) -> Self {
        Param {
            name: name.to_string(),
            kind: ParamKind::Required,
        }
    }

    #[must_use]
    pub fn optional(name: &str, default: impl Into<Value>) -> Self {
        Param {
            name: name.to_string(),
            kind: ParamKind::Optional(default.into()),
        }
    }

    #[must_use]
    pub fn rest(name: &str) -> Self {
        Param {
            name: name.to_string(),
            kind: ParamKind::Rest,
        }
    }

    #[must_use]
    pub fn keyword(name: &str, default: impl Into<Value>) -> Self {
        Param {
            name: name.to_string(),
            kind: ParamKind::Keyword(default.into()),
        }
    }
}

/// Derive the ordered argument collection for a parameter list.
///
/// Overrides are matched by name and used as the starting point for the
/// corresponding parameter's argument. The coercion type is inferred from the
/// default's runtime type when not explicit, except for a `false` default:
/// that stays untyped so the argument becomes a presence flag rather than a
/// valued one.
#[must_use]
pub fn introspect(params: &[Param], overrides: &[Argument]) -> IndexMap<String, Argument> {
    let mut supplied: IndexMap<&str, &Argument> =
        overrides.iter().map(|a| (a.name.as_str(), a)).collect();
    let mut out = IndexMap::new();

    for param in params {
        let mut arg = supplied
            .shift_remove(param.name.as_str())
            .cloned()
            .unwrap_or_else(|| Argument::new(&param.name));

        match &param.kind {
            ParamKind::Required => arg.positional = true,
            ParamKind::Optional(default) => {
                arg.positional = true;
                arg.default = default.clone();
            }
            ParamKind::Rest => {
                arg.positional = true;
                arg.multiple = true;
            }
            ParamKind::Keyword(default) => {
                arg.optional = true;
                arg.default = default.clone();
            }
        }

        if arg.ty.is_none() && !matches!(arg.default, Value::Null | Value::Bool(false)) {
            arg.ty = ArgType::of(&arg.default);
        }

        out.insert(arg.name.clone(), arg);
    }

    out
}
