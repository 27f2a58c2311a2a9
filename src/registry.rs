//! The command registry and the running-commands stack
//!
//! A registry is an ordered name→command mapping owned by one CLI front end.
//! Iteration order is the insertion order of the current entries: a command
//! re-registered under an existing name replaces the old one and takes the
//! position of the new registration. The registry also owns the stack of
//! currently-running commands used for nesting diagnostics; dispatch is
//! single-threaded, so the stack needs no locking.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::args::Value;
use crate::command::{Command, RunError};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Command '{0}' is unknown")]
    UnknownCommand(String),
}

#[derive(Default)]
pub struct Registry {
    commands: IndexMap<String, Rc<Command>>,
    running: RefCell<Vec<String>>,
}

/// Pops the running-commands stack when dropped, so the stack depth never
/// leaks across a failing call.
pub(crate) struct RunningGuard<'a> {
    registry: &'a Registry,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.registry.running.borrow_mut().pop();
    }
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Registry::default()
    }

    /// Bind and insert a command, replacing any existing entry with the same
    /// name. The replaced entry's position is not kept: the command iterates
    /// at the position of this registration. A command that extends another
    /// also attaches its base chain.
    pub fn register(&mut self, mut command: Command) -> Rc<Command> {
        command.bind();
        let command = Rc::new(command);
        self.attach(&command);
        command
    }

    fn attach(&mut self, command: &Rc<Command>) {
        if let Some(base) = &command.extends {
            self.attach(base);
        }
        // Re-attaching the object already registered under this name keeps
        // its position; anything else is a fresh registration.
        if let Some(existing) = self.commands.get(&command.name) {
            if Rc::ptr_eq(existing, command) {
                return;
            }
        }
        self.commands.shift_remove(&command.name);
        self.commands.insert(command.name.clone(), command.clone());
    }

    /// # Errors
    ///
    /// Returns `RegistryError::UnknownCommand` when no command has this name.
    pub fn lookup(&self, name: &str) -> Result<Rc<Command>, RegistryError> {
        self.commands
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownCommand(name.to_string()))
    }

    /// Delete an entry, e.g. to suppress a command imported from a shared
    /// toolkit.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::UnknownCommand` when no command has this name.
    pub fn remove(&mut self, name: &str) -> Result<Rc<Command>, RegistryError> {
        self.commands
            .shift_remove(name)
            .ok_or_else(|| RegistryError::UnknownCommand(name.to_string()))
    }

    /// Copy a command defined in another registry into this one, optionally
    /// under a new local name.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::UnknownCommand` when the source registry has
    /// no command named `exported`.
    pub fn import(
        &mut self,
        source: &Registry,
        exported: &str,
        local: Option<&str>,
    ) -> Result<Rc<Command>, RegistryError> {
        let command = source.lookup(exported)?;
        let mut copy = (*command).clone();
        copy.name = local.unwrap_or(exported).replace('_', "-");
        Ok(self.register(copy))
    }

    /// Dispatch by name with the full invocation protocol.
    ///
    /// # Errors
    ///
    /// Fails when the name is unknown; otherwise propagates whatever the
    /// command body raises.
    pub fn invoke(
        &self,
        name: &str,
        positional: &[Value],
        keyword: &IndexMap<String, Value>,
    ) -> Result<(), RunError> {
        let command = self.lookup(name)?;
        command.invoke(self, positional, keyword)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<Command>> {
        self.commands.values()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub(crate) fn push_running(&self, name: &str) -> RunningGuard<'_> {
        self.running.borrow_mut().push(name.to_string());
        RunningGuard { registry: self }
    }

    /// Current nesting depth of command dispatch.
    #[must_use]
    pub fn running_depth(&self) -> usize {
        self.running.borrow().len()
    }

    /// Name of the innermost running command, if any.
    #[must_use]
    pub fn running_top(&self) -> Option<String> {
        self.running.borrow().last().cloned()
    }
}
