//! Command registry: verb to module ownership, and the module cache.
//!
//! Verbs are learned from the [`Loader`] manifest when the [`Table`] is
//! built. Modules themselves are loaded on first use and cached for the life
//! of the table, which is shared by every handler through the kernel.

use crate::app::event::Event;
use crate::app::handler::Handler;
use crate::error::{CommandError, LoadError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub type Command = Arc<dyn Fn(&Handler, &Event) -> Result<(), CommandError> + Send + Sync>;

/// A loaded group of commands.
#[derive(Clone)]
pub struct Module {
    pub name: String,
    pub commands: HashMap<String, Command>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            commands: HashMap::new(),
        }
    }

    pub fn with<F>(mut self, verb: &str, func: F) -> Self
    where
        F: Fn(&Handler, &Event) -> Result<(), CommandError> + Send + Sync + 'static,
    {
        self.commands.insert(verb.to_string(), Arc::new(func));
        self
    }
}

/// Discovers and loads command modules.
pub trait Loader: Send + Sync {
    /// `(verb, module)` pairs for every command this loader can provide.
    fn manifest(&self) -> Vec<(String, String)>;

    fn load(&self, name: &str) -> Result<Module, LoadError>;
}

pub struct Table {
    loader: Box<dyn Loader>,
    owners: RwLock<HashMap<String, String>>,
    // The mutex doubles as the load lock: only one first-use load runs at a time.
    modules: tokio::sync::Mutex<HashMap<String, Arc<Module>>>,
}

impl Table {
    pub fn new(loader: impl Loader + 'static) -> Self {
        let owners: HashMap<String, String> = loader.manifest().into_iter().collect();
        info!(verbs = owners.len(), "command table scanned");
        Self {
            loader: Box::new(loader),
            owners: RwLock::new(owners),
            modules: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Claim `verb` for `module`. Last writer wins.
    fn introduce(&self, verb: &str, module: &str) {
        self.owners
            .write()
            .insert(verb.to_string(), module.to_string());
    }

    pub fn owner(&self, verb: &str) -> Option<String> {
        self.owners.read().get(verb).cloned()
    }

    fn verbs_of(&self, module: &str) -> Vec<String> {
        self.owners
            .read()
            .iter()
            .filter(|(_, owner)| owner.as_str() == module)
            .map(|(verb, _)| verb.clone())
            .collect()
    }

    pub fn verbs(&self) -> Vec<String> {
        let mut verbs: Vec<String> = self.owners.read().keys().cloned().collect();
        verbs.sort();
        verbs
    }

    /// Load `name`, or return the cached copy if it was loaded before.
    pub async fn load(&self, name: &str) -> Result<Arc<Module>, LoadError> {
        let mut modules = self.modules.lock().await;
        if let Some(module) = modules.get(name) {
            return Ok(module.clone());
        }
        let module = self.loader.load(name)?;
        if let Some(verb) = self
            .verbs_of(name)
            .into_iter()
            .find(|verb| !module.commands.contains_key(verb))
        {
            return Err(LoadError::Failed {
                name: name.to_string(),
                reason: format!("does not provide {verb}"),
            });
        }
        // Extra verbs a module exports are claimed if nobody owns them yet.
        for verb in module.commands.keys() {
            if self.owner(verb).is_none() {
                self.introduce(verb, name);
            }
        }
        let module = Arc::new(module);
        info!(module = %name, commands = module.commands.len(), "loaded command module");
        modules.insert(name.to_string(), module.clone());
        Ok(module)
    }
}
