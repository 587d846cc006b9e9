//! Installation of the binding surface into a runtime

use std::sync::Arc;

use kiln_sdk::{BridgeResult, ScriptContext, ScriptValue};
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::audio::{self, AudioHost};
use crate::config::{BridgeConfig, ConfigError};
use crate::json;
use crate::namespace::Namespace;
use crate::net::{self, IntelProvider, StaticIntelProvider};
use crate::reader;
use crate::vector;

/// Binding set ready to be installed into any number of runtimes.
///
/// Dispatch tables and the function tree are built on first install and
/// reused afterwards; each runtime gets its own tables and metatables.
pub struct Bindings {
    config: BridgeConfig,
    intel: Arc<dyn IntelProvider>,
    audio: Arc<AudioHost>,
    tree: OnceCell<Namespace>,
}

impl Bindings {
    /// Bindings with the default configuration and an empty intel dataset
    pub fn new() -> Self {
        let config = BridgeConfig::default();
        let audio = Arc::new(AudioHost::from_config(&config.audio));
        Self {
            config,
            intel: Arc::new(StaticIntelProvider::empty()),
            audio,
            tree: OnceCell::new(),
        }
    }

    /// Bindings for a validated configuration.
    ///
    /// Loads the intel dataset when `intel.data_path` is set.
    pub fn from_config(config: BridgeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let intel: Arc<dyn IntelProvider> = match &config.intel.data_path {
            Some(path) => Arc::new(StaticIntelProvider::from_file(path)?),
            None => Arc::new(StaticIntelProvider::empty()),
        };
        let audio = Arc::new(AudioHost::from_config(&config.audio));
        Ok(Self {
            config,
            intel,
            audio,
            tree: OnceCell::new(),
        })
    }

    /// Replace the intel provider
    pub fn with_intel_provider(mut self, intel: Arc<dyn IntelProvider>) -> Self {
        self.intel = intel;
        self.tree = OnceCell::new();
        self
    }

    /// Active configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Intel provider lookups go to
    pub fn intel_provider(&self) -> &Arc<dyn IntelProvider> {
        &self.intel
    }

    /// Audio host backing `audio.*`
    pub fn audio_host(&self) -> &Arc<AudioHost> {
        &self.audio
    }

    /// Function tree, built on first use
    pub fn namespace(&self) -> BridgeResult<&Namespace> {
        self.tree.get_or_try_init(|| self.build_tree())
    }

    fn build_tree(&self) -> BridgeResult<Namespace> {
        let root = net::register(Namespace::new(&self.config.namespace), Arc::clone(&self.intel))?;
        let tree = root
            .namespace("json", |ns| json::register(ns, &self.config.json))?
            .namespace("vector", vector::register)?
            .namespace("audio", |ns| audio::register(ns, Arc::clone(&self.audio)))?
            .namespace("io", reader::register)?;
        debug!(namespace = %self.config.namespace, "built binding tree");
        Ok(tree)
    }

    /// Install the bindings as a global table named after the configured
    /// namespace.
    ///
    /// Installing twice into the same runtime returns the table created by
    /// the first install.
    pub fn install(&self, ctx: &mut dyn ScriptContext) -> BridgeResult<ScriptValue> {
        let registry = ctx.registry();
        let globals = ctx.globals();
        let name = ScriptValue::from(self.config.namespace.as_str());
        let key = ScriptValue::from(format!("bindings:{}", self.config.namespace));

        let existing = ctx.raw_get(&registry, &key)?;
        if let ScriptValue::Table(_) = existing {
            debug!(namespace = %self.config.namespace, "bindings already installed");
            ctx.raw_set(&globals, name, existing.clone())?;
            return Ok(existing);
        }

        let table = self.namespace()?.build(ctx)?;
        ctx.raw_set(&registry, key, table.clone())?;
        ctx.raw_set(&globals, name, table.clone())?;
        debug!(namespace = %self.config.namespace, "installed bindings");
        Ok(table)
    }
}

impl Default for Bindings {
    fn default() -> Self {
        Self::new()
    }
}
