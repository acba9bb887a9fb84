// ============================================================================
// lumen - Plugins
// Host extensions wired in at app construction
// ============================================================================

use serde_json::Value;
use std::collections::HashMap;
use std::rc::Rc;

use super::hooks::{CapabilityGateway, HookRegistry};
use crate::error::CoreError;

// =============================================================================
// METADATA
// =============================================================================

/// Side table of metadata entries, keyed by owner and entry name.
///
/// Plugins and hosts attach auxiliary data here instead of decorating
/// component types in place.
#[derive(Default)]
pub struct MetadataRegistry {
    entries: HashMap<(String, String), Value>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, owner: impl Into<String>, key: impl Into<String>, value: Value) {
        self.entries.insert((owner.into(), key.into()), value);
    }

    pub fn get(&self, owner: &str, key: &str) -> Option<&Value> {
        self.entries.get(&(owner.to_string(), key.to_string()))
    }

    pub fn remove_owner(&mut self, owner: &str) {
        self.entries.retain(|(o, _), _| o != owner);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// PLUGIN TRAIT
// =============================================================================

/// What a plugin sees during initialization: the hook registry to attach
/// handlers to (scoped under the plugin's name) and the metadata side table.
pub struct PluginContext<'a> {
    pub hooks: &'a HookRegistry,
    pub metadata: &'a mut MetadataRegistry,
}

/// A host extension. Plugins declare the capabilities they need; ones the
/// gateway refuses are skipped at init with a warning rather than failing
/// the whole app.
pub trait Plugin {
    fn name(&self) -> &str;

    /// Capabilities this plugin requires. All must be granted for `init` to
    /// run.
    fn required_capabilities(&self) -> Vec<String> {
        Vec::new()
    }

    fn init(&mut self, ctx: &mut PluginContext<'_>) -> Result<(), CoreError>;

    fn teardown(&mut self) {}

    /// Optional service value exposed to the host by name.
    fn service(&self) -> Option<Value> {
        None
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Initialization-ordered plugin set.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
    /// Names that passed capability checks and initialized.
    active: Vec<String>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active.iter().any(|n| n == name)
    }

    /// Initialize every registered plugin in registration order. A plugin
    /// missing a required capability is skipped with a warning; an init
    /// error fails the call.
    pub fn init_all(
        &mut self,
        gateway: &Rc<dyn CapabilityGateway>,
        hooks: &HookRegistry,
        metadata: &mut MetadataRegistry,
    ) -> Result<(), CoreError> {
        for plugin in &mut self.plugins {
            let name = plugin.name().to_string();
            let missing: Vec<String> = plugin
                .required_capabilities()
                .into_iter()
                .filter(|cap| !gateway.grants(&name, cap))
                .collect();
            if !missing.is_empty() {
                tracing::warn!(plugin = %name, ?missing, "plugin skipped: capability not granted");
                continue;
            }
            let mut ctx = PluginContext { hooks, metadata };
            plugin.init(&mut ctx).map_err(|source| CoreError::Plugin {
                name: name.clone(),
                message: source.to_string(),
            })?;
            tracing::debug!(plugin = %name, "plugin initialized");
            self.active.push(name);
        }
        Ok(())
    }

    /// Tear down active plugins in reverse initialization order. Each
    /// plugin's scoped hooks are removed with it.
    pub fn teardown_all(&mut self, hooks: &HookRegistry, metadata: &mut MetadataRegistry) {
        for name in self.active.drain(..).rev().collect::<Vec<_>>() {
            if let Some(plugin) = self.plugins.iter_mut().find(|p| p.name() == name) {
                plugin.teardown();
            }
            hooks.remove_scope(&name);
            metadata.remove_owner(&name);
        }
    }

    /// Service value exposed by an active plugin.
    pub fn service(&self, name: &str) -> Option<Value> {
        if !self.is_active(name) {
            return None;
        }
        self.plugins
            .iter()
            .find(|p| p.name() == name)
            .and_then(|p| p.service())
    }
}

// =============================================================================
// TESTS
// =============================================================================
