// ============================================================================
// lumen - Lifecycle
// Stage machine, tiered hooks, component instances, and plugins
// ============================================================================

pub mod hooks;
pub mod instance;
pub mod plugin;
pub mod stage;

pub use hooks::{
    async_hook, hook, phases, try_hook, AllowAll, CapabilityGateway, HookHandler, HookPayload,
    HookRegistry, StaticGateway, Tier,
};
pub use instance::{
    instance_serial, ComponentId, ComponentInstance, ComponentRegistry, DestroyedInfo,
    RenderScope,
};
pub use plugin::{MetadataRegistry, Plugin, PluginContext, PluginRegistry};
pub use stage::{can_transition, transition, LifecycleError, Stage};
