// ============================================================================
// lumen - Lifecycle Hooks
// Tiered, capability-gated handlers fired at lifecycle phases
// ============================================================================

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use crate::error::HookError;

/// Well-known lifecycle phases.
pub mod phases {
    pub const MOUNT: &str = "mount";
    pub const UPDATE: &str = "update";
    pub const DESTROY: &str = "destroy";
}

// =============================================================================
// TIERS
// =============================================================================

/// Execution tier of a hook handler. Within one phase, handlers run tier by
/// tier (`Critical` first), and in registration order inside a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Critical,
    High,
    Normal,
    Low,
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Payload delivered to every handler of a phase invocation.
#[derive(Debug, Clone)]
pub struct HookPayload {
    pub phase: String,
    /// Identity of the component the phase concerns, when there is one.
    pub component: Option<u64>,
    pub detail: Value,
}

impl HookPayload {
    pub fn new(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            component: None,
            detail: Value::Null,
        }
    }

    pub fn component(mut self, id: u64) -> Self {
        self.component = Some(id);
        self
    }

    pub fn detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

/// A hook handler. Async by shape; synchronous handlers wrap themselves in a
/// ready future via [`hook`] or [`try_hook`].
pub type HookHandler = Rc<dyn Fn(HookPayload) -> LocalBoxFuture<'static, Result<(), HookError>>>;

/// Wrap an infallible synchronous closure as a handler.
pub fn hook(f: impl Fn(HookPayload) + 'static) -> HookHandler {
    Rc::new(move |payload| {
        f(payload);
        async { Ok(()) }.boxed_local()
    })
}

/// Wrap a fallible synchronous closure as a handler.
pub fn try_hook(f: impl Fn(HookPayload) -> Result<(), HookError> + 'static) -> HookHandler {
    Rc::new(move |payload| {
        let result = f(payload);
        async move { result }.boxed_local()
    })
}

/// Wrap an async closure as a handler.
pub fn async_hook<F>(f: F) -> HookHandler
where
    F: Fn(HookPayload) -> LocalBoxFuture<'static, Result<(), HookError>> + 'static,
{
    Rc::new(f)
}

// =============================================================================
// REGISTRY
// =============================================================================

struct HookEntry {
    id: u64,
    phase: String,
    tier: Tier,
    /// Registration order within the registry; tie-break inside a tier.
    seq: u64,
    /// Owner scope, for bulk removal.
    scope: Option<String>,
    /// Handler only runs for components granted this capability.
    capability: Option<String>,
    handler: HookHandler,
}

/// Ordered, scoped registry of lifecycle hook handlers.
///
/// Cheap-clone handle over shared state. Invoking a phase snapshots the
/// matching handlers first, so handlers may register or remove hooks without
/// affecting the in-flight invocation.
#[derive(Clone, Default)]
pub struct HookRegistry {
    inner: Rc<HookRegistryInner>,
}

#[derive(Default)]
struct HookRegistryInner {
    entries: RefCell<Vec<HookEntry>>,
    next_id: Cell<u64>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a phase. Returns an id usable with
    /// [`remove_hook`](Self::remove_hook).
    pub fn add_hook(&self, phase: impl Into<String>, tier: Tier, handler: HookHandler) -> u64 {
        self.add_hook_full(phase, tier, None, None, handler)
    }

    /// Register a handler owned by a scope, removed when the scope is.
    pub fn add_hook_scoped(
        &self,
        phase: impl Into<String>,
        tier: Tier,
        scope: impl Into<String>,
        handler: HookHandler,
    ) -> u64 {
        self.add_hook_full(phase, tier, Some(scope.into()), None, handler)
    }

    /// Full registration form: optional owner scope and capability gate.
    pub fn add_hook_full(
        &self,
        phase: impl Into<String>,
        tier: Tier,
        scope: Option<String>,
        capability: Option<String>,
        handler: HookHandler,
    ) -> u64 {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner.entries.borrow_mut().push(HookEntry {
            id,
            phase: phase.into(),
            tier,
            seq: id,
            scope,
            capability,
            handler,
        });
        id
    }

    pub fn remove_hook(&self, id: u64) {
        self.inner.entries.borrow_mut().retain(|e| e.id != id);
    }

    /// Remove every hook registered under a scope.
    pub fn remove_scope(&self, scope: &str) {
        self.inner
            .entries
            .borrow_mut()
            .retain(|e| e.scope.as_deref() != Some(scope));
    }

    pub fn hook_count(&self, phase: &str) -> usize {
        self.inner
            .entries
            .borrow()
            .iter()
            .filter(|e| e.phase == phase)
            .count()
    }

    /// Invoke a phase: all matching handlers, `Critical` tier first, then in
    /// registration order within each tier, each awaited to completion before
    /// the next starts. The first failure halts the remaining handlers and
    /// surfaces as [`HookError::PhaseHalted`].
    pub fn call_hook(
        &self,
        phase: &str,
        payload: HookPayload,
    ) -> LocalBoxFuture<'static, Result<(), HookError>> {
        self.invoke(phase, payload, None)
    }

    /// Like [`call_hook`](Self::call_hook), but handlers gated on a
    /// capability run only when `granted` contains it. Gating is evaluated
    /// here, before any handler runs.
    pub fn call_hook_gated(
        &self,
        phase: &str,
        payload: HookPayload,
        granted: &HashSet<String>,
    ) -> LocalBoxFuture<'static, Result<(), HookError>> {
        self.invoke(phase, payload, Some(granted))
    }

    fn invoke(
        &self,
        phase: &str,
        payload: HookPayload,
        granted: Option<&HashSet<String>>,
    ) -> LocalBoxFuture<'static, Result<(), HookError>> {
        let mut selected: Vec<(Tier, u64, Option<String>, HookHandler)> = self
            .inner
            .entries
            .borrow()
            .iter()
            .filter(|e| e.phase == phase)
            .filter(|e| match (&e.capability, granted) {
                (Some(cap), Some(granted)) => granted.contains(cap),
                (Some(_), None) => true,
                (None, _) => true,
            })
            .map(|e| (e.tier, e.seq, e.scope.clone(), e.handler.clone()))
            .collect();
        selected.sort_by_key(|(tier, seq, _, _)| (*tier, *seq));

        let phase = phase.to_string();
        async move {
            for (_, _, scope, handler) in selected {
                if let Err(source) = handler(payload.clone()).await {
                    return Err(HookError::PhaseHalted {
                        phase,
                        owner: scope.unwrap_or_else(|| "unscoped".to_string()),
                        source: Box::new(source),
                    });
                }
            }
            Ok(())
        }
        .boxed_local()
    }
}

// =============================================================================
// CAPABILITY GATEWAY
// =============================================================================

/// Decides which of a component's declared capabilities are actually granted.
pub trait CapabilityGateway {
    fn grants(&self, component: &str, capability: &str) -> bool;
}

/// Grants every declared capability.
pub struct AllowAll;

impl CapabilityGateway for AllowAll {
    fn grants(&self, _component: &str, _capability: &str) -> bool {
        true
    }
}

/// Grants only a fixed set of capability names, to any component.
pub struct StaticGateway {
    allowed: HashSet<String>,
}

impl StaticGateway {
    pub fn new(allowed: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

impl CapabilityGateway for StaticGateway {
    fn grants(&self, _component: &str, capability: &str) -> bool {
        self.allowed.contains(capability)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn tiers_run_before_registration_order() {
        let hooks = HookRegistry::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for (label, tier) in [
            ("normal-1", Tier::Normal),
            ("critical", Tier::Critical),
            ("low", Tier::Low),
            ("normal-2", Tier::Normal),
            ("high", Tier::High),
        ] {
            let order = order.clone();
            hooks.add_hook(
                phases::MOUNT,
                tier,
                hook(move |_| order.borrow_mut().push(label)),
            );
        }

        block_on(hooks.call_hook(phases::MOUNT, HookPayload::new(phases::MOUNT))).unwrap();
        assert_eq!(
            *order.borrow(),
            vec!["critical", "high", "normal-1", "normal-2", "low"]
        );
    }

    #[test]
    fn first_failure_halts_remaining_handlers() {
        let hooks = HookRegistry::new();
        let ran = Rc::new(RefCell::new(Vec::new()));

        let ran_a = ran.clone();
        hooks.add_hook(
            phases::UPDATE,
            Tier::High,
            hook(move |_| ran_a.borrow_mut().push("first")),
        );
        hooks.add_hook_scoped(
            phases::UPDATE,
            Tier::Normal,
            "broken-plugin",
            try_hook(|_| Err(HookError::handler("boom"))),
        );
        let ran_b = ran.clone();
        hooks.add_hook(
            phases::UPDATE,
            Tier::Low,
            hook(move |_| ran_b.borrow_mut().push("last")),
        );

        let err =
            block_on(hooks.call_hook(phases::UPDATE, HookPayload::new(phases::UPDATE)))
                .unwrap_err();
        assert_eq!(*ran.borrow(), vec!["first"]);
        match err {
            HookError::PhaseHalted { phase, owner, .. } => {
                assert_eq!(phase, phases::UPDATE);
                assert_eq!(owner, "broken-plugin");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn capability_gating_skips_ungranted_handlers() {
        let hooks = HookRegistry::new();
        let ran = Rc::new(RefCell::new(Vec::new()));

        let ran_a = ran.clone();
        hooks.add_hook_full(
            phases::MOUNT,
            Tier::Normal,
            None,
            Some("storage".into()),
            hook(move |_| ran_a.borrow_mut().push("storage")),
        );
        let ran_b = ran.clone();
        hooks.add_hook_full(
            phases::MOUNT,
            Tier::Normal,
            None,
            Some("network".into()),
            hook(move |_| ran_b.borrow_mut().push("network")),
        );

        let granted: HashSet<String> = ["storage".to_string()].into();
        block_on(hooks.call_hook_gated(
            phases::MOUNT,
            HookPayload::new(phases::MOUNT),
            &granted,
        ))
        .unwrap();
        assert_eq!(*ran.borrow(), vec!["storage"]);
    }

    #[test]
    fn remove_scope_drops_only_that_scope() {
        let hooks = HookRegistry::new();
        hooks.add_hook_scoped(phases::DESTROY, Tier::Normal, "a", hook(|_| {}));
        hooks.add_hook_scoped(phases::DESTROY, Tier::Normal, "b", hook(|_| {}));
        hooks.add_hook(phases::DESTROY, Tier::Normal, hook(|_| {}));
        assert_eq!(hooks.hook_count(phases::DESTROY), 3);

        hooks.remove_scope("a");
        assert_eq!(hooks.hook_count(phases::DESTROY), 2);
    }

    #[test]
    fn async_handlers_run_sequentially() {
        let hooks = HookRegistry::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let order_a = order.clone();
        hooks.add_hook(
            phases::MOUNT,
            Tier::Normal,
            async_hook(move |_| {
                let order = order_a.clone();
                async move {
                    order.borrow_mut().push("a-start");
                    futures::future::ready(()).await;
                    order.borrow_mut().push("a-end");
                    Ok(())
                }
                .boxed_local()
            }),
        );
        let order_b = order.clone();
        hooks.add_hook(
            phases::MOUNT,
            Tier::Normal,
            hook(move |_| order_b.borrow_mut().push("b")),
        );

        block_on(hooks.call_hook(phases::MOUNT, HookPayload::new(phases::MOUNT))).unwrap();
        assert_eq!(*order.borrow(), vec!["a-start", "a-end", "b"]);
    }

    #[test]
    fn static_gateway_limits_grants() {
        let gateway = StaticGateway::new(["storage"]);
        assert!(gateway.grants("any", "storage"));
        assert!(!gateway.grants("any", "network"));
        assert!(AllowAll.grants("any", "network"));
    }
}
