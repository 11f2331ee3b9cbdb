use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard, OnceLock, PoisonError, Weak,
    },
};

use futures_channel::oneshot;

use crate::{
    context::ContextId,
    errors::InjectError,
    module::ModuleId,
    provider::{DependencyInfo, Recipe, Scope},
    token::Token,
    types::Instance,
};

static NEXT_WRAPPER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WrapperId(u64);

/// Snapshot of one per-context cache entry
#[derive(Debug, Clone)]
pub struct InstancePerContext {
    pub instance: Option<Instance>,
    pub is_resolved: bool,
    pub is_pending: bool,
}

pub(crate) type Settlement = Result<Option<Instance>, InjectError>;
type Waiter = oneshot::Sender<Settlement>;

/// Cache key of an instance
///
/// The inquirer is only part of the key for transient wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SlotKey {
    pub(crate) context: ContextId,
    pub(crate) inquirer: Option<WrapperId>,
}

#[derive(Default)]
struct ContextSlot {
    instance: Option<Instance>,
    is_resolved: bool,
    /// Some while a construction is in flight
    waiters: Option<Vec<Waiter>>,
}

/// Outcome of trying to take a slot for construction
pub(crate) enum Claim {
    Resolved(Option<Instance>),
    /// Someone else is constructing, await their result
    Wait(oneshot::Receiver<Settlement>),
    /// The caller must construct and then settle the slot
    Owner,
}

/// A dependency slot together with the wrapper it resolved to
#[derive(Clone)]
pub(crate) struct RecordedDependency {
    pub(crate) dependency: DependencyInfo,
    /// None if nothing visible provides the token
    pub(crate) target: Option<Weak<InstanceWrapper>>,
}

#[derive(Default)]
pub(crate) struct RecordedDependencies {
    pub(crate) constructor: Vec<RecordedDependency>,
    pub(crate) properties: Vec<(&'static str, RecordedDependency)>,
}
impl RecordedDependencies {
    fn wrappers(&self) -> impl Iterator<Item = &Weak<InstanceWrapper>> {
        self.constructor
            .iter()
            .chain(self.properties.iter().map(|(_, recorded)| recorded))
            .filter_map(|recorded| recorded.target.as_ref())
    }
}

/// Lifecycle of a single provider or controller
///
/// Owned by the module that declared its token. Dependencies are only weak
/// back-references used to work out whether the tree is static.
pub struct InstanceWrapper {
    id: WrapperId,
    token: Token,
    host: ModuleId,
    scope: Scope,
    recipe: Recipe,
    values: Mutex<HashMap<SlotKey, ContextSlot>>,
    dependencies: OnceLock<RecordedDependencies>,
    is_tree_static: OnceLock<bool>,
}

impl fmt::Debug for InstanceWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceWrapper")
            .field("id", &self.id)
            .field("token", &self.token)
            .field("scope", &self.scope)
            .field("recipe", &self.recipe.kind())
            .finish()
    }
}

impl InstanceWrapper {
    pub(crate) fn new(token: Token, scope: Scope, recipe: Recipe, host: ModuleId) -> Self {
        InstanceWrapper {
            id: WrapperId(NEXT_WRAPPER_ID.fetch_add(1, Ordering::Relaxed)),
            token,
            host,
            scope,
            recipe,
            values: Mutex::new(HashMap::new()),
            dependencies: OnceLock::new(),
            is_tree_static: OnceLock::new(),
        }
    }

    pub fn id(&self) -> WrapperId {
        self.id
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Module that declared this wrapper
    pub fn host(&self) -> ModuleId {
        self.host
    }

    pub fn is_transient(&self) -> bool {
        self.scope == Scope::Transient
    }

    pub(crate) fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    /// Records resolved dependencies, only the first call has an effect
    pub(crate) fn record_dependencies(&self, dependencies: RecordedDependencies) -> bool {
        self.dependencies.set(dependencies).is_ok()
    }

    pub(crate) fn dependencies(&self) -> Option<&RecordedDependencies> {
        self.dependencies.get()
    }

    /// Whether nothing in this wrapper's dependency tree is request scoped
    ///
    /// Computed once and memoized after dependencies have been recorded.
    pub fn is_dependency_tree_static(&self) -> bool {
        self.tree_static_with(&mut Vec::new())
    }

    fn tree_static_with(&self, lookup_registry: &mut Vec<WrapperId>) -> bool {
        if let Some(is_static) = self.is_tree_static.get() {
            return *is_static;
        }
        if self.scope == Scope::Request {
            return *self.is_tree_static.get_or_init(|| false);
        }
        // Revisited along the current path, treat the cycle as static
        if lookup_registry.contains(&self.id) {
            return true;
        }
        let Some(dependencies) = self.dependencies.get() else {
            return true;
        };

        lookup_registry.push(self.id);
        let is_static = dependencies.wrappers().all(|dependency| {
            dependency
                .upgrade()
                .map_or(true, |wrapper| wrapper.tree_static_with(lookup_registry))
        });
        lookup_registry.pop();

        *self.is_tree_static.get_or_init(|| is_static)
    }

    pub(crate) fn slot_key(&self, context: ContextId, inquirer: Option<WrapperId>) -> SlotKey {
        if self.is_transient() {
            SlotKey { context, inquirer }
        } else if self.is_dependency_tree_static() {
            SlotKey {
                context: ContextId::STATIC,
                inquirer: None,
            }
        } else {
            SlotKey {
                context,
                inquirer: None,
            }
        }
    }

    /// Whether an instance may be materialized under `context`
    ///
    /// Static trees only under the static context, request-scoped trees only
    /// under request contexts. Transient wrappers with a static tree are
    /// eligible everywhere.
    pub fn is_eligible(&self, context: ContextId) -> bool {
        let is_static = self.is_dependency_tree_static();
        if self.is_transient() && is_static {
            return true;
        }
        is_static == context.is_static()
    }

    pub fn instance_by_context(
        &self,
        context: ContextId,
        inquirer: Option<WrapperId>,
    ) -> InstancePerContext {
        let key = self.slot_key(context, inquirer);
        let values = self.lock_values();
        match values.get(&key) {
            Some(slot) => InstancePerContext {
                instance: slot.instance.clone(),
                is_resolved: slot.is_resolved,
                is_pending: slot.waiters.is_some(),
            },
            None => InstancePerContext {
                instance: None,
                is_resolved: false,
                is_pending: false,
            },
        }
    }

    /// Stores an externally produced instance as resolved for `context`
    pub fn set_instance_by_context(&self, context: ContextId, instance: Instance) {
        let key = SlotKey {
            context,
            inquirer: None,
        };
        let waiters = {
            let mut values = self.lock_values();
            let slot = values.entry(key).or_default();
            slot.instance = Some(instance.clone());
            slot.is_resolved = true;
            slot.waiters.take()
        };
        for waiter in waiters.into_iter().flatten() {
            let _ = waiter.send(Ok(Some(instance.clone())));
        }
    }

    pub(crate) fn claim(&self, key: SlotKey) -> Claim {
        let mut values = self.lock_values();
        let slot = values.entry(key).or_default();
        if slot.is_resolved {
            return Claim::Resolved(slot.instance.clone());
        }
        match slot.waiters.as_mut() {
            Some(waiters) => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Claim::Wait(rx)
            }
            None => {
                slot.waiters = Some(Vec::new());
                Claim::Owner
            }
        }
    }

    /// Finishes a claimed construction and informs all waiters
    ///
    /// Failures and absent values leave the slot empty so a later resolution
    /// can try again.
    pub(crate) fn settle(&self, key: SlotKey, result: &Settlement) {
        let waiters = {
            let mut values = self.lock_values();
            match result {
                Ok(Some(instance)) => {
                    let slot = values.entry(key).or_default();
                    slot.instance = Some(instance.clone());
                    slot.is_resolved = true;
                    slot.waiters.take()
                }
                Ok(None) | Err(_) => values.remove(&key).and_then(|slot| slot.waiters),
            }
        };
        for waiter in waiters.into_iter().flatten() {
            let _ = waiter.send(result.clone());
        }
    }

    /// Drops a claimed slot without a result, waiters observe a cancellation
    pub(crate) fn abandon(&self, key: SlotKey) {
        let mut values = self.lock_values();
        if values.get(&key).is_some_and(|slot| !slot.is_resolved) {
            values.remove(&key);
        }
    }

    /// Forgets every instance created for `context`
    pub(crate) fn release_context(&self, context: ContextId) {
        if context.is_static() {
            return;
        }
        self.lock_values().retain(|key, _| key.context != context);
    }

    fn lock_values(&self) -> MutexGuard<'_, HashMap<SlotKey, ContextSlot>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Settles or abandons a claimed slot exactly once
pub(crate) struct PendingSlot<'a> {
    wrapper: &'a InstanceWrapper,
    key: SlotKey,
    settled: bool,
}
impl<'a> PendingSlot<'a> {
    pub(crate) fn new(wrapper: &'a InstanceWrapper, key: SlotKey) -> Self {
        PendingSlot {
            wrapper,
            key,
            settled: false,
        }
    }

    pub(crate) fn settle(mut self, result: &Settlement) {
        self.wrapper.settle(self.key, result);
        self.settled = true;
    }
}
impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!("Construction of {} was abandoned", self.wrapper.token);
            self.wrapper.abandon(self.key);
        }
    }
}
