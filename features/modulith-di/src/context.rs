use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{
    errors::InjectError,
    injector::Injector,
    module::ModuleRef,
    token::Token,
    types::{Injectable, Instance},
};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one resolution pass
///
/// [`ContextId::STATIC`] is the process-wide singleton context, every other
/// value belongs to exactly one inbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    pub const STATIC: ContextId = ContextId(0);

    /// Mints a fresh, never reused request context id
    pub fn next() -> ContextId {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn is_static(self) -> bool {
        self == ContextId::STATIC
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_static() {
            f.write_str("the static context")
        } else {
            write!(f, "request context #{}", self.0)
        }
    }
}

/// One inbound call
///
/// Owns a fresh [`ContextId`]; every request-scoped instance created through
/// it is dropped from the container's caches together with the context.
///
/// ```rust,no_run
/// # async fn handle(app: modulith_di::Application, user_module: modulith_di::ModuleRef) -> Result<(), modulith_di::InjectError> {
/// # struct UserController;
/// let request = app.create_request_context();
/// request.register_request(String::from("GET /user/1"))?;
/// let controller = request.resolve::<UserController>(&user_module).await?;
/// # Ok(())
/// # }
/// ```
pub struct RequestContext {
    id: ContextId,
    injector: Injector,
}

impl RequestContext {
    pub(crate) fn new(injector: Injector) -> Self {
        let id = ContextId::next();
        tracing::trace!("Opened {id}");
        RequestContext { id, injector }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Seeds the ambient request value for this call
    ///
    /// Must happen before anything depending on [`REQUEST`](crate::REQUEST) is
    /// resolved in this context.
    pub fn register_request<T: Injectable>(&self, request: T) -> Result<(), InjectError> {
        self.injector
            .container()
            .register_request_provider(Instance::new(request), self.id)
    }

    /// Resolves `T` by its type token as seen from `module`
    pub async fn resolve<T: Injectable>(
        &self,
        module: &ModuleRef,
    ) -> Result<std::sync::Arc<T>, InjectError> {
        self.injector
            .resolve_in::<T>(&Token::of::<T>(), module.id(), self.id)
            .await
    }

    /// Resolves an arbitrary token as seen from `module`
    pub async fn resolve_token(
        &self,
        token: &Token,
        module: &ModuleRef,
    ) -> Result<Option<Instance>, InjectError> {
        self.injector
            .resolve_instance(token, module.id(), self.id)
            .await
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        self.injector.container().release_context(self.id);
        tracing::trace!("Released {}", self.id);
    }
}
