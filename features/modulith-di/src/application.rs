use std::{
    sync::Arc,
    thread::{self, sleep},
    time::Duration,
};

use futures::FutureExt;
use futures_channel::oneshot;

use crate::{
    container::Container,
    context::{ContextId, RequestContext},
    errors::{InitError, InjectError},
    injector::Injector,
    module::{ModuleId, ModuleRef},
    token::Token,
    types::{Injectable, Instance},
};

//////////////////////////////////////////////////////////////////////
///
/// Bootstrapping happens in three steps.
/// 1. Register the entry module and everything it imports
/// 2. Bind global modules and link every dependency
/// 3. Eagerly construct every singleton
pub struct ApplicationBuilder {
    entry: ModuleRef,
    extra_modules: Vec<ModuleRef>,
}

impl ApplicationBuilder {
    pub fn new(entry: &ModuleRef) -> Self {
        ApplicationBuilder {
            entry: entry.clone(),
            extra_modules: Vec::new(),
        }
    }

    /// Registers another root module next to the entry module
    pub fn add_module(mut self, module: &ModuleRef) -> Self {
        self.extra_modules.push(module.clone());
        self
    }

    pub async fn build(self) -> Result<Application, InitError> {
        self.initiate(None).await
    }

    /// Like [`ApplicationBuilder::build`], failing if the singletons take longer than `timeout`
    pub async fn build_timeout(self, timeout: Duration) -> Result<Application, InitError> {
        self.initiate(Some(timeout)).await
    }

    async fn initiate(self, timeout: Option<Duration>) -> Result<Application, InitError> {
        let mut container = Container::new();
        for module in &self.extra_modules {
            container.add_module(module)?;
        }
        let entry = container.scan(&self.entry)?;
        tracing::debug!(
            "Scanned application with {} modules",
            container.modules().count()
        );

        let injector = Injector::new(Arc::new(container));
        let eager = injector.create_instances_of_dependencies();
        match timeout {
            None => eager.await?,
            Some(timeout) => {
                // We don't join the thread - it will just die after the timeout
                let (timeout_tx, timeout_rx) = oneshot::channel::<()>();
                thread::spawn(move || {
                    sleep(timeout);
                    let _ = timeout_tx.send(());
                });

                let eager = eager.fuse();
                futures::pin_mut!(eager);
                let mut timeout_rx = timeout_rx;
                futures::select! {
                    result = eager => result?,
                    _ = timeout_rx => return Err(InitError::Timeout),
                }
            }
        }

        tracing::debug!("Application is ready");
        Ok(Application { injector, entry })
    }
}

/// A bootstrapped module graph with all singletons constructed
#[derive(Clone, Debug)]
pub struct Application {
    injector: Injector,
    entry: ModuleId,
}

impl Application {
    pub fn builder(entry: &ModuleRef) -> ApplicationBuilder {
        ApplicationBuilder::new(entry)
    }

    /// Singleton registered under the type token of `T`
    pub async fn get<T: Injectable>(&self) -> Result<Arc<T>, InjectError> {
        self.injector.get::<T>().await
    }

    /// Singleton registered under `token`
    pub async fn get_token(&self, token: &Token) -> Result<Instance, InjectError> {
        self.injector.get_token(token).await
    }

    /// Resolves `T` as seen from `module` in the static context
    pub async fn resolve<T: Injectable>(&self, module: &ModuleRef) -> Result<Arc<T>, InjectError> {
        self.injector
            .resolve_in::<T>(&Token::of::<T>(), module.id(), ContextId::STATIC)
            .await
    }

    /// Starts one inbound call
    pub fn create_request_context(&self) -> RequestContext {
        RequestContext::new(self.injector.clone())
    }

    pub fn entry(&self) -> ModuleId {
        self.entry
    }

    pub fn container(&self) -> &Container {
        self.injector.container()
    }

    pub fn injector(&self) -> &Injector {
        &self.injector
    }
}
