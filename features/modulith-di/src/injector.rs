use std::{any::type_name, sync::Arc};

use futures::{future::BoxFuture, stream::FuturesUnordered, FutureExt, StreamExt};

use crate::{
    container::Container,
    context::ContextId,
    errors::{InjectError, RequireError},
    instance_wrapper::{
        Claim, InstanceWrapper, PendingSlot, RecordedDependency, Settlement, WrapperId,
    },
    module::ModuleId,
    provider::{Arguments, DependencyInfo, Recipe},
    token::Token,
    types::{Injectable, Instance},
};

/// Drives instantiation over a linked [`Container`]
///
/// Cheap to clone, every clone shares the same container and caches.
#[derive(Clone, Debug)]
pub struct Injector {
    container: Arc<Container>,
}

impl Injector {
    pub fn new(container: Arc<Container>) -> Self {
        Injector { container }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Finds the wrapper `token` refers to from `module` and the module owning it
    pub fn resolve(
        &self,
        token: &Token,
        module: ModuleId,
    ) -> Result<(Arc<InstanceWrapper>, ModuleId), InjectError> {
        let from = self
            .container
            .module(module)
            .ok_or_else(|| InjectError::ModuleMissing(format!("{module:?}")))?;
        match self.container.lookup(token, module) {
            Some((wrapper, owner)) => Ok((wrapper.clone(), owner.id())),
            None => Err(RequireError::ProviderNotFound {
                token: token.clone(),
                module: from.name().to_string(),
            }
            .into()),
        }
    }

    /// Materializes `wrapper` for `context` and returns its instance
    ///
    /// `Ok(None)` means the wrapper may not be materialized in this context,
    /// e.g. a request scoped tree asked for in the static context.
    pub async fn load_provider(
        &self,
        wrapper: &Arc<InstanceWrapper>,
        module: ModuleId,
        context: ContextId,
        inquirer: Option<WrapperId>,
    ) -> Result<Option<Instance>, InjectError> {
        let owner = self
            .container
            .module(module)
            .ok_or_else(|| InjectError::ModuleMissing(format!("{module:?}")))?;
        if !owner.owns(wrapper) {
            return Err(RequireError::ProviderNotFound {
                token: wrapper.token().clone(),
                module: owner.name().to_string(),
            }
            .into());
        }
        self.load_instance(wrapper.clone(), context, inquirer).await
    }

    fn load_instance(
        &self,
        wrapper: Arc<InstanceWrapper>,
        context: ContextId,
        inquirer: Option<WrapperId>,
    ) -> BoxFuture<'_, Settlement> {
        async move {
            if wrapper.dependencies().is_none() {
                return Err(InjectError::Unlinked(wrapper.token().clone()));
            }

            // Static trees always live in the static context, whoever asks
            let context = if wrapper.is_dependency_tree_static() && !wrapper.is_transient() {
                ContextId::STATIC
            } else {
                context
            };
            if !wrapper.is_eligible(context) {
                tracing::trace!("{} is not eligible in {context}", wrapper.token());
                return Ok(None);
            }

            let key = wrapper.slot_key(context, inquirer);
            match wrapper.claim(key) {
                Claim::Resolved(instance) => {
                    tracing::trace!("{} already resolved in {context}", wrapper.token());
                    return Ok(instance);
                }
                Claim::Wait(rx) => {
                    tracing::trace!("Waiting for in-flight {}", wrapper.token());
                    return rx.await?;
                }
                Claim::Owner => {}
            }

            let pending = PendingSlot::new(&wrapper, key);
            let result = self.instantiate(&wrapper, context).await;
            match &result {
                Ok(Some(_)) => tracing::debug!("Constructed {} in {context}", wrapper.token()),
                Ok(None) => tracing::trace!("{} has no instance in {context}", wrapper.token()),
                Err(error) => tracing::error!("Failed to construct {}: {error}", wrapper.token()),
            }
            pending.settle(&result);
            result
        }
        .boxed()
    }

    async fn instantiate(&self, wrapper: &Arc<InstanceWrapper>, context: ContextId) -> Settlement {
        let Some(dependencies) = wrapper.dependencies() else {
            return Err(InjectError::Unlinked(wrapper.token().clone()));
        };
        let token = wrapper.token().clone();

        match wrapper.recipe() {
            Recipe::Value(value) => Ok(Some(value.clone())),
            Recipe::Ambient => Ok(None),
            Recipe::Alias(_) => {
                let mut resolved = self
                    .resolve_dependencies(wrapper, &dependencies.constructor, context)
                    .await?;
                Ok(resolved.pop().and_then(|(_, instance)| instance))
            }
            Recipe::Factory(factory) => {
                let values = self
                    .resolve_dependencies(wrapper, &dependencies.constructor, context)
                    .await?;
                let instance = factory
                    .call(Arguments::new(token.clone(), context, values))
                    .await
                    .map_err(|error| InjectError::ConstructionFailed {
                        token,
                        error: Arc::new(error),
                    })?;
                Ok(Some(instance))
            }
            Recipe::Class(class) => {
                let values = self
                    .resolve_dependencies(wrapper, &dependencies.constructor, context)
                    .await?;
                let properties = dependencies
                    .properties
                    .iter()
                    .map(|(_, recorded)| recorded.clone())
                    .collect::<Vec<_>>();
                let properties = self
                    .resolve_dependencies(wrapper, &properties, context)
                    .await?
                    .into_iter()
                    .map(|(_, instance)| instance)
                    .collect();
                tracing::trace!("Calling constructor of {}", class.class);
                class
                    .build(Arguments::new(token, context, values), properties)
                    .map(Some)
            }
        }
    }

    /// Loads every recorded dependency in order with the same context
    ///
    /// Absent optional dependencies yield `None`. Absent required ones fail.
    async fn resolve_dependencies(
        &self,
        inquirer: &InstanceWrapper,
        recorded: &[RecordedDependency],
        context: ContextId,
    ) -> Result<Vec<(DependencyInfo, Option<Instance>)>, InjectError> {
        let mut values = Vec::with_capacity(recorded.len());
        for RecordedDependency { dependency, target } in recorded {
            let Some(target) = target.as_ref().and_then(|target| target.upgrade()) else {
                if dependency.optional {
                    values.push((dependency.clone(), None));
                    continue;
                }
                let module = self
                    .container
                    .module(inquirer.host())
                    .map(|module| module.name().to_string())
                    .unwrap_or_default();
                return Err(RequireError::ProviderNotFound {
                    token: dependency.token.clone(),
                    module,
                }
                .into());
            };

            let instance = match self.load_instance(target, context, Some(inquirer.id())).await {
                Ok(Some(instance)) => Some(instance),
                Ok(None) if dependency.optional => None,
                Ok(None) => {
                    return Err(RequireError::InstanceUnavailable {
                        token: dependency.token.clone(),
                        context,
                    }
                    .into())
                }
                Err(error) if dependency.optional && error.is_absence() => {
                    tracing::trace!(
                        "Optional {} of {} is absent: {error}",
                        dependency.token,
                        inquirer.token()
                    );
                    None
                }
                Err(error) => return Err(error),
            };
            values.push((dependency.clone(), instance));
        }
        Ok(values)
    }

    /// Eagerly loads every static provider and controller in the static context
    pub async fn create_instances_of_dependencies(&self) -> Result<(), InjectError> {
        let mut loading = FuturesUnordered::new();
        for module in self.container.modules() {
            for wrapper in module.wrappers() {
                if wrapper.is_transient() || !wrapper.is_dependency_tree_static() {
                    continue;
                }
                loading.push(self.load_instance(wrapper.clone(), ContextId::STATIC, None));
            }
        }

        let total = loading.len();
        tracing::debug!("Loading {total} singletons");
        while let Some(result) = loading.next().await {
            result?;
            tracing::trace!("Waiting for singletons [{} of {total} left]", loading.len());
        }
        Ok(())
    }

    /// First provider registered under `token`, across modules in registration order
    pub async fn get_token(&self, token: &Token) -> Result<Instance, InjectError> {
        let wrapper = self
            .container
            .modules()
            .find_map(|module| module.local(token))
            .ok_or_else(|| RequireError::ProviderNotFound {
                token: token.clone(),
                module: String::from("any module"),
            })?;
        self.load_instance(wrapper.clone(), ContextId::STATIC, None)
            .await?
            .ok_or_else(|| {
                RequireError::InstanceUnavailable {
                    token: token.clone(),
                    context: ContextId::STATIC,
                }
                .into()
            })
    }

    /// Singleton registered under the type token of `T`
    pub async fn get<T: Injectable>(&self) -> Result<Arc<T>, InjectError> {
        let instance = self.get_token(&Token::of::<T>()).await?;
        downcast(&instance)
    }

    /// Resolves `token` from `module` and loads it in `context`
    pub async fn resolve_instance(
        &self,
        token: &Token,
        module: ModuleId,
        context: ContextId,
    ) -> Result<Option<Instance>, InjectError> {
        let (wrapper, owner) = self.resolve(token, module)?;
        self.load_provider(&wrapper, owner, context, None).await
    }

    /// Load and downcast in one step
    pub async fn resolve_in<T: Injectable>(
        &self,
        token: &Token,
        module: ModuleId,
        context: ContextId,
    ) -> Result<Arc<T>, InjectError> {
        let instance = self
            .resolve_instance(token, module, context)
            .await?
            .ok_or_else(|| RequireError::InstanceUnavailable {
                token: token.clone(),
                context,
            })?;
        downcast(&instance)
    }
}

fn downcast<T: Injectable>(instance: &Instance) -> Result<Arc<T>, InjectError> {
    instance.downcast::<T>().map_err(|actual_type| {
        RequireError::DowncastFailed {
            required_type: type_name::<T>(),
            actual_type,
        }
        .into()
    })
}
