use std::{any::type_name, future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    context::ContextId,
    errors::{InjectError, RequireError},
    token::Token,
    types::{DynError, Injectable, Instance, TypeInfo},
};

/// Instantiation lifetime of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// One instance for the whole process
    #[default]
    Singleton,
    /// One instance per inbound call
    Request,
    /// One instance per inquirer and context
    Transient,
}

/// Information about a single dependency slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyInfo {
    /// The required token
    pub token: Token,
    /// If it is optional or required
    pub optional: bool,
}
impl DependencyInfo {
    pub fn of<T: 'static + ?Sized>() -> Self {
        Self::token(Token::of::<T>())
    }

    pub fn token(token: impl Into<Token>) -> Self {
        DependencyInfo {
            token: token.into(),
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}
impl From<Token> for DependencyInfo {
    fn from(token: Token) -> Self {
        DependencyInfo::token(token)
    }
}
impl From<&'static str> for DependencyInfo {
    fn from(name: &'static str) -> Self {
        DependencyInfo::token(name)
    }
}

/// Replaces the implicit parameter token at `index`
#[derive(Debug, Clone)]
pub struct ParamOverride {
    pub index: usize,
    pub token: Token,
}
impl ParamOverride {
    pub fn new(index: usize, token: impl Into<Token>) -> Self {
        ParamOverride {
            index,
            token: token.into(),
        }
    }
}

type AssignFn<T> = dyn Fn(&mut T, &Instance) -> Result<(), RequireError> + Send + Sync;

/// Describes a field that is filled in after construction
pub struct PropertyInjection<T> {
    pub key: &'static str,
    pub dependency: DependencyInfo,
    assign: Arc<AssignFn<T>>,
}
impl<T: 'static> PropertyInjection<T> {
    /// `assign` receives the resolved dependency and stores it on the target
    pub fn new<D: Injectable>(
        key: &'static str,
        token: impl Into<Token>,
        assign: impl Fn(&mut T, Arc<D>) + Send + Sync + 'static,
    ) -> Self {
        PropertyInjection {
            key,
            dependency: DependencyInfo::token(token),
            assign: Arc::new(move |target, instance| {
                let dependency =
                    instance
                        .downcast::<D>()
                        .map_err(|actual_type| RequireError::DowncastFailed {
                            required_type: type_name::<D>(),
                            actual_type,
                        })?;
                assign(target, dependency);
                Ok(())
            }),
        }
    }

    /// Missing providers leave the field untouched instead of failing
    pub fn optional(mut self) -> Self {
        self.dependency.optional = true;
        self
    }
}

/// A type the container knows how to construct
///
/// This is the explicit registration of what a class exposes to the
/// container: its scope, the ordered constructor parameter tokens, positional
/// overrides of those tokens, and fields injected after construction.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use modulith_di::{Arguments, Constructible, DependencyInfo, DynError};
///
/// struct LoggerService;
/// impl Constructible for LoggerService {
///     fn construct(_: Arguments) -> Result<Self, DynError> {
///         Ok(LoggerService)
///     }
/// }
///
/// struct UserService {
///     logger: Arc<LoggerService>,
/// }
/// impl Constructible for UserService {
///     fn parameters() -> Vec<DependencyInfo> {
///         vec![DependencyInfo::of::<LoggerService>()]
///     }
///
///     fn construct(mut args: Arguments) -> Result<Self, DynError> {
///         Ok(UserService { logger: args.next()? })
///     }
/// }
/// ```
pub trait Constructible: Injectable + Sized {
    /// Declared scope, used unless the provider declaration overrides it
    fn scope() -> Scope {
        Scope::Singleton
    }

    /// Constructor parameter tokens in positional order
    fn parameters() -> Vec<DependencyInfo> {
        Vec::new()
    }

    /// Explicit tokens for individual parameter positions
    fn parameter_overrides() -> Vec<ParamOverride> {
        Vec::new()
    }

    /// Fields assigned after construction
    fn properties() -> Vec<PropertyInjection<Self>> {
        Vec::new()
    }

    /// Builds the value from resolved constructor arguments
    fn construct(args: Arguments) -> Result<Self, DynError>;
}

/// Resolved dependencies handed to a constructor or factory, in declared order
pub struct Arguments {
    owner: Token,
    context: ContextId,
    values: Vec<(DependencyInfo, Option<Instance>)>,
    cursor: usize,
}
impl Arguments {
    pub(crate) fn new(
        owner: Token,
        context: ContextId,
        values: Vec<(DependencyInfo, Option<Instance>)>,
    ) -> Self {
        Arguments {
            owner,
            context,
            values,
            cursor: 0,
        }
    }

    /// Token of the provider being constructed
    pub fn owner(&self) -> &Token {
        &self.owner
    }

    /// Context the construction happens in
    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn remaining(&self) -> usize {
        self.values.len() - self.cursor
    }

    /// Takes the next argument without downcasting it
    ///
    /// `None` means an optional dependency was absent.
    pub fn next_instance(&mut self) -> Result<Option<Instance>, InjectError> {
        let Some((_, instance)) = self.values.get(self.cursor) else {
            return Err(InjectError::MissingArgument {
                owner: self.owner.clone(),
                index: self.cursor,
                declared: self.values.len(),
            });
        };
        let instance = instance.clone();
        self.cursor += 1;
        Ok(instance)
    }

    pub fn next_optional<T: Injectable>(&mut self) -> Result<Option<Arc<T>>, InjectError> {
        let Some(instance) = self.next_instance()? else {
            return Ok(None);
        };
        let downcasted =
            instance
                .downcast::<T>()
                .map_err(|actual_type| RequireError::DowncastFailed {
                    required_type: type_name::<T>(),
                    actual_type,
                })?;
        Ok(Some(downcasted))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next<T: Injectable>(&mut self) -> Result<Arc<T>, InjectError> {
        let index = self.cursor;
        match self.next_optional::<T>()? {
            Some(value) => Ok(value),
            None => Err(RequireError::InstanceUnavailable {
                token: self.values[index].0.token.clone(),
                context: self.context,
            }
            .into()),
        }
    }
}

type BuildFn = dyn Fn(Arguments, Vec<Option<Instance>>) -> Result<Instance, InjectError> + Send + Sync;
type FactoryFn = dyn Fn(Arguments) -> BoxFuture<'static, Result<Instance, DynError>> + Send + Sync;

/// Type-erased construction recipe stored on a wrapper
#[derive(Clone)]
pub(crate) enum Recipe {
    Class(ClassRecipe),
    Value(Instance),
    Factory(FactoryRecipe),
    Alias(Token),
    /// Never constructed, seeded from outside per context
    Ambient,
}
impl Recipe {
    /// Constructor, factory and alias slots in positional order
    pub(crate) fn parameters(&self) -> Vec<DependencyInfo> {
        match self {
            Recipe::Class(class) => class.parameters.clone(),
            Recipe::Factory(factory) => factory.inject.clone(),
            Recipe::Alias(existing) => vec![DependencyInfo::token(existing.clone())],
            Recipe::Value(_) | Recipe::Ambient => Vec::new(),
        }
    }

    pub(crate) fn properties(&self) -> Vec<(&'static str, DependencyInfo)> {
        match self {
            Recipe::Class(class) => class.properties.clone(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Recipe::Class(_) => "class",
            Recipe::Value(_) => "value",
            Recipe::Factory(_) => "factory",
            Recipe::Alias(_) => "alias",
            Recipe::Ambient => "ambient",
        }
    }
}

#[derive(Clone)]
pub(crate) struct ClassRecipe {
    pub(crate) class: TypeInfo,
    parameters: Vec<DependencyInfo>,
    properties: Vec<(&'static str, DependencyInfo)>,
    build: Arc<BuildFn>,
}
impl ClassRecipe {
    fn of<T: Constructible>() -> Self {
        let mut parameters = T::parameters();
        for ParamOverride { index, token } in T::parameter_overrides() {
            match parameters.get_mut(index) {
                Some(slot) => slot.token = token,
                None => {
                    tracing::warn!(
                        "Override #{index} of {} is past its {} parameters, appending it",
                        type_name::<T>(),
                        parameters.len()
                    );
                    parameters.push(DependencyInfo::token(token));
                }
            }
        }

        let injections = T::properties();
        let properties = injections
            .iter()
            .map(|property| (property.key, property.dependency.clone()))
            .collect();

        let build = move |args: Arguments, values: Vec<Option<Instance>>| {
            let owner = args.owner().clone();
            let mut object = T::construct(args).map_err(|error| InjectError::ConstructionFailed {
                token: owner,
                error: Arc::new(error),
            })?;
            for (property, value) in injections.iter().zip(values) {
                if let Some(value) = value {
                    (property.assign)(&mut object, &value)?;
                }
            }
            Ok(Instance::new(object))
        };

        ClassRecipe {
            class: TypeInfo::of::<T>(),
            parameters,
            properties,
            build: Arc::new(build),
        }
    }

    pub(crate) fn build(
        &self,
        args: Arguments,
        properties: Vec<Option<Instance>>,
    ) -> Result<Instance, InjectError> {
        (self.build)(args, properties)
    }
}

#[derive(Clone)]
pub(crate) struct FactoryRecipe {
    inject: Vec<DependencyInfo>,
    factory: Arc<FactoryFn>,
}
impl FactoryRecipe {
    pub(crate) fn call(&self, args: Arguments) -> BoxFuture<'static, Result<Instance, DynError>> {
        (self.factory)(args)
    }
}

/// Provider built from a [`Constructible`] type
#[derive(Clone)]
pub struct ClassProvider {
    token: Token,
    scope: Scope,
    recipe: ClassRecipe,
}
impl ClassProvider {
    /// Overrides the scope the class declares for itself
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }
}

#[derive(Clone)]
pub struct ValueProvider {
    token: Token,
    value: Instance,
}

/// Provider built from an async factory function
#[derive(Clone)]
pub struct FactoryProvider {
    token: Token,
    scope: Scope,
    recipe: FactoryRecipe,
}
impl FactoryProvider {
    /// Tokens resolved and handed to the factory, in this order
    pub fn inject<D: Into<DependencyInfo>>(mut self, dependencies: impl IntoIterator<Item = D>) -> Self {
        self.recipe.inject = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }
}

#[derive(Clone)]
pub struct AliasProvider {
    token: Token,
    existing: Token,
}

#[derive(Clone)]
pub struct AmbientProvider {
    token: Token,
}

/// A recipe for producing the value of a token
#[derive(Clone)]
pub enum Provider {
    Class(ClassProvider),
    Value(ValueProvider),
    Factory(FactoryProvider),
    Alias(AliasProvider),
    Ambient(AmbientProvider),
}

impl Provider {
    /// Registers `T` under its own type token
    pub fn class<T: Constructible>() -> Provider {
        Provider::use_class::<T>(Token::of::<T>()).into()
    }

    /// Registers `T` under an arbitrary token
    pub fn use_class<T: Constructible>(token: impl Into<Token>) -> ClassProvider {
        ClassProvider {
            token: token.into(),
            scope: T::scope(),
            recipe: ClassRecipe::of::<T>(),
        }
    }

    /// A fixed value, returned unchanged on every resolution
    pub fn value<V: Injectable>(token: impl Into<Token>, value: V) -> Provider {
        Provider::instance(token, Instance::new(value))
    }

    /// A fixed, already type-erased value
    pub fn instance(token: impl Into<Token>, value: Instance) -> Provider {
        Provider::Value(ValueProvider {
            token: token.into(),
            value,
        })
    }

    pub fn factory<T, E, F, Fut>(token: impl Into<Token>, factory: F) -> FactoryProvider
    where
        T: Injectable,
        E: Into<DynError>,
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let factory = move |args: Arguments| {
            factory(args)
                .map(|result| result.map(Instance::new).map_err(Into::into))
                .boxed()
        };

        FactoryProvider {
            token: token.into(),
            scope: Scope::Singleton,
            recipe: FactoryRecipe {
                inject: Vec::new(),
                factory: Arc::new(factory),
            },
        }
    }

    /// Resolves to the very instance of `existing`
    pub fn alias(token: impl Into<Token>, existing: impl Into<Token>) -> Provider {
        Provider::Alias(AliasProvider {
            token: token.into(),
            existing: existing.into(),
        })
    }

    pub(crate) fn ambient(token: impl Into<Token>) -> Provider {
        Provider::Ambient(AmbientProvider {
            token: token.into(),
        })
    }

    pub fn token(&self) -> &Token {
        match self {
            Provider::Class(p) => &p.token,
            Provider::Value(p) => &p.token,
            Provider::Factory(p) => &p.token,
            Provider::Alias(p) => &p.token,
            Provider::Ambient(p) => &p.token,
        }
    }

    pub(crate) fn into_parts(self) -> (Token, Scope, Recipe) {
        match self {
            Provider::Class(p) => (p.token, p.scope, Recipe::Class(p.recipe)),
            Provider::Value(p) => (p.token, Scope::Singleton, Recipe::Value(p.value)),
            Provider::Factory(p) => (p.token, p.scope, Recipe::Factory(p.recipe)),
            Provider::Alias(p) => (p.token, Scope::Singleton, Recipe::Alias(p.existing)),
            Provider::Ambient(p) => (p.token, Scope::Request, Recipe::Ambient),
        }
    }
}

impl From<ClassProvider> for Provider {
    fn from(provider: ClassProvider) -> Self {
        Provider::Class(provider)
    }
}
impl From<FactoryProvider> for Provider {
    fn from(provider: FactoryProvider) -> Self {
        Provider::Factory(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    struct Service {
        first: Arc<u32>,
        second: Option<Arc<String>>,
    }
    impl Constructible for Service {
        fn scope() -> Scope {
            Scope::Request
        }

        fn parameters() -> Vec<DependencyInfo> {
            vec![DependencyInfo::of::<u32>(), DependencyInfo::of::<String>().optional()]
        }

        fn parameter_overrides() -> Vec<ParamOverride> {
            vec![ParamOverride::new(1, "name")]
        }

        fn construct(mut args: Arguments) -> Result<Self, DynError> {
            Ok(Service {
                first: args.next()?,
                second: args.next_optional()?,
            })
        }
    }

    #[test]
    fn overrides_replace_token_but_keep_optionality() {
        let (token, scope, recipe) = Provider::class::<Service>().into_parts();

        assert_eq!(token, Token::of::<Service>());
        assert_eq!(scope, Scope::Request);
        assert_eq!(
            recipe.parameters(),
            vec![
                DependencyInfo::of::<u32>(),
                DependencyInfo::token("name").optional()
            ]
        );
    }

    #[test]
    fn declaration_scope_wins_over_class_scope() {
        let provider: Provider = Provider::use_class::<Service>("svc")
            .scope(Scope::Transient)
            .into();
        let (token, scope, _) = provider.into_parts();

        assert_eq!(token, Token::from("svc"));
        assert_eq!(scope, Scope::Transient);
    }

    #[test]
    fn arguments_are_consumed_in_order() {
        let mut args = Arguments::new(
            Token::of::<Service>(),
            ContextId::STATIC,
            vec![
                (DependencyInfo::of::<u32>(), Some(Instance::new(7_u32))),
                (DependencyInfo::token("name").optional(), None),
            ],
        );

        assert_eq!(*args.next::<u32>().unwrap(), 7);
        assert!(args.next_optional::<String>().unwrap().is_none());
        assert_eq!(args.remaining(), 0);
        assert!(matches!(
            args.next_instance(),
            Err(InjectError::MissingArgument { index: 2, declared: 2, .. })
        ));
    }

    #[test]
    fn absent_required_argument_is_unavailable() {
        let mut args = Arguments::new(
            Token::of::<Service>(),
            ContextId::STATIC,
            vec![(DependencyInfo::of::<u32>(), None)],
        );

        assert!(matches!(
            args.next::<u32>(),
            Err(InjectError::Require(RequireError::InstanceUnavailable { .. }))
        ));
    }

    #[test]
    fn class_recipe_assigns_properties() {
        struct Holder {
            name: Option<Arc<String>>,
        }
        impl Constructible for Holder {
            fn properties() -> Vec<PropertyInjection<Self>> {
                vec![PropertyInjection::new("name", "name", |holder: &mut Holder, name| {
                    holder.name = Some(name)
                })]
            }

            fn construct(_: Arguments) -> Result<Self, DynError> {
                Ok(Holder { name: None })
            }
        }

        let recipe = ClassRecipe::of::<Holder>();
        let args = Arguments::new(Token::of::<Holder>(), ContextId::STATIC, Vec::new());
        let instance = recipe
            .build(args, vec![Some(Instance::new(String::from("sherry")))])
            .unwrap();

        let holder = instance.downcast::<Holder>().unwrap();
        assert_eq!(holder.name.as_deref().map(String::as_str), Some("sherry"));
    }

    #[test]
    fn class_recipe_wraps_constructor_errors() {
        let recipe = ClassRecipe::of::<Service>();
        let args = Arguments::new(Token::of::<Service>(), ContextId::STATIC, Vec::new());

        let error = recipe.build(args, Vec::new()).unwrap_err();
        assert!(matches!(error, InjectError::ConstructionFailed { .. }));
    }
}
