//! Modulith DI composes an application out of modules and instantiates their
//! providers with the right lifetime.
//!
//! Every module declares four lists: the modules it imports, the providers it
//! declares, its controllers and the tokens it exports. A token is only visible
//! outside its module if it is both provided and exported.
//!
//! Providers are singletons by default. Request scoped providers get one
//! instance per inbound call, and anything depending on them, directly or
//! transitively, becomes request scoped too.
//!
//! # Examples
//!
//! ```rust
//! use modulith_di::{Application, Arguments, Constructible, DependencyInfo, DynError, ModuleBuilder, Provider};
//! use std::sync::Arc;
//!
//! struct LoggerService;
//! impl Constructible for LoggerService {
//!     fn construct(_: Arguments) -> Result<Self, DynError> {
//!         Ok(LoggerService)
//!     }
//! }
//!
//! struct UserService {
//!     logger: Arc<LoggerService>,
//! }
//! impl Constructible for UserService {
//!     fn parameters() -> Vec<DependencyInfo> {
//!         vec![DependencyInfo::of::<LoggerService>()]
//!     }
//!     fn construct(mut args: Arguments) -> Result<Self, DynError> {
//!         Ok(UserService { logger: args.next()? })
//!     }
//! }
//!
//! # futures::executor::block_on(async {
//! let logger = ModuleBuilder::new("Logger")
//!     .provider(Provider::class::<LoggerService>())
//!     .export(modulith_di::Token::of::<LoggerService>())
//!     .build();
//! let user = ModuleBuilder::new("User")
//!     .import(&logger)
//!     .provider(Provider::class::<UserService>())
//!     .build();
//!
//! let app = Application::builder(&user).build().await.unwrap();
//! let service = app.resolve::<UserService>(&user).await.unwrap();
//! let logger_service = app.resolve::<LoggerService>(&logger).await.unwrap();
//! assert!(Arc::ptr_eq(&service.logger, &logger_service));
//! # });
//! ```
//!
//! Modulith DI consists of the following components:
//!
//! 1. Module - declaring modules and their visibility rules
//! 2. Container - registering the module graph and linking dependencies
//! 3. InstanceWrapper - per provider lifecycle and per context caches
//! 4. Injector - resolving tokens and constructing instances
//! 5. Context - request contexts and the ambient request value

mod application;
mod container;
mod context;
pub mod dependency_graph;
pub mod errors;
mod injector;
mod instance_wrapper;
mod module;
mod provider;
mod token;
mod types;

pub use application::{Application, ApplicationBuilder};
pub use container::Container;
pub use context::{ContextId, RequestContext};
pub use errors::{InitError, InjectError, ModuleGraphError, RequireError};
pub use injector::Injector;
pub use instance_wrapper::{InstancePerContext, InstanceWrapper, WrapperId};
pub use module::{Module, ModuleBuilder, ModuleDefinition, ModuleId, ModuleRef};
pub use provider::{
    AliasProvider, AmbientProvider, Arguments, ClassProvider, Constructible, DependencyInfo,
    FactoryProvider, ParamOverride, PropertyInjection, Provider, Scope, ValueProvider,
};
pub use token::{Symbol, Token, REQUEST};
pub use types::{DynError, Injectable, Instance, TypeInfo};
