use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::{
    errors::ModuleGraphError,
    instance_wrapper::InstanceWrapper,
    provider::{Constructible, Provider},
    token::Token,
};

static NEXT_MODULE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a module definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u64);
impl ModuleId {
    pub(crate) fn next() -> ModuleId {
        ModuleId(NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Shared handle to a module definition, used to import it elsewhere
pub type ModuleRef = Arc<ModuleDefinition>;

type ForwardFn = dyn Fn() -> ModuleRef + Send + Sync;

#[derive(Clone)]
enum Import {
    Module(ModuleRef),
    /// Evaluated when the container registers the importing module
    Forward(Arc<ForwardFn>),
}
impl Import {
    fn resolve(&self) -> ModuleRef {
        match self {
            Import::Module(module) => module.clone(),
            Import::Forward(forward) => forward(),
        }
    }
}

/// Declared shape of a module: what it imports, provides and exposes
///
/// Definitions are immutable once built and can be registered into any
/// number of containers.
pub struct ModuleDefinition {
    id: ModuleId,
    name: String,
    global: bool,
    imports: Vec<Import>,
    providers: Vec<Provider>,
    controllers: Vec<Provider>,
    exports: Vec<Token>,
    exported_modules: Vec<ModuleId>,
}

impl ModuleDefinition {
    pub fn builder(name: impl Into<String>) -> ModuleBuilder {
        ModuleBuilder::new(name)
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    /// Imported modules in declaration order, forward references included
    pub fn imports(&self) -> Vec<ModuleRef> {
        self.imports.iter().map(Import::resolve).collect()
    }
}

impl fmt::Debug for ModuleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("global", &self.global)
            .field(
                "imports",
                &self
                    .imports
                    .iter()
                    .map(|import| match import {
                        Import::Module(module) => module.name(),
                        Import::Forward(_) => "<forward>",
                    })
                    .collect::<Vec<_>>(),
            )
            .field("exports", &self.exports)
            .finish()
    }
}

//////////////////////////////////////////////////////////////////////
///
/// Collects the four lists a module exposes to the container: imports,
/// providers, controllers and exports, plus the global flag.
pub struct ModuleBuilder {
    name: String,
    global: bool,
    imports: Vec<Import>,
    providers: Vec<Provider>,
    controllers: Vec<Provider>,
    exports: Vec<Token>,
    exported_modules: Vec<ModuleId>,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        ModuleBuilder {
            name: name.into(),
            global: false,
            imports: Vec::new(),
            providers: Vec::new(),
            controllers: Vec::new(),
            exports: Vec::new(),
            exported_modules: Vec::new(),
        }
    }
}

impl ModuleBuilder {
    pub fn import(mut self, module: &ModuleRef) -> Self {
        self.imports.push(Import::Module(module.clone()));
        self
    }

    /// Imports a module that may not be built yet
    ///
    /// The closure runs once when the container registers this module, which
    /// lets two lazily built modules refer to each other. It must hand out the
    /// same definition every time, usually a clone out of a `LazyLock`. A
    /// closure building a fresh definition per call never closes a cycle.
    pub fn import_forward(mut self, module: impl Fn() -> ModuleRef + Send + Sync + 'static) -> Self {
        self.imports.push(Import::Forward(Arc::new(module)));
        self
    }

    pub fn provider(mut self, provider: impl Into<Provider>) -> Self {
        self.providers.push(provider.into());
        self
    }

    pub fn controller<T: Constructible>(mut self) -> Self {
        self.controllers.push(Provider::class::<T>());
        self
    }

    /// Makes a provided token visible to importing modules
    pub fn export(mut self, token: impl Into<Token>) -> Self {
        self.exports.push(token.into());
        self
    }

    /// Re-exports an imported module, its exports become visible to importers
    pub fn export_module(mut self, module: &ModuleRef) -> Self {
        self.exported_modules.push(module.id());
        self
    }

    /// Exports of a global module are visible everywhere without importing it
    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }

    pub fn build(self) -> ModuleRef {
        Arc::new(ModuleDefinition {
            id: ModuleId::next(),
            name: self.name,
            global: self.global,
            imports: self.imports,
            providers: self.providers,
            controllers: self.controllers,
            exports: self.exports,
            exported_modules: self.exported_modules,
        })
    }
}

/// Module graph node held by the container
pub struct Module {
    id: ModuleId,
    name: String,
    global: bool,
    providers: HashMap<Token, Arc<InstanceWrapper>>,
    controllers: HashMap<Token, Arc<InstanceWrapper>>,
    exports: HashSet<Token>,
    exported_modules: HashSet<ModuleId>,
    /// In declaration order, globals appended after scanning
    imports: Vec<ModuleId>,
}

impl Module {
    /// Creates the node and one wrapper per declared provider and controller
    ///
    /// `imports` are the already resolved imports of `definition`.
    pub(crate) fn from_definition(
        definition: &ModuleDefinition,
        imports: &[ModuleRef],
    ) -> Result<Self, ModuleGraphError> {
        let mut module = Module {
            id: definition.id,
            name: definition.name.clone(),
            global: definition.global,
            providers: HashMap::new(),
            controllers: HashMap::new(),
            exports: definition.exports.iter().cloned().collect(),
            exported_modules: definition.exported_modules.iter().copied().collect(),
            imports: Vec::new(),
        };

        for provider in &definition.providers {
            module.add_provider(provider.clone())?;
        }
        for controller in &definition.controllers {
            module.add_controller(controller.clone())?;
        }
        for import in imports {
            module.add_import(import.id());
        }
        for re_export in &module.exported_modules {
            if !module.imports.contains(re_export) {
                tracing::warn!(
                    "Module '{}' re-exports a module it does not import, it will not be visible",
                    module.name
                );
            }
        }

        for token in &module.exports {
            if !module.providers.contains_key(token) {
                tracing::warn!(
                    "Module '{}' exports {token} without providing it, it will not be visible",
                    module.name
                );
            }
        }

        Ok(module)
    }

    fn add_provider(&mut self, provider: Provider) -> Result<(), ModuleGraphError> {
        let wrapper = self.wrap(provider)?;
        self.providers.insert(wrapper.token().clone(), wrapper);
        Ok(())
    }

    fn add_controller(&mut self, controller: Provider) -> Result<(), ModuleGraphError> {
        let wrapper = self.wrap(controller)?;
        self.controllers.insert(wrapper.token().clone(), wrapper);
        Ok(())
    }

    fn wrap(&self, provider: Provider) -> Result<Arc<InstanceWrapper>, ModuleGraphError> {
        let (token, scope, recipe) = provider.into_parts();
        if self.local(&token).is_some() {
            return Err(ModuleGraphError::DuplicateProvider {
                module: self.name.clone(),
                token,
            });
        }
        Ok(Arc::new(InstanceWrapper::new(token, scope, recipe, self.id)))
    }

    /// Adds an import unless it is already present or the module itself
    pub(crate) fn add_import(&mut self, module: ModuleId) -> bool {
        if module == self.id || self.imports.contains(&module) {
            return false;
        }
        self.imports.push(module);
        true
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    pub fn providers(&self) -> &HashMap<Token, Arc<InstanceWrapper>> {
        &self.providers
    }

    pub fn controllers(&self) -> &HashMap<Token, Arc<InstanceWrapper>> {
        &self.controllers
    }

    pub fn exports(&self) -> &HashSet<Token> {
        &self.exports
    }

    pub fn imports(&self) -> &[ModuleId] {
        &self.imports
    }

    /// Whether an imported module's exports are passed on to importers
    pub fn re_exports(&self, module: ModuleId) -> bool {
        self.exported_modules.contains(&module)
    }

    /// Own provider or controller, exported or not
    pub fn local(&self, token: &Token) -> Option<&Arc<InstanceWrapper>> {
        self.providers
            .get(token)
            .or_else(|| self.controllers.get(token))
    }

    /// Provider visible from outside: present in both providers and exports
    pub fn exported_provider(&self, token: &Token) -> Option<&Arc<InstanceWrapper>> {
        if !self.exports.contains(token) {
            return None;
        }
        self.providers.get(token)
    }

    /// Whether `wrapper` belongs to this module
    pub fn owns(&self, wrapper: &InstanceWrapper) -> bool {
        self.local(wrapper.token())
            .is_some_and(|own| own.id() == wrapper.id())
    }

    /// Providers then controllers, each in declaration order
    pub fn wrappers(&self) -> Vec<&Arc<InstanceWrapper>> {
        let mut providers: Vec<_> = self.providers.values().collect();
        providers.sort_by_key(|wrapper| wrapper.id());
        let mut controllers: Vec<_> = self.controllers.values().collect();
        controllers.sort_by_key(|wrapper| wrapper.id());
        providers.extend(controllers);
        providers
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("controllers", &self.controllers.keys().collect::<Vec<_>>())
            .field("exports", &self.exports)
            .field("imports", &self.imports)
            .finish()
    }
}
