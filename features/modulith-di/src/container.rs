use std::{
    collections::{BTreeMap, HashSet},
    fmt::Debug,
    sync::Arc,
};

use crate::{
    context::ContextId,
    dependency_graph::{DependencyGraph, DependencyGraphErrors, GraphNode},
    errors::{InitError, InjectError, ModuleGraphError},
    instance_wrapper::{InstanceWrapper, RecordedDependencies, RecordedDependency},
    module::{Module, ModuleBuilder, ModuleId, ModuleRef},
    provider::{DependencyInfo, Provider},
    token::{Token, REQUEST},
    types::Instance,
};

const CORE_MODULE_NAME: &str = "InternalCoreModule";

/// Registry of every module reachable from the entry module
///
/// Populated once during bootstrap. Afterwards only the per-context caches
/// of the wrappers change.
#[derive(Default)]
pub struct Container {
    modules: BTreeMap<ModuleId, Module>,
    /// Registration order, the entry module's subtree comes depth first
    order: Vec<ModuleId>,
    global_modules: Vec<ModuleId>,
    core_module: Option<ModuleId>,
    graph: Option<DependencyGraph>,
}

impl Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_struct("Container");
        for module in self.modules() {
            let tokens = module
                .wrappers()
                .into_iter()
                .map(|wrapper| wrapper.token().to_string())
                .collect::<Vec<_>>();
            map.field(module.name(), &tokens);
        }
        map.finish()
    }
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `module` and everything it imports
    ///
    /// Modules already registered are skipped, so diamond shaped import
    /// graphs register each module once. Import cycles are rejected.
    pub fn add_module(&mut self, module: &ModuleRef) -> Result<ModuleId, ModuleGraphError> {
        let mut path = Vec::new();
        self.add_module_recurse(module, &mut path)?;
        Ok(module.id())
    }

    fn add_module_recurse(
        &mut self,
        definition: &ModuleRef,
        path: &mut Vec<ModuleRef>,
    ) -> Result<(), ModuleGraphError> {
        if let Some(start) = path.iter().position(|seen| seen.id() == definition.id()) {
            let chain = path[start..]
                .iter()
                .chain(std::iter::once(definition))
                .map(|module| module.name().to_string())
                .collect();
            return Err(ModuleGraphError::CircularImport { chain });
        }
        if self.modules.contains_key(&definition.id()) {
            return Ok(());
        }

        let imports = definition.imports();
        let module = Module::from_definition(definition, &imports)?;
        tracing::debug!(
            "Registered module '{}' with {} providers and {} controllers",
            module.name(),
            module.providers().len(),
            module.controllers().len()
        );
        if module.is_global() {
            self.global_modules.push(module.id());
        }
        self.order.push(module.id());
        self.modules.insert(module.id(), module);

        path.push(definition.clone());
        for import in &imports {
            self.add_module_recurse(import, path)?;
        }
        path.pop();

        Ok(())
    }

    /// Registers the global module hosting the ambient request value
    pub fn register_core_module(&mut self) -> Result<ModuleId, ModuleGraphError> {
        if let Some(core) = self.core_module {
            return Ok(core);
        }
        let core = ModuleBuilder::new(CORE_MODULE_NAME)
            .provider(Provider::ambient(REQUEST.clone()))
            .export(REQUEST.clone())
            .global()
            .build();
        let id = self.add_module(&core)?;
        self.core_module = Some(id);
        Ok(id)
    }

    /// Adds every global module as an import of every other module
    pub fn bind_global_modules(&mut self) {
        for global in self.global_modules.clone() {
            for module in self.modules.values_mut() {
                if module.add_import(global) {
                    tracing::trace!("Bound global module into '{}'", module.name());
                }
            }
        }
    }

    /// Finds the wrapper `token` refers to when requested from `from`
    ///
    /// Own providers and controllers come first. Then every import in
    /// declaration order, each one's exports followed by whatever it
    /// re-exports. The first match wins.
    pub fn lookup(&self, token: &Token, from: ModuleId) -> Option<(&Arc<InstanceWrapper>, &Module)> {
        let module = self.modules.get(&from)?;
        if let Some(wrapper) = module.local(token) {
            return Some((wrapper, module));
        }

        let mut visited = HashSet::from([from]);
        module
            .imports()
            .iter()
            .find_map(|import| self.exported_from(token, *import, &mut visited))
    }

    fn exported_from(
        &self,
        token: &Token,
        id: ModuleId,
        visited: &mut HashSet<ModuleId>,
    ) -> Option<(&Arc<InstanceWrapper>, &Module)> {
        if !visited.insert(id) {
            return None;
        }
        let module = self.modules.get(&id)?;
        if let Some(wrapper) = module.exported_provider(token) {
            return Some((wrapper, module));
        }
        module
            .imports()
            .iter()
            .filter(|nested| module.re_exports(**nested))
            .find_map(|nested| self.exported_from(token, *nested, visited))
    }

    /// Resolves every declared dependency once and validates the result
    ///
    /// All missing and circular dependencies are reported together.
    pub fn link(&mut self) -> Result<(), DependencyGraphErrors> {
        let mut graph = DependencyGraph::new();

        for module in self.modules() {
            for wrapper in module.wrappers() {
                let constructor = self.record(wrapper.recipe().parameters(), module.id());
                let properties = wrapper
                    .recipe()
                    .properties()
                    .into_iter()
                    .map(|(key, dependency)| {
                        let recorded = self.record_one(dependency, module.id());
                        (key, recorded)
                    })
                    .collect::<Vec<_>>();

                let edges = constructor
                    .iter()
                    .chain(properties.iter().map(|(_, recorded)| recorded))
                    .map(|recorded| {
                        let target = recorded
                            .target
                            .as_ref()
                            .and_then(|target| target.upgrade())
                            .map(|target| target.id());
                        (recorded.dependency.clone(), target)
                    })
                    .collect();
                let node = GraphNode {
                    token: wrapper.token().clone(),
                    module: module.name().to_string(),
                };
                graph.add(wrapper.id(), node, edges);

                if !wrapper.record_dependencies(RecordedDependencies {
                    constructor,
                    properties,
                }) {
                    tracing::trace!("{} was already linked", wrapper.token());
                }
            }
        }

        graph.check()?;

        tracing::debug!("Linked {} providers and controllers", graph.len());
        self.graph = Some(graph);
        Ok(())
    }

    fn record(&self, dependencies: Vec<DependencyInfo>, from: ModuleId) -> Vec<RecordedDependency> {
        dependencies
            .into_iter()
            .map(|dependency| self.record_one(dependency, from))
            .collect()
    }

    fn record_one(&self, dependency: DependencyInfo, from: ModuleId) -> RecordedDependency {
        let target = self
            .lookup(&dependency.token, from)
            .map(|(wrapper, _)| Arc::downgrade(wrapper));
        RecordedDependency { dependency, target }
    }

    /// Registers the core module, the entry module's graph and links it
    pub fn scan(&mut self, entry: &ModuleRef) -> Result<ModuleId, InitError> {
        self.register_core_module()?;
        let entry = self.add_module(entry)?;
        self.bind_global_modules();
        self.link()?;
        Ok(entry)
    }

    /// Seeds the ambient request value of `context`
    pub fn register_request_provider(
        &self,
        request: Instance,
        context: ContextId,
    ) -> Result<(), InjectError> {
        let wrapper = self
            .core_module()
            .and_then(|core| core.local(&REQUEST))
            .ok_or(InjectError::AmbientModuleMissing)?;
        if context.is_static() {
            tracing::warn!("Seeding the request value into the static context has no effect");
        }
        wrapper.set_instance_by_context(context, request);
        Ok(())
    }

    /// Drops every instance created for `context`
    pub fn release_context(&self, context: ContextId) {
        for module in self.modules.values() {
            for wrapper in module.wrappers() {
                wrapper.release_context(context);
            }
        }
    }

    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(&id)
    }

    /// All modules in registration order
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.order.iter().filter_map(|id| self.modules.get(id))
    }

    pub fn global_modules(&self) -> impl Iterator<Item = &Module> {
        self.global_modules
            .iter()
            .filter_map(|id| self.modules.get(id))
    }

    pub fn core_module(&self) -> Option<&Module> {
        self.core_module.and_then(|id| self.modules.get(&id))
    }

    /// The validated dependency graph, present once linked
    pub fn graph(&self) -> Option<&DependencyGraph> {
        self.graph.as_ref()
    }

    pub fn is_linked(&self) -> bool {
        self.graph.is_some()
    }
}
