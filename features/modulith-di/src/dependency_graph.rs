use std::{
    collections::{BTreeMap, HashSet},
    fmt,
};

use thiserror::Error;

use crate::{instance_wrapper::WrapperId, provider::DependencyInfo, token::Token};

/// A provider as it appears in the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub token: Token,
    pub module: String,
}
impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in '{}'", self.token, self.module)
    }
}

/// Graph of every provider and controller after linking
///
/// Used to report unresolvable and circular dependencies up front, before
/// anything is constructed.
#[derive(Default)]
pub struct DependencyGraph {
    map: BTreeMap<WrapperId, DependencyGraphEntry>,
}
impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node with its dependencies
    ///
    /// A dependency target of `None` means nothing visible provides it.
    /// Wrapper ids are unique, so every wrapper is added exactly once.
    pub fn add(
        &mut self,
        id: WrapperId,
        node: GraphNode,
        dependencies: Vec<(DependencyInfo, Option<WrapperId>)>,
    ) {
        self.map.insert(id, DependencyGraphEntry { node, dependencies });
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Validate the graph
    ///
    /// Returns a list of all issues
    pub fn check(&self) -> Result<(), DependencyGraphErrors> {
        let mut checked = HashSet::new();
        let mut errors = Vec::new();
        for (id, entry) in &self.map {
            let mut dependency_chain = Vec::new();
            check_recurse(
                self,
                &mut checked,
                &mut errors,
                &mut dependency_chain,
                *id,
                entry,
            );
        }

        if !errors.is_empty() {
            return Err(DependencyGraphErrors { errors });
        }

        return Ok(());

        fn check_recurse(
            graph: &DependencyGraph,
            checked: &mut HashSet<WrapperId>,
            errors: &mut Vec<DependencyGraphError>,
            dependency_chain: &mut Vec<WrapperId>,
            id: WrapperId,
            entry: &DependencyGraphEntry,
        ) {
            // Circular Dependency Check
            if let Some(start) = dependency_chain.iter().position(|seen| *seen == id) {
                let chain = dependency_chain[start..]
                    .iter()
                    .chain(std::iter::once(&id))
                    .filter_map(|seen| graph.map.get(seen))
                    .map(|entry| entry.node.clone())
                    .collect();
                errors.push(DependencyGraphError::CircularDependency { chain });
                return;
            }

            // Skip other checks if already checked
            if !checked.insert(id) {
                return;
            };

            dependency_chain.push(id);

            for (dependency, target) in &entry.dependencies {
                let Some((next_id, next_entry)) =
                    target.and_then(|next| graph.map.get(&next).map(|entry| (next, entry)))
                else {
                    if !dependency.optional {
                        errors.push(DependencyGraphError::MissingDependency {
                            dependency: dependency.token.clone(),
                            required_by: entry.node.clone(),
                        });
                    }

                    continue;
                };

                check_recurse(graph, checked, errors, dependency_chain, next_id, next_entry);
            }

            dependency_chain.pop();
        }
    }
}

struct DependencyGraphEntry {
    node: GraphNode,
    dependencies: Vec<(DependencyInfo, Option<WrapperId>)>,
}

#[derive(Error, Debug, Clone)]
pub enum DependencyGraphError {
    #[error("{required_by} needs '{dependency}' but no visible provider exports it")]
    MissingDependency {
        dependency: Token,
        required_by: GraphNode,
    },
    #[error("A circular dependency exists: {}", display_chain(.chain))]
    CircularDependency { chain: Vec<GraphNode> },
}

fn display_chain(chain: &[GraphNode]) -> String {
    chain
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl fmt::Display for DependencyGraphErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut display = Vec::new();
        display.push("The dependency graph had one or more errors:".to_string());
        for error in &self.errors {
            display.push(format!("- {}", error));
        }
        f.write_str(&display.join("\n"))
    }
}

#[derive(Error, Debug, Clone)]
pub struct DependencyGraphErrors {
    pub errors: Vec<DependencyGraphError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        instance_wrapper::InstanceWrapper, module::ModuleId, provider::Recipe, provider::Scope,
        types::Instance,
    };

    fn id() -> WrapperId {
        InstanceWrapper::new(
            Token::from("node"),
            Scope::Singleton,
            Recipe::Value(Instance::new(())),
            ModuleId::next(),
        )
        .id()
    }

    fn node(name: &'static str) -> GraphNode {
        GraphNode {
            token: Token::from(name),
            module: "App".into(),
        }
    }

    #[test]
    fn reports_missing_required_dependencies_only() {
        let mut graph = DependencyGraph::new();
        graph.add(
            id(),
            node("service"),
            vec![
                (DependencyInfo::token("required"), None),
                (DependencyInfo::token("optional").optional(), None),
            ],
        );

        let errors = graph.check().unwrap_err().errors;
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            DependencyGraphError::MissingDependency { dependency, .. } if *dependency == Token::from("required")
        ));
    }

    #[test]
    fn reports_cycles_with_their_chain() {
        let (a, b) = (id(), id());
        let mut graph = DependencyGraph::new();
        graph.add(a, node("a"), vec![(DependencyInfo::token("b"), Some(b))]);
        graph.add(b, node("b"), vec![(DependencyInfo::token("a"), Some(a))]);

        let errors = graph.check().unwrap_err();
        let DependencyGraphError::CircularDependency { chain } = &errors.errors[0] else {
            panic!("expected a cycle, got {errors}");
        };
        assert_eq!(chain.first(), chain.last());
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn accepts_a_diamond() {
        let (top, left, right, bottom) = (id(), id(), id(), id());
        let mut graph = DependencyGraph::new();
        graph.add(
            top,
            node("top"),
            vec![
                (DependencyInfo::token("left"), Some(left)),
                (DependencyInfo::token("right"), Some(right)),
            ],
        );
        graph.add(
            left,
            node("left"),
            vec![(DependencyInfo::token("bottom"), Some(bottom))],
        );
        graph.add(
            right,
            node("right"),
            vec![(DependencyInfo::token("bottom"), Some(bottom))],
        );
        graph.add(bottom, node("bottom"), vec![]);

        assert!(graph.check().is_ok());
        assert_eq!(graph.len(), 4);
    }

    #[test]
    fn re_adding_a_wrapper_replaces_its_edges() {
        let (service, gone) = (id(), id());
        let mut graph = DependencyGraph::new();
        graph.add(
            service,
            node("service"),
            vec![(DependencyInfo::token("gone"), Some(gone))],
        );
        graph.add(service, node("service"), vec![]);

        assert_eq!(graph.len(), 1);
        assert!(graph.check().is_ok());
    }
}
