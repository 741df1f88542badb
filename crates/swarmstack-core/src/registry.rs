//! Component registry and dependency resolver.
//!
//! The registry is static data: which components exist, what they depend
//! on, and the fixed order used by quick start and reset. Whether a
//! dependency is satisfied is answered from the [`StateStore`].

use std::collections::VecDeque;

use crate::error::RegistryError;
use crate::state::StateStore;

pub const PREREQUISITES: &str = "prerequisites";
pub const TRAEFIK: &str = "traefik";
pub const PORTAINER: &str = "portainer";
pub const PGVECTOR: &str = "pgvector";
pub const EVOLUTION: &str = "evolution";
pub const CHATWOOT: &str = "chatwoot";

/// Static description of one installable component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// Swarm stack name, if the component is deployed as a stack.
    pub stack: Option<&'static str>,
    pub dependencies: &'static [&'static str],
}

const BUILTIN: &[ComponentSpec] = &[
    ComponentSpec {
        name: PREREQUISITES,
        description: "Docker engine, Swarm, overlay network and volumes",
        stack: None,
        dependencies: &[],
    },
    ComponentSpec {
        name: TRAEFIK,
        description: "Traefik reverse proxy with ACME TLS",
        stack: Some("traefik"),
        dependencies: &[PREREQUISITES],
    },
    ComponentSpec {
        name: PORTAINER,
        description: "Portainer container management UI",
        stack: Some("portainer"),
        dependencies: &[PREREQUISITES, TRAEFIK],
    },
    ComponentSpec {
        name: PGVECTOR,
        description: "PostgreSQL 16 with pgvector",
        stack: Some("pgvector"),
        dependencies: &[PREREQUISITES],
    },
    ComponentSpec {
        name: EVOLUTION,
        description: "Evolution API messaging gateway",
        stack: Some("evolution"),
        dependencies: &[PREREQUISITES, TRAEFIK, PGVECTOR],
    },
    ComponentSpec {
        name: CHATWOOT,
        description: "Chatwoot customer support",
        stack: Some("chatwoot"),
        dependencies: &[PREREQUISITES, TRAEFIK, PGVECTOR],
    },
];

const BUILTIN_ORDER: &[&str] = &[PREREQUISITES, TRAEFIK, PORTAINER, PGVECTOR, EVOLUTION, CHATWOOT];

/// Result of a dependency guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyCheck {
    /// Unsatisfied dependencies, in declaration order.
    pub missing: Vec<&'static str>,
}

impl DependencyCheck {
    pub fn is_satisfied(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Declared components plus the fixed bulk install order.
#[derive(Debug, Clone)]
pub struct Registry {
    specs: Vec<ComponentSpec>,
    install_order: Vec<&'static str>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Registry {
    /// The six components this installer knows how to deploy.
    pub fn builtin() -> Self {
        Self::new(BUILTIN.to_vec(), BUILTIN_ORDER.to_vec())
    }

    /// Build a registry from arbitrary specs. Call [`Registry::validate`]
    /// before trusting it.
    pub fn new(specs: Vec<ComponentSpec>, install_order: Vec<&'static str>) -> Self {
        Self {
            specs,
            install_order,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ComponentSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }

    /// Declared components, in declaration order.
    pub fn specs(&self) -> &[ComponentSpec] {
        &self.specs
    }

    fn require(&self, name: &str) -> Result<&ComponentSpec, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::UnknownComponent(name.to_string()))
    }

    /// Which declared dependencies of `name` are not installed.
    pub fn check_dependencies(
        &self,
        name: &str,
        store: &StateStore,
    ) -> Result<DependencyCheck, RegistryError> {
        let spec = self.require(name)?;
        let missing = spec
            .dependencies
            .iter()
            .copied()
            .filter(|dep| !store.is_installed(dep))
            .collect();
        Ok(DependencyCheck { missing })
    }

    /// Fixed order used by quick start.
    pub fn install_order(&self) -> &[&'static str] {
        &self.install_order
    }

    /// Exact reverse of [`Registry::install_order`], used by reset.
    pub fn removal_order(&self) -> Vec<&'static str> {
        self.install_order.iter().rev().copied().collect()
    }

    /// Components that declare `name` as a dependency.
    pub fn dependents(&self, name: &str) -> Vec<&'static str> {
        self.specs
            .iter()
            .filter(|spec| spec.dependencies.contains(&name))
            .map(|spec| spec.name)
            .collect()
    }

    /// Check the declared graph and the fixed install order.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for (i, spec) in self.specs.iter().enumerate() {
            if self.specs[..i].iter().any(|other| other.name == spec.name) {
                return Err(RegistryError::DuplicateComponent(spec.name.to_string()));
            }
        }

        for spec in &self.specs {
            for dep in spec.dependencies {
                if self.get(dep).is_none() {
                    return Err(RegistryError::UnknownDependency {
                        component: spec.name.to_string(),
                        dependency: dep.to_string(),
                    });
                }
            }
        }

        self.detect_cycle()?;
        self.check_install_order()
    }

    fn detect_cycle(&self) -> Result<(), RegistryError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Grey,
            Black,
        }

        fn visit(
            registry: &Registry,
            idx: usize,
            marks: &mut [Mark],
            path: &mut Vec<&'static str>,
        ) -> Result<(), RegistryError> {
            let spec = &registry.specs[idx];
            marks[idx] = Mark::Grey;
            path.push(spec.name);

            for dep in spec.dependencies {
                let Some(dep_idx) = registry.specs.iter().position(|s| s.name == *dep) else {
                    continue;
                };
                match marks[dep_idx] {
                    Mark::Grey => {
                        let start = path.iter().position(|n| n == dep).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|n| n.to_string()).collect();
                        cycle.push(dep.to_string());
                        return Err(RegistryError::Cycle(cycle));
                    }
                    Mark::White => visit(registry, dep_idx, marks, path)?,
                    Mark::Black => {}
                }
            }

            path.pop();
            marks[idx] = Mark::Black;
            Ok(())
        }

        let mut marks = vec![Mark::White; self.specs.len()];
        let mut path = Vec::new();
        for idx in 0..self.specs.len() {
            if marks[idx] == Mark::White {
                visit(self, idx, &mut marks, &mut path)?;
            }
        }
        Ok(())
    }

    fn check_install_order(&self) -> Result<(), RegistryError> {
        for spec in &self.specs {
            let count = self.install_order.iter().filter(|n| **n == spec.name).count();
            if count != 1 {
                return Err(RegistryError::IncompleteOrder(spec.name.to_string()));
            }
        }
        for name in &self.install_order {
            let spec = self.require(name)?;
            let pos = self.position(name);
            for dep in spec.dependencies {
                if self.position(dep) > pos {
                    return Err(RegistryError::OrderViolation {
                        component: name.to_string(),
                        dependency: dep.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn position(&self, name: &str) -> usize {
        self.install_order
            .iter()
            .position(|n| *n == name)
            .unwrap_or(usize::MAX)
    }

    /// Dependency-respecting order for the declared graph.
    ///
    /// Ties are broken by declaration order, so an already valid declaration
    /// sequence is returned unchanged.
    pub fn topological_order(&self) -> Result<Vec<&'static str>, RegistryError> {
        let n = self.specs.len();
        let mut indegree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (idx, spec) in self.specs.iter().enumerate() {
            for dep in spec.dependencies {
                let dep_idx = self
                    .specs
                    .iter()
                    .position(|s| s.name == *dep)
                    .ok_or_else(|| RegistryError::UnknownDependency {
                        component: spec.name.to_string(),
                        dependency: dep.to_string(),
                    })?;
                indegree[idx] += 1;
                dependents[dep_idx].push(idx);
            }
        }

        let mut ready: VecDeque<usize> = (0..n).filter(|i| indegree[*i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(idx) = ready.pop_front() {
            order.push(self.specs[idx].name);
            for &next in &dependents[idx] {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    // keep declaration order among newly freed nodes
                    let at = ready.iter().position(|r| *r > next).unwrap_or(ready.len());
                    ready.insert(at, next);
                }
            }
        }

        if order.len() != n {
            let stuck: Vec<String> = self
                .specs
                .iter()
                .enumerate()
                .filter(|(i, _)| indegree[*i] > 0)
                .map(|(_, s)| s.name.to_string())
                .collect();
            return Err(RegistryError::Cycle(stuck));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Metadata;
    use tempfile::tempdir;

    fn spec(name: &'static str, dependencies: &'static [&'static str]) -> ComponentSpec {
        ComponentSpec {
            name,
            description: "",
            stack: Some(name),
            dependencies,
        }
    }

    #[test]
    fn test_builtin_registry_is_valid() {
        let registry = Registry::builtin();
        registry.validate().unwrap();
        assert_eq!(registry.specs().len(), 6);
    }

    #[test]
    fn test_install_and_removal_order() {
        let registry = Registry::builtin();
        assert_eq!(
            registry.install_order(),
            &["prerequisites", "traefik", "portainer", "pgvector", "evolution", "chatwoot"]
        );
        assert_eq!(
            registry.removal_order(),
            vec!["chatwoot", "evolution", "pgvector", "portainer", "traefik", "prerequisites"]
        );
    }

    #[test]
    fn test_topological_order_agrees_with_fixed_order() {
        let registry = Registry::builtin();
        assert_eq!(registry.topological_order().unwrap(), registry.install_order());
    }

    #[test]
    fn test_missing_prerequisites_blocks_traefik() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path().join("state.json"));
        let registry = Registry::builtin();

        let check = registry.check_dependencies(TRAEFIK, &store).unwrap();
        assert!(!check.is_satisfied());
        assert_eq!(check.missing, vec!["prerequisites"]);
    }

    #[test]
    fn test_satisfied_after_prerequisites_installed() {
        let dir = tempdir().unwrap();
        let mut store = StateStore::open(dir.path().join("state.json"));
        store.set(PREREQUISITES, Metadata::new()).unwrap();
        let registry = Registry::builtin();

        let check = registry.check_dependencies(TRAEFIK, &store).unwrap();
        assert!(check.is_satisfied());
        assert!(check.missing.is_empty());
    }

    #[test]
    fn test_missing_keeps_declaration_order() {
        let dir = tempdir().unwrap();
        let mut store = StateStore::open(dir.path().join("state.json"));
        store.set(TRAEFIK, Metadata::new()).unwrap();
        let registry = Registry::builtin();

        let check = registry.check_dependencies(CHATWOOT, &store).unwrap();
        assert_eq!(check.missing, vec!["prerequisites", "pgvector"]);
    }

    #[test]
    fn test_unknown_component_is_an_error() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path().join("state.json"));
        let err = Registry::builtin()
            .check_dependencies("redis", &store)
            .unwrap_err();
        assert_eq!(err, RegistryError::UnknownComponent("redis".into()));
    }

    #[test]
    fn test_dependents() {
        let registry = Registry::builtin();
        assert_eq!(
            registry.dependents(PGVECTOR),
            vec!["evolution", "chatwoot"]
        );
        assert!(registry.dependents(CHATWOOT).is_empty());
    }

    #[test]
    fn test_validate_detects_cycle() {
        let registry = Registry::new(
            vec![spec("a", &["c"]), spec("b", &["a"]), spec("c", &["b"])],
            vec!["a", "b", "c"],
        );
        match registry.validate() {
            Err(RegistryError::Cycle(path)) => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
        assert!(matches!(
            registry.topological_order(),
            Err(RegistryError::Cycle(_))
        ));
    }

    #[test]
    fn test_validate_detects_unknown_dependency() {
        let registry = Registry::new(vec![spec("a", &["ghost"])], vec!["a"]);
        assert_eq!(
            registry.validate(),
            Err(RegistryError::UnknownDependency {
                component: "a".into(),
                dependency: "ghost".into(),
            })
        );
    }

    #[test]
    fn test_validate_detects_duplicates_and_bad_order() {
        let dup = Registry::new(vec![spec("a", &[]), spec("a", &[])], vec!["a"]);
        assert_eq!(
            dup.validate(),
            Err(RegistryError::DuplicateComponent("a".into()))
        );

        let misordered = Registry::new(vec![spec("a", &[]), spec("b", &["a"])], vec!["b", "a"]);
        assert_eq!(
            misordered.validate(),
            Err(RegistryError::OrderViolation {
                component: "b".into(),
                dependency: "a".into(),
            })
        );

        let partial = Registry::new(vec![spec("a", &[]), spec("b", &["a"])], vec!["a"]);
        assert_eq!(
            partial.validate(),
            Err(RegistryError::IncompleteOrder("b".into()))
        );
    }

    #[test]
    fn test_topological_order_reorders_dependents() {
        let registry = Registry::new(
            vec![spec("app", &["db", "proxy"]), spec("db", &[]), spec("proxy", &["db"])],
            vec!["db", "proxy", "app"],
        );
        assert_eq!(registry.topological_order().unwrap(), vec!["db", "proxy", "app"]);
    }
}
