//! Dependency planning for a render request.
//!
//! Splits the requested codes into registry-owned and foreign codes, walks
//! declared dependencies transitively, detects cycles, and groups the
//! registry-owned codes into levels: every code's dependencies live in
//! strictly earlier levels, so each level can run fully in parallel.

use std::collections::{HashMap, HashSet};

use crate::injectable::InjectorRegistry;

use super::ResolutionError;

/// Execution plan for the registry-owned part of a request.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ResolutionPlan {
    /// Codes grouped by dependency depth; level 0 has no dependencies.
    pub levels: Vec<Vec<String>>,
    /// Requested codes that no registered injector owns.
    pub foreign: Vec<String>,
    /// Dependencies declared by some injector but not registered; the
    /// engine asks the provider for them.
    pub unregistered_dependencies: Vec<String>,
}

impl ResolutionPlan {
    pub fn injector_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done(usize),
}

/// Build the plan for `requested` (duplicates are ignored).
pub fn plan(
    registry: &InjectorRegistry,
    requested: &[String],
) -> Result<ResolutionPlan, ResolutionError> {
    let mut walker = Walker {
        registry,
        marks: HashMap::new(),
        order: Vec::new(),
        stack: Vec::new(),
        missing: Vec::new(),
        missing_seen: HashSet::new(),
    };
    let mut foreign = Vec::new();
    let mut foreign_seen = HashSet::new();

    for code in requested {
        if registry.contains(code) {
            walker.visit(code)?;
        } else if foreign_seen.insert(code.as_str()) {
            foreign.push(code.clone());
        }
    }

    let mut levels: Vec<Vec<String>> = Vec::new();
    for code in walker.order {
        if let Some(Mark::Done(level)) = walker.marks.get(&code) {
            if levels.len() <= *level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[*level].push(code);
        }
    }

    Ok(ResolutionPlan {
        levels,
        foreign,
        unregistered_dependencies: walker.missing,
    })
}

struct Walker<'a> {
    registry: &'a InjectorRegistry,
    marks: HashMap<String, Mark>,
    /// Post-order of finished codes; stable for a given request.
    order: Vec<String>,
    stack: Vec<String>,
    missing: Vec<String>,
    missing_seen: HashSet<String>,
}

impl Walker<'_> {
    /// Depth-first visit returning the level of `code`.
    fn visit(&mut self, code: &str) -> Result<usize, ResolutionError> {
        match self.marks.get(code) {
            Some(Mark::Done(level)) => return Ok(*level),
            Some(Mark::Visiting) => {
                let start = self
                    .stack
                    .iter()
                    .position(|c| c == code)
                    .unwrap_or(0);
                let mut cycle: Vec<String> = self.stack[start..].to_vec();
                cycle.push(code.to_string());
                return Err(ResolutionError::CircularDependency(cycle));
            }
            None => {}
        }

        let Ok(injector) = self.registry.lookup(code) else {
            // Callers only visit registered codes; dependencies are
            // filtered below.
            return Ok(0);
        };

        self.marks.insert(code.to_string(), Mark::Visiting);
        self.stack.push(code.to_string());

        let mut level = 0;
        for dep in injector.dependencies() {
            if !self.registry.contains(&dep) {
                if self.missing_seen.insert(dep.clone()) {
                    self.missing.push(dep);
                }
                continue;
            }
            level = level.max(self.visit(&dep)? + 1);
        }

        self.stack.pop();
        self.marks.insert(code.to_string(), Mark::Done(level));
        self.order.push(code.to_string());
        Ok(level)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::injectable::{DataType, FnInjector, RegistryBuilder};

    fn injector(code: &str, deps: &[&str]) -> FnInjector {
        FnInjector::new(code, DataType::Text, |_, _| async { Ok(None) }).depends_on(deps)
    }

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn independent_codes_share_level_zero() {
        let mut b = RegistryBuilder::empty();
        b.register(injector("a", &[])).unwrap();
        b.register(injector("b", &[])).unwrap();
        let plan = plan(&b.build(), &codes(&["a", "b"])).unwrap();
        assert_eq!(plan.levels, vec![codes(&["a", "b"])]);
        assert!(plan.foreign.is_empty());
    }

    #[test]
    fn dependencies_land_in_earlier_levels() {
        let mut b = RegistryBuilder::empty();
        b.register(injector("total", &["subtotal", "tax"])).unwrap();
        b.register(injector("tax", &["subtotal"])).unwrap();
        b.register(injector("subtotal", &[])).unwrap();
        let plan = plan(&b.build(), &codes(&["total"])).unwrap();
        assert_eq!(
            plan.levels,
            vec![codes(&["subtotal"]), codes(&["tax"]), codes(&["total"])]
        );
        assert_eq!(plan.injector_count(), 3);
    }

    #[test]
    fn cycle_fails_fast_with_path() {
        let mut b = RegistryBuilder::empty();
        b.register(injector("a", &["b"])).unwrap();
        b.register(injector("b", &["c"])).unwrap();
        b.register(injector("c", &["a"])).unwrap();
        assert_matches!(
            plan(&b.build(), &codes(&["a"])),
            Err(ResolutionError::CircularDependency(path)) if path == codes(&["a", "b", "c", "a"])
        );
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut b = RegistryBuilder::empty();
        b.register(injector("a", &["a"])).unwrap();
        assert_matches!(
            plan(&b.build(), &codes(&["a"])),
            Err(ResolutionError::CircularDependency(_))
        );
    }

    #[test]
    fn foreign_and_unregistered_dependencies_are_collected() {
        let mut b = RegistryBuilder::empty();
        b.register(injector("a", &["ghost"])).unwrap();
        let plan = plan(
            &b.build(),
            &codes(&["a", "intake:q1", "unknown", "intake:q1"]),
        )
        .unwrap();
        assert_eq!(plan.foreign, codes(&["intake:q1", "unknown"]));
        assert_eq!(plan.unregistered_dependencies, codes(&["ghost"]));
        assert_eq!(plan.levels, vec![codes(&["a"])]);
    }

    #[test]
    fn duplicates_are_planned_once() {
        let mut b = RegistryBuilder::empty();
        b.register(injector("a", &[])).unwrap();
        let plan = plan(&b.build(), &codes(&["a", "a"])).unwrap();
        assert_eq!(plan.injector_count(), 1);
    }
}
