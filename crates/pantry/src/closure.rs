//! Dependency closure ordering.
//!
//! Turns a list of root cookbook names into an upload order over their
//! transitive closure: every dependency appears before each cookbook that
//! depends on it, and every name appears exactly once.

use std::collections::BTreeSet;

use pantry_types::CookbookRecord;

use crate::error::PantryError;

/// Read access to an already-resolved dependency graph.
pub trait DependencyGraph {
    /// Look up a cookbook's direct dependencies, in declared order.
    fn find(&self, name: &str) -> Result<CookbookRecord, PantryError>;
}

/// Compute the upload order for the closure of `roots`.
///
/// Depth-first post-order from each root in turn; a name is recorded only
/// after all of its dependencies have been recorded. Dependencies are
/// visited in the order the graph returns them, so the result is stable for
/// a given graph and root list.
pub fn resolve_closure<G>(graph: &G, roots: &[String]) -> Result<Vec<String>, PantryError>
where
    G: DependencyGraph + ?Sized,
{
    let mut walk = Walk {
        graph,
        seen: BTreeSet::new(),
        path: Vec::new(),
        order: Vec::new(),
    };
    for root in roots {
        walk.visit(root)?;
    }
    Ok(walk.order)
}

struct Walk<'g, G: ?Sized> {
    graph: &'g G,
    seen: BTreeSet<String>,
    /// Names currently being expanded, outermost first.
    path: Vec<String>,
    order: Vec<String>,
}

impl<G> Walk<'_, G>
where
    G: DependencyGraph + ?Sized,
{
    fn visit(&mut self, name: &str) -> Result<(), PantryError> {
        if let Some(start) = self.path.iter().position(|p| p == name) {
            let mut cycle = self.path[start..].to_vec();
            cycle.push(name.to_string());
            return Err(PantryError::DependencyCycle { path: cycle });
        }
        if !self.seen.insert(name.to_string()) {
            return Ok(());
        }

        let record = self.graph.find(name)?;
        self.path.push(name.to_string());
        for dep in record.dependency_names() {
            self.visit(dep)?;
        }
        self.path.pop();

        self.order.push(name.to_string());
        Ok(())
    }
}
