//! Name resolution and dependency computation.
//!
//! Walks the compiled tree once per run, opening a scope per SELECT and binding
//! its iterators in FROM order. Every identifier is resolved to an iterator, a
//! region or an implicit attribute of an iterator, and every node records the
//! set of iterators it reads.

use crate::ast::{CompiledValue, NodeId, Projection};
use crate::context::{Binding, Dependencies, ExecutionContext};
use crate::error::{QueryError, Result};

impl ExecutionContext<'_> {
    /// Resolves names and computes dependencies for the subtree rooted at `id`.
    pub(crate) fn compute_dependencies(&mut self, id: NodeId) -> Result<Dependencies> {
        if let Some(done) = self.dependencies.get(&id) {
            return Ok(done.clone());
        }
        let query = self.query;
        let deps = match query.node(id) {
            CompiledValue::Literal(_) | CompiledValue::BindArgument(_) => Dependencies::new(),
            CompiledValue::RegionPath(path) => {
                if !self.has_region(path) {
                    return Err(QueryError::unresolved(format!("region {} not found", path)));
                }
                Dependencies::new()
            }
            CompiledValue::Identifier(name) => {
                let binding = self.resolve_identifier(name)?;
                let deps = match &binding {
                    Binding::Iterator(def) | Binding::Implicit(def) => {
                        Dependencies::from_iter([*def])
                    }
                    Binding::Region(_) => Dependencies::new(),
                };
                self.bindings.insert(id, binding);
                deps
            }
            CompiledValue::MethodInvocation {
                receiver: None,
                name,
                args,
            } => {
                let def = self.implicit_receiver(name)?;
                self.bindings.insert(id, Binding::Implicit(def));
                let mut deps = Dependencies::from_iter([def]);
                for arg in args {
                    deps.extend(self.compute_dependencies(*arg)?);
                }
                deps
            }
            CompiledValue::Select(select) => {
                self.scopes.push(Vec::new());
                let result = self.select_dependencies(id, select);
                self.scopes.pop();
                let deps = result?;
                let own = &select.iterators;
                deps.into_iter().filter(|d| !own.contains(d)).collect()
            }
            _ => {
                let mut deps = Dependencies::new();
                for child in query.children(id) {
                    deps.extend(self.compute_dependencies(child)?);
                }
                deps
            }
        };
        self.dependencies.insert(id, deps.clone());
        Ok(deps)
    }

    fn select_dependencies(
        &mut self,
        id: NodeId,
        select: &crate::ast::SelectNode,
    ) -> Result<Dependencies> {
        let mut deps = Dependencies::new();
        for def in &select.iterators {
            let Some(collection) = self.query.iterator_collection(*def) else {
                continue;
            };
            let mut it_deps = self.compute_dependencies(collection)?;
            deps.extend(it_deps.iter().copied());
            it_deps.insert(*def);
            self.dependencies.insert(*def, it_deps);
            if let Some(scope) = self.scopes.last_mut() {
                scope.push(*def);
            }
        }
        let mut rest: Vec<NodeId> = Vec::new();
        if let Projection::Columns(fields) = &select.projection {
            rest.extend(fields.iter().map(|f| f.expr));
        }
        rest.extend(select.where_clause);
        rest.extend(select.order_by.iter().copied());
        rest.extend(select.limit);
        for node in rest {
            deps.extend(self.compute_dependencies(node)?);
        }
        tracing::trace!(select = id.index(), iterators = select.iterators.len(), "resolved scope");
        Ok(deps)
    }

    /// Resolves a bare identifier: iterator names win over region names, which
    /// win over implicit attributes.
    fn resolve_identifier(&self, name: &str) -> Result<Binding> {
        for scope in self.scopes.iter().rev() {
            if let Some(def) = scope
                .iter()
                .rev()
                .find(|def| self.query.iterator_name(**def) == Some(name))
            {
                return Ok(Binding::Iterator(*def));
            }
        }
        if self.has_region(name) {
            return Ok(Binding::Region(name.to_owned()));
        }
        self.implicit_receiver(name).map(Binding::Implicit)
    }

    /// Picks the iterator an implicit attribute or method is read from: the only
    /// iterator of the innermost scope that has any.
    fn implicit_receiver(&self, name: &str) -> Result<NodeId> {
        let Some(scope) = self.scopes.iter().rev().find(|s| !s.is_empty()) else {
            return Err(QueryError::unresolved(format!(
                "{} is not an iterator, region or attribute in scope",
                name
            )));
        };
        match scope.as_slice() {
            [only] => Ok(*only),
            candidates => Err(QueryError::Ambiguity {
                class: "<iterators>".into(),
                method: name.to_owned(),
                candidates: candidates
                    .iter()
                    .map(|def| self.query.canonical(*def))
                    .collect(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::context::Binding;
    use crate::error::QueryError;
    use crate::testing::{env_with_regions, with_context};

    #[test]
    fn test_identifier_resolution_order() {
        let env = env_with_regions(&["R", "S"]);
        with_context(&env, "SELECT * FROM /R p WHERE p.ID > 1 AND S.size > 0", |ctx| {
            let root = ctx.query.root();
            ctx.compute_dependencies(root).unwrap();
            let bindings: Vec<Binding> = ctx.bindings.values().cloned().collect();
            assert!(bindings.iter().any(|b| matches!(b, Binding::Iterator(_))));
            assert!(bindings.contains(&Binding::Region("S".into())));
        });
    }

    #[test]
    fn test_implicit_attribute_binds_single_iterator() {
        let env = env_with_regions(&["R"]);
        with_context(&env, "SELECT * FROM /R WHERE ID > 1", |ctx| {
            let root = ctx.query.root();
            ctx.compute_dependencies(root).unwrap();
            assert!(ctx.bindings.values().any(|b| matches!(b, Binding::Implicit(_))));
            // Top-level SELECT reads nothing from outside.
            assert!(ctx.dependencies_of(root).unwrap().is_empty());
        });
    }

    #[test]
    fn test_implicit_attribute_with_two_iterators_is_ambiguous() {
        let env = env_with_regions(&["R", "S"]);
        with_context(&env, "SELECT * FROM /R p, /S q WHERE ID > 1", |ctx| {
            let root = ctx.query.root();
            let err = ctx.compute_dependencies(root).unwrap_err();
            match &err {
                QueryError::Ambiguity { candidates, .. } => assert_eq!(candidates.len(), 2),
                other => panic!("unexpected {:?}", other),
            }
            assert!(err.to_string().contains(", "), "{err}");
        });
    }

    #[test]
    fn test_unknown_region() {
        let env = env_with_regions(&[]);
        with_context(&env, "SELECT * FROM /Missing", |ctx| {
            let root = ctx.query.root();
            let err = ctx.compute_dependencies(root).unwrap_err();
            assert!(matches!(err, QueryError::NameResolution(_)));
        });
    }

    #[test]
    fn test_correlated_subquery_depends_on_outer_iterator() {
        let env = env_with_regions(&["R"]);
        with_context(
            &env,
            "SELECT * FROM /R p WHERE p.ID IN (SELECT q.ID FROM /R q WHERE q.ID = p.ID)",
            |ctx| {
                let root = ctx.query.root();
                ctx.compute_dependencies(root).unwrap();
                let select = ctx.query.root_select().unwrap();
                let outer = select.iterators[0];
                let inner = ctx
                    .query
                    .select_ids()
                    .into_iter()
                    .find(|id| *id != root)
                    .unwrap();
                let deps = ctx.dependencies_of(inner).unwrap();
                assert_eq!(deps.len(), 1);
                assert!(deps.contains(&outer));
            },
        );
    }
}
