//! Compiled query tree.
//!
//! A query is compiled once into an arena of `CompiledValue` nodes addressed by
//! `NodeId`. The arena is immutable after compilation and shared by every run of
//! the query; per-run state lives in the execution context, keyed by `NodeId`.

mod canonical;
mod node;

pub use canonical::{decapitalize, getter_property, RootKind};
pub use node::{
    CollectionKind, CompiledValue, ComparisonOp, Function, JunctionOp, NodeId, Projection,
    ProjectionField, SelectNode, SelectPlan, SortKey, SortMapping,
};

/// A compiled query: the node arena plus its root.
#[derive(Clone, Debug)]
pub struct CompiledQuery {
    text: String,
    nodes: Vec<CompiledValue>,
    root: NodeId,
    traced: bool,
    bind_count: usize,
}

impl CompiledQuery {
    pub(crate) fn new(
        text: impl Into<String>,
        nodes: Vec<CompiledValue>,
        root: NodeId,
        traced: bool,
    ) -> Self {
        let bind_count = nodes
            .iter()
            .filter_map(|n| match n {
                CompiledValue::BindArgument(i) => Some(*i),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        Self {
            text: text.into(),
            nodes,
            root,
            traced,
            bind_count,
        }
    }

    /// Returns the original query text (without the `<trace>` hint).
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns a node.
    pub fn node(&self, id: NodeId) -> &CompiledValue {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut CompiledValue {
        &mut self.nodes[id.index()]
    }

    /// Appends a node created by a compile pass.
    pub(crate) fn push(&mut self, value: CompiledValue) -> NodeId {
        self.nodes.push(value);
        NodeId((self.nodes.len() - 1) as u32)
    }

    /// Returns the number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns true if the query carried the `<trace>` hint.
    pub fn is_traced(&self) -> bool {
        self.traced
    }

    /// Returns the highest bind argument position referenced (`$3` gives 3).
    pub fn bind_count(&self) -> usize {
        self.bind_count
    }

    /// Returns a SELECT node, if `id` is one.
    pub fn select(&self, id: NodeId) -> Option<&SelectNode> {
        match self.node(id) {
            CompiledValue::Select(select) => Some(select),
            _ => None,
        }
    }

    /// Returns the top-level SELECT, if the query is one.
    pub fn root_select(&self) -> Option<&SelectNode> {
        self.select(self.root)
    }

    /// Returns the ids of every SELECT node, outermost first.
    pub fn select_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = (0..self.nodes.len() as u32)
            .map(NodeId)
            .filter(|id| self.select(*id).is_some())
            .collect();
        // Children are pushed before their parent, so reverse to get outermost first.
        ids.reverse();
        ids
    }

    /// Returns the iterator name bound by an `IteratorDef` node.
    pub fn iterator_name(&self, id: NodeId) -> Option<&str> {
        match self.node(id) {
            CompiledValue::IteratorDef { name, .. } => name.as_deref(),
            _ => None,
        }
    }

    /// Returns the collection expression of an `IteratorDef` node.
    pub fn iterator_collection(&self, id: NodeId) -> Option<NodeId> {
        match self.node(id) {
            CompiledValue::IteratorDef { collection, .. } => Some(*collection),
            _ => None,
        }
    }

    /// Returns the direct children of a node.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        match self.node(id) {
            CompiledValue::Literal(_)
            | CompiledValue::BindArgument(_)
            | CompiledValue::Identifier(_)
            | CompiledValue::RegionPath(_) => Vec::new(),
            CompiledValue::Path { receiver, .. } => vec![*receiver],
            CompiledValue::MethodInvocation { receiver, args, .. } => {
                receiver.iter().chain(args.iter()).copied().collect()
            }
            CompiledValue::IteratorDef { collection, .. } => vec![*collection],
            CompiledValue::Comparison { left, right, .. } => vec![*left, *right],
            CompiledValue::Junction { operands, .. } => operands.clone(),
            CompiledValue::Not(inner) => vec![*inner],
            CompiledValue::In {
                element,
                collection,
            } => vec![*element, *collection],
            CompiledValue::Like {
                operand, pattern, ..
            } => vec![*operand, *pattern],
            CompiledValue::Function { args, .. } => args.clone(),
            CompiledValue::Index { receiver, index } => vec![*receiver, *index],
            CompiledValue::Construct { elements, .. } => elements.clone(),
            CompiledValue::SortCriterion { expr, .. } => vec![*expr],
            CompiledValue::Select(select) => {
                let mut children = select.iterators.clone();
                if let Projection::Columns(fields) = &select.projection {
                    children.extend(fields.iter().map(|f| f.expr));
                }
                children.extend(select.where_clause);
                children.extend(select.group_by.iter().copied());
                children.extend(select.order_by.iter().copied());
                children.extend(select.limit);
                children
            }
        }
    }

    /// Returns true if the subtree rooted at `id` contains a node matching `pred`.
    /// Nested SELECTs are searched too.
    pub fn any_node(&self, id: NodeId, pred: &dyn Fn(&CompiledValue) -> bool) -> bool {
        if pred(self.node(id)) {
            return true;
        }
        self.children(id).into_iter().any(|c| self.any_node(c, pred))
    }
}

/// Arena builder used by the parser.
#[derive(Debug, Default)]
pub(crate) struct QueryBuilder {
    nodes: Vec<CompiledValue>,
}

impl QueryBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, value: CompiledValue) -> NodeId {
        self.nodes.push(value);
        NodeId((self.nodes.len() - 1) as u32)
    }

    pub(crate) fn node(&self, id: NodeId) -> &CompiledValue {
        &self.nodes[id.index()]
    }

    pub(crate) fn finish(self, text: &str, root: NodeId, traced: bool) -> CompiledQuery {
        CompiledQuery::new(text, self.nodes, root, traced)
    }
}
