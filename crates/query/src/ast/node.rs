//! Compiled value node definitions.

use tessera_core::Value;

/// Index of a node in a `CompiledQuery` arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Returns the arena index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    /// Returns the canonical operator text.
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "<>",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
        }
    }

    /// Returns the operator with its operands swapped (`a < b` == `b > a`).
    pub fn flip(self) -> Self {
        match self {
            ComparisonOp::Lt => ComparisonOp::Gt,
            ComparisonOp::Le => ComparisonOp::Ge,
            ComparisonOp::Gt => ComparisonOp::Lt,
            ComparisonOp::Ge => ComparisonOp::Le,
            op => op,
        }
    }

    /// Returns true for `<`, `<=`, `>`, `>=`.
    pub fn is_ordering(self) -> bool {
        !matches!(self, ComparisonOp::Eq | ComparisonOp::Ne)
    }
}

/// Logical junction operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JunctionOp {
    And,
    Or,
}

impl JunctionOp {
    pub fn keyword(self) -> &'static str {
        match self {
            JunctionOp::And => "AND",
            JunctionOp::Or => "OR",
        }
    }
}

/// Built-in functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Function {
    IsDefined,
    IsUndefined,
    Element,
}

impl Function {
    pub fn name(self) -> &'static str {
        match self {
            Function::IsDefined => "IS_DEFINED",
            Function::IsUndefined => "IS_UNDEFINED",
            Function::Element => "ELEMENT",
        }
    }
}

/// Collection constructor kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Set,
    List,
}

/// One node of a compiled query.
#[derive(Clone, Debug)]
pub enum CompiledValue {
    /// A constant.
    Literal(Value),
    /// A positional bind argument (`$1` is 1).
    BindArgument(usize),
    /// A bare name: iterator, region or implicit attribute.
    Identifier(String),
    /// Attribute navigation (`receiver.attribute`).
    Path { receiver: NodeId, attribute: String },
    /// Method call. Without a receiver the method is invoked on the implicit
    /// iterator that defines it.
    MethodInvocation {
        receiver: Option<NodeId>,
        name: String,
        args: Vec<NodeId>,
    },
    /// A region path (`/portfolios`).
    RegionPath(String),
    /// A FROM-clause entry.
    IteratorDef {
        name: Option<String>,
        collection: NodeId,
    },
    /// A binary comparison.
    Comparison {
        op: ComparisonOp,
        left: NodeId,
        right: NodeId,
    },
    /// AND / OR over two or more operands.
    Junction { op: JunctionOp, operands: Vec<NodeId> },
    /// Logical negation.
    Not(NodeId),
    /// Membership (`element IN collection`).
    In { element: NodeId, collection: NodeId },
    /// Pattern match (`operand LIKE pattern`).
    Like {
        operand: NodeId,
        pattern: NodeId,
        negated: bool,
    },
    /// A built-in function call.
    Function { function: Function, args: Vec<NodeId> },
    /// Positional access (`receiver[index]`).
    Index { receiver: NodeId, index: NodeId },
    /// `SET(..)` / `LIST(..)`.
    Construct {
        kind: CollectionKind,
        elements: Vec<NodeId>,
    },
    /// A SELECT, top level or nested.
    Select(Box<SelectNode>),
    /// One ORDER BY key.
    SortCriterion { expr: NodeId, descending: bool },
}

/// A projected output column.
#[derive(Clone, Debug)]
pub struct ProjectionField {
    pub name: String,
    pub expr: NodeId,
}

/// The SELECT list.
#[derive(Clone, Debug)]
pub enum Projection {
    /// `*`: the iterator values themselves.
    All,
    /// Explicit columns.
    Columns(Vec<ProjectionField>),
    /// `COUNT(*)`.
    Count,
}

/// How an ORDER BY key relates to the projected row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortMapping {
    /// Identical to projected column `n`.
    Column(usize),
    /// Computable from projected iterator values.
    Derived,
    /// Refers to data the projection drops.
    Unmapped,
}

/// An analysed ORDER BY key.
#[derive(Clone, Debug)]
pub struct SortKey {
    pub expr: NodeId,
    pub descending: bool,
    pub mapping: SortMapping,
}

/// Compile-time analysis attached to a SELECT by the transformer passes.
#[derive(Clone, Debug, Default)]
pub struct SelectPlan {
    /// ORDER BY keys with their projection mapping.
    pub sort_keys: Vec<SortKey>,
    /// True if some ORDER BY key is unmapped.
    pub has_unmapped_order_by: bool,
    /// True if GROUP BY was rewritten into DISTINCT ORDER BY.
    pub group_by_rewritten: bool,
    /// True if the SELECT shape allows a LIMIT to be handed to an index.
    pub limit_pushdown_eligible: bool,
}

/// A SELECT node.
#[derive(Clone, Debug)]
pub struct SelectNode {
    pub distinct: bool,
    pub projection: Projection,
    /// `IteratorDef` nodes in declaration order.
    pub iterators: Vec<NodeId>,
    pub where_clause: Option<NodeId>,
    pub group_by: Vec<NodeId>,
    /// `SortCriterion` nodes.
    pub order_by: Vec<NodeId>,
    /// A literal or bind argument.
    pub limit: Option<NodeId>,
    pub plan: SelectPlan,
}

impl SelectNode {
    /// Returns true if the SELECT projects more than one column.
    pub fn is_struct(&self) -> bool {
        match &self.projection {
            Projection::All => self.iterators.len() > 1,
            Projection::Columns(fields) => fields.len() > 1,
            Projection::Count => false,
        }
    }

    /// Returns true if the rows carry an ORDER BY.
    pub fn is_ordered(&self) -> bool {
        !self.order_by.is_empty()
    }

    pub fn is_count(&self) -> bool {
        matches!(self.projection, Projection::Count)
    }
}
