//! Concrete syntax tree for LogQL.
//!
//! The parser produces an owned [`GreenNode`] tree which is flattened into a
//! pre-order arena. Nodes are addressed through cheap [`Node`] handles that
//! know their parent, children and siblings.

use serde::Serialize;
use std::fmt;

macro_rules! node_kinds {
    ($($kind:ident),+ $(,)?) => {
        /// Type tag of a syntax tree node.
        ///
        /// `Error` always has id `0`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[repr(u16)]
        pub enum NodeKind {
            $(
                #[allow(missing_docs)]
                $kind,
            )+
        }

        impl NodeKind {
            /// Every node kind, ordered by id.
            pub const ALL: &'static [NodeKind] = &[$(NodeKind::$kind),+];

            /// Grammar production name of this kind.
            pub fn name(self) -> &'static str {
                match self {
                    $(NodeKind::$kind => stringify!($kind),)+
                }
            }
        }
    };
}

node_kinds! {
    Error,
    LogQL,
    Expr,
    LogExpr,
    LogRangeExpr,
    MetricExpr,
    Selector,
    Matchers,
    Matcher,
    Identifier,
    String,
    Number,
    Duration,
    Bytes,
    PipelineExpr,
    PipelineStage,
    LineFilters,
    LineFilter,
    Filter,
    FilterOp,
    Ip,
    OrFilter,
    LabelParser,
    Json,
    Logfmt,
    Unpack,
    Regexp,
    Pattern,
    JsonExpressionParser,
    LogfmtParser,
    LogfmtExpressionParser,
    ParserFlag,
    LabelExtractionExpressionList,
    LabelExtractionExpression,
    LabelFilter,
    IpLabelFilter,
    UnitFilter,
    DurationFilter,
    BytesFilter,
    NumberFilter,
    LineFormatExpr,
    LineFormat,
    LabelFormatExpr,
    LabelFormat,
    LabelsFormat,
    LabelFormatMatcher,
    Decolorize,
    DropLabelsExpr,
    Drop,
    DropLabels,
    DropLabel,
    KeepLabelsExpr,
    Keep,
    KeepLabels,
    KeepLabel,
    UnwrapExpr,
    Unwrap,
    ConvOp,
    Range,
    OffsetExpr,
    Offset,
    RangeAggregationExpr,
    RangeOp,
    VectorAggregationExpr,
    VectorOp,
    Grouping,
    By,
    Without,
    GroupingLabels,
    GroupingLabelList,
    BinOpExpr,
    BinOpModifier,
    OnOrIgnoringModifier,
    On,
    Ignoring,
    GroupLeft,
    GroupRight,
    Bool,
    LiteralExpr,
    VectorExpr,
    Vector,
    LabelReplaceExpr,
    LabelReplace,
    Eq,
    Neq,
    Re,
    Nre,
    Eql,
    Gtr,
    Gte,
    Lss,
    Lte,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    And,
    Or,
    Unless,
    Pipe,
    PipeExact,
    PipeMatch,
    PipePattern,
    NotPipePattern,
    Comma,
}

impl NodeKind {
    /// Numeric id of this kind.
    pub fn id(self) -> u16 {
        self as u16
    }

    /// Whether this kind is the reserved error kind.
    pub fn is_error(self) -> bool {
        self == NodeKind::Error
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Owned tree node built by the parser before flattening.
#[derive(Debug, Clone)]
pub(crate) struct GreenNode {
    pub kind: NodeKind,
    pub from: usize,
    pub to: usize,
    pub children: Vec<GreenNode>,
}

impl GreenNode {
    pub fn leaf(kind: NodeKind, from: usize, to: usize) -> Self {
        Self {
            kind,
            from,
            to,
            children: Vec::new(),
        }
    }

    /// Interior node spanning its children. Empty nodes sit at `fallback`.
    pub fn branch(kind: NodeKind, children: Vec<GreenNode>, fallback: usize) -> Self {
        let from = children.first().map_or(fallback, |c| c.from);
        let to = children.last().map_or(fallback, |c| c.to);
        Self {
            kind,
            from,
            to: to.max(from),
            children,
        }
    }

    /// Interior node with an explicit span, used when delimiters are not nodes.
    pub fn spanning(kind: NodeKind, from: usize, to: usize, children: Vec<GreenNode>) -> Self {
        Self {
            kind,
            from,
            to: to.max(from),
            children,
        }
    }

    pub fn error(from: usize, to: usize) -> Self {
        Self::leaf(NodeKind::Error, from, to)
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    from: usize,
    to: usize,
    parent: Option<usize>,
    children: Vec<usize>,
    /// One past the last arena index of this node's subtree.
    subtree_end: usize,
}

/// Parsed LogQL syntax tree.
///
/// Produced fresh by [`crate::logql::parse`]; immutable afterwards.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    nodes: Vec<NodeData>,
}

impl SyntaxTree {
    pub(crate) fn from_green(root: GreenNode) -> Self {
        let mut nodes = Vec::new();
        flatten(root, None, &mut nodes);
        Self { nodes }
    }

    /// The `LogQL` root node.
    pub fn root(&self) -> Node<'_> {
        Node { tree: self, id: 0 }
    }

    /// Lazy depth-first, pre-order traversal of every node.
    pub fn iter(&self) -> Descendants<'_> {
        Descendants {
            tree: self,
            next: 0,
            end: self.nodes.len(),
        }
    }

    /// Number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// A tree always has at least the root node.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether any error node exists.
    pub fn has_errors(&self) -> bool {
        self.iter().any(|n| n.is_error())
    }

    /// First node of the given kind in document order.
    pub fn find(&self, kind: NodeKind) -> Option<Node<'_>> {
        self.iter().find(|n| n.kind() == kind)
    }

    /// Every node of the given kind in document order.
    pub fn find_all(&self, kind: NodeKind) -> impl Iterator<Item = Node<'_>> + '_ {
        self.iter().filter(move |n| n.kind() == kind)
    }
}

fn flatten(green: GreenNode, parent: Option<usize>, nodes: &mut Vec<NodeData>) -> usize {
    let id = nodes.len();
    nodes.push(NodeData {
        kind: green.kind,
        from: green.from,
        to: green.to,
        parent,
        children: Vec::with_capacity(green.children.len()),
        subtree_end: id + 1,
    });

    for child in green.children {
        let child_id = flatten(child, Some(id), nodes);
        nodes[id].children.push(child_id);
    }

    nodes[id].subtree_end = nodes.len();
    id
}

/// Handle to one node of a [`SyntaxTree`].
#[derive(Clone, Copy)]
pub struct Node<'t> {
    tree: &'t SyntaxTree,
    id: usize,
}

impl<'t> Node<'t> {
    fn data(&self) -> &'t NodeData {
        &self.tree.nodes[self.id]
    }

    fn at(&self, id: usize) -> Node<'t> {
        Node {
            tree: self.tree,
            id,
        }
    }

    /// Node type tag.
    pub fn kind(&self) -> NodeKind {
        self.data().kind
    }

    /// Start byte offset (inclusive).
    pub fn from(&self) -> usize {
        self.data().from
    }

    /// End byte offset (exclusive).
    pub fn to(&self) -> usize {
        self.data().to
    }

    /// Whether this is an error node.
    pub fn is_error(&self) -> bool {
        self.kind().is_error()
    }

    /// Whether the span is empty.
    pub fn is_empty(&self) -> bool {
        self.from() == self.to()
    }

    /// Source text covered by this node.
    pub fn text<'s>(&self, src: &'s str) -> &'s str {
        src.get(self.from()..self.to()).unwrap_or("")
    }

    /// Parent node, `None` for the root.
    pub fn parent(&self) -> Option<Node<'t>> {
        self.data().parent.map(|id| self.at(id))
    }

    /// Ordered children.
    pub fn children(&self) -> impl DoubleEndedIterator<Item = Node<'t>> + 't {
        let tree = self.tree;
        self.data().children.iter().map(move |&id| Node { tree, id })
    }

    /// First child.
    pub fn first_child(&self) -> Option<Node<'t>> {
        self.data().children.first().map(|&id| self.at(id))
    }

    /// Last child.
    pub fn last_child(&self) -> Option<Node<'t>> {
        self.data().children.last().map(|&id| self.at(id))
    }

    /// First direct child of the given kind.
    pub fn child(&self, kind: NodeKind) -> Option<Node<'t>> {
        self.children().find(|c| c.kind() == kind)
    }

    /// Follows a chain of direct-child kinds, e.g. `[MetricExpr, LiteralExpr, Number]`.
    pub fn child_path(&self, path: &[NodeKind]) -> Option<Node<'t>> {
        path.iter().try_fold(*self, |node, &kind| node.child(kind))
    }

    fn sibling_index(&self) -> Option<(usize, &'t [usize])> {
        let parent = self.data().parent?;
        let siblings = &self.tree.nodes[parent].children;
        let index = siblings.iter().position(|&id| id == self.id)?;
        Some((index, siblings.as_slice()))
    }

    /// Next sibling in document order.
    pub fn next_sibling(&self) -> Option<Node<'t>> {
        let (index, siblings) = self.sibling_index()?;
        siblings.get(index + 1).map(|&id| self.at(id))
    }

    /// Previous sibling in document order.
    pub fn prev_sibling(&self) -> Option<Node<'t>> {
        let (index, siblings) = self.sibling_index()?;
        index.checked_sub(1).and_then(|i| siblings.get(i)).map(|&id| self.at(id))
    }

    /// Ancestors, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = Node<'t>> + 't {
        let tree = self.tree;
        std::iter::successors(self.data().parent, move |&id| tree.nodes[id].parent)
            .map(move |id| Node { tree, id })
    }

    /// This node and everything below it, depth-first pre-order.
    pub fn descendants(&self) -> Descendants<'t> {
        Descendants {
            tree: self.tree,
            next: self.id,
            end: self.data().subtree_end,
        }
    }

    /// Whether any error node exists in this subtree.
    pub fn has_error(&self) -> bool {
        self.descendants().any(|n| n.is_error())
    }

    /// Descends through first children to the leftmost leaf.
    pub fn leftmost_leaf(&self) -> Node<'t> {
        let mut node = *self;
        while let Some(child) = node.first_child() {
            node = child;
        }
        node
    }
}

impl PartialEq for Node<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

impl Eq for Node<'_> {}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}..{}", self.kind(), self.from(), self.to())
    }
}

/// Lazy pre-order iterator over a (sub)tree.
#[derive(Clone)]
pub struct Descendants<'t> {
    tree: &'t SyntaxTree,
    next: usize,
    end: usize,
}

impl<'t> Iterator for Descendants<'t> {
    type Item = Node<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let id = self.next;
        self.next += 1;
        Some(Node {
            tree: self.tree,
            id,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Descendants<'_> {}
