//! Error-tolerant recursive-descent parser for LogQL.
//!
//! Parsing never fails: anything unexpected is wrapped in an `Error` node and
//! anything missing becomes an empty `Error` node placed at the end of the
//! previous token. Binary operators use precedence climbing.

use super::lexer::{is_terminated_string, tokenize, Token, TokenKind};
use super::syntax::{GreenNode, NodeKind, SyntaxTree};

const MAX_DEPTH: usize = 128;

const RANGE_OPS: &[&str] = &[
    "absent_over_time",
    "avg_over_time",
    "bytes_over_time",
    "bytes_rate",
    "count_over_time",
    "first_over_time",
    "last_over_time",
    "max_over_time",
    "min_over_time",
    "quantile_over_time",
    "rate",
    "rate_counter",
    "stddev_over_time",
    "stdvar_over_time",
    "sum_over_time",
];

const VECTOR_OPS: &[&str] = &[
    "approx_topk",
    "avg",
    "bottomk",
    "count",
    "max",
    "min",
    "sort",
    "sort_desc",
    "stddev",
    "stdvar",
    "sum",
    "topk",
];

const CONV_OPS: &[&str] = &["bytes", "duration", "duration_seconds"];

/// Words that end a label filter chain instead of starting a new term.
const FILTER_STOP_WORDS: &[&str] = &[
    "and", "bool", "by", "ignoring", "offset", "on", "or", "unless", "unwrap", "without",
];

/// Parses LogQL source into a syntax tree. Never fails.
pub fn parse(src: &str) -> SyntaxTree {
    let mut parser = Parser::new(src);
    let root = parser.parse_root();
    SyntaxTree::from_green(root)
}

struct Parser<'s> {
    src: &'s str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl<'s> Parser<'s> {
    fn new(src: &'s str) -> Self {
        Self {
            src,
            tokens: tokenize(src),
            pos: 0,
            depth: 0,
        }
    }

    // ---- token helpers ----

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_nth(&self, n: usize) -> Option<Token> {
        self.tokens.get(self.pos + n).copied()
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn nth_kind(&self, n: usize) -> Option<TokenKind> {
        self.peek_nth(n).map(|t| t.kind)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn text(&self, token: Token) -> &'s str {
        token.text(self.src)
    }

    fn at_word(&self, word: &str) -> bool {
        self.peek()
            .is_some_and(|t| t.kind == TokenKind::Ident && self.text(t) == word)
    }

    fn nth_is_word(&self, n: usize, word: &str) -> bool {
        self.peek_nth(n)
            .is_some_and(|t| t.kind == TokenKind::Ident && self.text(t) == word)
    }

    fn current_word(&self) -> Option<&'s str> {
        self.peek()
            .filter(|t| t.kind == TokenKind::Ident)
            .map(|t| self.text(t))
    }

    fn prev_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(0, |t| t.to)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    /// Consumes the current token as a leaf of the given kind.
    fn leaf(&mut self, kind: NodeKind) -> GreenNode {
        match self.bump() {
            Some(t) => GreenNode::leaf(kind, t.from, t.to),
            None => self.missing(),
        }
    }

    fn missing(&self) -> GreenNode {
        let at = self.prev_end();
        GreenNode::error(at, at)
    }

    /// Wraps the current token in an error node.
    fn unexpected(&mut self) -> GreenNode {
        match self.bump() {
            Some(t) => GreenNode::error(t.from, t.to),
            None => self.missing(),
        }
    }

    /// A string leaf, followed by an empty error when the closing quote is missing.
    fn string(&mut self, out: &mut Vec<GreenNode>) {
        match self.bump() {
            Some(t) => {
                out.push(GreenNode::leaf(NodeKind::String, t.from, t.to));
                if !is_terminated_string(self.text(t)) {
                    out.push(GreenNode::error(t.to, t.to));
                }
            },
            None => out.push(self.missing()),
        }
    }

    /// Consumes a closing delimiter or records it as missing. Returns the end offset.
    fn close(&mut self, kind: TokenKind, out: &mut Vec<GreenNode>) -> usize {
        if self.at(kind) {
            self.bump().map_or_else(|| self.prev_end(), |t| t.to)
        } else {
            let err = self.missing();
            let at = err.to;
            out.push(err);
            at
        }
    }

    fn at_line_filter(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(
                TokenKind::PipeExact
                    | TokenKind::Neq
                    | TokenKind::PipeMatch
                    | TokenKind::Nre
                    | TokenKind::PipePattern
                    | TokenKind::NotPipePattern
            )
        )
    }

    fn at_unwrap(&self) -> bool {
        self.at(TokenKind::Pipe) && self.nth_is_word(1, "unwrap")
    }

    fn at_pipeline_start(&self) -> bool {
        self.at_line_filter() || (self.at(TokenKind::Pipe) && !self.at_unwrap())
    }

    fn at_grouping(&self) -> bool {
        (self.at_word("by") || self.at_word("without"))
            && self.nth_kind(1) == Some(TokenKind::LParen)
    }

    fn at_signed_number(&self) -> bool {
        match self.peek_kind() {
            Some(TokenKind::Number) => true,
            Some(TokenKind::Add | TokenKind::Sub) => self.nth_kind(1) == Some(TokenKind::Number),
            _ => false,
        }
    }

    // ---- expressions ----

    fn parse_root(&mut self) -> GreenNode {
        let mut children = Vec::new();
        if !self.eof() {
            children.push(self.expr(0));
        }
        if let (Some(first), Some(last)) = (self.peek(), self.tokens.last().copied()) {
            children.push(GreenNode::error(first.from, last.to));
            self.pos = self.tokens.len();
        }
        GreenNode::spanning(NodeKind::LogQL, 0, self.src.len(), children)
    }

    fn binary_op(&self) -> Option<(u8, bool, NodeKind)> {
        let token = self.peek()?;
        let op = match token.kind {
            TokenKind::Ident => match self.text(token) {
                "or" => (1, false, NodeKind::Or),
                "and" => (2, false, NodeKind::And),
                "unless" => (2, false, NodeKind::Unless),
                _ => return None,
            },
            TokenKind::Eql => (3, false, NodeKind::Eql),
            TokenKind::Neq => (3, false, NodeKind::Neq),
            TokenKind::Gtr => (3, false, NodeKind::Gtr),
            TokenKind::Gte => (3, false, NodeKind::Gte),
            TokenKind::Lss => (3, false, NodeKind::Lss),
            TokenKind::Lte => (3, false, NodeKind::Lte),
            TokenKind::Add => (4, false, NodeKind::Add),
            TokenKind::Sub => (4, false, NodeKind::Sub),
            TokenKind::Mul => (5, false, NodeKind::Mul),
            TokenKind::Div => (5, false, NodeKind::Div),
            TokenKind::Mod => (5, false, NodeKind::Mod),
            TokenKind::Pow => (6, true, NodeKind::Pow),
            _ => return None,
        };
        Some(op)
    }

    /// Parses an `Expr`, folding binary operators of at least `min_prec`.
    fn expr(&mut self, min_prec: u8) -> GreenNode {
        if self.depth >= MAX_DEPTH {
            let at = self.prev_end();
            let end = self.tokens.last().map_or(at, |t| t.to);
            self.pos = self.tokens.len();
            return wrap_expr(GreenNode::error(at, end));
        }
        self.depth += 1;

        let mut left = self.unary();
        while let Some((prec, right_assoc, op_kind)) = self.binary_op() {
            if prec < min_prec {
                break;
            }
            let op = self.leaf(op_kind);
            let modifier = self.bin_op_modifier();
            let right = self.expr(if right_assoc { prec } else { prec + 1 });

            let mut children = vec![left, op];
            children.extend(modifier);
            children.push(right);
            let bin = GreenNode::branch(NodeKind::BinOpExpr, children, 0);
            left = wrap_expr(wrap(NodeKind::MetricExpr, bin));
        }

        self.depth -= 1;
        left
    }

    fn bin_op_modifier(&mut self) -> Option<GreenNode> {
        let mut children = Vec::new();
        if self.at_word("bool") {
            children.push(self.leaf(NodeKind::Bool));
        }

        let matcher_kind = match self.current_word() {
            Some("on") => Some(NodeKind::On),
            Some("ignoring") => Some(NodeKind::Ignoring),
            _ => None,
        };
        if let Some(kind) = matcher_kind.filter(|_| self.nth_kind(1) == Some(TokenKind::LParen)) {
            let mut inner = vec![self.leaf(kind)];
            inner.push(self.grouping_labels());

            let group_kind = match self.current_word() {
                Some("group_left") => Some(NodeKind::GroupLeft),
                Some("group_right") => Some(NodeKind::GroupRight),
                _ => None,
            };
            if let Some(kind) = group_kind {
                inner.push(self.leaf(kind));
                if self.at(TokenKind::LParen) {
                    inner.push(self.grouping_labels());
                }
            }
            children.push(GreenNode::branch(NodeKind::OnOrIgnoringModifier, inner, 0));
        }

        if children.is_empty() {
            None
        } else {
            Some(GreenNode::branch(NodeKind::BinOpModifier, children, 0))
        }
    }

    fn unary(&mut self) -> GreenNode {
        let Some(token) = self.peek() else {
            return wrap_expr(self.missing());
        };

        match token.kind {
            TokenKind::LBrace => self.log_expr(),
            TokenKind::LParen => self.paren_expr(),
            TokenKind::Number | TokenKind::Add | TokenKind::Sub if self.at_signed_number() => {
                wrap_expr(wrap(NodeKind::MetricExpr, self.literal()))
            },
            TokenKind::Ident => {
                let word = self.text(token);
                let call = self.nth_kind(1) == Some(TokenKind::LParen);
                if call && RANGE_OPS.contains(&word) {
                    self.range_aggregation()
                } else if VECTOR_OPS.contains(&word) && (call || self.nth_is_grouping(1)) {
                    self.vector_aggregation()
                } else if call && word == "vector" {
                    self.vector_expr()
                } else if call && word == "label_replace" {
                    self.label_replace()
                } else {
                    wrap_expr(self.unexpected())
                }
            },
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace | TokenKind::Comma => {
                wrap_expr(self.missing())
            },
            _ => wrap_expr(self.unexpected()),
        }
    }

    fn nth_is_grouping(&self, n: usize) -> bool {
        (self.nth_is_word(n, "by") || self.nth_is_word(n, "without"))
            && self.nth_kind(n + 1) == Some(TokenKind::LParen)
    }

    fn literal(&mut self) -> GreenNode {
        let mut children = Vec::new();
        match self.peek_kind() {
            Some(TokenKind::Add) => children.push(self.leaf(NodeKind::Add)),
            Some(TokenKind::Sub) => children.push(self.leaf(NodeKind::Sub)),
            _ => {},
        }
        children.push(self.leaf(NodeKind::Number));
        GreenNode::branch(NodeKind::LiteralExpr, children, 0)
    }

    fn paren_expr(&mut self) -> GreenNode {
        let open = self.bump().map_or(0, |t| t.from);
        let inner = self.expr(0);
        let inner = strip_expr(inner);
        let kind = if inner.kind == NodeKind::LogExpr {
            NodeKind::LogExpr
        } else {
            NodeKind::MetricExpr
        };

        let mut children = vec![inner];
        let end = self.close(TokenKind::RParen, &mut children);
        wrap_expr(GreenNode::spanning(kind, open, end, children))
    }

    fn log_expr(&mut self) -> GreenNode {
        let mut children = vec![self.selector()];
        if self.at_pipeline_start() {
            children.push(self.pipeline_expr());
        }
        wrap_expr(GreenNode::branch(NodeKind::LogExpr, children, 0))
    }

    fn range_aggregation(&mut self) -> GreenNode {
        let op = self.leaf(NodeKind::RangeOp);
        let start = op.from;
        self.bump(); // (

        let mut children = vec![op];
        if self.at(TokenKind::Number) && self.nth_kind(1) == Some(TokenKind::Comma) {
            children.push(self.leaf(NodeKind::Number));
            self.bump();
        }
        children.push(self.log_range_expr());
        let mut end = self.close(TokenKind::RParen, &mut children);

        if self.at_grouping() {
            let grouping = self.grouping();
            end = grouping.to;
            children.push(grouping);
        }

        let node = GreenNode::spanning(NodeKind::RangeAggregationExpr, start, end, children);
        wrap_expr(wrap(NodeKind::MetricExpr, node))
    }

    fn vector_aggregation(&mut self) -> GreenNode {
        let op = self.leaf(NodeKind::VectorOp);
        let start = op.from;
        let mut children = vec![op];

        let mut grouped = false;
        if self.at_grouping() {
            children.push(self.grouping());
            grouped = true;
        }

        if !self.at(TokenKind::LParen) {
            children.push(self.missing());
            let node = GreenNode::branch(NodeKind::VectorAggregationExpr, children, start);
            return wrap_expr(wrap(NodeKind::MetricExpr, node));
        }
        self.bump(); // (

        if self.at(TokenKind::Number) && self.nth_kind(1) == Some(TokenKind::Comma) {
            children.push(self.leaf(NodeKind::Number));
            self.bump();
        }

        let inner = self.expr(0);
        children.extend(into_metric(inner));
        let mut end = self.close(TokenKind::RParen, &mut children);

        if !grouped && self.at_grouping() {
            let grouping = self.grouping();
            end = grouping.to;
            children.push(grouping);
        }

        let node = GreenNode::spanning(NodeKind::VectorAggregationExpr, start, end, children);
        wrap_expr(wrap(NodeKind::MetricExpr, node))
    }

    fn vector_expr(&mut self) -> GreenNode {
        let kw = self.leaf(NodeKind::Vector);
        let start = kw.from;
        self.bump(); // (

        let mut children = vec![kw];
        if self.at(TokenKind::Number) {
            children.push(self.leaf(NodeKind::Number));
        } else {
            children.push(self.missing());
        }
        let end = self.close(TokenKind::RParen, &mut children);

        let node = GreenNode::spanning(NodeKind::VectorExpr, start, end, children);
        wrap_expr(wrap(NodeKind::MetricExpr, node))
    }

    fn label_replace(&mut self) -> GreenNode {
        let kw = self.leaf(NodeKind::LabelReplace);
        let start = kw.from;
        self.bump(); // (

        let mut children = vec![kw];
        let inner = self.expr(0);
        children.extend(into_metric(inner));

        for _ in 0..4 {
            if !self.at(TokenKind::Comma) {
                children.push(self.missing());
                break;
            }
            self.bump();
            if self.at(TokenKind::String) {
                self.string(&mut children);
            } else {
                children.push(self.missing());
            }
        }
        let end = self.close(TokenKind::RParen, &mut children);

        let node = GreenNode::spanning(NodeKind::LabelReplaceExpr, start, end, children);
        wrap_expr(wrap(NodeKind::MetricExpr, node))
    }

    fn grouping(&mut self) -> GreenNode {
        let kind = if self.at_word("by") {
            NodeKind::By
        } else {
            NodeKind::Without
        };
        let kw = self.leaf(kind);
        let labels = self.grouping_labels();
        GreenNode::branch(NodeKind::Grouping, vec![kw, labels], 0)
    }

    /// `( a, b )`. The caller guarantees the current token is `(`.
    fn grouping_labels(&mut self) -> GreenNode {
        let open = self.bump().map_or_else(|| self.prev_end(), |t| t.from);
        let mut labels = Vec::new();
        let mut trailing = Vec::new();

        loop {
            match self.peek_kind() {
                Some(TokenKind::RParen) => break,
                Some(TokenKind::Ident) => {
                    labels.push(self.leaf(NodeKind::Identifier));
                    if self.at(TokenKind::Comma) {
                        self.bump();
                        if !self.at(TokenKind::Ident) {
                            labels.push(self.missing());
                        }
                    }
                },
                _ => break,
            }
        }

        let end = self.close(TokenKind::RParen, &mut trailing);
        let mut children = Vec::new();
        if !labels.is_empty() {
            children.push(GreenNode::branch(NodeKind::GroupingLabelList, labels, open));
        }
        children.extend(trailing);
        GreenNode::spanning(NodeKind::GroupingLabels, open, end, children)
    }

    // ---- log expressions ----

    fn selector(&mut self) -> GreenNode {
        let Some(open) = self.bump() else {
            return self.missing();
        };
        let mut matchers = Vec::new();
        let mut trailing = Vec::new();
        let mut end = None;

        loop {
            match self.peek_kind() {
                None => {
                    trailing.push(self.missing());
                    break;
                },
                Some(TokenKind::RBrace) => {
                    end = self.bump().map(|t| t.to);
                    break;
                },
                Some(TokenKind::Ident) => {
                    matchers.push(self.matcher());
                    match self.peek_kind() {
                        Some(TokenKind::Comma) => matchers.push(self.leaf(NodeKind::Comma)),
                        Some(TokenKind::Ident) => matchers.push(self.missing()),
                        _ => {},
                    }
                },
                Some(
                    TokenKind::Pipe
                    | TokenKind::PipeExact
                    | TokenKind::PipeMatch
                    | TokenKind::PipePattern
                    | TokenKind::NotPipePattern
                    | TokenKind::LParen
                    | TokenKind::RParen
                    | TokenKind::LBracket
                    | TokenKind::RBracket,
                ) => {
                    trailing.push(self.missing());
                    break;
                },
                Some(_) => matchers.push(self.unexpected()),
            }
        }

        if matchers.is_empty() && end.is_some() {
            matchers.push(GreenNode::error(open.to, open.to));
        }

        let mut children = Vec::new();
        if !matchers.is_empty() {
            children.push(GreenNode::branch(NodeKind::Matchers, matchers, open.to));
        }
        children.extend(trailing);

        let to = end.unwrap_or_else(|| children.last().map_or(open.to, |c| c.to));
        GreenNode::spanning(NodeKind::Selector, open.from, to, children)
    }

    /// `name op "value"` where the current token is the name.
    fn matcher(&mut self) -> GreenNode {
        let mut children = vec![self.leaf(NodeKind::Identifier)];
        match self.match_op() {
            Some(op) => {
                children.push(self.leaf(op));
                self.matcher_value(&mut children);
            },
            None if self.at(TokenKind::Unknown) => children.push(self.unexpected()),
            None => children.push(self.missing()),
        }
        GreenNode::branch(NodeKind::Matcher, children, 0)
    }

    fn match_op(&self) -> Option<NodeKind> {
        match self.peek_kind()? {
            TokenKind::Eq => Some(NodeKind::Eq),
            TokenKind::Neq => Some(NodeKind::Neq),
            TokenKind::Re => Some(NodeKind::Re),
            TokenKind::Nre => Some(NodeKind::Nre),
            _ => None,
        }
    }

    fn matcher_value(&mut self, children: &mut Vec<GreenNode>) {
        match self.peek_kind() {
            Some(TokenKind::String) => self.string(children),
            Some(
                TokenKind::Ident
                | TokenKind::Number
                | TokenKind::Duration
                | TokenKind::Bytes
                | TokenKind::Unknown,
            ) => children.push(self.unexpected()),
            _ => children.push(self.missing()),
        }
    }

    fn pipeline_expr(&mut self) -> GreenNode {
        let mut stages = Vec::new();
        while self.at_pipeline_start() {
            stages.push(self.pipeline_stage());
        }
        GreenNode::branch(NodeKind::PipelineExpr, stages, self.prev_end())
    }

    fn pipeline_stage(&mut self) -> GreenNode {
        if self.at_line_filter() {
            let mut filters = Vec::new();
            while self.at_line_filter() {
                filters.push(self.line_filter());
            }
            let line_filters = GreenNode::branch(NodeKind::LineFilters, filters, 0);
            return wrap(NodeKind::PipelineStage, line_filters);
        }

        let pipe = self.leaf(NodeKind::Pipe);
        let body = self.stage_body();
        GreenNode::branch(NodeKind::PipelineStage, vec![pipe, body], 0)
    }

    fn line_filter(&mut self) -> GreenNode {
        let op_kind = match self.peek_kind() {
            Some(TokenKind::PipeExact) => NodeKind::PipeExact,
            Some(TokenKind::Neq) => NodeKind::Neq,
            Some(TokenKind::PipeMatch) => NodeKind::PipeMatch,
            Some(TokenKind::Nre) => NodeKind::Nre,
            Some(TokenKind::PipePattern) => NodeKind::PipePattern,
            _ => NodeKind::NotPipePattern,
        };
        let op = self.leaf(op_kind);
        let mut children = vec![wrap(NodeKind::Filter, op)];

        if self.at(TokenKind::String) {
            self.string(&mut children);
        } else if self.at_word("ip") && self.nth_kind(1) == Some(TokenKind::LParen) {
            children.push(self.ip_call(NodeKind::FilterOp));
        } else if matches!(self.peek_kind(), Some(TokenKind::Ident | TokenKind::Number)) {
            children.push(self.unexpected());
        } else {
            children.push(self.missing());
        }

        if self.at_word("or") && self.nth_kind(1) == Some(TokenKind::String) {
            children.push(self.or_filter());
        }

        GreenNode::branch(NodeKind::LineFilter, children, 0)
    }

    fn or_filter(&mut self) -> GreenNode {
        let mut children = vec![self.leaf(NodeKind::Or)];
        self.string(&mut children);
        if self.at_word("or") && self.nth_kind(1) == Some(TokenKind::String) {
            children.push(self.or_filter());
        }
        GreenNode::branch(NodeKind::OrFilter, children, 0)
    }

    /// `ip("...")` wrapped in a node of `kind`.
    fn ip_call(&mut self, kind: NodeKind) -> GreenNode {
        let start = self.peek().map_or_else(|| self.prev_end(), |t| t.from);
        let mut children = Vec::new();
        let end = self.ip_args(&mut children);
        GreenNode::spanning(kind, start, end, children)
    }

    fn ip_args(&mut self, children: &mut Vec<GreenNode>) -> usize {
        children.push(self.leaf(NodeKind::Ip));
        self.bump(); // (
        if self.at(TokenKind::String) {
            self.string(children);
        } else {
            children.push(self.missing());
        }
        self.close(TokenKind::RParen, children)
    }

    fn stage_body(&mut self) -> GreenNode {
        let Some(token) = self.peek() else {
            return self.missing();
        };

        match token.kind {
            TokenKind::Ident => {
                let followed_by_op = matches!(
                    self.nth_kind(1),
                    Some(
                        TokenKind::Eq
                            | TokenKind::Neq
                            | TokenKind::Re
                            | TokenKind::Nre
                            | TokenKind::Eql
                            | TokenKind::Gtr
                            | TokenKind::Gte
                            | TokenKind::Lss
                            | TokenKind::Lte
                    )
                );
                if followed_by_op {
                    return self.label_filter();
                }
                match self.text(token) {
                    "json" => self.json_parser(),
                    "logfmt" => self.logfmt_parser(),
                    "unpack" => wrap(NodeKind::LabelParser, self.leaf(NodeKind::Unpack)),
                    "regexp" => self.string_parser(NodeKind::Regexp),
                    "pattern" => self.string_parser(NodeKind::Pattern),
                    "line_format" => self.line_format(),
                    "label_format" => self.label_format(),
                    "decolorize" => self.leaf(NodeKind::Decolorize),
                    "drop" => self.label_list(NodeKind::DropLabelsExpr),
                    "keep" => self.label_list(NodeKind::KeepLabelsExpr),
                    _ => self.label_filter(),
                }
            },
            TokenKind::LParen => self.label_filter(),
            TokenKind::Pipe
            | TokenKind::PipeExact
            | TokenKind::PipeMatch
            | TokenKind::PipePattern
            | TokenKind::NotPipePattern
            | TokenKind::RParen
            | TokenKind::LBracket
            | TokenKind::RBracket => self.missing(),
            _ => self.unexpected(),
        }
    }

    fn string_parser(&mut self, kind: NodeKind) -> GreenNode {
        let mut children = vec![self.leaf(kind)];
        if self.at(TokenKind::String) {
            self.string(&mut children);
        } else {
            children.push(self.missing());
        }
        GreenNode::branch(NodeKind::LabelParser, children, 0)
    }

    fn at_extraction_start(&self) -> bool {
        self.current_word()
            .is_some_and(|w| !FILTER_STOP_WORDS.contains(&w))
    }

    fn json_parser(&mut self) -> GreenNode {
        let json = self.leaf(NodeKind::Json);
        if self.at_extraction_start() {
            let list = self.label_extraction_list();
            GreenNode::branch(NodeKind::JsonExpressionParser, vec![json, list], 0)
        } else {
            wrap(NodeKind::LabelParser, json)
        }
    }

    fn logfmt_parser(&mut self) -> GreenNode {
        let mut children = vec![self.leaf(NodeKind::Logfmt)];
        while self.at(TokenKind::Flag) {
            children.push(self.leaf(NodeKind::ParserFlag));
        }

        let kind = if self.at_extraction_start() {
            children.push(self.label_extraction_list());
            NodeKind::LogfmtExpressionParser
        } else {
            NodeKind::LogfmtParser
        };

        while matches!(self.peek_kind(), Some(TokenKind::String | TokenKind::Number)) {
            children.push(self.unexpected());
        }
        GreenNode::branch(kind, children, 0)
    }

    fn label_extraction_list(&mut self) -> GreenNode {
        let mut items = Vec::new();
        loop {
            items.push(self.label_extraction_expression());
            if !self.at(TokenKind::Comma) {
                break;
            }
            items.push(self.leaf(NodeKind::Comma));
            if !self.at(TokenKind::Ident) {
                items.push(self.missing());
                break;
            }
        }
        GreenNode::branch(NodeKind::LabelExtractionExpressionList, items, 0)
    }

    fn label_extraction_expression(&mut self) -> GreenNode {
        let mut children = vec![self.leaf(NodeKind::Identifier)];
        if self.at(TokenKind::Eq) {
            children.push(self.leaf(NodeKind::Eq));
            if self.at(TokenKind::String) {
                self.string(&mut children);
            } else {
                children.push(self.missing());
            }
        }
        GreenNode::branch(NodeKind::LabelExtractionExpression, children, 0)
    }

    fn line_format(&mut self) -> GreenNode {
        let mut children = vec![self.leaf(NodeKind::LineFormat)];
        if self.at(TokenKind::String) {
            self.string(&mut children);
        } else {
            children.push(self.missing());
        }
        GreenNode::branch(NodeKind::LineFormatExpr, children, 0)
    }

    fn label_format(&mut self) -> GreenNode {
        let kw = self.leaf(NodeKind::LabelFormat);
        let mut matchers = Vec::new();
        loop {
            if !self.at(TokenKind::Ident) {
                matchers.push(self.missing());
                break;
            }
            matchers.push(self.label_format_matcher());
            if !self.at(TokenKind::Comma) {
                break;
            }
            matchers.push(self.leaf(NodeKind::Comma));
        }
        let labels = GreenNode::branch(NodeKind::LabelsFormat, matchers, kw.to);
        GreenNode::branch(NodeKind::LabelFormatExpr, vec![kw, labels], 0)
    }

    fn label_format_matcher(&mut self) -> GreenNode {
        let mut children = vec![self.leaf(NodeKind::Identifier)];
        if self.at(TokenKind::Eq) {
            children.push(self.leaf(NodeKind::Eq));
            match self.peek_kind() {
                Some(TokenKind::Ident) => children.push(self.leaf(NodeKind::Identifier)),
                Some(TokenKind::String) => self.string(&mut children),
                _ => children.push(self.missing()),
            }
        } else {
            children.push(self.missing());
        }
        GreenNode::branch(NodeKind::LabelFormatMatcher, children, 0)
    }

    /// `drop a, b="c"` / `keep ...`, built as a left-nested label chain.
    fn label_list(&mut self, expr_kind: NodeKind) -> GreenNode {
        let (kw_kind, list_kind, item_kind) = if expr_kind == NodeKind::DropLabelsExpr {
            (NodeKind::Drop, NodeKind::DropLabels, NodeKind::DropLabel)
        } else {
            (NodeKind::Keep, NodeKind::KeepLabels, NodeKind::KeepLabel)
        };
        let kw = self.leaf(kw_kind);

        if !self.at(TokenKind::Ident) {
            let err = self.missing();
            return GreenNode::branch(expr_kind, vec![kw, err], 0);
        }

        let mut chain: Option<GreenNode> = None;
        let mut pending_comma: Option<GreenNode> = None;
        loop {
            let item = if self.at(TokenKind::Ident) {
                let item = if self.nth_kind(1).is_some_and(|k| {
                    matches!(k, TokenKind::Eq | TokenKind::Neq | TokenKind::Re | TokenKind::Nre)
                }) {
                    self.matcher()
                } else {
                    self.leaf(NodeKind::Identifier)
                };
                wrap(item_kind, item)
            } else {
                self.missing()
            };

            let mut children = Vec::new();
            if let Some(prev) = chain.take() {
                children.push(prev);
            }
            if let Some(comma) = pending_comma.take() {
                children.push(comma);
            }
            children.push(item);
            chain = Some(GreenNode::branch(list_kind, children, 0));

            if !self.at(TokenKind::Comma) {
                break;
            }
            pending_comma = Some(self.leaf(NodeKind::Comma));
        }

        let mut children = vec![kw];
        children.extend(chain);
        GreenNode::branch(expr_kind, children, 0)
    }

    // ---- label filters ----

    fn label_filter(&mut self) -> GreenNode {
        let mut left = self.label_filter_and();
        while self.at_word("or") {
            let op = self.leaf(NodeKind::Or);
            let right = self.label_filter_and();
            left = GreenNode::branch(NodeKind::LabelFilter, vec![left, op, right], 0);
        }
        left
    }

    /// `and`, `,` and plain juxtaposition bind tighter than `or`.
    fn label_filter_and(&mut self) -> GreenNode {
        let mut left = self.label_filter_term();
        loop {
            let op = if self.at_word("and") {
                Some(self.leaf(NodeKind::And))
            } else if self.at(TokenKind::Comma) {
                Some(self.leaf(NodeKind::Comma))
            } else if self.at_extraction_start() {
                None
            } else {
                break;
            };
            let right = self.label_filter_term();

            let mut children = vec![left];
            children.extend(op);
            children.push(right);
            left = GreenNode::branch(NodeKind::LabelFilter, children, 0);
        }
        left
    }

    fn label_filter_term(&mut self) -> GreenNode {
        match self.peek_kind() {
            Some(TokenKind::LParen) if self.depth < MAX_DEPTH => {
                self.depth += 1;
                let open = self.bump().map_or(0, |t| t.from);
                let mut children = vec![self.label_filter()];
                let end = self.close(TokenKind::RParen, &mut children);
                self.depth -= 1;
                GreenNode::spanning(NodeKind::LabelFilter, open, end, children)
            },
            Some(TokenKind::Ident) => {
                let term = self.label_comparison();
                wrap(NodeKind::LabelFilter, term)
            },
            Some(
                TokenKind::Pipe
                | TokenKind::PipeExact
                | TokenKind::PipeMatch
                | TokenKind::PipePattern
                | TokenKind::NotPipePattern
                | TokenKind::RParen
                | TokenKind::LBracket
                | TokenKind::RBracket,
            )
            | None => wrap(NodeKind::LabelFilter, self.missing()),
            Some(_) => wrap(NodeKind::LabelFilter, self.unexpected()),
        }
    }

    /// `label op value`: a string matcher, an ip filter, or a number, duration
    /// or bytes comparison.
    fn label_comparison(&mut self) -> GreenNode {
        let name = self.leaf(NodeKind::Identifier);
        let op_kind = match self.peek_kind() {
            Some(TokenKind::Eq) => NodeKind::Eq,
            Some(TokenKind::Neq) => NodeKind::Neq,
            Some(TokenKind::Re) => NodeKind::Re,
            Some(TokenKind::Nre) => NodeKind::Nre,
            Some(TokenKind::Eql) => NodeKind::Eql,
            Some(TokenKind::Gtr) => NodeKind::Gtr,
            Some(TokenKind::Gte) => NodeKind::Gte,
            Some(TokenKind::Lss) => NodeKind::Lss,
            Some(TokenKind::Lte) => NodeKind::Lte,
            _ => {
                let err = if self.at(TokenKind::Unknown) {
                    self.unexpected()
                } else {
                    self.missing()
                };
                return GreenNode::branch(NodeKind::Matcher, vec![name, err], 0);
            },
        };
        let op = self.leaf(op_kind);
        let start = name.from;
        let mut children = vec![name, op];

        let string_op = matches!(
            op_kind,
            NodeKind::Eq | NodeKind::Neq | NodeKind::Re | NodeKind::Nre
        );
        let regex_op = matches!(op_kind, NodeKind::Re | NodeKind::Nre);

        if matches!(op_kind, NodeKind::Eq | NodeKind::Neq)
            && self.at_word("ip")
            && self.nth_kind(1) == Some(TokenKind::LParen)
        {
            let end = self.ip_args(&mut children);
            return GreenNode::spanning(NodeKind::IpLabelFilter, start, end, children);
        }

        match self.peek_kind() {
            Some(TokenKind::String) => {
                self.string(&mut children);
                GreenNode::branch(NodeKind::Matcher, children, 0)
            },
            Some(TokenKind::Number | TokenKind::Add | TokenKind::Sub)
                if !regex_op && self.at_signed_number() =>
            {
                if self.at(TokenKind::Number) {
                    children.push(self.leaf(NodeKind::Number));
                } else {
                    children.push(self.literal());
                }
                GreenNode::branch(NodeKind::NumberFilter, children, 0)
            },
            Some(TokenKind::Duration) if !regex_op => {
                children.push(self.leaf(NodeKind::Duration));
                let filter = GreenNode::branch(NodeKind::DurationFilter, children, 0);
                wrap(NodeKind::UnitFilter, filter)
            },
            Some(TokenKind::Bytes) if !regex_op => {
                children.push(self.leaf(NodeKind::Bytes));
                let filter = GreenNode::branch(NodeKind::BytesFilter, children, 0);
                wrap(NodeKind::UnitFilter, filter)
            },
            _ => {
                self.matcher_value(&mut children);
                let kind = if string_op {
                    NodeKind::Matcher
                } else {
                    NodeKind::NumberFilter
                };
                GreenNode::branch(kind, children, 0)
            },
        }
    }

    // ---- range expressions ----

    fn log_range_expr(&mut self) -> GreenNode {
        let mut children = Vec::new();
        if !self.at(TokenKind::LBrace) {
            let err = match self.peek_kind() {
                None | Some(TokenKind::RParen) => self.missing(),
                Some(_) => self.unexpected(),
            };
            children.push(err);
            return GreenNode::branch(NodeKind::LogRangeExpr, children, 0);
        }

        children.push(self.selector());
        let mut has_range = false;
        if self.at(TokenKind::LBracket) {
            children.push(self.range());
            has_range = true;
        }
        if self.at_pipeline_start() {
            children.push(self.pipeline_expr());
        }
        if self.at_unwrap() {
            children.push(self.unwrap_expr());
        }
        if !has_range {
            if self.at(TokenKind::LBracket) {
                children.push(self.range());
            } else {
                children.push(self.missing());
            }
        }
        if self.at_word("offset") {
            children.push(self.offset_expr());
        }
        GreenNode::branch(NodeKind::LogRangeExpr, children, 0)
    }

    /// `[5m]`. Anything other than a duration inside the brackets becomes one error.
    fn range(&mut self) -> GreenNode {
        let Some(open) = self.bump() else {
            return self.missing();
        };
        let mut children = Vec::new();
        if self.at(TokenKind::Duration) {
            children.push(self.leaf(NodeKind::Duration));
        }

        let junk_from = self.peek().map(|t| t.from);
        let mut junk_to = None;
        while let Some(token) = self.peek() {
            if matches!(
                token.kind,
                TokenKind::RBracket | TokenKind::RParen | TokenKind::LBrace | TokenKind::Pipe
            ) {
                break;
            }
            junk_to = Some(token.to);
            self.pos += 1;
        }
        if let (Some(from), Some(to)) = (junk_from, junk_to) {
            children.push(GreenNode::error(from, to));
        } else if children.is_empty() {
            children.push(GreenNode::error(open.to, open.to));
        }

        let end = self.close(TokenKind::RBracket, &mut children);
        GreenNode::spanning(NodeKind::Range, open.from, end, children)
    }

    fn offset_expr(&mut self) -> GreenNode {
        let mut children = vec![self.leaf(NodeKind::Offset)];
        if self.at(TokenKind::Duration) {
            children.push(self.leaf(NodeKind::Duration));
        } else {
            children.push(self.missing());
        }
        GreenNode::branch(NodeKind::OffsetExpr, children, 0)
    }

    /// `| unwrap [conv(]label[)]` followed by any post-unwrap label filters.
    fn unwrap_expr(&mut self) -> GreenNode {
        let pipe = self.leaf(NodeKind::Pipe);
        let start = pipe.from;
        let kw = self.leaf(NodeKind::Unwrap);
        let mut end = kw.to;
        let mut children = vec![pipe, kw];

        match self.current_word() {
            Some(word) if CONV_OPS.contains(&word) && self.nth_kind(1) == Some(TokenKind::LParen) => {
                children.push(self.leaf(NodeKind::ConvOp));
                self.bump(); // (
                if self.at(TokenKind::Ident) {
                    children.push(self.leaf(NodeKind::Identifier));
                } else {
                    children.push(self.missing());
                }
                end = self.close(TokenKind::RParen, &mut children);
            },
            Some(_) => {
                let id = self.leaf(NodeKind::Identifier);
                end = id.to;
                children.push(id);
            },
            None => children.push(self.missing()),
        }

        let mut node = GreenNode::spanning(NodeKind::UnwrapExpr, start, end, children);
        while self.at(TokenKind::Pipe)
            && !self.at_unwrap()
            && matches!(self.nth_kind(1), Some(TokenKind::Ident | TokenKind::LParen))
        {
            let pipe = self.leaf(NodeKind::Pipe);
            let filter = self.label_filter();
            node = GreenNode::branch(NodeKind::UnwrapExpr, vec![node, pipe, filter], 0);
        }
        node
    }
}

fn wrap(kind: NodeKind, child: GreenNode) -> GreenNode {
    GreenNode::branch(kind, vec![child], 0)
}

fn wrap_expr(child: GreenNode) -> GreenNode {
    wrap(NodeKind::Expr, child)
}

/// Drops the `Expr` wrapper around a single expression.
fn strip_expr(mut expr: GreenNode) -> GreenNode {
    if expr.kind == NodeKind::Expr && expr.children.len() == 1 {
        if let Some(inner) = expr.children.pop() {
            return inner;
        }
    }
    expr
}

/// Aggregation argument: the metric expression itself, or an error wrapping
/// whatever was found instead.
fn into_metric(expr: GreenNode) -> Vec<GreenNode> {
    let inner = strip_expr(expr);
    match inner.kind {
        NodeKind::MetricExpr | NodeKind::Error => vec![inner],
        _ => {
            let (from, to) = (inner.from, inner.to);
            vec![GreenNode::spanning(NodeKind::Error, from, to, vec![inner])]
        },
    }
}
