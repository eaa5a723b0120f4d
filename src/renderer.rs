//! Projects a parsed query into a tree of styled inline nodes.
//!
//! Rendering is a pure function of the parse result and the cursor, except for
//! one bit of state per rendered filter: whether the cursor has ever left it.
//! An invalid filter is only shown as invalid once the user has moved away
//! from it, so a filter that is still being typed does not flash an error.
//!
//! ```text
//! mount ──(cursor inside)──> AwaitingFirstLeave ──(cursor outside)──> Left
//!   └───(cursor outside)─────────────────────────────────────────────> Left
//! ```
//!
//! `Left` is terminal for the lifetime of the filter instance. Instances are
//! identified by their index path in the token tree; a path that is not
//! rendered as a filter in some pass is dropped, and a filter appearing there
//! later is mounted afresh.

use std::borrow::Cow;
use std::collections::HashMap;

use tracing::trace;

use crate::theme::ChipState;
use crate::token::{Filter, ListItem, ParseResult, Token, TokenKind};
use crate::utils::is_within_token;

/// A rendered inline node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node<'a> {
    Text(Cow<'a, str>),
    Span {
        style: Style,
        children: Vec<Node<'a>>,
    },
    /// A force-shown tooltip anchored on `child`.
    Tooltip {
        reason: String,
        child: Box<Node<'a>>,
    },
}

/// Visual role of a `Node::Span`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Style {
    /// The chip wrapping a whole filter.
    Filter(ChipState),
    Negation,
    Key { negated: bool },
    /// The `prefix[` and `]` around an explicit tag key.
    ExplicitKeyDecoration,
    Operator,
    Value { invalid: bool },
    /// A number and its unit; only the unit is decorated.
    Number,
    Unit,
    LogicBoolean,
    Boolean,
    DateTime,
    List,
    ListBracket,
    ListComma,
    LogicGroup,
    LogicGroupParen,
}

impl<'a> Node<'a> {
    fn text(text: impl Into<Cow<'a, str>>) -> Self {
        Node::Text(text.into())
    }

    fn span(style: Style, children: Vec<Node<'a>>) -> Self {
        Node::Span { style, children }
    }

    /// The text the node displays, without styling.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.write_plain_text(&mut out);
        out
    }

    fn write_plain_text(&self, out: &mut String) {
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Span { children, .. } => pending.extend(children.iter().rev()),
                Node::Tooltip { child, .. } => pending.push(child.as_ref()),
            }
        }
    }

    /// Reasons of every tooltip in this node, outermost first.
    pub fn tooltips(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            match node {
                Node::Text(_) => {}
                Node::Span { children, .. } => pending.extend(children.iter().rev()),
                Node::Tooltip { reason, child } => {
                    out.push(reason.as_str());
                    pending.push(child.as_ref());
                }
            }
        }
        out
    }
}

impl Drop for Node<'_> {
    /// Tears the tree down with an explicit stack; rendered groups can nest
    /// arbitrarily deep.
    fn drop(&mut self) {
        let mut pending = Vec::new();
        take_children(self, &mut pending);
        while let Some(mut node) = pending.pop() {
            take_children(&mut node, &mut pending);
        }
    }
}

fn take_children<'a>(node: &mut Node<'a>, out: &mut Vec<Node<'a>>) {
    match node {
        Node::Text(_) => {}
        Node::Span { children, .. } => out.append(children),
        Node::Tooltip { child, .. } => {
            out.push(std::mem::replace(child.as_mut(), Node::Text(Cow::Borrowed(""))));
        }
    }
}

/// Plain text of a rendered sequence.
pub fn plain_text(nodes: &[Node<'_>]) -> String {
    nodes.iter().map(Node::plain_text).collect()
}

/// Tooltip reasons of a rendered sequence.
pub fn tooltips<'n>(nodes: &'n [Node<'_>]) -> Vec<&'n str> {
    nodes.iter().flat_map(Node::tooltips).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchState {
    AwaitingFirstLeave,
    Left,
}

/// Tracks whether the cursor has left a filter since it was mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterLatch {
    state: LatchState,
}

impl FilterLatch {
    pub fn mount(is_active: bool) -> Self {
        let state = if is_active {
            LatchState::AwaitingFirstLeave
        } else {
            LatchState::Left
        };
        Self { state }
    }

    /// Records the cursor state seen by a render.
    pub fn observe(&mut self, is_active: bool) {
        if !is_active {
            self.state = LatchState::Left;
        }
    }

    pub fn state(&self) -> LatchState {
        self.state
    }

    pub fn has_left(&self) -> bool {
        self.state == LatchState::Left
    }
}

/// The display state derived for one filter during one render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterState {
    pub is_active: bool,
    pub has_left: bool,
    pub show_invalid: bool,
    pub show_tooltip: bool,
}

impl FilterState {
    pub fn new(is_active: bool, has_left: bool, invalid: bool) -> Self {
        let show_invalid = has_left && invalid;
        Self {
            is_active,
            has_left,
            show_invalid,
            show_tooltip: show_invalid && is_active,
        }
    }

    pub fn chip_state(&self) -> ChipState {
        ChipState::new(self.show_invalid, self.is_active)
    }
}

/// Renders successive versions of a query, keeping filter latches alive
/// between renders.
#[derive(Debug, Default)]
pub struct Renderer {
    latches: HashMap<Vec<usize>, FilterLatch>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render<'a>(&mut self, parsed: &ParseResult<'a>, cursor: Option<usize>) -> Vec<Node<'a>> {
        let mut pass = RenderPass {
            cursor,
            mounted: std::mem::take(&mut self.latches),
            rendered: HashMap::new(),
            path: Vec::new(),
        };
        let nodes = pass.render_result(parsed);
        // Anything left in `mounted` was not rendered this time and unmounts.
        self.latches = pass.rendered;
        nodes
    }

    /// The latch of the filter at `path`, if one is mounted.
    pub fn latch(&self, path: &[usize]) -> Option<FilterLatch> {
        self.latches.get(path).copied()
    }

    /// Unmounts every filter, e.g. when the input is cleared.
    pub fn reset(&mut self) {
        self.latches.clear();
    }
}

/// Renders `parsed` with every filter freshly mounted.
pub fn render<'a>(parsed: &ParseResult<'a>, cursor: Option<usize>) -> Vec<Node<'a>> {
    Renderer::new().render(parsed, cursor)
}

struct GroupFrame<'r, 'a> {
    tokens: std::iter::Enumerate<std::slice::Iter<'r, Token<'a>>>,
    nodes: Vec<Node<'a>>,
}

impl<'r, 'a> GroupFrame<'r, 'a> {
    fn new(result: &'r ParseResult<'a>) -> Self {
        Self {
            tokens: result.iter().enumerate(),
            nodes: Vec::with_capacity(result.len()),
        }
    }
}

struct RenderPass {
    cursor: Option<usize>,
    mounted: HashMap<Vec<usize>, FilterLatch>,
    rendered: HashMap<Vec<usize>, FilterLatch>,
    path: Vec<usize>,
}

impl RenderPass {
    /// Renders a token sequence. Groups are descended into with an explicit
    /// stack rather than by recursion.
    fn render_result<'a>(&mut self, result: &ParseResult<'a>) -> Vec<Node<'a>> {
        let mut stack = vec![GroupFrame::new(result)];
        while let Some(frame) = stack.last_mut() {
            match frame.tokens.next() {
                Some((i, token)) => {
                    self.path.push(i);
                    if let TokenKind::LogicGroup(inner) = &token.kind {
                        stack.push(GroupFrame::new(inner));
                    } else {
                        let node = self.render_token(token);
                        frame.nodes.push(node);
                        self.path.pop();
                    }
                }
                None => {
                    let nodes = std::mem::take(&mut frame.nodes);
                    stack.pop();
                    match stack.last_mut() {
                        Some(parent) => {
                            parent.nodes.push(group_node(nodes));
                            self.path.pop();
                        }
                        None => return nodes,
                    }
                }
            }
        }
        Vec::new()
    }

    fn render_token<'a>(&mut self, token: &Token<'a>) -> Node<'a> {
        match &token.kind {
            TokenKind::Spaces => Node::text(token.text),
            TokenKind::Filter(filter) => self.render_filter(token, filter),
            TokenKind::ValueTextList(items) | TokenKind::ValueNumberList(items) => {
                self.render_list(items)
            }
            TokenKind::ValueNumber { value, unit } => {
                let mut children = vec![Node::text(*value)];
                if let Some(unit) = unit {
                    children.push(Node::span(Style::Unit, vec![Node::text(*unit)]));
                }
                Node::span(Style::Number, children)
            }
            TokenKind::ValueBoolean(_) => Node::span(Style::Boolean, vec![Node::text(token.text)]),
            TokenKind::ValueIso8601Date => {
                Node::span(Style::DateTime, vec![Node::text(token.text)])
            }
            TokenKind::LogicGroup(inner) => group_node(self.render_result(inner)),
            TokenKind::LogicBoolean(op) => {
                Node::span(Style::LogicBoolean, vec![Node::text(op.as_str())])
            }
            TokenKind::ValueText { .. }
            | TokenKind::KeySimple { .. }
            | TokenKind::KeyAggregate { .. }
            | TokenKind::KeyExplicitTag { .. } => Node::text(token.text),
        }
    }

    fn render_filter<'a>(&mut self, token: &Token<'a>, filter: &Filter<'a>) -> Node<'a> {
        let is_active = is_within_token(token, self.cursor);
        let latch = match self.mounted.remove(&self.path) {
            Some(mut latch) => {
                latch.observe(is_active);
                latch
            }
            None => FilterLatch::mount(is_active),
        };
        self.rendered.insert(self.path.clone(), latch);

        let state = FilterState::new(is_active, latch.has_left(), filter.invalid.is_some());
        trace!(
            path = ?self.path,
            is_active,
            has_left = state.has_left,
            show_invalid = state.show_invalid,
            "rendered filter"
        );

        let mut children = Vec::with_capacity(4);
        if filter.negated {
            children.push(Node::span(Style::Negation, vec![Node::text("!")]));
        }
        children.push(render_key(&filter.key, filter.negated));
        if let Some(op) = filter.operator {
            children.push(Node::span(Style::Operator, vec![Node::text(op.as_str())]));
        }
        let value = self.render_token(&filter.value);
        children.push(Node::span(
            Style::Value {
                invalid: state.show_invalid,
            },
            vec![value],
        ));

        let chip = Node::span(Style::Filter(state.chip_state()), children);
        match &filter.invalid {
            Some(reason) if state.show_tooltip => Node::Tooltip {
                reason: reason.to_string(),
                child: Box::new(chip),
            },
            _ => chip,
        }
    }

    fn render_list<'a>(&mut self, items: &[ListItem<'a>]) -> Node<'a> {
        let mut children = Vec::with_capacity(items.len() * 2 + 2);
        children.push(Node::span(Style::ListBracket, vec![Node::text("[")]));
        for item in items {
            if !item.separator.is_empty() {
                children.push(Node::span(Style::ListComma, vec![Node::text(item.separator)]));
            }
            children.push(self.render_token(&item.value));
        }
        children.push(Node::span(Style::ListBracket, vec![Node::text("]")]));
        Node::span(Style::List, children)
    }
}

/// A group's rendered terms between its styled parentheses.
fn group_node(terms: Vec<Node<'_>>) -> Node<'_> {
    let mut children = Vec::with_capacity(terms.len() + 2);
    children.push(Node::span(Style::LogicGroupParen, vec![Node::text("(")]));
    children.extend(terms);
    children.push(Node::span(Style::LogicGroupParen, vec![Node::text(")")]));
    Node::span(Style::LogicGroup, children)
}

/// `key:`, or `prefix[key]:` for explicit tags with the decoration styled apart.
fn render_key<'a>(key: &Token<'a>, negated: bool) -> Node<'a> {
    let mut children = Vec::with_capacity(4);
    match &key.kind {
        TokenKind::KeyExplicitTag { prefix, key: inner } => {
            let inner_text = match &inner.kind {
                TokenKind::KeySimple {
                    value,
                    quoted: true,
                } => Cow::Owned(format!("\"{}\"", value)),
                TokenKind::KeySimple { value, .. } => Cow::Borrowed(*value),
                _ => Cow::Borrowed(inner.text),
            };
            children.push(Node::span(
                Style::ExplicitKeyDecoration,
                vec![Node::text(*prefix), Node::text("[")],
            ));
            children.push(Node::Text(inner_text));
            children.push(Node::span(Style::ExplicitKeyDecoration, vec![Node::text("]")]));
        }
        _ => children.push(Node::text(key.text)),
    }
    children.push(Node::text(":"));
    Node::span(Style::Key { negated }, children)
}
