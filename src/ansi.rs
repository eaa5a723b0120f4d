//! Paints rendered nodes as coloured terminal text.

use crossterm::style::{ContentStyle, StyledContent, Stylize};

use crate::renderer::{Node, Style};
use crate::theme::{ChipState, Theme};

/// Text style in effect at some point of the node tree.
#[derive(Debug, Clone, Copy, Default)]
struct Pen {
    style: ContentStyle,
    /// State of the enclosing filter chip, if any.
    chip: Option<ChipState>,
}

pub struct AnsiPainter<'t> {
    theme: &'t Theme,
}

impl<'t> AnsiPainter<'t> {
    pub fn new(theme: &'t Theme) -> Self {
        Self { theme }
    }

    /// The painted line, ready to be written to a terminal.
    pub fn paint(&self, nodes: &[Node<'_>]) -> String {
        self.styled(nodes).iter().map(ToString::to_string).collect()
    }

    /// Every non-empty text leaf in display order, with the style it is drawn in.
    pub fn styled<'n>(&self, nodes: &'n [Node<'_>]) -> Vec<StyledContent<&'n str>> {
        let mut leaves = Vec::new();
        let mut pending: Vec<(&'n Node<'_>, Pen)> = nodes
            .iter()
            .rev()
            .map(|node| (node, Pen::default()))
            .collect();
        while let Some((node, pen)) = pending.pop() {
            match node {
                Node::Text(text) => {
                    if !text.is_empty() {
                        leaves.push(pen.style.apply(&**text));
                    }
                }
                Node::Span { style, children } => {
                    let pen = self.apply(*style, pen);
                    pending.extend(children.iter().rev().map(|child| (child, pen)));
                }
                Node::Tooltip { child, .. } => {
                    let pen = Pen {
                        style: pen.style.underlined(),
                        ..pen
                    };
                    pending.push((child.as_ref(), pen));
                }
            }
        }
        leaves
    }

    fn apply(&self, style: Style, pen: Pen) -> Pen {
        let theme = self.theme;
        let Pen { style: content, chip } = pen;
        let content = match style {
            Style::Filter(state) => {
                return Pen {
                    style: content.on(theme.search_token_background.get(state).into()),
                    chip: Some(state),
                };
            }
            Style::Negation => content.with(theme.red300.into()).bold(),
            Style::Key { .. } => match chip {
                Some(state) => content.with(theme.search_token_border.get(state).into()).bold(),
                None => content.bold(),
            },
            Style::ExplicitKeyDecoration => content.with(theme.sub_text.into()),
            Style::Operator => content.with(theme.orange400.into()),
            Style::Value { invalid: true } => content.with(theme.red300.into()),
            Style::Value { invalid: false } => content.with(theme.blue300.into()),
            Style::Unit => content.with(theme.green300.into()).bold(),
            Style::LogicBoolean => content.with(theme.red300.into()).bold(),
            Style::Boolean => content.with(theme.pink300.into()),
            Style::DateTime => content.with(theme.green300.into()),
            Style::ListBracket => content.with(theme.purple300.into()).bold(),
            Style::ListComma => content.with(theme.gray300.into()),
            Style::LogicGroupParen => content.with(theme.orange400.into()).bold(),
            Style::Number | Style::List | Style::LogicGroup => content,
        };
        Pen {
            style: content,
            chip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::style::{Attribute, Color};

    use crate::parser::parse;
    use crate::renderer::{render, Renderer};

    fn leaf_text(leaves: &[StyledContent<&str>]) -> String {
        leaves.iter().map(|leaf| *leaf.content()).collect()
    }

    #[test]
    fn test_leaves_spell_the_query() {
        let theme = Theme::default();
        let painter = AnsiPainter::new(&theme);
        for query in ["is:unresolved", "(a:1 OR b:[1,2]) free", "", "ünï:cödé"] {
            let parsed = parse(query);
            let nodes = render(&parsed, Some(0));
            assert_eq!(leaf_text(&painter.styled(&nodes)), query);
        }
    }

    #[test]
    fn test_painted_filter() {
        let theme = Theme::default();
        let painter = AnsiPainter::new(&theme);
        let parsed = parse("a:1");
        let painted = painter.paint(&render(&parsed, None));

        let chip = ContentStyle::new().on(theme.search_token_background.valid.into());
        let key = chip.with(theme.search_token_border.valid.into()).bold();
        let value = chip.with(theme.blue300.into());
        let expected = format!("{}{}{}", key.apply("a"), key.apply(":"), value.apply("1"));
        assert_eq!(painted, expected);
    }

    #[test]
    fn test_chip_background_follows_state() {
        let theme = Theme::default();
        let painter = AnsiPainter::new(&theme);
        let invalid_bg = Some(Color::from(theme.search_token_background.invalid));
        let valid_bg = Some(Color::from(theme.search_token_background.valid));

        let parsed = parse("times_seen:many");
        let nodes = render(&parsed, None);
        let leaves = painter.styled(&nodes);
        assert!(leaves.iter().all(|leaf| leaf.style().background_color == invalid_bg));

        let parsed = parse("times_seen:12");
        let nodes = render(&parsed, None);
        let leaves = painter.styled(&nodes);
        assert!(leaves.iter().all(|leaf| leaf.style().background_color == valid_bg));
    }

    #[test]
    fn test_tooltip_is_underlined() {
        let theme = Theme::default();
        let painter = AnsiPainter::new(&theme);
        let parsed = parse("times_seen:many free");
        let mut renderer = Renderer::new();
        renderer.render(&parsed, None);
        let nodes = renderer.render(&parsed, Some(1));
        let leaves = painter.styled(&nodes);

        let underlined = |leaf: &StyledContent<&str>| leaf.style().attributes.has(Attribute::Underlined);
        assert_eq!(*leaves[0].content(), "times_seen");
        assert!(underlined(&leaves[0]));
        let free = leaves.last().unwrap();
        assert_eq!(*free.content(), "free");
        assert!(!underlined(free));
    }

    #[test]
    fn test_deep_nesting_paints() {
        let theme = Theme::default();
        let painter = AnsiPainter::new(&theme);
        let depth = 100_000;
        let query = "(".repeat(depth) + "a:1" + &")".repeat(depth);
        let parsed = parse(&query);
        let nodes = render(&parsed, None);
        let leaves = painter.styled(&nodes);
        assert_eq!(leaves.len(), 2 * depth + 3);
        assert_eq!(leaf_text(&leaves), query);
    }
}
