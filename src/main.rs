use std::borrow::Cow;
use std::cell::RefCell;

use anyhow::{Context, Result};
use crossterm::style::Stylize;
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::{Hint, Hinter};
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Editor, Helper};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use search_syntax::ansi::AnsiPainter;
use search_syntax::renderer::tooltips;
use search_syntax::token::{Token, TokenKind};
use search_syntax::{parse_with_config, Renderer, SearchConfig};

const DEFAULT_CONFIG_PATH: &str = "search_config.json";

/// The search bar: re-parses and re-renders the line on every keystroke and
/// cursor move, keeping filter latches alive between renders.
struct SearchBar {
    config: SearchConfig,
    renderer: RefCell<Renderer>,
}

impl SearchBar {
    fn new(config: SearchConfig) -> Self {
        Self {
            config,
            renderer: RefCell::new(Renderer::new()),
        }
    }
}

/// A tooltip reason shown after the line. Never inserted into the input.
struct TooltipHint(String);

impl Hint for TooltipHint {
    fn display(&self) -> &str {
        &self.0
    }

    fn completion(&self) -> Option<&str> {
        None
    }
}

impl Completer for SearchBar {
    type Candidate = String;
}

impl Hinter for SearchBar {
    type Hint = TooltipHint;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<TooltipHint> {
        let parsed = parse_with_config(line, &self.config);
        let nodes = self.renderer.borrow_mut().render(&parsed, Some(pos));
        let reasons = tooltips(&nodes);
        if reasons.is_empty() {
            None
        } else {
            Some(TooltipHint(format!("  ⚠ {}", reasons.join(" "))))
        }
    }
}

impl Highlighter for SearchBar {
    fn highlight<'l>(&self, line: &'l str, pos: usize) -> Cow<'l, str> {
        let parsed = parse_with_config(line, &self.config);
        let nodes = self.renderer.borrow_mut().render(&parsed, Some(pos));
        Cow::Owned(AnsiPainter::new(&self.config.theme).paint(&nodes))
    }

    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(hint.with(self.config.theme.red300.into()).to_string())
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        // Cursor moves change which filter is active.
        true
    }
}

impl Validator for SearchBar {}

impl Helper for SearchBar {}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Loads the config file, falling back to the built-in defaults.
fn load_config(path: &str) -> SearchConfig {
    match SearchConfig::from_json_file(path) {
        Ok(config) => {
            println!("✅ Loaded search config from {}", path);
            config
        }
        Err(e) => {
            warn!(path, error = %e, "could not load search config, using defaults");
            SearchConfig::default()
        }
    }
}

fn print_tokens(tokens: &[Token<'_>]) {
    let mut pending = vec![tokens.iter()];
    while let Some(level) = pending.last_mut() {
        let Some(token) = level.next() else {
            pending.pop();
            continue;
        };
        let indent = "  ".repeat(pending.len());
        println!(
            "{}{} [{}, {}) {:?}",
            indent,
            token.kind_name(),
            token.span.start,
            token.span.end,
            token.text
        );
        match &token.kind {
            TokenKind::Filter(filter) => {
                println!(
                    "{}  key: {} {:?}, operator: {}, value: {} {:?}{}",
                    indent,
                    filter.key.kind_name(),
                    filter.key_name(),
                    filter.operator.map_or("none", |op| op.as_str()),
                    filter.value.kind_name(),
                    filter.value.text,
                    if filter.negated { ", negated" } else { "" }
                );
                if let Some(reason) = &filter.invalid {
                    println!("{}  ✗ {}", indent, reason);
                }
            }
            TokenKind::LogicGroup(inner) => pending.push(inner.tokens.iter()),
            _ => {}
        }
    }
}

fn main() -> Result<()> {
    init_tracing();

    println!("--- Search Syntax: query highlighter ---");
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = load_config(&config_path);
    println!("Type a query such as `is:unresolved !level:error (age:-24h OR times_seen:>100)`.");
    println!("Ctrl-D to quit.\n");

    let mut editor: Editor<SearchBar, DefaultHistory> =
        Editor::new().context("failed to start line editor")?;
    editor.set_helper(Some(SearchBar::new(config.clone())));

    loop {
        match editor.readline("search> ") {
            Ok(line) => {
                editor.add_history_entry(line.as_str())?;
                let parsed = parse_with_config(&line, &config);
                print_tokens(&parsed.tokens);
                if let Some(helper) = editor.helper() {
                    helper.renderer.borrow_mut().reset();
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err).context("failed to read query"),
        }
    }
    Ok(())
}
