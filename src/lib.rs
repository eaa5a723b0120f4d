//! Tokenizer and syntax-highlighting renderer for the issue search language,
//! e.g. `is:unresolved !level:error (age:-24h OR times_seen:>100)`.
//!
//! ```text
//! query ──parse()──> ParseResult ──validate──> ParseResult (+ invalid)
//!                                                  │
//!                       cursor ──> Renderer::render()
//!                                                  │
//!                                         Vec<Node> ──AnsiPainter──> terminal
//! ```

pub mod ansi;
pub mod config;
pub mod parser;
pub mod renderer;
pub mod theme;
pub mod token;
pub mod utils;
pub mod validate;

pub use config::{ConfigError, SearchConfig};
pub use parser::{parse, parse_with_config, Parser};
pub use renderer::{render, Node, Renderer, Style};
pub use token::{ParseResult, Span, Token, TokenKind};
pub use utils::is_within_token;
pub use validate::InvalidReason;
