//! Read-only policy.
//!
//! The guard runs before anything else in a session call, so a refused
//! request never reaches the catalog or the connection.

use serde::{Deserialize, Serialize};

use crate::error::{ApplyError, Result};
use crate::structure::Batch;

/// Words that make an otherwise reading statement write, as in a writable
/// CTE or `SELECT ... INTO`.
const WRITE_KEYWORDS: &[&str] = &[
    "ALTER", "ANALYZE", "ATTACH", "CALL", "COPY", "CREATE", "DELETE", "DETACH", "DROP", "EXEC",
    "EXECUTE", "GRANT", "INSERT", "INTO", "MERGE", "REINDEX", "REVOKE", "TRUNCATE", "UPDATE",
    "UPSERT", "VACUUM",
];

/// Access mode of a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessMode {
    /// Reads and writes allowed.
    #[default]
    Normal,
    /// Only reads allowed.
    ReadOnly,
}

/// Enforces the connection's access mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnlyGuard {
    mode: AccessMode,
}

impl ReadOnlyGuard {
    /// Creates a guard in the given mode.
    #[must_use]
    pub const fn new(mode: AccessMode) -> Self {
        Self { mode }
    }

    /// Current mode.
    #[must_use]
    pub const fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Switches mode. Takes effect for the next request.
    pub fn set_mode(&mut self, mode: AccessMode) {
        self.mode = mode;
    }

    /// Returns true in read-only mode.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.mode == AccessMode::ReadOnly
    }

    /// Refuses any mutating batch in read-only mode.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnlyViolation` naming the refused operation.
    pub fn check(&self, batch: &Batch) -> Result<()> {
        if self.is_read_only() && batch.is_mutating() {
            return Err(ApplyError::ReadOnlyViolation {
                operation: batch.describe(),
            });
        }
        Ok(())
    }

    /// Refuses ad-hoc SQL that is not a read in read-only mode.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnlyViolation` unless [`is_read_statement`] accepts
    /// `sql`.
    pub fn check_query(&self, sql: &str) -> Result<()> {
        if self.is_read_only() && !is_read_statement(sql) {
            return Err(ApplyError::ReadOnlyViolation {
                operation: refusal(sql),
            });
        }
        Ok(())
    }
}

/// Lexical token of an ad-hoc statement. String literals, quoted
/// identifiers and comments carry no words.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Open,
    Close,
    Comma,
    Semicolon,
    Equals,
    Other,
}

fn skip_quoted(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, close: char) {
    while let Some(c) = chars.next() {
        if c == close {
            // A doubled quote is an escaped one.
            if chars.peek() == Some(&close) {
                chars.next();
            } else {
                return;
            }
        }
    }
}

fn tokenize(sql: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '-' if chars.peek() == Some(&'-') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
                continue;
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                continue;
            }
            '\'' | '"' | '`' => {
                skip_quoted(&mut chars, c);
                Token::Other
            }
            '[' => {
                skip_quoted(&mut chars, ']');
                Token::Other
            }
            '(' => Token::Open,
            ')' => Token::Close,
            ',' => Token::Comma,
            ';' => Token::Semicolon,
            '=' => Token::Equals,
            c if c.is_alphanumeric() || c == '_' => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if !(next.is_alphanumeric() || next == '_' || next == '$') {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                Token::Word(word.to_ascii_uppercase())
            }
            _ => Token::Other,
        };
        tokens.push(token);
    }
    while tokens.last() == Some(&Token::Semicolon) {
        tokens.pop();
    }
    tokens
}

fn first_word(tokens: &[Token]) -> Option<&str> {
    match tokens.iter().find(|t| **t != Token::Open) {
        Some(Token::Word(w)) => Some(w.as_str()),
        _ => None,
    }
}

/// Keyword of the statement that follows a `WITH` list.
fn main_keyword(tokens: &[Token]) -> Option<&str> {
    let mut depth = 0usize;
    let mut after_body = false;
    for token in tokens {
        match token {
            Token::Open => {
                depth += 1;
                after_body = false;
            }
            Token::Close => {
                depth = depth.saturating_sub(1);
                after_body = depth == 0;
            }
            Token::Word(w) if depth == 0 => {
                if after_body && !matches!(w.as_str(), "AS" | "NOT" | "MATERIALIZED") {
                    return Some(w.as_str());
                }
                after_body = false;
            }
            _ if depth == 0 => after_body = false,
            _ => {}
        }
    }
    None
}

fn refusal(sql: &str) -> String {
    let tokens = tokenize(sql);
    if tokens.contains(&Token::Semicolon) {
        return String::from("run multiple statements");
    }
    format!("run {}", first_word(&tokens).unwrap_or("?"))
}

/// Whether `sql` is a single statement that only reads.
///
/// Accepts `SELECT`, `VALUES`, `SHOW`, `EXPLAIN`, `WITH ... SELECT` and
/// `PRAGMA` without an assignment. Anything holding a second statement or
/// a writing keyword outside literals and comments is refused.
#[must_use]
pub fn is_read_statement(sql: &str) -> bool {
    let tokens = tokenize(sql);
    if tokens.contains(&Token::Semicolon) {
        return false;
    }
    let writes = tokens
        .iter()
        .any(|t| matches!(t, Token::Word(w) if WRITE_KEYWORDS.contains(&w.as_str())));
    if writes {
        return false;
    }
    match first_word(&tokens) {
        Some("SELECT" | "VALUES" | "SHOW" | "EXPLAIN") => true,
        Some("WITH") => main_keyword(&tokens) == Some("SELECT"),
        Some("PRAGMA") => !tokens.contains(&Token::Equals),
        _ => false,
    }
}
