//! Context-aware SQL statement splitting.
//!
//! Migration files hold several statements separated by semicolons, but
//! a semicolon is only a separator outside strings, comments, dollar
//! quotes, and `BEGIN…END` / `CASE…END` compound blocks. The splitter
//! walks the input character by character with an explicit state
//! machine; no regex is involved in the scan itself.
//!
//! Transaction control belongs to the engine: one leading
//! `BEGIN [TRANSACTION];` and one trailing `COMMIT;` are stripped, and
//! any transaction statement remaining after that strip is an error.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{MigrateError, Result};

static TXN_BEGIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^BEGIN(\s+(DEFERRED|IMMEDIATE|EXCLUSIVE))?(\s+TRANSACTION)?$")
        .expect("static regex must compile")
});

static TXN_END_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(COMMIT|END)(\s+TRANSACTION)?$").expect("static regex must compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    SingleQuote,
    DoubleQuote,
    Backtick,
    LineComment,
    BlockComment,
    DollarQuote,
}

/// Splits a migration script into individual executable statements.
///
/// Handles quoted strings (single, double, backtick), `$tag$…$tag$`
/// dollar quotes, line and block comments, and nested
/// `BEGIN…END`/`CASE…END` blocks. Statements are trimmed; fragments
/// that are only whitespace and comments are discarded.
///
/// # Errors
///
/// Returns [`MigrateError::StatementSplit`] if transaction statements
/// remain after the head/tail strip, or
/// [`MigrateError::UnclosedDelimiter`] for an unterminated string,
/// comment, dollar quote, or compound block.
pub fn split_statements(sql: &str) -> Result<Vec<String>> {
    let chars: Vec<char> = sql.chars().collect();
    let mut statements: Vec<String> = Vec::new();
    let mut buffer = String::new();

    let mut state = State::Normal;
    let mut state_start = 0usize;
    let mut dollar_tag = String::new();
    // Open BEGIN/CASE blocks, with the offset each opened at.
    let mut blocks: Vec<(&'static str, usize)> = Vec::new();
    // Set after the keyword BEGIN until the next token decides whether
    // it opened a block or a transaction.
    let mut pending_begin = false;

    let mut i = 0usize;
    while i < chars.len() {
        let c = chars[i];
        match state {
            State::SingleQuote | State::DoubleQuote | State::Backtick => {
                buffer.push(c);
                let quote = match state {
                    State::SingleQuote => '\'',
                    State::DoubleQuote => '"',
                    _ => '`',
                };
                if c == quote {
                    // A doubled quote is an escape, not a terminator.
                    if chars.get(i + 1) == Some(&quote) {
                        buffer.push(quote);
                        i += 2;
                        continue;
                    }
                    state = State::Normal;
                }
                i += 1;
            }
            State::LineComment => {
                buffer.push(c);
                if c == '\n' {
                    state = State::Normal;
                }
                i += 1;
            }
            State::BlockComment => {
                buffer.push(c);
                if c == '*' && chars.get(i + 1) == Some(&'/') {
                    buffer.push('/');
                    i += 2;
                    state = State::Normal;
                } else {
                    i += 1;
                }
            }
            State::DollarQuote => {
                if c == '$' && matches_tag(&chars, i, &dollar_tag) {
                    buffer.push('$');
                    buffer.push_str(&dollar_tag);
                    buffer.push('$');
                    i += dollar_tag.len() + 2;
                    state = State::Normal;
                } else {
                    buffer.push(c);
                    i += 1;
                }
            }
            State::Normal => {
                if c.is_alphabetic() || c == '_' {
                    let start = i;
                    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                        buffer.push(chars[i]);
                        i += 1;
                    }
                    let word: String = chars[start..i].iter().collect::<String>().to_uppercase();
                    if pending_begin {
                        pending_begin = false;
                        if !matches!(
                            word.as_str(),
                            "TRANSACTION" | "DEFERRED" | "IMMEDIATE" | "EXCLUSIVE"
                        ) {
                            blocks.push(("BEGIN", start));
                        }
                    }
                    match word.as_str() {
                        "BEGIN" => pending_begin = true,
                        "CASE" => blocks.push(("CASE", start)),
                        "END" => {
                            blocks.pop();
                        }
                        _ => {}
                    }
                    continue;
                }

                match c {
                    '\'' => {
                        state = State::SingleQuote;
                        state_start = i;
                        buffer.push(c);
                        i += 1;
                    }
                    '"' => {
                        state = State::DoubleQuote;
                        state_start = i;
                        buffer.push(c);
                        i += 1;
                    }
                    '`' => {
                        state = State::Backtick;
                        state_start = i;
                        buffer.push(c);
                        i += 1;
                    }
                    '-' if chars.get(i + 1) == Some(&'-') => {
                        state = State::LineComment;
                        buffer.push_str("--");
                        i += 2;
                    }
                    '/' if chars.get(i + 1) == Some(&'*') => {
                        state = State::BlockComment;
                        state_start = i;
                        buffer.push_str("/*");
                        i += 2;
                    }
                    '$' => {
                        if let Some(tag) = read_dollar_tag(&chars, i) {
                            state = State::DollarQuote;
                            state_start = i;
                            buffer.push('$');
                            buffer.push_str(&tag);
                            buffer.push('$');
                            i += tag.len() + 2;
                            dollar_tag = tag;
                        } else {
                            buffer.push(c);
                            i += 1;
                        }
                    }
                    ';' => {
                        // A semicolon right after BEGIN means a
                        // transaction statement, not a block.
                        if pending_begin {
                            pending_begin = false;
                        }
                        if blocks.is_empty() {
                            push_statement(&mut statements, &mut buffer);
                        } else {
                            buffer.push(c);
                        }
                        i += 1;
                    }
                    _ => {
                        buffer.push(c);
                        i += 1;
                    }
                }
            }
        }
    }

    match state {
        State::Normal | State::LineComment => {}
        State::SingleQuote | State::DoubleQuote | State::Backtick => {
            return Err(MigrateError::UnclosedDelimiter {
                construct: "quoted string".to_string(),
                offset: state_start,
            });
        }
        State::BlockComment => {
            return Err(MigrateError::UnclosedDelimiter {
                construct: "block comment".to_string(),
                offset: state_start,
            });
        }
        State::DollarQuote => {
            return Err(MigrateError::UnclosedDelimiter {
                construct: format!("${dollar_tag}$ quote"),
                offset: state_start,
            });
        }
    }
    if let Some((construct, offset)) = blocks.pop() {
        return Err(MigrateError::UnclosedDelimiter {
            construct: format!("{construct} block"),
            offset,
        });
    }
    push_statement(&mut statements, &mut buffer);

    strip_transaction_frame(statements)
}

/// Removes one leading transaction-begin and one trailing commit, then
/// rejects any transaction statement that is still left.
fn strip_transaction_frame(mut statements: Vec<String>) -> Result<Vec<String>> {
    if statements
        .first()
        .is_some_and(|s| TXN_BEGIN_RE.is_match(s))
    {
        statements.remove(0);
    }
    if statements.last().is_some_and(|s| TXN_END_RE.is_match(s)) {
        statements.pop();
    }
    if let Some(stray) = statements
        .iter()
        .find(|s| TXN_BEGIN_RE.is_match(s) || TXN_END_RE.is_match(s))
    {
        return Err(MigrateError::StatementSplit(stray.clone()));
    }
    Ok(statements)
}

fn push_statement(statements: &mut Vec<String>, buffer: &mut String) {
    let statement = buffer.trim().to_string();
    buffer.clear();
    if !statement.is_empty() && !is_comments_only(&statement) {
        statements.push(statement);
    }
}

/// True when the fragment contains nothing but whitespace and comments.
fn is_comments_only(fragment: &str) -> bool {
    let chars: Vec<char> = fragment.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        if chars[i].is_whitespace() {
            i += 1;
        } else if chars[i] == '-' && chars.get(i + 1) == Some(&'-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if chars[i] == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i += 2;
        } else {
            return false;
        }
    }
    true
}

/// Reads a `$tag$` opener at `start`, returning the tag (possibly
/// empty) when one is present.
fn read_dollar_tag(chars: &[char], start: usize) -> Option<String> {
    let mut tag = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == '$' {
            return Some(tag);
        }
        if c.is_ascii_alphanumeric() || c == '_' {
            tag.push(c);
            i += 1;
        } else {
            return None;
        }
    }
    None
}

/// True when `chars[at..]` is `$tag$` for the given tag.
fn matches_tag(chars: &[char], at: usize, tag: &str) -> bool {
    let mut i = at + 1;
    for expected in tag.chars() {
        if chars.get(i) != Some(&expected) {
            return false;
        }
        i += 1;
    }
    chars.get(i) == Some(&'$')
}
