// src/core/updater/manifest.rs

//! A reader for Valve's KeyValues text format.
//!
//! Steam app manifests (`appmanifest_*.acf`) and SteamCMD's `app_info_print`
//! output both use it:
//!
//! ```text
//! "AppState"
//! {
//!     "buildid"     "1234567"
//!     "UserConfig"  { "BetaKey" "staging" }
//! }
//! ```

use crate::core::errors::LaunchSiteError;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValue {
    Text(String),
    Block(KeyValues),
}

/// An ordered list of key/value pairs. Keys match case-insensitively, as Steam does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValues {
    entries: Vec<(String, KeyValue)>,
}

impl KeyValues {
    pub fn parse(text: &str) -> Result<Self, LaunchSiteError> {
        let tokens = tokenize(text)?;
        let mut cursor = 0;
        let root = parse_block(&tokens, &mut cursor, false)?;
        Ok(root)
    }

    pub fn get(&self, key: &str) -> Option<&KeyValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// Looks up a text value by a `.`-separated path.
    pub fn get_path(&self, path: &str) -> Option<&str> {
        let mut node = self;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            match (node.get(segment)?, segments.peek()) {
                (KeyValue::Text(text), None) => return Some(text),
                (KeyValue::Block(block), Some(_)) => node = block,
                _ => return None,
            }
        }
        None
    }
}

/// Reads a single text value from a KeyValues file.
pub fn read_value(path: &Path, key_path: &str) -> Result<Option<String>, LaunchSiteError> {
    let contents = std::fs::read_to_string(path)?;
    let tree = KeyValues::parse(&contents)?;
    Ok(tree.get_path(key_path).map(str::to_string))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open(usize),
    Close(usize),
    Text(String, usize),
}

fn tokenize(text: &str) -> Result<Vec<Token>, LaunchSiteError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    let mut line = 1;

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '{' => {
                tokens.push(Token::Open(line));
                chars.next();
            }
            '}' => {
                tokens.push(Token::Close(line));
                chars.next();
            }
            '/' => {
                chars.next();
                if chars.peek() != Some(&'/') {
                    return Err(LaunchSiteError::Manifest {
                        line,
                        message: "unexpected '/'".to_string(),
                    });
                }
                // Comment to end of line.
                while let Some(&c) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '"' => {
                chars.next();
                let start_line = line;
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => value.push('\n'),
                            Some('t') => value.push('\t'),
                            Some(other) => value.push(other),
                            None => break,
                        },
                        Some(c) => {
                            if c == '\n' {
                                line += 1;
                            }
                            value.push(c);
                        }
                        None => {
                            return Err(LaunchSiteError::Manifest {
                                line: start_line,
                                message: "unterminated string".to_string(),
                            });
                        }
                    }
                }
                tokens.push(Token::Text(value, start_line));
            }
            _ => {
                let mut value = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == '{' || c == '}' || c == '"' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
                tokens.push(Token::Text(value, line));
            }
        }
    }

    Ok(tokens)
}

fn parse_block(
    tokens: &[Token],
    cursor: &mut usize,
    nested: bool,
) -> Result<KeyValues, LaunchSiteError> {
    let mut block = KeyValues::default();

    loop {
        let Some(token) = tokens.get(*cursor) else {
            if nested {
                let line = tokens.last().map_or(1, token_line);
                return Err(LaunchSiteError::Manifest {
                    line,
                    message: "missing closing '}'".to_string(),
                });
            }
            return Ok(block);
        };
        *cursor += 1;

        let key = match token {
            Token::Close(line) => {
                if nested {
                    return Ok(block);
                }
                return Err(LaunchSiteError::Manifest {
                    line: *line,
                    message: "unexpected '}'".to_string(),
                });
            }
            Token::Open(line) => {
                return Err(LaunchSiteError::Manifest {
                    line: *line,
                    message: "expected a key, found '{'".to_string(),
                });
            }
            Token::Text(key, _) => key.clone(),
        };

        let value = match tokens.get(*cursor) {
            Some(Token::Text(text, _)) => {
                *cursor += 1;
                KeyValue::Text(text.clone())
            }
            Some(Token::Open(_)) => {
                *cursor += 1;
                KeyValue::Block(parse_block(tokens, cursor, true)?)
            }
            Some(Token::Close(line)) => {
                return Err(LaunchSiteError::Manifest {
                    line: *line,
                    message: format!("key '{key}' has no value"),
                });
            }
            None => {
                return Err(LaunchSiteError::Manifest {
                    line: token_line(token),
                    message: format!("key '{key}' has no value"),
                });
            }
        };

        block.entries.push((key, value));
    }
}

fn token_line(token: &Token) -> usize {
    match token {
        Token::Open(line) | Token::Close(line) | Token::Text(_, line) => *line,
    }
}
