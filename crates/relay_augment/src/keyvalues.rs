//! Reader for the host's text key-value resource format.
//!
//! A document is a root key followed by a `{ ... }` block of nested keys,
//! each holding either a string value or another block:
//!
//! ```text
//! "ModEvents"
//! {
//!     "player_death"          // a comment
//!     {
//!         "userid"    "short"
//!     }
//! }
//! ```
//!
//! Tokens may be quoted or bare. Conditional suffixes such as `[$WIN32]` and
//! `#base`/`#include` directives are accepted and ignored.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::ResourceError;
use crate::host::{KeyedHierarchy, ResourceLoader};

/// Syntax error with the line it was found on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

/// Value held by a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvValue {
    Text(String),
    Block(Vec<KeyValues>),
}

/// A named key with its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValues {
    name: String,
    value: KvValue,
}

impl KeyValues {
    /// Parses the first root key of `text`. Anything after it is ignored.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut tokens = Tokenizer::new(text);
        loop {
            match tokens.next()? {
                Some(Token::Text(name)) if name.starts_with('#') => {
                    // #base "file.res"
                    tokens.next()?;
                }
                Some(Token::Text(name)) => return parse_entry(&mut tokens, name),
                Some(token) => return Err(tokens.error(format!("expected a key, found {token}"))),
                None => return Err(tokens.error("empty document".to_string())),
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &KvValue {
        &self.value
    }

    /// Nested keys; empty for text values.
    pub fn subkeys(&self) -> &[KeyValues] {
        match &self.value {
            KvValue::Block(children) => children,
            KvValue::Text(_) => &[],
        }
    }

    /// First nested key called `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&KeyValues> {
        self.subkeys()
            .iter()
            .find(|child| child.name.eq_ignore_ascii_case(name))
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            KvValue::Text(text) => Some(text),
            KvValue::Block(_) => None,
        }
    }
}

impl KeyedHierarchy for KeyValues {
    fn top_level_keys(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        Box::new(self.subkeys().iter().map(KeyValues::name))
    }
}

fn parse_entry(tokens: &mut Tokenizer<'_>, name: String) -> Result<KeyValues, ParseError> {
    match tokens.next()? {
        Some(Token::Open) => Ok(KeyValues {
            name,
            value: KvValue::Block(parse_block(tokens)?),
        }),
        Some(Token::Text(text)) => Ok(KeyValues {
            name,
            value: KvValue::Text(text),
        }),
        Some(Token::Close) => Err(tokens.error(format!("key {name} has no value"))),
        None => Err(tokens.error(format!("unexpected end of input after key {name}"))),
    }
}

fn parse_block(tokens: &mut Tokenizer<'_>) -> Result<Vec<KeyValues>, ParseError> {
    let mut children = Vec::new();
    loop {
        match tokens.next()? {
            Some(Token::Close) => return Ok(children),
            Some(Token::Text(name)) => children.push(parse_entry(tokens, name)?),
            Some(Token::Open) => return Err(tokens.error("unexpected '{'".to_string())),
            None => return Err(tokens.error("unterminated block".to_string())),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Text(String),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Open => f.write_str("'{'"),
            Token::Close => f.write_str("'}'"),
            Token::Text(text) => write!(f, "\"{text}\""),
        }
    }
}

struct Tokenizer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(text: &'a str) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        Self {
            chars: text.chars().peekable(),
            line: 1,
        }
    }

    fn error(&self, message: String) -> ParseError {
        ParseError {
            line: self.line,
            message,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// Skips whitespace, comments and conditionals.
    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '/' {
                self.bump();
                if self.chars.peek() != Some(&'/') {
                    return Err(self.error("stray '/'".to_string()));
                }
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else if c == '[' {
                while let Some(c) = self.bump() {
                    if c == ']' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Token>, ParseError> {
        self.skip_trivia()?;
        let Some(c) = self.bump() else {
            return Ok(None);
        };

        let token = match c {
            '{' => Token::Open,
            '}' => Token::Close,
            '"' => Token::Text(self.quoted()?),
            first => {
                let mut text = String::from(first);
                while let Some(&c) = self.chars.peek() {
                    if c.is_whitespace() || matches!(c, '{' | '}' | '"') {
                        break;
                    }
                    text.push(c);
                    self.bump();
                }
                Token::Text(text)
            }
        };
        Ok(Some(token))
    }

    fn quoted(&mut self) -> Result<String, ParseError> {
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(text),
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some(c) => text.push(c),
                    None => break,
                },
                Some(c) => text.push(c),
                None => break,
            }
        }
        Err(self.error("unterminated string".to_string()))
    }
}

// ============================================================================
// Directory-backed Resource Loader
// ============================================================================

/// A [`ResourceLoader`] that reads files from named search paths on disk.
///
/// Each search path id maps to an ordered list of directories; the first
/// directory holding the requested file wins. Ids are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct DirectoryLoader {
    search_paths: HashMap<String, Vec<PathBuf>>,
}

impl DirectoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `dir` to the search path `id`.
    pub fn add_search_path(&mut self, id: &str, dir: impl AsRef<Path>) {
        self.search_paths
            .entry(id.to_ascii_uppercase())
            .or_default()
            .push(dir.as_ref().to_path_buf());
    }

    pub fn with_search_path(mut self, id: &str, dir: impl AsRef<Path>) -> Self {
        self.add_search_path(id, dir);
        self
    }

    /// Parses `path` from the first directory of `search_path` containing it.
    pub fn load_document(&self, path: &str, search_path: &str) -> Result<KeyValues, ResourceError> {
        let dirs = self
            .search_paths
            .get(&search_path.to_ascii_uppercase())
            .ok_or_else(|| ResourceError::UnknownSearchPath(search_path.to_string()))?;

        for dir in dirs {
            let full = dir.join(path);
            trace!("Trying {}", full.display());
            let bytes = match fs::read(&full) {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(source) => return Err(ResourceError::Io { path: full, source }),
            };

            debug!("Loading resource {}", full.display());
            let text = String::from_utf8_lossy(&bytes);
            return KeyValues::parse(&text)
                .map_err(|source| ResourceError::Parse { path: full, source });
        }

        Err(ResourceError::NotFound {
            path: path.to_string(),
        })
    }
}

impl ResourceLoader for DirectoryLoader {
    fn load(
        &self,
        path: &str,
        search_path: &str,
    ) -> Result<Box<dyn KeyedHierarchy>, ResourceError> {
        Ok(Box::new(self.load_document(path, search_path)?))
    }
}
