//! Selector patterns
//!
//! A selector is a path-aware wildcard pattern compiled to an anchored,
//! case-insensitive regular expression:
//! - `*` matches any run of characters except the path separator
//! - `?` matches exactly one character except the path separator
//! - `**/` matches zero or more whole directories
//!
//! Backslashes are treated as path separators in both patterns and values, so
//! `C:\Tools\*.exe` and `C:/Tools/*.exe` are the same selector.

use log::warn;
use regex::Regex;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    /// `*`
    Star,
    /// `?`
    Question,
    /// `**/`
    AnyDirectories,
}

fn normalize_separators(value: &str) -> String {
    value.replace('\\', "/")
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    let flush = |literal: &mut String, tokens: &mut Vec<Token>| {
        if !literal.is_empty() {
            tokens.push(Token::Literal(std::mem::take(literal)));
        }
    };

    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') && chars.get(i + 2) == Some(&'/') => {
                flush(&mut literal, &mut tokens);
                tokens.push(Token::AnyDirectories);
                i += 3;
            }
            '*' => {
                flush(&mut literal, &mut tokens);
                tokens.push(Token::Star);
                i += 1;
            }
            '?' => {
                flush(&mut literal, &mut tokens);
                tokens.push(Token::Question);
                i += 1;
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }
    flush(&mut literal, &mut tokens);

    tokens
}

fn to_regex_source(tokens: &[Token]) -> String {
    let mut source = String::from("(?i)^");
    for token in tokens {
        match token {
            Token::Literal(text) => source.push_str(&regex::escape(text)),
            Token::Star => source.push_str("[^/]*"),
            Token::Question => source.push_str("[^/]"),
            Token::AnyDirectories => source.push_str("(?:.*/)?"),
        }
    }
    source.push('$');
    source
}

/// A compiled selector
#[derive(Debug, Clone)]
pub struct SelectorPattern {
    raw: String,
    regex: Regex,
}

impl SelectorPattern {
    /// Compile `pattern`; `Ok(None)` for a blank pattern, which matches nothing
    pub fn compile(pattern: &str) -> Result<Option<Self>, regex::Error> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let source = to_regex_source(&tokenize(&normalize_separators(trimmed)));
        Ok(Some(Self {
            raw: pattern.to_string(),
            regex: Regex::new(&source)?,
        }))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, value: &str) -> bool {
        if self.raw == value {
            return true;
        }
        self.regex.is_match(&normalize_separators(value))
    }
}

/// Compiled selectors keyed by their source text
#[derive(Debug, Default)]
pub struct PatternCache {
    compiled: HashMap<String, Option<SelectorPattern>>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `value` matches `pattern`, compiling the pattern on first use
    pub fn matches(&mut self, pattern: &str, value: &str) -> bool {
        if pattern.trim().is_empty() {
            return false;
        }
        if pattern == value {
            return true;
        }

        let compiled = self
            .compiled
            .entry(pattern.to_string())
            .or_insert_with(|| {
                SelectorPattern::compile(pattern).unwrap_or_else(|e| {
                    warn!("Selector `{}` cannot be compiled: {}", pattern, e);
                    None
                })
            });

        compiled.as_ref().is_some_and(|p| p.matches(value))
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// One-off match without a cache
pub fn selector_matches(pattern: &str, value: &str) -> bool {
    match SelectorPattern::compile(pattern) {
        Ok(Some(compiled)) => compiled.matches(value),
        _ => false,
    }
}
