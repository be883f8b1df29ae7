//! Restricted object-literal reader for MutationPartial payloads.
//!
//! Models emit payloads as JavaScript object literals rather than strict JSON:
//! bare keys, single-quoted strings, backtick multi-line strings, trailing
//! commas and comments all show up in practice. This module accepts that
//! literal subset with a plain recursive-descent parser and produces a
//! `serde_json::Value`. Nothing is evaluated: identifiers other than `true`,
//! `false`, `null` and `undefined` are rejected, as are template
//! substitutions (`${...}`), so a payload can never reach ambient state.

use serde_json::{Map, Number, Value};
use std::fmt;

/// Nesting limit for arrays/objects.
const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for LiteralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {}, column {})", self.message, self.line, self.column)
    }
}

impl std::error::Error for LiteralError {}

/// Parse a literal whose top-level value must be an object.
pub fn parse_object_literal(source: &str) -> Result<Map<String, Value>, LiteralError> {
    let mut parser = Parser::new(source);
    parser.skip_trivia()?;

    // `({ ... })` is common when the literal was meant for an eval context.
    let mut parens = 0usize;
    while parser.peek() == Some('(') {
        parser.bump();
        parens += 1;
        parser.skip_trivia()?;
    }

    let value = match parser.peek() {
        Some('{') => parser.parse_object(0)?,
        Some(_) => return Err(parser.error("expression did not produce an object")),
        None => return Err(parser.error("empty payload")),
    };

    for _ in 0..parens {
        parser.skip_trivia()?;
        parser.expect(')')?;
    }
    parser.skip_trivia()?;
    if parser.peek().is_some() {
        return Err(parser.error("unexpected trailing content after object literal"));
    }

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(parser.error("expression did not produce an object")),
    }
}

/// A parsed element. `undefined` is kept apart so objects can drop it the way
/// `JSON.stringify` does, while arrays turn it into `null`.
enum Parsed {
    Value(Value),
    Undefined,
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> LiteralError {
        let mut line = 1;
        let mut column = 1;
        for &c in &self.chars[..self.pos.min(self.chars.len())] {
            if c == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        LiteralError {
            message: message.into(),
            line,
            column,
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), LiteralError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{}', found '{}'", expected, c))),
            None => Err(self.error(format!("expected '{}', found end of input", expected))),
        }
    }

    /// Skip whitespace, `// line` and `/* block */` comments.
    fn skip_trivia(&mut self) -> Result<(), LiteralError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() || c == '\u{feff}' => {
                    self.pos += 1;
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.pos += 2;
                    loop {
                        match self.peek() {
                            Some('*') if self.peek_at(1) == Some('/') => {
                                self.pos += 2;
                                break;
                            }
                            Some(_) => self.pos += 1,
                            None => return Err(self.error("unterminated block comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_value(&mut self, depth: usize) -> Result<Parsed, LiteralError> {
        if depth > MAX_DEPTH {
            return Err(self.error("literal nested too deeply"));
        }
        self.skip_trivia()?;
        match self.peek() {
            Some('{') => self.parse_object(depth).map(Parsed::Value),
            Some('[') => self.parse_array(depth).map(Parsed::Value),
            Some('"') | Some('\'') => {
                let quote = self.bump().unwrap_or('"');
                self.parse_quoted(quote).map(|s| Parsed::Value(Value::String(s)))
            }
            Some('`') => {
                self.pos += 1;
                self.parse_template().map(|s| Parsed::Value(Value::String(s)))
            }
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                self.parse_number().map(Parsed::Value)
            }
            Some(c) if is_ident_start(c) => {
                let start = self.pos;
                let word = self.parse_identifier();
                match word.as_str() {
                    "true" => Ok(Parsed::Value(Value::Bool(true))),
                    "false" => Ok(Parsed::Value(Value::Bool(false))),
                    "null" => Ok(Parsed::Value(Value::Null)),
                    "undefined" => Ok(Parsed::Undefined),
                    _ => {
                        self.pos = start;
                        Err(self.error(format!("'{}' is not a literal value", word)))
                    }
                }
            }
            Some(c) => Err(self.error(format!("unexpected character '{}'", c))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_object(&mut self, depth: usize) -> Result<Value, LiteralError> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_trivia()?;
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(Value::Object(map));
            }

            let key = self.parse_key()?;
            self.skip_trivia()?;
            self.expect(':')?;
            match self.parse_value(depth + 1)? {
                Parsed::Value(value) => {
                    map.insert(key, value);
                }
                Parsed::Undefined => {
                    map.shift_remove(&key);
                }
            }

            self.skip_trivia()?;
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                }
                Some('}') => {}
                Some(c) => {
                    return Err(self.error(format!("expected ',' or '}}' in object, found '{}'", c)));
                }
                None => return Err(self.error("unterminated object literal")),
            }
        }
    }

    fn parse_array(&mut self, depth: usize) -> Result<Value, LiteralError> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            self.skip_trivia()?;
            if self.peek() == Some(']') {
                self.pos += 1;
                return Ok(Value::Array(items));
            }

            match self.parse_value(depth + 1)? {
                Parsed::Value(value) => items.push(value),
                Parsed::Undefined => items.push(Value::Null),
            }

            self.skip_trivia()?;
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                }
                Some(']') => {}
                Some(c) => {
                    return Err(self.error(format!("expected ',' or ']' in array, found '{}'", c)));
                }
                None => return Err(self.error("unterminated array literal")),
            }
        }
    }

    fn parse_key(&mut self) -> Result<String, LiteralError> {
        match self.peek() {
            Some('"') | Some('\'') => {
                let quote = self.bump().unwrap_or('"');
                self.parse_quoted(quote)
            }
            Some(c) if is_ident_start(c) => Ok(self.parse_identifier()),
            Some(c) if c.is_ascii_digit() => {
                let start = self.pos;
                while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '.') {
                    self.pos += 1;
                }
                Ok(self.chars[start..self.pos].iter().collect())
            }
            Some(c) => Err(self.error(format!("unexpected character '{}' where a key was expected", c))),
            None => Err(self.error("unterminated object literal")),
        }
    }

    fn parse_identifier(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_ident_part(c)) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn parse_quoted(&mut self, quote: char) -> Result<String, LiteralError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(out),
                Some('\\') => self.parse_escape(&mut out)?,
                Some('\n') | Some('\r') => {
                    return Err(self.error("unterminated string literal (raw line break)"));
                }
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated string literal")),
            }
        }
    }

    fn parse_template(&mut self) -> Result<String, LiteralError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('`') => return Ok(out),
                Some('\\') => self.parse_escape(&mut out)?,
                Some('$') if self.peek() == Some('{') => {
                    self.pos -= 1;
                    return Err(self.error("template substitutions are not allowed in payloads"));
                }
                Some('\r') => {
                    if self.peek() == Some('\n') {
                        self.pos += 1;
                    }
                    out.push('\n');
                }
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated template string")),
            }
        }
    }

    fn parse_escape(&mut self, out: &mut String) -> Result<(), LiteralError> {
        let Some(c) = self.bump() else {
            return Err(self.error("unterminated escape sequence"));
        };
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{0008}'),
            'f' => out.push('\u{000c}'),
            'v' => out.push('\u{000b}'),
            '0' if !matches!(self.peek(), Some(d) if d.is_ascii_digit()) => out.push('\0'),
            'x' => {
                let code = self.parse_hex_digits(2)?;
                out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            'u' => {
                let code = self.parse_unicode_escape()?;
                if (0xD800..0xDC00).contains(&code)
                    && self.peek() == Some('\\')
                    && self.peek_at(1) == Some('u')
                {
                    let save = self.pos;
                    self.pos += 2;
                    let low = self.parse_unicode_escape()?;
                    if (0xDC00..0xE000).contains(&low) {
                        let combined = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
                        out.push(char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER));
                        return Ok(());
                    }
                    self.pos = save;
                }
                out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            // Line continuation.
            '\n' => {}
            '\r' => {
                if self.peek() == Some('\n') {
                    self.pos += 1;
                }
            }
            other => out.push(other),
        }
        Ok(())
    }

    fn parse_unicode_escape(&mut self) -> Result<u32, LiteralError> {
        if self.peek() == Some('{') {
            self.pos += 1;
            let start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let digits: String = self.chars[start..self.pos].iter().collect();
            self.expect('}')?;
            return u32::from_str_radix(&digits, 16)
                .ok()
                .filter(|code| *code <= 0x10FFFF)
                .ok_or_else(|| self.error("invalid unicode code point escape"));
        }
        self.parse_hex_digits(4)
    }

    fn parse_hex_digits(&mut self, count: usize) -> Result<u32, LiteralError> {
        let mut code = 0u32;
        for _ in 0..count {
            let digit = self
                .peek()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("invalid hexadecimal escape"))?;
            self.pos += 1;
            code = code * 16 + digit;
        }
        Ok(code)
    }

    fn parse_number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        let negative = match self.peek() {
            Some('-') => {
                self.pos += 1;
                true
            }
            Some('+') => {
                self.pos += 1;
                false
            }
            _ => false,
        };

        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit() || c == '_') {
                self.pos += 1;
            }
            let digits: String = self.chars[digits_start..self.pos]
                .iter()
                .filter(|c| **c != '_')
                .collect();
            let magnitude = i64::from_str_radix(&digits, 16)
                .map_err(|_| self.error("invalid hexadecimal number"))?;
            return Ok(Value::Number(Number::from(if negative { -magnitude } else { magnitude })));
        }

        let mut is_float = false;
        let mut saw_digit = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => saw_digit = true,
                '_' => {}
                '.' if !is_float => is_float = true,
                'e' | 'E' => {
                    is_float = true;
                    if matches!(self.peek_at(1), Some('+') | Some('-')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
            self.pos += 1;
        }
        if !saw_digit {
            self.pos = start;
            return Err(self.error("invalid number literal"));
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_' && **c != '+')
            .collect();

        if !is_float {
            if let Ok(n) = text.parse::<i64>() {
                return Ok(Value::Number(Number::from(n)));
            }
            if let Ok(n) = text.parse::<u64>() {
                return Ok(Value::Number(Number::from(n)));
            }
        }
        let float = text
            .parse::<f64>()
            .map_err(|_| self.error(format!("invalid number literal '{}'", text)))?;
        Number::from_f64(float)
            .map(Value::Number)
            .ok_or_else(|| self.error("number is not finite"))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}
