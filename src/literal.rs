//! Restricted literal declarations.
//!
//! The configuration file is a sequence of `NAME = <literal>` declarations.
//! Only constant data is accepted: strings, numbers, booleans, null, lists and
//! mappings with string keys. Identifiers, calls and operators are rejected with
//! a positioned error; nothing in the file is ever evaluated.

use std::fmt::{self, Write as _};

use crate::error::{Error, Result};

/// A constant value from a declaration.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    /// `null` / `None`.
    Null,
    /// `true` / `false` (also `True` / `False`).
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A finite float.
    Float(f64),
    /// A quoted string.
    Str(String),
    /// `[a, b, ...]`
    List(Vec<Literal>),
    /// `{"key": value, ...}`, in source order.
    Map(Vec<(String, Literal)>),
}

impl Literal {
    /// Returns the string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean value, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the numeric value, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Int(i) => Some(*i as f64),
            Literal::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the entries, if this is a mapping.
    pub fn as_map(&self) -> Option<&[(String, Literal)]> {
        match self {
            Literal::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// A short name for the kind of value, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Literal::Null => "null",
            Literal::Bool(_) => "boolean",
            Literal::Int(_) => "integer",
            Literal::Float(_) => "float",
            Literal::Str(_) => "string",
            Literal::List(_) => "list",
            Literal::Map(_) => "mapping",
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::Str(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::Str(s)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

impl From<f64> for Literal {
    fn from(f: f64) -> Self {
        Literal::Float(f)
    }
}

impl fmt::Display for Literal {
    /// Formats the value in declaration syntax; the output parses back to an
    /// equal value.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("null"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(i) => write!(f, "{i}"),
            // Debug keeps the fractional part, so 1.0 does not come back as an integer.
            Literal::Float(x) => write!(f, "{x:?}"),
            Literal::Str(s) => write_quoted(f, s),
            Literal::List(items) => {
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_char(']')
            }
            Literal::Map(entries) => {
                f.write_char('{')?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_quoted(f, key)?;
                    write!(f, ": {value}")?;
                }
                f.write_char('}')
            }
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_char('"')?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if c.is_control() => write!(f, "\\u{:04x}", c as u32)?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('"')
}

/// One `NAME = <literal>` binding.
#[derive(Clone, Debug, PartialEq)]
pub struct Declaration {
    /// The bound name.
    pub name: String,
    /// The bound value.
    pub value: Literal,
}

/// Renders a declaration followed by a newline.
pub fn render_declaration(name: &str, value: &Literal) -> String {
    format!("{name} = {value}\n")
}

/// Parses every declaration in `input`.
pub fn parse_declarations(input: &str) -> Result<Vec<Declaration>> {
    let mut parser = Parser::new(input);
    let mut declarations = Vec::new();
    loop {
        parser.skip_trivia();
        if parser.at_end() {
            return Ok(declarations);
        }
        let name = parser.identifier()?;
        parser.skip_trivia();
        parser.expect('=')?;
        let value = parser.value()?;
        declarations.push(Declaration { name, value });
        parser.skip_inline_trivia();
        match parser.peek() {
            None | Some('\n') | Some(';') => {
                parser.bump();
            }
            Some('#') => {}
            Some(c) => return Err(parser.error(format!("unexpected {c:?} after declaration"))),
        }
    }
}

/// Finds the value bound to `name`; the first binding wins.
pub fn find_declaration(input: &str, name: &str) -> Result<Literal> {
    parse_declarations(input)?
        .into_iter()
        .find(|decl| decl.name == name)
        .map(|decl| decl.value)
        .ok_or_else(|| Error::config_parse(format!("no {name} declaration found"), None, None))
}

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::config_parse(message, Some(self.line), Some(self.column))
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn at_end(&mut self) -> bool {
        self.peek().is_none()
    }

    fn expect(&mut self, want: char) -> Result<()> {
        match self.peek() {
            Some(c) if c == want => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected {want:?}, found {c:?}"))),
            None => Err(self.error(format!("expected {want:?}, found end of input"))),
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    /// Skips whitespace (including newlines) and comments.
    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c == '#' {
                self.skip_comment();
            } else if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    /// Skips spaces and tabs only.
    fn skip_inline_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c == ' ' || c == '\t' || c == '\r' {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn identifier(&mut self) -> Result<String> {
        let mut ident = String::new();
        match self.peek() {
            Some(c) if c.is_alphabetic() || c == '_' => {}
            Some(c) => return Err(self.error(format!("expected a name, found {c:?}"))),
            None => return Err(self.error("expected a name, found end of input")),
        }
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }
        Ok(ident)
    }

    fn value(&mut self) -> Result<Literal> {
        self.skip_trivia();
        match self.peek() {
            Some('"') | Some('\'') => self.string().map(Literal::Str),
            Some('[') => self.list(),
            Some('{') => self.map(),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_alphabetic() || c == '_' => {
                let (line, column) = (self.line, self.column);
                let ident = self.identifier()?;
                match ident.as_str() {
                    "true" | "True" => Ok(Literal::Bool(true)),
                    "false" | "False" => Ok(Literal::Bool(false)),
                    "null" | "None" => Ok(Literal::Null),
                    _ => Err(Error::config_parse(
                        format!("{ident} is not a literal; only constant values are allowed"),
                        Some(line),
                        Some(column),
                    )),
                }
            }
            Some(c) => Err(self.error(format!("unexpected {c:?}; expected a literal value"))),
            None => Err(self.error("expected a literal value, found end of input")),
        }
    }

    fn string(&mut self) -> Result<String> {
        let quote = self.bump().unwrap_or('"');
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => out.push(self.escape()?),
                Some(c) => out.push(c),
            }
        }
    }

    fn escape(&mut self) -> Result<char> {
        match self.bump() {
            Some('\\') => Ok('\\'),
            Some('\'') => Ok('\''),
            Some('"') => Ok('"'),
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('t') => Ok('\t'),
            Some('0') => Ok('\0'),
            Some('x') => self.hex_escape(2),
            Some('u') => self.hex_escape(4),
            Some(c) => Err(self.error(format!("unknown escape \\{c}"))),
            None => Err(self.error("unterminated escape")),
        }
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char> {
        let mut code = 0u32;
        for _ in 0..digits {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("invalid hex escape"))?;
            code = code * 16 + digit;
        }
        char::from_u32(code).ok_or_else(|| self.error("escape is not a valid character"))
    }

    fn number(&mut self) -> Result<Literal> {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '_') {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let invalid = || {
            Error::config_parse(
                format!("{text:?} is not a number literal"),
                Some(line),
                Some(column),
            )
        };
        let cleaned = text.replace('_', "");
        let body = cleaned.trim_start_matches(['-', '+']);
        if body.is_empty()
            || cleaned.len() - body.len() > 1
            || !body.starts_with(|c: char| c.is_ascii_digit() || c == '.')
            || body.contains(|c: char| c.is_ascii_alphabetic() && c != 'e' && c != 'E')
        {
            return Err(invalid());
        }
        if !body.contains(['.', 'e', 'E']) {
            return cleaned.parse::<i64>().map(Literal::Int).map_err(|_| invalid());
        }
        match cleaned.parse::<f64>() {
            Ok(x) if x.is_finite() => Ok(Literal::Float(x)),
            _ => Err(invalid()),
        }
    }

    fn list(&mut self) -> Result<Literal> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            if self.peek() == Some(']') {
                self.bump();
                return Ok(Literal::List(items));
            }
            items.push(self.value()?);
            self.skip_trivia();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(']') => {}
                Some(c) => return Err(self.error(format!("expected ',' or ']', found {c:?}"))),
                None => return Err(self.error("unterminated list")),
            }
        }
    }

    fn map(&mut self) -> Result<Literal> {
        self.expect('{')?;
        let mut entries: Vec<(String, Literal)> = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                Some('}') => {
                    self.bump();
                    return Ok(Literal::Map(entries));
                }
                Some('"') | Some('\'') => {}
                Some(c) => return Err(self.error(format!("mapping keys must be strings, found {c:?}"))),
                None => return Err(self.error("unterminated mapping")),
            }
            let key = self.string()?;
            self.skip_trivia();
            self.expect(':')?;
            let value = self.value()?;
            // A repeated key replaces the earlier value in place.
            if let Some(slot) = entries.iter_mut().find(|(k, _)| *k == key) {
                slot.1 = value;
            } else {
                entries.push((key, value));
            }
            self.skip_trivia();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some('}') => {}
                Some(c) => return Err(self.error(format!("expected ',' or '}}', found {c:?}"))),
                None => return Err(self.error("unterminated mapping")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_settings_declaration() {
        let input = r#"
# dschat settings
DATABASE = {
    'api_key': 'sk-123',
    "base_url": "https://api.deepseek.com",
    'model': 'deepseek-chat',
    'temperature': 0.7,
    'memory': True,
}
"#;
        let value = find_declaration(input, "DATABASE").unwrap();
        let entries = value.as_map().unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0], ("api_key".to_string(), Literal::from("sk-123")));
        assert_eq!(entries[3].1, Literal::Float(0.7));
        assert_eq!(entries[4].1, Literal::Bool(true));
    }

    #[test]
    fn rejects_calls_and_names() {
        let err = find_declaration("DATABASE = {'k': open('x')}", "DATABASE").unwrap_err();
        assert!(err.to_string().contains("open is not a literal"), "{err}");

        let err = find_declaration("DATABASE = other", "DATABASE").unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn rejects_arithmetic() {
        let err = find_declaration("DATABASE = {'t': 1 + 2}", "DATABASE").unwrap_err();
        assert!(matches!(err, Error::ConfigParse { line: Some(1), .. }), "{err}");

        assert!(find_declaration("DATABASE = {'t': 1-2}", "DATABASE").is_err());
    }

    #[test]
    fn reports_missing_declaration() {
        let err = find_declaration("OTHER = 1\n", "DATABASE").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration parse error: no DATABASE declaration found"
        );
    }

    #[test]
    fn reports_position_of_bad_token() {
        let err = find_declaration("DATABASE = {\n  'a': 1,\n  'b': @\n}", "DATABASE").unwrap_err();
        match err {
            Error::ConfigParse { line, column, .. } => {
                assert_eq!(line, Some(3));
                assert_eq!(column, Some(8));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn numbers() {
        let value = find_declaration("X = [1, -2, 0.5, 1e3, -1.5E-1, 1_000]", "X").unwrap();
        assert_eq!(
            value,
            Literal::List(vec![
                Literal::Int(1),
                Literal::Int(-2),
                Literal::Float(0.5),
                Literal::Float(1000.0),
                Literal::Float(-0.15),
                Literal::Int(1000),
            ])
        );
        assert!(find_declaration("X = 0x10", "X").is_err());
        assert!(find_declaration("X = --1", "X").is_err());
    }

    #[test]
    fn escapes_survive_rendering() {
        let value = Literal::Map(vec![
            ("quote".to_string(), Literal::from("say \"hi\"\n\tok \\ 好")),
            ("whole".to_string(), Literal::Float(1.0)),
            ("none".to_string(), Literal::Null),
        ]);
        let text = render_declaration("DATABASE", &value);
        assert_eq!(find_declaration(&text, "DATABASE").unwrap(), value);
    }

    #[test]
    fn first_declaration_wins_and_semicolons_separate() {
        let value = find_declaration("A = 1; A = 2\n", "A").unwrap();
        assert_eq!(value, Literal::Int(1));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(parse_declarations("A = 1 2\n").is_err());
        assert!(parse_declarations("A = 'unterminated\n").is_err());
        assert!(parse_declarations("A = {1: 2}\n").is_err());
    }
}
