//! Configuration text reader and writer
//!
//! The configuration format is a whitespace-separated token stream made of
//! `Keyword { value... }` blocks:
//!
//! ```text
//! FilterPartNumByte { { 02 } }
//! FilterVidPid { { 10c4 } { ea60 } }
//! VidPid { { 10c4 } { ea61 } }
//! ProductStringAscii { { 57 49 44 47 45 54 } }
//! ```
//!
//! Numbers are fixed-width hex: 2, 4 or 8 digits for byte, short and long
//! values. Byte arrays are brace-delimited lists of 2-digit hex tokens.

use std::fmt::Write as _;

use crate::error::{Error, Position, Result};

/// A fixed-width hex value that can appear in configuration text
pub trait HexValue: Copy {
    /// Number of hex digits
    const DIGITS: usize;

    /// Narrow from the parsed value (always fits)
    fn from_u32(value: u32) -> Self;

    /// Widen for formatting
    fn to_u32(self) -> u32;
}

impl HexValue for u8 {
    const DIGITS: usize = 2;

    fn from_u32(value: u32) -> Self {
        value as u8
    }

    fn to_u32(self) -> u32 {
        self.into()
    }
}

impl HexValue for u16 {
    const DIGITS: usize = 4;

    fn from_u32(value: u32) -> Self {
        value as u16
    }

    fn to_u32(self) -> u32 {
        self.into()
    }
}

impl HexValue for u32 {
    const DIGITS: usize = 8;

    fn from_u32(value: u32) -> Self {
        value
    }

    fn to_u32(self) -> u32 {
        self
    }
}

/// A word read from the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    /// Token text (never contains whitespace)
    pub text: &'a str,
    /// Where the token starts
    pub position: Position,
}

/// Tokenizing reader over configuration text
pub struct Reader<'a> {
    src: &'a str,
    offset: usize,
    line: usize,
    column: usize,
    last: Option<Position>,
    echo: bool,
}

impl<'a> Reader<'a> {
    /// Create a reader over `src`
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            offset: 0,
            line: 1,
            column: 1,
            last: None,
            echo: false,
        }
    }

    /// Log every consumed token (target `rsmt::grammar`)
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    fn skip_whitespace(&mut self) {
        let src = self.src;
        for c in src[self.offset..].chars() {
            if !c.is_whitespace() {
                break;
            }
            self.offset += c.len_utf8();
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    /// Whether only whitespace remains
    pub fn is_at_end(&mut self) -> bool {
        self.skip_whitespace();
        self.offset >= self.src.len()
    }

    /// Read the next whitespace-delimited word
    pub fn next_word(&mut self) -> Option<Token<'a>> {
        self.skip_whitespace();
        let src = self.src;
        let rest = &src[self.offset..];
        if rest.is_empty() {
            return None;
        }
        let len = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let text = &rest[..len];
        let position = Position {
            line: self.line,
            column: self.column,
        };
        self.offset += len;
        self.column += text.chars().count();
        self.last = Some(position);
        if self.echo {
            log::info!(target: "rsmt::grammar", "{}: {}", position, text);
        }
        Some(Token { text, position })
    }

    /// Syntax error located at the most recently read token
    pub fn error(&self, message: impl Into<String>) -> Error {
        Error::Syntax {
            message: message.into(),
            position: self.last,
        }
    }

    /// Require the next word to be `keyword`
    pub fn read_keyword(&mut self, keyword: &str) -> Result<()> {
        match self.next_word() {
            Some(token) if token.text == keyword => Ok(()),
            _ => Err(self.error(format!("expected {}", keyword))),
        }
    }

    /// Read exactly `digits` hex digits as one token
    pub fn read_fixed_hex(&mut self, digits: usize) -> Result<u32> {
        let token = self
            .next_word()
            .ok_or_else(|| self.error(format!("expected {}-digit hex number", digits)))?;
        if token.text.len() != digits || !token.text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(self.error("invalid hex number size"));
        }
        u32::from_str_radix(token.text, 16).map_err(|_| self.error("invalid hex number size"))
    }

    /// Read a bare fixed-width hex value
    pub fn read_hex<T: HexValue>(&mut self) -> Result<T> {
        self.read_fixed_hex(T::DIGITS).map(T::from_u32)
    }

    /// Read `{`, run `f`, then read `}`
    pub fn read_braced<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.read_keyword("{")?;
        let value = f(self)?;
        self.read_keyword("}")?;
        Ok(value)
    }

    /// Read a single braced hex value: `{ XXXX }`
    pub fn read_parm<T: HexValue>(&mut self) -> Result<T> {
        self.read_braced(|r| r.read_hex())
    }

    /// Read a braced list of hex bytes holding at most `max` entries
    pub fn read_byte_array(&mut self, max: usize) -> Result<Vec<u8>> {
        self.read_keyword("{")?;
        let mut bytes = Vec::new();
        loop {
            let token = self
                .next_word()
                .ok_or_else(|| self.error("expected hex byte or }"))?;
            if token.text == "}" {
                return Ok(bytes);
            }
            if token.text.len() != 2 || !token.text.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(self.error("expected hex byte or }"));
            }
            if bytes.len() == max {
                return Err(self.error("byte array too large"));
            }
            let byte =
                u8::from_str_radix(token.text, 16).map_err(|_| self.error("expected hex byte or }"))?;
            bytes.push(byte);
        }
    }

    /// Read a braced list of exactly `len` hex bytes
    pub fn read_byte_array_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        let bytes = self.read_byte_array(len)?;
        if bytes.len() != len {
            return Err(self.error("byte array too small"));
        }
        Ok(bytes)
    }
}

/// Renders configuration text in canonical form
#[derive(Debug, Default)]
pub struct Writer {
    out: String,
}

impl Writer {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `keyword { ... }` on its own line
    pub fn block(&mut self, keyword: &str, f: impl FnOnce(&mut Self)) {
        self.out.push_str(keyword);
        self.out.push_str(" {");
        f(self);
        self.out.push_str(" }\n");
    }

    /// Write a brace-delimited group
    pub fn braced(&mut self, f: impl FnOnce(&mut Self)) {
        self.out.push_str(" {");
        f(self);
        self.out.push_str(" }");
    }

    /// Write a bare fixed-width hex value
    pub fn hex<T: HexValue>(&mut self, value: T) {
        let _ = write!(self.out, " {:0width$x}", value.to_u32(), width = T::DIGITS);
    }

    /// Write `{ value }`
    pub fn parm<T: HexValue>(&mut self, value: T) {
        self.braced(|w| w.hex(value));
    }

    /// Write `{ bytes... }`
    pub fn byte_array(&mut self, bytes: &[u8]) {
        self.braced(|w| {
            for &b in bytes {
                w.hex(b);
            }
        });
    }

    /// Finished text
    pub fn finish(self) -> String {
        self.out
    }
}
