// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::cmp;
use core::fmt::{self, Debug, Formatter};
use core::iter::Peekable;
use core::str::CharIndices;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};

/// A position in a source file.
///
/// `line` and `column` are 1-based, `byte` is the 0-based offset from the
/// beginning of the file. Columns count characters, so a tab is one column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
    pub byte: usize,
}

impl Pos {
    pub const INITIAL: Pos = Pos {
        line: 1,
        column: 1,
        byte: 0,
    };
}

/// A span of a source file, identified by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Range {
    pub filename: String,
    pub start: Pos,
    pub end: Pos,
}

impl Range {
    pub fn new(filename: impl Into<String>, start: Pos, end: Pos) -> Self {
        Self {
            filename: filename.into(),
            start,
            end,
        }
    }

    /// Range that starts at the start of `self` and ends at the end of `other`.
    pub fn to(&self, other: &Range) -> Range {
        Range {
            filename: self.filename.clone(),
            start: self.start,
            end: other.end,
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.start.line == self.end.line {
            write!(
                f,
                "{}:{},{}-{}",
                self.filename, self.start.line, self.start.column, self.end.column
            )
        } else {
            write!(
                f,
                "{}:{},{}-{},{}",
                self.filename, self.start.line, self.start.column, self.end.line, self.end.column
            )
        }
    }
}

struct SourceInternal {
    file: String,
    contents: String,
    // Byte offset of the first character of each line.
    line_starts: Vec<u32>,
    base: Pos,
}

/// Source text of a configuration file or of a detached expression.
///
/// A source may start at an arbitrary position (`base`) so that expressions
/// re-parsed from their own text keep the positions of the original file.
#[derive(Clone)]
pub struct Source {
    src: Arc<SourceInternal>,
}

impl cmp::PartialEq for Source {
    fn eq(&self, other: &Source) -> bool {
        Arc::ptr_eq(&self.src, &other.src)
    }
}

impl cmp::Eq for Source {}

impl Debug for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        self.src.file.fmt(f)
    }
}

impl Source {
    pub fn from_contents(file: String, contents: String) -> Result<Source> {
        Self::from_contents_at(file, contents, Pos::INITIAL)
    }

    pub fn from_contents_at(file: String, contents: String, base: Pos) -> Result<Source> {
        let max_size = u32::MAX as usize - 2;
        if contents.len() > max_size {
            bail!("{file} exceeds maximum allowed configuration file size {max_size}");
        }
        let mut line_starts = vec![0u32];
        for (i, ch) in contents.char_indices() {
            if ch == '\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        Ok(Self {
            src: Arc::new(SourceInternal {
                file,
                contents,
                line_starts,
                base,
            }),
        })
    }

    pub fn file(&self) -> &String {
        &self.src.file
    }

    pub fn contents(&self) -> &String {
        &self.src.contents
    }

    pub fn base(&self) -> Pos {
        self.src.base
    }

    /// Text of the line with the given 0-based index, without the line terminator.
    pub fn line(&self, idx: usize) -> &str {
        let starts = &self.src.line_starts;
        if idx >= starts.len() {
            return "";
        }
        let start = starts[idx] as usize;
        let end = match starts.get(idx + 1) {
            Some(next) => *next as usize - 1,
            None => self.src.contents.len(),
        };
        self.src.contents[start..end].trim_end_matches('\r')
    }

    /// Position of the given byte offset.
    pub fn pos(&self, offset: u32) -> Pos {
        let starts = &self.src.line_starts;
        let idx = starts.partition_point(|s| *s <= offset) - 1;
        let line_start = starts[idx] as usize;
        let offset = cmp::min(offset as usize, self.src.contents.len());
        let chars = self.src.contents[line_start..offset].chars().count();
        let base = self.src.base;
        Pos {
            line: base.line + idx,
            column: match idx {
                0 => base.column + chars,
                _ => 1 + chars,
            },
            byte: base.byte + offset,
        }
    }

    pub fn message(&self, offset: u32, kind: &str, msg: &str) -> String {
        let pos = self.pos(offset);
        let idx = pos.line - self.src.base.line;
        let line_str = format!("{}", pos.line);
        let line_num_width = line_str.len() + 1;
        let col_spaces = match idx {
            0 => pos.column - self.src.base.column,
            _ => pos.column - 1,
        };

        format!(
            "\n--> {}:{}:{}\n{:<line_num_width$}|\n\
             {:<line_num_width$}| {}\n\
             {:<line_num_width$}| {:<col_spaces$}^\n\
             {}: {}",
            self.src.file,
            pos.line,
            pos.column,
            "",
            pos.line,
            self.line(idx),
            "",
            "",
            kind,
            msg
        )
    }

    pub fn error(&self, offset: u32, msg: &str) -> anyhow::Error {
        anyhow!(self.message(offset, "error", msg))
    }
}

#[derive(Clone)]
pub struct Span {
    pub source: Source,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn text(&self) -> &str {
        &self.source.contents()[self.start as usize..self.end as usize]
    }

    pub fn start_pos(&self) -> Pos {
        self.source.pos(self.start)
    }

    pub fn end_pos(&self) -> Pos {
        self.source.pos(self.end)
    }

    pub fn range(&self) -> Range {
        Range::new(self.source.file().clone(), self.start_pos(), self.end_pos())
    }

    /// Span from the start of `self` to the end of `other`.
    pub fn to(&self, other: &Span) -> Span {
        Span {
            source: self.source.clone(),
            start: self.start,
            end: other.end,
        }
    }

    pub fn message(&self, kind: &str, msg: &str) -> String {
        self.source.message(self.start, kind, msg)
    }

    pub fn error(&self, msg: &str) -> anyhow::Error {
        self.source.error(self.start, msg)
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        let t = self.text().escape_debug().to_string();
        let max = 32;
        let (txt, trailer) = if t.len() > max {
            (&t[0..max], "...")
        } else {
            (t.as_str(), "")
        };
        let pos = self.start_pos();

        f.write_fmt(format_args!(
            "{}:{}:{}:{}, \"{}{}\"",
            pos.line, pos.column, self.start, self.end, txt, trailer
        ))
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum TokenKind {
    Symbol,
    Number,
    Ident,
    Newline,
    // Opening quote of a template. The parser reads the template itself.
    OQuote,
    Heredoc {
        body_start: u32,
        body_end: u32,
        flush: bool,
    },
    // Tokens produced while scanning the inside of a template.
    TemplateLiteral(String),
    TemplateInterp,
    TemplateControl,
    CQuote,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token(pub TokenKind, pub Span);

#[derive(Clone)]
pub struct Lexer<'source> {
    source: Source,
    iter: Peekable<CharIndices<'source>>,
    end: usize,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source Source) -> Self {
        Self {
            source: source.clone(),
            iter: source.contents().char_indices().peekable(),
            end: source.contents().len(),
        }
    }

    /// Lexer over `start..end` of the source. Offsets stay absolute.
    pub fn new_bounded(source: &'source Source, start: usize, end: usize) -> Self {
        let mut iter = source.contents()[..end].char_indices().peekable();
        while matches!(iter.peek(), Some((idx, _)) if *idx < start) {
            iter.next();
        }
        Self {
            source: source.clone(),
            iter,
            end,
        }
    }

    fn peek(&mut self) -> (usize, char) {
        match self.iter.peek() {
            Some((index, chr)) => (*index, *chr),
            _ => (self.end, '\x00'),
        }
    }

    fn peekahead(&mut self, n: usize) -> (usize, char) {
        match self.iter.clone().nth(n) {
            Some((index, chr)) => (index, chr),
            _ => (self.end, '\x00'),
        }
    }

    fn span(&self, start: usize, end: usize) -> Span {
        Span {
            source: self.source.clone(),
            start: start as u32,
            end: end as u32,
        }
    }

    fn read_ident(&mut self) -> Result<Token> {
        let start = self.peek().0;
        loop {
            let ch = self.peek().1;
            if ch.is_alphanumeric() || ch == '_' || ch == '-' {
                self.iter.next();
            } else {
                break;
            }
        }
        let end = self.peek().0;
        Ok(Token(TokenKind::Ident, self.span(start, end)))
    }

    fn read_digits(&mut self) {
        while self.peek().1.is_ascii_digit() {
            self.iter.next();
        }
    }

    fn read_number(&mut self) -> Result<Token> {
        let start = self.peek().0;
        self.read_digits();

        // . must be followed by at least 1 digit.
        if self.peek().1 == '.' && self.peekahead(1).1.is_ascii_digit() {
            self.iter.next();
            self.read_digits();
        }

        let ch = self.peek().1;
        if ch == 'e' || ch == 'E' {
            self.iter.next();
            if matches!(self.peek().1, '+' | '-') {
                self.iter.next();
            }
            if !self.peek().1.is_ascii_digit() {
                let offset = self.peek().0 as u32;
                return Err(self
                    .source
                    .error(offset, "invalid number, exponent requires digits"));
            }
            self.read_digits();
        }

        let end = self.peek().0;
        let ch = self.peek().1;
        if ch == '_' || ch.is_ascii_alphabetic() {
            return Err(self.source.error(end as u32, "invalid number"));
        }

        Ok(Token(TokenKind::Number, self.span(start, end)))
    }

    // <<EOF or <<-EOF followed by a newline, the body, and a line holding only EOF.
    fn read_heredoc(&mut self) -> Result<Token> {
        let start = self.peek().0;
        self.iter.next();
        self.iter.next();
        let flush = self.peek().1 == '-';
        if flush {
            self.iter.next();
        }

        let marker_start = self.peek().0;
        while self.peek().1.is_alphanumeric() || self.peek().1 == '_' {
            self.iter.next();
        }
        let marker_end = self.peek().0;
        if marker_start == marker_end {
            return Err(self
                .source
                .error(start as u32, "heredoc marker must be followed by an identifier"));
        }
        let marker = self.source.contents()[marker_start..marker_end].to_string();

        if self.peek().1 == '\r' {
            self.iter.next();
        }
        if self.peek().1 != '\n' {
            return Err(self
                .source
                .error(marker_end as u32, "heredoc marker must be followed by a newline"));
        }
        self.iter.next();

        let body_start = self.peek().0;
        loop {
            let line_start = self.peek().0;
            if self.peek().1 == '\x00' {
                return Err(self
                    .source
                    .error(start as u32, &format!("unterminated heredoc, expecting `{marker}`")));
            }
            while !matches!(self.peek().1, '\n' | '\x00') {
                self.iter.next();
            }
            let line_end = self.peek().0;
            let line = self.source.contents()[line_start..line_end].trim_end_matches('\r');
            if line.trim() == marker {
                let end = line_end;
                return Ok(Token(
                    TokenKind::Heredoc {
                        body_start: body_start as u32,
                        body_end: line_start as u32,
                        flush,
                    },
                    self.span(start, end),
                ));
            }
            if self.peek().1 == '\n' {
                self.iter.next();
            }
        }
    }

    fn skip_ws(&mut self) -> Result<()> {
        'outer: loop {
            match self.peek().1 {
                ' ' | '\t' => (),
                '\r' => {
                    if self.peekahead(1).1 != '\n' {
                        let offset = self.peek().0 as u32;
                        return Err(self.source.error(offset, "\\r must be followed by \\n"));
                    }
                }
                '#' => {
                    self.skip_line_comment();
                    continue 'outer;
                }
                '/' if self.peekahead(1).1 == '/' => {
                    self.skip_line_comment();
                    continue 'outer;
                }
                '/' if self.peekahead(1).1 == '*' => {
                    let start = self.peek().0;
                    self.iter.next();
                    self.iter.next();
                    loop {
                        match self.peek().1 {
                            '*' if self.peekahead(1).1 == '/' => {
                                self.iter.next();
                                break;
                            }
                            '\x00' => {
                                return Err(self.source.error(start as u32, "unterminated comment"))
                            }
                            _ => (),
                        }
                        self.iter.next();
                    }
                }
                // A strip marker before a closing brace is read back by the parser.
                '~' if self.peekahead(1).1 == '}' => (),
                _ => break,
            }
            self.iter.next();
        }
        Ok(())
    }

    // The terminating newline is left for the next token.
    fn skip_line_comment(&mut self) {
        while !matches!(self.peek().1, '\n' | '\x00') {
            self.iter.next();
        }
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_ws()?;

        let (start, chr) = self.peek();

        match chr {
            '\n' => {
                self.iter.next();
                Ok(Token(TokenKind::Newline, self.span(start, start + 1)))
            }
            '"' => {
                self.iter.next();
                Ok(Token(TokenKind::OQuote, self.span(start, start + 1)))
            }
            '<' if self.peekahead(1).1 == '<' => self.read_heredoc(),
            '.' if self.peekahead(1).1 == '.' && self.peekahead(2).1 == '.' => {
                self.iter.next();
                self.iter.next();
                self.iter.next();
                Ok(Token(TokenKind::Symbol, self.span(start, start + 3)))
            }
            '=' | '!' | '<' | '>' if self.peekahead(1).1 == '=' => {
                self.iter.next();
                self.iter.next();
                Ok(Token(TokenKind::Symbol, self.span(start, start + 2)))
            }
            '=' if self.peekahead(1).1 == '>' => {
                self.iter.next();
                self.iter.next();
                Ok(Token(TokenKind::Symbol, self.span(start, start + 2)))
            }
            '&' | '|' if self.peekahead(1).1 == chr => {
                self.iter.next();
                self.iter.next();
                Ok(Token(TokenKind::Symbol, self.span(start, start + 2)))
            }
            // grouping characters
            '{' | '}' | '[' | ']' | '(' | ')' |
            // arith operator
            '+' | '-' | '*' | '/' | '%' |
            // comparison and logic
            '<' | '>' | '!' | '=' |
            // separators
            ',' | '.' | ':' | '?' => {
                self.iter.next();
                Ok(Token(TokenKind::Symbol, self.span(start, start + 1)))
            }
            '\x00' => Ok(Token(TokenKind::Eof, self.span(start, start))),
            _ if chr.is_ascii_digit() => self.read_number(),
            _ if chr.is_alphabetic() || chr == '_' => self.read_ident(),
            _ => Err(self.source.error(start as u32, "invalid character")),
        }
    }

    /// Reads the next piece of a template.
    ///
    /// Quoted templates end at `"` and support escapes; heredoc templates end
    /// at the end of the lexer's bounds and are taken literally.
    pub fn next_template_token(&mut self, heredoc: bool) -> Result<Token> {
        let start = self.peek().0;
        let mut literal = String::new();
        loop {
            let (offset, ch) = self.peek();
            match ch {
                '"' if !heredoc => {
                    if !literal.is_empty() {
                        break;
                    }
                    self.iter.next();
                    return Ok(Token(TokenKind::CQuote, self.span(offset, offset + 1)));
                }
                '\x00' if heredoc && offset >= self.end => {
                    if !literal.is_empty() {
                        break;
                    }
                    return Ok(Token(TokenKind::Eof, self.span(offset, offset)));
                }
                '\x00' if offset >= self.end => {
                    return Err(self.source.error(start as u32, "unterminated template string"));
                }
                '\n' if !heredoc => {
                    return Err(self
                        .source
                        .error(offset as u32, "quoted template strings cannot span lines"));
                }
                '$' | '%' if self.peekahead(1).1 == ch && self.peekahead(2).1 == '{' => {
                    // $${ and %%{ escape the template sequences.
                    self.iter.next();
                    self.iter.next();
                    self.iter.next();
                    literal.push(ch);
                    literal.push('{');
                }
                '$' | '%' if self.peekahead(1).1 == '{' => {
                    if !literal.is_empty() {
                        break;
                    }
                    self.iter.next();
                    self.iter.next();
                    // A strip marker is part of the token.
                    let mut end = offset + 2;
                    if self.peek().1 == '~' {
                        self.iter.next();
                        end += 1;
                    }
                    let kind = match ch {
                        '$' => TokenKind::TemplateInterp,
                        _ => TokenKind::TemplateControl,
                    };
                    return Ok(Token(kind, self.span(offset, end)));
                }
                '\\' if !heredoc => {
                    self.iter.next();
                    let (_, esc) = self.peek();
                    self.iter.next();
                    match esc {
                        'n' => literal.push('\n'),
                        'r' => literal.push('\r'),
                        't' => literal.push('\t'),
                        '"' => literal.push('"'),
                        '\\' => literal.push('\\'),
                        'u' | 'U' => {
                            let n = if esc == 'u' { 4 } else { 8 };
                            let mut code = 0u32;
                            for _ in 0..n {
                                let (_, h) = self.peek();
                                match h.to_digit(16) {
                                    Some(d) => code = code * 16 + d,
                                    None => {
                                        return Err(self
                                            .source
                                            .error(offset as u32, "invalid unicode escape sequence"))
                                    }
                                }
                                self.iter.next();
                            }
                            match char::from_u32(code) {
                                Some(c) => literal.push(c),
                                None => {
                                    return Err(self
                                        .source
                                        .error(offset as u32, "invalid unicode escape sequence"))
                                }
                            }
                        }
                        _ => return Err(self.source.error(offset as u32, "invalid escape sequence")),
                    }
                }
                _ => {
                    self.iter.next();
                    literal.push(ch);
                }
            }
        }
        let end = self.peek().0;
        Ok(Token(TokenKind::TemplateLiteral(literal), self.span(start, end)))
    }
}
