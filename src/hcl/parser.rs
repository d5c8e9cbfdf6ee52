// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::hcl::ast::*;
use crate::hcl::lexer::*;
use crate::hcl::value::{Number, Value};

use anyhow::{bail, Result};

const BINARY_LEVELS: &[&[(&str, BinaryOp)]] = &[
    &[("||", BinaryOp::Or)],
    &[("&&", BinaryOp::And)],
    &[("==", BinaryOp::Eq), ("!=", BinaryOp::Ne)],
    &[
        ("<", BinaryOp::Lt),
        ("<=", BinaryOp::Le),
        (">", BinaryOp::Gt),
        (">=", BinaryOp::Ge),
    ],
    &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
    &[("*", BinaryOp::Mul), ("/", BinaryOp::Div), ("%", BinaryOp::Mod)],
];

pub struct Parser<'source> {
    source: &'source Source,
    lexer: Lexer<'source>,
    tok: Token,
    end: u32,
    // Whether newlines are insignificant, per open bracket.
    nl_ignore: Vec<bool>,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source Source) -> Result<Self> {
        let mut lexer = Lexer::new(source);
        let tok = lexer.next_token()?;
        Ok(Self {
            source,
            lexer,
            tok,
            end: 0,
            nl_ignore: vec![],
        })
    }

    pub fn token_text(&self) -> &str {
        match self.tok.0 {
            TokenKind::Symbol | TokenKind::Number | TokenKind::Ident => self.tok.1.text(),
            _ => "",
        }
    }

    fn ignoring_newlines(&self) -> bool {
        self.nl_ignore.last().copied().unwrap_or(false)
    }

    fn advance(&mut self) -> Result<()> {
        self.tok = self.lexer.next_token()?;
        while self.tok.0 == TokenKind::Newline && self.ignoring_newlines() {
            self.tok = self.lexer.next_token()?;
        }
        Ok(())
    }

    pub fn next_token(&mut self) -> Result<()> {
        self.end = self.tok.1.end;
        self.advance()
    }

    fn skip_newlines(&mut self) -> Result<()> {
        while self.tok.0 == TokenKind::Newline {
            self.next_token()?;
        }
        Ok(())
    }

    fn expect(&mut self, text: &str, context: &str) -> Result<()> {
        if self.token_text() == text {
            self.next_token()
        } else {
            let msg = format!("expecting `{text}` {context}");
            Err(self.tok.1.error(&msg))
        }
    }

    fn span_from(&self, start: u32) -> Span {
        Span {
            source: self.source.clone(),
            start,
            end: self.end,
        }
    }

    // Whether the current token is the `for` keyword of a for expression.
    fn at_for_keyword(&self) -> Result<bool> {
        if self.tok.0 != TokenKind::Ident || self.tok.1.text() != "for" {
            return Ok(false);
        }
        let mut lexer = self.lexer.clone();
        let mut next = lexer.next_token()?;
        while next.0 == TokenKind::Newline {
            next = lexer.next_token()?;
        }
        Ok(next.0 == TokenKind::Ident)
    }

    fn parse_ident(&mut self) -> Result<(String, Span)> {
        if self.tok.0 != TokenKind::Ident {
            bail!(self.tok.1.error("expecting identifier"));
        }
        let span = self.tok.1.clone();
        self.next_token()?;
        Ok((span.text().to_string(), span))
    }

    fn read_number(span: &Span) -> Result<Value> {
        match Number::parse(span.text()) {
            Some(n) => Ok(Value::Number(n)),
            None => bail!(span.error("invalid number")),
        }
    }

    fn parse_template_parts(&mut self, heredoc: bool) -> Result<Vec<TemplatePart>> {
        let mut strip = false;
        let (parts, closing) = self.parse_template_seq(heredoc, &mut strip)?;
        if let Some((keyword, span)) = closing {
            bail!(span.error(&format!("unexpected `{keyword}` directive")));
        }
        Ok(parts)
    }

    // Reads template parts up to the end of the template or up to an `else`,
    // `endif` or `endfor` directive, which is returned. `strip` is set when
    // the previous sequence was closed with `~}`.
    fn parse_template_seq(
        &mut self,
        heredoc: bool,
        strip: &mut bool,
    ) -> Result<(Vec<TemplatePart>, Option<(String, Span)>)> {
        let mut parts = vec![];
        loop {
            let tok = self.lexer.next_template_token(heredoc)?;
            match tok.0 {
                TokenKind::TemplateLiteral(s) => {
                    let s = match core::mem::take(strip) {
                        true => s.trim_start().to_string(),
                        false => s,
                    };
                    if !s.is_empty() {
                        parts.push(TemplatePart::Literal(s));
                    }
                }
                TokenKind::TemplateInterp => {
                    strip_trailing(&mut parts, &tok.1);
                    let expr = self.parse_interpolation()?;
                    *strip = self.closes_with_strip();
                    parts.push(TemplatePart::Interp(Ref::new(expr)));
                }
                TokenKind::TemplateControl => {
                    strip_trailing(&mut parts, &tok.1);
                    match self.parse_directive(heredoc, strip, &tok.1)? {
                        Directive::Part(part) => parts.push(part),
                        Directive::Closing(keyword, span) => {
                            return Ok((parts, Some((keyword, span))))
                        }
                    }
                }
                TokenKind::CQuote | TokenKind::Eof => {
                    self.end = tok.1.end;
                    return Ok((parts, None));
                }
                _ => bail!(tok.1.error("unexpected token in template")),
            }
        }
    }

    // Parses `%{ ... }` and, for `if` and `for`, the parts up to the
    // matching end directive.
    fn parse_directive(&mut self, heredoc: bool, strip: &mut bool, open: &Span) -> Result<Directive> {
        self.nl_ignore.push(true);
        self.next_token()?;
        let (keyword, keyword_span) = self.parse_ident()?;

        let part = match keyword.as_str() {
            "if" => {
                let condition = self.parse_expr()?;
                self.close_directive(strip)?;
                let (then, closing) = self.parse_template_seq(heredoc, strip)?;
                let otherwise = match closing {
                    Some((k, _)) if k == "endif" => vec![],
                    Some((k, _)) if k == "else" => {
                        let (otherwise, closing) = self.parse_template_seq(heredoc, strip)?;
                        match closing {
                            Some((k, _)) if k == "endif" => otherwise,
                            other => bail!(unclosed(open, "if", other)),
                        }
                    }
                    other => bail!(unclosed(open, "if", other)),
                };
                TemplatePart::If {
                    condition: Ref::new(condition),
                    then,
                    otherwise,
                }
            }
            "for" => {
                let (first, _) = self.parse_ident()?;
                let (key_var, value_var) = if self.token_text() == "," {
                    self.next_token()?;
                    let (second, _) = self.parse_ident()?;
                    (Some(first), second)
                } else {
                    (None, first)
                };
                self.expect("in", "in for directive")?;
                let collection = self.parse_expr()?;
                self.close_directive(strip)?;
                let (body, closing) = self.parse_template_seq(heredoc, strip)?;
                match closing {
                    Some((k, _)) if k == "endfor" => (),
                    other => bail!(unclosed(open, "for", other)),
                }
                TemplatePart::For {
                    key_var,
                    value_var,
                    collection: Ref::new(collection),
                    body,
                }
            }
            "else" | "endif" | "endfor" => {
                self.close_directive(strip)?;
                return Ok(Directive::Closing(keyword, keyword_span));
            }
            _ => bail!(keyword_span.error(&format!("invalid template directive `{keyword}`"))),
        };
        Ok(Directive::Part(part))
    }

    // The current token must be the `}` closing a directive. The lexer is
    // left just after it.
    fn close_directive(&mut self, strip: &mut bool) -> Result<()> {
        self.nl_ignore.pop();
        if self.token_text() != "}" {
            bail!(self.tok.1.error("expecting `}` to close template directive"));
        }
        *strip = self.closes_with_strip();
        Ok(())
    }

    // Whether the current `}` is preceded by a strip marker.
    fn closes_with_strip(&self) -> bool {
        let start = self.tok.1.start as usize;
        start > 0 && self.source.contents().as_bytes().get(start - 1) == Some(&b'~')
    }

    // Parses the expression of `${ ... }`. The lexer is left just after the
    // closing brace so that template scanning can resume.
    fn parse_interpolation(&mut self) -> Result<Expr> {
        self.nl_ignore.push(true);
        self.next_token()?;
        let expr = self.parse_expr()?;
        self.nl_ignore.pop();
        if self.token_text() != "}" {
            bail!(self
                .tok
                .1
                .error("expecting `}` to close template interpolation"));
        }
        Ok(expr)
    }

    fn parse_quoted_template(&mut self) -> Result<Expr> {
        let start = self.tok.1.start;
        let parts = self.parse_template_parts(false)?;
        let span = self.span_from(start);
        self.advance()?;
        Ok(Expr::Template { span, parts })
    }

    fn parse_heredoc(&mut self, body_start: u32, body_end: u32, flush: bool) -> Result<Expr> {
        let span = self.tok.1.clone();
        let mut sub = Parser {
            source: self.source,
            lexer: Lexer::new_bounded(self.source, body_start as usize, body_end as usize),
            tok: Token(TokenKind::Eof, span.clone()),
            end: body_start,
            nl_ignore: vec![],
        };
        let mut parts = sub.parse_template_parts(true)?;
        if flush {
            let body = &self.source.contents()[body_start as usize..body_end as usize];
            dedent_parts(&mut parts, min_indent(body), &mut true);
        }
        self.next_token()?;
        Ok(Expr::Template { span, parts })
    }

    fn parse_tuple_or_for(&mut self) -> Result<Expr> {
        let start = self.tok.1.start;
        self.nl_ignore.push(true);
        self.next_token()?;
        if self.at_for_keyword()? {
            return self.parse_for(start, "]");
        }

        let mut items = vec![];
        while self.token_text() != "]" {
            items.push(Ref::new(self.parse_expr()?));
            match self.token_text() {
                "," => self.next_token()?,
                "]" => break,
                _ => bail!(self.tok.1.error("expecting `,` or `]` in tuple")),
            }
        }
        self.nl_ignore.pop();
        self.expect("]", "to close tuple")?;
        Ok(Expr::Tuple {
            span: self.span_from(start),
            items,
        })
    }

    fn parse_object_or_for(&mut self) -> Result<Expr> {
        let start = self.tok.1.start;
        self.nl_ignore.push(false);
        self.next_token()?;
        self.skip_newlines()?;
        if self.at_for_keyword()? {
            if let Some(top) = self.nl_ignore.last_mut() {
                *top = true;
            }
            return self.parse_for(start, "}");
        }

        let mut items = vec![];
        loop {
            self.skip_newlines()?;
            if self.token_text() == "}" {
                break;
            }
            let key = self.parse_expr()?;
            match self.token_text() {
                "=" | ":" => self.next_token()?,
                _ => bail!(self.tok.1.error("expecting `=` or `:` after object key")),
            }
            let value = self.parse_expr()?;
            items.push(ObjectItem {
                key: Ref::new(key),
                value: Ref::new(value),
            });
            match (&self.tok.0, self.token_text()) {
                (_, ",") => self.next_token()?,
                (TokenKind::Newline, _) => self.next_token()?,
                (_, "}") => (),
                _ => bail!(self
                    .tok
                    .1
                    .error("expecting `,` or newline between object items")),
            }
        }
        self.nl_ignore.pop();
        self.expect("}", "to close object")?;
        Ok(Expr::Object {
            span: self.span_from(start),
            items,
        })
    }

    // The opening bracket is consumed and its newline mode pushed.
    fn parse_for(&mut self, start: u32, close: &str) -> Result<Expr> {
        self.next_token()?;
        let (first, _) = self.parse_ident()?;
        let (key_var, value_var) = if self.token_text() == "," {
            self.next_token()?;
            let (second, _) = self.parse_ident()?;
            (Some(first), second)
        } else {
            (None, first)
        };
        self.expect("in", "in for expression")?;
        let collection = self.parse_expr()?;
        self.expect(":", "after for expression collection")?;

        let (key, value, group) = if close == "}" {
            let key = self.parse_expr()?;
            self.expect("=>", "in object for expression")?;
            let value = self.parse_expr()?;
            let group = self.token_text() == "...";
            if group {
                self.next_token()?;
            }
            (Some(Ref::new(key)), value, group)
        } else {
            (None, self.parse_expr()?, false)
        };

        let condition = if self.token_text() == "if" {
            self.next_token()?;
            Some(Ref::new(self.parse_expr()?))
        } else {
            None
        };

        self.nl_ignore.pop();
        self.expect(close, "to close for expression")?;
        Ok(Expr::For {
            span: self.span_from(start),
            key_var,
            value_var,
            collection: Ref::new(collection),
            key,
            value: Ref::new(value),
            condition,
            group,
        })
    }

    fn parse_call(&mut self, name: String, name_span: Span) -> Result<Expr> {
        let open = self.tok.1.start;
        self.nl_ignore.push(true);
        self.next_token()?;

        let mut args = vec![];
        let mut expand_final = false;
        while self.token_text() != ")" {
            args.push(Ref::new(self.parse_expr()?));
            if self.token_text() == "..." {
                expand_final = true;
                self.next_token()?;
                if self.token_text() != ")" {
                    bail!(self
                        .tok
                        .1
                        .error("expanding argument must be the last argument"));
                }
            }
            match self.token_text() {
                "," => self.next_token()?,
                ")" => break,
                _ => bail!(self.tok.1.error("expecting `,` or `)` in function call")),
            }
        }
        self.nl_ignore.pop();
        self.expect(")", "to close function call")?;
        let args_span = self.span_from(open);
        Ok(Expr::Call {
            span: self.span_from(name_span.start),
            name,
            name_span,
            args,
            expand_final,
            args_span,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let span = self.tok.1.clone();
        match self.tok.0.clone() {
            TokenKind::Number => {
                let value = Self::read_number(&span)?;
                self.next_token()?;
                Ok(Expr::Literal { span, value })
            }
            TokenKind::Ident => {
                self.next_token()?;
                let name = span.text().to_string();
                if self.token_text() == "(" {
                    return self.parse_call(name, span);
                }
                let value = match name.as_str() {
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    "null" => Value::Null,
                    _ => return Ok(Expr::Variable { span, name }),
                };
                Ok(Expr::Literal { span, value })
            }
            TokenKind::OQuote => self.parse_quoted_template(),
            TokenKind::Heredoc {
                body_start,
                body_end,
                flush,
            } => self.parse_heredoc(body_start, body_end, flush),
            TokenKind::Symbol => match span.text() {
                "(" => {
                    self.nl_ignore.push(true);
                    self.next_token()?;
                    let inner = self.parse_expr()?;
                    self.nl_ignore.pop();
                    self.expect(")", "to close parenthesized expression")?;
                    Ok(Expr::Parens {
                        span: self.span_from(span.start),
                        inner: Ref::new(inner),
                    })
                }
                "[" => self.parse_tuple_or_for(),
                "{" => self.parse_object_or_for(),
                _ => bail!(span.error("expecting expression")),
            },
            _ => bail!(span.error("expecting expression")),
        }
    }

    fn parse_splat_steps(&mut self, attrs_only: bool) -> Result<Vec<SplatStep>> {
        let mut steps = vec![];
        loop {
            match self.token_text() {
                "." => {
                    self.next_token()?;
                    let (name, _) = self.parse_ident()?;
                    steps.push(SplatStep::Attr(name));
                }
                "[" if !attrs_only => {
                    self.nl_ignore.push(true);
                    self.next_token()?;
                    let key = self.parse_expr()?;
                    self.nl_ignore.pop();
                    self.expect("]", "to close index")?;
                    steps.push(SplatStep::Index(Ref::new(key)));
                }
                _ => return Ok(steps),
            }
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let start = self.tok.1.start;
        let mut expr = self.parse_primary()?;
        loop {
            if self.tok.0 != TokenKind::Symbol {
                return Ok(expr);
            }
            match self.token_text() {
                "." => {
                    self.next_token()?;
                    match self.tok.0 {
                        TokenKind::Ident => {
                            let (name, _) = self.parse_ident()?;
                            expr = Expr::GetAttr {
                                span: self.span_from(start),
                                target: Ref::new(expr),
                                name,
                            };
                        }
                        // Legacy index syntax, e.g. `foo.0`.
                        TokenKind::Number => {
                            let span = self.tok.1.clone();
                            let value = Self::read_number(&span)?;
                            self.next_token()?;
                            expr = Expr::Index {
                                span: self.span_from(start),
                                target: Ref::new(expr),
                                key: Ref::new(Expr::Literal { span, value }),
                            };
                        }
                        _ if self.token_text() == "*" => {
                            self.next_token()?;
                            let steps = self.parse_splat_steps(true)?;
                            expr = Expr::Splat {
                                span: self.span_from(start),
                                source: Ref::new(expr),
                                steps,
                            };
                        }
                        _ => bail!(self.tok.1.error("expecting attribute name")),
                    }
                }
                "[" => {
                    self.nl_ignore.push(true);
                    self.next_token()?;
                    if self.token_text() == "*" {
                        self.next_token()?;
                        self.nl_ignore.pop();
                        self.expect("]", "to close splat")?;
                        let steps = self.parse_splat_steps(false)?;
                        expr = Expr::Splat {
                            span: self.span_from(start),
                            source: Ref::new(expr),
                            steps,
                        };
                    } else {
                        let key = self.parse_expr()?;
                        self.nl_ignore.pop();
                        self.expect("]", "to close index")?;
                        expr = Expr::Index {
                            span: self.span_from(start),
                            target: Ref::new(expr),
                            key: Ref::new(key),
                        };
                    }
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match (&self.tok.0, self.token_text()) {
            (TokenKind::Symbol, "-") => UnaryOp::Neg,
            (TokenKind::Symbol, "!") => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        let start = self.tok.1.start;
        self.next_token()?;
        let operand = self.parse_unary()?;
        let span = self.span_from(start);
        if let (UnaryOp::Neg, Expr::Literal { value: Value::Number(n), .. }) = (op, &operand) {
            return Ok(Expr::Literal {
                span,
                value: Value::Number(-*n),
            });
        }
        Ok(Expr::Unary {
            span,
            op,
            operand: Ref::new(operand),
        })
    }

    fn parse_binary(&mut self, level: usize) -> Result<Expr> {
        if level >= BINARY_LEVELS.len() {
            return self.parse_unary();
        }
        let start = self.tok.1.start;
        let mut expr = self.parse_binary(level + 1)?;
        loop {
            if self.tok.0 != TokenKind::Symbol {
                return Ok(expr);
            }
            let text = self.token_text();
            let Some((_, op)) = BINARY_LEVELS[level].iter().find(|(t, _)| *t == text) else {
                return Ok(expr);
            };
            let op = *op;
            self.next_token()?;
            let rhs = self.parse_binary(level + 1)?;
            expr = Expr::Binary {
                span: self.span_from(start),
                op,
                lhs: Ref::new(expr),
                rhs: Ref::new(rhs),
            };
        }
    }

    pub fn parse_expr(&mut self) -> Result<Expr> {
        let start = self.tok.1.start;
        let condition = self.parse_binary(0)?;
        if self.token_text() != "?" {
            return Ok(condition);
        }
        self.next_token()?;
        let then = self.parse_expr()?;
        self.expect(":", "in conditional expression")?;
        let otherwise = self.parse_expr()?;
        Ok(Expr::Conditional {
            span: self.span_from(start),
            condition: Ref::new(condition),
            then: Ref::new(then),
            otherwise: Ref::new(otherwise),
        })
    }

    fn parse_label(&mut self) -> Result<Label> {
        let span = self.tok.1.clone();
        if self.tok.0 == TokenKind::Ident {
            self.next_token()?;
            return Ok(Label {
                value: span.text().to_string(),
                span,
            });
        }
        let Expr::Template { span, parts } = self.parse_quoted_template()? else {
            bail!(span.error("invalid block label"));
        };
        let mut value = String::new();
        for part in parts {
            match part {
                TemplatePart::Literal(s) => value.push_str(&s),
                TemplatePart::Interp(_) | TemplatePart::If { .. } | TemplatePart::For { .. } => bail!(span.error(
                    "Invalid block label; Template sequences are not allowed in block labels."
                )),
            }
        }
        Ok(Label { value, span })
    }

    pub fn parse_body(&mut self, nested: bool) -> Result<Body> {
        let mut body = Body::default();
        loop {
            self.skip_newlines()?;
            match self.tok.0 {
                TokenKind::Eof if nested => bail!(self.tok.1.error("expecting `}` to close block")),
                TokenKind::Eof => return Ok(body),
                _ if nested && self.token_text() == "}" => return Ok(body),
                TokenKind::Ident => (),
                _ => bail!(self.tok.1.error("Argument or block definition required")),
            }

            let (name, name_span) = self.parse_ident()?;
            if self.token_text() == "=" {
                self.next_token()?;
                let expr = self.parse_expr()?;
                body.attributes.push(Attribute {
                    name,
                    span: self.span_from(name_span.start),
                    name_span,
                    expr: Ref::new(expr),
                });
            } else {
                let mut labels = vec![];
                while matches!(self.tok.0, TokenKind::OQuote | TokenKind::Ident) {
                    labels.push(self.parse_label()?);
                }
                self.expect("{", "to open block")?;
                let inner = self.parse_body(true)?;
                self.expect("}", "to close block")?;
                body.blocks.push(Block {
                    kind: name,
                    span: self.span_from(name_span.start),
                    kind_span: name_span,
                    labels,
                    body: inner,
                });
            }

            match self.tok.0 {
                TokenKind::Newline | TokenKind::Eof => (),
                _ if nested && self.token_text() == "}" => (),
                _ => bail!(self
                    .tok
                    .1
                    .error("expecting newline after argument or block definition")),
            }
        }
    }

    /// Parses a standalone expression that spans the whole source.
    pub fn parse_standalone_expr(&mut self) -> Result<Expr> {
        self.skip_newlines()?;
        let expr = self.parse_expr()?;
        self.skip_newlines()?;
        if self.tok.0 != TokenKind::Eof {
            bail!(self.tok.1.error("extra characters after expression"));
        }
        Ok(expr)
    }
}

enum Directive {
    Part(TemplatePart),
    Closing(String, Span),
}

fn unclosed(open: &Span, keyword: &str, closing: Option<(String, Span)>) -> anyhow::Error {
    match closing {
        Some((k, span)) => span.error(&format!("unexpected `{k}` directive in `{keyword}`")),
        None => open.error(&format!("unterminated `{keyword}` directive")),
    }
}

// A sequence opened with `${~` or `%{~` strips the whitespace before it.
fn strip_trailing(parts: &mut Vec<TemplatePart>, open: &Span) {
    if !open.text().ends_with('~') {
        return;
    }
    let empty = match parts.last_mut() {
        Some(TemplatePart::Literal(s)) => {
            s.truncate(s.trim_end().len());
            s.is_empty()
        }
        _ => false,
    };
    if empty {
        parts.pop();
    }
}

// Indentation common to all non-blank lines.
fn min_indent(s: &str) -> usize {
    s.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.chars().take_while(|c| *c == ' ' || *c == '\t').count())
        .min()
        .unwrap_or(0)
}

// Removes up to `indent` leading blanks from each line. The first line of a
// literal is only a line start if nothing precedes it on that line.
fn dedent_lines(s: &str, indent: usize, line_start: bool) -> String {
    s.split_inclusive('\n')
        .enumerate()
        .map(|(i, l)| {
            if i == 0 && !line_start {
                return l;
            }
            let skip = l
                .char_indices()
                .take(indent)
                .take_while(|(_, c)| *c == ' ' || *c == '\t')
                .last()
                .map(|(i, c)| i + c.len_utf8())
                .unwrap_or(0);
            &l[skip..]
        })
        .collect()
}

fn dedent_parts(parts: &mut [TemplatePart], indent: usize, line_start: &mut bool) {
    for part in parts {
        match part {
            TemplatePart::Literal(s) => {
                *s = dedent_lines(s, indent, *line_start);
                *line_start = s.ends_with('\n');
            }
            TemplatePart::Interp(_) => *line_start = false,
            TemplatePart::If { then, otherwise, .. } => {
                dedent_parts(then, indent, &mut false);
                dedent_parts(otherwise, indent, &mut false);
                *line_start = false;
            }
            TemplatePart::For { body, .. } => {
                dedent_parts(body, indent, &mut false);
                *line_start = false;
            }
        }
    }
}

/// Parses a configuration file. Files named `*.json` use the JSON syntax.
pub fn parse_file(name: &str, contents: &str) -> Result<File> {
    let source = Source::from_contents(name.to_string(), contents.to_string())?;
    let mut parser = Parser::new(&source)?;
    let body = if name.ends_with(".json") {
        let expr = parser.parse_standalone_expr()?;
        if !matches!(expr, Expr::Object { .. }) {
            bail!(expr
                .span()
                .map(|s| s.message("error", "the root value must be an object"))
                .unwrap_or_default());
        }
        FileBody::Json(Ref::new(expr))
    } else {
        FileBody::Native(parser.parse_body(false)?)
    };
    Ok(File {
        name: name.to_string(),
        source: source.clone(),
        body,
    })
}

/// Parses an expression whose text starts at `start` in `filename`.
pub fn parse_expression(src: &str, filename: &str, start: Pos) -> Result<Expr> {
    let source = Source::from_contents_at(filename.to_string(), src.to_string(), start)?;
    let mut parser = Parser::new(&source)?;
    parser.parse_standalone_expr()
}
