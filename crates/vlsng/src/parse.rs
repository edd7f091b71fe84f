//! Recursive-descent parser for the graph language.
//!
//! Statements are newline-terminated: declarations (`name: rhs`), group
//! declarations (`name: type~ args x N`), sub-graph definitions
//! (`type~: IN OUT { … }`), connections with inline-operator splicing,
//! series connections (statement-initial arrow), directives (`& name args`),
//! and procedure-call statements. Expressions are evaluated eagerly during
//! parsing and produce [`Value`]s.

use crate::{
    builtins::ProcedureKind,
    error::{Error, RunResult},
    lex::{Lexer, Token, TokenKind},
    program::{ConnectionKind, Program, SubgraphDef},
    value::{Number, Sequence, Value},
};

pub(crate) struct Parser<'p> {
    lexer: Lexer,
    current: Token,
    program: &'p mut Program,
}

impl<'p> Parser<'p> {
    pub fn new(source: &str, program: &'p mut Program) -> Self {
        Self {
            lexer: Lexer::new(source),
            current: Token {
                kind: TokenKind::Newline,
                value: String::new(),
                line: 1,
            },
            program,
        }
    }

    pub fn parse_program(&mut self) -> RunResult<()> {
        loop {
            self.next_token()?;
            let line = self.current.line;
            let result = match self.current.kind {
                TokenKind::Eof => return Ok(()),
                TokenKind::Newline => continue,
                TokenKind::Identifier => {
                    let name = self.current.value.clone();
                    self.next_token()?;
                    match self.current.kind {
                        TokenKind::Colon => self.parse_declaration(&name),
                        TokenKind::OpenBrace => self.parse_connection(&name),
                        TokenKind::OpenParen => {
                            let call = self.parse_call(&name);
                            call.and_then(|_| self.expect_line_end())
                        }
                        other => Err(Error::syntax(format!(
                            "Expected a declaration or connection after '{name}', got {other}"
                        ))),
                    }
                }
                TokenKind::Object => self.parse_subgraph_definition(),
                TokenKind::Ampersand => self.parse_directive(),
                TokenKind::Arrow => self.parse_series_connection(),
                other => Err(Error::syntax(format!("Expected a statement, got {other}"))),
            };
            result.map_err(|error| error.at_line(line))?;
        }
    }

    // --- statements ---

    fn parse_declaration(&mut self, name: &str) -> RunResult<()> {
        self.next_token()?;
        if self.current.kind == TokenKind::Object {
            return self.parse_object_declaration(name);
        }
        let value = self.parse_expression()?;
        self.expect_line_end()?;
        self.program.add_symbol(name, value)
    }

    fn parse_object_declaration(&mut self, name: &str) -> RunResult<()> {
        let type_name = self.current.value.clone();
        let mut args = Vec::new();
        self.next_token()?;
        loop {
            if self.line_end() {
                break;
            }
            if self.at_group_marker() {
                self.next_token()?;
                let count = self.integer_literal("Group count")?;
                self.expect_line_end()?;
                return self.program.create_group(name, &type_name, &args, count);
            }
            if !args.is_empty() {
                self.verify(TokenKind::Comma)?;
                self.next_token()?;
            }
            args.push(self.parse_expression()?);
            self.next_token()?;
        }
        self.program.create_object(name, &type_name, &args)
    }

    /// The literal identifier `x` followed by a numeric literal separates a
    /// constructor argument list from a group member count.
    fn at_group_marker(&mut self) -> bool {
        self.current.kind == TokenKind::Identifier
            && self.current.value == "x"
            && self.lexer.peek(TokenKind::NumericLiteral)
    }

    fn parse_subgraph_definition(&mut self) -> RunResult<()> {
        let type_name = self.current.value.clone();
        self.expect(TokenKind::Colon)?;
        self.expect(TokenKind::NumericLiteral)?;
        let inputs = self.integer_literal("Sub-graph input arity")?;
        self.expect(TokenKind::NumericLiteral)?;
        let outputs = self.integer_literal("Sub-graph output arity")?;
        self.expect(TokenKind::OpenBrace)?;
        let source = self.lexer.capture_block()?;
        self.program.add_subgraph(
            &type_name,
            SubgraphDef {
                source,
                inputs,
                outputs,
            },
        )?;
        self.expect_line_end()
    }

    fn parse_directive(&mut self) -> RunResult<()> {
        self.expect(TokenKind::Identifier)?;
        let name = self.current.value.clone();
        let mut arguments = Vec::new();
        self.next_token()?;
        while !self.line_end() {
            arguments.push(self.current.value.clone());
            self.next_token()?;
        }
        self.program.invoke_directive(&name, &arguments)
    }

    // --- connections ---

    fn parse_connection(&mut self, name: &str) -> RunResult<()> {
        let mut source = name.to_owned();
        let mut source_port = self.parse_port_index()?;
        loop {
            self.next_token()?;
            let cross = match self.current.kind {
                TokenKind::Arrow => false,
                TokenKind::CrossArrow => true,
                other => {
                    return Err(Error::syntax(format!("Expected an arrow in connection, got {other}")));
                }
            };
            self.next_token()?;
            match self.current.kind {
                TokenKind::Plus | TokenKind::Minus | TokenKind::Asterisk | TokenKind::Slash => {
                    let type_name = match self.current.kind {
                        TokenKind::Plus => "add",
                        TokenKind::Minus => "sub",
                        TokenKind::Asterisk => "mult",
                        _ => "div",
                    };
                    self.next_token()?;
                    let argument = self.parse_expression()?;
                    let inline_name = self.program.next_inline_name();
                    self.program.create_object(&inline_name, type_name, &[argument])?;
                    self.connect(&source, source_port, &inline_name, 0, cross)?;
                    source = inline_name;
                    source_port = 0;
                }
                TokenKind::Identifier => {
                    let dest = self.current.value.clone();
                    self.next_token()?;
                    self.verify(TokenKind::OpenBrace)?;
                    let dest_port = self.parse_port_index()?;
                    self.connect(&source, source_port, &dest, dest_port, cross)?;
                    return self.expect_line_end();
                }
                other => {
                    return Err(Error::syntax(format!(
                        "Expected an object name or an inline operator after the arrow, got {other}"
                    )));
                }
            }
        }
    }

    /// A statement-initial arrow chains a group in series:
    /// `-> grp{j}` connects `grp[i].out0 → grp[i+1].in_j`.
    fn parse_series_connection(&mut self) -> RunResult<()> {
        self.expect(TokenKind::Identifier)?;
        let name = self.current.value.clone();
        self.next_token()?;
        self.verify(TokenKind::OpenBrace)?;
        let port = self.parse_port_index()?;
        self.program
            .connect_objects("", 0, &name, port, ConnectionKind::Series)?;
        self.expect_line_end()
    }

    /// Resolves the cardinality of one hop from the endpoint kinds and the
    /// arrow that was used.
    fn connect(&mut self, output: &str, output_port: usize, input: &str, input_port: usize, cross: bool) -> RunResult<()> {
        let output_is_group = self.program.is_group(output);
        let input_is_group = self.program.is_group(input);
        if cross && !(output_is_group && input_is_group) {
            return Err(Error::semantic(
                "A biclique connection ('*>') requires a group on both ends",
            ));
        }
        let kind = match (output_is_group, input_is_group) {
            (false, false) => ConnectionKind::OneToOne,
            (true, false) => ConnectionKind::ManyToOne,
            (false, true) => ConnectionKind::OneToMany,
            (true, true) => {
                if cross {
                    ConnectionKind::Biclique
                } else {
                    ConnectionKind::ManyToMany
                }
            }
        };
        self.program.connect_objects(output, output_port, input, input_port, kind)
    }

    /// Parses `{ index }`; the opening brace is the current token.
    fn parse_port_index(&mut self) -> RunResult<usize> {
        self.expect(TokenKind::NumericLiteral)?;
        let index = self.integer_literal("Port index")?;
        self.expect(TokenKind::CloseBrace)?;
        Ok(index)
    }

    // --- expressions ---

    /// `expression = product (('+'|'-') product)*`. The current token is the
    /// first token of the expression on entry and its last on exit.
    fn parse_expression(&mut self) -> RunResult<Value> {
        let mut value = self.parse_product()?;
        while self.lexer.peek(TokenKind::Plus) || self.lexer.peek(TokenKind::Minus) {
            self.next_token()?;
            let subtract = self.current.kind == TokenKind::Minus;
            self.next_token()?;
            let rhs = self.parse_product()?;
            value = if subtract { value.subtract(&rhs)? } else { value.add(&rhs)? };
        }
        Ok(value)
    }

    fn parse_product(&mut self) -> RunResult<Value> {
        let mut value = self.parse_factor()?;
        while self.lexer.peek(TokenKind::Asterisk) || self.lexer.peek(TokenKind::Slash) {
            self.next_token()?;
            let divide = self.current.kind == TokenKind::Slash;
            self.next_token()?;
            let rhs = self.parse_factor()?;
            value = if divide { value.divide(&rhs)? } else { value.multiply(&rhs)? };
        }
        Ok(value)
    }

    fn parse_factor(&mut self) -> RunResult<Value> {
        match self.current.kind {
            TokenKind::NumericLiteral => {
                let literal = self.current.value.clone();
                let parsed: f32 = literal
                    .parse()
                    .map_err(|_| Error::syntax(format!("Malformed numeric literal '{literal}'")))?;
                Ok(Value::from(parsed))
            }
            TokenKind::StringLiteral => Ok(Value::Text(self.current.value.clone())),
            TokenKind::Identifier => {
                let name = self.current.value.clone();
                if self.lexer.peek(TokenKind::OpenParen) {
                    self.next_token()?;
                    return self.parse_call(&name);
                }
                if let Some(value) = self.program.get_symbol(&name) {
                    return Ok(value.clone());
                }
                if let Some(procedure) = ProcedureKind::lookup(&name) {
                    return Ok(Value::Procedure(procedure));
                }
                Err(Error::semantic(format!("Unknown identifier '{name}'")))
            }
            TokenKind::OpenParen => {
                self.next_token()?;
                let value = self.parse_expression()?;
                self.expect(TokenKind::CloseParen)?;
                Ok(value)
            }
            TokenKind::Minus => {
                self.next_token()?;
                let value = self.parse_product()?;
                value.negated()
            }
            TokenKind::OpenBrace => self.parse_sequence_literal(),
            TokenKind::OpenBracket => self.parse_range_literal(),
            other => Err(Error::syntax(format!("Expected an expression, got {other}"))),
        }
    }

    fn parse_sequence_literal(&mut self) -> RunResult<Value> {
        let mut sequence = Sequence::new();
        if self.lexer.peek(TokenKind::CloseBrace) {
            self.next_token()?;
            return Ok(Value::Sequence(sequence));
        }
        loop {
            self.next_token()?;
            let element = self.parse_expression()?;
            sequence.push(element.as_number()?);
            self.next_token()?;
            match self.current.kind {
                TokenKind::CloseBrace => return Ok(Value::Sequence(sequence)),
                TokenKind::Comma => {}
                other => {
                    return Err(Error::syntax(format!(
                        "Expected ',' or '}}' in sequence literal, got {other}"
                    )));
                }
            }
        }
    }

    /// `[lo, hi]` expands to the inclusive ascending integer range; an empty
    /// sequence when `hi < lo`.
    fn parse_range_literal(&mut self) -> RunResult<Value> {
        self.next_token()?;
        let low = self.parse_expression()?.as_number()?;
        self.expect(TokenKind::Comma)?;
        self.next_token()?;
        let high = self.parse_expression()?.as_number()?;
        self.expect(TokenKind::CloseBracket)?;
        let low = low.real.round() as i64;
        let high = high.real.round() as i64;
        let sequence: Sequence = (low..=high).map(|step| Number::from(step as f32)).collect();
        Ok(Value::Sequence(sequence))
    }

    /// Parses a call's argument list and invokes the procedure; the opening
    /// parenthesis is the current token.
    fn parse_call(&mut self, name: &str) -> RunResult<Value> {
        let mut args = Vec::new();
        if self.lexer.peek(TokenKind::CloseParen) {
            self.next_token()?;
        } else {
            loop {
                self.next_token()?;
                args.push(self.parse_expression()?);
                self.next_token()?;
                match self.current.kind {
                    TokenKind::CloseParen => break,
                    TokenKind::Comma => {}
                    other => {
                        return Err(Error::syntax(format!(
                            "Expected ',' or ')' in procedure call, got {other}"
                        )));
                    }
                }
            }
        }
        let procedure = match self.program.get_symbol(name) {
            Some(Value::Procedure(procedure)) => *procedure,
            Some(other) => {
                return Err(Error::type_error(format!(
                    "'{name}' is a value of type {}, not a procedure",
                    other.get_type()
                )));
            }
            None => ProcedureKind::lookup(name)
                .ok_or_else(|| Error::semantic(format!("Unknown procedure '{name}'")))?,
        };
        procedure.call(args, self.program)
    }

    // --- token plumbing ---

    fn next_token(&mut self) -> RunResult<()> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, expected: TokenKind) -> RunResult<()> {
        self.next_token()?;
        self.verify(expected)
    }

    fn verify(&self, expected: TokenKind) -> RunResult<()> {
        if self.current.kind == expected {
            Ok(())
        } else {
            Err(Error::syntax(format!("Got {}, expected {expected}", self.current.kind))
                .at_line(self.current.line))
        }
    }

    fn line_end(&self) -> bool {
        matches!(self.current.kind, TokenKind::Newline | TokenKind::Eof)
    }

    fn expect_line_end(&mut self) -> RunResult<()> {
        self.next_token()?;
        if self.line_end() {
            Ok(())
        } else {
            Err(Error::syntax(format!("Expected end of line, got {}", self.current.kind))
                .at_line(self.current.line))
        }
    }

    fn integer_literal(&self, what: &str) -> RunResult<usize> {
        self.current
            .value
            .parse()
            .map_err(|_| Error::syntax(format!("{what} must be an integer, got '{}'", self.current.value)))
    }
}
