//! Unified parser for brace syntax and S-expressions.
//!
//! There is one grammar entry point per construct and one set of node kinds.
//! The parser commits to a surface syntax only at an opening delimiter: `{`
//! and `[` are always brace syntax, while `(` looks one or two tokens ahead
//! to decide between an S-expression form and a parenthesised expression.

use std::mem;
use std::sync::Arc;

use crate::ast::{
    BinOp, Literal, MacroParam, Node, NodeIdGen, NodeKind, NodeRef, Param, Program, SourcePos,
    Syntax, UnOp, first_beyond_depth,
};
use crate::error::ParseError;
use crate::lexer::{Punct, Reserved, Token, TokenKind};
use crate::options::DEFAULT_MAX_NESTING_DEPTH;
use crate::types::Type;

/// Binding power of `as`, above every infix operator.
const CAST_PRECEDENCE: u8 = 7;

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    ids: NodeIdGen,
    mode: Syntax,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            position: 0,
            ids: NodeIdGen::default(),
            mode: Syntax::Brace,
            depth: 0,
            max_depth: DEFAULT_MAX_NESTING_DEPTH,
        }
    }

    /// Bound on nesting, counted from the top-level forms.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn parse_program(mut self) -> Result<Program, ParseError> {
        let mut forms = Vec::new();
        while !self.is_eof() {
            forms.push(self.parse_top_level()?);
        }
        tracing::debug!(forms = forms.len(), "parsed program");
        let root = self.node(NodeKind::Block(forms), SourcePos::start());
        // operator chains nest without recursing
        if let Some(deep) = first_beyond_depth(&root, self.max_depth) {
            let (pos, syntax) = (deep.pos, deep.syntax);
            return Err(ParseError {
                syntax,
                ..self.too_deep(pos)
            });
        }
        Ok(Program {
            root,
            ids: self.ids,
        })
    }

    // ========================================================================
    // Token Access
    // ========================================================================

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.position + n)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn is_eof(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn check_punct(&self, p: Punct) -> bool {
        self.peek().is_some_and(|t| t.is_punct(p))
    }

    fn check_reserved(&self, word: Reserved) -> bool {
        self.peek().is_some_and(|t| t.is_reserved(word))
    }

    fn current_pos(&self) -> SourcePos {
        self.peek()
            .or_else(|| self.tokens.last())
            .map(|t| t.pos)
            .unwrap_or_else(SourcePos::start)
    }

    /// Consume the current token and return where it started.
    fn bump(&mut self) -> SourcePos {
        let pos = self.current_pos();
        if !self.is_eof() {
            self.position += 1;
        }
        pos
    }

    fn skip_comma(&mut self) {
        if self.check_punct(Punct::Comma) {
            self.position += 1;
        }
    }

    fn error(&self, expected: &[&str]) -> ParseError {
        let found = match self.peek() {
            Some(token) => token.kind.to_string(),
            None => "end of input".to_string(),
        };
        self.error_found(self.current_pos(), expected, found)
    }

    fn error_found(&self, pos: SourcePos, expected: &[&str], found: String) -> ParseError {
        ParseError {
            pos,
            syntax: self.mode,
            expected_one_of: expected.iter().map(|s| s.to_string()).collect(),
            found,
        }
    }

    fn too_deep(&self, pos: SourcePos) -> ParseError {
        self.error_found(
            pos,
            &[&format!("at most {} levels of nesting", self.max_depth)],
            "deeper nesting".to_string(),
        )
    }

    /// Run `f` one nesting level down, failing past the depth bound.
    fn descend<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= self.max_depth {
            return Err(self.too_deep(self.current_pos()));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn expect_punct(&mut self, p: Punct) -> Result<SourcePos, ParseError> {
        if self.check_punct(p) {
            Ok(self.bump())
        } else {
            Err(self.error(&[&format!("`{}`", p.symbol())]))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Ident(name)) => {
                let name = name.clone();
                self.position += 1;
                Ok(name)
            }
            _ => Err(self.error(&["identifier"])),
        }
    }

    /// Run `f` with `mode` as the syntax recorded on new nodes and errors.
    fn in_mode<T>(
        &mut self,
        mode: Syntax,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        let saved = mem::replace(&mut self.mode, mode);
        let result = f(self);
        self.mode = saved;
        result
    }

    fn node(&mut self, kind: NodeKind, pos: SourcePos) -> NodeRef {
        Arc::new(Node::new(self.ids.fresh(), kind, pos, self.mode))
    }

    fn annotated(&mut self, kind: NodeKind, annotation: Option<Type>, pos: SourcePos) -> NodeRef {
        Arc::new(Node::new(self.ids.fresh(), kind, pos, self.mode).with_annotation(annotation))
    }

    /// Branches and bodies are always blocks, whichever syntax wrote them.
    fn wrap_block(&mut self, node: NodeRef) -> NodeRef {
        if node.is_block() {
            return node;
        }
        let pos = node.pos;
        self.node(NodeKind::Block(vec![node]), pos)
    }

    // ========================================================================
    // Statements (brace syntax)
    // ========================================================================

    fn parse_top_level(&mut self) -> Result<NodeRef, ParseError> {
        if self.check_reserved(Reserved::Macro) {
            return self.parse_macro_def();
        }
        if self.check_punct(Punct::LParen)
            && self
                .peek_at(1)
                .is_some_and(|t| t.is_reserved(Reserved::Macro))
        {
            return self.in_mode(Syntax::SExpr, Self::parse_sexpr_macro_def);
        }
        self.parse_statement()
    }

    fn parse_statement(&mut self) -> Result<NodeRef, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Reserved(Reserved::Let)) => self.descend(Self::parse_let),
            Some(TokenKind::Reserved(Reserved::Func)) => self.descend(Self::parse_func),
            Some(TokenKind::Reserved(Reserved::Return)) => self.parse_return(),
            _ => self.parse_expr(0),
        }
    }

    fn parse_let(&mut self) -> Result<NodeRef, ParseError> {
        let pos = self.bump();
        let name = self.expect_ident()?;
        let annotation = self.parse_annotation()?;
        self.expect_punct(Punct::Assign)?;
        let value = self.parse_expr(0)?;
        Ok(self.annotated(NodeKind::Let { name, value }, annotation, pos))
    }

    fn parse_func(&mut self) -> Result<NodeRef, ParseError> {
        let pos = self.bump();
        let name = self.expect_ident()?;
        self.expect_punct(Punct::LParen)?;
        let mut params = Vec::new();
        while !self.check_punct(Punct::RParen) {
            let name = self.expect_ident()?;
            let annotation = self.parse_annotation()?;
            params.push(Param { name, annotation });
            if !self.check_punct(Punct::RParen) {
                self.expect_punct(Punct::Comma)?;
            }
        }
        self.bump();
        let ret = self.parse_return_annotation()?;
        let body = self.parse_block()?;
        Ok(self.annotated(NodeKind::FuncDef { name, params, body }, ret, pos))
    }

    fn parse_return(&mut self) -> Result<NodeRef, ParseError> {
        let pos = self.bump();
        let value = if self.starts_expression() {
            Some(self.parse_expr(0)?)
        } else {
            None
        };
        Ok(self.node(NodeKind::Return(value), pos))
    }

    fn starts_expression(&self) -> bool {
        match self.peek_kind() {
            None => false,
            Some(TokenKind::Punct(p)) => !matches!(
                p,
                Punct::RParen | Punct::RBrace | Punct::RBracket | Punct::Comma
            ),
            Some(TokenKind::Reserved(word)) => matches!(word, Reserved::If),
            Some(_) => true,
        }
    }

    fn parse_macro_def(&mut self) -> Result<NodeRef, ParseError> {
        let pos = self.bump();
        let name = self.expect_macro_name()?;
        self.expect_punct(Punct::LParen)?;
        let params = self.parse_macro_params(true)?;
        let body = self.parse_block()?;
        Ok(self.node(NodeKind::MacroDef { name, params, body }, pos))
    }

    /// Macro definitions may spell the name with or without the trailing `!`.
    fn expect_macro_name(&mut self) -> Result<String, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Ident(name) | TokenKind::MacroName(name)) => {
                let name = name.clone();
                self.position += 1;
                Ok(name)
            }
            _ => Err(self.error(&["macro name"])),
        }
    }

    /// `[block] IDENT` entries up to and including the closing `)`.
    fn parse_macro_params(&mut self, commas: bool) -> Result<Vec<MacroParam>, ParseError> {
        let mut params = Vec::<MacroParam>::new();
        while !self.check_punct(Punct::RParen) {
            let is_block = self.check_reserved(Reserved::Block);
            if is_block {
                self.bump();
            }
            let pos = self.current_pos();
            let name = self.expect_ident()?;
            if params.iter().any(|p| p.name == name) {
                return Err(self.error_found(
                    pos,
                    &["distinct parameter name"],
                    format!("duplicate `{name}`"),
                ));
            }
            params.push(MacroParam { name, is_block });
            if commas && !self.check_punct(Punct::RParen) {
                self.expect_punct(Punct::Comma)?;
            } else {
                self.skip_comma();
            }
        }
        self.bump();
        Ok(params)
    }

    fn parse_block(&mut self) -> Result<NodeRef, ParseError> {
        self.in_mode(Syntax::Brace, |p| {
            let pos = p.expect_punct(Punct::LBrace)?;
            p.parse_block_rest(pos)
        })
    }

    /// Statements after an opening `{`, through the closing `}`.
    fn parse_block_rest(&mut self, pos: SourcePos) -> Result<NodeRef, ParseError> {
        let mut statements = Vec::new();
        while !self.check_punct(Punct::RBrace) {
            if self.is_eof() {
                return Err(self.error(&["`}`", "statement"]));
            }
            statements.push(self.parse_statement()?);
        }
        self.bump();
        Ok(self.node(NodeKind::Block(statements), pos))
    }

    // ========================================================================
    // Type Annotations
    // ========================================================================

    /// `: T`, or `:T` which lexes as a keyword symbol.
    fn parse_annotation(&mut self) -> Result<Option<Type>, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Punct(Punct::Colon)) => {
                self.bump();
                Ok(Some(self.parse_type()?))
            }
            Some(TokenKind::KeywordSymbol(name)) => {
                let name = name.clone();
                self.bump();
                Ok(Some(self.parse_type_args(name)?))
            }
            _ => Ok(None),
        }
    }

    fn parse_return_annotation(&mut self) -> Result<Option<Type>, ParseError> {
        if self.check_punct(Punct::Arrow) {
            self.bump();
            Ok(Some(self.parse_type()?))
        } else {
            Ok(None)
        }
    }

    pub fn parse_type(&mut self) -> Result<Type, ParseError> {
        self.descend(Self::parse_type_inner)
    }

    fn parse_type_inner(&mut self) -> Result<Type, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Reserved(Reserved::Func)) => {
                self.bump();
                self.expect_punct(Punct::LParen)?;
                let params = self.parse_type_list(Punct::RParen)?;
                self.expect_punct(Punct::Arrow)?;
                let ret = self.parse_type()?;
                Ok(Type::function(params, ret))
            }
            Some(TokenKind::Ident(name)) => {
                let name = name.clone();
                self.bump();
                self.parse_type_args(name)
            }
            _ => Err(self.error(&["type"])),
        }
    }

    /// Optional `<T, …>` directly after a type name.
    fn parse_type_args(&mut self, name: String) -> Result<Type, ParseError> {
        let glued_lt = self
            .peek()
            .is_some_and(|t| t.is_punct(Punct::Lt) && !t.spaced);
        let args = if glued_lt {
            self.bump();
            self.parse_type_list(Punct::Gt)?
        } else {
            Vec::new()
        };
        Ok(Type::from_name(&name, args))
    }

    fn parse_type_list(&mut self, close: Punct) -> Result<Vec<Type>, ParseError> {
        let mut types = Vec::new();
        while !self.at_type_list_close(close) {
            types.push(self.parse_type()?);
            if !self.at_type_list_close(close) {
                self.expect_punct(Punct::Comma)?;
            }
        }
        self.bump();
        Ok(types)
    }

    /// `Vector<Int>= …` lexes `>=`; a type argument list takes the `>` and
    /// leaves the `=`.
    fn at_type_list_close(&mut self, close: Punct) -> bool {
        if close == Punct::Gt
            && let Some(token) = self.tokens.get_mut(self.position)
            && token.is_punct(Punct::Ge)
        {
            token.kind = TokenKind::Punct(Punct::Gt);
            let mut assign = token.clone();
            assign.kind = TokenKind::Punct(Punct::Assign);
            assign.pos.column += 1;
            assign.pos.offset += 1;
            assign.spaced = false;
            self.tokens.insert(self.position + 1, assign);
        }
        self.check_punct(close)
    }

    // ========================================================================
    // Expressions (brace syntax)
    // ========================================================================

    fn parse_expr(&mut self, min_prec: u8) -> Result<NodeRef, ParseError> {
        let lhs = self.parse_unary()?;
        self.parse_infix(lhs, min_prec)
    }

    fn parse_infix(&mut self, mut lhs: NodeRef, min_prec: u8) -> Result<NodeRef, ParseError> {
        loop {
            if self.check_reserved(Reserved::As) {
                if CAST_PRECEDENCE < min_prec {
                    break;
                }
                self.bump();
                let target = self.parse_type()?;
                let pos = lhs.pos;
                lhs = self.node(NodeKind::Cast { value: lhs, target }, pos);
                continue;
            }

            let Some(op) = self.peek().and_then(infix_op) else {
                break;
            };
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.bump();
            let rhs = self.parse_expr(prec + 1)?;
            let pos = lhs.pos;
            lhs = self.node(NodeKind::BinaryOp { op, lhs, rhs }, pos);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<NodeRef, ParseError> {
        self.descend(Self::parse_unary_inner)
    }

    fn parse_unary_inner(&mut self) -> Result<NodeRef, ParseError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Punct(Punct::Minus)) => UnOp::Neg,
            Some(TokenKind::Punct(Punct::Bang)) => UnOp::Not,
            _ => return self.parse_postfix(),
        };
        let pos = self.bump();
        let operand = self.parse_unary()?;
        Ok(self.node(NodeKind::UnaryOp { op, operand }, pos))
    }

    /// A primary followed by calls; a call needs `(` glued to its callee.
    fn parse_postfix(&mut self) -> Result<NodeRef, ParseError> {
        let mut expr = self.parse_primary()?;
        while let Some(token) = self.peek()
            && token.is_punct(Punct::LParen)
            && !token.spaced
        {
            let pos = expr.pos;
            self.bump();
            let args = self.in_mode(Syntax::Brace, |p| p.parse_args(Punct::RParen))?;
            expr = self.node(NodeKind::Call { callee: expr, args }, pos);
        }
        Ok(expr)
    }

    /// Expressions separated by optional commas, through `close`.
    fn parse_args(&mut self, close: Punct) -> Result<Vec<NodeRef>, ParseError> {
        let mut args = Vec::new();
        while !self.check_punct(close) {
            if self.is_eof() {
                return Err(self.error(&[&format!("`{}`", close.symbol()), "expression"]));
            }
            args.push(self.parse_expr(0)?);
            self.skip_comma();
        }
        self.bump();
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<NodeRef, ParseError> {
        let Some(kind) = self.peek_kind().cloned() else {
            return Err(self.error(&["expression"]));
        };
        match kind {
            TokenKind::Literal(lit) => {
                let pos = self.bump();
                Ok(self.node(NodeKind::Literal(lit), pos))
            }
            TokenKind::Ident(name) => {
                let pos = self.bump();
                Ok(self.node(NodeKind::Identifier(name), pos))
            }
            TokenKind::KeywordSymbol(name) => {
                let pos = self.bump();
                Ok(self.node(NodeKind::KeywordSymbol(name), pos))
            }
            TokenKind::MacroName(name) => {
                let pos = self.bump();
                self.expect_punct(Punct::LParen)?;
                let args = self.in_mode(Syntax::Brace, |p| p.parse_args(Punct::RParen))?;
                Ok(self.node(NodeKind::MacroInvocation { name, args }, pos))
            }
            TokenKind::Punct(Punct::LBracket) => self.in_mode(Syntax::Brace, |p| {
                let pos = p.bump();
                let items = p.parse_args(Punct::RBracket)?;
                Ok(p.node(NodeKind::VectorLiteral(items), pos))
            }),
            TokenKind::Punct(Punct::LBrace) => self.in_mode(Syntax::Brace, Self::parse_brace),
            TokenKind::Punct(Punct::LParen) => self.parse_paren(),
            TokenKind::Reserved(Reserved::If) => self.in_mode(Syntax::Brace, Self::parse_if),
            _ => Err(self.error(&["expression"])),
        }
    }

    /// `{}` is an empty map, `{:k …}` a map, anything else a block.
    fn parse_brace(&mut self) -> Result<NodeRef, ParseError> {
        let pos = self.bump();
        match self.peek_kind() {
            Some(TokenKind::Punct(Punct::RBrace)) => {
                self.bump();
                Ok(self.node(NodeKind::MapLiteral(Vec::new()), pos))
            }
            Some(TokenKind::KeywordSymbol(_)) => self.parse_map_rest(pos),
            _ => self.parse_block_rest(pos),
        }
    }

    fn parse_map_rest(&mut self, pos: SourcePos) -> Result<NodeRef, ParseError> {
        let mut pairs = Vec::new();
        while !self.check_punct(Punct::RBrace) {
            if self.is_eof() {
                return Err(self.error(&["`}`", "map key"]));
            }
            let key = self.parse_expr(0)?;
            if self.check_punct(Punct::RBrace) || self.is_eof() {
                return Err(self.error(&["map value"]));
            }
            let value = self.parse_expr(0)?;
            pairs.push((key, value));
            self.skip_comma();
        }
        self.bump();
        Ok(self.node(NodeKind::MapLiteral(pairs), pos))
    }

    fn parse_if(&mut self) -> Result<NodeRef, ParseError> {
        let pos = self.bump();
        let cond = self.parse_condition()?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.check_reserved(Reserved::Else) {
            self.bump();
            if self.check_reserved(Reserved::If) {
                let nested = self.descend(Self::parse_if)?;
                Some(self.wrap_block(nested))
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(self.node(
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            },
            pos,
        ))
    }

    /// A leading `(` in a condition always groups, never opens an S-expression.
    fn parse_condition(&mut self) -> Result<NodeRef, ParseError> {
        if !self.check_punct(Punct::LParen) {
            return self.parse_expr(0);
        }
        let grouped = self.parse_group()?;
        self.parse_infix(grouped, 0)
    }

    fn parse_group(&mut self) -> Result<NodeRef, ParseError> {
        self.in_mode(Syntax::Brace, |p| {
            p.bump();
            let inner = p.parse_expr(0)?;
            p.expect_punct(Punct::RParen)?;
            Ok(inner)
        })
    }

    // ========================================================================
    // S-expressions
    // ========================================================================

    /// Commit to a syntax at `(` by looking at the token(s) after it.
    fn parse_paren(&mut self) -> Result<NodeRef, ParseError> {
        let pos = self.current_pos();
        let Some(head) = self.peek_at(1).map(|t| t.kind.clone()) else {
            self.bump();
            return Err(self.error(&["expression", "`)`"]));
        };

        match head {
            TokenKind::Punct(Punct::RParen) => {
                self.position += 2;
                self.in_mode(Syntax::SExpr, |p| {
                    Ok(p.node(NodeKind::Literal(Literal::Nil), pos))
                })
            }
            TokenKind::Punct(p) if operator_head(p) && !self.is_glued_unary(p) => {
                self.in_mode(Syntax::SExpr, |parser| parser.parse_operator_form(pos, p))
            }
            TokenKind::Reserved(word) => {
                self.in_mode(Syntax::SExpr, |p| p.parse_special_form(pos, word))
            }
            TokenKind::MacroName(name) => self.in_mode(Syntax::SExpr, |p| {
                p.position += 2;
                let args = p.parse_elements()?;
                Ok(p.node(NodeKind::MacroInvocation { name, args }, pos))
            }),
            TokenKind::KeywordSymbol(head) => {
                self.in_mode(Syntax::SExpr, |p| p.parse_keyword_form(pos, head))
            }
            TokenKind::Ident(name) if !self.ident_opens_expression() => {
                self.in_mode(Syntax::SExpr, |p| {
                    p.position += 1;
                    let callee_pos = p.bump();
                    let callee = p.node(NodeKind::Identifier(name), callee_pos);
                    let args = p.parse_elements()?;
                    Ok(p.node(NodeKind::Call { callee, args }, pos))
                })
            }
            _ => self.parse_group(),
        }
    }

    /// `(-x …)` and `(!x …)` with the operand glued on are brace expressions.
    fn is_glued_unary(&self, p: Punct) -> bool {
        matches!(p, Punct::Minus | Punct::Bang)
            && self
                .peek_at(2)
                .is_some_and(|t| !t.spaced && !t.is_punct(Punct::RParen))
    }

    /// `(x + 1)`, `(x as Int)` and `(f(x))` group; `(f x)` calls.
    fn ident_opens_expression(&self) -> bool {
        self.peek_at(2).is_some_and(|t| {
            infix_op(t).is_some()
                || t.is_reserved(Reserved::As)
                || (t.is_punct(Punct::LParen) && !t.spaced)
        })
    }

    /// Postfix-level expressions through the closing `)`.
    fn parse_elements(&mut self) -> Result<Vec<NodeRef>, ParseError> {
        let mut items = Vec::new();
        while !self.check_punct(Punct::RParen) {
            if self.is_eof() {
                return Err(self.error(&["`)`", "expression"]));
            }
            items.push(self.parse_unary()?);
            self.skip_comma();
        }
        self.bump();
        Ok(items)
    }

    fn parse_element(&mut self) -> Result<NodeRef, ParseError> {
        if self.check_punct(Punct::RParen) || self.is_eof() {
            return Err(self.error(&["expression"]));
        }
        self.parse_unary()
    }

    fn parse_operator_form(&mut self, pos: SourcePos, p: Punct) -> Result<NodeRef, ParseError> {
        self.position += 2;
        let operands = self.parse_elements()?;
        let count = operands.len();
        let arity_error = |parser: &Self, expected: &str| {
            parser.error_found(pos, &[expected], format!("{count} operands for `{}`", p.symbol()))
        };

        match p {
            Punct::Bang | Punct::Minus if count == 1 => {
                let op = if p == Punct::Bang { UnOp::Not } else { UnOp::Neg };
                let operand = operands.into_iter().next();
                match operand {
                    Some(operand) => Ok(self.node(NodeKind::UnaryOp { op, operand }, pos)),
                    None => Err(arity_error(self, "1 operand")),
                }
            }
            Punct::Bang => Err(arity_error(self, "1 operand")),
            _ => {
                let Some(op) = punct_binop(p) else {
                    return Err(arity_error(self, "operator"));
                };
                if (op.is_ordering() || op.is_equality()) && count != 2 {
                    return Err(arity_error(self, "2 operands"));
                }
                if count < 2 {
                    return Err(arity_error(self, "at least 2 operands"));
                }
                let mut iter = operands.into_iter();
                let mut acc = match iter.next() {
                    Some(first) => first,
                    None => return Err(arity_error(self, "at least 2 operands")),
                };
                for rhs in iter {
                    acc = self.node(NodeKind::BinaryOp { op, lhs: acc, rhs }, pos);
                }
                Ok(acc)
            }
        }
    }

    fn parse_special_form(&mut self, pos: SourcePos, word: Reserved) -> Result<NodeRef, ParseError> {
        self.position += 1;
        if matches!(word, Reserved::Else | Reserved::Block | Reserved::Macro) {
            return Err(self.error(&["special form"]));
        }
        self.position += 1;

        let node = match word {
            Reserved::If => {
                let cond = self.parse_element()?;
                let then = self.parse_element()?;
                let then_branch = self.wrap_block(then);
                let else_branch = if self.check_punct(Punct::RParen) {
                    None
                } else {
                    let other = self.parse_element()?;
                    Some(self.wrap_block(other))
                };
                self.expect_punct(Punct::RParen)?;
                self.node(
                    NodeKind::If {
                        cond,
                        then_branch,
                        else_branch,
                    },
                    pos,
                )
            }
            Reserved::Let => {
                let name = self.expect_ident()?;
                // `(let k :kw)` binds a keyword; `(let k :Int 1)` annotates
                let annotates = match self.peek_kind() {
                    Some(TokenKind::Punct(Punct::Colon)) => true,
                    Some(TokenKind::KeywordSymbol(_)) => {
                        !self.peek_at(1).is_some_and(|t| t.is_punct(Punct::RParen))
                    }
                    _ => false,
                };
                let annotation = if annotates {
                    self.parse_annotation()?
                } else {
                    None
                };
                let value = self.parse_element()?;
                self.expect_punct(Punct::RParen)?;
                self.annotated(NodeKind::Let { name, value }, annotation, pos)
            }
            Reserved::Func => {
                let name = self.expect_ident()?;
                self.expect_punct(Punct::LParen)?;
                let mut params = Vec::new();
                while !self.check_punct(Punct::RParen) {
                    let name = self.expect_ident()?;
                    let annotation = self.parse_annotation()?;
                    params.push(Param { name, annotation });
                    self.skip_comma();
                }
                self.bump();
                let ret = self.parse_return_annotation()?;
                let body_pos = self.current_pos();
                let items = self.parse_elements()?;
                let body = self.node(NodeKind::Block(items), body_pos);
                return Ok(self.annotated(NodeKind::FuncDef { name, params, body }, ret, pos));
            }
            Reserved::Do => {
                let items = self.parse_elements()?;
                return Ok(self.node(NodeKind::Block(items), pos));
            }
            Reserved::Return => {
                let value = if self.check_punct(Punct::RParen) {
                    None
                } else {
                    Some(self.parse_element()?)
                };
                self.expect_punct(Punct::RParen)?;
                self.node(NodeKind::Return(value), pos)
            }
            Reserved::As => {
                let value = self.parse_element()?;
                let target = self.parse_type()?;
                self.expect_punct(Punct::RParen)?;
                self.node(NodeKind::Cast { value, target }, pos)
            }
            Reserved::Else | Reserved::Block | Reserved::Macro => {
                return Err(self.error(&["special form"]));
            }
        };
        Ok(node)
    }

    fn parse_keyword_form(&mut self, pos: SourcePos, head: String) -> Result<NodeRef, ParseError> {
        self.position += 2;
        let items = self.parse_elements()?;
        if !(1..=2).contains(&items.len()) {
            return Err(self.error_found(
                pos,
                &["1 or 2 operands"],
                format!("{} operands for `:{head}`", items.len()),
            ));
        }
        Ok(self.node(NodeKind::SExprForm { head, items }, pos))
    }

    fn parse_sexpr_macro_def(&mut self) -> Result<NodeRef, ParseError> {
        let pos = self.bump();
        self.bump();
        let name = self.expect_macro_name()?;
        self.expect_punct(Punct::LParen)?;
        let params = self.parse_macro_params(false)?;
        let body_pos = self.current_pos();
        let items = self.parse_elements()?;
        let body = self.node(NodeKind::Block(items), body_pos);
        Ok(self.node(NodeKind::MacroDef { name, params, body }, pos))
    }
}

fn punct_binop(p: Punct) -> Option<BinOp> {
    Some(match p {
        Punct::Plus => BinOp::Add,
        Punct::Minus => BinOp::Sub,
        Punct::Star => BinOp::Mul,
        Punct::Slash => BinOp::Div,
        Punct::Percent => BinOp::Rem,
        Punct::EqEq => BinOp::Eq,
        Punct::NotEq => BinOp::Ne,
        Punct::Lt => BinOp::Lt,
        Punct::Le => BinOp::Le,
        Punct::Gt => BinOp::Gt,
        Punct::Ge => BinOp::Ge,
        Punct::AndAnd => BinOp::And,
        Punct::OrOr => BinOp::Or,
        _ => return None,
    })
}

fn infix_op(token: &Token) -> Option<BinOp> {
    match token.kind {
        TokenKind::Punct(p) => punct_binop(p),
        _ => None,
    }
}

fn operator_head(p: Punct) -> bool {
    p == Punct::Bang || punct_binop(p).is_some()
}

/// Parse a token stream into a program.
pub fn parse(tokens: Vec<Token>) -> Result<Program, ParseError> {
    Parser::new(tokens).parse_program()
}

pub fn parse_with_max_depth(tokens: Vec<Token>, max_depth: usize) -> Result<Program, ParseError> {
    Parser::new(tokens).with_max_depth(max_depth).parse_program()
}
