use std::fmt;

use crate::ast::{Literal, SourcePos, Syntax};
use crate::error::{LexError, LexErrorKind};

// ============================================================================
// Token Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reserved {
    Func,
    Let,
    If,
    Else,
    Return,
    Macro,
    As,
    Do,
    Block,
}

impl Reserved {
    fn from_word(word: &str) -> Option<Self> {
        Some(match word {
            "func" => Reserved::Func,
            "let" => Reserved::Let,
            "if" => Reserved::If,
            "else" => Reserved::Else,
            "return" => Reserved::Return,
            "macro" => Reserved::Macro,
            "as" => Reserved::As,
            "do" => Reserved::Do,
            "block" => Reserved::Block,
            _ => return None,
        })
    }

    pub fn word(self) -> &'static str {
        match self {
            Reserved::Func => "func",
            Reserved::Let => "let",
            Reserved::If => "if",
            Reserved::Else => "else",
            Reserved::Return => "return",
            Reserved::Macro => "macro",
            Reserved::As => "as",
            Reserved::Do => "do",
            Reserved::Block => "block",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Punct {
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Arrow,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
}

impl Punct {
    pub fn symbol(self) -> &'static str {
        match self {
            Punct::LParen => "(",
            Punct::RParen => ")",
            Punct::LBrace => "{",
            Punct::RBrace => "}",
            Punct::LBracket => "[",
            Punct::RBracket => "]",
            Punct::Comma => ",",
            Punct::Colon => ":",
            Punct::Arrow => "->",
            Punct::Assign => "=",
            Punct::Plus => "+",
            Punct::Minus => "-",
            Punct::Star => "*",
            Punct::Slash => "/",
            Punct::Percent => "%",
            Punct::EqEq => "==",
            Punct::NotEq => "!=",
            Punct::Lt => "<",
            Punct::Le => "<=",
            Punct::Gt => ">",
            Punct::Ge => ">=",
            Punct::AndAnd => "&&",
            Punct::OrOr => "||",
            Punct::Bang => "!",
        }
    }

    fn is_opener(self) -> bool {
        matches!(self, Punct::LParen | Punct::LBrace | Punct::LBracket)
    }

    fn is_closer(self) -> bool {
        matches!(self, Punct::RParen | Punct::RBrace | Punct::RBracket)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    /// `name!` (but not `name !=`).
    MacroName(String),
    Reserved(Reserved),
    Literal(Literal),
    /// `:name`
    KeywordSymbol(String),
    Punct(Punct),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "identifier `{name}`"),
            TokenKind::MacroName(name) => write!(f, "macro `{name}!`"),
            TokenKind::Reserved(word) => write!(f, "`{}`", word.word()),
            TokenKind::Literal(lit) => write!(f, "literal `{lit}`"),
            TokenKind::KeywordSymbol(name) => write!(f, "keyword `:{name}`"),
            TokenKind::Punct(p) => write!(f, "`{}`", p.symbol()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: SourcePos,
    /// Mode of the innermost open delimiter; an opener carries the mode it opens.
    pub mode: Syntax,
    /// Whitespace or a comment came directly before this token.
    pub spaced: bool,
}

impl Token {
    pub fn is_punct(&self, p: Punct) -> bool {
        self.kind == TokenKind::Punct(p)
    }

    pub fn is_reserved(&self, word: Reserved) -> bool {
        self.kind == TokenKind::Reserved(word)
    }

    /// Tokens after which a `(` continues an expression rather than opening a form.
    fn ends_expression(&self) -> bool {
        match &self.kind {
            TokenKind::Ident(_) | TokenKind::Literal(_) | TokenKind::KeywordSymbol(_) => true,
            TokenKind::Punct(p) => p.is_closer(),
            _ => false,
        }
    }
}

// ============================================================================
// Lexer
// ============================================================================

/// Lazy tokenizer over a whole compilation unit.
///
/// Iterating yields `Result<Token, LexError>` and stops after the first
/// error. `reset` rewinds to the start of the input.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    modes: Vec<Syntax>,
    previous: Option<Token>,
    failed: bool,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            modes: Vec::new(),
            previous: None,
            failed: false,
        }
    }

    pub fn reset(&mut self) {
        self.position = 0;
        self.line = 1;
        self.column = 1;
        self.modes.clear();
        self.previous = None;
        self.failed = false;
    }

    fn current_char(&self) -> char {
        self.peek_ahead(0)
    }

    fn peek_ahead(&self, n: usize) -> char {
        self.input.get(self.position + n).copied().unwrap_or('\0')
    }

    fn advance(&mut self) {
        if let Some(&ch) = self.input.get(self.position) {
            self.position += 1;
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn is_eof(&self) -> bool {
        self.position >= self.input.len()
    }

    fn here(&self) -> SourcePos {
        SourcePos {
            line: self.line,
            column: self.column,
            offset: self.position,
        }
    }

    fn mode(&self) -> Syntax {
        self.modes.last().copied().unwrap_or_default()
    }

    fn error(&self, kind: LexErrorKind, pos: SourcePos, input: String) -> LexError {
        LexError {
            kind,
            pos,
            syntax: self.mode(),
            input,
        }
    }

    /// Skip whitespace and comments; report whether anything was skipped.
    fn skip_whitespace(&mut self) -> bool {
        let start = self.position;
        loop {
            while !self.is_eof() && self.current_char().is_whitespace() {
                self.advance();
            }

            // `;` and `//` both comment to end of line
            if self.current_char() == ';'
                || (self.current_char() == '/' && self.peek_ahead(1) == '/')
            {
                while !self.is_eof() && self.current_char() != '\n' {
                    self.advance();
                }
            } else {
                break;
            }
        }
        self.position > start
    }

    /// Whether the next token stands apart from the previous one.
    fn detached(&self, spaced: bool) -> bool {
        match &self.previous {
            None => true,
            Some(prev) => {
                spaced
                    || matches!(prev.kind, TokenKind::Punct(p) if p.is_opener() || p == Punct::Comma)
            }
        }
    }

    // ========================================================================
    // String Parsing
    // ========================================================================

    fn read_string(&mut self) -> Result<Literal, LexError> {
        let start = self.here();
        self.advance();
        let mut content = String::new();

        while self.current_char() != '"' && !self.is_eof() {
            if self.current_char() == '\\' {
                self.advance();
                if self.is_eof() {
                    break;
                }
                content.push(self.read_escape_sequence()?);
            } else {
                content.push(self.current_char());
                self.advance();
            }
        }

        if self.is_eof() {
            let text: String = self.input[start.offset..].iter().collect();
            return Err(self.error(LexErrorKind::UnterminatedString, start, text));
        }

        self.advance();
        Ok(Literal::Str(content))
    }

    fn read_escape_sequence(&mut self) -> Result<char, LexError> {
        let pos = self.here();
        let c = self.current_char();
        self.advance();

        match c {
            'n' => Ok('\n'),
            't' => Ok('\t'),
            'r' => Ok('\r'),
            '\\' => Ok('\\'),
            '"' => Ok('"'),
            '\'' => Ok('\''),
            '0' => Ok('\0'),
            'u' => self.read_unicode_escape(pos),
            'x' => self.read_hex_escape(pos),
            _ => Err(self.error(LexErrorKind::InvalidEscape, pos, format!("\\{c}"))),
        }
    }

    /// `\u{1F600}`
    fn read_unicode_escape(&mut self, pos: SourcePos) -> Result<char, LexError> {
        let invalid = |lexer: &Self, hex: &str| {
            lexer.error(LexErrorKind::InvalidEscape, pos, format!("\\u{{{hex}"))
        };
        if self.current_char() != '{' {
            return Err(invalid(self, ""));
        }
        self.advance();

        let mut hex = String::new();
        while self.current_char() != '}' && !self.is_eof() {
            if !self.current_char().is_ascii_hexdigit() {
                return Err(invalid(self, &hex));
            }
            hex.push(self.current_char());
            self.advance();
        }
        if self.current_char() != '}' {
            return Err(invalid(self, &hex));
        }
        self.advance();

        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| invalid(self, &hex))
    }

    /// `\xFF`
    fn read_hex_escape(&mut self, pos: SourcePos) -> Result<char, LexError> {
        let mut hex = String::new();
        for _ in 0..2 {
            if !self.current_char().is_ascii_hexdigit() {
                return Err(self.error(LexErrorKind::InvalidEscape, pos, format!("\\x{hex}")));
            }
            hex.push(self.current_char());
            self.advance();
        }

        u8::from_str_radix(&hex, 16)
            .map(char::from)
            .map_err(|_| self.error(LexErrorKind::InvalidEscape, pos, format!("\\x{hex}")))
    }

    // ========================================================================
    // Number and Identifier Parsing
    // ========================================================================

    fn read_number(&mut self) -> Result<Literal, LexError> {
        let start = self.here();
        let mut text = String::new();

        if self.current_char() == '-' {
            text.push('-');
            self.advance();
        }

        let mut is_float = false;
        while !self.is_eof() {
            let ch = self.current_char();
            if ch.is_ascii_digit() || ch == '_' {
                text.push(ch);
                self.advance();
            } else if ch == '.' && !is_float && self.peek_ahead(1).is_ascii_digit() {
                is_float = true;
                text.push(ch);
                self.advance();
            } else if ch == 'e' || ch == 'E' {
                is_float = true;
                text.push(ch);
                self.advance();
                if matches!(self.current_char(), '+' | '-') {
                    text.push(self.current_char());
                    self.advance();
                }
            } else {
                break;
            }
        }

        // `12abc` is a malformed number rather than two tokens
        if is_ident_start(self.current_char()) {
            while is_ident_char(self.current_char()) {
                text.push(self.current_char());
                self.advance();
            }
            return Err(self.error(LexErrorKind::InvalidNumber, start, text));
        }

        let digits: String = text.chars().filter(|c| *c != '_').collect();
        let parsed = if is_float {
            digits.parse::<f64>().ok().map(Literal::Float)
        } else {
            digits.parse::<i64>().ok().map(Literal::Int)
        };
        parsed.ok_or_else(|| self.error(LexErrorKind::InvalidNumber, start, text))
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while !self.is_eof() {
            let ch = self.current_char();
            if is_ident_char(ch) || (ch == '-' && is_ident_start(self.peek_ahead(1))) {
                word.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        word
    }

    fn read_word_token(&mut self) -> TokenKind {
        let word = self.read_word();
        match word.as_str() {
            "true" => return TokenKind::Literal(Literal::Bool(true)),
            "false" => return TokenKind::Literal(Literal::Bool(false)),
            "nil" => return TokenKind::Literal(Literal::Nil),
            _ => {}
        }
        if let Some(reserved) = Reserved::from_word(&word) {
            return TokenKind::Reserved(reserved);
        }
        if self.current_char() == '!' && self.peek_ahead(1) != '=' {
            self.advance();
            return TokenKind::MacroName(word);
        }
        TokenKind::Ident(word)
    }

    fn punct(&mut self, p: Punct) -> TokenKind {
        for _ in 0..p.symbol().chars().count() {
            self.advance();
        }
        TokenKind::Punct(p)
    }

    /// Mode an opening `(` starts, from the character that follows it.
    fn paren_mode(&self) -> Syntax {
        let glued_to_expr = self.previous.as_ref().is_some_and(|p| p.ends_expression());
        let next = self.peek_ahead(1);
        if !glued_to_expr && (is_ident_start(next) || "+-*/%<>=!&|:".contains(next)) {
            Syntax::SExpr
        } else {
            Syntax::Brace
        }
    }

    // ========================================================================
    // Main Tokenization
    // ========================================================================

    pub fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        let spaced = self.skip_whitespace();

        if self.is_eof() {
            return Ok(None);
        }

        let pos = self.here();
        let ch = self.current_char();
        let next = self.peek_ahead(1);
        let mut mode = self.mode();

        let kind = match ch {
            '(' => {
                mode = self.paren_mode();
                self.modes.push(mode);
                self.punct(Punct::LParen)
            }
            '{' | '[' => {
                mode = Syntax::Brace;
                self.modes.push(mode);
                self.punct(if ch == '{' {
                    Punct::LBrace
                } else {
                    Punct::LBracket
                })
            }
            ')' | '}' | ']' => {
                self.modes.pop();
                self.punct(match ch {
                    ')' => Punct::RParen,
                    '}' => Punct::RBrace,
                    _ => Punct::RBracket,
                })
            }
            '"' => TokenKind::Literal(self.read_string()?),
            ',' => self.punct(Punct::Comma),
            ':' if is_ident_start(next) && self.detached(spaced) => {
                self.advance();
                TokenKind::KeywordSymbol(self.read_word())
            }
            ':' => self.punct(Punct::Colon),
            '-' if next.is_ascii_digit() && self.detached(spaced) => {
                TokenKind::Literal(self.read_number()?)
            }
            '-' if next == '>' => self.punct(Punct::Arrow),
            '-' => self.punct(Punct::Minus),
            '+' => self.punct(Punct::Plus),
            '*' => self.punct(Punct::Star),
            '/' => self.punct(Punct::Slash),
            '%' => self.punct(Punct::Percent),
            '=' if next == '=' => self.punct(Punct::EqEq),
            '=' => self.punct(Punct::Assign),
            '!' if next == '=' => self.punct(Punct::NotEq),
            '!' => self.punct(Punct::Bang),
            '<' if next == '=' => self.punct(Punct::Le),
            '<' => self.punct(Punct::Lt),
            '>' if next == '=' => self.punct(Punct::Ge),
            '>' => self.punct(Punct::Gt),
            '&' if next == '&' => self.punct(Punct::AndAnd),
            '|' if next == '|' => self.punct(Punct::OrOr),
            ch if ch.is_ascii_digit() => TokenKind::Literal(self.read_number()?),
            ch if is_ident_start(ch) => self.read_word_token(),
            other => {
                return Err(self.error(LexErrorKind::UnknownCharacter, pos, other.to_string()));
            }
        };

        let token = Token {
            kind,
            pos,
            mode,
            spaced,
        };
        self.previous = Some(token.clone());
        Ok(Some(token))
    }
}

impl Iterator for Lexer {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_token() {
            Ok(token) => token.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '?')
}

/// Lex the whole input, stopping at the first error.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let tokens: Vec<Token> = Lexer::new(input).collect::<Result<_, _>>()?;
    tracing::debug!(count = tokens.len(), "lexed tokens");
    Ok(tokens)
}
