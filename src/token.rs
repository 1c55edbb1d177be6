use crate::error::{Error, Result};

/// Kinds a lexed token can take. Operator kinds are flattened into the token
/// kind itself so the precedence table lives in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Or,
    And,
    NotEqualTo,
    EqualTo,
    LessThan,
    LessOrEqualTo,
    GreaterThan,
    GreaterOrEqualTo,
    Subtract,
    Add,
    Divide,
    Multiply,
    OpeningBracket,
    ClosingBracket,
    Constant,
    Function,
    FunctionParameterSeparator,
    Name,
    Empty,
}

impl TokenKind {
    pub fn is_operator(self) -> bool {
        matches!(
            self,
            TokenKind::Or
                | TokenKind::And
                | TokenKind::NotEqualTo
                | TokenKind::EqualTo
                | TokenKind::LessThan
                | TokenKind::LessOrEqualTo
                | TokenKind::GreaterThan
                | TokenKind::GreaterOrEqualTo
                | TokenKind::Subtract
                | TokenKind::Add
                | TokenKind::Divide
                | TokenKind::Multiply
        )
    }

    /// Precedence class, low to high. Equal classes are left-associative: the
    /// already-stacked operator pops first on a tie.
    pub fn precedence(self) -> u8 {
        match self {
            TokenKind::Or => 0,
            TokenKind::And => 1,
            TokenKind::EqualTo | TokenKind::NotEqualTo => 2,
            TokenKind::LessThan
            | TokenKind::LessOrEqualTo
            | TokenKind::GreaterThan
            | TokenKind::GreaterOrEqualTo => 3,
            TokenKind::Add | TokenKind::Subtract => 4,
            TokenKind::Multiply | TokenKind::Divide => 5,
            _ => 0,
        }
    }
}

/// True for any character that ends the current run and lexes on its own.
pub fn is_terminal_char(c: char) -> bool {
    matches!(
        c,
        '+' | '-' | '*' | '/' | '(' | ')' | ',' | '&' | '|' | '=' | '<' | '>'
    )
}

/// Characters that may start a two-character operator (`<=`, `<>`, `>=`).
pub(crate) fn starts_terminal_sequence(c: char) -> bool {
    matches!(c, '<' | '>')
}

pub(crate) fn extends_terminal_sequence(first: char, second: char) -> bool {
    matches!((first, second), ('<', '=') | ('<', '>') | ('>', '='))
}

pub(crate) fn is_numeric_start(c: char) -> bool {
    c.is_ascii_digit() || c == '.'
}

fn terminal_kind(text: &str) -> Option<TokenKind> {
    match text {
        "+" => Some(TokenKind::Add),
        "-" => Some(TokenKind::Subtract),
        "*" => Some(TokenKind::Multiply),
        "/" => Some(TokenKind::Divide),
        "(" => Some(TokenKind::OpeningBracket),
        ")" => Some(TokenKind::ClosingBracket),
        "," => Some(TokenKind::FunctionParameterSeparator),
        "&" => Some(TokenKind::And),
        "|" => Some(TokenKind::Or),
        "=" => Some(TokenKind::EqualTo),
        "<" => Some(TokenKind::LessThan),
        ">" => Some(TokenKind::GreaterThan),
        "<=" => Some(TokenKind::LessOrEqualTo),
        ">=" => Some(TokenKind::GreaterOrEqualTo),
        "<>" => Some(TokenKind::NotEqualTo),
        _ => None,
    }
}

/// One lexed unit of a formula. A `Name` immediately followed by `(` is
/// promoted to `Function` during structuring and then owns its argument lists;
/// that promotion is the only legal kind change.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    kind: TokenKind,
    text: String,
    value: String,
    numeric_value: Option<f64>,
    argument_lists: Vec<Vec<Token>>,
}

impl Token {
    /// Classifies a raw run of characters. Whitespace-only runs become `Empty`
    /// tokens; runs starting with a digit or `.` must parse as a literal.
    pub fn new(text: &str) -> Result<Token> {
        let trimmed = text.trim();
        let (kind, numeric_value) = if trimmed.is_empty() {
            (TokenKind::Empty, None)
        } else if let Some(kind) = terminal_kind(trimmed) {
            (kind, None)
        } else if is_numeric_start(trimmed.chars().next().unwrap_or('\0')) {
            let value = trimmed.parse::<f64>().map_err(|_| {
                Error::Lex(format!("invalid numeric literal '{trimmed}'"))
            })?;
            (TokenKind::Constant, Some(value))
        } else {
            (TokenKind::Name, None)
        };

        Ok(Token {
            kind,
            text: text.to_string(),
            value: trimmed.to_string(),
            numeric_value,
            argument_lists: Vec::new(),
        })
    }

    /// A constant token synthesized by the pipeline (unary rewriting).
    pub fn from_value(value: f64) -> Token {
        let text = value.to_string();
        Token {
            kind: TokenKind::Constant,
            value: text.clone(),
            text,
            numeric_value: Some(value),
            argument_lists: Vec::new(),
        }
    }

    pub(crate) fn synthetic(kind: TokenKind, text: &str) -> Token {
        Token {
            kind,
            text: text.to_string(),
            value: text.to_string(),
            numeric_value: None,
            argument_lists: Vec::new(),
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Trimmed token text; for bound names this is the canonical name after
    /// alias resolution.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn numeric_value(&self) -> Option<f64> {
        self.numeric_value
    }

    pub fn argument_lists(&self) -> &[Vec<Token>] {
        &self.argument_lists
    }

    pub fn precedence(&self) -> u8 {
        self.kind.precedence()
    }

    pub fn is_operator(&self) -> bool {
        self.kind.is_operator()
    }

    pub fn is_add(&self) -> bool {
        self.kind == TokenKind::Add
    }

    pub fn is_subtract(&self) -> bool {
        self.kind == TokenKind::Subtract
    }

    pub fn is_opening_bracket(&self) -> bool {
        self.kind == TokenKind::OpeningBracket
    }

    pub fn is_closing_bracket(&self) -> bool {
        self.kind == TokenKind::ClosingBracket
    }

    pub fn is_constant(&self) -> bool {
        self.kind == TokenKind::Constant
    }

    pub fn is_function(&self) -> bool {
        self.kind == TokenKind::Function
    }

    pub fn is_separator(&self) -> bool {
        self.kind == TokenKind::FunctionParameterSeparator
    }

    pub fn is_name(&self) -> bool {
        self.kind == TokenKind::Name
    }

    pub fn is_empty(&self) -> bool {
        self.kind == TokenKind::Empty
    }

    /// Promotes a `Name` into a `Function`; any other kind is an invariant
    /// violation reachable only from hand-built token streams.
    pub fn promote_to_function(&mut self) -> Result<()> {
        if self.kind != TokenKind::Name {
            return Err(Error::Syntax(format!(
                "cannot change '{:?}' to function",
                self.kind
            )));
        }
        self.kind = TokenKind::Function;
        Ok(())
    }

    pub(crate) fn set_argument_lists(&mut self, lists: Vec<Vec<Token>>) {
        self.argument_lists = lists;
    }

    pub(crate) fn argument_lists_mut(&mut self) -> &mut Vec<Vec<Token>> {
        &mut self.argument_lists
    }

    /// Renames the token to its canonical bound name. Happens at most once,
    /// during alias resolution in the builder.
    pub(crate) fn change_value_to(&mut self, value: String) {
        self.value = value;
    }
}
