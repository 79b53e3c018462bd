use std::fmt;

/// A lexical token together with its byte offset in the template source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Text { value: String, position: usize },
    Identifier { value: String, position: usize },
    Symbol { kind: TokenKind, position: usize },
}

/// Discriminant of a [`Token`], used by the parser for look-ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Text,
    OpenTag,
    CloseTag,
    Identifier,
    If,
    Each,
    Else,
    As,
    With,
    Partial,
    Pipe,
    Dot,
    Slash,
    Comma,
    Equals,
    OpenParen,
    CloseParen,
    GreaterThan,
    Hash,
    Ampersand,
    Eof,
}

impl TokenKind {
    /// Maps an identifier run to its reserved keyword, if any.
    pub fn keyword(ident: &str) -> Option<TokenKind> {
        match ident {
            "if" => Some(TokenKind::If),
            "each" => Some(TokenKind::Each),
            "else" => Some(TokenKind::Else),
            "as" => Some(TokenKind::As),
            "with" => Some(TokenKind::With),
            "partial" => Some(TokenKind::Partial),
            _ => None,
        }
    }

    pub fn punctuation(c: char) -> Option<TokenKind> {
        match c {
            '|' => Some(TokenKind::Pipe),
            '.' => Some(TokenKind::Dot),
            '/' => Some(TokenKind::Slash),
            ',' => Some(TokenKind::Comma),
            '=' => Some(TokenKind::Equals),
            '(' => Some(TokenKind::OpenParen),
            ')' => Some(TokenKind::CloseParen),
            '>' => Some(TokenKind::GreaterThan),
            '&' => Some(TokenKind::Ampersand),
            _ => None,
        }
    }

    pub fn is_block_keyword(self) -> bool {
        matches!(self, TokenKind::If | TokenKind::Each | TokenKind::Partial)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Text => "text",
            TokenKind::OpenTag => "'{{'",
            TokenKind::CloseTag => "'}}'",
            TokenKind::Identifier => "identifier",
            TokenKind::If => "if",
            TokenKind::Each => "each",
            TokenKind::Else => "else",
            TokenKind::As => "as",
            TokenKind::With => "with",
            TokenKind::Partial => "partial",
            TokenKind::Pipe => "'|'",
            TokenKind::Dot => "'.'",
            TokenKind::Slash => "'/'",
            TokenKind::Comma => "','",
            TokenKind::Equals => "'='",
            TokenKind::OpenParen => "'('",
            TokenKind::CloseParen => "')'",
            TokenKind::GreaterThan => "'>'",
            TokenKind::Hash => "'#'",
            TokenKind::Ampersand => "'&'",
            TokenKind::Eof => "end of input",
        };
        f.write_str(s)
    }
}

impl Token {
    pub fn symbol(kind: TokenKind, position: usize) -> Self {
        Token::Symbol { kind, position }
    }

    pub fn kind(&self) -> TokenKind {
        match self {
            Token::Text { .. } => TokenKind::Text,
            Token::Identifier { .. } => TokenKind::Identifier,
            Token::Symbol { kind, .. } => *kind,
        }
    }

    pub fn position(&self) -> usize {
        match self {
            Token::Text { position, .. }
            | Token::Identifier { position, .. }
            | Token::Symbol { position, .. } => *position,
        }
    }

    /// The carried string for `Text` and `Identifier` tokens.
    pub fn value(&self) -> Option<&str> {
        match self {
            Token::Text { value, .. } | Token::Identifier { value, .. } => Some(value),
            Token::Symbol { .. } => None,
        }
    }
}
