use crate::error::TokenizeError;
use crate::tpl::token::{Token, TokenKind};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Two-state scanner: text spans outside tags, punctuation and words inside.
struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
    tokens: Vec<Token>,
}

impl<'a> Tokenizer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, TokenizeError> {
        while self.pos < self.src.len() {
            if self.rest().starts_with(OPEN) {
                self.scan_tag()?;
            } else {
                self.scan_text();
            }
        }
        self.tokens.push(Token::symbol(TokenKind::Eof, self.src.len()));
        Ok(self.tokens)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn scan_text(&mut self) {
        let start = self.pos;
        let end = self
            .rest()
            .find(OPEN)
            .map_or(self.src.len(), |offset| start + offset);
        if end > start {
            self.tokens.push(Token::Text {
                value: self.src[start..end].to_string(),
                position: start,
            });
        }
        self.pos = end;
    }

    fn scan_tag(&mut self) -> Result<(), TokenizeError> {
        let tag_start = self.pos;
        self.tokens.push(Token::symbol(TokenKind::OpenTag, tag_start));
        self.pos += OPEN.len();

        while let Some(c) = self.rest().chars().next() {
            if self.rest().starts_with(CLOSE) {
                self.tokens.push(Token::symbol(TokenKind::CloseTag, self.pos));
                self.pos += CLOSE.len();
                return Ok(());
            }

            if c.is_whitespace() {
                self.pos += c.len_utf8();
                continue;
            }

            // `|>` is kept as two adjacent tokens; the parser pairs them.
            if c == '|' && self.rest().as_bytes().get(1) == Some(&b'>') {
                self.tokens.push(Token::symbol(TokenKind::Pipe, self.pos));
                self.tokens.push(Token::symbol(TokenKind::GreaterThan, self.pos + 1));
                self.pos += 2;
                continue;
            }

            if c == '#' {
                self.scan_block_keyword()?;
                continue;
            }

            if let Some(kind) = TokenKind::punctuation(c) {
                self.tokens.push(Token::symbol(kind, self.pos));
                self.pos += 1;
                continue;
            }

            if is_ident_start(c) {
                let (start, word) = self.scan_word();
                self.tokens.push(match TokenKind::keyword(word) {
                    Some(kind) => Token::symbol(kind, start),
                    None => Token::Identifier {
                        value: word.to_string(),
                        position: start,
                    },
                });
                continue;
            }

            return Err(TokenizeError::UnexpectedCharacter {
                character: c,
                position: self.pos,
            });
        }

        Err(TokenizeError::UnclosedTag {
            position: tag_start,
        })
    }

    /// `#` must be immediately followed by a reserved keyword.
    fn scan_block_keyword(&mut self) -> Result<(), TokenizeError> {
        let hash_at = self.pos;
        self.tokens.push(Token::symbol(TokenKind::Hash, hash_at));
        self.pos += 1;

        let starts_word = self.rest().chars().next().is_some_and(is_ident_start);
        let (start, word) = if starts_word {
            self.scan_word()
        } else {
            (self.pos, "")
        };
        match TokenKind::keyword(word) {
            Some(kind) => {
                self.tokens.push(Token::symbol(kind, start));
                Ok(())
            }
            None => Err(TokenizeError::UnknownKeyword {
                keyword: word.to_string(),
                position: hash_at,
            }),
        }
    }

    fn scan_word(&mut self) -> (usize, &'a str) {
        let start = self.pos;
        let len = self
            .rest()
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
            .count();
        self.pos += len;
        (start, &self.src[start..self.pos])
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

/// Converts template text into position-tagged tokens, always ending in `Eof`.
pub fn tokenize(src: &str) -> Result<Vec<Token>, TokenizeError> {
    Tokenizer::new(src).run()
}
