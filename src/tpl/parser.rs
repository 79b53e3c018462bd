use crate::error::{CompileError, ParseError};
use crate::tpl::ast::{Accessor, Ast, AstNode, PartialName};
use crate::tpl::token::{Token, TokenKind};
use crate::tpl::tokenizer::tokenize;

/// Recursive-descent parser with one token of look-ahead and no recovery.
struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    eof: Token,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        let end = tokens.last().map_or(0, Token::position);
        Self {
            tokens,
            pos: 0,
            eof: Token::symbol(TokenKind::Eof, end),
        }
    }

    fn parse(mut self) -> Result<Ast, ParseError> {
        self.parse_until(&[], "template")
    }

    /// Collects segments until an open tag whose next token is one of `stops`.
    /// The stop tag itself is left for the caller to consume.
    fn parse_until(&mut self, stops: &[TokenKind], construct: &'static str) -> Result<Ast, ParseError> {
        let mut ast = Ast::new();
        loop {
            match self.peek().kind() {
                TokenKind::Eof => {
                    if stops.is_empty() {
                        return Ok(ast);
                    }
                    return Err(ParseError::MissingClosingTag {
                        construct,
                        position: self.peek().position(),
                    });
                }
                TokenKind::Text => {
                    if let Some(text) = self.advance().value() {
                        ast.push(AstNode::Text(text.to_string()));
                    }
                }
                TokenKind::OpenTag => {
                    if stops.contains(&self.peek_next().kind()) {
                        return Ok(ast);
                    }
                    ast.push(self.parse_tag()?);
                }
                _ => return Err(self.expected(TokenKind::OpenTag, "Expected '{{' or text.")),
            }
        }
    }

    fn parse_tag(&mut self) -> Result<AstNode, ParseError> {
        self.consume(TokenKind::OpenTag, "Expected '{{'.")?;

        if self.matches(TokenKind::GreaterThan) {
            return self.parse_partial();
        }

        if self.matches(TokenKind::Hash) {
            let keyword = self.peek().clone();
            return match keyword.kind() {
                TokenKind::If => {
                    self.advance();
                    self.parse_if()
                }
                TokenKind::Each => {
                    self.advance();
                    self.parse_each()
                }
                TokenKind::Partial => {
                    self.advance();
                    self.parse_partial_block()
                }
                other => Err(ParseError::UnknownBlockKeyword {
                    keyword: other,
                    position: keyword.position(),
                }),
            };
        }

        let escaped = !self.matches(TokenKind::Ampersand);
        let expr = self.parse_accessor()?;
        self.consume(TokenKind::CloseTag, "Expected '}}' after expression.")?;
        Ok(AstNode::Interpolation { expr, escaped })
    }

    fn parse_if(&mut self) -> Result<AstNode, ParseError> {
        let condition = self.parse_accessor()?;
        self.consume(TokenKind::CloseTag, "Expected '}}' after if condition.")?;
        let then = self.parse_until(&[TokenKind::Else, TokenKind::Slash], "if")?;

        let mut otherwise = None;
        if self.peek_next().kind() == TokenKind::Else {
            self.consume(TokenKind::OpenTag, "Expected '{{'.")?;
            self.consume(TokenKind::Else, "Expected 'else'.")?;
            self.consume(TokenKind::CloseTag, "Expected '}}' after else.")?;
            otherwise = Some(self.parse_until(&[TokenKind::Slash], "if")?);
        }

        self.close_block(TokenKind::If)?;
        Ok(AstNode::If {
            condition,
            then,
            otherwise,
        })
    }

    fn parse_each(&mut self) -> Result<AstNode, ParseError> {
        let items = self.parse_accessor()?;
        self.consume(TokenKind::As, "Expected 'as' in each block.")?;
        self.consume(TokenKind::Pipe, "Expected '|' after 'as'.")?;
        let item = self.identifier("Expected item name.")?;
        let index = if self.matches(TokenKind::Comma) {
            Some(self.identifier("Expected index name.")?)
        } else {
            None
        };
        self.consume(TokenKind::Pipe, "Expected '|' to close item binding.")?;
        self.consume(TokenKind::CloseTag, "Expected '}}' to close each block.")?;
        let body = self.parse_until(&[TokenKind::Slash], "each")?;
        self.close_block(TokenKind::Each)?;
        Ok(AstNode::Each {
            items,
            item,
            index,
            body,
        })
    }

    fn close_block(&mut self, keyword: TokenKind) -> Result<(), ParseError> {
        self.consume(TokenKind::OpenTag, "Expected '{{'.")?;
        self.consume(TokenKind::Slash, "Expected '/'.")?;
        self.consume(keyword, "Mismatched closing tag.")?;
        self.consume(TokenKind::CloseTag, "Expected '}}'.")?;
        Ok(())
    }

    /// `{{> name.path }}` or `{{> (expr) }}`
    fn parse_partial(&mut self) -> Result<AstNode, ParseError> {
        let name = if self.matches(TokenKind::OpenParen) {
            let expr = self.parse_accessor()?;
            self.consume(TokenKind::CloseParen, "Expected ')' after dynamic partial name.")?;
            PartialName::Dynamic(expr)
        } else if self.check(TokenKind::Identifier) {
            let mut segments = vec![self.identifier("Expected a partial name.")?];
            while self.matches(TokenKind::Dot) {
                segments.push(self.identifier("Expected identifier.")?);
            }
            PartialName::Static(segments.join("."))
        } else {
            return Err(self.expected(
                TokenKind::Identifier,
                "Expected a partial name or a dynamic expression.",
            ));
        };
        self.consume(TokenKind::CloseTag, "Expected '}}'.")?;
        Ok(AstNode::Partial { name, params: None })
    }

    /// `{{#partial name with a=expr, b=expr }}`
    fn parse_partial_block(&mut self) -> Result<AstNode, ParseError> {
        let mut segments = vec![self.identifier("Expected a partial name.")?];
        while self.matches(TokenKind::Dot) {
            segments.push(self.identifier("Expected identifier.")?);
        }
        let name = segments.join(".");
        let mut params = None;
        if self.matches(TokenKind::With) {
            let mut list = Vec::new();
            loop {
                let key = self.identifier("Expected parameter name.")?;
                self.consume(TokenKind::Equals, "Expected '=' after parameter name.")?;
                list.push((key, self.parse_accessor()?));
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
            params = Some(list);
        }
        self.consume(TokenKind::CloseTag, "Expected '}}'.")?;
        Ok(AstNode::Partial {
            name: PartialName::Static(name),
            params,
        })
    }

    fn parse_accessor(&mut self) -> Result<Accessor, ParseError> {
        let mut path = vec![self.identifier("Expected identifier.")?];
        while self.matches(TokenKind::Dot) {
            path.push(self.identifier("Expected identifier.")?);
        }
        let mut pipes = Vec::new();
        while self.matches(TokenKind::Pipe) {
            self.consume(TokenKind::GreaterThan, "Expected '>' after '|'.")?;
            pipes.push(self.identifier("Expected pipe name.")?);
        }
        Ok(Accessor::new(path, pipes))
    }

    fn identifier(&mut self, message: &'static str) -> Result<String, ParseError> {
        let token = self.consume(TokenKind::Identifier, message)?;
        Ok(token.value().unwrap_or_default().to_string())
    }

    fn consume(&mut self, kind: TokenKind, message: &'static str) -> Result<&Token, ParseError> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        Err(self.expected(kind, message))
    }

    fn expected(&self, expected: TokenKind, message: &'static str) -> ParseError {
        let found = self.peek();
        ParseError::ExpectedToken {
            expected,
            found: found.kind(),
            message,
            position: found.position(),
        }
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }
        false
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind() == kind
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    fn peek_next(&self) -> &Token {
        self.tokens.get(self.pos + 1).unwrap_or(&self.eof)
    }

    fn advance(&mut self) -> &Token {
        let at = self.pos;
        if self.peek().kind() != TokenKind::Eof {
            self.pos += 1;
        }
        self.tokens.get(at).unwrap_or(&self.eof)
    }
}

/// Builds the AST from a token list produced by [`tokenize`].
pub fn parse(tokens: &[Token]) -> Result<Ast, ParseError> {
    Parser::new(tokens).parse()
}

/// Tokenizes and parses in one step.
pub fn parse_template(src: &str) -> Result<Ast, CompileError> {
    let tokens = tokenize(src)?;
    Ok(parse(&tokens)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acc(path: &[&str], pipes: &[&str]) -> Accessor {
        Accessor::new(
            path.iter().map(|s| s.to_string()).collect(),
            pipes.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn parse_err(src: &str) -> ParseError {
        match parse_template(src).unwrap_err() {
            CompileError::Parse(e) => e,
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_simple_text() {
        let nodes = parse_template("hello world").unwrap();
        assert_eq!(nodes, vec![AstNode::Text("hello world".into())]);
    }

    #[test]
    fn test_parse_interpolation_with_pipes() {
        let nodes = parse_template("Hi {{ user.name |> lower |> capitalize }}!").unwrap();
        assert_eq!(
            nodes,
            vec![
                AstNode::Text("Hi ".into()),
                AstNode::Interpolation {
                    expr: acc(&["user", "name"], &["lower", "capitalize"]),
                    escaped: true,
                },
                AstNode::Text("!".into()),
            ]
        );
    }

    #[test]
    fn test_parse_raw_interpolation() {
        let nodes = parse_template("{{& body}}").unwrap();
        assert_eq!(
            nodes,
            vec![AstNode::Interpolation {
                expr: acc(&["body"], &[]),
                escaped: false,
            }]
        );
    }

    #[test]
    fn test_parse_if_else() {
        let nodes = parse_template("{{#if a}}A{{#if b}}B{{/if}}{{else}}C{{/if}}").unwrap();
        assert_eq!(
            nodes,
            vec![AstNode::If {
                condition: acc(&["a"], &[]),
                then: vec![
                    AstNode::Text("A".into()),
                    AstNode::If {
                        condition: acc(&["b"], &[]),
                        then: vec![AstNode::Text("B".into())],
                        otherwise: None,
                    },
                ],
                otherwise: Some(vec![AstNode::Text("C".into())]),
            }]
        );
    }

    #[test]
    fn test_parse_each_with_index() {
        let nodes = parse_template("{{#each users as |u, i|}}{{i}}{{/each}}").unwrap();
        assert_eq!(
            nodes,
            vec![AstNode::Each {
                items: acc(&["users"], &[]),
                item: "u".into(),
                index: Some("i".into()),
                body: vec![AstNode::Interpolation {
                    expr: acc(&["i"], &[]),
                    escaped: true,
                }],
            }]
        );
    }

    #[test]
    fn test_parse_partials() {
        let nodes = parse_template("{{> user.card }}{{> (which) }}").unwrap();
        assert_eq!(
            nodes,
            vec![
                AstNode::Partial {
                    name: PartialName::Static("user.card".into()),
                    params: None,
                },
                AstNode::Partial {
                    name: PartialName::Dynamic(acc(&["which"], &[])),
                    params: None,
                },
            ]
        );
    }

    #[test]
    fn test_parse_partial_block_params() {
        let nodes = parse_template("{{#partial card with user=u.profile, title=t |> upper}}").unwrap();
        assert_eq!(
            nodes,
            vec![AstNode::Partial {
                name: PartialName::Static("card".into()),
                params: Some(vec![
                    ("user".into(), acc(&["u", "profile"], &[])),
                    ("title".into(), acc(&["t"], &["upper"])),
                ]),
            }]
        );
    }

    #[test]
    fn test_missing_closing_tag() {
        let src = "{{#if a}}never closed";
        let err = parse_err(src);
        assert_eq!(
            err,
            ParseError::MissingClosingTag {
                construct: "if",
                position: src.len()
            }
        );

        let err = parse_err("{{#each xs as |x|}}{{x}}");
        assert!(matches!(err, ParseError::MissingClosingTag { construct: "each", .. }));
    }

    #[test]
    fn test_mismatched_closing_tag() {
        let err = parse_err("{{#if a}}x{{/each}}");
        assert!(matches!(
            err,
            ParseError::ExpectedToken {
                expected: TokenKind::If,
                found: TokenKind::Each,
                position: 13,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_block_keyword() {
        let err = parse_err("{{#else}}");
        assert_eq!(
            err,
            ParseError::UnknownBlockKeyword {
                keyword: TokenKind::Else,
                position: 3
            }
        );
    }

    #[test]
    fn test_pipe_requires_greater_than() {
        let err = parse_err("{{ a | b }}");
        assert!(matches!(
            err,
            ParseError::ExpectedToken {
                expected: TokenKind::GreaterThan,
                position: 7,
                ..
            }
        ));
    }

    #[test]
    fn test_each_requires_binding() {
        let err = parse_err("{{#each xs}}{{/each}}");
        assert!(matches!(
            err,
            ParseError::ExpectedToken {
                expected: TokenKind::As,
                found: TokenKind::CloseTag,
                ..
            }
        ));
    }

    #[test]
    fn test_stray_else_at_top_level() {
        let err = parse_err("a{{else}}b");
        assert!(matches!(
            err,
            ParseError::ExpectedToken {
                expected: TokenKind::Identifier,
                found: TokenKind::Else,
                position: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_empty_template() {
        assert_eq!(parse_template("").unwrap(), Ast::new());
    }
}
