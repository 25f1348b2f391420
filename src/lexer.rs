use std::iter::Peekable;

use crate::token::{Span, Spanned, Token, TokenKind, KEYWORDS, SYMBOLS};

pub const SUGGESTED_TOKENS_CAPACITY: usize = 8_192;

/// The largest integer constant the language accepts.
pub const MAX_INT_CONST: u16 = 32_767;

/// Lexes the provided string, producing the tokens into the provided buffer.
///
/// The buffer always ends with a single [`TokenKind::Eof`] token.
pub fn lex(src: &str, tokens: &mut Vec<Token>) {
    Lexer::new(src, tokens).lex();
}

/// A convenience function that allocates a new buffer per lexed input and
/// returns it.
pub fn lex_in_new(src: &str) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(SUGGESTED_TOKENS_CAPACITY);
    lex(src, &mut tokens);
    tokens
}

/// Lexical errors, one per error token kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unexpected character")]
    UnexpectedChar,
    #[error("unclosed string")]
    UnclosedString,
    #[error("unclosed comment")]
    UnclosedComment,
    #[error("integer constant out of range (maximum is {MAX_INT_CONST})")]
    IntOutOfRange,
}

impl Error {
    /// Maps an error token kind to its error. Returns `None` for any other
    /// kind.
    pub fn from_kind(kind: TokenKind) -> Option<Error> {
        let error = match kind {
            TokenKind::ErrorUnexpectedChar => Error::UnexpectedChar,
            TokenKind::ErrorUnclosedString => Error::UnclosedString,
            TokenKind::ErrorUnclosedComment => Error::UnclosedComment,
            TokenKind::ErrorIntOutOfRange => Error::IntOutOfRange,
            _ => return None,
        };
        Some(error)
    }
}

/// Returns the first error token of a lexed buffer, as an error.
pub fn first_error(tokens: &[Token]) -> Option<Spanned<Error>> {
    tokens
        .iter()
        .find_map(|t| Error::from_kind(t.kind).map(|e| t.span().wrap(e)))
}

struct Lexer<'src, 'tok> {
    src: &'src str,
    iter: Peekable<std::str::Chars<'src>>,
    cursor: usize,
    current_lo: usize,
    tokens: &'tok mut Vec<Token>,
}

impl Lexer<'_, '_> {
    /// Scans the source string until the input is exhausted.
    fn lex(mut self) {
        assert_eq!(self.tokens.len(), 0, "must pass clean tokens buffer");
        loop {
            let next = self.scan_token_kind();
            let is_eof = matches!(next, TokenKind::Eof);
            self.produce(next);
            if is_eof {
                break;
            }
        }
    }

    fn scan_token_kind(&mut self) -> TokenKind {
        let Some(c) = self.mark_advance() else {
            return TokenKind::Eof;
        };
        match c {
            '/' => match self.peek() {
                Some('/') => self.line_comment(),
                Some('*') => self.block_comment(),
                _ => TokenKind::Slash,
            },
            '"' => self.string(),
            c if c.is_ascii_alphabetic() || c == '_' => self.identifier_or_keyword(),
            c if c.is_ascii_digit() => self.number(),
            c if c.is_ascii_whitespace() => self.whitespace(),
            c => SYMBOLS
                .get(&c)
                .copied()
                .unwrap_or(TokenKind::ErrorUnexpectedChar),
        }
    }

    /// String contents are taken verbatim: there are no escape sequences, and
    /// neither a quote nor a line break may appear inside.
    fn string(&mut self) -> TokenKind {
        loop {
            match self.peek() {
                Some('"') => return self.advance_with(TokenKind::StringConst),
                Some('\n') | None => return TokenKind::ErrorUnclosedString,
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    fn identifier_or_keyword(&mut self) -> TokenKind {
        self.advance_while(|c| c.is_ascii_alphanumeric() || c == '_');
        KEYWORDS
            .get(self.substr())
            .copied()
            .unwrap_or(TokenKind::Identifier)
    }

    fn number(&mut self) -> TokenKind {
        self.advance_while(|c| c.is_ascii_digit());
        match self.substr().parse::<u16>() {
            Ok(n) if n <= MAX_INT_CONST => TokenKind::IntConst,
            _ => TokenKind::ErrorIntOutOfRange,
        }
    }

    fn whitespace(&mut self) -> TokenKind {
        self.advance_while(|c| c.is_ascii_whitespace());
        TokenKind::Whitespace
    }

    fn line_comment(&mut self) -> TokenKind {
        assert_eq!(self.advance(), Some('/'));
        self.advance_while(|c| c != '\n');
        TokenKind::LineComment
    }

    /// Also covers documentation comments (`/** ... */`).
    fn block_comment(&mut self) -> TokenKind {
        assert_eq!(self.advance(), Some('*'));
        loop {
            match self.advance() {
                Some('*') => (),
                Some(_) => continue,
                None => return TokenKind::ErrorUnclosedComment,
            }
            // Runs of stars (`**/`) must still close the comment.
            self.advance_while(|c| c == '*');
            match self.advance() {
                Some('/') => break,
                Some(_) => continue,
                None => return TokenKind::ErrorUnclosedComment,
            }
        }
        TokenKind::BlockComment
    }
}

impl Lexer<'_, '_> {
    fn new<'src, 'tok>(src: &'src str, tokens: &'tok mut Vec<Token>) -> Lexer<'src, 'tok> {
        Lexer {
            src,
            iter: src.chars().peekable(),
            cursor: 0,
            current_lo: 0,
            tokens,
        }
    }

    /// Starts a new token "mark" and advances the iterator.
    fn mark_advance(&mut self) -> Option<char> {
        self.current_lo = self.cursor;
        self.advance()
    }

    /// Returns the next char and advances the iterator. Returns `None` only
    /// once the input is exhausted.
    fn advance(&mut self) -> Option<char> {
        self.iter
            .next()
            .inspect(|c| self.cursor += c.len_utf8())
    }

    fn advance_with<T>(&mut self, value: T) -> T {
        self.advance();
        value
    }

    /// Advances while the next char satisfies `pred`, stopping at the end of
    /// input.
    fn advance_while(&mut self, mut pred: impl FnMut(char) -> bool) {
        while self.peek().is_some_and(&mut pred) {
            self.advance();
        }
    }

    /// Returns the next char without advancing the iterator.
    fn peek(&mut self) -> Option<char> {
        self.iter.peek().copied()
    }

    fn span(&self) -> Span {
        Span::new_of_bounds(self.current_lo..self.cursor)
    }

    fn substr(&self) -> &str {
        self.span().substr(self.src)
    }

    fn produce(&mut self, kind: TokenKind) {
        let span = self.span();
        self.tokens.push(Token::new(kind, span));
    }
}

/// Reads token values back out of the source.
pub mod extract {
    use super::*;

    pub fn int(token: Token, src: &str) -> u16 {
        debug_assert_eq!(token.kind, TokenKind::IntConst);
        // The lexer only produces `IntConst` for in-range literals.
        token.lexeme(src).parse().unwrap_or(MAX_INT_CONST)
    }

    pub fn ident(token: Token, src: &str) -> &str {
        debug_assert_eq!(token.kind, TokenKind::Identifier);
        token.lexeme(src)
    }

    /// Returns the string contents, without the surrounding quotes.
    pub fn string(token: Token, src: &str) -> &str {
        debug_assert_eq!(token.kind, TokenKind::StringConst);
        token.span().offset(1, -1).substr(src)
    }
}
