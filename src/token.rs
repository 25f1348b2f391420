use std::{fmt, ops::Range};

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    lo: usize,
    len: u32,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Token {
        Token {
            kind,
            lo: span.lo,
            len: span.len,
        }
    }

    /// Returns a synthetic end-of-input token positioned at the end of `src`.
    pub fn eof_for(src: &str) -> Token {
        Token::new(TokenKind::Eof, Span::new_of_length(src.len(), 0))
    }

    pub fn span(&self) -> Span {
        Span {
            len: self.len,
            lo: self.lo,
        }
    }

    /// The source text this token was lexed from.
    pub fn lexeme<'src>(&self, src: &'src str) -> &'src str {
        self.span().substr(src)
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?}, {})", self.kind, self.span())
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Span {
    pub len: u32,
    pub lo: usize,
}

impl Span {
    pub fn new_of_bounds(Range { start: lo, end: hi }: Range<usize>) -> Span {
        debug_assert!(hi >= lo);
        let len = u32::try_from(hi - lo).unwrap_or(u32::MAX);
        Self::new_of_length(lo, len)
    }

    pub fn new_of_length(lo: usize, len: u32) -> Span {
        Span { len, lo }
    }

    pub fn hi(&self) -> usize {
        self.lo + self.len as usize
    }

    pub fn substr<'src>(&self, src: &'src str) -> &'src str {
        &src[self.lo..self.hi()]
    }

    /// Shrinks (or grows) both ends of the span by the given amounts.
    pub fn offset(&self, lo: isize, hi: isize) -> Span {
        let new_lo = self.lo.saturating_add_signed(lo);
        let new_hi = self.hi().saturating_add_signed(hi);
        Span::new_of_bounds(new_lo..new_hi.max(new_lo))
    }

    /// Returns the span covering both `self` and `other`.
    pub fn to(&self, other: Span) -> Span {
        Span::new_of_bounds(self.lo.min(other.lo)..self.hi().max(other.hi()))
    }

    pub fn wrap<T>(self, inner: T) -> Spanned<T> {
        Spanned { span: self, inner }
    }

    /// Returns the one-based line and column of the start of this span.
    pub fn line_col(&self, src: &str) -> (usize, usize) {
        let before = &src[..self.lo.min(src.len())];
        let line = before.matches('\n').count() + 1;
        let col = match before.rfind('\n') {
            Some(nl) => before[nl + 1..].chars().count() + 1,
            None => before.chars().count() + 1,
        };
        (line, col)
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span({self}, len: {})", self.len)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lo = self.lo;
        let hi = self.hi();
        write!(f, "{lo}..{hi}")
    }
}

/// A value tagged with the source region it refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub span: Span,
    pub inner: T,
}

impl<T> fmt::Display for Spanned<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "{}: ", self.span)?;
        }
        write!(f, "{}", self.inner)
    }
}

impl<T> std::error::Error for Spanned<T> where T: std::error::Error {}

/// The five lexical categories a significant token may belong to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TokenClass {
    Keyword,
    Symbol,
    Identifier,
    IntConst,
    StringConst,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Class,
    Constructor,
    Function,
    Method,
    Field,
    Static,
    Var,
    Int,
    Char,
    Boolean,
    Void,
    True,
    False,
    Null,
    This,
    Let,
    Do,
    If,
    Else,
    While,
    Return,

    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Comma,
    Semicolon,
    Plus,
    Minus,
    Star,
    Slash,
    Amp,
    Pipe,
    Less,
    Greater,
    Eq,
    Tilde,
    /// Shift left, as a prefix operator.
    ///
    /// `^`
    Caret,
    /// Shift right, as a prefix operator.
    ///
    /// `#`
    Hash,

    Identifier,
    /// A decimal literal already checked to fit in `0..=32767`.
    IntConst,
    /// A double-quoted literal. The span includes both quotes.
    StringConst,

    Whitespace,
    LineComment,
    BlockComment,

    Eof,

    ErrorUnexpectedChar,
    ErrorUnclosedString,
    ErrorUnclosedComment,
    ErrorIntOutOfRange,
}

impl TokenKind {
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace | TokenKind::LineComment | TokenKind::BlockComment
        )
    }

    pub fn is_error(self) -> bool {
        matches!(
            self,
            TokenKind::ErrorUnexpectedChar
                | TokenKind::ErrorUnclosedString
                | TokenKind::ErrorUnclosedComment
                | TokenKind::ErrorIntOutOfRange
        )
    }

    /// Returns the lexical category, or `None` for trivia, errors and the end
    /// of input.
    pub fn class(self) -> Option<TokenClass> {
        use TokenKind::*;
        let class = match self {
            Class | Constructor | Function | Method | Field | Static | Var | Int | Char
            | Boolean | Void | True | False | Null | This | Let | Do | If | Else | While
            | Return => TokenClass::Keyword,
            LBrace | RBrace | LParen | RParen | LBracket | RBracket | Dot | Comma | Semicolon
            | Plus | Minus | Star | Slash | Amp | Pipe | Less | Greater | Eq | Tilde | Caret
            | Hash => TokenClass::Symbol,
            Identifier => TokenClass::Identifier,
            IntConst => TokenClass::IntConst,
            StringConst => TokenClass::StringConst,
            Whitespace | LineComment | BlockComment | Eof | ErrorUnexpectedChar
            | ErrorUnclosedString | ErrorUnclosedComment | ErrorIntOutOfRange => return None,
        };
        Some(class)
    }

    /// The fixed spelling of keywords and symbols.
    pub fn fixed_lexeme(self) -> Option<&'static str> {
        use TokenKind::*;
        let s = match self {
            Class => "class",
            Constructor => "constructor",
            Function => "function",
            Method => "method",
            Field => "field",
            Static => "static",
            Var => "var",
            Int => "int",
            Char => "char",
            Boolean => "boolean",
            Void => "void",
            True => "true",
            False => "false",
            Null => "null",
            This => "this",
            Let => "let",
            Do => "do",
            If => "if",
            Else => "else",
            While => "while",
            Return => "return",
            LBrace => "{",
            RBrace => "}",
            LParen => "(",
            RParen => ")",
            LBracket => "[",
            RBracket => "]",
            Dot => ".",
            Comma => ",",
            Semicolon => ";",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Amp => "&",
            Pipe => "|",
            Less => "<",
            Greater => ">",
            Eq => "=",
            Tilde => "~",
            Caret => "^",
            Hash => "#",
            _ => return None,
        };
        Some(s)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(lexeme) = self.fixed_lexeme() {
            return write!(f, "`{lexeme}`");
        }
        let s = match self {
            TokenKind::Identifier => "identifier",
            TokenKind::IntConst => "integer constant",
            TokenKind::StringConst => "string constant",
            TokenKind::Whitespace => "whitespace",
            TokenKind::LineComment | TokenKind::BlockComment => "comment",
            TokenKind::Eof => "end of input",
            _ => "invalid token",
        };
        f.write_str(s)
    }
}

pub static KEYWORDS: phf::Map<&'static str, TokenKind> = phf::phf_map! {
    "class" => TokenKind::Class,
    "constructor" => TokenKind::Constructor,
    "function" => TokenKind::Function,
    "method" => TokenKind::Method,
    "field" => TokenKind::Field,
    "static" => TokenKind::Static,
    "var" => TokenKind::Var,
    "int" => TokenKind::Int,
    "char" => TokenKind::Char,
    "boolean" => TokenKind::Boolean,
    "void" => TokenKind::Void,
    "true" => TokenKind::True,
    "false" => TokenKind::False,
    "null" => TokenKind::Null,
    "this" => TokenKind::This,
    "let" => TokenKind::Let,
    "do" => TokenKind::Do,
    "if" => TokenKind::If,
    "else" => TokenKind::Else,
    "while" => TokenKind::While,
    "return" => TokenKind::Return,
};

/// Single-character symbols. `/` is absent since it may open a comment and is
/// handled by the lexer directly.
pub static SYMBOLS: phf::Map<char, TokenKind> = phf::phf_map! {
    '{' => TokenKind::LBrace,
    '}' => TokenKind::RBrace,
    '(' => TokenKind::LParen,
    ')' => TokenKind::RParen,
    '[' => TokenKind::LBracket,
    ']' => TokenKind::RBracket,
    '.' => TokenKind::Dot,
    ',' => TokenKind::Comma,
    ';' => TokenKind::Semicolon,
    '+' => TokenKind::Plus,
    '-' => TokenKind::Minus,
    '*' => TokenKind::Star,
    '&' => TokenKind::Amp,
    '|' => TokenKind::Pipe,
    '<' => TokenKind::Less,
    '>' => TokenKind::Greater,
    '=' => TokenKind::Eq,
    '~' => TokenKind::Tilde,
    '^' => TokenKind::Caret,
    '#' => TokenKind::Hash,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col() {
        let src = "class A {\n  field int x;\n}";
        let span = Span::new_of_length(12, 5);
        assert_eq!(span.substr(src), "field");
        assert_eq!(span.line_col(src), (2, 3));
        assert_eq!(Span::new_of_length(0, 0).line_col(src), (1, 1));
    }

    #[test]
    fn span_to_and_offset() {
        let a = Span::new_of_bounds(2..4);
        let b = Span::new_of_bounds(7..9);
        assert_eq!(a.to(b), Span::new_of_bounds(2..9));
        assert_eq!(b.to(a), Span::new_of_bounds(2..9));
        assert_eq!(Span::new_of_bounds(3..8).offset(1, -1), Span::new_of_bounds(4..7));
    }

    #[test]
    fn every_keyword_is_classified_as_keyword() {
        for (spelling, kind) in &KEYWORDS {
            assert_eq!(kind.class(), Some(TokenClass::Keyword));
            assert_eq!(kind.fixed_lexeme(), Some(*spelling));
        }
        for (c, kind) in &SYMBOLS {
            assert_eq!(kind.class(), Some(TokenClass::Symbol));
            assert_eq!(kind.fixed_lexeme(), Some(c.to_string().as_str()));
        }
        assert_eq!(TokenKind::Slash.class(), Some(TokenClass::Symbol));
        assert_eq!(TokenKind::Whitespace.class(), None);
    }
}
