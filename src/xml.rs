//! The syntax analyzer's XML formats: the flat token listing, and the parse
//! tree with one element per grammar rule and tokens as leaves.

use std::{
    fmt::{self, Write as _},
    io,
};

use crate::{
    lexer::extract,
    token::{Token, TokenClass, TokenKind},
};

/// Writes the `<tokens>` listing of a lexed buffer.
///
/// Trivia, error tokens and the end of input are skipped, so callers should
/// check the buffer with [`crate::lexer::first_error`] first.
pub fn write_tokens(w: &mut impl io::Write, src: &str, tokens: &[Token]) -> io::Result<()> {
    writeln!(w, "<tokens>")?;
    for &token in tokens {
        if let Some(leaf) = Leaf::of(token, src) {
            writeln!(w, "{leaf}")?;
        }
    }
    writeln!(w, "</tokens>")
}

pub fn tokens_string(src: &str, tokens: &[Token]) -> String {
    let mut buf = Vec::with_capacity(tokens.len() * 32);
    write_tokens(&mut buf, src, tokens).expect("writing to a Vec never fails");
    String::from_utf8(buf).expect("token listing is valid UTF-8")
}

/// A grammar rule that gets its own element in the parse tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Rule {
    Class,
    ClassVarDec,
    SubroutineDec,
    ParameterList,
    SubroutineBody,
    VarDec,
    Statements,
    LetStatement,
    IfStatement,
    WhileStatement,
    DoStatement,
    ReturnStatement,
    Expression,
    Term,
    ExpressionList,
}

impl Rule {
    pub fn tag(self) -> &'static str {
        match self {
            Rule::Class => "class",
            Rule::ClassVarDec => "classVarDec",
            Rule::SubroutineDec => "subroutineDec",
            Rule::ParameterList => "parameterList",
            Rule::SubroutineBody => "subroutineBody",
            Rule::VarDec => "varDec",
            Rule::Statements => "statements",
            Rule::LetStatement => "letStatement",
            Rule::IfStatement => "ifStatement",
            Rule::WhileStatement => "whileStatement",
            Rule::DoStatement => "doStatement",
            Rule::ReturnStatement => "returnStatement",
            Rule::Expression => "expression",
            Rule::Term => "term",
            Rule::ExpressionList => "expressionList",
        }
    }
}

const INDENT_WIDTH: usize = 2;

/// Builds the parse tree while the parser runs, without keeping the tree
/// itself: rules are opened and closed around the tokens they consume.
///
/// Every rule element gets its own lines, even when empty.
#[derive(Debug, Default)]
pub struct TreeWriter {
    buf: String,
    depth: usize,
}

impl TreeWriter {
    pub fn open(&mut self, rule: Rule) {
        self.line(format_args!("<{}>", rule.tag()));
        self.depth += 1;
    }

    pub fn close(&mut self, rule: Rule) {
        debug_assert!(self.depth > 0, "closing {rule:?} with no open rule");
        self.depth = self.depth.saturating_sub(1);
        self.line(format_args!("</{}>", rule.tag()));
    }

    /// Writes `token` as a leaf of the innermost open rule. Trivia and error
    /// tokens are skipped.
    pub fn token(&mut self, token: Token, src: &str) {
        if let Some(leaf) = Leaf::of(token, src) {
            self.line(leaf);
        }
    }

    pub fn finish(self) -> String {
        self.buf
    }

    fn line(&mut self, content: impl fmt::Display) {
        // Formatting into a `String` cannot fail.
        let _ = writeln!(self.buf, "{:width$}{content}", "", width = self.depth * INDENT_WIDTH);
    }
}

/// A significant token as an element, `<tag> lexeme </tag>`.
struct Leaf<'src> {
    tag: &'static str,
    lexeme: &'src str,
}

impl<'src> Leaf<'src> {
    fn of(token: Token, src: &'src str) -> Option<Leaf<'src>> {
        let tag = tag(token.kind.class()?);
        let lexeme = match token.kind {
            TokenKind::StringConst => extract::string(token, src),
            _ => token.lexeme(src),
        };
        Some(Leaf { tag, lexeme })
    }
}

impl fmt::Display for Leaf<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.tag;
        write!(f, "<{tag}> {} </{tag}>", Escaped(self.lexeme))
    }
}

fn tag(class: TokenClass) -> &'static str {
    match class {
        TokenClass::Keyword => "keyword",
        TokenClass::Symbol => "symbol",
        TokenClass::Identifier => "identifier",
        TokenClass::IntConst => "integerConstant",
        TokenClass::StringConst => "stringConstant",
    }
}

struct Escaped<'a>(&'a str);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            match c {
                '<' => f.write_str("&lt;")?,
                '>' => f.write_str("&gt;")?,
                '"' => f.write_str("&quot;")?,
                '&' => f.write_str("&amp;")?,
                c => write!(f, "{c}")?,
            }
        }
        Ok(())
    }
}
