// class          ::= 'class' ID '{' classVarDec* subroutineDec* '}'
// classVarDec    ::= ('static' | 'field') type ID (',' ID)* ';'
// type           ::= 'int' | 'char' | 'boolean' | ID
// subroutineDec  ::= ('constructor' | 'function' | 'method') ('void' | type) ID
//                    '(' [type ID (',' type ID)*] ')' subroutineBody
// subroutineBody ::= '{' varDec* statement* '}'
// varDec         ::= 'var' type ID (',' ID)* ';'
// statement      ::= 'let' ID ['[' expr ']'] '=' expr ';'
//                  | 'if' '(' expr ')' '{' statement* '}' ['else' '{' statement* '}']
//                  | 'while' '(' expr ')' '{' statement* '}'
//                  | 'do' call ';'
//                  | 'return' [expr] ';'
// expr           ::= term (op term)*
// term           ::= INT | STRING | 'true' | 'false' | 'null' | 'this'
//                  | ID | ID '[' expr ']' | call | '(' expr ')' | unaryOp term
// call           ::= ID '(' [expr (',' expr)*] ')'
//                  | ID '.' ID '(' [expr (',' expr)*] ')'
// op             ::= '+' | '-' | '*' | '/' | '&' | '|' | '<' | '>' | '='
// unaryOp        ::= '-' | '~' | '^' | '#'
//
// There is no operator precedence: binary operators associate to the left in
// source order.

use log::{debug, trace};

use crate::{
    lexer::{self, extract, MAX_INT_CONST},
    symbol_table::{DefineError, Entry, Kind, SymbolTable},
    token::{Spanned, Token, TokenKind},
    types::{runtime, Type},
    util::intern::{Interner, Symbol},
    vm::{self, ArithmeticOp, Emitter, Instruction, Label, LabelKind, Segment},
    xml::{Rule, TreeWriter},
};

type Result<T, E = Spanned<Error>> = std::result::Result<T, E>;

/// On failure, carries every instruction emitted before the error alongside
/// the error itself.
pub type CompileResult = Result<Vec<Instruction>, (Vec<Instruction>, Spanned<Error>)>;

/// The compiled code and the rendered parse tree.
pub type TreeResult = Result<(Vec<Instruction>, String), (Vec<Instruction>, Spanned<Error>)>;

/// Compiles a single class, lexing `src` into the provided (empty) tokens
/// buffer.
///
/// The interner may be shared across compilation units.
pub fn compile(src: &str, tokens: &mut Vec<Token>, interner: &mut Interner) -> CompileResult {
    let (result, code, _) = run(src, tokens, interner, None);
    match result {
        Ok(()) => Ok(code),
        Err(error) => Err((code, error)),
    }
}

/// Like [`compile`], but also renders the parse tree in the syntax analyzer's
/// XML format, within the same pass.
pub fn compile_with_tree(
    src: &str,
    tokens: &mut Vec<Token>,
    interner: &mut Interner,
) -> TreeResult {
    let (result, code, tree) = run(src, tokens, interner, Some(TreeWriter::default()));
    match result {
        Ok(()) => Ok((code, tree.unwrap_or_default())),
        Err(error) => Err((code, error)),
    }
}

fn run(
    src: &str,
    tokens: &mut Vec<Token>,
    interner: &mut Interner,
    tree: Option<TreeWriter>,
) -> (Result<()>, Vec<Instruction>, Option<String>) {
    assert!(tokens.is_empty(), "must pass clean tokens buffer");
    lexer::lex(src, tokens);

    let mut c = Compiler::new(src, tokens, interner, tree);
    let result = c.compile_unit();
    (result, c.emitter.finish(), c.tree.map(TreeWriter::finish))
}

/// A convenience function that allocates fresh buffers for a single unit.
pub fn compile_in_new(src: &str) -> CompileResult {
    let mut tokens = Vec::with_capacity(lexer::SUGGESTED_TOKENS_CAPACITY);
    let mut interner = Interner::with_capacity(128);
    compile(src, &mut tokens, &mut interner)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SubroutineKind {
    Constructor,
    Function,
    Method,
}

enum BinaryOp {
    Arithmetic(ArithmeticOp),
    /// Operators without a VM instruction, lowered to a two-argument call.
    Call(&'static str),
}

struct Compiler<'src, 'tok, 'ident> {
    src: &'src str,
    tokens: &'tok [Token],
    interner: &'ident mut Interner,
    cursor: usize,
    symbols: SymbolTable,
    emitter: Emitter,
    class_name: String,
    subroutine_kind: SubroutineKind,
    /// Never reset within a unit, so labels are unique class-wide.
    labels: u32,
    tree: Option<TreeWriter>,
}

impl Compiler<'_, '_, '_> {
    fn compile_unit(&mut self) -> Result<()> {
        self.compile_class()?;
        let next = self.peek();
        if next.is_eof() {
            Ok(())
        } else {
            Err(self.error_at(next, Error::TrailingInput { actual: next.kind }))
        }
    }

    fn compile_class(&mut self) -> Result<()> {
        self.open(Rule::Class);
        self.consume(TokenKind::Class)?;
        let (name, _) = self.consume_ident()?;
        self.class_name = self.interner.get(name).to_owned();
        self.consume(TokenKind::LBrace)?;

        while matches!(self.peek().kind, TokenKind::Static | TokenKind::Field) {
            self.compile_class_var_dec()?;
        }
        while self.except([TokenKind::RBrace]) {
            self.compile_subroutine()?;
        }

        self.consume(TokenKind::RBrace)?;
        self.close(Rule::Class);
        Ok(())
    }

    fn compile_class_var_dec(&mut self) -> Result<()> {
        self.open(Rule::ClassVarDec);
        let kind = match self.consume_any(&[TokenKind::Static, TokenKind::Field])?.kind {
            TokenKind::Static => Kind::Static,
            TokenKind::Field => Kind::Field,
            _ => unreachable!(),
        };
        let ty = self.parse_type()?;
        self.define_names(ty, kind)?;
        self.consume(TokenKind::Semicolon)?;
        self.close(Rule::ClassVarDec);
        Ok(())
    }

    fn compile_subroutine(&mut self) -> Result<()> {
        const KINDS: &[TokenKind] = &[
            TokenKind::Constructor,
            TokenKind::Function,
            TokenKind::Method,
        ];

        self.symbols.start_subroutine();
        self.open(Rule::SubroutineDec);
        self.subroutine_kind = match self.consume_any(KINDS)?.kind {
            TokenKind::Constructor => SubroutineKind::Constructor,
            TokenKind::Function => SubroutineKind::Function,
            TokenKind::Method => SubroutineKind::Method,
            _ => unreachable!(),
        };
        if !self.take(TokenKind::Void) {
            self.parse_type()?;
        }
        let (name, token) = self.consume_ident()?;
        let qualified = format!("{}.{}", self.class_name, self.interner.get(name));

        self.consume(TokenKind::LParen)?;
        if self.subroutine_kind == SubroutineKind::Method {
            self.symbols
                .reserve(Kind::Arg)
                .ok_or_else(|| token.span().wrap(Error::TooManyVariables { kind: Kind::Arg }))?;
        }
        self.compile_parameter_list()?;
        self.consume(TokenKind::RParen)?;

        self.compile_subroutine_body(&qualified)?;
        self.close(Rule::SubroutineDec);
        debug!("compiled {:?} {qualified}", self.subroutine_kind);
        Ok(())
    }

    fn compile_parameter_list(&mut self) -> Result<()> {
        self.open(Rule::ParameterList);
        if !self.is(TokenKind::RParen) {
            loop {
                let ty = self.parse_type()?;
                let (name, token) = self.consume_ident()?;
                self.define(name, token, ty, Kind::Arg)?;
                if !self.take(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.close(Rule::ParameterList);
        Ok(())
    }

    /// The `function` instruction can only be emitted once every local is
    /// declared, so the receiver setup and the statements follow it.
    fn compile_subroutine_body(&mut self, qualified: &str) -> Result<()> {
        self.open(Rule::SubroutineBody);
        self.consume(TokenKind::LBrace)?;
        while self.is(TokenKind::Var) {
            self.compile_var_dec()?;
        }

        let locals = self.symbols.var_count(Kind::Var);
        self.emitter.function(qualified, locals);
        match self.subroutine_kind {
            SubroutineKind::Constructor => {
                let fields = self.symbols.var_count(Kind::Field);
                self.emitter.push(Segment::Constant, fields);
                self.emitter.call(runtime::MEMORY_ALLOC, 1);
                self.emitter.pop(Segment::Pointer, vm::RECEIVER);
            }
            SubroutineKind::Method => {
                self.emitter.push(Segment::Argument, 0);
                self.emitter.pop(Segment::Pointer, vm::RECEIVER);
            }
            SubroutineKind::Function => {}
        }

        self.compile_statements()?;
        self.consume(TokenKind::RBrace)?;
        self.close(Rule::SubroutineBody);
        Ok(())
    }

    fn compile_var_dec(&mut self) -> Result<()> {
        self.open(Rule::VarDec);
        self.consume(TokenKind::Var)?;
        let ty = self.parse_type()?;
        self.define_names(ty, Kind::Var)?;
        self.consume(TokenKind::Semicolon)?;
        self.close(Rule::VarDec);
        Ok(())
    }

    /// Compiles statements up to (but not including) the closing brace.
    fn compile_statements(&mut self) -> Result<()> {
        self.open(Rule::Statements);
        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::Let => self.compile_let()?,
                TokenKind::If => self.compile_if()?,
                TokenKind::While => self.compile_while()?,
                TokenKind::Do => self.compile_do()?,
                TokenKind::Return => self.compile_return()?,
                TokenKind::RBrace => break,
                actual => return Err(self.error_at(token, Error::ExpectedStatement { actual })),
            }
        }
        self.close(Rule::Statements);
        Ok(())
    }

    fn compile_let(&mut self) -> Result<()> {
        self.open(Rule::LetStatement);
        self.consume(TokenKind::Let)?;
        let (name, token) = self.consume_ident()?;
        let target = self.lookup(name, token)?;
        let segment = target.kind.segment();

        if self.take(TokenKind::LBracket) {
            self.emitter.push(segment, target.index);
            self.compile_expression()?;
            self.consume(TokenKind::RBracket)?;
            self.emitter.arithmetic(ArithmeticOp::Add);

            self.consume(TokenKind::Eq)?;
            self.compile_expression()?;

            // The value may itself have used the alias, so the address is
            // only moved into it after the value is computed.
            self.emitter.pop(Segment::Temp, 0);
            self.emitter.pop(Segment::Pointer, vm::ALIAS);
            self.emitter.push(Segment::Temp, 0);
            self.emitter.pop(Segment::That, 0);
        } else {
            self.consume(TokenKind::Eq)?;
            self.compile_expression()?;
            self.emitter.pop(segment, target.index);
        }

        self.consume(TokenKind::Semicolon)?;
        self.close(Rule::LetStatement);
        Ok(())
    }

    fn compile_if(&mut self) -> Result<()> {
        self.open(Rule::IfStatement);
        self.consume(TokenKind::If)?;
        let (else_label, end_label) = self.label_pair(LabelKind::IfElse, LabelKind::IfEnd);

        self.compile_condition()?;
        self.emitter.arithmetic(ArithmeticOp::Not);
        self.emitter.if_goto(else_label);
        self.compile_block()?;

        if self.take(TokenKind::Else) {
            self.emitter.goto(end_label);
            self.emitter.label(else_label);
            self.compile_block()?;
        } else {
            self.emitter.label(else_label);
        }
        self.emitter.label(end_label);
        self.close(Rule::IfStatement);
        Ok(())
    }

    fn compile_while(&mut self) -> Result<()> {
        self.open(Rule::WhileStatement);
        self.consume(TokenKind::While)?;
        let (exp_label, end_label) = self.label_pair(LabelKind::WhileExp, LabelKind::WhileEnd);

        self.emitter.label(exp_label);
        self.compile_condition()?;
        self.emitter.arithmetic(ArithmeticOp::Not);
        self.emitter.if_goto(end_label);
        self.compile_block()?;
        self.emitter.goto(exp_label);
        self.emitter.label(end_label);
        self.close(Rule::WhileStatement);
        Ok(())
    }

    /// `'(' expr ')'`
    fn compile_condition(&mut self) -> Result<()> {
        self.consume(TokenKind::LParen)?;
        self.compile_expression()?;
        self.consume(TokenKind::RParen)?;
        Ok(())
    }

    /// `'{' statement* '}'`
    fn compile_block(&mut self) -> Result<()> {
        self.consume(TokenKind::LBrace)?;
        self.compile_statements()?;
        self.consume(TokenKind::RBrace)?;
        Ok(())
    }

    fn compile_do(&mut self) -> Result<()> {
        self.open(Rule::DoStatement);
        self.consume(TokenKind::Do)?;
        let (name, token) = self.consume_ident()?;
        self.compile_subroutine_call(name, token)?;
        // Every call leaves a value behind, even for void subroutines.
        self.emitter.pop(Segment::Temp, 0);
        self.consume(TokenKind::Semicolon)?;
        self.close(Rule::DoStatement);
        Ok(())
    }

    fn compile_return(&mut self) -> Result<()> {
        self.open(Rule::ReturnStatement);
        self.consume(TokenKind::Return)?;
        if self.is(TokenKind::Semicolon) {
            match self.subroutine_kind {
                SubroutineKind::Constructor => {
                    self.emitter.push(Segment::Pointer, vm::RECEIVER);
                }
                SubroutineKind::Function | SubroutineKind::Method => {
                    self.emitter.push(Segment::Constant, 0);
                }
            }
        } else {
            self.compile_expression()?;
        }
        self.consume(TokenKind::Semicolon)?;
        self.emitter.ret();
        self.close(Rule::ReturnStatement);
        Ok(())
    }

    fn compile_expression(&mut self) -> Result<()> {
        self.open(Rule::Expression);
        self.compile_term()?;
        while let Some(op) = Self::binary_op(self.peek().kind) {
            self.advance();
            self.compile_term()?;
            match op {
                BinaryOp::Arithmetic(op) => self.emitter.arithmetic(op),
                BinaryOp::Call(name) => self.emitter.call(name, 2),
            }
        }
        self.close(Rule::Expression);
        Ok(())
    }

    fn compile_term(&mut self) -> Result<()> {
        self.open(Rule::Term);
        let token = self.advance();
        match token.kind {
            TokenKind::IntConst => {
                let value = extract::int(token, self.src);
                self.emitter.push(Segment::Constant, value);
            }
            TokenKind::StringConst => self.compile_string(token)?,
            TokenKind::True => {
                self.emitter.push(Segment::Constant, 0);
                self.emitter.arithmetic(ArithmeticOp::Not);
            }
            TokenKind::False | TokenKind::Null => self.emitter.push(Segment::Constant, 0),
            TokenKind::This => self.emitter.push(Segment::Pointer, vm::RECEIVER),

            TokenKind::LParen => {
                self.compile_expression()?;
                self.consume(TokenKind::RParen)?;
            }

            kind @ (TokenKind::Minus | TokenKind::Tilde | TokenKind::Caret | TokenKind::Hash) => {
                let op = match kind {
                    TokenKind::Minus => ArithmeticOp::Neg,
                    TokenKind::Tilde => ArithmeticOp::Not,
                    TokenKind::Caret => ArithmeticOp::ShiftLeft,
                    TokenKind::Hash => ArithmeticOp::ShiftRight,
                    _ => unreachable!(),
                };
                self.compile_term()?;
                self.emitter.arithmetic(op);
            }

            TokenKind::Identifier => {
                let name = self.interner.intern(extract::ident(token, self.src));
                match self.peek().kind {
                    TokenKind::LBracket => {
                        let base = self.lookup(name, token)?;
                        self.advance();
                        self.emitter.push(base.kind.segment(), base.index);
                        self.compile_expression()?;
                        self.consume(TokenKind::RBracket)?;
                        self.emitter.arithmetic(ArithmeticOp::Add);
                        self.emitter.pop(Segment::Pointer, vm::ALIAS);
                        self.emitter.push(Segment::That, 0);
                    }
                    TokenKind::LParen | TokenKind::Dot => {
                        self.compile_subroutine_call(name, token)?;
                    }
                    _ => {
                        let var = self.lookup(name, token)?;
                        self.emitter.push(var.kind.segment(), var.index);
                    }
                }
            }

            other => {
                let error = Error::UnexpectedTokenInExpr { token: other };
                return Err(self.error_at(token, error));
            }
        }
        self.close(Rule::Term);
        Ok(())
    }

    /// Builds the string at run time: one allocation, then one append per
    /// character.
    fn compile_string(&mut self, token: Token) -> Result<()> {
        let contents = extract::string(token, self.src);
        let len = u16::try_from(contents.chars().count())
            .ok()
            .filter(|&len| len <= MAX_INT_CONST)
            .ok_or_else(|| token.span().wrap(Error::StringTooLong))?;

        self.emitter.push(Segment::Constant, len);
        self.emitter.call(runtime::STRING_NEW, 1);
        for c in contents.chars() {
            let code = u16::try_from(u32::from(c))
                .ok()
                .filter(|&code| code <= MAX_INT_CONST)
                .ok_or_else(|| token.span().wrap(Error::UnsupportedStringChar(c)))?;
            self.emitter.push(Segment::Constant, code);
            self.emitter.call(runtime::STRING_APPEND_CHAR, 2);
        }
        Ok(())
    }

    /// Compiles a call whose leading identifier was already consumed.
    ///
    /// The grammar does not say what kind of call this is, so it is decided
    /// from the leading name:
    ///
    /// - `var.m(..)`, where `var` resolves: method call on `var`'s object;
    /// - `Name.m(..)`, where `Name` doesn't resolve: call of a function or
    ///   constructor of class `Name`;
    /// - `m(..)`: method call on the current receiver.
    fn compile_subroutine_call(&mut self, first: Symbol, first_token: Token) -> Result<()> {
        let (callee, receiver_args): (String, usize) = if self.take(TokenKind::Dot) {
            let (subroutine, _) = self.consume_ident()?;
            let subroutine = self.interner.get(subroutine);
            match self.symbols.resolve(first).copied() {
                Some(object) => {
                    let class = object.ty.name(self.interner);
                    let callee = format!("{class}.{subroutine}");
                    self.emitter.push(object.kind.segment(), object.index);
                    (callee, 1)
                }
                None => {
                    let class = self.interner.get(first);
                    (format!("{class}.{subroutine}"), 0)
                }
            }
        } else {
            let name = self.interner.get(first);
            if self.symbols.resolve(first).is_some() {
                let error = Error::VariableAsSubroutine { name: name.into() };
                return Err(first_token.span().wrap(error));
            }
            let callee = format!("{}.{name}", self.class_name);
            self.emitter.push(Segment::Pointer, vm::RECEIVER);
            (callee, 1)
        };

        self.consume(TokenKind::LParen)?;
        let args = self.compile_expression_list()?;
        let close = self.consume(TokenKind::RParen)?;
        let args = receiver_args
            .checked_add(args)
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| first_token.span().to(close.span()).wrap(Error::TooManyArguments))?;
        self.emitter.call(callee, args);
        Ok(())
    }

    /// Returns the number of compiled expressions. Does **NOT** consume the
    /// closing parenthesis.
    fn compile_expression_list(&mut self) -> Result<usize> {
        self.open(Rule::ExpressionList);
        let mut count = 0;
        if !self.is(TokenKind::RParen) {
            loop {
                self.compile_expression()?;
                count += 1;
                if !self.take(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.close(Rule::ExpressionList);
        Ok(count)
    }

    fn binary_op(kind: TokenKind) -> Option<BinaryOp> {
        let op = match kind {
            TokenKind::Plus => BinaryOp::Arithmetic(ArithmeticOp::Add),
            TokenKind::Minus => BinaryOp::Arithmetic(ArithmeticOp::Sub),
            TokenKind::Star => BinaryOp::Call(runtime::MATH_MULTIPLY),
            TokenKind::Slash => BinaryOp::Call(runtime::MATH_DIVIDE),
            TokenKind::Amp => BinaryOp::Arithmetic(ArithmeticOp::And),
            TokenKind::Pipe => BinaryOp::Arithmetic(ArithmeticOp::Or),
            TokenKind::Less => BinaryOp::Arithmetic(ArithmeticOp::Lt),
            TokenKind::Greater => BinaryOp::Arithmetic(ArithmeticOp::Gt),
            TokenKind::Eq => BinaryOp::Arithmetic(ArithmeticOp::Eq),
            _ => return None,
        };
        Some(op)
    }

    fn parse_type(&mut self) -> Result<Type> {
        let token = self.advance();
        let ty = match token.kind {
            TokenKind::Int => Type::Int,
            TokenKind::Char => Type::Char,
            TokenKind::Boolean => Type::Boolean,
            TokenKind::Identifier => {
                Type::Class(self.interner.intern(extract::ident(token, self.src)))
            }
            actual => return Err(self.error_at(token, Error::ExpectedType { actual })),
        };
        Ok(ty)
    }

    /// Parses `ID (',' ID)*`, defining every name with the given type.
    fn define_names(&mut self, ty: Type, kind: Kind) -> Result<()> {
        loop {
            let (name, token) = self.consume_ident()?;
            self.define(name, token, ty, kind)?;
            if !self.take(TokenKind::Comma) {
                break Ok(());
            }
        }
    }
}

/// Scope and label helpers.
impl Compiler<'_, '_, '_> {
    fn define(&mut self, name: Symbol, token: Token, ty: Type, kind: Kind) -> Result<()> {
        match self.symbols.define(name, ty, kind) {
            Ok(entry) => {
                trace!(
                    "defined {} as {} {} ({})",
                    self.interner.get(name),
                    kind.name(),
                    entry.index,
                    ty.name(self.interner),
                );
                Ok(())
            }
            Err(DefineError::Duplicate(_)) => {
                let name = self.interner.get(name).into();
                Err(token.span().wrap(Error::DuplicateName { name }))
            }
            Err(DefineError::Exhausted) => Err(token.span().wrap(Error::TooManyVariables { kind })),
        }
    }

    fn lookup(&self, name: Symbol, token: Token) -> Result<Entry> {
        match self.symbols.resolve(name) {
            Some(entry) => Ok(*entry),
            None => {
                let name = self.interner.get(name).into();
                Err(token.span().wrap(Error::UndefinedName { name }))
            }
        }
    }

    /// Mints the two labels of one control-flow construct.
    fn label_pair(&mut self, first: LabelKind, second: LabelKind) -> (Label, Label) {
        let id = self.labels;
        self.labels += 1;
        (Label { kind: first, id }, Label { kind: second, id })
    }
}

impl<'src, 'tok, 'ident> Compiler<'src, 'tok, 'ident> {
    fn new(
        src: &'src str,
        tokens: &'tok [Token],
        interner: &'ident mut Interner,
        tree: Option<TreeWriter>,
    ) -> Compiler<'src, 'tok, 'ident> {
        let mut c = Compiler {
            src,
            tokens,
            interner,
            cursor: 0,
            symbols: SymbolTable::new(),
            emitter: Emitter::default(),
            class_name: String::new(),
            subroutine_kind: SubroutineKind::Function,
            labels: 0,
            tree,
        };
        c.setup();
        c
    }
}

/// Parse tree helpers, no-ops unless a tree is being written.
impl Compiler<'_, '_, '_> {
    fn open(&mut self, rule: Rule) {
        if let Some(tree) = &mut self.tree {
            tree.open(rule);
        }
    }

    fn close(&mut self, rule: Rule) {
        if let Some(tree) = &mut self.tree {
            tree.close(rule);
        }
    }
}

/// Token stream helpers.
impl Compiler<'_, '_, '_> {
    /// Skips any leading trivia.
    fn setup(&mut self) {
        while self.peek().kind.is_trivia() {
            self.cursor += 1;
        }
    }

    /// Returns the current token.
    #[inline]
    fn peek(&self) -> Token {
        match self.tokens.get(self.cursor) {
            Some(token) => *token,
            None => Token::eof_for(self.src),
        }
    }

    /// Returns the current token and advances. Skips any trivia.
    fn advance(&mut self) -> Token {
        let c = self.peek();
        if let Some(tree) = &mut self.tree {
            tree.token(c, self.src);
        }
        while {
            self.cursor += 1;
            self.peek().kind.is_trivia()
        } {}
        c
    }

    fn is(&self, expect: TokenKind) -> bool {
        self.peek().kind == expect
    }

    /// Advances if the current token matches the provided one, returning true.
    /// If not, returns false and doesn't advance.
    fn take(&mut self, expect: TokenKind) -> bool {
        if self.is(expect) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Advances if the current token matches the provided one. If not, fails.
    fn consume(&mut self, expected: TokenKind) -> Result<Token> {
        let c = self.peek();
        if c.kind == expected {
            self.advance();
            Ok(c)
        } else {
            let error = Error::Unexpected {
                actual: c.kind,
                expected,
            };
            Err(self.error_at(c, error))
        }
    }

    /// Advances if the current token matches any of the provided ones. If not,
    /// fails.
    fn consume_any(&mut self, expected: &'static [TokenKind]) -> Result<Token> {
        let c = self.peek();
        if expected.contains(&c.kind) {
            self.advance();
            Ok(c)
        } else {
            let error = Error::UnexpectedAny {
                actual: c.kind,
                expected,
            };
            Err(self.error_at(c, error))
        }
    }

    /// Returns true while the current token does *not* match one of the
    /// provided ones. [`TokenKind::Eof`] is implicitly included in the list.
    fn except(&self, except: impl IntoIterator<Item = TokenKind>) -> bool {
        let c = self.peek().kind;
        c != TokenKind::Eof && except.into_iter().all(|e| c != e)
    }

    fn consume_ident(&mut self) -> Result<(Symbol, Token)> {
        let token = self.consume(TokenKind::Identifier)?;
        let name = self.interner.intern(extract::ident(token, self.src));
        Ok((name, token))
    }

    /// Attaches `error` to the token's span. Error tokens report their lexical
    /// error instead, since the mismatch is a consequence of it.
    #[allow(clippy::unused_self)]
    fn error_at(&self, token: Token, error: Error) -> Spanned<Error> {
        let error = match lexer::Error::from_kind(token.kind) {
            Some(lexical) => Error::Lexer(lexical),
            None => error,
        };
        token.span().wrap(error)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    Lexical,
    Syntax,
    Semantic,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Lexer(#[from] lexer::Error),
    #[error("character {0:?} cannot appear in a string constant")]
    UnsupportedStringChar(char),
    #[error("string constant is too long")]
    StringTooLong,

    #[error("expected {expected}, but got {actual}")]
    Unexpected {
        actual: TokenKind,
        expected: TokenKind,
    },
    #[error("expected one of {}, but got {actual}", one_of(.expected))]
    UnexpectedAny {
        actual: TokenKind,
        expected: &'static [TokenKind],
    },
    #[error("expected a type, but got {actual}")]
    ExpectedType { actual: TokenKind },
    #[error("expected a statement, but got {actual}")]
    ExpectedStatement { actual: TokenKind },
    #[error("unexpected token {token} in expression")]
    UnexpectedTokenInExpr { token: TokenKind },
    #[error("unexpected {actual} after the end of the class")]
    TrailingInput { actual: TokenKind },

    #[error("{name} is not defined")]
    UndefinedName { name: Box<str> },
    #[error("{name} is a variable, not a subroutine")]
    VariableAsSubroutine { name: Box<str> },
    #[error("{name} is already defined in this scope")]
    DuplicateName { name: Box<str> },
    #[error("too many {} variables (at most {})", .kind.name(), u16::MAX)]
    TooManyVariables { kind: Kind },
    #[error("too many arguments in call (at most {})", u16::MAX)]
    TooManyArguments,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Lexer(_) | Error::UnsupportedStringChar(_) | Error::StringTooLong => {
                ErrorCategory::Lexical
            }
            Error::Unexpected { .. }
            | Error::UnexpectedAny { .. }
            | Error::ExpectedType { .. }
            | Error::ExpectedStatement { .. }
            | Error::UnexpectedTokenInExpr { .. }
            | Error::TrailingInput { .. } => ErrorCategory::Syntax,
            Error::UndefinedName { .. }
            | Error::VariableAsSubroutine { .. }
            | Error::DuplicateName { .. }
            | Error::TooManyVariables { .. }
            | Error::TooManyArguments => ErrorCategory::Semantic,
        }
    }
}

fn one_of(kinds: &[TokenKind]) -> String {
    let kinds: Vec<_> = kinds.iter().map(ToString::to_string).collect();
    kinds.join(", ")
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::{
        token::Span,
        util::test_utils::{vm_tests, Machine, FIXTURES},
        xml,
    };
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    vm_tests!(
        fn test_if_else_sequence() {
            let src = "
                class Main {
                    function void main() {
                        if (false) { do A.f(); } else { do B.g(); }
                        return;
                    }
                }
            ";
            let vm_ok = "
                function Main.main 0
                push constant 0
                not
                if-goto IF_ELSE0
                call A.f 0
                pop temp 0
                goto IF_END0
                label IF_ELSE0
                call B.g 0
                pop temp 0
                label IF_END0
                push constant 0
                return
            ";
        }

        fn test_if_without_else_still_places_both_labels() {
            let src = "
                class Main {
                    function void main() {
                        var int x;
                        if (x) { let x = 1; }
                        return;
                    }
                }
            ";
            let vm_ok = "
                function Main.main 1
                push local 0
                not
                if-goto IF_ELSE0
                push constant 1
                pop local 0
                label IF_ELSE0
                label IF_END0
                push constant 0
                return
            ";
        }

        fn test_while() {
            let src = "
                class Main {
                    function void main() {
                        var int i;
                        while (i < 10) { let i = i + 1; }
                        return;
                    }
                }
            ";
            let vm_ok = "
                function Main.main 1
                label WHILE_EXP0
                push local 0
                push constant 10
                lt
                not
                if-goto WHILE_END0
                push local 0
                push constant 1
                add
                pop local 0
                goto WHILE_EXP0
                label WHILE_END0
                push constant 0
                return
            ";
        }

        fn test_nested_constructs_share_one_counter() {
            let src = "
                class Main {
                    function void main() {
                        var int i;
                        while (i < 3) {
                            if (i = 1) { let i = 2; }
                            let i = i + 1;
                        }
                        if (true) { return; }
                        return;
                    }
                }
            ";
            let vm_ok = "
                function Main.main 1
                label WHILE_EXP0
                push local 0
                push constant 3
                lt
                not
                if-goto WHILE_END0
                push local 0
                push constant 1
                eq
                not
                if-goto IF_ELSE1
                push constant 2
                pop local 0
                label IF_ELSE1
                label IF_END1
                push local 0
                push constant 1
                add
                pop local 0
                goto WHILE_EXP0
                label WHILE_END0
                push constant 0
                not
                not
                if-goto IF_ELSE2
                push constant 0
                return
                label IF_ELSE2
                label IF_END2
                push constant 0
                return
            ";
        }

        fn test_labels_are_not_reset_between_subroutines() {
            let src = "
                class Main {
                    function void f() { if (true) { } return; }
                    function void g() { if (true) { } return; }
                }
            ";
            let vm_ok = "
                function Main.f 0
                push constant 0
                not
                not
                if-goto IF_ELSE0
                label IF_ELSE0
                label IF_END0
                push constant 0
                return
                function Main.g 0
                push constant 0
                not
                not
                if-goto IF_ELSE1
                label IF_ELSE1
                label IF_END1
                push constant 0
                return
            ";
        }

        fn test_constructor() {
            let src = "
                class Point {
                    field int x, y;
                    static int count;

                    constructor Point new(int ax, int ay) {
                        let x = ax;
                        let y = ay;
                        let count = count + 1;
                        return this;
                    }

                    constructor Point origin() { return; }
                }
            ";
            let vm_ok = "
                function Point.new 0
                push constant 2
                call Memory.alloc 1
                pop pointer 0
                push argument 0
                pop this 0
                push argument 1
                pop this 1
                push static 0
                push constant 1
                add
                pop static 0
                push pointer 0
                return
                function Point.origin 0
                push constant 2
                call Memory.alloc 1
                pop pointer 0
                push pointer 0
                return
            ";
        }

        fn test_method_receiver_and_implicit_call() {
            let src = "
                class Point {
                    field int x, y;

                    method int plus(int dx) {
                        var int r;
                        let r = x + dx;
                        return r;
                    }

                    method void reset() {
                        do clear();
                        return;
                    }
                }
            ";
            let vm_ok = "
                function Point.plus 1
                push argument 0
                pop pointer 0
                push this 0
                push argument 1
                add
                pop local 0
                push local 0
                return
                function Point.reset 0
                push argument 0
                pop pointer 0
                push pointer 0
                call Point.clear 1
                pop temp 0
                push constant 0
                return
            ";
        }

        fn test_call_disambiguation() {
            let src = "
                class Main {
                    field Square square;

                    method void main() {
                        var Point p;
                        var int x;
                        do p.move(x);
                        do Point.new(1, 2);
                        do square.draw();
                        return;
                    }
                }
            ";
            let vm_ok = "
                function Main.main 2
                push argument 0
                pop pointer 0
                push local 0
                push local 1
                call Point.move 2
                pop temp 0
                push constant 1
                push constant 2
                call Point.new 2
                pop temp 0
                push this 0
                call Square.draw 1
                pop temp 0
                push constant 0
                return
            ";
        }

        fn test_binary_operators_have_no_precedence() {
            let src = "
                class Main {
                    function int f() {
                        return 1 + 2 * 3;
                    }
                }
            ";
            let vm_ok = "
                function Main.f 0
                push constant 1
                push constant 2
                add
                push constant 3
                call Math.multiply 2
                return
            ";
        }

        fn test_every_operator() {
            let src = "
                class Main {
                    function boolean g(int a, int b) {
                        return (a / -b) & ~a | ^a < #b > a = true;
                    }
                }
            ";
            let vm_ok = "
                function Main.g 0
                push argument 0
                push argument 1
                neg
                call Math.divide 2
                push argument 0
                not
                and
                push argument 0
                shiftleft
                or
                push argument 1
                shiftright
                lt
                push argument 0
                gt
                push constant 0
                not
                eq
                return
            ";
        }

        fn test_keyword_constants() {
            let src = "
                class Main {
                    method Main self() { return this; }
                    function Main none() { return null; }
                    function boolean no() { return false; }
                }
            ";
            let vm_ok = "
                function Main.self 0
                push argument 0
                pop pointer 0
                push pointer 0
                return
                function Main.none 0
                push constant 0
                return
                function Main.no 0
                push constant 0
                return
            ";
        }

        fn test_string_constants() {
            let src = r#"
                class Main {
                    function void main() {
                        do Output.printString("Hi!");
                        do Output.printString("");
                        return;
                    }
                }
            "#;
            let vm_ok = "
                function Main.main 0
                push constant 3
                call String.new 1
                push constant 72
                call String.appendChar 2
                push constant 105
                call String.appendChar 2
                push constant 33
                call String.appendChar 2
                call Output.printString 1
                pop temp 0
                push constant 0
                call String.new 1
                call Output.printString 1
                pop temp 0
                push constant 0
                return
            ";
        }

        fn test_indexed_write() {
            let src = "
                class Main {
                    function void set(Array arr, int i, int v) {
                        let arr[i] = v;
                        return;
                    }
                }
            ";
            let vm_ok = "
                function Main.set 0
                push argument 0
                push argument 1
                add
                push argument 2
                pop temp 0
                pop pointer 1
                push temp 0
                pop that 0
                push constant 0
                return
            ";
        }

        fn test_indexed_read() {
            let src = "
                class Main {
                    function int get(Array a, int i) {
                        return a[i + 1];
                    }
                }
            ";
            let vm_ok = "
                function Main.get 0
                push argument 0
                push argument 1
                push constant 1
                add
                add
                pop pointer 1
                push that 0
                return
            ";
        }

        fn test_undefined_variable() {
            let src = "class Main { function void main() { let x = 1; return; } }";
            let vm_partial = "function Main.main 0";
            let expected_errors = &["40..41: x is not defined"];
        }

        fn test_undefined_variable_in_expression() {
            let src = "class Main { function int main() { return y; } }";
            let expected_errors = &["42..43: y is not defined"];
        }

        fn test_variable_called_as_subroutine() {
            let src = "class Main { function void main() { var int f; do f(); return; } }";
            let vm_partial = "function Main.main 1";
            let expected_errors = &["50..51: f is a variable, not a subroutine"];
        }

        fn test_variable_called_in_expression() {
            let src = "class Main { method void m() { var int n; let n = n(); return; } }";
            let expected_errors = &["50..51: n is a variable, not a subroutine"];
        }

        fn test_duplicate_class_variable() {
            let src = "class Main { field int a; static int a; }";
            let vm_partial = "";
            let expected_errors = &["37..38: a is already defined in this scope"];
        }

        fn test_duplicate_local_and_argument() {
            let src = "class Main { function void f(int a) { var int a; return; } }";
            let expected_errors = &["46..47: a is already defined in this scope"];
        }

        fn test_earlier_subroutines_are_kept_on_error() {
            let src = "
                class Main {
                    function int one() { return 1; }
                    function int two() { return z; }
                }
            ";
            let vm_partial = "
                function Main.one 0
                push constant 1
                return
                function Main.two 0
            ";
        }

        fn test_missing_semicolon() {
            let src = "class Main { function void main() { var int x; let x = 1 return; } }";
            let expected_errors = &["57..63: expected `;`, but got `return`"];
        }

        fn test_expected_statement() {
            let src = "class Main { function void main() { var int x; x = 1; } }";
            let expected_errors = &["47..48: expected a statement, but got identifier"];
        }

        fn test_unexpected_token_in_expression() {
            let src = "class Main { function int main() { return ); } }";
            let expected_errors = &["42..43: unexpected token `)` in expression"];
        }

        fn test_missing_return_value_is_not_an_expression() {
            let src = "class Main { function void main() { return } }";
            let expected_errors = &["43..44: unexpected token `}` in expression"];
        }

        fn test_trailing_input() {
            let src = "class A { } class B { }";
            let expected_errors = &["12..17: unexpected `class` after the end of the class"];
        }

        fn test_expected_subroutine() {
            let src = "class Main { int x; }";
            let expected_errors = &[
                "13..16: expected one of `constructor`, `function`, `method`, but got `int`",
            ];
        }

        fn test_expected_type() {
            let src = "class Main { field void x; }";
            let expected_errors = &["19..23: expected a type, but got `void`"];
        }

        fn test_int_out_of_range() {
            let src = "class Main { function int main() { return 40000; } }";
            let expected_errors = &["42..47: integer constant out of range (maximum is 32767)"];
        }

        fn test_unexpected_char() {
            let src = "class Main { field int $; }";
            let expected_errors = &["23..24: unexpected character"];
        }

        fn test_unclosed_string() {
            let src = r#"class Main { function void main() { do Output.printString("abc); return; } }"#;
            let expected_errors = &["58..76: unclosed string"];
        }

        fn test_unclosed_comment() {
            let src = "class Main { function void main() { return; } /* unclosed }";
            let expected_errors = &["46..59: unclosed comment"];
        }

        fn test_nul_byte_is_not_the_end_of_input() {
            let src = "class Main { function void f() { return; } }\0 class $$$ garbage {";
            let vm_partial = "
                function Main.f 0
                push constant 0
                return
            ";
            let expected_errors = &["44..45: unexpected character"];
        }
    );

    #[test]
    fn test_indexed_write_on_simulated_memory() {
        let code = compile_in_new(
            "class Main { function void set(Array arr, int i, int v) { let arr[i] = v; return; } }",
        )
        .unwrap();
        let mut m = Machine::new().with_args(400, &[2000, 3, -7]);
        assert_eq!(m.run(&code), 0);
        assert_eq!(m.ram[2003], -7);
    }

    #[test]
    fn test_indexed_swap_on_simulated_memory() {
        let src = "
            class Main {
                function int swap(Array a, int i, int j) {
                    var int tmp;
                    let tmp = a[i];
                    let a[i] = a[j];
                    let a[j] = tmp;
                    return a[i] - a[j];
                }
            }
        ";
        let code = compile_in_new(src).unwrap();
        let mut m = Machine::new().with_args(400, &[2000, 3, 5]);
        m.ram[2003] = 11;
        m.ram[2005] = 4;

        assert_eq!(m.run(&code), -7);
        assert_eq!((m.ram[2003], m.ram[2005]), (4, 11));
    }

    #[test]
    fn test_arithmetic_on_simulated_machine() {
        let src = "
            class Main {
                function int sum(int n) {
                    var int i, s;
                    while (i < n) {
                        let i = i + 1;
                        let s = s + i;
                    }
                    if ((s > 50) & ~(s = 0)) {
                        return s - 4 - (3 - 1) + ^3 + #8;
                    }
                    return -1;
                }
            }
        ";
        let code = compile_in_new(src).unwrap();
        let mut m = Machine::new().with_args(400, &[10]);
        // ((55 - 4) - 2) + 6 + 4
        assert_eq!(m.run(&code), 59);

        let mut m = Machine::new().with_args(400, &[3]);
        assert_eq!(m.run(&code), -1);
    }

    #[test]
    fn test_fixtures_compile() {
        for (name, src) in FIXTURES {
            if let Err((_, error)) = compile_in_new(src) {
                panic!("{name} failed to compile: {error:#}");
            }
        }
    }

    #[test]
    fn test_fixtures_labels_are_unique() {
        for (name, src) in FIXTURES {
            let code = compile_in_new(src).unwrap();
            let mut seen = HashSet::new();
            for ins in &code {
                if let Instruction::Label(label) = ins {
                    assert!(seen.insert(*label), "{name}: duplicate label {label}");
                }
            }
        }
    }

    #[test]
    fn test_fixtures_function_count() {
        for (name, src) in FIXTURES {
            let declared = lexer::lex_in_new(src)
                .into_iter()
                .filter(|t| {
                    matches!(
                        t.kind,
                        TokenKind::Constructor | TokenKind::Function | TokenKind::Method
                    )
                })
                .count();
            let code = compile_in_new(src).unwrap();
            let emitted = code
                .iter()
                .filter(|ins| matches!(ins, Instruction::Function { .. }))
                .count();
            assert_eq!(declared, emitted, "{name}");
        }
    }

    #[test]
    fn test_constructor_allocates_once_before_user_code() {
        let src = "class Square { field int x, y, size; constructor Square new() { do draw(); return this; } }";
        let code = compile_in_new(src).unwrap();
        let allocs = code
            .iter()
            .filter(|ins| matches!(ins, Instruction::Call { name, .. } if &**name == runtime::MEMORY_ALLOC))
            .count();
        assert_eq!(allocs, 1);
        assert_eq!(code[1], Instruction::Push(Segment::Constant, 3));
        assert_eq!(code[3], Instruction::Pop(Segment::Pointer, vm::RECEIVER));
    }

    #[test]
    fn test_shared_interner_across_units() {
        let mut tokens = Vec::new();
        let mut interner = Interner::default();

        let first = compile("class A { function void f() { return; } }", &mut tokens, &mut interner);
        assert!(first.is_ok());
        tokens.clear();
        let second = compile("class B { function void f() { do A.f(); return; } }", &mut tokens, &mut interner);
        assert!(second.is_ok());

        assert!(interner.lookup("A").is_some());
        assert!(interner.lookup("B").is_some());
    }

    #[test]
    fn test_error_categories() {
        let category = |src: &str| match compile_in_new(src) {
            Ok(_) => panic!("expected an error"),
            Err((_, error)) => error.inner.category(),
        };
        assert_eq!(category("class Main { field int $; }"), ErrorCategory::Lexical);
        assert_eq!(category("class Main { field void x; }"), ErrorCategory::Syntax);
        assert_eq!(category("class Main { field int a, a; }"), ErrorCategory::Semantic);
        assert_eq!(
            category("class Main { function void main() { do Output.printString(\"é\u{1F600}\"); return; } }"),
            ErrorCategory::Lexical,
        );
    }

    fn call_with_args(callee: &str, count: usize) -> String {
        let args = vec!["0"; count].join(",");
        format!("class Main {{ function void main() {{ do {callee}({args}); return; }} }}")
    }

    #[test]
    fn test_call_argument_limit() {
        let max = usize::from(u16::MAX);
        let code = compile_in_new(&call_with_args("Sys.f", max)).unwrap();
        assert!(code.contains(&Instruction::Call { name: "Sys.f".into(), args: u16::MAX }));

        for (callee, count) in [("Sys.f", max + 1), ("m", max)] {
            let src = call_with_args(callee, count);
            let Err((_, error)) = compile_in_new(&src) else {
                panic!("{callee} with {count} arguments should not compile");
            };
            let lo = src.find(&format!("do {callee}(")).unwrap() + 3;
            let hi = src.rfind(')').unwrap() + 1;
            assert_eq!(error.inner, Error::TooManyArguments);
            assert_eq!(error.span, Span::new_of_bounds(lo..hi));
        }
    }

    #[test]
    fn test_local_variable_limit() {
        let names: Vec<_> = (0..=u16::MAX).map(|i| format!("v{i}")).collect();
        let src = format!(
            "class Main {{ function void main() {{ var int {}; return; }} }}",
            names.join(", "),
        );
        let Err((_, error)) = compile_in_new(&src) else {
            panic!("expected an error");
        };
        let lo = src.find("v65535").unwrap();
        assert_eq!(
            format!("{error:#}"),
            format!("{lo}..{}: too many local variables (at most 65535)", lo + 6),
        );
        assert_eq!(error.inner.category(), ErrorCategory::Semantic);
    }

    fn tree_of(src: &str) -> String {
        let mut tokens = Vec::new();
        let mut interner = Interner::default();
        match compile_with_tree(src, &mut tokens, &mut interner) {
            Ok((_, tree)) => tree,
            Err((_, error)) => panic!("failed to compile: {error:#}"),
        }
    }

    #[test]
    fn test_tree_of_fixture() {
        let expected = indoc! {"
            <class>
              <keyword> class </keyword>
              <identifier> Main </identifier>
              <symbol> { </symbol>
              <subroutineDec>
                <keyword> function </keyword>
                <keyword> void </keyword>
                <identifier> main </identifier>
                <symbol> ( </symbol>
                <parameterList>
                </parameterList>
                <symbol> ) </symbol>
                <subroutineBody>
                  <symbol> { </symbol>
                  <statements>
                    <doStatement>
                      <keyword> do </keyword>
                      <identifier> Output </identifier>
                      <symbol> . </symbol>
                      <identifier> printInt </identifier>
                      <symbol> ( </symbol>
                      <expressionList>
                        <expression>
                          <term>
                            <integerConstant> 1 </integerConstant>
                          </term>
                          <symbol> + </symbol>
                          <term>
                            <symbol> ( </symbol>
                            <expression>
                              <term>
                                <integerConstant> 2 </integerConstant>
                              </term>
                              <symbol> * </symbol>
                              <term>
                                <integerConstant> 3 </integerConstant>
                              </term>
                            </expression>
                            <symbol> ) </symbol>
                          </term>
                        </expression>
                      </expressionList>
                      <symbol> ) </symbol>
                      <symbol> ; </symbol>
                    </doStatement>
                    <returnStatement>
                      <keyword> return </keyword>
                      <symbol> ; </symbol>
                    </returnStatement>
                  </statements>
                  <symbol> } </symbol>
                </subroutineBody>
              </subroutineDec>
              <symbol> } </symbol>
            </class>
        "};
        assert_eq!(tree_of(FIXTURES[0].1), expected);
    }

    #[test]
    fn test_tree_of_declarations_and_statements() {
        let src = r#"
            class P {
                field int x;
                method void m(int a, Array b) {
                    var boolean c;
                    let b[a] = -x;
                    while (~c) { let c = "<"; }
                    if (c) { } else { return; }
                    return;
                }
            }
        "#;
        let expected = indoc! {"
            <class>
              <keyword> class </keyword>
              <identifier> P </identifier>
              <symbol> { </symbol>
              <classVarDec>
                <keyword> field </keyword>
                <keyword> int </keyword>
                <identifier> x </identifier>
                <symbol> ; </symbol>
              </classVarDec>
              <subroutineDec>
                <keyword> method </keyword>
                <keyword> void </keyword>
                <identifier> m </identifier>
                <symbol> ( </symbol>
                <parameterList>
                  <keyword> int </keyword>
                  <identifier> a </identifier>
                  <symbol> , </symbol>
                  <identifier> Array </identifier>
                  <identifier> b </identifier>
                </parameterList>
                <symbol> ) </symbol>
                <subroutineBody>
                  <symbol> { </symbol>
                  <varDec>
                    <keyword> var </keyword>
                    <keyword> boolean </keyword>
                    <identifier> c </identifier>
                    <symbol> ; </symbol>
                  </varDec>
                  <statements>
                    <letStatement>
                      <keyword> let </keyword>
                      <identifier> b </identifier>
                      <symbol> [ </symbol>
                      <expression>
                        <term>
                          <identifier> a </identifier>
                        </term>
                      </expression>
                      <symbol> ] </symbol>
                      <symbol> = </symbol>
                      <expression>
                        <term>
                          <symbol> - </symbol>
                          <term>
                            <identifier> x </identifier>
                          </term>
                        </term>
                      </expression>
                      <symbol> ; </symbol>
                    </letStatement>
                    <whileStatement>
                      <keyword> while </keyword>
                      <symbol> ( </symbol>
                      <expression>
                        <term>
                          <symbol> ~ </symbol>
                          <term>
                            <identifier> c </identifier>
                          </term>
                        </term>
                      </expression>
                      <symbol> ) </symbol>
                      <symbol> { </symbol>
                      <statements>
                        <letStatement>
                          <keyword> let </keyword>
                          <identifier> c </identifier>
                          <symbol> = </symbol>
                          <expression>
                            <term>
                              <stringConstant> &lt; </stringConstant>
                            </term>
                          </expression>
                          <symbol> ; </symbol>
                        </letStatement>
                      </statements>
                      <symbol> } </symbol>
                    </whileStatement>
                    <ifStatement>
                      <keyword> if </keyword>
                      <symbol> ( </symbol>
                      <expression>
                        <term>
                          <identifier> c </identifier>
                        </term>
                      </expression>
                      <symbol> ) </symbol>
                      <symbol> { </symbol>
                      <statements>
                      </statements>
                      <symbol> } </symbol>
                      <keyword> else </keyword>
                      <symbol> { </symbol>
                      <statements>
                        <returnStatement>
                          <keyword> return </keyword>
                          <symbol> ; </symbol>
                        </returnStatement>
                      </statements>
                      <symbol> } </symbol>
                    </ifStatement>
                    <returnStatement>
                      <keyword> return </keyword>
                      <symbol> ; </symbol>
                    </returnStatement>
                  </statements>
                  <symbol> } </symbol>
                </subroutineBody>
              </subroutineDec>
              <symbol> } </symbol>
            </class>
        "};
        assert_eq!(tree_of(src), expected);
    }

    #[test]
    fn test_fixture_trees_match_code_and_tokens() {
        for (name, src) in FIXTURES {
            let tree = tree_of(src);
            let leaves: Vec<_> = tree.lines().map(str::trim).filter(|l| l.contains(' ')).collect();
            let listing = xml::tokens_string(src, &lexer::lex_in_new(src));
            let listed: Vec<_> = listing.lines().filter(|l| l.contains(' ')).collect();
            assert_eq!(leaves, listed, "{name}");

            let mut tokens = Vec::new();
            let mut interner = Interner::default();
            let (code, _) = compile_with_tree(src, &mut tokens, &mut interner).unwrap();
            assert_eq!(code, compile_in_new(src).unwrap(), "{name}");
        }
    }

    #[test]
    fn test_tree_is_not_returned_on_error() {
        let mut tokens = Vec::new();
        let mut interner = Interner::default();
        let result = compile_with_tree("class Main { field void x; }", &mut tokens, &mut interner);
        let Err((code, error)) = result else {
            panic!("expected an error");
        };
        assert!(code.is_empty());
        assert_eq!(format!("{error:#}"), "19..23: expected a type, but got `void`");
    }
}
