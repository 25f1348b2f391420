//! The stack-machine instruction set targeted by the compiler.

use std::{fmt, io};

/// A named, index-addressed memory region.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    Constant,
    Argument,
    Local,
    Static,
    /// Fields of the current receiver.
    This,
    /// Whatever the alias register (`pointer 1`) points at.
    That,
    /// Two slots: the receiver reference and the alias base.
    Pointer,
    Temp,
}

impl Segment {
    pub fn as_str(self) -> &'static str {
        match self {
            Segment::Constant => "constant",
            Segment::Argument => "argument",
            Segment::Local => "local",
            Segment::Static => "static",
            Segment::This => "this",
            Segment::That => "that",
            Segment::Pointer => "pointer",
            Segment::Temp => "temp",
        }
    }
}

/// Slot of the `pointer` segment holding the receiver reference.
pub const RECEIVER: u16 = 0;
/// Slot of the `pointer` segment holding the alias base used to dereference
/// computed addresses through `that 0`.
pub const ALIAS: u16 = 1;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Neg,
    Eq,
    Gt,
    Lt,
    And,
    Or,
    Not,
    ShiftLeft,
    ShiftRight,
}

impl ArithmeticOp {
    pub fn as_str(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "add",
            ArithmeticOp::Sub => "sub",
            ArithmeticOp::Neg => "neg",
            ArithmeticOp::Eq => "eq",
            ArithmeticOp::Gt => "gt",
            ArithmeticOp::Lt => "lt",
            ArithmeticOp::And => "and",
            ArithmeticOp::Or => "or",
            ArithmeticOp::Not => "not",
            ArithmeticOp::ShiftLeft => "shiftleft",
            ArithmeticOp::ShiftRight => "shiftright",
        }
    }

    pub fn is_unary(self) -> bool {
        matches!(
            self,
            ArithmeticOp::Neg
                | ArithmeticOp::Not
                | ArithmeticOp::ShiftLeft
                | ArithmeticOp::ShiftRight
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LabelKind {
    IfElse,
    IfEnd,
    WhileExp,
    WhileEnd,
}

/// A jump target. Labels with the same `id` belong to the same control-flow
/// construct.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label {
    pub kind: LabelKind,
    pub id: u32,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            LabelKind::IfElse => "IF_ELSE",
            LabelKind::IfEnd => "IF_END",
            LabelKind::WhileExp => "WHILE_EXP",
            LabelKind::WhileEnd => "WHILE_END",
        };
        write!(f, "{prefix}{}", self.id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    Push(Segment, u16),
    Pop(Segment, u16),
    Arithmetic(ArithmeticOp),
    Label(Label),
    Goto(Label),
    IfGoto(Label),
    Call { name: Box<str>, args: u16 },
    Function { name: Box<str>, locals: u16 },
    Return,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Push(segment, index) => write!(f, "push {} {index}", segment.as_str()),
            Instruction::Pop(segment, index) => write!(f, "pop {} {index}", segment.as_str()),
            Instruction::Arithmetic(op) => f.write_str(op.as_str()),
            Instruction::Label(label) => write!(f, "label {label}"),
            Instruction::Goto(label) => write!(f, "goto {label}"),
            Instruction::IfGoto(label) => write!(f, "if-goto {label}"),
            Instruction::Call { name, args } => write!(f, "call {name} {args}"),
            Instruction::Function { name, locals } => write!(f, "function {name} {locals}"),
            Instruction::Return => f.write_str("return"),
        }
    }
}

/// Writes one instruction per line.
pub fn write_program(w: &mut impl io::Write, program: &[Instruction]) -> io::Result<()> {
    for instruction in program {
        writeln!(w, "{instruction}")?;
    }
    Ok(())
}

pub fn program_string(program: &[Instruction]) -> String {
    let mut buf = Vec::with_capacity(program.len() * 16);
    write_program(&mut buf, program).expect("writing to a Vec never fails");
    String::from_utf8(buf).expect("instructions are valid UTF-8")
}

const DEFAULT_CODE_CAPACITY: usize = 512;

/// Append-only sink for instructions.
///
/// The emitter performs no validation: callers are responsible for passing
/// meaningful segments, indices and argument counts.
#[derive(Debug)]
pub struct Emitter {
    code: Vec<Instruction>,
}

impl Default for Emitter {
    fn default() -> Self {
        Emitter::with_capacity(DEFAULT_CODE_CAPACITY)
    }
}

impl Emitter {
    pub fn with_capacity(capacity: usize) -> Emitter {
        Emitter {
            code: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, segment: Segment, index: u16) {
        self.code.push(Instruction::Push(segment, index));
    }

    pub fn pop(&mut self, segment: Segment, index: u16) {
        self.code.push(Instruction::Pop(segment, index));
    }

    pub fn arithmetic(&mut self, op: ArithmeticOp) {
        self.code.push(Instruction::Arithmetic(op));
    }

    pub fn label(&mut self, label: Label) {
        self.code.push(Instruction::Label(label));
    }

    pub fn goto(&mut self, label: Label) {
        self.code.push(Instruction::Goto(label));
    }

    pub fn if_goto(&mut self, label: Label) {
        self.code.push(Instruction::IfGoto(label));
    }

    pub fn call(&mut self, name: impl Into<Box<str>>, args: u16) {
        let name = name.into();
        self.code.push(Instruction::Call { name, args });
    }

    pub fn function(&mut self, name: impl Into<Box<str>>, locals: u16) {
        let name = name.into();
        self.code.push(Instruction::Function { name, locals });
    }

    pub fn ret(&mut self) {
        self.code.push(Instruction::Return);
    }

    pub fn finish(self) -> Vec<Instruction> {
        self.code
    }
}
