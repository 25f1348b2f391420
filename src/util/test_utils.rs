use std::collections::HashMap;

use crate::{
    compiler,
    token::Spanned,
    vm::{self, ArithmeticOp, Instruction, Label, Segment},
};

/// Every Jack program under `fixtures/`, by path.
pub const FIXTURES: [(&str, &str); 7] = [
    ("Seven/Main", include_str!("../../fixtures/Seven/Main.jack")),
    ("Average/Main", include_str!("../../fixtures/Average/Main.jack")),
    ("ConvertToBin/Main", include_str!("../../fixtures/ConvertToBin/Main.jack")),
    ("Square/Main", include_str!("../../fixtures/Square/Main.jack")),
    ("Square/Square", include_str!("../../fixtures/Square/Square.jack")),
    ("Square/SquareGame", include_str!("../../fixtures/Square/SquareGame.jack")),
    ("List/List", include_str!("../../fixtures/List/List.jack")),
];

pub fn format_errors<E>(errors: &[Spanned<E>]) -> Vec<String>
where
    E: std::fmt::Display,
{
    errors.iter().map(|e| format!("{e:#}")).collect()
}

/// Compiles `src`, returning the (possibly partial) listing and the formatted
/// errors.
#[track_caller]
pub fn run_compiler(src: &str) -> (String, Vec<String>) {
    let (code, errors) = match compiler::compile_in_new(src) {
        Ok(code) => (code, vec![]),
        Err((code, error)) => (code, vec![error]),
    };
    (vm::program_string(&code), format_errors(&errors))
}

pub enum Assertion {
    VmOk(&'static str),
    VmPartial(&'static str),
    ExpectedErrors(&'static [&'static str]),
}

#[track_caller]
pub fn run_assertion(
    assertion: Assertion,
    formatted_actual_vm: &str,
    formatted_actual_errors: &[String],
) {
    match assertion {
        Assertion::VmOk(expected_vm) => {
            let expected_errors: &[&str] = &[];
            ::pretty_assertions::assert_eq!(formatted_actual_errors, expected_errors);
            ::pretty_assertions::assert_eq!(formatted_actual_vm.trim(), expected_vm.trim());
        }
        Assertion::VmPartial(expected_vm) => {
            ::pretty_assertions::assert_eq!(formatted_actual_vm.trim(), expected_vm.trim());
        }
        Assertion::ExpectedErrors(expected_errors) => {
            ::pretty_assertions::assert_eq!(formatted_actual_errors, expected_errors);
        }
    }
}

macro_rules! vm_tests {
    (
        $(
            fn $test_name:ident() {
                let src = $source:expr;
                $($assertions_tt:tt)*
            }
        )*
    ) => {
        $(
            #[test]
            fn $test_name() {
                let (formatted_actual_vm, formatted_actual_errors) =
                    crate::util::test_utils::run_compiler(::indoc::indoc! { $source });
                let ctx = (&formatted_actual_vm, &formatted_actual_errors);
                vm_tests!(@@expand_assertions, ctx, [$($assertions_tt)*]);
            }
        )*
    };

    (@@expand_assertions, $ctx:expr, []) => {};
    (@@expand_assertions, $ctx:expr, [
        let $assertion:ident = $assertion_expected:expr;
        $($rest_assertions_tt:tt)*
    ]) => {
        crate::util::test_utils::run_assertion(
            vm_tests!(@@assertion, $assertion, $assertion_expected),
            $ctx.0,
            $ctx.1,
        );
        vm_tests!(@@expand_assertions, $ctx, [$($rest_assertions_tt)*]);
    };

    (@@assertion, vm_ok, $expected:expr) => {
        crate::util::test_utils::Assertion::VmOk(::indoc::indoc! { $expected })
    };
    (@@assertion, vm_partial, $expected:expr) => {
        crate::util::test_utils::Assertion::VmPartial(::indoc::indoc! { $expected })
    };
    (@@assertion, expected_errors, $expected:expr) => {
        crate::util::test_utils::Assertion::ExpectedErrors($expected)
    };
}
pub(crate) use vm_tests;

/// Register addresses of the standard memory map.
pub mod reg {
    pub const SP: usize = 0;
    pub const LCL: usize = 1;
    pub const ARG: usize = 2;
    pub const THIS: usize = 3;
    pub const THAT: usize = 4;
    pub const TEMP: usize = 5;
    pub const STATIC: usize = 16;
}

/// A stack machine over a flat RAM, enough to run one subroutine that makes
/// no calls.
///
/// Booleans follow the VM convention: true is -1, false is 0.
pub struct Machine {
    pub ram: Vec<i16>,
}

impl Machine {
    pub const RAM_SIZE: usize = 8_192;

    /// A machine with the stack at 256 and no frame set up.
    pub fn new() -> Machine {
        let mut ram = vec![0; Machine::RAM_SIZE];
        ram[reg::SP] = 256;
        ram[reg::LCL] = 256;
        Machine { ram }
    }

    /// Points the argument segment at `base` and stores `args` there.
    pub fn with_args(mut self, base: i16, args: &[i16]) -> Machine {
        self.ram[reg::ARG] = base;
        let base = Self::addr(base);
        self.ram[base..base + args.len()].copy_from_slice(args);
        self
    }

    /// Runs the subroutine in `code` until its `return`, yielding the value
    /// on top of the stack.
    ///
    /// Panics on `call`, on a missing label, and on falling off the end.
    #[track_caller]
    pub fn run(&mut self, code: &[Instruction]) -> i16 {
        let labels: HashMap<Label, usize> = code
            .iter()
            .enumerate()
            .filter_map(|(i, ins)| match ins {
                Instruction::Label(label) => Some((*label, i)),
                _ => None,
            })
            .collect();
        let jump = |label: &Label| -> usize {
            *labels
                .get(label)
                .unwrap_or_else(|| panic!("missing label {label}"))
        };

        let mut pc = 0;
        loop {
            let ins = code
                .get(pc)
                .unwrap_or_else(|| panic!("ran past the end of the code"));
            pc += 1;
            match ins {
                Instruction::Push(Segment::Constant, value) => {
                    self.push(i16::try_from(*value).unwrap());
                }
                Instruction::Push(segment, index) => {
                    let addr = self.segment_addr(*segment, *index);
                    self.push(self.ram[addr]);
                }
                Instruction::Pop(segment, index) => {
                    let addr = self.segment_addr(*segment, *index);
                    self.ram[addr] = self.pop();
                }
                Instruction::Arithmetic(op) if op.is_unary() => {
                    let a = self.pop();
                    self.push(match op {
                        ArithmeticOp::Neg => a.wrapping_neg(),
                        ArithmeticOp::Not => !a,
                        ArithmeticOp::ShiftLeft => a << 1,
                        ArithmeticOp::ShiftRight => a >> 1,
                        _ => unreachable!(),
                    });
                }
                Instruction::Arithmetic(op) => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(match op {
                        ArithmeticOp::Add => a.wrapping_add(b),
                        ArithmeticOp::Sub => a.wrapping_sub(b),
                        ArithmeticOp::And => a & b,
                        ArithmeticOp::Or => a | b,
                        ArithmeticOp::Eq => -i16::from(a == b),
                        ArithmeticOp::Gt => -i16::from(a > b),
                        ArithmeticOp::Lt => -i16::from(a < b),
                        _ => unreachable!(),
                    });
                }
                Instruction::Label(_) => {}
                Instruction::Goto(label) => pc = jump(label),
                Instruction::IfGoto(label) => {
                    if self.pop() != 0 {
                        pc = jump(label);
                    }
                }
                Instruction::Function { locals, .. } => {
                    self.ram[reg::LCL] = self.ram[reg::SP];
                    for _ in 0..*locals {
                        self.push(0);
                    }
                }
                Instruction::Return => return self.pop(),
                Instruction::Call { name, .. } => panic!("cannot simulate call to {name}"),
            }
        }
    }

    pub fn push(&mut self, value: i16) {
        let sp = Self::addr(self.ram[reg::SP]);
        self.ram[sp] = value;
        self.ram[reg::SP] += 1;
    }

    pub fn pop(&mut self) -> i16 {
        self.ram[reg::SP] -= 1;
        self.ram[Self::addr(self.ram[reg::SP])]
    }

    fn segment_addr(&self, segment: Segment, index: u16) -> usize {
        let index = usize::from(index);
        let based = |register: usize| Self::addr(self.ram[register]) + index;
        match segment {
            Segment::Local => based(reg::LCL),
            Segment::Argument => based(reg::ARG),
            Segment::This => based(reg::THIS),
            Segment::That => based(reg::THAT),
            Segment::Pointer => reg::THIS + index,
            Segment::Temp => reg::TEMP + index,
            Segment::Static => reg::STATIC + index,
            Segment::Constant => unreachable!("constant is not addressable"),
        }
    }

    fn addr(value: i16) -> usize {
        usize::try_from(value).unwrap()
    }
}
