//! Numeric operations over VM numbers.

use num_bigint::BigInt;
use num_traits::{Signed, Zero};

use crate::error::{AuthenticationError, AuthenticationErrorCode};
use crate::state::ProgramState;

/// Operations taking one VM number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryArithmetic {
    Add1,
    Sub1,
    Negate,
    Abs,
    Not,
    ZeroNotEqual,
}

/// Operations taking two VM numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryArithmetic {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BoolAnd,
    BoolOr,
    NumEqual,
    NumNotEqual,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
    Min,
    Max,
}

fn from_bool(value: bool) -> BigInt {
    BigInt::from(u8::from(value))
}

impl ProgramState {
    pub(crate) fn op_unary_arithmetic(&mut self, op: UnaryArithmetic) -> Result<(), AuthenticationError> {
        let a = self.pop_vm_number()?;
        let result = match op {
            UnaryArithmetic::Add1 => a + 1,
            UnaryArithmetic::Sub1 => a - 1,
            UnaryArithmetic::Negate => -a,
            UnaryArithmetic::Abs => a.abs(),
            UnaryArithmetic::Not => from_bool(a.is_zero()),
            UnaryArithmetic::ZeroNotEqual => from_bool(!a.is_zero()),
        };
        self.push_vm_number(&result)
    }

    pub(crate) fn op_binary_arithmetic(&mut self, op: BinaryArithmetic) -> Result<(), AuthenticationError> {
        let b = self.pop_vm_number()?;
        let a = self.pop_vm_number()?;
        let result = match op {
            BinaryArithmetic::Add => a + b,
            BinaryArithmetic::Sub => a - b,
            BinaryArithmetic::Mul => a * b,
            BinaryArithmetic::Div | BinaryArithmetic::Mod if b.is_zero() => {
                return Err(AuthenticationErrorCode::DivisionByZero.into());
            }
            // `BigInt` division truncates towards zero and the remainder
            // takes the sign of the dividend.
            BinaryArithmetic::Div => a / b,
            BinaryArithmetic::Mod => a % b,
            BinaryArithmetic::BoolAnd => from_bool(!a.is_zero() && !b.is_zero()),
            BinaryArithmetic::BoolOr => from_bool(!a.is_zero() || !b.is_zero()),
            BinaryArithmetic::NumEqual => from_bool(a == b),
            BinaryArithmetic::NumNotEqual => from_bool(a != b),
            BinaryArithmetic::LessThan => from_bool(a < b),
            BinaryArithmetic::GreaterThan => from_bool(a > b),
            BinaryArithmetic::LessThanOrEqual => from_bool(a <= b),
            BinaryArithmetic::GreaterThanOrEqual => from_bool(a >= b),
            BinaryArithmetic::Min => a.min(b),
            BinaryArithmetic::Max => a.max(b),
        };
        self.push_vm_number(&result)
    }

    pub(crate) fn op_num_equal_verify(&mut self) -> Result<(), AuthenticationError> {
        self.op_binary_arithmetic(BinaryArithmetic::NumEqual)?;
        self.op_verify()
    }

    /// `OP_WITHIN`: `minimum <= value < maximum`.
    pub(crate) fn op_within(&mut self) -> Result<(), AuthenticationError> {
        let maximum = self.pop_vm_number()?;
        let minimum = self.pop_vm_number()?;
        let value = self.pop_vm_number()?;
        self.push_bool(minimum <= value && value < maximum);
        Ok(())
    }
}
