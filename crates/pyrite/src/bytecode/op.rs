//! Opcode and operator enumerations.
//!
//! Operand meanings per opcode are listed on each variant using the slot
//! letters `a`..`f` of [`Instruction::operands`](super::Instruction).
//! `R` is a register, `I` an identifier index, `L` a literal index, `J` an
//! instruction index and `F` a function body index.

use serde::{Deserialize, Serialize};
use strum::{Display, FromRepr, IntoStaticStr};

use crate::exception_private::{RunError, RunResult};

/// Instruction opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, Serialize, Deserialize)]
pub enum Opcode {
    Nop,
    /// a=dest R, b=L
    LoadLiteral,
    /// a=dest R, b=I, c=qualifier
    LoadName,
    /// a=dest R, b=src R
    Move,

    // --- references ---
    /// a=dest R, b=I, c=qualifier
    RefVariable,
    /// a=dest R, b=parent R, c=name R (must hold a string)
    RefProperty,
    /// a=dest R, b=parent R, c=key R
    RefIndex,
    /// a=dest R, b=parent R, c=from R?, d=to R?, e=step R?
    RefRange,
    /// a=reference R, b=value R
    Assign,
    /// a=reference R
    Delete,
    /// a=dest R, b=reference R
    Deref,

    /// a=dest R, b=object R, c=I
    GetAttr,
    /// a=dest R, b=object R, c=key R
    GetItem,

    // --- operators ---
    /// a=dest R, b=lhs R, c=rhs R, d=[`BinaryOperator`]
    BinaryOp,
    /// a=dest R, b=operand R, c=[`UnaryOperator`]
    UnaryOp,
    /// a=dest R, b=lhs R, c=rhs R, d=[`CompareOperator`]
    Compare,

    // --- collections ---
    /// a=dest R, b=first R, c=count
    BuildList,
    /// a=dest R, b=first R, c=count
    BuildTuple,
    /// a=dest R, b=first R, c=count
    BuildSet,
    /// a=dest R, b=first R, c=pair count (key and value registers alternate)
    BuildDict,
    /// a=src R, b=first dest R, c=count
    Unpack,

    // --- jumps ---
    /// a=J
    Jump,
    /// a=condition R, b=J
    JumpIfTrue,
    /// a=condition R, b=J
    JumpIfFalse,

    // --- calls ---
    /// a=dest R, b=F
    MakeFunction,
    /// a=dest R, b=F (class body), c=I name, d=first parent R, e=parent count
    MakeClass,
    /// a=R, b=expand flag
    PushArg,
    /// a=I, b=R
    PushNamedArg,
    /// a=R holding a string-keyed dict
    PushNamedArgs,
    /// a=dest R?, b=callee R
    Call,
    /// a=R?
    Return,
    /// a=dest R?, b=value R?
    Yield,

    // --- modules ---
    /// a=dest R, b=I module name
    Import,
    /// a=dest R, b=module R, c=I
    ImportFrom,

    // --- loops ---
    /// a=[`LoopKind`], b=end J, c=no-break J?
    LoopBegin,
    LoopEnd,
    /// a=dest R, b=src R
    GetIter,
    /// a=dest R, b=iterator R
    ForNext,
    Break,
    Continue,

    // --- exceptions ---
    /// a=handlers start J, b=handlers end J, c=finally J?, d=end J
    TryBegin,
    TryEnd,
    /// a=class I? (absent = catch-all), b=body J, c=bind I?
    ///
    /// Handler table entry; never executed directly.
    ExceptHandler,
    ExceptEnd,
    FinallyEnd,
    /// a=R? (absent = re-raise)
    Raise,
}

/// Decodes an operator operand, treating unknown codes as a malformed stream.
macro_rules! operand_decoder {
    ($ty:ident, $what:literal) => {
        impl $ty {
            pub(crate) fn from_operand(operand: u32) -> RunResult<Self> {
                Self::from_repr(operand)
                    .ok_or_else(|| RunError::internal(format!(concat!("invalid ", $what, " operand {}"), operand)))
            }
        }
    };
}

/// Binary arithmetic and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr, Serialize, Deserialize)]
#[repr(u32)]
pub enum BinaryOperator {
    #[strum(serialize = "+")]
    Add = 0,
    #[strum(serialize = "-")]
    Sub = 1,
    #[strum(serialize = "*")]
    Mul = 2,
    #[strum(serialize = "/")]
    Div = 3,
    #[strum(serialize = "//")]
    FloorDiv = 4,
    #[strum(serialize = "%")]
    Mod = 5,
    #[strum(serialize = "**")]
    Pow = 6,
    #[strum(serialize = "&")]
    BitAnd = 7,
    #[strum(serialize = "|")]
    BitOr = 8,
    #[strum(serialize = "^")]
    BitXor = 9,
    #[strum(serialize = "<<")]
    LShift = 10,
    #[strum(serialize = ">>")]
    RShift = 11,
}

impl BinaryOperator {
    /// The dunder method instances implement this operator with.
    #[must_use]
    pub fn dunder(self) -> &'static str {
        match self {
            Self::Add => "__add__",
            Self::Sub => "__sub__",
            Self::Mul => "__mul__",
            Self::Div => "__truediv__",
            Self::FloorDiv => "__floordiv__",
            Self::Mod => "__mod__",
            Self::Pow => "__pow__",
            Self::BitAnd => "__and__",
            Self::BitOr => "__or__",
            Self::BitXor => "__xor__",
            Self::LShift => "__lshift__",
            Self::RShift => "__rshift__",
        }
    }
}

operand_decoder!(BinaryOperator, "binary operator");

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr, Serialize, Deserialize)]
#[repr(u32)]
pub enum UnaryOperator {
    #[strum(serialize = "-")]
    Neg = 0,
    #[strum(serialize = "+")]
    Pos = 1,
    #[strum(serialize = "not")]
    Not = 2,
    #[strum(serialize = "~")]
    Invert = 3,
}

operand_decoder!(UnaryOperator, "unary operator");

/// Comparison operators, including membership and identity tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr, Serialize, Deserialize)]
#[repr(u32)]
pub enum CompareOperator {
    #[strum(serialize = "==")]
    Eq = 0,
    #[strum(serialize = "!=")]
    NotEq = 1,
    #[strum(serialize = "<")]
    Lt = 2,
    #[strum(serialize = "<=")]
    LtE = 3,
    #[strum(serialize = ">")]
    Gt = 4,
    #[strum(serialize = ">=")]
    GtE = 5,
    #[strum(serialize = "in")]
    In = 6,
    #[strum(serialize = "not in")]
    NotIn = 7,
    #[strum(serialize = "is")]
    Is = 8,
    #[strum(serialize = "is not")]
    IsNot = 9,
}

operand_decoder!(CompareOperator, "comparison");

/// The kind of loop a `LoopBegin` opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr, Serialize, Deserialize)]
#[repr(u32)]
pub enum LoopKind {
    While = 0,
    For = 1,
}

operand_decoder!(LoopKind, "loop kind");
