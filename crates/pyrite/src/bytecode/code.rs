//! Compiled module boundary types.
//!
//! These are produced by an external compiler and consumed by the VM. They
//! derive serde traits so hosts can load them from any serde format.

use std::{fmt, rc::Rc};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::Display;

use super::op::Opcode;
use crate::{
    exception_private::{RunError, RunResult},
    value::Value,
};

/// Marks an absent optional operand.
pub const NO_OPERAND: u32 = u32::MAX;

/// A set of compiled modules addressable by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub modules: IndexMap<String, CompiledModule>,
}

impl Program {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a module, keyed by its name.
    pub fn add_module(&mut self, module: CompiledModule) {
        self.modules.insert(module.name.clone(), module);
    }

    /// Parses a program from its JSON form.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// One compiled source module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledModule {
    pub name: String,
    /// Identifier table referenced by `I` operands.
    pub identifiers: Vec<String>,
    /// Literal table referenced by `L` operands.
    pub literals: Vec<Literal>,
    /// Function bodies referenced by `F` operands; the entry body has type `Module`.
    pub functions: Vec<FunctionBody>,
}

impl CompiledModule {
    /// Index of the module entry body.
    #[must_use]
    pub fn entry(&self) -> Option<usize> {
        self.functions.iter().position(|body| body.kind == FunctionType::Module)
    }
}

/// What a function body was compiled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum FunctionType {
    /// Top-level module code.
    Module,
    /// An ordinary function or lambda.
    Plain,
    /// A class body, run once when the class is created.
    ClassDef,
    /// A function defined directly inside a class body.
    ClassMember,
}

/// A compiled function body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionBody {
    pub id: u32,
    pub name: String,
    pub kind: FunctionType,
    pub arguments: Vec<ArgumentDecl>,
    pub code: Vec<Instruction>,
    /// Size hint for the register file.
    #[serde(default)]
    pub register_count: u32,
}

/// How a declared parameter consumes call arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum ArgumentKind {
    Positional,
    /// `*args`
    ArbitraryArguments,
    /// `**kwargs`
    KeywordArguments,
}

/// A declared parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgumentDecl {
    /// Index into the module's identifier table.
    pub identifier: u32,
    pub kind: ArgumentKind,
    /// Register (of the defining frame) holding the default value when the function is created.
    #[serde(default)]
    pub default_register: Option<u32>,
}

/// An entry of the literal table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Literal {
    pub(crate) fn to_value(&self) -> Value {
        match self {
            Self::None => Value::None,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Int(*i),
            Self::Float(f) => Value::Float(*f),
            Self::Str(s) => Value::str(s),
            Self::Bytes(b) => Value::Bytes(Rc::from(b.as_slice())),
        }
    }
}

/// Source position of an instruction, used only for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub row: u32,
    pub column: u32,
    /// Character offset in the source file.
    #[serde(default)]
    pub position: u32,
}

/// One instruction: an opcode and six polymorphic operand slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: [u32; 6],
    #[serde(default)]
    pub location: Option<SourceLocation>,
}

impl Instruction {
    #[must_use]
    pub fn new(opcode: Opcode, operands: &[u32]) -> Self {
        let mut slots = [NO_OPERAND; 6];
        for (slot, operand) in slots.iter_mut().zip(operands) {
            *slot = *operand;
        }
        Self {
            opcode,
            operands: slots,
            location: None,
        }
    }

    #[must_use]
    pub fn row(&self) -> Option<u32> {
        self.location.map(|location| location.row)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        for operand in self.operands.iter().take_while(|operand| **operand != NO_OPERAND) {
            write!(f, " {operand}")?;
        }
        Ok(())
    }
}

/// A function body addressed through its owning module.
#[derive(Debug, Clone)]
pub(crate) struct CodeRef {
    pub module: Rc<CompiledModule>,
    pub index: usize,
}

impl CodeRef {
    pub fn new(module: Rc<CompiledModule>, index: usize) -> RunResult<Self> {
        if index < module.functions.len() {
            Ok(Self { module, index })
        } else {
            Err(RunError::internal(format!(
                "function body {index} not found in module '{}'",
                module.name
            )))
        }
    }

    pub fn body(&self) -> &FunctionBody {
        &self.module.functions[self.index]
    }

    /// Whether both refer to the same body of the same loaded module.
    pub fn same_body(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.module, &other.module) && self.index == other.index
    }

    /// Resolves an `I` operand against the module's identifier table.
    pub fn identifier(&self, index: u32) -> RunResult<&str> {
        self.module
            .identifiers
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| RunError::internal(format!("identifier {index} out of range")))
    }

    /// Resolves an `L` operand against the module's literal table.
    pub fn literal(&self, index: u32) -> RunResult<Value> {
        self.module
            .literals
            .get(index as usize)
            .map(Literal::to_value)
            .ok_or_else(|| RunError::internal(format!("literal {index} out of range")))
    }
}
