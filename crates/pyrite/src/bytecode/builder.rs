//! Builders for assembling compiled modules.
//!
//! `ModuleBuilder` owns the identifier and literal tables of one module;
//! `FunctionBuilder` emits the instructions of one function body, handling
//! forward jumps with labels that are patched when the body is finished and
//! tracking the source row attached to each instruction.
//!
//! # Usage
//!
//! ```
//! use pyrite::bytecode::{FunctionType, ModuleBuilder, FunctionBuilder};
//!
//! let mut module = ModuleBuilder::new("main");
//! let mut body = FunctionBuilder::new("main", FunctionType::Module);
//! body.set_row(0);
//! let value = body.load_int(&mut module, 10);
//! body.assign_name(&mut module, "a", value);
//! module.add_function(body.finish());
//! let compiled = module.build();
//! assert_eq!(compiled.entry(), Some(0));
//! ```

use ahash::AHashMap;

use super::{
    code::{ArgumentDecl, ArgumentKind, CompiledModule, FunctionBody, FunctionType, Instruction, Literal, NO_OPERAND, SourceLocation},
    op::{BinaryOperator, CompareOperator, LoopKind, Opcode},
};
use crate::namespace::Qualifier;

/// Builder for the tables and bodies of one module.
#[derive(Debug, Default)]
pub struct ModuleBuilder {
    name: String,
    identifiers: Vec<String>,
    identifier_index: AHashMap<String, u32>,
    literals: Vec<Literal>,
    functions: Vec<Option<FunctionBody>>,
}

impl ModuleBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Interns an identifier, returning its table index.
    pub fn identifier(&mut self, name: &str) -> u32 {
        if let Some(&index) = self.identifier_index.get(name) {
            return index;
        }
        let index = table_index(self.identifiers.len());
        self.identifiers.push(name.to_owned());
        self.identifier_index.insert(name.to_owned(), index);
        index
    }

    /// Adds a literal, reusing an equal existing entry.
    pub fn literal(&mut self, literal: Literal) -> u32 {
        if let Some(index) = self.literals.iter().position(|existing| *existing == literal) {
            return table_index(index);
        }
        self.literals.push(literal);
        table_index(self.literals.len() - 1)
    }

    /// Reserves a function index to be filled later with [`Self::set_function`].
    ///
    /// Lets a body reference a function (e.g. itself, recursively) before it is finished.
    pub fn reserve_function(&mut self) -> u32 {
        self.functions.push(None);
        table_index(self.functions.len() - 1)
    }

    /// Fills a reserved function index.
    pub fn set_function(&mut self, index: u32, mut body: FunctionBody) {
        body.id = index;
        self.functions[index as usize] = Some(body);
    }

    /// Appends a finished function body, returning its index.
    pub fn add_function(&mut self, body: FunctionBody) -> u32 {
        let index = self.reserve_function();
        self.set_function(index, body);
        index
    }

    /// Finishes the module. Reserved indices that were never filled become empty bodies.
    #[must_use]
    pub fn build(self) -> CompiledModule {
        CompiledModule {
            name: self.name,
            identifiers: self.identifiers,
            literals: self.literals,
            functions: self
                .functions
                .into_iter()
                .enumerate()
                .map(|(index, body)| {
                    body.unwrap_or_else(|| FunctionBody {
                        id: table_index(index),
                        name: "<missing>".to_owned(),
                        kind: FunctionType::Plain,
                        arguments: Vec::new(),
                        code: Vec::new(),
                        register_count: 0,
                    })
                })
                .collect(),
        }
    }
}

fn table_index(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(NO_OPERAND)
}

/// A forward-referencable position in a function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// An operand to [`FunctionBuilder::emit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Raw(u32),
    /// Patched to the label's instruction index when the body is finished.
    Label(Label),
    Absent,
}

impl From<u32> for Operand {
    fn from(value: u32) -> Self {
        Self::Raw(value)
    }
}

impl From<Label> for Operand {
    fn from(label: Label) -> Self {
        Self::Label(label)
    }
}

impl From<Option<u32>> for Operand {
    fn from(value: Option<u32>) -> Self {
        value.map_or(Self::Absent, Self::Raw)
    }
}

impl From<Option<Label>> for Operand {
    fn from(label: Option<Label>) -> Self {
        label.map_or(Self::Absent, Self::Label)
    }
}

/// Builder for one function body.
#[derive(Debug)]
pub struct FunctionBuilder {
    name: String,
    kind: FunctionType,
    arguments: Vec<ArgumentDecl>,
    code: Vec<Instruction>,
    /// Bound instruction index per label.
    labels: Vec<Option<u32>>,
    /// `(instruction, operand slot, label)` to patch on finish.
    fixups: Vec<(usize, usize, Label)>,
    location: Option<SourceLocation>,
    next_register: u32,
}

impl FunctionBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FunctionType) -> Self {
        Self {
            name: name.into(),
            kind,
            arguments: Vec::new(),
            code: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            location: None,
            next_register: 0,
        }
    }

    /// Declares a parameter.
    ///
    /// # Arguments
    /// * `module` - Module owning the identifier table
    /// * `name` - Parameter name
    /// * `kind` - How the parameter consumes arguments
    /// * `default_register` - Register of the *defining* body holding the default value
    pub fn argument(&mut self, module: &mut ModuleBuilder, name: &str, kind: ArgumentKind, default_register: Option<u32>) {
        let identifier = module.identifier(name);
        self.arguments.push(ArgumentDecl {
            identifier,
            kind,
            default_register,
        });
    }

    /// Sets the source row attached to subsequently emitted instructions.
    pub fn set_row(&mut self, row: u32) {
        self.set_location(row, 0);
    }

    pub fn set_location(&mut self, row: u32, column: u32) {
        self.location = Some(SourceLocation {
            row,
            column,
            position: 0,
        });
    }

    /// Allocates a fresh register.
    pub fn register(&mut self) -> u32 {
        let register = self.next_register;
        self.next_register += 1;
        register
    }

    /// Allocates `count` consecutive registers, returning the first.
    pub fn registers(&mut self, count: u32) -> u32 {
        let first = self.next_register;
        self.next_register += count;
        first
    }

    /// Index the next emitted instruction will get.
    #[must_use]
    pub fn position(&self) -> usize {
        self.code.len()
    }

    #[must_use]
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds `label` to the next emitted instruction.
    pub fn bind(&mut self, label: Label) {
        self.labels[label.0] = Some(table_index(self.code.len()));
    }

    /// Emits an instruction; returns its index.
    pub fn emit(&mut self, opcode: Opcode, operands: &[Operand]) -> usize {
        let index = self.code.len();
        let mut instruction = Instruction::new(opcode, &[]);
        for (slot, operand) in operands.iter().enumerate().take(6) {
            instruction.operands[slot] = match *operand {
                Operand::Raw(value) => value,
                Operand::Absent => NO_OPERAND,
                Operand::Label(label) => {
                    self.fixups.push((index, slot, label));
                    NO_OPERAND
                }
            };
        }
        instruction.location = self.location;
        self.code.push(instruction);
        index
    }

    /// Finishes the body, patching labels.
    ///
    /// Labels that were never bound stay as [`NO_OPERAND`], which the VM
    /// reports as a malformed instruction stream when the jump is taken.
    #[must_use]
    pub fn finish(mut self) -> FunctionBody {
        for (instruction, slot, label) in std::mem::take(&mut self.fixups) {
            if let Some(target) = self.labels[label.0] {
                self.code[instruction].operands[slot] = target;
            }
        }
        FunctionBody {
            id: 0,
            name: self.name,
            kind: self.kind,
            arguments: self.arguments,
            code: self.code,
            register_count: self.next_register,
        }
    }

    // ==========================================================================
    // Convenience emitters
    // ==========================================================================

    /// Loads a literal into a fresh register.
    pub fn load_literal(&mut self, module: &mut ModuleBuilder, literal: Literal) -> u32 {
        let dest = self.register();
        let index = module.literal(literal);
        self.emit(Opcode::LoadLiteral, &[dest.into(), index.into()]);
        dest
    }

    pub fn load_int(&mut self, module: &mut ModuleBuilder, value: i64) -> u32 {
        self.load_literal(module, Literal::Int(value))
    }

    pub fn load_str(&mut self, module: &mut ModuleBuilder, value: &str) -> u32 {
        self.load_literal(module, Literal::Str(value.to_owned()))
    }

    pub fn load_none(&mut self, module: &mut ModuleBuilder) -> u32 {
        self.load_literal(module, Literal::None)
    }

    /// Loads a name with the default qualifier into a fresh register.
    pub fn load_name(&mut self, module: &mut ModuleBuilder, name: &str) -> u32 {
        self.load_name_qualified(module, name, Qualifier::Default)
    }

    pub fn load_name_qualified(&mut self, module: &mut ModuleBuilder, name: &str, qualifier: Qualifier) -> u32 {
        let dest = self.register();
        let identifier = module.identifier(name);
        self.emit(
            Opcode::LoadName,
            &[dest.into(), identifier.into(), (qualifier as u32).into()],
        );
        dest
    }

    /// `name = value`
    pub fn assign_name(&mut self, module: &mut ModuleBuilder, name: &str, value: u32) {
        self.assign_name_qualified(module, name, Qualifier::Default, value);
    }

    pub fn assign_name_qualified(&mut self, module: &mut ModuleBuilder, name: &str, qualifier: Qualifier, value: u32) {
        let reference = self.ref_variable(module, name, qualifier);
        self.emit(Opcode::Assign, &[reference.into(), value.into()]);
    }

    /// Builds a variable reference in a fresh register.
    pub fn ref_variable(&mut self, module: &mut ModuleBuilder, name: &str, qualifier: Qualifier) -> u32 {
        let dest = self.register();
        let identifier = module.identifier(name);
        self.emit(
            Opcode::RefVariable,
            &[dest.into(), identifier.into(), (qualifier as u32).into()],
        );
        dest
    }

    /// `object.name = value`
    pub fn set_attr(&mut self, module: &mut ModuleBuilder, object: u32, name: &str, value: u32) {
        let name_register = self.load_str(module, name);
        let reference = self.register();
        self.emit(
            Opcode::RefProperty,
            &[reference.into(), object.into(), name_register.into()],
        );
        self.emit(Opcode::Assign, &[reference.into(), value.into()]);
    }

    /// `object.name` into a fresh register.
    pub fn get_attr(&mut self, module: &mut ModuleBuilder, object: u32, name: &str) -> u32 {
        let dest = self.register();
        let identifier = module.identifier(name);
        self.emit(Opcode::GetAttr, &[dest.into(), object.into(), identifier.into()]);
        dest
    }

    pub fn binary(&mut self, op: BinaryOperator, lhs: u32, rhs: u32) -> u32 {
        let dest = self.register();
        self.emit(
            Opcode::BinaryOp,
            &[dest.into(), lhs.into(), rhs.into(), (op as u32).into()],
        );
        dest
    }

    pub fn compare(&mut self, op: CompareOperator, lhs: u32, rhs: u32) -> u32 {
        let dest = self.register();
        self.emit(
            Opcode::Compare,
            &[dest.into(), lhs.into(), rhs.into(), (op as u32).into()],
        );
        dest
    }

    /// Builds a list from consecutive registers holding `items`.
    pub fn build_list(&mut self, items: &[u32]) -> u32 {
        self.build_sequence(Opcode::BuildList, items)
    }

    pub fn build_tuple(&mut self, items: &[u32]) -> u32 {
        self.build_sequence(Opcode::BuildTuple, items)
    }

    fn build_sequence(&mut self, opcode: Opcode, items: &[u32]) -> u32 {
        let count = table_index(items.len());
        let first = self.registers(count);
        for (offset, item) in (0..count).zip(items) {
            self.emit(Opcode::Move, &[(first + offset).into(), (*item).into()]);
        }
        let dest = self.register();
        self.emit(opcode, &[dest.into(), first.into(), count.into()]);
        dest
    }

    /// Calls `callee` with positional `args`; the result lands in a fresh register.
    pub fn call(&mut self, callee: u32, args: &[u32]) -> u32 {
        let dest = self.register();
        self.call_into(Some(dest), callee, args, &[]);
        dest
    }

    /// Calls `callee` with positional and named arguments.
    ///
    /// # Arguments
    /// * `dest` - Register receiving the result, `None` to discard it
    /// * `callee` - Register holding the callable
    /// * `args` - Registers of positional arguments
    /// * `named` - `(identifier index, register)` pairs of named arguments
    pub fn call_into(&mut self, dest: Option<u32>, callee: u32, args: &[u32], named: &[(u32, u32)]) {
        for arg in args {
            self.emit(Opcode::PushArg, &[(*arg).into(), Operand::Raw(0)]);
        }
        for (identifier, register) in named {
            self.emit(Opcode::PushNamedArg, &[(*identifier).into(), (*register).into()]);
        }
        self.emit(Opcode::Call, &[dest.into(), callee.into()]);
    }

    /// Calls the builtin or global `name` with positional `args`, discarding the result.
    pub fn call_name(&mut self, module: &mut ModuleBuilder, name: &str, args: &[u32]) {
        let callee = self.load_name(module, name);
        self.call_into(None, callee, args, &[]);
    }

    pub fn make_function(&mut self, function: u32) -> u32 {
        let dest = self.register();
        self.emit(Opcode::MakeFunction, &[dest.into(), function.into()]);
        dest
    }

    /// Creates a class from a `ClassDef` body and parent registers.
    pub fn make_class(&mut self, module: &mut ModuleBuilder, body: u32, name: &str, parents: &[u32]) -> u32 {
        let count = table_index(parents.len());
        let first = self.registers(count);
        for (offset, parent) in (0..count).zip(parents) {
            self.emit(Opcode::Move, &[(first + offset).into(), (*parent).into()]);
        }
        let dest = self.register();
        let identifier = module.identifier(name);
        self.emit(
            Opcode::MakeClass,
            &[dest.into(), body.into(), identifier.into(), first.into(), count.into()],
        );
        dest
    }

    pub fn jump(&mut self, label: Label) {
        self.emit(Opcode::Jump, &[label.into()]);
    }

    pub fn jump_if_false(&mut self, condition: u32, label: Label) {
        self.emit(Opcode::JumpIfFalse, &[condition.into(), label.into()]);
    }

    pub fn jump_if_true(&mut self, condition: u32, label: Label) {
        self.emit(Opcode::JumpIfTrue, &[condition.into(), label.into()]);
    }

    pub fn ret(&mut self, value: Option<u32>) {
        self.emit(Opcode::Return, &[value.into()]);
    }

    /// `yield value`; the sent value (always `None`) goes to `dest`.
    pub fn yield_value(&mut self, dest: Option<u32>, value: Option<u32>) {
        self.emit(Opcode::Yield, &[dest.into(), value.into()]);
    }

    pub fn raise(&mut self, value: Option<u32>) {
        self.emit(Opcode::Raise, &[value.into()]);
    }

    /// Opens a loop whose exit lands on `end`.
    pub fn loop_begin(&mut self, kind: LoopKind, end: Label, no_break: Option<Label>) {
        self.emit(Opcode::LoopBegin, &[(kind as u32).into(), end.into(), no_break.into()]);
    }

    /// Opens a try block.
    ///
    /// # Arguments
    /// * `handlers` - First handler table entry
    /// * `handlers_end` - One past the last handler table entry
    /// * `finally` - Start of the finally body, if any
    /// * `end` - Landing position after the whole statement
    pub fn try_begin(&mut self, handlers: Label, handlers_end: Label, finally: Option<Label>, end: Label) {
        self.emit(
            Opcode::TryBegin,
            &[handlers.into(), handlers_end.into(), finally.into(), end.into()],
        );
    }

    /// Emits a handler table entry.
    ///
    /// # Arguments
    /// * `class` - Exception class name, `None` for a bare catch-all
    /// * `body` - Start of the handler body
    /// * `bind` - Name the exception is bound to, if any
    pub fn except_handler(&mut self, module: &mut ModuleBuilder, class: Option<&str>, body: Label, bind: Option<&str>) {
        let class = class.map(|name| module.identifier(name));
        let bind = bind.map(|name| module.identifier(name));
        self.emit(Opcode::ExceptHandler, &[class.into(), body.into(), bind.into()]);
    }

    pub fn import(&mut self, module: &mut ModuleBuilder, name: &str) -> u32 {
        let dest = self.register();
        let identifier = module.identifier(name);
        self.emit(Opcode::Import, &[dest.into(), identifier.into()]);
        dest
    }

    pub fn import_from(&mut self, module: &mut ModuleBuilder, source: u32, name: &str) -> u32 {
        let dest = self.register();
        let identifier = module.identifier(name);
        self.emit(Opcode::ImportFrom, &[dest.into(), source.into(), identifier.into()]);
        dest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_labels_are_patched() {
        let mut module = ModuleBuilder::new("m");
        let mut body = FunctionBuilder::new("m", FunctionType::Module);
        let end = body.new_label();
        let cond = body.load_literal(&mut module, Literal::Bool(true));
        body.jump_if_false(cond, end);
        body.load_int(&mut module, 1);
        body.bind(end);
        let body = body.finish();
        assert_eq!(body.code[1].operands[1], 3);
        assert_eq!(body.register_count, 2);
    }

    #[test]
    fn unbound_labels_stay_absent() {
        let mut body = FunctionBuilder::new("f", FunctionType::Plain);
        let nowhere = body.new_label();
        body.jump(nowhere);
        assert_eq!(body.finish().code[0].operands[0], NO_OPERAND);
    }

    #[test]
    fn tables_are_interned() {
        let mut module = ModuleBuilder::new("m");
        assert_eq!(module.identifier("x"), module.identifier("x"));
        let first = module.literal(Literal::Int(7));
        assert_eq!(module.literal(Literal::Int(7)), first);
        assert_ne!(module.literal(Literal::Str("7".to_owned())), first);
    }

    #[test]
    fn rows_are_attached() {
        let mut module = ModuleBuilder::new("m");
        let mut body = FunctionBuilder::new("m", FunctionType::Module);
        body.set_row(4);
        body.load_int(&mut module, 1);
        assert_eq!(body.finish().code[0].row(), Some(4));
    }
}
