use super::{Label, Opcode};
use crate::il::{FieldId, MethodId, MethodSignature, TypeId, ValueType};
use std::borrow::Cow;
use std::fmt;

/// Operand of an instruction, already resolved by the patch host
#[derive(Clone, Debug, PartialEq)]
pub enum Operand<'g> {
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(Cow<'static, str>),

    /// Index into the argument list (`this` is argument 0 in instance methods)
    Argument(u16),

    /// Index into the declared locals
    Local(u16),

    Label(Label),

    /// Jump table of a `switch`
    Labels(Vec<Label>),

    Method(MethodId<'g>),
    Field(FieldId<'g>),
    Type(ValueType<TypeId<'g>>),

    /// Call-site signature of an indirect call
    Signature(MethodSignature<TypeId<'g>>),
}

impl<'g> Operand<'g> {
    pub fn as_method(&self) -> Option<MethodId<'g>> {
        match self {
            Operand::Method(method) => Some(*method),
            _ => None,
        }
    }

    pub fn as_field(&self) -> Option<FieldId<'g>> {
        match self {
            Operand::Field(field) => Some(*field),
            _ => None,
        }
    }

    /// Argument or local index
    pub fn as_index(&self) -> Option<u16> {
        match self {
            Operand::Argument(idx) | Operand::Local(idx) => Some(*idx),
            _ => None,
        }
    }
}

impl<'g> From<i32> for Operand<'g> {
    fn from(value: i32) -> Self {
        Operand::Int32(value)
    }
}

impl<'g> From<i64> for Operand<'g> {
    fn from(value: i64) -> Self {
        Operand::Int64(value)
    }
}

impl<'g> From<f32> for Operand<'g> {
    fn from(value: f32) -> Self {
        Operand::Float32(value)
    }
}

impl<'g> From<f64> for Operand<'g> {
    fn from(value: f64) -> Self {
        Operand::Float64(value)
    }
}

impl<'g> From<&'static str> for Operand<'g> {
    fn from(value: &'static str) -> Self {
        Operand::String(Cow::Borrowed(value))
    }
}

impl<'g> From<String> for Operand<'g> {
    fn from(value: String) -> Self {
        Operand::String(Cow::Owned(value))
    }
}

impl<'g> From<Label> for Operand<'g> {
    fn from(label: Label) -> Self {
        Operand::Label(label)
    }
}

impl<'g> From<MethodId<'g>> for Operand<'g> {
    fn from(method: MethodId<'g>) -> Self {
        Operand::Method(method)
    }
}

impl<'g> From<FieldId<'g>> for Operand<'g> {
    fn from(field: FieldId<'g>) -> Self {
        Operand::Field(field)
    }
}

impl<'g> fmt::Display for Operand<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Int32(value) => write!(f, "{}", value),
            Operand::Int64(value) => write!(f, "{}", value),
            Operand::Float32(value) => write!(f, "{}", value),
            Operand::Float64(value) => write!(f, "{}", value),
            Operand::String(value) => write!(f, "{:?}", value),
            Operand::Argument(idx) | Operand::Local(idx) => write!(f, "{}", idx),
            Operand::Label(label) => write!(f, "{:?}", label),
            Operand::Labels(labels) => write!(f, "{:?}", labels),
            Operand::Method(method) => write!(f, "{:?}", method),
            Operand::Field(field) => write!(f, "{:?}", field),
            Operand::Type(typ) => write!(f, "{:?}", typ),
            Operand::Signature(signature) => write!(f, "{:?}", signature),
        }
    }
}

/// Kind of exception region boundary an instruction starts or ends
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ExceptionBlockKind {
    BeginTry,
    BeginCatch,
    BeginFilter,
    BeginFinally,
    BeginFault,
    End,
}

/// Exception region marker attached to an instruction
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ExceptionBlock<'g> {
    pub kind: ExceptionBlockKind,

    /// Caught type, only set on `BeginCatch`
    pub catch_type: Option<TypeId<'g>>,
}

impl<'g> ExceptionBlock<'g> {
    pub fn new(kind: ExceptionBlockKind) -> ExceptionBlock<'g> {
        ExceptionBlock {
            kind,
            catch_type: None,
        }
    }

    pub fn catch(catch_type: TypeId<'g>) -> ExceptionBlock<'g> {
        ExceptionBlock {
            kind: ExceptionBlockKind::BeginCatch,
            catch_type: Some(catch_type),
        }
    }
}

/// One IL instruction, along with the labels and exception markers attached to it
///
/// Labels and exception markers belong to the instruction object, not to a position in the
/// sequence, so they move with the instruction when code is inserted around it and they
/// disappear with it when it is removed.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction<'g> {
    pub opcode: Opcode,
    pub operand: Option<Operand<'g>>,

    /// Labels tagging this instruction as a branch target
    pub labels: Vec<Label>,

    /// Exception regions starting or ending at this instruction
    pub blocks: Vec<ExceptionBlock<'g>>,
}

impl<'g> Instruction<'g> {
    pub fn new(opcode: Opcode, operand: impl Into<Operand<'g>>) -> Instruction<'g> {
        Instruction {
            opcode,
            operand: Some(operand.into()),
            labels: vec![],
            blocks: vec![],
        }
    }

    /// Instruction without an operand
    pub fn simple(opcode: Opcode) -> Instruction<'g> {
        Instruction {
            opcode,
            operand: None,
            labels: vec![],
            blocks: vec![],
        }
    }

    pub fn with_labels(mut self, labels: impl IntoIterator<Item = Label>) -> Instruction<'g> {
        for label in labels {
            if !self.labels.contains(&label) {
                self.labels.push(label);
            }
        }
        self
    }

    pub fn with_blocks(
        mut self,
        blocks: impl IntoIterator<Item = ExceptionBlock<'g>>,
    ) -> Instruction<'g> {
        self.blocks.extend(blocks);
        self
    }

    /// Labels this instruction may jump to (empty if this is not a branch)
    pub fn branch_targets(&self) -> &[Label] {
        match &self.operand {
            Some(Operand::Label(label)) if self.opcode.is_branch() => std::slice::from_ref(label),
            Some(Operand::Labels(labels)) if self.opcode.is_branch() => labels,
            _ => &[],
        }
    }

    pub fn is_branch(&self) -> bool {
        !self.branch_targets().is_empty()
    }

    /// Method targeted by a direct or virtual call
    pub fn called_method(&self) -> Option<MethodId<'g>> {
        if self.opcode.is_call() {
            self.operand.as_ref().and_then(Operand::as_method)
        } else {
            None
        }
    }

    pub fn calls(&self, method: MethodId<'g>) -> bool {
        self.called_method() == Some(method)
    }

    pub fn loads_constant(&self) -> bool {
        self.opcode.is_constant_load()
    }

    /// Does this push the given constant value?
    pub fn loads_constant_value(&self, value: &Operand<'g>) -> bool {
        self.opcode.is_constant_load() && self.operand.as_ref() == Some(value)
    }

    /// Loads an argument (any argument if `index` is `None`)
    pub fn loads_argument(&self, index: Option<u16>) -> bool {
        self.opcode == Opcode::Ldarg && self.has_index(index)
    }

    pub fn stores_argument(&self, index: Option<u16>) -> bool {
        self.opcode == Opcode::Starg && self.has_index(index)
    }

    /// Loads a local (any local if `index` is `None`)
    pub fn loads_local(&self, index: Option<u16>) -> bool {
        self.opcode == Opcode::Ldloc && self.has_index(index)
    }

    pub fn stores_local(&self, index: Option<u16>) -> bool {
        self.opcode == Opcode::Stloc && self.has_index(index)
    }

    /// Reads the value of the field (static or instance)
    pub fn loads_field(&self, field: FieldId<'g>) -> bool {
        matches!(self.opcode, Opcode::Ldfld | Opcode::Ldsfld)
            && self.operand.as_ref().and_then(Operand::as_field) == Some(field)
    }

    /// Writes the field (static or instance)
    pub fn stores_field(&self, field: FieldId<'g>) -> bool {
        matches!(self.opcode, Opcode::Stfld | Opcode::Stsfld)
            && self.operand.as_ref().and_then(Operand::as_field) == Some(field)
    }

    fn has_index(&self, index: Option<u16>) -> bool {
        match index {
            None => true,
            Some(index) => self.operand.as_ref().and_then(Operand::as_index) == Some(index),
        }
    }

    /// Move every label on this instruction onto `other`
    pub fn move_labels_to(&mut self, other: &mut Instruction<'g>) {
        for label in self.labels.drain(..) {
            if !other.labels.contains(&label) {
                other.labels.push(label);
            }
        }
    }

    /// Move every label on `other` onto this instruction
    pub fn move_labels_from(&mut self, other: &mut Instruction<'g>) {
        other.move_labels_to(self);
    }

    /// Move every exception marker on this instruction onto `other`
    pub fn move_blocks_to(&mut self, other: &mut Instruction<'g>) {
        other.blocks.append(&mut self.blocks);
    }

    /// Move every exception marker on `other` onto this instruction
    pub fn move_blocks_from(&mut self, other: &mut Instruction<'g>) {
        other.move_blocks_to(self);
    }
}

impl<'g> fmt::Display for Instruction<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in &self.labels {
            write!(f, "{:?}: ", label)?;
        }
        write!(f, "{}", self.opcode)?;
        if let Some(operand) = &self.operand {
            write!(f, " {}", operand)?;
        }
        for block in &self.blocks {
            write!(f, " [{:?}]", block.kind)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn branch_targets_only_for_branches() {
        let target = Label::new(3);
        let goto = Instruction::new(Opcode::Br, target);
        assert_eq!(goto.branch_targets(), &[target]);
        assert!(goto.is_branch());

        // A label operand on a non-branch is not a jump (eg. a label stored as a token)
        let not_a_branch = Instruction::new(Opcode::Ldtoken, target);
        assert!(not_a_branch.branch_targets().is_empty());

        let switch = Instruction::new(
            Opcode::Switch,
            Operand::Labels(vec![Label::new(1), Label::new(2)]),
        );
        assert_eq!(switch.branch_targets(), &[Label::new(1), Label::new(2)]);
    }

    #[test]
    fn index_queries() {
        let load = Instruction::new(Opcode::Ldloc, Operand::Local(2));
        assert!(load.loads_local(None));
        assert!(load.loads_local(Some(2)));
        assert!(!load.loads_local(Some(1)));
        assert!(!load.stores_local(None));
        assert!(!load.loads_argument(None));

        let constant = Instruction::new(Opcode::LdcI4, 7i32);
        assert!(constant.loads_constant());
        assert!(constant.loads_constant_value(&Operand::Int32(7)));
        assert!(!constant.loads_constant_value(&Operand::Int64(7)));
    }

    #[test]
    fn moving_labels_and_blocks() {
        let mut from = Instruction::simple(Opcode::Ret)
            .with_labels([Label::new(0), Label::new(1)])
            .with_blocks([ExceptionBlock::new(ExceptionBlockKind::End)]);
        let mut to = Instruction::simple(Opcode::Nop).with_labels([Label::new(1)]);

        from.move_labels_to(&mut to);
        assert!(from.labels.is_empty());
        assert_eq!(to.labels, vec![Label::new(1), Label::new(0)]);

        to.move_blocks_from(&mut from);
        assert!(from.blocks.is_empty());
        assert_eq!(to.blocks.len(), 1);
    }

    #[test]
    fn display() {
        let insn = Instruction::new(Opcode::Ldstr, "hello").with_labels([Label::new(4)]);
        assert_eq!(insn.to_string(), "l4: ldstr \"hello\"");
    }
}
