use super::{ExceptionBlock, Instruction, Label, Opcode, Operand};
use crate::il::{FieldId, MethodId};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// Arbitrary test on a single instruction
pub type InstructionPredicate<'g> = Rc<dyn Fn(&Instruction<'g>) -> bool + 'g>;

/// Description of a single instruction to look for
///
/// A pattern with a predicate is decided by the predicate alone. Otherwise, every non-empty
/// constraint must hold (an empty constraint matches anything):
///
///   * `opcodes` - the opcode is one of these
///   * `operands` - the operand is one of these
///   * `labels` - the instruction is tagged with at least one of these labels
///   * `blocks` - the instruction carries at least one of these exception markers
///   * `jumps_from` - one of the instructions at these indices branches to this instruction
///   * `jumps_to` - this instruction branches to one of the instructions at these indices
///
/// Naming a pattern makes a successful match record the matched instruction, which can then be
/// read back with [`super::CodeCursor::named_match`].
#[derive(Clone, Default)]
pub struct CodeMatch<'g> {
    pub name: Option<String>,
    pub opcodes: HashSet<Opcode>,
    pub operands: Vec<Operand<'g>>,
    pub labels: Vec<Label>,
    pub blocks: Vec<ExceptionBlock<'g>>,
    pub jumps_from: Vec<usize>,
    pub jumps_to: Vec<usize>,
    pub predicate: Option<InstructionPredicate<'g>>,
}

impl<'g> CodeMatch<'g> {
    /// Matches any instruction
    pub fn any() -> CodeMatch<'g> {
        CodeMatch::default()
    }

    pub fn opcode(opcode: Opcode) -> CodeMatch<'g> {
        CodeMatch::opcodes([opcode])
    }

    pub fn opcodes(opcodes: impl IntoIterator<Item = Opcode>) -> CodeMatch<'g> {
        CodeMatch {
            opcodes: opcodes.into_iter().collect(),
            ..CodeMatch::default()
        }
    }

    /// Matches an opcode together with its operand
    pub fn new(opcode: Opcode, operand: impl Into<Operand<'g>>) -> CodeMatch<'g> {
        CodeMatch::opcode(opcode).with_operand(operand)
    }

    pub fn predicate(predicate: impl Fn(&Instruction<'g>) -> bool + 'g) -> CodeMatch<'g> {
        CodeMatch {
            predicate: Some(Rc::new(predicate)),
            ..CodeMatch::default()
        }
    }

    /// Record the matched instruction under this name
    pub fn named(mut self, name: impl Into<String>) -> CodeMatch<'g> {
        self.name = Some(name.into());
        self
    }

    pub fn with_operand(mut self, operand: impl Into<Operand<'g>>) -> CodeMatch<'g> {
        self.operands.push(operand.into());
        self
    }

    pub fn with_label(mut self, label: Label) -> CodeMatch<'g> {
        self.labels.push(label);
        self
    }

    pub fn with_block(mut self, block: ExceptionBlock<'g>) -> CodeMatch<'g> {
        self.blocks.push(block);
        self
    }

    pub fn jumps_from(mut self, index: usize) -> CodeMatch<'g> {
        self.jumps_from.push(index);
        self
    }

    pub fn jumps_to(mut self, index: usize) -> CodeMatch<'g> {
        self.jumps_to.push(index);
        self
    }

    /// Direct or virtual call to the given method
    pub fn calls(method: MethodId<'g>) -> CodeMatch<'g> {
        CodeMatch::predicate(move |insn| insn.calls(method))
    }

    /// Any branch with a label operand
    pub fn branches() -> CodeMatch<'g> {
        CodeMatch::predicate(Instruction::is_branch)
    }

    pub fn loads_constant() -> CodeMatch<'g> {
        CodeMatch::predicate(Instruction::loads_constant)
    }

    pub fn loads_field(field: FieldId<'g>) -> CodeMatch<'g> {
        CodeMatch::predicate(move |insn| insn.loads_field(field))
    }

    pub fn stores_field(field: FieldId<'g>) -> CodeMatch<'g> {
        CodeMatch::predicate(move |insn| insn.stores_field(field))
    }

    pub fn loads_argument() -> CodeMatch<'g> {
        CodeMatch::opcode(Opcode::Ldarg)
    }

    pub fn loads_local() -> CodeMatch<'g> {
        CodeMatch::opcode(Opcode::Ldloc)
    }

    pub fn stores_local() -> CodeMatch<'g> {
        CodeMatch::opcode(Opcode::Stloc)
    }

    /// Check the instruction at `index` against this pattern
    ///
    /// The whole sequence is needed to resolve `jumps_from` and `jumps_to`, which refer to
    /// absolute indices. Out of range indices never match.
    pub fn matches(&self, instructions: &[Instruction<'g>], index: usize) -> bool {
        let insn = match instructions.get(index) {
            Some(insn) => insn,
            None => return false,
        };

        if let Some(predicate) = &self.predicate {
            return predicate(insn);
        }

        if !self.opcodes.is_empty() && !self.opcodes.contains(&insn.opcode) {
            return false;
        }

        if !self.operands.is_empty() {
            match &insn.operand {
                Some(operand) if self.operands.contains(operand) => (),
                _ => return false,
            }
        }

        if !self.labels.is_empty() && !insn.labels.iter().any(|l| self.labels.contains(l)) {
            return false;
        }

        if !self.blocks.is_empty() && !insn.blocks.iter().any(|b| self.blocks.contains(b)) {
            return false;
        }

        if !self.jumps_from.is_empty() {
            let incoming: Vec<Label> = self
                .jumps_from
                .iter()
                .filter_map(|source| instructions.get(*source))
                .flat_map(|source| source.branch_targets().iter().copied())
                .collect();
            if !insn.labels.iter().any(|l| incoming.contains(l)) {
                return false;
            }
        }

        if !self.jumps_to.is_empty() {
            let outgoing = insn.branch_targets();
            let hits_target = self
                .jumps_to
                .iter()
                .filter_map(|target| instructions.get(*target))
                .any(|target| target.labels.iter().any(|l| outgoing.contains(l)));
            if !hits_target {
                return false;
            }
        }

        true
    }
}

impl<'g> fmt::Debug for CodeMatch<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("CodeMatch");
        if let Some(name) = &self.name {
            debug.field("name", name);
        }
        if self.predicate.is_some() {
            return debug.field("predicate", &"<fn>").finish();
        }
        if !self.opcodes.is_empty() {
            let mut opcodes: Vec<&str> = self.opcodes.iter().map(Opcode::mnemonic).collect();
            opcodes.sort_unstable();
            debug.field("opcodes", &opcodes);
        }
        if !self.operands.is_empty() {
            debug.field("operands", &self.operands);
        }
        if !self.labels.is_empty() {
            debug.field("labels", &self.labels);
        }
        if !self.blocks.is_empty() {
            debug.field("blocks", &self.blocks);
        }
        if !self.jumps_from.is_empty() {
            debug.field("jumps_from", &self.jumps_from);
        }
        if !self.jumps_to.is_empty() {
            debug.field("jumps_to", &self.jumps_to);
        }
        debug.finish()
    }
}
