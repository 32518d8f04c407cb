use super::Instruction;
use std::fmt;

/// Opaque label
///
/// A label is both the operand of a branch and a tag on the instruction being branched to.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Label(usize);

impl Label {
    /// Label with a host-assigned identifier
    ///
    /// The patch host uses this when translating the branch targets of the incoming method
    /// body. Labels created during editing come from a [`LabelGenerator`] instead.
    pub const fn new(id: usize) -> Label {
        Label(id)
    }

    pub const fn id(&self) -> usize {
        self.0
    }

    /// Get the next fresh label
    pub fn next(&self) -> Label {
        Label(self.0 + 1)
    }
}

/// Generates new labels
pub trait LabelGenerator<Label> {
    /// Generate a fresh label
    fn fresh_label(&mut self) -> Label;
}

/// Label generator for [`Label`]
///
/// Cloning does not split the generator source - the cloned generator will produce the same
/// sequence of labels as the original.
#[derive(Clone, Debug)]
pub struct SeqLabelGenerator(Label);

impl SeqLabelGenerator {
    pub fn new(start: Label) -> SeqLabelGenerator {
        SeqLabelGenerator(start)
    }

    /// Generator whose labels are all greater than any label mentioned (as a tag or as an
    /// operand) in the given instructions
    pub fn after<'a, 'g: 'a>(
        instructions: impl IntoIterator<Item = &'a Instruction<'g>>,
    ) -> SeqLabelGenerator {
        let next = instructions
            .into_iter()
            .flat_map(|insn| insn.labels.iter().chain(insn.branch_targets()))
            .max()
            .map_or(Label(0), Label::next);
        SeqLabelGenerator(next)
    }

    /// Make sure every label generated from now on is greater than `label`
    pub fn skip_past(&mut self, label: Label) {
        if self.0 <= label {
            self.0 = label.next();
        }
    }
}

impl LabelGenerator<Label> for SeqLabelGenerator {
    fn fresh_label(&mut self) -> Label {
        let to_return = self.0;
        self.0 = self.0.next();
        to_return
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.0))
    }
}
