use super::{
    CodeMatch, ExceptionBlock, Instruction, Label, LabelGenerator, Opcode, Operand,
    SeqLabelGenerator,
};
use crate::il::{Error, Settings};
use std::collections::{HashMap, HashSet};

/// Direction in which searches and matches scan
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    fn step(self) -> isize {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }

    /// Where a scan in this direction ends up once it runs out of instructions
    fn sentinel(self, len: usize) -> isize {
        match self {
            Direction::Forward => len as isize,
            Direction::Backward => -1,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }
}

/// The last `match_*` call, kept around so that `repeat` can run it again
#[derive(Clone, Debug)]
struct LastMatch<'g> {
    patterns: Vec<CodeMatch<'g>>,
    use_end: bool,
    direction: Direction,
}

impl<'g> LastMatch<'g> {
    /// Where to scan for the next match, given the position after handling this one
    ///
    /// Backward scans restart in front of the handled match so they cannot find it again.
    fn resume_from(&self, position: isize) -> isize {
        match self.direction {
            Direction::Forward => position.saturating_add(1),
            Direction::Backward if self.use_end => {
                let offset = self.patterns.len().saturating_sub(1) as isize;
                position.saturating_sub(offset).saturating_sub(1)
            }
            Direction::Backward => position.saturating_sub(1),
        }
    }
}

/// Editor over the instructions of one method body
///
/// The cursor owns the instructions and a current position. The position ranges over
/// `-1..=len`: `-1` and `len` are sentinels meaning "before the start" and "past the end", and
/// they are where searches and matches land when they run out of instructions. A fresh cursor
/// starts at `-1`, so call [`seek_start`](Self::seek_start) or search before editing.
///
/// ### Failure tiers
///
/// Searching is soft: a failed search or match leaves the cursor on a sentinel and records a
/// message readable with [`last_error`](Self::last_error). Callers check
/// [`is_valid`](Self::is_valid), hand the failure to [`report_failure`](Self::report_failure), or
/// escalate with the `ensure*` family, which returns an [`Error`] right away.
///
/// Structural edits require a valid position and fail with [`Error::PositionOutOfRange`]
/// otherwise.
///
/// ### Labels
///
/// Labels live on the instruction they tag. Inserting code in front of a branch target leaves the
/// label on the old target, and removing an instruction drops its labels: use
/// [`move_labels`](Self::move_labels) first if the jump should land somewhere else.
#[derive(Clone, Debug)]
pub struct CodeCursor<'g> {
    instructions: Vec<Instruction<'g>>,
    position: isize,

    /// Instructions captured by named patterns in the last successful match
    last_matches: HashMap<String, Instruction<'g>>,
    last_error: Option<String>,
    last_match: Option<LastMatch<'g>>,

    label_generator: SeqLabelGenerator,
    settings: Settings,
}

impl<'g> CodeCursor<'g> {
    /// Start editing a sequence of instructions
    pub fn new(instructions: Vec<Instruction<'g>>) -> CodeCursor<'g> {
        CodeCursor::with_settings(instructions, Settings::default())
    }

    pub fn with_settings(instructions: Vec<Instruction<'g>>, settings: Settings) -> CodeCursor<'g> {
        let label_generator = SeqLabelGenerator::after(&instructions);
        CodeCursor {
            instructions,
            position: -1,
            last_matches: HashMap::new(),
            last_error: None,
            last_match: None,
            label_generator,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Current position (possibly one of the `-1` or `len` sentinels)
    pub fn position(&self) -> isize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Number of instructions from the current position to the end
    pub fn remaining(&self) -> usize {
        self.len().saturating_sub(self.position.max(0) as usize)
    }

    pub fn is_valid(&self) -> bool {
        self.position >= 0 && (self.position as usize) < self.instructions.len()
    }

    pub fn is_invalid(&self) -> bool {
        !self.is_valid()
    }

    /// Message recorded by the last failed search or match
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub(crate) fn set_last_error(&mut self, message: String) {
        self.last_error = Some(message);
    }

    /// Instruction captured under `name` by the last successful match
    pub fn named_match(&self, name: &str) -> Option<&Instruction<'g>> {
        self.last_matches.get(name)
    }

    /// Instruction at the current position
    pub fn instruction(&self) -> Option<&Instruction<'g>> {
        self.peek(0)
    }

    pub fn instruction_mut(&mut self) -> Option<&mut Instruction<'g>> {
        let index = self.valid_index().ok()?;
        self.instructions.get_mut(index)
    }

    pub fn opcode(&self) -> Option<Opcode> {
        self.instruction().map(|insn| insn.opcode)
    }

    pub fn operand(&self) -> Option<&Operand<'g>> {
        self.instruction().and_then(|insn| insn.operand.as_ref())
    }

    /// Labels on the current instruction (empty if the cursor is invalid)
    pub fn labels(&self) -> &[Label] {
        self.instruction()
            .map(|insn| insn.labels.as_slice())
            .unwrap_or_default()
    }

    /// Exception markers on the current instruction (empty if the cursor is invalid)
    pub fn blocks(&self) -> &[ExceptionBlock<'g>] {
        self.instruction()
            .map(|insn| insn.blocks.as_slice())
            .unwrap_or_default()
    }

    /// Instruction at an offset from the current position, without moving
    pub fn peek(&self, offset: isize) -> Option<&Instruction<'g>> {
        let index = self.position.saturating_add(offset);
        if index < 0 {
            None
        } else {
            self.instructions.get(index as usize)
        }
    }

    /// Instruction at an absolute index
    pub fn instruction_at(&self, index: usize) -> Option<&Instruction<'g>> {
        self.instructions.get(index)
    }

    pub fn instructions(&self) -> &[Instruction<'g>] {
        &self.instructions
    }

    /// Instructions between two absolute indices (both inclusive, in either order)
    pub fn instructions_in_range(&self, start: usize, end: usize) -> Option<&[Instruction<'g>]> {
        let (start, end) = if start > end { (end, start) } else { (start, end) };
        self.instructions.get(start..=end)
    }

    /// Instructions between two offsets from the current position (both inclusive)
    pub fn instructions_with_offsets(
        &self,
        start_offset: isize,
        end_offset: isize,
    ) -> Option<&[Instruction<'g>]> {
        let start = usize::try_from(self.position.saturating_add(start_offset)).ok()?;
        let end = usize::try_from(self.position.saturating_add(end_offset)).ok()?;
        self.instructions_in_range(start, end)
    }

    /// Stop editing and take the instructions out, unchecked
    pub fn into_instructions(self) -> Vec<Instruction<'g>> {
        self.instructions
    }

    /// Stop editing and take the instructions out
    ///
    /// If [`Settings::verify_labels`] is set, this fails unless every label tags exactly one
    /// instruction and every branch target is tagged somewhere.
    pub fn finish(self) -> Result<Vec<Instruction<'g>>, Error> {
        if self.settings.verify_labels {
            self.verify_labels()?;
        }
        Ok(self.instructions)
    }

    /// Branch targets that do not tag any instruction
    pub fn dangling_labels(&self) -> Vec<Label> {
        let tagged: HashSet<Label> = self
            .instructions
            .iter()
            .flat_map(|insn| insn.labels.iter().copied())
            .collect();
        let mut dangling: Vec<Label> = self
            .instructions
            .iter()
            .flat_map(|insn| insn.branch_targets().iter().copied())
            .filter(|label| !tagged.contains(label))
            .collect();
        dangling.sort_unstable();
        dangling.dedup();
        dangling
    }

    /// Check that labels are unique tags and that every branch target exists
    pub fn verify_labels(&self) -> Result<(), Error> {
        let mut tagged: HashSet<Label> = HashSet::new();
        for label in self.instructions.iter().flat_map(|insn| &insn.labels) {
            if !tagged.insert(*label) {
                return Err(Error::DuplicateLabel(*label));
            }
        }
        let dangling = self.dangling_labels();
        if dangling.is_empty() {
            Ok(())
        } else {
            Err(Error::DanglingLabels(dangling))
        }
    }

    // Navigation

    /// Move by `offset`, landing on the `-1` or `len` sentinel when overshooting
    pub fn advance(&mut self, offset: isize) -> &mut Self {
        let target = self.position.saturating_add(offset);
        self.position = if target < 0 {
            -1
        } else if target as usize >= self.instructions.len() {
            self.instructions.len() as isize
        } else {
            target
        };
        self
    }

    /// Move to the first instruction
    pub fn seek_start(&mut self) -> &mut Self {
        self.position = 0;
        self
    }

    /// Move to the last instruction
    pub fn seek_end(&mut self) -> &mut Self {
        self.position = self.instructions.len() as isize - 1;
        self
    }

    // Searching

    /// Move forward (starting at the current instruction) to the first instruction satisfying
    /// `predicate`
    pub fn search_forward(&mut self, predicate: impl Fn(&Instruction<'g>) -> bool) -> &mut Self {
        self.search(predicate, Direction::Forward)
    }

    /// Move backward (starting at the current instruction) to the first instruction satisfying
    /// `predicate`
    pub fn search_back(&mut self, predicate: impl Fn(&Instruction<'g>) -> bool) -> &mut Self {
        self.search(predicate, Direction::Backward)
    }

    fn search(
        &mut self,
        predicate: impl Fn(&Instruction<'g>) -> bool,
        direction: Direction,
    ) -> &mut Self {
        let start = self.position.max(0);
        self.position = start;
        while self.is_valid() {
            if predicate(&self.instructions[self.position as usize]) {
                self.last_error = None;
                return self;
            }
            self.advance(direction.step());
        }
        self.position = direction.sentinel(self.instructions.len());
        let message = format!(
            "no matching instruction searching {} from position {}",
            direction.describe(),
            start
        );
        log::trace!("{}", message);
        self.last_error = Some(message);
        self
    }

    // Matching

    /// Move forward to the first place where `patterns` match consecutive instructions
    ///
    /// On success, the cursor is on the first matched instruction, or on the last one if
    /// `use_end` is set.
    pub fn match_forward(&mut self, use_end: bool, patterns: &[CodeMatch<'g>]) -> &mut Self {
        self.start_match(patterns, use_end, Direction::Forward)
    }

    /// Move backward to the first place where `patterns` match consecutive instructions
    ///
    /// Candidate starting positions are tried from the current position towards the start.
    pub fn match_back(&mut self, use_end: bool, patterns: &[CodeMatch<'g>]) -> &mut Self {
        self.start_match(patterns, use_end, Direction::Backward)
    }

    pub fn match_start_forward(&mut self, patterns: &[CodeMatch<'g>]) -> &mut Self {
        self.match_forward(false, patterns)
    }

    pub fn match_end_forward(&mut self, patterns: &[CodeMatch<'g>]) -> &mut Self {
        self.match_forward(true, patterns)
    }

    pub fn match_start_back(&mut self, patterns: &[CodeMatch<'g>]) -> &mut Self {
        self.match_back(false, patterns)
    }

    pub fn match_end_back(&mut self, patterns: &[CodeMatch<'g>]) -> &mut Self {
        self.match_back(true, patterns)
    }

    fn start_match(
        &mut self,
        patterns: &[CodeMatch<'g>],
        use_end: bool,
        direction: Direction,
    ) -> &mut Self {
        let last_match = LastMatch {
            patterns: patterns.to_vec(),
            use_end,
            direction,
        };
        self.run_match(self.position.max(0), &last_match);
        self.last_match = Some(last_match);
        self
    }

    /// Scan from `start` (which is not clamped) and update the cursor state with the outcome
    fn run_match(&mut self, start: isize, last_match: &LastMatch<'g>) {
        let LastMatch {
            patterns,
            use_end,
            direction,
        } = last_match;
        match self.find_match(start, patterns, *direction) {
            Some((index, captures)) => {
                let offset = if *use_end {
                    patterns.len().saturating_sub(1)
                } else {
                    0
                };
                self.position = (index + offset) as isize;
                self.last_matches = captures;
                self.last_error = None;
            }
            None => {
                self.position = direction.sentinel(self.instructions.len());
                self.last_matches.clear();
                let message = format!(
                    "cannot find {:?} searching {} from position {}",
                    patterns,
                    direction.describe(),
                    start
                );
                log::trace!("{}", message);
                self.last_error = Some(message);
            }
        }
    }

    /// Find the first starting index (scanning from `start` in `direction`) at which the
    /// patterns match, along with the named captures
    fn find_match(
        &self,
        start: isize,
        patterns: &[CodeMatch<'g>],
        direction: Direction,
    ) -> Option<(usize, HashMap<String, Instruction<'g>>)> {
        let mut index = start;
        while index >= 0 && (index as usize) < self.instructions.len() {
            if let Some(captures) = self.match_sequence(index as usize, patterns) {
                return Some((index as usize, captures));
            }
            index += direction.step();
        }
        None
    }

    /// Match the patterns against the instructions starting exactly at `start`
    fn match_sequence(
        &self,
        start: usize,
        patterns: &[CodeMatch<'g>],
    ) -> Option<HashMap<String, Instruction<'g>>> {
        if start + patterns.len() > self.instructions.len() {
            return None;
        }
        let mut captures = HashMap::new();
        for (offset, pattern) in patterns.iter().enumerate() {
            let index = start + offset;
            if !pattern.matches(&self.instructions, index) {
                return None;
            }
            if let Some(name) = &pattern.name {
                captures.insert(name.clone(), self.instructions[index].clone());
            }
        }
        Some(captures)
    }

    /// Run `action` at every remaining match of the last `match_*` call
    ///
    /// After each run of `action`, the match is retried from wherever `action` left the cursor:
    /// one instruction further when matching forward, or just before the start of the handled
    /// match when matching backward. This stops when the match fails,
    /// leaving the cursor on a sentinel. An action that removes the matched instructions should
    /// therefore step back one instruction if the code following the removal may match too.
    pub fn repeat(
        &mut self,
        action: impl FnMut(&mut Self) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        self.repeat_or_else(action, |_| ())
    }

    /// Like [`repeat`](Self::repeat), but calls `not_found` with the last error if `action` never
    /// ran
    pub fn repeat_or_else(
        &mut self,
        mut action: impl FnMut(&mut Self) -> Result<(), Error>,
        not_found: impl FnOnce(&str),
    ) -> Result<&mut Self, Error> {
        let last_match = self.last_match.take().ok_or(Error::NoPriorMatch)?;

        let mut count: usize = 0;
        while self.is_valid() {
            action(self)?;
            count += 1;
            let next = last_match.resume_from(self.position);
            self.run_match(next, &last_match);
        }
        log::debug!("repeated action at {} matches of {:?}", count, last_match.patterns);
        self.last_match = None;

        if count == 0 {
            not_found(self.last_error.as_deref().unwrap_or("cursor is out of range"));
        }
        Ok(self)
    }

    // Failure handling

    /// Pass a failure message to `sink` if the cursor is invalid
    pub fn report_failure(&mut self, context: &str, sink: impl FnOnce(&str)) -> &mut Self {
        if self.is_invalid() {
            let message = format!(
                "Match failed in {}: {}",
                context,
                self.last_error.as_deref().unwrap_or("cursor is out of range")
            );
            if self.settings.log_reported_failures {
                log::warn!("{}", message);
            }
            sink(&message);
        }
        self
    }

    /// Fail if the cursor is not on an instruction
    pub fn ensure_valid(&mut self, explanation: &str) -> Result<&mut Self, Error> {
        if self.is_invalid() {
            return Err(Error::InvalidCursor {
                explanation: explanation.to_owned(),
                last_error: self.last_error.clone(),
            });
        }
        Ok(self)
    }

    /// Fail unless `patterns` match starting exactly at the current position
    ///
    /// The cursor does not move. Named patterns are captured on success.
    pub fn ensure_match(
        &mut self,
        explanation: &str,
        patterns: &[CodeMatch<'g>],
    ) -> Result<&mut Self, Error> {
        self.ensure_valid(explanation)?;
        match self.match_sequence(self.position as usize, patterns) {
            Some(captures) => {
                self.last_matches = captures;
                Ok(self)
            }
            None => Err(Error::PatternMismatch {
                explanation: explanation.to_owned(),
                position: self.position,
            }),
        }
    }

    /// Fail unless `patterns` match somewhere at or after the current position
    ///
    /// The cursor does not move.
    pub fn ensure_match_forward(
        &mut self,
        explanation: &str,
        patterns: &[CodeMatch<'g>],
    ) -> Result<&mut Self, Error> {
        self.ensure_found(explanation, patterns, Direction::Forward)
    }

    /// Fail unless `patterns` match somewhere starting at or before the current position
    ///
    /// The cursor does not move.
    pub fn ensure_match_back(
        &mut self,
        explanation: &str,
        patterns: &[CodeMatch<'g>],
    ) -> Result<&mut Self, Error> {
        self.ensure_found(explanation, patterns, Direction::Backward)
    }

    fn ensure_found(
        &mut self,
        explanation: &str,
        patterns: &[CodeMatch<'g>],
        direction: Direction,
    ) -> Result<&mut Self, Error> {
        self.ensure_valid(explanation)?;
        if self.find_match(self.position, patterns, direction).is_none() {
            return Err(Error::PatternMismatch {
                explanation: explanation.to_owned(),
                position: self.position,
            });
        }
        Ok(self)
    }

    /// Fail unless `condition` holds for the cursor
    pub fn ensure(
        &mut self,
        explanation: &str,
        condition: impl FnOnce(&Self) -> bool,
    ) -> Result<&mut Self, Error> {
        if condition(self) {
            Ok(self)
        } else {
            Err(Error::ConditionFailed(explanation.to_owned()))
        }
    }

    // Editing

    fn valid_index(&self) -> Result<usize, Error> {
        self.check_index(self.position)
    }

    fn check_index(&self, index: isize) -> Result<usize, Error> {
        if index >= 0 && (index as usize) < self.instructions.len() {
            Ok(index as usize)
        } else {
            Err(Error::PositionOutOfRange {
                position: index,
                length: self.instructions.len(),
            })
        }
    }

    /// Replace the current instruction (labels and exception markers included)
    pub fn set_instruction(&mut self, instruction: Instruction<'g>) -> Result<&mut Self, Error> {
        let index = self.valid_index()?;
        self.instructions[index] = instruction;
        Ok(self)
    }

    pub fn set_instruction_and_advance(
        &mut self,
        instruction: Instruction<'g>,
    ) -> Result<&mut Self, Error> {
        Ok(self.set_instruction(instruction)?.advance(1))
    }

    /// Change the opcode and operand of the current instruction, keeping its labels and
    /// exception markers
    pub fn set(&mut self, opcode: Opcode, operand: Option<Operand<'g>>) -> Result<&mut Self, Error> {
        let index = self.valid_index()?;
        let insn = &mut self.instructions[index];
        insn.opcode = opcode;
        insn.operand = operand;
        Ok(self)
    }

    pub fn set_and_advance(
        &mut self,
        opcode: Opcode,
        operand: Option<Operand<'g>>,
    ) -> Result<&mut Self, Error> {
        Ok(self.set(opcode, operand)?.advance(1))
    }

    pub fn set_opcode_and_advance(&mut self, opcode: Opcode) -> Result<&mut Self, Error> {
        let index = self.valid_index()?;
        self.instructions[index].opcode = opcode;
        Ok(self.advance(1))
    }

    pub fn set_operand_and_advance(&mut self, operand: Operand<'g>) -> Result<&mut Self, Error> {
        let index = self.valid_index()?;
        self.instructions[index].operand = Some(operand);
        Ok(self.advance(1))
    }

    /// Index at which instructions get inserted (anywhere from the start to just past the end)
    fn insertion_index(&self) -> Result<usize, Error> {
        if self.position >= 0 && self.position as usize <= self.instructions.len() {
            Ok(self.position as usize)
        } else {
            Err(Error::PositionOutOfRange {
                position: self.position,
                length: self.instructions.len(),
            })
        }
    }

    /// Insert instructions in front of the current one, without moving
    ///
    /// The cursor ends up on the first inserted instruction, so the instructions end up in the
    /// order given.
    pub fn insert(
        &mut self,
        instructions: impl IntoIterator<Item = Instruction<'g>>,
    ) -> Result<&mut Self, Error> {
        let index = self.insertion_index()?;
        self.instructions.splice(index..index, instructions);
        Ok(self)
    }

    /// Insert instructions in front of the current one, moving past each of them
    ///
    /// The cursor stays on the instruction it was on before the insertion.
    pub fn insert_and_advance(
        &mut self,
        instructions: impl IntoIterator<Item = Instruction<'g>>,
    ) -> Result<&mut Self, Error> {
        let mut index = self.insertion_index()?;
        for instruction in instructions {
            self.instructions.insert(index, instruction);
            index += 1;
        }
        self.position = index as isize;
        Ok(self)
    }

    /// Insert a branch to the instruction at `destination` in front of the current one
    ///
    /// A fresh label is attached to the destination first, so `destination` is the index before
    /// the insertion.
    pub fn insert_branch(&mut self, opcode: Opcode, destination: usize) -> Result<Label, Error> {
        self.insertion_index()?;
        let label = self.create_label_at(destination)?;
        self.insert([Instruction::new(opcode, label)])?;
        Ok(label)
    }

    pub fn insert_branch_and_advance(
        &mut self,
        opcode: Opcode,
        destination: usize,
    ) -> Result<Label, Error> {
        self.insertion_index()?;
        let label = self.create_label_at(destination)?;
        self.insert_and_advance([Instruction::new(opcode, label)])?;
        Ok(label)
    }

    /// Turn the current instruction into a branch to the instruction at `destination`
    pub fn set_jump_to(&mut self, opcode: Opcode, destination: usize) -> Result<Label, Error> {
        self.valid_index()?;
        let label = self.create_label_at(destination)?;
        self.set(opcode, Some(Operand::Label(label)))?;
        Ok(label)
    }

    /// Remove the current instruction, along with its labels and exception markers
    ///
    /// The cursor ends up on the instruction that followed.
    pub fn remove(&mut self) -> Result<&mut Self, Error> {
        let index = self.valid_index()?;
        self.instructions.remove(index);
        Ok(self)
    }

    /// Remove `count` instructions starting at the current one
    pub fn remove_range(&mut self, count: usize) -> Result<&mut Self, Error> {
        if count == 0 {
            return Ok(self);
        }
        let start = self.valid_index()?;
        let end = self.check_index(self.position.saturating_add(count as isize - 1))?;
        self.instructions.drain(start..=end);
        Ok(self)
    }

    /// Remove the instructions between two absolute indices (both inclusive, in either order)
    ///
    /// A cursor after the removed range keeps pointing at the same instruction. A cursor inside
    /// the range ends up on the instruction following the range.
    pub fn remove_in_range(&mut self, start: usize, end: usize) -> Result<&mut Self, Error> {
        let (start, end) = if start > end { (end, start) } else { (start, end) };
        self.check_index(end as isize)?;
        self.instructions.drain(start..=end);

        let removed = (end - start + 1) as isize;
        if self.position > end as isize {
            self.position -= removed;
        } else if self.position >= start as isize {
            self.position = start as isize;
        }
        Ok(self)
    }

    /// Remove the instructions between two offsets from the current position (both inclusive)
    pub fn remove_with_offsets(
        &mut self,
        start_offset: isize,
        end_offset: isize,
    ) -> Result<&mut Self, Error> {
        let start = self.check_index(self.position.saturating_add(start_offset))?;
        let end = self.check_index(self.position.saturating_add(end_offset))?;
        self.remove_in_range(start, end)
    }

    // Labels

    /// Make a label that does not occur anywhere in the instructions yet
    pub fn create_label(&mut self) -> Label {
        // Labels may have been attached since the generator was seeded
        if let Some(highest) = self
            .instructions
            .iter()
            .flat_map(|insn| insn.labels.iter().chain(insn.branch_targets()))
            .max()
        {
            self.label_generator.skip_past(*highest);
        }
        self.label_generator.fresh_label()
    }

    /// Make a fresh label and attach it to the instruction at `index`
    pub fn create_label_at(&mut self, index: usize) -> Result<Label, Error> {
        let index = self.check_index(index as isize)?;
        let label = self.create_label();
        self.instructions[index].labels.push(label);
        Ok(label)
    }

    /// Make a fresh label and attach it to the instruction at an offset from the cursor
    pub fn create_label_with_offset(&mut self, offset: isize) -> Result<Label, Error> {
        let index = self.check_index(self.position.saturating_add(offset))?;
        self.create_label_at(index)
    }

    /// Attach labels to the current instruction
    pub fn add_labels(
        &mut self,
        labels: impl IntoIterator<Item = Label>,
    ) -> Result<&mut Self, Error> {
        let index = self.valid_index()?;
        self.add_labels_at(index, labels)
    }

    /// Attach labels to the instruction at `index`
    pub fn add_labels_at(
        &mut self,
        index: usize,
        labels: impl IntoIterator<Item = Label>,
    ) -> Result<&mut Self, Error> {
        let index = self.check_index(index as isize)?;
        let insn = &mut self.instructions[index];
        for label in labels {
            if !insn.labels.contains(&label) {
                insn.labels.push(label);
            }
        }
        Ok(self)
    }

    /// Move every label on the instruction at `from` onto the instruction at `to`
    ///
    /// Branches that used to land on `from` land on `to` afterwards.
    pub fn move_labels(&mut self, from: usize, to: usize) -> Result<&mut Self, Error> {
        let from = self.check_index(from as isize)?;
        let to = self.check_index(to as isize)?;
        if from != to {
            let labels = std::mem::take(&mut self.instructions[from].labels);
            self.add_labels_at(to, labels)?;
        }
        Ok(self)
    }

    /// Move every exception marker on the instruction at `from` onto the instruction at `to`
    pub fn move_blocks(&mut self, from: usize, to: usize) -> Result<&mut Self, Error> {
        let from = self.check_index(from as isize)?;
        let to = self.check_index(to as isize)?;
        if from != to {
            let blocks = std::mem::take(&mut self.instructions[from].blocks);
            self.instructions[to].blocks.extend(blocks);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::il::code::ExceptionBlockKind;

    fn ldloc<'g>(idx: u16) -> Instruction<'g> {
        Instruction::new(Opcode::Ldloc, Operand::Local(idx))
    }

    fn ldc<'g>(value: i32) -> Instruction<'g> {
        Instruction::new(Opcode::LdcI4, value)
    }

    /// `ldloc.0; ldc.i4 1; add; stloc.0; ldloc.0; ret`
    fn sample<'g>() -> Vec<Instruction<'g>> {
        vec![
            ldloc(0),
            ldc(1),
            Instruction::simple(Opcode::Add),
            Instruction::new(Opcode::Stloc, Operand::Local(0)),
            ldloc(0),
            Instruction::simple(Opcode::Ret),
        ]
    }

    #[test]
    fn starts_before_the_first_instruction() {
        let cursor = CodeCursor::new(sample());
        assert_eq!(cursor.position(), -1);
        assert!(cursor.is_invalid());
        assert_eq!(cursor.remaining(), 6);
    }

    #[test]
    fn navigation_and_sentinels() {
        let mut cursor = CodeCursor::new(sample());
        assert_eq!(cursor.seek_start().position(), 0);
        assert!(cursor.is_valid());
        assert_eq!(cursor.seek_end().position(), 5);
        assert!(cursor.is_valid());
        assert_eq!(cursor.remaining(), 1);

        assert_eq!(cursor.advance(1).position(), 6);
        assert!(cursor.is_invalid());
        assert_eq!(cursor.advance(100).position(), 6);

        assert_eq!(cursor.seek_start().advance(-1).position(), -1);
        assert!(cursor.is_invalid());
        assert_eq!(cursor.advance(-100).position(), -1);

        // Stepping back in from a sentinel works
        assert_eq!(cursor.advance(3).position(), 2);
    }

    #[test]
    fn empty_sequence() {
        let mut cursor = CodeCursor::new(vec![]);
        assert!(cursor.seek_start().is_invalid());
        assert!(cursor.seek_end().is_invalid());
        assert!(cursor.search_forward(|_| true).is_invalid());
        assert!(cursor.last_error().is_some());
    }

    #[test]
    fn peek_does_not_move() {
        let mut cursor = CodeCursor::new(sample());
        cursor.seek_start().advance(2);
        assert_eq!(cursor.peek(0).map(|i| i.opcode), Some(Opcode::Add));
        assert_eq!(cursor.peek(1).map(|i| i.opcode), Some(Opcode::Stloc));
        assert_eq!(cursor.peek(-2).map(|i| i.opcode), Some(Opcode::Ldloc));
        assert!(cursor.peek(-3).is_none());
        assert!(cursor.peek(4).is_none());
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn search_for_unique_opcode() {
        let mut cursor = CodeCursor::new(sample());
        cursor.search_forward(|insn| insn.opcode == Opcode::Add);
        assert_eq!(cursor.position(), 2);
        assert!(cursor.last_error().is_none());

        cursor.search_forward(|insn| insn.opcode == Opcode::Mul);
        assert_eq!(cursor.position(), 6);
        assert!(cursor.is_invalid());
        assert!(cursor.last_error().is_some());
    }

    #[test]
    fn search_back_clamps_to_start() {
        let mut cursor = CodeCursor::new(sample());
        cursor.seek_end().search_back(|insn| insn.loads_local(Some(0)));
        assert_eq!(cursor.position(), 4);

        cursor.advance(-1).search_back(|insn| insn.loads_local(Some(0)));
        assert_eq!(cursor.position(), 0);

        cursor.search_back(|insn| insn.opcode == Opcode::Ret);
        assert_eq!(cursor.position(), -1);
        assert!(cursor.last_error().is_some());
    }

    #[test]
    fn match_start_and_end() {
        let patterns = [
            CodeMatch::opcode(Opcode::Stloc),
            CodeMatch::opcode(Opcode::Ldloc),
        ];
        let mut cursor = CodeCursor::new(sample());
        cursor.match_forward(false, &patterns);
        assert_eq!(cursor.position(), 3);

        cursor.seek_start().match_forward(true, &patterns);
        assert_eq!(cursor.position(), 4);

        cursor.seek_end().match_back(false, &patterns);
        assert_eq!(cursor.position(), 3);

        cursor.seek_end().match_back(true, &patterns);
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn match_failure_lands_on_sentinel() {
        let patterns = [CodeMatch::opcode(Opcode::Ret), CodeMatch::opcode(Opcode::Ret)];
        let mut cursor = CodeCursor::new(sample());
        cursor.match_start_forward(&patterns);
        assert_eq!(cursor.position(), 6);
        assert!(cursor.last_error().unwrap().contains("forward"));

        cursor.seek_end().match_start_back(&patterns);
        assert_eq!(cursor.position(), -1);
    }

    #[test]
    fn match_does_not_run_off_the_end() {
        // The tail `ldloc.0; ret` must not be treated as matching a three instruction pattern
        let patterns = [
            CodeMatch::opcode(Opcode::Ldloc),
            CodeMatch::opcode(Opcode::Ret),
            CodeMatch::any(),
        ];
        let mut cursor = CodeCursor::new(sample());
        assert!(cursor.match_start_forward(&patterns).is_invalid());
    }

    #[test]
    fn named_captures() {
        let code = vec![
            ldloc(3),
            Instruction::simple(Opcode::Call),
        ];
        let mut cursor = CodeCursor::new(code);
        cursor.match_start_forward(&[
            CodeMatch::opcode(Opcode::Ldloc).named("a"),
            CodeMatch::opcode(Opcode::Call),
        ]);
        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.named_match("a"), Some(&ldloc(3)));
        assert_eq!(cursor.named_match("b"), None);

        // A failed match forgets earlier captures
        cursor.match_start_forward(&[CodeMatch::opcode(Opcode::Ret).named("a")]);
        assert_eq!(cursor.named_match("a"), None);
    }

    #[test]
    fn repeat_visits_every_match() {
        let code = vec![
            ldc(1),
            Instruction::simple(Opcode::Pop),
            ldc(2),
            Instruction::simple(Opcode::Pop),
            Instruction::simple(Opcode::Nop),
            ldc(3),
            Instruction::simple(Opcode::Pop),
        ];
        let mut cursor = CodeCursor::new(code);
        let mut seen = vec![];
        cursor
            .match_start_forward(&[
                CodeMatch::opcode(Opcode::LdcI4).named("value"),
                CodeMatch::opcode(Opcode::Pop),
            ])
            .repeat(|cursor| {
                seen.push(cursor.named_match("value").cloned());
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, vec![Some(ldc(1)), Some(ldc(2)), Some(ldc(3))]);
        assert!(cursor.is_invalid());
    }

    #[test]
    fn repeat_backwards_terminates() {
        let code = vec![ldc(1), ldc(2), ldc(3)];
        let mut cursor = CodeCursor::new(code);
        let mut count = 0;
        cursor
            .seek_end()
            .match_start_back(&[CodeMatch::opcode(Opcode::LdcI4)])
            .repeat(|_| {
                count += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(cursor.position(), -1);
    }

    #[test]
    fn repeat_backwards_from_match_end() {
        let code = vec![
            ldc(1),
            Instruction::simple(Opcode::Pop),
            Instruction::simple(Opcode::Nop),
        ];
        let mut cursor = CodeCursor::new(code);
        let mut count = 0;
        cursor
            .seek_end()
            .match_end_back(&[CodeMatch::opcode(Opcode::LdcI4), CodeMatch::opcode(Opcode::Pop)])
            .repeat(|_| {
                count += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(cursor.position(), -1);

        let code = vec![
            ldc(1),
            Instruction::simple(Opcode::Pop),
            ldc(2),
            Instruction::simple(Opcode::Pop),
        ];
        let mut cursor = CodeCursor::new(code);
        let mut ends = vec![];
        cursor
            .seek_end()
            .match_end_back(&[CodeMatch::opcode(Opcode::LdcI4), CodeMatch::opcode(Opcode::Pop)])
            .repeat(|cursor| {
                ends.push(cursor.position());
                Ok(())
            })
            .unwrap();
        assert_eq!(ends, vec![3, 1]);
    }

    #[test]
    fn repeat_requires_a_match() {
        let mut cursor = CodeCursor::new(sample());
        assert!(matches!(cursor.repeat(|_| Ok(())), Err(Error::NoPriorMatch)));

        // The remembered match is consumed by `repeat`
        cursor.match_start_forward(&[CodeMatch::opcode(Opcode::Ret)]);
        cursor.repeat(|_| Ok(())).unwrap();
        assert!(matches!(cursor.repeat(|_| Ok(())), Err(Error::NoPriorMatch)));
    }

    #[test]
    fn repeat_reports_zero_matches() {
        let mut cursor = CodeCursor::new(sample());
        let mut reported = None;
        cursor
            .match_start_forward(&[CodeMatch::opcode(Opcode::Mul)])
            .repeat_or_else(
                |_| panic!("there is nothing to repeat"),
                |message| reported = Some(message.to_owned()),
            )
            .unwrap();
        assert!(reported.unwrap().contains("cannot find"));
    }

    #[test]
    fn repeat_propagates_action_errors() {
        let mut cursor = CodeCursor::new(sample());
        let result = cursor
            .match_start_forward(&[CodeMatch::opcode(Opcode::Ldloc)])
            .repeat(|cursor| cursor.ensure("stop", |_| false).map(|_| ()));
        assert!(matches!(result, Err(Error::ConditionFailed(_))));
    }

    #[test]
    fn insert_then_remove_restores() {
        let original = {
            let mut code = sample();
            code[3].labels.push(Label::new(0));
            code[1].blocks.push(ExceptionBlock::new(ExceptionBlockKind::BeginTry));
            code
        };
        for start in 0..=original.len() {
            let mut cursor = CodeCursor::new(original.clone());
            cursor.seek_start().advance(start as isize);
            cursor
                .insert([ldc(10), ldc(11), Instruction::simple(Opcode::Pop)])
                .unwrap();
            assert_eq!(cursor.len(), original.len() + 3);
            cursor.remove_range(3).unwrap();
            assert_eq!(cursor.instructions(), &original[..], "inserting at {}", start);
        }
    }

    #[test]
    fn insert_keeps_position_and_order() {
        let mut cursor = CodeCursor::new(sample());
        cursor.seek_start().advance(2);
        cursor.insert([ldc(7), ldc(8)]).unwrap();
        assert_eq!(cursor.position(), 2);
        assert_eq!(cursor.instruction(), Some(&ldc(7)));
        assert_eq!(cursor.peek(1), Some(&ldc(8)));
        assert_eq!(cursor.peek(2).map(|i| i.opcode), Some(Opcode::Add));
    }

    #[test]
    fn insert_and_advance_keeps_current_instruction() {
        let mut cursor = CodeCursor::new(sample());
        cursor.seek_start().advance(2);
        cursor.insert_and_advance([ldc(7), ldc(8)]).unwrap();
        assert_eq!(cursor.position(), 4);
        assert_eq!(cursor.opcode(), Some(Opcode::Add));
        assert_eq!(cursor.peek(-2), Some(&ldc(7)));
        assert_eq!(cursor.peek(-1), Some(&ldc(8)));
    }

    #[test]
    fn insert_at_end_appends() {
        let mut cursor = CodeCursor::new(sample());
        cursor.seek_end().advance(1);
        cursor.insert([Instruction::simple(Opcode::Nop)]).unwrap();
        assert_eq!(cursor.len(), 7);
        assert_eq!(cursor.opcode(), Some(Opcode::Nop));
    }

    #[test]
    fn edits_need_a_valid_cursor() {
        let mut cursor = CodeCursor::new(sample());
        assert!(matches!(
            cursor.remove(),
            Err(Error::PositionOutOfRange { position: -1, .. })
        ));
        assert!(cursor.set(Opcode::Nop, None).is_err());
        assert!(cursor.insert([ldc(1)]).is_err());

        cursor.seek_end().advance(1);
        assert!(cursor.remove().is_err());
        assert!(cursor.set_instruction(ldc(1)).is_err());

        cursor.seek_end();
        assert!(cursor.remove_range(2).is_err());
        assert_eq!(cursor.len(), 6);
    }

    #[test]
    fn set_keeps_labels() {
        let mut code = sample();
        code[2].labels.push(Label::new(0));
        let mut cursor = CodeCursor::new(code);
        cursor.seek_start().advance(2);
        cursor.set_and_advance(Opcode::Sub, None).unwrap();
        assert_eq!(cursor.position(), 3);
        assert_eq!(cursor.peek(-1).unwrap().opcode, Opcode::Sub);
        assert_eq!(cursor.peek(-1).unwrap().labels, vec![Label::new(0)]);

        cursor.set_instruction_and_advance(ldc(0)).unwrap();
        assert_eq!(cursor.peek(-1), Some(&ldc(0)));

        cursor
            .set_opcode_and_advance(Opcode::Ldarg)
            .unwrap()
            .set_operand_and_advance(Operand::Int32(5))
            .unwrap();
        assert_eq!(cursor.instructions()[4].opcode, Opcode::Ldarg);
        assert_eq!(cursor.instructions()[5].operand, Some(Operand::Int32(5)));
        assert!(cursor.is_invalid());
    }

    #[test]
    fn remove_in_range_adjusts_position() {
        let mut cursor = CodeCursor::new(sample());
        cursor.seek_end();
        cursor.remove_in_range(3, 1).unwrap();
        assert_eq!(cursor.len(), 3);
        assert_eq!(cursor.position(), 2);
        assert_eq!(cursor.opcode(), Some(Opcode::Ret));

        let mut cursor = CodeCursor::new(sample());
        cursor.seek_start().advance(2);
        cursor.remove_with_offsets(-1, 1).unwrap();
        assert_eq!(cursor.position(), 1);
        assert_eq!(cursor.instruction(), Some(&ldloc(0)));
        assert_eq!(
            cursor.instructions().iter().map(|i| i.opcode).collect::<Vec<_>>(),
            vec![Opcode::Ldloc, Opcode::Ldloc, Opcode::Ret]
        );
    }

    #[test]
    fn fresh_labels_avoid_existing_ones() {
        let mut code = sample();
        code[0].labels.push(Label::new(4));
        code.insert(0, Instruction::new(Opcode::Br, Label::new(9)));
        let mut cursor = CodeCursor::new(code);
        let label = cursor.create_label();
        assert!(label.id() > 9);
        assert_ne!(cursor.create_label(), label);
    }

    #[test]
    fn branch_insertion() {
        let mut cursor = CodeCursor::new(sample());
        cursor.seek_start();
        let label = cursor.insert_branch(Opcode::Br, 5).unwrap();
        assert_eq!(cursor.instruction(), Some(&Instruction::new(Opcode::Br, label)));
        assert_eq!(cursor.instructions()[6].opcode, Opcode::Ret);
        assert_eq!(cursor.instructions()[6].labels, vec![label]);
        assert!(cursor.dangling_labels().is_empty());

        cursor.advance(1);
        let second = cursor.set_jump_to(Opcode::Brtrue, 6).unwrap();
        assert_eq!(cursor.operand(), Some(&Operand::Label(second)));
        assert_eq!(cursor.instructions()[6].labels, vec![label, second]);
        assert!(cursor.verify_labels().is_ok());
    }

    #[test]
    fn moving_labels_redirects_jumps() {
        let mut code = sample();
        code[5].labels.push(Label::new(0));
        code.insert(0, Instruction::new(Opcode::Br, Label::new(0)));
        let mut cursor = CodeCursor::new(code);

        // Put a `nop` in front of the `ret` and make it the jump target
        cursor.seek_end();
        cursor.insert([Instruction::simple(Opcode::Nop)]).unwrap();
        let nop = cursor.position() as usize;
        cursor.move_labels(nop + 1, nop).unwrap();
        cursor
            .seek_start()
            .ensure_match(
                "branch to the nop",
                &[CodeMatch::opcode(Opcode::Br).jumps_to(nop)],
            )
            .unwrap();
        assert!(cursor.instructions()[nop + 1].labels.is_empty());
    }

    #[test]
    fn label_verification() {
        let mut code = sample();
        code.insert(0, Instruction::new(Opcode::Br, Label::new(7)));
        let cursor = CodeCursor::new(code.clone());
        assert_eq!(cursor.dangling_labels(), vec![Label::new(7)]);
        assert!(matches!(cursor.finish(), Err(Error::DanglingLabels(_))));

        code[1].labels.push(Label::new(7));
        code[2].labels.push(Label::new(7));
        let cursor = CodeCursor::new(code.clone());
        assert!(matches!(cursor.finish(), Err(Error::DuplicateLabel(_))));

        // Verification can be turned off
        let settings = Settings {
            verify_labels: false,
            ..Settings::default()
        };
        let cursor = CodeCursor::with_settings(code, settings);
        assert_eq!(cursor.finish().unwrap().len(), 7);
    }

    #[test]
    fn hard_failures() {
        let mut cursor = CodeCursor::new(sample());
        assert!(matches!(
            cursor.ensure_valid("need an instruction"),
            Err(Error::InvalidCursor { .. })
        ));

        cursor.seek_start();
        assert!(cursor
            .ensure_match("load then add", &[CodeMatch::opcode(Opcode::Ldloc)])
            .is_ok());
        assert!(matches!(
            cursor.ensure_match("add first", &[CodeMatch::opcode(Opcode::Add)]),
            Err(Error::PatternMismatch { position: 0, .. })
        ));

        assert!(cursor
            .ensure_match_forward("has a ret", &[CodeMatch::opcode(Opcode::Ret)])
            .is_ok());
        assert_eq!(cursor.position(), 0);
        assert!(cursor
            .ensure_match_back("ret before start", &[CodeMatch::opcode(Opcode::Ret)])
            .is_err());
        assert!(cursor.ensure("short", |c| c.len() < 10).is_ok());
        assert!(cursor.ensure("long", |c| c.len() > 10).is_err());
    }

    #[test]
    fn failure_reports_only_when_invalid() {
        let mut cursor = CodeCursor::new(sample());
        let mut messages = vec![];
        cursor
            .seek_start()
            .report_failure("Patch.Update", |m| messages.push(m.to_owned()))
            .search_forward(|insn| insn.opcode == Opcode::Throw)
            .report_failure("Patch.Update", |m| messages.push(m.to_owned()));
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Match failed in Patch.Update"));
    }

    #[test]
    fn clones_are_independent() {
        let mut cursor = CodeCursor::new(sample());
        cursor.match_start_forward(&[CodeMatch::opcode(Opcode::Add).named("op")]);

        let mut lookahead = cursor.clone();
        lookahead.remove().unwrap();
        lookahead.match_start_forward(&[CodeMatch::opcode(Opcode::Mul).named("op")]);

        assert_eq!(cursor.len(), 6);
        assert_eq!(cursor.position(), 2);
        assert!(cursor.named_match("op").is_some());
        assert!(cursor.last_error().is_none());
        assert!(lookahead.named_match("op").is_none());
        assert!(lookahead.last_error().is_some());
    }

    #[test]
    fn created_labels_skip_attached_ones() {
        let mut cursor = CodeCursor::new(vec![
            Instruction::simple(Opcode::Nop),
            Instruction::simple(Opcode::Ret),
        ]);
        cursor.seek_start().add_labels([Label::new(0)]).unwrap();
        let fresh = cursor.create_label();
        assert_eq!(fresh, Label::new(1));

        cursor
            .insert([Instruction::simple(Opcode::Nop).with_labels([Label::new(5)])])
            .unwrap();
        assert_eq!(cursor.create_label(), Label::new(6));
        assert!(cursor.verify_labels().is_ok());
    }

    #[test]
    fn extreme_offsets_land_on_sentinels() {
        let mut cursor = CodeCursor::new(sample());
        cursor.seek_start();
        assert!(cursor.peek(isize::MAX).is_none());
        assert!(cursor.peek(isize::MIN).is_none());
        assert_eq!(cursor.advance(isize::MAX).position(), 6);
        assert_eq!(cursor.advance(isize::MIN).position(), -1);
    }

    #[test]
    fn exhausted_searches_land_on_sentinels() {
        let mut cursor = CodeCursor::new(vec![]);
        cursor.search_back(|_| true);
        assert_eq!(cursor.position(), -1);
        assert!(cursor.last_error().is_some());
        cursor.search_forward(|_| true);
        assert_eq!(cursor.position(), 0);

        let mut cursor = CodeCursor::new(sample());
        cursor.seek_end().search_back(|insn| insn.opcode == Opcode::Throw);
        assert_eq!(cursor.position(), -1);
    }
}
