//! Reversible action log.
//!
//! The history records insert, remove, and container actions partitioned into
//! groups. A current index separates the performed past from the redoable
//! future. Three markers attach to indices: the save point (matches on-disk
//! state), a detach point, and the start of a tentative span that can be
//! rolled back or committed as a unit.

use crate::Position;

/// Kind of a recorded action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Text was inserted; undo removes it.
    Insert,
    /// Text was removed; undo reinserts it.
    Remove,
    /// A host-defined action. Carries a token in `position`, is never
    /// replayed on the buffer, but is re-notified on undo/redo.
    Container,
}

/// One recorded action.
#[derive(Debug, Clone)]
pub struct Action {
    /// What happened.
    pub kind: ActionKind,
    /// Byte position of the change, or the host token for containers.
    pub position: Position,
    /// The inserted or removed bytes; empty for containers.
    pub text: Vec<u8>,
    group: u64,
    may_coalesce: bool,
}

impl Action {
    /// Length in bytes of the recorded text.
    pub fn len_data(&self) -> Position {
        self.text.len() as Position
    }
}

/// The grouped action log.
pub struct UndoHistory {
    actions: Vec<Action>,
    current: usize,
    next_group: u64,
    sequence_depth: i32,
    sequence_group: Option<u64>,
    break_coalesce: bool,
    save_point: Option<usize>,
    detach_point: Option<usize>,
    tentative_point: Option<usize>,
    collecting: bool,
}

impl UndoHistory {
    /// A fresh, empty history at its save point.
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            current: 0,
            next_group: 1,
            sequence_depth: 0,
            sequence_group: None,
            break_coalesce: false,
            save_point: Some(0),
            detach_point: None,
            tentative_point: None,
            collecting: true,
        }
    }

    /// Whether actions are being recorded.
    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    /// Turn recording on or off. Turning it off discards the log.
    pub fn set_collecting(&mut self, collect: bool) {
        if collect != self.collecting {
            self.collecting = collect;
            if !collect {
                self.delete_history();
            }
        }
    }

    /// Discard every recorded action and reset markers.
    pub fn delete_history(&mut self) {
        self.actions.clear();
        self.current = 0;
        self.sequence_group = None;
        self.break_coalesce = false;
        self.save_point = Some(0);
        self.detach_point = None;
        self.tentative_point = None;
    }

    /// Record an action, truncating any redoable future.
    ///
    /// Returns true when the action starts a new group.
    pub fn append(
        &mut self,
        kind: ActionKind,
        position: Position,
        text: Vec<u8>,
        may_coalesce: bool,
    ) -> bool {
        if self.current < self.actions.len() {
            self.actions.truncate(self.current);
        }
        // Markers beyond the truncation point can never be reached again.
        if self.save_point.is_some_and(|sp| sp > self.current) {
            self.save_point = None;
        }
        if self.detach_point.is_some_and(|dp| dp > self.current) {
            self.detach_point = None;
        }

        let group = self.assign_group(kind, position, text.len(), may_coalesce);
        let start_sequence = self
            .actions
            .last()
            .map_or(true, |prev| prev.group != group);
        self.actions.push(Action {
            kind,
            position,
            text,
            group,
            may_coalesce,
        });
        self.current = self.actions.len();
        start_sequence
    }

    fn assign_group(
        &mut self,
        kind: ActionKind,
        position: Position,
        len: usize,
        may_coalesce: bool,
    ) -> u64 {
        if self.sequence_depth > 0 {
            // Everything inside a begin/end span shares one group.
            if let Some(group) = self.sequence_group {
                return group;
            }
            let group = self.fresh_group();
            self.sequence_group = Some(group);
            return group;
        }
        let coalesced = !self.break_coalesce
            && self.save_point != Some(self.current)
            && self.tentative_point != Some(self.current)
            && may_coalesce
            && self.coalesces_with_previous(kind, position, len);
        self.break_coalesce = false;
        match (coalesced, self.actions.last()) {
            (true, Some(prev)) => prev.group,
            _ => self.fresh_group(),
        }
    }

    fn coalesces_with_previous(&self, kind: ActionKind, position: Position, len: usize) -> bool {
        let Some(prev) = self.actions.last() else {
            return false;
        };
        if !prev.may_coalesce {
            return false;
        }
        match (kind, prev.kind) {
            // Container actions join the running group without breaking it.
            (ActionKind::Container, _) | (_, ActionKind::Container) => true,
            (ActionKind::Insert, ActionKind::Insert) => {
                position == prev.position + prev.len_data()
            }
            (ActionKind::Remove, ActionKind::Remove) => {
                // Delete-forward repeats at the same position; backspace walks
                // backwards ending where the previous removal started.
                position == prev.position || position + len as Position == prev.position
            }
            _ => false,
        }
    }

    fn fresh_group(&mut self) -> u64 {
        let group = self.next_group;
        self.next_group += 1;
        group
    }

    /// Open a grouping span; nested calls are counted.
    pub fn begin_undo_action(&mut self) {
        if self.sequence_depth == 0 {
            self.sequence_group = None;
        }
        self.sequence_depth += 1;
    }

    /// Close a grouping span, returning the resulting depth.
    pub fn end_undo_action(&mut self) -> i32 {
        if self.sequence_depth > 0 {
            self.sequence_depth -= 1;
            if self.sequence_depth == 0 {
                self.sequence_group = None;
                self.break_coalesce = true;
            }
        }
        self.sequence_depth
    }

    /// Current grouping depth.
    pub fn sequence_depth(&self) -> i32 {
        self.sequence_depth
    }

    /// True when at least one action can be undone.
    pub fn can_undo(&self) -> bool {
        self.current > 0 && self.sequence_depth == 0
    }

    /// True when at least one action can be redone.
    pub fn can_redo(&self) -> bool {
        self.current < self.actions.len() && self.sequence_depth == 0
    }

    /// Number of steps in the group about to be undone.
    pub fn start_undo(&self) -> usize {
        if self.current == 0 {
            return 0;
        }
        let group = self.actions[self.current - 1].group;
        self.actions[..self.current]
            .iter()
            .rev()
            .take_while(|a| a.group == group)
            .count()
    }

    /// The next action an undo would revert.
    pub fn undo_step(&self) -> &Action {
        &self.actions[self.current - 1]
    }

    /// Move the current index back one action.
    pub fn completed_undo_step(&mut self) {
        debug_assert!(self.current > 0);
        self.current -= 1;
        self.break_coalesce = true;
    }

    /// Number of steps in the group about to be redone.
    pub fn start_redo(&self) -> usize {
        if self.current >= self.actions.len() {
            return 0;
        }
        let group = self.actions[self.current].group;
        self.actions[self.current..]
            .iter()
            .take_while(|a| a.group == group)
            .count()
    }

    /// The next action a redo would reapply.
    pub fn redo_step(&self) -> &Action {
        &self.actions[self.current]
    }

    /// Move the current index forward one action.
    pub fn completed_redo_step(&mut self) {
        debug_assert!(self.current < self.actions.len());
        self.current += 1;
        self.break_coalesce = true;
    }

    /// Mark the current index as the save point.
    pub fn set_save_point(&mut self) {
        self.save_point = Some(self.current);
    }

    /// True when the current index is the save point.
    pub fn is_save_point(&self) -> bool {
        self.save_point == Some(self.current)
    }

    /// True when undoing one more action would move before the save point,
    /// i.e. the on-disk file would need reloading to follow.
    pub fn before_save_point(&self) -> bool {
        match self.save_point {
            Some(sp) => sp > self.current,
            None => true,
        }
    }

    /// Open a tentative span at the current index.
    pub fn tentative_start(&mut self) {
        self.tentative_point = Some(self.current);
    }

    /// Commit the tentative span; its actions become ordinary history.
    pub fn tentative_commit(&mut self) {
        self.tentative_point = None;
        // Truncate any rolled-back future so it cannot be redone.
        self.actions.truncate(self.current);
    }

    /// Whether a tentative span is open.
    pub fn tentative_active(&self) -> bool {
        self.tentative_point.is_some()
    }

    /// Number of actions between the tentative start and the current index.
    pub fn tentative_steps(&self) -> usize {
        match self.tentative_point {
            Some(tp) if self.current >= tp => self.current - tp,
            _ => 0,
        }
    }

    // Serialisation-style access to the raw log.

    /// Total number of recorded actions.
    pub fn actions_len(&self) -> usize {
        self.actions.len()
    }

    /// The current index (count of performed actions).
    pub fn current(&self) -> usize {
        self.current
    }

    /// Kind of the action at `index`, if any.
    pub fn action_kind(&self, index: usize) -> Option<ActionKind> {
        self.actions.get(index).map(|a| a.kind)
    }

    /// Position (or container token) of the action at `index`.
    pub fn action_position(&self, index: usize) -> Option<Position> {
        self.actions.get(index).map(|a| a.position)
    }

    /// Recorded text of the action at `index`.
    pub fn action_text(&self, index: usize) -> Option<&[u8]> {
        self.actions.get(index).map(|a| a.text.as_slice())
    }

    /// Index of the save point marker, or -1.
    pub fn save_point_index(&self) -> i64 {
        self.save_point.map_or(-1, |i| i as i64)
    }

    /// Move the save point marker to an action index.
    pub fn set_save_point_index(&mut self, index: i64) {
        self.save_point = usize::try_from(index).ok();
    }

    /// Index of the detach marker, or -1.
    pub fn detach_index(&self) -> i64 {
        self.detach_point.map_or(-1, |i| i as i64)
    }

    /// Move the detach marker to an action index.
    pub fn set_detach_index(&mut self, index: i64) {
        self.detach_point = usize::try_from(index).ok();
    }

    /// Index of the tentative marker, or -1.
    pub fn tentative_index(&self) -> i64 {
        self.tentative_point.map_or(-1, |i| i as i64)
    }

    /// Move the tentative marker to an action index.
    pub fn set_tentative_index(&mut self, index: i64) {
        self.tentative_point = usize::try_from(index).ok();
    }

    /// Append a container action carrying `token`.
    pub fn push_container_action(&mut self, token: Position) -> bool {
        self.append(ActionKind::Container, token, Vec::new(), true)
    }

    /// Replace the text of the most recent action, for hosts rebuilding a
    /// history from serialised form.
    pub fn change_last_action_text(&mut self, text: &[u8]) {
        if let Some(last) = self.actions.last_mut() {
            last.text = text.to_vec();
        }
    }
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new()
    }
}
