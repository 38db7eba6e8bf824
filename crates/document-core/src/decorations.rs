//! Indicator decorations.
//!
//! A decoration layer maps byte ranges to integer values for one indicator
//! (squiggles, match highlights, and similar overlays). Layers shift with
//! text modifications: insertions open space, deletions close it. Decoration
//! state is derived, never part of the undo history.

use crate::Position;

/// A run of equal decoration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Run {
    start: Position,
    end: Position,
    value: i32,
}

/// Result of a fill: the sub-range that actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillResult {
    /// Whether anything changed.
    pub changed: bool,
    /// Start of the changed range.
    pub position: Position,
    /// Length of the changed range.
    pub fill_length: Position,
}

/// Value runs for one indicator.
#[derive(Debug, Default)]
pub struct Decoration {
    /// The indicator number this layer belongs to.
    pub indicator: i32,
    runs: Vec<Run>,
}

impl Decoration {
    fn new(indicator: i32) -> Self {
        Self {
            indicator,
            runs: Vec::new(),
        }
    }

    /// Value at `pos`, 0 when unfilled.
    pub fn value_at(&self, pos: Position) -> i32 {
        self.runs
            .iter()
            .find(|r| r.start <= pos && pos < r.end)
            .map_or(0, |r| r.value)
    }

    /// Whether the layer holds no runs.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Start of the run containing `pos` (or of the hole it sits in).
    pub fn start_run(&self, pos: Position) -> Position {
        self.runs
            .iter()
            .rev()
            .find(|r| r.end <= pos)
            .map_or(0, |r| r.end)
            .max(
                self.runs
                    .iter()
                    .find(|r| r.start <= pos && pos < r.end)
                    .map_or(0, |r| r.start),
            )
    }

    /// End of the run containing `pos` (or of the hole it sits in).
    pub fn end_run(&self, pos: Position, length: Position) -> Position {
        for r in &self.runs {
            if r.start <= pos && pos < r.end {
                return r.end;
            }
            if r.start > pos {
                return r.start;
            }
        }
        length
    }

    fn fill(&mut self, position: Position, value: i32, fill_length: Position) -> FillResult {
        let unchanged = FillResult {
            changed: false,
            position,
            fill_length,
        };
        if fill_length <= 0 {
            return unchanged;
        }
        let end = position + fill_length;
        if value != 0 {
            // Already covered with the same value?
            let covered = self
                .runs
                .iter()
                .any(|r| r.value == value && r.start <= position && end <= r.end);
            if covered {
                return unchanged;
            }
        } else if self.runs.iter().all(|r| r.end <= position || r.start >= end) {
            return unchanged;
        }
        self.remove_range(position, end);
        if value != 0 {
            let at = self.runs.partition_point(|r| r.start < position);
            self.runs.insert(
                at,
                Run {
                    start: position,
                    end,
                    value,
                },
            );
            self.coalesce();
        }
        FillResult {
            changed: true,
            position,
            fill_length,
        }
    }

    fn remove_range(&mut self, start: Position, end: Position) {
        let mut fresh = Vec::new();
        for r in &self.runs {
            if r.end <= start || r.start >= end {
                fresh.push(*r);
                continue;
            }
            if r.start < start {
                fresh.push(Run {
                    start: r.start,
                    end: start,
                    value: r.value,
                });
            }
            if r.end > end {
                fresh.push(Run {
                    start: end,
                    end: r.end,
                    value: r.value,
                });
            }
        }
        self.runs = fresh;
    }

    fn coalesce(&mut self) {
        let mut merged: Vec<Run> = Vec::with_capacity(self.runs.len());
        for r in self.runs.drain(..) {
            match merged.last_mut() {
                Some(last) if last.end == r.start && last.value == r.value => {
                    last.end = r.end;
                }
                _ => merged.push(r),
            }
        }
        self.runs = merged;
    }

    fn insert_space(&mut self, position: Position, len: Position) {
        for r in &mut self.runs {
            if r.start >= position {
                r.start += len;
                r.end += len;
            } else if r.end > position {
                // Insertion inside a run extends it.
                r.end += len;
            }
        }
    }

    fn delete_range(&mut self, position: Position, len: Position) {
        let end = position + len;
        self.runs.retain_mut(|r| {
            if r.start >= end {
                r.start -= len;
                r.end -= len;
            } else if r.end > position {
                r.start = r.start.min(position);
                r.end = if r.end >= end { r.end - len } else { position };
            }
            r.start < r.end
        });
        self.coalesce();
    }
}

/// All decoration layers of a document plus the current indicator state used
/// by the fill API.
pub struct DecorationList {
    current_indicator: i32,
    current_value: i32,
    decorations: Vec<Decoration>,
}

impl DecorationList {
    /// An empty set of layers.
    pub fn new() -> Self {
        Self {
            current_indicator: 0,
            current_value: 1,
            decorations: Vec::new(),
        }
    }

    /// Select the indicator subsequent fills apply to.
    pub fn set_current_indicator(&mut self, indicator: i32) {
        self.current_indicator = indicator;
        self.current_value = 1;
    }

    /// The indicator subsequent fills apply to.
    pub fn current_indicator(&self) -> i32 {
        self.current_indicator
    }

    /// Select the value subsequent fills write.
    pub fn set_current_value(&mut self, value: i32) {
        self.current_value = if value == 0 { 1 } else { value };
    }

    /// The value subsequent fills write.
    pub fn current_value(&self) -> i32 {
        self.current_value
    }

    /// Fill `fill_length` bytes at `position` on the current indicator.
    pub fn fill_range(&mut self, position: Position, value: i32, fill_length: Position) -> FillResult {
        let indicator = self.current_indicator;
        self.layer_mut(indicator).fill(position, value, fill_length)
    }

    /// The layer for `indicator`, if it has been written to.
    pub fn layer(&self, indicator: i32) -> Option<&Decoration> {
        self.decorations.iter().find(|d| d.indicator == indicator)
    }

    /// Value of `indicator` at `pos`.
    pub fn value_at(&self, indicator: i32, pos: Position) -> i32 {
        self.layer(indicator).map_or(0, |d| d.value_at(pos))
    }

    /// Shift every layer for an insertion.
    pub fn insert_space(&mut self, position: Position, len: Position) {
        for d in &mut self.decorations {
            d.insert_space(position, len);
        }
    }

    /// Shift every layer for a deletion.
    pub fn delete_range(&mut self, position: Position, len: Position) {
        for d in &mut self.decorations {
            d.delete_range(position, len);
        }
        self.decorations.retain(|d| !d.is_empty());
    }

    fn layer_mut(&mut self, indicator: i32) -> &mut Decoration {
        if let Some(at) = self
            .decorations
            .iter()
            .position(|d| d.indicator == indicator)
        {
            &mut self.decorations[at]
        } else {
            self.decorations.push(Decoration::new(indicator));
            self.decorations.last_mut().expect("just pushed")
        }
    }
}

impl Default for DecorationList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_and_query() {
        let mut list = DecorationList::new();
        list.set_current_indicator(2);
        let fr = list.fill_range(3, 7, 4);
        assert!(fr.changed);
        assert_eq!(list.value_at(2, 3), 7);
        assert_eq!(list.value_at(2, 6), 7);
        assert_eq!(list.value_at(2, 7), 0);
        assert_eq!(list.value_at(1, 3), 0);
    }

    #[test]
    fn refill_same_value_reports_unchanged() {
        let mut list = DecorationList::new();
        list.set_current_indicator(0);
        assert!(list.fill_range(0, 5, 10).changed);
        assert!(!list.fill_range(2, 5, 4).changed);
        assert!(list.fill_range(2, 6, 4).changed);
    }

    #[test]
    fn clearing_with_zero() {
        let mut list = DecorationList::new();
        list.set_current_indicator(0);
        list.fill_range(0, 5, 10);
        assert!(list.fill_range(4, 0, 2).changed);
        assert_eq!(list.value_at(0, 3), 5);
        assert_eq!(list.value_at(0, 4), 0);
        assert_eq!(list.value_at(0, 6), 5);
        assert!(!list.fill_range(4, 0, 2).changed);
    }

    #[test]
    fn insert_space_shifts_and_extends() {
        let mut list = DecorationList::new();
        list.set_current_indicator(0);
        list.fill_range(4, 9, 4); // [4, 8)
        list.insert_space(2, 3);
        assert_eq!(list.value_at(0, 7), 9);
        assert_eq!(list.value_at(0, 10), 9);
        assert_eq!(list.value_at(0, 11), 0);
        // Insertion inside the run extends it.
        list.insert_space(8, 2);
        assert_eq!(list.value_at(0, 12), 9);
    }

    #[test]
    fn delete_range_contracts() {
        let mut list = DecorationList::new();
        list.set_current_indicator(0);
        list.fill_range(4, 9, 4); // [4, 8)
        list.delete_range(5, 2); // removes two decorated bytes
        assert_eq!(list.value_at(0, 4), 9);
        assert_eq!(list.value_at(0, 5), 9);
        assert_eq!(list.value_at(0, 6), 0);
        list.delete_range(0, 6);
        assert!(list.layer(0).is_none());
    }
}
