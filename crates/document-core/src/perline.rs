//! Per-line stores.
//!
//! Each store tracks one kind of per-line state (markers, fold levels, line
//! state, margin text, annotations) and is kept aligned with the document's
//! line structure through the [`PerLineStore`] trait: the modification
//! gateway fans `insert_line(s)`/`remove_line` out to every store whenever
//! the line count changes.

use crate::Line;

/// Bit mask of marker numbers present on a line.
pub type MarkerMask = u32;

/// Fold level of a line: a nesting number plus flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldLevel(pub i32);

impl FoldLevel {
    /// Base of the level number space.
    pub const BASE: i32 = 0x400;
    /// Flag: the line is blank for folding purposes.
    pub const WHITE: i32 = 0x1000;
    /// Flag: the line starts a fold block.
    pub const HEADER: i32 = 0x2000;
    const NUMBER_MASK: i32 = 0x0FFF;

    /// The default level: base number, no flags.
    pub const fn default_level() -> Self {
        Self(Self::BASE)
    }

    /// The nesting number part.
    pub const fn number(self) -> i32 {
        self.0 & Self::NUMBER_MASK
    }

    /// Whether the header flag is set.
    pub const fn is_header(self) -> bool {
        self.0 & Self::HEADER != 0
    }

    /// Whether the whitespace flag is set.
    pub const fn is_white(self) -> bool {
        self.0 & Self::WHITE != 0
    }
}

impl Default for FoldLevel {
    fn default() -> Self {
        Self::default_level()
    }
}

/// A store with one record per document line.
pub trait PerLineStore {
    /// Drop all records.
    fn init(&mut self);
    /// Whether the store holds any data worth maintaining.
    fn is_active(&self) -> bool;
    /// A line was inserted before `line`.
    fn insert_line(&mut self, line: Line);
    /// `count` lines were inserted before `line`.
    fn insert_lines(&mut self, line: Line, count: Line) {
        for i in 0..count {
            self.insert_line(line + i);
        }
    }
    /// The record for `line` was removed.
    fn remove_line(&mut self, line: Line);
}

fn clamp_index(line: Line, len: usize) -> Option<usize> {
    if line < 0 {
        return None;
    }
    let line = line as usize;
    (line < len).then_some(line)
}

// ---- markers ----

/// One marker instance on a line, identified by a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerInstance {
    /// Unique handle for later removal.
    pub handle: i32,
    /// The marker number in 0..32.
    pub number: i32,
}

/// Markers per line with stable handles.
#[derive(Debug, Default)]
pub struct LineMarkers {
    markers: Vec<Vec<MarkerInstance>>,
    next_handle: i32,
}

impl LineMarkers {
    /// Add a marker to `line`, returning its handle, or -1 when the line is
    /// out of range.
    pub fn add_mark(&mut self, line: Line, marker_num: i32, lines: Line) -> i32 {
        self.ensure_lines(lines);
        let Some(index) = clamp_index(line, self.markers.len()) else {
            return -1;
        };
        self.next_handle += 1;
        let handle = self.next_handle;
        self.markers[index].push(MarkerInstance {
            handle,
            number: marker_num,
        });
        handle
    }

    /// Delete markers numbered `marker_num` from `line`; with `all` every
    /// matching marker goes, otherwise only the first. `marker_num` < 0
    /// matches any marker. Returns whether something was deleted.
    pub fn delete_mark(&mut self, line: Line, marker_num: i32, all: bool) -> bool {
        let Some(index) = clamp_index(line, self.markers.len()) else {
            return false;
        };
        let set = &mut self.markers[index];
        let before = set.len();
        if all {
            set.retain(|m| marker_num >= 0 && m.number != marker_num);
        } else if let Some(at) = set
            .iter()
            .position(|m| marker_num < 0 || m.number == marker_num)
        {
            set.remove(at);
        }
        set.len() != before
    }

    /// Delete the marker with `handle` wherever it is.
    pub fn delete_mark_from_handle(&mut self, handle: i32) {
        for set in &mut self.markers {
            set.retain(|m| m.handle != handle);
        }
    }

    /// Mask of marker numbers on `line`.
    pub fn mark_value(&self, line: Line) -> MarkerMask {
        clamp_index(line, self.markers.len())
            .map(|index| {
                self.markers[index]
                    .iter()
                    .fold(0, |mask, m| mask | (1 << m.number))
            })
            .unwrap_or(0)
    }

    /// First line at or after `line_start` whose markers intersect `mask`,
    /// or -1.
    pub fn marker_next(&self, line_start: Line, mask: MarkerMask) -> Line {
        let from = line_start.max(0) as usize;
        for line in from..self.markers.len() {
            if self.mark_value(line as Line) & mask != 0 {
                return line as Line;
            }
        }
        -1
    }

    /// Line currently holding the marker with `handle`, or -1.
    pub fn line_from_handle(&self, handle: i32) -> Line {
        for (line, set) in self.markers.iter().enumerate() {
            if set.iter().any(|m| m.handle == handle) {
                return line as Line;
            }
        }
        -1
    }

    /// Number of the `which`-th marker on `line`, or -1.
    pub fn number_from_line(&self, line: Line, which: i32) -> i32 {
        clamp_index(line, self.markers.len())
            .and_then(|index| self.markers[index].get(which.max(0) as usize))
            .map_or(-1, |m| m.number)
    }

    /// Handle of the `which`-th marker on `line`, or -1.
    pub fn handle_from_line(&self, line: Line, which: i32) -> i32 {
        clamp_index(line, self.markers.len())
            .and_then(|index| self.markers[index].get(which.max(0) as usize))
            .map_or(-1, |m| m.handle)
    }

    fn ensure_lines(&mut self, lines: Line) {
        if self.markers.len() < lines.max(0) as usize {
            self.markers.resize(lines as usize, Vec::new());
        }
    }
}

impl PerLineStore for LineMarkers {
    fn init(&mut self) {
        self.markers.clear();
    }

    fn is_active(&self) -> bool {
        self.markers.iter().any(|set| !set.is_empty())
    }

    fn insert_line(&mut self, line: Line) {
        if self.markers.is_empty() {
            return;
        }
        let at = (line.max(0) as usize).min(self.markers.len());
        self.markers.insert(at, Vec::new());
    }

    fn remove_line(&mut self, line: Line) {
        if let Some(index) = clamp_index(line, self.markers.len()) {
            // Markers on a deleted line accumulate onto the previous line so
            // handles stay alive.
            let orphans = self.markers.remove(index);
            if index > 0 {
                self.markers[index - 1].extend(orphans);
            }
        }
    }
}

// ---- fold levels ----

/// Fold level per line.
#[derive(Debug, Default)]
pub struct LineLevels {
    levels: Vec<i32>,
}

impl LineLevels {
    /// Set the level of `line`, returning the previous value.
    pub fn set_level(&mut self, line: Line, level: i32, lines: Line) -> i32 {
        if line < 0 || line >= lines {
            return FoldLevel::default_level().0;
        }
        self.ensure_lines(lines);
        let prev = self.levels[line as usize];
        self.levels[line as usize] = level;
        prev
    }

    /// Level of `line`; lines without data are at the base level.
    pub fn get_level(&self, line: Line) -> i32 {
        clamp_index(line, self.levels.len())
            .map(|index| self.levels[index])
            .unwrap_or(FoldLevel::default_level().0)
    }

    /// Drop all fold data.
    pub fn clear_levels(&mut self) {
        self.levels.clear();
    }

    /// The closest header line at or above `line` whose number is smaller
    /// than `line`'s number, or -1.
    pub fn get_fold_parent(&self, line: Line) -> Line {
        let number = FoldLevel(self.get_level(line)).number();
        let mut look = line - 1;
        while look >= 0 {
            let look_level = FoldLevel(self.get_level(look));
            if look_level.is_header() && look_level.number() < number {
                return look;
            }
            look -= 1;
        }
        -1
    }

    fn ensure_lines(&mut self, lines: Line) {
        if self.levels.len() < lines.max(0) as usize {
            self.levels
                .resize(lines as usize, FoldLevel::default_level().0);
        }
    }
}

impl PerLineStore for LineLevels {
    fn init(&mut self) {
        self.levels.clear();
    }

    fn is_active(&self) -> bool {
        !self.levels.is_empty()
    }

    fn insert_line(&mut self, line: Line) {
        if self.levels.is_empty() {
            return;
        }
        let at = (line.max(0) as usize).min(self.levels.len());
        // New lines take the level of the line they split from.
        let level = if at > 0 {
            self.levels[at - 1]
        } else {
            FoldLevel::default_level().0
        };
        self.levels.insert(at, level);
    }

    fn remove_line(&mut self, line: Line) {
        if let Some(index) = clamp_index(line, self.levels.len()) {
            self.levels.remove(index);
        }
    }
}

// ---- line state ----

/// Arbitrary integer state per line, for lexers.
#[derive(Debug, Default)]
pub struct LineStates {
    states: Vec<i32>,
}

impl LineStates {
    /// Set the state of `line`, returning the previous value.
    pub fn set_line_state(&mut self, line: Line, state: i32, lines: Line) -> i32 {
        if line < 0 || line >= lines {
            return 0;
        }
        if self.states.len() < lines as usize {
            self.states.resize(lines as usize, 0);
        }
        let prev = self.states[line as usize];
        self.states[line as usize] = state;
        prev
    }

    /// State of `line`, 0 when unset.
    pub fn get_line_state(&self, line: Line) -> i32 {
        clamp_index(line, self.states.len())
            .map(|index| self.states[index])
            .unwrap_or(0)
    }
}

impl PerLineStore for LineStates {
    fn init(&mut self) {
        self.states.clear();
    }

    fn is_active(&self) -> bool {
        !self.states.is_empty()
    }

    fn insert_line(&mut self, line: Line) {
        if self.states.is_empty() {
            return;
        }
        let at = (line.max(0) as usize).min(self.states.len());
        self.states.insert(at, 0);
    }

    fn remove_line(&mut self, line: Line) {
        if let Some(index) = clamp_index(line, self.states.len()) {
            self.states.remove(index);
        }
    }
}

// ---- annotations ----

/// Text attached to a line: margin text, annotation, or EOL annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationText {
    /// The text, possibly spanning several display lines.
    pub text: String,
    /// Style number for the whole text.
    pub style: i32,
}

/// Per-line attached text store, used for margins, annotations, and EOL
/// annotations alike.
#[derive(Debug, Default)]
pub struct LineAnnotations {
    annotations: Vec<Option<AnnotationText>>,
}

impl LineAnnotations {
    /// Set or clear the text of `line`.
    pub fn set_text(&mut self, line: Line, text: Option<&str>, lines: Line) {
        if line < 0 || line >= lines {
            return;
        }
        if self.annotations.len() < lines as usize {
            self.annotations.resize(lines as usize, None);
        }
        self.annotations[line as usize] = text.map(|text| AnnotationText {
            text: text.to_string(),
            style: 0,
        });
    }

    /// The text of `line`, if any.
    pub fn text(&self, line: Line) -> Option<&str> {
        clamp_index(line, self.annotations.len())
            .and_then(|index| self.annotations[index].as_ref())
            .map(|a| a.text.as_str())
    }

    /// Set the style of the text on `line`.
    pub fn set_style(&mut self, line: Line, style: i32) {
        if let Some(index) = clamp_index(line, self.annotations.len()) {
            if let Some(annotation) = &mut self.annotations[index] {
                annotation.style = style;
            }
        }
    }

    /// Style of the text on `line`, 0 when unset.
    pub fn style(&self, line: Line) -> i32 {
        clamp_index(line, self.annotations.len())
            .and_then(|index| self.annotations[index].as_ref())
            .map_or(0, |a| a.style)
    }

    /// Number of display lines the annotation occupies (0 when absent).
    pub fn lines(&self, line: Line) -> i32 {
        self.text(line)
            .map_or(0, |text| text.split('\n').count() as i32)
    }

    /// Whether no line carries any text.
    pub fn empty(&self) -> bool {
        self.annotations.iter().all(Option::is_none)
    }

    /// Drop every record.
    pub fn clear_all(&mut self) {
        self.annotations.clear();
    }
}

impl PerLineStore for LineAnnotations {
    fn init(&mut self) {
        self.annotations.clear();
    }

    fn is_active(&self) -> bool {
        !self.annotations.is_empty()
    }

    fn insert_line(&mut self, line: Line) {
        if self.annotations.is_empty() {
            return;
        }
        let at = (line.max(0) as usize).min(self.annotations.len());
        self.annotations.insert(at, None);
    }

    fn remove_line(&mut self, line: Line) {
        if let Some(index) = clamp_index(line, self.annotations.len()) {
            self.annotations.remove(index);
        }
    }
}
