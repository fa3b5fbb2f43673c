//! Context window construction.
//!
//! The window around a unit is the text of up to `before` preceding units and
//! up to `after` following units. The unit itself is never part of its own
//! window.

/// Line that tells the service the enclosed text is context only.
pub const CONTEXT_HEADER: &str =
    "Do not include any of the following, this is only to provide context";

const BEFORE_LABEL: &str = "\nChapters Before:\n";
const AFTER_LABEL: &str = "\nChapters After:\n";

/// Index ranges covered by a context window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBounds {
    /// First preceding unit (inclusive).
    pub start: usize,
    /// One past the last following unit.
    pub end: usize,
}

impl WindowBounds {
    pub fn new(len: usize, index: usize, before: usize, after: usize) -> Self {
        let start = index.saturating_sub(before).min(len);
        let end = index.saturating_add(after).saturating_add(1).min(len);
        Self { start, end }
    }

    pub fn before(&self, index: usize, len: usize) -> std::ops::Range<usize> {
        self.start..index.min(len).max(self.start)
    }

    pub fn after(&self, index: usize) -> std::ops::Range<usize> {
        let first = index.saturating_add(1);
        first.min(self.end)..self.end
    }
}

/// Build the context string for the unit at `index`.
///
/// Pure and deterministic; indices are clamped to the sequence so any
/// combination of arguments yields a well-formed string.
pub fn build_context<S: AsRef<str>>(
    sequence: &[S],
    index: usize,
    before: usize,
    after: usize,
) -> String {
    let bounds = WindowBounds::new(sequence.len(), index, before, after);

    let mut out = String::from(CONTEXT_HEADER);
    out.push_str(BEFORE_LABEL);
    for unit in &sequence[bounds.before(index, sequence.len())] {
        out.push_str(unit.as_ref());
        out.push('\n');
    }
    out.push_str(AFTER_LABEL);
    for unit in &sequence[bounds.after(index)] {
        out.push_str(unit.as_ref());
        out.push('\n');
    }
    out
}
