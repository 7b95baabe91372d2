use crate::commands::EditOperation;
use crate::error::{invalid, CoreError, Result};
use crate::timeline::Timeline;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// One undo step: a single operation or a macro of several.
#[derive(Debug)]
struct Entry {
    text: String,
    ops: Vec<EditOperation>,
    is_macro: bool,
}

impl Entry {
    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        for op in self.ops.iter_mut().rev() {
            op.undo(timeline)?;
        }
        Ok(())
    }

    fn redo(&mut self, timeline: &mut Timeline) -> Result<()> {
        for op in self.ops.iter_mut() {
            op.apply(timeline)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct OpenMacro {
    entry: Entry,
    depth: usize,
}

/// Undo/redo history with macro grouping and merging of repeated
/// adjustments.
#[derive(Debug)]
pub struct UndoStack {
    undo_stack: VecDeque<Entry>,
    redo_stack: Vec<Entry>,
    limit: usize,
    open_macro: Option<OpenMacro>,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(0)
    }
}

impl UndoStack {
    /// `limit` caps the number of undo steps kept; 0 keeps everything.
    pub fn new(limit: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            limit,
            open_macro: None,
        }
    }

    /// Apply `op` and record it. On error nothing is recorded and the
    /// model is as it was before the call.
    pub fn push(&mut self, op: impl Into<EditOperation>, timeline: &mut Timeline) -> Result<()> {
        let mut op = op.into();
        op.apply(timeline)?;
        self.redo_stack.clear();
        if let Some(open) = self.open_macro.as_mut() {
            open.entry.ops.push(op);
            return Ok(());
        }
        if let Some(top) = self.undo_stack.back_mut() {
            if !top.is_macro && top.ops.len() == 1 && top.ops[0].merge_with(&op) {
                debug!(text = top.text, "merged into previous step");
                return Ok(());
            }
        }
        self.record(Entry {
            text: op.text().to_string(),
            ops: vec![op],
            is_macro: false,
        });
        Ok(())
    }

    fn record(&mut self, entry: Entry) {
        self.undo_stack.push_back(entry);
        if self.limit > 0 && self.undo_stack.len() > self.limit {
            self.undo_stack.pop_front();
        }
    }

    /// Group every push until the matching [`UndoStack::end_macro`] into
    /// one undo step. Nested calls join the outer macro.
    pub fn begin_macro(&mut self, text: impl Into<String>) {
        match self.open_macro.as_mut() {
            Some(open) => open.depth += 1,
            None => {
                self.open_macro = Some(OpenMacro {
                    entry: Entry {
                        text: text.into(),
                        ops: Vec::new(),
                        is_macro: true,
                    },
                    depth: 1,
                })
            }
        }
    }

    pub fn end_macro(&mut self) -> Result<()> {
        let open = self.open_macro.as_mut().ok_or(CoreError::NoOpenMacro)?;
        open.depth -= 1;
        if open.depth > 0 {
            return Ok(());
        }
        if let Some(open) = self.open_macro.take() {
            if open.entry.ops.is_empty() {
                debug!(text = open.entry.text, "empty macro dropped");
            } else {
                self.record(open.entry);
            }
        }
        Ok(())
    }

    /// Revert everything pushed since the outermost `begin_macro` and
    /// discard the macro.
    pub fn abort_macro(&mut self, timeline: &mut Timeline) -> Result<()> {
        let mut open = self.open_macro.take().ok_or(CoreError::NoOpenMacro)?;
        warn!(text = open.entry.text, ops = open.entry.ops.len(), "macro aborted");
        open.entry.undo(timeline)
    }

    pub fn is_macro_open(&self) -> bool {
        self.open_macro.is_some()
    }

    pub fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        if self.is_macro_open() {
            return Err(invalid("cannot undo while a macro is open"));
        }
        let mut entry = self.undo_stack.pop_back().ok_or(CoreError::NothingToUndo)?;
        entry.undo(timeline)?;
        debug!(text = entry.text, "undo");
        self.redo_stack.push(entry);
        Ok(())
    }

    pub fn redo(&mut self, timeline: &mut Timeline) -> Result<()> {
        if self.is_macro_open() {
            return Err(invalid("cannot redo while a macro is open"));
        }
        let mut entry = self.redo_stack.pop().ok_or(CoreError::NothingToRedo)?;
        entry.redo(timeline)?;
        debug!(text = entry.text, "redo");
        self.undo_stack.push_back(entry);
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_text(&self) -> Option<&str> {
        self.undo_stack.back().map(|e| e.text.as_str())
    }

    pub fn redo_text(&self) -> Option<&str> {
        self.redo_stack.last().map(|e| e.text.as_str())
    }

    /// Total steps, undone ones included.
    pub fn count(&self) -> usize {
        self.undo_stack.len() + self.redo_stack.len()
    }

    /// Steps currently applied.
    pub fn index(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.open_macro = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::*;
    use crate::testing::*;

    fn timeline() -> Timeline {
        Timeline::from_model(model_with(&[clip(100), blank(50), clip(100)]))
    }

    fn text(tl: &Timeline) -> String {
        tl.model().to_text().unwrap()
    }

    // -----------------------------------------------------------------------
    // Basic undo/redo
    // -----------------------------------------------------------------------

    #[test]
    fn undo_redo_round_trip() {
        let mut tl = timeline();
        let mut history = UndoStack::new(100);
        let before = text(&tl);

        history.push(LiftCommand::new(0, 0), &mut tl).unwrap();
        let after = text(&tl);
        assert_eq!(history.undo_text(), Some("Lift from track"));

        history.undo(&mut tl).unwrap();
        assert_eq!(text(&tl), before);
        assert!(history.can_redo());
        assert_eq!(history.redo_text(), Some("Lift from track"));

        history.redo(&mut tl).unwrap();
        assert_eq!(text(&tl), after);
        assert_eq!((history.index(), history.count()), (1, 1));
    }

    #[test]
    fn new_push_clears_redo() {
        let mut tl = timeline();
        let mut history = UndoStack::new(100);
        history.push(LiftCommand::new(0, 0), &mut tl).unwrap();
        history.undo(&mut tl).unwrap();
        history.push(SplitCommand::new(0, 0, 50), &mut tl).unwrap();
        assert!(!history.can_redo());
        assert_eq!(history.count(), 1);
    }

    #[test]
    fn empty_stacks_error() {
        let mut tl = timeline();
        let mut history = UndoStack::default();
        assert!(matches!(history.undo(&mut tl), Err(CoreError::NothingToUndo)));
        assert!(matches!(history.redo(&mut tl), Err(CoreError::NothingToRedo)));
        assert!(matches!(history.end_macro(), Err(CoreError::NoOpenMacro)));
    }

    #[test]
    fn failed_push_records_nothing() {
        let mut tl = timeline();
        let mut history = UndoStack::new(100);
        let before = text(&tl);
        let result = history.push(RemoveCommand::new(0, 9), &mut tl);
        assert!(result.is_err());
        assert!(!history.can_undo());
        assert_eq!(text(&tl), before);
    }

    #[test]
    fn limit_drops_oldest() {
        let mut tl = timeline();
        let mut history = UndoStack::new(2);
        history.push(MuteTrackCommand::new(0, true, false), &mut tl).unwrap();
        history.push(HideTrackCommand::new(0, true, false), &mut tl).unwrap();
        history.push(LockTrackCommand::new(0, true, false), &mut tl).unwrap();
        assert_eq!(history.count(), 2);
        history.undo(&mut tl).unwrap();
        history.undo(&mut tl).unwrap();
        assert!(!history.can_undo());
        assert!(tl.model().is_track_muted(0), "oldest step is gone");
        assert!(!tl.model().is_track_hidden(0));
    }

    #[test]
    fn limit_holds_over_many_pushes() {
        let mut tl = timeline();
        let mut history = UndoStack::new(3);
        for n in 0..50 {
            let locked = n % 2 == 0;
            history
                .push(LockTrackCommand::new(0, locked, !locked), &mut tl)
                .unwrap();
        }
        assert_eq!(history.count(), 3);
        assert_eq!(history.index(), 3);
        for _ in 0..3 {
            history.undo(&mut tl).unwrap();
        }
        assert!(!history.can_undo());
        // Steps 47..49 were undone, leaving step 46 (locked) in place.
        assert!(tl.model().is_track_locked(0));
    }

    // -----------------------------------------------------------------------
    // Macros
    // -----------------------------------------------------------------------

    #[test]
    fn macro_is_one_step() {
        let mut tl = timeline();
        let mut history = UndoStack::new(100);
        let before = text(&tl);

        history.begin_macro("Remove clips");
        history.push(RemoveCommand::new(0, 2), &mut tl).unwrap();
        history.push(RemoveCommand::new(0, 0), &mut tl).unwrap();
        history.end_macro().unwrap();

        assert_eq!(tl.model().clip_count(0), 0);
        assert_eq!(history.count(), 1);
        assert_eq!(history.undo_text(), Some("Remove clips"));
        history.undo(&mut tl).unwrap();
        assert_eq!(text(&tl), before);
        history.redo(&mut tl).unwrap();
        assert_eq!(tl.model().clip_count(0), 0);
    }

    #[test]
    fn nested_macros_join_the_outer_one() {
        let mut tl = timeline();
        let mut history = UndoStack::new(100);
        history.begin_macro("outer");
        history.push(MuteTrackCommand::new(0, true, false), &mut tl).unwrap();
        history.begin_macro("inner");
        history.push(HideTrackCommand::new(0, true, false), &mut tl).unwrap();
        history.end_macro().unwrap();
        assert!(history.is_macro_open());
        assert!(history.undo(&mut tl).is_err(), "no undo inside a macro");
        history.end_macro().unwrap();
        assert_eq!(history.count(), 1);
        assert_eq!(history.undo_text(), Some("outer"));
    }

    #[test]
    fn aborted_macro_reverts_its_steps() {
        let mut tl = timeline();
        let mut history = UndoStack::new(100);
        let before = text(&tl);
        history.begin_macro("Append");
        history.push(AddTrackCommand::new(crate::model::TrackKind::Video), &mut tl).unwrap();
        history.push(LiftCommand::new(1, 0), &mut tl).unwrap();
        history.abort_macro(&mut tl).unwrap();
        assert_eq!(text(&tl), before);
        assert!(!history.can_undo());
        assert!(!history.is_macro_open());
    }

    #[test]
    fn empty_macro_is_dropped() {
        let mut history = UndoStack::new(100);
        history.begin_macro("nothing");
        history.end_macro().unwrap();
        assert_eq!(history.count(), 0);
    }

    // -----------------------------------------------------------------------
    // Merging
    // -----------------------------------------------------------------------

    #[test]
    fn repeated_trims_merge() {
        let mut tl = timeline();
        let mut history = UndoStack::new(100);
        let before = text(&tl);
        history.push(TrimClipOutCommand::new(0, 0, -10, false), &mut tl).unwrap();
        history.push(TrimClipOutCommand::new(0, 0, -5, false), &mut tl).unwrap();
        assert_eq!(history.count(), 1);
        assert_eq!(tl.model().clip_info(0, 0).unwrap().frame_count, 85);
        history.undo(&mut tl).unwrap();
        assert_eq!(text(&tl), before);
    }

    #[test]
    fn different_targets_do_not_merge() {
        let mut tl = timeline();
        let mut history = UndoStack::new(100);
        history.push(FadeInCommand::new(0, 0, 10), &mut tl).unwrap();
        history.push(FadeInCommand::new(0, 2, 10), &mut tl).unwrap();
        assert_eq!(history.count(), 2);
    }

    #[test]
    fn steps_inside_a_macro_never_merge_outward() {
        let mut tl = timeline();
        let mut history = UndoStack::new(100);
        history.push(FadeInCommand::new(0, 0, 10), &mut tl).unwrap();
        history.begin_macro("fade");
        history.push(FadeInCommand::new(0, 0, 20), &mut tl).unwrap();
        history.end_macro().unwrap();
        assert_eq!(history.count(), 2);
        history.undo(&mut tl).unwrap();
        assert_eq!(tl.model().fade_in_duration(0, 0), 10);
    }
}
