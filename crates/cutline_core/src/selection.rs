/// What the user has selected on the timeline: some clips on one track, a
/// whole track, or the composition as a whole. These are exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    clips: Vec<usize>,
    track: Option<usize>,
    multitrack: bool,
}

impl Selection {
    /// Normalizes the combination so only one kind of selection is active.
    pub fn new(clips: Vec<usize>, track: Option<usize>, multitrack: bool) -> Self {
        if multitrack {
            return Self::multitrack();
        }
        match track {
            Some(track) => Self {
                clips,
                track: Some(track),
                multitrack: false,
            },
            None => Self::none(),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn clips_on(track: usize, clips: Vec<usize>) -> Self {
        Self::new(clips, Some(track), false)
    }

    pub fn track(track: usize) -> Self {
        Self::new(Vec::new(), Some(track), false)
    }

    pub fn multitrack() -> Self {
        Self {
            clips: Vec::new(),
            track: None,
            multitrack: true,
        }
    }

    pub fn clips(&self) -> &[usize] {
        &self.clips
    }

    pub fn selected_track(&self) -> Option<usize> {
        self.track
    }

    pub fn is_multitrack(&self) -> bool {
        self.multitrack
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty() && self.track.is_none() && !self.multitrack
    }

    pub fn has_clips(&self) -> bool {
        !self.clips.is_empty()
    }
}

/// Current selection plus the slot used to stash it across operations that
/// must run with nothing selected.
#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    current: Selection,
    saved: Selection,
}

impl SelectionState {
    pub fn current(&self) -> &Selection {
        &self.current
    }

    pub fn saved(&self) -> &Selection {
        &self.saved
    }

    /// Returns whether anything changed.
    pub fn set(&mut self, selection: Selection) -> bool {
        if self.current == selection {
            return false;
        }
        self.current = selection;
        true
    }

    pub fn save_and_clear(&mut self) {
        self.saved = std::mem::take(&mut self.current);
    }

    pub fn restore(&mut self) {
        self.current = self.saved.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_exclusive() {
        let s = Selection::new(vec![1, 2], Some(0), true);
        assert!(s.is_multitrack());
        assert!(s.clips().is_empty());
        assert_eq!(s.selected_track(), None);

        let s = Selection::new(vec![1], None, false);
        assert!(s.is_empty());
    }

    #[test]
    fn set_reports_change() {
        let mut state = SelectionState::default();
        assert!(state.set(Selection::clips_on(1, vec![2])));
        assert!(!state.set(Selection::clips_on(1, vec![2])));
        assert!(state.set(Selection::track(1)));
    }

    #[test]
    fn save_clear_restore() {
        let mut state = SelectionState::default();
        state.set(Selection::clips_on(1, vec![2, 3]));
        state.save_and_clear();
        assert!(state.current().is_empty());
        assert_eq!(state.saved().clips(), &[2, 3]);
        state.restore();
        assert_eq!(state.current(), &Selection::clips_on(1, vec![2, 3]));
    }
}
