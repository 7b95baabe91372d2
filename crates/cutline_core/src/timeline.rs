use crate::events::{EventBus, TimelineEvent};
use crate::model::MultitrackModel;
use crate::profile::Profile;
use crate::selection::{Selection, SelectionState};

/// Everything a command may touch: the model, the selection and the bus
/// both of them publish on.
#[derive(Debug)]
pub struct Timeline {
    model: MultitrackModel,
    selection: SelectionState,
    events: EventBus,
}

impl Timeline {
    pub fn new(profile: Profile) -> Self {
        let events = EventBus::new();
        let model = MultitrackModel::new(profile, events.clone());
        Self {
            model,
            selection: SelectionState::default(),
            events,
        }
    }

    pub fn from_model(model: MultitrackModel) -> Self {
        let events = model.events().clone();
        Self {
            model,
            selection: SelectionState::default(),
            events,
        }
    }

    pub fn model(&self) -> &MultitrackModel {
        &self.model
    }

    pub(crate) fn model_mut(&mut self) -> &mut MultitrackModel {
        &mut self.model
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn selection(&self) -> &Selection {
        self.selection.current()
    }

    /// Emits one selection-changed notification when the selection differs.
    pub fn set_selection(&mut self, selection: Selection) -> bool {
        let changed = self.selection.set(selection);
        if changed {
            self.events.emit(TimelineEvent::SelectionChanged);
        }
        changed
    }

    pub fn save_and_clear_selection(&mut self) {
        self.selection.save_and_clear();
        self.events.emit(TimelineEvent::SelectionChanged);
    }

    pub fn restore_selection(&mut self) {
        self.selection.restore();
        self.events.emit(TimelineEvent::SelectionChanged);
    }
}
