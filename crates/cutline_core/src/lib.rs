//! Multitrack timeline model and editing core.
//!
//! [`TimelineEditor`] is the entry point: it turns gestures into undoable
//! commands against a [`MultitrackModel`] and reports results through the
//! [`EventBus`].

pub mod commands;
pub mod editing;
pub mod editor;
pub mod error;
pub mod events;
pub mod history;
pub mod model;
pub mod playlist;
pub mod producer;
pub mod profile;
pub mod seek;
pub mod selection;
pub mod timecode;
pub mod timeline;
pub mod tractor;
pub mod validity;

#[cfg(test)]
mod testing;

pub use commands::EditOperation;
pub use editor::{NullPlayer, Player, TimelineEditor, TrimLocation};
pub use error::{CoreError, Result};
pub use events::{EventBus, SelectedItem, TimelineEvent};
pub use history::UndoStack;
pub use model::{MultitrackModel, Track, TrackKind};
pub use playlist::{ClipInfo, Playlist};
pub use producer::{Filter, Producer, PropertyAccess};
pub use profile::{EditorConfig, Profile};
pub use selection::Selection;
pub use timeline::Timeline;
