use crate::editing::Absorb;
use crate::error::{invalid, Result};
use crate::model::TrackKind;
use crate::playlist::Playlist;
use crate::producer::Producer;
use crate::selection::Selection;
use crate::timeline::Timeline;

/// Serialized model state recorded around a command's first application.
#[derive(Debug, Clone, Default)]
enum Capture {
    #[default]
    Pending,
    Tracks {
        before: Vec<(usize, String)>,
        after: Vec<(usize, String)>,
    },
    Composition {
        before: String,
        after: String,
    },
}

/// What a command's snapshot has to cover.
enum Scope {
    Tracks(Vec<usize>),
    Composition,
}

impl Capture {
    /// The first call runs `edit` and records before/after state; later
    /// calls (redo) restore the recorded after state. A failed edit leaves
    /// the model as it was.
    fn apply(
        &mut self,
        timeline: &mut Timeline,
        scope: Scope,
        edit: impl FnOnce(&mut Timeline) -> Result<()>,
    ) -> Result<()> {
        match self {
            Capture::Tracks { after, .. } => return timeline.model_mut().restore_tracks(after),
            Capture::Composition { after, .. } => {
                return timeline.model_mut().restore_composition(after)
            }
            Capture::Pending => {}
        }
        match scope {
            Scope::Tracks(tracks) => {
                let before = timeline.model().snapshot_tracks(&tracks)?;
                if let Err(e) = edit(timeline) {
                    timeline.model_mut().restore_tracks(&before)?;
                    return Err(e);
                }
                let after = timeline.model().snapshot_tracks(&tracks)?;
                *self = Capture::Tracks { before, after };
            }
            Scope::Composition => {
                let before = timeline.model().to_text()?;
                if let Err(e) = edit(timeline) {
                    timeline.model_mut().restore_composition(&before)?;
                    return Err(e);
                }
                let after = timeline.model().to_text()?;
                *self = Capture::Composition { before, after };
            }
        }
        Ok(())
    }

    fn undo(&self, timeline: &mut Timeline) -> Result<()> {
        match self {
            Capture::Pending => Err(invalid("command was never applied")),
            Capture::Tracks { before, .. } => timeline.model_mut().restore_tracks(before),
            Capture::Composition { before, .. } => {
                timeline.model_mut().restore_composition(before)
            }
        }
    }

    /// Take over the end state of a command applied right after this one.
    fn absorb(&mut self, later: &Capture) -> bool {
        match (self, later) {
            (Capture::Tracks { after, .. }, Capture::Tracks { before, after: later_after })
                if before.iter().map(|(i, _)| i).eq(after.iter().map(|(i, _)| i)) =>
            {
                *after = later_after.clone();
                true
            }
            _ => false,
        }
    }
}

/// A command whose effect is captured as model snapshots.
trait ModelEdit {
    fn scope(&self) -> Scope;
    fn run(&self, timeline: &mut Timeline) -> Result<()>;
    fn capture_mut(&mut self) -> &mut Capture;
    fn capture(&self) -> &Capture;
}

fn apply_edit<E: ModelEdit>(edit: &mut E, timeline: &mut Timeline) -> Result<()> {
    let scope = edit.scope();
    let mut capture = std::mem::take(edit.capture_mut());
    let result = capture.apply(timeline, scope, |tl| edit.run(tl));
    *edit.capture_mut() = capture;
    result
}

fn undo_edit<E: ModelEdit>(edit: &E, timeline: &mut Timeline) -> Result<()> {
    edit.capture().undo(timeline)
}

macro_rules! model_command {
    ($(#[$meta:meta])* $name:ident { $($field:ident: $ty:ty),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            $(pub $field: $ty,)*
            capture: Capture,
        }

        impl $name {
            #[allow(clippy::too_many_arguments)]
            pub fn new($($field: $ty),*) -> Self {
                Self {
                    $($field,)*
                    capture: Capture::Pending,
                }
            }
        }
    };
}

macro_rules! impl_model_edit {
    ($name:ident, |$s:ident| $scope:expr, |$c:ident, $tl:ident| $run:expr) => {
        impl ModelEdit for $name {
            fn scope(&self) -> Scope {
                let $s = self;
                $scope
            }

            fn run(&self, $tl: &mut Timeline) -> Result<()> {
                let $c = self;
                $run
            }

            fn capture_mut(&mut self) -> &mut Capture {
                &mut self.capture
            }

            fn capture(&self) -> &Capture {
                &self.capture
            }
        }
    };
}

fn one(track: usize) -> Scope {
    Scope::Tracks(vec![track])
}

// ---------------------------------------------------------------------------
// Clip placement
// ---------------------------------------------------------------------------

model_command!(
    /// Append serialized content to the end of a track.
    AppendCommand { track: usize, xml: String }
);
impl_model_edit!(AppendCommand, |s| one(s.track), |c, tl| {
    let producer = Producer::from_text(&c.xml)?;
    tl.model_mut().append(c.track, producer).map(|_| ())
});

model_command!(
    /// Ripple-insert serialized content at a position.
    InsertCommand { track: usize, position: i32, xml: String }
);
impl_model_edit!(InsertCommand, |s| one(s.track), |c, tl| {
    let producer = Producer::from_text(&c.xml)?;
    tl.model_mut().insert(c.track, c.position, producer).map(|_| ())
});

model_command!(
    /// Place serialized content at a position, replacing what is there.
    OverwriteCommand { track: usize, position: i32, xml: String }
);
impl_model_edit!(OverwriteCommand, |s| one(s.track), |c, tl| {
    let producer = Producer::from_text(&c.xml)?;
    tl.model_mut().overwrite(c.track, c.position, producer).map(|_| ())
});

model_command!(RemoveCommand { track: usize, clip: usize });
impl_model_edit!(RemoveCommand, |s| one(s.track), |c, tl| tl
    .model_mut()
    .remove_clip(c.track, c.clip));

model_command!(LiftCommand { track: usize, clip: usize });
impl_model_edit!(LiftCommand, |s| one(s.track), |c, tl| tl
    .model_mut()
    .lift_clip(c.track, c.clip));

model_command!(MoveClipCommand {
    from_track: usize,
    to_track: usize,
    clip: usize,
    position: i32,
});
impl_model_edit!(
    MoveClipCommand,
    |s| Scope::Tracks(vec![s.from_track, s.to_track]),
    |c, tl| tl
        .model_mut()
        .move_clip(c.from_track, c.to_track, c.clip, c.position)
        .map(|_| ())
);

model_command!(MoveInsertClipCommand {
    from_track: usize,
    to_track: usize,
    clip: usize,
    position: i32,
});
impl_model_edit!(
    MoveInsertClipCommand,
    |s| Scope::Tracks(vec![s.from_track, s.to_track]),
    |c, tl| tl
        .model_mut()
        .move_insert_clip(c.from_track, c.to_track, c.clip, c.position)
        .map(|_| ())
);

model_command!(SplitCommand { track: usize, clip: usize, position: i32 });
impl_model_edit!(SplitCommand, |s| one(s.track), |c, tl| tl
    .model_mut()
    .split_clip(c.track, c.clip, c.position)
    .map(|_| ()));

model_command!(
    /// Append every clip of a serialized playlist.
    AppendPlaylistCommand { track: usize, xml: String }
);
impl_model_edit!(AppendPlaylistCommand, |s| one(s.track), |c, tl| {
    let playlist = Playlist::from_text(&c.xml)?;
    tl.model_mut()
        .append_from_playlist(c.track, &playlist)
        .map(|_| ())
});

model_command!(AddFilterCommand { track: usize, position: i32, xml: String });
impl_model_edit!(AddFilterCommand, |s| one(s.track), |c, tl| {
    let producer = Producer::from_text(&c.xml)?;
    tl.model_mut().add_filter(c.track, c.position, producer).map(|_| ())
});

model_command!(AddTextCommand { track: usize, position: i32, xml: String });
impl_model_edit!(AddTextCommand, |s| one(s.track), |c, tl| {
    let producer = Producer::from_text(&c.xml)?;
    tl.model_mut().add_text(c.track, c.position, producer).map(|_| ())
});

model_command!(
    /// Replace a clip's full content. When the playback speed changed, the
    /// clip's transitions are folded into it first since the new content
    /// spans them.
    UpdateCommand {
        track: usize,
        clip: usize,
        xml_before: String,
        xml_after: String,
        speed_changed: bool,
    }
);
impl_model_edit!(UpdateCommand, |s| one(s.track), |c, tl| {
    let producer = Producer::from_text(&c.xml_after)?;
    let model = tl.model_mut();
    let mut clip = c.clip;
    if c.speed_changed && model.has_adjacent_transition(c.track, clip) {
        clip = model.remove_transitions_on_clip(c.track, clip)?;
    }
    model.replace_clip(c.track, clip, producer)
});

impl UpdateCommand {
    pub fn set_xml_after(&mut self, xml: String) {
        self.xml_after = xml;
    }

    pub fn set_speed_changed(&mut self, changed: bool) {
        self.speed_changed = changed;
    }
}

// ---------------------------------------------------------------------------
// Trims
// ---------------------------------------------------------------------------

model_command!(TrimClipInCommand { track: usize, clip: usize, delta: i32, ripple: bool });
impl_model_edit!(TrimClipInCommand, |s| one(s.track), |c, tl| tl
    .model_mut()
    .trim_clip_in(c.track, c.clip, c.delta, c.ripple)
    .map(|_| ()));

model_command!(TrimClipOutCommand { track: usize, clip: usize, delta: i32, ripple: bool });
impl_model_edit!(TrimClipOutCommand, |s| one(s.track), |c, tl| tl
    .model_mut()
    .trim_clip_out(c.track, c.clip, c.delta, c.ripple));

model_command!(FadeInCommand { track: usize, clip: usize, duration: i32 });
impl_model_edit!(FadeInCommand, |s| one(s.track), |c, tl| tl
    .model_mut()
    .fade_in(c.track, c.clip, c.duration));

model_command!(FadeOutCommand { track: usize, clip: usize, duration: i32 });
impl_model_edit!(FadeOutCommand, |s| one(s.track), |c, tl| tl
    .model_mut()
    .fade_out(c.track, c.clip, c.duration));

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

model_command!(AddTransitionCommand { track: usize, clip: usize, position: i32 });
impl_model_edit!(AddTransitionCommand, |s| one(s.track), |c, tl| tl
    .model_mut()
    .add_transition(c.track, c.clip, c.position)
    .map(|_| ()));

model_command!(AddTransitionByTrimInCommand { track: usize, clip: usize, delta: i32 });
impl_model_edit!(AddTransitionByTrimInCommand, |s| one(s.track), |c, tl| tl
    .model_mut()
    .add_transition_by_trim_in(c.track, c.clip, c.delta)
    .map(|_| ()));

model_command!(AddTransitionByTrimOutCommand { track: usize, clip: usize, delta: i32 });
impl_model_edit!(AddTransitionByTrimOutCommand, |s| one(s.track), |c, tl| tl
    .model_mut()
    .add_transition_by_trim_out(c.track, c.clip, c.delta)
    .map(|_| ()));

model_command!(TrimTransitionInCommand { track: usize, clip: usize, delta: i32 });
impl_model_edit!(TrimTransitionInCommand, |s| one(s.track), |c, tl| tl
    .model_mut()
    .trim_transition_in(c.track, c.clip, c.delta));

model_command!(TrimTransitionOutCommand { track: usize, clip: usize, delta: i32 });
impl_model_edit!(TrimTransitionOutCommand, |s| one(s.track), |c, tl| tl
    .model_mut()
    .trim_transition_out(c.track, c.clip, c.delta));

model_command!(RemoveTransitionCommand { track: usize, transition: usize });
impl_model_edit!(RemoveTransitionCommand, |s| one(s.track), |c, tl| tl
    .model_mut()
    .remove_transition(c.track, c.transition, Absorb::Outgoing));

model_command!(RemoveTransitionsOnClipCommand { track: usize, clip: usize });
impl_model_edit!(RemoveTransitionsOnClipCommand, |s| one(s.track), |c, tl| tl
    .model_mut()
    .remove_transitions_on_clip(c.track, c.clip)
    .map(|_| ()));

model_command!(SetTransitionDurationCommand { track: usize, transition: usize, duration: i32 });
impl_model_edit!(SetTransitionDurationCommand, |s| one(s.track), |c, tl| tl
    .model_mut()
    .set_transition_duration(c.track, c.transition, c.duration));

// ---------------------------------------------------------------------------
// Tracks
// ---------------------------------------------------------------------------

model_command!(AddTrackCommand { kind: TrackKind });
impl_model_edit!(AddTrackCommand, |_s| Scope::Composition, |c, tl| {
    tl.model_mut().add_track(c.kind);
    Ok(())
});

model_command!(RemoveTrackCommand { track: usize });
impl_model_edit!(RemoveTrackCommand, |_s| Scope::Composition, |c, tl| tl
    .model_mut()
    .remove_track(c.track));

#[derive(Debug, Clone)]
pub struct NameTrackCommand {
    pub track: usize,
    pub name: String,
    pub old_name: String,
}

impl NameTrackCommand {
    pub fn new(track: usize, name: String, old_name: String) -> Self {
        Self { track, name, old_name }
    }

    fn apply(&mut self, timeline: &mut Timeline) -> Result<()> {
        timeline.model_mut().set_track_name(self.track, &self.name)
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        timeline.model_mut().set_track_name(self.track, &self.old_name)
    }
}

#[derive(Debug, Clone)]
pub struct MuteTrackCommand {
    pub track: usize,
    pub muted: bool,
    pub old: bool,
}

impl MuteTrackCommand {
    pub fn new(track: usize, muted: bool, old: bool) -> Self {
        Self { track, muted, old }
    }

    fn apply(&mut self, timeline: &mut Timeline) -> Result<()> {
        timeline.model_mut().set_track_mute(self.track, self.muted)
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        timeline.model_mut().set_track_mute(self.track, self.old)
    }
}

#[derive(Debug, Clone)]
pub struct HideTrackCommand {
    pub track: usize,
    pub hidden: bool,
    pub old: bool,
}

impl HideTrackCommand {
    pub fn new(track: usize, hidden: bool, old: bool) -> Self {
        Self { track, hidden, old }
    }

    fn apply(&mut self, timeline: &mut Timeline) -> Result<()> {
        timeline.model_mut().set_track_hidden(self.track, self.hidden)
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        timeline.model_mut().set_track_hidden(self.track, self.old)
    }
}

#[derive(Debug, Clone)]
pub struct CompositeTrackCommand {
    pub track: usize,
    pub composite: bool,
    pub old: bool,
}

impl CompositeTrackCommand {
    pub fn new(track: usize, composite: bool, old: bool) -> Self {
        Self { track, composite, old }
    }

    fn apply(&mut self, timeline: &mut Timeline) -> Result<()> {
        timeline
            .model_mut()
            .set_track_composite(self.track, self.composite)
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        timeline.model_mut().set_track_composite(self.track, self.old)
    }
}

#[derive(Debug, Clone)]
pub struct LockTrackCommand {
    pub track: usize,
    pub locked: bool,
    pub old: bool,
}

impl LockTrackCommand {
    pub fn new(track: usize, locked: bool, old: bool) -> Self {
        Self { track, locked, old }
    }

    fn apply(&mut self, timeline: &mut Timeline) -> Result<()> {
        timeline.model_mut().set_track_lock(self.track, self.locked)
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        timeline.model_mut().set_track_lock(self.track, self.old)
    }
}

#[derive(Debug, Clone)]
pub struct ChangeBlendModeCommand {
    pub track: usize,
    pub mode: String,
    pub old: Option<String>,
}

impl ChangeBlendModeCommand {
    pub fn new(track: usize, mode: String, old: Option<String>) -> Self {
        Self { track, mode, old }
    }

    fn apply(&mut self, timeline: &mut Timeline) -> Result<()> {
        timeline.model_mut().set_blend_mode(self.track, &self.mode)
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        let old = self.old.as_deref().unwrap_or("");
        timeline.model_mut().set_blend_mode(self.track, old)
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ClipsSelectCommand {
    pub new_selection: Selection,
    pub old_selection: Selection,
}

impl ClipsSelectCommand {
    pub fn new(new_selection: Selection, old_selection: Selection) -> Self {
        Self {
            new_selection,
            old_selection,
        }
    }

    fn apply(&mut self, timeline: &mut Timeline) -> Result<()> {
        timeline.set_selection(self.new_selection.clone());
        Ok(())
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        timeline.set_selection(self.old_selection.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// EditOperation
// ---------------------------------------------------------------------------

macro_rules! edit_operations {
    (
        model { $($mvar:ident($mty:ty) => $mtext:expr),* $(,)? }
        direct { $($dvar:ident($dty:ty) => $dtext:expr),* $(,)? }
    ) => {
        /// Every undoable edit the timeline knows.
        #[derive(Debug, Clone)]
        pub enum EditOperation {
            $($mvar($mty),)*
            $($dvar($dty),)*
        }

        impl EditOperation {
            /// Label shown in undo/redo menus.
            pub fn text(&self) -> &'static str {
                match self {
                    $(Self::$mvar(_) => $mtext,)*
                    $(Self::$dvar(_) => $dtext,)*
                }
            }

            pub(crate) fn apply(&mut self, timeline: &mut Timeline) -> Result<()> {
                match self {
                    $(Self::$mvar(c) => apply_edit(c, timeline),)*
                    $(Self::$dvar(c) => c.apply(timeline),)*
                }
            }

            pub(crate) fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
                match self {
                    $(Self::$mvar(c) => undo_edit(c, timeline),)*
                    $(Self::$dvar(c) => c.undo(timeline),)*
                }
            }
        }

        $(impl From<$mty> for EditOperation {
            fn from(c: $mty) -> Self {
                Self::$mvar(c)
            }
        })*

        $(impl From<$dty> for EditOperation {
            fn from(c: $dty) -> Self {
                Self::$dvar(c)
            }
        })*
    };
}

edit_operations! {
    model {
        Append(AppendCommand) => "Append to track",
        Insert(InsertCommand) => "Insert into track",
        Overwrite(OverwriteCommand) => "Overwrite onto track",
        Remove(RemoveCommand) => "Remove from track",
        Lift(LiftCommand) => "Lift from track",
        MoveClip(MoveClipCommand) => "Move clip",
        MoveInsertClip(MoveInsertClipCommand) => "Move and insert clip",
        Split(SplitCommand) => "Split clip",
        AppendPlaylist(AppendPlaylistCommand) => "Append playlist to track",
        AddFilter(AddFilterCommand) => "Add filter to timeline",
        AddText(AddTextCommand) => "Add text to timeline",
        Update(UpdateCommand) => "Change clip properties",
        TrimClipIn(TrimClipInCommand) => "Trim clip in point",
        TrimClipOut(TrimClipOutCommand) => "Trim clip out point",
        FadeIn(FadeInCommand) => "Adjust fade in",
        FadeOut(FadeOutCommand) => "Adjust fade out",
        AddTransition(AddTransitionCommand) => "Add transition",
        AddTransitionByTrimIn(AddTransitionByTrimInCommand) => "Add transition",
        AddTransitionByTrimOut(AddTransitionByTrimOutCommand) => "Add transition",
        TrimTransitionIn(TrimTransitionInCommand) => "Trim transition in point",
        TrimTransitionOut(TrimTransitionOutCommand) => "Trim transition out point",
        RemoveTransition(RemoveTransitionCommand) => "Remove transition",
        RemoveTransitionsOnClip(RemoveTransitionsOnClipCommand) => "Remove transitions",
        SetTransitionDuration(SetTransitionDurationCommand) => "Change transition duration",
        AddTrack(AddTrackCommand) => "Add track",
        RemoveTrack(RemoveTrackCommand) => "Remove track",
    }
    direct {
        NameTrack(NameTrackCommand) => "Change track name",
        MuteTrack(MuteTrackCommand) => "Toggle track mute",
        HideTrack(HideTrackCommand) => "Toggle track hidden",
        CompositeTrack(CompositeTrackCommand) => "Change track compositing",
        LockTrack(LockTrackCommand) => "Lock track",
        ChangeBlendMode(ChangeBlendModeCommand) => "Change track blend mode",
        ClipsSelect(ClipsSelectCommand) => "Select clips",
    }
}

impl EditOperation {
    /// Collapse `next`, applied directly after `self`, into `self`.
    pub(crate) fn merge_with(&mut self, next: &EditOperation) -> bool {
        match (self, next) {
            (EditOperation::FadeIn(a), EditOperation::FadeIn(b))
                if a.track == b.track && a.clip == b.clip =>
            {
                let merged = a.capture.absorb(&b.capture);
                if merged {
                    a.duration = b.duration;
                }
                merged
            }
            (EditOperation::FadeOut(a), EditOperation::FadeOut(b))
                if a.track == b.track && a.clip == b.clip =>
            {
                let merged = a.capture.absorb(&b.capture);
                if merged {
                    a.duration = b.duration;
                }
                merged
            }
            (EditOperation::TrimClipIn(a), EditOperation::TrimClipIn(b))
                if a.track == b.track && a.clip == b.clip && a.ripple == b.ripple =>
            {
                let merged = a.capture.absorb(&b.capture);
                if merged {
                    a.delta += b.delta;
                }
                merged
            }
            (EditOperation::TrimClipOut(a), EditOperation::TrimClipOut(b))
                if a.track == b.track && a.clip == b.clip && a.ripple == b.ripple =>
            {
                let merged = a.capture.absorb(&b.capture);
                if merged {
                    a.delta += b.delta;
                }
                merged
            }
            (EditOperation::NameTrack(a), EditOperation::NameTrack(b)) if a.track == b.track => {
                a.name = b.name.clone();
                true
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Profile;
    use crate::testing::*;

    fn timeline_with(slots: &[Producer]) -> Timeline {
        Timeline::from_model(model_with(slots))
    }

    fn run(tl: &mut Timeline, op: impl Into<EditOperation>) {
        op.into().apply(tl).unwrap();
    }

    fn apply_undo_exact(tl: &mut Timeline, mut op: EditOperation) {
        let before = tl.model().to_text().unwrap();
        op.apply(tl).unwrap();
        let after = tl.model().to_text().unwrap();
        assert_ne!(before, after, "{} changed nothing", op.text());
        op.undo(tl).unwrap();
        assert_eq!(tl.model().to_text().unwrap(), before, "{} undo", op.text());
        op.apply(tl).unwrap();
        assert_eq!(tl.model().to_text().unwrap(), after, "{} redo", op.text());
        for track in 0..tl.model().track_count() {
            assert_track_consistent(tl.model(), track);
        }
    }

    #[test]
    fn content_commands_undo_exactly() {
        let xml = clip(30).to_text().unwrap();
        let ops: Vec<EditOperation> = vec![
            AppendCommand::new(0, xml.clone()).into(),
            InsertCommand::new(0, 50, xml.clone()).into(),
            OverwriteCommand::new(0, 250, xml.clone()).into(),
            RemoveCommand::new(0, 0).into(),
            LiftCommand::new(0, 0).into(),
            SplitCommand::new(0, 0, 10).into(),
            TrimClipOutCommand::new(0, 2, -10, false).into(),
            TrimClipInCommand::new(0, 2, -10, true).into(),
            FadeInCommand::new(0, 0, 12).into(),
            FadeOutCommand::new(0, 0, 12).into(),
            AddTransitionByTrimOutCommand::new(0, 2, 5).into(),
            MoveClipCommand::new(0, 0, 2, 400).into(),
        ];
        for op in ops {
            let mut tl = timeline_with(&[clip(100), blank(100), cut(400, 100, 199), clip(50)]);
            apply_undo_exact(&mut tl, op);
        }
    }

    #[test]
    fn transition_commands_undo_exactly() {
        let slots = [cut(500, 0, 99), cut(500, 100, 249), clip(40)];
        let setup = |tl: &mut Timeline| run(tl, AddTransitionByTrimOutCommand::new(0, 0, 20));
        let ops: Vec<EditOperation> = vec![
            TrimTransitionInCommand::new(0, 0, 5).into(),
            TrimTransitionOutCommand::new(0, 2, -5).into(),
            RemoveTransitionCommand::new(0, 1).into(),
            RemoveTransitionsOnClipCommand::new(0, 2).into(),
            SetTransitionDurationCommand::new(0, 1, 30).into(),
        ];
        for op in ops {
            let mut tl = timeline_with(&slots);
            setup(&mut tl);
            apply_undo_exact(&mut tl, op);
        }
    }

    #[test]
    fn track_commands_undo_exactly() {
        let ops: Vec<EditOperation> = vec![
            AddTrackCommand::new(TrackKind::Video).into(),
            NameTrackCommand::new(0, "Main".into(), "V1".into()).into(),
            MuteTrackCommand::new(1, true, false).into(),
            HideTrackCommand::new(0, true, false).into(),
            CompositeTrackCommand::new(0, false, true).into(),
            LockTrackCommand::new(0, true, false).into(),
            ChangeBlendModeCommand::new(0, "screen".into(), None).into(),
        ];
        for op in ops {
            let mut tl = timeline_with(&[clip(10)]);
            apply_undo_exact(&mut tl, op);
        }
    }

    #[test]
    fn unchanged_mute_and_hide_undo_to_the_recorded_state() {
        let mut tl = timeline_with(&[clip(10)]);
        let before = tl.model().to_text().unwrap();
        let ops: Vec<EditOperation> = vec![
            MuteTrackCommand::new(1, false, false).into(),
            HideTrackCommand::new(0, false, false).into(),
        ];
        for mut op in ops {
            op.apply(&mut tl).unwrap();
            op.undo(&mut tl).unwrap();
            assert_eq!(tl.model().to_text().unwrap(), before, "{} undo", op.text());
        }
        assert!(!tl.model().is_track_muted(1));
        assert!(!tl.model().is_track_hidden(0));
    }

    #[test]
    fn remove_track_restores_content() {
        let mut tl = timeline_with(&[clip(10)]);
        run(&mut tl, AddTrackCommand::new(TrackKind::Video));
        run(&mut tl, AppendCommand::new(0, clip(25).to_text().unwrap()));
        apply_undo_exact(&mut tl, RemoveTrackCommand::new(0).into());
    }

    #[test]
    fn failed_command_leaves_model_untouched() {
        let mut tl = timeline_with(&[clip(100), clip(50)]);
        let before = tl.model().to_text().unwrap();
        let mut op: EditOperation = TrimClipOutCommand::new(0, 0, 10, false).into();
        assert!(op.apply(&mut tl).is_err());
        assert_eq!(tl.model().to_text().unwrap(), before);
        assert!(op.undo(&mut tl).is_err(), "nothing captured");
    }

    #[test]
    fn update_after_speed_change_folds_transitions() {
        let mut tl = timeline_with(&[cut(500, 0, 99), cut(500, 100, 249)]);
        run(&mut tl, AddTransitionByTrimOutCommand::new(0, 0, 20));
        // B is at index 2 and spans 120..250 in media; the new content
        // covers the transition as well.
        let after = cut(500, 100, 249).to_text().unwrap();
        let before = tl.model().track_text(0).unwrap();
        let mut op: EditOperation = UpdateCommand::new(0, 2, String::new(), after, true).into();
        op.apply(&mut tl).unwrap();
        assert_eq!(tl.model().clip_count(0), 2);
        assert_eq!(tl.model().clip_info(0, 1).unwrap().frame_in, 100);
        op.undo(&mut tl).unwrap();
        assert_eq!(tl.model().track_text(0).unwrap(), before);
    }

    #[test]
    fn fades_merge_and_redo_lands_on_last() {
        let mut tl = timeline_with(&[clip(100)]);
        let before = tl.model().to_text().unwrap();
        let mut first: EditOperation = FadeInCommand::new(0, 0, 10).into();
        first.apply(&mut tl).unwrap();
        let mut second: EditOperation = FadeInCommand::new(0, 0, 25).into();
        second.apply(&mut tl).unwrap();
        let after = tl.model().to_text().unwrap();

        assert!(first.merge_with(&second));
        first.undo(&mut tl).unwrap();
        assert_eq!(tl.model().to_text().unwrap(), before);
        first.apply(&mut tl).unwrap();
        assert_eq!(tl.model().to_text().unwrap(), after);
        assert_eq!(tl.model().fade_in_duration(0, 0), 25);
    }

    #[test]
    fn merge_requires_same_target() {
        let mut a: EditOperation = TrimClipOutCommand::new(0, 0, 5, false).into();
        let b: EditOperation = TrimClipOutCommand::new(0, 1, 5, false).into();
        let c: EditOperation = TrimClipOutCommand::new(0, 0, 5, true).into();
        let d: EditOperation = FadeOutCommand::new(0, 0, 5).into();
        assert!(!a.merge_with(&b));
        assert!(!a.merge_with(&c));
        assert!(!a.merge_with(&d));

        let mut n: EditOperation = NameTrackCommand::new(0, "A".into(), "V1".into()).into();
        assert!(n.merge_with(&NameTrackCommand::new(0, "AB".into(), "A".into()).into()));
        let EditOperation::NameTrack(n) = n else { unreachable!() };
        assert_eq!((n.name.as_str(), n.old_name.as_str()), ("AB", "V1"));
    }

    #[test]
    fn select_command_swaps_selection() {
        let mut tl = Timeline::new(Profile::default());
        let log = tl.events().record();
        let mut op: EditOperation =
            ClipsSelectCommand::new(Selection::clips_on(0, vec![1]), Selection::none()).into();
        op.apply(&mut tl).unwrap();
        assert_eq!(tl.selection().clips(), &[1]);
        op.undo(&mut tl).unwrap();
        assert!(tl.selection().is_empty());
        assert_eq!(log.borrow().len(), 2);
    }
}
