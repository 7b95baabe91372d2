use crate::error::Result;
use crate::producer::{Producer, Properties, PropertyAccess};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An ordered sequence of slots on one track. Slot start times are implicit:
/// each slot begins where the previous one ends.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Playlist {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
    #[serde(default)]
    pub entries: Vec<Producer>,
}

/// Snapshot of one slot's placement on its track.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipInfo {
    pub clip: usize,
    pub producer: Producer,
    pub start: i32,
    pub frame_in: i32,
    pub frame_out: i32,
    pub frame_count: i32,
    pub length: i32,
}

impl ClipInfo {
    pub fn end(&self) -> i32 {
        self.start + self.frame_count
    }
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn clip(&self, index: usize) -> Option<&Producer> {
        self.entries.get(index)
    }

    pub(crate) fn clip_mut(&mut self, index: usize) -> Option<&mut Producer> {
        self.entries.get_mut(index)
    }

    pub fn clip_info(&self, index: usize) -> Option<ClipInfo> {
        let producer = self.entries.get(index)?;
        Some(ClipInfo {
            clip: index,
            producer: producer.clone(),
            start: self.clip_start(index),
            frame_in: producer.get_in(),
            frame_out: producer.get_out(),
            frame_count: producer.get_playtime(),
            length: producer.get_length(),
        })
    }

    /// Start frame of slot `index`; indexes past the end yield the playtime.
    pub fn clip_start(&self, index: usize) -> i32 {
        self.entries
            .iter()
            .take(index)
            .map(Producer::get_playtime)
            .sum()
    }

    pub fn clip_length(&self, index: usize) -> i32 {
        self.entries.get(index).map_or(0, Producer::get_playtime)
    }

    pub fn get_playtime(&self) -> i32 {
        self.entries.iter().map(Producer::get_playtime).sum()
    }

    pub fn get_clip_index_at(&self, position: i32) -> Option<usize> {
        if position < 0 {
            return None;
        }
        let mut start = 0;
        for (i, p) in self.entries.iter().enumerate() {
            let end = start + p.get_playtime();
            if position < end {
                return Some(i);
            }
            start = end;
        }
        None
    }

    pub fn is_blank(&self, index: usize) -> bool {
        self.entries.get(index).is_some_and(Producer::is_blank)
    }

    pub fn is_transition(&self, index: usize) -> bool {
        self.entries.get(index).is_some_and(Producer::is_transition)
    }

    /// True when nothing plays at `position`, including past the end.
    pub fn is_blank_at(&self, position: i32) -> bool {
        self.get_clip_index_at(position)
            .map_or(true, |i| self.is_blank(i))
    }

    pub fn append(&mut self, producer: Producer) -> usize {
        self.entries.push(producer);
        self.entries.len() - 1
    }

    pub fn insert(&mut self, index: usize, producer: Producer) -> usize {
        let index = index.min(self.entries.len());
        self.entries.insert(index, producer);
        index
    }

    pub fn remove(&mut self, index: usize) -> Option<Producer> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    pub fn insert_blank(&mut self, index: usize, length: i32) {
        if length > 0 {
            self.insert(index, Producer::blank(length));
        }
    }

    /// Pad with blank so the playlist reaches at least `position`.
    pub(crate) fn pad_to(&mut self, position: i32) {
        let gap = position - self.get_playtime();
        if gap > 0 {
            self.entries.push(Producer::blank(gap));
        }
    }

    pub fn resize_clip(&mut self, index: usize, frame_in: i32, frame_out: i32) -> bool {
        let Some(p) = self.entries.get_mut(index) else {
            return false;
        };
        if frame_in < 0 || frame_in > frame_out || frame_out >= p.get_length() {
            return false;
        }
        p.set_in_and_out(frame_in, frame_out);
        true
    }

    /// Change a blank slot's playtime; a zero length removes it.
    pub(crate) fn resize_blank(&mut self, index: usize, length: i32) {
        if length <= 0 {
            self.remove(index);
        } else if let Some(p) = self.entries.get_mut(index) {
            p.set_span(length);
        }
    }

    /// Split slot `index` so that a new slot begins `offset` frames into it.
    /// Transitions are never split.
    pub fn split(&mut self, index: usize, offset: i32) -> bool {
        let Some(p) = self.entries.get(index) else {
            return false;
        };
        if p.is_transition() || offset <= 0 || offset >= p.get_playtime() {
            return false;
        }
        let (left, right) = if p.is_blank() {
            (
                Producer::blank(offset),
                Producer::blank(p.get_playtime() - offset),
            )
        } else {
            let split = p.get_in() + offset;
            (p.cut(p.get_in(), split - 1), p.cut(split, p.get_out()))
        };
        self.entries[index] = left;
        self.entries.insert(index + 1, right);
        true
    }

    /// Ensure a slot boundary exists at `position`. Returns false when the
    /// boundary would fall inside a transition.
    pub(crate) fn split_at(&mut self, position: i32) -> bool {
        let Some(index) = self.get_clip_index_at(position) else {
            return true;
        };
        let offset = position - self.clip_start(index);
        offset == 0 || self.split(index, offset)
    }

    /// Merge neighbouring blanks and drop empty ones.
    pub fn consolidate_blanks(&mut self) {
        let mut merged: Vec<Producer> = Vec::with_capacity(self.entries.len());
        for p in self.entries.drain(..) {
            if p.is_blank() {
                if p.get_playtime() <= 0 {
                    continue;
                }
                if let Some(last) = merged.last_mut().filter(|l| l.is_blank()) {
                    let length = last.get_playtime() + p.get_playtime();
                    last.set_span(length);
                    continue;
                }
            }
            merged.push(p);
        }
        self.entries = merged;
    }

    pub fn remove_trailing_blanks(&mut self) {
        while self.entries.last().is_some_and(Producer::is_blank) {
            self.entries.pop();
        }
    }

    pub(crate) fn tidy(&mut self) {
        self.consolidate_blanks();
        self.remove_trailing_blanks();
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_text(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl PropertyAccess for Playlist {
    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(length: i32) -> Producer {
        Producer::new("avformat", "/media/clip.mp4", length)
    }

    fn sample() -> Playlist {
        // [clip 0..50)[blank 50..60)[clip 60..90)
        let mut pl = Playlist::new();
        pl.append(clip(50));
        pl.append(Producer::blank(10));
        pl.append(clip(30));
        pl
    }

    #[test]
    fn positions_are_implicit() {
        let pl = sample();
        assert_eq!(pl.clip_start(0), 0);
        assert_eq!(pl.clip_start(1), 50);
        assert_eq!(pl.clip_start(2), 60);
        assert_eq!(pl.clip_start(3), 90);
        assert_eq!(pl.get_playtime(), 90);
        let info = pl.clip_info(2).unwrap();
        assert_eq!(info.start, 60);
        assert_eq!(info.end(), 90);
    }

    #[test]
    fn clip_index_lookup() {
        let pl = sample();
        assert_eq!(pl.get_clip_index_at(0), Some(0));
        assert_eq!(pl.get_clip_index_at(49), Some(0));
        assert_eq!(pl.get_clip_index_at(50), Some(1));
        assert_eq!(pl.get_clip_index_at(89), Some(2));
        assert_eq!(pl.get_clip_index_at(90), None);
        assert_eq!(pl.get_clip_index_at(-1), None);
        assert!(pl.is_blank_at(55));
        assert!(pl.is_blank_at(500));
        assert!(!pl.is_blank_at(10));
    }

    #[test]
    fn split_clip_and_blank() {
        let mut pl = sample();
        assert!(pl.split(0, 20));
        assert_eq!(pl.count(), 4);
        assert_eq!(pl.clip(0).unwrap().get_out(), 19);
        assert_eq!(pl.clip(1).unwrap().get_in(), 20);
        assert_eq!(pl.get_playtime(), 90);

        assert!(pl.split(2, 4));
        assert!(pl.is_blank(2) && pl.is_blank(3));
        assert!(!pl.split(0, 0));
        assert!(!pl.split(0, 20));
    }

    #[test]
    fn consolidate_merges_blanks() {
        let mut pl = sample();
        pl.split(1, 5);
        pl.insert(1, Producer::blank(0));
        pl.consolidate_blanks();
        assert_eq!(pl.count(), 3);
        assert_eq!(pl.clip_length(1), 10);
    }

    #[test]
    fn trailing_blanks_are_removed() {
        let mut pl = sample();
        pl.append(Producer::blank(5));
        pl.append(Producer::blank(5));
        pl.remove_trailing_blanks();
        assert_eq!(pl.count(), 3);
        assert_eq!(pl.get_playtime(), 90);
    }

    #[test]
    fn resize_clip_validates_media() {
        let mut pl = sample();
        assert!(pl.resize_clip(0, 10, 49));
        assert!(!pl.resize_clip(0, 10, 50));
        assert!(!pl.resize_clip(0, 30, 20));
        assert!(!pl.resize_clip(9, 0, 1));
    }

    #[test]
    fn split_at_boundary_is_noop() {
        let mut pl = sample();
        assert!(pl.split_at(50));
        assert_eq!(pl.count(), 3);
        assert!(pl.split_at(70));
        assert_eq!(pl.count(), 4);
        assert!(pl.split_at(200));
    }

    #[test]
    fn pad_to_appends_blank() {
        let mut pl = sample();
        pl.pad_to(100);
        assert_eq!(pl.get_playtime(), 100);
        assert!(pl.is_blank(3));
        pl.pad_to(10);
        assert_eq!(pl.count(), 4);
    }
}
