use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const BLANK_SERVICE: &str = "blank";
pub const TIMEWARP_SERVICE: &str = "timewarp";
pub const TRANSITION_SERVICE: &str = "tractor";

/// Engine metadata tag marking a playlist entry as a transition.
pub const TRANSITION_PROPERTY: &str = "cutline:transition";
pub const WARP_SPEED_PROPERTY: &str = "warp_speed";
/// Filters carrying this flag are engine-internal (normalizers, loaders) and
/// are left untouched when a clip is retimed.
pub const LOADER_PROPERTY: &str = "_loader";

pub const FADE_IN_VIDEO_SERVICE: &str = "fadeInVideo";
pub const FADE_OUT_VIDEO_SERVICE: &str = "fadeOutVideo";
pub const FADE_IN_AUDIO_SERVICE: &str = "fadeInVolume";
pub const FADE_OUT_AUDIO_SERVICE: &str = "fadeOutVolume";

pub type Properties = BTreeMap<String, String>;

/// Typed access to the string property bag every engine entity carries.
pub trait PropertyAccess {
    fn properties(&self) -> &Properties;
    fn properties_mut(&mut self) -> &mut Properties;

    fn get(&self, key: &str) -> Option<&str> {
        self.properties().get(key).map(String::as_str)
    }

    fn get_int(&self, key: &str) -> i32 {
        self.get(key)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .map(|v| v as i32)
            .unwrap_or(0)
    }

    fn get_double(&self, key: &str) -> f64 {
        self.get(key)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .unwrap_or(0.0)
    }

    fn set(&mut self, key: &str, value: impl ToString) {
        self.properties_mut().insert(key.to_string(), value.to_string());
    }

    fn clear(&mut self, key: &str) -> Option<String> {
        self.properties_mut().remove(key)
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Filter {
    pub service: String,
    #[serde(rename = "in")]
    pub frame_in: i32,
    #[serde(rename = "out")]
    pub frame_out: i32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
}

impl Filter {
    pub fn new(service: impl Into<String>, frame_in: i32, frame_out: i32) -> Self {
        Self {
            service: service.into(),
            frame_in,
            frame_out,
            properties: Properties::new(),
        }
    }

    pub fn get_in(&self) -> i32 {
        self.frame_in
    }

    pub fn get_out(&self) -> i32 {
        self.frame_out
    }

    pub fn set_in_and_out(&mut self, frame_in: i32, frame_out: i32) {
        self.frame_in = frame_in;
        self.frame_out = frame_out;
    }

    pub fn is_loader(&self) -> bool {
        self.get_int(LOADER_PROPERTY) != 0
    }
}

impl PropertyAccess for Filter {
    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }
}

// ---------------------------------------------------------------------------
// Producer
// ---------------------------------------------------------------------------

/// A playable media unit, or a cut of one when it sits in a playlist.
///
/// `length` is the amount of media available; `frame_in..=frame_out` is the
/// portion that plays. Transitions keep their two source cuts in `tracks`:
/// the outgoing clip's tail first, then the incoming clip's head.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Producer {
    pub service: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource: String,
    pub length: i32,
    #[serde(rename = "in")]
    pub frame_in: i32,
    #[serde(rename = "out")]
    pub frame_out: i32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tracks: Vec<Producer>,
}

impl Producer {
    pub fn new(service: impl Into<String>, resource: impl Into<String>, length: i32) -> Self {
        Self {
            service: service.into(),
            resource: resource.into(),
            length,
            frame_in: 0,
            frame_out: length - 1,
            properties: Properties::new(),
            filters: Vec::new(),
            tracks: Vec::new(),
        }
    }

    pub fn blank(length: i32) -> Self {
        Self::new(BLANK_SERVICE, "", length)
    }

    /// Build a transition slot from the two overlapping source cuts.
    pub fn transition(kind: &str, outgoing: Producer, incoming: Producer) -> Self {
        let mut p = Self::new(TRANSITION_SERVICE, "", outgoing.get_playtime());
        p.set(TRANSITION_PROPERTY, kind);
        p.tracks = vec![outgoing, incoming];
        p
    }

    pub fn is_valid(&self) -> bool {
        let range_ok = self.length > 0
            && self.frame_in >= 0
            && self.frame_in <= self.frame_out
            && self.frame_out < self.length;
        if !range_ok {
            return false;
        }
        if self.is_transition() {
            return self.tracks.len() == 2
                && self
                    .tracks
                    .iter()
                    .all(|t| t.is_valid() && t.get_playtime() == self.get_playtime());
        }
        true
    }

    pub fn is_blank(&self) -> bool {
        self.service == BLANK_SERVICE
    }

    pub fn is_transition(&self) -> bool {
        self.properties.contains_key(TRANSITION_PROPERTY)
    }

    pub fn get_length(&self) -> i32 {
        self.length
    }

    pub fn get_in(&self) -> i32 {
        self.frame_in
    }

    pub fn get_out(&self) -> i32 {
        self.frame_out
    }

    pub fn get_playtime(&self) -> i32 {
        self.frame_out - self.frame_in + 1
    }

    pub fn set_in_and_out(&mut self, frame_in: i32, frame_out: i32) {
        self.frame_in = frame_in;
        self.frame_out = frame_out;
    }

    /// A copy of this producer restricted to `frame_in..=frame_out`.
    pub fn cut(&self, frame_in: i32, frame_out: i32) -> Producer {
        let mut c = self.clone();
        c.set_in_and_out(frame_in, frame_out);
        c
    }

    /// Clamp every non-loader filter to the producer's in/out, dropping
    /// filters that no longer overlap it.
    pub(crate) fn fit_filters_to_cut(&mut self) {
        let (frame_in, frame_out) = (self.frame_in, self.frame_out);
        self.filters.retain_mut(|f| {
            if f.is_loader() {
                return true;
            }
            f.set_in_and_out(f.get_in().max(frame_in), f.get_out().min(frame_out));
            f.get_in() <= f.get_out()
        });
    }

    /// Resize a blank or transition so it spans `length` frames from 0.
    pub(crate) fn set_span(&mut self, length: i32) {
        self.length = length;
        self.frame_in = 0;
        self.frame_out = length - 1;
    }

    /// Playback speed relative to the source; only time-warped producers
    /// play at anything other than 1.0.
    pub fn warp_speed(&self) -> f64 {
        if self.service != TIMEWARP_SERVICE {
            return 1.0;
        }
        match self.get_double(WARP_SPEED_PROPERTY) {
            s if s == 0.0 => 1.0,
            s => s,
        }
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    pub fn filter(&self, index: usize) -> Option<&Filter> {
        self.filters.get(index)
    }

    pub fn filter_mut(&mut self, index: usize) -> Option<&mut Filter> {
        self.filters.get_mut(index)
    }

    pub fn attach(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    pub fn detach(&mut self, index: usize) -> Option<Filter> {
        (index < self.filters.len()).then(|| self.filters.remove(index))
    }

    pub fn find_filter(&self, service: &str) -> Option<usize> {
        self.filters.iter().position(|f| f.service == service)
    }

    pub fn outgoing(&self) -> Option<&Producer> {
        self.tracks.first().filter(|_| self.is_transition())
    }

    pub fn incoming(&self) -> Option<&Producer> {
        self.tracks.get(1).filter(|_| self.is_transition())
    }

    pub(crate) fn sources_mut(&mut self) -> Option<(&mut Producer, &mut Producer)> {
        if !self.is_transition() {
            return None;
        }
        match self.tracks.as_mut_slice() {
            [a, b] => Some((a, b)),
            _ => None,
        }
    }

    /// Serialize to interchange text.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from interchange text, rejecting producers that would not
    /// be playable.
    pub fn from_text(text: &str) -> Result<Self> {
        let producer: Producer = serde_json::from_str(text)?;
        if !producer.is_valid() {
            return Err(CoreError::InvalidProducer(format!(
                "{} in={} out={} length={}",
                producer.service, producer.frame_in, producer.frame_out, producer.length
            )));
        }
        Ok(producer)
    }
}

impl PropertyAccess for Producer {
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

    fn media(length: i32) -> Producer {
        Producer::new("avformat", "/media/a.mp4", length)
    }

    #[test]
    fn new_producer_spans_whole_media() {
        let p = media(100);
        assert_eq!(p.get_in(), 0);
        assert_eq!(p.get_out(), 99);
        assert_eq!(p.get_playtime(), 100);
        assert!(p.is_valid());
        assert!(!p.is_blank());
        assert!(!p.is_transition());
    }

    #[test]
    fn cut_keeps_media_and_changes_range() {
        let p = media(100).cut(10, 19);
        assert_eq!(p.get_playtime(), 10);
        assert_eq!(p.get_length(), 100);
        assert!(p.is_valid());
    }

    #[test]
    fn out_of_range_cut_is_invalid() {
        assert!(!media(100).cut(50, 100).is_valid());
        assert!(!media(100).cut(-1, 10).is_valid());
        assert!(!media(100).cut(20, 10).is_valid());
    }

    #[test]
    fn transition_is_tagged_and_validated() {
        let a = media(100).cut(80, 89);
        let b = media(100).cut(0, 9);
        let t = Producer::transition("dissolve", a.clone(), b.clone());
        assert!(t.is_transition());
        assert!(t.is_valid());
        assert_eq!(t.get_playtime(), 10);
        assert_eq!(t.outgoing(), Some(&a));
        assert_eq!(t.incoming(), Some(&b));

        let mismatched = Producer::transition("dissolve", a, media(100).cut(0, 4));
        assert!(!mismatched.is_valid());
    }

    #[test]
    fn warp_speed_only_for_timewarp() {
        let mut p = media(100);
        p.set(WARP_SPEED_PROPERTY, 2.0);
        assert_eq!(p.warp_speed(), 1.0);
        p.service = TIMEWARP_SERVICE.to_string();
        assert_eq!(p.warp_speed(), 2.0);
    }

    #[test]
    fn property_access() {
        let mut p = media(10);
        assert_eq!(p.get("missing"), None);
        assert_eq!(p.get_int("missing"), 0);
        p.set("answer", 42);
        assert_eq!(p.get("answer"), Some("42"));
        assert_eq!(p.get_int("answer"), 42);
        assert_eq!(p.clear("answer"), Some("42".to_string()));
    }

    #[test]
    fn filters_attach_and_detach() {
        let mut p = media(10);
        p.attach(Filter::new("brightness", 0, 9));
        let mut loader = Filter::new("normalize", 0, 9);
        loader.set(LOADER_PROPERTY, 1);
        p.attach(loader);
        assert_eq!(p.filter_count(), 2);
        assert!(p.filter(1).unwrap().is_loader());
        assert_eq!(p.find_filter("brightness"), Some(0));
        assert!(p.detach(0).is_some());
        assert!(p.detach(5).is_none());
        assert_eq!(p.filter_count(), 1);
    }

    #[test]
    fn text_roundtrip_and_validation() {
        let mut p = media(100).cut(5, 50);
        p.attach(Filter::new("brightness", 5, 50));
        let text = p.to_text().unwrap();
        assert_eq!(Producer::from_text(&text).unwrap(), p);

        let broken = media(10).cut(5, 20).to_text().unwrap();
        assert!(matches!(
            Producer::from_text(&broken),
            Err(CoreError::InvalidProducer(_))
        ));
        assert!(matches!(
            Producer::from_text("not json"),
            Err(CoreError::Json(_))
        ));
    }
}
