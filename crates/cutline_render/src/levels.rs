use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use cutline_core::events::SubscriptionId;
use cutline_core::{EventBus, MultitrackModel, Producer, TimelineEvent};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{RenderError, Result};
use crate::waveform::{levels_cached, SampleSource, WaveformCache, WaveformData};

pub const DEFAULT_SAMPLES_PER_PEAK: u32 = 256;

/// A clip addressed by its position in the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClipKey {
    pub track: usize,
    pub clip: usize,
}

impl ClipKey {
    pub fn new(track: usize, clip: usize) -> Self {
        Self { track, clip }
    }
}

/// What a task computed, and for which cut of which media.
struct Finished {
    key: ClipKey,
    generation: u64,
    resource: String,
    frame_in: i32,
    frame_out: i32,
    result: Result<WaveformData>,
}

impl Finished {
    fn still_addresses(&self, producer: &Producer) -> bool {
        producer.resource == self.resource
            && producer.get_in() == self.frame_in
            && producer.get_out() == self.frame_out
    }
}

/// Computes audio levels off the UI thread and applies them back on it.
///
/// Each clip key has a generation. A forced restart bumps it, so results of
/// older runs are dropped when they arrive. Results are also dropped when
/// the key no longer addresses the same cut, since edits reshuffle indexes
/// while tasks run.
pub struct LevelsScheduler {
    source: Arc<dyn SampleSource>,
    cache: Option<Arc<WaveformCache>>,
    samples_per_peak: u32,
    generations: HashMap<ClipKey, u64>,
    running: HashSet<ClipKey>,
    levels: HashMap<ClipKey, WaveformData>,
    finished_tx: mpsc::UnboundedSender<Finished>,
    finished_rx: mpsc::UnboundedReceiver<Finished>,
    restarts: Rc<RefCell<Vec<ClipKey>>>,
}

impl LevelsScheduler {
    pub fn new(source: Arc<dyn SampleSource>) -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        Self {
            source,
            cache: None,
            samples_per_peak: DEFAULT_SAMPLES_PER_PEAK,
            generations: HashMap::new(),
            running: HashSet::new(),
            levels: HashMap::new(),
            finished_tx,
            finished_rx,
            restarts: Rc::default(),
        }
    }

    pub fn with_cache(mut self, cache: WaveformCache) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    pub fn with_samples_per_peak(mut self, samples_per_peak: u32) -> Self {
        self.samples_per_peak = samples_per_peak;
        self
    }

    pub fn levels(&self, key: ClipKey) -> Option<&WaveformData> {
        self.levels.get(&key)
    }

    pub fn is_running(&self, key: ClipKey) -> bool {
        self.running.contains(&key)
    }

    /// Start computing levels for the clip at `key`. Without `force`, a key
    /// that already has levels or a running task is left alone. Must be
    /// called inside a tokio runtime.
    pub fn start(&mut self, key: ClipKey, producer: &Producer, force: bool) -> bool {
        if !force && (self.running.contains(&key) || self.levels.contains_key(&key)) {
            return false;
        }
        let generation = {
            let g = self.generations.entry(key).or_insert(0);
            *g += 1;
            *g
        };
        self.running.insert(key);
        debug!(track = key.track, clip = key.clip, generation, force, "levels started");

        let source = Arc::clone(&self.source);
        let cache = self.cache.clone();
        let samples_per_peak = self.samples_per_peak;
        let tx = self.finished_tx.clone();
        let producer = producer.clone();
        tokio::spawn(async move {
            let (resource, frame_in, frame_out) =
                (producer.resource.clone(), producer.get_in(), producer.get_out());
            let result = tokio::task::spawn_blocking(move || {
                levels_cached(source.as_ref(), cache.as_deref(), &producer, samples_per_peak)
            })
            .await
            .unwrap_or_else(|e| Err(RenderError::TaskFailed(e.to_string())));
            let _ = tx.send(Finished {
                key,
                generation,
                resource,
                frame_in,
                frame_out,
                result,
            });
        });
        true
    }

    /// Apply every finished result without waiting. Returns the keys whose
    /// levels changed.
    pub fn apply_ready(&mut self, model: &MultitrackModel) -> Vec<ClipKey> {
        let mut applied = Vec::new();
        while let Ok(done) = self.finished_rx.try_recv() {
            applied.extend(self.accept(done, model));
        }
        applied
    }

    /// Wait until no task is running, applying results as they arrive.
    pub async fn drain(&mut self, model: &MultitrackModel) -> Vec<ClipKey> {
        let mut applied = Vec::new();
        while !self.running.is_empty() {
            let Some(done) = self.finished_rx.recv().await else {
                break;
            };
            applied.extend(self.accept(done, model));
        }
        applied
    }

    fn accept(&mut self, done: Finished, model: &MultitrackModel) -> Option<ClipKey> {
        let key = done.key;
        if self.generations.get(&key) != Some(&done.generation) {
            debug!(track = key.track, clip = key.clip, generation = done.generation, "superseded levels dropped");
            return None;
        }
        self.running.remove(&key);

        let current = model.producer_for_clip(key.track, key.clip);
        if !current.is_some_and(|p| done.still_addresses(p)) {
            debug!(track = key.track, clip = key.clip, "levels for a moved clip dropped");
            return None;
        }
        match done.result {
            Ok(data) => {
                self.levels.insert(key, data);
                Some(key)
            }
            Err(e) => {
                warn!(track = key.track, clip = key.clip, error = %e, "levels failed");
                None
            }
        }
    }

    /// Queue a forced restart for every clip whose content changes on `bus`.
    pub fn watch(&self, bus: &EventBus) -> SubscriptionId {
        let restarts = Rc::clone(&self.restarts);
        bus.subscribe(move |event| {
            if let TimelineEvent::ClipContentChanged { track, clip } = event {
                restarts.borrow_mut().push(ClipKey::new(*track, *clip));
            }
        })
    }

    /// Start the restarts queued by [`LevelsScheduler::watch`]. Returns how
    /// many were started.
    pub fn restart_pending(&mut self, model: &MultitrackModel) -> usize {
        let mut keys = std::mem::take(&mut *self.restarts.borrow_mut());
        keys.sort_by_key(|k| (k.track, k.clip));
        keys.dedup();
        let mut started = 0;
        for key in keys {
            let Some(producer) = model
                .producer_for_clip(key.track, key.clip)
                .filter(|p| !p.is_blank() && !p.is_transition())
                .cloned()
            else {
                continue;
            };
            self.levels.remove(&key);
            if self.start(key, &producer, true) {
                started += 1;
            }
        }
        started
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cutline_core::Profile;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct FakeSource {
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl SampleSource for FakeSource {
        fn samples(&self, producer: &Producer) -> anyhow::Result<Vec<i16>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            if producer.resource.contains("broken") {
                anyhow::bail!("cannot decode {}", producer.resource);
            }
            let count = producer.get_playtime() as usize * 10;
            Ok((0..count).map(|i| (i % 200) as i16 * 100 - 10_000).collect())
        }
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn model_with(resource: &str) -> MultitrackModel {
        init_tracing();
        let mut model = MultitrackModel::new(Profile::default(), EventBus::new());
        model
            .append(0, Producer::new("avformat", resource, 100))
            .unwrap();
        model
    }

    fn first_clip(model: &MultitrackModel) -> Producer {
        model.producer_for_clip(0, 0).unwrap().clone()
    }

    const KEY: ClipKey = ClipKey { track: 0, clip: 0 };

    #[tokio::test]
    async fn levels_land_for_current_clip() {
        let model = model_with("/media/a.wav");
        let mut levels = LevelsScheduler::new(Arc::new(FakeSource::default())).with_samples_per_peak(100);

        assert!(levels.start(KEY, &first_clip(&model), false));
        assert_eq!(levels.drain(&model).await, vec![KEY]);
        assert!(!levels.is_running(KEY));
        let data = levels.levels(KEY).unwrap();
        assert_eq!(data.peaks.len(), 10);
        assert_eq!(data.sample_rate, 8000);

        assert!(!levels.start(KEY, &first_clip(&model), false), "already computed");
    }

    #[tokio::test]
    async fn forced_restart_supersedes_running_task() {
        let model = model_with("/media/a.wav");
        let source = Arc::new(FakeSource {
            delay: Some(Duration::from_millis(50)),
            ..FakeSource::default()
        });
        let mut levels = LevelsScheduler::new(source.clone());
        let producer = first_clip(&model);

        assert!(levels.start(KEY, &producer, false));
        assert!(!levels.start(KEY, &producer, false), "already running");
        assert!(levels.start(KEY, &producer, true));

        assert_eq!(levels.drain(&model).await, vec![KEY]);
        // The older run's result is discarded whenever it arrives.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(levels.apply_ready(&model).is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn result_for_a_changed_clip_is_dropped() {
        let model = model_with("/media/a.wav");
        let mut levels = LevelsScheduler::new(Arc::new(FakeSource::default()));
        assert!(levels.start(KEY, &first_clip(&model), false));

        // Meanwhile a different clip took index 0.
        let edited = model_with("/media/b.wav");
        assert!(levels.drain(&edited).await.is_empty());
        assert!(levels.levels(KEY).is_none());
        assert!(!levels.is_running(KEY));
    }

    #[tokio::test]
    async fn decoder_failure_leaves_no_levels() {
        let model = model_with("/media/broken.wav");
        let mut levels = LevelsScheduler::new(Arc::new(FakeSource::default()));
        assert!(levels.start(KEY, &first_clip(&model), false));
        assert!(levels.drain(&model).await.is_empty());
        assert!(levels.levels(KEY).is_none());
    }

    #[tokio::test]
    async fn content_changes_queue_restarts() {
        let model = model_with("/media/a.wav");
        let source = Arc::new(FakeSource::default());
        let mut levels = LevelsScheduler::new(source.clone());
        levels.start(KEY, &first_clip(&model), false);
        levels.drain(&model).await;

        let bus = model.events().clone();
        levels.watch(&bus);
        bus.emit(TimelineEvent::ClipContentChanged { track: 0, clip: 0 });
        bus.emit(TimelineEvent::ClipContentChanged { track: 0, clip: 0 });
        bus.emit(TimelineEvent::ClipContentChanged { track: 0, clip: 7 });

        assert_eq!(levels.restart_pending(&model), 1);
        assert_eq!(levels.drain(&model).await, vec![KEY]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(levels.restart_pending(&model), 0);
    }
}
