use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use cutline_core::Producer;
use tracing::warn;

use crate::error::{RenderError, Result};

/// Peak data for waveform display: pairs of (min, max) for each sample window.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WaveformData {
    pub peaks: Vec<(f32, f32)>,
    pub sample_rate: u32,
    pub samples_per_peak: u32,
}

/// Decodes the audio a producer plays, as mono s16 samples.
pub trait SampleSource: Send + Sync + 'static {
    fn samples(&self, producer: &Producer) -> anyhow::Result<Vec<i16>>;

    fn sample_rate(&self) -> u32 {
        8000
    }
}

/// Waveform peaks for the part of `producer` that plays.
pub fn extract_levels(
    source: &dyn SampleSource,
    producer: &Producer,
    samples_per_peak: u32,
) -> Result<WaveformData> {
    let samples = source.samples(producer).map_err(RenderError::Source)?;
    Ok(WaveformData {
        peaks: compute_peaks(&samples, samples_per_peak),
        sample_rate: source.sample_rate(),
        samples_per_peak,
    })
}

pub fn compute_peaks(samples: &[i16], samples_per_peak: u32) -> Vec<(f32, f32)> {
    samples
        .chunks(samples_per_peak.max(1) as usize)
        .map(|chunk| {
            let min = chunk.iter().copied().min().unwrap_or(0) as f32 / 32768.0;
            let max = chunk.iter().copied().max().unwrap_or(0) as f32 / 32768.0;
            (min, max)
        })
        .collect()
}

/// Computed peaks stored as JSON files, one per producer cut.
#[derive(Debug, Clone)]
pub struct WaveformCache {
    dir: PathBuf,
}

impl WaveformCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, producer: &Producer, samples_per_peak: u32) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        producer.resource.hash(&mut hasher);
        producer.get_in().hash(&mut hasher);
        producer.get_out().hash(&mut hasher);
        samples_per_peak.hash(&mut hasher);
        self.dir.join(format!("{:016x}.json", hasher.finish()))
    }

    pub fn load(&self, producer: &Producer, samples_per_peak: u32) -> Option<WaveformData> {
        let data = std::fs::read_to_string(self.path_for(producer, samples_per_peak)).ok()?;
        serde_json::from_str(&data).ok()
    }

    pub fn store(&self, producer: &Producer, data: &WaveformData) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string(data)?;
        std::fs::write(self.path_for(producer, data.samples_per_peak), json)?;
        Ok(())
    }
}

/// Like [`extract_levels`], reading and filling `cache` when one is given.
pub fn levels_cached(
    source: &dyn SampleSource,
    cache: Option<&WaveformCache>,
    producer: &Producer,
    samples_per_peak: u32,
) -> Result<WaveformData> {
    if let Some(data) = cache.and_then(|c| c.load(producer, samples_per_peak)) {
        return Ok(data);
    }
    let data = extract_levels(source, producer, samples_per_peak)?;
    if let Some(cache) = cache {
        if let Err(e) = cache.store(producer, &data) {
            warn!(resource = %producer.resource, error = %e, "waveform not cached");
        }
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    impl SampleSource for Counting {
        fn samples(&self, producer: &Producer) -> anyhow::Result<Vec<i16>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![100; producer.get_playtime() as usize])
        }
    }

    #[test]
    fn compute_peaks_from_samples() {
        let samples: Vec<i16> = vec![0, 100, -200, 300, -400, 500, -600, 700];
        let peaks = compute_peaks(&samples, 4);
        assert_eq!(peaks.len(), 2);
        // First chunk: [0, 100, -200, 300] -> min=-200, max=300
        assert!((peaks[0].0 - (-200.0 / 32768.0)).abs() < 1e-6);
        assert!((peaks[0].1 - (300.0 / 32768.0)).abs() < 1e-6);
        // Second chunk: [-400, 500, -600, 700] -> min=-600, max=700
        assert!((peaks[1].0 - (-600.0 / 32768.0)).abs() < 1e-6);
        assert!((peaks[1].1 - (700.0 / 32768.0)).abs() < 1e-6);
    }

    #[test]
    fn compute_peaks_empty() {
        let samples: Vec<i16> = vec![];
        let peaks = compute_peaks(&samples, 256);
        assert!(peaks.is_empty());
    }

    #[test]
    fn compute_peaks_partial_chunk() {
        let samples: Vec<i16> = vec![1000, -1000, 500];
        let peaks = compute_peaks(&samples, 4);
        assert_eq!(peaks.len(), 1);
        assert!((peaks[0].0 - (-1000.0 / 32768.0)).abs() < 1e-6);
        assert!((peaks[0].1 - (1000.0 / 32768.0)).abs() < 1e-6);
    }

    #[test]
    fn zero_window_is_one_sample() {
        assert_eq!(compute_peaks(&[1, 2, 3], 0).len(), 3);
    }

    #[test]
    fn cache_skips_the_decoder() {
        let dir = tempfile::tempdir().unwrap();
        let cache = WaveformCache::new(dir.path().join("levels"));
        let source = Counting {
            calls: AtomicUsize::new(0),
        };
        let producer = Producer::new("avformat", "/media/a.wav", 400).cut(0, 99);

        let first = levels_cached(&source, Some(&cache), &producer, 10).unwrap();
        let second = levels_cached(&source, Some(&cache), &producer, 10).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.peaks.len(), 10);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        // A different cut is a different entry.
        levels_cached(&source, Some(&cache), &producer.cut(100, 199), 10).unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
