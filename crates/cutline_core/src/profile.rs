use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Output format of the composition: frame size and frame rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub description: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate_num: u32,
    pub frame_rate_den: u32,
}

impl Profile {
    pub fn fps(&self) -> f64 {
        if self.frame_rate_den == 0 {
            return 0.0;
        }
        f64::from(self.frame_rate_num) / f64::from(self.frame_rate_den)
    }

    /// Nominal integer frame rate used for timecode fields.
    pub fn fps_rounded(&self) -> i32 {
        self.fps().round() as i32
    }

    /// NTSC rates (29.97, 59.94) use drop-frame timecode.
    pub fn is_drop_frame(&self) -> bool {
        self.frame_rate_den == 1001 && self.frame_rate_num % 30000 == 0
    }
}

impl Default for Profile {
    fn default() -> Self {
        preset_1080p()
    }
}

fn profile(description: &str, width: u32, height: u32, num: u32, den: u32) -> Profile {
    Profile {
        description: description.to_string(),
        width,
        height,
        frame_rate_num: num,
        frame_rate_den: den,
    }
}

/// 1920x1080 30fps preset.
pub fn preset_1080p() -> Profile {
    profile("HD 1080p 30 fps", 1920, 1080, 30, 1)
}

/// 1920x1080 25fps preset.
pub fn preset_1080p_25() -> Profile {
    profile("HD 1080p 25 fps", 1920, 1080, 25, 1)
}

/// 1920x1080 29.97fps preset.
pub fn preset_1080p_2997() -> Profile {
    profile("HD 1080p 29.97 fps", 1920, 1080, 30000, 1001)
}

/// 1920x1080 60fps preset.
pub fn preset_1080p_60() -> Profile {
    profile("HD 1080p 60 fps", 1920, 1080, 60, 1)
}

/// 1080x1920 30fps (vertical/shorts) preset.
pub fn preset_vertical() -> Profile {
    profile("Vertical 1080x1920 30 fps", 1080, 1920, 30, 1)
}

/// 1280x720 30fps preset.
pub fn preset_720p() -> Profile {
    profile("HD 720p 30 fps", 1280, 720, 30, 1)
}

/// 3840x2160 30fps (4K) preset.
pub fn preset_4k() -> Profile {
    profile("UHD 2160p 30 fps", 3840, 2160, 30, 1)
}

// ---------------------------------------------------------------------------
// Editor configuration
// ---------------------------------------------------------------------------

/// Settings the timeline editor reads at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Maximum number of undo entries kept; 0 means unlimited.
    pub undo_limit: usize,
    /// Snap distance in frames for clip drags; 0 disables snapping.
    pub snap_threshold: i32,
    /// Dissolve into each clip appended to the first video track.
    pub transition_after_append: bool,
    pub profile: Profile,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            undo_limit: 100,
            snap_threshold: 0,
            transition_after_append: false,
            profile: Profile::default(),
        }
    }
}

impl EditorConfig {
    /// Save as pretty-printed JSON, appending `.json` when the path has no
    /// extension.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = ensure_extension(path.as_ref());
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: EditorConfig = serde_json::from_str(&data)?;
        Ok(config)
    }
}

fn ensure_extension(path: &Path) -> PathBuf {
    if path.extension().is_some() {
        return path.to_path_buf();
    }
    let mut p = path.to_path_buf();
    let mut name = p.file_name().unwrap_or_default().to_os_string();
    name.push(".json");
    p.set_file_name(name);
    p
}
