use crate::error::{invalid, Result};
use crate::profile::Profile;

/// How frame counts are rendered for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeFormat {
    /// `HH:MM:SS:FF`, with `;` before the frames field for drop-frame rates.
    #[default]
    Smpte,
    /// `HH:MM:SS.mmm`
    Clock,
    /// Bare frame number.
    Frames,
}

fn drop_frames_per_minute(profile: &Profile) -> i32 {
    if profile.fps_rounded() >= 60 {
        4
    } else {
        2
    }
}

pub fn frames_to_time(frames: i32, profile: &Profile, format: TimeFormat) -> String {
    let frames = frames.max(0);
    match format {
        TimeFormat::Frames => frames.to_string(),
        TimeFormat::Clock => {
            let fps = profile.fps();
            let ms = if fps > 0.0 {
                (f64::from(frames) * 1000.0 / fps).round() as i64
            } else {
                0
            };
            format!(
                "{:02}:{:02}:{:02}.{:03}",
                ms / 3_600_000,
                (ms / 60_000) % 60,
                (ms / 1000) % 60,
                ms % 1000
            )
        }
        TimeFormat::Smpte => {
            let fps = profile.fps_rounded().max(1);
            let mut f = frames;
            let sep = if profile.is_drop_frame() {
                let drop = drop_frames_per_minute(profile);
                let per_ten_minutes = (profile.fps() * 600.0).round() as i32;
                let per_minute = fps * 60 - drop;
                let tens = f / per_ten_minutes;
                let rem = f % per_ten_minutes;
                f += drop * 9 * tens;
                if rem > drop {
                    f += drop * ((rem - drop) / per_minute);
                }
                ';'
            } else {
                ':'
            };
            let secs = f / fps;
            format!(
                "{:02}:{:02}:{:02}{}{:02}",
                secs / 3600,
                (secs / 60) % 60,
                secs % 60,
                sep,
                f % fps
            )
        }
    }
}

/// Accepts the same shapes the time entry field does: up to four numeric
/// fields where only the last separator may be `.` or `;`. Empty fields
/// count as zero.
pub fn is_valid_time(text: &str) -> bool {
    split_fields(text).is_some()
}

fn split_fields(text: &str) -> Option<(Vec<&str>, Option<char>)> {
    let s = text.trim();
    if !s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ':' | ';' | '.'))
    {
        return None;
    }
    let seps: Vec<char> = s.chars().filter(|c| !c.is_ascii_digit()).collect();
    if seps.len() > 3 {
        return None;
    }
    let last = seps.last().copied();
    if seps.iter().rev().skip(1).any(|c| *c != ':') {
        return None;
    }
    Some((s.split([':', ';', '.']).collect(), last))
}

fn field(text: &str) -> Result<i64> {
    if text.is_empty() {
        return Ok(0);
    }
    text.parse::<i64>()
        .map_err(|e| invalid(format!("bad time field {text:?}: {e}")))
}

/// Parse a time string into a frame count for `profile`.
pub fn time_to_frames(text: &str, profile: &Profile) -> Result<i32> {
    let (fields, last_sep) =
        split_fields(text).ok_or_else(|| invalid(format!("malformed time {text:?}")))?;
    if fields.iter().all(|f| f.is_empty()) {
        return Err(invalid("empty time"));
    }

    let frames = match last_sep {
        Some('.') => {
            let Some((fraction, whole)) = fields.split_last() else {
                return Err(invalid("empty time"));
            };
            let mut seconds = 0.0;
            for f in whole {
                seconds = seconds * 60.0 + field(f)? as f64;
            }
            let fraction: f64 = format!("0.{}0", fraction)
                .parse()
                .map_err(|_| invalid(format!("bad fraction {fraction:?}")))?;
            ((seconds + fraction) * profile.fps()).round() as i64
        }
        _ => {
            let fps = i64::from(profile.fps_rounded().max(1));
            let mut values = [0i64; 4];
            let offset = 4 - fields.len();
            for (i, f) in fields.iter().enumerate() {
                values[offset + i] = field(f)?;
            }
            let [h, m, s, f] = values;
            let mut total = ((h * 60 + m) * 60 + s) * fps + f;
            if last_sep == Some(';') && profile.is_drop_frame() {
                let minutes = h * 60 + m;
                total -= i64::from(drop_frames_per_minute(profile)) * (minutes - minutes / 10);
            }
            total
        }
    };
    i32::try_from(frames).map_err(|_| invalid(format!("time out of range {text:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{preset_1080p, preset_1080p_2997};

    #[test]
    fn smpte_formatting() {
        let p = preset_1080p();
        assert_eq!(frames_to_time(0, &p, TimeFormat::Smpte), "00:00:00:00");
        assert_eq!(frames_to_time(95, &p, TimeFormat::Smpte), "00:00:03:05");
        assert_eq!(frames_to_time(30 * 3661, &p, TimeFormat::Smpte), "01:01:01:00");
    }

    #[test]
    fn drop_frame_formatting() {
        let p = preset_1080p_2997();
        assert_eq!(frames_to_time(1799, &p, TimeFormat::Smpte), "00:00:59;29");
        assert_eq!(frames_to_time(1800, &p, TimeFormat::Smpte), "00:01:00;02");
        assert_eq!(frames_to_time(17982, &p, TimeFormat::Smpte), "00:10:00;00");
    }

    #[test]
    fn clock_and_frames_formatting() {
        let p = preset_1080p();
        assert_eq!(frames_to_time(45, &p, TimeFormat::Clock), "00:00:01.500");
        assert_eq!(frames_to_time(45, &p, TimeFormat::Frames), "45");
    }

    #[test]
    fn parse_smpte_and_partial_fields() {
        let p = preset_1080p();
        assert_eq!(time_to_frames("00:00:03:05", &p).unwrap(), 95);
        assert_eq!(time_to_frames("3:05", &p).unwrap(), 95);
        assert_eq!(time_to_frames(" 120 ", &p).unwrap(), 120);
        assert_eq!(time_to_frames("1::", &p).unwrap(), 1800);
    }

    #[test]
    fn parse_clock() {
        let p = preset_1080p();
        assert_eq!(time_to_frames("00:00:01.5", &p).unwrap(), 45);
        assert_eq!(time_to_frames("2.", &p).unwrap(), 60);
    }

    #[test]
    fn parse_drop_frame_roundtrip() {
        let p = preset_1080p_2997();
        for frames in [0, 1799, 1800, 17982, 20000] {
            let text = frames_to_time(frames, &p, TimeFormat::Smpte);
            assert_eq!(time_to_frames(&text, &p).unwrap(), frames, "{text}");
        }
    }

    #[test]
    fn rejects_malformed() {
        let p = preset_1080p();
        assert!(!is_valid_time("1:2:3:4:5"));
        assert!(!is_valid_time("1.2:3"));
        assert!(!is_valid_time("12a"));
        assert!(is_valid_time("1:2:3;4"));
        assert!(time_to_frames("", &p).is_err());
        assert!(time_to_frames("::", &p).is_err());
    }
}
