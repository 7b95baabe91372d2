use crate::model::MultitrackModel;
use crate::playlist::Playlist;

/// Find the nearest snap point within the threshold.
/// Returns the snapped position if within threshold, otherwise the original position.
pub fn find_snap_point(position: i32, snap_points: &[i32], threshold: i32) -> i32 {
    let mut best = position;
    let mut best_dist = threshold + 1;

    for &point in snap_points {
        let dist = (position - point).abs();
        if dist < best_dist {
            best = point;
            best_dist = dist;
        }
    }

    if best_dist <= threshold {
        best
    } else {
        position
    }
}

/// Every slot edge on every track, plus frame 0. `exclude` skips the edges
/// of one `(track, clip)` slot, typically the clip being dragged.
pub fn collect_edit_points(model: &MultitrackModel, exclude: Option<(usize, usize)>) -> Vec<i32> {
    let mut points = vec![0];

    for track in 0..model.track_count() {
        let Some(playlist) = model.playlist(track) else {
            continue;
        };
        let mut start = 0;
        for (clip, p) in playlist.entries.iter().enumerate() {
            let end = start + p.get_playtime();
            if exclude != Some((track, clip)) && !p.is_blank() {
                points.push(start);
                points.push(end);
            }
            start = end;
        }
    }

    points.sort_unstable();
    points.dedup();
    points
}

fn index_at_or_end(playlist: &Playlist, position: i32) -> usize {
    playlist
        .get_clip_index_at(position)
        .unwrap_or(playlist.count())
}

/// The latest slot start strictly before `position` on any track.
pub fn previous_edit(model: &MultitrackModel, position: i32) -> Option<i32> {
    model
        .tractor()
        .tracks
        .iter()
        .filter_map(|playlist| {
            let index = index_at_or_end(playlist, position);
            let index = if position == playlist.clip_start(index) {
                index.checked_sub(1)?
            } else {
                index
            };
            Some(playlist.clip_start(index))
        })
        .max()
}

/// The earliest slot boundary after `position` on any track. A position
/// inside a track's last slot yields that track's end.
pub fn next_edit(model: &MultitrackModel, position: i32) -> Option<i32> {
    model
        .tractor()
        .tracks
        .iter()
        .filter_map(|playlist| {
            let next = playlist.get_clip_index_at(position)? + 1;
            (next <= playlist.count()).then(|| playlist.clip_start(next))
        })
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn snap_to_nearest_point() {
        let points = vec![0, 100, 500];
        assert_eq!(find_snap_point(110, &points, 20), 100);
    }

    #[test]
    fn no_snap_beyond_threshold() {
        let points = vec![0, 100, 500];
        assert_eq!(find_snap_point(300, &points, 20), 300);
    }

    #[test]
    fn snap_to_closest_of_two() {
        let points = vec![100, 200];
        assert_eq!(find_snap_point(140, &points, 60), 100);
        assert_eq!(find_snap_point(170, &points, 60), 200);
    }

    #[test]
    fn zero_threshold_only_snaps_exact() {
        let points = vec![0, 100];
        assert_eq!(find_snap_point(100, &points, 0), 100);
        assert_eq!(find_snap_point(101, &points, 0), 101);
    }

    #[test]
    fn edit_points_skip_blanks_and_excluded_clip() {
        // V1: [A 0..100)[gap 100..150)[B 150..250)
        let m = model_with(&[clip(100), blank(50), clip(100)]);
        assert_eq!(collect_edit_points(&m, None), vec![0, 100, 150, 250]);
        assert_eq!(collect_edit_points(&m, Some((0, 2))), vec![0, 100]);
    }

    #[test]
    fn previous_edit_steps_back_one_boundary() {
        let m = model_with(&[clip(100), blank(50), clip(100)]);
        assert_eq!(previous_edit(&m, 120), Some(100));
        assert_eq!(previous_edit(&m, 100), Some(0));
        assert_eq!(previous_edit(&m, 400), Some(250), "past the end goes to the end");
        assert_eq!(previous_edit(&m, 0), None);
    }

    #[test]
    fn next_edit_finds_following_boundary() {
        let m = model_with(&[clip(100), blank(50), clip(100)]);
        assert_eq!(next_edit(&m, 0), Some(100));
        assert_eq!(next_edit(&m, 120), Some(150));
        assert_eq!(next_edit(&m, 160), Some(250), "last slot yields the end");
        assert_eq!(next_edit(&m, 250), None);
    }
}
