//! The room's shared playback state: a tagged-variant state machine
//! (spec.md §3, §4.1, §9 "Tagged variants over inheritance").
//!
//! State machine transitions:
//!
//! - paused    -> playing   (`set_play`)
//! - playing   -> paused    (`set_pause`)
//! - any       -> suspended (`add_suspend_by`, first suspender)
//! - suspended -> paused    (all suspenders leave, `resume_target = Paused`)
//! - suspended -> playing   (all suspenders leave, `resume_target = Playing`)
//! - any       -> paused    (`set_current_file_ind` with a new index)

use std::collections::HashSet;
use std::time::Instant;

use crate::connection::ConnId;

/// `T0` for `Playing`: a monotonic instant, never wall-clock time, so
/// that `video_time` never jumps when the system clock is adjusted
/// (spec.md §9 "Monotonic time").
pub type MonotonicInstant = Instant;

/// The resume target recorded when a room is suspended: which variant
/// kind to return to once the suspender set empties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeTarget {
    Playing,
    Paused,
}

/// The kind of a [`VideoStatus`], used for server-command prefixes and
/// for remembering what a transient `Suspended` should resume to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Playing,
    Paused,
    Suspended,
}

/// Tagged-variant playback state for one room (spec.md §3).
///
/// Every variant carries `video_time` and `current_file_ind` so that no
/// transition can silently drop either (the invariant spec.md §4.1
/// calls out explicitly).
#[derive(Debug, Clone)]
pub enum VideoStatus {
    Playing {
        video_time: f64,
        current_file_ind: usize,
        reference_instant: MonotonicInstant,
    },
    Paused {
        video_time: f64,
        current_file_ind: usize,
    },
    Suspended {
        video_time: f64,
        current_file_ind: usize,
        suspenders: HashSet<ConnId>,
        resume_target: ResumeTarget,
    },
}

impl VideoStatus {
    pub fn initial(last_watch_ts: f64, last_file_ind: usize) -> Self {
        VideoStatus::Paused {
            video_time: last_watch_ts,
            current_file_ind: last_file_ind,
        }
    }

    pub fn kind(&self) -> StatusKind {
        match self {
            VideoStatus::Playing { .. } => StatusKind::Playing,
            VideoStatus::Paused { .. } => StatusKind::Paused,
            VideoStatus::Suspended { .. } => StatusKind::Suspended,
        }
    }

    /// The observable playback position: for `Playing` this accounts
    /// for wall-clock elapsed since `reference_instant`.
    pub fn video_time(&self) -> f64 {
        match self {
            VideoStatus::Playing {
                video_time,
                reference_instant,
                ..
            } => video_time + reference_instant.elapsed().as_secs_f64(),
            VideoStatus::Paused { video_time, .. } => *video_time,
            VideoStatus::Suspended { video_time, .. } => *video_time,
        }
    }

    pub fn current_file_ind(&self) -> usize {
        match self {
            VideoStatus::Playing {
                current_file_ind, ..
            }
            | VideoStatus::Paused {
                current_file_ind, ..
            }
            | VideoStatus::Suspended {
                current_file_ind, ..
            } => *current_file_ind,
        }
    }
}

/// Applies client commands to a room's [`VideoStatus`] and renders the
/// resulting server notification. Owned exclusively by a `Room`, under
/// the room mutation lock (spec.md §4.4).
#[derive(Debug)]
pub struct StatusHandler {
    status: VideoStatus,
}

impl StatusHandler {
    pub fn new(status: VideoStatus) -> Self {
        Self { status }
    }

    pub fn status(&self) -> &VideoStatus {
        &self.status
    }

    pub fn current_file_ind(&self) -> usize {
        self.status.current_file_ind()
    }

    /// Sets the stored playback position. In `Playing`, also resets
    /// `reference_instant` to now so that `video_time()` keeps reading
    /// the newly-set position going forward.
    pub fn set_video_time(&mut self, t: f64) {
        match &mut self.status {
            VideoStatus::Playing {
                video_time,
                reference_instant,
                ..
            } => {
                *video_time = t;
                *reference_instant = MonotonicInstant::now();
            }
            VideoStatus::Paused { video_time, .. } => *video_time = t,
            VideoStatus::Suspended { video_time, .. } => *video_time = t,
        }
    }

    /// No-op if `fi` is the already-current index. Otherwise forces
    /// `Paused`, resets `video_time` to zero, and adopts `fi`
    /// (spec.md §4.1, §8 idempotence property).
    pub fn set_current_file_ind(&mut self, fi: usize) {
        if fi == self.status.current_file_ind() {
            return;
        }
        self.status = VideoStatus::Paused {
            video_time: 0.0,
            current_file_ind: fi,
        };
    }

    /// `Paused -> Playing` only; every other state is left unchanged.
    pub fn set_play(&mut self) {
        if let VideoStatus::Paused {
            video_time,
            current_file_ind,
        } = &self.status
        {
            self.status = VideoStatus::Playing {
                video_time: *video_time,
                current_file_ind: *current_file_ind,
                reference_instant: MonotonicInstant::now(),
            };
        }
    }

    /// Any state -> `Paused`, preserving the observable `video_time`.
    ///
    /// The source this spec is grounded on has a variant where this
    /// unconditionally overwrites the state (rather than requiring the
    /// previous state to be `Playing`, as an adjacent comment implies
    /// it should). This implementation keeps the unconditional
    /// behavior — see DESIGN.md's "open questions" entry.
    pub fn set_pause(&mut self) {
        self.status = VideoStatus::Paused {
            video_time: self.status.video_time(),
            current_file_ind: self.status.current_file_ind(),
        };
    }

    /// Idempotent per `id`: promotes to `Suspended` (recording
    /// `resume_target` from the pre-suspend kind) if not already
    /// suspended, then inserts `id` into the suspender set.
    pub fn add_suspend_by(&mut self, id: ConnId) {
        if !matches!(self.status, VideoStatus::Suspended { .. }) {
            let resume_target = match self.status.kind() {
                StatusKind::Playing => ResumeTarget::Playing,
                _ => ResumeTarget::Paused,
            };
            self.status = VideoStatus::Suspended {
                video_time: self.status.video_time(),
                current_file_ind: self.status.current_file_ind(),
                suspenders: HashSet::new(),
                resume_target,
            };
        }
        if let VideoStatus::Suspended { suspenders, .. } = &mut self.status {
            suspenders.insert(id);
        }
    }

    /// Like [`Self::add_suspend_by`] but forces `resume_target` to
    /// `Paused` regardless of the pre-suspend state. Used when a fresh
    /// viewer attaches (spec.md §4.4 `add_connection`).
    pub fn add_suspend_by_with_pause_target(&mut self, id: ConnId) {
        self.add_suspend_by(id);
        if let VideoStatus::Suspended { resume_target, .. } = &mut self.status {
            *resume_target = ResumeTarget::Paused;
        }
    }

    /// Tolerant of an absent `id`. If removal empties the suspender
    /// set, transitions to `resume_target`, preserving `video_time`
    /// and `current_file_ind` (the invariant forbidding an empty-set
    /// `Suspended` — spec.md §3 — is restored synchronously here).
    pub fn remove_suspend_by(&mut self, id: ConnId) {
        let VideoStatus::Suspended {
            video_time,
            current_file_ind,
            suspenders,
            resume_target,
        } = &mut self.status
        else {
            return;
        };
        suspenders.remove(&id);
        if suspenders.is_empty() {
            let (video_time, current_file_ind, resume_target) =
                (*video_time, *current_file_ind, *resume_target);
            self.status = match resume_target {
                ResumeTarget::Playing => VideoStatus::Playing {
                    video_time,
                    current_file_ind,
                    reference_instant: MonotonicInstant::now(),
                },
                ResumeTarget::Paused => VideoStatus::Paused {
                    video_time,
                    current_file_ind,
                },
            };
        }
    }

    /// Renders the `(kind, video_time)` pair broadcast after every
    /// accepted mutation (spec.md §4.1, §4.4).
    pub fn to_server_command(&self) -> (StatusKind, f64) {
        (self.status.kind(), self.status.video_time())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> StatusHandler {
        StatusHandler::new(VideoStatus::initial(0.0, 0))
    }

    #[test]
    fn starts_paused() {
        let h = handler();
        assert_eq!(h.status().kind(), StatusKind::Paused);
    }

    #[test]
    fn play_only_from_pause() {
        let mut h = handler();
        h.set_play();
        assert_eq!(h.status().kind(), StatusKind::Playing);

        // playing -> play is a no-op kind-wise (stays playing)
        h.set_play();
        assert_eq!(h.status().kind(), StatusKind::Playing);
    }

    #[test]
    fn pause_from_any_state_preserves_time() {
        let mut h = handler();
        h.set_play();
        h.set_video_time(42.0);
        h.set_pause();
        assert_eq!(h.status().kind(), StatusKind::Paused);
        assert!((h.status().video_time() - 42.0).abs() < 0.01);
    }

    #[test]
    fn suspend_is_idempotent_per_id() {
        let mut h = handler();
        h.add_suspend_by(1);
        h.add_suspend_by(1);
        if let VideoStatus::Suspended { suspenders, .. } = h.status() {
            assert_eq!(suspenders.len(), 1);
        } else {
            panic!("expected suspended");
        }
    }

    #[test]
    fn remove_suspend_on_absent_id_is_noop() {
        let mut h = handler();
        h.add_suspend_by(1);
        h.remove_suspend_by(999);
        assert_eq!(h.status().kind(), StatusKind::Suspended);
    }

    #[test]
    fn balanced_suspend_sequence_restores_kind() {
        let mut h = handler();
        h.set_play();
        let before = h.status().kind();
        h.add_suspend_by(1);
        h.add_suspend_by(2);
        h.remove_suspend_by(1);
        h.remove_suspend_by(2);
        assert_eq!(h.status().kind(), before);
    }

    #[test]
    fn two_suspenders_need_both_to_release() {
        let mut h = handler();
        h.add_suspend_by(0);
        h.add_suspend_by(1);
        h.remove_suspend_by(0);
        assert_eq!(h.status().kind(), StatusKind::Suspended);
        h.remove_suspend_by(1);
        assert_eq!(h.status().kind(), StatusKind::Paused);
    }

    #[test]
    fn file_change_resets_position_and_pauses() {
        let mut h = handler();
        h.set_play();
        h.set_video_time(42.0);
        h.set_current_file_ind(3);
        assert_eq!(h.status().kind(), StatusKind::Paused);
        assert_eq!(h.status().current_file_ind(), 3);
        assert_eq!(h.status().video_time(), 0.0);
    }

    #[test]
    fn file_change_to_same_index_is_noop() {
        let mut h = handler();
        h.set_play();
        h.set_video_time(10.0);
        h.set_current_file_ind(0);
        assert_eq!(h.status().kind(), StatusKind::Playing);
    }
}
