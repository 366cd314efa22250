//! The playback session: one shared, consistent view of what is playing.
//!
//! The engine is the only writer. Readers subscribe through a
//! `tokio::sync::watch` channel and always observe whole snapshots, so a
//! reader can never see `playing` without a station, or `buffering` next to
//! an error.

use std::{sync::Arc, time::Duration};

use tokio::sync::watch;
use url::Url;

use crate::{error::PlaybackError, station::Station};

/// Clamps `volume` to `[0.0, 1.0]`. Returns `None` for NaN.
#[must_use]
pub fn clamp_volume(volume: f32) -> Option<f32> {
    (!volume.is_nan()).then(|| volume.clamp(0.0, 1.0))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Status {
    #[default]
    Idle,

    /// Trying candidate `candidate` (1-based) out of `of`.
    Loading { candidate: usize, of: usize },

    Playing,
    Paused,

    /// Reloading the current stream after a stall.
    Reconnecting { attempt: u32 },

    Failed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackSession {
    /// The selected station. Kept after a failure so that the error can name
    /// it.
    pub station: Option<Arc<Station>>,

    /// The candidate URL that is playing, if any.
    pub stream: Option<Url>,

    pub status: Status,
    pub playing: bool,
    pub buffering: bool,
    pub error: Option<PlaybackError>,

    /// Volume in `[0.0, 1.0]`.
    pub volume: f32,

    pub position: Option<Duration>,
    pub duration: Option<Duration>,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self {
            station: None,
            stream: None,
            status: Status::Idle,
            playing: false,
            buffering: false,
            error: None,
            volume: 1.0,
            position: None,
            duration: None,
        }
    }
}

impl PlaybackSession {
    #[must_use]
    pub fn with_volume(volume: f32) -> Self {
        Self {
            volume: clamp_volume(volume).unwrap_or(1.0),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_active(&self, station: &Station) -> bool {
        self.station.as_ref().is_some_and(|active| active.id == station.id)
    }

    /// Checks the session invariants.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        (!self.playing || self.station.is_some())
            && !(self.buffering && self.error.is_some())
            && (0.0..=1.0).contains(&self.volume)
    }

    /// Selects `station` and marks it as loading.
    pub(crate) fn begin(&mut self, station: Arc<Station>) {
        self.station = Some(station);
        self.stream = None;
        self.status = Status::Loading { candidate: 0, of: 0 };
        self.playing = false;
        self.buffering = true;
        self.error = None;
        self.position = None;
        self.duration = None;
    }

    pub(crate) fn start(&mut self, stream: Url) {
        self.stream = Some(stream);
        self.status = Status::Playing;
        self.playing = true;
        self.buffering = false;
        self.error = None;
    }

    pub(crate) fn pause(&mut self) {
        self.status = Status::Paused;
        self.playing = false;
        self.buffering = false;
    }

    /// Records a terminal failure. The station stays selected.
    pub(crate) fn fail(&mut self, error: PlaybackError) {
        self.stream = None;
        self.status = Status::Failed;
        self.playing = false;
        self.buffering = false;
        self.error = Some(error);
        self.position = None;
    }

    /// Clears everything but the volume.
    pub(crate) fn reset(&mut self) {
        *self = Self {
            volume: self.volume,
            ..Self::default()
        };
    }
}

/// Write side of the session. Owned by the engine.
#[derive(Debug)]
pub struct Store {
    tx: watch::Sender<PlaybackSession>,
}

impl Store {
    #[must_use]
    pub fn new(session: PlaybackSession) -> Self {
        let (tx, _) = watch::channel(session);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSession> {
        self.tx.subscribe()
    }

    /// Inspects the current session without cloning it.
    pub fn read<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&PlaybackSession) -> R,
    {
        f(&self.tx.borrow())
    }

    /// Applies `f` atomically and notifies subscribers if anything changed.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut PlaybackSession),
    {
        self.tx.send_if_modified(|session| {
            let before = session.clone();
            f(session);
            debug_assert!(
                session.is_consistent(),
                "inconsistent session: {session:?}"
            );
            *session != before
        });
    }
}
