//! The native audio output.
//!
//! Exactly one [`AudioOutput`] exists per player and the playback engine is
//! its sole owner. The trait mirrors a media element: a source is set,
//! loaded, and then played or paused. Loading is asynchronous: its progress is
//! reported as [`MediaEvent`]s on an [`EventSender`].
//!
//! Every source is tagged with a [`Generation`]. Events carry the generation
//! of the source that produced them, which lets the engine discard events from
//! sources it has already abandoned. Without this, a slow candidate could
//! report "ready" after the listener moved on and start audio nobody asked
//! for.

use std::{fmt, time::Duration};

use tokio::sync::mpsc;
use url::Url;

use crate::error::Result;

/// Identifies one `set_source` call. Strictly increasing per player.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Events emitted by an audio output.
#[derive(Clone, Debug, PartialEq)]
pub enum MediaEvent {
    /// Enough data is buffered to start playback.
    CanPlay,

    /// Audio is flowing.
    Playing,

    /// Playback is waiting for data that should arrive shortly.
    Waiting,

    /// The stream stopped delivering data.
    Stalled,

    /// The source reached its end. For live radio this means the connection
    /// dropped.
    Ended,

    /// Position and, when known, duration of the current source.
    Progress {
        position: Duration,
        duration: Option<Duration>,
    },

    /// The source could not be loaded or decoded.
    Error(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SourceEvent {
    pub generation: Generation,
    pub event: MediaEvent,
}

#[derive(Clone, Debug)]
pub struct EventSender(mpsc::UnboundedSender<SourceEvent>);

pub type EventReceiver = mpsc::UnboundedReceiver<SourceEvent>;

impl EventSender {
    /// Sends an event. Events sent after the player shut down are dropped.
    pub fn send(&self, generation: Generation, event: MediaEvent) {
        if self.0.send(SourceEvent { generation, event }).is_err() {
            trace!("player gone, dropping media event of {generation}");
        }
    }
}

/// Creates the channel through which an output reports to the engine.
#[must_use]
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender(tx), rx)
}

/// A single native audio output.
///
/// Implementations must not block: `load` starts work in the background and
/// reports through events.
pub trait AudioOutput: Send + 'static {
    /// Replaces the current source. Any previous source is detached first.
    ///
    /// # Errors
    ///
    /// Returns an error when the URL cannot be used by this output.
    fn set_source(&mut self, url: &Url, generation: Generation) -> Result<()>;

    /// Starts loading the current source. Expect `CanPlay` or `Error` next.
    ///
    /// # Errors
    ///
    /// Returns an error when no source is set or loading cannot start.
    fn load(&mut self) -> Result<()>;

    /// Starts or resumes playback of a loaded source.
    ///
    /// # Errors
    ///
    /// Returns an error when the source is not ready or the device refuses.
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    /// Pauses, cancels any pending load and releases the source.
    fn detach(&mut self);

    /// Applies `volume` in `[0.0, 1.0]` now and to future sources.
    fn set_volume(&mut self, volume: f32);
}

impl<O: AudioOutput + ?Sized> AudioOutput for Box<O> {
    fn set_source(&mut self, url: &Url, generation: Generation) -> Result<()> {
        (**self).set_source(url, generation)
    }

    fn load(&mut self) -> Result<()> {
        (**self).load()
    }

    fn play(&mut self) -> Result<()> {
        (**self).play()
    }

    fn pause(&mut self) {
        (**self).pause();
    }

    fn detach(&mut self) {
        (**self).detach();
    }

    fn set_volume(&mut self, volume: f32) {
        (**self).set_volume(volume);
    }
}
