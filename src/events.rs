//! Events emitted by the player.
//!
//! The session store is level-triggered: subscribers see the latest state.
//! Some consumers, such as a notification area or a play counter, want to
//! react to transitions instead. They subscribe to these events.
//!
//! # Example
//!
//! ```rust
//! use tuner::events::Event;
//!
//! fn handle_event(event: Event) {
//!     match event {
//!         Event::Play => println!("Playback started"),
//!         Event::StationChanged => println!("Tuned to another station"),
//!         Event::Failed => println!("Station unavailable"),
//!         // ... handle other events ...
//!         _ => {}
//!     }
//! }
//! ```

/// Playback transitions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// Audio started or resumed.
    Play,

    /// Playback paused by the listener.
    Pause,

    /// A different station was selected.
    StationChanged,

    /// The stream stalled and is being reconnected.
    Buffering,

    /// A stalled stream is playing again.
    Recovered,

    /// The selected station could not be played, or was lost for good.
    Failed,

    /// Playback stopped and the station was deselected.
    Stopped,
}
