//! Handle to the playback engine.
//!
//! A [`Player`] is cheap to clone. All clones talk to the same engine task,
//! which owns the audio output. Commands are queued and never block; their
//! effect shows up in the [`PlaybackSession`] that every handle can read or
//! watch.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tuner::{output, player::Player, sink::RodioOutput, station::Station};
//!
//! # async fn example() -> tuner::error::Result<()> {
//! let (events, media) = output::event_channel();
//! let output = RodioOutput::new(reqwest::Client::new(), events)?;
//! let (player, engine) = Player::builder(output, media).spawn();
//!
//! let station = Station::new("jazz", "Jazz FM", "https://jazz.example/live");
//! player.play(Arc::new(station))?;
//!
//! let mut session = player.subscribe();
//! while session.changed().await.is_ok() {
//!     println!("{:?}", session.borrow().status);
//! }
//!
//! player.dispose()?;
//! engine.await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};

use crate::{
    config::Config,
    engine::{Command, Engine},
    error::{Error, Result},
    events::Event,
    output::{AudioOutput, EventReceiver},
    resolver::Resolver,
    station::Station,
    store::{PlaybackSession, Store},
    verify::Verify,
};

pub use crate::engine::Settings;

#[derive(Clone, Debug)]
pub struct Player {
    commands: mpsc::UnboundedSender<Command>,
    session: watch::Receiver<PlaybackSession>,
    events: broadcast::Sender<Event>,
}

/// Configures and starts a [`Player`].
pub struct Builder<O> {
    output: O,
    media: EventReceiver,
    resolver: Resolver,
    verifier: Option<Arc<dyn Verify>>,
    settings: Settings,
    volume: f32,
}

impl<O: AudioOutput> Builder<O> {
    /// Takes the resolver, timing and initial volume from `config`.
    #[must_use]
    pub fn config(mut self, config: &Config) -> Self {
        self.resolver = Resolver::from_config(config);
        self.settings = Settings::from(config);
        self.volume = config.volume;
        self
    }

    #[must_use]
    pub fn resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub fn verifier(mut self, verifier: Arc<dyn Verify>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    /// Spawns the engine on the current tokio runtime.
    ///
    /// The returned task completes after [`Player::dispose`], or when the
    /// last handle is dropped.
    #[must_use]
    pub fn spawn(self) -> (Player, JoinHandle<()>) {
        const EVENT_CAPACITY: usize = 64;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let store = Store::new(PlaybackSession::with_volume(self.volume));

        let player = Player {
            commands: commands_tx,
            session: store.subscribe(),
            events: events.clone(),
        };

        let engine = Engine::new(
            self.output,
            self.media,
            commands_rx,
            store,
            events,
            self.resolver,
            self.verifier,
            self.settings,
        );

        (player, tokio::spawn(engine.run()))
    }
}

impl Player {
    /// Starts building a player around `output`. `media` must be the
    /// receiving end of the channel the output reports on.
    #[must_use]
    pub fn builder<O: AudioOutput>(output: O, media: EventReceiver) -> Builder<O> {
        Builder {
            output,
            media,
            resolver: Resolver::default(),
            verifier: None,
            settings: Settings::default(),
            volume: Config::DEFAULT_VOLUME,
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::unavailable("player has shut down"))
    }

    /// Plays `station`. Selecting the station that is already playing
    /// toggles between playing and paused.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` after the player shut down. Playback failures
    /// are reported in the session instead.
    pub fn play(&self, station: Arc<Station>) -> Result<()> {
        self.send(Command::Play(station))
    }

    pub fn toggle_play(&self) -> Result<()> {
        self.send(Command::Toggle)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    /// Resumes the paused station, or retries a station that failed.
    pub fn resume(&self) -> Result<()> {
        self.send(Command::Resume)
    }

    /// Stops playback and deselects the station.
    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    /// Sets the volume. Values are clamped to `[0.0, 1.0]`; NaN is ignored.
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.send(Command::SetVolume(volume))
    }

    /// Stops playback, releases the audio output and ends the engine task.
    pub fn dispose(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    /// The current session.
    #[must_use]
    pub fn session(&self) -> PlaybackSession {
        self.session.borrow().clone()
    }

    /// Watches the session. The receiver wakes on every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSession> {
        self.session.clone()
    }

    /// Receives playback transitions from now on.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}
