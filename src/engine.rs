//! The playback engine.
//!
//! The engine runs as a single task that owns the [`AudioOutput`]. Commands
//! from [`Player`](crate::player::Player) handles and events from the output
//! are processed one at a time, so there is never more than one operation
//! mutating the output.
//!
//! # Playing a station
//!
//! 1. Stop whatever is playing
//! 2. Resolve the candidate stream URLs
//! 3. For each candidate: optionally verify it, set it as source, load it
//!    and wait for `CanPlay`, an error or the load timeout
//! 4. On `CanPlay`, start playback and publish the stream
//! 5. When every candidate failed, publish the failure
//!
//! While a candidate loads the engine keeps listening for commands. Volume
//! changes apply immediately. Any other command abandons the attempt: the
//! source is detached, which cancels the load, and the new generation makes
//! sure that a late `CanPlay` from the abandoned source is ignored.
//!
//! # Stalls
//!
//! A playing stream that stalls is reloaded after a back-off, up to a
//! configured number of retries. A stream that then plays for a while earns
//! a fresh set of retries.

use std::{ops::ControlFlow, sync::Arc, time::Duration};

use tokio::{
    sync::{broadcast, mpsc},
    time::{self, Instant},
};
use url::Url;

use crate::{
    config::Config,
    error::{CandidateFailure, PlaybackError},
    events::Event,
    output::{AudioOutput, EventReceiver, Generation, MediaEvent, SourceEvent},
    resolver::Resolver,
    station::Station,
    store::{clamp_volume, PlaybackSession, Status, Store},
    util,
    verify::Verify,
};

/// Requests from player handles.
#[derive(Debug)]
pub(crate) enum Command {
    Play(Arc<Station>),
    Toggle,
    Pause,
    Resume,
    Stop,
    SetVolume(f32),
    Shutdown,
}

/// Timing and retry policy of the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// How long a candidate may take to become playable.
    pub load_timeout: Duration,

    /// Reload attempts after a stall before giving up.
    pub stall_retries: u32,

    /// Delay before the first reload. Doubles with every further attempt.
    pub stall_backoff: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            load_timeout: Config::DEFAULT_LOAD_TIMEOUT,
            stall_retries: Config::DEFAULT_STALL_RETRIES,
            stall_backoff: Config::DEFAULT_STALL_BACKOFF,
        }
    }
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            load_timeout: config.load_timeout,
            stall_retries: config.stall_retries,
            stall_backoff: config.stall_backoff,
        }
    }
}

/// The source that is playing or paused.
#[derive(Debug)]
struct Loaded {
    station: Arc<Station>,
    url: Url,
    generation: Generation,
    paused: bool,

    /// Reloads since the stream last played without interruption.
    retries: u32,
    since: Instant,
}

/// Outcome of trying one candidate.
enum Attempt {
    Ready(Generation),
    Failed(CandidateFailure),

    /// A command arrived that abandons the attempt.
    Preempted(Command),
}

enum Verdict {
    Accepted,
    Rejected,
    Preempted(Command),
}

pub(crate) struct Engine<O> {
    output: O,
    media: EventReceiver,
    commands: mpsc::UnboundedReceiver<Command>,

    store: Store,
    notify: broadcast::Sender<Event>,

    resolver: Resolver,
    verifier: Option<Arc<dyn Verify>>,
    settings: Settings,

    generation: Generation,

    /// Whether the output may hold a source that needs detaching.
    attached: bool,
    loaded: Option<Loaded>,
}

impl<O: AudioOutput> Engine<O> {
    /// Time a recovered stream must play before its retries are reset.
    const STABLE_AFTER: Duration = Duration::from_secs(30);

    #[expect(clippy::too_many_arguments)]
    pub(crate) fn new(
        output: O,
        media: EventReceiver,
        commands: mpsc::UnboundedReceiver<Command>,
        store: Store,
        notify: broadcast::Sender<Event>,
        resolver: Resolver,
        verifier: Option<Arc<dyn Verify>>,
        settings: Settings,
    ) -> Self {
        Self {
            output,
            media,
            commands,
            store,
            notify,
            resolver,
            verifier,
            settings,
            generation: Generation::default(),
            attached: false,
            loaded: None,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("playback engine started");

        let volume = self.store.read(|session| session.volume);
        self.output.set_volume(volume);

        loop {
            let next = tokio::select! {
                command = self.commands.recv() => Some(command.unwrap_or(Command::Shutdown)),
                Some(event) = self.media.recv() => self.on_media_event(event).await,
            };

            if let Some(command) = next {
                if self.dispatch(command).await.is_break() {
                    break;
                }
            }
        }

        self.detach();
        self.store.update(PlaybackSession::reset);
        debug!("playback engine stopped");
    }

    /// Executes `command` and whatever command preempted it.
    async fn dispatch(&mut self, command: Command) -> ControlFlow<()> {
        let mut next = Some(command);
        while let Some(command) = next.take() {
            trace!("command: {command:?}");
            next = match command {
                Command::Play(station) => self.play(station).await,
                Command::Toggle => self.toggle().await,
                Command::Pause => {
                    self.pause();
                    None
                }
                Command::Resume => self.resume().await,
                Command::Stop => {
                    self.stop();
                    None
                }
                Command::SetVolume(volume) => {
                    self.set_volume(volume);
                    None
                }
                Command::Shutdown => return ControlFlow::Break(()),
            };
        }

        ControlFlow::Continue(())
    }

    async fn play(&mut self, station: Arc<Station>) -> Option<Command> {
        let same = self
            .loaded
            .as_ref()
            .filter(|loaded| loaded.station.id == station.id)
            .map(|loaded| loaded.paused);

        match same {
            Some(true) => self.resume().await,
            Some(false) => {
                self.pause();
                None
            }
            None => self.start(station).await,
        }
    }

    async fn toggle(&mut self) -> Option<Command> {
        let playing = self.loaded.as_ref().is_some_and(|loaded| !loaded.paused);
        if playing {
            self.pause();
            None
        } else {
            self.resume().await
        }
    }

    fn pause(&mut self) {
        let Some(loaded) = self.loaded.as_mut() else {
            trace!("nothing to pause");
            return;
        };
        if loaded.paused {
            return;
        }

        self.output.pause();
        loaded.paused = true;
        self.store.update(PlaybackSession::pause);
        self.emit(Event::Pause);
    }

    async fn resume(&mut self) -> Option<Command> {
        if let Some(loaded) = self.loaded.as_mut() {
            if !loaded.paused {
                return None;
            }

            match self.output.play() {
                Ok(()) => {
                    loaded.paused = false;
                    let url = loaded.url.clone();
                    self.store.update(|session| session.start(url));
                    self.emit(Event::Play);
                    return None;
                }
                Err(e) => {
                    warn!("unable to resume: {e}; reloading");
                    let station = Arc::clone(&loaded.station);
                    return self.start(station).await;
                }
            }
        }

        // A station that failed, or whose load was abandoned, is still
        // selected: try it again from the start.
        match self.store.read(|session| session.station.clone()) {
            Some(station) => self.start(station).await,
            None => {
                trace!("nothing to resume");
                None
            }
        }
    }

    fn stop(&mut self) {
        self.detach();

        let was_active = self.store.read(|session| session.station.is_some());
        self.store.update(PlaybackSession::reset);
        if was_active {
            info!("stopped");
            self.emit(Event::Stopped);
        }
    }

    fn set_volume(&mut self, volume: f32) {
        let Some(volume) = clamp_volume(volume) else {
            warn!("ignoring volume {volume}");
            return;
        };

        self.output.set_volume(volume);
        self.store.update(|session| session.volume = volume);
    }

    /// Stops the current playback and plays `station` from its first
    /// candidate.
    async fn start(&mut self, station: Arc<Station>) -> Option<Command> {
        self.detach();

        let changed = !self.store.read(|session| session.is_active(&station));
        self.store.update(|session| session.begin(Arc::clone(&station)));
        if changed {
            self.emit(Event::StationChanged);
        }

        let candidates = match self.resolver.candidates(&station) {
            Ok(candidates) => candidates,
            Err(e) => {
                error!("unable to play {station}: {e}");
                self.fail(PlaybackError::NoCandidates {
                    station: station.name.clone(),
                });
                return None;
            }
        };

        let total = candidates.len();
        info!("tuning to {station} ({total} streams)");

        let mut attempts = 0;
        let mut rejected = Vec::new();
        for (index, url) in candidates.iter().enumerate() {
            match self.verify(&station, url).await {
                Verdict::Accepted => {}
                Verdict::Rejected => {
                    debug!("{station}: skipping {url}: {}", CandidateFailure::Rejected);
                    rejected.push(index);
                    continue;
                }
                Verdict::Preempted(command) => return self.preempted(command),
            }

            attempts += 1;
            if let Some(outcome) = self.candidate(&station, url, index + 1, total).await {
                return outcome;
            }
        }

        // Verification is best effort. When it turned down every stream,
        // it is more likely to be wrong than all of the streams.
        if rejected.len() == total {
            info!("{station}: no stream passed verification, trying all");
            for index in rejected {
                attempts += 1;
                if let Some(outcome) = self
                    .candidate(&station, &candidates[index], index + 1, total)
                    .await
                {
                    return outcome;
                }
            }
        }

        error!("unable to play {station}: all {attempts} attempted streams failed");
        self.detach();
        self.fail(PlaybackError::AllCandidatesFailed {
            station: station.name.clone(),
            attempts,
        });
        None
    }

    /// Tries one candidate. Returns `Some` with the command to continue with
    /// when the station is settled, `None` to move on to the next candidate.
    async fn candidate(
        &mut self,
        station: &Arc<Station>,
        url: &Url,
        candidate: usize,
        of: usize,
    ) -> Option<Option<Command>> {
        self.store
            .update(|session| session.status = Status::Loading { candidate, of });

        match self.attempt(station, url).await {
            Attempt::Ready(generation) => {
                info!("playing {station} from {url}");
                self.loaded = Some(Loaded {
                    station: Arc::clone(station),
                    url: url.clone(),
                    generation,
                    paused: false,
                    retries: 0,
                    since: Instant::now(),
                });
                let url = url.clone();
                self.store.update(|session| session.start(url));
                self.emit(Event::Play);
                Some(None)
            }
            Attempt::Failed(failure) => {
                warn!("{station}: stream {candidate}/{of} failed: {failure}");
                self.detach();
                None
            }
            Attempt::Preempted(command) => Some(self.preempted(command)),
        }
    }

    /// Loads `url` and starts playback once it can play.
    async fn attempt(&mut self, station: &Station, url: &Url) -> Attempt {
        self.generation = self.generation.next();
        let generation = self.generation;
        debug!("{station}: loading {url} ({generation})");

        self.attached = true;
        if let Err(e) = self
            .output
            .set_source(url, generation)
            .and_then(|()| self.output.load())
        {
            return Attempt::Failed(CandidateFailure::Load(e.to_string()));
        }

        let timeout = self.settings.load_timeout;
        let deadline = time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => {
                    if let Some(command) = self.intercept(station, command) {
                        return Attempt::Preempted(command);
                    }
                }

                event = self.media.recv() => {
                    let Some(SourceEvent { generation: source, event }) = event else {
                        return Attempt::Failed(CandidateFailure::Load("audio output is gone".to_owned()));
                    };
                    if source != generation {
                        trace!("ignoring {event:?} from stale source {source}");
                        continue;
                    }

                    match event {
                        MediaEvent::CanPlay => {
                            return match self.output.play() {
                                Ok(()) => Attempt::Ready(generation),
                                Err(e) => Attempt::Failed(CandidateFailure::Play(e.to_string())),
                            };
                        }
                        MediaEvent::Error(e) => return Attempt::Failed(CandidateFailure::Load(e)),
                        MediaEvent::Progress { duration, .. } => {
                            self.store.update(|session| session.duration = duration);
                        }
                        event => trace!("{generation}: {event:?} while loading"),
                    }
                }

                () = &mut deadline => return Attempt::Failed(CandidateFailure::Timeout(timeout)),
            }
        }
    }

    async fn verify(&mut self, station: &Station, url: &Url) -> Verdict {
        let Some(verifier) = self.verifier.clone() else {
            return Verdict::Accepted;
        };

        let mut check = verifier.verify(url);
        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => {
                    if let Some(command) = self.intercept(station, command) {
                        return Verdict::Preempted(command);
                    }
                }

                verified = &mut check => {
                    return if verified { Verdict::Accepted } else { Verdict::Rejected };
                }
            }
        }
    }

    /// Sleeps for `delay` while still serving commands. Returns the command
    /// that cut the wait short, if any.
    async fn wait(&mut self, station: &Station, delay: Duration) -> Option<Command> {
        let sleep = time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => {
                    if let Some(command) = self.intercept(station, command) {
                        return Some(command);
                    }
                }

                () = &mut sleep => return None,
            }
        }
    }

    /// Handles a command that arrives while `station` is being loaded.
    /// Returns the command if it abandons the load.
    fn intercept(&mut self, station: &Station, command: Option<Command>) -> Option<Command> {
        match command {
            Some(Command::SetVolume(volume)) => {
                self.set_volume(volume);
                None
            }
            Some(Command::Play(requested)) if requested.id == station.id => {
                debug!("already loading {station}");
                None
            }
            Some(Command::Resume) => None,
            Some(command) => Some(command),
            None => Some(Command::Shutdown),
        }
    }

    /// Abandons the current attempt because of `command`. Pausing ends
    /// the attempt here; other commands are passed on to be executed.
    fn preempted(&mut self, command: Command) -> Option<Command> {
        self.detach();

        match command {
            Command::Pause | Command::Toggle => {
                debug!("loading abandoned");
                self.store.update(PlaybackSession::pause);
                self.emit(Event::Pause);
                None
            }
            command => Some(command),
        }
    }

    async fn on_media_event(&mut self, event: SourceEvent) -> Option<Command> {
        let SourceEvent { generation, event } = event;
        let Some(loaded) = &self.loaded else {
            trace!("ignoring {event:?} from detached source {generation}");
            return None;
        };
        if generation != loaded.generation {
            trace!("ignoring {event:?} from stale source {generation}");
            return None;
        }

        match event {
            MediaEvent::Progress { position, duration } => {
                self.store.update(|session| {
                    session.position = Some(position);
                    session.duration = duration;
                });
                None
            }
            MediaEvent::Waiting | MediaEvent::Stalled | MediaEvent::Ended | MediaEvent::Error(_) => {
                if loaded.paused {
                    trace!("ignoring {event:?} while paused");
                    return None;
                }

                warn!("{}: stream interrupted: {event:?}", loaded.station);
                self.recover().await
            }
            MediaEvent::CanPlay | MediaEvent::Playing => None,
        }
    }

    /// Reloads the current stream after a stall.
    async fn recover(&mut self) -> Option<Command> {
        let mut loaded = self.loaded.take()?;
        if loaded.since.elapsed() >= Self::STABLE_AFTER {
            loaded.retries = 0;
        }

        self.emit(Event::Buffering);

        loop {
            if loaded.retries >= self.settings.stall_retries {
                error!(
                    "{}: stream lost after {} reconnection attempts",
                    loaded.station, loaded.retries
                );
                self.detach();
                self.fail(PlaybackError::StreamLost {
                    station: loaded.station.name.clone(),
                    retries: loaded.retries,
                });
                return None;
            }

            loaded.retries += 1;
            let attempt = loaded.retries;
            self.store.update(|session| {
                session.status = Status::Reconnecting { attempt };
                session.buffering = true;
                session.position = None;
            });

            self.detach();
            let delay = util::backoff(self.settings.stall_backoff, attempt);
            debug!("{}: reconnecting in {delay:?}", loaded.station);
            if let Some(command) = self.wait(&loaded.station, delay).await {
                return self.preempted(command);
            }

            match self.attempt(&loaded.station, &loaded.url).await {
                Attempt::Ready(generation) => {
                    info!("{}: reconnected", loaded.station);
                    loaded.generation = generation;
                    loaded.since = Instant::now();
                    let url = loaded.url.clone();
                    self.loaded = Some(loaded);
                    self.store.update(|session| session.start(url));
                    self.emit(Event::Recovered);
                    return None;
                }
                Attempt::Failed(failure) => {
                    warn!("{}: reconnection attempt {attempt} failed: {failure}", loaded.station);
                }
                Attempt::Preempted(command) => return self.preempted(command),
            }
        }
    }

    fn fail(&mut self, error: PlaybackError) {
        self.store.update(|session| session.fail(error));
        self.emit(Event::Failed);
    }

    /// Releases the output, but only when it may hold a source.
    fn detach(&mut self) {
        self.loaded = None;
        if self.attached {
            self.output.detach();
            self.attached = false;
        }
    }

    fn emit(&self, event: Event) {
        // Nobody listening is fine.
        let _ = self.notify.send(event);
    }
}
