//! A scripted audio output for driving the engine without a sound card.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures_util::future::BoxFuture;
use tokio::{task::JoinHandle, time};
use tuner::{
    error::{Error, Result},
    output::{self, AudioOutput, EventSender, Generation, MediaEvent},
    player::{Player, Settings},
    station::Station,
    store::PlaybackSession,
    verify::Verify,
};
use url::Url;

/// What a source does once it is loaded. Looked up by host.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Behaviour {
    #[default]
    Ready,

    /// Reports an error right away.
    Fail,

    /// Never reports anything.
    Hang,

    /// Becomes ready after the delay, even when detached in the meantime.
    Delayed(Duration),

    /// Becomes ready, but refuses to play.
    RejectPlay,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    SetSource(Url, Generation),
    Load,
    Play,
    Pause,
    Detach,
    SetVolume(f32),
}

#[derive(Default)]
struct State {
    behaviours: HashMap<String, Behaviour>,
    calls: Vec<Call>,
    source: Option<(Url, Generation)>,
}

/// Test-side view of a [`FakeOutput`].
#[derive(Clone)]
pub struct Probe {
    state: Arc<Mutex<State>>,
    events: EventSender,
}

impl Probe {
    pub fn script(&self, host: &str, behaviour: Behaviour) {
        self.state
            .lock()
            .unwrap()
            .behaviours
            .insert(host.to_owned(), behaviour);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Returns and forgets the calls so far.
    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut self.state.lock().unwrap().calls)
    }

    /// Hosts of every source that was set, in order.
    pub fn sources(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SetSource(url, _) => url.host_str().map(str::to_owned),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    /// Makes the current source report that it stopped receiving data.
    pub fn stall(&self) {
        let source = self.state.lock().unwrap().source.clone();
        if let Some((_, generation)) = source {
            self.events.send(generation, MediaEvent::Stalled);
        }
    }
}

pub struct FakeOutput {
    state: Arc<Mutex<State>>,
    events: EventSender,
}

impl FakeOutput {
    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn behaviour(&self) -> Option<(Generation, Behaviour)> {
        let state = self.state.lock().unwrap();
        let (url, generation) = state.source.as_ref()?;
        let host = url.host_str().unwrap_or_default();
        Some((
            *generation,
            state.behaviours.get(host).copied().unwrap_or_default(),
        ))
    }
}

impl AudioOutput for FakeOutput {
    fn set_source(&mut self, url: &Url, generation: Generation) -> Result<()> {
        self.record(Call::SetSource(url.clone(), generation));
        self.state.lock().unwrap().source = Some((url.clone(), generation));
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        self.record(Call::Load);
        let (generation, behaviour) = self
            .behaviour()
            .ok_or_else(|| Error::failed_precondition("no source"))?;

        match behaviour {
            Behaviour::Ready | Behaviour::RejectPlay => {
                self.events.send(generation, MediaEvent::CanPlay);
            }
            Behaviour::Fail => {
                self.events
                    .send(generation, MediaEvent::Error("connection refused".to_owned()));
            }
            Behaviour::Hang => {}
            Behaviour::Delayed(delay) => {
                let events = self.events.clone();
                tokio::spawn(async move {
                    time::sleep(delay).await;
                    events.send(generation, MediaEvent::CanPlay);
                });
            }
        }

        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        match self.behaviour() {
            Some((_, Behaviour::RejectPlay)) => Err(Error::permission_denied("autoplay blocked")),
            Some(_) => {
                self.record(Call::Play);
                Ok(())
            }
            None => Err(Error::failed_precondition("no source")),
        }
    }

    fn pause(&mut self) {
        self.record(Call::Pause);
    }

    fn detach(&mut self) {
        self.record(Call::Detach);
        self.state.lock().unwrap().source = None;
    }

    fn set_volume(&mut self, volume: f32) {
        self.record(Call::SetVolume(volume));
    }
}

/// Rejects every URL whose host is listed.
pub struct Rejecting(pub Vec<&'static str>);

impl Verify for Rejecting {
    fn verify<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, bool> {
        let accepted = !url
            .host_str()
            .is_some_and(|host| self.0.iter().any(|rejected| *rejected == host));
        Box::pin(async move {
            time::sleep(Duration::from_millis(50)).await;
            accepted
        })
    }
}

pub struct Harness {
    pub player: Player,
    pub engine: JoinHandle<()>,
    pub probe: Probe,
}

pub fn harness() -> Harness {
    harness_with(Settings::default(), None)
}

pub fn harness_with(settings: Settings, verifier: Option<Arc<dyn Verify>>) -> Harness {
    let (events, media) = output::event_channel();
    let state = Arc::new(Mutex::new(State::default()));
    let output = FakeOutput {
        state: Arc::clone(&state),
        events: events.clone(),
    };

    let mut builder = Player::builder(output, media).settings(settings);
    if let Some(verifier) = verifier {
        builder = builder.verifier(verifier);
    }
    let (player, engine) = builder.spawn();

    Harness {
        player,
        engine,
        probe: Probe { state, events },
    }
}

/// Candidates `a.example`, `b.example` and `c.example`, in that order.
pub fn station(id: &str) -> Arc<Station> {
    Arc::new(
        Station::new(id, format!("Radio {id}"), format!("https://b.example/{id}"))
            .with_resolved(format!("https://a.example/{id}"))
            .with_alternates([format!("https://c.example/{id}")]),
    )
}

/// A station whose only stream is on `host`.
pub fn single(id: &str, host: &str) -> Arc<Station> {
    Arc::new(Station::new(id, format!("Radio {id}"), format!("https://{host}/{id}")))
}

/// Waits until the session satisfies `predicate`. Time is paused in tests,
/// so the generous limit costs nothing.
pub async fn wait_until<F>(player: &Player, mut predicate: F) -> PlaybackSession
where
    F: FnMut(&PlaybackSession) -> bool,
{
    let mut session = player.subscribe();
    let result = time::timeout(Duration::from_secs(600), session.wait_for(|s| predicate(s))).await;
    match result {
        Ok(Ok(session)) => session.clone(),
        Ok(Err(_)) => panic!("engine stopped"),
        Err(_) => panic!("timed out in state {:?}", player.session()),
    }
}

/// Lets the engine run for `duration` of paused time.
pub async fn idle(duration: Duration) {
    time::sleep(duration).await;
}
