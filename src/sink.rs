//! Audio output on the default device through rodio.
//!
//! The `rodio::OutputStream` is not `Send`, so it lives on a dedicated
//! thread for as long as the [`RodioOutput`] exists. Everything else only
//! needs the stream handle.
//!
//! Loading a source happens in a background task:
//! 1. Connect and prefetch through [`AudioFile`]
//! 2. Probe and prime the decoder on the blocking pool
//! 3. Append the decoder to a paused sink and report `CanPlay`
//!
//! A monitor task then reports progress and signals `Stalled` when the sink
//! runs dry, which for live radio means the connection stopped delivering.

use std::{
    sync::{mpsc as std_mpsc, Arc, Mutex, PoisonError},
    thread,
    time::Duration,
};

use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    audio_file::AudioFile,
    error::{Error, Result},
    output::{AudioOutput, EventSender, Generation, MediaEvent},
};

/// The sink of the loaded source, tagged with its generation.
type Slot = Arc<Mutex<Option<(Generation, Sink)>>>;

pub struct RodioOutput {
    handle: OutputStreamHandle,

    /// Dropping this ends the thread that keeps the output stream open.
    _keepalive: std_mpsc::Sender<()>,

    client: reqwest::Client,
    events: EventSender,

    source: Option<(Url, Generation)>,
    slot: Slot,

    /// Cancels the loader and monitor of the current source.
    cancel: Option<CancellationToken>,

    volume: f32,
}

impl RodioOutput {
    const MONITOR_INTERVAL: Duration = Duration::from_millis(500);

    /// Opens the default output device.
    ///
    /// # Errors
    ///
    /// Returns an error if no output device is available or the device
    /// cannot be opened.
    pub fn new(client: reqwest::Client, events: EventSender) -> Result<Self> {
        let (handle_tx, handle_rx) = std_mpsc::sync_channel(1);
        let (keepalive_tx, keepalive_rx) = std_mpsc::channel::<()>();

        thread::Builder::new()
            .name("audio-output".to_owned())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    let _ = handle_tx.send(Ok(handle));
                    // Blocks until the sender is dropped.
                    let _ = keepalive_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = handle_tx.send(Err(e));
                }
            })?;

        let handle = handle_rx
            .recv()
            .map_err(|_| Error::internal("audio output thread exited"))??;
        info!("opened default audio output");

        Ok(Self {
            handle,
            _keepalive: keepalive_tx,
            client,
            events,
            source: None,
            slot: Arc::new(Mutex::new(None)),
            cancel: None,
            volume: 1.0,
        })
    }

    fn with_sink<F: FnOnce(&Sink)>(&self, f: F) {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, sink)) = slot.as_ref() {
            f(sink);
        }
    }

    async fn open(
        client: reqwest::Client,
        handle: OutputStreamHandle,
        url: Url,
        volume: f32,
    ) -> Result<(Sink, Option<Duration>)> {
        let file = AudioFile::open(client, url).await?;
        let live = file.is_live();

        // Probing reads from the download and blocks until data arrives.
        let decoder = tokio::task::spawn_blocking(move || rodio::Decoder::new(file)).await??;
        let duration = if live { None } else { decoder.total_duration() };

        let sink = Sink::try_new(&handle)?;
        sink.pause();
        sink.set_volume(volume);
        sink.append(decoder);

        Ok((sink, duration))
    }

    async fn monitor(
        slot: Slot,
        generation: Generation,
        duration: Option<Duration>,
        events: EventSender,
        cancel: CancellationToken,
    ) {
        let mut interval = tokio::time::interval(Self::MONITOR_INTERVAL);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let report = {
                let slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                match slot.as_ref() {
                    Some((current, sink)) if *current == generation => {
                        if sink.is_paused() {
                            None
                        } else if sink.empty() {
                            Some(if duration.is_some() {
                                MediaEvent::Ended
                            } else {
                                MediaEvent::Stalled
                            })
                        } else {
                            Some(MediaEvent::Progress {
                                position: sink.get_pos(),
                                duration,
                            })
                        }
                    }
                    _ => break,
                }
            };

            match report {
                Some(event @ (MediaEvent::Ended | MediaEvent::Stalled)) => {
                    events.send(generation, event);
                    break;
                }
                Some(event) => events.send(generation, event),
                None => {}
            }
        }
    }
}

impl AudioOutput for RodioOutput {
    fn set_source(&mut self, url: &Url, generation: Generation) -> Result<()> {
        self.detach();
        self.source = Some((url.clone(), generation));
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        let (url, generation) = self
            .source
            .clone()
            .ok_or_else(|| Error::failed_precondition("no source set"))?;

        if let Some(previous) = self.cancel.take() {
            previous.cancel();
        }
        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());

        let client = self.client.clone();
        let handle = self.handle.clone();
        let slot = Arc::clone(&self.slot);
        let events = self.events.clone();
        let volume = self.volume;

        tokio::spawn(async move {
            let opened = tokio::select! {
                () = cancel.cancelled() => {
                    trace!("load of {generation} cancelled");
                    return;
                }
                opened = Self::open(client, handle, url.clone(), volume) => opened,
            };

            match opened {
                Ok((sink, duration)) => {
                    {
                        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                        // Checked under the lock: `detach` cancels before it
                        // takes the slot.
                        if cancel.is_cancelled() {
                            sink.stop();
                            return;
                        }
                        *slot = Some((generation, sink));
                    }

                    events.send(generation, MediaEvent::CanPlay);
                    Self::monitor(slot, generation, duration, events, cancel).await;
                }
                Err(e) => {
                    if !cancel.is_cancelled() {
                        events.send(generation, MediaEvent::Error(e.to_string()));
                    }
                }
            }
        });

        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some((generation, sink)) => {
                sink.play();
                self.events.send(*generation, MediaEvent::Playing);
                Ok(())
            }
            None => Err(Error::failed_precondition("source is not loaded")),
        }
    }

    fn pause(&mut self) {
        self.with_sink(Sink::pause);
    }

    fn detach(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }

        let sink = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((generation, sink)) = sink {
            trace!("detaching {generation}");
            sink.stop();
        }

        self.source = None;
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        self.with_sink(|sink| sink.set_volume(volume));
    }
}

impl Drop for RodioOutput {
    fn drop(&mut self) {
        self.detach();
    }
}
