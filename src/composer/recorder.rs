use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use log::{debug, info, warn};
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::message::MediaKind;
use crate::message::model::Message;

use super::media::{MediaSender, Upload};

const TICK: Duration = Duration::from_secs(1);

pub type Mic = Arc<dyn Microphone + Send + Sync>;

/// Audio capture device. Opening fails with [`super::Error::Device`] when
/// permission is denied or no device exists.
#[async_trait]
pub trait Microphone {
    async fn open(&self) -> super::Result<Box<dyn AudioInput + Send>>;
}

/// An open capture stream.
#[async_trait]
pub trait AudioInput {
    /// Next encoded chunk; `None` once the input stopped and every buffered
    /// chunk was flushed.
    async fn next_chunk(&mut self) -> Option<Bytes>;

    fn stop(&mut self);

    /// Gives the device back. Called exactly once per opened input.
    fn release(&mut self);

    fn mime(&self) -> &str;
}

#[derive(Debug)]
enum Signal {
    Finish,
    Cancel,
}

type Collected = (Box<dyn AudioInput + Send>, Option<BytesMut>);

struct Recording {
    signal: oneshot::Sender<Signal>,
    collector: JoinHandle<Collected>,
    ticker: JoinHandle<()>,
    mime: String,
}

/// `Idle -> Recording -> Idle` voice message capture.
pub struct AudioRecorder {
    microphone: Mic,
    media: Arc<MediaSender>,
    session: Mutex<Option<Recording>>,
    elapsed: Arc<watch::Sender<Duration>>,
}

impl AudioRecorder {
    pub fn new(microphone: Mic, media: Arc<MediaSender>) -> Self {
        Self {
            microphone,
            media,
            session: Mutex::new(None),
            elapsed: Arc::new(watch::channel(Duration::ZERO).0),
        }
    }

    pub async fn is_recording(&self) -> bool {
        self.session.lock().await.is_some()
    }

    pub fn elapsed(&self) -> watch::Receiver<Duration> {
        self.elapsed.subscribe()
    }

    /// Opens the microphone, tearing down any previous session first. On a
    /// device error the recorder stays idle.
    pub async fn start(&self) -> super::Result<()> {
        let mut session = self.session.lock().await;
        if let Some(previous) = session.take() {
            debug!("discarding previous recording");
            stop(previous, Signal::Cancel).await;
        }

        let input = self.microphone.open().await.inspect_err(|e| {
            warn!("failed to open microphone: {e}");
        })?;
        let mime = input.mime().to_owned();

        let (signal, rx) = oneshot::channel();
        let collector = tokio::spawn(collect(input, rx));

        self.elapsed.send_replace(Duration::ZERO);
        let elapsed = Arc::clone(&self.elapsed);
        let ticker = tokio::spawn(async move {
            let started = Instant::now();
            let mut interval = time::interval_at(started + TICK, TICK);
            loop {
                interval.tick().await;
                elapsed.send_replace(started.elapsed());
            }
        });

        *session = Some(Recording {
            signal,
            collector,
            ticker,
            mime,
        });
        info!("recording started");
        Ok(())
    }

    /// Discards the recording and releases the microphone.
    pub async fn cancel(&self) {
        if let Some(recording) = self.session.lock().await.take() {
            stop(recording, Signal::Cancel).await;
            debug!("recording cancelled");
        }
    }

    /// Stops capture, waits for the last chunk and sends the voice message.
    pub async fn finish(&self) -> super::Result<Message> {
        let recording = self
            .session
            .lock()
            .await
            .take()
            .ok_or(super::Error::NotRecording)?;
        let mime = recording.mime.clone();

        let content = stop(recording, Signal::Finish)
            .await
            .filter(|buf| !buf.is_empty())
            .ok_or(super::Error::EmptyRecording)?
            .freeze();

        let upload = Upload {
            filename: format!("voice.{}", extension(&mime)),
            content,
            content_type: mime,
        };
        self.media.send(MediaKind::Audio, upload).await
    }
}

async fn stop(recording: Recording, signal: Signal) -> Option<BytesMut> {
    recording.ticker.abort();
    if recording.signal.send(signal).is_err() {
        debug!("recording collector already gone");
    }

    match recording.collector.await {
        Ok((mut input, buffer)) => {
            input.release();
            buffer
        }
        Err(e) => {
            warn!("recording collector failed: {e}");
            None
        }
    }
}

async fn collect(
    mut input: Box<dyn AudioInput + Send>,
    mut signal: oneshot::Receiver<Signal>,
) -> Collected {
    let mut buffer = BytesMut::new();

    loop {
        tokio::select! {
            received = &mut signal => {
                input.stop();
                return match received {
                    Ok(Signal::Finish) => {
                        // flush whatever the input still holds
                        while let Some(chunk) = input.next_chunk().await {
                            buffer.extend_from_slice(&chunk);
                        }
                        (input, Some(buffer))
                    }
                    Ok(Signal::Cancel) | Err(_) => (input, None),
                };
            }

            chunk = input.next_chunk() => match chunk {
                Some(chunk) => buffer.extend_from_slice(&chunk),
                None => {
                    debug!("audio input ended before stop");
                    let keep = matches!(signal.await, Ok(Signal::Finish));
                    return (input, keep.then_some(buffer));
                }
            }
        }
    }
}

/// Replays fixed chunks, one per `interval` while recording and the rest
/// at once on stop. Stands in for a capture device in the demo and tests.
#[derive(Clone)]
pub struct ScriptedMicrophone {
    chunks: Vec<Bytes>,
    mime: String,
    interval: Duration,
    denied: Arc<AtomicBool>,
    opened: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl ScriptedMicrophone {
    pub fn new(chunks: Vec<Bytes>, mime: &str, interval: Duration) -> Self {
        Self {
            chunks,
            mime: mime.to_owned(),
            interval,
            denied: Arc::new(AtomicBool::new(false)),
            opened: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Following opens fail as if permission was refused.
    pub fn deny(&self, denied: bool) {
        self.denied.store(denied, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Microphone for ScriptedMicrophone {
    async fn open(&self) -> super::Result<Box<dyn AudioInput + Send>> {
        if self.denied.load(Ordering::SeqCst) {
            return Err(super::Error::Device("permission denied".into()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(ScriptedInput {
            pending: self.chunks.iter().cloned().collect(),
            mime: self.mime.clone(),
            interval: self.interval,
            stopped: false,
            released: Arc::clone(&self.released),
        }))
    }
}

struct ScriptedInput {
    pending: VecDeque<Bytes>,
    mime: String,
    interval: Duration,
    stopped: bool,
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl AudioInput for ScriptedInput {
    async fn next_chunk(&mut self) -> Option<Bytes> {
        if self.stopped {
            return self.pending.pop_front();
        }
        if self.pending.is_empty() {
            std::future::pending::<()>().await;
        }
        time::sleep(self.interval).await;
        self.pending.pop_front()
    }

    fn stop(&mut self) {
        self.stopped = true;
    }

    fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    fn mime(&self) -> &str {
        &self.mime
    }
}

fn extension(mime: &str) -> &str {
    mime.split('/')
        .nth(1)
        .and_then(|sub| sub.split(';').next())
        .map(str::trim)
        .filter(|ext| !ext.is_empty())
        .unwrap_or("bin")
}
