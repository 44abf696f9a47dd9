use crate::buffer::BufferPool;
use crate::cancel::CancelToken;
use crate::codebook::Codebook;
use crate::config::ModemConfig;
use crate::encoder::FrequencyEncoder;
use crate::error::{ModemError, Result};
use crate::event::{EventListener, NoopListener};
use crate::playback::PcmPlayer;
use crate::sink::AudioSink;
use crate::synth::SineGenerator;
use crate::DEFAULT_CODEBOOK;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, MutexGuard};
use std::cell::Cell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

const STATE_STOPPED: u8 = 0;
const STATE_PENDING: u8 = 1;
const STATE_STARTED: u8 = 2;

thread_local! {
    // identity of the session whose filling or draining thread this is, so a
    // listener calling stop() on that session never joins the thread it runs on
    static SESSION_THREAD: Cell<usize> = Cell::new(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    /// Threads are being launched or torn down
    Pending,
    Started,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            STATE_PENDING => SessionState::Pending,
            STATE_STARTED => SessionState::Started,
            _ => SessionState::Stopped,
        }
    }
}

/// State reachable from both worker threads
struct Shared<S> {
    pool: Arc<BufferPool>,
    encoder: FrequencyEncoder,
    sink: Mutex<S>,
    listener: Arc<dyn EventListener>,
    cancel: CancelToken,
    state: AtomicU8,
    tone_duration_ms: u32,
    /// First sink failure of the current session
    sink_error: Mutex<Option<ModemError>>,
}

impl<S> Shared<S> {
    fn id(&self) -> usize {
        self as *const Self as *const () as usize
    }

    fn on_own_thread(&self) -> bool {
        SESSION_THREAD.with(|owner| owner.get()) == self.id()
    }

    fn mark_thread(&self) {
        SESSION_THREAD.with(|owner| owner.set(self.id()));
    }

    fn transition(&self, from: u8, to: u8) -> bool {
        self.state
            .compare_exchange(from, to, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Text-to-tone session: one filling thread encodes into the buffer pool while
/// one draining thread plays the pool into the sink
///
/// `play` returns immediately. A session ends on its own once the message has
/// been played (unless repeating), or early through [`TonePlayer::stop`].
/// Either way both threads are joined, the pool is reset and the state goes
/// back to Stopped exactly once.
pub struct TonePlayer<S: AudioSink + 'static> {
    shared: Arc<Shared<S>>,
    config: ModemConfig,
    codebook: Mutex<Option<Codebook>>,
    filling: Mutex<Option<JoinHandle<()>>>,
}

impl<S: AudioSink + 'static> TonePlayer<S> {
    pub fn new(config: ModemConfig, sink: S) -> Result<Self> {
        Self::with_listener(config, sink, Arc::new(NoopListener))
    }

    pub fn with_listener(config: ModemConfig, sink: S, listener: Arc<dyn EventListener>) -> Result<Self> {
        config.validate()?;

        let pool = Arc::new(BufferPool::new(config.buffer_count, config.buffer_size));
        let cancel = CancelToken::new();
        let generator = SineGenerator::from_config(pool.clone(), &config);
        let encoder = FrequencyEncoder::new(
            generator,
            config.frequencies.clone(),
            cancel.clone(),
            listener.clone(),
        );
        let codebook = Codebook::new(DEFAULT_CODEBOOK, config.max_symbols()).ok();

        Ok(Self {
            shared: Arc::new(Shared {
                pool,
                encoder,
                sink: Mutex::new(sink),
                listener,
                cancel,
                state: AtomicU8::new(STATE_STOPPED),
                tone_duration_ms: config.tone_duration_ms,
                sink_error: Mutex::new(None),
            }),
            config,
            codebook: Mutex::new(codebook),
            filling: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    pub fn pool(&self) -> &BufferPool {
        &self.shared.pool
    }

    pub fn codebook(&self) -> Option<Codebook> {
        self.codebook.lock().clone()
    }

    /// Replace the codebook. Only allowed between sessions; a rejected
    /// codebook leaves the current one in place.
    pub fn set_codebook(&self, text: &str) -> Result<()> {
        if self.state() != SessionState::Stopped {
            return Err(ModemError::SessionActive);
        }
        match Codebook::new(text, self.config.max_symbols()) {
            Ok(codebook) => {
                *self.codebook.lock() = Some(codebook);
                Ok(())
            }
            Err(e) => {
                warn!("codebook {:?} rejected: {}", text, e);
                Err(e)
            }
        }
    }

    /// Take the sink error that ended the last session early, if any.
    ///
    /// A failing sink never stops the session from winding down, so callers
    /// that need to know whether the output was written check here after
    /// [`TonePlayer::wait`].
    pub fn take_error(&self) -> Option<ModemError> {
        self.shared.sink_error.lock().take()
    }

    /// Access the sink. Blocks while a session is draining into it.
    pub fn with_sink<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut sink = self.shared.sink.lock();
        f(&mut sink)
    }

    /// Start sending `text`. With `repeat` the message loops until [`TonePlayer::stop`].
    ///
    /// Fails without side effects if a session is still active, no codebook is
    /// set, or the text contains a character outside the codebook.
    pub fn play(&self, text: &str, repeat: bool, mute_interval_ms: u32) -> Result<()> {
        let mut filling = self.filling.lock();
        if self.state() != SessionState::Stopped {
            return Err(ModemError::SessionActive);
        }

        let symbols = match self.codebook.lock().as_ref() {
            Some(codebook) => codebook.convert(text)?,
            None => return Err(ModemError::NoCodebook),
        };

        // previous session already tore itself down, only the handle is left
        reap(&mut filling);

        self.shared.cancel.reset();
        self.shared.sink_error.lock().take();
        if !self.shared.transition(STATE_STOPPED, STATE_PENDING) {
            return Err(ModemError::SessionActive);
        }

        let drain = {
            let shared = self.shared.clone();
            thread::Builder::new()
                .name("tonelink-drain".into())
                .spawn(move || run_draining(&shared))
        };
        let drain = match drain {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.state.store(STATE_STOPPED, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        // the drain handle follows through a channel so it is never lost if
        // the filling thread cannot be spawned
        let (handoff_tx, handoff_rx) = crossbeam_channel::bounded::<JoinHandle<()>>(1);
        let fill = {
            let shared = self.shared.clone();
            thread::Builder::new()
                .name("tonelink-fill".into())
                .spawn(move || run_filling(shared, symbols, repeat, mute_interval_ms, handoff_rx))
        };
        match fill {
            Ok(handle) => {
                // receiver is alive inside the thread we just spawned
                let _ = handoff_tx.send(drain);
                *filling = Some(handle);
            }
            Err(e) => {
                error!("failed to spawn filling thread: {}", e);
                self.shared.pool.close();
                if drain.join().is_err() {
                    error!("draining thread panicked");
                }
                if let Err(reset_err) = self.shared.pool.reset() {
                    error!("buffer pool reset failed: {}", reset_err);
                }
                self.shared.state.store(STATE_STOPPED, Ordering::SeqCst);
                return Err(e.into());
            }
        }

        info!("play {:?} (repeat: {})", text, repeat);
        // a very short message may already have finished and gone back to Stopped
        self.shared.transition(STATE_PENDING, STATE_STARTED);
        Ok(())
    }

    /// Forced stop: cancel synthesis, then wait for both threads to exit.
    ///
    /// Safe to call from any thread and any number of times. Called from a
    /// listener on a session thread it only requests the stop.
    pub fn stop(&self) {
        if self.state() != SessionState::Stopped {
            debug!("force stop start");
            self.shared.cancel.cancel();
            self.shared.transition(STATE_STARTED, STATE_PENDING);
            self.shared.encoder.stop();
        }

        if self.shared.on_own_thread() {
            debug!("stop requested from a session thread, not joining");
            return;
        }
        reap(&mut self.filling.lock());
        debug!("force stop end");
    }

    /// Block until the current session finishes on its own.
    ///
    /// A repeating session only finishes once another thread calls `stop`.
    pub fn wait(&self) {
        if self.shared.on_own_thread() {
            return;
        }
        reap(&mut self.filling.lock());
    }
}

impl<S: AudioSink + 'static> Drop for TonePlayer<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn reap(slot: &mut MutexGuard<'_, Option<JoinHandle<()>>>) {
    if let Some(handle) = slot.take() {
        if handle.join().is_err() {
            error!("filling thread panicked");
        }
    }
}

fn run_draining<S: AudioSink>(shared: &Shared<S>) {
    shared.mark_thread();
    let player = PcmPlayer::new(shared.pool.clone(), shared.listener.clone());
    let result = player.run(&mut *shared.sink.lock());
    if let Err(e) = result {
        *shared.sink_error.lock() = Some(e);
    }
}

fn run_filling<S: AudioSink>(
    shared: Arc<Shared<S>>,
    symbols: Vec<usize>,
    repeat: bool,
    mute_interval_ms: u32,
    handoff: crossbeam_channel::Receiver<JoinHandle<()>>,
) {
    shared.mark_thread();

    loop {
        debug!("encode start");
        shared
            .encoder
            .encode(&symbols, shared.tone_duration_ms, mute_interval_ms);
        debug!("encode end");
        shared.encoder.stop();

        if !repeat || shared.cancel.is_cancelled() || shared.pool.is_closed() {
            break;
        }
    }

    // let the draining thread play out everything queued, then shut it down
    shared.pool.push_end_of_stream();
    match handoff.recv() {
        Ok(drain) => {
            if drain.join().is_err() {
                error!("draining thread panicked");
            }
        }
        Err(_) => error!("draining thread handle lost"),
    }
    if let Err(e) = shared.pool.reset() {
        error!("buffer pool reset failed: {}", e);
    }

    shared.state.store(STATE_STOPPED, Ordering::SeqCst);
    info!("play end");
}
