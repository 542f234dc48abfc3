use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use log::{debug, error, warn};
use url::Url;

use super::{
    FADE_TIME, PlaybackState, VOLUME_RAMP_TIME,
    audio::AudioGraph,
    clamp_volume,
    error::{AudioError, LoadError},
    loader::{AudioSourceLoader, ProgressCallback},
    net_task::Fetcher,
    timer::Scheduler,
    volume_to_gain,
};

/// Receives state changes of one controller. Calls are made after the
/// controller has released its internal state, so implementations may call
/// back into the controller.
pub trait PlaybackObserver {
    fn state_changed(&self, _state: PlaybackState) {}
    fn load_progress(&self, _percent: u8) {}
    fn load_failed(&self, _error: &LoadError) {}
}

pub struct NullObserver;

impl PlaybackObserver for NullObserver {}

/// Identity of one playback session. Ids only grow, so a deferred action
/// armed for one session can tell that a later one has replaced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

struct Session<Src> {
    id: SessionId,
    source: Src,
}

struct PendingFinalize<H> {
    session: SessionId,
    handle: H,
}

struct ControllerState<Src, H> {
    state: PlaybackState,
    volume: f32,
    progress: Option<u8>,
    last_session: u64,
    session: Option<Session<Src>>,
    pending_start: Option<SessionId>,
    pending_finalize: Option<PendingFinalize<H>>,
    disposed: bool,
}

impl<Src, H> ControllerState<Src, H> {
    fn next_session_id(&mut self) -> SessionId {
        self.last_session += 1;
        SessionId(self.last_session)
    }
}

type StateCell<G, S> =
    RefCell<ControllerState<<G as AudioGraph>::Source, <S as Scheduler>::Handle>>;

/// Playback of a single track: lazily loads the track, fades sessions in and
/// out through the graph's gain stage and tears the graph down on dispose.
pub struct PlaybackController<G, S, F>
where
    G: AudioGraph,
    S: Scheduler,
    F: Fetcher,
{
    shared: Rc<StateCell<G, S>>,
    graph: Rc<G>,
    scheduler: Rc<S>,
    loader: Rc<AudioSourceLoader<F, G>>,
    observer: Rc<dyn PlaybackObserver>,
}

impl<G, S, F> Clone for PlaybackController<G, S, F>
where
    G: AudioGraph,
    S: Scheduler,
    F: Fetcher,
{
    fn clone(&self) -> Self {
        PlaybackController {
            shared: Rc::clone(&self.shared),
            graph: Rc::clone(&self.graph),
            scheduler: Rc::clone(&self.scheduler),
            loader: Rc::clone(&self.loader),
            observer: Rc::clone(&self.observer),
        }
    }
}

impl<G, S, F> PlaybackController<G, S, F>
where
    G: AudioGraph + 'static,
    S: Scheduler + 'static,
    F: Fetcher + 'static,
{
    pub fn new(
        graph: Rc<G>,
        scheduler: Rc<S>,
        fetcher: Rc<F>,
        source: Url,
        initial_volume: f32,
        observer: Rc<dyn PlaybackObserver>,
    ) -> Self {
        let shared = Rc::new(RefCell::new(ControllerState {
            state: PlaybackState::Idle,
            volume: clamp_volume(initial_volume),
            progress: None,
            last_session: 0,
            session: None,
            pending_start: None,
            pending_finalize: None,
            disposed: false,
        }));

        let on_progress: ProgressCallback = {
            let shared = Rc::downgrade(&shared);
            let observer = Rc::clone(&observer);
            Rc::new(move |percent: u8| {
                let Some(shared) = shared.upgrade() else {
                    return;
                };
                shared.borrow_mut().progress = Some(percent);
                observer.load_progress(percent);
            })
        };
        let loader = AudioSourceLoader::new(source, fetcher, Rc::clone(&graph))
            .with_progress(on_progress);

        PlaybackController {
            shared,
            graph,
            scheduler,
            loader: Rc::new(loader),
            observer,
        }
    }

    pub fn source_url(&self) -> &Url {
        self.loader.url()
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.borrow().state
    }

    pub fn volume(&self) -> f32 {
        self.shared.borrow().volume
    }

    /// Download progress of the load in flight. `None` before the first
    /// chunk, when the size is unknown, and outside of `Loading`.
    pub fn progress(&self) -> Option<u8> {
        let st = self.shared.borrow();
        match st.state {
            PlaybackState::Loading => st.progress,
            _ => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loader.is_loaded()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.borrow().disposed
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.shared.borrow().session.as_ref().map(|session| session.id)
    }

    /// Starts a new looping session with a fade-in, loading the track first
    /// if it has never been loaded. Any session already sounding is cut
    /// without a fade, and a pending fade-out is cancelled. Observers hear
    /// about the outcome only when the state actually moved.
    pub async fn start(&self) {
        let request = {
            let mut st = self.shared.borrow_mut();
            if st.disposed {
                warn!("start() on disposed player for {}", self.source_url());
                return;
            }
            let request = st.next_session_id();
            st.pending_start = Some(request);
            request
        };

        if !self.loader.is_loaded() {
            let entered_loading = {
                let mut st = self.shared.borrow_mut();
                if st.state == PlaybackState::Loading {
                    false
                } else {
                    st.state = PlaybackState::Loading;
                    st.progress = None;
                    true
                }
            };
            if entered_loading {
                self.observer.state_changed(PlaybackState::Loading);
            }
        }

        let buffer = match self.loader.load().await {
            Ok(buffer) => buffer,
            Err(err) => {
                self.abandon_start(request, &err);
                return;
            }
        };

        let (previous, new_state) = {
            let mut st = self.shared.borrow_mut();
            if st.disposed || st.pending_start != Some(request) {
                debug!("start request {:?} was superseded", request);
                return;
            }
            st.pending_start = None;
            let previous = st.state;
            (previous, self.begin_session(&mut st, request, &buffer))
        };
        if new_state != previous {
            self.observer.state_changed(new_state);
        }
    }

    /// Fades the live session out and releases it once the fade has elapsed,
    /// unless a newer session has replaced it by then. Stopping while the
    /// track is still loading abandons the pending start.
    pub fn stop(&self) {
        let new_state = {
            let mut st = self.shared.borrow_mut();
            if st.disposed {
                return;
            }
            match st.state {
                PlaybackState::Playing => Some(self.begin_fade_out(&mut st)),
                PlaybackState::Loading => {
                    st.pending_start = None;
                    st.progress = None;
                    st.state = PlaybackState::Idle;
                    Some(PlaybackState::Idle)
                }
                PlaybackState::Idle | PlaybackState::Stopping => {
                    debug!("stop() ignored while {}", st.state.as_str());
                    None
                }
            }
        };
        if let Some(new_state) = new_state {
            self.observer.state_changed(new_state);
        }
    }

    pub async fn toggle(&self) {
        match self.state() {
            PlaybackState::Playing => self.stop(),
            PlaybackState::Loading => debug!("toggle ignored while loading"),
            PlaybackState::Idle | PlaybackState::Stopping => self.start().await,
        }
    }

    /// Stores the new volume. While playing, the gain glides to it; otherwise
    /// it becomes the target of the next fade-in.
    pub fn set_volume(&self, volume: f32) {
        let mut st = self.shared.borrow_mut();
        st.volume = clamp_volume(volume);
        if st.disposed || st.state != PlaybackState::Playing {
            return;
        }
        if let Err(err) = self.ramp_gain(None, volume_to_gain(st.volume), VOLUME_RAMP_TIME) {
            warn!("volume change not applied: {}", err);
        }
    }

    /// Loads the track ahead of the first start.
    pub async fn preload(&self) {
        {
            let mut st = self.shared.borrow_mut();
            if st.disposed || st.state != PlaybackState::Idle || self.loader.is_loaded() {
                return;
            }
            st.state = PlaybackState::Loading;
            st.progress = None;
        }
        self.observer.state_changed(PlaybackState::Loading);

        let result = self.loader.load().await;

        let went_idle = {
            let mut st = self.shared.borrow_mut();
            if st.state == PlaybackState::Loading && st.pending_start.is_none() && !st.disposed {
                st.state = PlaybackState::Idle;
                st.progress = None;
                true
            } else {
                false
            }
        };
        if went_idle {
            if let Err(err) = &result {
                self.observer.load_failed(err);
            }
            self.observer.state_changed(PlaybackState::Idle);
        }
    }

    /// Halts any live session without a fade, clears the pending fade-out
    /// timer and closes the audio context. Safe to call more than once.
    pub fn dispose(&self) {
        {
            let mut st = self.shared.borrow_mut();
            if st.disposed {
                return;
            }
            st.disposed = true;
            if let Some(pending) = st.pending_finalize.take() {
                self.scheduler.cancel(pending.handle);
            }
            if let Some(session) = st.session.take() {
                self.graph.halt(session.source);
            }
            st.pending_start = None;
            st.progress = None;
            st.state = PlaybackState::Idle;
        }

        if let Err(err) = self.graph.close() {
            warn!("failed to close audio context: {}", err);
        }
        debug!("player for {} disposed", self.source_url());
    }

    fn abandon_start(&self, request: SessionId, err: &LoadError) {
        let went_idle = {
            let mut st = self.shared.borrow_mut();
            if st.pending_start != Some(request) {
                return;
            }
            st.pending_start = None;
            st.progress = None;
            if st.state == PlaybackState::Loading {
                st.state = PlaybackState::Idle;
                true
            } else {
                false
            }
        };
        self.observer.load_failed(err);
        if went_idle {
            self.observer.state_changed(PlaybackState::Idle);
        }
    }

    fn begin_session(
        &self,
        st: &mut ControllerState<G::Source, S::Handle>,
        id: SessionId,
        buffer: &G::Buffer,
    ) -> PlaybackState {
        if let Some(pending) = st.pending_finalize.take() {
            debug!("cancelling fade-out of {:?}", pending.session);
            self.scheduler.cancel(pending.handle);
        }
        if let Some(previous) = st.session.take() {
            debug!("cutting {:?} for {:?}", previous.id, id);
            self.graph.halt(previous.source);
        }
        if self.graph.is_suspended() {
            if let Err(err) = self.graph.resume() {
                warn!("failed to resume audio context: {}", err);
            }
        }

        if let Err(err) = self.ramp_gain(Some(0.0), volume_to_gain(st.volume), FADE_TIME) {
            warn!("fade-in not scheduled: {}", err);
        }
        st.progress = None;
        match self.graph.play_looping(buffer) {
            Ok(source) => {
                st.session = Some(Session { id, source });
                st.state = PlaybackState::Playing;
            }
            Err(err) => {
                error!("failed to start playback of {}: {}", self.source_url(), err);
                st.state = PlaybackState::Idle;
            }
        }
        st.state
    }

    fn begin_fade_out(&self, st: &mut ControllerState<G::Source, S::Handle>) -> PlaybackState {
        let Some(session) = st.session.as_ref().map(|session| session.id) else {
            st.state = PlaybackState::Idle;
            return st.state;
        };

        if let Err(err) = self.ramp_gain(None, 0.0, FADE_TIME) {
            warn!("fade-out not scheduled: {}", err);
        }
        if let Some(previous) = st.pending_finalize.take() {
            self.scheduler.cancel(previous.handle);
        }

        match self.scheduler.schedule(FADE_TIME, self.finalize_action(session)) {
            Ok(handle) => {
                st.pending_finalize = Some(PendingFinalize { session, handle });
                st.state = PlaybackState::Stopping;
            }
            Err(err) => {
                error!("{}, stopping without fade", err);
                if let Some(live) = st.session.take() {
                    self.graph.halt(live.source);
                }
                st.state = PlaybackState::Idle;
            }
        }
        st.state
    }

    fn finalize_action(&self, session: SessionId) -> Box<dyn FnOnce()> {
        let shared = Rc::downgrade(&self.shared);
        let graph = Rc::downgrade(&self.graph);
        let observer = Rc::clone(&self.observer);
        Box::new(move || {
            if finalize_stop::<G, S>(&shared, &graph, session) {
                observer.state_changed(PlaybackState::Idle);
            }
        })
    }

    /// Replaces any scheduled automation with a linear ramp from `from` (the
    /// gain's current value when `None`) to `to` over `duration` seconds.
    fn ramp_gain(&self, from: Option<f32>, to: f32, duration: f64) -> Result<(), AudioError> {
        let now = self.graph.current_time();
        let from = from.unwrap_or_else(|| self.graph.gain());
        self.graph.cancel_gain_automation(now)?;
        self.graph.set_gain_at(from, now)?;
        self.graph.ramp_gain_to(to, now + duration)
    }
}

/// Releases `session` at the end of its fade-out. Does nothing if the
/// controller is gone, disposed, or has moved on to another session.
fn finalize_stop<G: AudioGraph, S: Scheduler>(
    shared: &Weak<StateCell<G, S>>,
    graph: &Weak<G>,
    session: SessionId,
) -> bool {
    let (Some(shared), Some(graph)) = (shared.upgrade(), graph.upgrade()) else {
        return false;
    };
    let mut st = shared.borrow_mut();
    let is_current = st.session.as_ref().is_some_and(|live| live.id == session);
    if st.disposed || !is_current || st.state != PlaybackState::Stopping {
        debug!("ignoring stale fade-out of {:?}", session);
        return false;
    }

    if let Some(live) = st.session.take() {
        graph.halt(live.source);
    }
    st.state = PlaybackState::Idle;
    true
}
