#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
};

use ambience_player::player::{
    AudioError, DecodeError, FetchError, LoadError, PlaybackController, PlaybackObserver,
    PlaybackState, ScheduleError,
    audio::{AudioDecoder, AudioGraph},
    net_task::{FetchBody, Fetcher},
    timer::Scheduler,
};
use futures::channel::oneshot;
use url::Url;

pub type Clock = Rc<Cell<f64>>;

pub fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GainEvent {
    Cancel(f64),
    Set(f32, f64),
    Ramp(f32, f64),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FakeBuffer {
    pub decode_id: u32,
    pub len: usize,
}

/// Audio graph with a hand-driven clock that evaluates gain automation the
/// way an AudioParam does: jumps at set points, straight lines into ramps.
pub struct FakeGraph {
    pub clock: Clock,
    pub suspended: Cell<bool>,
    pub resumes: Cell<u32>,
    pub closes: Cell<u32>,
    pub decodes: Cell<u32>,
    pub fail_decode: Cell<bool>,
    pub fail_play: Cell<bool>,
    pub started: RefCell<Vec<u32>>,
    pub halted: RefCell<Vec<u32>>,
    pub events: RefCell<Vec<GainEvent>>,
    automation: RefCell<Vec<GainEvent>>,
    next_source: Cell<u32>,
}

impl FakeGraph {
    pub fn new(clock: Clock) -> FakeGraph {
        FakeGraph {
            clock,
            suspended: Cell::new(false),
            resumes: Cell::new(0),
            closes: Cell::new(0),
            decodes: Cell::new(0),
            fail_decode: Cell::new(false),
            fail_play: Cell::new(false),
            started: RefCell::new(vec![]),
            halted: RefCell::new(vec![]),
            events: RefCell::new(vec![]),
            automation: RefCell::new(vec![]),
            next_source: Cell::new(0),
        }
    }

    pub fn live_sources(&self) -> Vec<u32> {
        let halted = self.halted.borrow();
        self.started
            .borrow()
            .iter()
            .copied()
            .filter(|id| !halted.contains(id))
            .collect()
    }

    pub fn take_events(&self) -> Vec<GainEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn gain_at(&self, time: f64) -> f32 {
        let mut value = 0.0f32;
        let mut since = f64::NEG_INFINITY;
        for event in self.automation.borrow().iter() {
            match *event {
                GainEvent::Set(v, at) if at <= time => {
                    value = v;
                    since = at;
                }
                GainEvent::Ramp(v, end) if end <= time => {
                    value = v;
                    since = end;
                }
                GainEvent::Ramp(v, end) => {
                    let progress = ((time - since) / (end - since)) as f32;
                    return value + (v - value) * progress;
                }
                _ => break,
            }
        }
        value
    }
}

impl AudioDecoder for FakeGraph {
    type Buffer = FakeBuffer;

    async fn decode(&self, bytes: Vec<u8>) -> Result<FakeBuffer, DecodeError> {
        self.decodes.set(self.decodes.get() + 1);
        if self.fail_decode.get() {
            return Err(DecodeError::new("unsupported audio"));
        }
        Ok(FakeBuffer {
            decode_id: self.decodes.get(),
            len: bytes.len(),
        })
    }
}

impl AudioGraph for FakeGraph {
    type Source = u32;

    fn current_time(&self) -> f64 {
        self.clock.get()
    }

    fn is_suspended(&self) -> bool {
        self.suspended.get()
    }

    fn resume(&self) -> Result<(), AudioError> {
        self.resumes.set(self.resumes.get() + 1);
        self.suspended.set(false);
        Ok(())
    }

    fn play_looping(&self, _buffer: &FakeBuffer) -> Result<u32, AudioError> {
        if self.fail_play.get() {
            return Err(AudioError("no output device".into()));
        }
        let id = self.next_source.get() + 1;
        self.next_source.set(id);
        self.started.borrow_mut().push(id);
        Ok(id)
    }

    fn halt(&self, source: u32) {
        self.halted.borrow_mut().push(source);
    }

    fn gain(&self) -> f32 {
        self.gain_at(self.clock.get())
    }

    fn cancel_gain_automation(&self, from: f64) -> Result<(), AudioError> {
        self.events.borrow_mut().push(GainEvent::Cancel(from));
        self.automation.borrow_mut().retain(|event| match *event {
            GainEvent::Set(_, at) | GainEvent::Ramp(_, at) => at < from,
            GainEvent::Cancel(_) => false,
        });
        Ok(())
    }

    fn set_gain_at(&self, value: f32, at: f64) -> Result<(), AudioError> {
        self.events.borrow_mut().push(GainEvent::Set(value, at));
        self.automation.borrow_mut().push(GainEvent::Set(value, at));
        Ok(())
    }

    fn ramp_gain_to(&self, value: f32, end: f64) -> Result<(), AudioError> {
        self.events.borrow_mut().push(GainEvent::Ramp(value, end));
        self.automation.borrow_mut().push(GainEvent::Ramp(value, end));
        Ok(())
    }

    fn close(&self) -> Result<(), AudioError> {
        self.closes.set(self.closes.get() + 1);
        Ok(())
    }
}

/// Timer queue on the shared clock. Actions run from `advance`, never from
/// inside `schedule`. With `ignore_cancel` set, cancelled actions still fire,
/// like a timer that was already queued when it got cleared.
pub struct FakeScheduler {
    pub clock: Clock,
    pub ignore_cancel: Cell<bool>,
    next_id: Cell<u64>,
    tasks: RefCell<Vec<(u64, f64, Box<dyn FnOnce()>)>>,
}

impl FakeScheduler {
    pub fn new(clock: Clock) -> FakeScheduler {
        FakeScheduler {
            clock,
            ignore_cancel: Cell::new(false),
            next_id: Cell::new(0),
            tasks: RefCell::new(vec![]),
        }
    }

    pub fn pending(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Moves the clock forward by `secs`, running every action that falls
    /// due on the way in time order.
    pub fn advance(&self, secs: f64) {
        let target = self.clock.get() + secs;
        loop {
            let next = {
                let mut tasks = self.tasks.borrow_mut();
                let due = tasks
                    .iter()
                    .enumerate()
                    .filter(|(_, (_, at, _))| *at <= target)
                    .min_by(|a, b| a.1.1.total_cmp(&b.1.1))
                    .map(|(index, _)| index);
                due.map(|index| tasks.remove(index))
            };
            match next {
                Some((_, at, action)) => {
                    self.clock.set(at);
                    action();
                }
                None => break,
            }
        }
        self.clock.set(target);
    }
}

impl Scheduler for FakeScheduler {
    type Handle = u64;

    fn schedule(&self, delay_secs: f64, action: Box<dyn FnOnce()>) -> Result<u64, ScheduleError> {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.tasks
            .borrow_mut()
            .push((id, self.clock.get() + delay_secs, action));
        Ok(id)
    }

    fn cancel(&self, handle: u64) {
        if self.ignore_cancel.get() {
            return;
        }
        self.tasks.borrow_mut().retain(|(id, _, _)| *id != handle);
    }
}

pub struct FakeBody {
    chunks: VecDeque<Vec<u8>>,
    content_length: Option<u64>,
}

impl FetchBody for FakeBody {
    fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, FetchError> {
        Ok(self.chunks.pop_front())
    }
}

/// Serves one asset split into fixed-size chunks. A gate holds every fetch
/// until it is opened.
pub struct FakeFetcher {
    pub size: usize,
    pub chunk_size: usize,
    pub announce_length: bool,
    pub fetches: Cell<u32>,
    pub fail_with: RefCell<Option<FetchError>>,
    gate: RefCell<Option<oneshot::Receiver<()>>>,
}

impl FakeFetcher {
    pub fn new(size: usize, chunk_size: usize) -> FakeFetcher {
        FakeFetcher {
            size,
            chunk_size,
            announce_length: true,
            fetches: Cell::new(0),
            fail_with: RefCell::new(None),
            gate: RefCell::new(None),
        }
    }

    pub fn without_length(mut self) -> FakeFetcher {
        self.announce_length = false;
        self
    }

    pub fn hold(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.borrow_mut() = Some(rx);
        tx
    }
}

impl Fetcher for FakeFetcher {
    type Body = FakeBody;

    async fn fetch(&self, _url: &Url) -> Result<FakeBody, FetchError> {
        self.fetches.set(self.fetches.get() + 1);
        let gate = self.gate.borrow_mut().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if let Some(err) = self.fail_with.borrow().clone() {
            return Err(err);
        }

        let bytes = vec![0u8; self.size];
        Ok(FakeBody {
            chunks: bytes.chunks(self.chunk_size.max(1)).map(|c| c.to_vec()).collect(),
            content_length: self.announce_length.then_some(self.size as u64),
        })
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub states: RefCell<Vec<PlaybackState>>,
    pub progress: RefCell<Vec<u8>>,
    pub errors: RefCell<Vec<LoadError>>,
}

impl PlaybackObserver for RecordingObserver {
    fn state_changed(&self, state: PlaybackState) {
        self.states.borrow_mut().push(state);
    }

    fn load_progress(&self, percent: u8) {
        self.progress.borrow_mut().push(percent);
    }

    fn load_failed(&self, error: &LoadError) {
        self.errors.borrow_mut().push(error.clone());
    }
}

pub type TestController = PlaybackController<FakeGraph, FakeScheduler, FakeFetcher>;

pub struct Harness {
    pub clock: Clock,
    pub graph: Rc<FakeGraph>,
    pub scheduler: Rc<FakeScheduler>,
    pub fetcher: Rc<FakeFetcher>,
    pub observer: Rc<RecordingObserver>,
    pub controller: TestController,
}

pub fn track_url() -> Url {
    Url::parse("https://ambience.example/sounds/sizzling_lasagna.WAV").unwrap()
}

impl Harness {
    pub fn new(fetcher: FakeFetcher, volume: f32) -> Harness {
        let clock: Clock = Rc::new(Cell::new(0.0));
        let graph = Rc::new(FakeGraph::new(clock.clone()));
        let scheduler = Rc::new(FakeScheduler::new(clock.clone()));
        let fetcher = Rc::new(fetcher);
        let observer = Rc::new(RecordingObserver::default());
        let controller = PlaybackController::new(
            graph.clone(),
            scheduler.clone(),
            fetcher.clone(),
            track_url(),
            volume,
            observer.clone(),
        );
        Harness {
            clock,
            graph,
            scheduler,
            fetcher,
            observer,
            controller,
        }
    }

    pub fn with_volume(volume: f32) -> Harness {
        Harness::new(FakeFetcher::new(4096, 1024), volume)
    }
}
