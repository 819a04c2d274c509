use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::trace;

use crate::driver::MeshDriver;
use crate::frame::{Frame, FRAME_SIZE};
use crate::inbox::AppInbox;

/// A frame as it went over the air
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Transmission {
    pub at_ms: u32,
    pub from: u8,
    pub frame: Frame,
}

#[derive(Debug)]
enum SimClock {
    /// advanced explicitly by the test
    Manual(u32),
    /// follows tokio's clock, which tests can pause and advance
    Tokio(Instant),
}

#[derive(Debug)]
struct AirState {
    clock: SimClock,
    links: BTreeSet<(u8, u8)>,
    offline: BTreeSet<u8>,
    rx_queues: BTreeMap<u8, VecDeque<[u8; FRAME_SIZE]>>,
    activity: BTreeMap<u8, Arc<Notify>>,
    transmissions: Vec<Transmission>,
}

impl AirState {
    fn now_ms(&self) -> u32 {
        match &self.clock {
            SimClock::Manual(now) => *now,
            SimClock::Tokio(start) => start.elapsed().as_millis() as u32,
        }
    }

    fn is_linked(&self, a: u8, b: u8) -> bool {
        self.links.contains(&(a.min(b), a.max(b)))
    }
}

/// An in-memory radio medium: frames sent by a radio arrive at every online radio that has a
///  link to the sender. All radios share the medium's millisecond clock.
#[derive(Debug, Clone)]
pub struct SimAir {
    state: Arc<Mutex<AirState>>,
}

impl SimAir {
    pub fn new() -> SimAir {
        Self::with_clock(SimClock::Manual(0))
    }

    pub fn with_tokio_clock() -> SimAir {
        Self::with_clock(SimClock::Tokio(Instant::now()))
    }

    fn with_clock(clock: SimClock) -> SimAir {
        SimAir {
            state: Arc::new(Mutex::new(AirState {
                clock,
                links: Default::default(),
                offline: Default::default(),
                rx_queues: Default::default(),
                activity: Default::default(),
                transmissions: Default::default(),
            }))
        }
    }

    fn state(&self) -> MutexGuard<AirState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A radio for node `id`, attached to this medium
    pub fn radio(&self, id: u8) -> SimRadio {
        self.state().rx_queues.entry(id).or_default();
        SimRadio {
            id,
            air: self.clone(),
            inbox: AppInbox::default(),
            accept_app_frames: true,
            backoffs: Vec::new(),
        }
    }

    pub fn link(&self, a: u8, b: u8) {
        self.state().links.insert((a.min(b), a.max(b)));
    }

    pub fn unlink(&self, a: u8, b: u8) {
        self.state().links.remove(&(a.min(b), a.max(b)));
    }

    /// An offline node neither sends nor receives, and queued frames are lost
    pub fn set_offline(&self, id: u8, offline: bool) {
        let mut state = self.state();
        if offline {
            state.offline.insert(id);
            if let Some(queue) = state.rx_queues.get_mut(&id) {
                queue.clear();
            }
        }
        else {
            state.offline.remove(&id);
        }
    }

    pub fn is_offline(&self, id: u8) -> bool {
        self.state().offline.contains(&id)
    }

    /// Notified whenever a frame arrives for node `id`
    pub fn register_activity(&self, id: u8, activity: Arc<Notify>) {
        self.state().activity.insert(id, activity);
    }

    pub fn now_ms(&self) -> u32 {
        self.state().now_ms()
    }

    /// Only meaningful for the manual clock
    pub fn advance_ms(&self, delta_ms: u32) {
        if let SimClock::Manual(now) = &mut self.state().clock {
            *now = now.wrapping_add(delta_ms);
        }
    }

    pub fn transmissions(&self) -> Vec<Transmission> {
        self.state().transmissions.clone()
    }

    pub fn transmissions_from(&self, id: u8) -> Vec<Transmission> {
        self.state().transmissions.iter()
            .filter(|t| t.from == id)
            .copied()
            .collect()
    }

    pub fn clear_transmissions(&self) {
        self.state().transmissions.clear();
    }

    pub fn has_rx(&self, id: u8) -> bool {
        self.state().rx_queues.get(&id)
            .map(|q| !q.is_empty())
            .unwrap_or(false)
    }

    /// Put a frame directly into node `id`'s receive queue, as if a neighbour had sent it
    pub fn inject(&self, id: u8, frame: &Frame) {
        let notify = {
            let mut state = self.state();
            state.rx_queues.entry(id).or_default().push_back(frame.to_bytes());
            state.activity.get(&id).cloned()
        };
        if let Some(notify) = notify {
            notify.notify_one();
        }
    }

    fn transmit(&self, from: u8, raw: &[u8; FRAME_SIZE]) {
        let mut to_notify = Vec::new();
        {
            let mut state = self.state();
            if state.offline.contains(&from) {
                return;
            }

            if let Ok(frame) = Frame::from_bytes(raw) {
                let at_ms = state.now_ms();
                state.transmissions.push(Transmission { at_ms, from, frame });
            }

            let receivers = state.rx_queues.keys()
                .copied()
                .filter(|&id| id != from && !state.offline.contains(&id) && state.is_linked(from, id))
                .collect::<Vec<_>>();

            for id in receivers {
                trace!("air: {} -> {}", from, id);
                if let Some(queue) = state.rx_queues.get_mut(&id) {
                    queue.push_back(*raw);
                }
                if let Some(notify) = state.activity.get(&id) {
                    to_notify.push(notify.clone());
                }
            }
        }

        for notify in to_notify {
            notify.notify_one();
        }
    }

    fn receive(&self, id: u8) -> Option<[u8; FRAME_SIZE]> {
        self.state().rx_queues.get_mut(&id)
            .and_then(|q| q.pop_front())
    }
}

impl Default for SimAir {
    fn default() -> Self {
        SimAir::new()
    }
}

/// A node's radio on a [SimAir] medium. Frames delivered to the application are kept in an
///  [AppInbox].
#[derive(Debug)]
pub struct SimRadio {
    id: u8,
    air: SimAir,
    pub inbox: AppInbox,
    /// refuse frames for the application when false
    pub accept_app_frames: bool,
    /// every back-off the engine requested
    pub backoffs: Vec<u32>,
}

impl SimRadio {
    pub fn id(&self) -> u8 {
        self.id
    }
}

impl MeshDriver for SimRadio {
    fn radio_init(&mut self) -> bool {
        true
    }

    fn radio_send(&mut self, frame: &[u8; FRAME_SIZE]) -> bool {
        self.air.transmit(self.id, frame);
        true
    }

    fn radio_recv(&mut self, frame: &mut [u8; FRAME_SIZE]) -> bool {
        match self.air.receive(self.id) {
            Some(raw) => {
                *frame = raw;
                true
            }
            None => false,
        }
    }

    fn app_recv(&mut self, frame: &Frame) -> bool {
        if !self.accept_app_frames {
            return false;
        }
        self.inbox.push(frame);
        true
    }

    fn get_timer_ms(&mut self) -> Option<u32> {
        Some(self.air.now_ms())
    }

    fn rx_pending(&self) -> bool {
        self.air.has_rx(self.id)
    }

    fn backoff_us(&mut self, delay_us: u32) {
        self.backoffs.push(delay_us);
    }
}
