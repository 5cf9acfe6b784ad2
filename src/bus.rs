//! Typed publish/subscribe event bus with a single dispatch thread (§4.6 intro, §5).
//!
//! One dedicated `std::thread` drains an MPSC queue and hands each [`Event`]
//! to every subscriber, in registration order, synchronously. All KB/TMS
//! mutation happens inside those subscriber callbacks, so it only ever runs
//! on the dispatch thread — callers on other threads only ever `publish`,
//! which is synchronous-to-enqueue and asynchronous-to-deliver (§5).
//!
//! Pausing gates delivery, not enqueueing: the MPSC channel itself buffers
//! anything published while paused, so pause can never drop an event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::event::Event;

/// A bus subscriber: a callback invoked once per delivered event, on the
/// dispatch thread. Subscribers must not block — offload long work (LLM
/// calls, batch rewrites) to another thread and publish the result back.
pub type Subscriber = Box<dyn Fn(&Event) + Send + Sync>;

struct PauseGate {
    paused: AtomicBool,
    lock: Mutex<()>,
    resumed: Condvar,
}

impl PauseGate {
    fn new() -> Self {
        Self { paused: AtomicBool::new(false), lock: Mutex::new(()), resumed: Condvar::new() }
    }

    fn wait_while_paused(&self) {
        if !self.paused.load(Ordering::Acquire) {
            return;
        }
        let guard = self.lock.lock().unwrap();
        let _unused = self
            .resumed
            .wait_while(guard, |_| self.paused.load(Ordering::Acquire))
            .unwrap();
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.resumed.notify_all();
    }
}

/// Process-wide event bus (§5 "one process-wide event bus with a single
/// dispatch thread").
pub struct EventBus {
    sender: Sender<Event>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    gate: Arc<PauseGate>,
    dispatcher: Option<JoinHandle<()>>,
}

impl EventBus {
    /// Spin up the dispatch thread and return a bus ready to accept
    /// subscribers and publish events.
    pub fn start() -> Self {
        let (sender, receiver): (Sender<Event>, Receiver<Event>) = mpsc::channel();
        let subscribers: Arc<Mutex<Vec<Subscriber>>> = Arc::new(Mutex::new(Vec::new()));
        let gate = Arc::new(PauseGate::new());

        let dispatch_subscribers = Arc::clone(&subscribers);
        let dispatch_gate = Arc::clone(&gate);
        let dispatcher = std::thread::Builder::new()
            .name("noetic-dispatch".into())
            .spawn(move || dispatch_loop(receiver, dispatch_subscribers, dispatch_gate))
            .expect("failed to spawn dispatch thread");

        Self { sender, subscribers, gate, dispatcher: Some(dispatcher) }
    }

    /// Register a subscriber. Subscribers are invoked in registration order
    /// for every event that arrives after this call.
    pub fn subscribe(&self, subscriber: Subscriber) {
        self.subscribers.lock().unwrap().push(subscriber);
    }

    /// Enqueue an event. Returns immediately; delivery happens on the
    /// dispatch thread, in the order events were published (§5 ordering
    /// guarantee: per-subscriber FIFO, `Asserted` precedes any derived
    /// `Asserted` for the same input).
    pub fn publish(&self, event: Event) {
        tracing::debug!(event_type = event.type_name(), "publish");
        // A full receiver only happens if the dispatch thread has exited;
        // there's no one left to notify, so the event is simply dropped.
        let _ = self.sender.send(event);
    }

    /// Get a cloneable handle subscribers can use to publish follow-up
    /// events from another thread (e.g. after an offloaded LLM call).
    pub fn publisher(&self) -> Sender<Event> {
        self.sender.clone()
    }

    /// Gate delivery: enqueued events accumulate in the channel but are not
    /// handed to subscribers until [`EventBus::resume`] (§5 pause semantics).
    pub fn pause(&self) {
        tracing::info!("dispatch thread paused");
        self.gate.pause();
    }

    pub fn resume(&self) {
        tracing::info!("dispatch thread resumed");
        self.gate.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.gate.paused.load(Ordering::Acquire)
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        // Dropping `sender` unblocks the dispatch thread's `recv`, letting it
        // exit once the channel is drained.
        if let Some(handle) = self.dispatcher.take() {
            self.gate.resume();
            let _ = handle.join();
        }
    }
}

fn dispatch_loop(receiver: Receiver<Event>, subscribers: Arc<Mutex<Vec<Subscriber>>>, gate: Arc<PauseGate>) {
    loop {
        gate.wait_while_paused();
        match receiver.recv_timeout(Duration::from_millis(50)) {
            Ok(event) => {
                gate.wait_while_paused();
                let subs = subscribers.lock().unwrap();
                for sub in subs.iter() {
                    sub(&event);
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
