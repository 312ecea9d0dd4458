//! Shared harness: two engines joined by an in-memory datagram link.
//!
//! Each side's host is a [`TestHost`] wrapping shared [`Endpoint`] state so
//! tests can inspect what was sent, delivered and released while the engine
//! owns the handle. Time comes from one mock clock shared by both engines.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::Rng;
use proptest::test_runner::{RngAlgorithm, TestRng};
use quanta::{Clock, Mock};
use sluice_transport::{ConnectionConfig, ConnectionId, Engine, EngineEvent, Host, Input};

// ─── Endpoint ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Endpoint {
    pub input: VecDeque<u8>,
    pub input_eof: bool,
    /// Largest read handed out per `poll_input` call.
    pub input_chunk: usize,
    pub outbox: VecDeque<Vec<u8>>,
    pub delivered: Vec<u8>,
    pub sink_capacity: usize,
    pub sink_used: usize,
    pub end_of_output: u32,
    pub released: u32,
    pub fail_send: bool,
    pub fail_output: bool,
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint {
            input: VecDeque::new(),
            input_eof: false,
            input_chunk: usize::MAX,
            outbox: VecDeque::new(),
            delivered: Vec::new(),
            sink_capacity: usize::MAX,
            sink_used: 0,
            end_of_output: 0,
            released: 0,
            fail_send: false,
            fail_output: false,
        }
    }
}

impl Endpoint {
    /// Endpoint whose input is `data` followed by end-of-input.
    pub fn sending(data: &[u8]) -> Self {
        Endpoint {
            input: data.iter().copied().collect(),
            input_eof: true,
            ..Endpoint::default()
        }
    }

    /// Endpoint with no data to send that closes immediately.
    pub fn silent() -> Self {
        Self::sending(&[])
    }

    /// The application consumed everything in the sink.
    pub fn drain_sink(&mut self) {
        self.sink_used = 0;
    }
}

pub type Shared = Rc<RefCell<Endpoint>>;

pub fn shared(endpoint: Endpoint) -> Shared {
    Rc::new(RefCell::new(endpoint))
}

// ─── Host ───────────────────────────────────────────────────────────────────

pub struct TestHost(pub Shared);

impl Host for TestHost {
    fn send(&mut self, segment: &[u8]) -> io::Result<()> {
        let mut ep = self.0.borrow_mut();
        if ep.fail_send {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link down"));
        }
        ep.outbox.push_back(segment.to_vec());
        Ok(())
    }

    fn poll_input(&mut self, buf: &mut [u8]) -> io::Result<Input> {
        let mut ep = self.0.borrow_mut();
        if ep.input.is_empty() {
            return Ok(if ep.input_eof {
                Input::Eof
            } else {
                Input::Data(0)
            });
        }
        let n = buf.len().min(ep.input.len()).min(ep.input_chunk);
        for (slot, byte) in buf[..n].iter_mut().zip(ep.input.drain(..n)) {
            *slot = byte;
        }
        Ok(Input::Data(n))
    }

    fn buffer_space(&self) -> usize {
        let ep = self.0.borrow();
        ep.sink_capacity.saturating_sub(ep.sink_used)
    }

    fn deliver_output(&mut self, data: &[u8]) -> io::Result<usize> {
        let space = self.buffer_space();
        let mut ep = self.0.borrow_mut();
        if ep.fail_output {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "sink closed"));
        }
        let accepted = data.len().min(space);
        ep.delivered.extend_from_slice(&data[..accepted]);
        ep.sink_used += accepted;
        Ok(accepted)
    }

    fn end_of_output(&mut self) {
        self.0.borrow_mut().end_of_output += 1;
    }

    fn release(self) {
        self.0.borrow_mut().released += 1;
    }
}

// ─── Impairment ─────────────────────────────────────────────────────────────

/// Per-datagram fault probabilities, in percent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Impairment {
    pub drop_pct: u32,
    pub duplicate_pct: u32,
    pub corrupt_pct: u32,
    pub reorder_pct: u32,
}

impl Impairment {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn lossy() -> Self {
        Impairment {
            drop_pct: 10,
            duplicate_pct: 5,
            corrupt_pct: 5,
            reorder_pct: 0,
        }
    }

    pub fn with_reorder(mut self, pct: u32) -> Self {
        self.reorder_pct = pct;
        self
    }
}

/// One direction of the simulated network, seeded for reproducibility.
struct Link {
    impair: Impairment,
    rng: TestRng,
    held: Option<Vec<u8>>,
}

impl Link {
    fn new(impair: Impairment, seed: u8) -> Self {
        Link {
            impair,
            rng: TestRng::from_seed(RngAlgorithm::ChaCha, &[seed; 32]),
            held: None,
        }
    }

    fn roll(&mut self, pct: u32) -> bool {
        pct > 0 && self.rng.next_u32() % 100 < pct
    }

    fn carry(&mut self, mut datagram: Vec<u8>, out: &mut Vec<Vec<u8>>) {
        let impair = self.impair;
        if self.roll(impair.drop_pct) {
            return;
        }
        if self.roll(impair.corrupt_pct) {
            let at = self.rng.next_u32() as usize % datagram.len();
            datagram[at] ^= 0x5A;
        }
        if self.roll(impair.duplicate_pct) {
            out.push(datagram.clone());
        }
        if self.held.is_none() && self.roll(impair.reorder_pct) {
            // Delivered after the next datagram in this direction.
            self.held = Some(datagram);
            return;
        }
        out.push(datagram);
        if let Some(held) = self.held.take() {
            out.push(held);
        }
    }

    fn flush(&mut self, out: &mut Vec<Vec<u8>>) {
        if let Some(held) = self.held.take() {
            out.push(held);
        }
    }
}

// ─── Pair ───────────────────────────────────────────────────────────────────

/// Two engines, one connection each, wired back to back.
pub struct Pair {
    pub a: Engine<TestHost>,
    pub b: Engine<TestHost>,
    pub a_id: ConnectionId,
    pub b_id: ConnectionId,
    pub a_end: Shared,
    pub b_end: Shared,
    pub mock: Arc<Mock>,
    pub tick: Duration,
    pub a_events: Vec<EngineEvent>,
    pub b_events: Vec<EngineEvent>,
    a_to_b: Link,
    b_to_a: Link,
}

impl Pair {
    pub fn new(config: ConnectionConfig, a: Endpoint, b: Endpoint, impair: Impairment) -> Self {
        let (clock, mock) = Clock::mock();
        let tick = config.rto / 2;
        let mut engine_a = Engine::with_clock(config.clone(), clock.clone());
        let mut engine_b = Engine::with_clock(config, clock);
        let a_end = shared(a);
        let b_end = shared(b);
        let a_id = engine_a.create(Ok(TestHost(a_end.clone()))).unwrap();
        let b_id = engine_b.create(Ok(TestHost(b_end.clone()))).unwrap();
        Pair {
            a: engine_a,
            b: engine_b,
            a_id,
            b_id,
            a_end,
            b_end,
            mock,
            tick,
            a_events: Vec::new(),
            b_events: Vec::new(),
            a_to_b: Link::new(impair, 1),
            b_to_a: Link::new(impair, 2),
        }
    }

    pub fn lossless(config: ConnectionConfig, a: Endpoint, b: Endpoint) -> Self {
        Self::new(config, a, b, Impairment::none())
    }

    /// Carry queued datagrams both ways until the link goes quiet.
    pub fn pump(&mut self) {
        for _ in 0..4096 {
            let from_a: Vec<_> = self.a_end.borrow_mut().outbox.drain(..).collect();
            let from_b: Vec<_> = self.b_end.borrow_mut().outbox.drain(..).collect();
            if from_a.is_empty() && from_b.is_empty() {
                break;
            }

            let mut to_b = Vec::new();
            for datagram in from_a {
                self.a_to_b.carry(datagram, &mut to_b);
            }
            self.a_to_b.flush(&mut to_b);
            for datagram in &to_b {
                self.b.on_segment(self.b_id, datagram);
            }

            let mut to_a = Vec::new();
            for datagram in from_b {
                self.b_to_a.carry(datagram, &mut to_a);
            }
            self.b_to_a.flush(&mut to_a);
            for datagram in &to_a {
                self.a.on_segment(self.a_id, datagram);
            }
        }
        self.collect_events();
    }

    /// One round: input and output readiness, delivery, then a timer tick.
    pub fn step(&mut self) {
        self.a.on_input_ready(self.a_id);
        self.b.on_input_ready(self.b_id);
        self.pump();
        self.a.on_output_ready(self.a_id);
        self.b.on_output_ready(self.b_id);
        self.pump();

        self.mock.increment(self.tick);
        self.a.on_tick();
        self.b.on_tick();
        self.pump();
    }

    /// Step until both connections are gone. Returns the steps taken.
    pub fn run(&mut self, max_steps: usize) -> usize {
        for step in 0..max_steps {
            if self.is_finished() {
                return step;
            }
            self.step();
        }
        max_steps
    }

    pub fn is_finished(&self) -> bool {
        self.a.is_empty() && self.b.is_empty()
    }

    fn collect_events(&mut self) {
        self.a_events.extend(self.a.drain_events());
        self.b_events.extend(self.b.drain_events());
    }
}

/// Deterministic test payload of `len` bytes.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Test config with a short RTO and a generous retry budget.
pub fn fast_config() -> ConnectionConfig {
    ConnectionConfig {
        rto: Duration::from_millis(100),
        max_retries: 20,
        ..ConnectionConfig::default()
    }
    .with_derived_linger()
}
