/*!
Serialized access to the display bus.

DDC/CI displays are slow and stateful: they need a settling pause after every
transfer and they answer requests in the order they were made. The
[`TransactionScheduler`] owns the transport on a worker thread and feeds it one
transaction at a time, in submission order, with the configured delay between
consecutive transfers.

The decision logic lives in [`SchedulerCore`], a plain state machine driven by
explicit timestamps:

```text
Idle -> Dispatching(tx) -> Waiting(delay) -> Idle | Dispatching(next)
```

A completed read request additionally reserves the bus for its reply read, so
no other transaction can be slipped between a request and its answer. If the
reply read is not submitted within the reply timeout the reservation lapses
and the queue moves on.
*/

use crate::checksum::Direction;
use crate::error::{DdcError, ProtocolError, Result};
use crate::frame::{self, Frame, LengthPolicy, ReadResult};
use crate::transport::BusTransport;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Bus timing requirements of the attached display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Pause after a write before the next transfer
    pub write_delay: Duration,
    /// Pause after a read request or reply before the next transfer
    pub read_delay: Duration,
    /// How long a completed read request keeps the bus for its reply
    pub reply_timeout: Duration,
}

impl Timing {
    /// Settling time after a transaction of the given kind
    pub fn settle_after(&self, kind: TransactionKind) -> Duration {
        match kind {
            TransactionKind::Write => self.write_delay,
            TransactionKind::ReadRequest | TransactionKind::ReadReply => self.read_delay,
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            write_delay: Duration::from_millis(crate::protocol::WRITE_DELAY_MS),
            read_delay: Duration::from_millis(crate::protocol::READ_DELAY_MS),
            reply_timeout: Duration::from_millis(crate::protocol::REPLY_TIMEOUT_MS),
        }
    }
}

/// What a transaction does on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// Set a control value
    Write,
    /// Ask for a control value; answered by a [`TransactionKind::ReadReply`]
    ReadRequest,
    /// Collect the answer to the preceding request
    ReadReply,
}

impl TransactionKind {
    /// I2C direction of the transfer (a read request is sent as a write)
    pub fn direction(self) -> Direction {
        match self {
            TransactionKind::Write | TransactionKind::ReadRequest => Direction::Write,
            TransactionKind::ReadReply => Direction::Read,
        }
    }
}

/// Identifier handed out for every submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Work carried by a transaction, with the channel its caller waits on
pub enum Operation {
    /// Write a frame
    Send {
        frame: Frame,
        done: Sender<Result<()>>,
    },
    /// Read and validate the reply for `control`
    ReadReply {
        control: u8,
        policy: LengthPolicy,
        done: Sender<Result<ReadResult>>,
    },
}

/// A queued unit of work, owned by the scheduler until it is finished
pub struct PendingTransaction {
    id: TransactionId,
    kind: TransactionKind,
    operation: Operation,
}

impl PendingTransaction {
    /// Transaction writing `frame`, plus the ticket its caller waits on
    pub fn send(id: TransactionId, kind: TransactionKind, frame: Frame) -> (Self, Ticket<()>) {
        let (done, rx) = bounded(1);
        let tx = Self { id, kind, operation: Operation::Send { frame, done } };
        (tx, Ticket { id, done: rx })
    }

    /// Reply read for `control`, plus the ticket its caller waits on
    pub fn read_reply(
        id: TransactionId,
        control: u8,
        policy: LengthPolicy,
    ) -> (Self, Ticket<ReadResult>) {
        let (done, rx) = bounded(1);
        let tx = Self {
            id,
            kind: TransactionKind::ReadReply,
            operation: Operation::ReadReply { control, policy, done },
        };
        (tx, Ticket { id, done: rx })
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    /// Deliver `err` to the waiting caller
    pub fn fail(self, err: DdcError) {
        match self.operation {
            Operation::Send { done, .. } => {
                let _ = done.send(Err(err));
            }
            Operation::ReadReply { done, .. } => {
                let _ = done.send(Err(err));
            }
        }
    }

    /// Run the transaction on `transport`, deliver the result and report success
    fn execute(self, transport: &mut dyn BusTransport) -> bool {
        match self.operation {
            Operation::Send { frame, done } => {
                debug!("tx {} -> {}", self.id.0, frame.to_hex());
                let result = transport.write(frame.as_bytes()).map_err(DdcError::from);
                if let Err(e) = &result {
                    warn!("tx {} write failed: {}", self.id.0, e);
                }
                let ok = result.is_ok();
                let _ = done.send(result);
                ok
            }
            Operation::ReadReply { control, policy, done } => {
                let result = read_reply(transport, control, policy);
                if let Err(e) = &result {
                    warn!("tx {} reply for control {:#04x} rejected: {}", self.id.0, control, e);
                }
                let ok = result.is_ok();
                let _ = done.send(result);
                ok
            }
        }
    }
}

/// Read ack, length and tail off the bus, then validate the whole reply
fn read_reply(
    transport: &mut dyn BusTransport,
    control: u8,
    policy: LengthPolicy,
) -> Result<ReadResult> {
    let address = transport.address();

    let ack = read_byte(transport)?;
    frame::check_ack(address, ack)?;

    let length_byte = read_byte(transport)?;
    let data_length = frame::decode_length(length_byte, policy)?;

    let tail = transport.read(data_length + 1)?;
    debug!(
        "rx reply: {:02x} {:02x} {}",
        ack,
        length_byte,
        frame::hex_dump(&tail)
    );

    Ok(frame::parse_response_with(
        policy,
        address,
        control,
        ack,
        length_byte,
        &tail,
    )?)
}

fn read_byte(transport: &mut dyn BusTransport) -> Result<u8> {
    let bytes = transport.read(1)?;
    bytes
        .first()
        .copied()
        .ok_or(DdcError::Protocol(ProtocolError::TruncatedResponse { needed: 1, available: 0 }))
}

/// Handle on a submitted transaction
pub struct Ticket<T> {
    id: TransactionId,
    done: Receiver<Result<T>>,
}

impl<T> Ticket<T> {
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Block until the transaction has finished
    pub fn wait(self) -> Result<T> {
        self.done.recv().map_err(|_| DdcError::SchedulerClosed)?
    }

    /// Block until the transaction has finished or `timeout` has passed
    pub fn wait_timeout(self, timeout: Duration) -> Result<T> {
        match self.done.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(DdcError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(DdcError::SchedulerClosed),
        }
    }
}

/// Observable scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Nothing in flight, no delay pending; the next arrival goes straight out
    Idle,
    /// A transaction is on the bus
    Dispatching(TransactionId),
    /// Settling after a transfer
    Waiting { until: Instant },
}

/// What the driver of a [`SchedulerCore`] should do next
pub enum Step {
    /// Put this transaction on the bus, then call [`SchedulerCore::complete`]
    Dispatch(PendingTransaction),
    /// Nothing may start before this instant
    SleepUntil(Instant),
    /// Queue empty; wait for the next arrival
    Idle,
}

struct Reservation {
    owner: TransactionId,
    deadline: Instant,
    follow_up: Option<PendingTransaction>,
}

/// FIFO queue plus settle timer, independent of threads and clocks
pub struct SchedulerCore {
    timing: Timing,
    queue: VecDeque<PendingTransaction>,
    state: SchedulerState,
    reservation: Option<Reservation>,
    /// Read request whose reservation was dropped by a reset
    revoked: Option<TransactionId>,
}

impl SchedulerCore {
    pub fn new(timing: Timing) -> Self {
        Self {
            timing,
            queue: VecDeque::new(),
            state: SchedulerState::Idle,
            reservation: None,
            revoked: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Number of transactions waiting in the queue
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Append a transaction to the back of the queue
    pub fn enqueue(&mut self, tx: PendingTransaction) {
        trace!("tx {} queued ({:?}), {} ahead", tx.id.0, tx.kind, self.queue.len());
        self.queue.push_back(tx);
    }

    /// Hand the reply read for `owner` to the reservation that request holds
    ///
    /// Gives the transaction back if `owner` holds no live reservation, with
    /// [`DdcError::Cancelled`] when a reset dropped it and [`DdcError::Timeout`]
    /// otherwise.
    pub fn attach_follow_up(
        &mut self,
        owner: TransactionId,
        tx: PendingTransaction,
        now: Instant,
    ) -> std::result::Result<(), (PendingTransaction, DdcError)> {
        match &mut self.reservation {
            Some(r) if r.owner == owner && r.follow_up.is_none() && now < r.deadline => {
                trace!("tx {} attached as reply to tx {}", tx.id.0, owner.0);
                r.follow_up = Some(tx);
                Ok(())
            }
            _ if self.revoked == Some(owner) => {
                self.revoked = None;
                Err((tx, DdcError::Cancelled))
            }
            _ => Err((tx, DdcError::Timeout)),
        }
    }

    /// Decide what happens at `now`
    pub fn next_step(&mut self, now: Instant) -> Step {
        if let SchedulerState::Waiting { until } = self.state {
            if now < until {
                return Step::SleepUntil(until);
            }
            trace!("settle delay elapsed");
            self.state = SchedulerState::Idle;
        }

        if let Some(reservation) = &mut self.reservation {
            if let Some(tx) = reservation.follow_up.take() {
                self.reservation = None;
                return self.dispatch(tx);
            }
            if now < reservation.deadline {
                return Step::SleepUntil(reservation.deadline);
            }
            warn!(
                "no reply read for tx {} within {:?}, releasing bus",
                reservation.owner.0, self.timing.reply_timeout
            );
            self.reservation = None;
        }

        match self.queue.pop_front() {
            Some(tx) => self.dispatch(tx),
            None => Step::Idle,
        }
    }

    fn dispatch(&mut self, tx: PendingTransaction) -> Step {
        trace!("dispatching tx {} ({:?})", tx.id.0, tx.kind);
        self.state = SchedulerState::Dispatching(tx.id);
        Step::Dispatch(tx)
    }

    /// Record that the dispatched transaction finished at `now`
    pub fn complete(&mut self, id: TransactionId, kind: TransactionKind, succeeded: bool, now: Instant) {
        debug_assert_eq!(self.state, SchedulerState::Dispatching(id));

        let until = now + self.timing.settle_after(kind);
        self.state = SchedulerState::Waiting { until };

        if kind == TransactionKind::ReadRequest && succeeded {
            self.reservation = Some(Reservation {
                owner: id,
                deadline: now + self.timing.reply_timeout,
                follow_up: None,
            });
        }
    }

    /// Withdraw a transaction that has not been dispatched yet
    pub fn cancel(&mut self, id: TransactionId) -> Option<PendingTransaction> {
        if let Some(pos) = self.queue.iter().position(|tx| tx.id == id) {
            return self.queue.remove(pos);
        }
        match &mut self.reservation {
            Some(r) if r.follow_up.as_ref().map(|tx| tx.id) == Some(id) => r.follow_up.take(),
            _ => None,
        }
    }

    /// Drop every queued transaction and the settle timer; back to idle
    pub fn reset(&mut self) -> Vec<PendingTransaction> {
        let mut dropped: Vec<_> = self.queue.drain(..).collect();
        if let Some(reservation) = self.reservation.take() {
            match reservation.follow_up {
                Some(tx) => dropped.push(tx),
                None => self.revoked = Some(reservation.owner),
            }
        }
        self.state = SchedulerState::Idle;
        dropped
    }
}

enum Command {
    Submit(PendingTransaction),
    FollowUp { owner: TransactionId, tx: PendingTransaction },
    Cancel(TransactionId),
    Reset,
    Shutdown,
}

/// Worker-thread scheduler owning one bus transport
pub struct TransactionScheduler {
    commands: Sender<Command>,
    next_id: AtomicU64,
    timing: Timing,
    worker: Option<JoinHandle<()>>,
}

impl TransactionScheduler {
    /// Start the worker thread; it owns `transport` until the scheduler is dropped
    pub fn new(transport: Box<dyn BusTransport>, timing: Timing) -> Self {
        let (commands, rx) = unbounded();
        let worker = thread::spawn(move || run_worker(transport, rx, timing));

        Self {
            commands,
            next_id: AtomicU64::new(1),
            timing,
            worker: Some(worker),
        }
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    fn next_id(&self) -> TransactionId {
        TransactionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| DdcError::SchedulerClosed)
    }

    /// Queue `frame` for writing
    pub fn submit(&self, kind: TransactionKind, frame: Frame) -> Result<Ticket<()>> {
        let (tx, ticket) = PendingTransaction::send(self.next_id(), kind, frame);
        self.send(Command::Submit(tx))?;
        Ok(ticket)
    }

    /// Queue the reply read for the completed read request `owner`
    ///
    /// The ticket fails with [`DdcError::Timeout`] if `owner`'s reservation
    /// has already lapsed, or [`DdcError::Cancelled`] if a reset dropped it.
    pub fn submit_follow_up(
        &self,
        owner: TransactionId,
        control: u8,
        policy: LengthPolicy,
    ) -> Result<Ticket<ReadResult>> {
        let (tx, ticket) = PendingTransaction::read_reply(self.next_id(), control, policy);
        self.send(Command::FollowUp { owner, tx })?;
        Ok(ticket)
    }

    /// Withdraw `id` if it is still queued; its caller receives [`DdcError::Cancelled`]
    pub fn cancel(&self, id: TransactionId) -> Result<()> {
        self.send(Command::Cancel(id))
    }

    /// Cancel everything queued and return to idle
    pub fn reset(&self) -> Result<()> {
        self.send(Command::Reset)
    }
}

impl Drop for TransactionScheduler {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker(mut transport: Box<dyn BusTransport>, commands: Receiver<Command>, timing: Timing) {
    let mut core = SchedulerCore::new(timing);
    debug!("scheduler worker started for address {}", transport.address());

    'worker: loop {
        // Apply everything already submitted before deciding what goes next
        while let Ok(command) = commands.try_recv() {
            if !handle_command(&mut core, command) {
                break 'worker;
            }
        }

        let command = match core.next_step(Instant::now()) {
            Step::Dispatch(tx) => {
                let (id, kind) = (tx.id, tx.kind);
                let succeeded = tx.execute(transport.as_mut());
                core.complete(id, kind, succeeded, Instant::now());
                continue;
            }
            Step::SleepUntil(deadline) => match commands.recv_deadline(deadline) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            Step::Idle => match commands.recv() {
                Ok(command) => command,
                Err(_) => break,
            },
        };

        if !handle_command(&mut core, command) {
            break;
        }
    }

    for tx in core.reset() {
        tx.fail(DdcError::Cancelled);
    }
    debug!("scheduler worker stopped");
}

/// Apply one command; false means shut down
fn handle_command(core: &mut SchedulerCore, command: Command) -> bool {
    match command {
        Command::Submit(tx) => core.enqueue(tx),
        Command::FollowUp { owner, tx } => {
            if let Err((tx, err)) = core.attach_follow_up(owner, tx, Instant::now()) {
                match err {
                    DdcError::Cancelled => debug!("reply read for tx {} dropped by reset", owner.0),
                    _ => warn!("reply read for tx {} arrived after its reservation lapsed", owner.0),
                }
                tx.fail(err);
            }
        }
        Command::Cancel(id) => match core.cancel(id) {
            Some(tx) => {
                debug!("tx {} cancelled before dispatch", id.0);
                tx.fail(DdcError::Cancelled);
            }
            None => trace!("tx {} not queued, nothing to cancel", id.0),
        },
        Command::Reset => {
            let dropped = core.reset();
            info!("scheduler reset, {} queued transactions cancelled", dropped.len());
            for tx in dropped {
                tx.fail(DdcError::Cancelled);
            }
        }
        Command::Shutdown => return false,
    }
    true
}
