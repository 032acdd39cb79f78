//! Serialized remote mutation queue.
//!
//! A single worker task drains an unbounded channel, so remote calls run one
//! at a time in submission order. Each call claims its [`RemoteKey`] with a
//! ticket; when a newer call for the same key is queued before an older one
//! starts, the older one is skipped and only the latest intent is sent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, error, info_span};
use uuid::Uuid;

use super::command::{CartCommand, RemoteKey, RemoteOp};
use crate::auth::AuthSession;
use crate::notify::Notifier;
use crate::remote::RemoteCartClient;

/// A queued remote call.
struct Job {
    id: Uuid,
    ticket: u64,
    key: RemoteKey,
    command: CartCommand,
    op: RemoteOp,
    session: AuthSession,
}

enum QueueMessage {
    Run(Box<Job>),
    Flush(oneshot::Sender<()>),
}

/// Latest ticket per key. Entries are released once their call finishes.
#[derive(Default)]
struct InFlight {
    next_ticket: u64,
    latest: HashMap<RemoteKey, u64>,
}

pub(crate) struct RemoteQueue {
    tx: mpsc::UnboundedSender<QueueMessage>,
    in_flight: Arc<Mutex<InFlight>>,
}

impl RemoteQueue {
    /// Start the worker.
    ///
    /// Must be called from within a Tokio runtime. The worker stops once the
    /// queue is dropped and everything already queued has run.
    pub fn spawn(client: RemoteCartClient, notifier: Arc<dyn Notifier>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let in_flight = Arc::new(Mutex::new(InFlight::default()));

        tokio::spawn(run_worker(rx, Arc::clone(&in_flight), client, notifier));

        Self { tx, in_flight }
    }

    /// Queue a remote call. Returns the job id used in logs.
    pub fn enqueue(&self, command: CartCommand, op: RemoteOp, session: AuthSession) -> Uuid {
        let id = Uuid::new_v4();
        let key = op.key();

        // Ticket, claim and send happen under one lock so channel order and
        // ticket order always agree.
        let mut in_flight = self.lock();
        let ticket = in_flight.next_ticket;
        in_flight.next_ticket += 1;
        in_flight.latest.insert(key.clone(), ticket);

        debug!(job_id = %id, command = command.kind(), ?key, "Queued remote cart mutation");

        let job = Job {
            id,
            ticket,
            key,
            command,
            op,
            session,
        };
        if self.tx.send(QueueMessage::Run(Box::new(job))).is_err() {
            error!(job_id = %id, "Remote mutation worker has stopped, dropping call");
        }
        id
    }

    /// Wait until everything queued so far has finished.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(QueueMessage::Flush(done_tx)).is_err() {
            return;
        }
        if done_rx.await.is_err() {
            error!("Remote mutation worker stopped before flushing");
        }
    }

    /// Number of keys with a call queued or running.
    pub fn pending(&self) -> usize {
        self.lock().latest.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InFlight> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<QueueMessage>,
    in_flight: Arc<Mutex<InFlight>>,
    client: RemoteCartClient,
    notifier: Arc<dyn Notifier>,
) {
    while let Some(message) = rx.recv().await {
        let job = match message {
            QueueMessage::Run(job) => job,
            QueueMessage::Flush(done) => {
                if done.send(()).is_err() {
                    debug!("Flush waiter went away");
                }
                continue;
            }
        };

        let superseded = in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .latest
            .get(&job.key)
            != Some(&job.ticket);
        if superseded {
            debug!(job_id = %job.id, key = ?job.key, "Skipping superseded remote cart mutation");
            continue;
        }

        let span = info_span!("remote_cart_mutation", job_id = %job.id, command = job.command.kind());
        let result = job
            .op
            .execute(&client, &job.session)
            .instrument(span)
            .await;

        {
            let mut in_flight = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if in_flight.latest.get(&job.key) == Some(&job.ticket) {
                in_flight.latest.remove(&job.key);
            }
        }

        if result.is_ok() {
            debug!(job_id = %job.id, "Remote cart mutation succeeded");
        }
        job.command.reconcile_remote(&result, notifier.as_ref());
    }

    debug!("Remote mutation queue stopped");
}
