//! A mounted board: one actor's reconciler driven by a background task.
//!
//! The task owns the [`Reconciler`] and the change-feed subscription. It
//! serves commands from the [`BoardSession`] handle, resyncs on every feed
//! event, and runs store writes and resyncs as spawned tasks whose results
//! come back over an internal channel. Dropping or unmounting the handle
//! ends the task and releases the subscription.

use std::sync::Arc;

use brodesk_common::{Actor, Ticket, TicketId};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::desk::drag::{DEFAULT_ACTIVATION_DISTANCE, DragTracker, GestureOutcome};
use crate::desk::feed::{ChangeFeed, FeedItem, Subscription};
use crate::desk::identity::IdentityProvider;
use crate::desk::notify::{self, NotificationSink};
use crate::desk::reconciler::{BoardAction, BoardView, Notice, PendingWrite, Reconciler};
use crate::desk::store::TicketStore;
use crate::errors::DeskError;

const COMMAND_BUFFER: usize = 32;

enum Command {
    Board(oneshot::Sender<BoardView>),
    Tickets(oneshot::Sender<Vec<Ticket>>),
    Perform(BoardAction, oneshot::Sender<Result<bool, DeskError>>),
    Notices(oneshot::Sender<Vec<Notice>>),
    Settle(oneshot::Sender<()>),
}

enum Internal {
    /// A write finished. On success, carries warnings from its follow-ups.
    WriteDone {
        write: PendingWrite,
        result: Result<Vec<String>, DeskError>,
    },
    Resynced {
        seq: u64,
        result: Result<Vec<Ticket>, DeskError>,
    },
}

/// Handle to a mounted board.
pub struct BoardSession {
    actor: Actor,
    drag_distance: f64,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

fn not_mounted() -> DeskError {
    DeskError::Store(anyhow::anyhow!("Board session is not mounted"))
}

impl BoardSession {
    /// Resolve the actor, subscribe to the feed, and load the board.
    ///
    /// The subscription is taken before the initial load so no change made
    /// during the load is missed. A failed initial load leaves an empty
    /// board and an error notice.
    pub async fn mount(
        identity: &dyn IdentityProvider,
        store: Arc<dyn TicketStore>,
        feed: &dyn ChangeFeed,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, DeskError> {
        let actor = identity.current_actor().await?;
        let subscription = feed.subscribe();

        let mut reconciler = Reconciler::new(actor.clone());
        let seq = reconciler.begin_resync();
        let initial = store.query_tickets(&reconciler.scope()).await;
        reconciler.finish_resync(seq, initial);
        info!(user = %actor.id, role = %actor.role, tickets = reconciler.tickets().len(), "board mounted");

        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let session = SessionLoop {
            reconciler,
            store,
            sink,
            internal_tx,
            in_flight: 0,
            settle_waiters: Vec::new(),
        };
        let task = tokio::spawn(session.run(command_rx, internal_rx, subscription));

        Ok(Self {
            actor,
            drag_distance: DEFAULT_ACTIVATION_DISTANCE,
            commands,
            task,
        })
    }

    /// Pointer travel before a press on a card becomes a drag.
    pub fn with_drag_distance(mut self, distance: f64) -> Self {
        self.drag_distance = distance;
        self
    }

    /// A gesture tracker for this board; feed its outcome to [`Self::gesture`].
    pub fn drag_tracker(&self) -> DragTracker {
        DragTracker::new(self.drag_distance)
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, DeskError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| not_mounted())?;
        rx.await.map_err(|_| not_mounted())
    }

    pub async fn board(&self) -> Result<BoardView, DeskError> {
        self.request(Command::Board).await
    }

    pub async fn tickets(&self) -> Result<Vec<Ticket>, DeskError> {
        self.request(Command::Tickets).await
    }

    /// Apply `action` optimistically and submit it. Returns `false` when the
    /// action changes nothing and no write was made.
    pub async fn perform(&self, action: BoardAction) -> Result<bool, DeskError> {
        self.request(|tx| Command::Perform(action, tx)).await?
    }

    /// Act on a finished drag gesture: a drop moves the ticket, a click
    /// yields the ticket to open.
    pub async fn gesture(&self, outcome: GestureOutcome) -> Result<Option<TicketId>, DeskError> {
        match outcome {
            GestureOutcome::Click(id) => Ok(Some(id)),
            GestureOutcome::Drop { ticket_id, to, .. } => {
                self.perform(BoardAction::Move { ticket_id, to }).await?;
                Ok(None)
            }
            GestureOutcome::NoOp => Ok(None),
        }
    }

    /// Take the pending notices.
    pub async fn notices(&self) -> Result<Vec<Notice>, DeskError> {
        self.request(Command::Notices).await
    }

    /// Wait until no write or resync is in flight and no feed event is
    /// queued.
    pub async fn settle(&self) -> Result<(), DeskError> {
        self.request(Command::Settle).await
    }

    pub async fn unmount(self) {
        drop(self.commands);
        if let Err(e) = self.task.await {
            warn!(error = %e, "board session task failed");
        }
    }
}

struct SessionLoop {
    reconciler: Reconciler,
    store: Arc<dyn TicketStore>,
    sink: Arc<dyn NotificationSink>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    in_flight: usize,
    settle_waiters: Vec<oneshot::Sender<()>>,
}

impl SessionLoop {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
        mut subscription: Subscription,
    ) {
        let mut feed_open = true;
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                item = subscription.recv(), if feed_open => match item {
                    Some(FeedItem::Event(event)) => {
                        debug!(kind = ?event.kind, ticket = %event.ticket_id, "change received");
                        self.spawn_resync();
                    }
                    Some(FeedItem::Lagged(n)) => {
                        debug!(missed = n, "change feed lagged");
                        self.spawn_resync();
                    }
                    None => {
                        warn!("change feed closed");
                        feed_open = false;
                    }
                },
                Some(msg) = internal.recv() => self.on_internal(msg),
            }
            self.try_settle(&mut subscription);
        }
        subscription.unsubscribe();
        debug!("board session ended");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Board(reply) => {
                let _ = reply.send(self.reconciler.board());
            }
            Command::Tickets(reply) => {
                let _ = reply.send(self.reconciler.tickets().to_vec());
            }
            Command::Perform(action, reply) => {
                let result = self
                    .reconciler
                    .prepare(action, Utc::now())
                    .map(|prepared| match prepared {
                        Some(write) => {
                            self.spawn_write(write);
                            true
                        }
                        None => false,
                    });
                let _ = reply.send(result);
            }
            Command::Notices(reply) => {
                let _ = reply.send(self.reconciler.drain_notices());
            }
            Command::Settle(reply) => self.settle_waiters.push(reply),
        }
    }

    fn on_internal(&mut self, msg: Internal) {
        self.in_flight = self.in_flight.saturating_sub(1);
        match msg {
            Internal::WriteDone { write, result } => match result {
                Ok(warnings) => {
                    self.reconciler.write_succeeded(&write);
                    for warning in warnings {
                        self.reconciler.warn(warning);
                    }
                }
                Err(e) => {
                    warn!(ticket = %write.ticket_id, error = %e, "write failed, resyncing");
                    self.reconciler.write_failed(&write, &e);
                    self.spawn_resync();
                }
            },
            Internal::Resynced { seq, result } => {
                self.reconciler.finish_resync(seq, result);
            }
        }
    }

    fn spawn_resync(&mut self) {
        let seq = self.reconciler.begin_resync();
        let scope = self.reconciler.scope();
        let store = self.store.clone();
        let tx = self.internal_tx.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            let result = store.query_tickets(&scope).await;
            let _ = tx.send(Internal::Resynced { seq, result });
        });
    }

    /// Submit the write, then its follow-ups: the status comment and the
    /// notifications. Follow-up failures are warnings; the write stands.
    fn spawn_write(&mut self, write: PendingWrite) {
        let actor = self.reconciler.actor().clone();
        let store = self.store.clone();
        let sink = self.sink.clone();
        let tx = self.internal_tx.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            let result = match store
                .update_ticket(&actor, write.ticket_id, write.patch.clone())
                .await
            {
                Ok(()) => {
                    let mut warnings = Vec::new();
                    if let Some(comment) = write.status_comment()
                        && let Err(e) = store.post_comment(&actor, write.ticket_id, comment).await
                    {
                        warnings.push(format!("Status changed but the note was not saved: {}", e));
                    }
                    let requests = notify::ticket_change_notifications(&write.before, &write.after);
                    for failure in notify::dispatch(sink.as_ref(), requests).await {
                        warnings.push(format!("Notification not sent: {}", failure));
                    }
                    Ok(warnings)
                }
                Err(e) => Err(e),
            };
            let _ = tx.send(Internal::WriteDone { write, result });
        });
    }

    /// Release settle waiters once quiet. Queued feed events count as work.
    fn try_settle(&mut self, subscription: &mut Subscription) {
        if self.settle_waiters.is_empty() || self.in_flight > 0 {
            return;
        }
        let mut queued = false;
        while subscription.try_recv().is_some() {
            queued = true;
        }
        if queued {
            self.spawn_resync();
            return;
        }
        for waiter in self.settle_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}
