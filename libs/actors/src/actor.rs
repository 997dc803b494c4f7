//! Actors and their mailboxes
//!
//! Each live instance owns one unbounded mailbox drained by one task, so an
//! actor never sees two invocations at once and its state needs no locks.
//! Invocations are handled in the order they were enqueued.

use crate::error::{ActorError, ActorResult};
use crate::metrics::SystemMetrics;
use crate::system::{ActorSystem, SystemInner};
use async_trait::async_trait;
use codec::{Arguments, Payload};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use types::{ActorIdentity, Endpoint};

/// One method call as seen by the target actor
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    selector: String,
    arguments: Arguments,
    caller: Option<Endpoint>,
}

impl Invocation {
    pub fn new(selector: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            selector: selector.into(),
            arguments,
            caller: None,
        }
    }

    pub(crate) fn from_remote(selector: String, arguments: Arguments, caller: Endpoint) -> Self {
        Self {
            selector,
            arguments,
            caller: Some(caller),
        }
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// Decode argument `index` as `T`
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> ActorResult<T> {
        Ok(self.arguments.get(index)?)
    }

    /// Endpoint of the calling node; `None` for local calls
    pub fn caller(&self) -> Option<&Endpoint> {
        self.caller.as_ref()
    }

    /// Standard error for a selector the actor does not implement
    pub fn unknown_selector(&self) -> ActorError {
        ActorError::handler(format!(
            "unknown selector '{}' with argument shapes {:?}",
            self.selector,
            self.arguments.shapes()
        ))
    }
}

/// What an actor is handed alongside each invocation
#[derive(Clone)]
pub struct ActorContext {
    identity: ActorIdentity,
    system: Weak<SystemInner>,
}

impl ActorContext {
    pub(crate) fn new(identity: ActorIdentity, system: Weak<SystemInner>) -> Self {
        Self { identity, system }
    }

    pub fn identity(&self) -> &ActorIdentity {
        &self.identity
    }

    /// The hosting system, unless it has already been dropped
    pub fn system(&self) -> Option<ActorSystem> {
        self.system.upgrade().map(ActorSystem::from_inner)
    }
}

/// Trait for actor behavior
#[async_trait]
pub trait ActorBehavior: Send + 'static {
    /// Handle one invocation and produce its result
    async fn handle(&mut self, invocation: Invocation, ctx: &ActorContext) -> ActorResult<Payload>;

    /// Called when actor starts, before the first invocation
    async fn on_start(&mut self, _ctx: &ActorContext) -> ActorResult<()> {
        Ok(())
    }

    /// Called before actor stops
    async fn on_stop(&mut self, _ctx: &ActorContext) -> ActorResult<()> {
        Ok(())
    }
}

pub(crate) type ReplySender = oneshot::Sender<ActorResult<Payload>>;

pub(crate) struct MailboxMessage {
    invocation: Invocation,
    reply: ReplySender,
}

/// Handle to a live local instance's mailbox
#[derive(Clone)]
pub struct LocalRef {
    identity: ActorIdentity,
    sender: mpsc::UnboundedSender<MailboxMessage>,
}

impl LocalRef {
    pub fn identity(&self) -> &ActorIdentity {
        &self.identity
    }

    /// False once the instance has stopped
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Queue an invocation; the receiver yields its result
    pub(crate) fn enqueue(
        &self,
        invocation: Invocation,
    ) -> ActorResult<oneshot::Receiver<ActorResult<Payload>>> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(MailboxMessage { invocation, reply })
            .map_err(|_| ActorError::stopped(&self.identity))?;
        Ok(rx)
    }

    /// Queue an invocation and wait for its result until `timeout`
    pub(crate) async fn invoke(&self, invocation: Invocation, timeout: Duration) -> ActorResult<Payload> {
        let rx = self.enqueue(invocation)?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ActorError::stopped(&self.identity)),
            Err(_) => Err(ActorError::timeout(&self.identity, timeout.as_millis() as u64)),
        }
    }
}

impl PartialEq for LocalRef {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity && self.sender.same_channel(&other.sender)
    }
}

impl fmt::Debug for LocalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRef")
            .field("identity", &self.identity.to_string())
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// A running instance: its mailbox handle plus the task draining it
pub(crate) struct ActorInstance {
    reference: LocalRef,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ActorInstance {
    /// Start the mailbox task for `behavior`
    pub(crate) fn spawn(
        behavior: Box<dyn ActorBehavior>,
        context: ActorContext,
        metrics: Arc<SystemMetrics>,
    ) -> Self {
        let identity = context.identity.clone();
        let (sender, receiver) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();

        let task = ActorTask {
            identity: identity.clone(),
            behavior,
            receiver,
            stop: stop_rx,
            context,
            metrics,
        };

        Self {
            reference: LocalRef { identity, sender },
            stop: Some(stop_tx),
            task: tokio::spawn(task.run()),
        }
    }

    pub(crate) fn reference(&self) -> &LocalRef {
        &self.reference
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.reference.is_alive() && !self.task.is_finished()
    }

    /// Ask the task to stop after the invocation in progress, running
    /// `on_stop`. Aborts it if that takes longer than `grace`.
    pub(crate) async fn stop(mut self, grace: Duration) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let actor_id = self.reference.identity.clone();
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(())) => debug!(actor_id = %actor_id, "Actor task stopped"),
            Ok(Err(e)) if e.is_panic() => warn!(actor_id = %actor_id, "Actor task panicked"),
            Ok(Err(_)) => debug!(actor_id = %actor_id, "Actor task cancelled"),
            Err(_) => {
                warn!(actor_id = %actor_id, grace_ms = grace.as_millis() as u64, "Actor did not stop in time, aborting");
                self.task.abort();
            }
        }
    }
}

/// Actor task runner
struct ActorTask {
    identity: ActorIdentity,
    behavior: Box<dyn ActorBehavior>,
    receiver: mpsc::UnboundedReceiver<MailboxMessage>,
    stop: oneshot::Receiver<()>,
    context: ActorContext,
    metrics: Arc<SystemMetrics>,
}

impl ActorTask {
    async fn run(mut self) {
        let task_start = Instant::now();
        info!(actor_id = %self.identity, "Starting actor task execution");

        // Lifecycle: Start
        if let Err(e) = self.behavior.on_start(&self.context).await {
            error!(
                actor_id = %self.identity,
                error = %e,
                startup_duration_ms = task_start.elapsed().as_millis() as u64,
                "Actor failed to start during initialization"
            );
            return;
        }

        // Main message loop
        loop {
            tokio::select! {
                biased;

                _ = &mut self.stop => break,
                msg = self.receiver.recv() => match msg {
                    Some(msg) => self.process(msg).await,
                    None => break,
                },
            }
        }

        // Queued invocations are dropped; their callers see ActorStopped
        self.receiver.close();

        // Lifecycle: Stop
        if let Err(e) = self.behavior.on_stop(&self.context).await {
            warn!(actor_id = %self.identity, error = %e, "Actor on_stop failed");
        }
        debug!(
            actor_id = %self.identity,
            lifetime_ms = task_start.elapsed().as_millis() as u64,
            "Actor task finished"
        );
    }

    async fn process(&mut self, msg: MailboxMessage) {
        let start = Instant::now();
        let selector = msg.invocation.selector.clone();

        let result = self.behavior.handle(msg.invocation, &self.context).await;
        let processing_duration = start.elapsed();
        self.metrics
            .record_invocation_handled(processing_duration, result.is_ok());

        if let Err(e) = &result {
            warn!(
                actor_id = %self.identity,
                selector = %selector,
                error = %e,
                error_category = e.category(),
                processing_duration_ns = processing_duration.as_nanos() as u64,
                "Invocation failed"
            );
        }

        // Caller may have given up already
        let _ = msg.reply.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct Recorder {
        seen: Vec<u32>,
        stopped: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ActorBehavior for Recorder {
        async fn handle(&mut self, invocation: Invocation, _ctx: &ActorContext) -> ActorResult<Payload> {
            match invocation.selector() {
                "push" => {
                    self.seen.push(invocation.arg(0)?);
                    Ok(Payload::encode(&self.seen)?)
                }
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Payload::unit())
                }
                _ => Err(invocation.unknown_selector()),
            }
        }

        async fn on_stop(&mut self, _ctx: &ActorContext) -> ActorResult<()> {
            self.stopped.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn spawn_recorder(stopped: Arc<AtomicUsize>) -> ActorInstance {
        let identity = ActorIdentity::from_parts(Uuid::new_v4(), None, None);
        ActorInstance::spawn(
            Box::new(Recorder {
                seen: Vec::new(),
                stopped,
            }),
            ActorContext::new(identity, Weak::new()),
            Arc::new(SystemMetrics::default()),
        )
    }

    fn push(n: u32) -> Invocation {
        Invocation::new("push", Arguments::pack(&(n,)).unwrap())
    }

    #[tokio::test]
    async fn test_invocations_processed_in_order() {
        let instance = spawn_recorder(Arc::new(AtomicUsize::new(0)));
        let reference = instance.reference().clone();

        let receivers: Vec<_> = (1..=5).map(|n| reference.enqueue(push(n)).unwrap()).collect();
        let mut last = Vec::new();
        for rx in receivers {
            last = rx.await.unwrap().unwrap().decode::<Vec<u32>>().unwrap();
        }
        assert_eq!(last, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_unknown_selector_and_bad_argument() {
        let instance = spawn_recorder(Arc::new(AtomicUsize::new(0)));
        let reference = instance.reference().clone();
        let timeout = Duration::from_secs(1);

        let err = reference
            .invoke(Invocation::new("nope", Arguments::new()), timeout)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "handler");

        let bad = Invocation::new("push", Arguments::pack(&("seven",)).unwrap());
        let err = reference.invoke(bad, timeout).await.unwrap_err();
        assert_eq!(err.category(), "serialization");
    }

    #[tokio::test]
    async fn test_stop_runs_on_stop_and_closes_mailbox() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let instance = spawn_recorder(stopped.clone());
        let reference = instance.reference().clone();
        assert!(reference.is_alive());

        instance.stop(Duration::from_secs(1)).await;
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
        assert!(!reference.is_alive());
        assert!(matches!(
            reference.enqueue(push(1)),
            Err(ActorError::ActorStopped { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_times_out() {
        let instance = spawn_recorder(Arc::new(AtomicUsize::new(0)));
        let reference = instance.reference().clone();

        let started = Instant::now();
        let err = reference
            .invoke(Invocation::new("slow", Arguments::new()), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ActorError::Timeout { timeout_ms: 100, .. }));
        assert!(started.elapsed() < Duration::from_millis(150));
    }
}
