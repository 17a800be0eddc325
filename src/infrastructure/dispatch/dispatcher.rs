//! Single-task actor coordinating hunters.
//!
//! All dispatcher state lives in one task fed by an unbounded channel, so no
//! locking is needed around the hunter map, the paused and failed actions or
//! the pending batch. Completed work is handed back to the facade in batches
//! through `MainMessage`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::domain::entities::{Action, NetworkPolicy, TargetKey};
use crate::domain::errors::LoadError;
use crate::domain::log::{EventLog, Owner, Verb};
use crate::domain::ports::{MemoryCachePort, RequestHandler};

use super::executor::PriorityExecutor;
use super::hunter::{HuntContext, Hunter};
use super::network::NetworkState;

/// Default delay before a failed hunt is retried.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
/// Default delay used to coalesce completions into one delivery.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(200);

/// Worker pool running hunters.
pub type HuntExecutor = PriorityExecutor<Hunter>;

/// Messages the dispatcher sends to the facade.
#[derive(Debug)]
pub enum MainMessage {
    /// Finished hunters whose actions should be delivered.
    Batch(Vec<Arc<Hunter>>),
    /// Actions released by `resume_tag`.
    Resume(Vec<Arc<Action>>),
}

#[derive(Debug)]
enum Command {
    Submit(Arc<Action>),
    Cancel(Arc<Action>),
    PauseTag(String),
    ResumeTag(String),
    Complete(Arc<Hunter>),
    Retry(Arc<Hunter>),
    Failed(Arc<Hunter>),
    BatchComplete,
    NetworkStateChange(NetworkState),
    AirplaneModeChange(bool),
    Shutdown,
}

/// Tunables for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Initial number of workers.
    pub thread_count: usize,
    /// Delay before retrying a failed hunt.
    pub retry_delay: Duration,
    /// Delay used to coalesce completions.
    pub batch_delay: Duration,
    /// Replay failed actions and size the pool from network changes.
    pub scans_network_changes: bool,
    /// Initial airplane mode.
    pub airplane_mode: bool,
    /// Initial network state.
    pub network_state: NetworkState,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            thread_count: super::network::DEFAULT_THREAD_COUNT,
            retry_delay: DEFAULT_RETRY_DELAY,
            batch_delay: DEFAULT_BATCH_DELAY,
            scans_network_changes: true,
            airplane_mode: false,
            network_state: NetworkState::default(),
        }
    }
}

/// Cloneable sender side of the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: mpsc::UnboundedSender<Command>,
    retry_delay: Duration,
    batch_delay: Duration,
}

impl DispatcherHandle {
    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            debug!("Dispatcher is gone, dropping command");
        }
    }

    fn send_after(&self, delay: Duration, command: Command) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(command);
        });
    }

    /// Schedules an action.
    pub fn dispatch_submit(&self, action: Arc<Action>) {
        self.send(Command::Submit(action));
    }

    /// Withdraws an action.
    pub fn dispatch_cancel(&self, action: Arc<Action>) {
        self.send(Command::Cancel(action));
    }

    /// Parks every action carrying `tag`.
    pub fn dispatch_pause_tag(&self, tag: String) {
        self.send(Command::PauseTag(tag));
    }

    /// Releases actions parked by `dispatch_pause_tag`.
    pub fn dispatch_resume_tag(&self, tag: String) {
        self.send(Command::ResumeTag(tag));
    }

    pub(crate) fn dispatch_complete(&self, hunter: Arc<Hunter>) {
        self.send(Command::Complete(hunter));
    }

    pub(crate) fn dispatch_retry(&self, hunter: Arc<Hunter>) {
        self.send_after(self.retry_delay, Command::Retry(hunter));
    }

    pub(crate) fn dispatch_failed(&self, hunter: Arc<Hunter>) {
        self.send(Command::Failed(hunter));
    }

    /// Reports a connectivity change.
    pub fn dispatch_network_state_change(&self, state: NetworkState) {
        self.send(Command::NetworkStateChange(state));
    }

    /// Reports an airplane mode change.
    pub fn dispatch_airplane_mode_change(&self, enabled: bool) {
        self.send(Command::AirplaneModeChange(enabled));
    }

    /// Stops the dispatcher and its workers.
    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }
}

/// State owned by the dispatcher task.
pub struct Dispatcher {
    rx: mpsc::UnboundedReceiver<Command>,
    handle: DispatcherHandle,
    executor: Arc<HuntExecutor>,
    main_tx: mpsc::UnboundedSender<MainMessage>,
    handlers: Arc<[Arc<dyn RequestHandler>]>,
    cache: Arc<dyn MemoryCachePort>,
    hunters: HashMap<String, Arc<Hunter>>,
    failed_actions: HashMap<TargetKey, Arc<Action>>,
    paused_actions: HashMap<TargetKey, Arc<Action>>,
    paused_tags: HashSet<String>,
    batch: Vec<Arc<Hunter>>,
    batch_scheduled: bool,
    airplane_mode: bool,
    network_state: NetworkState,
    scans_network_changes: bool,
    log: EventLog,
}

impl Dispatcher {
    /// Spawns the dispatcher task and its worker pool.
    pub fn spawn(
        config: DispatcherConfig,
        handlers: Arc<[Arc<dyn RequestHandler>]>,
        ctx: Arc<HuntContext>,
        main_tx: mpsc::UnboundedSender<MainMessage>,
    ) -> (DispatcherHandle, Arc<HuntExecutor>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = DispatcherHandle {
            tx,
            retry_delay: config.retry_delay,
            batch_delay: config.batch_delay,
        };

        let runner_handle = handle.clone();
        let log = ctx.log;
        let cache = ctx.cache.clone();
        let executor = HuntExecutor::new(config.thread_count, move |hunter: Arc<Hunter>| {
            let ctx = ctx.clone();
            let dispatcher = runner_handle.clone();
            Box::pin(hunter.run(ctx, dispatcher)) as BoxFuture<'static, ()>
        });

        let dispatcher = Self {
            rx,
            handle: handle.clone(),
            executor: executor.clone(),
            main_tx,
            handlers,
            cache,
            hunters: HashMap::new(),
            failed_actions: HashMap::new(),
            paused_actions: HashMap::new(),
            paused_tags: HashSet::new(),
            batch: Vec::new(),
            batch_scheduled: false,
            airplane_mode: config.airplane_mode,
            network_state: config.network_state,
            scans_network_changes: config.scans_network_changes,
            log,
        };
        tokio::spawn(dispatcher.run());

        (handle, executor)
    }

    async fn run(mut self) {
        info!("Dispatcher started");
        while let Some(command) = self.rx.recv().await {
            match command {
                Command::Submit(action) => self.perform_submit(action, true),
                Command::Cancel(action) => self.perform_cancel(&action),
                Command::PauseTag(tag) => self.perform_pause_tag(tag),
                Command::ResumeTag(tag) => self.perform_resume_tag(&tag),
                Command::Complete(hunter) => self.perform_complete(hunter),
                Command::Retry(hunter) => self.perform_retry(hunter),
                Command::Failed(hunter) => self.perform_error(hunter),
                Command::BatchComplete => self.perform_batch_complete(),
                Command::NetworkStateChange(state) => self.perform_network_state_change(state),
                Command::AirplaneModeChange(enabled) => self.airplane_mode = enabled,
                Command::Shutdown => break,
            }
        }
        self.executor.shutdown();
        info!("Dispatcher stopped");
    }

    fn perform_submit(&mut self, action: Arc<Action>, dismiss_failed: bool) {
        let ids = action.request().log_id();

        if let Some(tag) = action.tag()
            && self.paused_tags.contains(tag)
        {
            self.log.log_with(
                Owner::Dispatcher,
                Verb::Paused,
                &ids,
                &format!("because tag '{tag}' is paused"),
            );
            self.paused_actions.insert(action.target(), action);
            return;
        }

        if let Some(hunter) = self.hunters.get(action.key()) {
            hunter.attach(action);
            self.log.log_with(
                Owner::Dispatcher,
                Verb::Joined,
                &ids,
                &format!("to {}", hunter.request().log_id()),
            );
            return;
        }

        if self.executor.is_shutdown() {
            self.log
                .log_with(Owner::Dispatcher, Verb::Ignored, &ids, "because shut down");
            return;
        }

        let target = action.target();
        let hunter = Hunter::for_action(action, &self.handlers);
        self.hunters
            .insert(hunter.key().to_string(), hunter.clone());
        if dismiss_failed {
            self.failed_actions.remove(&target);
        }
        self.executor.submit(hunter);
        self.log.log(Owner::Dispatcher, Verb::Enqueued, &ids);
    }

    fn perform_cancel(&mut self, action: &Arc<Action>) {
        let ids = action.request().log_id();

        if let Some(hunter) = self.hunters.get(action.key()).cloned() {
            hunter.detach(action);
            if hunter.cancel() {
                self.hunters.remove(action.key());
                self.log.log(Owner::Dispatcher, Verb::Canceled, &ids);
            }
        }

        if let Some(tag) = action.tag()
            && self.paused_tags.contains(tag)
            && self.paused_actions.remove(&action.target()).is_some()
        {
            self.log.log_with(
                Owner::Dispatcher,
                Verb::Canceled,
                &ids,
                "because paused request got canceled",
            );
        }

        if let Some(removed) = self.failed_actions.remove(&action.target())
            && removed.will_replay()
        {
            self.log
                .log_with(Owner::Dispatcher, Verb::Canceled, &ids, "from replaying");
        }
    }

    fn perform_pause_tag(&mut self, tag: String) {
        if !self.paused_tags.insert(tag.clone()) {
            return;
        }

        let mut emptied = Vec::new();
        for (key, hunter) in &self.hunters {
            for action in hunter.actions() {
                if action.has_tag(&tag) {
                    hunter.detach(&action);
                    self.log.log_with(
                        Owner::Dispatcher,
                        Verb::Paused,
                        &action.request().log_id(),
                        &format!("because tag '{tag}' was paused"),
                    );
                    self.paused_actions.insert(action.target(), action);
                }
            }
            if hunter.cancel() {
                emptied.push(key.clone());
                self.log.log_with(
                    Owner::Dispatcher,
                    Verb::Canceled,
                    &hunter.log_ids(),
                    "all actions paused",
                );
            }
        }
        for key in emptied {
            self.hunters.remove(&key);
        }
    }

    fn perform_resume_tag(&mut self, tag: &str) {
        if !self.paused_tags.remove(tag) {
            return;
        }

        let keys: Vec<TargetKey> = self
            .paused_actions
            .iter()
            .filter(|(_, action)| action.has_tag(tag))
            .map(|(key, _)| *key)
            .collect();
        let mut resumed: Vec<Arc<Action>> = keys
            .iter()
            .filter_map(|key| self.paused_actions.remove(key))
            .collect();
        resumed.sort_by_key(|action| action.id());

        if !resumed.is_empty() {
            let _ = self.main_tx.send(MainMessage::Resume(resumed));
        }
    }

    fn perform_complete(&mut self, hunter: Arc<Hunter>) {
        if hunter.memory_policy().should_write_to_memory_cache()
            && let Some(Ok((image, _))) = hunter.result()
        {
            self.cache.set(hunter.key().to_string(), image);
        }
        self.remove_hunter(&hunter);
        self.batch(hunter.clone());
        self.log
            .log_with(Owner::Dispatcher, Verb::Batched, &hunter.log_ids(), "for completion");
    }

    fn perform_retry(&mut self, hunter: Arc<Hunter>) {
        if hunter.is_cancelled() {
            return;
        }

        if self.executor.is_shutdown() {
            self.perform_error(hunter);
            return;
        }

        let connected = !self.scans_network_changes || self.network_state.connected;
        if hunter.should_retry(self.airplane_mode, connected) {
            self.log
                .log(Owner::Dispatcher, Verb::Retrying, &hunter.log_ids());
            if hunter.error() == Some(LoadError::ContentLength) {
                hunter.add_network_policy(NetworkPolicy::NO_CACHE);
            }
            self.executor.submit(hunter);
            return;
        }

        let will_replay = self.scans_network_changes && hunter.supports_replay();
        self.perform_error(hunter.clone());
        if will_replay {
            self.mark_for_replay(&hunter);
        }
    }

    fn perform_error(&mut self, hunter: Arc<Hunter>) {
        self.remove_hunter(&hunter);
        self.batch(hunter.clone());
        self.log
            .log_with(Owner::Dispatcher, Verb::Batched, &hunter.log_ids(), "for error");
    }

    fn perform_batch_complete(&mut self) {
        self.batch_scheduled = false;
        if self.batch.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.batch);
        let _ = self.main_tx.send(MainMessage::Batch(batch));
    }

    fn perform_network_state_change(&mut self, state: NetworkState) {
        self.network_state = state;
        self.executor.set_thread_count(state.thread_count());
        debug!(?state, threads = state.thread_count(), "Network state changed");
        if state.connected {
            self.flush_failed_actions();
        }
    }

    fn flush_failed_actions(&mut self) {
        if self.failed_actions.is_empty() {
            return;
        }
        let mut actions: Vec<Arc<Action>> = self.failed_actions.drain().map(|(_, a)| a).collect();
        actions.sort_by_key(|action| action.id());
        for action in actions {
            self.log
                .log(Owner::Dispatcher, Verb::Replaying, &action.request().log_id());
            action.set_will_replay(false);
            self.perform_submit(action, false);
        }
    }

    fn mark_for_replay(&mut self, hunter: &Hunter) {
        for action in hunter.actions() {
            if action.is_target_bound() {
                action.set_will_replay(true);
                self.failed_actions.insert(action.target(), action);
            }
        }
    }

    fn remove_hunter(&mut self, hunter: &Arc<Hunter>) {
        if self
            .hunters
            .get(hunter.key())
            .is_some_and(|current| Arc::ptr_eq(current, hunter))
        {
            self.hunters.remove(hunter.key());
        }
    }

    fn batch(&mut self, hunter: Arc<Hunter>) {
        if hunter.is_cancelled() {
            return;
        }
        self.batch.push(hunter);
        if !self.batch_scheduled {
            self.batch_scheduled = true;
            self.handle
                .send_after(self.handle.batch_delay, Command::BatchComplete);
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("hunters", &self.hunters.len())
            .field("paused_tags", &self.paused_tags)
            .field("failed_actions", &self.failed_actions.len())
            .finish_non_exhaustive()
    }
}
