use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use chat_backend::{
    BackendError, ChatDirectory, ChatId, ChatRemote, FeedTransport, Message, MessageId, RunStatus,
    SenderKind,
};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::runtime::Handle;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::runtime::lock_unpoisoned;
use crate::runtime::notify::{Notification, SessionHost, WriteOp};
use crate::runtime::subscriptions::{FeedRouter, FeedSet, FeedUpdate, SubscriptionManager};
use crate::store::{MessageStore, RunStatusTracker};

/// Sender name stamped on optimistic rows when none is configured.
pub const DEFAULT_USER_IDENTITY: &str = "user";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Sender recorded on the user's optimistic rows.
    pub user_identity: String,
    /// Open feeds before the snapshot fetch and buffer their events until
    /// the snapshot has been applied.
    pub subscribe_during_load: bool,
    /// Status assumed when the status read fails or finds no row.
    pub default_status: RunStatus,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_identity: DEFAULT_USER_IDENTITY.to_string(),
            subscribe_during_load: false,
            default_status: RunStatus::Ready,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_user_identity(mut self, user_identity: impl Into<String>) -> Self {
        self.user_identity = user_identity.into();
        self
    }

    #[must_use]
    pub fn with_subscribe_during_load(mut self, enabled: bool) -> Self {
        self.subscribe_during_load = enabled;
        self
    }

    #[must_use]
    pub fn with_default_status(mut self, status: RunStatus) -> Self {
        self.default_status = status;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No chat selected.
    Idle,
    /// Snapshot and status reads in flight.
    Loading,
    /// Snapshot applied; feeds live unless they failed to open.
    Ready,
}

/// Tags async work with the chat context it was issued for.
///
/// Every chat switch bumps the generation, so a token from before the switch
/// never matches again, even when the user switches back to the same chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestToken {
    pub chat: ChatId,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The sentinel chat was selected; nothing was loaded.
    Idle,
    Ready,
    /// Another chat was selected before the load finished; results were
    /// discarded.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Completed,
    /// The remote call failed and the host was notified.
    Failed,
    /// Nothing was issued: no chat is active or the input was blank.
    Rejected,
    /// The remote call succeeded after its chat was switched away; the local
    /// follow-up was skipped.
    Stale,
}

/// Handle to work a session operation left running.
///
/// Dropping it detaches the work; it still runs to completion.
pub struct Pending<T> {
    inner: PendingInner<T>,
}

enum PendingInner<T> {
    Done(T),
    Task(JoinHandle<T>),
}

impl<T: Send + 'static> Pending<T> {
    fn done(value: T) -> Self {
        Self {
            inner: PendingInner::Done(value),
        }
    }

    fn spawn(runtime: &Handle, work: impl Future<Output = T> + Send + 'static) -> Self {
        Self {
            inner: PendingInner::Task(runtime.spawn(work)),
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        match &self.inner {
            PendingInner::Done(_) => true,
            PendingInner::Task(handle) => handle.is_finished(),
        }
    }

    /// Waits for the outcome; `None` when the task panicked or its runtime
    /// shut down first.
    pub async fn wait(self) -> Option<T> {
        match self.inner {
            PendingInner::Done(value) => Some(value),
            PendingInner::Task(handle) => match handle.await {
                Ok(value) => Some(value),
                Err(error) => {
                    warn!(%error, "session task did not complete");
                    None
                }
            },
        }
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.inner {
            PendingInner::Done(_) => "done",
            PendingInner::Task(_) => "task",
        };
        f.debug_struct("Pending").field("state", &state).finish()
    }
}

/// Point-in-time copy of everything a renderer shows for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub chat: ChatId,
    /// Changes on every chat switch, including reopening the same chat.
    pub token: RequestToken,
    pub phase: SessionPhase,
    pub messages: Vec<Message>,
    pub status: RunStatus,
    pub loading: bool,
    pub clearing: bool,
    pub input_disabled: bool,
    pub run_in_progress: bool,
    pub chat_name: Option<String>,
    pub sample_messages: Vec<String>,
}

/// Whether the snapshot of a generation has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SnapshotMark {
    generation: u64,
    applied: bool,
}

struct SessionState {
    chat: ChatId,
    generation: u64,
    phase: SessionPhase,
    messages: MessageStore,
    status: RunStatusTracker,
    subscriptions: SubscriptionManager,
    buffered: Vec<FeedUpdate>,
    clears_in_flight: usize,
}

impl SessionState {
    fn token(&self) -> RequestToken {
        RequestToken {
            chat: self.chat,
            generation: self.generation,
        }
    }

    fn is_current(&self, token: RequestToken) -> bool {
        self.generation == token.generation
    }

    /// Applies one routed feed update; returns a notification to raise.
    fn apply_update(&mut self, update: FeedUpdate) -> Option<Notification> {
        match update {
            FeedUpdate::Message(message) => {
                self.messages.merge(message);
                None
            }
            FeedUpdate::Status(status) => {
                self.status.set_from_event(status);
                None
            }
            FeedUpdate::Dropped { feed, reason } => {
                warn!(chat = %self.chat, ?feed, %reason, "feed dropped");
                Some(Notification::subscription_failure(
                    self.chat,
                    format!("live updates stopped: {reason}"),
                ))
            }
        }
    }
}

struct SessionShared {
    runtime: Handle,
    remote: Arc<dyn ChatRemote>,
    host: Arc<dyn SessionHost>,
    directory: Option<Arc<dyn ChatDirectory>>,
    config: SessionConfig,
    state: Mutex<SessionState>,
    snapshots: watch::Sender<SnapshotMark>,
    /// Held while a generation opens or settles its feeds, so a later
    /// generation subscribes only after every earlier feed is closed.
    feed_gate: AsyncMutex<()>,
}

impl SessionShared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        lock_unpoisoned(&self.state)
    }

    fn is_current(&self, token: RequestToken) -> bool {
        self.lock().is_current(token)
    }

    /// Switches the context to `chat` and invalidates all earlier tokens.
    ///
    /// Returns the new token and the feeds of the previous context; the
    /// caller drops them after the lock is released, before anything new
    /// is opened.
    fn begin(&self, chat: ChatId) -> (RequestToken, Option<FeedSet>) {
        let mut state = self.lock();
        state.generation += 1;
        state.chat = chat;
        state.phase = if chat.is_unset() {
            SessionPhase::Idle
        } else {
            SessionPhase::Loading
        };
        state.messages.clear();
        state.status.reset(self.config.default_status.clone());
        state.buffered.clear();
        state.clears_in_flight = 0;
        let released = state.subscriptions.take();
        self.snapshots.send_replace(SnapshotMark {
            generation: state.generation,
            applied: chat.is_unset(),
        });
        debug!(%chat, generation = state.generation, "chat context switched");
        (state.token(), released)
    }

    async fn load(self: Arc<Self>, token: RequestToken) -> LoadOutcome {
        let chat = token.chat;
        debug!(%chat, generation = token.generation, "loading chat");

        if self.config.subscribe_during_load && !self.open_feeds(token).await {
            return LoadOutcome::Stale;
        }

        let (messages, status) = tokio::join!(
            self.remote.fetch_messages(chat),
            self.remote.fetch_status(chat)
        );

        let mut notifications = Vec::new();
        {
            let mut state = self.lock();
            if !state.is_current(token) {
                debug!(%chat, generation = token.generation, "discarding stale snapshot");
                return LoadOutcome::Stale;
            }

            match messages {
                Ok(rows) => {
                    // Rows sent while loading are not in the snapshot yet.
                    let carried = state.messages.messages().to_vec();
                    state.messages.replace_all(rows);
                    for message in carried {
                        state.messages.merge(message);
                    }
                }
                Err(error) => {
                    warn!(%chat, %error, "message snapshot failed; showing partial transcript");
                    notifications.push(Notification::fetch_failure(
                        chat,
                        format!("could not load messages: {error}"),
                    ));
                }
            }

            match status {
                Ok(Some(status)) => state.status.set_from_snapshot(status),
                Ok(None) => state
                    .status
                    .set_from_snapshot(self.config.default_status.clone()),
                Err(error) => {
                    warn!(%chat, %error, "status read failed; assuming default status");
                    state
                        .status
                        .set_from_snapshot(self.config.default_status.clone());
                    notifications.push(Notification::fetch_failure(
                        chat,
                        format!("could not read run status: {error}"),
                    ));
                }
            }

            state.phase = SessionPhase::Ready;
            self.snapshots.send_replace(SnapshotMark {
                generation: token.generation,
                applied: true,
            });
            let buffered = std::mem::take(&mut state.buffered);
            if !buffered.is_empty() {
                debug!(%chat, count = buffered.len(), "applying events received while loading");
            }
            for update in buffered {
                notifications.extend(state.apply_update(update));
            }
        }

        for notification in notifications {
            self.host.notify(notification);
        }
        self.host.request_render();

        if !self.config.subscribe_during_load && !self.open_feeds(token).await {
            return LoadOutcome::Stale;
        }

        debug!(%chat, generation = token.generation, "chat ready");
        LoadOutcome::Ready
    }

    /// Opens and installs the feeds for `token`. Returns false when the
    /// context went stale meanwhile; feeds opened so far are closed then.
    ///
    /// A chat switch cancels an open that is still waiting on the transport.
    async fn open_feeds(self: &Arc<Self>, token: RequestToken) -> bool {
        let chat = token.chat;
        let _gate = self.feed_gate.lock().await;
        if !self.is_current(token) {
            return false;
        }
        let transport = self.lock().subscriptions.transport();

        let still_wanted = || self.is_current(token);
        let opening = SubscriptionManager::open(transport, chat, self.router(token), still_wanted);
        let opened = tokio::select! {
            opened = opening => opened,
            () = self.superseded(token) => {
                debug!(%chat, generation = token.generation, "feed opening cancelled by chat switch");
                return false;
            }
        };

        match opened {
            Ok(Some(set)) => {
                let replaced = {
                    let mut state = self.lock();
                    if !state.is_current(token) {
                        debug!(%chat, generation = token.generation, "closing feeds opened for stale chat");
                        drop(state);
                        drop(set);
                        return false;
                    }
                    state.subscriptions.install(set)
                };
                drop(replaced);
                true
            }
            Ok(None) => false,
            Err(error) => {
                if !self.is_current(token) {
                    return false;
                }
                warn!(%chat, %error, "failed to open live feeds");
                self.host.notify(Notification::subscription_failure(
                    chat,
                    format!("could not subscribe to chat updates: {error}"),
                ));
                true
            }
        }
    }

    /// Resolves once a later generation has replaced `token`'s.
    async fn superseded(&self, token: RequestToken) {
        let mut marks = self.snapshots.subscribe();
        let _ = marks
            .wait_for(|mark| mark.generation != token.generation)
            .await;
    }

    fn router(self: &Arc<Self>, token: RequestToken) -> FeedRouter {
        let session = Arc::downgrade(self);
        Arc::new(move |update| {
            if let Some(session) = session.upgrade() {
                session.apply_feed_update(token, update);
            }
        })
    }

    fn apply_feed_update(&self, token: RequestToken, update: FeedUpdate) {
        let notification = {
            let mut state = self.lock();
            if !state.is_current(token) {
                debug!(chat = %token.chat, generation = token.generation, "discarding stale feed event");
                return;
            }
            match state.phase {
                SessionPhase::Idle => return,
                SessionPhase::Loading if self.config.subscribe_during_load => {
                    state.buffered.push(update);
                    return;
                }
                SessionPhase::Loading | SessionPhase::Ready => state.apply_update(update),
            }
        };

        if let Some(notification) = notification {
            self.host.notify(notification);
        }
        self.host.request_render();
    }

    /// Resolves once the snapshot of `token`'s generation is applied or the
    /// generation is superseded.
    async fn snapshot_applied(&self, token: RequestToken) {
        let mut marks = self.snapshots.subscribe();
        let _ = marks
            .wait_for(|mark| mark.generation != token.generation || mark.applied)
            .await;
    }

    async fn finish_send(
        self: Arc<Self>,
        message: Message,
        loading: Option<RequestToken>,
    ) -> WriteOutcome {
        if let Some(token) = loading {
            debug!(chat = %message.chat_id, message = %message.id, "delivery waits for snapshot");
            self.snapshot_applied(token).await;
        }
        match self.remote.send_message(&message).await {
            Ok(()) => {
                debug!(chat = %message.chat_id, message = %message.id, "message delivered");
                WriteOutcome::Completed
            }
            Err(error) => {
                warn!(chat = %message.chat_id, message = %message.id, %error, "send failed; keeping optimistic row");
                self.write_failed(WriteOp::Send, message.chat_id, &error);
                WriteOutcome::Failed
            }
        }
    }

    async fn finish_abort(self: Arc<Self>, chat: ChatId) -> WriteOutcome {
        match self.remote.abort_run(chat).await {
            Ok(()) => {
                debug!(%chat, "abort submitted");
                WriteOutcome::Completed
            }
            Err(error) => {
                warn!(%chat, %error, "abort request failed");
                self.write_failed(WriteOp::Abort, chat, &error);
                WriteOutcome::Failed
            }
        }
    }

    async fn finish_clear(self: Arc<Self>, token: RequestToken) -> WriteOutcome {
        let chat = token.chat;
        self.snapshot_applied(token).await;
        let result = self.remote.clear_messages(chat).await;

        let outcome = {
            let mut state = self.lock();
            let current = state.is_current(token);
            if current {
                state.clears_in_flight = state.clears_in_flight.saturating_sub(1);
            }
            match &result {
                Ok(()) if current => {
                    state.messages.clear();
                    WriteOutcome::Completed
                }
                Ok(()) => WriteOutcome::Stale,
                Err(_) => WriteOutcome::Failed,
            }
        };

        match result {
            Ok(()) if outcome == WriteOutcome::Stale => {
                debug!(%chat, generation = token.generation, "transcript cleared after switching away");
            }
            Ok(()) => {
                debug!(%chat, "transcript cleared");
                self.host.request_render();
            }
            Err(error) => {
                warn!(%chat, %error, "clear request failed; transcript kept");
                self.write_failed(WriteOp::Clear, chat, &error);
                self.host.request_render();
            }
        }
        outcome
    }

    fn write_failed(&self, op: WriteOp, chat: ChatId, error: &BackendError) {
        self.host
            .notify(Notification::write_failure(op, chat, error.to_string()));
    }

    fn reject_without_chat(&self, op: WriteOp) -> WriteOutcome {
        debug!(?op, "no active chat");
        self.host.notify(Notification::write_failure(
            op,
            ChatId::UNSET,
            "no chat is selected",
        ));
        WriteOutcome::Rejected
    }
}

/// Keeps one chat's transcript and run status in sync with the remote side.
///
/// Selecting a chat synchronously invalidates everything issued for the
/// previous one, closes its feeds, and starts a snapshot load. Results that
/// land for a superseded context are discarded. Operations never return
/// errors; failures reach the [`SessionHost`] as notifications.
///
/// Dropping the controller shuts the session down and releases its feeds.
pub struct SessionController {
    shared: Arc<SessionShared>,
}

impl SessionController {
    pub fn new(
        runtime: Handle,
        remote: Arc<dyn ChatRemote>,
        feeds: Arc<dyn FeedTransport>,
        host: Arc<dyn SessionHost>,
        config: SessionConfig,
    ) -> Self {
        Self::build(runtime, remote, feeds, host, config, None)
    }

    /// Like [`SessionController::new`], with chat names and sample messages
    /// looked up in `directory` for [`SessionController::view`].
    pub fn new_with_directory(
        runtime: Handle,
        remote: Arc<dyn ChatRemote>,
        feeds: Arc<dyn FeedTransport>,
        host: Arc<dyn SessionHost>,
        config: SessionConfig,
        directory: Arc<dyn ChatDirectory>,
    ) -> Self {
        Self::build(runtime, remote, feeds, host, config, Some(directory))
    }

    fn build(
        runtime: Handle,
        remote: Arc<dyn ChatRemote>,
        feeds: Arc<dyn FeedTransport>,
        host: Arc<dyn SessionHost>,
        config: SessionConfig,
        directory: Option<Arc<dyn ChatDirectory>>,
    ) -> Self {
        let (snapshots, _) = watch::channel(SnapshotMark {
            generation: 0,
            applied: true,
        });
        let state = SessionState {
            chat: ChatId::UNSET,
            generation: 0,
            phase: SessionPhase::Idle,
            messages: MessageStore::new(),
            status: RunStatusTracker::new(config.default_status.clone()),
            subscriptions: SubscriptionManager::new(feeds),
            buffered: Vec::new(),
            clears_in_flight: 0,
        };
        Self {
            shared: Arc::new(SessionShared {
                runtime,
                remote,
                host,
                directory,
                config,
                state: Mutex::new(state),
                snapshots,
                feed_gate: AsyncMutex::new(()),
            }),
        }
    }

    /// Makes `chat` the active chat and starts loading it.
    ///
    /// Selecting [`ChatId::UNSET`] returns to idle without any remote work.
    /// Selecting the already-active chat reloads it.
    pub fn set_active_chat(&self, chat: ChatId) -> Pending<LoadOutcome> {
        let (token, released) = self.shared.begin(chat);
        drop(released);
        self.shared.host.request_render();

        if chat.is_unset() {
            return Pending::done(LoadOutcome::Idle);
        }
        let shared = Arc::clone(&self.shared);
        Pending::spawn(&self.shared.runtime, shared.load(token))
    }

    /// Adds the user's message to the transcript at once, then delivers it.
    ///
    /// While the chat is loading, delivery waits until the snapshot has been
    /// applied, so the snapshot never already holds the server copy of an
    /// optimistic row. A failed delivery keeps the row and notifies the host.
    pub fn send(&self, content: impl Into<String>) -> Pending<WriteOutcome> {
        let content = content.into();
        if content.trim().is_empty() {
            return Pending::done(WriteOutcome::Rejected);
        }

        let (message, loading) = {
            let mut state = self.shared.lock();
            if state.chat.is_unset() {
                drop(state);
                return Pending::done(self.shared.reject_without_chat(WriteOp::Send));
            }
            let loading = (state.phase == SessionPhase::Loading).then(|| state.token());
            let mut message = Message::new(MessageId::local(), state.chat, SenderKind::User, content)
                .with_sender(self.shared.config.user_identity.clone());
            if let Some(created) = now_timestamp() {
                message = message.with_created(created);
            }
            state.messages.merge(message.clone());
            (message, loading)
        };
        debug!(chat = %message.chat_id, message = %message.id, "optimistic message added");
        self.shared.host.request_render();

        let shared = Arc::clone(&self.shared);
        Pending::spawn(&self.shared.runtime, shared.finish_send(message, loading))
    }

    /// Asks the remote runner to stop the active chat's run.
    ///
    /// The local status is left alone; the status feed reports the change.
    pub fn abort(&self) -> Pending<WriteOutcome> {
        let chat = self.active_chat();
        if chat.is_unset() {
            return Pending::done(self.shared.reject_without_chat(WriteOp::Abort));
        }
        let shared = Arc::clone(&self.shared);
        Pending::spawn(&self.shared.runtime, shared.finish_abort(chat))
    }

    /// Deletes the transcript remotely, then clears it locally.
    ///
    /// The transcript stays visible until the remote delete succeeds and is
    /// kept if it fails. A clear issued while loading waits for the snapshot.
    pub fn clear_transcript(&self) -> Pending<WriteOutcome> {
        let token = {
            let mut state = self.shared.lock();
            if state.chat.is_unset() {
                drop(state);
                return Pending::done(self.shared.reject_without_chat(WriteOp::Clear));
            }
            state.clears_in_flight += 1;
            state.token()
        };
        self.shared.host.request_render();

        let shared = Arc::clone(&self.shared);
        Pending::spawn(&self.shared.runtime, shared.finish_clear(token))
    }

    /// Returns to idle, closes feeds, and invalidates in-flight work.
    pub fn shutdown(&self) {
        let (token, released) = self.shared.begin(ChatId::UNSET);
        let had_feeds = released.is_some();
        drop(released);
        debug!(generation = token.generation, had_feeds, "session shut down");
    }

    #[must_use]
    pub fn active_chat(&self) -> ChatId {
        self.shared.lock().chat
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.shared.lock().phase
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.phase() == SessionPhase::Loading
    }

    #[must_use]
    pub fn is_clearing(&self) -> bool {
        self.shared.lock().clears_in_flight > 0
    }

    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.shared.lock().messages.messages().to_vec()
    }

    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.shared.lock().status.current().clone()
    }

    /// True while feeds for the active chat are installed.
    #[must_use]
    pub fn feeds_open(&self) -> bool {
        self.shared.lock().subscriptions.is_open()
    }

    #[must_use]
    pub fn token(&self) -> RequestToken {
        self.shared.lock().token()
    }

    #[must_use]
    pub fn is_current(&self, token: RequestToken) -> bool {
        self.shared.is_current(token)
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn view(&self) -> SessionView {
        let mut view = {
            let state = self.shared.lock();
            let status = state.status.current().clone();
            SessionView {
                chat: state.chat,
                token: state.token(),
                phase: state.phase,
                messages: state.messages.messages().to_vec(),
                loading: state.phase == SessionPhase::Loading,
                clearing: state.clears_in_flight > 0,
                input_disabled: !status.accepts_input(),
                run_in_progress: status.is_running(),
                status,
                chat_name: None,
                sample_messages: Vec::new(),
            }
        };

        if let (Some(directory), false) = (&self.shared.directory, view.chat.is_unset()) {
            view.chat_name = directory.chat(view.chat).map(|chat| chat.name);
            view.sample_messages = directory.sample_messages(view.chat);
        }
        view
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("SessionController")
            .field("chat", &state.chat)
            .field("generation", &state.generation)
            .field("phase", &state.phase)
            .field("messages", &state.messages.len())
            .field("status", state.status.current())
            .finish_non_exhaustive()
    }
}

fn now_timestamp() -> Option<String> {
    OffsetDateTime::now_utc().format(&Rfc3339).ok()
}
