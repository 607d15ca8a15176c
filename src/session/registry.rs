//! Session registry: creation, lookup, submission and teardown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::streams::SubmitEnds;
use super::{worker, SessionContext, SessionId, SessionStatus, SessionStreams};
use crate::command::{validate_name, Command, CommandTable};
use crate::config::ReplOptions;
use crate::dispatch::{Control, Dispatcher};
use crate::error::ReplError;
use crate::host::Host;
use crate::listener::ListenerHandle;
use crate::protocol::spawn_writer;
use crate::script::ScriptEvaluator;
use crate::Result;

type SharedSubmitter = Arc<tokio::sync::Mutex<SubmitEnds>>;

/// How long a released session's output may take to flush.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// A live or closed session.
pub struct Session {
    id: SessionId,
    address: String,
    status: Arc<Mutex<SessionStatus>>,
    created_at: Instant,
    last_activity: Mutex<Instant>,
    control: mpsc::UnboundedSender<Control>,
    submitter: Mutex<Option<SharedSubmitter>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    finished: watch::Receiver<bool>,
    destroyed: AtomicBool,
}

impl Session {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Time since the last submission, or since creation.
    pub fn idle_duration(&self) -> Duration {
        self.last_activity
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Wait until the session has stopped reading input.
    ///
    /// Resolves on `quit`, end of input, or teardown.
    pub async fn closed(&self) {
        let mut finished = self.finished.clone();
        let _ = finished.wait_for(|done| *done).await;
    }

    fn touch(&self) {
        *self.last_activity.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    /// Write `command` to the session's input and wait for the next frame.
    async fn submit(&self, command: &str) -> Result<String> {
        let status = self.status();
        if !status.is_open() {
            return Err(ReplError::InvalidStatus {
                id: self.id.to_string(),
                status,
            });
        }

        let submitter = self
            .submitter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| ReplError::InvalidStatus {
                id: format!("{} (detached)", self.id),
                status,
            })?;
        let mut ends = submitter
            .try_lock()
            .map_err(|_| ReplError::SubmissionPending(self.id.to_string()))?;

        self.touch();
        let closed = |e: std::io::Error| ReplError::ConnectionClosed(format!("{}: {}", self.id, e));

        let mut line = command.trim_end_matches(['\r', '\n']).to_string();
        line.push('\n');
        ends.writer.write_all(line.as_bytes()).await.map_err(closed)?;
        ends.writer.flush().await.map_err(closed)?;

        match ends.reader.next_frame().await {
            Ok(Some(out)) => Ok(out),
            Ok(None) => Err(ReplError::ConnectionClosed(self.id.to_string())),
            Err(e) => Err(closed(e)),
        }
    }

    /// Tear the session down: stop its tasks and release both streams.
    ///
    /// Safe to call any number of times; only the first call does anything.
    /// Returns a description of every task that panicked.
    pub async fn destroy(&self) -> std::result::Result<(), String> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        {
            let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
            if !status.is_terminal() {
                let _ = status.transition_to(self.id.as_str(), SessionStatus::Closed);
            }
        }

        let _ = self.control.send(Control::Shutdown);
        self.submitter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let tasks: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        let mut failures = Vec::new();
        for task in tasks {
            task.abort();
            if let Err(e) = task.await {
                if e.is_panic() {
                    failures.push(e.to_string());
                }
            }
        }

        debug!("Session {} destroyed", self.id);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures.join(", "))
        }
    }

    /// Give the session's tasks up to `limit` each to finish, then abort
    /// whatever is still running.
    async fn drain(&self, limit: Duration) {
        let tasks: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for mut task in tasks {
            if tokio::time::timeout(limit, &mut task).await.is_err() {
                debug!("Session {} task still running, aborting", self.id);
                task.abort();
            }
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

/// Summary of a session for listings.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub status: String,
    pub address: String,
    pub idle_seconds: f64,
}

/// All sessions of one process, keyed by id.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    listeners: Mutex<Vec<Arc<ListenerHandle>>>,
    host: Arc<dyn Host>,
    scripts: Arc<dyn ScriptEvaluator>,
    defaults: CommandTable,
    options: ReplOptions,
    default_id: SessionId,
}

impl SessionRegistry {
    /// Create a registry. `defaults` is copied into every new session.
    pub fn new(
        host: Arc<dyn Host>,
        scripts: Arc<dyn ScriptEvaluator>,
        defaults: CommandTable,
        options: ReplOptions,
        default_id: SessionId,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            host,
            scripts,
            defaults,
            options,
            default_id,
        }
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    pub fn default_id(&self) -> &SessionId {
        &self.default_id
    }

    /// Return the open session for `id`, or start a new one on `streams`.
    ///
    /// Without an id, the streams' address is used, then the registry's
    /// default id. When an open session already owns the id the given
    /// streams are dropped unused. A closed session under the same id is
    /// replaced and destroyed.
    pub async fn use_session(
        &self,
        id: Option<&str>,
        streams: SessionStreams,
    ) -> Result<Arc<Session>> {
        let id = match id {
            Some(id) => id.parse()?,
            None => streams
                .address()
                .map(SessionId::new)
                .unwrap_or_else(|| self.default_id.clone()),
        };

        let (session, replaced) = {
            let mut sessions = self
                .sessions
                .write()
                .map_err(|_| ReplError::LockPoisoned)?;

            if let Some(existing) = sessions.get(&id) {
                if existing.status().is_open() {
                    debug!("Reusing open session {}", id);
                    return Ok(Arc::clone(existing));
                }
            }

            let session = self.start(id.clone(), streams)?;
            let replaced = sessions.insert(id, Arc::clone(&session));
            (session, replaced)
        };

        if let Some(old) = replaced {
            if let Err(e) = old.destroy().await {
                warn!("Replaced session {} failed to tear down: {}", old.id, e);
            }
        }

        info!("Session {} open ({})", session.id, session.address);
        Ok(session)
    }

    fn start(&self, id: SessionId, streams: SessionStreams) -> Result<Arc<Session>> {
        let SessionStreams {
            input,
            output,
            address,
            submitter,
        } = streams;
        let address = address.unwrap_or_else(|| id.to_string());

        let mut status = SessionStatus::Init;
        let (sink, writer) = spawn_writer(output);
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let context = SessionContext::new(id.clone(), address.clone(), &self.options);
        let dispatcher = Dispatcher::new(
            context,
            self.options.clone(),
            self.defaults.clone(),
            Arc::clone(&self.host),
            Arc::clone(&self.scripts),
            sink,
            control_tx.clone(),
        );

        status.transition_to(id.as_str(), SessionStatus::Open)?;
        let status = Arc::new(Mutex::new(status));
        let events = self.host.subscribe();
        let (finished_tx, finished) = watch::channel(false);
        let runner = tokio::spawn(worker::run(
            dispatcher,
            input,
            control_rx,
            events,
            Arc::clone(&status),
            finished_tx,
        ));

        let now = Instant::now();
        Ok(Arc::new(Session {
            id,
            address,
            status,
            created_at: now,
            last_activity: Mutex::new(now),
            control: control_tx,
            submitter: Mutex::new(submitter.map(|ends| Arc::new(tokio::sync::Mutex::new(ends)))),
            tasks: Mutex::new(vec![runner, writer]),
            finished,
            destroyed: AtomicBool::new(false),
        }))
    }

    /// Look up a session by id.
    pub fn get(&self, id: &str) -> Result<Option<Arc<Session>>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| ReplError::LockPoisoned)?;
        Ok(sessions.get(id).cloned())
    }

    /// Submit `command` to an in-process session and return its response.
    ///
    /// Calls on one session must not overlap; an overlapping call fails
    /// with [`ReplError::SubmissionPending`]. When the session's stream
    /// closes before a response arrives the session is destroyed.
    pub async fn send_command(&self, id: &str, command: &str) -> Result<String> {
        let session = self
            .get(id)?
            .ok_or_else(|| ReplError::UnknownSession(id.to_string()))?;

        match session.submit(command).await {
            Err(e @ ReplError::ConnectionClosed(_)) => {
                if let Err(failure) = session.destroy().await {
                    warn!("Session {} failed to tear down: {}", id, failure);
                }
                Err(e)
            }
            other => other,
        }
    }

    /// Unregister a session whose transport has closed and tear it down.
    ///
    /// Pending output is flushed first. The entry is only removed while it
    /// still refers to `session`, so a newer session under the same id is
    /// left alone.
    pub async fn release(&self, session: &Arc<Session>) -> Result<()> {
        {
            let mut sessions = self
                .sessions
                .write()
                .map_err(|_| ReplError::LockPoisoned)?;
            if sessions
                .get(&session.id)
                .is_some_and(|current| Arc::ptr_eq(current, session))
            {
                sessions.remove(&session.id);
            }
        }

        session.drain(DRAIN_TIMEOUT).await;
        session
            .destroy()
            .await
            .map_err(|e| ReplError::Teardown(vec![format!("{}: {}", session.id, e)]))?;
        debug!("Session {} released", session.id);
        Ok(())
    }

    /// Add a command to one open session; `None` targets the default id.
    pub fn register_command(
        &self,
        id: Option<&str>,
        name: &str,
        command: Arc<dyn Command>,
    ) -> Result<()> {
        validate_name(name)?;
        let id = id.unwrap_or(self.default_id.as_str());
        let session = self
            .get(id)?
            .ok_or_else(|| ReplError::UnknownSession(id.to_string()))?;

        let status = session.status();
        if !status.is_open() {
            return Err(ReplError::InvalidStatus {
                id: id.to_string(),
                status,
            });
        }

        session
            .control
            .send(Control::AddCommand {
                name: name.to_string(),
                command,
            })
            .map_err(|_| ReplError::InvalidStatus {
                id: id.to_string(),
                status: SessionStatus::Closed,
            })
    }

    /// Keep a listener so that [`close_all`](Self::close_all) closes it.
    pub fn add_listener(&self, listener: Arc<ListenerHandle>) {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    /// Destroy every session and close every listener.
    ///
    /// Each teardown is attempted even when an earlier one fails; failures
    /// are collected into [`ReplError::Teardown`]. Calling this again is a
    /// no-op for anything already torn down.
    pub async fn close_all(&self) -> Result<()> {
        let sessions: Vec<Arc<Session>> = {
            let sessions = self
                .sessions
                .read()
                .map_err(|_| ReplError::LockPoisoned)?;
            sessions.values().cloned().collect()
        };

        let mut failures = Vec::new();
        for session in sessions {
            if let Err(e) = session.destroy().await {
                warn!("Session {} failed to tear down: {}", session.id, e);
                failures.push(format!("{}: {}", session.id, e));
            }
        }

        let listeners: Vec<Arc<ListenerHandle>> =
            std::mem::take(&mut *self.listeners.lock().unwrap_or_else(|e| e.into_inner()));
        for listener in listeners {
            listener.close().await;
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ReplError::Teardown(failures))
        }
    }

    /// Summaries of every registered session, sorted by id.
    pub fn sessions(&self) -> Result<Vec<SessionSummary>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| ReplError::LockPoisoned)?;
        let mut out: Vec<SessionSummary> = sessions
            .values()
            .map(|s| SessionSummary {
                id: s.id.to_string(),
                status: s.status().to_string(),
                address: s.address.clone(),
                idle_seconds: s.idle_duration().as_secs_f64(),
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }
}
