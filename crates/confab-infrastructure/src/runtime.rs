//! In-process execution substrate.
//!
//! Each session instance runs as one actor task with an mpsc mailbox, so
//! signals, updates, and the instance's own logic are never interleaved
//! for the same identity. The identity registry's entry insertion, taken
//! under a single write lock, is the sole creation gate ("create if
//! absent"), which is what makes concurrent attach-or-start and
//! update-with-start race-safe.
//!
//! Every value that crosses into the per-session journal passes through
//! the claim-check codec, and the journal enforces a hard per-record size
//! ceiling, the same discipline a real durable-execution log imposes.
//! A poller heartbeat gates queries and updates: without a live worker
//! they fail `WorkerUnavailable` instead of pretending the session does
//! not exist.

use async_trait::async_trait;
use confab_core::agent::Responder;
use confab_core::claim_check::{BlobStore, ClaimCheckCodec};
use confab_core::config::SupervisorConfig;
use confab_core::error::{Result, SupervisorError};
use confab_core::session::{
    ChatTurn, ProcessUserMessageInput, SessionDescription, SessionHandle, SessionStatus,
    SessionWorkflow,
};
use confab_core::substrate::{ConflictPolicy, ExecutionSubstrate, QueryOptions, ReusePolicy};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};

/// Hard per-record ceiling of the journal. The claim-check threshold must
/// sit below this or over-threshold records would still blow the log.
pub const RECORD_SIZE_CEILING: usize = 256 * 1024;

/// One committed journal record: a codec-encoded value plus what produced
/// it.
#[derive(Debug, Clone)]
pub struct JournalRecord {
    /// Record kind ("update_input", "update_turns").
    pub kind: &'static str,
    /// The codec-encoded payload (a token when over threshold).
    pub payload: serde_json::Value,
}

/// Mailbox commands for a session actor.
enum SessionCommand {
    Update {
        input: ProcessUserMessageInput,
        reply: oneshot::Sender<Result<Vec<ChatTurn>>>,
    },
    End,
}

/// State shared between a session actor and readers. Queries and
/// describe read these snapshots without entering the mailbox, so they
/// keep answering after the actor has completed.
struct SharedSessionState {
    status: RwLock<SessionStatus>,
    history: RwLock<Vec<ChatTurn>>,
    journal: Mutex<Vec<JournalRecord>>,
}

/// Registry entry for one session instance.
struct SessionCell {
    run_id: String,
    mailbox: mpsc::Sender<SessionCommand>,
    shared: Arc<SharedSessionState>,
}

impl SessionCell {
    async fn status(&self) -> SessionStatus {
        *self.shared.status.read().await
    }
}

/// Keeps the session actor's heartbeat alive while held; dropping it
/// stops the worker and queries/updates start failing WorkerUnavailable
/// once the liveness window lapses.
pub struct WorkerHandle {
    task: tokio::task::JoinHandle<()>,
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The in-process durable execution substrate.
pub struct LocalSubstrate {
    sessions: RwLock<HashMap<String, Arc<SessionCell>>>,
    codec: ClaimCheckCodec,
    responder: Arc<dyn Responder>,
    config: SupervisorConfig,
    last_poll: std::sync::RwLock<Option<Instant>>,
}

impl LocalSubstrate {
    pub fn new(
        config: SupervisorConfig,
        responder: Arc<dyn Responder>,
        store: Arc<dyn BlobStore>,
    ) -> Self {
        let codec = ClaimCheckCodec::new(store, config.claim_check_threshold);
        Self {
            sessions: RwLock::new(HashMap::new()),
            codec,
            responder,
            config,
            last_poll: std::sync::RwLock::new(None),
        }
    }

    /// Records one worker poll. Tests drive this directly; production
    /// code uses `start_worker`.
    pub fn heartbeat(&self) {
        *self.last_poll.write().expect("poll clock poisoned") = Some(Instant::now());
    }

    /// Spawns a background heartbeat task standing in for a worker
    /// process polling the task queue.
    pub fn start_worker(self: &Arc<Self>) -> WorkerHandle {
        let substrate = Arc::clone(self);
        substrate.heartbeat();
        let interval = Duration::from_millis((self.config.poller_liveness_ms / 4).max(1));
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                substrate.heartbeat();
            }
        });
        WorkerHandle { task }
    }

    /// Fails with WorkerUnavailable when no worker has polled within the
    /// liveness window.
    fn ensure_worker(&self) -> Result<()> {
        let alive = self
            .last_poll
            .read()
            .expect("poll clock poisoned")
            .is_some_and(|at| {
                at.elapsed() < Duration::from_millis(self.config.poller_liveness_ms)
            });
        if alive {
            Ok(())
        } else {
            Err(SupervisorError::worker_unavailable(
                "no poller seen for task queue recently",
            ))
        }
    }

    /// Journal records committed so far for `identity`. Exposed for
    /// inspection and tests.
    pub async fn journal_records(&self, identity: &str) -> Result<Vec<JournalRecord>> {
        let cell = self.lookup(identity).await?;
        Ok(cell.shared.journal.lock().await.clone())
    }

    async fn lookup(&self, identity: &str) -> Result<Arc<SessionCell>> {
        self.sessions
            .read()
            .await
            .get(identity)
            .cloned()
            .ok_or_else(|| SupervisorError::not_found(identity))
    }

    /// Spawns a fresh session actor and returns its registry cell.
    fn spawn_session(&self, identity: &str) -> Arc<SessionCell> {
        let shared = Arc::new(SharedSessionState {
            status: RwLock::new(SessionStatus::Open),
            history: RwLock::new(Vec::new()),
            journal: Mutex::new(Vec::new()),
        });
        let (tx, rx) = mpsc::channel(16);
        let cell = Arc::new(SessionCell {
            run_id: uuid::Uuid::new_v4().to_string(),
            mailbox: tx,
            shared: shared.clone(),
        });

        tracing::info!(identity, run_id = %cell.run_id, "starting session instance");
        tokio::spawn(run_session(
            rx,
            shared,
            self.codec.clone(),
            self.responder.clone(),
        ));
        cell
    }

    /// Sends one update through the cell's mailbox and awaits the result.
    async fn update_cell(
        &self,
        cell: &SessionCell,
        input: ProcessUserMessageInput,
    ) -> Result<Vec<ChatTurn>> {
        if cell.status().await != SessionStatus::Open {
            return Err(SupervisorError::stale(
                "session has ended; reload history before resubmitting",
            ));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let command = SessionCommand::Update {
            input,
            reply: reply_tx,
        };
        if cell.mailbox.send(command).await.is_err() {
            // Actor completed between the status read and the send.
            return Err(SupervisorError::stale(
                "session ended while the update was in flight",
            ));
        }
        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(SupervisorError::stale(
                "session ended before the update was applied",
            )),
        }
    }

    /// Passes a value across the durable boundary: encode (spilling to the
    /// blob store when over threshold), then decode back to the plain
    /// value the caller sees.
    async fn through_codec<T>(&self, value: &T) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let raw = serde_json::to_value(value)?;
        let encoded = self.codec.encode(&raw).await?;
        let decoded = self.codec.decode(&encoded).await?;
        Ok(serde_json::from_value(decoded)?)
    }
}

/// The session instance's `run` entry point: initialize an empty history
/// in `Open`, process mailbox traffic, and return only after the end
/// signal transitions the instance to `Ended`.
async fn run_session(
    mut mailbox: mpsc::Receiver<SessionCommand>,
    shared: Arc<SharedSessionState>,
    codec: ClaimCheckCodec,
    responder: Arc<dyn Responder>,
) {
    let mut workflow = SessionWorkflow::new();

    while let Some(command) = mailbox.recv().await {
        match command {
            SessionCommand::Update { input, reply } => {
                let result = apply_update(&mut workflow, &shared, &codec, &*responder, input).await;
                let _ = reply.send(result);
            }
            SessionCommand::End => {
                workflow.end();
                *shared.status.write().await = SessionStatus::Ended;
                tracing::info!("session instance ended");
                break;
            }
        }
    }
}

/// Applies one update atomically: journal the input, prepare the turn,
/// journal it, and only then commit it to the workflow and publish the
/// new snapshot. Any failure, including a journal encode failure after
/// the responder ran, leaves workflow and snapshot without a partial
/// turn, so a retry at the caller's observed length still succeeds.
async fn apply_update(
    workflow: &mut SessionWorkflow,
    shared: &SharedSessionState,
    codec: &ClaimCheckCodec,
    responder: &dyn Responder,
    input: ProcessUserMessageInput,
) -> Result<Vec<ChatTurn>> {
    let input_record = journal_encode(codec, "update_input", &input).await?;
    let new_turns = vec![workflow.prepare_user_message(input, responder).await?];
    let turns_record = journal_encode(codec, "update_turns", &new_turns).await?;

    let mut journal = shared.journal.lock().await;
    journal.push(input_record);
    journal.push(turns_record);
    drop(journal);

    for turn in &new_turns {
        workflow.commit_turn(turn.clone());
    }
    *shared.history.write().await = workflow.chat_history();
    Ok(new_turns)
}

/// Encodes a value for the journal and enforces the per-record ceiling.
async fn journal_encode<T: Serialize>(
    codec: &ClaimCheckCodec,
    kind: &'static str,
    value: &T,
) -> Result<JournalRecord> {
    let raw = serde_json::to_value(value)?;
    let payload = codec.encode(&raw).await?;
    let size = serde_json::to_vec(&payload)?.len();
    if size > RECORD_SIZE_CEILING {
        return Err(SupervisorError::internal(format!(
            "journal record '{}' is {} bytes, over the {} byte ceiling",
            kind, size, RECORD_SIZE_CEILING
        )));
    }
    Ok(JournalRecord { kind, payload })
}

#[async_trait]
impl ExecutionSubstrate for LocalSubstrate {
    async fn start(&self, identity: &str, policy: ReusePolicy) -> Result<SessionHandle> {
        let mut sessions = self.sessions.write().await;

        if let Some(existing) = sessions.get(identity) {
            let open = existing.status().await == SessionStatus::Open;
            // An Ended instance under AllowDuplicate is superseded; anything
            // else rejects the start.
            if open || policy == ReusePolicy::RejectDuplicate {
                return Err(SupervisorError::already_started(identity));
            }
        }

        let cell = self.spawn_session(identity);
        let handle = SessionHandle {
            identity: identity.to_string(),
            run_id: cell.run_id.clone(),
        };
        sessions.insert(identity.to_string(), cell);
        Ok(handle)
    }

    async fn signal_end(&self, identity: &str) -> Result<()> {
        let cell = self.lookup(identity).await?;
        // Fire and forget: a mailbox closed by a completed actor means the
        // desired end state already holds.
        let _ = cell.mailbox.send(SessionCommand::End).await;
        Ok(())
    }

    async fn query_history(&self, identity: &str, options: QueryOptions) -> Result<Vec<ChatTurn>> {
        self.ensure_worker()?;
        let cell = self.lookup(identity).await?;

        if options.reject_if_not_open && cell.status().await != SessionStatus::Open {
            return Err(SupervisorError::query_rejected(identity));
        }

        let history = cell.shared.history.read().await.clone();
        self.through_codec(&history).await
    }

    async fn update(
        &self,
        identity: &str,
        input: ProcessUserMessageInput,
    ) -> Result<Vec<ChatTurn>> {
        self.ensure_worker()?;
        let cell = self.lookup(identity).await?;
        let turns = self.update_cell(&cell, input).await?;
        self.through_codec(&turns).await
    }

    async fn update_with_start(
        &self,
        identity: &str,
        input: ProcessUserMessageInput,
        conflict: ConflictPolicy,
    ) -> Result<Vec<ChatTurn>> {
        self.ensure_worker()?;

        // Resolve-or-create under one write lock so two racing callers
        // can never both create.
        let cell = {
            let mut sessions = self.sessions.write().await;
            let mut open_cell = None;
            if let Some(existing) = sessions.get(identity) {
                if existing.status().await == SessionStatus::Open {
                    open_cell = Some(existing.clone());
                }
            }
            match open_cell {
                Some(existing) => match conflict {
                    ConflictPolicy::UseExisting => existing,
                    ConflictPolicy::Fail => {
                        return Err(SupervisorError::already_started(identity));
                    }
                },
                None => {
                    let cell = self.spawn_session(identity);
                    sessions.insert(identity.to_string(), cell.clone());
                    cell
                }
            }
        };

        let turns = self.update_cell(&cell, input).await?;
        self.through_codec(&turns).await
    }

    async fn describe(&self, identity: &str) -> Result<SessionDescription> {
        let cell = self.lookup(identity).await?;
        Ok(SessionDescription {
            identity: identity.to_string(),
            run_id: cell.run_id.clone(),
            status: cell.status().await,
            history_length: cell.shared.history.read().await.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confab_core::agent::TurnOutcome;
    use confab_core::claim_check::MemoryBlobStore;

    /// Responder that echoes input; long inputs get long responses so
    /// claim-check paths are exercised end to end.
    struct EchoResponder;

    #[async_trait]
    impl Responder for EchoResponder {
        async fn respond(&self, user_input: &str) -> Result<TurnOutcome> {
            Ok(TurnOutcome::text(format!("echo: {}", user_input)))
        }
    }

    fn test_config() -> SupervisorConfig {
        SupervisorConfig {
            claim_check_threshold: 256,
            poller_liveness_ms: 60_000,
            ..SupervisorConfig::default()
        }
    }

    fn substrate() -> LocalSubstrate {
        let s = LocalSubstrate::new(
            test_config(),
            Arc::new(EchoResponder),
            Arc::new(MemoryBlobStore::new()),
        );
        s.heartbeat();
        s
    }

    #[tokio::test]
    async fn test_start_update_query_flow() {
        let substrate = substrate();

        let handle = substrate
            .start("abc123", ReusePolicy::AllowDuplicate)
            .await
            .unwrap();
        assert_eq!(handle.identity, "abc123");

        let turns = substrate
            .update("abc123", ProcessUserMessageInput::new("Hello"))
            .await
            .unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].user_input, "Hello");
        assert!(!turns[0].text_response.is_empty());

        let history = substrate
            .query_history("abc123", QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(history, turns);
    }

    #[tokio::test]
    async fn test_duplicate_start_of_open_session_rejected() {
        let substrate = substrate();
        substrate
            .start("dup", ReusePolicy::AllowDuplicate)
            .await
            .unwrap();

        let err = substrate
            .start("dup", ReusePolicy::AllowDuplicate)
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::AlreadyStarted { .. }));
    }

    #[tokio::test]
    async fn test_identity_reuse_after_end() {
        let substrate = substrate();
        substrate
            .start("reuse", ReusePolicy::AllowDuplicate)
            .await
            .unwrap();
        substrate
            .update("reuse", ProcessUserMessageInput::new("one"))
            .await
            .unwrap();
        substrate.signal_end("reuse").await.unwrap();

        // Wait for the end signal to land.
        let description = loop {
            let d = substrate.describe("reuse").await.unwrap();
            if d.status == SessionStatus::Ended {
                break d;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        assert_eq!(description.history_length, 1);

        // AllowDuplicate supersedes the ended instance with a fresh one.
        let fresh = substrate
            .start("reuse", ReusePolicy::AllowDuplicate)
            .await
            .unwrap();
        assert_ne!(fresh.run_id, description.run_id);
        let history = substrate
            .query_history("reuse", QueryOptions::default())
            .await
            .unwrap();
        assert!(history.is_empty());

        // RejectDuplicate would have refused even the ended instance.
        substrate.signal_end("reuse").await.unwrap();
        loop {
            if substrate.describe("reuse").await.unwrap().status == SessionStatus::Ended {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let err = substrate
            .start("reuse", ReusePolicy::RejectDuplicate)
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::AlreadyStarted { .. }));
    }

    #[tokio::test]
    async fn test_update_after_end_is_stale_and_history_survives() {
        let substrate = substrate();
        substrate
            .start("ending", ReusePolicy::AllowDuplicate)
            .await
            .unwrap();
        substrate
            .update("ending", ProcessUserMessageInput::new("last words"))
            .await
            .unwrap();
        substrate.signal_end("ending").await.unwrap();
        loop {
            if substrate.describe("ending").await.unwrap().status == SessionStatus::Ended {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let err = substrate
            .update("ending", ProcessUserMessageInput::new("anyone?"))
            .await
            .unwrap_err();
        assert!(err.is_stale());

        // The full final history still answers.
        let history = substrate
            .query_history("ending", QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].user_input, "last words");

        // But a reject-if-not-open query refuses.
        let err = substrate
            .query_history("ending", QueryOptions::rejecting_not_open())
            .await
            .unwrap_err();
        assert!(err.is_query_rejected());
    }

    #[tokio::test]
    async fn test_unknown_identity_is_not_found() {
        let substrate = substrate();
        let err = substrate
            .query_history("ghost", QueryOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = substrate.describe("ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_no_poller_is_worker_unavailable_not_not_found() {
        let substrate = LocalSubstrate::new(
            test_config(),
            Arc::new(EchoResponder),
            Arc::new(MemoryBlobStore::new()),
        );
        // No heartbeat at all.
        let err = substrate
            .query_history("abc123", QueryOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_worker_unavailable());
        assert!(!err.is_not_found());

        let err = substrate
            .update("abc123", ProcessUserMessageInput::new("Hello"))
            .await
            .unwrap_err();
        assert!(err.is_worker_unavailable());
    }

    #[tokio::test]
    async fn test_update_with_start_creates_then_attaches() {
        let substrate = substrate();

        let first = substrate
            .update_with_start(
                "fresh",
                ProcessUserMessageInput::new("Hello"),
                ConflictPolicy::UseExisting,
            )
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].index, 0);

        let second = substrate
            .update_with_start(
                "fresh",
                ProcessUserMessageInput::new("Again"),
                ConflictPolicy::UseExisting,
            )
            .await
            .unwrap();
        assert_eq!(second[0].index, 1, "second compound attached, not created");

        let err = substrate
            .update_with_start(
                "fresh",
                ProcessUserMessageInput::new("conflict"),
                ConflictPolicy::Fail,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::AlreadyStarted { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_serialized() {
        let substrate = Arc::new(substrate());
        substrate
            .start("busy", ReusePolicy::AllowDuplicate)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for n in 0..8 {
            let substrate = substrate.clone();
            handles.push(tokio::spawn(async move {
                substrate
                    .update("busy", ProcessUserMessageInput::new(format!("msg {}", n)))
                    .await
            }));
        }
        let mut returned = 0;
        for handle in handles {
            returned += handle.await.unwrap().unwrap().len();
        }

        let history = substrate
            .query_history("busy", QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(history.len(), returned);
        // Indices form a contiguous, never-reordered sequence.
        for (n, turn) in history.iter().enumerate() {
            assert_eq!(turn.index, n as u64);
        }
    }

    #[tokio::test]
    async fn test_large_payload_journals_as_token() {
        let substrate = substrate();
        substrate
            .start("large", ReusePolicy::AllowDuplicate)
            .await
            .unwrap();

        let big_input = "x".repeat(2 * 1024);
        let turns = substrate
            .update("large", ProcessUserMessageInput::new(big_input.clone()))
            .await
            .unwrap();
        // The caller still sees the plain payload.
        assert_eq!(turns[0].user_input, big_input);

        let journal = substrate.journal_records("large").await.unwrap();
        assert_eq!(journal.len(), 2);
        for record in &journal {
            let obj = record.payload.as_object().unwrap();
            assert!(
                obj.contains_key("__confab_claim_check"),
                "over-threshold {} record should be a token",
                record.kind
            );
            let size = serde_json::to_vec(&record.payload).unwrap().len();
            assert!(size <= RECORD_SIZE_CEILING);
        }

        // And the query path resolves tokens transparently.
        let history = substrate
            .query_history("large", QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(history[0].user_input, big_input);
    }

    /// Blob store whose writes always fail, as a full or read-only disk
    /// would.
    struct FailingBlobStore;

    #[async_trait]
    impl BlobStore for FailingBlobStore {
        async fn put(&self, _bytes: &[u8]) -> Result<String> {
            Err(SupervisorError::Io {
                message: "disk full".to_string(),
            })
        }

        async fn get(&self, locator: &str) -> Result<Vec<u8>> {
            Err(SupervisorError::BlobMissing {
                locator: locator.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_failed_journal_write_commits_nothing() {
        let substrate = LocalSubstrate::new(
            test_config(),
            Arc::new(EchoResponder),
            Arc::new(FailingBlobStore),
        );
        substrate.heartbeat();
        substrate
            .start("wedged", ReusePolicy::AllowDuplicate)
            .await
            .unwrap();

        // Sized so the input record stays inline but the turns record
        // (input plus echoed response) spills, and the spill fails.
        let long_input = "x".repeat(200);
        let err = substrate
            .update("wedged", ProcessUserMessageInput::new(long_input))
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Io { .. }));

        // No partial turn is visible anywhere.
        let history = substrate
            .query_history("wedged", QueryOptions::default())
            .await
            .unwrap();
        assert!(history.is_empty());
        assert!(substrate.journal_records("wedged").await.unwrap().is_empty());

        // The session is not wedged: a retry at the length the caller
        // observed is accepted.
        let turns = substrate
            .update("wedged", ProcessUserMessageInput::at_length("hi", 0))
            .await
            .unwrap();
        assert_eq!(turns[0].index, 0);
    }

    #[tokio::test]
    async fn test_small_payloads_journal_inline() {
        let substrate = substrate();
        substrate
            .start("small", ReusePolicy::AllowDuplicate)
            .await
            .unwrap();
        substrate
            .update("small", ProcessUserMessageInput::new("hi"))
            .await
            .unwrap();

        let journal = substrate.journal_records("small").await.unwrap();
        for record in &journal {
            let obj = record.payload.as_object();
            let is_token = obj.is_some_and(|o| o.contains_key("__confab_claim_check"));
            assert!(!is_token, "sub-threshold payloads stay inline");
        }
    }
}
