//! App Controller — owns the authoritative dashboard state
//!
//! `AppController` is a cheap clonable handle. Presentation code reads
//! `snapshot()` and listens on `subscribe()`; it drives the core only through
//! `refresh_ledger`, `submit_upload` and `submit_chat_message` (plus the
//! cancel/retry controls of the reconciliation and chat state machines).
//!
//! Ledger refreshes are last-completed-wins: overlapping refreshes are not
//! ordered, whichever response arrives last is what stays displayed.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::event::{AppEvent, Notice};
use super::state::AppState;
use crate::adapters::{
    build_http_client, provider_from_config, AssistantClient, CredentialProvider, Credentials,
    HttpAssistantClient, HttpLedgerSource, HttpObjectStore, LedgerSource, ObjectStore,
};
use crate::config::AppConfig;
use crate::domain::{ChatMessage, Ledger, RequestId, UploadFile, UploadJob, UploadStatus};
use crate::error::{Result, VoucherError};
use crate::services::{ChatSession, LedgerSync, UploadCoordinator, UploadObserver};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// External collaborators the controller is wired to
#[derive(Clone)]
pub struct Adapters {
    pub ledger: Arc<dyn LedgerSource>,
    pub assistant: Arc<dyn AssistantClient>,
    pub store: Arc<dyn ObjectStore>,
    pub credentials: Arc<dyn CredentialProvider>,
}

impl Adapters {
    /// HTTP implementations for every collaborator. Makes no network call.
    pub fn http(config: &AppConfig) -> Result<Self> {
        let http = build_http_client(config.api.timeout_secs)?;
        Ok(Self {
            ledger: Arc::new(HttpLedgerSource::new(http.clone(), &config.api.ledger_url)),
            assistant: Arc::new(HttpAssistantClient::new(http.clone(), &config.api.chat_url)),
            store: Arc::new(HttpObjectStore::new(http, &config.storage)),
            credentials: provider_from_config(&config.credentials)?,
        })
    }
}

struct Inner {
    state: RwLock<AppState>,
    events: broadcast::Sender<AppEvent>,
    provider: Arc<dyn CredentialProvider>,
    credentials: RwLock<Option<Credentials>>,
    ledger: Arc<LedgerSync>,
    uploads: UploadCoordinator,
    chat: ChatSession,
}

/// Clonable handle over the session state
#[derive(Clone)]
pub struct AppController {
    inner: Arc<Inner>,
}

impl AppController {
    pub fn new(config: &AppConfig, adapters: Adapters) -> Self {
        let ledger = Arc::new(LedgerSync::new(adapters.ledger));
        let uploads = UploadCoordinator::new(
            adapters.store,
            ledger.clone(),
            config.upload.clone(),
            config.storage.key_prefix.clone(),
        );
        let chat = ChatSession::new(adapters.assistant, &config.chat);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(AppState::new(&config.chat.greeting)),
                events,
                provider: adapters.credentials,
                credentials: RwLock::new(None),
                ledger,
                uploads,
                chat,
            }),
        }
    }

    /// Controller wired to the HTTP collaborators named in `config`
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(config, Adapters::http(config)?))
    }

    /// Bootstrap credentials, then load the ledger.
    ///
    /// Nothing touches the network before the identity step succeeds. A failed
    /// initial refresh is not fatal: the session starts with an empty ledger.
    pub async fn start(&self) -> Result<()> {
        let credentials = self.inner.provider.bootstrap().await.map_err(|e| {
            error!("Credential bootstrap failed: {}", e);
            e
        })?;
        info!(identity = credentials.identity(), "Session started");
        *self.inner.credentials.write().await = Some(credentials);

        if let Err(e) = self.refresh_ledger().await {
            warn!("Initial ledger refresh failed: {}", e);
        }
        Ok(())
    }

    /// Read the current state (owned snapshot)
    pub async fn snapshot(&self) -> AppState {
        self.inner.state.read().await.clone()
    }

    /// Subscribe to state change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.inner.events.subscribe()
    }

    /// Fetch the ledger and replace the displayed one.
    ///
    /// On failure the displayed ledger is left unchanged and the error is
    /// returned; there is no retry.
    pub async fn refresh_ledger(&self) -> Result<usize> {
        let credentials = self.inner.credentials().await?;
        self.inner.state.write().await.refreshes_in_flight += 1;

        let result = self.inner.ledger.refresh(&credentials).await;

        let mut state = self.inner.state.write().await;
        state.refreshes_in_flight = state.refreshes_in_flight.saturating_sub(1);
        match result {
            Ok(ledger) => {
                let count = ledger.len();
                self.inner.apply_ledger(&mut state, ledger);
                Ok(count)
            }
            Err(e) => {
                self.inner.record_refresh_failure(&mut state, &e);
                Err(e)
            }
        }
    }

    /// Submit an invoice for processing.
    ///
    /// Returns `None` when the submission is ignored (a job is already
    /// active, or the file has no name). Otherwise the upload and its
    /// reconciliation run in the background; the handle resolves to the
    /// terminal status.
    ///
    /// The displayed ledger is the reconciliation baseline only if it was
    /// loaded and the last refresh succeeded; otherwise the coordinator
    /// fetches one before writing.
    pub async fn submit_upload(
        &self,
        file: UploadFile,
    ) -> Result<Option<JoinHandle<UploadStatus>>> {
        let credentials = self.inner.credentials().await?;
        let baseline: Option<HashSet<String>> = {
            let state = self.inner.state.read().await;
            if state.last_refreshed_at.is_some() && state.last_ledger_error.is_none() {
                Some(state.ledger.voucher_ids().map(str::to_string).collect())
            } else {
                debug!("Displayed ledger is not a usable baseline");
                None
            }
        };

        let Some(job) = self.inner.uploads.begin(&file, baseline) else {
            return Ok(None);
        };
        self.inner.job_changed(&job).await;

        let inner = self.inner.clone();
        Ok(Some(tokio::spawn(async move {
            inner.uploads.run(&credentials, file, inner.as_ref()).await
        })))
    }

    /// Re-run reconciliation for a timed-out upload
    pub async fn retry_reconciliation(
        &self,
    ) -> Result<Option<JoinHandle<Option<UploadStatus>>>> {
        let credentials = self.inner.credentials().await?;
        let retryable = self
            .inner
            .uploads
            .current()
            .map(|job| job.status.is_retryable())
            .unwrap_or(false);
        if !retryable {
            debug!("No timed-out upload to retry");
            return Ok(None);
        }

        let inner = self.inner.clone();
        Ok(Some(tokio::spawn(async move {
            inner.uploads.retry(&credentials, inner.as_ref()).await
        })))
    }

    /// Cancel the active upload, if any
    pub async fn cancel_upload(&self) -> bool {
        match self.inner.uploads.cancel() {
            Some(job) => {
                self.inner.job_changed(&job).await;
                true
            }
            None => false,
        }
    }

    /// Send a chat prompt and wait for its turn to resolve.
    ///
    /// Blank input is a no-op returning `None`. The user message is appended
    /// immediately; the reply (answer or fallback) is appended once every
    /// earlier request has been answered. The request runs on its own task,
    /// so dropping the returned future does not leave it unresolved.
    pub async fn submit_chat_message(&self, text: &str) -> Result<Option<RequestId>> {
        if text.trim().is_empty() {
            debug!("Ignoring blank chat message");
            return Ok(None);
        }
        let credentials = self.inner.credentials().await?;

        let turn = {
            let mut state = self.inner.state.write().await;
            let Some(turn) = self.inner.chat.begin(text) else {
                return Ok(None);
            };
            state.transcript.push(turn.message.clone());
            self.inner.chat_changed(&mut state, Some(turn.id));
            turn
        };

        let id = turn.id;
        let inner = self.inner.clone();
        let request = tokio::spawn(async move {
            let reply = inner.chat.ask(&credentials, &turn).await;
            let mut state = inner.state.write().await;
            let released = inner.chat.resolve(turn.id, reply);
            inner.append_replies(&mut state, released, turn.id);
        });
        request
            .await
            .map_err(|e| VoucherError::Internal(format!("chat request {id} aborted: {e}")))?;
        Ok(Some(id))
    }

    /// Resolve every in-flight chat request with a cancellation reply.
    /// Returns how many replies were appended.
    pub async fn cancel_chat(&self) -> usize {
        let mut state = self.inner.state.write().await;
        let released = self.inner.chat.cancel_all();
        let count = released.len();
        if let Some(last) = released.last().and_then(|m| m.request_id) {
            self.inner.append_replies(&mut state, released, last);
        }
        count
    }
}

impl Inner {
    async fn credentials(&self) -> Result<Credentials> {
        self.credentials.read().await.clone().ok_or_else(|| {
            VoucherError::Auth("session not started; credentials not bootstrapped".to_string())
        })
    }

    fn emit(&self, event: AppEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn notify(&self, state: &mut AppState, notice: Notice) {
        info!(level = %notice.level, "{}", notice.message);
        state.last_notice = Some(notice.clone());
        self.emit(AppEvent::Notice(notice));
    }

    fn apply_ledger(&self, state: &mut AppState, ledger: Ledger) {
        let voucher_count = ledger.len();
        state.apply_ledger(ledger);
        debug!(voucher_count, "Ledger applied");
        self.emit(AppEvent::LedgerUpdated { voucher_count });
    }

    fn record_refresh_failure(&self, state: &mut AppState, error: &VoucherError) {
        warn!(kind = %error.kind(), "Ledger refresh failed; keeping stale ledger: {}", error);
        state.last_ledger_error = Some(error.to_string());
        self.emit(AppEvent::refresh_failed(error.kind(), error.to_string()));
    }

    fn chat_changed(&self, state: &mut AppState, request_id: Option<RequestId>) {
        state.chat_state = self.chat.state();
        self.emit(AppEvent::ChatUpdated {
            transcript_len: state.transcript.len(),
            chat_state: state.chat_state,
            request_id,
        });
    }

    fn append_replies(&self, state: &mut AppState, replies: Vec<ChatMessage>, request: RequestId) {
        for reply in replies {
            state.transcript.push(reply);
        }
        self.chat_changed(state, Some(request));
    }
}

#[async_trait]
impl UploadObserver for Inner {
    async fn job_changed(&self, job: &UploadJob) {
        let mut state = self.state.write().await;
        // `job` may be older than the coordinator's view (a cancel can land
        // between a transition and its notification); state follows the
        // coordinator so a late notification cannot roll it back.
        let latest = self.uploads.current().unwrap_or_else(|| job.clone());
        state.upload = Some(latest.clone());
        self.emit(AppEvent::UploadStatusChanged(latest));
        if let Some(notice) = Notice::for_upload(job) {
            self.notify(&mut state, notice);
        }
    }

    async fn ledger_refreshed(&self, ledger: Ledger) {
        let mut state = self.state.write().await;
        self.apply_ledger(&mut state, ledger);
    }

    async fn ledger_refresh_failed(&self, error: &VoucherError) {
        let mut state = self.state.write().await;
        self.record_refresh_failure(&mut state, error);
    }
}
