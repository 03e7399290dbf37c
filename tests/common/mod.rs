//! In-memory collaborators for driving `AppController` end to end.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use voucherdesk::adapters::{
    AssistantClient, CredentialProvider, Credentials, GuestCredentials, LedgerSource, ObjectStore,
};
use voucherdesk::config::{AppConfig, UploadConfig};
use voucherdesk::{Adapters, AppController, Result, VoucherError};

pub fn summary(id: &str, vendor: &str, amount: &str, e_way_bill: &str) -> Value {
    json!({
        "voucher_id": id,
        "vendor_name": vendor,
        "total_amount": amount,
        "e_way_bill": e_way_bill,
        "record_type": "SUMMARY",
    })
}

pub fn line_item(id: &str) -> Value {
    json!({ "voucher_id": id, "record_type": "LINE_ITEM", "description": "rice 25kg" })
}

/// Config with reconciliation timings short enough for real-time tests
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default_config("http://gateway.test");
    config.upload = UploadConfig {
        initial_delay_ms: 20,
        base_backoff_ms: 10,
        max_backoff_ms: 40,
        max_attempts: 4,
    };
    config
}

pub fn controller(
    config: &AppConfig,
    ledger: Arc<dyn LedgerSource>,
    assistant: Arc<dyn AssistantClient>,
    store: Arc<dyn ObjectStore>,
) -> AppController {
    AppController::new(
        config,
        Adapters {
            ledger,
            assistant,
            store,
            credentials: Arc::new(GuestCredentials),
        },
    )
}

/// Backend simulation shared by the ledger source and the object store.
///
/// A stored object becomes a SUMMARY record only after `processing_fetches`
/// further ledger reads, mimicking out-of-band processing.
pub struct Backend {
    records: Mutex<Vec<Value>>,
    processing: Mutex<Vec<(Value, usize)>>,
    processing_fetches: usize,
    fetches: AtomicUsize,
    fail_fetches: Mutex<usize>,
}

impl Backend {
    pub fn new(records: Vec<Value>, processing_fetches: usize) -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(records),
            processing: Mutex::new(Vec::new()),
            processing_fetches,
            fetches: AtomicUsize::new(0),
            fail_fetches: Mutex::new(0),
        })
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Fail the next `n` ledger reads with a network error
    pub fn fail_next(&self, n: usize) {
        *self.fail_fetches.lock().unwrap() = n;
    }

    pub fn push(&self, record: Value) {
        self.records.lock().unwrap().push(record);
    }
}

#[async_trait]
impl LedgerSource for Backend {
    async fn fetch_records(&self, _credentials: &Credentials) -> Result<Vec<Value>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        {
            let mut fail = self.fail_fetches.lock().unwrap();
            if *fail > 0 {
                *fail -= 1;
                return Err(VoucherError::Network("ledger endpoint returned 503".into()));
            }
        }

        let mut processing = self.processing.lock().unwrap();
        let mut records = self.records.lock().unwrap();
        let mut still_processing = Vec::new();
        for (record, remaining) in processing.drain(..) {
            if remaining == 0 {
                records.push(record);
            } else {
                still_processing.push((record, remaining - 1));
            }
        }
        *processing = still_processing;
        Ok(records.clone())
    }
}

#[async_trait]
impl ObjectStore for Backend {
    async fn put_object(
        &self,
        _credentials: &Credentials,
        key: &str,
        _content_type: &str,
        _data: Vec<u8>,
    ) -> Result<()> {
        let id = format!("V-{key}");
        self.processing.lock().unwrap().push((
            summary(&id, "Uploaded Vendor", "100.00", "NOT_REQUIRED"),
            self.processing_fetches,
        ));
        Ok(())
    }
}

/// Ledger source whose responses are released one by one by the test
#[derive(Default)]
pub struct GatedLedger {
    gates: Mutex<VecDeque<oneshot::Receiver<Vec<Value>>>>,
    started: AtomicUsize,
}

impl GatedLedger {
    /// Queue a gate for the next fetch; send on the returned sender to release it
    pub fn gate(&self) -> oneshot::Sender<Vec<Value>> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().push_back(rx);
        tx
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerSource for GatedLedger {
    async fn fetch_records(&self, _credentials: &Credentials) -> Result<Vec<Value>> {
        let gate = self.gates.lock().unwrap().pop_front();
        self.started.fetch_add(1, Ordering::SeqCst);
        match gate {
            Some(rx) => rx
                .await
                .map_err(|_| VoucherError::Network("gate dropped".into())),
            None => Ok(Vec::new()),
        }
    }
}

/// Assistant that answers from a table, optionally waiting on a gate per prompt
#[derive(Default)]
pub struct ScriptedAssistant {
    answers: Mutex<HashMap<String, String>>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    calls: AtomicUsize,
}

impl ScriptedAssistant {
    pub fn answer(&self, prompt: &str, answer: &str) {
        self.answers
            .lock()
            .unwrap()
            .insert(prompt.to_string(), answer.to_string());
    }

    /// Hold the answer to `prompt` until the returned sender fires
    pub fn hold(&self, prompt: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(prompt.to_string(), rx);
        tx
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssistantClient for ScriptedAssistant {
    async fn ask(&self, _credentials: &Credentials, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().unwrap().remove(prompt);
        if let Some(rx) = gate {
            let _ = rx.await;
        }
        self.answers
            .lock()
            .unwrap()
            .get(prompt)
            .cloned()
            .ok_or_else(|| VoucherError::Assistant("endpoint returned 502 Bad Gateway".into()))
    }
}

pub struct RejectingCredentials;

#[async_trait]
impl CredentialProvider for RejectingCredentials {
    async fn bootstrap(&self) -> Result<Credentials> {
        Err(VoucherError::Auth("identity pool unavailable".into()))
    }
}

/// Poll `check` until it holds or the deadline passes
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
