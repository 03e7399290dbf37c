//! End-to-end behavior of `AppController` against in-memory collaborators.

mod common;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use voucherdesk::adapters::{Credentials, ObjectStore};
use voucherdesk::services::{ChatState, CANCELLED_REPLY};
use voucherdesk::{
    Adapters, AppController, AppEvent, ChatRole, ErrorKind, Result, UploadFile, UploadStatus,
    VoucherError,
};

fn two_vouchers() -> Vec<serde_json::Value> {
    vec![
        summary("V1", "Sharma Traders", "52000.00", "REQUIRED"),
        line_item("V1"),
        summary("V2", "Gupta Stores", "1800.50", "NOT_REQUIRED"),
    ]
}

fn invoice() -> UploadFile {
    UploadFile::new("invoice.pdf", "application/pdf", b"%PDF-1.4".to_vec())
}

async fn started(backend: &Arc<Backend>, assistant: &Arc<ScriptedAssistant>) -> AppController {
    let controller = controller(
        &test_config(),
        backend.clone(),
        assistant.clone(),
        backend.clone(),
    );
    controller.start().await.unwrap();
    controller
}

#[tokio::test]
async fn test_start_loads_summary_only_ledger() {
    let backend = Backend::new(two_vouchers(), 0);
    let assistant = Arc::new(ScriptedAssistant::default());
    let controller = started(&backend, &assistant).await;

    let state = controller.snapshot().await;
    let ids: Vec<&str> = state.ledger.voucher_ids().collect();
    assert_eq!(ids, vec!["V1", "V2"]);
    assert!(state.ledger.vouchers()[0].e_way_bill.is_required());
    assert!(state.last_refreshed_at.is_some());
    assert!(!state.ledger_loading());

    // Seeded greeting only
    assert_eq!(state.transcript.len(), 1);
    assert_eq!(state.transcript.messages()[0].role, ChatRole::Assistant);
    assert_eq!(state.chat_state, ChatState::Idle);
}

#[tokio::test]
async fn test_failed_bootstrap_blocks_network() {
    let backend = Backend::new(two_vouchers(), 0);
    let assistant = Arc::new(ScriptedAssistant::default());
    let controller = AppController::new(
        &test_config(),
        Adapters {
            ledger: backend.clone(),
            assistant: assistant.clone(),
            store: backend.clone(),
            credentials: Arc::new(RejectingCredentials),
        },
    );

    let err = controller.start().await.unwrap_err();
    assert!(matches!(err, VoucherError::Auth(_)));

    assert!(controller.refresh_ledger().await.is_err());
    assert!(controller.submit_chat_message("hello").await.is_err());
    assert!(controller.submit_upload(invoice()).await.is_err());

    assert_eq!(backend.fetches(), 0);
    assert_eq!(assistant.calls(), 0);
    assert_eq!(controller.snapshot().await.transcript.len(), 1);
}

#[tokio::test]
async fn test_failed_refresh_keeps_stale_ledger() {
    let backend = Backend::new(two_vouchers(), 0);
    let assistant = Arc::new(ScriptedAssistant::default());
    let controller = started(&backend, &assistant).await;
    let mut events = controller.subscribe();

    backend.push(summary("V3", "Late Vendor", "10.00", "NOT_REQUIRED"));
    backend.fail_next(1);
    let err = controller.refresh_ledger().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);

    let state = controller.snapshot().await;
    assert_eq!(state.ledger.len(), 2);
    assert!(state.last_ledger_error.is_some());
    assert!(matches!(
        events.try_recv().unwrap(),
        AppEvent::LedgerRefreshFailed { .. }
    ));

    // Recovery is a manual refresh
    assert_eq!(controller.refresh_ledger().await.unwrap(), 3);
    let state = controller.snapshot().await;
    assert_eq!(state.ledger.len(), 3);
    assert!(state.last_ledger_error.is_none());
    assert!(matches!(
        events.try_recv().unwrap(),
        AppEvent::LedgerUpdated { voucher_count: 3 }
    ));
}

#[tokio::test]
async fn test_blank_chat_is_noop() {
    let backend = Backend::new(Vec::new(), 0);
    let assistant = Arc::new(ScriptedAssistant::default());
    let controller = started(&backend, &assistant).await;

    assert_eq!(controller.submit_chat_message("").await.unwrap(), None);
    assert_eq!(controller.submit_chat_message("   ").await.unwrap(), None);

    let state = controller.snapshot().await;
    assert_eq!(state.transcript.len(), 1);
    assert_eq!(state.chat_state, ChatState::Idle);
    assert_eq!(assistant.calls(), 0);
}

#[tokio::test]
async fn test_gst_question_answered() {
    let backend = Backend::new(two_vouchers(), 0);
    let assistant = Arc::new(ScriptedAssistant::default());
    assistant.answer("What is my GST liability?", "₹12,340");
    let controller = started(&backend, &assistant).await;

    let id = controller
        .submit_chat_message("What is my GST liability?")
        .await
        .unwrap()
        .unwrap();

    let state = controller.snapshot().await;
    let messages = state.transcript.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].role, ChatRole::User);
    assert_eq!(messages[1].text, "What is my GST liability?");
    assert_eq!(messages[2].role, ChatRole::Assistant);
    assert_eq!(messages[2].text, "₹12,340");
    assert_eq!(messages[2].request_id, Some(id));
    assert_eq!(state.chat_state, ChatState::Idle);
}

#[tokio::test]
async fn test_failed_chat_appends_fallback() {
    let backend = Backend::new(Vec::new(), 0);
    let assistant = Arc::new(ScriptedAssistant::default());
    let controller = started(&backend, &assistant).await;

    controller.submit_chat_message("anyone there?").await.unwrap();

    let state = controller.snapshot().await;
    assert_eq!(state.transcript.len(), 3);
    assert_eq!(
        state.transcript.last().unwrap().text,
        "Sorry, my brain is offline. Check API Gateway!"
    );
    assert_eq!(state.chat_state, ChatState::Idle);
}

#[tokio::test]
async fn test_overlapping_chat_commits_in_request_order() {
    let backend = Backend::new(Vec::new(), 0);
    let assistant = Arc::new(ScriptedAssistant::default());
    assistant.answer("first", "answer one");
    assistant.answer("second", "answer two");
    let release_first = assistant.hold("first");
    let controller = started(&backend, &assistant).await;

    let first = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.submit_chat_message("first").await })
    };
    assert!(
        eventually(Duration::from_secs(2), || async {
            controller.snapshot().await.transcript.len() == 2
        })
        .await
    );

    // Second completes first but its reply waits behind the first
    controller.submit_chat_message("second").await.unwrap();
    let state = controller.snapshot().await;
    assert_eq!(state.transcript.len(), 3);
    assert!(state.is_typing());

    release_first.send(()).unwrap();
    first.await.unwrap().unwrap();

    let state = controller.snapshot().await;
    let texts: Vec<&str> = state
        .transcript
        .messages()
        .iter()
        .skip(1)
        .map(|m| m.text.as_str())
        .collect();
    assert_eq!(texts, vec!["first", "second", "answer one", "answer two"]);
    assert_eq!(state.chat_state, ChatState::Idle);
}

#[tokio::test]
async fn test_cancel_chat_discards_late_answer() {
    let backend = Backend::new(Vec::new(), 0);
    let assistant = Arc::new(ScriptedAssistant::default());
    assistant.answer("slow", "too late");
    let release = assistant.hold("slow");
    let controller = started(&backend, &assistant).await;

    let pending = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.submit_chat_message("slow").await })
    };
    assert!(
        eventually(Duration::from_secs(2), || async {
            controller.snapshot().await.is_typing()
        })
        .await
    );

    assert_eq!(controller.cancel_chat().await, 1);
    let _ = release.send(());
    pending.await.unwrap().unwrap();

    let state = controller.snapshot().await;
    assert_eq!(state.transcript.len(), 3);
    assert_eq!(state.transcript.last().unwrap().text, CANCELLED_REPLY);
    assert_eq!(state.chat_state, ChatState::Idle);
}

#[tokio::test]
async fn test_upload_bounded_staleness() {
    let backend = Backend::new(two_vouchers(), 1);
    let assistant = Arc::new(ScriptedAssistant::default());
    let mut config = test_config();
    config.upload.initial_delay_ms = 300;
    let controller = controller(&config, backend.clone(), assistant, backend.clone());
    controller.start().await.unwrap();
    let mut events = controller.subscribe();

    let handle = controller.submit_upload(invoice()).await.unwrap().unwrap();
    assert!(
        eventually(Duration::from_secs(2), || async {
            matches!(
                controller.snapshot().await.upload.map(|j| j.status),
                Some(UploadStatus::Settling { attempt: 0 })
            )
        })
        .await
    );

    // Inside the window the ledger may still be the pre-upload one
    assert_eq!(controller.refresh_ledger().await.unwrap(), 2);

    let status = handle.await.unwrap();
    assert_eq!(
        status,
        UploadStatus::Settled {
            voucher_ids: vec!["V-invoice.pdf".to_string()]
        }
    );
    let state = controller.snapshot().await;
    assert_eq!(state.ledger.len(), 3);
    assert!(state.ledger.contains("V-invoice.pdf"));
    assert!(!state.upload_active());

    let mut notices = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let AppEvent::Notice(notice) = event {
            notices.push(notice.message);
        }
    }
    assert_eq!(notices[0], "Upload Successful! Processing invoice...");
    assert!(notices.last().unwrap().contains("processed"));
}

#[tokio::test]
async fn test_second_upload_rejected_while_active() {
    let backend = Backend::new(Vec::new(), 100);
    let assistant = Arc::new(ScriptedAssistant::default());
    let mut config = test_config();
    config.upload.initial_delay_ms = 5_000;
    let controller = controller(&config, backend.clone(), assistant, backend.clone());
    controller.start().await.unwrap();

    let first = controller.submit_upload(invoice()).await.unwrap().unwrap();
    let second = UploadFile::new("other.pdf", "application/pdf", Vec::new());
    assert!(controller.submit_upload(second).await.unwrap().is_none());

    let state = controller.snapshot().await;
    assert_eq!(state.upload.unwrap().file_name, "invoice.pdf");

    assert!(controller.cancel_upload().await);
    assert_eq!(first.await.unwrap(), UploadStatus::Cancelled);
    assert!(!controller.cancel_upload().await);

    // A terminal job no longer blocks submissions
    let third = UploadFile::new("third.pdf", "application/pdf", Vec::new());
    let handle = controller.submit_upload(third).await.unwrap();
    assert!(handle.is_some());
    controller.cancel_upload().await;
}

#[tokio::test]
async fn test_upload_timeout_then_retry() {
    let backend = Backend::new(Vec::new(), 5);
    let assistant = Arc::new(ScriptedAssistant::default());
    let controller = started(&backend, &assistant).await;

    let handle = controller.submit_upload(invoice()).await.unwrap().unwrap();
    assert_eq!(handle.await.unwrap(), UploadStatus::TimedOut { attempts: 4 });
    assert!(controller.snapshot().await.ledger.is_empty());

    let retry = controller.retry_reconciliation().await.unwrap().unwrap();
    let status = retry.await.unwrap().unwrap();
    assert!(matches!(status, UploadStatus::Settled { .. }));
    assert_eq!(controller.snapshot().await.ledger.len(), 1);

    // Nothing left to retry
    assert!(controller.retry_reconciliation().await.unwrap().is_none());
}

struct RejectingStore;

#[async_trait]
impl ObjectStore for RejectingStore {
    async fn put_object(
        &self,
        _credentials: &Credentials,
        _key: &str,
        _content_type: &str,
        _data: Vec<u8>,
    ) -> Result<()> {
        Err(VoucherError::Upload("storage returned 403 Forbidden".into()))
    }
}

#[tokio::test]
async fn test_upload_failure_surfaces_notice() {
    let backend = Backend::new(two_vouchers(), 0);
    let assistant = Arc::new(ScriptedAssistant::default());
    let controller = controller(
        &test_config(),
        backend.clone(),
        assistant,
        Arc::new(RejectingStore),
    );
    controller.start().await.unwrap();
    let fetches = backend.fetches();

    let handle = controller.submit_upload(invoice()).await.unwrap().unwrap();
    let status = handle.await.unwrap();
    assert!(matches!(status, UploadStatus::Failed { .. }));

    let state = controller.snapshot().await;
    assert!(!state.upload_active());
    assert!(state.last_notice.unwrap().message.starts_with("Upload failed"));
    // No reconciliation after a failed write
    assert_eq!(backend.fetches(), fetches);
}

#[tokio::test]
async fn test_overlapping_refresh_last_completed_wins() {
    let ledger = Arc::new(GatedLedger::default());
    let backend = Backend::new(Vec::new(), 0);
    let assistant = Arc::new(ScriptedAssistant::default());
    let controller = controller(&test_config(), ledger.clone(), assistant, backend);
    controller.start().await.unwrap();

    let older_gate = ledger.gate();
    let newer_gate = ledger.gate();

    let older = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.refresh_ledger().await })
    };
    assert!(eventually(Duration::from_secs(2), || async { ledger.started() == 2 }).await);
    let newer = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.refresh_ledger().await })
    };
    assert!(eventually(Duration::from_secs(2), || async { ledger.started() == 3 }).await);
    assert!(controller.snapshot().await.ledger_loading());

    newer_gate
        .send(vec![summary("NEW", "Newer", "1.00", "NOT_REQUIRED")])
        .unwrap();
    newer.await.unwrap().unwrap();
    older_gate
        .send(vec![summary("OLD", "Older", "1.00", "NOT_REQUIRED")])
        .unwrap();
    older.await.unwrap().unwrap();

    let state = controller.snapshot().await;
    let ids: Vec<&str> = state.ledger.voucher_ids().collect();
    assert_eq!(ids, vec!["OLD"]);
    assert!(!state.ledger_loading());
}

#[tokio::test]
async fn test_upload_after_failed_startup_refresh_does_not_settle_on_old_vouchers() {
    let backend = Backend::new(vec![summary("V1", "Sharma Traders", "52000.00", "REQUIRED")], 100);
    backend.fail_next(1);
    let assistant = Arc::new(ScriptedAssistant::default());
    let controller = started(&backend, &assistant).await;
    assert!(controller.snapshot().await.ledger.is_empty());

    let handle = controller.submit_upload(invoice()).await.unwrap().unwrap();
    let status = handle.await.unwrap();

    // V1 was already in the backend; the invoice itself never showed up
    assert_eq!(status, UploadStatus::TimedOut { attempts: 4 });
    let state = controller.snapshot().await;
    assert!(state.ledger.contains("V1"));
    assert!(state.last_ledger_error.is_none());
}

#[tokio::test]
async fn test_upload_without_reachable_ledger_fails_before_write() {
    let backend = Backend::new(vec![summary("V1", "Sharma Traders", "52000.00", "REQUIRED")], 0);
    backend.fail_next(2);
    let assistant = Arc::new(ScriptedAssistant::default());
    let controller = started(&backend, &assistant).await;

    let handle = controller.submit_upload(invoice()).await.unwrap().unwrap();
    assert!(matches!(handle.await.unwrap(), UploadStatus::Failed { .. }));

    // Nothing was written, so the next refresh shows only the old voucher
    assert_eq!(controller.refresh_ledger().await.unwrap(), 1);
}

#[tokio::test]
async fn test_abandoned_chat_request_still_resolves_in_order() {
    let backend = Backend::new(Vec::new(), 0);
    let assistant = Arc::new(ScriptedAssistant::default());
    assistant.answer("slow", "answer slow");
    assistant.answer("fast", "answer fast");
    let release_slow = assistant.hold("slow");
    let controller = started(&backend, &assistant).await;

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        controller.submit_chat_message("slow"),
    )
    .await;
    assert!(abandoned.is_err());

    controller.submit_chat_message("fast").await.unwrap();
    assert!(controller.snapshot().await.is_typing());

    release_slow.send(()).unwrap();
    assert!(
        eventually(Duration::from_secs(2), || async {
            controller.snapshot().await.chat_state == ChatState::Idle
        })
        .await
    );

    let state = controller.snapshot().await;
    let texts: Vec<&str> = state
        .transcript
        .messages()
        .iter()
        .skip(1)
        .map(|m| m.text.as_str())
        .collect();
    assert_eq!(texts, vec!["slow", "fast", "answer slow", "answer fast"]);
}
