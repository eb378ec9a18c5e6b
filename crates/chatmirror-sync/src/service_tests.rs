use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chatmirror_cdp::testing::{FakeDevtools, FakeReply};
use serde_json::json;

use super::*;

fn config(fake: &FakeDevtools) -> Config {
    let mut config = Config::default();
    config.devtools.ports = vec![fake.port()];
    config.devtools.default_port = fake.port();
    config.devtools.context_settle_ms = 10;
    config.sync.poll_interval_ms = 30;
    config
}

/// Answer captures with a fixed view and count injections.
fn scripted(fake: &FakeDevtools, injections: Arc<AtomicUsize>) {
    fake.respond_with(move |method, params| {
        if method != "Runtime.evaluate" {
            return FakeReply::Result(json!({}));
        }
        let expression = params["expression"].as_str().unwrap_or_default();
        if expression.starts_with("(async (text, force)") {
            injections.fetch_add(1, Ordering::SeqCst);
            FakeReply::evaluated(json!({"ok": true, "method": "click_send"}))
        } else {
            FakeReply::evaluated(json!({"html": "<div>chat</div>", "css": ".a{}"}))
        }
    });
}

#[tokio::test]
async fn test_subscribe_starts_polling() {
    let fake = FakeDevtools::start().await;
    scripted(&fake, Arc::default());
    let service = SyncService::new(&config(&fake)).unwrap();

    let mut sub = service.subscribe(fake.port());
    let snapshot = tokio::time::timeout(Duration::from_secs(3), sub.receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.html, "<div>chat</div>");
    assert_eq!(snapshot.css.as_deref(), Some(".a{}"));
    assert_eq!(service.poller().active_ports(), vec![fake.port()]);

    service.shutdown().await;
    assert_eq!(service.poller().worker_count(), 0);
}

#[tokio::test]
async fn test_duplicate_msg_id_injected_once() {
    let fake = FakeDevtools::start().await;
    let injections = Arc::new(AtomicUsize::new(0));
    scripted(&fake, injections.clone());
    let service = SyncService::new(&config(&fake)).unwrap();

    let first = service
        .send_action(fake.port(), Action::new("hello").with_id("m-1"))
        .await
        .unwrap();
    let second = service
        .send_action(fake.port(), Action::new("hello").with_id("m-1"))
        .await
        .unwrap();

    match first {
        SubmitOutcome::Forwarded(outcome) => assert!(outcome.ok),
        SubmitOutcome::Ignored => panic!("first submission ignored"),
    }
    assert!(second.is_ignored());
    assert_eq!(injections.load(Ordering::SeqCst), 1);

    service.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_duplicates_injected_once() {
    let fake = FakeDevtools::start().await;
    let injections = Arc::new(AtomicUsize::new(0));
    scripted(&fake, injections.clone());
    let service = Arc::new(SyncService::new(&config(&fake)).unwrap());
    let port = fake.port();

    let sends = (0..4).map(|_| {
        let service = service.clone();
        async move {
            service
                .send_action(port, Action::new("same").with_id("x1"))
                .await
                .unwrap()
        }
    });
    let outcomes = futures::future::join_all(sends).await;

    let ignored = outcomes.iter().filter(|o| o.is_ignored()).count();
    assert_eq!(ignored, 3);
    assert_eq!(injections.load(Ordering::SeqCst), 1);

    service.shutdown().await;
}

#[tokio::test]
async fn test_ignored_action_does_not_open_a_session() {
    let fake = FakeDevtools::start().await;
    scripted(&fake, Arc::default());
    let service = SyncService::new(&config(&fake)).unwrap();

    service.dedup.claim("taken");
    let outcome = service
        .send_action(fake.port(), Action::new("hi").with_id("taken"))
        .await
        .unwrap();
    assert!(outcome.is_ignored());
    assert_eq!(fake.connection_count(), 0);

    service.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_port_is_an_error() {
    let fake = FakeDevtools::start().await;
    let service = SyncService::new(&config(&fake)).unwrap();

    let err = service.app_state(1).await.unwrap_err();
    assert!(matches!(err, CdpError::Unreachable { port: 1, .. }));

    service.shutdown().await;
}

#[tokio::test]
async fn test_retry_after_unreachable_port_is_delivered() {
    let fake = FakeDevtools::start().await;
    let injections = Arc::new(AtomicUsize::new(0));
    scripted(&fake, injections.clone());
    let service = SyncService::new(&config(&fake)).unwrap();

    let err = service
        .send_action(1, Action::new("hi").with_id("m-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, CdpError::Unreachable { port: 1, .. }));

    let retry = service
        .send_action(fake.port(), Action::new("hi").with_id("m-1"))
        .await
        .unwrap();
    assert!(matches!(retry, SubmitOutcome::Forwarded(ref o) if o.ok));
    assert_eq!(injections.load(Ordering::SeqCst), 1);

    service.shutdown().await;
}

#[tokio::test]
async fn test_retry_after_missing_target_is_delivered() {
    let fake = FakeDevtools::start().await;
    let injections = Arc::new(AtomicUsize::new(0));
    scripted(&fake, injections.clone());
    let service = SyncService::new(&config(&fake)).unwrap();

    fake.set_targets(vec![]);
    let err = service
        .send_action(fake.port(), Action::new("hi").with_id("m-2"))
        .await
        .unwrap_err();
    assert!(matches!(err, CdpError::NotFound { .. }));

    fake.set_targets(vec![FakeDevtools::page(
        "page-1",
        "project - IDE",
        "vscode-file://vscode-app/workbench.html",
    )]);
    let retry = service
        .send_action(fake.port(), Action::new("hi").with_id("m-2"))
        .await
        .unwrap();
    assert!(!retry.is_ignored());
    assert_eq!(injections.load(Ordering::SeqCst), 1);

    service.shutdown().await;
}

#[tokio::test]
async fn test_capture_once() {
    let fake = FakeDevtools::start().await;
    scripted(&fake, Arc::default());
    let service = SyncService::new(&config(&fake)).unwrap();

    let snapshot = service.capture_once(fake.port()).await.unwrap().unwrap();
    assert_eq!(snapshot.port, fake.port());
    assert_eq!(snapshot.fingerprint, crate::snapshot::fingerprint("<div>chat</div>"));

    service.shutdown().await;
}

#[tokio::test]
async fn test_switch_port_polls_new_port() {
    let first = FakeDevtools::start().await;
    let second = FakeDevtools::start().await;
    scripted(&first, Arc::default());
    second.respond_with(|method, _| match method {
        "Runtime.evaluate" => FakeReply::evaluated(json!({"html": "<div>second</div>"})),
        _ => FakeReply::Result(json!({})),
    });
    let mut config = config(&first);
    config.devtools.ports.push(second.port());
    let service = SyncService::new(&config).unwrap();

    let mut sub = service.subscribe(first.port());
    let snapshot = tokio::time::timeout(Duration::from_secs(3), sub.receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.port, first.port());

    assert!(service.switch_port(&sub.id, second.port()));
    let snapshot = tokio::time::timeout(Duration::from_secs(3), sub.receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.html, "<div>second</div>");

    assert!(!service.switch_port("missing", first.port()));
    service.shutdown().await;
}

#[tokio::test]
async fn test_slots_cover_configured_ports() {
    let fake = FakeDevtools::start().await;
    let mut config = config(&fake);
    config.devtools.ports.push(1);
    let service = SyncService::new(&config).unwrap();

    let slots = service.slots().await;
    assert_eq!(slots.len(), 2);
    assert!(slots[0].running);
    assert_eq!(slots[0].title, "project - IDE");
    assert!(!slots[1].running);

    service.shutdown().await;
}
