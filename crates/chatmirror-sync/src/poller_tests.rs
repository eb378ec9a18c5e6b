use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chatmirror_cdp::testing::{FakeDevtools, FakeReply};
use chatmirror_cdp::{Discovery, SessionOptions, TargetFilter};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc::error::TryRecvError;

use super::*;
use crate::hub::Subscription;

const INTERVAL: Duration = Duration::from_millis(30);

fn poller(hub: Arc<Hub>) -> Poller {
    let filter = TargetFilter::new("workbench.html", "Launchpad").unwrap();
    let options = SessionOptions {
        handshake_timeout: Duration::from_secs(2),
        call_timeout: Duration::from_secs(2),
        context_settle: Duration::from_millis(10),
    };
    let pool = Arc::new(ConnectionPool::new(Discovery::new("127.0.0.1", filter), options));
    Poller::new(pool, hub, Arc::new(Automation::default()), INTERVAL)
}

/// Serve whatever `html` currently holds as the chat view.
fn serve_html(fake: &FakeDevtools, html: Arc<Mutex<String>>) {
    fake.respond_with(move |method, _| match method {
        "Runtime.evaluate" => FakeReply::evaluated(json!({"html": html.lock().clone()})),
        _ => FakeReply::Result(json!({})),
    });
}

async fn next(sub: &mut Subscription) -> Arc<Snapshot> {
    tokio::time::timeout(Duration::from_secs(3), sub.receiver.recv())
        .await
        .expect("snapshot in time")
        .expect("subscription open")
}

async fn wait_for(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(3), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition in time");
}

#[tokio::test]
async fn test_every_change_is_published() {
    let fake = FakeDevtools::start().await;
    let html = Arc::new(Mutex::new("<p>A</p>".to_string()));
    serve_html(&fake, html.clone());
    let hub = Arc::new(Hub::new(4));
    let poller = poller(hub.clone());

    let mut sub = hub.subscribe(fake.port());
    poller.ensure(fake.port());

    assert_eq!(next(&mut sub).await.html, "<p>A</p>");
    *html.lock() = "<p>B</p>".to_string();
    assert_eq!(next(&mut sub).await.html, "<p>B</p>");
    *html.lock() = "<p>A</p>".to_string();
    assert_eq!(next(&mut sub).await.html, "<p>A</p>");

    poller.shutdown().await;
}

#[tokio::test]
async fn test_unchanged_view_published_once() {
    let fake = FakeDevtools::start().await;
    serve_html(&fake, Arc::new(Mutex::new("<p>same</p>".to_string())));
    let hub = Arc::new(Hub::new(4));
    let poller = poller(hub.clone());

    let mut sub = hub.subscribe(fake.port());
    poller.ensure(fake.port());
    let first = next(&mut sub).await;

    wait_for(|| fake.requests("Runtime.evaluate").len() >= 4).await;
    assert!(matches!(sub.receiver.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(hub.latest_fingerprint(fake.port()), Some(first.fingerprint.clone()));

    poller.shutdown().await;
}

#[tokio::test]
async fn test_stale_context_recovers_within_a_tick() {
    let fake = FakeDevtools::start().await;
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    fake.respond_with(move |method, _| match method {
        "Runtime.evaluate" if counter.fetch_add(1, Ordering::SeqCst) == 0 => FakeReply::stale_context(),
        "Runtime.evaluate" => FakeReply::evaluated(json!({"html": "<p>after reload</p>"})),
        _ => FakeReply::Result(json!({})),
    });
    let hub = Arc::new(Hub::new(4));
    let poller = poller(hub.clone());

    let mut sub = hub.subscribe(fake.port());
    poller.ensure(fake.port());

    assert_eq!(next(&mut sub).await.html, "<p>after reload</p>");
    assert_eq!(fake.requests("Runtime.disable").len(), 1);

    poller.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_port_sleeps_until_asked_again() {
    let fake = FakeDevtools::start().await;
    serve_html(&fake, Arc::new(Mutex::new("<p>late</p>".to_string())));
    let targets = vec![FakeDevtools::page(
        "page-1",
        "project - IDE",
        "vscode-file://vscode-app/workbench.html",
    )];
    fake.set_targets(Vec::new());
    let hub = Arc::new(Hub::new(4));
    let poller = poller(hub.clone());

    let mut sub = hub.subscribe(fake.port());
    poller.ensure(fake.port());

    // The IDE comes back, but a dormant worker does not reconnect by itself.
    tokio::time::sleep(INTERVAL * 3).await;
    fake.set_targets(targets);
    tokio::time::sleep(INTERVAL * 5).await;
    assert_eq!(fake.connection_count(), 0);
    assert_eq!(poller.worker_count(), 1);

    poller.ensure(fake.port());
    assert_eq!(next(&mut sub).await.html, "<p>late</p>");
    assert_eq!(fake.connection_count(), 1);

    poller.shutdown().await;
}

#[tokio::test]
async fn test_outage_hides_cached_view() {
    let fake = FakeDevtools::start().await;
    serve_html(&fake, Arc::new(Mutex::new("<div>chat</div>".to_string())));
    let hub = Arc::new(Hub::new(4));
    let poller = poller(hub.clone());
    let port = fake.port();

    let mut watcher = hub.subscribe(port);
    poller.ensure(port);
    assert_eq!(next(&mut watcher).await.html, "<div>chat</div>");

    fake.set_targets(Vec::new());
    fake.drop_connections();
    wait_for(|| hub.latest(port).is_none()).await;

    let mut late = hub.subscribe(port);
    poller.ensure(port);
    tokio::time::sleep(INTERVAL * 4).await;
    assert!(matches!(late.receiver.try_recv(), Err(TryRecvError::Empty)));

    fake.set_targets(vec![FakeDevtools::page(
        "page-1",
        "project - IDE",
        "vscode-file://vscode-app/workbench.html",
    )]);
    poller.ensure(port);
    assert_eq!(next(&mut late).await.html, "<div>chat</div>");
    assert!(hub.latest(port).is_some());

    poller.shutdown().await;
}

#[tokio::test]
async fn test_worker_stops_without_subscribers() {
    let fake = FakeDevtools::start().await;
    serve_html(&fake, Arc::new(Mutex::new("<p>x</p>".to_string())));
    let hub = Arc::new(Hub::new(4));
    let poller = poller(hub.clone());

    let mut sub = hub.subscribe(fake.port());
    poller.ensure(fake.port());
    next(&mut sub).await;
    assert_eq!(poller.active_ports(), vec![fake.port()]);

    hub.unsubscribe(&sub.id);
    wait_for(|| poller.worker_count() == 0).await;
    assert!(hub.latest(fake.port()).is_none());

    let polls = fake.requests("Runtime.evaluate").len();
    tokio::time::sleep(INTERVAL * 4).await;
    assert_eq!(fake.requests("Runtime.evaluate").len(), polls);
}

#[tokio::test]
async fn test_ensure_reuses_running_worker() {
    let fake = FakeDevtools::start().await;
    serve_html(&fake, Arc::new(Mutex::new("<p>x</p>".to_string())));
    let hub = Arc::new(Hub::new(4));
    let poller = poller(hub.clone());

    let _a = hub.subscribe(fake.port());
    let _b = hub.subscribe(fake.port());
    poller.ensure(fake.port());
    poller.ensure(fake.port());
    assert_eq!(poller.worker_count(), 1);

    poller.shutdown().await;
    assert_eq!(poller.worker_count(), 0);
    poller.ensure(fake.port());
    assert_eq!(poller.worker_count(), 0);
}
