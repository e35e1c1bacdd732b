mod common;

use std::sync::Arc;

use common::{FakeInspector, FakeProber, Reply, APP_BODY, DEVTOOLS_BODY};
use dev_scan_rs::classifier::{Classifier, MarkerPolicy};
use dev_scan_rs::config::DiscoveryConfig;
use dev_scan_rs::types::{Candidate, Protocol};

fn candidate(pid: u32, port: u16, address: &str) -> Candidate {
    Candidate {
        pid,
        port,
        address: address.to_string(),
        process_name: "dart".to_string(),
    }
}

fn classifier(inspector: FakeInspector, prober: FakeProber) -> Classifier {
    Classifier::new(
        Arc::new(inspector),
        Arc::new(prober),
        Arc::new(MarkerPolicy::default()),
        Arc::new(DiscoveryConfig::default()),
    )
}

#[tokio::test]
async fn devtools_page_on_8080_is_rejected() {
    let c = classifier(
        FakeInspector::default().cwd(1, "/src/app"),
        FakeProber::default().reply(8080, Reply::Body(DEVTOOLS_BODY.to_string())),
    );
    assert!(c.classify(&candidate(1, 8080, "127.0.0.1")).await.is_none());
}

#[tokio::test]
async fn app_bootstrap_on_5000_is_accepted() {
    let c = classifier(
        FakeInspector::default().cwd(1, "/home/dev/shop_app"),
        FakeProber::default().reply(5000, Reply::Body(APP_BODY.to_string())),
    );
    let rec = c.classify(&candidate(1, 5000, "127.0.0.1")).await.unwrap();
    assert!(!rec.starting_up);
    assert_eq!(rec.port, 5000);
    assert_eq!(rec.url, "http://localhost:5000");
    assert_eq!(rec.project_name, "shop_app");
    assert_eq!(rec.process_label, "dart");
    assert!(rec.addresses.contains("127.0.0.1"));
    assert_eq!(rec.protocols.iter().copied().collect::<Vec<_>>(), vec![Protocol::Tcp4]);
}

#[tokio::test]
async fn timeout_in_dev_band_is_starting_up() {
    let c = classifier(
        FakeInspector::default().cwd(1, "/src/app"),
        FakeProber::default().reply(54321, Reply::Timeout),
    );
    let rec = c.classify(&candidate(1, 54321, "::1")).await.unwrap();
    assert!(rec.starting_up);
    assert!(rec.has_tcp6());
}

#[tokio::test]
async fn timeout_on_low_port_is_dropped() {
    let c = classifier(
        FakeInspector::default().cwd(1, "/src/app"),
        FakeProber::default().reply(8081, Reply::Timeout),
    );
    assert!(c.classify(&candidate(1, 8081, "127.0.0.1")).await.is_none());
}

#[tokio::test]
async fn refused_on_low_port_is_dropped() {
    let c = classifier(FakeInspector::default(), FakeProber::default());
    assert!(c.classify(&candidate(1, 5000, "127.0.0.1")).await.is_none());
}

#[tokio::test]
async fn unreadable_cwd_falls_back_to_placeholder() {
    let c = classifier(
        FakeInspector::default(),
        FakeProber::default().reply(5000, Reply::Body(APP_BODY.to_string())),
    );
    let rec = c.classify(&candidate(99, 5000, "127.0.0.1")).await.unwrap();
    assert_eq!(rec.project_name, "Flutter App");
}

#[tokio::test]
async fn mixed_signals_are_rejected_even_on_high_ports() {
    let body = format!("{APP_BODY}<!-- Dart VM Service -->");
    let c = classifier(
        FakeInspector::default(),
        FakeProber::default().reply(51000, Reply::Body(body)),
    );
    assert!(c.classify(&candidate(1, 51000, "127.0.0.1")).await.is_none());
}
