mod support;

use std::io::Write;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gatewarden_detection::{AlertSource, LogAlertSource};
use gatewarden_engine::{EngineError, ProtectionManager, ProtectionSettings};
use support::{is_banned, manager, settings, wait_until, ChannelAlertSource, RecordingFirewall};

const WAIT: Duration = Duration::from_secs(3);
const LONG_TTL: Duration = Duration::from_secs(300);
const FAST_SWEEP: Duration = Duration::from_millis(100);

#[tokio::test]
async fn add_bans_with_ttl() {
    let fw = RecordingFirewall::new();
    let source = ChannelAlertSource::new();
    let manager = manager(settings(LONG_TTL, FAST_SWEEP), fw.clone(), source.clone());
    let handle = manager.handle();
    manager.start().await.unwrap();
    assert!(source.started.load(Ordering::SeqCst));

    handle.add("10.0.0.1", false);
    assert!(wait_until(WAIT, || is_banned(&handle, "10.0.0.1")).await);

    let bans = handle.snapshot_bans();
    let ban = &bans[0];
    let expected = Utc::now() + chrono::Duration::seconds(300);
    let expire_at = ban.expire_at.unwrap();
    assert!((expire_at - expected).num_seconds().abs() <= 2);
    assert!(!ban.is_permanent);
    assert_eq!(ban.original_ttl_secs, 300);
    assert!(fw.contains("10.0.0.1"));

    manager.stop().await;
}

#[tokio::test]
async fn repeated_requests_block_once() {
    let fw = RecordingFirewall::new();
    let source = ChannelAlertSource::new();
    let manager = manager(settings(LONG_TTL, FAST_SWEEP), fw.clone(), source.clone());
    let handle = manager.handle();
    manager.start().await.unwrap();

    handle.add("10.0.0.2", false);
    handle.add("10.0.0.2", true);
    source.emit("10.0.0.2").await;
    source.emit("::ffff:10.0.0.2").await;

    assert!(wait_until(WAIT, || is_banned(&handle, "10.0.0.2")).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fw.block_calls("10.0.0.2"), 1);
    assert_eq!(handle.snapshot_bans().len(), 1);

    let metrics = handle.metrics_text().unwrap();
    assert!(metrics.contains("gatewarden_alerts_total 2"));
    assert!(metrics.contains("gatewarden_bans_total 1"));

    manager.stop().await;
}

#[tokio::test]
async fn whitelist_evicts_and_prevents_bans() {
    let fw = RecordingFirewall::new();
    let source = ChannelAlertSource::new();
    let manager = manager(settings(LONG_TTL, FAST_SWEEP), fw.clone(), source.clone());
    let handle = manager.handle();
    manager.start().await.unwrap();

    handle.add("192.168.1.50", false);
    assert!(wait_until(WAIT, || is_banned(&handle, "192.168.1.50")).await);

    handle.add_whitelist("192.168.1.50");
    assert!(wait_until(WAIT, || !is_banned(&handle, "192.168.1.50")).await);
    assert_eq!(fw.unblock_calls("192.168.1.50"), 1);
    assert!(!fw.contains("192.168.1.50"));

    handle.add("192.168.1.50", true);
    source.emit("192.168.1.50").await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!is_banned(&handle, "192.168.1.50"));
    assert_eq!(fw.block_calls("192.168.1.50"), 1);

    handle.delete_whitelist("192.168.1.50");
    assert!(wait_until(WAIT, || handle.snapshot_whitelist().is_empty()).await);
    assert!(!is_banned(&handle, "192.168.1.50"));

    manager.stop().await;
}

#[tokio::test]
async fn temporary_bans_expire_permanent_ones_stay() {
    let fw = RecordingFirewall::new();
    let source = ChannelAlertSource::new();
    let manager = manager(
        settings(Duration::from_secs(1), FAST_SWEEP),
        fw.clone(),
        source,
    );
    let handle = manager.handle();
    manager.start().await.unwrap();

    handle.add("10.1.0.1", false);
    handle.add("10.1.0.2", true);
    assert!(wait_until(WAIT, || handle.snapshot_bans().len() == 2).await);

    assert!(wait_until(WAIT, || !is_banned(&handle, "10.1.0.1")).await);
    assert!(!fw.contains("10.1.0.1"));
    assert_eq!(fw.unblock_calls("10.1.0.1"), 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let bans = handle.snapshot_bans();
    assert_eq!(bans.len(), 1);
    assert!(bans[0].is_permanent);
    assert!(bans[0].expire_at.is_none());
    assert_eq!(fw.unblock_calls("10.1.0.1"), 1);
    assert_eq!(fw.unblock_calls("10.1.0.2"), 0);

    manager.stop().await;
}

#[tokio::test]
async fn ban_expires_between_two_and_three_sweeps() {
    let fw = RecordingFirewall::new();
    let source = ChannelAlertSource::new();
    let manager = manager(
        settings(Duration::from_secs(2), Duration::from_secs(1)),
        fw.clone(),
        source,
    );
    let handle = manager.handle();
    manager.start().await.unwrap();

    handle.add("198.51.100.4", false);
    assert!(wait_until(WAIT, || is_banned(&handle, "198.51.100.4")).await);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(is_banned(&handle, "198.51.100.4"));
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(is_banned(&handle, "198.51.100.4"));

    assert!(wait_until(Duration::from_secs(3), || !is_banned(&handle, "198.51.100.4")).await);
    assert!(!fw.contains("198.51.100.4"));
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(fw.unblock_calls("198.51.100.4"), 1);

    manager.stop().await;
}

#[tokio::test]
async fn stop_lifts_every_ban() {
    let fw = RecordingFirewall::new();
    let source = ChannelAlertSource::new();
    let manager = manager(settings(LONG_TTL, FAST_SWEEP), fw.clone(), source.clone());
    let handle = manager.handle();
    manager.start().await.unwrap();

    handle.add("10.2.0.1", false);
    handle.add("10.2.0.2", true);
    assert!(wait_until(WAIT, || handle.snapshot_bans().len() == 2).await);

    manager.stop().await;
    assert!(source.stopped.load(Ordering::SeqCst));
    assert!(handle.snapshot_bans().is_empty());
    assert!(fw.banned().is_empty());

    // Requests after shutdown are dropped without panicking.
    handle.add("10.2.0.3", false);
    assert!(handle.snapshot_bans().is_empty());
}

#[tokio::test]
async fn stop_clears_table_even_when_backend_refuses() {
    let fw = RecordingFirewall::new();
    let source = ChannelAlertSource::new();
    let manager = manager(settings(LONG_TTL, FAST_SWEEP), fw.clone(), source);
    let handle = manager.handle();
    manager.start().await.unwrap();

    handle.add("10.2.1.1", false);
    assert!(wait_until(WAIT, || is_banned(&handle, "10.2.1.1")).await);

    fw.set_fail_unblock(true);
    manager.stop().await;
    assert!(handle.snapshot_bans().is_empty());
    assert_eq!(fw.unblock_calls("10.2.1.1"), 1);
}

#[tokio::test]
async fn full_queue_drops_newest_request() {
    let fw = RecordingFirewall::new();
    let source = ChannelAlertSource::new();
    let mut cfg = settings(LONG_TTL, FAST_SWEEP);
    cfg.queue_capacity = 2;
    let manager = manager(cfg, fw.clone(), source);
    let handle = manager.handle();

    handle.add("10.3.0.1", false);
    handle.add("10.3.0.2", false);
    handle.add("10.3.0.3", false);
    let metrics = handle.metrics_text().unwrap();
    assert!(metrics.contains(r#"gatewarden_dropped_requests_total{queue="add"} 1"#));

    manager.start().await.unwrap();
    assert!(wait_until(WAIT, || handle.snapshot_bans().len() == 2).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!is_banned(&handle, "10.3.0.3"));
    assert_eq!(fw.block_calls("10.3.0.3"), 0);

    manager.stop().await;
}

fn dropped(handle: &gatewarden_engine::ProtectionHandle, queue: &str) -> bool {
    handle
        .metrics_text()
        .unwrap()
        .contains(&format!(r#"gatewarden_dropped_requests_total{{queue="{queue}"}} 1"#))
}

#[tokio::test]
async fn full_delete_queue_drops_newest_request() {
    let fw = RecordingFirewall::preloaded(&["10.3.1.1", "10.3.1.2"]);
    let mut cfg = settings(LONG_TTL, FAST_SWEEP);
    cfg.queue_capacity = 1;
    let manager = manager(cfg, fw.clone(), ChannelAlertSource::new());
    let handle = manager.handle();

    handle.delete("10.3.1.1");
    handle.delete("10.3.1.2");
    assert!(dropped(&handle, "delete"));

    manager.start().await.unwrap();
    assert!(wait_until(WAIT, || !is_banned(&handle, "10.3.1.1")).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(is_banned(&handle, "10.3.1.2"));
    assert_eq!(fw.unblock_calls("10.3.1.2"), 0);

    manager.stop().await;
}

#[tokio::test]
async fn full_whitelist_add_queue_drops_newest_request() {
    let fw = RecordingFirewall::preloaded(&["10.3.2.1", "10.3.2.2"]);
    let mut cfg = settings(LONG_TTL, FAST_SWEEP);
    cfg.queue_capacity = 1;
    let manager = manager(cfg, fw.clone(), ChannelAlertSource::new());
    let handle = manager.handle();

    handle.add_whitelist("10.3.2.1");
    handle.add_whitelist("10.3.2.2");
    assert!(dropped(&handle, "whitelist_add"));

    manager.start().await.unwrap();
    assert!(wait_until(WAIT, || !is_banned(&handle, "10.3.2.1")).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(handle.snapshot_whitelist(), vec!["10.3.2.1".to_string()]);
    assert!(is_banned(&handle, "10.3.2.2"));

    manager.stop().await;
}

#[tokio::test]
async fn full_whitelist_delete_queue_drops_newest_request() {
    let mut cfg = settings(LONG_TTL, FAST_SWEEP);
    cfg.queue_capacity = 1;
    cfg.whitelist = vec!["10.3.3.1".into(), "10.3.3.2".into()];
    let manager = manager(cfg, RecordingFirewall::new(), ChannelAlertSource::new());
    let handle = manager.handle();

    handle.delete_whitelist("10.3.3.1");
    handle.delete_whitelist("10.3.3.2");
    assert!(dropped(&handle, "whitelist_delete"));

    manager.start().await.unwrap();
    assert!(wait_until(WAIT, || handle.snapshot_whitelist().len() == 1).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(handle.snapshot_whitelist(), vec!["10.3.3.2".to_string()]);

    manager.stop().await;
}

#[tokio::test]
async fn start_imports_existing_firewall_bans() {
    let fw = RecordingFirewall::preloaded(&["10.4.0.1", "10.4.0.2"]);
    let source = ChannelAlertSource::new();
    let mut cfg = settings(LONG_TTL, FAST_SWEEP);
    cfg.whitelist = vec!["10.4.0.2".into()];
    let manager = manager(cfg, fw.clone(), source);
    let handle = manager.handle();
    manager.start().await.unwrap();

    let bans = handle.snapshot_bans();
    assert_eq!(bans.len(), 1);
    assert_eq!(bans[0].ip, "10.4.0.1");
    assert!(!bans[0].is_permanent);
    assert_eq!(handle.snapshot_whitelist(), vec!["10.4.0.2".to_string()]);
    assert_eq!(fw.block_calls("10.4.0.1"), 0);

    manager.stop().await;
}

#[tokio::test]
async fn start_survives_unreachable_backend() {
    let fw = RecordingFirewall::preloaded(&["10.4.1.1"]);
    fw.set_fail_list(true);
    let source = ChannelAlertSource::new();
    let manager = manager(settings(LONG_TTL, FAST_SWEEP), fw.clone(), source);
    let handle = manager.handle();
    manager.start().await.unwrap();
    assert!(handle.snapshot_bans().is_empty());

    handle.add("10.4.1.2", false);
    assert!(wait_until(WAIT, || is_banned(&handle, "10.4.1.2")).await);

    manager.stop().await;
}

#[tokio::test]
async fn invalid_address_is_ignored() {
    let fw = RecordingFirewall::new();
    let source = ChannelAlertSource::new();
    let manager = manager(settings(LONG_TTL, FAST_SWEEP), fw.clone(), source.clone());
    let handle = manager.handle();
    manager.start().await.unwrap();

    handle.add("not-an-ip", false);
    handle.add("", true);
    source.emit("999.1.1.1").await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(handle.snapshot_bans().is_empty());
    assert!(fw.blocks.lock().is_empty());

    manager.stop().await;
}

#[tokio::test]
async fn failed_block_is_not_recorded() {
    let fw = RecordingFirewall::new();
    fw.set_fail_block(true);
    let source = ChannelAlertSource::new();
    let manager = manager(settings(LONG_TTL, FAST_SWEEP), fw.clone(), source);
    let handle = manager.handle();
    manager.start().await.unwrap();

    handle.add("10.5.0.1", false);
    assert!(wait_until(WAIT, || fw.block_calls("10.5.0.1") == 1).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!is_banned(&handle, "10.5.0.1"));

    // Block errors but the address is already enforced: the table follows the firewall.
    fw.inject("10.5.0.2");
    handle.add("10.5.0.2", false);
    assert!(wait_until(WAIT, || is_banned(&handle, "10.5.0.2")).await);

    manager.stop().await;
}

#[tokio::test]
async fn refused_delete_is_retried_by_sweep() {
    let fw = RecordingFirewall::new();
    let source = ChannelAlertSource::new();
    let manager = manager(settings(LONG_TTL, FAST_SWEEP), fw.clone(), source);
    let handle = manager.handle();
    manager.start().await.unwrap();

    handle.add("10.6.0.1", true);
    assert!(wait_until(WAIT, || is_banned(&handle, "10.6.0.1")).await);

    fw.set_fail_unblock(true);
    handle.delete("10.6.0.1");
    assert!(
        wait_until(WAIT, || handle
            .snapshot_bans()
            .iter()
            .any(|b| b.pending_unban && b.unban_failures >= 1))
        .await
    );
    assert!(fw.contains("10.6.0.1"));

    fw.set_fail_unblock(false);
    assert!(wait_until(WAIT, || !is_banned(&handle, "10.6.0.1")).await);
    assert!(!fw.contains("10.6.0.1"));
    assert!(handle
        .metrics_text()
        .unwrap()
        .lines()
        .any(|l| l.starts_with("gatewarden_unban_failures_total") && !l.ends_with(" 0")));

    manager.stop().await;
}

#[tokio::test]
async fn whitelist_is_recorded_even_if_unban_fails() {
    let fw = RecordingFirewall::new();
    let source = ChannelAlertSource::new();
    let manager = manager(settings(LONG_TTL, FAST_SWEEP), fw.clone(), source);
    let handle = manager.handle();
    manager.start().await.unwrap();

    handle.add("10.7.0.1", false);
    assert!(wait_until(WAIT, || is_banned(&handle, "10.7.0.1")).await);

    fw.set_fail_unblock(true);
    handle.add_whitelist("10.7.0.1");
    assert!(wait_until(WAIT, || handle.snapshot_whitelist().contains(&"10.7.0.1".to_string())).await);
    assert!(wait_until(WAIT, || handle.snapshot_bans().iter().any(|b| b.pending_unban)).await);

    fw.set_fail_unblock(false);
    assert!(wait_until(WAIT, || !is_banned(&handle, "10.7.0.1")).await);

    manager.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bans_attacker_from_alert_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alert_json.txt");
    std::fs::write(&path, "").unwrap();

    let fw = RecordingFirewall::new();
    let source = Arc::new(
        LogAlertSource::new(&path, 16, None)
            .with_intervals(Duration::from_millis(20), Duration::from_millis(20)),
    );
    let manager = ProtectionManager::builder()
        .settings(settings(LONG_TTL, FAST_SWEEP))
        .backend(fw.clone())
        .alert_source(source)
        .build()
        .unwrap();
    let handle = manager.handle();
    manager.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut log = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    writeln!(
        log,
        r#"{{"event_type":"flow","src_ip":"203.0.113.8","dest_ip":"192.168.1.1"}}"#
    )
    .unwrap();
    writeln!(
        log,
        r#"{{"event_type":"alert","src_ip":"203.0.113.9","dest_ip":"192.168.1.1","proto":"TCP"}}"#
    )
    .unwrap();
    log.flush().unwrap();

    assert!(wait_until(WAIT, || is_banned(&handle, "203.0.113.9")).await);
    assert!(fw.contains("203.0.113.9"));
    assert!(!is_banned(&handle, "203.0.113.8"));

    manager.stop().await;
    assert!(fw.banned().is_empty());
}

#[tokio::test]
async fn builder_rejects_incomplete_configuration() {
    let fw = RecordingFirewall::new();
    let source = ChannelAlertSource::new();

    let missing_backend = ProtectionManager::builder()
        .alert_source(source.clone())
        .build();
    assert!(matches!(missing_backend, Err(EngineError::Config(_))));

    let missing_source = ProtectionManager::builder().backend(fw.clone()).build();
    assert!(matches!(missing_source, Err(EngineError::Config(_))));

    let taken = ChannelAlertSource::new();
    let _rx = taken.channel();
    let channel_taken = ProtectionManager::builder()
        .backend(fw)
        .alert_source(taken)
        .build();
    assert!(matches!(channel_taken, Err(EngineError::Config(_))));
}

#[tokio::test]
async fn start_twice_is_rejected() {
    let manager = manager(
        ProtectionSettings::default(),
        RecordingFirewall::new(),
        ChannelAlertSource::new(),
    );
    manager.start().await.unwrap();
    assert!(matches!(manager.start().await, Err(EngineError::AlreadyStarted)));
    manager.stop().await;
}
