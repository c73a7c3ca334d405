//! Contract tests for the testable properties and scenarios in §8.

mod common;

use common::{
    ConflictingProviderClient, FixedPublicIpSource, FlakyRateLimitedProviderClient,
    MockProviderClient,
};
use dnscompanion_core::{
    DesiredRecord, DesiredSource, DnsRecord, EventBus, ProviderRegistration, ProviderRouter,
    RecordExtras, RecordType, Reconciler,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

fn desired_a(name: &str, content: &str) -> DesiredRecord {
    DesiredRecord {
        provider_id: String::new(),
        record_type: RecordType::A,
        name: name.to_string(),
        content: content.to_string(),
        ttl: 300,
        extras: RecordExtras::default(),
        proxied: Some(false),
        source: DesiredSource::Direct,
        needs_public_ipv4: false,
        needs_public_ipv6: false,
    }
}

#[tokio::test]
async fn s2_first_pass_creates_one_record() {
    let provider = Arc::new(MockProviderClient::new("cf", "example.com"));
    let ip = FixedPublicIpSource {
        v4: Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))),
        v6: None,
    };
    let reconciler = Reconciler::new(1, 3, Arc::new(EventBus::new()));

    let (stats, _) = reconciler
        .run(provider.clone(), vec![desired_a("a.example.com", "10.0.0.1")], &ip)
        .await;

    assert_eq!(stats.created, 1);
    assert_eq!(stats.updated, 0);
    assert_eq!(provider.create_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invariant_1_idempotence_second_pass_is_a_no_op() {
    let provider = Arc::new(MockProviderClient::new("cf", "example.com"));
    let ip = FixedPublicIpSource {
        v4: Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))),
        v6: None,
    };
    let reconciler = Reconciler::new(1, 3, Arc::new(EventBus::new()));

    let desired = vec![desired_a("a.example.com", "10.0.0.1")];
    let (first, _) = reconciler.run(provider.clone(), desired.clone(), &ip).await;
    assert_eq!(first.created, 1);

    let (second, _) = reconciler.run(provider.clone(), desired, &ip).await;
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.unchanged, 1);
}

#[tokio::test]
async fn s6_trailing_dot_on_existing_cname_is_unchanged() {
    let provider = Arc::new(MockProviderClient::new("cf", "example.com"));
    provider
        .create(&DesiredRecord {
            provider_id: "cf".to_string(),
            record_type: RecordType::Cname,
            name: "x.example.com".to_string(),
            content: "target.example.com.".to_string(),
            ttl: 300,
            extras: RecordExtras::default(),
            proxied: None,
            source: DesiredSource::Direct,
            needs_public_ipv4: false,
            needs_public_ipv6: false,
        })
        .await
        .unwrap();
    provider.create_calls.store(0, std::sync::atomic::Ordering::SeqCst);

    let ip = FixedPublicIpSource { v4: None, v6: None };
    let reconciler = Reconciler::new(1, 3, Arc::new(EventBus::new()));

    let desired = DesiredRecord {
        provider_id: "cf".to_string(),
        record_type: RecordType::Cname,
        name: "x.example.com".to_string(),
        content: "target.example.com".to_string(),
        ttl: 300,
        extras: RecordExtras::default(),
        proxied: None,
        source: DesiredSource::Direct,
        needs_public_ipv4: false,
        needs_public_ipv6: false,
    };
    let (stats, _) = reconciler.run(provider.clone(), vec![desired], &ip).await;

    assert_eq!(stats.unchanged, 1);
    assert_eq!(stats.updated, 0);
    assert_eq!(provider.update_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[test]
fn s5_multi_provider_longest_suffix_routing() {
    let router = ProviderRouter::new(vec![
        ProviderRegistration {
            id: "home".to_string(),
            display_name: "Home".to_string(),
            provider_type: "cloudflare".to_string(),
            credentials: Default::default(),
            zone: "home.lab".to_string(),
            zone_id: None,
            default: false,
        },
        ProviderRegistration {
            id: "main".to_string(),
            display_name: "Main".to_string(),
            provider_type: "cloudflare".to_string(),
            credentials: Default::default(),
            zone: "example.com".to_string(),
            zone_id: None,
            default: true,
        },
    ]);

    assert_eq!(router.route("svc.home.lab").unwrap().id, "home");
    assert_eq!(router.route("svc.example.com").unwrap().id, "main");
    assert_eq!(router.route("svc.other.net").unwrap().id, "main");
}

#[tokio::test]
async fn s7_create_conflict_is_reread_and_counted_unchanged() {
    let existing = DnsRecord {
        external_id: Some("existing-1".to_string()),
        provider_id: "conflicting".to_string(),
        record_type: RecordType::A,
        name: "a.example.com".to_string(),
        content: "10.0.0.1".to_string(),
        ttl: 300,
        extras: RecordExtras::default(),
        proxied: None,
        owned: true,
    };
    let provider = Arc::new(ConflictingProviderClient::new("example.com", existing));
    let ip = FixedPublicIpSource { v4: None, v6: None };
    let reconciler = Reconciler::new(1, 3, Arc::new(EventBus::new()));

    let (stats, outcomes) = reconciler
        .run(provider.clone(), vec![desired_a("a.example.com", "10.0.0.1")], &ip)
        .await;

    assert_eq!(stats.created, 0);
    assert_eq!(stats.unchanged, 1);
    assert_eq!(stats.errors, 0);
    assert_eq!(outcomes.len(), 1);
}

#[tokio::test]
async fn rate_limited_create_is_retried_after_honoring_retry_after() {
    let provider = Arc::new(FlakyRateLimitedProviderClient::new(
        "example.com",
        1,
        std::time::Duration::from_millis(10),
    ));
    let ip = FixedPublicIpSource { v4: None, v6: None };
    let reconciler = Reconciler::new(1, 3, Arc::new(EventBus::new()));

    let (stats, outcomes) = reconciler
        .run(provider.clone(), vec![desired_a("a.example.com", "10.0.0.1")], &ip)
        .await;

    assert_eq!(stats.created, 1);
    assert_eq!(stats.errors, 0);
    assert_eq!(provider.attempts.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert_eq!(outcomes.len(), 1);
}

#[tokio::test]
async fn no_public_ip_yields_per_record_error_not_a_panic() {
    let provider = Arc::new(MockProviderClient::new("cf", "example.com"));
    let ip = FixedPublicIpSource { v4: None, v6: None };
    let reconciler = Reconciler::new(1, 3, Arc::new(EventBus::new()));

    let mut record = desired_a("a.example.com", "");
    record.needs_public_ipv4 = true;
    record.content = String::new();

    let (stats, outcomes) = reconciler.run(provider.clone(), vec![record], &ip).await;
    assert_eq!(stats.errors, 1);
    assert_eq!(outcomes.len(), 1);
}
