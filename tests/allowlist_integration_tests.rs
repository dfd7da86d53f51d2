//! Allow-list building against the sample registry

use async_trait::async_trait;
use libwgclient::*;
use std::collections::HashMap;
use std::future::pending;
use std::net::Ipv4Addr;
use std::time::Duration;

const REGISTRY: &[u8] = include_bytes!("testdata/config.json");

/// Fixed answers for the names in the sample registry
struct FixedResolver {
    answers: HashMap<&'static str, Vec<Ipv4Addr>>,
}

impl FixedResolver {
    fn sample() -> Self {
        let mut answers = HashMap::new();
        answers.insert("one.one.one.one", vec![Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(1, 0, 0, 1)]);
        answers.insert("dns.google", vec![Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(8, 8, 4, 4)]);
        Self { answers }
    }
}

#[async_trait]
impl Resolve for FixedResolver {
    async fn lookup_ipv4(&self, hostname: &str) -> WgClientResult<Vec<Ipv4Addr>> {
        self.answers.get(hostname).cloned().ok_or_else(|| WgClientError::Resolution {
            hostname: hostname.to_string(),
            reason: "no such host".to_string(),
        })
    }
}

#[tokio::test]
async fn test_update_allowed_ips() {
    let mut registry = Registry::from_json(REGISTRY).unwrap();
    let builder = AllowlistBuilder::new(FixedResolver::sample());

    registry.update_allowed_ips(&builder, pending(), None).await.unwrap();
    assert_eq!(
        registry.allowed_ips,
        vec![
            "1.0.0.1/32",
            "1.1.1.1/32",
            "10.8.0.0/24",
            "192.168.10.0/24",
            "8.8.4.4/32",
            "8.8.8.8/32",
        ]
    );

    // Running it again on its own output changes nothing
    let before = registry.allowed_ips.clone();
    registry.update_allowed_ips(&builder, pending(), None).await.unwrap();
    assert_eq!(registry.allowed_ips, before);
}

#[tokio::test]
async fn test_failed_update_keeps_allowed_ips() {
    let mut registry = Registry::from_json(REGISTRY).unwrap();
    registry.dns_names.push("unknown.example.com".to_string());
    let original = registry.allowed_ips.clone();

    let builder = AllowlistBuilder::new(FixedResolver::sample());
    let result = registry.update_allowed_ips(&builder, pending(), None).await;

    match result {
        Err(WgClientError::Resolution { hostname, .. }) => assert_eq!(hostname, "unknown.example.com"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(registry.allowed_ips, original);
}

#[tokio::test]
async fn test_resolved_allowed_ips_rendered() {
    let mut registry = Registry::from_json(REGISTRY).unwrap();
    registry
        .update_allowed_ips(&AllowlistBuilder::new(FixedResolver::sample()), pending(), None)
        .await
        .unwrap();

    let (key, user) = registry.users.find_by_name("one").unwrap();
    let ctx = TemplateContext::for_client(&registry, key, user, &ClientConfig::new(0)).unwrap();
    let rendered = render_client_config(&ctx);

    assert!(rendered.ends_with(
        "AllowedIPs = 1.0.0.1/32, 1.1.1.1/32, 10.8.0.0/24, 192.168.10.0/24, 8.8.4.4/32, 8.8.8.8/32\n"
    ));
}

/// Never answers
struct SilentResolver;

#[async_trait]
impl Resolve for SilentResolver {
    async fn lookup_ipv4(&self, _hostname: &str) -> WgClientResult<Vec<Ipv4Addr>> {
        pending().await
    }
}

#[tokio::test]
async fn test_update_deadline_keeps_allowed_ips() {
    let mut registry = Registry::from_json(REGISTRY).unwrap();
    let original = registry.allowed_ips.clone();

    let result = registry
        .update_allowed_ips(&AllowlistBuilder::new(SilentResolver), pending(), Some(Duration::from_millis(50)))
        .await;

    assert!(matches!(result, Err(WgClientError::Timeout(_))));
    assert_eq!(registry.allowed_ips, original);
}

#[tokio::test]
async fn test_update_cancelled_keeps_allowed_ips() {
    let mut registry = Registry::from_json(REGISTRY).unwrap();
    let original = registry.allowed_ips.clone();

    let result = registry
        .update_allowed_ips(&AllowlistBuilder::new(SilentResolver), std::future::ready(()), None)
        .await;

    assert!(matches!(result, Err(WgClientError::Cancelled(_))));
    assert_eq!(registry.allowed_ips, original);
}
