#[path = "../common/mod.rs"]
mod common;

use common::{a_answers, a_query, build_core, spawn_mock_upstream, test_config, typed_query};
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::RecordType as ProtoRecordType;
use std::net::{IpAddr, Ipv4Addr};
use warden_dns_domain::{BlockingMode, Client, Decision, RecordType, Rewrite};
use warden_dns_infrastructure::frontend::pipeline::handle_query;

const CLIENT_IP: &str = "127.0.0.1";

fn client_ip() -> IpAddr {
    CLIENT_IP.parse().unwrap()
}

#[tokio::test]
async fn blocked_query_default_mode_answers_null_ip() {
    let tmp = tempfile::tempdir().unwrap();
    let upstream = spawn_mock_upstream("198.51.100.7".parse().unwrap()).await;

    let mut config = test_config(tmp.path(), vec![format!("127.0.0.1:{}", upstream.port())]);
    config.filtering.user_rules = vec!["||ads.example.com^".to_string()];
    let core = build_core(config).await;

    let response = handle_query(&core, a_query("ads.example.com."), client_ip(), None)
        .await
        .unwrap();

    assert_eq!(response.response_code(), ResponseCode::NoError);
    assert_eq!(a_answers(&response), vec![Ipv4Addr::UNSPECIFIED]);

    // The log reason for this decision is the blocklist hit.
    match core.check_host("ads.example.com", RecordType::A, None) {
        Decision::Block { rule, .. } => assert_eq!(rule.as_ref(), "||ads.example.com^"),
        other => panic!("expected block, got {other:?}"),
    }
}

#[tokio::test]
async fn allowlisted_subdomain_is_forwarded() {
    let tmp = tempfile::tempdir().unwrap();
    let upstream_answer: Ipv4Addr = "198.51.100.7".parse().unwrap();
    let upstream = spawn_mock_upstream(upstream_answer).await;

    let mut config = test_config(tmp.path(), vec![format!("127.0.0.1:{}", upstream.port())]);
    config.filtering.user_rules = vec![
        "||ads.example.com^".to_string(),
        "@@||ok.ads.example.com^".to_string(),
    ];
    let core = build_core(config).await;

    let response = handle_query(&core, a_query("ok.ads.example.com."), client_ip(), None)
        .await
        .unwrap();

    // The exception sent the query upstream; the mock's answer came back.
    assert_eq!(a_answers(&response), vec![upstream_answer]);
}

#[tokio::test]
async fn rewrite_answers_locally_without_upstream() {
    let tmp = tempfile::tempdir().unwrap();
    let upstream_answer: Ipv4Addr = "198.51.100.7".parse().unwrap();
    let upstream = spawn_mock_upstream(upstream_answer).await;

    let mut config = test_config(tmp.path(), vec![format!("127.0.0.1:{}", upstream.port())]);
    config.filtering.rewrites = vec![Rewrite::new("my.lan", "192.168.1.10")];
    let core = build_core(config).await;

    let response = handle_query(&core, a_query("my.lan."), client_ip(), None)
        .await
        .unwrap();

    assert_eq!(response.response_code(), ResponseCode::NoError);
    let answers = a_answers(&response);
    assert_eq!(answers, vec!["192.168.1.10".parse::<Ipv4Addr>().unwrap()]);
    assert!(!answers.contains(&upstream_answer));
}

#[tokio::test]
async fn per_client_blocked_service() {
    let tmp = tempfile::tempdir().unwrap();
    let upstream = spawn_mock_upstream("198.51.100.7".parse().unwrap()).await;

    let mut config = test_config(tmp.path(), vec![format!("127.0.0.1:{}", upstream.port())]);
    config.clients = vec![Client {
        name: "alice".into(),
        ids: vec!["127.0.0.1".into()],
        tags: vec![],
        use_own_settings: false,
        filtering_enabled: true,
        safebrowsing_enabled: false,
        parental_enabled: false,
        safesearch_enabled: false,
        upstreams: vec![],
        use_own_blocked_services: true,
        blocked_services: vec!["facebook".into()],
        whois_info: None,
    }];
    let core = build_core(config).await;

    let response = handle_query(&core, a_query("www.facebook.com."), client_ip(), None)
        .await
        .unwrap();
    assert_eq!(a_answers(&response), vec![Ipv4Addr::UNSPECIFIED]);

    let alice = core.registry.get_by_name("alice").unwrap();
    match core.check_host("www.facebook.com", RecordType::A, Some(alice.as_ref())) {
        Decision::BlockService { name, .. } => assert_eq!(name.as_ref(), "facebook"),
        other => panic!("expected service block, got {other:?}"),
    }
}

#[tokio::test]
async fn domain_reservation_routes_to_scoped_upstream() {
    let tmp = tempfile::tempdir().unwrap();
    let corp_answer: Ipv4Addr = "10.0.0.42".parse().unwrap();
    let public_answer: Ipv4Addr = "198.51.100.7".parse().unwrap();
    let corp = spawn_mock_upstream(corp_answer).await;
    let public = spawn_mock_upstream(public_answer).await;

    let config = test_config(
        tmp.path(),
        vec![
            format!("[/corp.local/]127.0.0.1:{}", corp.port()),
            format!("127.0.0.1:{}", public.port()),
        ],
    );
    let core = build_core(config).await;

    let response = handle_query(&core, a_query("host.corp.local."), client_ip(), None)
        .await
        .unwrap();
    assert_eq!(a_answers(&response), vec![corp_answer]);

    let response = handle_query(&core, a_query("example.com."), client_ip(), None)
        .await
        .unwrap();
    assert_eq!(a_answers(&response), vec![public_answer]);
}

#[tokio::test]
async fn blocking_mode_nxdomain() {
    let tmp = tempfile::tempdir().unwrap();
    let upstream = spawn_mock_upstream("198.51.100.7".parse().unwrap()).await;

    let mut config = test_config(tmp.path(), vec![format!("127.0.0.1:{}", upstream.port())]);
    config.filtering.user_rules = vec!["||blocked.example^".to_string()];
    config.dns.blocking_mode = BlockingMode::Nxdomain;
    let core = build_core(config).await;

    let response = handle_query(&core, a_query("blocked.example."), client_ip(), None)
        .await
        .unwrap();
    assert_eq!(response.response_code(), ResponseCode::NXDomain);
    assert!(response.answers().is_empty());
}

#[tokio::test]
async fn blocking_mode_null_ip_is_noerror() {
    let tmp = tempfile::tempdir().unwrap();
    let upstream = spawn_mock_upstream("198.51.100.7".parse().unwrap()).await;

    let mut config = test_config(tmp.path(), vec![format!("127.0.0.1:{}", upstream.port())]);
    config.filtering.user_rules = vec!["||blocked.example^".to_string()];
    config.dns.blocking_mode = BlockingMode::NullIp;
    let core = build_core(config).await;

    let response = handle_query(&core, a_query("blocked.example."), client_ip(), None)
        .await
        .unwrap();
    assert_eq!(response.response_code(), ResponseCode::NoError);
    assert_eq!(a_answers(&response), vec![Ipv4Addr::UNSPECIFIED]);
}

#[tokio::test]
async fn refused_any_queries() {
    let tmp = tempfile::tempdir().unwrap();
    let upstream = spawn_mock_upstream("198.51.100.7".parse().unwrap()).await;

    let config = test_config(tmp.path(), vec![format!("127.0.0.1:{}", upstream.port())]);
    let core = build_core(config).await;

    let response = handle_query(
        &core,
        typed_query("example.com.", ProtoRecordType::ANY),
        client_ip(),
        None,
    )
    .await
    .unwrap();
    assert_eq!(response.response_code(), ResponseCode::Refused);
}

#[tokio::test]
async fn access_list_refuses_disallowed_client() {
    let tmp = tempfile::tempdir().unwrap();
    let upstream = spawn_mock_upstream("198.51.100.7".parse().unwrap()).await;

    let mut config = test_config(tmp.path(), vec![format!("127.0.0.1:{}", upstream.port())]);
    config.access.disallowed_clients = vec!["127.0.0.1".to_string()];
    let core = build_core(config).await;

    let response = handle_query(&core, a_query("example.com."), client_ip(), None)
        .await
        .unwrap();
    assert_eq!(response.response_code(), ResponseCode::Refused);
}

#[tokio::test]
async fn upstream_failure_surfaces_servfail() {
    let tmp = tempfile::tempdir().unwrap();
    // Port 1 on loopback: nothing answers, the exchange times out.
    let mut config = test_config(tmp.path(), vec!["127.0.0.1:1".to_string()]);
    config.dns.upstream_timeout = 1;
    let core = build_core(config).await;

    let response = handle_query(&core, a_query("example.com."), client_ip(), None)
        .await
        .unwrap();
    assert_eq!(response.response_code(), ResponseCode::ServFail);
}
