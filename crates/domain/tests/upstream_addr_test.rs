use intercept_dns_domain::{parse_listen_addr, DomainError, UpstreamAddr};
use std::net::SocketAddr;

#[test]
fn test_parse_host_only_appends_default_port() {
    let addr = UpstreamAddr::parse("192.168.1.1").unwrap();
    assert_eq!(addr.port(), 53);
    assert_eq!(addr.to_string(), "192.168.1.1:53");
}

#[test]
fn test_parse_host_and_port() {
    let addr = UpstreamAddr::parse("8.8.8.8:5353").unwrap();
    assert_eq!(addr.host(), "8.8.8.8");
    assert_eq!(addr.port(), 5353);
    assert_eq!(
        addr.socket_addr(),
        Some("8.8.8.8:5353".parse::<SocketAddr>().unwrap())
    );
}

#[test]
fn test_parse_hostname_needs_resolution() {
    let addr: UpstreamAddr = "dns.google".parse().unwrap();
    assert_eq!(addr.to_string(), "dns.google:53");
    assert!(addr.needs_resolution());
    assert!(addr.socket_addr().is_none());
}

#[test]
fn test_parse_ipv6_forms() {
    let bare = UpstreamAddr::parse("2001:4860:4860::8888").unwrap();
    assert_eq!(bare.to_string(), "[2001:4860:4860::8888]:53");

    let bracketed = UpstreamAddr::parse("[::1]").unwrap();
    assert_eq!(bracketed.to_string(), "[::1]:53");

    let with_port = UpstreamAddr::parse("[::1]:5300").unwrap();
    assert_eq!(with_port.port(), 5300);
}

#[test]
fn test_parse_rejects_garbage() {
    assert!(matches!(
        UpstreamAddr::parse("   "),
        Err(DomainError::InvalidUpstream(_))
    ));
    assert!(UpstreamAddr::parse("1.1.1.1:notaport").is_err());
    assert!(UpstreamAddr::parse("dns google:53").is_err());
    assert!(UpstreamAddr::parse("host:70000").is_err());
}

#[test]
fn test_points_at_exact_bind() {
    let addr = UpstreamAddr::parse("127.0.0.1:5353").unwrap();
    assert!(addr.points_at("127.0.0.1:5353"));
    assert!(!addr.points_at("127.0.0.1:5354"));
}

#[test]
fn test_points_at_wildcard_bind_through_loopback() {
    let default_port = UpstreamAddr::parse("127.0.0.1").unwrap();
    assert!(default_port.points_at(":53"));
    assert!(default_port.points_at("0.0.0.0:53"));

    let localhost = UpstreamAddr::parse("localhost:53").unwrap();
    assert!(localhost.points_at(":53"));
}

#[test]
fn test_points_at_ignores_other_hosts() {
    let addr = UpstreamAddr::parse("192.168.1.1").unwrap();
    assert!(!addr.points_at(":53"));
    assert!(!addr.points_at("0.0.0.0:53"));
    assert!(!addr.points_at("127.0.0.1:53"));
}

#[test]
fn test_parse_listen_addr_shorthand() {
    assert_eq!(
        parse_listen_addr(":5353").unwrap(),
        "0.0.0.0:5353".parse::<SocketAddr>().unwrap()
    );
    assert_eq!(
        parse_listen_addr("127.0.0.1:53").unwrap(),
        "127.0.0.1:53".parse::<SocketAddr>().unwrap()
    );
    assert!(matches!(
        parse_listen_addr("nope"),
        Err(DomainError::InvalidBindAddress(_))
    ));
}
