//! Shared helpers for the HTTP integration tests

#![allow(dead_code)] // Each test binary uses a different subset

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Request, StatusCode},
};
use dns_api::{
    DNSPacket, LookupService,
    dns::{
        common::labels_from_name,
        constants::DNSRcode,
        enums::{DNSResourceClass, DNSResourceType},
        resource::{DNSResource, RData, Soa},
    },
    http_server::AppState,
    rate_limiter::{MemoryCounterStore, RateLimitConfig, RateLimiter},
    resolv_conf::NameserverSet,
    stats::ServiceStats,
    transport::UdpExchange,
};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tower::ServiceExt;

pub const SPF: &str = "v=spf1 include:_spf.example.net ~all";

fn record(name: &str, rtype: DNSResourceType, ttl: u32, rdata: RData) -> DNSResource {
    DNSResource {
        labels: labels_from_name(name).unwrap(),
        rtype,
        rclass: DNSResourceClass::IN,
        ttl,
        rdata,
    }
}

/// Answers for the fixture zone. `None` means the name does not exist.
pub fn fixture_answers(name: &str, qtype: DNSResourceType) -> Option<Vec<DNSResource>> {
    match name {
        "steve.fi." => Some(match qtype {
            DNSResourceType::A => vec![record(
                name,
                qtype,
                300,
                RData::A(Ipv4Addr::new(176, 9, 183, 100)),
            )],
            DNSResourceType::TXT => vec![record(
                name,
                qtype,
                3600,
                RData::TXT(vec![SPF.to_string(), "ignored second chunk".to_string()]),
            )],
            DNSResourceType::MX => vec![record(
                name,
                qtype,
                3600,
                RData::MX {
                    preference: 10,
                    exchange: labels_from_name("mail.steve.fi").unwrap(),
                },
            )],
            DNSResourceType::SOA => vec![record(
                name,
                qtype,
                3600,
                RData::SOA(Soa {
                    mname: labels_from_name("ns1.steve.fi").unwrap(),
                    rname: labels_from_name("hostmaster.steve.fi").unwrap(),
                    serial: 2024010101,
                    refresh: 7200,
                    retry: 900,
                    expire: 1209600,
                    minimum: 300,
                }),
            )],
            _ => Vec::new(),
        }),
        "www.steve.fi." => Some(vec![record(
            name,
            DNSResourceType::CNAME,
            60,
            RData::CNAME(labels_from_name("steve.fi").unwrap()),
        )]),
        _ => None,
    }
}

/// A UDP nameserver serving the fixture zone
pub struct FakeNameserver {
    pub addr: SocketAddr,
    queries: Arc<AtomicUsize>,
}

impl FakeNameserver {
    pub async fn spawn() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let queries = Arc::new(AtomicUsize::new(0));

        let counter = queries.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            loop {
                let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                    break;
                };
                let Ok(query) = DNSPacket::parse(&buf[..len]) else {
                    continue;
                };
                counter.fetch_add(1, Ordering::SeqCst);

                let question = &query.questions[0];
                let reply = match fixture_answers(&question.name(), question.qtype) {
                    Some(answers) => {
                        let mut reply = query.response(DNSRcode::NOERROR);
                        reply.answers = answers;
                        reply
                    }
                    None => query.response(DNSRcode::NXDOMAIN),
                };
                let _ = socket.send_to(&reply.serialize().unwrap(), peer).await;
            }
        });

        Self { addr, queries }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn lookup_service(&self) -> Arc<LookupService> {
        Arc::new(LookupService::new(
            Arc::new(UdpExchange::new(Duration::from_secs(2))),
            NameserverSet::from_servers(vec![self.addr]),
        ))
    }
}

pub fn memory_rate_limiter(hourly_limit: u32) -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(
        Arc::new(MemoryCounterStore::new()),
        RateLimitConfig {
            hourly_limit,
            ..Default::default()
        },
    ))
}

pub fn app_state(
    nameserver: &FakeNameserver,
    rate_limiter: Option<Arc<RateLimiter>>,
) -> AppState {
    AppState::new(
        nameserver.lookup_service(),
        rate_limiter,
        Arc::new(ServiceStats::new().unwrap()),
    )
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// Send one GET through the router, as if from `peer`
pub async fn get_from(
    app: &Router,
    uri: &str,
    peer: SocketAddr,
    forwarded_for: Option<&str>,
) -> TestResponse {
    let mut builder = Request::builder().uri(uri).header("host", "dns.test");
    if let Some(forwarded) = forwarded_for {
        builder = builder.header("x-forwarded-for", forwarded);
    }
    let mut request = builder.body(Body::empty()).unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    TestResponse {
        status,
        headers,
        body: String::from_utf8_lossy(&bytes).to_string(),
    }
}

pub async fn get(app: &Router, uri: &str) -> TestResponse {
    get_from(app, uri, "192.0.2.10:50000".parse().unwrap(), None).await
}
