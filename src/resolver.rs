//! Hostname resolution
//!
//! Allow-list building only needs one capability: turn a hostname into its
//! IPv4 addresses. [`Resolve`] is that capability; [`SystemResolver`] goes
//! through the platform resolver and [`NameserverResolver`] talks DNS to a
//! caller-chosen server.

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, RecordType};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, warn};

use crate::error::{WgClientError, WgClientResult};

/// Per-lookup timeout used when talking to an explicit nameserver
pub const NAMESERVER_TIMEOUT: Duration = Duration::from_secs(10);

/// Port used when a nameserver address carries none
pub const DEFAULT_DNS_PORT: u16 = 53;

/// Large enough for EDNS0 sized answers
const UDP_RECV_BUFFER_SIZE: usize = 4096;

/// Capability to resolve a hostname into IPv4 addresses
///
/// An empty vector is a valid answer here; deciding whether an empty answer
/// is acceptable is up to the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Resolve: Send + Sync {
    /// Look up the A records of `hostname`
    async fn lookup_ipv4(&self, hostname: &str) -> WgClientResult<Vec<Ipv4Addr>>;
}

#[async_trait]
impl<R: Resolve + ?Sized> Resolve for Box<R> {
    async fn lookup_ipv4(&self, hostname: &str) -> WgClientResult<Vec<Ipv4Addr>> {
        (**self).lookup_ipv4(hostname).await
    }
}

/// Platform resolver (getaddrinfo), with the platform's own timeout policy
#[derive(Debug, Clone, Default)]
pub struct SystemResolver;

impl SystemResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Resolve for SystemResolver {
    async fn lookup_ipv4(&self, hostname: &str) -> WgClientResult<Vec<Ipv4Addr>> {
        debug!("Resolving {} with the system resolver", hostname);

        let addrs = tokio::net::lookup_host((hostname, 0))
            .await
            .map_err(|e| WgClientError::Resolution {
                hostname: hostname.to_string(),
                reason: e.to_string(),
            })?;

        let mut ips = Vec::new();
        for addr in addrs {
            if let IpAddr::V4(v4) = addr.ip() {
                if !ips.contains(&v4) {
                    ips.push(v4);
                }
            }
        }
        Ok(ips)
    }
}

/// Resolver that sends A queries to one specific DNS server
///
/// Queries go over UDP first and are retried over TCP when the server marks
/// the UDP answer as truncated. Each lookup is bounded by a single timeout.
#[derive(Debug, Clone)]
pub struct NameserverResolver {
    server_addr: SocketAddr,
    timeout: Duration,
}

impl NameserverResolver {
    /// Create a resolver for `address` (`ip:port`, or a bare IP for port 53)
    pub fn new(address: &str) -> WgClientResult<Self> {
        let address = address.trim();
        let server_addr = match address.parse::<SocketAddr>() {
            Ok(addr) => addr,
            Err(_) => {
                let ip = address
                    .trim_start_matches('[')
                    .trim_end_matches(']')
                    .parse::<IpAddr>()
                    .map_err(|_| {
                        WgClientError::InvalidParameter(format!(
                            "Invalid nameserver address '{}': expected ip or ip:port",
                            address
                        ))
                    })?;
                SocketAddr::new(ip, DEFAULT_DNS_PORT)
            }
        };

        Ok(Self {
            server_addr,
            timeout: NAMESERVER_TIMEOUT,
        })
    }

    /// Like [`new`](Self::new), also accepting `host` or `host:port`
    ///
    /// A host name is resolved once, here, with the system resolver; the
    /// first address returned is used for every later query.
    pub async fn from_endpoint(address: &str) -> WgClientResult<Self> {
        if let Ok(resolver) = Self::new(address) {
            return Ok(resolver);
        }

        let address = address.trim();
        let invalid = |reason: String| {
            WgClientError::InvalidParameter(format!("Invalid nameserver address '{}': {}", address, reason))
        };

        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| invalid(format!("bad port '{}'", port)))?;
                (host, port)
            }
            None => (address, DEFAULT_DNS_PORT),
        };
        if host.is_empty() {
            return Err(invalid("missing host".to_string()));
        }

        let server_addr = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| invalid(e.to_string()))?
            .next()
            .ok_or_else(|| invalid(format!("no address for {}", host)))?;
        debug!("Nameserver {} resolved to {}", address, server_addr);

        Ok(Self {
            server_addr,
            timeout: NAMESERVER_TIMEOUT,
        })
    }

    /// Override the per-lookup timeout (minimum one millisecond)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.max(Duration::from_millis(1));
        self
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn resolution_error(hostname: &str, reason: impl Into<String>) -> WgClientError {
        WgClientError::Resolution {
            hostname: hostname.to_string(),
            reason: reason.into(),
        }
    }

    async fn exchange(&self, hostname: &str, query: &Message) -> WgClientResult<Message> {
        let response = self.query_udp(hostname, query).await?;
        if !response.truncated() {
            return Ok(response);
        }
        debug!("Truncated UDP answer for {}, retrying over TCP", hostname);
        self.query_tcp(hostname, query).await
    }

    async fn query_udp(&self, hostname: &str, query: &Message) -> WgClientResult<Message> {
        let query_bytes = query
            .to_vec()
            .map_err(|e| Self::resolution_error(hostname, format!("failed to encode query: {}", e)))?;

        let bind_addr = if self.server_addr.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| Self::resolution_error(hostname, format!("failed to bind UDP socket: {}", e)))?;

        socket
            .send_to(&query_bytes, self.server_addr)
            .await
            .map_err(|e| {
                Self::resolution_error(
                    hostname,
                    format!("failed to send query to {}: {}", self.server_addr, e),
                )
            })?;

        let mut recv_buf = vec![0u8; UDP_RECV_BUFFER_SIZE];
        loop {
            let (len, src) = socket.recv_from(&mut recv_buf).await.map_err(|e| {
                Self::resolution_error(
                    hostname,
                    format!("failed to receive answer from {}: {}", self.server_addr, e),
                )
            })?;

            if src != self.server_addr {
                warn!("Ignoring DNS answer from unexpected source {}", src);
                continue;
            }

            let response = Message::from_vec(&recv_buf[..len])
                .map_err(|e| Self::resolution_error(hostname, format!("failed to parse answer: {}", e)))?;

            if response.id() != query.id() {
                warn!("Ignoring DNS answer with mismatched id {}", response.id());
                continue;
            }

            return Ok(response);
        }
    }

    async fn query_tcp(&self, hostname: &str, query: &Message) -> WgClientResult<Message> {
        let query_bytes = query
            .to_vec()
            .map_err(|e| Self::resolution_error(hostname, format!("failed to encode query: {}", e)))?;
        let len = u16::try_from(query_bytes.len())
            .map_err(|_| Self::resolution_error(hostname, "query too large for TCP framing"))?;

        let mut stream = TcpStream::connect(self.server_addr).await.map_err(|e| {
            Self::resolution_error(hostname, format!("failed to connect to {}: {}", self.server_addr, e))
        })?;

        let mut framed = Vec::with_capacity(query_bytes.len() + 2);
        framed.extend_from_slice(&len.to_be_bytes());
        framed.extend_from_slice(&query_bytes);
        stream
            .write_all(&framed)
            .await
            .map_err(|e| Self::resolution_error(hostname, format!("failed to send TCP query: {}", e)))?;

        let answer_len = stream
            .read_u16()
            .await
            .map_err(|e| Self::resolution_error(hostname, format!("failed to read TCP answer: {}", e)))?;
        let mut answer = vec![0u8; answer_len as usize];
        stream
            .read_exact(&mut answer)
            .await
            .map_err(|e| Self::resolution_error(hostname, format!("failed to read TCP answer: {}", e)))?;

        let response = Message::from_vec(&answer)
            .map_err(|e| Self::resolution_error(hostname, format!("failed to parse answer: {}", e)))?;
        if response.id() != query.id() {
            return Err(Self::resolution_error(hostname, "TCP answer id does not match query"));
        }
        Ok(response)
    }
}

/// Build a recursive A query for `hostname`
pub(crate) fn build_a_query(hostname: &str) -> WgClientResult<Message> {
    let fqdn = format!("{}.", hostname.trim_end_matches('.'));
    let name = Name::from_ascii(&fqdn).map_err(|e| WgClientError::Resolution {
        hostname: hostname.to_string(),
        reason: format!("invalid dns name: {}", e),
    })?;

    let mut message = Message::new();
    message
        .set_id(rand::random::<u16>())
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true);
    message.add_query(Query::query(name, RecordType::A));
    Ok(message)
}

/// Collect the IPv4 addresses carried by a DNS answer
pub(crate) fn addresses_from_response(hostname: &str, response: &Message) -> WgClientResult<Vec<Ipv4Addr>> {
    match response.response_code() {
        ResponseCode::NoError => {}
        ResponseCode::NXDomain => {
            return Err(WgClientError::Resolution {
                hostname: hostname.to_string(),
                reason: "no such host".to_string(),
            });
        }
        code => {
            return Err(WgClientError::Resolution {
                hostname: hostname.to_string(),
                reason: format!("server answered {}", code),
            });
        }
    }

    let mut ips = Vec::new();
    for record in response.answers() {
        if let Some(RData::A(a)) = record.data() {
            if !ips.contains(&a.0) {
                ips.push(a.0);
            }
        }
    }
    Ok(ips)
}

#[async_trait]
impl Resolve for NameserverResolver {
    async fn lookup_ipv4(&self, hostname: &str) -> WgClientResult<Vec<Ipv4Addr>> {
        // Literals answer themselves, same as the system resolver
        match hostname.parse::<IpAddr>() {
            Ok(IpAddr::V4(v4)) => return Ok(vec![v4]),
            Ok(IpAddr::V6(_)) => return Ok(Vec::new()),
            Err(_) => {}
        }

        debug!("Resolving {} via {}", hostname, self.server_addr);

        let query = build_a_query(hostname)?;
        let response = tokio::time::timeout(self.timeout, self.exchange(hostname, &query))
            .await
            .map_err(|_| {
                Self::resolution_error(
                    hostname,
                    format!("query to {} timed out after {:?}", self.server_addr, self.timeout),
                )
            })??;

        addresses_from_response(hostname, &response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::rr::rdata::{A, CNAME};
    use hickory_proto::rr::Record;
    use std::str::FromStr;

    fn answer_for(query: &Message, code: ResponseCode, ips: &[Ipv4Addr]) -> Message {
        let mut response = Message::new();
        response
            .set_id(query.id())
            .set_message_type(MessageType::Response)
            .set_op_code(OpCode::Query)
            .set_response_code(code);
        response.add_queries(query.queries().to_vec());
        let name = query.queries()[0].name().clone();
        for ip in ips {
            let octets = ip.octets();
            response.add_answer(Record::from_rdata(
                name.clone(),
                60,
                RData::A(A::new(octets[0], octets[1], octets[2], octets[3])),
            ));
        }
        response
    }

    /// Answer exactly one UDP query on a loopback socket
    async fn spawn_fake_nameserver(ips: Vec<Ipv4Addr>) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            let (len, src) = socket.recv_from(&mut buf).await.unwrap();
            let query = Message::from_vec(&buf[..len]).unwrap();
            let response = answer_for(&query, ResponseCode::NoError, &ips);
            socket.send_to(&response.to_vec().unwrap(), src).await.unwrap();
        });
        addr
    }

    #[test]
    fn test_nameserver_address_parsing() {
        let r = NameserverResolver::new("1.1.1.1:53").unwrap();
        assert_eq!(r.server_addr(), "1.1.1.1:53".parse().unwrap());
        assert_eq!(r.timeout(), NAMESERVER_TIMEOUT);

        let r = NameserverResolver::new("9.9.9.9").unwrap();
        assert_eq!(r.server_addr(), "9.9.9.9:53".parse().unwrap());

        let r = NameserverResolver::new("[2606:4700::1111]:5353").unwrap();
        assert_eq!(r.server_addr().port(), 5353);

        assert!(NameserverResolver::new("dns.example.com:53").is_err());
        assert!(NameserverResolver::new("").is_err());
    }

    #[test]
    fn test_timeout_has_floor() {
        let r = NameserverResolver::new("1.1.1.1").unwrap().with_timeout(Duration::ZERO);
        assert_eq!(r.timeout(), Duration::from_millis(1));
    }

    #[test]
    fn test_build_a_query() {
        let query = build_a_query("example.com").unwrap();
        assert!(query.recursion_desired());
        assert_eq!(query.queries().len(), 1);
        assert_eq!(query.queries()[0].query_type(), RecordType::A);
        assert_eq!(query.queries()[0].name(), &Name::from_str("example.com.").unwrap());
    }

    #[test]
    fn test_addresses_from_response() {
        let query = build_a_query("example.com").unwrap();
        let ips = [Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 1)];
        let response = answer_for(&query, ResponseCode::NoError, &ips);

        let got = addresses_from_response("example.com", &response).unwrap();
        assert_eq!(got, vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]);
    }

    #[test]
    fn test_addresses_skip_non_a_records() {
        let query = build_a_query("www.example.com").unwrap();
        let mut response = answer_for(&query, ResponseCode::NoError, &[Ipv4Addr::new(10, 1, 1, 1)]);
        response.add_answer(Record::from_rdata(
            Name::from_str("www.example.com.").unwrap(),
            60,
            RData::CNAME(CNAME(Name::from_str("example.com.").unwrap())),
        ));

        let got = addresses_from_response("www.example.com", &response).unwrap();
        assert_eq!(got, vec![Ipv4Addr::new(10, 1, 1, 1)]);
    }

    #[test]
    fn test_nxdomain_is_an_error() {
        let query = build_a_query("missing.example.com").unwrap();
        let response = answer_for(&query, ResponseCode::NXDomain, &[]);

        match addresses_from_response("missing.example.com", &response) {
            Err(WgClientError::Resolution { hostname, reason }) => {
                assert_eq!(hostname, "missing.example.com");
                assert_eq!(reason, "no such host");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_empty_answer_is_not_an_error_here() {
        let query = build_a_query("empty.example.com").unwrap();
        let response = answer_for(&query, ResponseCode::NoError, &[]);
        assert!(addresses_from_response("empty.example.com", &response).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nameserver_lookup_against_local_server() {
        let addr = spawn_fake_nameserver(vec![Ipv4Addr::new(192, 0, 2, 7)]).await;
        let resolver = NameserverResolver::new(&addr.to_string())
            .unwrap()
            .with_timeout(Duration::from_secs(5));

        let ips = resolver.lookup_ipv4("vpn.example.com").await.unwrap();
        assert_eq!(ips, vec![Ipv4Addr::new(192, 0, 2, 7)]);
    }

    #[tokio::test]
    async fn test_nameserver_lookup_times_out() {
        // Bound but never answers
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();
        let resolver = NameserverResolver::new(&addr.to_string())
            .unwrap()
            .with_timeout(Duration::from_millis(100));

        match resolver.lookup_ipv4("vpn.example.com").await {
            Err(WgClientError::Resolution { hostname, reason }) => {
                assert_eq!(hostname, "vpn.example.com");
                assert!(reason.contains("timed out"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        drop(silent);
    }

    #[tokio::test]
    async fn test_nameserver_ip_literal_needs_no_query() {
        // Bound but never answers; literals must not reach it
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();
        let resolver = NameserverResolver::new(&addr.to_string())
            .unwrap()
            .with_timeout(Duration::from_millis(200));

        let ips = resolver.lookup_ipv4("192.0.2.55").await.unwrap();
        assert_eq!(ips, vec![Ipv4Addr::new(192, 0, 2, 55)]);
        assert!(resolver.lookup_ipv4("2001:db8::1").await.unwrap().is_empty());

        let system = SystemResolver::new().lookup_ipv4("192.0.2.55").await.unwrap();
        assert_eq!(system, ips);
        drop(silent);
    }

    #[tokio::test]
    async fn test_nameserver_from_endpoint() {
        let r = NameserverResolver::from_endpoint("9.9.9.9").await.unwrap();
        assert_eq!(r.server_addr(), "9.9.9.9:53".parse().unwrap());

        let r = NameserverResolver::from_endpoint("localhost:5353").await.unwrap();
        assert!(r.server_addr().ip().is_loopback());
        assert_eq!(r.server_addr().port(), 5353);

        match NameserverResolver::from_endpoint("dns.example.com:notaport").await {
            Err(WgClientError::InvalidParameter(msg)) => assert!(msg.contains("Invalid nameserver address")),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(NameserverResolver::from_endpoint(":53").await.is_err());
    }

    #[tokio::test]
    async fn test_system_resolver_ip_literal() {
        let ips = SystemResolver::new().lookup_ipv4("127.0.0.1").await.unwrap();
        assert_eq!(ips, vec![Ipv4Addr::new(127, 0, 0, 1)]);
    }
}
