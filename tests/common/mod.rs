use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use warden_dns_domain::Config;
use warden_dns_infrastructure::Core;

/// Spawn a mock plain-DNS upstream on a loopback port that answers every A
/// query with `answer`.
pub async fn spawn_mock_upstream(answer: Ipv4Addr) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 1500];
        loop {
            let Ok((n, peer)) = socket.recv_from(&mut buf).await else {
                break;
            };
            let Ok(query) = Message::from_vec(&buf[..n]) else {
                continue;
            };

            let mut response = Message::new();
            response
                .set_id(query.id())
                .set_message_type(MessageType::Response)
                .set_op_code(OpCode::Query)
                .set_recursion_desired(true)
                .set_recursion_available(true)
                .set_response_code(ResponseCode::NoError);

            for q in query.queries() {
                response.add_query(q.clone());
                if q.query_type() == RecordType::A {
                    response.add_answer(Record::from_rdata(
                        q.name().clone(),
                        60,
                        RData::A(A(answer)),
                    ));
                }
            }

            if let Ok(bytes) = response.to_vec() {
                let _ = socket.send_to(&bytes, peer).await;
            }
        }
    });

    addr
}

/// A config wired to a temp data dir, no query log file, and the given
/// upstream spec lines.
pub fn test_config(data_dir: &std::path::Path, upstreams: Vec<String>) -> Config {
    let mut config = Config::default();
    config.data_dir = data_dir.to_str().unwrap().to_string();
    config.dns.upstreams = upstreams;
    config.dns.bootstrap = vec![];
    config.dns.ratelimit = 0;
    config.logging.query_log_enabled = false;
    config
}

pub async fn build_core(config: Config) -> Arc<Core> {
    Core::build(config, None, CancellationToken::new())
        .await
        .unwrap()
}

pub fn a_query(name: &str) -> Message {
    typed_query(name, RecordType::A)
}

pub fn typed_query(name: &str, rtype: RecordType) -> Message {
    let mut message = Message::new();
    message
        .set_id(0x4242)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(Name::from_str(name).unwrap(), rtype));
    message
}

/// All IPv4 answers in a response.
pub fn a_answers(response: &Message) -> Vec<Ipv4Addr> {
    response
        .answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(a.0),
            _ => None,
        })
        .collect()
}
