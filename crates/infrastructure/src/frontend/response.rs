use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA, CNAME};
use hickory_proto::rr::{Name, RData, Record, RecordType as ProtoRecordType};
use std::net::IpAddr;
use std::str::FromStr;
use warden_dns_domain::{BlockingMode, RecordType, RewriteOutcome};

/// Answer addresses for `custom_ip` mode; `default`/`null_ip` use the
/// unspecified addresses.
#[derive(Debug, Clone, Copy)]
pub struct BlockAnswers {
    pub ipv4: Option<std::net::Ipv4Addr>,
    pub ipv6: Option<std::net::Ipv6Addr>,
}

/// Start a response message mirroring the query's id, opcode, and question.
pub fn response_shell(query: &Message, rcode: ResponseCode) -> Message {
    let mut response = Message::new();
    response
        .set_id(query.id())
        .set_message_type(MessageType::Response)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(query.recursion_desired())
        .set_recursion_available(true)
        .set_response_code(rcode);
    for q in query.queries() {
        response.add_query(q.clone());
    }
    response
}

fn query_name(query: &Message) -> Option<Name> {
    query.queries().first().map(|q| q.name().clone())
}

fn address_record(name: Name, ttl: u32, ip: IpAddr) -> Record {
    match ip {
        IpAddr::V4(v4) => Record::from_rdata(name, ttl, RData::A(A(v4))),
        IpAddr::V6(v6) => Record::from_rdata(name, ttl, RData::AAAA(AAAA(v6))),
    }
}

/// Synthesize a block response per the configured blocking mode.
pub fn blocked_response(
    query: &Message,
    qtype: RecordType,
    mode: BlockingMode,
    custom: BlockAnswers,
    ttl: u32,
) -> Message {
    match mode {
        BlockingMode::Refused => response_shell(query, ResponseCode::Refused),
        BlockingMode::Nxdomain => response_shell(query, ResponseCode::NXDomain),
        BlockingMode::Default => match qtype {
            RecordType::A => answer_with_ips(query, &[IpAddr::V4(BlockingMode::NULL_IPV4)], ttl),
            RecordType::AAAA => answer_with_ips(query, &[IpAddr::V6(BlockingMode::NULL_IPV6)], ttl),
            _ => response_shell(query, ResponseCode::NXDomain),
        },
        BlockingMode::NullIp => match qtype {
            RecordType::AAAA => answer_with_ips(query, &[IpAddr::V6(BlockingMode::NULL_IPV6)], ttl),
            _ => answer_with_ips(query, &[IpAddr::V4(BlockingMode::NULL_IPV4)], ttl),
        },
        BlockingMode::CustomIp => {
            let ip = match qtype {
                RecordType::AAAA => custom
                    .ipv6
                    .map(IpAddr::V6)
                    .unwrap_or(IpAddr::V6(BlockingMode::NULL_IPV6)),
                _ => custom
                    .ipv4
                    .map(IpAddr::V4)
                    .unwrap_or(IpAddr::V4(BlockingMode::NULL_IPV4)),
            };
            answer_with_ips(query, &[ip], ttl)
        }
    }
}

/// NOERROR answer carrying the given addresses under the query name.
pub fn answer_with_ips(query: &Message, ips: &[IpAddr], ttl: u32) -> Message {
    let mut response = response_shell(query, ResponseCode::NoError);
    if let Some(name) = query_name(query) {
        for ip in ips {
            response.add_answer(address_record(name.clone(), ttl, *ip));
        }
    }
    response
}

/// Answer for a resolved static rewrite: optional CNAME plus addresses.
pub fn rewrite_response(query: &Message, outcome: &RewriteOutcome, ttl: u32) -> Message {
    let mut response = response_shell(query, ResponseCode::NoError);
    let Some(name) = query_name(query) else {
        return response;
    };

    let answer_owner = match &outcome.cname {
        Some(target) => match Name::from_str(target) {
            Ok(target_name) => {
                response.add_answer(Record::from_rdata(
                    name,
                    ttl,
                    RData::CNAME(CNAME(target_name.clone())),
                ));
                target_name
            }
            Err(_) => name,
        },
        None => name,
    };

    for ip in &outcome.answers {
        response.add_answer(address_record(answer_owner.clone(), ttl, *ip));
    }
    response
}

/// Safety-engine answer: CNAME to the engine's block host.
pub fn safety_response(query: &Message, block_host: &str, ttl: u32) -> Message {
    let mut response = response_shell(query, ResponseCode::NoError);
    if let (Some(name), Ok(target)) = (query_name(query), Name::from_str(block_host)) {
        response.add_answer(Record::from_rdata(name, ttl, RData::CNAME(CNAME(target))));
    }
    response
}

/// Take the answers resolved for `substituted` and re-own the address
/// records under the original query name (safe-search substitution).
pub fn substituted_answer(query: &Message, upstream_response: &Message, ttl: u32) -> Message {
    let mut response = response_shell(query, upstream_response.response_code());
    let Some(name) = query_name(query) else {
        return response;
    };
    for record in upstream_response.answers() {
        match record.data() {
            RData::A(_) | RData::AAAA(_) => {
                let mut owned = record.clone();
                owned.set_name(name.clone());
                owned.set_ttl(ttl.min(record.ttl()));
                response.add_answer(owned);
            }
            _ => {}
        }
    }
    response
}

/// Map a domain record type onto the wire library's.
pub fn to_proto_type(qtype: RecordType) -> ProtoRecordType {
    ProtoRecordType::from(qtype.to_u16())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::Query;

    fn query(name: &str, qtype: ProtoRecordType) -> Message {
        let mut msg = Message::new();
        msg.set_id(0x1234)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true)
            .add_query(Query::query(Name::from_str(name).unwrap(), qtype));
        msg
    }

    fn no_custom() -> BlockAnswers {
        BlockAnswers {
            ipv4: None,
            ipv6: None,
        }
    }

    #[test]
    fn test_default_mode_a_answers_null_ip() {
        let q = query("ads.example.com.", ProtoRecordType::A);
        let resp = blocked_response(&q, RecordType::A, BlockingMode::Default, no_custom(), 10);
        assert_eq!(resp.response_code(), ResponseCode::NoError);
        assert_eq!(resp.answers().len(), 1);
        assert_eq!(
            resp.answers()[0].data(),
            &RData::A(A("0.0.0.0".parse().unwrap()))
        );
    }

    #[test]
    fn test_default_mode_txt_is_nxdomain() {
        let q = query("ads.example.com.", ProtoRecordType::TXT);
        let resp = blocked_response(&q, RecordType::TXT, BlockingMode::Default, no_custom(), 10);
        assert_eq!(resp.response_code(), ResponseCode::NXDomain);
        assert!(resp.answers().is_empty());
    }

    #[test]
    fn test_nxdomain_mode() {
        let q = query("ads.example.com.", ProtoRecordType::A);
        let resp = blocked_response(&q, RecordType::A, BlockingMode::Nxdomain, no_custom(), 10);
        assert_eq!(resp.response_code(), ResponseCode::NXDomain);
        assert!(resp.answers().is_empty());
    }

    #[test]
    fn test_refused_mode() {
        let q = query("ads.example.com.", ProtoRecordType::A);
        let resp = blocked_response(&q, RecordType::A, BlockingMode::Refused, no_custom(), 10);
        assert_eq!(resp.response_code(), ResponseCode::Refused);
    }

    #[test]
    fn test_custom_ip_mode() {
        let q = query("ads.example.com.", ProtoRecordType::A);
        let custom = BlockAnswers {
            ipv4: Some("10.10.10.10".parse().unwrap()),
            ipv6: None,
        };
        let resp = blocked_response(&q, RecordType::A, BlockingMode::CustomIp, custom, 10);
        assert_eq!(
            resp.answers()[0].data(),
            &RData::A(A("10.10.10.10".parse().unwrap()))
        );
    }

    #[test]
    fn test_rewrite_with_cname_chain() {
        let q = query("alias.lan.", ProtoRecordType::A);
        let outcome = RewriteOutcome {
            cname: Some("real.lan".into()),
            answers: vec!["10.0.0.9".parse().unwrap()],
        };
        let resp = rewrite_response(&q, &outcome, 30);
        assert_eq!(resp.answers().len(), 2);
        assert!(matches!(resp.answers()[0].data(), RData::CNAME(_)));
        assert_eq!(resp.answers()[1].name().to_utf8(), "real.lan.");
    }

    #[test]
    fn test_response_shell_copies_id_and_question() {
        let q = query("x.example.", ProtoRecordType::A);
        let resp = response_shell(&q, ResponseCode::ServFail);
        assert_eq!(resp.id(), 0x1234);
        assert_eq!(resp.queries().len(), 1);
    }
}
