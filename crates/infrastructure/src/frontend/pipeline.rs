use super::ecs::add_client_subnet;
use super::response::{
    blocked_response, response_shell, rewrite_response, safety_response, substituted_answer,
    to_proto_type, BlockAnswers,
};
use crate::core::Core;
use hickory_proto::op::{Message, Query, ResponseCode};
use hickory_proto::rr::Name;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use warden_dns_application::ports::FilterEnginePort;
use warden_dns_domain::{
    Decision, FilterReason, MatchRequest, QueryLogRecord, RecordType, StatsTick,
};

use crate::access::AccessVerdict;

/// TTL used for safe-search and safety-engine substitutions.
const SUBSTITUTION_TTL: u32 = 300;

/// The full request pipeline for one parsed query.
///
/// Returns None when the query is dropped (rate limit) so the listener
/// sends nothing back — refusing would amplify.
pub async fn handle_query(
    core: &Core,
    query: Message,
    src_ip: IpAddr,
    client_id: Option<&str>,
) -> Option<Message> {
    let started = Instant::now();
    let settings = core.settings.load_full();

    if !core.ratelimit.allow(src_ip) {
        debug!(client = %src_ip, "Rate limit exceeded; dropping query");
        return None;
    }

    let Some(question) = query.queries().first().cloned() else {
        return Some(response_shell(&query, ResponseCode::FormErr));
    };
    let name = question
        .name()
        .to_utf8()
        .trim_end_matches('.')
        .to_ascii_lowercase();
    let qtype = RecordType::from_u16(u16::from(question.query_type()));

    let mut log = LogBuilder::new(src_ip, client_id, &name, qtype);

    // ANY queries are refused outright when configured.
    if settings.refuse_any && qtype == RecordType::ANY {
        let response = response_shell(&query, ResponseCode::Refused);
        log.finish(core, &response, started);
        return Some(response);
    }

    // Access list.
    let custom = BlockAnswers {
        ipv4: settings.blocking_ipv4,
        ipv6: settings.blocking_ipv6,
    };
    match core.access.check(src_ip, client_id, &name) {
        AccessVerdict::Allow => {}
        AccessVerdict::RefuseClient => {
            let response = response_shell(&query, ResponseCode::Refused);
            log.reason = FilterReason::FilteredAccessBlocked;
            log.finish(core, &response, started);
            return Some(response);
        }
        AccessVerdict::BlockHost => {
            let response = blocked_response(
                &query,
                qtype,
                settings.blocking_mode,
                custom,
                settings.blocked_response_ttl,
            );
            log.reason = FilterReason::FilteredAccessBlocked;
            log.finish(core, &response, started);
            return Some(response);
        }
    }

    // Client lookup and enrichment kicks.
    let client = core.registry.find(src_ip, client_id);
    core.rdns.begin(src_ip);
    core.whois.begin(src_ip);

    let ctx = core.filter_context(client.as_deref());
    let mut request = MatchRequest::new(name.as_str(), qtype);
    if let Some(client) = &client {
        request = request.with_tags(client.tag_arcs());
    }

    let decision = core.engine.evaluate(&request, &ctx);

    let response = match decision {
        Decision::Block { rule, list_id } => {
            log.reason = FilterReason::FilteredBlackList;
            log.rule = Some(rule);
            log.list_id = Some(list_id);
            blocked_response(
                &query,
                qtype,
                settings.blocking_mode,
                custom,
                settings.blocked_response_ttl,
            )
        }
        Decision::BlockService { name: service, rule } => {
            log.reason = FilterReason::FilteredBlockedService;
            log.service_name = Some(service);
            log.rule = Some(rule);
            blocked_response(
                &query,
                qtype,
                settings.blocking_mode,
                custom,
                settings.blocked_response_ttl,
            )
        }
        Decision::Rewrite(outcome) => {
            log.reason = FilterReason::Rewritten;
            if outcome.answers.is_empty() {
                if let Some(target) = outcome.cname.clone() {
                    // The chain ends at a name only upstream can resolve.
                    match forward_for_name(core, &query, &target, qtype, src_ip, &settings, &mut log)
                        .await
                    {
                        Some(upstream_response) => {
                            // CNAME chain first, then the upstream's answers
                            // (already owned by the target name).
                            let mut response = rewrite_response(&query, &outcome, SUBSTITUTION_TTL);
                            for record in upstream_response.answers() {
                                response.add_answer(record.clone());
                            }
                            response
                        }
                        None => response_shell(&query, ResponseCode::ServFail),
                    }
                } else {
                    rewrite_response(&query, &outcome, settings.blocked_response_ttl)
                }
            } else {
                rewrite_response(&query, &outcome, settings.blocked_response_ttl)
            }
        }
        Decision::Allow { rule, list_id } => {
            log.reason = FilterReason::NotFilteredWhiteList;
            log.rule = Some(rule);
            log.list_id = Some(list_id);
            forward(core, &query, client.as_deref(), src_ip, &settings, &mut log).await
        }
        Decision::Pass => {
            // Safety engines rewrite the answer for flagged names.
            if let Some(hit) = core.engine.safety_check(&name, &ctx) {
                log.reason = hit.reason;
                safety_response(&query, hit.block_host, SUBSTITUTION_TTL)
            } else if let Some(safe_host) = core.engine.safe_search_host(&name, &ctx) {
                log.reason = FilterReason::FilteredSafeSearch;
                match forward_for_name(core, &query, safe_host, qtype, src_ip, &settings, &mut log)
                    .await
                {
                    Some(upstream_response) => {
                        substituted_answer(&query, &upstream_response, SUBSTITUTION_TTL)
                    }
                    None => response_shell(&query, ResponseCode::ServFail),
                }
            } else {
                forward(core, &query, client.as_deref(), src_ip, &settings, &mut log).await
            }
        }
    };

    log.finish(core, &response, started);
    Some(response)
}

/// Forward the query through the client's pool (or the default) and return
/// the upstream response, degrading to SERVFAIL on aggregate failure.
async fn forward(
    core: &Core,
    query: &Message,
    client: Option<&warden_dns_domain::Client>,
    src_ip: IpAddr,
    settings: &crate::core::RuntimeSettings,
    log: &mut LogBuilder,
) -> Message {
    let pool = match client {
        Some(client) => match core.client_pool(client) {
            Ok(pool) => pool,
            Err(e) => {
                log.error = Some(e.to_string());
                return response_shell(query, ResponseCode::ServFail);
            }
        },
        None => core.pool.load_full(),
    };

    let mut outbound = query.clone();
    if settings.edns_client_subnet && crate::enrichment::is_public_ip(src_ip) {
        add_client_subnet(&mut outbound, src_ip);
    }

    match pool.exchange(&outbound, settings.upstream_timeout).await {
        Ok(result) => {
            log.upstream = Some(result.upstream);
            log.upstream_us = Some(result.elapsed.as_micros() as u64);
            result.response
        }
        Err(e) => {
            log.error = Some(e.to_string());
            response_shell(query, ResponseCode::ServFail)
        }
    }
}

/// Forward a query for a substituted name (safe-search host or rewrite
/// CNAME target) through the default pool.
async fn forward_for_name(
    core: &Core,
    query: &Message,
    name: &str,
    qtype: RecordType,
    src_ip: IpAddr,
    settings: &crate::core::RuntimeSettings,
    log: &mut LogBuilder,
) -> Option<Message> {
    let target = Name::from_str(name).ok()?;
    let mut substituted = query.clone();
    substituted.take_queries();
    substituted.add_query(Query::query(target, to_proto_type(qtype)));

    if settings.edns_client_subnet && crate::enrichment::is_public_ip(src_ip) {
        add_client_subnet(&mut substituted, src_ip);
    }

    let pool = core.pool.load_full();
    match pool.exchange(&substituted, settings.upstream_timeout).await {
        Ok(result) => {
            log.upstream = Some(result.upstream);
            log.upstream_us = Some(result.elapsed.as_micros() as u64);
            Some(result.response)
        }
        Err(e) => {
            log.error = Some(e.to_string());
            None
        }
    }
}

struct LogBuilder {
    client: IpAddr,
    client_id: Option<Arc<str>>,
    query: String,
    qtype: RecordType,
    reason: FilterReason,
    rule: Option<Arc<str>>,
    list_id: Option<i64>,
    service_name: Option<Arc<str>>,
    upstream: Option<Arc<str>>,
    upstream_us: Option<u64>,
    error: Option<String>,
}

impl LogBuilder {
    fn new(client: IpAddr, client_id: Option<&str>, name: &str, qtype: RecordType) -> Self {
        Self {
            client,
            client_id: client_id.map(Arc::from),
            query: name.to_string(),
            qtype,
            reason: FilterReason::NotFilteredNotFound,
            rule: None,
            list_id: None,
            service_name: None,
            upstream: None,
            upstream_us: None,
            error: None,
        }
    }

    fn finish(&mut self, core: &Core, response: &Message, started: Instant) {
        let record = QueryLogRecord {
            ts: chrono::Utc::now().timestamp_millis(),
            client: self.client,
            client_id: self.client_id.clone(),
            query: self.query.clone(),
            qtype: self.qtype,
            response: response.response_code().to_string(),
            reason: self.reason,
            rule: self.rule.clone(),
            list_id: self.list_id,
            service_name: self.service_name.clone(),
            upstream: self.upstream.clone(),
            elapsed_us: started.elapsed().as_micros() as u64,
            error: self.error.clone(),
        };
        core.querylog.log(record);

        use warden_dns_application::ports::StatsSink;
        core.stats.tick(StatsTick {
            filtered: self.reason.is_filtered(),
            safebrowsing: self.reason == FilterReason::FilteredSafeBrowsing,
            parental: self.reason == FilterReason::FilteredParental,
            service: self.reason == FilterReason::FilteredBlockedService,
            upstream_us: self.upstream_us,
        });
    }
}
