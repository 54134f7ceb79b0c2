use crate::access::AccessControl;
use crate::clients::{ArpScanner, ClientRegistry, HostsFileScanner};
use crate::enrichment::{RdnsEnricher, WhoisEnricher};
use crate::filtering::{
    matcher::ListInput, FilterEngine, FilteringSnapshot, HostSetFilter, RewriteTable, RuleMatcher,
    SafeSearch, ServiceCatalog,
};
use crate::filters::{FilterStore, KindMask, RefreshSummary};
use crate::frontend::ratelimit::RateLimiter;
use crate::querylog::QueryLogWriter;
use crate::sessions::SessionStore;
use crate::stats::StatsCounters;
use crate::upstream::UpstreamPool;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use dashmap::DashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;
use warden_dns_application::ports::{
    DnsExchanger, ExchangeResult, FilterContext, QueryLogSink,
};
use warden_dns_domain::{
    BlockingMode, Client, Config, Decision, DomainError, MatchRequest, RecordType, UpstreamSets,
    USER_FILTER_ID,
};

/// Data-plane settings snapshot, rebuilt from the config on every reload so
/// the hot path never takes the config lock.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub refuse_any: bool,
    pub ratelimit_rps: u32,
    pub blocking_mode: BlockingMode,
    pub blocking_ipv4: Option<Ipv4Addr>,
    pub blocking_ipv6: Option<Ipv6Addr>,
    pub blocked_response_ttl: u32,
    pub filtering_enabled: bool,
    pub safebrowsing_enabled: bool,
    pub parental_enabled: bool,
    pub safesearch_enabled: bool,
    pub blocked_services: Vec<Arc<str>>,
    pub upstream_timeout: Duration,
    pub edns_client_subnet: bool,
}

impl RuntimeSettings {
    fn from_config(config: &Config) -> Self {
        Self {
            refuse_any: config.dns.refuse_any,
            ratelimit_rps: config.dns.ratelimit,
            blocking_mode: config.dns.blocking_mode,
            blocking_ipv4: config.dns.blocking_ipv4,
            blocking_ipv6: config.dns.blocking_ipv6,
            blocked_response_ttl: config.dns.blocked_response_ttl,
            filtering_enabled: config.filtering.enabled,
            safebrowsing_enabled: config.filtering.safe_browsing,
            parental_enabled: config.filtering.parental,
            safesearch_enabled: config.filtering.safe_search,
            blocked_services: config
                .filtering
                .blocked_services
                .iter()
                .map(|s| Arc::from(s.as_str()))
                .collect(),
            upstream_timeout: Duration::from_secs(config.dns.upstream_timeout),
            edns_client_subnet: config.dns.edns_client_subnet,
        }
    }
}

/// Exchanger handle over the swappable pool: holders always talk to the
/// pool published most recently.
pub struct PoolExchanger {
    pool: Arc<ArcSwap<UpstreamPool>>,
}

#[async_trait]
impl DnsExchanger for PoolExchanger {
    async fn exchange(
        &self,
        query: &hickory_proto::op::Message,
        deadline: Duration,
    ) -> Result<ExchangeResult, DomainError> {
        let pool = self.pool.load_full();
        pool.exchange(query, deadline).await
    }
}

/// The composition root: every subsystem the DNS frontend and the admin
/// surface touch, wired explicitly. There is no global state; hand a
/// `Core` to whoever needs one.
pub struct Core {
    pub config: RwLock<Config>,
    pub config_path: Option<String>,
    pub settings: ArcSwap<RuntimeSettings>,
    pub engine: Arc<FilterEngine>,
    pub store: Arc<FilterStore>,
    pub pool: Arc<ArcSwap<UpstreamPool>>,
    client_pools: DashMap<String, Arc<UpstreamPool>>,
    pub registry: Arc<ClientRegistry>,
    pub access: Arc<AccessControl>,
    pub sessions: Arc<SessionStore>,
    pub querylog: Arc<dyn QueryLogSink>,
    pub stats: Arc<StatsCounters>,
    pub ratelimit: RateLimiter,
    pub rdns: RdnsEnricher,
    pub whois: WhoisEnricher,
    pub arp: Arc<ArpScanner>,
    pub hosts_scanner: Arc<HostsFileScanner>,
    pub shutdown: CancellationToken,
}

impl Core {
    pub async fn build(
        config: Config,
        config_path: Option<String>,
        shutdown: CancellationToken,
    ) -> Result<Arc<Self>, DomainError> {
        let settings = RuntimeSettings::from_config(&config);

        let sets = UpstreamSets::parse(&config.dns.upstreams)?;
        let pool = UpstreamPool::build(
            &sets,
            &config.dns.bootstrap,
            config.dns.all_servers,
            config.dns.upstream_timeout,
        )?;
        let pool = Arc::new(ArcSwap::from_pointee(pool));

        let store = Arc::new(FilterStore::new(
            config.filters_dir(),
            config.filtering.filters.clone(),
            config.filtering.user_rules.clone(),
            config.filtering.proxy_url.as_deref(),
        )?);

        let arp = Arc::new(ArpScanner::new());
        let registry = Arc::new(ClientRegistry::new(
            config.clients.clone(),
            Arc::clone(&arp) as Arc<dyn warden_dns_application::ports::LeaseTable>,
        )?);
        let hosts_scanner = Arc::new(HostsFileScanner::new(Arc::clone(&registry)));

        let access = Arc::new(AccessControl::new(&config.access));
        let sessions = Arc::new(SessionStore::open(
            &config.sessions_db_path(),
            config.session_ttl_hours,
        )?);

        let querylog: Arc<dyn QueryLogSink> = Arc::new(QueryLogWriter::start(
            config.querylog_path(),
            config.logging.query_log_enabled,
            shutdown.clone(),
        ));
        let stats = Arc::new(StatsCounters::default());

        let engine = Arc::new(FilterEngine::new(FilteringSnapshot::empty()));

        let exchanger: Arc<dyn DnsExchanger> = Arc::new(PoolExchanger {
            pool: Arc::clone(&pool),
        });
        let rdns = RdnsEnricher::start(
            Arc::clone(&exchanger),
            Arc::clone(&registry),
            shutdown.clone(),
        );
        let whois = WhoisEnricher::start(Arc::clone(&registry), shutdown.clone());

        let core = Arc::new(Self {
            ratelimit: RateLimiter::new(settings.ratelimit_rps),
            settings: ArcSwap::from_pointee(settings),
            config: RwLock::new(config),
            config_path,
            engine,
            store,
            pool,
            client_pools: DashMap::new(),
            registry,
            access,
            sessions,
            querylog,
            stats,
            rdns,
            whois,
            arp,
            hosts_scanner,
            shutdown,
        });

        core.rebuild_filtering().await;
        Ok(core)
    }

    pub fn exchanger(&self) -> Arc<dyn DnsExchanger> {
        Arc::new(PoolExchanger {
            pool: Arc::clone(&self.pool),
        })
    }

    /// Recompile the filtering snapshot from the store and config and swap
    /// it in. Never fails: unreadable bodies degrade to empty lists.
    pub async fn rebuild_filtering(&self) {
        let (rewrites, safety) = {
            let config = self.config.read().await;
            (config.filtering.rewrites.clone(), self.load_safety_sets(&config))
        };

        let mut inputs = vec![ListInput {
            list_id: USER_FILTER_ID,
            is_allowlist: false,
            text: self.store.user_rules().join("\n"),
        }];
        for list in self.store.lists() {
            if !list.enabled {
                continue;
            }
            inputs.push(ListInput {
                list_id: list.id,
                is_allowlist: matches!(list.kind, warden_dns_domain::FilterKind::Allowlist),
                text: self.store.read_body(&list),
            });
        }

        let (sb_hosts, par_hosts) = safety;
        let snapshot = FilteringSnapshot {
            matcher: RuleMatcher::compile(inputs),
            rewrites: RewriteTable::build(&rewrites),
            services: ServiceCatalog::build(),
            safe_search: SafeSearch::build(),
            safe_browsing: HostSetFilter::safe_browsing(sb_hosts),
            parental: HostSetFilter::parental(par_hosts),
        };
        self.engine.install(snapshot);
    }

    /// Safety host sets load from optional local files under `data/`; the
    /// hosted lookup services they stand in for are external collaborators.
    fn load_safety_sets(&self, config: &Config) -> (Vec<String>, Vec<String>) {
        let read = |name: &str| -> Vec<String> {
            let path = std::path::Path::new(&config.data_dir).join(name);
            std::fs::read_to_string(path)
                .map(|text| {
                    text.lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty() && !l.starts_with('#'))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };
        (read("safebrowsing_hosts.txt"), read("parental_hosts.txt"))
    }

    /// Re-parse upstreams from config and publish a fresh pool. Invalid
    /// specs fail the reload, leaving the old pool serving.
    pub async fn reload_upstreams(&self) -> Result<(), DomainError> {
        let config = self.config.read().await;
        let sets = UpstreamSets::parse(&config.dns.upstreams)?;
        let pool = UpstreamPool::build(
            &sets,
            &config.dns.bootstrap,
            config.dns.all_servers,
            config.dns.upstream_timeout,
        )?;
        self.pool.store(Arc::new(pool));
        self.client_pools.clear();
        info!("Upstream pool reloaded");
        Ok(())
    }

    /// Publish fresh runtime settings and access snapshot from config.
    pub async fn reload_runtime(&self) {
        let config = self.config.read().await;
        self.settings
            .store(Arc::new(RuntimeSettings::from_config(&config)));
        self.access.reload(&config.access);
    }

    /// Per-client upstream pool, built on first use and cached until the
    /// next upstream reload.
    pub fn client_pool(&self, client: &Client) -> Result<Arc<UpstreamPool>, DomainError> {
        if client.upstreams.is_empty() {
            return Ok(self.pool.load_full());
        }
        if let Some(pool) = self.client_pools.get(&client.name) {
            return Ok(Arc::clone(&pool));
        }
        let sets = UpstreamSets::parse(&client.upstreams)?;
        let settings = self.settings.load();
        let pool = Arc::new(UpstreamPool::build(
            &sets,
            &[],
            false,
            settings.upstream_timeout.as_secs(),
        )?);
        self.client_pools
            .insert(client.name.clone(), Arc::clone(&pool));
        Ok(pool)
    }

    /// Effective filtering context: per-client flags override global flags
    /// when the client opts out of shared settings.
    pub fn filter_context(&self, client: Option<&Client>) -> FilterContext {
        let settings = self.settings.load();
        match client {
            Some(client) if client.use_own_settings => FilterContext {
                filtering_enabled: client.filtering_enabled,
                safebrowsing_enabled: client.safebrowsing_enabled,
                parental_enabled: client.parental_enabled,
                safesearch_enabled: client.safesearch_enabled,
                blocked_services: self.effective_services(Some(client)),
            },
            _ => FilterContext {
                filtering_enabled: settings.filtering_enabled,
                safebrowsing_enabled: settings.safebrowsing_enabled,
                parental_enabled: settings.parental_enabled,
                safesearch_enabled: settings.safesearch_enabled,
                blocked_services: self.effective_services(client),
            },
        }
    }

    fn effective_services(&self, client: Option<&Client>) -> Vec<Arc<str>> {
        match client {
            Some(c) if c.use_own_blocked_services => c
                .blocked_services
                .iter()
                .map(|s| Arc::from(s.as_str()))
                .collect(),
            _ => self.settings.load().blocked_services.clone(),
        }
    }

    /// Run the filtering pipeline for a name without forwarding; the
    /// `check_host` admin operation.
    pub fn check_host(
        &self,
        name: &str,
        qtype: RecordType,
        client: Option<&Client>,
    ) -> Decision {
        let mut request = MatchRequest::new(name, qtype);
        if let Some(client) = client {
            request = request.with_tags(client.tag_arcs());
        }
        let ctx = self.filter_context(client);
        use warden_dns_application::ports::FilterEnginePort;
        self.engine.evaluate(&request, &ctx)
    }

    /// Refresh filter lists and rebuild the matcher when anything changed.
    pub async fn refresh_filters(
        &self,
        mask: KindMask,
        force: bool,
        important: bool,
    ) -> Result<RefreshSummary, DomainError> {
        let interval = {
            let config = self.config.read().await;
            config.filtering.update_interval_hours
        };
        let summary = self.store.refresh(mask, force, important, interval).await?;
        if summary.updated > 0 {
            self.rebuild_filtering().await;
        }
        self.sync_filters_to_config().await;
        Ok(summary)
    }

    /// Mirror the store's filter metadata back into the config and persist.
    pub async fn sync_filters_to_config(&self) {
        {
            let mut config = self.config.write().await;
            config.filtering.filters = self.store.lists();
            config.filtering.user_rules = self.store.user_rules();
        }
        self.save_config().await;
    }

    pub async fn save_config(&self) {
        let Some(path) = &self.config_path else {
            return;
        };
        let config = self.config.read().await;
        if let Err(e) = config.save(path) {
            tracing::error!(error = %e, "Config save failed");
        }
    }
}
