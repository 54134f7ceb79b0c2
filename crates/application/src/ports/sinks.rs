use warden_dns_domain::{QueryLogRecord, StatsTick};

/// Append-only query-log writer. Implementations must not block the data
/// plane; a full buffer drops the record.
pub trait QueryLogSink: Send + Sync {
    fn log(&self, record: QueryLogRecord);
}

/// Counter sink fed one tick per handled query.
pub trait StatsSink: Send + Sync {
    fn tick(&self, tick: StatsTick);
}
