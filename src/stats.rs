use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::info;

use crate::error::Error;

/// Tally of exchanges in a measurement loop.
#[derive(Debug, Clone)]
pub struct ExchangeStats {
    pub ok: u64,
    pub failed: BTreeMap<&'static str, u64>,
    pub bytes: u64,
    t0: Instant,
    last: Instant,
}

impl ExchangeStats {
    pub fn new() -> Self {
        Self {
            ok: 0,
            failed: BTreeMap::new(),
            bytes: 0,
            t0: Instant::now(),
            last: Instant::now(),
        }
    }

    pub fn add_bytes(&mut self, n: usize) {
        self.bytes += n as u64;
    }

    pub fn inc_ok(&mut self) {
        self.ok += 1;
    }

    pub fn inc_failed(&mut self, err: &Error) {
        let kind = match err {
            Error::Protocol(e) => e.kind(),
            Error::Contract(_) => "contract",
            Error::Board(_) => "board",
        };
        *self.failed.entry(kind).or_default() += 1;
    }

    pub fn total_failed(&self) -> u64 {
        self.failed.values().sum()
    }

    pub fn elapsed(&self) -> Duration {
        self.t0.elapsed()
    }

    pub fn summary(&self) -> String {
        let failed = self
            .failed
            .iter()
            .map(|(k, n)| format!("{k}={n}"))
            .collect::<Vec<_>>()
            .join(" ");
        let dur = self.elapsed().as_secs_f64().max(1e-3);
        format!(
            "ok={} failed={} [{}] bytes={} over {:.1}s => {:.1} exchanges/s",
            self.ok,
            self.total_failed(),
            failed,
            self.bytes,
            dur,
            (self.ok + self.total_failed()) as f64 / dur
        )
    }

    pub fn maybe_print(&mut self, interval: f64) {
        if self.last.elapsed().as_secs_f64() >= interval {
            info!("{}", self.summary());
            self.last = Instant::now();
        }
    }
}

impl Default for ExchangeStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ContractError, ProtocolError};

    #[test]
    fn failures_grouped_by_kind() {
        let mut s = ExchangeStats::new();
        s.inc_ok();
        s.add_bytes(34);
        s.inc_failed(&ProtocolError::NoData.into());
        s.inc_failed(&ProtocolError::NoData.into());
        s.inc_failed(&ContractError::ReadLength(0).into());
        assert_eq!(s.failed.get("no_data"), Some(&2));
        assert_eq!(s.total_failed(), 3);
        let line = s.summary();
        assert!(line.starts_with("ok=1 failed=3 [contract=1 no_data=2] bytes=34"));
    }
}
