//! Ledger refresh
//!
//! Pulls the full record set and reduces it to the SUMMARY-only ledger. The
//! caller decides what to do with a failure; nothing here retries.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::adapters::{Credentials, LedgerSource};
use crate::domain::{partition_records, Ledger};
use crate::error::Result;

pub struct LedgerSync {
    source: Arc<dyn LedgerSource>,
}

impl LedgerSync {
    pub fn new(source: Arc<dyn LedgerSource>) -> Self {
        Self { source }
    }

    /// Fetch and rebuild the ledger wholesale.
    ///
    /// Fails with `Network` or `Parse`; the previously displayed ledger must be
    /// left as is by the caller in that case.
    pub async fn refresh(&self, credentials: &Credentials) -> Result<Ledger> {
        let records = self.source.fetch_records(credentials).await.map_err(|e| {
            warn!(kind = %e.kind(), "Ledger fetch failed: {}", e);
            e
        })?;

        let total = records.len();
        let partition = partition_records(records)?;
        debug!(
            total,
            summaries = partition.summaries.len(),
            details = partition.details.len(),
            "Ledger partitioned"
        );

        Ok(Ledger::from_vouchers(partition.summaries))
    }
}
