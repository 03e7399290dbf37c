use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Result, VoucherError};

/// Discriminator carried by every record in the ledger table.
///
/// A voucher is stored as one `SUMMARY` record plus any number of per-line
/// detail records sharing the same voucher id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecordType {
    Summary,
    LineItem,
    Other(String),
}

impl RecordType {
    pub fn as_str(&self) -> &str {
        match self {
            RecordType::Summary => "SUMMARY",
            RecordType::LineItem => "LINE_ITEM",
            RecordType::Other(raw) => raw,
        }
    }

    pub fn is_summary(&self) -> bool {
        matches!(self, RecordType::Summary)
    }
}

impl From<String> for RecordType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "SUMMARY" => RecordType::Summary,
            "LINE_ITEM" => RecordType::LineItem,
            _ => RecordType::Other(raw),
        }
    }
}

impl From<RecordType> for String {
    fn from(kind: RecordType) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// E-way bill compliance flag. Anything other than `REQUIRED` reads as not required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EWayBill {
    Required,
    #[default]
    NotRequired,
}

impl EWayBill {
    pub fn is_required(&self) -> bool {
        matches!(self, EWayBill::Required)
    }
}

impl From<String> for EWayBill {
    fn from(raw: String) -> Self {
        if raw == "REQUIRED" {
            EWayBill::Required
        } else {
            EWayBill::NotRequired
        }
    }
}

impl From<EWayBill> for String {
    fn from(flag: EWayBill) -> Self {
        match flag {
            EWayBill::Required => "REQUIRED".to_string(),
            EWayBill::NotRequired => "NOT_REQUIRED".to_string(),
        }
    }
}

/// Invoice-level aggregate row shown in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoucherSummary {
    pub voucher_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub vendor_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_amount: Decimal,
    #[serde(default, deserialize_with = "null_as_default")]
    pub e_way_bill: EWayBill,
    pub record_type: RecordType,
}

/// Missing and explicit `null` both read as the field's default
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Ordered SUMMARY-only view of the remote record set, in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    vouchers: Vec<VoucherSummary>,
}

/// Aggregate figures for the dashboard header
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LedgerTotals {
    pub voucher_count: usize,
    pub e_way_bill_required: usize,
    pub total_amount: Decimal,
}

impl Ledger {
    /// Build a ledger from already-parsed vouchers, dropping anything that is
    /// not a SUMMARY record.
    pub fn from_vouchers(vouchers: Vec<VoucherSummary>) -> Self {
        Self {
            vouchers: vouchers
                .into_iter()
                .filter(|v| v.record_type.is_summary())
                .collect(),
        }
    }

    pub fn vouchers(&self) -> &[VoucherSummary] {
        &self.vouchers
    }

    pub fn len(&self) -> usize {
        self.vouchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vouchers.is_empty()
    }

    pub fn contains(&self, voucher_id: &str) -> bool {
        self.vouchers.iter().any(|v| v.voucher_id == voucher_id)
    }

    pub fn voucher_ids(&self) -> impl Iterator<Item = &str> {
        self.vouchers.iter().map(|v| v.voucher_id.as_str())
    }

    pub fn totals(&self) -> LedgerTotals {
        LedgerTotals {
            voucher_count: self.vouchers.len(),
            e_way_bill_required: self
                .vouchers
                .iter()
                .filter(|v| v.e_way_bill.is_required())
                .count(),
            total_amount: self.vouchers.iter().map(|v| v.total_amount).sum(),
        }
    }
}

/// Result of splitting a raw record set by `record_type`
#[derive(Debug, Clone, Default)]
pub struct RecordPartition {
    pub summaries: Vec<VoucherSummary>,
    /// Non-summary records, left unparsed
    pub details: Vec<Value>,
}

/// Split raw records into SUMMARY vouchers (source order) and everything else.
///
/// Only SUMMARY records are decoded; a SUMMARY record that does not decode
/// is a malformed body. Records without a `record_type` are detail rows.
pub fn partition_records(records: Vec<Value>) -> Result<RecordPartition> {
    let mut partition = RecordPartition::default();

    for (idx, record) in records.into_iter().enumerate() {
        let is_summary = record
            .get("record_type")
            .and_then(Value::as_str)
            .map(|kind| RecordType::from(kind.to_string()).is_summary())
            .unwrap_or(false);

        if !is_summary {
            partition.details.push(record);
            continue;
        }

        let voucher: VoucherSummary = serde_json::from_value(record).map_err(|e| {
            VoucherError::Parse(format!("summary record #{idx} is malformed: {e}"))
        })?;
        partition.summaries.push(voucher);
    }

    Ok(partition)
}
