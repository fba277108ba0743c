//! Quota response normalization
//!
//! IMAP client stacks and servers disagree on how a GETQUOTAROOT answer is
//! laid out. The known layouts are tried in a fixed order and the first one
//! that yields a STORAGE pair wins:
//!
//! 1. `{"quota": {"STORAGE": [used, limit]}}`
//! 2. `{"<root>": {"storage": {"usage": u, "limit": l}}}` or
//!    `{"<root>": {"STORAGE": [used, limit]}}`, entries in mapping order
//! 3. `[{"quota": {"STORAGE": [used, limit]}}, ...]` or
//!    `[{"quota": {"storage": {"usage": u, "limit": l}}}, ...]`
//!
//! All values are whole kibibytes. A matched entry with a zero limit fails
//! the lookup instead of giving way to later entries.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::QuotaParseFailure;
use crate::transport::RawQuotaResponse;

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Known quota response layouts, in match priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaShape {
    /// Top-level `quota.STORAGE` pair
    DirectQuota,
    /// Mapping of root names to `storage.{usage, limit}` or `STORAGE` pairs
    NamedRoot,
    /// Sequence of roots, each with `quota.STORAGE` or `quota.storage`
    RootList,
}

/// Raw STORAGE figures in kibibytes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorageUsage {
    pub used_kb: u64,
    pub limit_kb: u64,
}

/// Normalized storage quota
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaReport {
    #[serde(rename = "usedKB")]
    pub used_kb: u64,
    #[serde(rename = "limitKB")]
    pub limit_kb: u64,
    #[serde(rename = "usedMB")]
    pub used_mb: f64,
    #[serde(rename = "limitMB")]
    pub limit_mb: f64,
    pub percent_used: f64,
    #[serde(rename = "availableMB")]
    pub available_mb: f64,
}

impl QuotaReport {
    /// Derive the report. A zero limit has no percentage and is rejected.
    pub fn from_usage(usage: StorageUsage) -> Result<Self, QuotaParseFailure> {
        if usage.limit_kb == 0 {
            return Err(QuotaParseFailure::ZeroLimit);
        }

        let used = usage.used_kb as f64;
        let limit = usage.limit_kb as f64;
        let used_mb = round2(used / 1024.0);
        let limit_mb = round2(limit / 1024.0);

        Ok(Self {
            used_kb: usage.used_kb,
            limit_kb: usage.limit_kb,
            used_mb,
            limit_mb,
            percent_used: round2(used / limit * 100.0),
            available_mb: round2(limit_mb - used_mb),
        })
    }
}

type Extractor = fn(&Value) -> Option<StorageUsage>;

/// Matchers evaluated top to bottom
const MATCHERS: &[(QuotaShape, Extractor)] = &[
    (QuotaShape::DirectQuota, direct_quota),
    (QuotaShape::NamedRoot, named_root),
    (QuotaShape::RootList, root_list),
];

/// Find the STORAGE figures in a raw response and the shape they came from
pub fn match_shape(response: &RawQuotaResponse) -> Option<(QuotaShape, StorageUsage)> {
    MATCHERS
        .iter()
        .find_map(|(shape, extract)| extract(response).map(|usage| (*shape, usage)))
}

/// Normalize a raw quota root response into a report
pub fn parse_quota(response: &RawQuotaResponse) -> Result<QuotaReport, QuotaParseFailure> {
    let (shape, usage) = match_shape(response).ok_or(QuotaParseFailure::UnrecognizedShape)?;
    debug!(
        ?shape,
        used_kb = usage.used_kb,
        limit_kb = usage.limit_kb,
        "Matched quota response"
    );
    QuotaReport::from_usage(usage)
}

/// Non-negative integral count, given as a JSON number or numeric string.
/// Fractional values are rejected.
fn kibibytes(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `[used, limit]`
fn storage_pair(value: &Value) -> Option<StorageUsage> {
    match value.as_array()?.as_slice() {
        [used, limit] => Some(StorageUsage {
            used_kb: kibibytes(used)?,
            limit_kb: kibibytes(limit)?,
        }),
        _ => None,
    }
}

/// `{"usage": used, "limit": limit}`
fn storage_usage(value: &Value) -> Option<StorageUsage> {
    let usage = value.as_object()?;
    Some(StorageUsage {
        used_kb: kibibytes(usage.get("usage")?)?,
        limit_kb: kibibytes(usage.get("limit")?)?,
    })
}

fn direct_quota(response: &Value) -> Option<StorageUsage> {
    storage_pair(response.get("quota")?.get("STORAGE")?)
}

fn named_root(response: &Value) -> Option<StorageUsage> {
    response.as_object()?.values().find_map(|info| {
        info.get("storage")
            .and_then(storage_usage)
            .or_else(|| info.get("STORAGE").and_then(storage_pair))
    })
}

fn root_list(response: &Value) -> Option<StorageUsage> {
    response.as_array()?.iter().find_map(|root| {
        let quota = root.get("quota")?;
        quota
            .get("STORAGE")
            .and_then(storage_pair)
            .or_else(|| quota.get("storage").and_then(storage_usage))
    })
}
