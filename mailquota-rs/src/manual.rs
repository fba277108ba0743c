//! Manual mailbox size computation
//!
//! Used when the server offers no usable quota: the mailbox is opened
//! read-only and the RFC822.SIZE of every message is summed.

use futures::TryStreamExt;
use serde::Serialize;
use tracing::debug;

use crate::error::ManualComputationError;
use crate::quota::round2;
use crate::transport::MailSession;

/// Every message, open-ended upper bound
pub const FULL_RANGE: &str = "1:*";

/// Summed size of a mailbox
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualSizeReport {
    pub total_size_bytes: u64,
    #[serde(rename = "totalSizeMB")]
    pub total_size_mb: f64,
    pub message_count: u32,
}

impl ManualSizeReport {
    fn new(total_size_bytes: u64, message_count: u32) -> Self {
        Self {
            total_size_bytes,
            total_size_mb: round2(total_size_bytes as f64 / 1024.0 / 1024.0),
            message_count,
        }
    }
}

/// Sum the sizes of all messages in `mailbox`
pub async fn compute_mailbox_size<S>(
    session: &mut S,
    mailbox: &str,
) -> Result<ManualSizeReport, ManualComputationError>
where
    S: MailSession + ?Sized,
{
    let status = session.open_mailbox(mailbox, true).await.map_err(|source| {
        ManualComputationError::OpenMailbox {
            mailbox: mailbox.to_string(),
            source,
        }
    })?;

    if status.message_count == 0 {
        debug!("{} is empty, skipping size fetch", mailbox);
        return Ok(ManualSizeReport::new(0, 0));
    }

    let sizes = session
        .fetch_sizes(FULL_RANGE)
        .await
        .map_err(ManualComputationError::Fetch)?;

    let total_size_bytes = sizes
        .try_fold(0u64, |total, message| async move {
            Ok(total.saturating_add(message.size_bytes))
        })
        .await
        .map_err(ManualComputationError::Fetch)?;

    debug!(
        "{}: {} messages, {} bytes",
        mailbox, status.message_count, total_size_bytes
    );

    Ok(ManualSizeReport::new(total_size_bytes, status.message_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use crate::transport::{ConnectionParameters, MailTransport};

    async fn compute(transport: &MockTransport) -> Result<ManualSizeReport, ManualComputationError> {
        let params = ConnectionParameters::new("imap.example.com", "alice", "secret");
        let mut session = transport.connect(&params).await.unwrap();
        compute_mailbox_size(&mut session, "INBOX").await
    }

    #[tokio::test]
    async fn test_empty_mailbox_skips_fetch() {
        let transport = MockTransport::new();
        let report = compute(&transport).await.unwrap();

        assert_eq!(report.total_size_bytes, 0);
        assert_eq!(report.message_count, 0);
        assert_eq!(report.total_size_mb, 0.0);
        assert_eq!(transport.stats().fetches(), 0);
    }

    #[tokio::test]
    async fn test_sum_is_order_independent() {
        for sizes in [
            vec![1000, 2500, 700],
            vec![700, 1000, 2500],
            vec![2500, 700, 1000],
        ] {
            let transport = MockTransport::new().with_messages(sizes);
            let report = compute(&transport).await.unwrap();
            assert_eq!(report.total_size_bytes, 4200);
            assert_eq!(report.total_size_mb, 0.0);
            assert_eq!(report.message_count, 3);
        }
    }

    #[tokio::test]
    async fn test_megabyte_rounding() {
        let transport = MockTransport::new().with_messages(vec![1024 * 1024, 512 * 1024, 10 * 1024]);
        let report = compute(&transport).await.unwrap();
        assert_eq!(report.total_size_mb, 1.51);
    }

    #[tokio::test]
    async fn test_fetch_error_fails_whole_computation() {
        let transport = MockTransport::new()
            .with_messages(vec![100, 200, 300])
            .with_fetch_error_after(2);
        let result = compute(&transport).await;
        assert!(matches!(result, Err(ManualComputationError::Fetch(_))));
    }

    #[tokio::test]
    async fn test_open_error() {
        let transport = MockTransport::new().with_mailbox_error("NO Mailbox does not exist");
        let result = compute(&transport).await;
        assert!(matches!(result, Err(ManualComputationError::OpenMailbox { .. })));
        assert_eq!(transport.stats().fetches(), 0);
    }

    #[test]
    fn test_report_serialization() {
        let value = serde_json::to_value(ManualSizeReport::new(4200, 3)).unwrap();
        assert_eq!(value["totalSizeBytes"], 4200);
        assert_eq!(value["totalSizeMB"], 0.0);
        assert_eq!(value["messageCount"], 3);
    }
}
