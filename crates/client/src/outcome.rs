//! Per-engine statuses and the policies that reduce them to one outcome.

use std::fmt;

use zeroize::Zeroizing;

use custody_crypto::{decode_share, recover};
use custody_types::Share;

use crate::config::ThresholdParams;

/// Result of one write (upload or address mutation) on one engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteStatus {
    /// 200/201 for uploads, 200 for address mutations
    Acknowledged,
    /// Any other HTTP status
    Rejected(u16),
    /// No HTTP response at all
    Unreachable(String),
}

impl WriteStatus {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, WriteStatus::Acknowledged)
    }
}

/// Result of one download on one engine.
#[derive(Clone, PartialEq, Eq)]
pub enum DownloadStatus {
    /// Opened and unblinded share bytes
    Share(Zeroizing<Vec<u8>>),
    /// 404: the engine holds nothing for this id and address
    NotFound,
    /// Any other non-200 status
    Rejected(u16),
    /// The returned box did not open with the ephemeral key
    DecryptFailed,
    /// 200 with a body that could not be used
    Malformed(String),
    Unreachable(String),
}

impl fmt::Debug for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadStatus::Share(bytes) => write!(f, "Share({} bytes)", bytes.len()),
            DownloadStatus::NotFound => f.write_str("NotFound"),
            DownloadStatus::Rejected(code) => write!(f, "Rejected({code})"),
            DownloadStatus::DecryptFailed => f.write_str("DecryptFailed"),
            DownloadStatus::Malformed(reason) => write!(f, "Malformed({reason:?})"),
            DownloadStatus::Unreachable(reason) => write!(f, "Unreachable({reason:?})"),
        }
    }
}

/// Outcome of an upload, add-address or remove-address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Success,
    /// At least `threshold` but not all engines stored their share
    PartialSuccess { acknowledged: usize, total: usize },
    Failure { acknowledged: usize, total: usize },
}

impl fmt::Display for WriteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteOutcome::Success => f.write_str("success"),
            WriteOutcome::PartialSuccess { acknowledged, total } => {
                write!(f, "partial-success ({acknowledged}/{total})")
            }
            WriteOutcome::Failure { acknowledged, total } => {
                write!(f, "failure ({acknowledged}/{total})")
            }
        }
    }
}

/// Outcome of a download.
#[derive(Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Ok(Zeroizing<Vec<u8>>),
    /// Every engine answered not-found
    NotStored,
    /// Shares came back but no secret could be reconstructed
    Error(String),
}

impl fmt::Debug for DownloadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadOutcome::Ok(_) => f.write_str("Ok(..)"),
            DownloadOutcome::NotStored => f.write_str("NotStored"),
            DownloadOutcome::Error(reason) => write!(f, "Error({reason:?})"),
        }
    }
}

impl fmt::Display for DownloadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadOutcome::Ok(_) => f.write_str("ok"),
            DownloadOutcome::NotStored => f.write_str("not-stored"),
            DownloadOutcome::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

/// Upload policy: all engines → success, at least `threshold` → partial.
pub fn aggregate_upload(statuses: &[WriteStatus], threshold: u32) -> WriteOutcome {
    let total = statuses.len();
    let acknowledged = statuses.iter().filter(|s| s.is_acknowledged()).count();

    if total > 0 && acknowledged == total {
        WriteOutcome::Success
    } else if total > 0 && acknowledged >= threshold.max(1) as usize {
        WriteOutcome::PartialSuccess { acknowledged, total }
    } else {
        WriteOutcome::Failure { acknowledged, total }
    }
}

/// Address mutation policy: every engine must acknowledge.
pub fn aggregate_mutation(statuses: &[WriteStatus]) -> WriteOutcome {
    let total = statuses.len();
    let acknowledged = statuses.iter().filter(|s| s.is_acknowledged()).count();

    if total > 0 && acknowledged == total {
        WriteOutcome::Success
    } else {
        WriteOutcome::Failure { acknowledged, total }
    }
}

/// Download policy: all not-found → not stored, otherwise recover from any
/// `threshold` intact shares of one split among those that decoded.
pub fn aggregate_download(statuses: &[DownloadStatus], params: ThresholdParams) -> DownloadOutcome {
    if !statuses.is_empty() && statuses.iter().all(|s| *s == DownloadStatus::NotFound) {
        return DownloadOutcome::NotStored;
    }

    let shares: Vec<Share> = statuses
        .iter()
        .filter_map(|status| match status {
            DownloadStatus::Share(bytes) => decode_share(bytes).ok(),
            _ => None,
        })
        .collect();

    match recover(&shares, params.threshold, params.total) {
        Ok(secret) => DownloadOutcome::Ok(secret),
        Err(e) => DownloadOutcome::Error(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_crypto::{encode_share, split};
    use rand::rngs::OsRng;

    const PARAMS: ThresholdParams = ThresholdParams {
        total: 3,
        threshold: 2,
    };

    fn from_codes(codes: &[u16]) -> Vec<WriteStatus> {
        codes
            .iter()
            .map(|&code| match code {
                200 | 201 => WriteStatus::Acknowledged,
                other => WriteStatus::Rejected(other),
            })
            .collect()
    }

    fn share_statuses(secret: &[u8], total: u32, threshold: u32) -> Vec<DownloadStatus> {
        let mut rng = OsRng;
        split(secret, total, threshold, &mut rng)
            .unwrap()
            .iter()
            .map(share_status)
            .collect()
    }

    fn share_status(share: &Share) -> DownloadStatus {
        DownloadStatus::Share(Zeroizing::new(encode_share(share).unwrap()))
    }

    #[test]
    fn test_upload_aggregation() {
        assert_eq!(aggregate_upload(&from_codes(&[200, 200, 200]), 2), WriteOutcome::Success);
        assert_eq!(aggregate_upload(&from_codes(&[201, 200, 201]), 3), WriteOutcome::Success);
        assert_eq!(
            aggregate_upload(&from_codes(&[200, 200, 404]), 2),
            WriteOutcome::PartialSuccess { acknowledged: 2, total: 3 }
        );
        assert_eq!(
            aggregate_upload(&from_codes(&[404, 404, 404]), 2),
            WriteOutcome::Failure { acknowledged: 0, total: 3 }
        );
        assert_eq!(
            aggregate_upload(&from_codes(&[200, 500, 404]), 2),
            WriteOutcome::Failure { acknowledged: 1, total: 3 }
        );
    }

    #[test]
    fn test_unreachable_counts_as_failed_node() {
        let statuses = vec![
            WriteStatus::Acknowledged,
            WriteStatus::Unreachable("connection refused".into()),
            WriteStatus::Acknowledged,
        ];
        assert_eq!(
            aggregate_upload(&statuses, 2),
            WriteOutcome::PartialSuccess { acknowledged: 2, total: 3 }
        );
    }

    #[test]
    fn test_mutation_is_all_or_nothing() {
        assert_eq!(aggregate_mutation(&from_codes(&[200, 200, 200])), WriteOutcome::Success);
        assert_eq!(
            aggregate_mutation(&from_codes(&[200, 200, 500])),
            WriteOutcome::Failure { acknowledged: 2, total: 3 }
        );
        assert_eq!(
            aggregate_mutation(&from_codes(&[201, 200, 200])),
            WriteOutcome::Success
        );
    }

    #[test]
    fn test_download_all_not_found() {
        let statuses = vec![DownloadStatus::NotFound; 3];
        assert_eq!(aggregate_download(&statuses, PARAMS), DownloadOutcome::NotStored);
    }

    #[test]
    fn test_download_reconstructs_from_threshold() {
        let secret = b"credential store master key";
        let mut statuses = share_statuses(secret, 3, 2);
        statuses[1] = DownloadStatus::NotFound;

        match aggregate_download(&statuses, PARAMS) {
            DownloadOutcome::Ok(recovered) => assert_eq!(recovered.as_slice(), secret),
            other => panic!("expected ok, got {other:?}"),
        }
    }

    #[test]
    fn test_download_below_threshold_is_error() {
        let mut statuses = share_statuses(b"secret", 3, 2);
        statuses[0] = DownloadStatus::NotFound;
        statuses[2] = DownloadStatus::DecryptFailed;

        assert!(matches!(aggregate_download(&statuses, PARAMS), DownloadOutcome::Error(_)));
    }

    #[test]
    fn test_decrypt_failures_are_never_not_stored() {
        let statuses = vec![
            DownloadStatus::DecryptFailed,
            DownloadStatus::NotFound,
            DownloadStatus::NotFound,
        ];
        assert!(matches!(aggregate_download(&statuses, PARAMS), DownloadOutcome::Error(_)));
    }

    #[test]
    fn test_garbage_share_is_skipped() {
        let secret = b"secret";
        let mut statuses = share_statuses(secret, 3, 2);
        statuses[0] = DownloadStatus::Share(Zeroizing::new(vec![0xff; 7]));

        match aggregate_download(&statuses, PARAMS) {
            DownloadOutcome::Ok(recovered) => assert_eq!(recovered.as_slice(), secret),
            other => panic!("expected ok, got {other:?}"),
        }
    }

    #[test]
    fn test_debug_does_not_print_share_bytes() {
        let status = DownloadStatus::Share(Zeroizing::new(vec![0xab; 4]));
        assert_eq!(format!("{status:?}"), "Share(4 bytes)");
    }

    #[test]
    fn test_tampered_lowest_share_does_not_block_download() {
        let secret = b"credential store master key";
        let mut shares = split(secret, 3, 2, &mut OsRng).unwrap();
        shares[0].chunks[0][5] ^= 0x01;
        let statuses: Vec<DownloadStatus> = shares.iter().map(share_status).collect();

        match aggregate_download(&statuses, PARAMS) {
            DownloadOutcome::Ok(recovered) => assert_eq!(recovered.as_slice(), secret),
            other => panic!("expected ok, got {other:?}"),
        }
    }

    #[test]
    fn test_stale_share_from_earlier_upload_is_outvoted() {
        let secret = b"rotated secret";
        let stale = split(b"previous secret", 3, 2, &mut OsRng).unwrap();
        let fresh = split(secret, 3, 2, &mut OsRng).unwrap();
        let statuses = vec![
            share_status(&stale[0]),
            share_status(&fresh[1]),
            share_status(&fresh[2]),
        ];

        match aggregate_download(&statuses, PARAMS) {
            DownloadOutcome::Ok(recovered) => assert_eq!(recovered.as_slice(), secret),
            other => panic!("expected ok, got {other:?}"),
        }
    }

    #[test]
    fn test_share_of_foreign_threshold_is_not_trusted() {
        let forged = split(b"attacker chosen", 3, 1, &mut OsRng).unwrap();
        let statuses = vec![
            share_status(&forged[0]),
            DownloadStatus::NotFound,
            DownloadStatus::NotFound,
        ];
        assert!(matches!(
            aggregate_download(&statuses, PARAMS),
            DownloadOutcome::Error(_)
        ));
    }
}
