//! HTTP archive client backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;

use ledgerstream_core::checkpoint::CheckpointManager;
use ledgerstream_core::meta::LedgerHeaderEntry;

use crate::archive::HistoryArchive;
use crate::error::ArchiveError;
use crate::state::HistoryArchiveState;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Path of a category file within the archive, sharded by the big-endian
/// bytes of the checkpoint sequence: `ledger/00/00/00/ledger-0000003f.bin`.
pub fn checkpoint_path(category: &str, checkpoint: u32) -> String {
    let bytes = checkpoint.to_be_bytes();
    format!(
        "{category}/{:02x}/{:02x}/{:02x}/{category}-{checkpoint:08x}.bin",
        bytes[0], bytes[1], bytes[2]
    )
}

/// A single remote history archive endpoint.
///
/// Ledger headers are published per checkpoint segment; the client fetches
/// the segment file covering the requested sequence and picks the entry out
/// of it.
pub struct HttpArchive {
    base_url: String,
    http: reqwest::Client,
    checkpoints: CheckpointManager,
}

impl HttpArchive {
    pub fn new(base_url: impl Into<String>, checkpoints: CheckpointManager) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            checkpoints,
        }
    }

    pub fn url(&self) -> &str {
        &self.base_url
    }

    fn path_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ArchiveError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ArchiveError::Http {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        if !resp.status().is_success() {
            return Err(ArchiveError::Http {
                url: url.to_string(),
                reason: format!("HTTP {}", resp.status().as_u16()),
            });
        }
        let body = resp.bytes().await.map_err(|e| ArchiveError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl HistoryArchive for HttpArchive {
    async fn root_state(&self) -> Result<HistoryArchiveState, ArchiveError> {
        let url = self.path_url(".well-known/history.json");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ArchiveError::Http {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        if !resp.status().is_success() {
            return Err(ArchiveError::Http {
                url,
                reason: format!("HTTP {}", resp.status().as_u16()),
            });
        }
        resp.json::<HistoryArchiveState>()
            .await
            .map_err(|e| ArchiveError::Decode {
                url,
                reason: e.to_string(),
            })
    }

    async fn ledger_header(&self, sequence: u32) -> Result<LedgerHeaderEntry, ArchiveError> {
        let checkpoint = self.checkpoints.next_checkpoint(sequence);
        let url = self.path_url(&checkpoint_path("ledger", checkpoint));
        let body = self.get_bytes(&url).await?;
        let entries: Vec<LedgerHeaderEntry> =
            bincode::deserialize(&body).map_err(|e| ArchiveError::Decode {
                url,
                reason: e.to_string(),
            })?;
        entries
            .into_iter()
            .find(|e| e.header.ledger_seq == sequence)
            .ok_or(ArchiveError::HeaderNotFound { sequence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_path_shards_by_sequence_bytes() {
        assert_eq!(
            checkpoint_path("ledger", 63),
            "ledger/00/00/00/ledger-0000003f.bin"
        );
        assert_eq!(
            checkpoint_path("ledger", 0x0a1b2c3f),
            "ledger/0a/1b/2c/ledger-0a1b2c3f.bin"
        );
    }

    #[test]
    fn base_url_is_normalized() {
        let archive = HttpArchive::new("https://history.example.org/prd/", CheckpointManager::default());
        assert_eq!(archive.url(), "https://history.example.org/prd");
    }
}
