//! The archive's root state document ("HAS").

use serde::{Deserialize, Serialize};

/// Summary an archive publishes about its own contents, served as JSON at a
/// well-known path. `current_ledger` is the latest checkpoint ledger the
/// archive has published — the upper bound for bounded replay requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryArchiveState {
    pub version: u32,
    pub server: String,
    pub current_ledger: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_passphrase: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_camel_case_document() {
        let doc = r#"{
            "version": 1,
            "server": "archive-v2.1.0",
            "currentLedger": 25532607,
            "networkPassphrase": "Public Global Network ; September 2015"
        }"#;
        let has: HistoryArchiveState = serde_json::from_str(doc).unwrap();
        assert_eq!(has.current_ledger, 25532607);
        assert_eq!(has.server, "archive-v2.1.0");
    }

    #[test]
    fn network_passphrase_is_optional() {
        let doc = r#"{"version": 1, "server": "a", "currentLedger": 63}"#;
        let has: HistoryArchiveState = serde_json::from_str(doc).unwrap();
        assert_eq!(has.network_passphrase, None);
    }
}
