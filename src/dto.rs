use serde::{Deserialize, Serialize};

use crate::search::SearchMode;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthDto {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub mode: SearchMode,
    /// Seconds of context on each side; the server default when absent.
    #[serde(default)]
    pub padding: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrimRequest {
    pub start: f64,
    pub end: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_request_defaults() {
        let req: SearchRequest = serde_json::from_str(r#"{"query": "今日"}"#).unwrap();
        assert_eq!(req.mode, SearchMode::Word);
        assert!(req.padding.is_none());

        let req: SearchRequest =
            serde_json::from_str(r#"{"query": "今日 は", "mode": "phrase", "padding": 0.5}"#).unwrap();
        assert_eq!(req.mode, SearchMode::Phrase);
        assert_eq!(req.padding, Some(0.5));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(serde_json::from_str::<SearchRequest>(r#"{"query": "x", "mode": "fuzzy"}"#).is_err());
    }
}
