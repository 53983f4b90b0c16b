use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LinkStatus {
    #[serde(rename = "processing")]
    Processing,
    #[serde(rename = "available")]
    Available,
    #[serde(rename = "not available")]
    NotAvailable,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Processing => "processing",
            LinkStatus::Available => "available",
            LinkStatus::NotAvailable => "not available",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(LinkStatus::Processing),
            "available" => Some(LinkStatus::Available),
            "not available" => Some(LinkStatus::NotAvailable),
            _ => None,
        }
    }

    /// True once the probe has produced a verdict.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LinkStatus::Processing)
    }

    /// Label used in rendered reports.
    pub fn label(&self) -> &'static str {
        match self {
            LinkStatus::Available => "Available",
            _ => "Not Available",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BatchStatus {
    #[serde(rename = "processing")]
    Processing,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(BatchStatus::Processing),
            "completed" => Some(BatchStatus::Completed),
            "failed" => Some(BatchStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Batch {
    pub number: i64,
    pub link_count: i64,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Link {
    pub id: i64,
    pub url: String,
    pub status: LinkStatus,
    pub batch_number: i64,
    /// Set exactly when `status` is terminal.
    pub checked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    pub links: Vec<String>,
}

/// Verdicts keyed by the raw address text. A repeated address keeps only the
/// last verdict written for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckResponse {
    pub links: HashMap<String, String>,
    pub links_num: i64,
}

impl CheckResponse {
    pub fn from_links<'a>(batch_number: i64, links: impl IntoIterator<Item = &'a Link>) -> Self {
        let links = links
            .into_iter()
            .map(|link| (link.url.clone(), link.status.as_str().to_string()))
            .collect();
        Self {
            links,
            links_num: batch_number,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    pub links_list: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    pub status: String,
    pub shutdown: bool,
    pub batches: i64,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_status_strings_round_trip() {
        for status in [
            LinkStatus::Processing,
            LinkStatus::Available,
            LinkStatus::NotAvailable,
        ] {
            assert_eq!(LinkStatus::parse_status(status.as_str()), Some(status));
        }
        assert_eq!(LinkStatus::parse_status("gone"), None);
        assert_eq!(
            serde_json::to_string(&LinkStatus::NotAvailable).unwrap(),
            "\"not available\""
        );
    }

    #[test]
    fn report_labels() {
        assert_eq!(LinkStatus::Available.label(), "Available");
        assert_eq!(LinkStatus::NotAvailable.label(), "Not Available");
        assert_eq!(LinkStatus::Processing.label(), "Not Available");
    }

    #[test]
    fn duplicate_urls_collapse_to_last_written() {
        let links = vec![
            Link {
                id: 1,
                url: "a.com".into(),
                status: LinkStatus::Available,
                batch_number: 3,
                checked_at: Some(Utc::now()),
            },
            Link {
                id: 2,
                url: "a.com".into(),
                status: LinkStatus::NotAvailable,
                batch_number: 3,
                checked_at: Some(Utc::now()),
            },
        ];
        let resp = CheckResponse::from_links(3, &links);
        assert_eq!(resp.links_num, 3);
        assert_eq!(resp.links.len(), 1);
        assert_eq!(resp.links["a.com"], "not available");
    }
}
