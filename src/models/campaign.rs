use serde::{Deserialize, Serialize};

/// Request body for submitting an outbound campaign.
#[derive(Debug, Clone, Deserialize)]
pub struct CampaignRequest {
    pub subject: String,
    pub html_body: String,
    pub image_name: String,
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl CampaignStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CampaignStatus::Done | CampaignStatus::Error)
    }
}

/// Progress snapshot for one submitted campaign. Lives in the keyed task
/// registry from submission until shortly after completion.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignTask {
    pub progress: u8,
    pub total: usize,
    pub sent: usize,
    pub status: CampaignStatus,
    pub error: Option<String>,
}

impl CampaignTask {
    pub fn new(total: usize) -> Self {
        CampaignTask {
            progress: 0,
            total,
            sent: 0,
            status: CampaignStatus::Pending,
            error: None,
        }
    }
}

/// One line of the append-only campaign send log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendLogEntry {
    pub target: String,
    pub status: String,
    pub timestamp: String,
    pub template: String,
    pub image_used: String,
}
