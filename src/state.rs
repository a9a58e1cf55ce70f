use axum::extract::FromRef;
use std::sync::Arc;

use crate::config::Config;
use crate::services::campaign_service::CampaignManager;
use crate::services::event_stream::MailEvents;
use crate::store::MailStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<MailStore>,
    pub events: Arc<MailEvents>,
    pub campaigns: Arc<CampaignManager>,
}

impl FromRef<AppState> for Arc<Config> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<MailStore> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for Arc<MailEvents> {
    fn from_ref(state: &AppState) -> Self {
        state.events.clone()
    }
}

impl FromRef<AppState> for Arc<CampaignManager> {
    fn from_ref(state: &AppState) -> Self {
        state.campaigns.clone()
    }
}
