pub mod campaign_service;
pub mod event_stream;
pub mod poller_service;
pub mod retention_service;
