use crate::config::settings::AppConfig;
use crate::infrastructure::storage::artifacts::DownloadStore;
use crate::modules::job::service::Coordinator;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub coordinator: Coordinator,
    pub downloads: DownloadStore,
}

impl AppState {
    pub fn new(config: AppConfig, coordinator: Coordinator, downloads: DownloadStore) -> Self {
        Self {
            config,
            coordinator,
            downloads,
        }
    }
}
