use crate::modules::job::dto::*;
use crate::modules::job::events::DeviceCapabilities;
use crate::modules::job::model::{JobKind, JobState};
use crate::modules::job::readiness::ReadinessReport;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::job::handler::health,
        crate::modules::job::handler::readiness,
        crate::modules::job::handler::ui,
        crate::modules::job::handler::ws,
        crate::modules::job::handler::select_file,
        crate::modules::job::handler::compress,
        crate::modules::job::handler::cancel,
        crate::modules::job::handler::performance_test,
        crate::modules::job::handler::download,
    ),
    components(
        schemas(
            UiSnapshot, StatusMessage, DownloadLink, SelectFileResponse, JobAccepted,
            JobState, JobKind, DeviceCapabilities, ReadinessReport,
        )
    ),
    tags(
        (name = "Compressor", description = "Video compression jobs")
    )
)]
pub struct ApiDoc;
