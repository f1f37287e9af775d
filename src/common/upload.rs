use crate::infrastructure::storage::artifacts::TempArtifact;
use crate::modules::job::model::SourceFile;
use anyhow::{Result, anyhow};
use axum::extract::multipart::Field;
use futures_util::StreamExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

/// Accepts `video/*` content types, falling back to the file extension when
/// the client sent none or a generic one.
pub fn is_video(content_type: Option<&str>, file_name: &str) -> bool {
    let declared = content_type
        .and_then(|ct| ct.parse::<mime::Mime>().ok())
        .filter(|m| *m != mime::APPLICATION_OCTET_STREAM);

    match declared {
        Some(m) => m.type_() == mime::VIDEO,
        None => mime_guess::from_path(file_name)
            .iter()
            .any(|m| m.type_() == mime::VIDEO),
    }
}

/// Streams a multipart field to a fresh file in `dir`.
///
/// The file is removed again if anything fails, or later when the last
/// handle on the returned `SourceFile` is dropped.
pub async fn stream_to_file(mut field: Field<'_>, dir: &Path) -> Result<SourceFile> {
    let file_name = field.file_name().unwrap_or("video.mp4").to_string();
    if !is_video(field.content_type(), &file_name) {
        return Err(anyhow!("Invalid content type: only video/* allowed"));
    }

    let extension = Path::new(&file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4");
    let artifact = TempArtifact::in_dir(dir, extension);
    let mut file = tokio::fs::File::create(artifact.path()).await?;
    let mut size: u64 = 0;

    while let Some(chunk) = field.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                error!("Stream error: {}", e);
                return Err(anyhow!("Stream interrupted"));
            }
        };
        file.write_all(&chunk).await?;
        size += chunk.len() as u64;
    }
    file.flush().await?;

    if size == 0 {
        return Err(anyhow!("The selected file is empty"));
    }

    info!("Stored upload {} ({} bytes)", file_name, size);
    Ok(SourceFile::new(file_name, size, artifact))
}
