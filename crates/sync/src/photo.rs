//! Photo staging and upload.
//!
//! A photo picked for a report starts out in a temporary location. Before
//! upload it is moved under `photo_dir/<report id>/`, where it stays until
//! the report is removed. Staging is idempotent, so a retried submission
//! finds the photo already in place.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fieldsync_core::types::ReportId;
use tokio::sync::mpsc;

use crate::api::parse_response;
use crate::api::SubmitOutcome;
use crate::error::TransportError;

/// Bytes sent per request body chunk; progress is reported per chunk.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Moves staged photos into their report-scoped permanent location.
#[derive(Debug, Clone)]
pub struct PhotoStaging {
    root: PathBuf,
}

impl PhotoStaging {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the photos of one report.
    pub fn report_dir(&self, report_id: ReportId) -> PathBuf {
        self.root.join(report_id.to_string())
    }

    /// Move `source` into the report's directory and return the new path.
    ///
    /// If the file has already been moved by an earlier attempt, the
    /// existing destination is returned.
    pub async fn stage(&self, report_id: ReportId, source: &Path) -> Result<PathBuf, TransportError> {
        let file_name = source.file_name().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("photo path has no file name: {}", source.display()),
            )
        })?;

        let dir = self.report_dir(report_id);
        let destination = dir.join(file_name);
        if source == destination || tokio::fs::try_exists(&destination).await? {
            return Ok(destination);
        }

        tokio::fs::create_dir_all(&dir).await?;
        if tokio::fs::rename(source, &destination).await.is_err() {
            // rename fails across filesystems
            tokio::fs::copy(source, &destination).await?;
            tokio::fs::remove_file(source).await?;
        }

        tracing::debug!(
            report_id = %report_id,
            path = %destination.display(),
            "Photo staged",
        );
        Ok(destination)
    }

    /// Delete every staged photo of a report. Missing directories are fine.
    pub async fn discard(&self, report_id: ReportId) -> Result<(), TransportError> {
        match tokio::fs::remove_dir_all(self.report_dir(report_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Port for uploading a report's photo.
#[async_trait]
pub trait PhotoUploader: Send + Sync {
    /// Upload the file at `path`, sending progress in `[0, 1]` on
    /// `progress` as bytes go out.
    async fn upload(
        &self,
        report_id: ReportId,
        path: &Path,
        progress: mpsc::UnboundedSender<f32>,
    ) -> Result<(), TransportError>;
}

/// HTTP implementation of [`PhotoUploader`]: `POST /reports/{id}/photo`.
pub struct HttpPhotoUploader {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPhotoUploader {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PhotoUploader for HttpPhotoUploader {
    async fn upload(
        &self,
        report_id: ReportId,
        path: &Path,
        progress: mpsc::UnboundedSender<f32>,
    ) -> Result<(), TransportError> {
        let bytes = tokio::fs::read(path).await?;
        let total = bytes.len().max(1) as f32;
        let chunks: Vec<Vec<u8>> = bytes.chunks(UPLOAD_CHUNK_SIZE).map(<[u8]>::to_vec).collect();

        let chunk_progress = progress.clone();
        let mut sent = 0usize;
        let body = futures::stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len();
            let _ = chunk_progress.send(sent as f32 / total);
            Ok::<_, std::io::Error>(chunk)
        }));

        let response = self
            .client
            .post(format!("{}/reports/{}/photo", self.base_url, report_id))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await?;

        match parse_response(response).await?.into_outcome() {
            SubmitOutcome::Accepted { .. } => {
                let _ = progress.send(1.0);
                Ok(())
            }
            SubmitOutcome::Rejected {
                code,
                description,
                params,
            } => Err(TransportError::Rejected {
                code,
                description,
                params,
            }),
        }
    }
}
