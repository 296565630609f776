//! REST client for report submission.
//!
//! The server answers every accepted request with `2xx` and a JSON body
//! saying whether the report was taken. Any non-2xx answer is treated as
//! a transport problem, not a rejection.

use std::collections::BTreeMap;

use async_trait::async_trait;
use fieldsync_core::report::{Report, SubmissionResult};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// What the server made of a submitted report.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Accepted {
        result: SubmissionResult,
        in_african_swine_fever_zone: Option<bool>,
    },
    Rejected {
        code: String,
        description: Option<String>,
        params: BTreeMap<String, String>,
    },
}

/// Port for sending report data to the server.
#[async_trait]
pub trait ReportApi: Send + Sync {
    async fn submit(&self, report: &Report) -> Result<SubmitOutcome, TransportError>;
}

/// Body sent to `POST /reports`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest<'a> {
    id: uuid::Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<fieldsync_core::report::ReportKind>,
    created_at: fieldsync_core::types::Timestamp,
    edits: &'a [serde_json::Value],
    has_photo: bool,
}

/// Response body shared by the report and photo endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServerResponse {
    success: bool,
    #[serde(default)]
    result: Option<SubmissionResult>,
    #[serde(default)]
    in_african_swine_fever_zone: Option<bool>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    params: BTreeMap<String, String>,
}

/// Code recorded when a rejection arrives without one.
const UNKNOWN_ERROR_CODE: &str = "unknown";

impl ServerResponse {
    pub(crate) fn into_outcome(self) -> SubmitOutcome {
        if self.success {
            SubmitOutcome::Accepted {
                result: self.result.unwrap_or_default(),
                in_african_swine_fever_zone: self.in_african_swine_fever_zone,
            }
        } else {
            SubmitOutcome::Rejected {
                code: self
                    .error_code
                    .unwrap_or_else(|| UNKNOWN_ERROR_CODE.to_string()),
                description: self.description,
                params: self.params,
            }
        }
    }
}

/// Reject non-2xx responses.
pub(crate) fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::HttpStatus(status.as_u16()));
    }
    Ok(response)
}

/// Parse a successful response body.
pub(crate) async fn parse_response(
    response: reqwest::Response,
) -> Result<ServerResponse, TransportError> {
    let response = ensure_success(response)?;
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
}

/// HTTP implementation of [`ReportApi`].
pub struct HttpReportApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpReportApi {
    /// * `base_url` - API root without trailing slash, e.g.
    ///   `https://example.org/api/v1`.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ReportApi for HttpReportApi {
    async fn submit(&self, report: &Report) -> Result<SubmitOutcome, TransportError> {
        let body = SubmitRequest {
            id: report.id,
            kind: report.kind,
            created_at: report.created_at,
            edits: report.edits(),
            has_photo: report.has_photo(),
        };

        let response = self
            .client
            .post(format!("{}/reports", self.base_url))
            .json(&body)
            .send()
            .await?;

        Ok(parse_response(response).await?.into_outcome())
    }
}
