//! User-facing messages for submission failures.
//!
//! Server rejections carry an application error code. [`ErrorMessages`]
//! maps codes to message templates whose `{name}` placeholders are filled
//! from the failure's `params`. Codes missing from the table resolve to
//! [`UNKNOWN_ERROR_MESSAGE`].

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use crate::failure::SubmissionFailure;

/// Fallback for server codes the table does not know.
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred. Please try again later.";

/// Shown for transport-level failures.
pub const NETWORK_ERROR_MESSAGE: &str =
    "Could not reach the server. The report will be sent when the network is available.";

/// Built-in templates keyed by server error code.
const DEFAULT_TEMPLATES: &[(&str, &str)] = &[
    (
        "season_closed",
        "The hunting season for this species is closed.",
    ),
    (
        "permit_not_found",
        "Permit {permitNumber} was not found.",
    ),
    (
        "quota_exceeded",
        "The quota for this permit is full ({quota} animals).",
    ),
    (
        "already_registered",
        "This harvest has already been registered with strap {strapNumber}.",
    ),
    (
        "invalid_location",
        "The location is outside the allowed area.",
    ),
];

/// Matches `{name}` placeholders, capturing the name.
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("valid regex"));

/// Replace `{name}` placeholders with values from `params`.
///
/// Placeholders without a matching parameter are left as-is.
pub fn render_template(template: &str, params: &BTreeMap<String, String>) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &regex::Captures<'_>| {
            params
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Lookup table from server error codes to message templates.
#[derive(Debug, Clone)]
pub struct ErrorMessages {
    templates: HashMap<String, String>,
}

impl ErrorMessages {
    /// An empty table: every server code resolves to the fallback.
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Add or replace the template for `code`.
    pub fn with_template(mut self, code: impl Into<String>, template: impl Into<String>) -> Self {
        self.templates.insert(code.into(), template.into());
        self
    }

    /// The user-facing message for a failure.
    pub fn resolve(&self, failure: &SubmissionFailure) -> String {
        match failure {
            SubmissionFailure::Network => NETWORK_ERROR_MESSAGE.to_string(),
            SubmissionFailure::Timeout { timeout } => format!(
                "The server did not answer within {} seconds. Please try again.",
                timeout / 1000
            ),
            SubmissionFailure::Server { code, params, .. } => match self.templates.get(code) {
                Some(template) => render_template(template, params),
                None => UNKNOWN_ERROR_MESSAGE.to_string(),
            },
        }
    }
}

impl Default for ErrorMessages {
    fn default() -> Self {
        DEFAULT_TEMPLATES
            .iter()
            .fold(Self::empty(), |table, (code, template)| {
                table.with_template(*code, *template)
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
