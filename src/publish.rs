//! Delivery of rendered reports as pull-request comments.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::report::RenderedReport;

/// Default REST API root of the forge.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("iacflow/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";

/// Boxed future returned by [`ReportPublisher::publish`].
pub type PublishFuture<'a> = Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send + 'a>>;

/// Errors raised while delivering a report. Never fatal to a run.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum DeliveryError {
    /// The request could not be sent or its response could not be read.
    #[error("comment request failed: {message}")]
    Request {
        /// Transport error text.
        message: String,
    },
    /// The forge answered with a non-success status.
    #[error("comment rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, verbatim.
        body: String,
    },
    /// The destination repository is not of the form `owner/name`.
    #[error("invalid comment destination '{repository}': expected owner/name")]
    InvalidDestination {
        /// Repository slug as supplied.
        repository: String,
    },
}

/// Pull request that receives the report.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommentDestination {
    repository: String,
    issue_number: u64,
}

impl CommentDestination {
    /// Validates and builds a destination.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::InvalidDestination`] unless `repository` has
    /// exactly one `/` separating two non-empty parts.
    pub fn new(repository: &str, issue_number: u64) -> Result<Self, DeliveryError> {
        let trimmed = repository.trim();
        let valid = trimmed
            .split_once('/')
            .is_some_and(|(owner, name)| {
                !owner.is_empty() && !name.is_empty() && !name.contains('/')
            });
        if !valid {
            return Err(DeliveryError::InvalidDestination {
                repository: repository.to_owned(),
            });
        }
        Ok(Self {
            repository: trimmed.to_owned(),
            issue_number,
        })
    }

    /// Returns the `owner/name` slug.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Returns the pull-request number.
    #[must_use]
    pub const fn issue_number(&self) -> u64 {
        self.issue_number
    }
}

impl fmt::Display for CommentDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repository, self.issue_number)
    }
}

/// Delivers a rendered report somewhere humans will read it.
///
/// Every call creates a new comment; implementations do not deduplicate.
pub trait ReportPublisher {
    /// Posts `report` to `destination`.
    fn publish<'a>(
        &'a self,
        report: &'a RenderedReport,
        destination: &'a CommentDestination,
    ) -> PublishFuture<'a>;
}

#[derive(Serialize)]
struct CreateCommentRequest<'a> {
    body: &'a str,
}

/// Publisher backed by the forge's issue-comment REST endpoint.
#[derive(Clone)]
pub struct GithubCommentPublisher {
    api_url: String,
    token: String,
    client: reqwest::Client,
}

impl GithubCommentPublisher {
    /// Creates a publisher for `api_url` authenticating with `token`.
    #[must_use]
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_url: api_url.into(),
            token: token.into(),
            client,
        }
    }

    fn comments_url(&self, destination: &CommentDestination) -> String {
        format!(
            "{}/repos/{}/issues/{}/comments",
            self.api_url.trim_end_matches('/'),
            destination.repository,
            destination.issue_number
        )
    }

    async fn post_comment(
        &self,
        report: &RenderedReport,
        destination: &CommentDestination,
    ) -> Result<(), DeliveryError> {
        let request_error = |err: reqwest::Error| DeliveryError::Request {
            message: err.to_string(),
        };

        let response = self
            .client
            .post(self.comments_url(destination))
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .json(&CreateCommentRequest {
                body: report.body(),
            })
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(request_error)?;

        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            })
        }
    }
}

impl fmt::Debug for GithubCommentPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubCommentPublisher")
            .field("api_url", &self.api_url)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl ReportPublisher for GithubCommentPublisher {
    fn publish<'a>(
        &'a self,
        report: &'a RenderedReport,
        destination: &'a CommentDestination,
    ) -> PublishFuture<'a> {
        Box::pin(self.post_comment(report, destination))
    }
}
