//! GitHub Issues implementation of the ticket gateway.
//!
//! Uses the REST v3 API. Authentication is a bearer token from config or the
//! `GITHUB_TOKEN` environment variable; anonymous access works for reads on
//! public repositories but every write will be rejected by GitHub.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::types::{Comment, NewTicket, Ticket, TicketState, TicketUpdate};
use super::{GatewayError, TicketGateway};
use crate::config::GitHubConfig;
use crate::metrics::{GATEWAY_REQUESTS, GATEWAY_REQUEST_DURATION};

const USER_AGENT: &str = concat!("issuetree/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: usize = 100;

/// Fetch pages starting at 1 until one comes back short of [`PAGE_SIZE`].
async fn collect_pages<T, F, Fut>(mut fetch_page: F) -> Result<Vec<T>, GatewayError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, GatewayError>>,
{
    let mut items = Vec::new();
    let mut page = 1u32;
    loop {
        let batch = fetch_page(page).await?;
        let fetched = batch.len();
        items.extend(batch);
        if fetched < PAGE_SIZE {
            return Ok(items);
        }
        page += 1;
    }
}

/// GitHub-backed [`TicketGateway`].
pub struct GitHubGateway {
    client: Client,
    api_url: String,
    web_url: String,
    owner: String,
    repo: String,
    token: Option<String>,
}

impl GitHubGateway {
    /// Create a gateway for one repository.
    pub fn new(config: GitHubConfig) -> Result<Self, GatewayError> {
        if config.owner.trim().is_empty() || config.repo.trim().is_empty() {
            return Err(GatewayError::NotConfigured(
                "GitHub owner and repo are required".to_string(),
            ));
        }

        let token = config
            .token
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()));

        let client = Client::builder()
            .timeout(Duration::from_secs(u64::from(config.timeout_secs)))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            web_url: config.web_url.trim_end_matches('/').to_string(),
            owner: config.owner,
            repo: config.repo,
            token,
        })
    }

    /// Whether a token was found.
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn issues_url(&self) -> String {
        format!("{}/repos/{}/{}/issues", self.api_url, self.owner, self.repo)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);

        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request, recording metrics and mapping error statuses.
    async fn execute(
        &self,
        operation: &'static str,
        subject: String,
        request: RequestBuilder,
    ) -> Result<Response, GatewayError> {
        let start = Instant::now();
        let result = Self::check(subject, request.send().await).await;

        GATEWAY_REQUEST_DURATION
            .with_label_values(&[operation])
            .observe(start.elapsed().as_secs_f64());
        GATEWAY_REQUESTS
            .with_label_values(&[operation, if result.is_ok() { "ok" } else { "error" }])
            .inc();

        result
    }

    async fn check(
        subject: String,
        sent: Result<Response, reqwest::Error>,
    ) -> Result<Response, GatewayError> {
        let response = sent?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }
        if status == 404 || status == 410 {
            return Err(GatewayError::NotFound(subject));
        }

        let exhausted = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "0");
        if status == 429 || (status == 403 && exhausted) {
            return Err(GatewayError::RateLimited);
        }

        let message = response.text().await.unwrap_or_default();
        Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        response: Response,
        what: &str,
    ) -> Result<T, GatewayError> {
        response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(format!("Failed to parse {}: {}", what, e)))
    }
}

#[async_trait]
impl TicketGateway for GitHubGateway {
    fn name(&self) -> &str {
        "github"
    }

    fn ticket_url(&self, number: u64) -> String {
        format!(
            "{}/{}/{}/issues/{}",
            self.web_url, self.owner, self.repo, number
        )
    }

    async fn get_ticket(&self, number: u64) -> Result<Ticket, GatewayError> {
        let url = format!("{}/{}", self.issues_url(), number);
        debug!("GitHub get issue #{}", number);

        let response = self
            .execute(
                "get_ticket",
                format!("ticket #{}", number),
                self.request(Method::GET, &url),
            )
            .await?;
        let issue: GitHubIssue = Self::decode(response, "issue").await?;
        Ok(issue.into())
    }

    async fn list_tickets(&self) -> Result<Vec<Ticket>, GatewayError> {
        let url = self.issues_url();
        let issues: Vec<GitHubIssue> = collect_pages(|page| {
            debug!("GitHub list issues page {}", page);
            let request = self.request(Method::GET, &url).query(&[
                ("state", "all".to_string()),
                ("per_page", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ]);
            async move {
                let response = self
                    .execute("list_tickets", "issue list".to_string(), request)
                    .await?;
                Self::decode(response, "issue list").await
            }
        })
        .await?;

        Ok(issues
            .into_iter()
            .filter(|issue| issue.pull_request.is_none())
            .map(Ticket::from)
            .collect())
    }

    async fn create_ticket(&self, ticket: NewTicket) -> Result<Ticket, GatewayError> {
        let url = self.issues_url();
        debug!("GitHub create issue: title='{}'", ticket.title);

        let request = self.request(Method::POST, &url).json(&json!({
            "title": ticket.title,
            "body": ticket.body,
            "labels": ticket.labels,
        }));
        let response = self
            .execute("create_ticket", "new ticket".to_string(), request)
            .await?;
        let issue: GitHubIssue = Self::decode(response, "created issue").await?;
        Ok(issue.into())
    }

    async fn update_ticket(
        &self,
        number: u64,
        update: TicketUpdate,
    ) -> Result<Ticket, GatewayError> {
        let current = self.get_ticket(number).await?;
        let changes = update.changes_against(&current);
        if changes.is_empty() {
            debug!("No changes to update for ticket #{}", number);
            return Ok(current);
        }

        let url = format!("{}/{}", self.issues_url(), number);
        let request = self.request(Method::PATCH, &url).json(&changes);
        let response = self
            .execute("update_ticket", format!("ticket #{}", number), request)
            .await?;
        let issue: GitHubIssue = Self::decode(response, "updated issue").await?;
        Ok(issue.into())
    }

    async fn list_comments(&self, number: u64) -> Result<Vec<Comment>, GatewayError> {
        let url = format!("{}/{}/comments", self.issues_url(), number);
        let comments: Vec<GitHubComment> = collect_pages(|page| {
            let request = self.request(Method::GET, &url).query(&[
                ("per_page", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ]);
            async move {
                let response = self
                    .execute("list_comments", format!("ticket #{}", number), request)
                    .await?;
                Self::decode(response, "comment list").await
            }
        })
        .await?;
        Ok(comments.into_iter().map(Comment::from).collect())
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<Comment, GatewayError> {
        let url = format!("{}/{}/comments", self.issues_url(), number);
        let request = self.request(Method::POST, &url).json(&json!({ "body": body }));
        let response = self
            .execute("create_comment", format!("ticket #{}", number), request)
            .await?;
        let comment: GitHubComment = Self::decode(response, "created comment").await?;
        Ok(comment.into())
    }

    async fn update_comment(&self, comment_id: u64, body: &str) -> Result<Comment, GatewayError> {
        let url = format!("{}/comments/{}", self.issues_url(), comment_id);
        let request = self
            .request(Method::PATCH, &url)
            .json(&json!({ "body": body }));
        let response = self
            .execute("update_comment", format!("comment {}", comment_id), request)
            .await?;
        let comment: GitHubComment = Self::decode(response, "updated comment").await?;
        Ok(comment.into())
    }

    async fn delete_comment(&self, comment_id: u64) -> Result<(), GatewayError> {
        let url = format!("{}/comments/{}", self.issues_url(), comment_id);
        self.execute(
            "delete_comment",
            format!("comment {}", comment_id),
            self.request(Method::DELETE, &url),
        )
        .await?;
        Ok(())
    }
}

// ============================================================================
// GitHub API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GitHubIssue {
    number: u64,
    title: String,
    body: Option<String>,
    state: TicketState,
    #[serde(default)]
    labels: Vec<GitHubLabel>,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GitHubLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GitHubComment {
    id: u64,
    body: Option<String>,
    user: Option<GitHubUser>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
}

impl From<GitHubIssue> for Ticket {
    fn from(issue: GitHubIssue) -> Self {
        Self {
            number: issue.number,
            title: issue.title,
            body: issue.body.unwrap_or_default(),
            state: issue.state,
            labels: issue.labels.into_iter().map(|l| l.name).collect(),
        }
    }
}

impl From<GitHubComment> for Comment {
    fn from(comment: GitHubComment) -> Self {
        Self {
            id: comment.id,
            body: comment.body.unwrap_or_default(),
            author: comment.user.map(|u| u.login),
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GitHubConfig {
        GitHubConfig {
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
            token: Some("secret".to_string()),
            api_url: "https://api.github.com/".to_string(),
            web_url: "https://github.com".to_string(),
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_new_requires_owner_and_repo() {
        let mut cfg = config();
        cfg.repo = "  ".to_string();
        let result = GitHubGateway::new(cfg);
        assert!(matches!(result, Err(GatewayError::NotConfigured(_))));
    }

    #[test]
    fn test_ticket_url() {
        let gateway = GitHubGateway::new(config()).unwrap();
        assert_eq!(
            gateway.ticket_url(42),
            "https://github.com/acme/widgets/issues/42"
        );
        assert_eq!(
            gateway.issues_url(),
            "https://api.github.com/repos/acme/widgets/issues"
        );
        assert!(gateway.is_authenticated());
    }

    #[test]
    fn test_issue_conversion() {
        let json = r#"{
            "id": 99001,
            "number": 7,
            "title": "Parent task",
            "body": null,
            "state": "closed",
            "labels": [{"id": 1, "name": "automation"}]
        }"#;
        let issue: GitHubIssue = serde_json::from_str(json).unwrap();
        assert!(issue.pull_request.is_none());

        let ticket = Ticket::from(issue);
        assert_eq!(ticket.number, 7);
        assert_eq!(ticket.body, "");
        assert_eq!(ticket.state, TicketState::Closed);
        assert_eq!(ticket.labels, vec!["automation".to_string()]);
    }

    #[test]
    fn test_pull_request_is_detected() {
        let json = r#"{
            "number": 8,
            "title": "A PR",
            "body": "x",
            "state": "open",
            "pull_request": {"url": "https://api.github.com/repos/acme/widgets/pulls/8"}
        }"#;
        let issue: GitHubIssue = serde_json::from_str(json).unwrap();
        assert!(issue.pull_request.is_some());
    }

    #[tokio::test]
    async fn test_collect_pages_follows_full_pages() {
        let mut requested = Vec::new();
        let items = collect_pages(|page| {
            requested.push(page);
            let size = if page < 3 { PAGE_SIZE } else { 7 };
            async move { Ok::<_, GatewayError>(vec![page; size]) }
        })
        .await
        .unwrap();

        assert_eq!(requested, vec![1, 2, 3]);
        assert_eq!(items.len(), 2 * PAGE_SIZE + 7);
        assert_eq!(items.last(), Some(&3));
    }

    #[tokio::test]
    async fn test_collect_pages_stops_on_error() {
        let mut calls = 0;
        let result: Result<Vec<u32>, _> = collect_pages(|page| {
            calls += 1;
            async move {
                if page == 2 {
                    Err(GatewayError::Parse("bad page".to_string()))
                } else {
                    Ok(vec![0; PAGE_SIZE])
                }
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_comment_conversion() {
        let json = r#"{
            "id": 555,
            "body": "Looks good",
            "user": {"login": "octocat"},
            "created_at": "2024-01-02T03:04:05Z",
            "updated_at": "2024-01-02T03:04:05Z"
        }"#;
        let comment: GitHubComment = serde_json::from_str(json).unwrap();
        let comment = Comment::from(comment);
        assert_eq!(comment.id, 555);
        assert_eq!(comment.author.as_deref(), Some("octocat"));
        assert!(comment.created_at.is_some());
    }
}
