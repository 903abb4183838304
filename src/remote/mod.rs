//! Typed, paginated, authenticated HTTP façade over the remote task API.
//!
//! One method per resource action, request/response logging at
//! `info`/`debug`, the status code read off the response before the body is
//! consumed so error classification always has it available.

pub mod models;

use crate::error::RemoteError;
use models::*;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

const PAGE_LIMIT: u32 = 200;
const USER_PAGE_LIMIT: u32 = 100;
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

pub struct RemoteClient {
    base_url: String,
    token: String,
    client: Client,
}

impl RemoteClient {
    pub fn new(base_url: String, token: String) -> Self {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("reqwest client with default TLS backend");
        Self {
            base_url,
            token,
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ============ Paginated list operations ============

    pub async fn list_projects(&self) -> Result<Vec<Project>, RemoteError> {
        self.paginate("/projects", &[], PAGE_LIMIT).await
    }

    pub async fn list_sections(&self, project_id: &str) -> Result<Vec<Section>, RemoteError> {
        self.paginate("/sections", &[("project_id", project_id)], PAGE_LIMIT)
            .await
    }

    pub async fn list_tasks(&self, project_id: Option<&str>) -> Result<Vec<Task>, RemoteError> {
        let query: Vec<(&str, &str)> = match project_id {
            Some(p) => vec![("project_id", p)],
            None => vec![],
        };
        self.paginate("/tasks", &query, PAGE_LIMIT).await
    }

    pub async fn list_labels(&self) -> Result<Vec<Label>, RemoteError> {
        self.paginate("/labels", &[], PAGE_LIMIT).await
    }

    pub async fn list_comments(&self, task_id: &str) -> Result<Vec<serde_json::Value>, RemoteError> {
        self.paginate("/comments", &[("task_id", task_id)], PAGE_LIMIT)
            .await
    }

    pub async fn list_workspace_users(&self) -> Result<Vec<DirectoryEntry>, RemoteError> {
        let raw: Vec<serde_json::Value> = self
            .paginate("/workspaces/users", &[], USER_PAGE_LIMIT)
            .await?;
        Ok(raw.iter().filter_map(DirectoryEntry::from_value).collect())
    }

    pub async fn list_project_collaborators(
        &self,
        project_id: &str,
    ) -> Result<Vec<DirectoryEntry>, RemoteError> {
        let raw: Vec<serde_json::Value> = self
            .paginate(
                &format!("/projects/{project_id}/collaborators"),
                &[],
                USER_PAGE_LIMIT,
            )
            .await?;
        Ok(raw.iter().filter_map(DirectoryEntry::from_value).collect())
    }

    /// Concatenate every page of a cursor-paginated list endpoint.
    async fn paginate<T: DeserializeOwned>(
        &self,
        path: &str,
        fixed_query: &[(&str, &str)],
        limit: u32,
    ) -> Result<Vec<T>, RemoteError> {
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        let limit_str = limit.to_string();

        loop {
            let mut query: Vec<(&str, &str)> = fixed_query.to_vec();
            query.push(("limit", &limit_str));
            if let Some(c) = cursor.as_deref() {
                query.push(("cursor", c));
            }

            let page: Page<T> = self.get(path, &query).await?;
            let got = page.results.len();
            out.extend(page.results);
            log::debug!("{}: fetched page of {} (total {})", path, got, out.len());

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        Ok(out)
    }

    // ============ Single-item reads ============

    pub async fn get_task(&self, id: &str) -> Result<Task, RemoteError> {
        self.get(&format!("/tasks/{id}"), &[]).await
    }

    pub async fn get_current_user(&self) -> Result<DirectoryEntry, RemoteError> {
        let raw: serde_json::Value = self.get("/user", &[]).await?;
        DirectoryEntry::from_value(&raw)
            .ok_or_else(|| RemoteError::Permanent {
                status: 200,
                message: "malformed current-user response".to_string(),
            })
    }

    // ============ Mutations ============

    pub async fn create_task(&self, fields: &CreateTaskFields) -> Result<Task, RemoteError> {
        self.post("/tasks", fields).await
    }

    pub async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task, RemoteError> {
        self.post(&format!("/tasks/{id}"), patch).await
    }

    pub async fn close_task(&self, id: &str) -> Result<(), RemoteError> {
        self.post_empty(&format!("/tasks/{id}/close")).await
    }

    pub async fn reopen_task(&self, id: &str) -> Result<(), RemoteError> {
        self.post_empty(&format!("/tasks/{id}/reopen")).await
    }

    pub async fn delete_task(&self, id: &str) -> Result<(), RemoteError> {
        self.delete(&format!("/tasks/{id}")).await
    }

    pub async fn quick_add(&self, text: &str) -> Result<Task, RemoteError> {
        #[derive(Serialize)]
        struct QuickAddBody<'a> {
            text: &'a str,
        }
        self.post("/tasks/quick", &QuickAddBody { text }).await
    }

    pub async fn create_project(&self, name: &str) -> Result<Project, RemoteError> {
        #[derive(Serialize)]
        struct CreateProjectBody<'a> {
            name: &'a str,
        }
        self.post("/projects", &CreateProjectBody { name }).await
    }

    pub async fn archive_project(&self, id: &str) -> Result<Project, RemoteError> {
        self.post_no_body(&format!("/projects/{id}/archive")).await
    }

    pub async fn unarchive_project(&self, id: &str) -> Result<Project, RemoteError> {
        self.post_no_body(&format!("/projects/{id}/unarchive")).await
    }

    // ============ Low-level HTTP + error classification ============

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, RemoteError> {
        let url = self.url(path);
        log::debug!("GET {} {:?}", url, query);

        let response = self
            .client
            .get(&url)
            .query(query)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(classify_transport_error)?;

        self.parse_response(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RemoteError> {
        let url = self.url(path);
        log::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        self.parse_response(response).await
    }

    async fn post_no_body<T: DeserializeOwned>(&self, path: &str) -> Result<T, RemoteError> {
        let url = self.url(path);
        log::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Content-Length", "0")
            .send()
            .await
            .map_err(classify_transport_error)?;

        self.parse_response(response).await
    }

    async fn post_empty(&self, path: &str) -> Result<(), RemoteError> {
        let url = self.url(path);
        log::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(classify_transport_error)?;

        self.check_empty_response(response).await
    }

    async fn delete(&self, path: &str) -> Result<(), RemoteError> {
        let url = self.url(path);
        log::debug!("DELETE {}", url);

        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(classify_transport_error)?;

        self.check_empty_response(response).await
    }

    async fn parse_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, RemoteError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body_text = response.text().await.map_err(classify_transport_error)?;
        serde_json::from_str(&body_text).map_err(|e| {
            log::error!("JSON parse error: {} (body: {})", e, truncate(&body_text));
            RemoteError::Permanent {
                status: status.as_u16(),
                message: format!("failed to parse response: {e}"),
            }
        })
    }

    async fn check_empty_response(&self, response: reqwest::Response) -> Result<(), RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

fn truncate(s: &str) -> &str {
    &s[..s.len().min(500)]
}

/// Classify a non-2xx response by status code.
fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    log::error!("API error {}: {}", status, truncate(body));
    match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound,
        StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimited,
        StatusCode::REQUEST_TIMEOUT => RemoteError::Transient(body.to_string()),
        s if s.is_server_error() => RemoteError::Transient(body.to_string()),
        s => RemoteError::Permanent {
            status: s.as_u16(),
            message: body.to_string(),
        },
    }
}

/// Network/timeout failures with no status are treated as transient.
fn classify_transport_error(e: reqwest::Error) -> RemoteError {
    log::error!("HTTP request failed: {e}");
    if let Some(status) = e.status() {
        classify_status(status, &e.to_string())
    } else {
        RemoteError::Transient(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_not_found() {
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, ""),
            RemoteError::NotFound
        ));
    }

    #[test]
    fn classify_rate_limited_is_transient() {
        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, "");
        assert!(err.is_transient());
    }

    #[test]
    fn classify_5xx_is_transient() {
        let err = classify_status(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(err.is_transient());
    }

    #[test]
    fn classify_other_4xx_is_permanent() {
        let err = classify_status(StatusCode::FORBIDDEN, "nope");
        assert!(!err.is_transient());
        assert_eq!(err.status(), Some(403));
    }
}
