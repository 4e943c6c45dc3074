//! GEOME project enumeration
//!
//! GEOME has no global record listing. The loader lists the public projects
//! once, then pages through the samples of each project in turn.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use super::{CursorEntry, CursorError, Page, PageLoader, PageRequest};
use crate::http::{self, HttpError};

pub const GEOME_API: &str = "https://api.geome-db.org/v1/";

#[derive(Debug)]
pub struct GeomeProjectLoader {
    client: Client,
    api_base: String,
    projects: Option<VecDeque<i64>>,
    current: Option<(i64, usize)>,
}

impl GeomeProjectLoader {
    /// `api_base` must end with a slash, like [`GEOME_API`]
    pub fn new(client: Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            projects: None,
            current: None,
        }
    }

    async fn list_projects(&self) -> Result<VecDeque<i64>, CursorError> {
        let url = format!("{}projects?includePublic=true&admin=false", self.api_base);
        let response = http::get(&self.client, &url, Some("application/json")).await?;
        let data = response.json().map_err(|e| CursorError::Parse {
            url: url.clone(),
            message: e.to_string(),
        })?;

        let projects: VecDeque<i64> = data
            .as_array()
            .ok_or_else(|| CursorError::Parse {
                url: url.clone(),
                message: "project list is not an array".to_string(),
            })?
            .iter()
            .filter_map(|p| p.get("projectId").and_then(Value::as_i64))
            .collect();

        info!(projects = projects.len(), "Loaded GEOME project ids");
        Ok(projects)
    }

    fn records_url(&self, project_id: i64, page: usize, limit: usize) -> String {
        format!(
            "{}records/Sample/json?limit={}&page={}&q=_projects_:{}",
            self.api_base, limit, page, project_id
        )
    }
}

/// `bcid` of every sample in a records response
pub fn sample_identifiers(data: &Value) -> Vec<String> {
    data.pointer("/content/Sample")
        .and_then(Value::as_array)
        .map(|samples| {
            samples
                .iter()
                .filter_map(|s| s.get("bcid").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl PageLoader for GeomeProjectLoader {
    async fn load_page(&mut self, request: &PageRequest) -> Result<Page, CursorError> {
        if self.projects.is_none() {
            self.projects = Some(self.list_projects().await?);
        }

        loop {
            let (project_id, page) = match self.current {
                Some(current) => current,
                None => match self.projects.as_mut().and_then(VecDeque::pop_front) {
                    Some(project_id) => (project_id, 0),
                    None => return Ok(Page::exhausted()),
                },
            };

            let url = self.records_url(project_id, page, request.page_size);
            let response = match http::get(&self.client, &url, Some("application/json")).await {
                Ok(response) => response,
                // A project that refuses listing is skipped, not fatal
                Err(HttpError::Status { status, .. }) => {
                    warn!(project_id, status, "Unable to list project, moving on");
                    self.current = None;
                    continue;
                },
                Err(e) => return Err(e.into()),
            };

            let data = response.json().map_err(|e| CursorError::Parse {
                url: url.clone(),
                message: e.to_string(),
            })?;
            let identifiers = sample_identifiers(&data);
            debug!(project_id, page, found = identifiers.len(), "Loaded GEOME page");

            self.current = if identifiers.len() < request.page_size {
                None
            } else {
                Some((project_id, page + 1))
            };

            if !identifiers.is_empty() {
                let entries = identifiers
                    .into_iter()
                    .map(|id| CursorEntry::new(id, None))
                    .collect();
                return Ok(Page::new(entries));
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::cursor::{CursorOptions, IdentifierCursor};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_sample_identifiers() {
        let data = json!({
            "content": {"Sample": [
                {"bcid": "ark:/21547/ABC1", "materialSampleID": "x"},
                {"materialSampleID": "no-bcid"},
                {"bcid": "ark:/21547/ABC2"}
            ]},
            "page": 0,
            "limit": 3
        });
        assert_eq!(
            sample_identifiers(&data),
            vec!["ark:/21547/ABC1", "ark:/21547/ABC2"]
        );
        assert!(sample_identifiers(&json!({})).is_empty());
    }

    #[test]
    fn test_records_url() {
        let loader = GeomeProjectLoader::new(Client::new(), GEOME_API);
        assert_eq!(
            loader.records_url(42, 3, 100),
            "https://api.geome-db.org/v1/records/Sample/json?limit=100&page=3&q=_projects_:42"
        );
    }

    fn samples(ids: &[&str]) -> Value {
        let samples: Vec<Value> = ids.iter().map(|id| json!({"bcid": id})).collect();
        json!({"content": {"Sample": samples}})
    }

    async fn mount_records(
        server: &MockServer,
        project: i64,
        page: usize,
        response: ResponseTemplate,
    ) {
        Mock::given(method("GET"))
            .and(path("/records/Sample/json"))
            .and(query_param("q", format!("_projects_:{}", project)))
            .and(query_param("page", page.to_string()))
            .respond_with(response)
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_enumerates_projects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"projectId": 1},
                {"projectId": 2},
                {"projectTitle": "no id"},
                {"projectId": 3}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        // a full first page, then an empty one, ends project 1
        let ok = |ids: &[&str]| ResponseTemplate::new(200).set_body_json(samples(ids));
        mount_records(&server, 1, 0, ok(&["a", "b"])).await;
        mount_records(&server, 1, 1, ok(&[])).await;
        // project 2 refuses listing
        mount_records(&server, 2, 0, ResponseTemplate::new(403)).await;
        // a short page ends project 3 without asking for page 1
        mount_records(&server, 3, 0, ok(&["c"])).await;

        let loader = GeomeProjectLoader::new(Client::new(), format!("{}/", server.uri()));
        let mut cursor = IdentifierCursor::new(loader, CursorOptions::default().page_size(2));

        let mut ids = Vec::new();
        while let Some(entry) = cursor.next().await.unwrap() {
            ids.push(entry.identifier);
        }
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_project_list_failure_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let loader = GeomeProjectLoader::new(Client::new(), format!("{}/", server.uri()));
        let mut cursor = IdentifierCursor::new(loader, CursorOptions::default());
        assert!(matches!(cursor.next().await, Err(CursorError::Http(_))));
    }
}
