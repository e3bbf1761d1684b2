use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::GitHubConfig;
use crate::state::StarCounts;

const ACCEPT_JSON: &str = "application/vnd.github.v3+json";
const ACCEPT_STAR_JSON: &str = "application/vnd.github.star+json";

/// Repository entry of the listing endpoint
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Repository {
    pub name: String,
    pub stargazers_count: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StargazerUser {
    pub login: String,
}

/// A star event, as returned with the `star+json` media type
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Stargazer {
    pub starred_at: DateTime<Utc>,
    pub user: StargazerUser,
}

/// Stargazers of one repository that starred at or after a cutoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoStargazers {
    pub name: String,
    pub current_total: u64,
    pub new_stargazers: Vec<Stargazer>,
}

/// Upstream API failures
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API returned {status} for {url}")]
    Status { status: StatusCode, url: Url },

    #[error("Invalid pagination link: {0}")]
    InvalidLink(String),

    #[error("Pagination loops back to already fetched page {0}")]
    PaginationLoop(Url),
}

/// GitHub REST client for repository and stargazer listings
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    base_url: Url,
    per_page: u32,
}

impl GitHubClient {
    /// Create a client; without a token requests are unauthenticated
    pub fn new(config: &GitHubConfig, token: Option<&str>) -> Result<Self> {
        let base_url = Url::parse(&config.api_url)
            .with_context(|| format!("Invalid GitHub API URL: {}", config.api_url))?;

        let mut headers = HeaderMap::new();
        let user_agent = format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&user_agent).context("Invalid user agent")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_JSON));

        match token {
            Some(token) => {
                let mut value = HeaderValue::from_str(&format!("token {}", token))
                    .context("GitHub token contains invalid characters")?;
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            None => warn!("No GitHub token configured, using unauthenticated requests"),
        }

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .context("Failed to create GitHub HTTP client")?;

        Ok(Self {
            http,
            base_url,
            per_page: config.per_page,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{}{}", base, path))
            .with_context(|| format!("Failed to build GitHub URL for {}", path))
    }

    /// List all public repositories of an account
    pub async fn list_repositories(&self, account: &str) -> Result<Vec<Repository>> {
        debug!("Fetching repositories for: {}", account);

        let url = self.endpoint(&format!("/users/{}/repos", account))?;
        let repositories: Vec<Repository> = self
            .get_all_pages(url, ACCEPT_JSON)
            .await
            .with_context(|| format!("Failed to fetch repositories for {}", account))?;

        info!("Found {} repositories for {}", repositories.len(), account);
        Ok(repositories)
    }

    /// List every stargazer of a repository with the time they starred it
    pub async fn list_stargazers(&self, account: &str, repo: &str) -> Result<Vec<Stargazer>> {
        debug!("Fetching stargazers for: {}/{}", account, repo);

        let url = self.endpoint(&format!("/repos/{}/{}/stargazers", account, repo))?;
        self.get_all_pages(url, ACCEPT_STAR_JSON)
            .await
            .with_context(|| format!("Failed to fetch stargazers for {}/{}", account, repo))
    }

    /// Current star count of every repository of an account
    pub async fn star_counts(&self, account: &str) -> Result<StarCounts> {
        let repositories = self.list_repositories(account).await?;

        Ok(repositories
            .into_iter()
            .map(|repo| (repo.name, repo.stargazers_count))
            .collect())
    }

    /// Stargazers starred in `[cutoff, until)` for every repository of an account
    ///
    /// Repositories without stars are not queried for stargazers.
    pub async fn stargazers_since(
        &self,
        account: &str,
        cutoff: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<RepoStargazers>> {
        let repositories = self.list_repositories(account).await?;
        let mut results = Vec::with_capacity(repositories.len());

        for repo in repositories {
            let new_stargazers = if repo.stargazers_count == 0 {
                Vec::new()
            } else {
                self.list_stargazers(account, &repo.name)
                    .await?
                    .into_iter()
                    .filter(|stargazer| {
                        stargazer.starred_at >= cutoff && stargazer.starred_at < until
                    })
                    .collect()
            };

            results.push(RepoStargazers {
                name: repo.name,
                current_total: repo.stargazers_count,
                new_stargazers,
            });
        }

        Ok(results)
    }

    /// Fetch every page of a listing endpoint by following `rel="next"` links
    async fn get_all_pages<T: DeserializeOwned>(&self, url: Url, accept: &str) -> Result<Vec<T>> {
        let mut results = Vec::new();
        let mut next = Some(url);
        let mut first = true;
        let mut visited = HashSet::new();

        while let Some(url) = next {
            let mut request = self.http.get(url.clone()).header(ACCEPT, accept);
            // Later pages carry their own query string
            if first {
                request = request.query(&[("per_page", self.per_page)]);
                first = false;
            }

            debug!("GET {}", url);
            let response = request
                .send()
                .await
                .with_context(|| format!("Request to {} failed", url))?;

            let status = response.status();
            if !status.is_success() {
                return Err(GitHubError::Status { status, url }.into());
            }

            visited.insert(response.url().clone());
            next = next_page_url(response.headers())?;
            if let Some(link) = next.as_ref().filter(|link| visited.contains(*link)) {
                return Err(GitHubError::PaginationLoop(link.clone()).into());
            }

            let page: Vec<T> = response
                .json()
                .await
                .with_context(|| format!("Failed to decode response from {}", url))?;
            debug!("Received {} items", page.len());
            results.extend(page);
        }

        Ok(results)
    }
}

/// Extract the `rel="next"` target from a `Link` header
pub fn next_page_url(headers: &HeaderMap) -> Result<Option<Url>, GitHubError> {
    for value in headers.get_all(LINK) {
        let Ok(value) = value.to_str() else {
            continue;
        };

        for link in value.split(',') {
            let mut parts = link.split(';');
            let Some(target) = parts.next() else {
                continue;
            };

            let is_next = parts.any(|param| {
                let param = param.trim();
                param == "rel=\"next\"" || param == "rel=next"
            });
            if !is_next {
                continue;
            }

            let target = target
                .trim()
                .strip_prefix('<')
                .and_then(|t| t.strip_suffix('>'))
                .ok_or_else(|| GitHubError::InvalidLink(link.trim().to_string()))?;

            return Url::parse(target)
                .map(Some)
                .map_err(|_| GitHubError::InvalidLink(target.to_string()));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> GitHubConfig {
        GitHubConfig {
            api_url: server.uri(),
            per_page: 2,
            ..GitHubConfig::default()
        }
    }

    fn link_headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(LINK, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_next_page_url_parsing() {
        let headers = link_headers(
            "<https://api.github.com/user/1/repos?page=2>; rel=\"next\", \
             <https://api.github.com/user/1/repos?page=5>; rel=\"last\"",
        );
        let next = next_page_url(&headers).unwrap().unwrap();
        assert_eq!(next.as_str(), "https://api.github.com/user/1/repos?page=2");
    }

    #[test]
    fn test_next_page_url_absent() {
        let headers = link_headers(
            "<https://api.github.com/user/1/repos?page=1>; rel=\"prev\", \
             <https://api.github.com/user/1/repos?page=1>; rel=\"first\"",
        );
        assert_eq!(next_page_url(&headers).unwrap(), None);
        assert_eq!(next_page_url(&HeaderMap::new()).unwrap(), None);
    }

    #[test]
    fn test_next_page_url_malformed() {
        let headers = link_headers("https://no-brackets; rel=\"next\"");
        assert_matches!(next_page_url(&headers), Err(GitHubError::InvalidLink(_)));
    }

    #[tokio::test]
    async fn test_list_repositories_follows_pagination() {
        let server = MockServer::start().await;
        let page_two = format!("{}/users/octocat/repos?page=2", server.uri());

        Mock::given(method("GET"))
            .and(path("/users/octocat/repos"))
            .and(query_param("per_page", "2"))
            .and(header("authorization", "token secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("link", format!("<{}>; rel=\"next\"", page_two).as_str())
                    .set_body_json(json!([
                        {"name": "a", "stargazers_count": 5},
                        {"name": "b", "stargazers_count": 2}
                    ])),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/users/octocat/repos"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"name": "c", "stargazers_count": 0}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = GitHubClient::new(&test_config(&server), Some("secret")).unwrap();
        let counts = client.star_counts("octocat").await.unwrap();

        let expected: StarCounts = [
            ("a".to_string(), 5),
            ("b".to_string(), 2),
            ("c".to_string(), 0),
        ]
        .into();
        assert_eq!(counts, expected);
    }

    #[tokio::test]
    async fn test_pagination_loop_is_an_error() {
        let server = MockServer::start().await;
        let same_page = format!("{}/users/octocat/repos?per_page=2", server.uri());

        Mock::given(method("GET"))
            .and(path("/users/octocat/repos"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("link", format!("<{}>; rel=\"next\"", same_page).as_str())
                    .set_body_json(json!([{"name": "a", "stargazers_count": 1}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = GitHubClient::new(&test_config(&server), Some("secret")).unwrap();
        let err = client.list_repositories("octocat").await.unwrap_err();

        assert_matches!(
            err.downcast_ref::<GitHubError>(),
            Some(GitHubError::PaginationLoop(_))
        );
    }

    #[tokio::test]
    async fn test_error_status_is_fatal() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/octocat/repos"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = GitHubClient::new(&test_config(&server), Some("bad")).unwrap();
        let err = client.list_repositories("octocat").await.unwrap_err();

        let api_error = err.downcast_ref::<GitHubError>().expect("GitHubError in chain");
        assert_matches!(
            api_error,
            GitHubError::Status { status, .. } if *status == StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_stargazers_since_filters_by_cutoff() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/octocat/repos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "starred", "stargazers_count": 3},
                {"name": "empty", "stargazers_count": 0}
            ])))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/repos/octocat/starred/stargazers"))
            .and(header("accept", ACCEPT_STAR_JSON))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"starred_at": "2024-01-01T00:00:00Z", "user": {"login": "old"}},
                {"starred_at": "2024-02-01T00:00:00Z", "user": {"login": "edge"}},
                {"starred_at": "2024-02-03T10:00:00Z", "user": {"login": "new"}},
                {"starred_at": "2024-02-05T00:00:00Z", "user": {"login": "next-run"}},
                {"starred_at": "2024-02-06T00:00:00Z", "user": {"login": "later"}}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        // No token: unauthenticated requests are allowed in this mode
        let client = GitHubClient::new(&test_config(&server), None).unwrap();
        let cutoff = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let until = Utc.with_ymd_and_hms(2024, 2, 5, 0, 0, 0).unwrap();
        let results = client
            .stargazers_since("octocat", cutoff, until)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "starred");
        assert_eq!(results[0].current_total, 3);
        let logins: Vec<_> = results[0]
            .new_stargazers
            .iter()
            .map(|s| s.user.login.as_str())
            .collect();
        assert_eq!(logins, vec!["edge", "new"]);
        assert!(results[1].new_stargazers.is_empty());
    }
}
