use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, LINK};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::cli::{CloneTarget, Credentials, InvocationConfig};
use crate::config::Config;
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Page size requested from every listing endpoint (the API maximum)
pub const PAGE_SIZE: u32 = 100;

/// One repository as returned by a listing endpoint
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RepositoryRecord {
    pub name: String,
    pub html_url: String,
    #[serde(rename = "default_branch", default)]
    pub default_branch_hint: Option<String>,
    /// Every other field of the API object, untouched
    #[serde(flatten)]
    pub raw: Map<String, Value>,
}

/// A release and its downloadable assets
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: Option<String>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: Option<String>,
}

/// Failures talking to the GitHub API
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    /// The listing endpoint answered with something other than a JSON array,
    /// typically an error object such as `{"message": "Bad credentials"}`
    #[error("enumeration failed at {url}: {payload}")]
    Enumeration { url: String, payload: Value },

    #[error("failed to decode response from {url}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed Link header entry: {0:?}")]
    MalformedLink(String),
}

/// One decoded page of a listing
struct Page {
    items: Vec<Value>,
    next: Option<String>,
}

/// GitHub REST client with optional Basic authentication
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    credentials: Option<Credentials>,
    retry: RetryPolicy,
}

impl GitHubClient {
    /// Create a client from configuration; `credentials` of `None` means anonymous requests
    pub fn new(config: &Config, credentials: Option<Credentials>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );

        let http = reqwest::Client::builder()
            .user_agent(concat!("github-clone-all/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(config.http.timeout())
            .connect_timeout(config.http.connect_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        match &credentials {
            Some(creds) => debug!("Using Basic authentication as {:?}", creds.user),
            None => debug!("Using unauthenticated requests"),
        }

        Ok(Self {
            http,
            api_url: config.api_url().to_string(),
            credentials,
            retry: config.http.retry_policy(),
        })
    }

    /// Disable retries; every request is attempted exactly once
    pub fn without_retries(mut self) -> Self {
        self.retry = RetryPolicy::none();
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Seed URL of the listing endpoint for an invocation
    pub fn listing_url(&self, invocation: &InvocationConfig) -> String {
        format!("{}{}", self.api_url, listing_path(invocation))
    }

    /// List every repository of the invocation's target, across all pages
    pub async fn list_repositories(
        &self,
        invocation: &InvocationConfig,
    ) -> Result<Vec<RepositoryRecord>, FetchError> {
        let url = self.listing_url(invocation);
        let repositories: Vec<RepositoryRecord> = self.fetch_paginated(&url).await?;

        info!(
            "Found {} repositories for {}",
            repositories.len(),
            invocation.target_name()
        );
        Ok(repositories)
    }

    /// List a user's public repositories, across all pages
    pub async fn list_public_repositories(
        &self,
        user: &str,
    ) -> Result<Vec<RepositoryRecord>, FetchError> {
        let url = format!("{}/users/{}/repos?per_page={}", self.api_url, user, PAGE_SIZE);
        self.fetch_paginated(&url).await
    }

    /// List the releases of one repository (single request, not paginated)
    pub async fn list_releases(&self, owner: &str, repo: &str) -> Result<Vec<Release>, FetchError> {
        let url = format!("{}/repos/{}/{}/releases", self.api_url, owner, repo);
        let page = self.fetch_page(&url).await?;

        if page.next.is_some() {
            debug!("Ignoring further release pages for {}/{}", owner, repo);
        }

        decode_items(&url, page.items)
    }

    /// Download a file, failing on any non-success status
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.get(url).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let bytes = response.bytes().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;

        Ok(bytes.to_vec())
    }

    /// Follow `rel="next"` links from `seed_url` and concatenate every page
    /// in the order the API returned them
    pub async fn fetch_paginated<T: DeserializeOwned>(
        &self,
        seed_url: &str,
    ) -> Result<Vec<T>, FetchError> {
        let mut items = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(seed_url.to_string());

        while let Some(url) = next.take() {
            if !visited.insert(url.clone()) {
                warn!("Pagination loops back to {}, stopping", url);
                break;
            }

            let page = self.fetch_page(&url).await?;
            debug!("Page {} returned {} items", visited.len(), page.items.len());

            items.extend(decode_items::<T>(&url, page.items)?);
            next = page.next;
        }

        Ok(items)
    }

    async fn fetch_page(&self, url: &str) -> Result<Page, FetchError> {
        let response = self.get(url).await?;

        let links = match response.headers().get(LINK) {
            Some(value) => {
                let value = value
                    .to_str()
                    .map_err(|_| FetchError::MalformedLink(format!("{:?}", value)))?;
                parse_link_header(value)?
            }
            None => HashMap::new(),
        };

        let status = response.status();
        let body = response.text().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;
        debug!("{} -> {} ({} bytes)", url, status, body.len());

        let payload: Value = serde_json::from_str(&body).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })?;

        match payload {
            Value::Array(items) => Ok(Page {
                items,
                next: links.get("next").cloned(),
            }),
            other => Err(FetchError::Enumeration {
                url: url.to_string(),
                payload: other,
            }),
        }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        info!("HTTP fetch: {}", url);

        retry_with_backoff(&self.retry, "HTTP GET", is_transient, || {
            let mut request = self.http.get(url);
            if let Some(creds) = &self.credentials {
                request = request.basic_auth(&creds.user, Some(&creds.password));
            }
            request.send()
        })
        .await
        .map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })
    }
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn decode_items<T: DeserializeOwned>(url: &str, items: Vec<Value>) -> Result<Vec<T>, FetchError> {
    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item).map_err(|source| FetchError::Decode {
                url: url.to_string(),
                source,
            })
        })
        .collect()
}

/// Path and query of the listing endpoint for an invocation.
///
/// Cloning your own account goes through `/user/repos` so private
/// repositories are included.
pub fn listing_path(invocation: &InvocationConfig) -> String {
    match invocation.target() {
        CloneTarget::Organization(org) => format!("/orgs/{}/repos?per_page={}", org, PAGE_SIZE),
        CloneTarget::User(_) if invocation.is_own_account() => {
            format!("/user/repos?per_page={}&type=owner", PAGE_SIZE)
        }
        CloneTarget::User(user) => format!("/users/{}/repos?per_page={}&type=all", user, PAGE_SIZE),
    }
}

/// Parse a `Link` header into relation name → URL.
///
/// Input: `<url&page=1>; rel="prev", <url&page=3>; rel="next"`
/// Result: `{"prev": "url&page=1", "next": "url&page=3"}`
///
/// An entry without a `<url>` or without a `rel` parameter is an error.
pub fn parse_link_header(header: &str) -> Result<HashMap<String, String>, FetchError> {
    let mut links = HashMap::new();

    for entry in header.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let mut components = entry.split(';').map(str::trim);

        let url = components
            .next()
            .and_then(|target| target.strip_prefix('<'))
            .and_then(|target| target.strip_suffix('>'))
            .filter(|url| !url.is_empty())
            .ok_or_else(|| FetchError::MalformedLink(entry.to_string()))?;

        let rel = components
            .find_map(|param| param.strip_prefix("rel="))
            .map(|rel| rel.trim_matches(|c: char| c == '"' || c == ' '))
            .filter(|rel| !rel.is_empty())
            .ok_or_else(|| FetchError::MalformedLink(entry.to_string()))?;

        // rel="next last" names two relations for the same target
        for name in rel.split_whitespace() {
            links.insert(name.to_string(), url.to_string());
        }
    }

    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use quickcheck_macros::quickcheck;
    use serde_json::json;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn invocation(auth_user: Option<&str>, target: CloneTarget) -> InvocationConfig {
        InvocationConfig::new(auth_user.map(String::from), None, target)
    }

    fn repo(name: &str) -> Value {
        json!({
            "name": name,
            "full_name": format!("octo/{}", name),
            "html_url": format!("https://github.com/octo/{}", name),
            "default_branch": "main",
            "private": false,
        })
    }

    fn client_for(server: &MockServer, credentials: Option<Credentials>) -> GitHubClient {
        let mut config = Config::default();
        config.github.api_url = server.uri();
        config.http.retry_backoff_ms = 1;
        GitHubClient::new(&config, credentials).expect("client")
    }

    fn names(repos: &[RepositoryRecord]) -> Vec<&str> {
        repos.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_parse_link_header() {
        let links = parse_link_header(
            r#"<https://x/a?page=2>; rel="next", <https://x/a?page=1>; rel="prev""#,
        )
        .expect("well-formed header");

        let expected: HashMap<String, String> = [
            ("next".to_string(), "https://x/a?page=2".to_string()),
            ("prev".to_string(), "https://x/a?page=1".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(links, expected);
    }

    #[test]
    fn test_parse_link_header_github_shape() {
        let links = parse_link_header(
            "<https://api.github.com/user/repos?page=3&per_page=100>; rel=\"next\", \
             <https://api.github.com/user/repos?page=50&per_page=100>; rel=\"last\"",
        )
        .expect("well-formed header");

        assert_eq!(
            links.get("next").map(String::as_str),
            Some("https://api.github.com/user/repos?page=3&per_page=100")
        );
        assert_eq!(
            links.get("last").map(String::as_str),
            Some("https://api.github.com/user/repos?page=50&per_page=100")
        );
    }

    #[test]
    fn test_parse_link_header_extra_params_and_multiple_rels() {
        let links = parse_link_header(r#"<https://x/b>; title="b"; rel="next last""#)
            .expect("well-formed header");
        assert_eq!(links.get("next").map(String::as_str), Some("https://x/b"));
        assert_eq!(links.get("last").map(String::as_str), Some("https://x/b"));
    }

    #[test]
    fn test_parse_link_header_empty() {
        assert!(parse_link_header("").expect("empty header").is_empty());
    }

    #[test]
    fn test_parse_link_header_malformed() {
        assert_matches!(
            parse_link_header(r#"https://x/a?page=2; rel="next""#),
            Err(FetchError::MalformedLink(_))
        );
        assert_matches!(
            parse_link_header("<https://x/a?page=2>"),
            Err(FetchError::MalformedLink(_))
        );
        assert_matches!(
            parse_link_header(r#"<https://x/a?page=2>; rel="""#),
            Err(FetchError::MalformedLink(_))
        );
        // one bad entry poisons the whole header
        assert_matches!(
            parse_link_header(r#"<https://x/a?page=2>; rel="next", garbage"#),
            Err(FetchError::MalformedLink(entry)) if entry == "garbage"
        );
    }

    #[quickcheck]
    fn prop_link_header_keeps_url_with_its_relation(pages: Vec<u16>) -> bool {
        let header = pages
            .iter()
            .enumerate()
            .map(|(i, page)| format!("<https://x/r?page={}>; rel=\"r{}\"", page, i))
            .collect::<Vec<_>>()
            .join(", ");

        match parse_link_header(&header) {
            Ok(links) => pages.iter().enumerate().all(|(i, page)| {
                links.get(&format!("r{}", i)) == Some(&format!("https://x/r?page={}", page))
            }),
            Err(_) => false,
        }
    }

    #[test]
    fn test_listing_path_selection() {
        assert_eq!(
            listing_path(&invocation(None, CloneTarget::Organization("acme".into()))),
            "/orgs/acme/repos?per_page=100"
        );
        assert_eq!(
            listing_path(&invocation(None, CloneTarget::User("octocat".into()))),
            "/users/octocat/repos?per_page=100&type=all"
        );
        assert_eq!(
            listing_path(&invocation(Some("someone"), CloneTarget::User("octocat".into()))),
            "/users/octocat/repos?per_page=100&type=all"
        );
        assert_eq!(
            listing_path(&invocation(Some("OctoCat"), CloneTarget::User("octocat".into()))),
            "/user/repos?per_page=100&type=owner"
        );
        // an org never switches to the own-account endpoint
        assert_eq!(
            listing_path(&invocation(Some("acme"), CloneTarget::Organization("acme".into()))),
            "/orgs/acme/repos?per_page=100"
        );
    }

    #[test]
    fn test_repository_record_keeps_raw_fields() {
        let record: RepositoryRecord = serde_json::from_value(repo("hello")).expect("decode");
        assert_eq!(record.name, "hello");
        assert_eq!(record.html_url, "https://github.com/octo/hello");
        assert_eq!(record.default_branch_hint.as_deref(), Some("main"));
        assert_eq!(record.raw.get("full_name"), Some(&json!("octo/hello")));
        assert_eq!(record.raw.get("private"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_single_page_without_link_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/octo/repos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([repo("a"), repo("b")])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let repos: Vec<RepositoryRecord> = client
            .fetch_paginated(&format!("{}/users/octo/repos", server.uri()))
            .await
            .expect("listing");

        assert_eq!(names(&repos), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_follows_next_links_in_page_order() {
        let server = MockServer::start().await;
        let uri = server.uri();

        Mock::given(method("GET"))
            .and(path("/users/octo/repos"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(
                        "Link",
                        format!(r#"<{uri}/pages/2>; rel="next", <{uri}/pages/3>; rel="last""#)
                            .as_str(),
                    )
                    .set_body_json(json!([repo("a1"), repo("a2")])),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pages/2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(
                        "Link",
                        format!(r#"<{uri}/users/octo/repos>; rel="prev", <{uri}/pages/3>; rel="next""#)
                            .as_str(),
                    )
                    .set_body_json(json!([repo("b1")])),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pages/3"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(
                        "Link",
                        format!(r#"<{uri}/pages/2>; rel="prev""#).as_str(),
                    )
                    .set_body_json(json!([repo("c1"), repo("c2")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let repos: Vec<RepositoryRecord> = client
            .fetch_paginated(&format!("{}/users/octo/repos", uri))
            .await
            .expect("listing");

        assert_eq!(names(&repos), vec!["a1", "a2", "b1", "c1", "c2"]);
    }

    #[tokio::test]
    async fn test_next_link_cycle_stops() {
        let server = MockServer::start().await;
        let uri = server.uri();

        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Link", format!(r#"<{uri}/loop>; rel="next""#).as_str())
                    .set_body_json(json!([repo("only")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let repos: Vec<RepositoryRecord> = client
            .fetch_paginated(&format!("{}/loop", uri))
            .await
            .expect("listing");

        assert_eq!(names(&repos), vec!["only"]);
    }

    #[tokio::test]
    async fn test_error_object_is_enumeration_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/octo/repos"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let err = client
            .fetch_paginated::<RepositoryRecord>(&format!("{}/users/octo/repos", server.uri()))
            .await
            .unwrap_err();

        assert_matches!(
            err,
            FetchError::Enumeration { ref payload, .. } if payload["message"] == "Bad credentials"
        );
        assert!(err.to_string().contains("Bad credentials"));
    }

    #[tokio::test]
    async fn test_malformed_link_header_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/octo/repos"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Link", "not-a-link")
                    .set_body_json(json!([repo("a")])),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let result = client
            .fetch_paginated::<RepositoryRecord>(&format!("{}/users/octo/repos", server.uri()))
            .await;

        assert_matches!(result, Err(FetchError::MalformedLink(_)));
    }

    #[tokio::test]
    async fn test_record_without_name_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let result = client
            .fetch_paginated::<RepositoryRecord>(&format!("{}/x", server.uri()))
            .await;

        assert_matches!(result, Err(FetchError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_basic_auth_sent_with_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/repos"))
            // base64("octo:secret")
            .and(header("authorization", "Basic b2N0bzpzZWNyZXQ="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([repo("private")])))
            .expect(1)
            .mount(&server)
            .await;

        let inv = InvocationConfig::new(
            Some("octo".to_string()),
            Some("secret".to_string()),
            CloneTarget::User("Octo".to_string()),
        );
        let client = client_for(&server, inv.credentials());
        let repos = client.list_repositories(&inv).await.expect("listing");

        assert_eq!(names(&repos), vec!["private"]);
    }

    #[tokio::test]
    async fn test_no_auth_header_without_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orgs/acme/repos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([repo("tool")])))
            .expect(1)
            .mount(&server)
            .await;

        let inv = invocation(None, CloneTarget::Organization("acme".into()));
        let client = client_for(&server, inv.credentials());
        let repos = client.list_repositories(&inv).await.expect("listing");

        assert_eq!(names(&repos), vec!["tool"]);
    }

    #[tokio::test]
    async fn test_timeout_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(std::time::Duration::from_secs(3))
                    .set_body_json(json!([])),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([repo("late")])))
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.github.api_url = server.uri();
        config.http.timeout = 1;
        config.http.retries = 1;
        config.http.retry_backoff_ms = 1;
        let client = GitHubClient::new(&config, None).expect("client");

        let repos: Vec<RepositoryRecord> = client
            .fetch_paginated(&format!("{}/slow", server.uri()))
            .await
            .expect("second attempt succeeds");
        assert_eq!(names(&repos), vec!["late"]);
    }

    #[tokio::test]
    async fn test_list_releases_and_download() {
        let server = MockServer::start().await;
        let uri = server.uri();

        Mock::given(method("GET"))
            .and(path("/repos/octo/tool/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "tag_name": "v1.0",
                    "assets": [
                        {"name": "tool.tar.gz", "browser_download_url": format!("{uri}/dl/tool.tar.gz")}
                    ]
                },
                {"tag_name": null}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/dl/tool.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/dl/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let releases = client.list_releases("octo", "tool").await.expect("releases");

        assert_eq!(releases.len(), 2);
        assert_eq!(releases[0].tag_name.as_deref(), Some("v1.0"));
        assert_eq!(releases[0].assets[0].name, "tool.tar.gz");
        assert!(releases[1].tag_name.is_none());
        assert!(releases[1].assets.is_empty());

        let bytes = client
            .download(&format!("{uri}/dl/tool.tar.gz"))
            .await
            .expect("download");
        assert_eq!(bytes, b"payload");

        let missing = client.download(&format!("{uri}/dl/missing")).await;
        assert_matches!(missing, Err(FetchError::Status { status, .. }) if status.as_u16() == 404);
    }
}
