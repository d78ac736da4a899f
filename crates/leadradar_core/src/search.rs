//! Web search API client: the live [`SearchSource`] behind `leadradar run`.

use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::error::{LeadError, Result};
use crate::intake::{SearchParams, SearchSource};
use crate::schema::SearchResult;

pub const DEFAULT_ENDPOINT: &str = "https://api.bing.microsoft.com/v7.0/search";
pub const ENDPOINT_ENV: &str = "BING_SEARCH_ENDPOINT";
pub const API_KEY_ENV: &str = "BING_SEARCH_API_KEY";
const API_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Response body of the web search API. Only the fields intake reads.
#[derive(Debug, Deserialize)]
pub struct WebSearchResponse {
    #[serde(rename = "webPages")]
    pub web_pages: Option<WebPages>,
    pub error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
pub struct WebPages {
    #[serde(default)]
    pub value: Vec<WebPage>,
}

#[derive(Debug, Deserialize)]
pub struct WebPage {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl WebSearchResponse {
    pub fn into_results(self) -> Result<Vec<SearchResult>> {
        if let Some(err) = self.error {
            return Err(LeadError::Search(format!(
                "search api error: {} - {}",
                err.code, err.message
            )));
        }
        Ok(self
            .web_pages
            .map(|pages| pages.value)
            .unwrap_or_default()
            .into_iter()
            .map(|page| SearchResult {
                title: page.name,
                snippet: page.snippet,
                url: page.url,
            })
            .collect())
    }
}

/// Parses a raw API response body into hits.
pub fn parse_response(body: &str) -> Result<Vec<SearchResult>> {
    let response: WebSearchResponse = serde_json::from_str(body)
        .map_err(|e| LeadError::Search(format!("unreadable search response: {e}")))?;
    response.into_results()
}

pub struct WebSearchClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
}

impl WebSearchClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LeadError::Search(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    /// Reads the key from `BING_SEARCH_API_KEY` and the endpoint from
    /// `BING_SEARCH_ENDPOINT`, falling back to [`DEFAULT_ENDPOINT`].
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| LeadError::Search(format!("{API_KEY_ENV} not configured")))?;
        let endpoint = std::env::var(ENDPOINT_ENV).unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        Self::new(endpoint, api_key)
    }

    pub fn request_url(&self, final_query: &str, params: &SearchParams, count: u32) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| LeadError::Search(format!("bad endpoint {}: {e}", self.endpoint)))?;
        url.query_pairs_mut()
            .append_pair("q", final_query)
            .append_pair("responseFilter", "Webpages")
            .append_pair("count", &count.to_string())
            .append_pair("offset", "0")
            .append_pair("mkt", &params.market)
            .append_pair("setLang", &params.market)
            .append_pair("freshness", &params.freshness);
        Ok(url)
    }
}

impl SearchSource for WebSearchClient {
    fn search(
        &self,
        final_query: &str,
        params: &SearchParams,
        count: u32,
    ) -> Result<Vec<SearchResult>> {
        let url = self.request_url(final_query, params, count)?;
        tracing::debug!(
            endpoint = %self.endpoint,
            count,
            market = %params.market,
            "calling search api"
        );

        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .map_err(|e| LeadError::Search(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| LeadError::Search(e.to_string()))?;
        if !status.is_success() {
            return Err(LeadError::Search(format!(
                "search api returned {}: {body}",
                status.as_u16()
            )));
        }

        let results = parse_response(&body)?;
        tracing::info!(hits = results.len(), "search api answered");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SourcePack;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    const CANNED: &str = r#"{
        "_type": "SearchResponse",
        "webPages": {
            "totalEstimatedMatches": 2,
            "value": [
                {
                    "name": "Need a podcast editor",
                    "url": "https://reddit.com/r/podcasting/1",
                    "snippet": "weekly show",
                    "displayUrl": "reddit.com"
                },
                {"name": "Clips wanted", "url": "https://reddit.com/r/podcasting/2"}
            ]
        }
    }"#;

    /// Answers one request with `status` and `body`, handing back the request head.
    fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut headers = String::new();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                headers.push_str(&line);
            }
            let reply = format!(
                "HTTP/1.1 {status}\r\n\
                 Content-Type: application/json\r\n\
                 Content-Length: {}\r\n\
                 Connection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(reply.as_bytes()).unwrap();
            format!("{request_line}{headers}")
        });
        (format!("http://{addr}/v7.0/search"), handle)
    }

    fn params() -> SearchParams {
        SearchParams {
            freshness: "Month".to_string(),
            market: "en-GB".to_string(),
            ..SearchParams::new("seed-RUSH", SourcePack::Forums)
        }
    }

    #[test]
    fn parses_web_pages_into_hits() {
        let hits = parse_response(CANNED).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Need a podcast editor");
        assert_eq!(hits[0].snippet, "weekly show");
        assert_eq!(hits[1].snippet, "");
    }

    #[test]
    fn response_without_web_pages_is_empty() {
        assert!(parse_response(r#"{"_type": "SearchResponse"}"#).unwrap().is_empty());
    }

    #[test]
    fn api_error_object_becomes_search_error() {
        let body = r#"{"error": {"code": "InvalidRequest", "message": "bad freshness"}}"#;
        let err = parse_response(body).unwrap_err();
        assert!(
            matches!(&err, LeadError::Search(msg) if msg.contains("InvalidRequest - bad freshness"))
        );
    }

    #[test]
    fn garbage_body_is_a_search_error() {
        assert!(matches!(parse_response("<html>"), Err(LeadError::Search(_))));
    }

    #[test]
    fn request_url_carries_market_and_freshness() {
        let client = WebSearchClient::new("https://search.example.com/v7.0/search", "key").unwrap();
        let url = client.request_url("site:reddit.com editor", &params(), 25).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |key: &str| pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
        assert_eq!(get("q"), Some("site:reddit.com editor"));
        assert_eq!(get("count"), Some("25"));
        assert_eq!(get("offset"), Some("0"));
        assert_eq!(get("mkt"), Some("en-GB"));
        assert_eq!(get("setLang"), Some("en-GB"));
        assert_eq!(get("freshness"), Some("Month"));
        assert_eq!(get("responseFilter"), Some("Webpages"));
    }

    #[test]
    fn live_search_sends_key_and_parses_reply() {
        let (endpoint, server) = serve_once("200 OK", CANNED);
        let client = WebSearchClient::new(endpoint, "secret-key").unwrap();
        let hits = client.search("podcast editor", &params(), 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://reddit.com/r/podcasting/1");

        let request = server.join().unwrap();
        assert!(request.starts_with("GET /v7.0/search?q=podcast+editor"));
        assert!(request.to_ascii_lowercase().contains("ocp-apim-subscription-key: secret-key"));
    }

    #[test]
    fn http_failure_status_is_a_search_error() {
        let (endpoint, server) = serve_once("401 Unauthorized", r#"{"message":"bad key"}"#);
        let client = WebSearchClient::new(endpoint, "wrong").unwrap();
        let err = client.search("podcast editor", &params(), 10).unwrap_err();
        server.join().unwrap();
        assert!(
            matches!(&err, LeadError::Search(msg) if msg.starts_with("search api returned 401"))
        );
    }
}
