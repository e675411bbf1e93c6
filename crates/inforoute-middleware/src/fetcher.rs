//! [`HttpFeed`] – HTTP client for the Inforoute 65 proxy endpoint.
//!
//! Issues one `GET` per call, bounded by an absolute timeout that covers
//! connect, read and parse.  The body is parsed as JSON whatever content
//! type the server declares (the proxy is known to mislabel it).
//!
//! # Example
//!
//! ```rust,no_run
//! use inforoute_middleware::{HttpFeed, RoadFeed};
//!
//! # async fn demo() -> Result<(), inforoute_types::FetchError> {
//! let feed = HttpFeed::new(inforoute_middleware::DEFAULT_API_URL)?;
//! let items = feed.fetch().await?;
//! println!("{} road sections", items.len());
//! # Ok(())
//! # }
//! ```

use std::time::{Duration, Instant};

use async_trait::async_trait;
use inforoute_types::{FetchError, RoadItem};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::feed::RoadFeed;

/// Public proxy serving the Hautes-Pyrénées road advisories.
pub const DEFAULT_API_URL: &str = "https://inforoute.ha-py.fr/myd/proxy.php?cluster=&tifid=\
&type=30.09;31.02;32.01;30.06&theme=&categorie=31.04.02;30.05.02";

/// Absolute budget for one fetch (connect + read + parse).
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("inforoute65/", env!("CARGO_PKG_VERSION"));

/// Key of the item list in the feed document.
const ITEMS_KEY: &str = "OI";

/// [`RoadFeed`] backed by a single HTTP endpoint.
pub struct HttpFeed {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpFeed {
    /// Create a feed for `url` with the default [`FETCH_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] when the HTTP client cannot be
    /// initialised (e.g. no TLS backend available).
    pub fn new(url: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self::with_client(url, client))
    }

    /// Create a feed that reuses an already configured `client`.
    pub fn with_client(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            timeout: FETCH_TIMEOUT,
            client,
        }
    }

    /// Override the fetch timeout (builder-style).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch_unbounded(&self) -> Result<Vec<RoadItem>, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(transport)?;
        parse_feed(&body)
    }
}

#[async_trait]
impl RoadFeed for HttpFeed {
    #[instrument(name = "feed.fetch", skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<Vec<RoadItem>, FetchError> {
        let started = Instant::now();
        let items = match tokio::time::timeout(self.timeout, self.fetch_unbounded()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(FetchError::Timeout {
                    millis: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
        };
        debug!(
            items = items.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "feed fetched"
        );
        Ok(items)
    }
}

fn transport(err: reqwest::Error) -> FetchError {
    FetchError::Transport(err.to_string())
}

/// Parse a feed document and drop point-geometry items.
///
/// A missing or `null` `"OI"` key yields an empty list.
///
/// # Errors
///
/// Returns [`FetchError::Parse`] for invalid JSON, a non-object document, a
/// non-array `"OI"` value or a non-object item.
pub fn parse_feed(body: &[u8]) -> Result<Vec<RoadItem>, FetchError> {
    let document: Value =
        serde_json::from_slice(body).map_err(|e| FetchError::Parse(e.to_string()))?;

    let Value::Object(mut document) = document else {
        return Err(FetchError::Parse("feed document is not a JSON object".into()));
    };

    let raw_items = match document.remove(ITEMS_KEY) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(raw_items)) => raw_items,
        Some(_) => {
            return Err(FetchError::Parse(format!("\"{ITEMS_KEY}\" is not an array")));
        }
    };

    let mut items = Vec::with_capacity(raw_items.len());
    for (index, raw) in raw_items.into_iter().enumerate() {
        if !raw.is_object() {
            return Err(FetchError::Parse(format!("item {index} is not an object")));
        }
        let item: RoadItem = serde_json::from_value(raw)
            .map_err(|e| FetchError::Parse(format!("item {index}: {e}")))?;
        if item.is_point() {
            continue;
        }
        items.push(item);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const SCENARIO: &str = r#"{"OI":[{"pid":"1","tifid":"T1","lib":"Col X","color":"FF0000","type_geom":"LINE","address":"Route Y","lat":43.1,"lng":0.1}]}"#;

    fn http_response(status: &str, content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    /// Serve `response` to the first connection, then stop.
    async fn serve_once(response: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        format!("http://{addr}/proxy.php")
    }

    fn feed(url: String) -> HttpFeed {
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .expect("client");
        HttpFeed::with_client(url, client)
    }

    // ── parse_feed ──────────────────────────────────────────────────────────

    #[test]
    fn parses_scenario_document() {
        let items = parse_feed(SCENARIO.as_bytes()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].identity(), Some("T1"));
        assert_eq!(items[0].address.as_deref(), Some("Route Y"));
        assert_eq!(items[0].lat, Some(43.1));
    }

    #[test]
    fn point_items_are_dropped() {
        let items = parse_feed(br#"{"OI":[{"tifid":"T2","type_geom":"POINT"}]}"#).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn upstream_order_is_preserved() {
        let body = br#"{"OI":[
            {"tifid":"A","type_geom":"LINE"},
            {"tifid":"B","type_geom":"POINT"},
            {"tifid":"C","type_geom":"POLYGON"},
            {"tifid":"D","type_geom":"point"}
        ]}"#;
        let ids: Vec<_> = parse_feed(body)
            .unwrap()
            .iter()
            .map(|i| i.identity().unwrap().to_string())
            .collect();
        assert_eq!(ids, ["A", "C", "D"]);
    }

    #[test]
    fn missing_or_null_items_key_is_empty() {
        assert!(parse_feed(br#"{}"#).unwrap().is_empty());
        assert!(parse_feed(br#"{"OI":null,"other":1}"#).unwrap().is_empty());
    }

    #[test]
    fn malformed_documents_are_parse_errors() {
        for body in [
            &b"not json"[..],
            br#"[1,2,3]"#,
            br#"{"OI":"nope"}"#,
            br#"{"OI":[1]}"#,
            br#"{"OI":[{"tifid":"A"}"#,
        ] {
            let err = parse_feed(body).unwrap_err();
            assert!(matches!(err, FetchError::Parse(_)), "{err:?}");
        }
    }

    // ── HTTP ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn fetches_and_ignores_declared_content_type() {
        let url = serve_once(http_response("200 OK", "text/html; charset=UTF-8", SCENARIO)).await;
        let items = feed(url).fetch().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].lib.as_deref(), Some("Col X"));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let url = serve_once(http_response("503 Service Unavailable", "text/plain", "down")).await;
        let err = feed(url).fetch().await.unwrap_err();
        assert_eq!(err, FetchError::Status(503));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn invalid_body_is_a_parse_error() {
        let url = serve_once(http_response("200 OK", "application/json", "{\"OI\": [")).await;
        let err = feed(url).fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                tokio::time::sleep(Duration::from_secs(5)).await;
                drop(stream);
            }
        });

        let err = feed(format!("http://{addr}/"))
            .with_timeout(Duration::from_millis(100))
            .fetch()
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Timeout { millis: 100 });
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = feed(format!("http://{addr}/")).fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)), "{err:?}");
    }

    #[test]
    fn default_timeout_is_ten_seconds() {
        let feed = HttpFeed::new(DEFAULT_API_URL).unwrap();
        assert_eq!(feed.timeout, Duration::from_secs(10));
        assert!(feed.url().contains("proxy.php"));
    }
}
