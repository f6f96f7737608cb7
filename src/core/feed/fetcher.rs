use std::future::Future;

use crate::core::config::TrendwatchConfig;

use super::types::Geo;

pub const DEFAULT_FEED_BASE_URL: &str = "https://trends.google.com/trending/rss";
const USER_AGENT: &str = concat!("trendwatch/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status code: {0}")]
    HttpStatus(u16),
    #[error("response body is not an xml document")]
    NotXml,
    #[error("all {attempts} relays failed for geo {geo}")]
    Exhausted { geo: Geo, attempts: usize },
    #[error("http client could not be built: {0}")]
    Client(reqwest::Error),
}

/// One way of reaching the upstream feed. Relays are tried in order and each
/// is given a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relay {
    Direct,
    AllOrigins,
    ThingProxy,
    CodeTabs,
    /// Configured as `name=template` in `TRENDWATCH_RELAYS`; `template` must
    /// contain `{url}` (raw target) or `{encoded}` (percent-encoded target).
    Custom { name: String, template: String },
}

impl Relay {
    pub fn default_chain() -> Vec<Relay> {
        vec![Relay::AllOrigins, Relay::ThingProxy, Relay::CodeTabs]
    }

    pub fn from_name(name: &str) -> Option<Relay> {
        match name.trim().to_ascii_lowercase().as_str() {
            "direct" => Some(Relay::Direct),
            "allorigins" => Some(Relay::AllOrigins),
            "thingproxy" => Some(Relay::ThingProxy),
            "codetabs" => Some(Relay::CodeTabs),
            _ => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Relay::Direct => "direct",
            Relay::AllOrigins => "allorigins",
            Relay::ThingProxy => "thingproxy",
            Relay::CodeTabs => "codetabs",
            Relay::Custom { name, .. } => name,
        }
    }

    pub fn wrap(&self, target: &str) -> String {
        match self {
            Relay::Direct => target.to_string(),
            Relay::AllOrigins => format!(
                "https://api.allorigins.win/raw?url={}",
                urlencoding::encode(target)
            ),
            Relay::ThingProxy => format!("https://thingproxy.freeboard.io/fetch/{target}"),
            Relay::CodeTabs => format!(
                "https://api.codetabs.com/v1/proxy?quest={}",
                urlencoding::encode(target)
            ),
            Relay::Custom { template, .. } => template
                .replace("{encoded}", &urlencoding::encode(target))
                .replace("{url}", target),
        }
    }

    pub async fn attempt(&self, client: &reqwest::Client, target: &str) -> Result<String, FetchError> {
        let response = client.get(self.wrap(target)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let body = response.text().await?;
        if !looks_like_xml(&body) {
            return Err(FetchError::NotXml);
        }
        Ok(body)
    }
}

/// Relays answer rate limits and outages with HTML pages under a 200, so the
/// body itself has to carry an RSS root or an XML declaration.
pub fn looks_like_xml(body: &str) -> bool {
    body.contains("<rss") || body.contains("<?xml")
}

pub fn build_target_url(base_url: &str, geo: Geo) -> String {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!("{base_url}{separator}geo={}", geo.code())
}

pub async fn fetch_through_relays(
    client: &reqwest::Client,
    relays: &[Relay],
    geo: Geo,
    target: &str,
) -> Result<String, FetchError> {
    for relay in relays {
        match relay.attempt(client, target).await {
            Ok(body) => {
                tracing::debug!(geo = %geo, relay = relay.name(), bytes = body.len(), "relay returned feed");
                return Ok(body);
            }
            Err(error) => {
                tracing::warn!(geo = %geo, relay = relay.name(), error = %error, "relay attempt failed");
            }
        }
    }

    Err(FetchError::Exhausted {
        geo,
        attempts: relays.len(),
    })
}

/// Anything that can hand the loader a raw trends document for one geography.
pub trait FeedSource: Send + Sync {
    fn fetch(&self, geo: Geo) -> impl Future<Output = Result<String, FetchError>> + Send;
}

#[derive(Debug, Clone)]
pub struct TrendsFetcher {
    client: reqwest::Client,
    base_url: String,
    relays: Vec<Relay>,
}

impl TrendsFetcher {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, relays: Vec<Relay>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            relays,
        }
    }

    pub fn from_config(config: &TrendwatchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self::new(client, config.feed_base_url.clone(), config.relays.clone()))
    }

    pub async fn fetch_feed(&self, geo: Geo) -> Result<String, FetchError> {
        let target = build_target_url(&self.base_url, geo);
        fetch_through_relays(&self.client, &self.relays, geo, &target).await
    }
}

impl FeedSource for TrendsFetcher {
    fn fetch(&self, geo: Geo) -> impl Future<Output = Result<String, FetchError>> + Send {
        self.fetch_feed(geo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::Router;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    const SAMPLE: &str = include_str!("../../../fixtures/samples/trends-gb.xml");

    #[derive(Clone, Default)]
    struct AppState {
        broken_hits: Arc<AtomicUsize>,
        html_hits: Arc<AtomicUsize>,
        relay_hits: Arc<AtomicUsize>,
        hang_hits: Arc<AtomicUsize>,
        last_target: Arc<Mutex<Option<String>>>,
    }

    async fn broken_handler(State(state): State<AppState>) -> Response {
        state.broken_hits.fetch_add(1, Ordering::SeqCst);
        (StatusCode::BAD_GATEWAY, "upstream unavailable").into_response()
    }

    async fn html_handler(State(state): State<AppState>) -> Response {
        state.html_hits.fetch_add(1, Ordering::SeqCst);
        (
            StatusCode::OK,
            [(reqwest::header::CONTENT_TYPE, "text/html")],
            "<html><body>Too many requests, slow down</body></html>",
        )
            .into_response()
    }

    async fn hang_handler(State(state): State<AppState>) -> Response {
        state.hang_hits.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        (StatusCode::OK, SAMPLE).into_response()
    }

    async fn relay_handler(
        State(state): State<AppState>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Response {
        state.relay_hits.fetch_add(1, Ordering::SeqCst);
        *state.last_target.lock().expect("lock must not be poisoned") = params.get("url").cloned();
        (
            StatusCode::OK,
            [(reqwest::header::CONTENT_TYPE, "application/rss+xml")],
            SAMPLE,
        )
            .into_response()
    }

    async fn spawn_test_server(state: AppState) -> (String, tokio::task::JoinHandle<()>) {
        let app = Router::new()
            .route("/broken", get(broken_handler))
            .route("/html", get(html_handler))
            .route("/relay", get(relay_handler))
            .route("/hang", get(hang_handler))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let address = listener.local_addr().expect("local addr should exist");
        let join_handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server should run");
        });
        (format!("http://{address}"), join_handle)
    }

    async fn refused_address() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let address = listener.local_addr().expect("local addr should exist");
        drop(listener);
        format!("http://{address}")
    }

    fn custom(name: &str, template: String) -> Relay {
        Relay::Custom {
            name: name.to_string(),
            template,
        }
    }

    #[test]
    fn default_relays_wrap_the_target_their_own_way() {
        let target = "https://trends.google.com/trending/rss?geo=GB";
        assert_eq!(Relay::default_chain().len(), 3);
        assert_eq!(
            Relay::AllOrigins.wrap(target),
            "https://api.allorigins.win/raw?url=https%3A%2F%2Ftrends.google.com%2Ftrending%2Frss%3Fgeo%3DGB"
        );
        assert_eq!(
            Relay::ThingProxy.wrap(target),
            "https://thingproxy.freeboard.io/fetch/https://trends.google.com/trending/rss?geo=GB"
        );
        assert!(Relay::CodeTabs
            .wrap(target)
            .starts_with("https://api.codetabs.com/v1/proxy?quest=https%3A%2F%2F"));
        assert_eq!(Relay::Direct.wrap(target), target);
    }

    #[test]
    fn relay_names_resolve_case_insensitively() {
        assert_eq!(Relay::from_name(" AllOrigins "), Some(Relay::AllOrigins));
        assert_eq!(Relay::from_name("direct"), Some(Relay::Direct));
        assert_eq!(Relay::from_name("corsanywhere"), None);
    }

    #[test]
    fn target_url_carries_geo_code() {
        assert_eq!(
            build_target_url(DEFAULT_FEED_BASE_URL, Geo::Bangladesh),
            "https://trends.google.com/trending/rss?geo=BD"
        );
        assert_eq!(
            build_target_url("http://localhost/rss?hl=en", Geo::UnitedKingdom),
            "http://localhost/rss?hl=en&geo=GB"
        );
    }

    #[test]
    fn xml_marker_check_accepts_rss_and_declaration() {
        assert!(looks_like_xml("<?xml version=\"1.0\"?><feed/>"));
        assert!(looks_like_xml("  <rss version=\"2.0\"></rss>"));
        assert!(!looks_like_xml("<!DOCTYPE html><html></html>"));
        assert!(!looks_like_xml(""));
    }

    #[tokio::test]
    async fn falls_through_failing_relays_to_first_xml_response() {
        let state = AppState::default();
        let (base, server_task) = spawn_test_server(state.clone()).await;
        let refused = refused_address().await;
        let fetcher = TrendsFetcher::new(
            reqwest::Client::new(),
            "https://trends.example/rss",
            vec![
                custom("refused", format!("{refused}/relay?url={{encoded}}")),
                custom("broken", format!("{base}/broken?url={{encoded}}")),
                custom("html", format!("{base}/html?url={{encoded}}")),
                custom("good", format!("{base}/relay?url={{encoded}}")),
                custom("never", format!("{base}/broken")),
            ],
        );

        let body = fetcher
            .fetch_feed(Geo::UnitedKingdom)
            .await
            .expect("fourth relay should serve the feed");

        assert_eq!(body, SAMPLE);
        assert_eq!(state.broken_hits.load(Ordering::SeqCst), 1);
        assert_eq!(state.html_hits.load(Ordering::SeqCst), 1);
        assert_eq!(state.relay_hits.load(Ordering::SeqCst), 1);
        assert_eq!(
            state.last_target.lock().expect("lock must not be poisoned").as_deref(),
            Some("https://trends.example/rss?geo=GB")
        );

        server_task.abort();
    }

    #[tokio::test]
    async fn hung_relay_times_out_and_next_relay_serves_the_feed() {
        let state = AppState::default();
        let (base, server_task) = spawn_test_server(state.clone()).await;
        let config = TrendwatchConfig {
            feed_base_url: "https://trends.example/rss".to_string(),
            relays: vec![
                custom("hang", format!("{base}/hang?url={{encoded}}")),
                custom("good", format!("{base}/relay?url={{encoded}}")),
            ],
            request_timeout: Duration::from_secs(1),
            ..TrendwatchConfig::default()
        };
        let fetcher = TrendsFetcher::from_config(&config).expect("client should build");

        let started = Instant::now();
        let body = fetcher
            .fetch_feed(Geo::Bangladesh)
            .await
            .expect("second relay should serve the feed");

        assert_eq!(body, SAMPLE);
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(state.hang_hits.load(Ordering::SeqCst), 1);
        assert_eq!(state.relay_hits.load(Ordering::SeqCst), 1);
        assert_eq!(
            state.last_target.lock().expect("lock must not be poisoned").as_deref(),
            Some("https://trends.example/rss?geo=BD")
        );

        server_task.abort();
    }

    #[tokio::test]
    async fn exhausted_relays_report_geo_and_attempts() {
        let state = AppState::default();
        let (base, server_task) = spawn_test_server(state.clone()).await;
        let fetcher = TrendsFetcher::new(
            reqwest::Client::new(),
            DEFAULT_FEED_BASE_URL,
            vec![
                custom("broken", format!("{base}/broken")),
                custom("html", format!("{base}/html")),
                custom("broken-again", format!("{base}/broken")),
            ],
        );

        let error = fetcher
            .fetch_feed(Geo::Bangladesh)
            .await
            .expect_err("every relay fails");

        assert!(matches!(
            error,
            FetchError::Exhausted {
                geo: Geo::Bangladesh,
                attempts: 3
            }
        ));
        assert!(error.to_string().contains("BD"));
        assert_eq!(state.broken_hits.load(Ordering::SeqCst), 2);
        assert_eq!(state.html_hits.load(Ordering::SeqCst), 1);

        server_task.abort();
    }
}
