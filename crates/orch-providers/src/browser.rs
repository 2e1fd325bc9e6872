//! Browser automation over the W3C WebDriver protocol
//!
//! [`WebDriverBrowser`] talks to any WebDriver endpoint (chromedriver,
//! geckodriver, a Selenium grid). The session is created on first use and
//! reused for every later call, so one page is shared across tool calls.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::BrowserSection;
use crate::error::{ProviderError, Result};

/// Key under which WebDriver returns element references
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const SERVICE: &str = "WebDriver";

/// Page state a navigation waits for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    /// The document `load` event
    #[default]
    Load,
    /// `load`, then no new network resources for a quiet period
    NetworkIdle,
}

impl WaitUntil {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::NetworkIdle => "networkidle",
        }
    }
}

/// Where the browser ended up after a navigation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
}

/// Value of an evaluated script plus the console output it produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub result: Value,
    #[serde(default)]
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenshotOptions {
    /// Capture only the element matching this CSS selector
    pub selector: Option<String>,
    /// Resize the window before capturing
    pub viewport: Option<(u32, u32)>,
}

/// Browser capability used by the browser tools
#[async_trait]
pub trait BrowserProvider: Send + Sync {
    async fn navigate(&self, url: &str, wait_until: WaitUntil, timeout: Duration)
    -> Result<PageInfo>;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Choose an `<option>` of a `<select>` by value
    async fn select(&self, selector: &str, value: &str) -> Result<()>;

    async fn hover(&self, selector: &str) -> Result<()>;

    /// Capture a PNG to `path`, returning the number of bytes written
    async fn screenshot(&self, path: &Path, options: &ScreenshotOptions) -> Result<u64>;

    /// Evaluate a JavaScript expression or zero-argument function
    async fn evaluate(&self, script: &str) -> Result<Evaluation>;

    /// Serialized DOM of the current page
    async fn page_content(&self) -> Result<String>;

    /// Release the browser; later calls may start a new one
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    value: Value,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

const EVALUATE_SCRIPT: &str = r#"
const logs = [];
const original = { ...console };
['log', 'info', 'warn', 'error'].forEach(method => {
    console[method] = (...args) => {
        logs.push(`[${method}] ${args.join(' ')}`);
        original[method](...args);
    };
});
try {
    let result = eval(arguments[0]);
    if (typeof result === 'function') result = result();
    return { result: result === undefined ? null : result, logs };
} finally {
    Object.assign(console, original);
}
"#;

const SELECT_SCRIPT: &str = "const el = arguments[0]; el.value = arguments[1]; \
     el.dispatchEvent(new Event('input', { bubbles: true })); \
     el.dispatchEvent(new Event('change', { bubbles: true })); \
     return el.value;";

const RESOURCE_COUNT_SCRIPT: &str = "return document.readyState === 'complete' \
     ? performance.getEntriesByType('resource').length : -1;";

const NETWORK_IDLE_POLL: Duration = Duration::from_millis(500);

/// W3C WebDriver client
pub struct WebDriverBrowser {
    http: reqwest::Client,
    base_url: String,
    settings: BrowserSection,
    session: Mutex<Option<String>>,
}

impl WebDriverBrowser {
    pub fn new(settings: BrowserSection) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: settings.webdriver_url.trim_end_matches('/').to_string(),
            settings,
            session: Mutex::new(None),
        }
    }

    fn capabilities(&self) -> Value {
        let name = self.settings.browser_name.as_str();
        let mut always_match = json!({ "browserName": name });
        let mut args = vec!["--window-size=1920,1080".to_string()];
        if self.settings.headless {
            args.push("--headless=new".to_string());
        }
        match name {
            "chrome" => always_match["goog:chromeOptions"] = json!({ "args": args }),
            "MicrosoftEdge" => always_match["ms:edgeOptions"] = json!({ "args": args }),
            "firefox" if self.settings.headless => {
                always_match["moz:firefoxOptions"] = json!({ "args": ["-headless"] })
            }
            _ => {}
        }
        json!({ "capabilities": { "alwaysMatch": always_match } })
    }

    async fn send(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "WebDriver request");
        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            let wire: WireResponse = serde_json::from_str(&text)?;
            return Ok(wire.value);
        }

        match serde_json::from_str::<WireResponse>(&text)
            .ok()
            .and_then(|w| serde_json::from_value::<WireError>(w.value).ok())
        {
            Some(error) => Err(ProviderError::WebDriver {
                error: error.error,
                message: error.message,
            }),
            None => Err(ProviderError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body: text,
            }),
        }
    }

    /// Session id, creating the session on first use
    async fn session(&self) -> Result<String> {
        let mut guard = self.session.lock().await;
        if let Some(id) = guard.as_ref() {
            return Ok(id.clone());
        }

        let value = self
            .send(reqwest::Method::POST, "/session", Some(self.capabilities()))
            .await?;
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Protocol("new session response without sessionId".into()))?
            .to_string();

        // Stored before any further request; an aborted call leaves it closable
        *guard = Some(id.clone());

        let configured = self
            .send(
                reqwest::Method::POST,
                &format!("/session/{id}/timeouts"),
                Some(json!({
                    "implicit": self.settings.implicit_wait_ms,
                    "pageLoad": self.settings.page_load_timeout_ms,
                })),
            )
            .await;
        if let Err(e) = configured {
            guard.take();
            if let Err(cleanup) = self.delete_session(&id).await {
                warn!(session = %id, error = %cleanup, "Failed to end half-configured session");
            }
            return Err(e);
        }

        info!(session = %id, browser = %self.settings.browser_name, "Started browser session");
        Ok(id)
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        self.send(reqwest::Method::DELETE, &format!("/session/{id}"), None)
            .await?;
        Ok(())
    }

    async fn session_call(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value> {
        let id = self.session().await?;
        self.send(method, &format!("/session/{id}{path}"), body).await
    }

    async fn find(&self, selector: &str) -> Result<String> {
        let value = self
            .session_call(
                reqwest::Method::POST,
                "/element",
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Protocol(format!("no element reference for {selector}")))
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.session_call(
            reqwest::Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut last = -1;
        loop {
            let count = self
                .execute(RESOURCE_COUNT_SCRIPT, vec![])
                .await?
                .as_i64()
                .unwrap_or(-1);
            if count >= 0 && count == last {
                return Ok(());
            }
            last = count;
            if tokio::time::Instant::now() + NETWORK_IDLE_POLL > deadline {
                return Err(ProviderError::WebDriver {
                    error: "timeout".to_string(),
                    message: format!("network did not go idle within {} ms", timeout.as_millis()),
                });
            }
            tokio::time::sleep(NETWORK_IDLE_POLL).await;
        }
    }
}

#[async_trait]
impl BrowserProvider for WebDriverBrowser {
    async fn navigate(
        &self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<PageInfo> {
        self.session_call(
            reqwest::Method::POST,
            "/timeouts",
            Some(json!({ "pageLoad": timeout.as_millis() as u64 })),
        )
        .await?;
        self.session_call(reqwest::Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        if wait_until == WaitUntil::NetworkIdle {
            self.wait_for_network_idle(timeout).await?;
        }

        let current = self.session_call(reqwest::Method::GET, "/url", None).await?;
        let title = self.session_call(reqwest::Method::GET, "/title", None).await?;
        Ok(PageInfo {
            url: current.as_str().unwrap_or(url).to_string(),
            title: title.as_str().unwrap_or_default().to_string(),
        })
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self.find(selector).await?;
        self.session_call(
            reqwest::Method::POST,
            &format!("/element/{element}/click"),
            Some(json!({})),
        )
        .await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let element = self.find(selector).await?;
        self.session_call(
            reqwest::Method::POST,
            &format!("/element/{element}/clear"),
            Some(json!({})),
        )
        .await?;
        self.session_call(
            reqwest::Method::POST,
            &format!("/element/{element}/value"),
            Some(json!({ "text": value })),
        )
        .await?;
        Ok(())
    }

    async fn select(&self, selector: &str, value: &str) -> Result<()> {
        let element = self.find(selector).await?;
        let selected = self
            .execute(SELECT_SCRIPT, vec![json!({ ELEMENT_KEY: element }), json!(value)])
            .await?;
        if selected.as_str() != Some(value) {
            return Err(ProviderError::WebDriver {
                error: "no such element".to_string(),
                message: format!("option '{value}' not found in {selector}"),
            });
        }
        Ok(())
    }

    async fn hover(&self, selector: &str) -> Result<()> {
        let element = self.find(selector).await?;
        let actions = json!({
            "actions": [{
                "type": "pointer",
                "id": "mouse",
                "parameters": { "pointerType": "mouse" },
                "actions": [{
                    "type": "pointerMove",
                    "duration": 0,
                    "origin": { ELEMENT_KEY: element },
                    "x": 0,
                    "y": 0
                }]
            }]
        });
        self.session_call(reqwest::Method::POST, "/actions", Some(actions))
            .await?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path, options: &ScreenshotOptions) -> Result<u64> {
        if let Some((width, height)) = options.viewport {
            self.session_call(
                reqwest::Method::POST,
                "/window/rect",
                Some(json!({ "width": width, "height": height })),
            )
            .await?;
        }

        let value = match &options.selector {
            Some(selector) => {
                let element = self.find(selector).await?;
                self.session_call(
                    reqwest::Method::GET,
                    &format!("/element/{element}/screenshot"),
                    None,
                )
                .await?
            }
            None => {
                self.session_call(reqwest::Method::GET, "/screenshot", None)
                    .await?
            }
        };

        let encoded = value
            .as_str()
            .ok_or_else(|| ProviderError::Protocol("screenshot is not a string".into()))?;
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| ProviderError::Protocol(format!("screenshot is not base64: {e}")))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &bytes).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "Saved screenshot");
        Ok(bytes.len() as u64)
    }

    async fn evaluate(&self, script: &str) -> Result<Evaluation> {
        let value = self.execute(EVALUATE_SCRIPT, vec![json!(script)]).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn page_content(&self) -> Result<String> {
        let value = self.session_call(reqwest::Method::GET, "/source", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Protocol("page source is not a string".into()))
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.session.lock().await;
        if let Some(id) = guard.take() {
            self.delete_session(&id).await?;
            info!(session = %id, "Closed browser session");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn browser_with_session(server: &MockServer) -> WebDriverBrowser {
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "sessionId": "s1", "capabilities": {} }
            })))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/s1/timeouts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .mount(server)
            .await;

        WebDriverBrowser::new(BrowserSection {
            webdriver_url: server.uri(),
            ..BrowserSection::default()
        })
    }

    fn ok(value: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "value": value }))
    }

    #[test]
    fn chrome_capabilities_are_headless() {
        let browser = WebDriverBrowser::new(BrowserSection::default());
        let caps = browser.capabilities();
        let args = &caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"];
        assert!(args.as_array().unwrap().contains(&json!("--headless=new")));
    }

    #[tokio::test]
    async fn navigate_creates_session_once() {
        let server = MockServer::start().await;
        let browser = browser_with_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/s1/url"))
            .and(body_partial_json(json!({ "url": "https://example.com" })))
            .respond_with(ok(Value::Null))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/s1/url"))
            .respond_with(ok(json!("https://example.com/")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/s1/title"))
            .respond_with(ok(json!("Example Domain")))
            .mount(&server)
            .await;

        for _ in 0..2 {
            let page = browser
                .navigate("https://example.com", WaitUntil::Load, Duration::from_secs(30))
                .await
                .unwrap();
            assert_eq!(
                page,
                PageInfo {
                    url: "https://example.com/".into(),
                    title: "Example Domain".into()
                }
            );
        }
    }

    #[tokio::test]
    async fn click_missing_element_maps_webdriver_error() {
        let server = MockServer::start().await;
        let browser = browser_with_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/s1/element"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "value": {
                    "error": "no such element",
                    "message": "Unable to locate element: #missing",
                    "stacktrace": ""
                }
            })))
            .mount(&server)
            .await;

        let err = browser.click("#missing").await.unwrap_err();
        assert_eq!(err.sub_kind(), "ElementNotFound");
        assert!(err.to_string().contains("Unable to locate element"));
    }

    #[tokio::test]
    async fn fill_clears_then_types() {
        let server = MockServer::start().await;
        let browser = browser_with_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/s1/element"))
            .respond_with(ok(json!({ ELEMENT_KEY: "e1" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/s1/element/e1/clear"))
            .respond_with(ok(Value::Null))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/s1/element/e1/value"))
            .and(body_partial_json(json!({ "text": "alice" })))
            .respond_with(ok(Value::Null))
            .expect(1)
            .mount(&server)
            .await;

        browser.fill("#user", "alice").await.unwrap();
    }

    #[tokio::test]
    async fn screenshot_writes_decoded_png() {
        let server = MockServer::start().await;
        let browser = browser_with_session(&server).await;
        let png = [0x89u8, b'P', b'N', b'G'];

        Mock::given(method("GET"))
            .and(path("/session/s1/screenshot"))
            .respond_with(ok(json!(STANDARD.encode(png))))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("shots").join("home.png");
        let written = browser
            .screenshot(&target, &ScreenshotOptions::default())
            .await
            .unwrap();

        assert_eq!(written, 4);
        assert_eq!(std::fs::read(&target).unwrap(), png);
    }

    #[tokio::test]
    async fn evaluate_returns_result_and_logs() {
        let server = MockServer::start().await;
        let browser = browser_with_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/s1/execute/sync"))
            .and(body_partial_json(json!({ "args": ["document.title"] })))
            .respond_with(ok(json!({ "result": "Example", "logs": ["[log] hi"] })))
            .mount(&server)
            .await;

        let evaluation = browser.evaluate("document.title").await.unwrap();
        assert_eq!(
            evaluation,
            Evaluation {
                result: json!("Example"),
                logs: vec!["[log] hi".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn failed_session_setup_deletes_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ok(json!({ "sessionId": "s1", "capabilities": {} })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/s1/timeouts"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/session/s1"))
            .respond_with(ok(Value::Null))
            .expect(2)
            .mount(&server)
            .await;

        let browser = WebDriverBrowser::new(BrowserSection {
            webdriver_url: server.uri(),
            ..BrowserSection::default()
        });
        for _ in 0..2 {
            let err = browser.click("#a").await.unwrap_err();
            assert!(matches!(err, ProviderError::Status { status: 500, .. }));
        }
        assert!(browser.session.lock().await.is_none());
    }

    #[tokio::test]
    async fn close_ends_started_session() {
        let server = MockServer::start().await;
        let browser = browser_with_session(&server).await;

        Mock::given(method("GET"))
            .and(path("/session/s1/source"))
            .respond_with(ok(json!("<html></html>")))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/session/s1"))
            .respond_with(ok(Value::Null))
            .expect(1)
            .mount(&server)
            .await;

        browser.page_content().await.unwrap();
        browser.close().await.unwrap();
        // Nothing left to end
        browser.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_without_session_is_silent() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ok(Value::Null))
            .expect(0)
            .mount(&server)
            .await;

        let browser = WebDriverBrowser::new(BrowserSection {
            webdriver_url: server.uri(),
            ..BrowserSection::default()
        });
        browser.close().await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_driver_is_upstream_error() {
        let browser = WebDriverBrowser::new(BrowserSection {
            webdriver_url: "http://127.0.0.1:1".to_string(),
            ..BrowserSection::default()
        });
        let err = browser.page_content().await.unwrap_err();
        assert!(matches!(err, ProviderError::Http(_)));
    }
}
