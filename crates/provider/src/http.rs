//! HTTP transport abstraction for the geodata backend.
//!
//! Every backend round trip goes through [`HttpTransport`] so the query,
//! write, and credential paths can run against a scripted transport in tests.

use async_trait::async_trait;
use geofence_core::error::{GeofenceError, GeofenceResult};
use std::time::Duration;
use url::Url;

/// Async request/response transport. Returns the response body as text.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: Url) -> GeofenceResult<String>;

    /// POST an `application/x-www-form-urlencoded` body.
    async fn post_form(&self, url: Url, form: Vec<(String, String)>) -> GeofenceResult<String>;
}

/// Production transport backed by `reqwest`.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> GeofenceResult<Self> {
        Self::with_timeout(Duration::from_secs(
            geofence_core::config::DEFAULT_HTTP_TIMEOUT_SECS,
        ))
    }

    pub fn with_timeout(timeout: Duration) -> GeofenceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GeofenceError::Transport(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn read_body(response: reqwest::Response, url: &Url) -> GeofenceResult<String> {
        let status = response.status();
        if !status.is_success() {
            return Err(GeofenceError::Transport(format!(
                "HTTP {status} from {}",
                redacted(url)
            )));
        }
        response
            .text()
            .await
            .map_err(|e| GeofenceError::Transport(format!("Failed to read response: {e}")))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: Url) -> GeofenceResult<String> {
        tracing::trace!(url = %redacted(&url), "GET");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| GeofenceError::Transport(format!("Request failed: {e}")))?;
        Self::read_body(response, &url).await
    }

    async fn post_form(&self, url: Url, form: Vec<(String, String)>) -> GeofenceResult<String> {
        tracing::trace!(url = %redacted(&url), fields = form.len(), "POST");
        let response = self
            .client
            .post(url.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| GeofenceError::Transport(format!("Request failed: {e}")))?;
        Self::read_body(response, &url).await
    }
}

/// Drops the query string so tokens never reach the logs.
pub(crate) fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::sync::Mutex;

    /// One request seen by [`MockTransport`].
    #[derive(Debug, Clone)]
    pub struct Recorded {
        pub url: Url,
        pub form: Option<Vec<(String, String)>>,
    }

    impl Recorded {
        pub fn query(&self, key: &str) -> Option<String> {
            self.url
                .query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
        }

        pub fn field(&self, key: &str) -> Option<String> {
            self.form
                .as_ref()?
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        }
    }

    /// Answers each request with the first route whose fragment appears in the URL.
    #[derive(Default)]
    pub struct MockTransport {
        routes: Mutex<Vec<(String, Result<String, String>)>>,
        pub requests: Mutex<Vec<Recorded>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(self, fragment: &str, body: &str) -> Self {
            self.routes
                .lock()
                .unwrap()
                .push((fragment.into(), Ok(body.into())));
            self
        }

        pub fn fail(self, fragment: &str, reason: &str) -> Self {
            self.routes
                .lock()
                .unwrap()
                .push((fragment.into(), Err(reason.into())));
            self
        }

        pub fn recorded(&self) -> Vec<Recorded> {
            self.requests.lock().unwrap().clone()
        }

        fn answer(&self, recorded: Recorded) -> GeofenceResult<String> {
            let url = recorded.url.to_string();
            self.requests.lock().unwrap().push(recorded);
            let routes = self.routes.lock().unwrap();
            match routes.iter().find(|(fragment, _)| url.contains(fragment.as_str())) {
                Some((_, Ok(body))) => Ok(body.clone()),
                Some((_, Err(reason))) => Err(GeofenceError::Transport(reason.clone())),
                None => Err(GeofenceError::Transport(format!("no route for {url}"))),
            }
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn get(&self, url: Url) -> GeofenceResult<String> {
            self.answer(Recorded { url, form: None })
        }

        async fn post_form(
            &self,
            url: Url,
            form: Vec<(String, String)>,
        ) -> GeofenceResult<String> {
            self.answer(Recorded {
                url,
                form: Some(form),
            })
        }
    }
}
