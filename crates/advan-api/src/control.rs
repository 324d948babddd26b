// HTTP control client for the reader's REST-like API.
//
// Base: http://{host}:{port}
// Bodies: XML in both directions, no authentication.

use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;
use crate::xml;

// ── Client ───────────────────────────────────────────────────────────

/// Async client for the reader's control plane.
///
/// Every call is a single request/response exchange. A response body that
/// contains the device error marker is a failure regardless of HTTP status;
/// the endpoint wrappers live in `devices` and `ops`.
#[derive(Debug, Clone)]
pub struct ControlClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ControlClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build from a base URL such as `http://10.0.0.5:3161`.
    pub fn new(base_url: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::with_client(base_url, http)
    }

    /// Build from host and control port.
    pub fn from_host(host: &str, port: u16, transport: &TransportConfig) -> Result<Self, Error> {
        Self::new(&format!("http://{host}:{port}"), transport)
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_client(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        let mut base_url = Url::parse(base_url)?;
        let path = base_url.path().trim_end_matches('/').to_owned();
        base_url.set_path(&format!("{path}/"));
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Join a relative path (e.g. `"devices"`) onto the base URL.
    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    /// `devices/{id}/{rest}`
    pub(crate) fn device_url(&self, device_id: &str, rest: &str) -> Result<Url, Error> {
        self.url(&format!("devices/{device_id}/{rest}"))
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    pub(crate) async fn get(&self, url: Url) -> Result<String, Error> {
        debug!("GET {url}");
        let resp = self.http.get(url).send().await?;
        Self::read_response(resp).await
    }

    /// PUT with an optional XML body. `None` sends an empty body.
    pub(crate) async fn put(&self, url: Url, body: Option<String>) -> Result<String, Error> {
        debug!("PUT {url}");
        let mut req = self.http.put(url);
        if let Some(body) = body {
            req = req
                .header(reqwest::header::CONTENT_TYPE, "application/xml")
                .body(body);
        }
        let resp = req.send().await?;
        Self::read_response(resp).await
    }

    /// PUT a plain-text body (device mode switch).
    pub(crate) async fn put_text(&self, url: Url, body: &str) -> Result<String, Error> {
        debug!("PUT {url} body={body:?}");
        let resp = self
            .http
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body.to_owned())
            .send()
            .await?;
        Self::read_response(resp).await
    }

    // ── Response handling ────────────────────────────────────────────

    async fn read_response(resp: reqwest::Response) -> Result<String, Error> {
        let status = resp.status();
        let body = resp.text().await?;

        xml::check_device_error(&body)?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(Error::Http {
                status: status.as_u16(),
                body: if body.is_empty() {
                    status.to_string()
                } else {
                    body
                },
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> ControlClient {
        ControlClient::with_client(base, reqwest::Client::new()).unwrap()
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        assert_eq!(client("http://10.0.0.5:3161").base_url().as_str(), "http://10.0.0.5:3161/");
        assert_eq!(client("http://h/api/").base_url().as_str(), "http://h/api/");
    }

    #[test]
    fn device_paths_join_onto_base() {
        let c = client("http://h:3161/api");
        assert_eq!(
            c.device_url("dev1", "getGPI/2").unwrap().as_str(),
            "http://h:3161/api/devices/dev1/getGPI/2"
        );
    }

    #[test]
    fn from_host_builds_http_url() {
        let c = ControlClient::from_host("reader.local", 3161, &TransportConfig::default()).unwrap();
        assert_eq!(c.base_url().as_str(), "http://reader.local:3161/");
    }

    #[test]
    fn rejects_garbage_base_url() {
        assert!(matches!(
            ControlClient::with_client("not a url", reqwest::Client::new()),
            Err(Error::InvalidUrl(_))
        ));
    }
}
