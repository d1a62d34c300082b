//! Transparent proxy bridge.
//!
//! Forwards a captive-portal request to the upstream named by its host
//! header and relays the response back unmodified. This is the one place
//! in the portal allowed to block: the original client is already
//! suspended awaiting a response, and the bridge bounds its own duration
//! with the HTTP client's network timeout. The upstream connection is
//! closed on every exit path — the connection is owned by the call and
//! dropped with it.

#[cfg(target_os = "espidf")]
pub use espidf_impl::EspProxyClient;

#[cfg(target_os = "espidf")]
mod espidf_impl {
    use core::time::Duration;

    use embedded_svc::http::client::Client;
    use embedded_svc::http::Method;
    use embedded_svc::io::{Read, Write};
    use esp_idf_svc::http::client::{Configuration, EspHttpConnection};
    use log::{info, warn};

    use crate::ports::{ProxyClient, ProxyError, UpstreamResponse};

    const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);
    const USER_AGENT: &str = concat!("hearth/", env!("CARGO_PKG_VERSION"));

    pub struct EspProxyClient;

    impl EspProxyClient {
        pub fn new() -> Self {
            Self
        }
    }

    impl Default for EspProxyClient {
        fn default() -> Self {
            Self::new()
        }
    }

    fn method_from(name: &str) -> Method {
        match name {
            "GET" => Method::Get,
            "PUT" => Method::Put,
            "POST" => Method::Post,
            "DELETE" => Method::Delete,
            "OPTIONS" => Method::Options,
            _ => Method::Get,
        }
    }

    impl ProxyClient for EspProxyClient {
        fn forward(
            &mut self,
            method: &str,
            url: &str,
            headers: &[(String, String)],
            body: Option<&[u8]>,
        ) -> Result<UpstreamResponse, ProxyError> {
            info!("proxy: {method} {url}");

            let connection = EspHttpConnection::new(&Configuration {
                timeout: Some(UPSTREAM_TIMEOUT),
                ..Default::default()
            })
            .map_err(|_| ProxyError::ConnectFailed)?;
            let mut client = Client::wrap(connection);

            let mut request_headers: Vec<(&str, &str)> = headers
                .iter()
                .filter(|(name, _)| !name.eq_ignore_ascii_case("host"))
                .map(|(name, value)| (name.as_str(), value.as_str()))
                .collect();
            request_headers.push(("User-Agent", USER_AGENT));

            let mut request = client
                .request(method_from(method), url, &request_headers)
                .map_err(|_| ProxyError::RequestFailed)?;
            if let Some(body) = body {
                request.write_all(body).map_err(|_| ProxyError::RequestFailed)?;
            }

            let mut response = request.submit().map_err(|e| {
                warn!("proxy: upstream request failed: {e}");
                ProxyError::RequestFailed
            })?;
            let status = response.status();

            // The IDF client cannot enumerate response headers; relay the
            // content type, which is what browsers need to render the page.
            let mut response_headers = Vec::new();
            if let Some(content_type) = response.header("Content-Type") {
                response_headers.push(("Content-Type".to_string(), content_type.to_string()));
            }

            let mut body = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                match response.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => body.extend_from_slice(&chunk[..n]),
                    Err(_) => return Err(ProxyError::RequestFailed),
                }
            }

            info!("proxy: upstream answered {status} ({} bytes)", body.len());
            Ok(UpstreamResponse {
                status,
                headers: response_headers,
                body,
            })
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Host simulation
// ───────────────────────────────────────────────────────────────

/// Recording proxy stub for host tests: queues canned upstream responses
/// and records every forwarded request.
#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
pub struct SimProxyClient {
    pub responses: std::collections::VecDeque<crate::ports::UpstreamResponse>,
    pub forwarded: Vec<(String, String)>,
}

#[cfg(not(target_os = "espidf"))]
impl SimProxyClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(not(target_os = "espidf"))]
impl crate::ports::ProxyClient for SimProxyClient {
    fn forward(
        &mut self,
        method: &str,
        url: &str,
        _headers: &[(String, String)],
        _body: Option<&[u8]>,
    ) -> Result<crate::ports::UpstreamResponse, crate::ports::ProxyError> {
        self.forwarded.push((method.to_string(), url.to_string()));
        self.responses
            .pop_front()
            .ok_or(crate::ports::ProxyError::ConnectFailed)
    }
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;
    use crate::ports::{ProxyClient, ProxyError, UpstreamResponse};

    #[test]
    fn sim_records_and_replays() {
        let mut proxy = SimProxyClient::new();
        proxy.responses.push_back(UpstreamResponse {
            status: 200,
            headers: vec![("Content-Type".to_string(), "text/html".to_string())],
            body: b"upstream".to_vec(),
        });

        let response = proxy
            .forward("GET", "http://evil.example/probe", &[], None)
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(
            proxy.forwarded,
            vec![("GET".to_string(), "http://evil.example/probe".to_string())]
        );

        // Exhausted queue behaves like an unreachable upstream.
        assert_eq!(
            proxy.forward("GET", "http://x/", &[], None).unwrap_err(),
            ProxyError::ConnectFailed
        );
    }
}
