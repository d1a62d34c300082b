//! Configuration boot mode.
//!
//! Owns the provisioning session for one power cycle: the software
//! access point, the captive-portal DNS responder, the HTTP server and
//! the [`Portal`] they feed. Each tick services DNS first, then lets the
//! portal run its reboot/scan bookkeeping — and returns promptly; the
//! HTTP layer interleaves between ticks on the network stack's own
//! scheduling.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{info, warn};

use crate::adapters::time::MonotonicClock;
use crate::context::{lock, SharedContext};
use crate::portal::dns::DnsResponder;
use crate::portal::Portal;
use crate::ports::{Indicator, IndicatorMode, ProxyClient, WifiControl};

use super::Boot;

/// Fallback AP address when the adapter reports none.
const DEFAULT_AP_ADDR: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

type SharedPortal<W, X> = Arc<Mutex<Portal<W, X>>>;

fn lock_portal<W: WifiControl, X: ProxyClient>(
    portal: &SharedPortal<W, X>,
) -> MutexGuard<'_, Portal<W, X>> {
    match portal.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct BootConfig<W, X>
where
    W: WifiControl + Send + 'static,
    X: ProxyClient + Send + 'static,
{
    ctx: SharedContext,
    portal: SharedPortal<W, X>,
    indicator: Box<dyn Indicator + Send>,
    dns: Option<DnsResponder>,
    clock: MonotonicClock,
    #[cfg(target_os = "espidf")]
    http: Option<esp_idf_svc::http::server::EspHttpServer<'static>>,
}

impl<W, X> BootConfig<W, X>
where
    W: WifiControl + Send + 'static,
    X: ProxyClient + Send + 'static,
{
    pub fn new(ctx: SharedContext, portal: Portal<W, X>, indicator: Box<dyn Indicator + Send>) -> Self {
        Self {
            ctx,
            portal: Arc::new(Mutex::new(portal)),
            indicator,
            dns: None,
            clock: MonotonicClock::new(),
            #[cfg(target_os = "espidf")]
            http: None,
        }
    }

    /// Shared portal handle, for the HTTP transport and for tests.
    pub fn portal(&self) -> SharedPortal<W, X> {
        Arc::clone(&self.portal)
    }

    #[cfg(target_os = "espidf")]
    fn start_http_server(&mut self) {
        match espidf_http::serve(Arc::clone(&self.ctx), Arc::clone(&self.portal)) {
            Ok(server) => self.http = Some(server),
            Err(e) => warn!("HTTP server start failed: {e}"),
        }
    }
}

impl<W, X> Boot for BootConfig<W, X>
where
    W: WifiControl + Send + 'static,
    X: ProxyClient + Send + 'static,
{
    fn name(&self) -> &'static str {
        "configuration"
    }

    fn setup(&mut self) {
        self.indicator.set_mode(IndicatorMode::Provisioning);

        let mut portal = lock_portal(&self.portal);
        {
            let mut ctx = lock(&self.ctx);
            info!("device ID is {}", ctx.device_id);
            if let Err(e) = portal.start(&mut ctx) {
                warn!("access point start failed: {e}");
                return;
            }
        }

        let answer_ip = portal.ap_ip().parse().unwrap_or(DEFAULT_AP_ADDR);
        match DnsResponder::bind(answer_ip) {
            Ok(responder) => self.dns = Some(responder),
            // The portal stays reachable by literal address.
            Err(e) => warn!("captive DNS unavailable: {e}"),
        }
        drop(portal);

        #[cfg(target_os = "espidf")]
        self.start_http_server();
    }

    fn tick(&mut self) {
        if let Some(dns) = self.dns.as_mut() {
            dns.process_pending();
        }

        let now_ms = self.clock.now_ms();
        let mut portal = lock_portal(&self.portal);
        let mut ctx = lock(&self.ctx);
        portal.tick(&mut ctx, now_ms);
    }
}

// ───────────────────────────────────────────────────────────────
// ESP HTTP transport
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod espidf_http {
    use std::sync::{Arc, Mutex};

    use embedded_svc::http::Method as HttpMethod;
    use embedded_svc::io::{Read, Write};
    use esp_idf_svc::http::server::{Configuration, EspHttpServer, Request};
    use log::warn;

    use crate::adapters::time::MonotonicClock;
    use crate::context::{lock, SharedContext};
    use crate::portal::body::{BodyAssembler, BodyError};
    use crate::portal::{Method, PortalRequest};
    use crate::ports::{ProxyClient, WifiControl};

    use super::{lock_portal, SharedPortal};

    /// Request headers worth carrying into the portal (the IDF server
    /// cannot enumerate headers, only look up known names).
    const FORWARDED_HEADERS: &[&str] = &[
        "Content-Type",
        "Accept",
        "Origin",
        "Referer",
        "User-Agent",
        "Cookie",
        "Authorization",
    ];

    pub fn serve<W, X>(
        ctx: SharedContext,
        portal: SharedPortal<W, X>,
    ) -> anyhow::Result<EspHttpServer<'static>>
    where
        W: WifiControl + Send + 'static,
        X: ProxyClient + Send + 'static,
    {
        let conf = Configuration {
            stack_size: 10 * 1024,
            uri_match_wildcard: true,
            ..Default::default()
        };
        let mut server = EspHttpServer::new(&conf)?;

        for (http_method, method) in [
            (HttpMethod::Get, Method::Get),
            (HttpMethod::Post, Method::Post),
            (HttpMethod::Put, Method::Put),
            (HttpMethod::Delete, Method::Delete),
            (HttpMethod::Options, Method::Options),
        ] {
            let ctx = Arc::clone(&ctx);
            let portal = Arc::clone(&portal);
            let clock = MonotonicClock::new();

            server.fn_handler::<anyhow::Error, _>("/*", http_method, move |mut req| {
                let request = match read_request(&mut req, method) {
                    Ok(request) => request,
                    Err(BodyError::Oversized { .. }) => {
                        // Resource protection, not a client contract.
                        req.into_status_response(413)?;
                        return Ok(());
                    }
                    Err(e) => {
                        warn!("request body error: {e}");
                        req.into_status_response(400)?;
                        return Ok(());
                    }
                };

                // Same lock order as the tick path: portal, then context.
                let response = {
                    let mut portal = lock_portal(&portal);
                    let mut ctx = lock(&ctx);
                    portal.handle_request(&mut ctx, &request, clock.now_ms())
                };

                let mut headers: Vec<(&str, &str)> =
                    vec![("Content-Type", response.content_type.as_str())];
                headers.extend(
                    response
                        .headers
                        .iter()
                        .map(|(name, value)| (name.as_str(), value.as_str())),
                );

                let mut out = req.into_response(response.status, None, &headers)?;
                out.write_all(&response.body)?;
                Ok(())
            })?;
        }

        Ok(server)
    }

    fn read_request(
        req: &mut Request<&mut esp_idf_svc::http::server::EspHttpConnection>,
        method: Method,
    ) -> Result<PortalRequest, BodyError> {
        let uri = req.uri().to_string();
        let path = uri.split('?').next().unwrap_or("/").to_string();
        let host = req.header("Host").map(str::to_string);

        let mut headers = Vec::new();
        for name in FORWARDED_HEADERS {
            if let Some(value) = req.header(name) {
                headers.push(((*name).to_string(), value.to_string()));
            }
        }

        let total: usize = req
            .header("Content-Length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let mut body = None;
        if total > 0 {
            let mut assembler = BodyAssembler::new();
            let mut offset = 0usize;
            let mut chunk = [0u8; 512];
            loop {
                let read = req.read(&mut chunk).unwrap_or(0);
                if read == 0 {
                    break;
                }
                match assembler.feed(offset, &chunk[..read], total)? {
                    Some(complete) => {
                        body = Some(complete);
                        break;
                    }
                    None => offset += read,
                }
            }
        }

        Ok(PortalRequest {
            method,
            path,
            host,
            headers,
            body,
        })
    }
}

// ───────────────────────────────────────────────────────────────
// Tests (host: AP + DNS lifecycle without the ESP HTTP server)
// ───────────────────────────────────────────────────────────────

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;
    use crate::adapters::nvs::NvsStorage;
    use crate::adapters::wifi::SimWifi;
    use crate::config::ConfigStore;
    use crate::context::{AppContext, FirmwareInfo};
    use crate::portal::proxy::SimProxyClient;
    use crate::ports::NullIndicator;
    use crate::registry::{NodeRegistry, SettingsRegistry};

    fn shared_ctx() -> SharedContext {
        Arc::new(Mutex::new(AppContext::new(
            "Hearth",
            FirmwareInfo {
                name: "fw",
                version: "0",
            },
            ConfigStore::new(Box::new(NvsStorage::new().unwrap())),
            SettingsRegistry::new(),
            NodeRegistry::new(),
        )))
    }

    #[test]
    fn setup_brings_up_branded_ap() {
        let ctx = shared_ctx();
        let expected_ssid = format!("Hearth-{}", lock(&ctx).device_id);
        let portal = Portal::new(SimWifi::new(), SimProxyClient::new());
        let mut boot = BootConfig::new(ctx, portal, Box::new(NullIndicator));

        boot.setup();

        let portal = boot.portal();
        let mut portal = lock_portal(&portal);
        assert_eq!(portal.ap_ip(), "192.168.4.1");
        let (ssid, password) = portal.wifi_mut().ap.clone().unwrap();
        assert_eq!(ssid, expected_ssid);
        assert!(password.is_none());
    }

    #[test]
    fn tick_runs_portal_housekeeping() {
        let ctx = shared_ctx();
        let portal = Portal::new(SimWifi::new(), SimProxyClient::new());
        let mut boot = BootConfig::new(Arc::clone(&ctx), portal, Box::new(NullIndicator));

        boot.setup();
        boot.tick();

        // First tick kicks off the initial scan.
        let portal = boot.portal();
        let mut portal = lock_portal(&portal);
        assert_eq!(portal.wifi_mut().scans_started(), 1);
    }
}
