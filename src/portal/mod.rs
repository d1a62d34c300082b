//! The provisioning portal.
//!
//! Owns everything configuration mode serves over the access point: the
//! HTTP route table, the captive-portal decision, the Wi-Fi scan
//! debouncer, the transparent proxy switch and the deferred reboot
//! schedule. The portal is transport-agnostic — `BootConfig` feeds it
//! requests from the ESP HTTP server and ticks it from the main loop;
//! host tests drive it directly.
//!
//! Within a tick everything is non-blocking; the single exception is the
//! proxy bridge, which answers a client that is already suspended.

pub mod body;
pub mod dns;
pub mod proxy;
pub mod scan;
pub mod ui;

use log::{info, warn};
use serde_json::{json, Value};

use crate::context::{AppContext, FRAMEWORK_VERSION, PROTOCOL_VERSION};
use crate::ports::{LinkStatus, ProxyClient, WifiControl};
use scan::{ScanDebouncer, ScanEvent, SCAN_INTERVAL_MS};

/// Delay between a successful configuration write and the reboot it
/// schedules, so the HTTP response reaches the client before restart.
pub const REBOOT_DELAY_MS: u64 = 3_000;

const CONTENT_TYPE_JSON: &str = "application/json";
const CONTENT_TYPE_TEXT: &str = "text/plain";
const CONTENT_TYPE_HTML: &str = "text/html";

// ───────────────────────────────────────────────────────────────
// Request / response model
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Options,
    Other,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Other => "GET",
        }
    }
}

/// One inbound HTTP request, body already reassembled.
#[derive(Debug, Clone)]
pub struct PortalRequest {
    pub method: Method,
    pub path: String,
    /// Host header as received; `None` when the client sent none.
    pub host: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl PortalRequest {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            host: None,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.body = Some(body.to_vec());
        self
    }
}

#[derive(Debug, Clone)]
pub struct PortalResponse {
    pub status: u16,
    pub content_type: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl PortalResponse {
    fn new(status: u16, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type: content_type.to_string(),
            // CORS applies to every portal response: browsers load the
            // provisioning UI from arbitrary captive-portal origins.
            headers: vec![
                ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
                (
                    "Access-Control-Allow-Methods".to_string(),
                    "GET, POST, PUT".to_string(),
                ),
                (
                    "Access-Control-Allow-Headers".to_string(),
                    "Content-Type, Origin, Referer, User-Agent".to_string(),
                ),
            ],
            body,
        }
    }

    fn empty(status: u16) -> Self {
        Self::new(status, CONTENT_TYPE_TEXT, Vec::new())
    }

    fn json(status: u16, value: &Value) -> Self {
        Self::new(status, CONTENT_TYPE_JSON, value.to_string().into_bytes())
    }

    fn success() -> Self {
        Self::json(200, &json!({ "success": true }))
    }

    fn error(status: u16, message: &str) -> Self {
        warn!("portal: {message}");
        Self::json(status, &json!({ "success": false, "error": message }))
    }

    fn text(status: u16, message: &str) -> Self {
        Self::new(status, CONTENT_TYPE_TEXT, message.as_bytes().to_vec())
    }

    fn redirect(location: &str) -> Self {
        let mut response = Self::empty(302);
        response
            .headers
            .push(("Location".to_string(), location.to_string()));
        response
    }

    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

// ───────────────────────────────────────────────────────────────
// Portal
// ───────────────────────────────────────────────────────────────

pub struct Portal<W: WifiControl, X: ProxyClient> {
    wifi: W,
    proxy: X,
    debouncer: ScanDebouncer,
    /// Serialized `{"networks": [...]}` snapshot from the most recent
    /// completed scan. Replaced wholesale, never mutated in place.
    networks_json: Option<String>,
    /// Millisecond timestamp a reboot was scheduled at. One-shot: set by
    /// a successful configuration write, never cleared.
    reboot_at: Option<u64>,
    proxy_enabled: bool,
    ap_ip: String,
    ui_bundle: Option<Vec<u8>>,
}

impl<W: WifiControl, X: ProxyClient> Portal<W, X> {
    pub fn new(wifi: W, proxy: X) -> Self {
        Self {
            wifi,
            proxy,
            debouncer: ScanDebouncer::new(SCAN_INTERVAL_MS),
            networks_json: None,
            reboot_at: None,
            proxy_enabled: false,
            ap_ip: String::new(),
            ui_bundle: None,
        }
    }

    /// Bring up the access point and load the UI bundle.
    pub fn start(&mut self, ctx: &mut AppContext) -> Result<(), crate::ports::WifiError> {
        let ap_name = ctx.ap_name();
        self.wifi.start_access_point(&ap_name, ctx.ap_password)?;
        self.ap_ip = self.wifi.ap_ip().to_string();
        self.ui_bundle = ui::load_bundle(ctx.config.storage());
        info!("portal: AP '{}' serving on {}", ap_name, self.ap_ip);
        Ok(())
    }

    pub fn ap_ip(&self) -> &str {
        &self.ap_ip
    }

    pub fn proxy_enabled(&self) -> bool {
        self.proxy_enabled
    }

    pub fn reboot_scheduled(&self) -> bool {
        self.reboot_at.is_some()
    }

    pub fn wifi_mut(&mut self) -> &mut W {
        &mut self.wifi
    }

    pub fn proxy_mut(&mut self) -> &mut X {
        &mut self.proxy
    }

    // ── Per-tick work ─────────────────────────────────────────

    /// One tick of portal housekeeping. DNS is serviced by the caller
    /// before this runs. A pending reboot takes priority over all scan
    /// bookkeeping so it is never delayed.
    pub fn tick(&mut self, ctx: &mut AppContext, now_ms: u64) {
        if let Some(scheduled_at) = self.reboot_at {
            if now_ms.saturating_sub(scheduled_at) >= REBOOT_DELAY_MS && !ctx.flags.reboot {
                info!("portal: deferred reboot elapsed, flagging restart");
                ctx.flags.reboot = true;
            }
            return;
        }

        match self.debouncer.tick(&mut self.wifi, now_ms) {
            ScanEvent::Completed(networks) => {
                self.networks_json = Some(json!({ "networks": networks }).to_string());
            }
            ScanEvent::None | ScanEvent::Started | ScanEvent::Failed => {}
        }
    }

    // ── Request dispatch ──────────────────────────────────────

    pub fn handle_request(
        &mut self,
        ctx: &mut AppContext,
        request: &PortalRequest,
        now_ms: u64,
    ) -> PortalResponse {
        if request.method == Method::Options {
            return PortalResponse::empty(200);
        }

        match (request.method, request.path.as_str()) {
            (Method::Get, "/heart") => {
                info!("received heart request");
                PortalResponse::empty(204)
            }
            (Method::Get, "/device-info") => self.on_device_info(ctx),
            (Method::Get, "/networks") => self.on_networks(),
            (Method::Get, "/config") => self.on_current_config(ctx),
            (Method::Put, "/config") => self.on_config_write(ctx, request, now_ms),
            (Method::Post, "/config/patch") => self.on_config_patch(ctx, request, now_ms),
            (Method::Post, "/wifi/connect") => self.on_wifi_connect(request),
            (Method::Get, "/wifi/status") => self.on_wifi_status(),
            (Method::Post, "/proxy/control") => self.on_proxy_control(request),
            _ => self.on_captive_portal(request),
        }
    }

    fn on_device_info(&self, ctx: &AppContext) -> PortalResponse {
        info!("received device information request");

        let mut info = json!({
            "protocol_version": PROTOCOL_VERSION,
            "framework_version": FRAMEWORK_VERSION,
            "device_hardware_id": ctx.device_id,
            "firmware": {
                "name": ctx.firmware.name,
                "version": ctx.firmware.version,
            },
        });

        match ctx.config.is_valid(&ctx.settings) {
            Ok(()) => info["device_config_state"] = json!(true),
            Err(e) => {
                info["device_config_state"] = json!(false);
                info["device_config_state_error"] = json!(e.to_string());
            }
        }

        info["nodes"] = ctx
            .nodes
            .iter()
            .map(|node| json!({ "id": node.id, "type": node.type_name }))
            .collect();

        info["settings"] = ctx
            .settings
            .iter()
            .map(|setting| {
                let mut entry = json!({
                    "name": setting.name,
                    "description": setting.description,
                    "type": setting.kind.as_str(),
                    "required": setting.required,
                });
                if let Some(default) = setting.default.as_ref().filter(|_| !setting.required) {
                    entry["default"] = default.to_json();
                }
                entry
            })
            .collect();

        PortalResponse::json(200, &info)
    }

    fn on_networks(&self) -> PortalResponse {
        info!("received networks request");
        match &self.networks_json {
            Some(snapshot) => PortalResponse::new(
                200,
                CONTENT_TYPE_JSON,
                snapshot.clone().into_bytes(),
            ),
            None => PortalResponse::error(503, "initial Wi-Fi scan not finished yet"),
        }
    }

    fn on_current_config(&self, ctx: &AppContext) -> PortalResponse {
        match ctx.config.read_safe(&ctx.settings) {
            Ok(document) => PortalResponse::json(200, &document),
            Err(e) => PortalResponse::error(500, &e.to_string()),
        }
    }

    fn on_config_write(
        &mut self,
        ctx: &mut AppContext,
        request: &PortalRequest,
        now_ms: u64,
    ) -> PortalResponse {
        info!("received config request");
        if ctx.config.is_valid(&ctx.settings).is_ok() {
            return PortalResponse::error(403, "device already configured");
        }

        let Some(body) = request.body.as_deref() else {
            return PortalResponse::error(500, "request body required");
        };
        if let Err(e) = ctx.config.write(body, &ctx.settings) {
            return PortalResponse::error(500, &e.to_string());
        }

        info!("configured");
        self.schedule_reboot(ctx, now_ms);
        PortalResponse::success()
    }

    fn on_config_patch(
        &mut self,
        ctx: &mut AppContext,
        request: &PortalRequest,
        now_ms: u64,
    ) -> PortalResponse {
        let Some(body) = request.body.as_deref() else {
            return PortalResponse::error(500, "request body required");
        };
        if let Err(e) = ctx.config.patch(body, &ctx.settings) {
            return PortalResponse::error(500, &e.to_string());
        }

        info!("configured");
        self.schedule_reboot(ctx, now_ms);
        PortalResponse::success()
    }

    /// Response sent first, restart deferred: the client must see the
    /// success payload before the AP goes away.
    fn schedule_reboot(&mut self, ctx: &mut AppContext, now_ms: u64) {
        ctx.flags.disable_normal = true;
        if self.reboot_at.is_none() {
            self.reboot_at = Some(now_ms);
        }
    }

    fn on_wifi_connect(&mut self, request: &PortalRequest) -> PortalResponse {
        info!("received Wi-Fi connect request");
        let Some(parsed) = request.body.as_deref().and_then(parse_json) else {
            return PortalResponse::error(400, "invalid or too big JSON");
        };

        let (Some(ssid), Some(password)) = (
            parsed.get("ssid").and_then(Value::as_str),
            parsed.get("password").and_then(Value::as_str),
        ) else {
            return PortalResponse::error(400, "ssid and password required");
        };

        info!("connecting to Wi-Fi '{ssid}'");
        if let Err(e) = self.wifi.begin_connect(ssid, password) {
            return PortalResponse::error(400, &e.to_string());
        }
        PortalResponse::json(202, &json!({ "success": true }))
    }

    fn on_wifi_status(&self) -> PortalResponse {
        info!("received Wi-Fi status request");
        let status = self.wifi.link_status();
        let mut payload = json!({ "status": status.as_str() });
        if let LinkStatus::Connected { local_ip } = &status {
            payload["local_ip"] = json!(local_ip);
        }
        PortalResponse::json(200, &payload)
    }

    fn on_proxy_control(&mut self, request: &PortalRequest) -> PortalResponse {
        info!("received proxy control request");
        let Some(parsed) = request.body.as_deref().and_then(parse_json) else {
            return PortalResponse::error(400, "invalid or too big JSON");
        };
        let Some(enable) = parsed.get("enable").and_then(Value::as_bool) else {
            return PortalResponse::error(400, "enable parameter is required");
        };

        self.proxy_enabled = enable;
        PortalResponse::json(202, &json!({ "success": true }))
    }

    // ── Captive portal dispatch ───────────────────────────────

    /// Unmatched requests end up here. The decision is keyed strictly on
    /// comparing the host header against the AP's literal address: any
    /// differing host — malformed or empty-but-present included — is
    /// foreign.
    fn on_captive_portal(&mut self, request: &PortalRequest) -> PortalResponse {
        match &request.host {
            Some(host) if host != &self.ap_ip => {
                if self.proxy_enabled {
                    info!("captive portal: proxying {}{}", host, request.path);
                    self.bridge_upstream(request, host)
                } else {
                    // Every browser brand probes a different URL; all of
                    // them must land on the local server to avoid cache
                    // poisoning.
                    let location = format!("http://{}", self.ap_ip);
                    info!("captive portal: redirect to {location}");
                    PortalResponse::redirect(&location)
                }
            }
            _ => self.serve_local(request),
        }
    }

    fn serve_local(&self, request: &PortalRequest) -> PortalResponse {
        if request.path == "/" {
            match &self.ui_bundle {
                Some(bundle) => {
                    info!("serving UI bundle");
                    PortalResponse::new(200, CONTENT_TYPE_HTML, bundle.clone())
                }
                None => PortalResponse::text(
                    404,
                    "UI bundle not loaded. Use the configuration HTTP API instead.",
                ),
            }
        } else {
            PortalResponse::text(404, &format!("request not found for url: {}", request.path))
        }
    }

    /// The one deliberately blocking call in the portal: the client is
    /// already waiting, and the proxy client bounds its own duration.
    fn bridge_upstream(&mut self, request: &PortalRequest, host: &str) -> PortalResponse {
        let url = format!("http://{}{}", host, request.path);
        match self.proxy.forward(
            request.method.as_str(),
            &url,
            &request.headers,
            request.body.as_deref(),
        ) {
            Ok(upstream) => {
                let content_type = upstream
                    .headers
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
                    .map_or(CONTENT_TYPE_HTML, |(_, value)| value.as_str());
                let mut response =
                    PortalResponse::new(upstream.status, content_type, upstream.body.clone());
                response.headers.extend(upstream.headers.clone());
                response
            }
            Err(e) => PortalResponse::error(502, &format!("proxy failed: {e}")),
        }
    }
}

fn parse_json(body: &[u8]) -> Option<Value> {
    serde_json::from_slice(body).ok()
}
