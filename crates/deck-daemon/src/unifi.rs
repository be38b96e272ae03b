//! UniFi network controller adapter.
//!
//! Talks to the controller's private JSON API with a cookie session.  Every
//! operation logs in first; sessions are short-lived on most consoles and a
//! tile press is rare enough that the extra round trip does not matter.

use std::collections::HashSet;
use std::sync::Mutex;

use deck_proto::config::NetworkConfig;
use futures_util::future::{BoxFuture, FutureExt};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("network control is disabled")]
    Disabled,
    #[error("no controller password configured (set `password` or ${0})")]
    NoPassword(String),
    #[error("controller request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("controller answered {0}")]
    Status(StatusCode),
    #[error("controller rejected the request: {0}")]
    Api(String),
}

pub trait NetworkController: Send + Sync {
    fn is_any_managed_device_blocked(&self) -> BoxFuture<'_, Result<bool, NetworkError>>;

    /// Unblock every managed device if any is blocked, otherwise block them all.
    fn toggle_managed_devices(&self) -> BoxFuture<'_, Result<(), NetworkError>>;

    /// Kick every wireless client so it reassociates.
    fn reconnect_all_devices(&self) -> BoxFuture<'_, Result<(), NetworkError>>;

    fn unblock_all_devices(&self) -> BoxFuture<'_, Result<(), NetworkError>>;
}

/// Used when `[network] enabled = false`.
pub struct DisabledNetwork;

impl NetworkController for DisabledNetwork {
    fn is_any_managed_device_blocked(&self) -> BoxFuture<'_, Result<bool, NetworkError>> {
        async { Err(NetworkError::Disabled) }.boxed()
    }

    fn toggle_managed_devices(&self) -> BoxFuture<'_, Result<(), NetworkError>> {
        async { Err(NetworkError::Disabled) }.boxed()
    }

    fn reconnect_all_devices(&self) -> BoxFuture<'_, Result<(), NetworkError>> {
        async { Err(NetworkError::Disabled) }.boxed()
    }

    fn unblock_all_devices(&self) -> BoxFuture<'_, Result<(), NetworkError>> {
        async { Err(NetworkError::Disabled) }.boxed()
    }
}

// ── Wire format ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Meta {
    rc: String,
    #[serde(default)]
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    meta: Meta,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<Vec<T>, NetworkError> {
        if self.meta.rc == "ok" {
            Ok(self.data)
        } else {
            Err(NetworkError::Api(
                self.meta.msg.unwrap_or_else(|| self.meta.rc.clone()),
            ))
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct KnownClient {
    mac: String,
    #[serde(default)]
    blocked: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ActiveClient {
    mac: String,
    #[serde(default)]
    is_wired: Option<bool>,
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    oui: Option<String>,
}

fn normalize_mac(mac: &str) -> String {
    mac.trim().to_ascii_lowercase()
}

// ── Controller ────────────────────────────────────────────────────────────────

pub struct UnifiController {
    client: Client,
    base_url: String,
    site: String,
    unifi_os: bool,
    username: String,
    password_env: String,
    password: Option<String>,
    managed: Vec<String>,
    keep_connected: HashSet<String>,
    csrf_token: Mutex<Option<String>>,
}

impl UnifiController {
    pub fn new(config: &NetworkConfig) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .cookie_store(true)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            site: config.site.clone(),
            unifi_os: config.unifi_os,
            username: config.username.clone(),
            password_env: config.password_env.clone(),
            password: config.resolve_password(),
            managed: config.managed_devices.iter().map(|m| normalize_mac(m)).collect(),
            keep_connected: config.keep_connected.iter().map(|m| normalize_mac(m)).collect(),
            csrf_token: Mutex::new(None),
        })
    }

    fn login_url(&self) -> String {
        if self.unifi_os {
            format!("{}/api/auth/login", self.base_url)
        } else {
            format!("{}/api/login", self.base_url)
        }
    }

    /// Site-scoped network API endpoint, e.g. `stat/sta`.
    fn api_url(&self, path: &str) -> String {
        let prefix = if self.unifi_os { "/proxy/network" } else { "" };
        format!("{}{}/api/s/{}/{}", self.base_url, prefix, self.site, path)
    }

    fn csrf(&self) -> Option<String> {
        self.csrf_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn login(&self) -> Result<(), NetworkError> {
        let password = self
            .password
            .clone()
            .ok_or_else(|| NetworkError::NoPassword(self.password_env.clone()))?;

        let response = self
            .client
            .post(self.login_url())
            .json(&json!({ "username": self.username, "password": password }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NetworkError::Status(response.status()));
        }

        let token = response
            .headers()
            .get("x-csrf-token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *self
            .csrf_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = token;
        debug!("unifi: logged in as {}", self.username);
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, NetworkError> {
        let mut request = self.client.get(self.api_url(path));
        if let Some(token) = self.csrf() {
            request = request.header("x-csrf-token", token);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(NetworkError::Status(response.status()));
        }
        response.json::<Envelope<T>>().await?.into_data()
    }

    async fn station_command(&self, cmd: &str, mac: &str) -> Result<(), NetworkError> {
        let mut request = self
            .client
            .post(self.api_url("cmd/stamgr"))
            .json(&json!({ "cmd": cmd, "mac": normalize_mac(mac) }));
        if let Some(token) = self.csrf() {
            request = request.header("x-csrf-token", token);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(NetworkError::Status(response.status()));
        }
        response.json::<Envelope<Value>>().await?.into_data()?;
        Ok(())
    }

    async fn blocked_macs(&self) -> Result<Vec<String>, NetworkError> {
        let known: Vec<KnownClient> = self.get("rest/user").await?;
        Ok(blocked_macs(&known))
    }

    async fn managed_blocked(&self) -> Result<bool, NetworkError> {
        let blocked = self.blocked_macs().await?;
        Ok(any_managed_blocked(&self.managed, &blocked))
    }
}

fn blocked_macs(known: &[KnownClient]) -> Vec<String> {
    known
        .iter()
        .filter(|c| c.blocked)
        .map(|c| normalize_mac(&c.mac))
        .collect()
}

fn any_managed_blocked(managed: &[String], blocked: &[String]) -> bool {
    blocked.iter().any(|mac| managed.contains(mac))
}

fn reconnect_targets<'a>(
    active: &'a [ActiveClient],
    keep_connected: &HashSet<String>,
) -> impl Iterator<Item = &'a ActiveClient> + 'a {
    let keep = keep_connected.clone();
    active
        .iter()
        .filter(move |c| c.is_wired == Some(false) && !keep.contains(&normalize_mac(&c.mac)))
}

impl NetworkController for UnifiController {
    fn is_any_managed_device_blocked(&self) -> BoxFuture<'_, Result<bool, NetworkError>> {
        async move {
            self.login().await?;
            self.managed_blocked().await
        }
        .boxed()
    }

    fn toggle_managed_devices(&self) -> BoxFuture<'_, Result<(), NetworkError>> {
        async move {
            self.login().await?;
            let cmd = if self.managed_blocked().await? {
                info!("unifi: unblocking {} managed devices", self.managed.len());
                "unblock-sta"
            } else {
                info!("unifi: blocking {} managed devices", self.managed.len());
                "block-sta"
            };
            for mac in &self.managed {
                debug!("unifi: {} {}", cmd, mac);
                self.station_command(cmd, mac).await?;
            }
            Ok(())
        }
        .boxed()
    }

    fn reconnect_all_devices(&self) -> BoxFuture<'_, Result<(), NetworkError>> {
        async move {
            self.login().await?;
            let active: Vec<ActiveClient> = self.get("stat/sta").await?;
            for client in reconnect_targets(&active, &self.keep_connected) {
                info!(
                    "unifi: reconnecting {} from {} ({})",
                    client.hostname.as_deref().unwrap_or("unknown"),
                    client.oui.as_deref().unwrap_or("unknown vendor"),
                    client.mac
                );
                self.station_command("kick-sta", &client.mac).await?;
            }
            Ok(())
        }
        .boxed()
    }

    fn unblock_all_devices(&self) -> BoxFuture<'_, Result<(), NetworkError>> {
        async move {
            self.login().await?;
            for mac in self.blocked_macs().await? {
                info!("unifi: unblocking {}", mac);
                self.station_command("unblock-sta", &mac).await?;
            }
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(unifi_os: bool) -> UnifiController {
        let config = NetworkConfig {
            enabled: true,
            url: "https://10.0.0.1/".into(),
            unifi_os,
            managed_devices: vec!["64:B5:C6:C1:33:CF".into()],
            keep_connected: vec!["B8:27:EB:02:8F:8C".into()],
            ..NetworkConfig::default()
        };
        UnifiController::new(&config).unwrap()
    }

    #[test]
    fn test_classic_urls() {
        let c = controller(false);
        assert_eq!(c.login_url(), "https://10.0.0.1/api/login");
        assert_eq!(c.api_url("stat/sta"), "https://10.0.0.1/api/s/default/stat/sta");
    }

    #[test]
    fn test_unifi_os_urls() {
        let c = controller(true);
        assert_eq!(c.login_url(), "https://10.0.0.1/api/auth/login");
        assert_eq!(
            c.api_url("cmd/stamgr"),
            "https://10.0.0.1/proxy/network/api/s/default/cmd/stamgr"
        );
    }

    #[test]
    fn test_envelope_errors_surface_message() {
        let ok: Envelope<KnownClient> = serde_json::from_value(json!({
            "meta": { "rc": "ok" },
            "data": [
                { "mac": "64:B5:C6:C1:33:CF", "blocked": true },
                { "mac": "aa:bb:cc:dd:ee:ff" }
            ]
        }))
        .unwrap();
        let known = ok.into_data().unwrap();
        assert_eq!(blocked_macs(&known), vec!["64:b5:c6:c1:33:cf".to_string()]);

        let err: Envelope<Value> = serde_json::from_value(json!({
            "meta": { "rc": "error", "msg": "api.err.LoginRequired" }
        }))
        .unwrap();
        assert!(matches!(err.into_data(), Err(NetworkError::Api(m)) if m == "api.err.LoginRequired"));
    }

    #[test]
    fn test_managed_match_ignores_case() {
        let c = controller(false);
        assert!(any_managed_blocked(&c.managed, &["64:b5:c6:c1:33:cf".to_string()]));
        assert!(!any_managed_blocked(&c.managed, &["aa:bb:cc:dd:ee:ff".to_string()]));
        assert!(!any_managed_blocked(&c.managed, &[]));
    }

    #[test]
    fn test_reconnect_skips_wired_and_kept_clients() {
        let c = controller(false);
        let active: Vec<ActiveClient> = serde_json::from_value(json!([
            { "mac": "11:11:11:11:11:11", "is_wired": true },
            { "mac": "b8:27:eb:02:8f:8c", "is_wired": false },
            { "mac": "22:22:22:22:22:22", "is_wired": false, "hostname": "tablet" },
            { "mac": "33:33:33:33:33:33", "hostname": "unknown-link" }
        ]))
        .unwrap();
        let targets: Vec<&str> = reconnect_targets(&active, &c.keep_connected)
            .map(|c| c.mac.as_str())
            .collect();
        assert_eq!(targets, vec!["22:22:22:22:22:22"]);
    }

    #[tokio::test]
    async fn test_disabled_controller_refuses() {
        let n = DisabledNetwork;
        assert!(matches!(
            n.is_any_managed_device_blocked().await,
            Err(NetworkError::Disabled)
        ));
        assert!(matches!(n.unblock_all_devices().await, Err(NetworkError::Disabled)));
    }

    #[tokio::test]
    async fn test_missing_password_fails_before_any_request() {
        let config = NetworkConfig {
            enabled: true,
            url: "https://10.0.0.1".into(),
            password_env: "DECKBRIDGE_TEST_UNSET_PASSWORD".into(),
            ..NetworkConfig::default()
        };
        let c = UnifiController::new(&config).unwrap();
        assert!(matches!(c.login().await, Err(NetworkError::NoPassword(_))));
    }
}
