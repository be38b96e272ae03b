use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub input: InputConfig,
}

/// Media player HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_player_url")]
    pub base_url: String,
    /// Room (zone) whose state is mirrored.  Push events for other rooms are
    /// ignored.
    #[serde(default = "default_room")]
    pub room: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Quiet period before a requested poll is sent.
    #[serde(default = "default_poll_debounce_ms")]
    pub poll_debounce_ms: u64,
    #[serde(default)]
    pub command_method: CommandMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommandMethod {
    Get,
    #[default]
    Post,
}

/// Webhook listener for the player's push feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_push_port")]
    pub port: u16,
}

/// UniFi controller used to block and reconnect managed clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_controller_url")]
    pub url: String,
    #[serde(default = "default_username")]
    pub username: String,
    /// Inline password.  Left empty, `password_env` is read instead.
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_password_env")]
    pub password_env: String,
    #[serde(default = "default_site")]
    pub site: String,
    /// UniFi OS consoles prefix the network API with `/proxy/network`.
    #[serde(default)]
    pub unifi_os: bool,
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,
    /// MAC addresses toggled by the network tile.
    #[serde(default)]
    pub managed_devices: Vec<String>,
    /// Wireless clients that reconnect-all never kicks.
    #[serde(default)]
    pub keep_connected: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub backend: SurfaceBackend,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_brightness")]
    pub brightness: u8,
    #[serde(default = "platform::dump_dir")]
    pub dump_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceBackend {
    #[default]
    Hid,
    Dump,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// TTF/OTF font with Nerd Font icon glyphs.  Text is skipped without it.
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    #[serde(default = "default_art_cache_capacity")]
    pub art_cache_capacity: usize,
    #[serde(default = "default_volume_overlay_ms")]
    pub volume_overlay_ms: u64,
}

/// What a tile does when pressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TileAction {
    Previous,
    PlayPause,
    Next,
    ShuffleToggle,
    Playlist(String),
    NetworkToggle,
    NetworkReconnect,
    NetworkUnblockAll,
    /// Local only: switch the strip between now-playing and details.
    StripMode,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Indexed by tile; missing entries behave as `none`.
    #[serde(default = "default_tiles")]
    pub tiles: Vec<TileAction>,
    #[serde(default = "default_encoder_press")]
    pub encoder_press: TileAction,
    /// Volume percent per dial detent.
    #[serde(default = "default_dial_sensitivity")]
    pub dial_sensitivity: i32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            base_url: default_player_url(),
            room: default_room(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_debounce_ms: default_poll_debounce_ms(),
            command_method: CommandMethod::default(),
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_bind_address(),
            port: default_push_port(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_controller_url(),
            username: default_username(),
            password: String::new(),
            password_env: default_password_env(),
            site: default_site(),
            unifi_os: false,
            accept_invalid_certs: true,
            managed_devices: Vec::new(),
            keep_connected: Vec::new(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            backend: SurfaceBackend::default(),
            model: default_model(),
            brightness: default_brightness(),
            dump_dir: platform::dump_dir(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            font_path: None,
            max_text_chars: default_max_text_chars(),
            art_cache_capacity: default_art_cache_capacity(),
            volume_overlay_ms: default_volume_overlay_ms(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            tiles: default_tiles(),
            encoder_press: default_encoder_press(),
            dial_sensitivity: default_dial_sensitivity(),
        }
    }
}

impl NetworkConfig {
    /// Inline password, falling back to the configured environment variable.
    pub fn resolve_password(&self) -> Option<String> {
        if !self.password.is_empty() {
            return Some(self.password.clone());
        }
        std::env::var(&self.password_env).ok().filter(|p| !p.is_empty())
    }
}

impl InputConfig {
    pub fn tile_action(&self, index: u8) -> &TileAction {
        self.tiles
            .get(index as usize)
            .unwrap_or(&TileAction::None)
    }
}

fn default_true() -> bool {
    true
}

fn default_player_url() -> String {
    "http://127.0.0.1:5005".to_string()
}

fn default_room() -> String {
    "Living Room".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_poll_debounce_ms() -> u64 {
    20
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_push_port() -> u16 {
    5007
}

fn default_controller_url() -> String {
    "https://192.168.1.1".to_string()
}

fn default_username() -> String {
    "apiuser".to_string()
}

fn default_password_env() -> String {
    "UNIFI_PASSWORD".to_string()
}

fn default_site() -> String {
    "default".to_string()
}

fn default_model() -> String {
    "plus".to_string()
}

fn default_brightness() -> u8 {
    50
}

fn default_debounce_ms() -> u64 {
    20
}

fn default_max_text_chars() -> usize {
    40
}

fn default_art_cache_capacity() -> usize {
    10
}

fn default_volume_overlay_ms() -> u64 {
    2000
}

fn default_tiles() -> Vec<TileAction> {
    vec![
        TileAction::Previous,
        TileAction::PlayPause,
        TileAction::Next,
        TileAction::ShuffleToggle,
        TileAction::NetworkToggle,
        TileAction::NetworkReconnect,
        TileAction::StripMode,
        TileAction::None,
    ]
}

fn default_encoder_press() -> TileAction {
    TileAction::PlayPause
}

fn default_dial_sensitivity() -> i32 {
    2
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            info!("Wrote default config to {:?}", config_path);
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        match std::env::var_os(platform::CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => platform::config_dir().join("config.toml"),
        }
    }
}
