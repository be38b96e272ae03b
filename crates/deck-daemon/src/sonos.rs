//! Client for the player's HTTP API.
//!
//! State is read with `GET {base}/{room}/state`; commands are sent to
//! `{base}/{room}/{segments...}` and their response bodies are ignored.  The
//! core treats every command as fire-and-forget and follows it with a poll.

use deck_proto::config::{CommandMethod, PlayerConfig};
use deck_proto::player::{PlayerCommand, PlayerState};
use futures_util::future::{BoxFuture, FutureExt};
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("player request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("player answered {0}")]
    Status(StatusCode),
    #[error("invalid player base url {0:?}")]
    Url(String),
}

pub trait PlayerApi: Send + Sync {
    fn fetch_state(&self) -> BoxFuture<'_, Result<PlayerState, PlayerError>>;

    fn send<'a>(&'a self, command: &'a PlayerCommand) -> BoxFuture<'a, Result<(), PlayerError>>;
}

pub struct SonosHttpClient {
    client: Client,
    base: Url,
    room: String,
    method: CommandMethod,
}

impl SonosHttpClient {
    pub fn new(client: Client, config: &PlayerConfig) -> Result<Self, PlayerError> {
        let base = Url::parse(&config.base_url).map_err(|_| PlayerError::Url(config.base_url.clone()))?;
        if base.cannot_be_a_base() {
            return Err(PlayerError::Url(config.base_url.clone()));
        }
        Ok(Self {
            client,
            base,
            room: config.room.clone(),
            method: config.command_method,
        })
    }

    /// `{base}/{room}/{segments...}`, each segment percent-encoded.
    pub fn url_for<S: AsRef<str>>(&self, segments: &[S]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .push(&self.room)
                .extend(segments.iter().map(AsRef::as_ref));
        }
        url
    }
}

impl PlayerApi for SonosHttpClient {
    fn fetch_state(&self) -> BoxFuture<'_, Result<PlayerState, PlayerError>> {
        async move {
            let response = self.client.get(self.url_for(&["state"])).send().await?;
            if !response.status().is_success() {
                return Err(PlayerError::Status(response.status()));
            }
            Ok(response.json::<PlayerState>().await?)
        }
        .boxed()
    }

    fn send<'a>(&'a self, command: &'a PlayerCommand) -> BoxFuture<'a, Result<(), PlayerError>> {
        async move {
            let url = self.url_for(&command.path_segments());
            debug!("player: {:?} -> {}", command, url);
            let request = match self.method {
                CommandMethod::Get => self.client.get(url),
                CommandMethod::Post => self.client.post(url),
            };
            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(PlayerError::Status(response.status()));
            }
            Ok(())
        }
        .boxed()
    }
}
