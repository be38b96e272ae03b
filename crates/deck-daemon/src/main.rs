mod art_cache;
mod core;
mod debounce;
mod input;
mod push;
mod render;
mod sonos;
mod state;
mod surface;
mod unifi;

use std::sync::Arc;
use std::time::Duration;

use deck_proto::config::Config;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::art_cache::{ArtCache, HttpArtSource};
use crate::core::{DeckContext, DeckCore, DeckEvent};
use crate::render::Renderer;
use crate::sonos::SonosHttpClient;
use crate::surface::DeviceProfile;
use crate::unifi::{DisabledNetwork, NetworkController, UnifiController};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // File logging + stderr
    let data_dir = deck_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("deckd.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,deck_daemon=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    // Event channel: all external inputs funnel into DeckCore
    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<DeckEvent>(256);

    // Unsupported model or missing device is fatal
    let profile = DeviceProfile::for_model(&config.device.model)?;
    let surface = surface::open(&config.device, &profile, event_tx.clone())?;
    info!(
        "Surface ready: {} ({} tiles, {}x{} strip)",
        profile.model, profile.tile_count, profile.strip_width, profile.strip_height
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    let player = Arc::new(SonosHttpClient::new(http.clone(), &config.player)?);

    let network: Arc<dyn NetworkController> = if config.network.enabled {
        Arc::new(UnifiController::new(&config.network)?)
    } else {
        Arc::new(DisabledNetwork)
    };

    let art = Arc::new(ArtCache::new(
        config.render.art_cache_capacity,
        profile.art_size(),
        Arc::new(HttpArtSource::new(http)),
    ));

    let font = match &config.render.font_path {
        Some(path) => match render::load_font(path) {
            Ok(font) => Some(font),
            Err(e) => {
                warn!("Could not load font {:?}: {}; drawing without text", path, e);
                None
            }
        },
        None => {
            warn!("No font configured; tiles and strip are drawn without text");
            None
        }
    };
    let renderer = Arc::new(Renderer::new(profile, &config.input, &config.render, font));

    if config.push.enabled {
        let _push_handle = push::start_server(
            config.push.bind_address.clone(),
            config.push.port,
            event_tx.clone(),
        );
    }

    let shutdown_tx = event_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(DeckEvent::Shutdown).await;
        }
    });

    let ctx = DeckContext {
        config,
        profile,
        player,
        network,
        surface,
        art,
        renderer,
    };

    info!("deckd initialised, running event loop");
    DeckCore::new(ctx, event_tx).run(event_rx).await?;

    Ok(())
}
