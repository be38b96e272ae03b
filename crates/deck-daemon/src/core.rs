/// DeckCore: single-owner reconciliation loop for the control surface.
///
/// Three sources feed the loop as `DeckEvent`s: the poll ticker, the push
/// webhook and hardware input.  DeckCore owns the `DisplayState` exclusively;
/// every other task (polls, remote commands, network actions, art fetches,
/// device writes) runs elsewhere and reports back through the same channel.
///
/// Rendering is diff-driven.  The render task owns the snapshot of the last
/// completed write and diffs each request against it right before writing,
/// so a request the coalescer drops never loses a region and a request that
/// waited behind a slow write only redraws what is still out of date.
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use deck_proto::config::Config;
use deck_proto::player::{PlayerCommand, PlayerState, PushEvent};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::art_cache::{Art, ArtCache};
use crate::debounce::Debouncer;
use crate::input::{Action, Dispatcher, InputEvent, NetworkAction, OptimisticChange};
use crate::render::Renderer;
use crate::sonos::PlayerApi;
use crate::state::{DisplaySnapshot, DisplayState, StripMode};
use crate::surface::{write_frames, DeviceProfile, Surface};
use crate::unifi::NetworkController;

// ── DeckEvent ─────────────────────────────────────────────────────────────────

/// All inputs into the DeckCore loop.
#[derive(Debug)]
pub enum DeckEvent {
    /// Full player state from a completed poll.
    PollResult(PlayerState),
    /// Event from the push webhook, not yet filtered by room.
    Push(PushEvent),
    /// Hardware input from the surface backend.
    Input(InputEvent),
    /// Result of a network block-state refresh.
    NetworkState(bool),
    /// Art for this locator is now in the cache.
    ArtReady(String),
    /// A volume overlay window may have elapsed.
    OverlayExpired,
    /// A render pass finished.  `ok` is false when the surface rejected a
    /// write; the baseline then stays at the last good render.
    Rendered { ok: bool },
    Shutdown,
}

// ── DeckContext ───────────────────────────────────────────────────────────────

/// Everything the core needs from the outside world, built once in `main`.
pub struct DeckContext {
    pub config: Config,
    pub profile: DeviceProfile,
    pub player: Arc<dyn PlayerApi>,
    pub network: Arc<dyn NetworkController>,
    pub surface: Arc<dyn Surface>,
    pub art: Arc<ArtCache>,
    pub renderer: Arc<Renderer>,
}

struct RenderRequest {
    snapshot: DisplaySnapshot,
    art: Option<Art>,
}

// ── DeckCore ──────────────────────────────────────────────────────────────────

pub struct DeckCore {
    ctx: DeckContext,
    state: DisplayState,
    dispatcher: Dispatcher,
    /// Snapshot of the newest render request; cleared when a write fails.
    last_requested: Option<DisplaySnapshot>,
    render: Debouncer<RenderRequest>,
    poll: Debouncer<()>,
    event_tx: mpsc::Sender<DeckEvent>,
    overlay_window: Duration,
}

impl DeckCore {
    pub fn new(ctx: DeckContext, event_tx: mpsc::Sender<DeckEvent>) -> Self {
        let render = {
            let renderer = Arc::clone(&ctx.renderer);
            let surface = Arc::clone(&ctx.surface);
            let tx = event_tx.clone();
            // Passes never overlap, so the lock is never contended.
            let shown: Arc<Mutex<Option<DisplaySnapshot>>> = Arc::new(Mutex::new(None));
            Debouncer::new(
                "render",
                Duration::from_millis(ctx.config.render.debounce_ms),
                move |request: RenderRequest| {
                    let renderer = Arc::clone(&renderer);
                    let surface = Arc::clone(&surface);
                    let shown = Arc::clone(&shown);
                    let tx = tx.clone();
                    async move {
                        let ok = render_pass(&renderer, surface.as_ref(), &shown, request).await;
                        let _ = tx.send(DeckEvent::Rendered { ok }).await;
                    }
                },
            )
        };

        let poll = {
            let player = Arc::clone(&ctx.player);
            let tx = event_tx.clone();
            Debouncer::new(
                "poll",
                Duration::from_millis(ctx.config.player.poll_debounce_ms),
                move |()| {
                    let player = Arc::clone(&player);
                    let tx = tx.clone();
                    async move {
                        match player.fetch_state().await {
                            Ok(state) => {
                                let _ = tx.send(DeckEvent::PollResult(state)).await;
                            }
                            Err(e) => warn!("poll: {}", e),
                        }
                    }
                },
            )
        };

        Self {
            state: DisplayState::new(ctx.profile.tile_count),
            dispatcher: Dispatcher::new(ctx.config.input.clone(), ctx.profile.tile_count),
            overlay_window: Duration::from_millis(ctx.config.render.volume_overlay_ms),
            last_requested: None,
            render,
            poll,
            event_tx,
            ctx,
        }
    }

    /// Run the core event loop.  Returns when a `Shutdown` event is received
    /// or every sender is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<DeckEvent>) -> anyhow::Result<()> {
        info!("DeckCore: starting event loop for room {:?}", self.ctx.config.player.room);

        // First pass has no baseline, so every tile and the full strip draw.
        self.request_render(true);
        self.poll.trigger(());
        if self.ctx.config.network.enabled {
            self.refresh_network();
        }

        let ticker = (self.ctx.config.player.poll_interval_ms > 0).then(|| {
            let poll = self.poll.clone();
            let period = Duration::from_millis(self.ctx.config.player.poll_interval_ms);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    poll.trigger(());
                }
            })
        });

        loop {
            match event_rx.recv().await {
                None => {
                    info!("DeckCore: event channel closed, shutting down");
                    break;
                }
                Some(DeckEvent::Shutdown) => {
                    info!("DeckCore: shutdown requested");
                    break;
                }
                Some(DeckEvent::PollResult(state)) => self.apply_poll(state),
                Some(DeckEvent::Push(event)) => self.apply_push_event(event),
                Some(DeckEvent::Input(event)) => self.apply_input(event),
                Some(DeckEvent::NetworkState(blocked)) => {
                    debug!("DeckCore: managed devices blocked = {}", blocked);
                    self.state.network.any_managed_device_blocked = blocked;
                    self.request_render(false);
                }
                Some(DeckEvent::ArtReady(locator)) => {
                    if locator == self.state.player.current_track.art_locator {
                        self.request_render(false);
                    }
                }
                Some(DeckEvent::OverlayExpired) => self.request_render(false),
                Some(DeckEvent::Rendered { ok }) => {
                    if !ok {
                        // Let the next change re-request what never landed.
                        self.last_requested = None;
                    }
                }
            }
        }

        if let Some(ticker) = ticker {
            ticker.abort();
        }
        Ok(())
    }

    // ── Sources ───────────────────────────────────────────────────────────────

    fn apply_poll(&mut self, state: PlayerState) {
        trace!("DeckCore: poll {:?}", state.playback_state);
        self.state.player = state;
        self.ensure_art();
        self.request_render(true);
    }

    fn apply_push_event(&mut self, event: PushEvent) {
        if event.room_name() != self.ctx.config.player.room {
            debug!("DeckCore: ignoring push event for room {:?}", event.room_name());
            return;
        }

        match event {
            PushEvent::VolumeChange { new_volume, .. } => {
                self.state.player.volume_percent = new_volume;
                self.state.volume_changed_at = Some(Instant::now());
                self.schedule_overlay_expiry();
            }
            PushEvent::TransportState { state, .. } => {
                self.state.player = state;
                self.ensure_art();
            }
        }
        self.request_render(false);
    }

    fn apply_input(&mut self, event: InputEvent) {
        for action in self.dispatcher.dispatch(&event) {
            match action {
                Action::Optimistic(change) => self.apply_optimistic(change),
                Action::Remote(command) => self.spawn_command(command),
                Action::Network(action) => self.spawn_network(action),
            }
        }
        self.request_render(false);
    }

    fn apply_optimistic(&mut self, change: OptimisticChange) {
        if change == OptimisticChange::ToggleNetworkBlock && !self.ctx.config.network.enabled {
            debug!("DeckCore: network control disabled, not toggling");
            return;
        }
        self.state.apply_optimistic(&change, Instant::now());
        if matches!(change, OptimisticChange::VolumeDelta(_)) {
            self.schedule_overlay_expiry();
        }
    }

    // ── Side tasks ────────────────────────────────────────────────────────────

    /// Fire-and-forget; the follow-up poll corrects any wrong guess.
    fn spawn_command(&self, command: PlayerCommand) {
        let player = Arc::clone(&self.ctx.player);
        let poll = self.poll.clone();
        tokio::spawn(async move {
            if let Err(e) = player.send(&command).await {
                warn!("command {:?} failed: {}", command, e);
            }
            poll.trigger(());
        });
    }

    fn spawn_network(&self, action: NetworkAction) {
        if !self.ctx.config.network.enabled {
            debug!("DeckCore: network control disabled, dropping {:?}", action);
            return;
        }
        let network = Arc::clone(&self.ctx.network);
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = match action {
                NetworkAction::Toggle => network.toggle_managed_devices().await,
                NetworkAction::Reconnect => network.reconnect_all_devices().await,
                NetworkAction::UnblockAll => network.unblock_all_devices().await,
            };
            if let Err(e) = result {
                warn!("network {:?} failed: {}", action, e);
            }
            refresh(network.as_ref(), &tx).await;
        });
    }

    fn refresh_network(&self) {
        let network = Arc::clone(&self.ctx.network);
        let tx = self.event_tx.clone();
        tokio::spawn(async move { refresh(network.as_ref(), &tx).await });
    }

    fn ensure_art(&self) {
        let locator = self.state.player.current_track.art_locator.clone();
        if locator.is_empty() || self.ctx.art.get(&locator).is_some() {
            return;
        }
        let art = Arc::clone(&self.ctx.art);
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            if art.fetch(&locator).await.is_some() {
                let _ = tx.send(DeckEvent::ArtReady(locator)).await;
            }
        });
    }

    fn schedule_overlay_expiry(&self) {
        let tx = self.event_tx.clone();
        let window = self.overlay_window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = tx.send(DeckEvent::OverlayExpired).await;
        });
    }

    // ── Rendering ─────────────────────────────────────────────────────────────

    fn snapshot(&self) -> (DisplaySnapshot, Option<Art>) {
        let art = self.ctx.art.get(&self.state.player.current_track.art_locator);
        let clock = match self.state.strip_mode {
            StripMode::Details => chrono::Local::now().format("%H:%M").to_string(),
            StripMode::NowPlaying => String::new(),
        };
        let snapshot = self
            .state
            .snapshot(Instant::now(), self.overlay_window, art.is_some(), clock);
        (snapshot, art)
    }

    /// Queue a render of the current state.  Without `always` a request
    /// identical to the previous one is skipped.
    fn request_render(&mut self, always: bool) {
        let (snapshot, art) = self.snapshot();
        if !always && self.last_requested.as_ref() == Some(&snapshot) {
            return;
        }
        trace!("DeckCore: render request");
        self.last_requested = Some(snapshot.clone());
        self.render.trigger(RenderRequest { snapshot, art });
    }
}

async fn refresh(network: &dyn NetworkController, tx: &mpsc::Sender<DeckEvent>) {
    match network.is_any_managed_device_blocked().await {
        Ok(blocked) => {
            let _ = tx.send(DeckEvent::NetworkState(blocked)).await;
        }
        Err(e) => warn!("network refresh failed: {}", e),
    }
}

fn lock_shown(shown: &Mutex<Option<DisplaySnapshot>>) -> MutexGuard<'_, Option<DisplaySnapshot>> {
    shown.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Diff against what the surface shows, write the difference and move the
/// baseline forward.  Returns false if the surface rejected a write.
async fn render_pass(
    renderer: &Renderer,
    surface: &dyn Surface,
    shown: &Mutex<Option<DisplaySnapshot>>,
    request: RenderRequest,
) -> bool {
    let RenderRequest { snapshot, art } = request;
    let dirty = snapshot.diff(lock_shown(shown).as_ref(), renderer.tile_actions());
    if dirty.is_empty() {
        return true;
    }

    let frames = renderer.render(&snapshot, art.as_deref(), &dirty);
    debug!("render: writing {} frames", frames.len());
    if let Err(e) = write_frames(surface, frames).await {
        warn!("render: surface write failed: {}", e);
        return false;
    }
    *lock_shown(shown) = Some(snapshot);
    true
}
