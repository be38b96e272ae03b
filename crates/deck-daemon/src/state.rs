//! Display state store and the snapshot used to decide what to redraw.
//!
//! `DisplayState` is the single mutable record of what the surface should
//! show.  Only `DeckCore` touches it.  Before every render request the core
//! derives a `DisplaySnapshot` (a plain value, time-dependent flags already
//! evaluated) and diffs it against the snapshot of the last completed render.
//! Each snapshot field feeds exactly one surface region; only regions whose
//! inputs differ are redrawn.

use std::collections::BTreeSet;
use std::time::Duration;

use deck_proto::config::TileAction;
use deck_proto::player::{PlaybackState, PlayerState};
use tokio::time::Instant;

use crate::input::OptimisticChange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StripMode {
    #[default]
    NowPlaying,
    Details,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkBlockState {
    pub any_managed_device_blocked: bool,
}

#[derive(Debug, Clone)]
pub struct DisplayState {
    pub player: PlayerState,
    pub network: NetworkBlockState,
    /// Arrival of the latest volume change; drives the transient volume bar.
    pub volume_changed_at: Option<Instant>,
    pub pressed: Vec<bool>,
    pub strip_mode: StripMode,
}

impl DisplayState {
    pub fn new(tile_count: u8) -> Self {
        Self {
            player: PlayerState::default(),
            network: NetworkBlockState::default(),
            volume_changed_at: None,
            pressed: vec![false; tile_count as usize],
            strip_mode: StripMode::default(),
        }
    }

    /// Pre-apply the expected outcome of a user action.  The next poll or
    /// push event overwrites player fields regardless.
    pub fn apply_optimistic(&mut self, change: &OptimisticChange, now: Instant) {
        match change {
            OptimisticChange::Pressed(idx) => self.set_pressed(*idx, true),
            OptimisticChange::Released(idx) => self.set_pressed(*idx, false),
            OptimisticChange::TogglePlayback => {
                self.player.playback_state = self.player.playback_state.toggled();
            }
            OptimisticChange::ToggleShuffle => {
                self.player.play_mode.shuffle = !self.player.play_mode.shuffle;
            }
            OptimisticChange::VolumeDelta(delta) => {
                self.player.volume_percent =
                    self.player.volume_percent.saturating_add(*delta).clamp(0, 100);
                self.volume_changed_at = Some(now);
            }
            OptimisticChange::ToggleNetworkBlock => {
                self.network.any_managed_device_blocked = !self.network.any_managed_device_blocked;
            }
            OptimisticChange::ToggleStripMode => {
                self.strip_mode = match self.strip_mode {
                    StripMode::NowPlaying => StripMode::Details,
                    StripMode::Details => StripMode::NowPlaying,
                };
            }
        }
    }

    fn set_pressed(&mut self, idx: u8, pressed: bool) {
        if let Some(slot) = self.pressed.get_mut(idx as usize) {
            *slot = pressed;
        }
    }

    pub fn volume_overlay_visible(&self, now: Instant, window: Duration) -> bool {
        self.volume_changed_at
            .map_or(false, |at| now.saturating_duration_since(at) < window)
    }

    pub fn snapshot(
        &self,
        now: Instant,
        overlay_window: Duration,
        art_loaded: bool,
        clock: String,
    ) -> DisplaySnapshot {
        let track = &self.player.current_track;
        DisplaySnapshot {
            playback: self.player.playback_state,
            shuffle: self.player.play_mode.shuffle,
            volume: self.player.volume_percent,
            volume_overlay: self.volume_overlay_visible(now, overlay_window),
            artist: track.artist.clone(),
            title: track.title.clone(),
            duration_secs: track.duration_secs,
            elapsed_secs: self.player.elapsed_secs,
            art_locator: track.art_locator.clone(),
            art_loaded,
            network_blocked: self.network.any_managed_device_blocked,
            pressed: self.pressed.clone(),
            strip_mode: self.strip_mode,
            clock,
        }
    }
}

/// Everything a render depends on, frozen at request time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisplaySnapshot {
    pub playback: PlaybackState,
    pub shuffle: bool,
    pub volume: i32,
    pub volume_overlay: bool,
    pub artist: String,
    pub title: String,
    pub duration_secs: i64,
    pub elapsed_secs: i64,
    pub art_locator: String,
    pub art_loaded: bool,
    pub network_blocked: bool,
    pub pressed: Vec<bool>,
    pub strip_mode: StripMode,
    /// Wall clock label; only populated in details mode.
    pub clock: String,
}

/// Visual state of one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileFace {
    /// Accent style (pressed, or the flag the tile controls is on).
    pub active: bool,
    /// Alternate glyph, e.g. pause instead of play while playing.
    pub alternate: bool,
}

impl DisplaySnapshot {
    pub fn tile_face(&self, idx: u8, action: &TileAction) -> TileFace {
        let pressed = self.pressed.get(idx as usize).copied().unwrap_or(false);
        let playing = self.playback.is_playing();
        let lit = match action {
            TileAction::PlayPause => playing,
            TileAction::ShuffleToggle => self.shuffle,
            TileAction::NetworkToggle => self.network_blocked,
            TileAction::StripMode => self.strip_mode == StripMode::Details,
            _ => false,
        };
        TileFace {
            active: pressed || lit,
            alternate: matches!(action, TileAction::PlayPause) && playing,
        }
    }

    fn art_differs(&self, other: &Self) -> bool {
        self.art_locator != other.art_locator
            || self.art_loaded != other.art_loaded
            || self.strip_mode != other.strip_mode
    }

    fn text_differs(&self, other: &Self) -> bool {
        let now_playing = self.artist != other.artist
            || self.title != other.title
            || self.duration_secs != other.duration_secs
            || self.elapsed_secs != other.elapsed_secs
            || self.strip_mode != other.strip_mode;
        let details = self.strip_mode == StripMode::Details
            && (self.playback != other.playback
                || self.shuffle != other.shuffle
                || self.network_blocked != other.network_blocked
                || self.clock != other.clock);
        now_playing || details
    }

    fn volume_differs(&self, other: &Self) -> bool {
        self.volume != other.volume
            || self.volume_overlay != other.volume_overlay
            || self.strip_mode != other.strip_mode
    }

    /// Regions that must be redrawn to go from `previous` to `self`.  With no
    /// previous render everything is dirty.
    pub fn diff(&self, previous: Option<&DisplaySnapshot>, tiles: &[TileAction]) -> Regions {
        let tile_count = self.pressed.len() as u8;
        let Some(prev) = previous else {
            return Regions::all(tile_count);
        };

        let mut dirty = Regions::default();
        for idx in 0..tile_count {
            let action = tiles.get(idx as usize).unwrap_or(&TileAction::None);
            if self.tile_face(idx, action) != prev.tile_face(idx, action) {
                dirty.insert(Region::Tile(idx));
            }
        }
        if self.art_differs(prev) {
            dirty.insert(Region::StripArt);
        }
        if self.text_differs(prev) {
            dirty.insert(Region::StripText);
        }
        if self.volume_differs(prev) {
            dirty.insert(Region::StripVolume);
        }
        dirty
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Region {
    Tile(u8),
    StripArt,
    StripText,
    StripVolume,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Regions(BTreeSet<Region>);

impl Regions {
    pub fn all(tile_count: u8) -> Self {
        let mut regions: BTreeSet<Region> = (0..tile_count).map(Region::Tile).collect();
        regions.extend([Region::StripArt, Region::StripText, Region::StripVolume]);
        Self(regions)
    }

    pub fn insert(&mut self, region: Region) {
        self.0.insert(region);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Region> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Region> for Regions {
    fn from_iter<I: IntoIterator<Item = Region>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
