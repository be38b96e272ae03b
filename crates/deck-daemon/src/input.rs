//! Hardware input mapping.
//!
//! `Dispatcher::dispatch` is a pure translation from a surface event to the
//! actions the core should take: optimistic local changes (applied first, for
//! instant feedback), fire-and-forget player commands, and network actions.

use deck_proto::config::{InputConfig, TileAction};
use deck_proto::player::PlayerCommand;
use tracing::{debug, warn};

/// Raw input reported by the control surface.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Down(u8),
    Up(u8),
    EncoderDown(u8),
    EncoderUp(u8),
    RotateLeft { dial: u8, amount: u8 },
    RotateRight { dial: u8, amount: u8 },
    StripShortPress { region: u8, x: u16, y: u16 },
    StripLongPress { region: u8, x: u16, y: u16 },
    StripSwipe {
        from_region: u8,
        to_region: u8,
        from: (u16, u16),
        to: (u16, u16),
    },
    Error(String),
}

/// Expected state change applied before the remote side confirms it.
#[derive(Debug, Clone, PartialEq)]
pub enum OptimisticChange {
    Pressed(u8),
    Released(u8),
    TogglePlayback,
    ToggleShuffle,
    VolumeDelta(i32),
    ToggleNetworkBlock,
    ToggleStripMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkAction {
    Toggle,
    Reconnect,
    UnblockAll,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Optimistic(OptimisticChange),
    Remote(PlayerCommand),
    Network(NetworkAction),
}

pub struct Dispatcher {
    input: InputConfig,
    tile_count: u8,
}

impl Dispatcher {
    pub fn new(input: InputConfig, tile_count: u8) -> Self {
        Self { input, tile_count }
    }

    pub fn dispatch(&self, event: &InputEvent) -> Vec<Action> {
        match event {
            InputEvent::Down(idx) if *idx < self.tile_count => {
                let mut actions = vec![Action::Optimistic(OptimisticChange::Pressed(*idx))];
                actions.extend(actions_for(self.input.tile_action(*idx)));
                actions
            }
            InputEvent::Up(idx) if *idx < self.tile_count => {
                vec![Action::Optimistic(OptimisticChange::Released(*idx))]
            }
            InputEvent::Down(idx) | InputEvent::Up(idx) => {
                debug!("input: tile {} outside the surface, ignoring", idx);
                Vec::new()
            }
            InputEvent::EncoderDown(_) => actions_for(&self.input.encoder_press),
            InputEvent::EncoderUp(_) => Vec::new(),
            InputEvent::RotateLeft { amount, .. } => self.volume(-i32::from(*amount)),
            InputEvent::RotateRight { amount, .. } => self.volume(i32::from(*amount)),
            InputEvent::StripShortPress { .. } => actions_for(&TileAction::PlayPause),
            InputEvent::StripLongPress { .. } => actions_for(&TileAction::StripMode),
            InputEvent::StripSwipe { from, to, .. } => {
                // Swiping leftwards advances, like paging forward.
                match to.0.cmp(&from.0) {
                    std::cmp::Ordering::Less => actions_for(&TileAction::Next),
                    std::cmp::Ordering::Greater => actions_for(&TileAction::Previous),
                    std::cmp::Ordering::Equal => Vec::new(),
                }
            }
            InputEvent::Error(cause) => {
                warn!("input: surface error: {}", cause);
                Vec::new()
            }
        }
    }

    fn volume(&self, detents: i32) -> Vec<Action> {
        let delta = detents.saturating_mul(self.input.dial_sensitivity);
        if delta == 0 {
            return Vec::new();
        }
        vec![
            Action::Optimistic(OptimisticChange::VolumeDelta(delta)),
            Action::Remote(PlayerCommand::Volume(delta)),
        ]
    }
}

fn actions_for(action: &TileAction) -> Vec<Action> {
    match action {
        TileAction::Previous => vec![Action::Remote(PlayerCommand::Previous)],
        TileAction::PlayPause => vec![
            Action::Optimistic(OptimisticChange::TogglePlayback),
            Action::Remote(PlayerCommand::PlayPause),
        ],
        TileAction::Next => vec![Action::Remote(PlayerCommand::Next)],
        TileAction::ShuffleToggle => vec![
            Action::Optimistic(OptimisticChange::ToggleShuffle),
            Action::Remote(PlayerCommand::ShuffleToggle),
        ],
        TileAction::Playlist(name) => vec![Action::Remote(PlayerCommand::Playlist(name.clone()))],
        TileAction::NetworkToggle => vec![
            Action::Optimistic(OptimisticChange::ToggleNetworkBlock),
            Action::Network(NetworkAction::Toggle),
        ],
        TileAction::NetworkReconnect => vec![Action::Network(NetworkAction::Reconnect)],
        TileAction::NetworkUnblockAll => vec![Action::Network(NetworkAction::UnblockAll)],
        TileAction::StripMode => vec![Action::Optimistic(OptimisticChange::ToggleStripMode)],
        TileAction::None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(InputConfig::default(), 8)
    }

    #[test]
    fn test_press_gives_feedback_before_command() {
        let actions = dispatcher().dispatch(&InputEvent::Down(1));
        assert_eq!(
            actions,
            vec![
                Action::Optimistic(OptimisticChange::Pressed(1)),
                Action::Optimistic(OptimisticChange::TogglePlayback),
                Action::Remote(PlayerCommand::PlayPause),
            ]
        );
    }

    #[test]
    fn test_release_only_redraws() {
        assert_eq!(
            dispatcher().dispatch(&InputEvent::Up(0)),
            vec![Action::Optimistic(OptimisticChange::Released(0))]
        );
    }

    #[test]
    fn test_unmapped_tile_still_shows_press() {
        assert_eq!(
            dispatcher().dispatch(&InputEvent::Down(7)),
            vec![Action::Optimistic(OptimisticChange::Pressed(7))]
        );
        assert!(dispatcher().dispatch(&InputEvent::Down(8)).is_empty());
    }

    #[test]
    fn test_dial_scales_by_sensitivity() {
        let d = dispatcher();
        assert_eq!(
            d.dispatch(&InputEvent::RotateLeft { dial: 0, amount: 3 }),
            vec![
                Action::Optimistic(OptimisticChange::VolumeDelta(-6)),
                Action::Remote(PlayerCommand::Volume(-6)),
            ]
        );
        assert_eq!(
            d.dispatch(&InputEvent::RotateRight { dial: 2, amount: 1 }),
            vec![
                Action::Optimistic(OptimisticChange::VolumeDelta(2)),
                Action::Remote(PlayerCommand::Volume(2)),
            ]
        );
        assert!(d
            .dispatch(&InputEvent::RotateRight { dial: 0, amount: 0 })
            .is_empty());
    }

    #[test]
    fn test_huge_sensitivity_saturates() {
        let d = Dispatcher::new(
            InputConfig {
                dial_sensitivity: i32::MAX,
                ..InputConfig::default()
            },
            8,
        );
        assert_eq!(
            d.dispatch(&InputEvent::RotateRight { dial: 0, amount: 200 }),
            vec![
                Action::Optimistic(OptimisticChange::VolumeDelta(i32::MAX)),
                Action::Remote(PlayerCommand::Volume(i32::MAX)),
            ]
        );
        assert_eq!(
            d.dispatch(&InputEvent::RotateLeft { dial: 0, amount: 200 }),
            vec![
                Action::Optimistic(OptimisticChange::VolumeDelta(i32::MIN)),
                Action::Remote(PlayerCommand::Volume(i32::MIN)),
            ]
        );
    }

    #[test]
    fn test_network_tiles() {
        let d = dispatcher();
        assert_eq!(
            d.dispatch(&InputEvent::Down(4))[1..],
            [
                Action::Optimistic(OptimisticChange::ToggleNetworkBlock),
                Action::Network(NetworkAction::Toggle),
            ]
        );
        assert_eq!(
            d.dispatch(&InputEvent::Down(5))[1..],
            [Action::Network(NetworkAction::Reconnect)]
        );
    }

    #[test]
    fn test_strip_gestures() {
        let d = dispatcher();
        let swipe = |from: u16, to: u16| InputEvent::StripSwipe {
            from_region: 0,
            to_region: 0,
            from: (from, 50),
            to: (to, 50),
        };
        assert_eq!(
            d.dispatch(&swipe(600, 100)),
            vec![Action::Remote(PlayerCommand::Next)]
        );
        assert_eq!(
            d.dispatch(&swipe(100, 600)),
            vec![Action::Remote(PlayerCommand::Previous)]
        );
        assert_eq!(
            d.dispatch(&InputEvent::StripLongPress { region: 1, x: 300, y: 40 }),
            vec![Action::Optimistic(OptimisticChange::ToggleStripMode)]
        );
        assert_eq!(
            d.dispatch(&InputEvent::StripShortPress { region: 1, x: 300, y: 40 }).last(),
            Some(&Action::Remote(PlayerCommand::PlayPause))
        );
    }

    #[test]
    fn test_encoder_press_uses_configured_action() {
        let mut input = InputConfig::default();
        input.encoder_press = TileAction::Playlist("Jazz".into());
        let d = Dispatcher::new(input, 8);
        assert_eq!(
            d.dispatch(&InputEvent::EncoderDown(0)),
            vec![Action::Remote(PlayerCommand::Playlist("Jazz".into()))]
        );
        assert!(d.dispatch(&InputEvent::EncoderUp(0)).is_empty());
        assert!(d.dispatch(&InputEvent::Error("usb".into())).is_empty());
    }
}
