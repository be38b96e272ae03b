//! Frame renderer: snapshot + cached art → pixel buffers.
//!
//! Pure apart from CPU work: no I/O, no waiting.  Art that is not already in
//! the cache is simply not drawn.  Text is drawn only when a font was loaded.

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use deck_proto::config::{InputConfig, RenderConfig, TileAction};
use image::{imageops, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::state::{DisplaySnapshot, Region, Regions, StripMode, TileFace};
use crate::surface::{DeviceProfile, Frame};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const MUTED: Rgba<u8> = Rgba([150, 150, 150, 255]);
pub const TRACK_BG: Rgba<u8> = Rgba([48, 48, 48, 255]);
pub const BAR_FG: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const STRIP_BG: Rgba<u8> = BLACK;

const ELLIPSIS: char = '…';
const VOLUME_REGION_WIDTH: u32 = 180;
const TEXT_SCALE: f32 = 20.0;
const LINE_HEIGHT: i32 = 24;
const PADDING: u32 = 4;
const PROGRESS_Y: u32 = 84;
const PROGRESS_HEIGHT: u32 = 8;
pub const VOLUME_BAR_X: u32 = 10;
pub const VOLUME_BAR_Y: u32 = 60;
const VOLUME_BAR_HEIGHT: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileStyle {
    pub fg: Rgba<u8>,
    pub bg: Rgba<u8>,
}

/// Accent (inverted) when active, neutral otherwise.
pub fn tile_style(active: bool) -> TileStyle {
    if active {
        TileStyle { fg: BLACK, bg: WHITE }
    } else {
        TileStyle { fg: WHITE, bg: BLACK }
    }
}

/// Clip `s` to `max` characters, replacing the tail with an ellipsis.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let mut out: String = s.chars().take(max - 1).collect();
    out.push(ELLIPSIS);
    out
}

/// `floor(track_px * value / max)`, clamped to `[0, track_px]`.
pub fn bar_width(track_px: u32, value: i64, max: i64) -> u32 {
    if max <= 0 {
        return 0;
    }
    let width = track_px as i128 * value as i128 / max as i128;
    width.clamp(0, track_px as i128) as u32
}

/// `m:ss`; minutes are not wrapped into hours.
pub fn format_time(secs: i64) -> String {
    let secs = secs.max(0);
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn glyph(action: &TileAction, alternate: bool) -> &'static str {
    match action {
        TileAction::Previous => "\u{f04a}",
        TileAction::PlayPause if alternate => "\u{f04c}",
        TileAction::PlayPause => "\u{f04b}",
        TileAction::Next => "\u{f04e}",
        TileAction::ShuffleToggle => "\u{f074}",
        TileAction::Playlist(_) => "\u{f03a}",
        TileAction::NetworkToggle => "\u{f05e}",
        TileAction::NetworkReconnect => "\u{f021}",
        TileAction::NetworkUnblockAll => "\u{f09c}",
        TileAction::StripMode => "\u{f05a}",
        TileAction::None => "",
    }
}

pub fn load_font(path: &Path) -> anyhow::Result<FontArc> {
    let bytes = std::fs::read(path)?;
    Ok(FontArc::try_from_vec(bytes)?)
}

/// Horizontal placement of the three strip regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripLayout {
    pub art_x: u32,
    pub art_width: u32,
    pub text_x: u32,
    pub text_width: u32,
    pub volume_x: u32,
    pub volume_width: u32,
    pub height: u32,
}

impl StripLayout {
    pub fn for_profile(profile: &DeviceProfile) -> Self {
        let art_width = profile.art_size();
        let volume_width = VOLUME_REGION_WIDTH.min(profile.strip_width.saturating_sub(art_width));
        Self {
            art_x: 0,
            art_width,
            text_x: art_width,
            text_width: profile.strip_width - art_width - volume_width,
            volume_x: profile.strip_width - volume_width,
            volume_width,
            height: profile.strip_height,
        }
    }

    pub fn progress_track_width(&self) -> u32 {
        self.text_width.saturating_sub(2 * PADDING)
    }

    pub fn volume_track_width(&self) -> u32 {
        self.volume_width.saturating_sub(2 * VOLUME_BAR_X)
    }
}

pub struct Renderer {
    profile: DeviceProfile,
    layout: StripLayout,
    tiles: Vec<TileAction>,
    font: Option<FontArc>,
    max_chars: usize,
}

impl Renderer {
    pub fn new(
        profile: DeviceProfile,
        input: &InputConfig,
        render: &RenderConfig,
        font: Option<FontArc>,
    ) -> Self {
        Self {
            profile,
            layout: StripLayout::for_profile(&profile),
            tiles: input.tiles.clone(),
            font,
            max_chars: render.max_text_chars,
        }
    }

    pub fn layout(&self) -> &StripLayout {
        &self.layout
    }

    pub fn tile_actions(&self) -> &[TileAction] {
        &self.tiles
    }

    /// Produce frames for the dirty regions only, in region order.
    pub fn render(
        &self,
        snapshot: &DisplaySnapshot,
        art: Option<&RgbaImage>,
        dirty: &Regions,
    ) -> Vec<Frame> {
        dirty
            .iter()
            .filter_map(|region| match region {
                Region::Tile(index) if index < self.profile.tile_count => Some(Frame::Tile {
                    index,
                    image: self.render_tile(index, snapshot),
                }),
                Region::Tile(_) => None,
                Region::StripArt => Some(Frame::Strip {
                    x: self.layout.art_x,
                    y: 0,
                    image: self.render_art(art),
                }),
                Region::StripText => Some(Frame::Strip {
                    x: self.layout.text_x,
                    y: 0,
                    image: self.render_text(snapshot),
                }),
                Region::StripVolume => Some(Frame::Strip {
                    x: self.layout.volume_x,
                    y: 0,
                    image: self.render_volume(snapshot),
                }),
            })
            .collect()
    }

    fn render_tile(&self, index: u8, snapshot: &DisplaySnapshot) -> RgbaImage {
        let action = self.tiles.get(index as usize).unwrap_or(&TileAction::None);
        let TileFace { active, alternate } = snapshot.tile_face(index, action);
        let style = tile_style(active);
        let size = self.profile.tile_size;
        let mut image = RgbaImage::from_pixel(size, size, style.bg);

        let icon = glyph(action, alternate);
        if let (Some(font), false) = (&self.font, icon.is_empty()) {
            let scale = PxScale::from(size as f32 * 0.6);
            let (w, h) = text_size(scale, font, icon);
            let x = (size as i32 - w as i32) / 2;
            let y = (size as i32 - h as i32) / 2;
            draw_text_mut(&mut image, style.fg, x, y, scale, font, icon);
        }
        image
    }

    fn render_art(&self, art: Option<&RgbaImage>) -> RgbaImage {
        let mut image = RgbaImage::from_pixel(self.layout.art_width, self.layout.height, STRIP_BG);
        if let Some(art) = art {
            let y = (self.layout.height as i64 - art.height() as i64) / 2;
            imageops::overlay(&mut image, art, 0, y.max(0));
        }
        image
    }

    fn render_text(&self, snapshot: &DisplaySnapshot) -> RgbaImage {
        let mut image = RgbaImage::from_pixel(self.layout.text_width, self.layout.height, STRIP_BG);

        let lines = match snapshot.strip_mode {
            StripMode::NowPlaying => vec![
                snapshot.artist.clone(),
                snapshot.title.clone(),
                format!(
                    "{} / {}",
                    format_time(snapshot.elapsed_secs),
                    format_time(snapshot.duration_secs)
                ),
            ],
            StripMode::Details => vec![
                format!(
                    "{:?} · shuffle {}",
                    snapshot.playback,
                    if snapshot.shuffle { "on" } else { "off" }
                ),
                format!(
                    "network {}",
                    if snapshot.network_blocked { "blocked" } else { "open" }
                ),
                snapshot.clock.clone(),
            ],
        };
        if let Some(font) = &self.font {
            for (i, line) in lines.iter().enumerate() {
                let color = if i == 2 { MUTED } else { WHITE };
                draw_text_mut(
                    &mut image,
                    color,
                    PADDING as i32,
                    PADDING as i32 + i as i32 * LINE_HEIGHT,
                    PxScale::from(TEXT_SCALE),
                    font,
                    &truncate(line, self.max_chars),
                );
            }
        }

        let track = self.layout.progress_track_width();
        let filled = bar_width(track, snapshot.elapsed_secs, snapshot.duration_secs);
        fill(&mut image, PADDING, PROGRESS_Y, track, PROGRESS_HEIGHT, TRACK_BG);
        fill(&mut image, PADDING, PROGRESS_Y, filled, PROGRESS_HEIGHT, BAR_FG);
        image
    }

    fn render_volume(&self, snapshot: &DisplaySnapshot) -> RgbaImage {
        let mut image =
            RgbaImage::from_pixel(self.layout.volume_width, self.layout.height, STRIP_BG);
        if !snapshot.volume_overlay && snapshot.strip_mode != StripMode::Details {
            return image;
        }

        if let Some(font) = &self.font {
            draw_text_mut(
                &mut image,
                WHITE,
                VOLUME_BAR_X as i32,
                20,
                PxScale::from(TEXT_SCALE),
                font,
                &format!("VOL {}%", snapshot.volume.clamp(0, 100)),
            );
        }

        let track = self.layout.volume_track_width();
        let filled = bar_width(track, snapshot.volume as i64, 100);
        fill(&mut image, VOLUME_BAR_X, VOLUME_BAR_Y, track, VOLUME_BAR_HEIGHT, TRACK_BG);
        fill(&mut image, VOLUME_BAR_X, VOLUME_BAR_Y, filled, VOLUME_BAR_HEIGHT, BAR_FG);
        image
    }
}

fn fill(image: &mut RgbaImage, x: u32, y: u32, width: u32, height: u32, color: Rgba<u8>) {
    if width == 0 || height == 0 {
        return;
    }
    draw_filled_rect_mut(
        image,
        Rect::at(x as i32, y as i32).of_size(width, height),
        color,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::STREAM_DECK_PLUS;
    use deck_proto::player::PlaybackState;

    fn renderer() -> Renderer {
        Renderer::new(
            STREAM_DECK_PLUS,
            &InputConfig::default(),
            &RenderConfig::default(),
            None,
        )
    }

    fn snapshot() -> DisplaySnapshot {
        DisplaySnapshot {
            pressed: vec![false; 8],
            ..Default::default()
        }
    }

    fn only(region: Region) -> Regions {
        [region].into_iter().collect()
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly10!", 10), "exactly10!");
        let cut = truncate("a considerably longer title", 10);
        assert_eq!(cut.chars().count(), 10);
        assert!(cut.ends_with('…'));
        assert_eq!(cut, "a conside…");
        assert_eq!(truncate("Sigur Rós — Svefn-g-englar", 8).chars().count(), 8);
        assert_eq!(truncate("abc", 0), "");
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "0:00");
        assert_eq!(format_time(9), "0:09");
        assert_eq!(format_time(65), "1:05");
        assert_eq!(format_time(3725), "62:05");
        assert_eq!(format_time(-4), "0:00");
    }

    #[test]
    fn test_bar_width_monotonic_and_clamped() {
        let mut last = 0;
        for elapsed in 0..=400 {
            let w = bar_width(512, elapsed, 300);
            assert!(w >= last);
            assert!(w <= 512);
            last = w;
        }
        assert_eq!(bar_width(512, 300, 300), 512);
        assert_eq!(bar_width(512, 400, 300), 512);
        assert_eq!(bar_width(512, 150, 300), 256);
        assert_eq!(bar_width(160, 33, 100), 52);
        assert_eq!(bar_width(512, 10, 0), 0);
        assert_eq!(bar_width(512, -5, 300), 0);
    }

    #[test]
    fn test_tile_style_is_function_of_flag() {
        assert_eq!(tile_style(true), tile_style(true));
        assert_ne!(tile_style(true), tile_style(false));
        assert_eq!(tile_style(false).bg, BLACK);
    }

    #[test]
    fn test_playing_lights_play_tile() {
        let r = renderer();
        let mut s = snapshot();
        s.playback = PlaybackState::Playing;
        let frames = r.render(&s, None, &only(Region::Tile(1)));
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            Frame::Tile { index, image } => {
                assert_eq!(*index, 1);
                assert_eq!(image.dimensions(), (120, 120));
                assert_eq!(*image.get_pixel(0, 0), tile_style(true).bg);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_full_render_covers_every_region() {
        let r = renderer();
        let frames = r.render(&snapshot(), None, &Regions::all(8));
        assert_eq!(frames.len(), 11);
        let strip_width: u32 = frames
            .iter()
            .filter_map(|f| match f {
                Frame::Strip { image, .. } => Some(image.width()),
                _ => None,
            })
            .sum();
        assert_eq!(strip_width, 800);
    }

    #[test]
    fn test_art_drawn_only_when_cached() {
        let r = renderer();
        let art = RgbaImage::from_pixel(100, 100, Rgba([200, 10, 10, 255]));
        let with = r.render(&snapshot(), Some(&art), &only(Region::StripArt));
        let without = r.render(&snapshot(), None, &only(Region::StripArt));
        match (&with[0], &without[0]) {
            (Frame::Strip { image: a, .. }, Frame::Strip { image: b, .. }) => {
                assert_eq!(*a.get_pixel(50, 50), Rgba([200, 10, 10, 255]));
                assert_eq!(*b.get_pixel(50, 50), STRIP_BG);
            }
            _ => panic!("expected strip frames"),
        }
    }

    #[test]
    fn test_progress_clamps_when_elapsed_exceeds_duration() {
        let r = renderer();
        let mut s = snapshot();
        s.elapsed_secs = 500;
        s.duration_secs = 200;
        let frames = r.render(&s, None, &only(Region::StripText));
        let Frame::Strip { x, image, .. } = &frames[0] else {
            panic!("expected strip frame");
        };
        assert_eq!(*x, 100);
        let track = r.layout().progress_track_width();
        assert_eq!(*image.get_pixel(PADDING + track - 1, PROGRESS_Y), BAR_FG);
        assert_eq!(*image.get_pixel(PADDING + track, PROGRESS_Y), STRIP_BG);
    }

    #[test]
    fn test_volume_region_blank_without_overlay() {
        let r = renderer();
        let mut s = snapshot();
        s.volume = 80;
        let hidden = r.render(&s, None, &only(Region::StripVolume));
        s.volume_overlay = true;
        let shown = r.render(&s, None, &only(Region::StripVolume));
        let sample = (VOLUME_BAR_X + 20, VOLUME_BAR_Y + 1);
        match (&hidden[0], &shown[0]) {
            (Frame::Strip { image: h, x, .. }, Frame::Strip { image: v, .. }) => {
                assert_eq!(*x, 620);
                assert_eq!(*h.get_pixel(sample.0, sample.1), STRIP_BG);
                assert_eq!(*v.get_pixel(sample.0, sample.1), BAR_FG);
            }
            _ => panic!("expected strip frames"),
        }
    }
}
