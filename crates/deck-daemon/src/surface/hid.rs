//! Stream Deck Plus over USB HID.
//!
//! Writes go through `spawn_blocking` because the HID calls block.  A
//! dedicated reader thread polls the device and translates its state reports
//! (whole button/encoder vectors, twist deltas, touch points) into discrete
//! `InputEvent`s.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use elgato_streamdeck::images::ImageRect;
use elgato_streamdeck::info::Kind;
use elgato_streamdeck::{list_devices, new_hidapi, StreamDeck, StreamDeckInput};
use futures_util::future::{BoxFuture, FutureExt};
use image::{DynamicImage, RgbaImage};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::{DeviceError, DeviceProfile, Surface};
use crate::core::DeckEvent;
use crate::input::InputEvent;

const READ_TIMEOUT: Duration = Duration::from_millis(50);
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

pub struct HidSurface {
    device: Arc<Mutex<StreamDeck>>,
}

fn lock(device: &Mutex<StreamDeck>) -> MutexGuard<'_, StreamDeck> {
    device.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn device_error(e: impl std::fmt::Debug) -> DeviceError {
    DeviceError::Device(format!("{:?}", e))
}

impl HidSurface {
    pub fn open(
        brightness: u8,
        profile: DeviceProfile,
        event_tx: mpsc::Sender<DeckEvent>,
    ) -> Result<Self, DeviceError> {
        let hid = new_hidapi().map_err(device_error)?;
        let devices = list_devices(&hid);
        if devices.is_empty() {
            return Err(DeviceError::NotFound);
        }

        let (kind, serial) = devices
            .iter()
            .find(|(kind, _)| *kind == Kind::Plus)
            .cloned()
            .ok_or_else(|| DeviceError::Unsupported(format!("{:?}", devices[0].0)))?;

        let device = StreamDeck::connect(&hid, kind, &serial).map_err(device_error)?;
        device.reset().map_err(device_error)?;
        device.set_brightness(brightness).map_err(device_error)?;
        info!("Connected to {:?} (serial {})", kind, serial);

        let device = Arc::new(Mutex::new(device));
        let reader = Arc::clone(&device);
        std::thread::Builder::new()
            .name("deck-input".into())
            .spawn(move || read_loop(reader, profile, event_tx))?;

        Ok(Self { device })
    }

    fn with_device<F>(&self, f: F) -> BoxFuture<'_, Result<(), DeviceError>>
    where
        F: FnOnce(&StreamDeck) -> Result<(), DeviceError> + Send + 'static,
    {
        let device = Arc::clone(&self.device);
        async move { tokio::task::spawn_blocking(move || f(&lock(&device))).await? }.boxed()
    }
}

impl Surface for HidSurface {
    fn write_tile(&self, index: u8, image: RgbaImage) -> BoxFuture<'_, Result<(), DeviceError>> {
        self.with_device(move |device| {
            device
                .set_button_image(index, DynamicImage::ImageRgba8(image))
                .map_err(device_error)?;
            device.flush().map_err(device_error)
        })
    }

    fn write_strip_region(
        &self,
        x: u32,
        y: u32,
        image: RgbaImage,
    ) -> BoxFuture<'_, Result<(), DeviceError>> {
        self.with_device(move |device| {
            let rect = ImageRect::from_image(DynamicImage::ImageRgba8(image)).map_err(device_error)?;
            device
                .write_lcd(x as u16, y as u16, &rect)
                .map_err(device_error)
        })
    }
}

/// Edge detector for the device's "full state" reports.
fn transitions(previous: &mut Vec<bool>, current: &[bool]) -> Vec<(u8, bool)> {
    previous.resize(current.len(), false);
    let changed = current
        .iter()
        .enumerate()
        .filter(|(i, now)| previous[*i] != **now)
        .map(|(i, now)| (i as u8, *now))
        .collect();
    previous.copy_from_slice(current);
    changed
}

fn translate(
    input: StreamDeckInput,
    profile: &DeviceProfile,
    buttons: &mut Vec<bool>,
    encoders: &mut Vec<bool>,
) -> Vec<InputEvent> {
    match input {
        StreamDeckInput::ButtonStateChange(states) => transitions(buttons, &states)
            .into_iter()
            .map(|(i, down)| if down { InputEvent::Down(i) } else { InputEvent::Up(i) })
            .collect(),
        StreamDeckInput::EncoderStateChange(states) => transitions(encoders, &states)
            .into_iter()
            .map(|(i, down)| {
                if down {
                    InputEvent::EncoderDown(i)
                } else {
                    InputEvent::EncoderUp(i)
                }
            })
            .collect(),
        StreamDeckInput::EncoderTwist(twists) => twists
            .iter()
            .enumerate()
            .filter(|(_, t)| **t != 0)
            .map(|(i, t)| {
                let amount = t.unsigned_abs();
                if *t < 0 {
                    InputEvent::RotateLeft { dial: i as u8, amount }
                } else {
                    InputEvent::RotateRight { dial: i as u8, amount }
                }
            })
            .collect(),
        StreamDeckInput::TouchScreenPress(x, y) => vec![InputEvent::StripShortPress {
            region: profile.strip_region_at(x),
            x,
            y,
        }],
        StreamDeckInput::TouchScreenLongPress(x, y) => vec![InputEvent::StripLongPress {
            region: profile.strip_region_at(x),
            x,
            y,
        }],
        StreamDeckInput::TouchScreenSwipe(from, to) => vec![InputEvent::StripSwipe {
            from_region: profile.strip_region_at(from.0),
            to_region: profile.strip_region_at(to.0),
            from,
            to,
        }],
        _ => Vec::new(),
    }
}

fn read_loop(device: Arc<Mutex<StreamDeck>>, profile: DeviceProfile, event_tx: mpsc::Sender<DeckEvent>) {
    let mut buttons = Vec::new();
    let mut encoders = Vec::new();

    loop {
        let input = lock(&device).read_input(Some(READ_TIMEOUT));
        let events = match input {
            Ok(input) => translate(input, &profile, &mut buttons, &mut encoders),
            Err(e) => {
                warn!("deck-input: read failed: {:?}", e);
                std::thread::sleep(ERROR_BACKOFF);
                vec![InputEvent::Error(format!("{:?}", e))]
            }
        };

        for event in events {
            if event_tx.blocking_send(DeckEvent::Input(event)).is_err() {
                error!("deck-input: core gone, stopping reader");
                return;
            }
        }
    }
}
