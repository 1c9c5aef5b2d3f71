//! HUB75 RGB matrix driver (rpi-rgb-led-matrix bindings).
//!
//! The C library handle is not thread-safe, so the matrix lives on its own
//! thread and frames are passed to it over a channel. Geometry, timing and
//! GPIO mapping are fixed once the matrix is created; brightness can be
//! lowered at runtime and is applied when painting.

use super::{DriverError, PanelDriver, PanelSettings};
use crate::image_proc::NormalizedFrame;
use rpi_led_matrix::{LedColor, LedMatrix, LedMatrixOptions, LedRuntimeOptions};
use std::sync::mpsc;
use std::thread;

enum Command {
    Show(NormalizedFrame, mpsc::SyncSender<Result<(), DriverError>>),
    Brightness(u8),
}

/// Physical LED matrix
pub struct MatrixPanel {
    commands: mpsc::Sender<Command>,
    started_with: PanelSettings,
}

impl MatrixPanel {
    /// Create the matrix on a dedicated thread and wait for it to come up
    pub fn start(settings: &PanelSettings) -> Result<Self, DriverError> {
        let (commands, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let thread_settings = settings.clone();

        thread::Builder::new()
            .name("led-matrix".to_string())
            .spawn(move || run(thread_settings, command_rx, ready_tx))?;

        ready_rx.recv().map_err(|_| DriverError::Disconnected)??;

        let (width, height) = settings.dimensions();
        tracing::info!(
            "LED matrix ready: {}x{} ({}), brightness {}",
            width,
            height,
            settings.hardware_mapping,
            settings.brightness
        );

        Ok(Self {
            commands,
            started_with: settings.clone(),
        })
    }
}

impl PanelDriver for MatrixPanel {
    fn dimensions(&self) -> (u32, u32) {
        self.started_with.dimensions()
    }

    fn configure(&mut self, settings: &PanelSettings) -> Result<(), DriverError> {
        let live = PanelSettings {
            brightness: self.started_with.brightness,
            ..settings.clone()
        };
        if live != self.started_with {
            tracing::warn!("Changed panel timing/geometry takes effect after a restart");
        }

        if settings.brightness > self.started_with.brightness {
            tracing::warn!(
                "Brightness {} exceeds the startup value {}, capping",
                settings.brightness,
                self.started_with.brightness
            );
        }

        self.commands
            .send(Command::Brightness(settings.brightness))
            .map_err(|_| DriverError::Disconnected)
    }

    fn submit_frame(&mut self, frame: NormalizedFrame) -> Result<(), DriverError> {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.commands
            .send(Command::Show(frame, reply_tx))
            .map_err(|_| DriverError::Disconnected)?;
        reply_rx.recv().map_err(|_| DriverError::Disconnected)?
    }
}

fn build_options(settings: &PanelSettings) -> Result<(LedMatrixOptions, LedRuntimeOptions), DriverError> {
    let mut options = LedMatrixOptions::new();
    options.set_hardware_mapping(&settings.hardware_mapping);
    options.set_rows(settings.rows);
    options.set_cols(settings.cols);
    options.set_chain_length(settings.chain_length);
    options.set_parallel(settings.parallel);
    options
        .set_pwm_bits(settings.pwm_bits)
        .map_err(|e| DriverError::Init(e.to_string()))?;
    options.set_pwm_lsb_nanoseconds(settings.pwm_lsb_nanoseconds);
    options.set_pwm_dither_bits(settings.pwm_dither_bits);
    options
        .set_brightness(settings.brightness)
        .map_err(|e| DriverError::Init(e.to_string()))?;
    options.set_scan_mode(settings.scan_mode);
    options.set_multiplexing(settings.multiplexing);
    options.set_row_addr_type(settings.row_address_type);
    options.set_limit_refresh(settings.limit_refresh_rate_hz);
    options.set_hardware_pulsing(!settings.disable_hardware_pulsing);
    options.set_refresh_rate(settings.show_refresh_rate);
    options.set_inverse_colors(settings.inverse_colors);
    options.set_led_rgb_sequence(&settings.led_rgb_sequence);
    if !settings.pixel_mapper_config.is_empty() {
        options.set_pixel_mapper_config(&settings.pixel_mapper_config);
    }
    if !settings.panel_type.is_empty() {
        options.set_panel_type(&settings.panel_type);
    }

    let mut runtime = LedRuntimeOptions::new();
    runtime.set_gpio_slowdown(settings.gpio_slowdown);
    runtime.set_daemon(settings.daemon);
    runtime.set_drop_privileges(settings.drop_privileges);

    Ok((options, runtime))
}

/// Matrix thread body
fn run(
    settings: PanelSettings,
    commands: mpsc::Receiver<Command>,
    ready: mpsc::SyncSender<Result<(), DriverError>>,
) {
    let matrix = match build_options(&settings).and_then(|(options, runtime)| {
        LedMatrix::new(Some(options), Some(runtime)).map_err(|e| DriverError::Init(e.to_string()))
    }) {
        Ok(matrix) => matrix,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let startup_brightness = settings.brightness as u16;
    let mut brightness = startup_brightness;
    let mut canvas = matrix.offscreen_canvas();

    for command in commands {
        match command {
            Command::Brightness(value) => {
                brightness = (value as u16).min(startup_brightness);
            }
            Command::Show(frame, reply) => {
                let scale = |c: u8| (c as u16 * brightness / startup_brightness) as u8;
                for (x, y, [r, g, b]) in frame.pixels() {
                    let color = LedColor {
                        red: scale(r),
                        green: scale(g),
                        blue: scale(b),
                    };
                    canvas.set(x as i32, y as i32, &color);
                }
                canvas = matrix.swap(canvas);
                let _ = reply.send(Ok(()));
            }
        }
    }

    tracing::debug!("LED matrix thread exiting");
}
