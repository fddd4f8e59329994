/*
 *  panel/driver.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  FPC-A005 panel driver - init sequence, refresh protocol, sleep/wake
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::panel::bus::PanelBus;
use crate::panel::color::Color;
use crate::panel::commands;
use crate::panel::error::PanelError;
use crate::panel::framebuffer::FrameBuffer;
use crate::panel::{PANEL_HEIGHT, PANEL_WIDTH};

/// How long to wait for BUSY to release after a reset or power-on.
const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Display refresh can take the better part of half a minute on this panel.
const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between BUSY polls.
const BUSY_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Refresh modes supported by the panel.
///
/// Partial and Fast share the full-frame data path on this controller; the
/// distinction matters to the display service's refresh accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    Full,
    Partial,
    Fast,
}

/// Refresh statistics kept by the driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct RefreshCounters {
    pub total_refreshes: u32,
    pub last_refresh_time: Option<Instant>,
}

/// The FPC-A005 driver. Owns the bus and the framebuffer.
///
/// Not internally synchronized; callers hold the display-service mutex.
pub struct PanelDriver {
    bus: Box<dyn PanelBus>,
    framebuffer: FrameBuffer,
    is_sleeping: bool,
    counters: RefreshCounters,
}

impl PanelDriver {
    /// Initialize the panel: hardware reset, documented init sequence,
    /// framebuffer cleared to white.
    pub async fn init(bus: Box<dyn PanelBus>) -> Result<Self, PanelError> {
        info!("Initializing FPC-A005 panel ({}x{})", PANEL_WIDTH, PANEL_HEIGHT);

        let mut driver = Self {
            bus,
            framebuffer: FrameBuffer::new(),
            is_sleeping: false,
            counters: RefreshCounters::default(),
        };

        driver.reset().await?;
        driver.send_init_sequence().await?;
        driver.framebuffer.clear(Color::White);

        info!("Panel initialized");
        Ok(driver)
    }

    /// Reset the controller and wait for it to come ready.
    async fn reset(&mut self) -> Result<(), PanelError> {
        debug!("Resetting panel");
        self.bus.hardware_reset()?;
        self.wait_ready(READY_TIMEOUT)
            .await
            .map_err(|_| PanelError::ResetTimeout)
    }

    async fn send_init_sequence(&mut self) -> Result<(), PanelError> {
        self.bus.write_command(commands::POWER_SETTING)?;
        self.bus.write_data(&[0x07, 0x07, 0x3F, 0x3F])?;

        self.bus.write_command(commands::POWER_ON)?;
        self.wait_ready(READY_TIMEOUT).await?;

        self.bus.write_command(commands::PANEL_SETTING)?;
        self.bus.write_data(&[0x1F])?;

        self.bus.write_command(commands::TCON_RESOLUTION)?;
        self.bus.write_data(&[
            (PANEL_WIDTH >> 8) as u8,
            (PANEL_WIDTH & 0xFF) as u8,
            (PANEL_HEIGHT >> 8) as u8,
            (PANEL_HEIGHT & 0xFF) as u8,
        ])?;

        self.bus.write_command(commands::VCM_DC_SETTING)?;
        self.bus.write_data(&[0x0E])?;

        Ok(())
    }

    /// Poll BUSY until it releases or the deadline expires.
    ///
    /// On expiry the controller is in an undefined state; the caller should
    /// treat any subsequent failure as a directive to reinitialize.
    async fn wait_ready(&mut self, timeout: Duration) -> Result<(), PanelError> {
        let start = tokio::time::Instant::now();
        while self.bus.is_busy() {
            if start.elapsed() >= timeout {
                warn!("Panel busy-wait timed out after {} ms", start.elapsed().as_millis());
                return Err(PanelError::Timeout {
                    waited_ms: start.elapsed().as_millis() as u64,
                });
            }
            tokio::time::sleep(BUSY_POLL_INTERVAL).await;
        }
        Ok(())
    }

    /// Fill the framebuffer with a single color. Does not refresh.
    pub fn clear(&mut self, color: Color) {
        self.framebuffer.clear(color);
    }

    pub fn set_pixel(&mut self, x: i32, y: i32, color: Color) {
        self.framebuffer.set_pixel(x, y, color);
    }

    pub fn get_pixel(&self, x: i32, y: i32) -> Option<Color> {
        self.framebuffer.get_pixel(x, y)
    }

    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: Color) {
        self.framebuffer.draw_line(x0, y0, x1, y1, color);
    }

    pub fn draw_rect(&mut self, x: i32, y: i32, w: u16, h: u16, color: Color, filled: bool) {
        self.framebuffer.draw_rect(x, y, w, h, color, filled);
    }

    pub fn draw_circle(&mut self, cx: i32, cy: i32, radius: i32, color: Color, filled: bool) {
        self.framebuffer.draw_circle(cx, cy, radius, color, filled);
    }

    pub fn draw_bitmap(&mut self, x: i32, y: i32, w: u16, h: u16, bitmap: &[u8]) {
        self.framebuffer.draw_bitmap(x, y, w, h, bitmap);
    }

    /// Borrow the framebuffer for rendering.
    pub fn framebuffer(&self) -> &FrameBuffer {
        &self.framebuffer
    }

    pub fn framebuffer_mut(&mut self) -> &mut FrameBuffer {
        &mut self.framebuffer
    }

    /// Stream the framebuffer to the controller and trigger a visible
    /// refresh. Wakes the panel first if it is sleeping.
    pub async fn refresh(&mut self, mode: RefreshMode) -> Result<(), PanelError> {
        if self.is_sleeping {
            self.wake().await?;
        }

        debug!("Refreshing panel ({:?})", mode);

        self.bus.write_command(commands::DATA_START_TRANSMISSION_1)?;
        self.bus.write_data(self.framebuffer.as_bytes())?;
        self.bus.write_command(commands::DISPLAY_REFRESH)?;

        match self.wait_ready(REFRESH_TIMEOUT).await {
            Ok(()) => {
                self.counters.total_refreshes += 1;
                self.counters.last_refresh_time = Some(Instant::now());
                debug!("Panel refresh complete");
                Ok(())
            }
            Err(e) => {
                error!("Panel refresh failed: {}", e);
                Err(e)
            }
        }
    }

    /// Power down and enter deep sleep. The controller only leaves deep
    /// sleep through a hardware reset.
    pub async fn sleep(&mut self) -> Result<(), PanelError> {
        if self.is_sleeping {
            return Ok(());
        }
        debug!("Panel entering deep sleep");

        self.bus.write_command(commands::POWER_OFF)?;
        self.wait_ready(READY_TIMEOUT).await?;

        self.bus.write_command(commands::DEEP_SLEEP)?;
        self.bus.write_data(&[commands::DEEP_SLEEP_MAGIC])?;

        self.is_sleeping = true;
        Ok(())
    }

    /// Reset and power the panel back on after deep sleep.
    pub async fn wake(&mut self) -> Result<(), PanelError> {
        if !self.is_sleeping {
            return Ok(());
        }
        debug!("Waking panel from deep sleep");

        self.reset().await?;
        self.bus.write_command(commands::POWER_ON)?;
        self.wait_ready(READY_TIMEOUT).await?;

        self.is_sleeping = false;
        Ok(())
    }

    pub fn is_sleeping(&self) -> bool {
        self.is_sleeping
    }

    pub fn counters(&self) -> RefreshCounters {
        self.counters
    }
}
