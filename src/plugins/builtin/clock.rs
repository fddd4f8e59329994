/*
 *  plugins/builtin/clock.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Clock widget plugin
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

use log::Level;

use crate::canvas::model::FontSize;
use crate::plugins::api::{
    BoxFuture, Plugin, PluginConfig, PluginContext, PluginError, PluginMetadata,
};

/// Default strftime pattern; overridable via the `format` config key.
const DEFAULT_FORMAT: &str = "%H:%M";

/// Renders the local time into its widget region.
pub struct ClockPlugin {
    format: String,
}

impl ClockPlugin {
    pub fn new() -> Self {
        Self {
            format: DEFAULT_FORMAT.to_string(),
        }
    }
}

impl Default for ClockPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for ClockPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: "clock".to_string(),
            version: "1.0.0".to_string(),
            author: "PinFrame project".to_string(),
            description: "Simple clock display plugin".to_string(),
            homepage: "https://github.com/pinframe/pinframe".to_string(),
            min_firmware_version: 100,
        }
    }

    fn default_config(&self) -> PluginConfig {
        PluginConfig {
            memory_limit: 4096,
            update_interval: 30,
            api_rate_limit: 10,
            auto_start: true,
            persistent: true,
        }
    }

    fn init(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError> {
        // XL glyphs for glanceability
        ctx.set_font_size(FontSize::XLarge)?;

        if let Ok(format) = ctx.config_get("format") {
            self.format = format;
        }

        ctx.log(Level::Info, "clock plugin initialized")?;
        Ok(())
    }

    fn update<'a>(&'a mut self, ctx: &'a mut PluginContext) -> BoxFuture<'a, Result<(), PluginError>> {
        Box::pin(async move {
            let now = ctx.format_time(&self.format)?;
            ctx.update_content(&now)?;
            Ok(())
        })
    }

    fn config_changed(
        &mut self,
        _ctx: &mut PluginContext,
        key: &str,
        value: &str,
    ) -> Result<(), PluginError> {
        if key == "format" {
            self.format = value.to_string();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::api::test_support::test_context;

    #[tokio::test]
    async fn test_clock_updates_widget() {
        let mut plugin = ClockPlugin::new();
        let mut ctx = test_context("clock", plugin.default_config());

        plugin.init(&mut ctx).unwrap();
        assert_eq!(ctx.region.font_size, FontSize::XLarge);

        plugin.update(&mut ctx).await.unwrap();
        // NullHost formats every time as 12:34
        assert_eq!(ctx.region.content, "12:34");
        assert!(ctx.region.dirty);
    }

    #[test]
    fn test_clock_config_change() {
        let mut plugin = ClockPlugin::new();
        let mut ctx = test_context("clock", plugin.default_config());

        plugin.config_changed(&mut ctx, "format", "%H:%M:%S").unwrap();
        assert_eq!(plugin.format, "%H:%M:%S");

        plugin.config_changed(&mut ctx, "unrelated", "x").unwrap();
        assert_eq!(plugin.format, "%H:%M:%S");
    }
}
