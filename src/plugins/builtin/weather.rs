/*
 *  plugins/builtin/weather.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Weather widget plugin (OpenWeatherMap)
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
use serde_json::Value;

use crate::plugins::api::{
    BoxFuture, Plugin, PluginConfig, PluginContext, PluginError, PluginMetadata,
};

const DEFAULT_CITY: &str = "London,UK";

/// Fetched weather snapshot.
#[derive(Debug, Clone, Default)]
struct WeatherData {
    temperature: f64,
    condition: String,
    location: String,
}

/// Polls OpenWeatherMap and renders temperature and condition into its
/// widget region. Without an `api_key` config value the plugin shows a
/// hint instead of erroring out, so it does not burn its error budget on
/// an unconfigured device.
pub struct WeatherPlugin {
    city: String,
    api_key: Option<String>,
    last: Option<WeatherData>,
}

impl WeatherPlugin {
    pub fn new() -> Self {
        Self {
            city: DEFAULT_CITY.to_string(),
            api_key: None,
            last: None,
        }
    }

    fn request_url(&self, api_key: &str) -> String {
        format!(
            "https://api.openweathermap.org/data/2.5/weather?q={}&appid={}&units=metric",
            self.city, api_key
        )
    }

    fn parse_response(&self, body: &str) -> Result<WeatherData, PluginError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| PluginError::Failed(format!("weather JSON: {}", e)))?;

        let temperature = value["main"]["temp"]
            .as_f64()
            .ok_or_else(|| PluginError::Failed("weather response missing main.temp".to_string()))?;
        let condition = value["weather"][0]["main"]
            .as_str()
            .unwrap_or("Unknown")
            .to_string();
        let location = value["name"].as_str().unwrap_or(&self.city).to_string();

        Ok(WeatherData {
            temperature,
            condition,
            location,
        })
    }

    fn format_display(data: &WeatherData) -> String {
        if data.temperature.fract() == 0.0 {
            format!("{} {:.0}C {}", data.location, data.temperature, data.condition)
        } else {
            format!("{} {:.1}C {}", data.location, data.temperature, data.condition)
        }
    }
}

impl Default for WeatherPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for WeatherPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: "weather".to_string(),
            version: "1.1.0".to_string(),
            author: "PinFrame project".to_string(),
            description: "Current weather conditions widget".to_string(),
            homepage: "https://openweathermap.org".to_string(),
            min_firmware_version: 100,
        }
    }

    fn default_config(&self) -> PluginConfig {
        PluginConfig {
            memory_limit: 16 * 1024,
            update_interval: 600,
            api_rate_limit: 20,
            auto_start: true,
            persistent: false,
        }
    }

    fn init(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError> {
        match ctx.config_get("city") {
            Ok(city) => self.city = city,
            Err(PluginError::NotFound) => {
                ctx.config_set("city", DEFAULT_CITY)?;
            }
            Err(e) => return Err(e),
        }
        self.api_key = ctx.config_get("api_key").ok();

        ctx.log(Level::Info, &format!("weather plugin initialized for {}", self.city))?;
        Ok(())
    }

    fn update<'a>(&'a mut self, ctx: &'a mut PluginContext) -> BoxFuture<'a, Result<(), PluginError>> {
        Box::pin(async move {
            let Some(api_key) = self.api_key.clone() else {
                ctx.update_content("Weather: set api_key")?;
                return Ok(());
            };

            let url = self.request_url(&api_key);
            let body = ctx.http_get(&url).await?;
            let data = self.parse_response(&body)?;

            ctx.update_content(&Self::format_display(&data))?;
            ctx.emit("weather.updated", &format!("{:.1}", data.temperature))?;
            self.last = Some(data);
            Ok(())
        })
    }

    fn config_changed(
        &mut self,
        ctx: &mut PluginContext,
        key: &str,
        value: &str,
    ) -> Result<(), PluginError> {
        match key {
            "city" => {
                self.city = value.to_string();
                self.last = None;
                ctx.log(Level::Info, &format!("weather city changed to {}", value))?;
            }
            "api_key" => {
                self.api_key = Some(value.to_string());
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::api::test_support::test_context;

    const SAMPLE: &str = r#"{
        "name": "Oslo",
        "main": {"temp": 3.5},
        "weather": [{"main": "Snow"}]
    }"#;

    #[test]
    fn test_parse_response() {
        let plugin = WeatherPlugin::new();
        let data = plugin.parse_response(SAMPLE).unwrap();
        assert_eq!(data.location, "Oslo");
        assert_eq!(data.temperature, 3.5);
        assert_eq!(data.condition, "Snow");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let plugin = WeatherPlugin::new();
        assert!(plugin.parse_response("not json").is_err());
        assert!(plugin.parse_response(r#"{"weather": []}"#).is_err());
    }

    #[test]
    fn test_format_display() {
        let whole = WeatherData {
            temperature: 12.0,
            condition: "Clouds".to_string(),
            location: "Berlin".to_string(),
        };
        assert_eq!(WeatherPlugin::format_display(&whole), "Berlin 12C Clouds");

        let fractional = WeatherData {
            temperature: 3.5,
            condition: "Snow".to_string(),
            location: "Oslo".to_string(),
        };
        assert_eq!(WeatherPlugin::format_display(&fractional), "Oslo 3.5C Snow");
    }

    #[tokio::test]
    async fn test_init_seeds_default_city() {
        let mut plugin = WeatherPlugin::new();
        let mut ctx = test_context("weather", plugin.default_config());

        plugin.init(&mut ctx).unwrap();
        assert_eq!(ctx.config_get("city").unwrap(), DEFAULT_CITY);
    }

    #[tokio::test]
    async fn test_update_without_api_key_shows_hint() {
        let mut plugin = WeatherPlugin::new();
        let mut ctx = test_context("weather", plugin.default_config());
        plugin.init(&mut ctx).unwrap();

        plugin.update(&mut ctx).await.unwrap();
        assert_eq!(ctx.region.content, "Weather: set api_key");
    }

    #[test]
    fn test_config_change_resets_cache() {
        let mut plugin = WeatherPlugin::new();
        let mut ctx = test_context("weather", plugin.default_config());
        plugin.last = Some(WeatherData::default());

        plugin.config_changed(&mut ctx, "city", "Paris,FR").unwrap();
        assert_eq!(plugin.city, "Paris,FR");
        assert!(plugin.last.is_none());
    }
}
