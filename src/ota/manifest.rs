/*
 *  ota/manifest.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  GitHub-release-compatible update manifest
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

use serde::{Deserialize, Serialize};

use crate::ota::OtaError;

/// Substring identifying the firmware binary among the release assets.
pub const FIRMWARE_ASSET_MARKER: &str = "pin_firmware.bin";

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseManifest {
    pub tag_name: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub published_at: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

/// The update the engine would install.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateInfo {
    pub version: String,
    pub description: String,
    pub url: String,
    pub size: u64,
}

/// Parse a release manifest and select the firmware asset.
pub fn parse_manifest(json: &str) -> Result<UpdateInfo, OtaError> {
    let manifest: ReleaseManifest =
        serde_json::from_str(json).map_err(|e| OtaError::Manifest(e.to_string()))?;

    if manifest.tag_name.is_empty() {
        return Err(OtaError::Manifest("empty tag_name".to_string()));
    }

    let asset = manifest
        .assets
        .iter()
        .find(|a| a.name.contains(FIRMWARE_ASSET_MARKER))
        .ok_or(OtaError::NoAsset)?;

    Ok(UpdateInfo {
        version: manifest.tag_name,
        description: manifest.body,
        url: asset.browser_download_url.clone(),
        size: asset.size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "tag_name": "v1.3.0",
        "body": "Bug fixes",
        "published_at": "2026-07-01T00:00:00Z",
        "assets": [
            {"name": "web_bundle.zip", "browser_download_url": "https://example/web.zip", "size": 10},
            {"name": "pin_firmware.bin", "browser_download_url": "https://example/fw.bin", "size": 1048576}
        ]
    }"#;

    #[test]
    fn test_parse_selects_firmware_asset() {
        let info = parse_manifest(SAMPLE).unwrap();
        assert_eq!(info.version, "v1.3.0");
        assert_eq!(info.description, "Bug fixes");
        assert_eq!(info.url, "https://example/fw.bin");
        assert_eq!(info.size, 1048576);
    }

    #[test]
    fn test_parse_without_firmware_asset() {
        let json = r#"{"tag_name": "v2", "assets": [{"name": "notes.txt", "browser_download_url": "u"}]}"#;
        assert!(matches!(parse_manifest(json), Err(OtaError::NoAsset)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_manifest("[]"), Err(OtaError::Manifest(_))));
        assert!(matches!(
            parse_manifest(r#"{"tag_name": "", "assets": []}"#),
            Err(OtaError::Manifest(_))
        ));
    }

    #[test]
    fn test_arbitrary_tag_names_accepted() {
        // Tag names are opaque strings, not semver
        let json = r#"{"tag_name": "nightly-2026-08-01",
                       "assets": [{"name": "pin_firmware.bin", "browser_download_url": "u", "size": 1}]}"#;
        assert_eq!(parse_manifest(json).unwrap().version, "nightly-2026-08-01");
    }
}
