/*
 *  wifi/mod.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Wi-Fi provisioning - state machine, captive portal, credentials
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

pub mod radio;
pub mod creds;
pub mod fsm;
pub mod dns;
pub mod portal;

pub use creds::{CredentialCipher, CredentialStore, Credentials, XorCipher};
pub use fsm::{WifiConfig, WifiFsm, WifiState, WifiStatus};
pub use radio::{AuthMode, LinkState, MockRadio, NetworkInfo, RadioError, WifiRadio};

use std::net::Ipv4Addr;

/// SSID prefix of the provisioning access point; the suffix is the last
/// two MAC bytes in hex.
pub const AP_SSID_PREFIX: &str = "Pin-Device-";

/// Gateway/portal address in AP mode.
pub const AP_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

/// AP netmask.
pub const AP_NETMASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

/// AP channel (open auth, DHCP server on).
pub const AP_CHANNEL: u8 = 1;

/// Maximum simultaneous AP associations.
pub const AP_MAX_CONNECTIONS: u8 = 4;

/// Build the provisioning AP SSID from the station MAC.
pub fn ap_ssid_for_mac(mac: [u8; 6]) -> String {
    format!("{}{:02X}{:02X}", AP_SSID_PREFIX, mac[4], mac[5])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ap_ssid_format() {
        let ssid = ap_ssid_for_mac([0xAA, 0xBB, 0xCC, 0xDD, 0x3C, 0x7F]);
        assert_eq!(ssid, "Pin-Device-3C7F");
    }
}
