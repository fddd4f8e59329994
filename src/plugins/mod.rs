/*
 *  plugins/mod.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Plugin runtime - registry, lifecycle, sandbox and host API
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

//! Display plugins extend the device with small periodic widgets (clock,
//! weather, ...). The runtime keeps them sandboxed:
//!
//! - each enabled plugin runs in its own worker with its own update cadence
//! - memory is accounted through the context's tracking allocator
//! - host-API calls are rate-limited per 60-second window
//! - a plugin that keeps failing is parked in the Error state
//!
//! Plugins implement the [`api::Plugin`] trait; everything they may touch
//! of the system arrives through their [`api::PluginContext`], whose I/O
//! surface is the substitutable [`api::HostApi`] vtable.

pub mod api;
pub mod events;
pub mod host;
pub mod runtime;
pub mod builtin;

pub use api::{
    HostApi, Plugin, PluginConfig, PluginContext, PluginError, PluginMetadata, PluginState,
    PluginStats, WidgetRegion, MAX_ERRORS, MAX_PLUGINS,
};
pub use events::EventBus;
pub use host::SystemHost;
pub use runtime::{PluginRuntime, PluginSummary};
