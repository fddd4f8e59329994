/*
 *  web/mod.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  HTTP handler surface - route table and handlers for the config app
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

//! Request parsing and socket dispatch belong to the embedding HTTP
//! server; this module supplies the route table and the handlers bound to
//! the device subsystems.

pub mod types;
pub mod handlers;

pub use handlers::{build_router, AppState};
pub use types::{Method, Request, Response, Router};
