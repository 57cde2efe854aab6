// fetch-core - Media Fetch Core
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! HTTP session plumbing shared by the strategies and fetch services
//!
//! A [`Session`] is a `reqwest::Client` plus the cookie jar it writes to. One
//! is built per invocation and never shared, so cookies seeded for one job
//! cannot leak into another.

pub mod session;

pub use session::{
    browser_headers, build_client, cookie_header, file_name_from_headers, header_map, Session,
    BROWSER_USER_AGENT,
};
