// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Zonegate is a minimal authoritative DNS endpoint whose sole job is
//! to serve zone transfers (AXFR, [RFC 5936]) over TCP, authenticated
//! with TSIG ([RFC 8945]). Zones are grouped into *views*, each bound
//! to one TSIG key; alongside its ordinary zones, every view serves a
//! synthesized catalog zone ([RFC 9432]) describing its current zone
//! set, with a durable, monotonic serial.
//!
//! The library is organized in layers:
//!
//! - [`name`], [`class`], and [`rr`] provide the DNS data model;
//! - [`message`] reads and writes wire-format messages, including TSIG
//!   verification and signing;
//! - [`provider`] is the interface to the external zone store,
//!   [`catalog`] synthesizes catalog zones, and [`serial`] persists
//!   their serials;
//! - [`server`] turns received messages into responses, and [`io`]
//!   connects the server to the network.
//!
//! [RFC 5936]: https://datatracker.ietf.org/doc/html/rfc5936
//! [RFC 8945]: https://datatracker.ietf.org/doc/html/rfc8945
//! [RFC 9432]: https://datatracker.ietf.org/doc/html/rfc9432

pub mod catalog;
pub mod class;
pub mod io;
pub mod message;
pub mod name;
pub mod provider;
pub mod rr;
pub mod serial;
pub mod server;
mod util;
