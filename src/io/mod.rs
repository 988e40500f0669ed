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

//! Network I/O for running a [`Server`](crate::server::Server).
//!
//! The [`Server`](crate::server::Server) structure implements the
//! processing logic of the service abstracted from underlying network
//! I/O. This module provides the TCP front end: it owns the listening
//! sockets, runs one task per connection, and moves messages between
//! the network and the [`Server`](crate::server::Server). Zone
//! transfers run over TCP only, so there is no UDP path.

pub mod tokio;

use std::time::Duration;

/// How long to wait for a complete message to arrive on a TCP
/// connection before giving up on it. This bounds how long an idle or
/// trickling client can hold a connection open.
const READ_MESSAGE_TIMEOUT: Duration = Duration::from_secs(10);
