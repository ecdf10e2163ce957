// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Trento Plugin - externally compiled gatherers
//!
//! A plugin is a standalone binary speaking the plugin protocol over its
//! stdin/stdout. This crate provides both sides:
//! - Agent side: [`PluginManager`] discovers, starts, handshakes and stops
//!   plugin processes and exposes each as a [`PluginGatherer`]
//! - Plugin side: [`serve`] runs a [`trento_core::Gatherer`] behind the
//!   protocol
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────┐  Handshake / Request / Cancel  ┌─────────────────┐
//! │ agent                  │ ─────────────── stdin ───────▶ │ plugin process  │
//! │  PluginGatherer        │                                │  serve(G)       │
//! │   └─ PluginClient ─────│ ◀────────────── stdout ─────── │   └─ G::gather  │
//! └────────────────────────┘  HandshakeAck / Response       └─────────────────┘
//!                              stderr ──▶ tracing (debug)
//! ```

pub mod client;
pub mod convert;
pub mod error;
pub mod gatherer;
pub mod loader;
pub mod server;

pub use client::PluginClient;
pub use error::{PluginError, Result};
pub use gatherer::PluginGatherer;
pub use loader::{DEFAULT_HANDSHAKE_TIMEOUT, PLUGIN_VERSION, PluginManager, PluginStop};
pub use server::{has_magic_cookie, serve, serve_connection};
