//! # RCON Admin Client Library
//!
//! Administers a live game server over its UDP remote-console protocol and
//! keeps a consistent model of who is connected, built from the server's
//! out-of-band log stream.
//!
//! ## Architecture Overview
//!
//! Two independent UDP read loops feed the system. The control channel
//! carries authenticated commands and their replies; the log channel
//! carries one log line per datagram. Everything downstream consumes the
//! classified log events or issues commands through the session handle.
//!
//! ```text
//! LogListener -> EventClassifier -> broadcast -> { PlayerTracker,
//!                                                  CommandRouter, ... }
//! PlayerTracker / CommandRouter -> Session -> game server
//! ```
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! The control-channel actor: challenge handshake, command framing,
//! FIFO response correlation, multi-packet reassembly, per-command
//! timeouts, and teardown semantics.
//!
//! ### Classifier Module (`classifier`)
//! The ordered regex rule table that turns raw log lines into typed
//! events with named fields.
//!
//! ### Listener Module (`listener`)
//! The log-stream UDP receiver; strips framing, classifies, and
//! republishes events on a broadcast channel.
//!
//! ### Tracker Module (`tracker`)
//! The player directory: bootstrap resync against already-connected
//! players, live merging of classified events, and detail enrichment.
//!
//! ### Router Module (`router`)
//! Access-controlled dispatch of chat-issued commands to registered
//! handlers, with catch-all and catch-remaining wildcards.
//!
//! ### Support Modules
//! `access` (identity -> level checks), `config` (startup TOML), and
//! `error` (session error kinds).

pub mod access;
pub mod classifier;
pub mod config;
pub mod error;
pub mod listener;
pub mod router;
pub mod session;
pub mod tracker;
