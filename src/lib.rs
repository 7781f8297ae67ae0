#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! # Seatcore: input dispatch for windowing servers
//!
//! This crate implements the input-routing core of a multi-device window
//! server: it decides, for every raw key, button and motion event, which
//! window and which clients receive it. It is deliberately independent of
//! any wire protocol or rendering stack; the embedding server supplies the
//! window tree and a delivery sink through the
//! [`DispatchHandler`](input::DispatchHandler) trait and owns everything
//! else.
//!
//! ## Structure of the crate
//!
//! - [`input`] holds the whole engine: device registry, event selections,
//!   active and passive grabs, the synchronous freeze/thaw machinery and
//!   Enter/Leave/Focus notification generation, all driven through
//!   [`DispatchState`](input::DispatchState).
//! - [`utils`] provides the small shared vocabulary: wraparound-aware
//!   [`Timestamp`](utils::Timestamp)s and plain integer geometry.
//!
//! ## State handling
//!
//! The engine follows a handler-trait structure: every entry point takes
//! `&mut D` where `D` is the embedder's central state implementing
//! [`DispatchHandler`](input::DispatchHandler). Window-tree queries and
//! event deliveries flow through that reference, so the dispatcher never
//! holds pointers into the embedder and the embedder never needs shared
//! ownership of dispatcher state.
//!
//! See the [`input`] module documentation for a walkthrough of the
//! dispatch pipeline and a usage sketch.

pub mod input;
pub mod utils;
