//! Sluice's docs, baked into Rust modules
//!
//! # Sluice documentation
//!
//! - [Ch. 1: Channels](ch_1_channels)
#![allow(rustdoc::invalid_rust_codeblocks)]
#![cfg(not(doctest))]

#[doc = include_str!("../../../docs/CHANNELS.md")]
pub mod ch_1_channels {}
