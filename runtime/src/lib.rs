// Copyright 2026 Unitwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Unitwatch runtime library: finds studio and one-bedroom units on an
//! apartment site, reconciles them against a local store and announces the
//! new ones.
//!
//! The library crate exposes the pipeline for the `unitwatch` binary and for
//! integration testing.

pub mod cli;
pub mod config;
pub mod dedup;
pub mod extraction;
pub mod live;
pub mod navigation;
pub mod normalize;
pub mod notify;
pub mod orchestrator;
pub mod renderer;
pub mod store;
pub mod types;
