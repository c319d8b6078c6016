//! Core types and logic for termlens.
//!
//! This crate turns a host's opaque text positions into screen coordinates
//! and reads text back out of the screen for assistive review. Hosts plug in
//! through the [`source::TextSource`] trait; the CLI crate ships a PTY host
//! and a file host.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`source`] | Host buffer access trait and an in-memory buffer |
//! | [`engine`] | Token to `(row, col)` with cache, incremental and full-scan paths |
//! | [`cache`] | Bounded TTL cache of computed coordinates |
//! | [`extract`] | Rectangle and linear text extraction |
//! | [`worker`] | Background extraction of large rectangles with cancellation |
//! | [`region`] | Named window regions, bounds and profiles |
//! | [`monitor`] | Polling change detection for regions |
//! | [`ansi`] | SGR parsing and escape stripping |
//! | [`attributes`] | Text attribute state and spoken descriptions |
//! | [`width`] | Display width, column slicing and bidi helpers |
//! | [`config`] | Settings file and environment overrides |
//! | [`error`] | API error types with actionable suggestions |
//!
//! Coordinates are 1-based. `(0, 0)` means "unknown" and is what
//! [`engine::CoordinateEngine::position`] returns when the host cannot be
//! read.

pub mod ansi;
pub mod attributes;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod grid;
pub mod monitor;
pub mod region;
pub mod source;
pub mod width;
pub mod worker;
