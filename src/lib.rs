//! siteport - legacy WordPress migration and parity verification toolkit.
//!
//! Imports a legacy WordPress blog through the WP REST API, migrates
//! embedded media into object storage, discovers the legacy URL inventory,
//! and verifies visual parity between the legacy and new sites by
//! screenshot diffing.

pub mod cli;
pub mod config;
pub mod discovery;
pub mod html;
pub mod import;
pub mod media;
pub mod models;
pub mod parity;
pub mod repository;
pub mod utils;
