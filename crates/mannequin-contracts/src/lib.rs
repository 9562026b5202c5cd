//! Data contracts shared by the mannequin engine and CLI: angle sets,
//! configuration, the image model registry, session commands, the event log
//! and the export manifest.

pub mod angles;
pub mod commands;
pub mod config;
pub mod events;
pub mod export;
pub mod models;
