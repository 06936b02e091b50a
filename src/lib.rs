//! Terminal dashboard for a rental property management API.

pub mod api;
pub mod app;
pub mod cache;
pub mod commands;
pub mod config;
pub mod data;
pub mod event;
pub mod format;
pub mod logging;
pub mod query;
pub mod services;
pub mod telemetry;
pub mod ui;
pub mod validation;
