//! Watchtower collector: authenticates, stores and fans out SSH login events
//! sent by agents.

pub mod config;
pub mod controllers;
pub mod db;
pub mod errors;
pub mod models;
pub mod repositories;
pub mod services;
pub mod state;

use actix_web::web;

use crate::controllers::{admin, events};
use crate::services::health;

/// Register every collector route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/login", web::post().to(events::ingest_login_event))
        .route("/events", web::get().to(events::list_events))
        .route("/admin/rotate-token", web::post().to(admin::rotate_token))
        .route("/healthz", web::get().to(health::health_check));
}
