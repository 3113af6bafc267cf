// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Trailstreak: live run tracking with streaks, daily goals and achievements
//!
//! This crate provides the backend API that turns raw GPS samples into run
//! sessions and applies finished runs to each user's gamification ledger.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::LedgerStore;
use services::{SessionFinisher, SessionRegistry};
use std::sync::Arc;
use std::time::Duration;
use time_utils::Clock;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn LedgerStore>,
    pub sessions: SessionRegistry,
    pub finisher: SessionFinisher,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        let tick_interval =
            (config.tick_interval_ms > 0).then(|| Duration::from_millis(config.tick_interval_ms));
        let sessions =
            SessionRegistry::new(clock.clone(), config.calories_per_minute, tick_interval);
        let finisher = SessionFinisher::new(&config, store.clone(), clock);

        Self {
            config,
            store,
            sessions,
            finisher,
        }
    }
}
