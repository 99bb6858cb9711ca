// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Delay Tracker - Journey Delay Monitoring
//!
//! This crate monitors user-registered train journeys against an upstream
//! real-time feed, records threshold-crossing delays and cancellations, and
//! hands eligible delays to a downstream compensation-claims service. Every
//! state change is narrated through a transactional outbox so events reach
//! the message bus at least once, even when the bus is down at detection
//! time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   register    ┌─────────────────────────────────────────┐
//! │  Producers   │──────────────▶│           delay-tracker                 │
//! │ (two dialects)│              │                                         │
//! └──────────────┘               │  ┌──────────┐ tick ┌────────────────┐   │
//!                                │  │   Tick   │─────▶│   Detection    │   │
//! ┌──────────────┐  segments     │  │ Scheduler│      │     Cycle      │   │
//! │   Journey    │◀──────────────│  └──────────┘      └───────┬────────┘   │
//! │   Matcher    │               │                            │            │
//! └──────────────┘               │       per-journey transaction           │
//! ┌──────────────┐  delays       │  ┌─────────┐ ┌────────┐ ┌────────┐      │
//! │   Upstream   │◀──────────────│  │ Journeys│ │ Alerts │ │ Outbox │      │
//! │    Feed      │               │  └─────────┘ └────────┘ └───┬────┘      │
//! └──────────────┘               │                             │ relay     │
//! ┌──────────────┐  claims       │                     ┌───────▼────────┐  │
//! │    Claims    │◀──────────────│                     │ Outbox Relay   │──┼──▶ bus
//! │    Oracle    │               │                     └────────────────┘  │
//! └──────────────┘               └─────────────────────────────────────────┘
//! ```
//!
//! # Journey lifecycle
//!
//! ```text
//!                  ┌─────────────┐
//!                  │ PENDING_RID │
//!                  └──────┬──────┘
//!            rid resolved │        cancel
//!                         ▼           │
//!                  ┌──────────┐       │
//!        ┌─────────│  ACTIVE  │───────┤
//!        │         └────┬─────┘       │
//!  delay ≥ T            │ arrival     │
//!        ▼              │ passed      ▼
//!  ┌─────────┐          │       ┌───────────┐
//!  │ DELAYED │──────────┤       │ CANCELLED │
//!  └─────────┘          ▼       └───────────┘
//!                 ┌───────────┐
//!                 │ COMPLETED │
//!                 └───────────┘
//! ```
//!
//! Terminal states clear `next_check_at`; the poller only ever revisits
//! `pending_rid` and `active` journeys.
//!
//! # Modules
//!
//! - [`config`]: Service configuration from environment variables
//! - [`db`]: PostgreSQL persistence for journeys, alerts, and the outbox
//! - [`error`]: Error types for tracker operations
//! - [`monitor`]: Lifecycle state machine and check scheduling
//! - [`detector`]: Pure classification of upstream delay data
//! - [`claim_trigger`]: Claim pre-checks and oracle response classification
//! - [`events`]: Typed outbox event builders
//! - [`publisher`]: Outbox relay to the message bus
//! - [`outbox_cleanup_worker`]: Retention pruning of processed events
//! - [`detection_cycle`]: Per-tick orchestration pipeline
//! - [`tick_scheduler`]: Fixed-cadence, non-reentrant tick driver
//! - [`clients`]: HTTP clients for the external collaborators
//! - [`server`]: HTTP surface (health, metrics, registration)

/// Service configuration loaded from environment variables.
pub mod config;

/// PostgreSQL database operations for journeys, alerts, and the outbox.
pub mod db;

/// Error types for tracker operations.
pub mod error;

/// Database migrations for the `delay_tracker` schema.
pub mod migrations;

/// Lifecycle state machine and check scheduling.
pub mod monitor;

/// Pure classification of upstream delay data.
pub mod detector;

/// Claim pre-checks and oracle response classification.
pub mod claim_trigger;

/// Typed builders for outbox events.
pub mod events;

/// Outbox relay to the message bus.
pub mod publisher;

/// Background worker pruning processed outbox events.
pub mod outbox_cleanup_worker;

/// Per-tick detection orchestration.
pub mod detection_cycle;

/// Fixed-cadence, non-reentrant tick driver.
pub mod tick_scheduler;

/// HTTP clients for the upstream and downstream collaborators.
pub mod clients;

/// HTTP surface: health, metrics, and journey registration.
pub mod server;

pub use config::Config;
pub use error::Error;
