//! Grievance Insights - analytics and live signals for a grievance tracking dashboard.
//!
//! # Overview
//!
//! The service sits between the dashboard front end and the complaint
//! backend. It turns the complaint collection a user may see into chart-ready
//! summaries, keeps a live list of notifications pushed by the backend's hub,
//! and relays the assistant chat to a generative-language API.
//!
//! Nothing is persisted. Complaints belong to the backend, notifications live
//! for a few seconds, and chat transcripts end with the session.
//!
//! # Modules
//!
//! - [`model`]: Complaint records, sessions, notifications and chat messages
//! - [`aggregation`]: Pure derivation of the report views
//! - [`retry`]: Exponential backoff with jitter
//! - [`notifications`]: Self-expiring notification list
//! - [`push`]: Auto-reconnecting hub subscription
//! - [`data_sources`]: Complaint backend and generative-language clients
//! - [`chat`]: Assistant chat relay
//! - [`dashboard`]: Reports service
//! - [`config`]: Environment configuration
//! - [`api`]: HTTP API handlers

pub mod aggregation;
pub mod api;
pub mod chat;
pub mod config;
pub mod dashboard;
pub mod data_sources;
pub mod error;
pub mod model;
pub mod notifications;
pub mod push;
pub mod retry;
