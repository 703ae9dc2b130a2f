//! Image insight service
//!
//! Accepts uploaded images and runs each one, as a background job, through
//! storage, OCR, language detection, translation, text analytics and
//! classification. Every capability provider is optional; absent providers
//! fall back to local heuristics so a job always reaches a terminal state.

pub mod app_state;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
