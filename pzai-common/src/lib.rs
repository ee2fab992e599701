//! # PersonalizeAI Common Library
//!
//! Shared code for the PersonalizeAI services:
//! - Domain models (subscribers, personalization results, A/B tests)
//! - Subscriber engagement and churn scoring
//! - A/B test result evaluation
//! - Configuration resolution
//! - Database initialization

pub mod config;
pub mod db;
pub mod error;
pub mod experiment;
pub mod models;
pub mod scoring;
pub mod time;

pub use error::{Error, Result};
pub use experiment::{evaluate, Evaluation, PriorDecision, VariantMetrics};
pub use scoring::{compute_churn_risk, compute_engagement_score};
