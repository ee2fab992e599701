//! Domain models
//!
//! Records persisted by the API service plus the request payloads used to
//! create and modify them. Enum-valued columns are stored as their
//! snake_case names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::experiment::{self, Evaluation, ExperimentConfig, PriorDecision, VariantMetrics, VariantOutcome};
use crate::{Error, Result};

// ========================================
// Enumerations
// ========================================

/// Subscription tier of a newsletter recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    #[default]
    Basic,
    Premium,
    Enterprise,
}

impl SubscriptionTier {
    pub const ALL: [SubscriptionTier; 3] = [Self::Basic, Self::Premium, Self::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Premium => "premium",
            Self::Enterprise => "enterprise",
        }
    }
}

impl FromStr for SubscriptionTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "basic" => Ok(Self::Basic),
            "premium" => Ok(Self::Premium),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(Error::InvalidInput(format!("Unknown subscription tier: {}", other))),
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Paused,
    Cancelled,
}

impl SubscriptionStatus {
    pub const ALL: [SubscriptionStatus; 3] = [Self::Active, Self::Paused, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(Error::InvalidInput(format!("Unknown subscription status: {}", other))),
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A/B test lifecycle status
///
/// `Paused` and `Cancelled` are recognized when stored but no operation
/// moves a test into them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    #[default]
    Draft,
    Running,
    Paused,
    Completed,
    Cancelled,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for TestStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(Self::Draft),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(Error::InvalidInput(format!("Unknown test status: {}", other))),
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metric used to pick the winning variant of a test
///
/// Unrecognized names fall back to `AvgValue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum TargetMetric {
    #[default]
    OpenRate,
    ClickRate,
    ConversionRate,
    AvgValue,
}

impl TargetMetric {
    pub fn from_name(name: &str) -> Self {
        match name {
            "open_rate" => Self::OpenRate,
            "click_rate" => Self::ClickRate,
            "conversion_rate" => Self::ConversionRate,
            _ => Self::AvgValue,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenRate => "open_rate",
            Self::ClickRate => "click_rate",
            Self::ConversionRate => "conversion_rate",
            Self::AvgValue => "avg_value",
        }
    }
}

impl From<String> for TargetMetric {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

impl fmt::Display for TargetMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ========================================
// Subscriber
// ========================================

/// One newsletter recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: i64,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,

    pub subscription_date: DateTime<Utc>,
    pub subscription_status: SubscriptionStatus,
    pub subscription_tier: SubscriptionTier,

    pub total_emails_sent: u32,
    pub total_emails_opened: u32,
    pub total_clicks: u32,
    pub last_engagement_date: Option<DateTime<Utc>>,
    /// Derived, 0-100. Only changes on explicit rescoring.
    pub engagement_score: f64,

    pub preferred_content_types: Vec<String>,
    pub risk_tolerance: String,
    pub investment_experience: String,
    pub portfolio_size: Option<String>,

    pub preferred_send_time: Option<String>,
    pub preferred_frequency: String,
    pub device_preference: String,

    pub ai_persona: Option<String>,
    pub content_preferences: Option<serde_json::Value>,
    /// Derived, 0-1. Only changes on explicit rescoring.
    pub churn_risk_score: f64,
    pub lifetime_value: f64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscriber {
    /// Email open rate as a percentage (0 when nothing was sent)
    pub fn open_rate(&self) -> f64 {
        rate(self.total_emails_opened, self.total_emails_sent)
    }

    /// Click rate as a percentage of emails sent (0 when nothing was sent)
    pub fn click_rate(&self) -> f64 {
        rate(self.total_clicks, self.total_emails_sent)
    }

    /// Display name: first and last name, whichever exists, or the email's local part
    pub fn full_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self
                .email
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string(),
        }
    }

    /// Recompute and store `engagement_score`
    pub fn update_engagement_score(&mut self, now: DateTime<Utc>) -> f64 {
        self.engagement_score = crate::scoring::compute_engagement_score(self, now);
        self.engagement_score
    }

    /// Recompute and store `churn_risk_score` from the current `engagement_score`
    pub fn update_churn_risk(&mut self, now: DateTime<Utc>) -> f64 {
        self.churn_risk_score = crate::scoring::compute_churn_risk(self, now);
        self.churn_risk_score
    }
}

fn rate(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    numerator as f64 / denominator as f64 * 100.0
}

/// Payload for registering a subscriber
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSubscriber {
    #[serde(default)]
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default)]
    pub subscription_tier: SubscriptionTier,
    pub risk_tolerance: Option<String>,
    pub investment_experience: Option<String>,
    pub portfolio_size: Option<String>,
    #[serde(default)]
    pub preferred_content_types: Vec<String>,
    pub preferred_frequency: Option<String>,
}

impl NewSubscriber {
    /// Trim the email and reject empty or malformed addresses
    pub fn validate(mut self) -> Result<Self> {
        self.email = self.email.trim().to_string();
        if self.email.is_empty() {
            return Err(Error::InvalidInput("Email is required".to_string()));
        }
        let valid = self
            .email
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && !domain.is_empty())
            .unwrap_or(false);
        if !valid {
            return Err(Error::InvalidInput(format!("Invalid email address: {}", self.email)));
        }
        Ok(self)
    }
}

/// Partial update of a subscriber's profile fields
///
/// Counters and scores are not updatable through this payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriberUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub subscription_status: Option<SubscriptionStatus>,
    pub subscription_tier: Option<SubscriptionTier>,
    pub risk_tolerance: Option<String>,
    pub investment_experience: Option<String>,
    pub portfolio_size: Option<String>,
    pub preferred_content_types: Option<Vec<String>>,
    pub preferred_frequency: Option<String>,
    pub device_preference: Option<String>,
    pub preferred_send_time: Option<String>,
    pub ai_persona: Option<String>,
}

impl SubscriberUpdate {
    pub fn apply(self, subscriber: &mut Subscriber, now: DateTime<Utc>) {
        if let Some(v) = self.first_name {
            subscriber.first_name = Some(v);
        }
        if let Some(v) = self.last_name {
            subscriber.last_name = Some(v);
        }
        if let Some(v) = self.subscription_status {
            subscriber.subscription_status = v;
        }
        if let Some(v) = self.subscription_tier {
            subscriber.subscription_tier = v;
        }
        if let Some(v) = self.risk_tolerance {
            subscriber.risk_tolerance = v;
        }
        if let Some(v) = self.investment_experience {
            subscriber.investment_experience = v;
        }
        if let Some(v) = self.portfolio_size {
            subscriber.portfolio_size = Some(v);
        }
        if let Some(v) = self.preferred_content_types {
            subscriber.preferred_content_types = v;
        }
        if let Some(v) = self.preferred_frequency {
            subscriber.preferred_frequency = v;
        }
        if let Some(v) = self.device_preference {
            subscriber.device_preference = v;
        }
        if let Some(v) = self.preferred_send_time {
            subscriber.preferred_send_time = Some(v);
        }
        if let Some(v) = self.ai_persona {
            subscriber.ai_persona = Some(v);
        }
        subscriber.updated_at = now;
    }
}

/// Email delivery activity reported by the tracking collaborator
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ActivityDelta {
    #[serde(default)]
    pub sent: u32,
    #[serde(default)]
    pub opened: u32,
    #[serde(default)]
    pub clicked: u32,
}

impl ActivityDelta {
    /// Add the delta to the subscriber's counters
    ///
    /// Fails without modifying anything if the result would have more opens
    /// than sends or a counter would overflow.
    pub fn apply(&self, subscriber: &mut Subscriber, now: DateTime<Utc>) -> Result<()> {
        let overflow = || Error::InvalidInput("Engagement counter overflow".to_string());
        let sent = subscriber.total_emails_sent.checked_add(self.sent).ok_or_else(overflow)?;
        let opened = subscriber.total_emails_opened.checked_add(self.opened).ok_or_else(overflow)?;
        let clicks = subscriber.total_clicks.checked_add(self.clicked).ok_or_else(overflow)?;

        if opened > sent {
            return Err(Error::InvalidInput(format!(
                "Opened count ({}) cannot exceed sent count ({})",
                opened, sent
            )));
        }

        subscriber.total_emails_sent = sent;
        subscriber.total_emails_opened = opened;
        subscriber.total_clicks = clicks;
        if self.opened > 0 || self.clicked > 0 {
            subscriber.last_engagement_date = Some(now);
        }
        subscriber.updated_at = now;
        Ok(())
    }
}

// ========================================
// Personalization results
// ========================================

/// One personalization decision and its delivery outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalizationResult {
    pub id: i64,
    pub subscriber_id: i64,
    pub subscriber_email: Option<String>,

    pub content_type: String,
    pub original_content: Option<String>,
    pub personalized_content: String,
    pub personalization_strategy: Option<String>,

    pub ai_model_used: String,
    pub ai_prompt_template: Option<String>,
    pub ai_confidence_score: f64,

    pub was_sent: bool,
    pub was_opened: bool,
    pub was_clicked: bool,
    pub engagement_score: f64,
    pub conversion_value: f64,

    pub ab_test_id: Option<i64>,
    pub ab_test_variant: Option<String>,

    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
}

impl From<&PersonalizationResult> for VariantOutcome {
    fn from(result: &PersonalizationResult) -> Self {
        VariantOutcome {
            variant: result.ab_test_variant.clone(),
            was_opened: result.was_opened,
            was_clicked: result.was_clicked,
            conversion_value: result.conversion_value,
        }
    }
}

/// Payload for recording a personalization decision
#[derive(Debug, Clone, Deserialize)]
pub struct NewPersonalizationResult {
    pub subscriber_id: i64,
    pub content_type: String,
    pub original_content: Option<String>,
    pub personalized_content: String,
    pub personalization_strategy: Option<String>,
    pub ai_model_used: Option<String>,
    pub ai_prompt_template: Option<String>,
    #[serde(default)]
    pub ai_confidence_score: f64,
    pub ab_test_id: Option<i64>,
    pub ab_test_variant: Option<String>,
}

impl NewPersonalizationResult {
    pub fn validate(self) -> Result<Self> {
        if self.content_type.trim().is_empty() {
            return Err(Error::InvalidInput("content_type is required".to_string()));
        }
        if !(0.0..=1.0).contains(&self.ai_confidence_score) {
            return Err(Error::InvalidInput(format!(
                "ai_confidence_score must be within 0..=1, got {}",
                self.ai_confidence_score
            )));
        }
        if self.ab_test_id.is_some()
            && self.ab_test_variant.as_deref().map_or(true, |v| v.trim().is_empty())
        {
            return Err(Error::InvalidInput(
                "ab_test_variant is required when ab_test_id is set".to_string(),
            ));
        }
        Ok(self)
    }
}

/// Delivery event reported for a personalization result
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutcomeEvent {
    Sent,
    Opened,
    Clicked,
    Converted { value: f64 },
}

/// Which subscriber counters moved because of an outcome event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeTransition {
    pub newly_sent: bool,
    pub newly_opened: bool,
    pub newly_clicked: bool,
}

impl OutcomeTransition {
    /// Matching counter delta for the owning subscriber
    pub fn activity(&self) -> ActivityDelta {
        ActivityDelta {
            sent: self.newly_sent as u32,
            opened: self.newly_opened as u32,
            clicked: self.newly_clicked as u32,
        }
    }
}

impl PersonalizationResult {
    /// Apply a delivery event to the outcome fields
    ///
    /// Each flag and its timestamp is set on first occurrence only. A click
    /// implies an open, and an open implies a send.
    pub fn record_event(&mut self, event: OutcomeEvent, now: DateTime<Utc>) -> Result<OutcomeTransition> {
        let mut transition = OutcomeTransition::default();

        let reach_sent = matches!(event, OutcomeEvent::Sent | OutcomeEvent::Opened | OutcomeEvent::Clicked);
        let reach_opened = matches!(event, OutcomeEvent::Opened | OutcomeEvent::Clicked);
        let reach_clicked = matches!(event, OutcomeEvent::Clicked);

        if let OutcomeEvent::Converted { value } = event {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidInput(format!(
                    "Conversion value must be non-negative, got {}",
                    value
                )));
            }
            self.conversion_value = value;
        }

        if reach_sent && !self.was_sent {
            self.was_sent = true;
            self.sent_at = Some(now);
            transition.newly_sent = true;
        }
        if reach_opened && !self.was_opened {
            self.was_opened = true;
            self.opened_at = Some(now);
            transition.newly_opened = true;
        }
        if reach_clicked && !self.was_clicked {
            self.was_clicked = true;
            self.clicked_at = Some(now);
            transition.newly_clicked = true;
        }

        Ok(transition)
    }
}

// ========================================
// A/B tests
// ========================================

/// An experiment over a set of named variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbTest {
    pub id: i64,
    pub test_name: String,
    pub test_description: Option<String>,
    pub test_type: String,

    pub variants: Vec<String>,
    pub traffic_split: BTreeMap<String, f64>,
    pub target_metric: TargetMetric,

    pub status: TestStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub planned_duration_days: u32,

    pub confidence_level: f64,
    pub minimum_sample_size: u32,
    pub statistical_significance_reached: bool,
    pub winning_variant: Option<String>,

    pub total_participants: u32,
    pub results_summary: Option<BTreeMap<String, VariantMetrics>>,

    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AbTest {
    pub fn experiment_config(&self) -> ExperimentConfig {
        ExperimentConfig {
            variants: self.variants.clone(),
            target_metric: self.target_metric,
            minimum_sample_size: self.minimum_sample_size,
        }
    }

    pub fn prior_decision(&self) -> PriorDecision {
        PriorDecision {
            winning_variant: self.winning_variant.clone(),
            significance_reached: self.statistical_significance_reached,
        }
    }

    /// Move to `running` and record the start time
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !matches!(self.status, TestStatus::Draft | TestStatus::Paused) {
            return Err(Error::InvalidState(format!(
                "Test {} cannot be started from status '{}'",
                self.id, self.status
            )));
        }
        self.status = TestStatus::Running;
        self.start_date = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Move to `completed`, record the end time, and evaluate the outcomes
    pub fn stop(&mut self, outcomes: &[VariantOutcome], now: DateTime<Utc>) -> Result<Evaluation> {
        if self.status != TestStatus::Running {
            return Err(Error::InvalidState(format!(
                "Test {} cannot be stopped from status '{}'",
                self.id, self.status
            )));
        }
        self.status = TestStatus::Completed;
        self.end_date = Some(now);
        Ok(self.evaluate(outcomes, now))
    }

    /// Recompute results from an outcome snapshot and store them on the test
    pub fn evaluate(&mut self, outcomes: &[VariantOutcome], now: DateTime<Utc>) -> Evaluation {
        let evaluation = experiment::evaluate(&self.experiment_config(), outcomes, &self.prior_decision());
        self.apply_evaluation(&evaluation);
        self.updated_at = now;
        evaluation
    }

    pub fn apply_evaluation(&mut self, evaluation: &Evaluation) {
        self.results_summary = Some(evaluation.per_variant.clone());
        self.total_participants = evaluation.total_participants;
        self.winning_variant = evaluation.winning_variant.clone();
        self.statistical_significance_reached = evaluation.significance_reached;
    }
}

fn default_test_type() -> String {
    "subject_line".to_string()
}

/// Payload for creating an A/B test (always created as `draft`)
#[derive(Debug, Clone, Deserialize)]
pub struct NewAbTest {
    pub test_name: String,
    pub test_description: Option<String>,
    #[serde(default = "default_test_type")]
    pub test_type: String,
    pub variants: Vec<String>,
    pub traffic_split: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub target_metric: TargetMetric,
    pub planned_duration_days: Option<u32>,
    pub confidence_level: Option<f64>,
    pub minimum_sample_size: Option<u32>,
    pub created_by: Option<String>,
}

impl NewAbTest {
    pub const DEFAULT_DURATION_DAYS: u32 = 7;
    pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;
    pub const DEFAULT_MINIMUM_SAMPLE_SIZE: u32 = 100;

    /// Validate the payload and fill in defaults
    ///
    /// Without an explicit traffic split, traffic is divided evenly.
    pub fn validate(mut self) -> Result<Self> {
        self.test_name = self.test_name.trim().to_string();
        if self.test_name.is_empty() {
            return Err(Error::InvalidInput("test_name is required".to_string()));
        }

        if self.variants.is_empty() {
            return Err(Error::InvalidInput("At least one variant is required".to_string()));
        }
        for (i, variant) in self.variants.iter().enumerate() {
            if variant.trim().is_empty() || variant.len() > 10 {
                return Err(Error::InvalidInput(format!(
                    "Variant codes must be 1-10 characters, got '{}'",
                    variant
                )));
            }
            if self.variants[..i].contains(variant) {
                return Err(Error::InvalidInput(format!("Duplicate variant: {}", variant)));
            }
        }

        match &self.traffic_split {
            Some(split) => {
                for (variant, share) in split {
                    if !self.variants.contains(variant) {
                        return Err(Error::InvalidInput(format!(
                            "Traffic split references unknown variant: {}",
                            variant
                        )));
                    }
                    if !share.is_finite() || *share < 0.0 {
                        return Err(Error::InvalidInput(format!(
                            "Traffic share for {} must be non-negative",
                            variant
                        )));
                    }
                }
            }
            None => {
                let share = 100.0 / self.variants.len() as f64;
                self.traffic_split = Some(self.variants.iter().map(|v| (v.clone(), share)).collect());
            }
        }

        if self.minimum_sample_size == Some(0) {
            return Err(Error::InvalidInput("minimum_sample_size must be positive".to_string()));
        }
        if let Some(level) = self.confidence_level {
            if !(level > 0.0 && level < 1.0) {
                return Err(Error::InvalidInput(format!(
                    "confidence_level must be within (0, 1), got {}",
                    level
                )));
            }
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_subscriber() -> Subscriber {
        let now = Utc::now();
        Subscriber {
            id: 1,
            email: "jane.doe@example.com".to_string(),
            first_name: None,
            last_name: None,
            subscription_date: now,
            subscription_status: SubscriptionStatus::Active,
            subscription_tier: SubscriptionTier::Basic,
            total_emails_sent: 0,
            total_emails_opened: 0,
            total_clicks: 0,
            last_engagement_date: None,
            engagement_score: 0.0,
            preferred_content_types: Vec::new(),
            risk_tolerance: "moderate".to_string(),
            investment_experience: "intermediate".to_string(),
            portfolio_size: None,
            preferred_send_time: None,
            preferred_frequency: "daily".to_string(),
            device_preference: "desktop".to_string(),
            ai_persona: None,
            content_preferences: None,
            churn_risk_score: 0.0,
            lifetime_value: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_result() -> PersonalizationResult {
        PersonalizationResult {
            id: 1,
            subscriber_id: 1,
            subscriber_email: None,
            content_type: "subject_line".to_string(),
            original_content: None,
            personalized_content: "Markets rally".to_string(),
            personalization_strategy: None,
            ai_model_used: "gpt-4".to_string(),
            ai_prompt_template: None,
            ai_confidence_score: 0.5,
            was_sent: false,
            was_opened: false,
            was_clicked: false,
            engagement_score: 0.0,
            conversion_value: 0.0,
            ab_test_id: None,
            ab_test_variant: None,
            created_at: Utc::now(),
            sent_at: None,
            opened_at: None,
            clicked_at: None,
        }
    }

    fn new_test(variants: &[&str]) -> NewAbTest {
        NewAbTest {
            test_name: "Subject line test".to_string(),
            test_description: None,
            test_type: default_test_type(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
            traffic_split: None,
            target_metric: TargetMetric::OpenRate,
            planned_duration_days: None,
            confidence_level: None,
            minimum_sample_size: None,
            created_by: None,
        }
    }

    #[test]
    fn test_rates_zero_when_nothing_sent() {
        let s = sample_subscriber();
        assert_eq!(s.open_rate(), 0.0);
        assert_eq!(s.click_rate(), 0.0);
    }

    #[test]
    fn test_rates_are_percentages() {
        let mut s = sample_subscriber();
        s.total_emails_sent = 200;
        s.total_emails_opened = 50;
        s.total_clicks = 4;
        assert_eq!(s.open_rate(), 25.0);
        assert_eq!(s.click_rate(), 2.0);
    }

    #[test]
    fn test_full_name_fallbacks() {
        let mut s = sample_subscriber();
        assert_eq!(s.full_name(), "jane.doe");
        s.last_name = Some("Doe".to_string());
        assert_eq!(s.full_name(), "Doe");
        s.first_name = Some("Jane".to_string());
        assert_eq!(s.full_name(), "Jane Doe");
    }

    #[test]
    fn test_target_metric_unknown_falls_back_to_avg_value() {
        assert_eq!(TargetMetric::from_name("click_rate"), TargetMetric::ClickRate);
        assert_eq!(TargetMetric::from_name("revenue"), TargetMetric::AvgValue);

        let parsed: TargetMetric = serde_json::from_str("\"something_else\"").unwrap();
        assert_eq!(parsed, TargetMetric::AvgValue);
        assert_eq!(serde_json::to_string(&TargetMetric::ConversionRate).unwrap(), "\"conversion_rate\"");
    }

    #[test]
    fn test_enum_round_trip_through_str() {
        for tier in SubscriptionTier::ALL {
            assert_eq!(tier.as_str().parse::<SubscriptionTier>().unwrap(), tier);
        }
        assert!("gold".parse::<SubscriptionTier>().is_err());
        assert!("archived".parse::<TestStatus>().is_err());
    }

    #[test]
    fn test_new_subscriber_requires_email() {
        let err = NewSubscriber::default().validate().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let bad = NewSubscriber { email: "not-an-email".to_string(), ..Default::default() };
        assert!(bad.validate().is_err());

        let ok = NewSubscriber { email: "  a@b.com ".to_string(), ..Default::default() };
        assert_eq!(ok.validate().unwrap().email, "a@b.com");
    }

    #[test]
    fn test_activity_rejects_more_opens_than_sends() {
        let mut s = sample_subscriber();
        let now = Utc::now();
        let delta = ActivityDelta { sent: 1, opened: 2, clicked: 0 };
        assert!(matches!(delta.apply(&mut s, now), Err(Error::InvalidInput(_))));
        assert_eq!(s.total_emails_sent, 0, "failed delta must not modify counters");
    }

    #[test]
    fn test_activity_sets_last_engagement_only_on_interaction() {
        let mut s = sample_subscriber();
        let now = Utc::now();

        ActivityDelta { sent: 3, opened: 0, clicked: 0 }.apply(&mut s, now).unwrap();
        assert_eq!(s.total_emails_sent, 3);
        assert!(s.last_engagement_date.is_none());

        ActivityDelta { sent: 0, opened: 1, clicked: 1 }.apply(&mut s, now).unwrap();
        assert_eq!(s.total_emails_opened, 1);
        assert_eq!(s.total_clicks, 1);
        assert_eq!(s.last_engagement_date, Some(now));
    }

    #[test]
    fn test_record_click_implies_open_and_send() {
        let mut r = sample_result();
        let now = Utc::now();
        let t = r.record_event(OutcomeEvent::Clicked, now).unwrap();
        assert!(r.was_sent && r.was_opened && r.was_clicked);
        assert_eq!(t, OutcomeTransition { newly_sent: true, newly_opened: true, newly_clicked: true });

        let later = now + Duration::minutes(5);
        let t = r.record_event(OutcomeEvent::Opened, later).unwrap();
        assert_eq!(t, OutcomeTransition::default());
        assert_eq!(r.opened_at, Some(now), "first open timestamp is kept");
    }

    #[test]
    fn test_record_conversion_validates_value() {
        let mut r = sample_result();
        let now = Utc::now();
        assert!(r.record_event(OutcomeEvent::Converted { value: -1.0 }, now).is_err());

        let t = r.record_event(OutcomeEvent::Converted { value: 49.5 }, now).unwrap();
        assert_eq!(r.conversion_value, 49.5);
        assert_eq!(t.activity().sent, 0);
    }

    #[test]
    fn test_outcome_event_json_shape() {
        let e: OutcomeEvent = serde_json::from_str(r#"{"event":"converted","value":12.0}"#).unwrap();
        assert_eq!(e, OutcomeEvent::Converted { value: 12.0 });
        let e: OutcomeEvent = serde_json::from_str(r#"{"event":"opened"}"#).unwrap();
        assert_eq!(e, OutcomeEvent::Opened);
    }

    #[test]
    fn test_new_ab_test_defaults_even_split() {
        let t = new_test(&["A", "B", "C", "D"]).validate().unwrap();
        let split = t.traffic_split.unwrap();
        assert_eq!(split.len(), 4);
        assert!(split.values().all(|s| (*s - 25.0).abs() < 1e-9));
    }

    #[test]
    fn test_new_ab_test_rejects_bad_variants() {
        assert!(new_test(&[]).validate().is_err());
        assert!(new_test(&["A", "A"]).validate().is_err());
        assert!(new_test(&["A", ""]).validate().is_err());

        let mut t = new_test(&["A", "B"]);
        t.traffic_split = Some([("C".to_string(), 50.0)].into_iter().collect());
        assert!(t.validate().is_err());

        let mut t = new_test(&["A", "B"]);
        t.minimum_sample_size = Some(0);
        assert!(t.validate().is_err());
    }
}
