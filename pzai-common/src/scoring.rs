//! Subscriber engagement and churn scoring
//!
//! Both scores are additive band heuristics over a subscriber's counters.
//! They are pure: the caller decides when to store the result.

use chrono::{DateTime, Utc};

use crate::models::{Subscriber, SubscriptionTier};
use crate::time::days_between;

/// Upper bound of the engagement score
pub const MAX_ENGAGEMENT_SCORE: f64 = 100.0;

/// Upper bound of the churn risk score
pub const MAX_CHURN_RISK: f64 = 1.0;

/// Engagement score in `[0, 100]`
///
/// Sum of four bands: open rate, click rate, recency of last engagement, and
/// subscription tier. The recency band contributes nothing at all when the
/// subscriber has never engaged.
pub fn compute_engagement_score(subscriber: &Subscriber, now: DateTime<Utc>) -> f64 {
    let open_rate = subscriber.open_rate();
    let click_rate = subscriber.click_rate();

    let open_band = if open_rate > 50.0 {
        40.0
    } else if open_rate > 30.0 {
        30.0
    } else if open_rate > 15.0 {
        20.0
    } else {
        10.0
    };

    let click_band = if click_rate > 10.0 {
        30.0
    } else if click_rate > 5.0 {
        20.0
    } else if click_rate > 2.0 {
        15.0
    } else {
        5.0
    };

    let recency_band = match subscriber.last_engagement_date {
        Some(last) => {
            let days = days_between(last, now);
            if days <= 7 {
                20.0
            } else if days <= 30 {
                15.0
            } else if days <= 90 {
                10.0
            } else {
                5.0
            }
        }
        None => 0.0,
    };

    let tier_band = match subscriber.subscription_tier {
        SubscriptionTier::Enterprise => 10.0,
        SubscriptionTier::Premium => 8.0,
        SubscriptionTier::Basic => 5.0,
    };

    f64::min(open_band + click_band + recency_band + tier_band, MAX_ENGAGEMENT_SCORE)
}

/// Churn risk in `[0, 1]`
///
/// Reads the subscriber's stored `engagement_score`; it is not recomputed
/// here, so callers score engagement first.
pub fn compute_churn_risk(subscriber: &Subscriber, now: DateTime<Utc>) -> f64 {
    let mut risk = 0.0;

    if subscriber.engagement_score < 20.0 {
        risk += 0.4;
    } else if subscriber.engagement_score < 40.0 {
        risk += 0.2;
    }

    match subscriber.last_engagement_date {
        Some(last) => {
            let days = days_between(last, now);
            if days > 90 {
                risk += 0.3;
            } else if days > 30 {
                risk += 0.2;
            }
        }
        None => risk += 0.4,
    }

    if subscriber.open_rate() < 10.0 {
        risk += 0.2;
    }
    if subscriber.click_rate() < 1.0 {
        risk += 0.1;
    }

    f64::min(risk, MAX_CHURN_RISK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubscriptionStatus;
    use chrono::Duration;

    fn subscriber(sent: u32, opened: u32, clicks: u32, tier: SubscriptionTier) -> Subscriber {
        let now = Utc::now();
        Subscriber {
            id: 7,
            email: "score@example.com".to_string(),
            first_name: None,
            last_name: None,
            subscription_date: now,
            subscription_status: SubscriptionStatus::Active,
            subscription_tier: tier,
            total_emails_sent: sent,
            total_emails_opened: opened,
            total_clicks: clicks,
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

    #[test]
    fn test_engagement_premium_active_reader() {
        let now = Utc::now();
        let mut s = subscriber(100, 60, 15, SubscriptionTier::Premium);
        s.last_engagement_date = Some(now - Duration::days(3));
        // 40 + 30 + 20 + 8
        assert_eq!(compute_engagement_score(&s, now), 98.0);
    }

    #[test]
    fn test_engagement_never_emailed_basic() {
        let s = subscriber(0, 0, 0, SubscriptionTier::Basic);
        // 10 + 5 + 0 (no recency band) + 5
        assert_eq!(compute_engagement_score(&s, Utc::now()), 20.0);
    }

    #[test]
    fn test_engagement_zero_sends_takes_floor_bands() {
        let now = Utc::now();
        for tier in SubscriptionTier::ALL {
            let mut s = subscriber(0, 0, 0, tier);
            s.last_engagement_date = Some(now);
            let tier_band = match tier {
                SubscriptionTier::Enterprise => 10.0,
                SubscriptionTier::Premium => 8.0,
                SubscriptionTier::Basic => 5.0,
            };
            assert_eq!(compute_engagement_score(&s, now), 10.0 + 5.0 + 20.0 + tier_band);
        }
    }

    #[test]
    fn test_engagement_band_boundaries_are_strict() {
        let now = Utc::now();
        // Exactly 50% opens and 10% clicks land in the lower bands
        let s = subscriber(100, 50, 10, SubscriptionTier::Basic);
        assert_eq!(compute_engagement_score(&s, now), 30.0 + 20.0 + 5.0);

        let s = subscriber(100, 16, 3, SubscriptionTier::Basic);
        assert_eq!(compute_engagement_score(&s, now), 20.0 + 15.0 + 5.0);
    }

    #[test]
    fn test_engagement_recency_bands() {
        let now = Utc::now();
        let cases = [(7, 20.0), (8, 15.0), (30, 15.0), (31, 10.0), (90, 10.0), (91, 5.0), (400, 5.0)];
        for (days, band) in cases {
            let mut s = subscriber(0, 0, 0, SubscriptionTier::Basic);
            s.last_engagement_date = Some(now - Duration::days(days));
            assert_eq!(
                compute_engagement_score(&s, now),
                10.0 + 5.0 + 5.0 + band,
                "recency band for {} days",
                days
            );
        }
    }

    #[test]
    fn test_engagement_maximum_is_100() {
        let now = Utc::now();
        let mut s = subscriber(10, 10, 10, SubscriptionTier::Enterprise);
        s.last_engagement_date = Some(now);
        assert_eq!(compute_engagement_score(&s, now), 100.0);
    }

    #[test]
    fn test_churn_never_engaged_is_capped() {
        let now = Utc::now();
        let mut s = subscriber(0, 0, 0, SubscriptionTier::Basic);
        s.engagement_score = 10.0;
        // 0.4 + 0.4 + 0.2 + 0.1 = 1.1, capped
        assert_eq!(compute_churn_risk(&s, now), 1.0);
    }

    #[test]
    fn test_churn_healthy_subscriber_is_zero() {
        let now = Utc::now();
        let mut s = subscriber(100, 60, 15, SubscriptionTier::Premium);
        s.last_engagement_date = Some(now - Duration::days(2));
        s.engagement_score = 98.0;
        assert_eq!(compute_churn_risk(&s, now), 0.0);
    }

    #[test]
    fn test_churn_mid_engagement_stale_reader() {
        let now = Utc::now();
        let mut s = subscriber(100, 20, 2, SubscriptionTier::Basic);
        s.last_engagement_date = Some(now - Duration::days(45));
        s.engagement_score = 35.0;
        // 0.2 (engagement < 40) + 0.2 (> 30 days)
        assert!((compute_churn_risk(&s, now) - 0.4).abs() < 1e-9);

        s.last_engagement_date = Some(now - Duration::days(120));
        assert!((compute_churn_risk(&s, now) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_churn_uses_stored_engagement_score() {
        let now = Utc::now();
        let mut s = subscriber(100, 60, 15, SubscriptionTier::Premium);
        s.last_engagement_date = Some(now);
        s.engagement_score = 0.0;
        // Stale score still counts even though the counters look healthy
        assert!((compute_churn_risk(&s, now) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_scores_stay_in_range() {
        let now = Utc::now();
        let recencies = [None, Some(0), Some(20), Some(60), Some(365)];
        for sent in [0u32, 1, 10, 1000] {
            for opened in [0u32, 1, 10, 1000] {
                if opened > sent {
                    continue;
                }
                for clicks in [0u32, 1, 50, 5000] {
                    for tier in SubscriptionTier::ALL {
                        for recency in recencies {
                            let mut s = subscriber(sent, opened, clicks, tier);
                            s.last_engagement_date = recency.map(|d| now - Duration::days(d));
                            let e = s.update_engagement_score(now);
                            assert!((0.0..=100.0).contains(&e));
                            let c = s.update_churn_risk(now);
                            assert!((0.0..=1.0).contains(&c));
                        }
                    }
                }
            }
        }
    }
}
