use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Category, Review};

const SERIES_MONTHS: u32 = 6;

/// Totals for one author's reviews
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorStats {
    pub total_reviews: u64,
    pub total_upvotes: u64,
    pub total_downvotes: u64,
    pub by_category: BTreeMap<Category, u64>,
}

impl AuthorStats {
    pub fn compute(reviews: &[Review], author_id: &str) -> Self {
        let mut stats = Self::default();
        for review in reviews.iter().filter(|r| r.author_id == author_id) {
            stats.total_reviews += 1;
            stats.total_upvotes += review.upvotes;
            stats.total_downvotes += review.downvotes;
            *stats.by_category.entry(review.category).or_insert(0) += 1;
        }
        stats
    }
}

/// Rating-derived tone buckets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToneCounts {
    pub positive: u64,
    pub neutral: u64,
    pub negative: u64,
}

impl ToneCounts {
    /// Every rating lands in a bucket; used for the monthly series
    fn record(&mut self, rating: f64) {
        if rating >= 4.0 {
            self.positive += 1;
        } else if rating <= 2.0 {
            self.negative += 1;
        } else {
            self.neutral += 1;
        }
    }

    /// Site-wide headline counts: only an exact 3 is neutral, so 2.5 and 3.5
    /// are left out of all three totals
    fn record_headline(&mut self, rating: f64) {
        if rating >= 4.0 {
            self.positive += 1;
        } else if rating <= 2.0 {
            self.negative += 1;
        } else if rating == 3.0 {
            self.neutral += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyTone {
    /// First day of the month
    pub month: NaiveDate,
    pub counts: ToneCounts,
}

/// Site-wide figures for the admin dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_reviews: u64,
    /// Headline buckets; may sum to less than `total_reviews`
    pub tone: ToneCounts,
    /// The last six calendar months ending with the month of `now`, oldest first
    pub monthly: Vec<MonthlyTone>,
}

impl DashboardStats {
    pub fn compute(reviews: &[Review], now: DateTime<Utc>) -> Self {
        let mut tone = ToneCounts::default();
        for review in reviews {
            tone.record_headline(review.rating);
        }

        let current = month_index(now.year(), now.month());
        let first = current - (SERIES_MONTHS as i64 - 1);
        let mut monthly: Vec<MonthlyTone> = (first..=current)
            .filter_map(|idx| {
                let (year, month) = month_from_index(idx);
                NaiveDate::from_ymd_opt(year, month, 1).map(|month| MonthlyTone {
                    month,
                    counts: ToneCounts::default(),
                })
            })
            .collect();

        for review in reviews {
            let idx = month_index(review.created_at.year(), review.created_at.month());
            if (first..=current).contains(&idx) {
                if let Some(slot) = monthly.get_mut((idx - first) as usize) {
                    slot.counts.record(review.rating);
                }
            }
        }

        Self {
            total_reviews: reviews.len() as u64,
            tone,
            monthly,
        }
    }
}

fn month_index(year: i32, month: u32) -> i64 {
    year as i64 * 12 + (month as i64 - 1)
}

fn month_from_index(idx: i64) -> (i32, u32) {
    (idx.div_euclid(12) as i32, idx.rem_euclid(12) as u32 + 1)
}
