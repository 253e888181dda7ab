//! Percentile-derived project size tiers.
//!
//! Size words like "mega" and "micro" are relative to the live fee
//! distribution, not fixed dollar amounts. Boundaries sit at the 20th, 40th,
//! 60th and 80th percentiles of all positive fees and are refreshed on a long
//! interval so size questions never add per-request load on the store.

use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

// =============================================================================
// Size tiers
// =============================================================================

/// The five fee buckets a project can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SizeTier {
    Micro,
    Small,
    Medium,
    Large,
    Mega,
}

impl SizeTier {
    pub const ALL: [SizeTier; 5] = [
        SizeTier::Micro,
        SizeTier::Small,
        SizeTier::Medium,
        SizeTier::Large,
        SizeTier::Mega,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SizeTier::Micro => "Micro",
            SizeTier::Small => "Small",
            SizeTier::Medium => "Medium",
            SizeTier::Large => "Large",
            SizeTier::Mega => "Mega",
        }
    }

    /// Accepts bare tier words in any case, plus labelled forms such as
    /// "Mega (>$50.0M)" or "mega sized".
    pub fn parse(raw: &str) -> Option<SizeTier> {
        let lowered = raw.trim().to_lowercase();
        SizeTier::ALL
            .into_iter()
            .find(|tier| lowered.starts_with(&tier.as_str().to_lowercase()))
    }
}

impl fmt::Display for SizeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Boundaries
// =============================================================================

/// Fee percentile boundaries for the whole dataset.
///
/// `p20..p80` are the tier cut points; `min_fee`, `max_fee` and
/// `project_count` describe the population they were computed from and are
/// zero for the static fallback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SizeBoundaries {
    pub p20: f64,
    pub p40: f64,
    pub p60: f64,
    pub p80: f64,
    pub min_fee: f64,
    pub max_fee: f64,
    pub project_count: i64,
}

impl SizeBoundaries {
    /// Static boundaries used when the percentile query cannot run.
    pub fn fallback() -> Self {
        SizeBoundaries {
            p20: 100_000.0,
            p40: 1_000_000.0,
            p60: 10_000_000.0,
            p80: 50_000_000.0,
            min_fee: 0.0,
            max_fee: 0.0,
            project_count: 0,
        }
    }

    /// Fee bounds for a tier as `(lower inclusive, upper exclusive)`.
    /// `None` means unbounded on that side.
    pub fn tier_bounds(&self, tier: SizeTier) -> (Option<f64>, Option<f64>) {
        match tier {
            SizeTier::Micro => (None, Some(self.p20)),
            SizeTier::Small => (Some(self.p20), Some(self.p40)),
            SizeTier::Medium => (Some(self.p40), Some(self.p60)),
            SizeTier::Large => (Some(self.p60), Some(self.p80)),
            SizeTier::Mega => (Some(self.p80), None),
        }
    }

    /// Tier for a single fee amount. Non-positive fees have no tier.
    pub fn tier_for_fee(&self, fee: f64) -> Option<SizeTier> {
        if fee <= 0.0 {
            return None;
        }
        let tier = if fee < self.p20 {
            SizeTier::Micro
        } else if fee < self.p40 {
            SizeTier::Small
        } else if fee < self.p60 {
            SizeTier::Medium
        } else if fee < self.p80 {
            SizeTier::Large
        } else {
            SizeTier::Mega
        };
        Some(tier)
    }

    /// Human label with the dollar range baked in, e.g. "Small ($0.1M-$1.0M)".
    pub fn tier_label(&self, tier: SizeTier) -> String {
        let m = |v: f64| format!("{:.1}", v / 1e6);
        match tier {
            SizeTier::Micro => format!("Micro (<${}M)", m(self.p20)),
            SizeTier::Small => format!("Small (${}M-${}M)", m(self.p20), m(self.p40)),
            SizeTier::Medium => format!("Medium (${}M-${}M)", m(self.p40), m(self.p60)),
            SizeTier::Large => format!("Large (${}M-${}M)", m(self.p60), m(self.p80)),
            SizeTier::Mega => format!("Mega (>${}M)", m(self.p80)),
        }
    }

    /// SQL CASE expression mapping a row's fee onto its tier label.
    ///
    /// The spliced thresholds are server-derived numerics, never user input,
    /// so this stays injection-safe without placeholders.
    pub fn case_expression(&self) -> String {
        let fee = r#"CAST(NULLIF("Fee", '') AS NUMERIC)"#;
        format!(
            "CASE WHEN {fee} < {p20} THEN '{micro}' \
             WHEN {fee} < {p40} THEN '{small}' \
             WHEN {fee} < {p60} THEN '{medium}' \
             WHEN {fee} < {p80} THEN '{large}' \
             ELSE '{mega}' END",
            fee = fee,
            p20 = self.p20,
            p40 = self.p40,
            p60 = self.p60,
            p80 = self.p80,
            micro = self.tier_label(SizeTier::Micro),
            small = self.tier_label(SizeTier::Small),
            medium = self.tier_label(SizeTier::Medium),
            large = self.tier_label(SizeTier::Large),
            mega = self.tier_label(SizeTier::Mega),
        )
    }
}

// =============================================================================
// Cache
// =============================================================================

/// Boundaries cached for a fixed interval.
///
/// The percentile scan touches every fee in the table, so it runs at most
/// once per interval and every query in between reuses the cached result.
pub struct SizeTierCache {
    ttl: Duration,
    state: Mutex<Option<(SizeBoundaries, Instant)>>,
}

impl SizeTierCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

    pub fn new(ttl: Duration) -> Self {
        SizeTierCache {
            ttl,
            state: Mutex::new(None),
        }
    }

    /// Cached boundaries if they are still fresh.
    pub fn cached(&self) -> Option<SizeBoundaries> {
        let guard = self.state.lock().ok()?;
        match *guard {
            Some((boundaries, fetched_at)) if fetched_at.elapsed() < self.ttl => Some(boundaries),
            _ => None,
        }
    }

    pub fn store(&self, boundaries: SizeBoundaries) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = Some((boundaries, Instant::now()));
        }
    }

    /// Drop the cached boundaries so the next lookup recomputes, whatever
    /// the interval says.
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = None;
        }
    }
}

impl Default for SizeTierCache {
    fn default() -> Self {
        SizeTierCache::new(SizeTierCache::DEFAULT_TTL)
    }
}

// =============================================================================
// Database refresh
// =============================================================================

#[cfg(feature = "database")]
mod db {
    use bigdecimal::{BigDecimal, ToPrimitive};
    use sqlx::{PgPool, Row};
    use tracing::{debug, warn};

    use super::{SizeBoundaries, SizeTierCache};
    use crate::error::{QueryError, QueryResult};

    /// Percentile scan over every positive fee in the table.
    const PERCENTILE_SQL: &str = r#"
        SELECT
            PERCENTILE_CONT(0.20) WITHIN GROUP (ORDER BY CAST(NULLIF("Fee", '') AS NUMERIC)) as p20,
            PERCENTILE_CONT(0.40) WITHIN GROUP (ORDER BY CAST(NULLIF("Fee", '') AS NUMERIC)) as p40,
            PERCENTILE_CONT(0.60) WITHIN GROUP (ORDER BY CAST(NULLIF("Fee", '') AS NUMERIC)) as p60,
            PERCENTILE_CONT(0.80) WITHIN GROUP (ORDER BY CAST(NULLIF("Fee", '') AS NUMERIC)) as p80,
            MIN(CAST(NULLIF("Fee", '') AS NUMERIC)) as min_fee,
            MAX(CAST(NULLIF("Fee", '') AS NUMERIC)) as max_fee,
            COUNT(*) as total_projects
        FROM "Sample"
        WHERE "Fee" IS NOT NULL
          AND "Fee" != ''
          AND CAST(NULLIF("Fee", '') AS NUMERIC) > 0
    "#;

    impl SizeTierCache {
        /// Fresh-enough cached boundaries, else a recompute from the store.
        ///
        /// A failed or empty scan logs a warning and yields the static
        /// fallback so size questions keep working.
        pub async fn current(&self, pool: &PgPool) -> SizeBoundaries {
            if let Some(boundaries) = self.cached() {
                return boundaries;
            }
            match fetch_boundaries(pool).await {
                Ok(boundaries) => {
                    debug!(
                        p20 = boundaries.p20,
                        p80 = boundaries.p80,
                        projects = boundaries.project_count,
                        "refreshed size tier boundaries"
                    );
                    self.store(boundaries);
                    boundaries
                }
                Err(err) => {
                    warn!(error = %err, "size tier refresh failed, using fallback boundaries");
                    SizeBoundaries::fallback()
                }
            }
        }

        /// Recompute immediately, bypassing the cached interval.
        pub async fn refresh(&self, pool: &PgPool) -> SizeBoundaries {
            self.invalidate();
            self.current(pool).await
        }
    }

    async fn fetch_boundaries(pool: &PgPool) -> QueryResult<SizeBoundaries> {
        let row = sqlx::query(PERCENTILE_SQL)
            .fetch_one(pool)
            .await
            .map_err(|e| QueryError::Execution {
                message: format!("percentile query failed: {e}"),
            })?;

        let percentile = |name: &str| -> QueryResult<f64> {
            row.try_get::<Option<f64>, _>(name)
                .map_err(|e| QueryError::Execution {
                    message: format!("percentile column {name}: {e}"),
                })?
                .ok_or_else(|| QueryError::Execution {
                    message: "fee distribution is empty".to_string(),
                })
        };
        let numeric = |name: &str| -> QueryResult<f64> {
            let value = row.try_get::<Option<BigDecimal>, _>(name).map_err(|e| {
                QueryError::Execution {
                    message: format!("percentile column {name}: {e}"),
                }
            })?;
            Ok(value.and_then(|v| v.to_f64()).unwrap_or(0.0))
        };

        let total: i64 = row.try_get("total_projects").map_err(|e| QueryError::Execution {
            message: format!("percentile column total_projects: {e}"),
        })?;

        Ok(SizeBoundaries {
            p20: percentile("p20")?,
            p40: percentile("p40")?,
            p60: percentile("p60")?,
            p80: percentile("p80")?,
            min_fee: numeric("min_fee")?,
            max_fee: numeric("max_fee")?,
            project_count: total,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tier_words_and_labels() {
        assert_eq!(SizeTier::parse("Mega"), Some(SizeTier::Mega));
        assert_eq!(SizeTier::parse("micro"), Some(SizeTier::Micro));
        assert_eq!(SizeTier::parse("  small  "), Some(SizeTier::Small));
        assert_eq!(SizeTier::parse("Medium ($1.0M-$10.0M)"), Some(SizeTier::Medium));
        assert_eq!(SizeTier::parse("mega sized"), Some(SizeTier::Mega));
        assert_eq!(SizeTier::parse("gigantic"), None);
        assert_eq!(SizeTier::parse(""), None);
    }

    #[test]
    fn fallback_boundaries_bucket_fees() {
        let b = SizeBoundaries::fallback();
        assert_eq!(b.tier_for_fee(50_000.0), Some(SizeTier::Micro));
        assert_eq!(b.tier_for_fee(100_000.0), Some(SizeTier::Small));
        assert_eq!(b.tier_for_fee(5_000_000.0), Some(SizeTier::Medium));
        assert_eq!(b.tier_for_fee(20_000_000.0), Some(SizeTier::Large));
        assert_eq!(b.tier_for_fee(80_000_000.0), Some(SizeTier::Mega));
        assert_eq!(b.tier_for_fee(0.0), None);
        assert_eq!(b.tier_for_fee(-5.0), None);
    }

    #[test]
    fn tier_bounds_partition_the_fee_axis() {
        let b = SizeBoundaries::fallback();
        assert_eq!(b.tier_bounds(SizeTier::Micro), (None, Some(100_000.0)));
        assert_eq!(
            b.tier_bounds(SizeTier::Medium),
            (Some(1_000_000.0), Some(10_000_000.0))
        );
        assert_eq!(b.tier_bounds(SizeTier::Mega), (Some(50_000_000.0), None));
    }

    #[test]
    fn labels_render_in_millions() {
        let b = SizeBoundaries::fallback();
        assert_eq!(b.tier_label(SizeTier::Micro), "Micro (<$0.1M)");
        assert_eq!(b.tier_label(SizeTier::Small), "Small ($0.1M-$1.0M)");
        assert_eq!(b.tier_label(SizeTier::Mega), "Mega (>$50.0M)");
    }

    #[test]
    fn case_expression_covers_every_tier_label() {
        let b = SizeBoundaries::fallback();
        let case = b.case_expression();
        for tier in SizeTier::ALL {
            assert!(case.contains(&b.tier_label(tier)), "missing {tier}");
        }
        assert!(case.starts_with("CASE WHEN"));
        assert!(case.ends_with("END"));
    }

    #[test]
    fn cache_expires_after_ttl() {
        let cache = SizeTierCache::new(Duration::from_secs(0));
        cache.store(SizeBoundaries::fallback());
        assert_eq!(cache.cached(), None);

        let cache = SizeTierCache::new(Duration::from_secs(3600));
        assert_eq!(cache.cached(), None);
        cache.store(SizeBoundaries::fallback());
        assert_eq!(cache.cached(), Some(SizeBoundaries::fallback()));
    }

    #[test]
    fn invalidation_forces_the_next_lookup_to_recompute() {
        let cache = SizeTierCache::new(Duration::from_secs(3600));
        cache.store(SizeBoundaries::fallback());
        assert!(cache.cached().is_some());

        cache.invalidate();
        assert_eq!(cache.cached(), None);
    }
}
