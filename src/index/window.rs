//! Trailing-window aggregation.
//!
//! Walks the window oldest-first, admits or rejects each day, filters
//! outliers per day, and pools the survivors. Absent or thin days are
//! recorded in the daily summaries and never stop the walk.

use chrono::{Days, NaiveDate};
use tracing::debug;

use crate::domain::{DailySummary, DayStatus, MAX_WINDOW_DAYS, MarketConfig, Methodology};
use crate::error::AppError;
use crate::index::outlier::OutlierFilter;
use crate::io::store::ObservationStore;
use crate::math::{self, round4};

/// Output of one window walk.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowAggregate {
    /// Cleaned observations of every included day.
    pub pooled: Vec<f64>,
    /// One summary per date, chronological.
    pub daily: Vec<DailySummary>,
    pub valid_days: usize,
}

/// Dates `end_date - (window_days - 1) ..= end_date`, oldest first.
///
/// Fails for windows longer than `MAX_WINDOW_DAYS` or reaching before the
/// earliest representable date.
pub fn window_dates(end_date: NaiveDate, window_days: u32) -> Result<Vec<NaiveDate>, AppError> {
    if window_days > MAX_WINDOW_DAYS {
        return Err(AppError::input(format!(
            "Window of {window_days} days exceeds the maximum of {MAX_WINDOW_DAYS}."
        )));
    }
    (0..u64::from(window_days))
        .rev()
        .map(|back| {
            end_date.checked_sub_days(Days::new(back)).ok_or_else(|| {
                AppError::input(format!("{window_days}-day window ending {end_date} is out of date range."))
            })
        })
        .collect()
}

pub struct WindowAggregator<'a, S: ObservationStore + ?Sized> {
    store: &'a S,
    methodology: &'a Methodology,
}

impl<'a, S: ObservationStore + ?Sized> WindowAggregator<'a, S> {
    pub fn new(store: &'a S, methodology: &'a Methodology) -> Self {
        Self { store, methodology }
    }

    pub fn aggregate(&self, market: &MarketConfig, end_date: NaiveDate) -> Result<WindowAggregate, AppError> {
        let filter = OutlierFilter::from_methodology(self.methodology);
        let mut pooled = Vec::new();
        let dates = window_dates(end_date, self.methodology.window_days)?;
        let mut daily = Vec::with_capacity(dates.len());
        let mut valid_days = 0usize;

        for date in dates {
            let summary = match self.store.read(market, date)? {
                None => DailySummary::missing(date),
                Some(set) if set.len() < self.methodology.min_observations_per_day => {
                    DailySummary::excluded(date, DayStatus::LowConfidence, set.len(), 0)
                }
                Some(set) => {
                    let raw = set.prices();
                    let cleaned = filter.clean(&raw);
                    if cleaned.kept.is_empty() {
                        DailySummary::excluded(date, DayStatus::EmptyAfterFilter, raw.len(), cleaned.removed)
                    } else {
                        let summary = DailySummary {
                            date,
                            status: DayStatus::Included,
                            n_raw: raw.len(),
                            n_removed: cleaned.removed,
                            n_used: cleaned.kept.len(),
                            median: math::median(&cleaned.kept).map(round4),
                            mean: math::mean(&cleaned.kept).map(round4),
                        };
                        pooled.extend_from_slice(&cleaned.kept);
                        valid_days += 1;
                        summary
                    }
                }
            };

            debug!(
                market = %market.id,
                %date,
                status = summary.status.label(),
                n_raw = summary.n_raw,
                n_used = summary.n_used,
                "window day"
            );
            daily.push(summary);
        }

        Ok(WindowAggregate {
            pooled,
            daily,
            valid_days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MarketRegistry;
    use crate::io::store::MemoryStore;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn window_dates_are_chronological() {
        let dates = window_dates(date(7), 7).unwrap();
        assert_eq!(dates.first(), Some(&date(1)));
        assert_eq!(dates.last(), Some(&date(7)));
        assert_eq!(dates.len(), 7);

        let across_month = window_dates(date(2), 3).unwrap();
        assert_eq!(across_month[0], NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());
        assert!(window_dates(date(2), 0).unwrap().is_empty());
    }

    #[test]
    fn oversized_or_out_of_range_windows_are_input_errors() {
        let err = window_dates(date(7), 200_000_000).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::exit::INPUT);
        assert!(window_dates(date(7), MAX_WINDOW_DAYS).is_ok());
        assert!(window_dates(date(7), MAX_WINDOW_DAYS + 1).is_err());

        let first = NaiveDate::MIN + Days::new(2);
        assert!(window_dates(first, 3).is_ok());
        assert!(window_dates(first, 4).is_err());

        let reg = MarketRegistry::builtin();
        let market = reg.get("h100-sxm-us").unwrap();
        let m = Methodology::v1_1().with_window(u32::MAX);
        let store = MemoryStore::new();
        assert!(WindowAggregator::new(&store, &m).aggregate(market, date(7)).is_err());
    }

    #[test]
    fn day_emptied_by_the_filter_adds_nothing() {
        let reg = MarketRegistry::builtin();
        let market = reg.get("h100-sxm-us").unwrap();
        let mut m = Methodology::v1_1().with_window(2);
        m.outlier_sigma = 0.01;
        let mut store = MemoryStore::new();

        // Trimmed mean 1.5, every value 0.5 away; threshold is far smaller.
        store.insert(&market.id, date(6), &[1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
        store.insert(&market.id, date(7), &[1.9; 10]);

        let agg = WindowAggregator::new(&store, &m).aggregate(market, date(7)).unwrap();
        let emptied = &agg.daily[0];
        assert_eq!(emptied.status, DayStatus::EmptyAfterFilter);
        assert_eq!(emptied.n_raw, 10);
        assert_eq!(emptied.n_removed, emptied.n_raw);
        assert_eq!(emptied.n_used, 0);
        assert_eq!(emptied.median, None);

        assert_eq!(agg.daily[1].status, DayStatus::Included);
        assert_eq!(agg.valid_days, 1);
        assert_eq!(agg.pooled, vec![1.9; 10]);
    }

    #[test]
    fn statuses_per_day() {
        let reg = MarketRegistry::builtin();
        let market = reg.get("h100-sxm-us").unwrap();
        let m = Methodology::v1_1().with_window(4);
        let mut store = MemoryStore::new();

        // 1: missing; 2: thin; 3: included; 4: included with a spike removed
        store.insert(&market.id, date(2), &[1.9; 9]);
        store.insert(&market.id, date(3), &[1.8, 1.85, 1.9, 1.95, 2.0, 1.8, 1.85, 1.9, 1.95, 2.0]);
        let mut spiky = vec![1.0; 10];
        spiky.push(100.0);
        store.insert(&market.id, date(4), &spiky);

        let agg = WindowAggregator::new(&store, &m).aggregate(market, date(4)).unwrap();
        let statuses: Vec<DayStatus> = agg.daily.iter().map(|d| d.status).collect();
        assert_eq!(
            statuses,
            vec![DayStatus::Missing, DayStatus::LowConfidence, DayStatus::Included, DayStatus::Included]
        );
        assert_eq!(agg.valid_days, 2);
        assert_eq!(agg.pooled.len(), 20);
        assert_eq!(agg.daily[1].n_raw, 9);
        assert_eq!(agg.daily[1].n_used, 0);
        assert_eq!(agg.daily[2].median, Some(1.9));
        assert_eq!(agg.daily[3].n_removed, 1);
        assert_eq!(agg.daily[3].mean, Some(1.0));
    }

    #[test]
    fn all_missing_yields_empty_pool() {
        let reg = MarketRegistry::builtin();
        let market = reg.get("a100-sxm-us").unwrap();
        let m = Methodology::v1_1();
        let store = MemoryStore::new();

        let agg = WindowAggregator::new(&store, &m).aggregate(market, date(7)).unwrap();
        assert!(agg.pooled.is_empty());
        assert_eq!(agg.valid_days, 0);
        assert!(agg.daily.iter().all(|d| d.status == DayStatus::Missing));
    }
}
