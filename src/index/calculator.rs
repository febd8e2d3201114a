//! Index calculation.
//!
//! Turns a window aggregate into the published statistic (median of the
//! pooled sample, 4 dp) and the full audit record.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use crate::domain::{CalculationResult, MarketConfig, Methodology, SummaryStats};
use crate::error::AppError;
use crate::index::window::{WindowAggregate, WindowAggregator};
use crate::io::store::ObservationStore;
use crate::math::{self, round4};

/// Reason recorded when the pooled sample is empty.
pub const NO_VALID_OBSERVATIONS: &str = "no valid observations in window";

pub struct IndexCalculator<'a, S: ObservationStore + ?Sized> {
    store: &'a S,
    methodology: &'a Methodology,
}

impl<'a, S: ObservationStore + ?Sized> IndexCalculator<'a, S> {
    pub fn new(store: &'a S, methodology: &'a Methodology) -> Self {
        Self { store, methodology }
    }

    pub fn methodology(&self) -> &Methodology {
        self.methodology
    }

    /// Calculate the index for the window ending at `end_date`, stamped now.
    pub fn calculate(&self, market: &MarketConfig, end_date: NaiveDate) -> Result<CalculationResult, AppError> {
        self.calculate_at(market, end_date, Utc::now())
    }

    /// As `calculate`, with an explicit computation timestamp.
    ///
    /// Identical stored inputs and timestamp give an identical result.
    pub fn calculate_at(
        &self,
        market: &MarketConfig,
        end_date: NaiveDate,
        calculated_utc: DateTime<Utc>,
    ) -> Result<CalculationResult, AppError> {
        let aggregate = WindowAggregator::new(self.store, self.methodology).aggregate(market, end_date)?;
        let result = build_result(market, end_date, self.methodology, aggregate, calculated_utc);

        match result.index_value {
            None => warn!(market = %market.id, %end_date, "no valid observations in window"),
            Some(value) => info!(
                market = %market.id,
                %end_date,
                value,
                n = result.n_observations,
                valid_days = result.valid_days,
                low_confidence = result.low_confidence,
                "index calculated"
            ),
        }
        Ok(result)
    }
}

fn build_result(
    market: &MarketConfig,
    end_date: NaiveDate,
    methodology: &Methodology,
    aggregate: WindowAggregate,
    calculated_utc: DateTime<Utc>,
) -> CalculationResult {
    let WindowAggregate {
        pooled,
        daily,
        valid_days,
    } = aggregate;

    let index_value = math::median(&pooled).map(round4);
    let (low_confidence, low_confidence_reason) = match index_value {
        None => (true, Some(NO_VALID_OBSERVATIONS.to_string())),
        Some(_) if valid_days < methodology.min_valid_days => (
            true,
            Some(format!(
                "only {valid_days} valid days in {}-day window",
                methodology.window_days
            )),
        ),
        Some(_) => (false, None),
    };

    CalculationResult {
        methodology_version: methodology.version.clone(),
        index_name: market.index_name.clone(),
        market_id: market.id.clone(),
        end_date,
        window_days: methodology.window_days,
        parameters: methodology.parameters(),
        index_value,
        n_observations: pooled.len(),
        valid_days,
        low_confidence,
        low_confidence_reason,
        summary: summarize(&pooled),
        daily,
        methodology: methodology.describe(),
        calculated_utc,
    }
}

fn summarize(pooled: &[f64]) -> Option<SummaryStats> {
    Some(SummaryStats {
        min: round4(math::min(pooled)?),
        max: round4(math::max(pooled)?),
        mean: round4(math::mean(pooled)?),
        stdev: math::sample_stdev(pooled).map(round4),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DayStatus, MarketRegistry};
    use crate::io::store::MemoryStore;
    use chrono::TimeZone;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn h100() -> MarketConfig {
        MarketRegistry::builtin().get("h100-sxm-us").unwrap().clone()
    }

    fn split_day() -> Vec<f64> {
        let mut v = vec![2.0; 5];
        v.extend([2.2; 5]);
        v
    }

    #[test]
    fn all_missing_is_not_publishable() {
        let market = h100();
        let m = Methodology::v1_1();
        let store = MemoryStore::new();

        let r = IndexCalculator::new(&store, &m).calculate(&market, date(7)).unwrap();
        assert_eq!(r.index_value, None);
        assert!(r.low_confidence);
        assert_eq!(r.low_confidence_reason.as_deref(), Some(NO_VALID_OBSERVATIONS));
        assert!(r.summary.is_none());
        assert!(!r.is_publishable());
        assert_eq!(r.days_with_status(DayStatus::Missing), 7);
    }

    #[test]
    fn four_of_seven_days_is_confident() {
        let market = h100();
        let m = Methodology::v1_1();
        let mut store = MemoryStore::new();
        for d in [1, 3, 5, 7] {
            store.insert(&market.id, date(d), &split_day());
        }

        let r = IndexCalculator::new(&store, &m).calculate(&market, date(7)).unwrap();
        assert_eq!(r.index_value, Some(2.1));
        assert!(!r.low_confidence);
        assert!(r.low_confidence_reason.is_none());
        assert_eq!(r.valid_days, 4);
        assert_eq!(r.n_observations, 40);
        assert_eq!(r.days_with_status(DayStatus::Missing), 3);

        let s = r.summary.unwrap();
        assert_eq!(s.min, 2.0);
        assert_eq!(s.max, 2.2);
        assert_eq!(s.mean, 2.1);
        assert_eq!(s.stdev, Some(0.1013));
    }

    #[test]
    fn too_few_valid_days_is_low_confidence_but_valued() {
        let market = h100();
        let m = Methodology::v1_1();
        let mut store = MemoryStore::new();
        store.insert(&market.id, date(6), &split_day());
        store.insert(&market.id, date(7), &split_day());

        let r = IndexCalculator::new(&store, &m).calculate(&market, date(7)).unwrap();
        assert_eq!(r.index_value, Some(2.1));
        assert!(r.low_confidence);
        assert_eq!(r.low_confidence_reason.as_deref(), Some("only 2 valid days in 7-day window"));
        assert!(r.is_publishable());
    }

    #[test]
    fn single_pooled_value_has_no_stdev() {
        let market = h100();
        let m = Methodology::v1_1().with_min_observations_per_day(1);
        let mut store = MemoryStore::new();
        store.insert(&market.id, date(7), &[1.23456]);

        let r = IndexCalculator::new(&store, &m).calculate(&market, date(7)).unwrap();
        assert_eq!(r.index_value, Some(1.2346));
        assert_eq!(r.summary.unwrap().stdev, None);
    }

    #[test]
    fn identical_inputs_give_identical_records() {
        let market = h100();
        let m = Methodology::v1_1();
        let mut store = MemoryStore::new();
        for d in 1..=7 {
            store.insert(&market.id, date(d), &[1.7, 1.8, 1.81, 1.83, 1.9, 1.95, 2.0, 2.05, 1.77, 1.86, 6.0]);
        }
        let at = Utc.with_ymd_and_hms(2026, 3, 8, 12, 0, 0).unwrap();
        let calc = IndexCalculator::new(&store, &m);

        let a = serde_json::to_string(&calc.calculate_at(&market, date(7), at).unwrap()).unwrap();
        let b = serde_json::to_string(&calc.calculate_at(&market, date(7), at).unwrap()).unwrap();
        assert_eq!(a, b);

        // Only the timestamp differs between unpinned runs.
        let mut c = calc.calculate(&market, date(7)).unwrap();
        c.calculated_utc = at;
        assert_eq!(serde_json::to_string(&c).unwrap(), a);
    }

    #[test]
    fn unreadable_day_file_does_not_abort_the_window() {
        use crate::io::snapshot::csv_path;
        use crate::io::store::FsObservationStore;

        let market = h100();
        let m = Methodology::v1_1();
        let tmp = tempfile::tempdir().unwrap();
        let store = FsObservationStore::new(tmp.path());
        let dir = store.market_dir(&market);
        std::fs::create_dir_all(&dir).unwrap();

        let mut good = String::from("listing_id,dph_per_gpu\n");
        for p in split_day() {
            good.push_str(&format!("x,{p}\n"));
        }
        for d in 1..=6 {
            std::fs::write(csv_path(&dir, date(d)), &good).unwrap();
        }
        std::fs::write(csv_path(&dir, date(7)), b"listing_id,dph_\xffper_gpu\nx,2.0\n").unwrap();

        let r = IndexCalculator::new(&store, &m).calculate(&market, date(7)).unwrap();
        assert_eq!(r.index_value, Some(2.1));
        assert_eq!(r.valid_days, 6);
        assert_eq!(r.daily[6].status, DayStatus::Missing);
    }

    #[test]
    fn result_records_methodology() {
        let market = h100();
        let m = Methodology::v1_1().with_window(14);
        let store = MemoryStore::new();

        let r = IndexCalculator::new(&store, &m).calculate(&market, date(20)).unwrap();
        assert_eq!(r.methodology_version, "1.1.0");
        assert_eq!(r.window_days, 14);
        assert_eq!(r.daily.len(), 14);
        assert_eq!(r.parameters.outlier_sigma, 2.5);
        assert_eq!(r.index_name, "CRI-H100");
    }
}
