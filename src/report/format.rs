//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the engine stays free of presentation concerns
//! - output changes are localized

use std::path::Path;

use crate::domain::{CalculationResult, DailySummary, DayStatus, MarketRegistry};
use crate::index::verify::{VerificationReport, VerifyOutcome};
use crate::io::store::IntegrityStatus;

/// Calculation summary: value, confidence, and the per-day table.
pub fn format_calculation(result: &CalculationResult, series: Option<&Path>, audit: Option<&Path>) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "=== {} Calculation - window ending {} ===\n",
        result.index_name, result.end_date
    ));
    out.push_str(&format!("Market: {} | {}\n", result.market_id, result.methodology));
    out.push('\n');
    out.push_str(&format_daily_table(&result.daily));
    out.push('\n');

    match result.index_value {
        None => {
            out.push_str("ERROR: No valid observations. Cannot publish.\n");
            return out;
        }
        Some(value) => {
            out.push_str(&format!("  Index value:    ${value:.4} / GPU-hour\n"));
        }
    }
    out.push_str(&format!("  Observations:   {}\n", result.n_observations));
    out.push_str(&format!("  Valid days:     {} / {}\n", result.valid_days, result.window_days));
    if let Some(s) = &result.summary {
        out.push_str(&format!(
            "  Range:          ${:.4} .. ${:.4} | mean ${:.4} | stdev {}\n",
            s.min,
            s.max,
            s.mean,
            s.stdev.map(|v| format!("{v:.4}")).unwrap_or_else(|| "-".to_string())
        ));
    }
    if result.low_confidence {
        out.push_str(&format!(
            "  WARNING: LOW CONFIDENCE - {}\n",
            result.low_confidence_reason.as_deref().unwrap_or("unspecified")
        ));
    }
    if let Some(path) = series {
        out.push_str(&format!("  Index updated:  {}\n", path.display()));
    }
    if let Some(path) = audit {
        out.push_str(&format!("  Audit trail:    {}\n", path.display()));
    }

    out
}

/// One line per window day.
pub fn format_daily_table(daily: &[DailySummary]) -> String {
    let mut out = String::new();
    for d in daily {
        let line = match d.status {
            DayStatus::Missing => format!("  {}: MISSING\n", d.date),
            DayStatus::LowConfidence => format!("  {}: LOW CONFIDENCE ({} obs)\n", d.date, d.n_raw),
            DayStatus::EmptyAfterFilter => format!(
                "  {}: EMPTY after outlier removal ({} obs, {} removed)\n",
                d.date, d.n_raw, d.n_removed
            ),
            DayStatus::Included => format!(
                "  {}: {} obs -> {} after outlier removal ({} removed), median ${:.4}\n",
                d.date,
                d.n_raw,
                d.n_used,
                d.n_removed,
                d.median.unwrap_or(f64::NAN)
            ),
        };
        out.push_str(&line);
    }
    out
}

pub fn format_verification(report: &VerificationReport) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "Reproducing {} - window ending {}\n",
        report.index_name, report.end_date
    ));
    out.push_str(&"-".repeat(52));
    out.push('\n');
    out.push_str(&format_daily_table(&report.result.daily));
    out.push('\n');

    match report.reproduced {
        Some(v) => out.push_str(&format!("  Reproduced value: ${v:.4}\n")),
        None => out.push_str("  Reproduced value: (no valid observations)\n"),
    }
    match report.published {
        Some(v) => out.push_str(&format!("  Published value:  ${v:.4}\n")),
        None => out.push_str("  Published value:  NOT FOUND\n"),
    }
    out.push('\n');

    let verdict = match report.outcome {
        VerifyOutcome::Match if report.is_suspicious() => {
            "  MATCH (SUSPICIOUS) - value reproduced but stored data failed the integrity check".to_string()
        }
        VerifyOutcome::Match => format!(
            "  MATCH - {} = ${:.4} independently verified.",
            report.index_name,
            report.reproduced.unwrap_or(f64::NAN)
        ),
        VerifyOutcome::Mismatch { difference } => {
            format!("  MISMATCH - Difference: ${difference:.6}")
        }
        VerifyOutcome::NotFound => format!("  NOT FOUND - no published value for {}.", report.end_date),
        VerifyOutcome::NoData => "  NO DATA - cannot reproduce index value.".to_string(),
    };
    out.push_str(&verdict);
    out.push('\n');

    if report.integrity_checked() {
        out.push_str(&format!(
            "\n  Integrity: {} suspect day(s)\n",
            report.suspect_days
        ));
        for day in &report.integrity {
            let status = match &day.integrity {
                IntegrityStatus::Verified => "verified".to_string(),
                IntegrityStatus::Missing => "missing".to_string(),
                IntegrityStatus::NoRecordedHash => "no recorded hash".to_string(),
                IntegrityStatus::Tampered { recorded, actual } => {
                    format!("TAMPERED (recorded {}, actual {})", short(recorded), short(actual))
                }
            };
            out.push_str(&format!("    {}: {status}\n", day.date));
        }
    }

    if !report.warnings.is_empty() {
        out.push('\n');
        for w in &report.warnings {
            out.push_str(&format!("  WARNING: {w}\n"));
        }
    }

    out
}

/// Compact table for a whole published series.
pub fn format_series_verification(index_name: &str, reports: &[VerificationReport]) -> String {
    let mut out = String::new();
    out.push_str(&format!("Verifying published {index_name} series ({} rows)\n", reports.len()));
    out.push_str(&format!(
        "{:<12} {:>10} {:>10} {:<10} {:>7}\n",
        "end_date", "published", "reproduced", "outcome", "suspect"
    ));
    for r in reports {
        out.push_str(&format!(
            "{:<12} {:>10} {:>10} {:<10} {:>7}\n",
            r.end_date.to_string(),
            fmt_opt(r.published),
            fmt_opt(r.reproduced),
            r.outcome.label(),
            r.suspect_days
        ));
    }
    let ok = reports.iter().filter(|r| r.is_success()).count();
    out.push_str(&format!("\n{ok}/{} verified cleanly\n", reports.len()));
    out
}

pub fn format_markets(registry: &MarketRegistry) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<14} {:<15} {:<11} {:<4} {:>8} {:>5}\n",
        "id", "index", "gpu", "geo", "min_rel", "gpus"
    ));
    for m in registry.iter() {
        let marker = if m.primary { " *" } else { "" };
        out.push_str(&format!(
            "{:<14} {:<15} {:<11} {:<4} {:>8.2} {:>5}{marker}\n",
            m.id, m.index_name, m.gpu_name, m.geography, m.min_reliability, m.min_gpus
        ));
    }
    out
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.4}")).unwrap_or_else(|| "-".to_string())
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MarketRegistry, Methodology};
    use crate::index::{IndexCalculator, PublishedValue, Verifier, VerifyOptions};
    use crate::io::store::MemoryStore;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn calculation_lists_every_day_and_warning() {
        let reg = MarketRegistry::builtin();
        let market = reg.get("h100-sxm-us").unwrap();
        let m = Methodology::v1_1();
        let mut store = MemoryStore::new();
        store.insert(&market.id, date(7), &[1.9; 12]);
        store.insert(&market.id, date(6), &[1.9; 3]);

        let r = IndexCalculator::new(&store, &m).calculate(market, date(7)).unwrap();
        let text = format_calculation(&r, None, None);
        assert!(text.contains("2026-03-01: MISSING"));
        assert!(text.contains("2026-03-06: LOW CONFIDENCE (3 obs)"));
        assert!(text.contains("Index value:    $1.9000"));
        assert!(text.contains("WARNING: LOW CONFIDENCE"));
    }

    #[test]
    fn empty_pool_says_cannot_publish() {
        let reg = MarketRegistry::builtin();
        let market = reg.get("h100-sxm-us").unwrap();
        let m = Methodology::v1_1();
        let store = MemoryStore::new();
        let r = IndexCalculator::new(&store, &m).calculate(market, date(7)).unwrap();
        assert!(format_calculation(&r, None, None).contains("Cannot publish"));
    }

    #[test]
    fn suspicious_match_is_distinct() {
        let reg = MarketRegistry::builtin();
        let market = reg.get("h100-sxm-us").unwrap();
        let m = Methodology::v1_1();
        let day = [1.96, 1.97, 1.98, 1.99, 2.0, 2.0, 2.01, 2.02, 2.03, 2.04];
        let mut store = MemoryStore::new();
        for d in 5..=7 {
            store.insert(&market.id, date(d), &day);
        }
        let published = IndexCalculator::new(&store, &m)
            .calculate(market, date(7))
            .unwrap()
            .index_value
            .unwrap();
        let mut reordered = day;
        reordered.reverse();
        store.replace_unrecorded(&market.id, date(6), &reordered);

        let report = Verifier::new(&store, &m)
            .verify_with(
                market,
                date(7),
                Some(PublishedValue::bare(published)),
                VerifyOptions { check_integrity: true },
            )
            .unwrap();
        let text = format_verification(&report);
        assert!(text.contains("MATCH (SUSPICIOUS)"));
        assert!(text.contains("TAMPERED"));
        assert!(text.contains("WARNING:"));
    }

    #[test]
    fn markets_table_marks_primary() {
        let text = format_markets(&MarketRegistry::builtin());
        let h100 = text.lines().find(|l| l.starts_with("h100-sxm-us")).unwrap();
        assert!(h100.ends_with('*'));
    }
}
