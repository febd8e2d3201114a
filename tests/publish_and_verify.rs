//! End to end over the filesystem store: import, publish, verify, tamper.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use cri_index::app::pipeline::{self, CalculateOptions, VerifyRequest};
use cri_index::config::Settings;
use cri_index::domain::MarketRegistry;
use cri_index::error::exit;
use cri_index::index::VerifyOutcome;
use cri_index::io::{DuplicatePolicy, IntegrityStatus, read_audit};

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 4, d).unwrap()
}

fn settings(root: &Path) -> Settings {
    Settings {
        data_dir: root.join("data"),
        output_dir: root.join("outputs"),
        markets_file: None,
    }
}

fn request(end: NaiveDate) -> VerifyRequest {
    VerifyRequest {
        end_date: end,
        value: None,
        window: None,
        check_integrity: true,
    }
}

#[test]
fn published_value_is_reproducible_until_data_changes() {
    let dir = tempfile::tempdir().unwrap();
    let s = settings(dir.path());
    let reg = MarketRegistry::builtin();
    let market = reg.get("a100-sxm-us").unwrap();

    let input = dir.path().join("prices.csv");
    fs::write(
        &input,
        "listing_id,dph_per_gpu\n\
         a,1.10\nb,1.12\nc,1.15\nd,1.18\ne,1.20\nf,1.21\ng,1.25\nh,1.28\ni,1.30\nj,1.31\nk,0.05\n",
    )
    .unwrap();
    for d in 1..=7 {
        pipeline::run_import(&s, market, date(d), &input, false).unwrap();
    }

    let run = pipeline::run_calculation(
        &s,
        market,
        &CalculateOptions {
            end_date: date(7),
            window: None,
            min_valid_days: None,
            policy: DuplicatePolicy::Reject,
            dry_run: false,
        },
    )
    .unwrap();
    let value = run.result.index_value.unwrap();
    assert_eq!(value, 1.205);
    assert_eq!(run.result.valid_days, 7);
    assert!(!run.result.low_confidence);

    let audit = read_audit(run.audit_path.as_deref().unwrap()).unwrap();
    assert_eq!(audit, run.result);

    let clean = pipeline::run_verification(&s, market, &request(date(7))).unwrap();
    assert_eq!(clean.outcome, VerifyOutcome::Match);
    assert_eq!(clean.exit_code(), 0);
    assert!(clean.integrity.iter().all(|d| d.integrity == IntegrityStatus::Verified));

    // Swap two rows on day 4: same prices, different bytes.
    let day4 = s.data_dir.join(&market.data_subdir).join("2026-04-04.csv");
    let text = fs::read_to_string(&day4).unwrap();
    let mut lines: Vec<&str> = text.lines().collect();
    lines.swap(1, 2);
    fs::write(&day4, lines.join("\n") + "\n").unwrap();

    let suspect = pipeline::run_verification(&s, market, &request(date(7))).unwrap();
    assert_eq!(suspect.outcome, VerifyOutcome::Match);
    assert_eq!(suspect.suspect_days, 1);
    assert_eq!(suspect.exit_code(), exit::SUSPECT);

    // Change a price on day 5: the value moves and verification fails.
    let day5 = s.data_dir.join(&market.data_subdir).join("2026-04-05.csv");
    let text = fs::read_to_string(&day5).unwrap();
    let edited: String = text
        .lines()
        .map(|l| if l.starts_with("a,") { l.replacen("1.1,", "1.2,", 1) } else { l.to_string() })
        .chain(["l,1.40,2026-04-05T00:00:00+00:00".to_string()])
        .map(|l| l + "\n")
        .collect();
    fs::write(&day5, edited).unwrap();

    let broken = pipeline::run_verification(&s, market, &request(date(7))).unwrap();
    assert!(matches!(broken.outcome, VerifyOutcome::Mismatch { .. }));
    assert_eq!(broken.exit_code(), exit::MISMATCH);
    assert_eq!(broken.suspect_days, 2);
}

#[test]
fn supplied_value_bypasses_the_series() {
    let dir = tempfile::tempdir().unwrap();
    let s = settings(dir.path());
    let reg = MarketRegistry::builtin();
    let market = reg.get("h100-sxm-us").unwrap();

    let input = dir.path().join("prices.txt");
    fs::write(&input, "2.1\n2.2\n2.3\n2.4\n2.5\n2.6\n2.7\n2.8\n2.9\n3.0\n").unwrap();
    pipeline::run_import(&s, market, date(10), &input, false).unwrap();

    let mut req = request(date(10));
    req.value = Some(2.55);
    req.check_integrity = false;
    let report = pipeline::run_verification(&s, market, &req).unwrap();
    assert_eq!(report.outcome, VerifyOutcome::Match);
    assert!(report.low_confidence);

    req.value = Some(2.5);
    let report = pipeline::run_verification(&s, market, &req).unwrap();
    assert_eq!(report.outcome, VerifyOutcome::Mismatch { difference: 0.05 });
}
