//! Reporting utilities: series tallies and terminal formatting.

pub mod format;

pub use format::*;

use crate::error::exit;
use crate::index::verify::{VerificationReport, VerifyOutcome};

/// Outcome counts across a verified series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeriesTally {
    pub matched: usize,
    pub suspicious: usize,
    pub mismatched: usize,
    pub no_data: usize,
    pub not_found: usize,
}

impl SeriesTally {
    pub fn from_reports(reports: &[VerificationReport]) -> Self {
        let mut t = Self::default();
        for r in reports {
            match r.outcome {
                VerifyOutcome::Match if r.suspect_days > 0 => t.suspicious += 1,
                VerifyOutcome::Match => t.matched += 1,
                VerifyOutcome::Mismatch { .. } => t.mismatched += 1,
                VerifyOutcome::NoData => t.no_data += 1,
                VerifyOutcome::NotFound => t.not_found += 1,
            }
        }
        t
    }

    pub fn total(&self) -> usize {
        self.matched + self.suspicious + self.mismatched + self.no_data + self.not_found
    }

    /// Worst outcome wins: mismatch, then missing data, then suspicion.
    pub fn exit_code(&self) -> u8 {
        if self.mismatched > 0 {
            exit::MISMATCH
        } else if self.no_data > 0 {
            exit::NO_DATA
        } else if self.not_found > 0 {
            exit::NOT_FOUND
        } else if self.suspicious > 0 {
            exit::SUSPECT
        } else {
            0
        }
    }
}
