//! CLI Exit Code Registry
//!
//! This is the single source of truth for all `midmile` exit codes.
//! Exit codes are part of the shell contract: scripts gate payments on them.
//!
//! | Code | Meaning                                             |
//! |------|-----------------------------------------------------|
//! | 0    | Success (for `check`: risk tier low)                |
//! | 1    | General error (unspecified)                         |
//! | 2    | Usage error (bad arguments)                         |
//! | 3    | `check`: risk tier medium                           |
//! | 4    | `check`: risk tier high                             |
//! | 5    | An input document could not be read or parsed      |
//! | 6    | Config file unreadable or invalid                   |
//! | 7    | SOP carries nothing to reconcile on                 |
//! | 8    | Report or JSON output could not be written          |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant below
//! 2. Update the table above
//! 3. Wire it into the relevant command's error handling

use midmile_recon::{ReconError, Severity};

/// Success - command completed; for `check`, the tour is low risk.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unknown report kind.
pub const EXIT_USAGE: u8 = 2;

/// Reconciliation finished; risk tier is medium.
pub const EXIT_RISK_MEDIUM: u8 = 3;

/// Reconciliation finished; risk tier is high.
pub const EXIT_RISK_HIGH: u8 = 4;

/// SOP, rate card or settlement report could not be read or parsed.
pub const EXIT_PARSE: u8 = 5;

/// Config file could not be read, parsed or validated.
pub const EXIT_INVALID_CONFIG: u8 = 6;

/// The SOP has no tour id, vehicle type or route.
pub const EXIT_NO_MATCH: u8 = 7;

/// Writing a report workbook or JSON output failed.
pub const EXIT_EXPORT: u8 = 8;

/// Exit code for a finished reconciliation.
pub fn risk_exit_code(tier: Severity) -> u8 {
    match tier {
        Severity::Low => EXIT_SUCCESS,
        Severity::Medium => EXIT_RISK_MEDIUM,
        Severity::High => EXIT_RISK_HIGH,
    }
}

/// Exit code for an engine failure.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::Parse(_) => EXIT_PARSE,
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_INVALID_CONFIG,
        ReconError::NoMatch(_) => EXIT_NO_MATCH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midmile_recon::{Document, ParseError};

    #[test]
    fn codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_ERROR,
            EXIT_USAGE,
            EXIT_RISK_MEDIUM,
            EXIT_RISK_HIGH,
            EXIT_PARSE,
            EXIT_INVALID_CONFIG,
            EXIT_NO_MATCH,
            EXIT_EXPORT,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn tiers_map_in_order() {
        assert_eq!(risk_exit_code(Severity::Low), EXIT_SUCCESS);
        assert!(risk_exit_code(Severity::Medium) < risk_exit_code(Severity::High));
    }

    #[test]
    fn engine_errors_map_to_codes() {
        let parse = ReconError::Parse(ParseError::new(Document::RateCard, "bad"));
        assert_eq!(recon_exit_code(&parse), EXIT_PARSE);
        assert_eq!(recon_exit_code(&ReconError::NoMatch("x".into())), EXIT_NO_MATCH);
        assert_eq!(recon_exit_code(&ReconError::ConfigValidation("x".into())), EXIT_INVALID_CONFIG);
    }
}
