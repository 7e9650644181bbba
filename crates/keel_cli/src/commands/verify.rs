//! Verify command implementation.

use super::{open_log, CliError, CliResult};
use keel_core::wal::{OperationLog, TornTail};
use keel_core::HashTableOperationKind;
use std::collections::BTreeMap;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Size of the log in bytes.
    pub log_size: u64,
    /// Number of valid records.
    pub valid_records: usize,
    /// Records per table, then per kind.
    pub tables: BTreeMap<String, BTreeMap<&'static str, usize>>,
    /// Offset where clean data ends.
    pub valid_end: u64,
    /// Tail that replay would discard.
    pub torn_tail: Option<TornTail>,
    /// Corruption that would stop the store from opening.
    pub corruption: Option<String>,
}

impl VerifyResult {
    /// True unless the log is corrupted before its tail.
    pub fn is_ok(&self) -> bool {
        self.corruption.is_none()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> CliResult<()> {
    println!("Verifying log at {:?}", path);
    println!();

    let log = open_log(path)?;
    let result = verify_log(&log)?;
    print_result(&result);

    println!();
    if result.is_ok() {
        println!("✓ Log verification passed");
        Ok(())
    } else {
        println!("✗ Log verification failed");
        Err(CliError::VerificationFailed)
    }
}

/// Scans every frame of `log` without modifying it.
pub fn verify_log(log: &OperationLog) -> CliResult<VerifyResult> {
    let mut result = VerifyResult {
        log_size: log.size()?,
        ..VerifyResult::default()
    };

    let mut scanner = log.scan()?;
    for item in scanner.by_ref() {
        match item {
            Ok((_, op)) => {
                result.valid_records += 1;
                *result
                    .tables
                    .entry(op.name().to_owned())
                    .or_default()
                    .entry(op.kind().label())
                    .or_default() += 1;
            }
            Err(err) if err.is_corruption() => {
                result.corruption = Some(err.to_string());
            }
            Err(err) => return Err(err.into()),
        }
    }
    result.valid_end = scanner.valid_end();
    result.torn_tail = scanner.torn_tail().cloned();
    Ok(result)
}

fn print_result(result: &VerifyResult) {
    println!("  Log size: {} bytes", result.log_size);
    println!("  Valid records: {}", result.valid_records);
    println!("  Valid end: {}", result.valid_end);

    for (table, kinds) in &result.tables {
        let counts: Vec<String> = HashTableOperationKind::ALL
            .iter()
            .filter_map(|kind| {
                kinds
                    .get(kind.label())
                    .map(|n| format!("{}={}", kind.label(), n))
            })
            .collect();
        println!("  Table {:?}: {}", table, counts.join(" "));
    }

    if let Some(torn) = &result.torn_tail {
        println!(
            "  Torn tail at {}: {} bytes ({})",
            torn.offset, torn.discarded, torn.cause
        );
    }
    if let Some(corruption) = &result.corruption {
        println!("  Corruption: {}", corruption);
    }
}
