// Build-log classification: failure category, ledger attributes and trailer

use crate::models::flags::{self, FlagDelta};
use crate::models::FailureCategory;

/// Only the end of a failed log is searched for the failure cause
pub const TAIL_LINES: usize = 100;

/// Ordered trigger table; the first category matching a line wins
pub const TRIGGERS: &[(FailureCategory, &[&str])] = &[
    (FailureCategory::Patch, &["Fail to apply loong's patch"]),
    (FailureCategory::BeforeBuild, &["Unknown error before build"]),
    (
        FailureCategory::Download,
        &[
            "Failure while downloading",
            "TLS connect error",
            "Could not download sources",
        ],
    ),
    (
        FailureCategory::Validity,
        &[
            "Fail to pass the validity check",
            "One or more files did not pass the validity check",
        ],
    ),
    (FailureCategory::Pgp, &["One or more PGP signatures could not be verified"]),
    (FailureCategory::Dependencies, &["Could not resolve all dependencies"]),
    (FailureCategory::Prepare, &["A failure occurred in prepare"]),
    (FailureCategory::Build, &["A failure occurred in build"]),
    (FailureCategory::Check, &["A failure occurred in check"]),
    (FailureCategory::Package, &["A failure occurred in package"]),
    (FailureCategory::BuildType, &["configure: error: cannot guess build type"]),
];

/// Markers the build tool prints for attributes recorded in the ledger
pub const ATTRIBUTES: &[(&str, u32)] = &[
    ("Loong's patch applied.", flags::PATCH),
    ("Build with --nocheck", flags::NOCHECK),
    ("Updating config.", flags::OLDCONFIG),
    ("Build with --skippgpcheck", flags::SKIPPGP),
    ("Build with --skipchecksum", flags::SKIPHASH),
    ("Build in qemu", flags::QEMU),
];

/// Bits owned by the attribute table; absent markers clear them
pub const ATTRIBUTE_MASK: u32 = flags::PATCH
    | flags::NOCHECK
    | flags::OLDCONFIG
    | flags::SKIPPGP
    | flags::SKIPHASH
    | flags::QEMU;

const FINISHED_MARKER: &str = "Finished making:";
const TRAILER_MARKER: &str = "built on ";
const TRAILER_COST: &str = ", time cost: ";

/// Category of a single log line, if it names one
pub fn classify_line(line: &str) -> Option<FailureCategory> {
    TRIGGERS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| line.contains(p)))
        .map(|(category, _)| *category)
}

/// Category decided by the last matching line among the final `TAIL_LINES`
///
/// Falls back to `BeforeBuild` when nothing matches.
pub fn classify_tail(text: &str) -> FailureCategory {
    last_match(&tail(text, TAIL_LINES)).unwrap_or(FailureCategory::BeforeBuild)
}

fn last_match(lines: &[&str]) -> Option<FailureCategory> {
    lines.iter().rev().find_map(|line| classify_line(line))
}

fn tail(text: &str, count: usize) -> Vec<&str> {
    let mut lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines.split_off(start)
}

/// Everything a finished log says about its build
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogReport {
    /// Category from the tail of the log, `None` when no trigger matched
    pub failure: Option<FailureCategory>,
    /// Attribute bits whose markers appear anywhere in the log
    pub attributes: u32,
    /// The build tool reached `Finished making:`
    pub finished: bool,
    pub builder: Option<String>,
    /// Raw build duration in seconds from the trailer
    pub time_cost: Option<f64>,
}

impl LogReport {
    /// Ledger change for this log
    ///
    /// Attribute bits follow the markers; `haslog` is always set. A
    /// successful build clears the fail state, a failed one records the
    /// category (`BeforeBuild` when unknown).
    pub fn ledger_delta(&self, succeeded: bool) -> FlagDelta {
        let delta = FlagDelta::new()
            .clear(ATTRIBUTE_MASK & !self.attributes)
            .set(self.attributes | flags::HASLOG);
        if succeeded {
            delta.success()
        } else {
            let category = self.failure.unwrap_or(FailureCategory::BeforeBuild);
            delta.with_failure(category.code())
        }
    }
}

/// Scan a whole build log
pub fn scan(text: &str) -> LogReport {
    let mut report = LogReport {
        failure: last_match(&tail(text, TAIL_LINES)),
        ..LogReport::default()
    };

    for line in text.lines() {
        for (marker, bit) in ATTRIBUTES {
            if line.contains(marker) {
                report.attributes |= bit;
            }
        }
        if line.contains(FINISHED_MARKER) {
            report.finished = true;
        }
    }

    if let Some((builder, cost)) = text.lines().rev().find_map(parse_trailer) {
        report.builder = Some(builder);
        report.time_cost = Some(cost);
    }

    report
}

/// Parse `built on <builder>, time cost: <secs>`
fn parse_trailer(line: &str) -> Option<(String, f64)> {
    let rest = &line[line.find(TRAILER_MARKER)? + TRAILER_MARKER.len()..];
    let (builder, cost) = rest.split_once(TRAILER_COST)?;
    let builder = builder.trim();
    if builder.is_empty() || builder.contains(char::is_whitespace) {
        return None;
    }
    let digits: String = cost
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let cost = digits.parse().ok()?;
    Some((builder.to_string(), cost))
}
