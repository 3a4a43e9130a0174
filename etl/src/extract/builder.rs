use super::row::{CacheRow, RowError};
use common::channel::{ChannelSnapshot, ChannelType};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// A data line that could not be turned into a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRejection {
    /// 1-based line number in the extract; the header is line 1.
    pub line_number: usize,
    pub raw_line: String,
    pub reason: RowError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutput {
    pub accepted: Vec<ChannelSnapshot>,
    pub rejected: Vec<RowRejection>,
}

impl BuildOutput {
    pub fn total_rows(&self) -> usize {
        self.accepted.len() + self.rejected.len()
    }

    pub fn rejected_ratio(&self) -> f64 {
        match self.total_rows() {
            0 => 0.0,
            total => self.rejected.len() as f64 / total as f64,
        }
    }

    /// Accepted snapshots grouped by channel type, extract order preserved.
    pub fn by_type(&self) -> BTreeMap<ChannelType, Vec<ChannelSnapshot>> {
        let mut groups: BTreeMap<ChannelType, Vec<ChannelSnapshot>> = BTreeMap::new();
        for snapshot in &self.accepted {
            groups
                .entry(snapshot.channel_type)
                .or_default()
                .push(snapshot.clone());
        }
        groups
    }
}

/// Turns a `;`-delimited bulk extract into channel snapshots.
///
/// Every data line is parsed on its own against the header line, so a broken
/// line is recorded in [`BuildOutput::rejected`] and never affects its neighbours.
pub struct CacheBuilder;

impl CacheBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, extract_text: &str) -> BuildOutput {
        let mut output = BuildOutput::default();
        let mut lines = extract_text.lines().enumerate();
        let header = match lines.next() {
            Some((_, header)) => header.trim_start_matches('\u{feff}'),
            None => {
                report(&output);
                return output;
            }
        };

        for (index, line) in lines {
            if line.trim().is_empty() {
                continue;
            }

            match CacheRow::parse(header, line).and_then(CacheRow::into_snapshot) {
                Ok(snapshot) => output.accepted.push(snapshot),
                Err(reason) => output.rejected.push(RowRejection {
                    line_number: index + 1,
                    raw_line: line.to_string(),
                    reason,
                }),
            }
        }

        report(&output);
        output
    }
}

impl Default for CacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn report(output: &BuildOutput) {
    if output.rejected.is_empty() {
        info!(rows = output.accepted.len(), "Parsed bulk extract without rejections");
        return;
    }

    let details: Vec<String> = output
        .rejected
        .iter()
        .map(|rejection| {
            format!(
                "line {}: {} | {}",
                rejection.line_number, rejection.reason, rejection.raw_line
            )
        })
        .collect();

    warn!(
        rejected = output.rejected.len(),
        total = output.total_rows(),
        "{} of {} extract rows rejected:\n{}",
        output.rejected.len(),
        output.total_rows(),
        details.join("\n")
    );
}
