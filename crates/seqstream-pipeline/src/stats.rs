//! Cluster assignment → abundance statistics

use seqstream_core::{ClusterAssignment, ClusterStats, GroupSummary, NOISE_LABEL};
use std::collections::BTreeMap;

/// Maximum number of groups reported in `top_groups`
pub const MAX_TOP_GROUPS: usize = 20;

/// Non-noise groups with their sizes, most abundant first
///
/// Ties are broken by ascending group id so the ranking does not depend on the
/// order labels were produced in.
pub fn rank_groups(assignment: &ClusterAssignment) -> Vec<(i64, usize)> {
    let mut ranked: Vec<(i64, usize)> = tally(assignment)
        .into_iter()
        .filter(|(label, _)| *label != NOISE_LABEL)
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked
}

/// Summarise a cluster assignment
pub fn aggregate(assignment: &ClusterAssignment) -> ClusterStats {
    let total_reads = assignment.len();
    let noise_count = assignment
        .labels()
        .iter()
        .filter(|label| **label == NOISE_LABEL)
        .count();

    let ranked = rank_groups(assignment);
    let total_clusters = ranked.len();

    let top_groups = ranked
        .into_iter()
        .take(MAX_TOP_GROUPS)
        .map(|(group_id, count)| GroupSummary {
            group_id,
            count,
            percentage: percentage(count, total_reads),
            label: assignment.name(group_id).map(str::to_string),
        })
        .collect();

    ClusterStats {
        total_reads,
        total_clusters,
        noise_count,
        noise_percentage: percentage(noise_count, total_reads),
        top_groups,
    }
}

fn tally(assignment: &ClusterAssignment) -> BTreeMap<i64, usize> {
    let mut counts = BTreeMap::new();
    for label in assignment.labels() {
        *counts.entry(*label).or_insert(0) += 1;
    }
    counts
}

/// `100 * part / total`, rounded to two decimals
fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = 100.0 * part as f64 / total as f64;
    (raw * 100.0).round() / 100.0
}
