//! Terminal output formatting with colors
//!
//! Respects NO_COLOR, CLICOLOR, CLICOLOR_FORCE automatically.

use std::collections::HashMap;

use colored::Colorize;
use termtree::Tree;

use crate::application::services::{SyncPlan, WriteReport};
use crate::domain::{Clade, TaxonId, Thresholds};

/// Print error (red bold "error:" prefix) to stderr
pub fn error(msg: &(impl std::fmt::Display + ?Sized)) {
    eprintln!("{}: {}", "error".red().bold(), msg);
}

/// Print warning (yellow "Warning:" prefix) to stderr
pub fn warning(msg: &(impl std::fmt::Display + ?Sized)) {
    eprintln!("{}: {}", "Warning".yellow(), msg);
}

/// Print success status (green checkmark)
pub fn success(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("{} {}", "✓".green(), msg);
}

/// Print failure status (red X, indented)
pub fn failure(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("  {} {}", "✗".red(), msg);
}

/// Print completed action (green label)
pub fn action(label: &str, msg: &(impl std::fmt::Display + ?Sized)) {
    println!("{}: {}", label.green(), msg);
}

/// Print section header (cyan bold)
pub fn header(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("{}", msg.to_string().cyan().bold());
}

/// Print indented detail (no color)
pub fn detail(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("  {}", msg);
}

/// Print plain output (no color, for data)
pub fn info(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("{}", msg);
}

pub fn plan_summary(plan: &SyncPlan, thresholds: Thresholds) {
    header(&format!("Partition of ott{} ({thresholds})", plan.root_id));
    let stats = &plan.stats;
    detail(&format!("nodes:   {}", stats.node_count));
    detail(&format!("clades:  {}", stats.clade_count));
    detail(&format!(
        "size:    min {} / mean {:.1} / max {}",
        stats.smallest, stats.mean, stats.largest
    ));
    if let Some(report) = &plan.enrichment {
        detail(&format!(
            "names:   {} of {} ({} vernacular, {} label)",
            report.named(),
            report.looked_up,
            report.from_vernacular,
            report.from_label
        ));
        if report.failed_batches > 0 {
            warning(&format!("{} name lookup batches failed", report.failed_batches));
        }
    }
    header("Ranks");
    let mut ranks: Vec<(String, usize)> = plan.rank_breakdown().into_iter().collect();
    ranks.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (rank, count) in ranks {
        detail(&format!("{rank:<16} {count}"));
    }
}

pub fn record_sizes(sizes: &[(TaxonId, usize)], limit: usize, max_bytes: usize) {
    header("Largest records");
    for &(root, bytes) in sizes.iter().take(limit) {
        let line = format!("ott{root:<12} {bytes:>9} bytes");
        if bytes > max_bytes {
            failure(&format!("{line} (over {max_bytes})"));
        } else {
            detail(&line);
        }
    }
}

pub fn write_report(report: &WriteReport) {
    success(&format!("{} records written", report.written.len()));
    if !report.replaced.is_empty() {
        action("Replaced", &format!("{} records", report.replaced.len()));
    }
    if !report.skipped.is_empty() {
        action("Skipped", &format!("{} existing records", report.skipped.len()));
    }
    if !report.deleted.is_empty() {
        action("Deleted", &format!("{} records", report.deleted.len()));
    }
    for failure_entry in &report.failed {
        failure(&format!("{}: {}", failure_entry.key, failure_entry.reason));
    }
}

fn clade_label(clade: &Clade) -> String {
    let name = clade
        .root_node()
        .map(|n| n.to_string())
        .unwrap_or_else(|| format!("ott{}", clade.root_id));
    format!("{name} ({} nodes)", clade.len())
}

/// Clade hierarchy as a tree, cut below `max_depth` levels.
pub fn clade_tree(plan: &SyncPlan, max_depth: usize) -> Tree<String> {
    let by_root: HashMap<TaxonId, &Clade> = plan.clades.iter().map(|c| (c.root_id, c)).collect();

    fn build(
        by_root: &HashMap<TaxonId, &Clade>,
        root: TaxonId,
        depth: usize,
        max_depth: usize,
    ) -> Tree<String> {
        let Some(clade) = by_root.get(&root) else {
            return Tree::new(format!("ott{root} (missing)"));
        };
        let mut tree = Tree::new(clade_label(clade));
        if depth >= max_depth {
            if !clade.child_clade_roots.is_empty() {
                tree.push(Tree::new(format!("... {} more clades", clade.child_clade_roots.len())));
            }
            return tree;
        }
        for &child in &clade.child_clade_roots {
            tree.push(build(by_root, child, depth + 1, max_depth));
        }
        tree
    }

    build(&by_root, plan.root_id, 0, max_depth)
}
