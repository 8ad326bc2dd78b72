use sift_core::engine::{Extraction, ExtractionIssue};
use sift_core::reconcile::GroupReconciliation;
use sift_core::resolve::{EntityGroup, Resolution};
use sift_core::PipelineResult;

const LIST_LIMIT: usize = 20;

fn print_issues(issues: &[ExtractionIssue]) {
    if issues.is_empty() {
        return;
    }
    println!("Issues ({}):", issues.len());
    for issue in issues {
        println!("  {:<24} {}: {}", issue.location.to_string(), issue.entity, issue.error);
    }
    println!();
}

fn print_group(group: &EntityGroup) {
    let live = group.comparable_keys().len();
    println!(
        "=== {} ===  {} keys, {} live, {} struck\n",
        group.name,
        group.entries.len(),
        live,
        group.entries.len() - live
    );
    if group.entries.is_empty() {
        return;
    }
    let width = group
        .entries
        .keys()
        .map(|k| k.len())
        .max()
        .unwrap_or(10)
        .min(60);
    for entry in group.entries.values() {
        let marker = if entry.strike { "struck" } else { "" };
        println!(
            "  {:<width$}  {:<6}  x{:<3} {}",
            entry.key,
            marker,
            entry.occurrences,
            entry.source,
            width = width
        );
    }
    println!();
}

pub fn print_extraction(extraction: &Extraction, resolution: &Resolution) {
    for group in &resolution.groups {
        print_group(group);
    }
    print_issues(&extraction.issues);
    println!(
        "{} records extracted into {} groups",
        extraction.record_count(),
        resolution.groups.len()
    );
}

fn print_list(label: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("  {} ({}):", label, items.len());
    for item in items.iter().take(LIST_LIMIT) {
        println!("    {}", item);
    }
    if items.len() > LIST_LIMIT {
        println!("    ... {} more", items.len() - LIST_LIMIT);
    }
}

fn print_comparison(group: &GroupReconciliation) {
    let source = group.source.as_deref().unwrap_or("no source");
    println!("=== {} ({}) ===\n", group.group, source);
    if let Some(ref err) = group.external_error {
        println!("  external data unavailable: {}", err);
    }
    println!(
        "  {} new in sheet, {} missing in sheet, {} matched",
        group.diff.new_locally.len(),
        group.diff.missing_locally.len(),
        group.diff.matched.len()
    );
    print_list("New in sheet", &group.diff.new_locally);
    let missing: Vec<String> = group
        .missing_locally
        .iter()
        .map(|m| format!("{}  (id {})", m.key, m.id))
        .collect();
    print_list("Missing in sheet", &missing);
    println!();
}

pub fn print_reconciliation(result: &PipelineResult) {
    for group in &result.reconciliation.groups {
        print_comparison(group);
    }
    print_issues(&result.extraction.issues);
    if !result.reconciliation.max_ids.is_empty() {
        println!("Highest external ids:");
        for (pool, max) in &result.reconciliation.max_ids {
            println!("  {:<12} {}", pool.to_string(), max);
        }
    }
}
