//! CLI output formatting for builds, checks and new content.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! Templates: 6 views (1 compiled, 5 cached)
//! Pages: 4 published (2 posts), 1 draft skipped
//! Tags
//!     go (1)
//!     rust (2)
//! Static: 3 files
//! Built 4 pages, 2 tag pages, sitemap (5 entries) in 18ms → public
//! ```
//!
//! ## Check
//!
//! ```text
//! Views: base, home, list, page, single
//! Pages: 4 published (2 posts), 1 draft
//! Tags: go, rust
//! OK
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure and do no I/O.

use crate::build::{BuildReport, CheckReport};
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Shared helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `1 page`, `2 pages`.
fn count(n: usize, singular: &str, plural: &str) -> String {
    if n == 1 {
        format!("{n} {singular}")
    } else {
        format!("{n} {plural}")
    }
}

/// Milliseconds below ten seconds, seconds with one decimal above.
fn format_duration(elapsed: Duration) -> String {
    if elapsed < Duration::from_secs(10) {
        format!("{}ms", elapsed.as_millis())
    } else {
        format!("{:.1}s", elapsed.as_secs_f64())
    }
}

/// `path` relative to `base` when it lives under it.
fn display_relative(path: &Path, base: &Path) -> String {
    path.strip_prefix(base).unwrap_or(path).display().to_string()
}

// ============================================================================
// Build
// ============================================================================

pub fn format_build_report(report: &BuildReport, site_root: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    let templates = &report.templates;

    lines.push(format!(
        "Templates: {} ({} compiled, {} cached)",
        count(templates.views, "view", "views"),
        templates.compiled,
        templates.reused
    ));

    let mut pages = format!(
        "Pages: {} published ({})",
        report.pages,
        count(report.posts, "post", "posts")
    );
    if report.drafts > 0 {
        pages.push_str(&format!(", {} skipped", count(report.drafts, "draft", "drafts")));
    }
    lines.push(pages);

    if !report.tags.is_empty() {
        lines.push("Tags".to_string());
        for (tag, n) in &report.tags {
            lines.push(format!("{}{tag} ({n})", indent(1)));
        }
    }

    lines.push(format!("Static: {}", count(report.assets, "file", "files")));
    lines.push(format!(
        "Built {}, {}, sitemap ({}) in {} → {}",
        count(report.pages, "page", "pages"),
        count(report.tags.len(), "tag page", "tag pages"),
        count(report.sitemap_entries, "entry", "entries"),
        format_duration(report.elapsed),
        display_relative(&report.output_dir, site_root)
    ));
    lines
}

pub fn print_build_report(report: &BuildReport, site_root: &Path) {
    for line in format_build_report(report, site_root) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

pub fn format_check_report(report: &CheckReport) -> Vec<String> {
    let mut lines = vec![format!("Views: {}", report.views.join(", "))];
    let mut pages = format!(
        "Pages: {} published ({})",
        report.pages,
        count(report.posts, "post", "posts")
    );
    if report.drafts > 0 {
        pages.push_str(&format!(", {}", count(report.drafts, "draft", "drafts")));
    }
    lines.push(pages);
    if !report.tags.is_empty() {
        lines.push(format!("Tags: {}", report.tags.join(", ")));
    }
    lines.push("OK".to_string());
    lines
}

pub fn print_check_report(report: &CheckReport) {
    for line in format_check_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// New content
// ============================================================================

pub fn format_created(path: &Path, site_root: &Path) -> String {
    format!("Created {}", display_relative(path, site_root))
}
