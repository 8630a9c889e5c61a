//! Sitemap generation.
//!
//! One entry for the site root plus one per published page:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
//!   <url>
//!     <loc>https://example.com/</loc>
//!     <lastmod>2025-01-01</lastmod>
//!     <changefreq>daily</changefreq>
//!     <priority>1.0</priority>
//!   </url>
//! </urlset>
//! ```
//!
//! | Entry      | lastmod     | changefreq | priority |
//! |------------|-------------|------------|----------|
//! | site root  | build date  | daily      | 1.0      |
//! | post       | page date   | weekly     | 0.8      |
//! | other page | page date   | monthly    | 0.5      |

use crate::content::{self, Page};
use chrono::NaiveDate;
use std::fs;
use std::path::Path;

/// File name of the sitemap inside the output root.
pub const SITEMAP_FILE: &str = "sitemap.xml";

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFreq {
    Daily,
    Weekly,
    Monthly,
}

impl ChangeFreq {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeFreq::Daily => "daily",
            ChangeFreq::Weekly => "weekly",
            ChangeFreq::Monthly => "monthly",
        }
    }
}

/// Single URL entry in the sitemap.
#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: NaiveDate,
    pub changefreq: ChangeFreq,
    pub priority: f32,
}

impl SitemapEntry {
    fn for_page(page: &Page) -> Self {
        let (changefreq, priority) = if page.is_post {
            (ChangeFreq::Weekly, 0.8)
        } else {
            (ChangeFreq::Monthly, 0.5)
        };
        Self {
            loc: page.permalink.clone(),
            lastmod: page.date.date_naive(),
            changefreq,
            priority,
        }
    }
}

/// Entries for the site root and every page, sorted by location.
///
/// Callers pass only published pages.
pub fn entries_for(pages: &[Page], base_url: &str, today: NaiveDate) -> Vec<SitemapEntry> {
    let mut entries = Vec::with_capacity(pages.len() + 1);
    entries.push(SitemapEntry {
        loc: content::join_permalink(base_url, ""),
        lastmod: today,
        changefreq: ChangeFreq::Daily,
        priority: 1.0,
    });
    entries.extend(pages.iter().map(SitemapEntry::for_page));
    entries.sort_by(|a, b| a.loc.cmp(&b.loc));
    entries
}

/// Render entries as a sitemap document.
pub fn to_xml(entries: &[SitemapEntry]) -> String {
    let mut xml = String::with_capacity(256 + entries.len() * 160);

    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(&format!(r#"<urlset xmlns="{SITEMAP_NS}">"#));
    xml.push('\n');

    for entry in entries {
        xml.push_str("  <url>\n");
        xml.push_str(&format!("    <loc>{}</loc>\n", escape_xml(&entry.loc)));
        xml.push_str(&format!("    <lastmod>{}</lastmod>\n", entry.lastmod.format("%Y-%m-%d")));
        xml.push_str(&format!("    <changefreq>{}</changefreq>\n", entry.changefreq.as_str()));
        xml.push_str(&format!("    <priority>{:.1}</priority>\n", entry.priority));
        xml.push_str("  </url>\n");
    }

    xml.push_str("</urlset>\n");
    xml
}

/// Write the sitemap for `entries` into `output_root`.
pub fn write(output_root: &Path, entries: &[SitemapEntry]) -> std::io::Result<()> {
    fs::write(output_root.join(SITEMAP_FILE), to_xml(entries))
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
