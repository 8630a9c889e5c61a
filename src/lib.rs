//! # Scribe
//!
//! A static site generator for markdown content. A directory of markdown files
//! with front matter, plus a theme of HTML views, becomes a directory of static
//! pages, one listing per tag, a home page and a sitemap.
//!
//! # Architecture: Phased Parallel Build
//!
//! A build runs seven phases in order; the heavy ones fan out over a bounded
//! worker pool and join before the next phase starts:
//!
//! ```text
//! 1. Templates   themes/<t>/layouts + layouts  →  compiled views (cached)
//! 2. Content     content/**/*.md               →  pages, tag index    (parallel)
//! 3. Static      themes/<t>/static + static    →  public/             (parallel)
//! 4. Pages       pages × views                 →  public/<url>/index.html (parallel)
//! 5. Tags        tag index × list view         →  public/tags/<tag>/  (parallel)
//! 6. Home        posts × home view             →  public/index.html
//! 7. Sitemap     pages                         →  public/sitemap.xml
//! ```
//!
//! The first failure of a phase aborts the build once that phase has joined.
//! Nothing written by earlier phases is rolled back.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`markdown`] | Markdown → HTML for the supported subset |
//! | [`frontmatter`] | Front matter block: minimal key/value/list dialect, decode and encode |
//! | [`content`] | `Page` model, loading, URL and permalink derivation, new content |
//! | [`templates`] | Theme/site view merging and the staleness-aware template cache |
//! | [`executor`] | Generic bounded worker pool used by every parallel phase |
//! | [`build`] | `Builder`: phase sequencing, view selection, failure policy |
//! | [`sitemap`] | Sitemap entries and XML |
//! | [`watch`] | Debounced file watching, one rebuild per batch of changes |
//! | [`serve`] | Development server: watch plus HTTP over the output directory |
//! | [`config`] | `config.toml` loading and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Theme Then Site
//!
//! Views and static files come from the theme first; a site file with the same
//! name replaces the theme's. The base layout always frames every view, so a
//! site can restyle one view without copying the theme.
//!
//! ## Template Cache Keyed on Files and Mtimes
//!
//! A compiled view is reused while its file list is unchanged and none of its
//! files is newer than when it was compiled. Watch sessions keep one
//! [`build::Builder`], so unchanged views survive rebuilds. `--no-cache` turns
//! this off.
//!
//! ## Drafts Load, Then Drop
//!
//! Drafts are parsed like any other page, so a broken draft still fails the
//! build, but never reach pages, tag listings, the home page or the sitemap.

pub mod build;
pub mod config;
pub mod content;
pub mod executor;
pub mod frontmatter;
pub mod markdown;
pub mod output;
pub mod serve;
pub mod sitemap;
pub mod templates;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_helpers;
