//! Content loading: one markdown file in, one [`Page`] out.
//!
//! ## URL Derivation
//!
//! The page URL mirrors the file's location under the content root. Every
//! intermediate directory is kept verbatim; only the file name is replaced by
//! the slug (front matter `slug`, else the file stem):
//!
//! ```text
//! content/about.md                      →  about/
//! content/posts/hello.md                →  posts/hello/
//! content/topics/tech/golang.md         →  topics/tech/golang-intro/   (slug: golang-intro)
//! ```
//!
//! The trailing separator follows the site's `trailing_slash` policy. The
//! permalink joins the base URL and the page URL with exactly one `/`,
//! however the base URL was written.
//!
//! ## Posts
//!
//! A page is a post when any directory between the content root and the file
//! is named `posts`. Posts feed the home page and get the `single` view.

use crate::frontmatter::{self, FrontMatter, FrontMatterError};
use crate::markdown;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Directory name that marks content as a post.
pub const POSTS_DIR: &str = "posts";

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: FrontMatterError,
    },
    #[error("{path} is not inside the content root {root}")]
    OutsideContentRoot { path: PathBuf, root: PathBuf },
    #[error("cannot derive a slug from title '{0}'")]
    InvalidTitle(String),
    #[error("content file already exists: {0}")]
    AlreadyExists(PathBuf),
}

/// A fully loaded content page. Built once per file per build, then read-only.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub tags: Vec<String>,
    pub draft: bool,
    /// View name override from front matter.
    pub layout: Option<String>,
    pub slug: String,
    /// Raw markdown body.
    pub content: String,
    /// Rendered body.
    pub html: String,
    pub path: PathBuf,
    /// Site-relative URL, no leading separator.
    pub url: String,
    pub permalink: String,
    pub is_post: bool,
}

/// Loads content files relative to one content root.
#[derive(Debug, Clone)]
pub struct PageLoader {
    content_root: PathBuf,
    base_url: String,
    trailing_slash: bool,
}

impl PageLoader {
    pub fn new(content_root: impl Into<PathBuf>, base_url: &str, trailing_slash: bool) -> Self {
        Self {
            content_root: content_root.into(),
            base_url: base_url.to_string(),
            trailing_slash,
        }
    }

    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    /// Read and parse one content file.
    ///
    /// Drafts load like any other page; excluding them is the caller's job.
    pub fn load(&self, path: &Path) -> Result<Page, ContentError> {
        let source = fs::read_to_string(path).map_err(|source| ContentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse(path, &source)
    }

    /// Build a page from already-read file contents.
    pub fn parse(&self, path: &Path, source: &str) -> Result<Page, ContentError> {
        let (fm, body) = frontmatter::split(source).map_err(|source| ContentError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let relative =
            path.strip_prefix(&self.content_root)
                .map_err(|_| ContentError::OutsideContentRoot {
                    path: path.to_path_buf(),
                    root: self.content_root.clone(),
                })?;

        let slug = fm.slug.clone().unwrap_or_else(|| file_stem(path));
        check_slug(&slug).map_err(|source| ContentError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let dirs = parent_dirs(relative);
        let is_post = dirs.iter().any(|d| d == POSTS_DIR);
        let url = derive_url(&dirs, &slug, self.trailing_slash);
        let permalink = join_permalink(&self.base_url, &url);

        let FrontMatter {
            title,
            description,
            date,
            tags,
            draft,
            layout,
            ..
        } = fm;

        Ok(Page {
            title,
            description,
            date,
            tags,
            draft,
            layout,
            slug,
            content: body.to_string(),
            html: markdown::to_html(body),
            path: path.to_path_buf(),
            url,
            permalink,
            is_post,
        })
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// A slug replaces exactly one URL segment: no separators, not `.` or `..`.
fn check_slug(slug: &str) -> Result<(), FrontMatterError> {
    if slug.contains(['/', '\\']) || slug == "." || slug == ".." {
        return Err(FrontMatterError::InvalidField {
            key: "slug".into(),
            reason: format!("'{slug}' is not a single path segment"),
        });
    }
    Ok(())
}

/// Directory components between the content root and the file.
fn parent_dirs(relative: &Path) -> Vec<String> {
    relative
        .parent()
        .map(|parent| {
            parent
                .components()
                .filter_map(|c| match c {
                    Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Join directories and slug with `/`, honouring the trailing-slash policy.
pub fn derive_url(dirs: &[String], slug: &str, trailing_slash: bool) -> String {
    let mut url = dirs.join("/");
    if !url.is_empty() {
        url.push('/');
    }
    url.push_str(slug);
    if trailing_slash && !url.ends_with('/') {
        url.push('/');
    }
    url
}

/// `base_url` with exactly one `/` before the page URL.
pub fn join_permalink(base_url: &str, url: &str) -> String {
    let mut permalink = base_url.trim_end_matches('/').to_string();
    permalink.push('/');
    permalink.push_str(url.trim_start_matches('/'));
    permalink
}

// =============================================================================
// New content
// =============================================================================

/// Kind of content created by `scribe new`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Post,
    Page,
}

/// URL-friendly slug: lowercase ASCII letters, digits and single dashes.
///
/// - `"Hello World"` → `"hello-world"`
/// - `"Rust & Go: 2024!"` → `"rust-go-2024"`
/// - `"  --  "` → `""`
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.to_lowercase().chars() {
        match c {
            'a'..='z' | '0'..='9' => slug.push(c),
            ' ' | '-' | '_' if !slug.ends_with('-') => slug.push('-'),
            _ => {}
        }
    }
    slug.trim_matches('-').to_string()
}

/// Write a new content file with a canonical front matter block.
///
/// Posts go to `<content_root>/posts/<slug>.md`, pages to
/// `<content_root>/<slug>.md`. Never overwrites an existing file.
pub fn create_content(
    content_root: &Path,
    kind: ContentKind,
    title: &str,
    draft: bool,
    now: DateTime<Utc>,
) -> Result<PathBuf, ContentError> {
    let slug = slugify(title);
    if slug.is_empty() {
        return Err(ContentError::InvalidTitle(title.to_string()));
    }

    let dir = match kind {
        ContentKind::Post => content_root.join(POSTS_DIR),
        ContentKind::Page => content_root.to_path_buf(),
    };
    let path = dir.join(format!("{slug}.md"));
    if path.exists() {
        return Err(ContentError::AlreadyExists(path));
    }

    let io_err = |source: std::io::Error| ContentError::Io {
        path: path.clone(),
        source,
    };
    fs::create_dir_all(&dir).map_err(io_err)?;

    let fm = FrontMatter {
        title: title.to_string(),
        date: now,
        draft,
        slug: Some(slug),
        ..Default::default()
    };
    let body = match kind {
        ContentKind::Post => "Write your post content here.",
        ContentKind::Page => "Write your page content here.",
    };
    let document = format!("{}\n# {title}\n\n{body}\n", fm.render());
    fs::write(&path, document).map_err(io_err)?;

    Ok(path)
}
