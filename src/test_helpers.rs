//! Shared test utilities for the scribe test suite.
//!
//! Provides an isolated copy of the fixture site plus small lookup helpers
//! for content and build output.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_fixtures();
//! Builder::open(tmp.path()).unwrap().build().unwrap();
//!
//! let html = read_output(&tmp.path().join("public"), "posts/hello-world/index.html");
//! assert!(html.contains("<h1>Hello</h1>"));
//! ```
//!
//! # Fixture Site
//!
//! ```text
//! fixtures/site/
//! ├── config.toml
//! ├── content/
//! │   ├── about.md                  # page, tag: meta
//! │   ├── docs/guides/setup.md      # nested page, tag: go
//! │   └── posts/
//! │       ├── hello-world.md        # post, tags: rust, intro
//! │       ├── second-post.md        # post, tag: rust
//! │       └── draft-post.md         # draft, tag: secret
//! ├── layouts/page.html             # overrides the theme's page view
//! ├── static/                       # css/style.css overrides the theme's
//! └── themes/default/
//!     ├── layouts/                  # base, single, page, list, home
//!     └── static/                   # css/style.css, js/theme.js
//! ```

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::content::Page;

/// Non-draft pages in the fixture site.
pub const FIXTURE_PUBLISHED_PAGES: usize = 4;

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/site/` to a temp directory and return it.
///
/// Tests get an isolated copy they can mutate without affecting other tests
/// or the source fixtures.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Write a content file relative to `<site>/content/`, creating directories.
pub fn write_content(site_root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = site_root.join("content").join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, contents).unwrap();
    path
}

// =========================================================================
// Lookups (panic with a clear message on miss)
// =========================================================================

/// Read a file from the build output. Panics if missing.
pub fn read_output(output_root: &Path, relative: &str) -> String {
    let path = output_root.join(relative);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("output file {} not readable: {e}", path.display()))
}

/// Find a page by slug. Panics if not found.
pub fn find_page<'a>(pages: &'a [Page], slug: &str) -> &'a Page {
    pages.iter().find(|p| p.slug == slug).unwrap_or_else(|| {
        let slugs: Vec<&str> = pages.iter().map(|p| p.slug.as_str()).collect();
        panic!("page '{slug}' not found. Available: {slugs:?}")
    })
}
