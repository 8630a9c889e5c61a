//! Build orchestration: content and layouts in, a static site out.
//!
//! ## Phases
//!
//! A build runs these phases strictly in order. Every phase marked parallel
//! goes through the [`ParallelExecutor`] and finishes completely before the
//! next one starts.
//!
//! 1. **Templates**: (re)load theme and site views
//! 2. **Content** (parallel): load every `*.md` file, drop drafts, index tags
//! 3. **Static** (parallel): copy theme then site static files (site wins)
//! 4. **Pages** (parallel): render every published page through its view
//! 5. **Tags** (parallel): one listing per tag, newest first
//! 6. **Home**: posts, newest first, through `home` (else `list`)
//! 7. **Sitemap**: site root plus every published page
//!
//! ## Output Structure
//!
//! ```text
//! public/
//! ├── index.html                 # Home
//! ├── sitemap.xml
//! ├── about/index.html           # content/about.md
//! ├── posts/hello/index.html     # content/posts/hello.md
//! ├── tags/
//! │   └── rust/index.html        # Tag listing
//! └── css/style.css              # Static files
//! ```
//!
//! ## Failure Policy
//!
//! Failed jobs never stop their siblings. Once a phase finishes, the first
//! collected error aborts the build as [`BuildError::Phase`]. Output written by
//! earlier phases stays on disk.
//!
//! ## View Context
//!
//! | Key       | Pages          | Tag listing     | Home          |
//! |-----------|----------------|-----------------|---------------|
//! | `site`    | config         | config          | config        |
//! | `title`   | page title     | `Tag: <tag>`    | site title    |
//! | `page`    | the page       |                 |               |
//! | `content` | rendered HTML  |                 |               |
//! | `pages`   |                | tagged pages    | posts         |
//! | `tag`     |                | the tag         |               |

use crate::config::{self, ConfigError, SiteConfig, SitePaths};
use crate::content::{ContentError, Page, PageLoader};
use crate::executor::{ParallelExecutor, PoolOutcome};
use crate::sitemap;
use crate::templates::{CompiledView, LoadSummary, TemplateError, TemplateResolver};
use chrono::Utc;
use rayon::ThreadPoolBuildError;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use walkdir::WalkDir;

/// File written for every page directory.
pub const INDEX_FILE: &str = "index.html";

/// Output directory for tag listings.
pub const TAGS_DIR: &str = "tags";

const MARKDOWN_EXT: &str = "md";

/// View used for posts, and the fallback for any unresolvable view.
pub const SINGLE_VIEW: &str = "single";
pub const PAGE_VIEW: &str = "page";
pub const LIST_VIEW: &str = "list";
pub const HOME_VIEW: &str = "home";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Templates,
    Content,
    Static,
    Pages,
    Tags,
    Home,
    Sitemap,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Templates => "templates",
            Phase::Content => "content",
            Phase::Static => "static",
            Phase::Pages => "pages",
            Phase::Tags => "tags",
            Phase::Home => "home",
            Phase::Sitemap => "sitemap",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] ThreadPoolBuildError),
    #[error("{phase} phase failed on {job} ({failed} failed job(s)): {source}")]
    Phase {
        phase: Phase,
        job: String,
        failed: usize,
        #[source]
        source: Box<BuildError>,
    },
    #[error("{phase} phase failed ({failed} failed job(s)): a job panicked: {message}")]
    Panicked {
        phase: Phase,
        failed: usize,
        message: String,
    },
}

impl BuildError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A failed job, tagged with what it was working on.
#[derive(Debug)]
struct JobError {
    job: String,
    error: BuildError,
}

impl JobError {
    fn new(job: impl fmt::Display, error: impl Into<BuildError>) -> Self {
        Self {
            job: job.to_string(),
            error: error.into(),
        }
    }
}

/// Results of a parallel phase, or its first error. Panicked jobs count as
/// failures and are reported when no job returned an error.
fn collect<R>(phase: Phase, outcome: PoolOutcome<R, JobError>) -> Result<Vec<R>, BuildError> {
    let failed = outcome.failed();
    if let Some(JobError { job, error }) = outcome.errors.into_iter().next() {
        tracing::error!(%phase, %job, failed, "phase failed");
        return Err(BuildError::Phase {
            phase,
            job,
            failed,
            source: Box::new(error),
        });
    }
    if let Some(message) = outcome.panics.into_iter().next() {
        tracing::error!(%phase, failed, "phase failed");
        return Err(BuildError::Panicked {
            phase,
            failed,
            message,
        });
    }
    Ok(outcome.results)
}

/// Summary of one successful build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub templates: LoadSummary,
    /// Published pages rendered.
    pub pages: usize,
    pub posts: usize,
    /// Draft pages loaded and left out of every output.
    pub drafts: usize,
    /// Tag listings rendered, by tag.
    pub tags: BTreeMap<String, usize>,
    pub assets: usize,
    pub sitemap_entries: usize,
    pub workers: usize,
    pub output_dir: PathBuf,
    pub elapsed: Duration,
}

/// Summary of `check`: everything a build would read, nothing written.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub views: Vec<String>,
    pub pages: usize,
    pub posts: usize,
    pub drafts: usize,
    pub tags: Vec<String>,
}

/// Loaded content, split into what gets published and what doesn't.
#[derive(Debug, Default)]
pub struct SiteContent {
    /// Non-draft pages, sorted by URL.
    pub published: Vec<Page>,
    pub drafts: Vec<Page>,
}

impl SiteContent {
    fn from_pages(pages: Vec<Page>) -> Self {
        let (drafts, mut published): (Vec<Page>, Vec<Page>) = pages.into_iter().partition(|p| p.draft);
        published.sort_by(|a, b| a.url.cmp(&b.url));
        Self { published, drafts }
    }

    /// Tag → published pages bearing it, newest first.
    pub fn tag_index(&self) -> BTreeMap<&str, Vec<&Page>> {
        let mut index: BTreeMap<&str, Vec<&Page>> = BTreeMap::new();
        for page in &self.published {
            for tag in &page.tags {
                let pages = index.entry(tag.as_str()).or_default();
                // A tag declared twice on one page lists the page once
                if !pages.iter().any(|p| p.path == page.path) {
                    pages.push(page);
                }
            }
        }
        for pages in index.values_mut() {
            sort_newest_first(pages);
        }
        index
    }

    /// Published posts, newest first.
    pub fn posts(&self) -> Vec<&Page> {
        let mut posts: Vec<&Page> = self.published.iter().filter(|p| p.is_post).collect();
        sort_newest_first(&mut posts);
        posts
    }
}

/// Date descending; URL breaks ties so output is deterministic.
pub fn sort_newest_first(pages: &mut [&Page]) {
    pages.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.url.cmp(&b.url)));
}

/// `<output>/<url without trailing slash>/index.html`.
pub fn page_output_path(output_root: &Path, url: &str) -> PathBuf {
    let trimmed = url.trim_matches('/');
    if trimmed.is_empty() {
        output_root.join(INDEX_FILE)
    } else {
        output_root.join(trimmed).join(INDEX_FILE)
    }
}

/// `<output>/tags/<tag>/index.html`. Path separators in the tag are flattened
/// to `-`, as is every dot of a `.` or `..` tag, so each tag stays one
/// directory under `tags/`.
pub fn tag_output_path(output_root: &Path, tag: &str) -> PathBuf {
    let dir: String = if tag == "." || tag == ".." {
        "-".repeat(tag.len())
    } else {
        tag.chars()
            .map(|c| if c == '/' || c == '\\' { '-' } else { c })
            .collect()
    };
    output_root.join(TAGS_DIR).join(dir).join(INDEX_FILE)
}

/// Runs builds for one site.
///
/// Owns the template resolver so its cache carries over between builds of a
/// watch session. Concurrent [`build`](Self::build) calls run one at a time.
#[derive(Debug)]
pub struct Builder {
    config: SiteConfig,
    paths: SitePaths,
    resolver: TemplateResolver,
    executor: ParallelExecutor,
    build_lock: Mutex<()>,
}

impl Builder {
    pub fn new(site_root: &Path, config: SiteConfig) -> Self {
        let paths = config.paths(site_root);
        let resolver = TemplateResolver::new(&paths.theme_layouts, &paths.layouts);
        let executor = ParallelExecutor::new(config::effective_workers(&config.build));
        Self {
            config,
            paths,
            resolver,
            executor,
            build_lock: Mutex::new(()),
        }
    }

    /// Builder for the site at `site_root`, reading its `config.toml`.
    pub fn open(site_root: &Path) -> Result<Self, BuildError> {
        let config = config::load_config(site_root)?;
        Ok(Self::new(site_root, config))
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn paths(&self) -> &SitePaths {
        &self.paths
    }

    pub fn resolver(&self) -> &TemplateResolver {
        &self.resolver
    }

    /// Toggle the template cache. Off recompiles every view on every build.
    pub fn set_caching(&self, enabled: bool) {
        self.resolver.set_caching(enabled);
    }

    /// Run one full build.
    pub fn build(&self) -> Result<BuildReport, BuildError> {
        let _guard = self.build_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let started = Instant::now();
        let output = &self.paths.output;
        tracing::info!(site = %self.paths.root.display(), "build started");

        let templates = timed(Phase::Templates, || self.resolver.load_templates().map_err(BuildError::from))?;
        let content = timed(Phase::Content, || self.load_content())?;

        fs::create_dir_all(output).map_err(|e| BuildError::io(output, e))?;
        let assets = timed(Phase::Static, || self.copy_static())?;
        timed(Phase::Pages, || self.render_pages(&content.published))?;

        let tag_index = content.tag_index();
        timed(Phase::Tags, || self.render_tags(&tag_index))?;

        let posts = content.posts();
        timed(Phase::Home, || self.render_home(&posts))?;

        let entries = sitemap::entries_for(&content.published, &self.config.base_url, Utc::now().date_naive());
        timed(Phase::Sitemap, || {
            sitemap::write(output, &entries).map_err(|e| BuildError::io(&output.join(sitemap::SITEMAP_FILE), e))
        })?;

        let report = BuildReport {
            templates,
            pages: content.published.len(),
            posts: posts.len(),
            drafts: content.drafts.len(),
            tags: tag_index
                .iter()
                .map(|(tag, pages)| (tag.to_string(), pages.len()))
                .collect(),
            assets,
            sitemap_entries: entries.len(),
            workers: self.executor.parallelism(),
            output_dir: output.clone(),
            elapsed: started.elapsed(),
        };
        tracing::info!(
            pages = report.pages,
            drafts = report.drafts,
            tags = report.tags.len(),
            assets = report.assets,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "build finished"
        );
        Ok(report)
    }

    /// Load config, views and content the way a build would, without writing.
    ///
    /// Also verifies every published page resolves to a view.
    pub fn check(&self) -> Result<CheckReport, BuildError> {
        self.resolver.load_templates()?;
        let content = self.load_content()?;
        for page in &content.published {
            self.resolve_view(page)
                .map_err(|e| BuildError::Phase {
                    phase: Phase::Pages,
                    job: page.path.display().to_string(),
                    failed: 1,
                    source: Box::new(e.into()),
                })?;
        }
        Ok(CheckReport {
            views: self.resolver.view_names(),
            pages: content.published.len(),
            posts: content.posts().len(),
            drafts: content.drafts.len(),
            tags: content.tag_index().keys().map(|t| t.to_string()).collect(),
        })
    }

    /// Load every markdown file under the content root.
    pub fn load_content(&self) -> Result<SiteContent, BuildError> {
        let files = markdown_files(&self.paths.content)?;
        let loader = PageLoader::new(&self.paths.content, &self.config.base_url, self.config.trailing_slash);

        let outcome = self.executor.run(files, |path: PathBuf| {
            loader
                .load(&path)
                .map(Some)
                .map_err(|e| JobError::new(path.display(), e))
        })?;
        let content = SiteContent::from_pages(collect(Phase::Content, outcome)?);
        tracing::debug!(
            published = content.published.len(),
            drafts = content.drafts.len(),
            "content loaded"
        );
        Ok(content)
    }

    /// Copy theme then site static files into the output root.
    fn copy_static(&self) -> Result<usize, BuildError> {
        let sources = static_files(&self.paths.theme_static, &self.paths.static_files)?;
        let output = &self.paths.output;
        let jobs: Vec<(PathBuf, PathBuf)> = sources
            .into_iter()
            .map(|(relative, source)| (source, output.join(relative)))
            .collect();

        let outcome = self.executor.run(jobs, |(source, dest): (PathBuf, PathBuf)| {
            copy_file(&source, &dest)
                .map(Some)
                .map_err(|e| JobError::new(source.display(), e))
        })?;
        Ok(collect(Phase::Static, outcome)?.len())
    }

    fn render_pages(&self, pages: &[Page]) -> Result<usize, BuildError> {
        let site = &self.config;
        let output = &self.paths.output;
        let jobs: Vec<&Page> = pages.iter().collect();

        let outcome = self.executor.run(jobs, |page: &Page| {
            let render = || -> Result<(), BuildError> {
                let view = self.resolve_view(page)?;
                let mut ctx = tera::Context::new();
                ctx.insert("site", site);
                ctx.insert("page", page);
                ctx.insert("title", &page.title);
                ctx.insert("content", &page.html);
                write_page(&page_output_path(output, &page.url), &view.render(&ctx)?)
            };
            render()
                .map(Some)
                .map_err(|e| JobError::new(page.path.display(), e))
        })?;
        Ok(collect(Phase::Pages, outcome)?.len())
    }

    fn render_tags(&self, index: &BTreeMap<&str, Vec<&Page>>) -> Result<usize, BuildError> {
        let site = &self.config;
        let output = &self.paths.output;
        let jobs: Vec<(&str, &Vec<&Page>)> = index.iter().map(|(tag, pages)| (*tag, pages)).collect();

        let outcome = self.executor.run(jobs, |(tag, pages): (&str, &Vec<&Page>)| {
            let render = || -> Result<(), BuildError> {
                let view = self.resolver.get(LIST_VIEW)?;
                let mut ctx = tera::Context::new();
                ctx.insert("site", site);
                ctx.insert("title", &format!("Tag: {tag}"));
                ctx.insert("tag", tag);
                ctx.insert("pages", pages);
                write_page(&tag_output_path(output, tag), &view.render(&ctx)?)
            };
            render()
                .map(Some)
                .map_err(|e| JobError::new(format!("tag '{tag}'"), e))
        })?;
        Ok(collect(Phase::Tags, outcome)?.len())
    }

    fn render_home(&self, posts: &[&Page]) -> Result<(), BuildError> {
        let wrap = |error: BuildError| BuildError::Phase {
            phase: Phase::Home,
            job: INDEX_FILE.to_string(),
            failed: 1,
            source: Box::new(error),
        };
        let view = self
            .resolver
            .get(HOME_VIEW)
            .or_else(|_| self.resolver.get(LIST_VIEW))
            .map_err(|e| wrap(e.into()))?;

        let mut ctx = tera::Context::new();
        ctx.insert("site", &self.config);
        ctx.insert("title", &self.config.title);
        ctx.insert("pages", posts);
        let html = view.render(&ctx).map_err(|e| wrap(e.into()))?;
        write_page(&self.paths.output.join(INDEX_FILE), &html).map_err(wrap)
    }

    /// Layout override, else `single` for posts and `page` otherwise.
    /// Anything that does not resolve falls back to `single`.
    fn resolve_view(&self, page: &Page) -> Result<Arc<CompiledView>, TemplateError> {
        let name = match &page.layout {
            Some(layout) => layout.as_str(),
            None if page.is_post => SINGLE_VIEW,
            None => PAGE_VIEW,
        };
        self.resolver.get(name).or_else(|err| {
            if name == SINGLE_VIEW {
                return Err(err);
            }
            tracing::debug!(view = name, page = %page.path.display(), "view not found, using single");
            self.resolver.get(SINGLE_VIEW)
        })
    }
}

/// Run one phase, logging how long it took.
fn timed<T>(phase: Phase, run: impl FnOnce() -> Result<T, BuildError>) -> Result<T, BuildError> {
    let started = Instant::now();
    let result = run();
    if result.is_ok() {
        tracing::info!(%phase, elapsed_ms = started.elapsed().as_millis() as u64, "phase done");
    }
    result
}

/// Every `*.md` file under `root`, sorted. A missing root has none.
pub fn markdown_files(root: &Path) -> Result<Vec<PathBuf>, BuildError> {
    if !root.is_dir() {
        tracing::warn!(dir = %root.display(), "content directory not found");
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        let is_markdown = entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == MARKDOWN_EXT);
        if is_markdown {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Relative path → source file, theme first, site files replacing theme ones.
pub fn static_files(theme: &Path, site: &Path) -> Result<BTreeMap<PathBuf, PathBuf>, BuildError> {
    let mut files = BTreeMap::new();
    for root in [theme, site] {
        if !root.is_dir() {
            continue;
        }
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| walk_error(root, e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(root) {
                files.insert(relative.to_path_buf(), entry.path().to_path_buf());
            }
        }
    }
    Ok(files)
}

fn walk_error(root: &Path, err: walkdir::Error) -> BuildError {
    let path = err.path().unwrap_or(root).to_path_buf();
    BuildError::Io {
        path,
        source: err.into(),
    }
}

fn copy_file(source: &Path, dest: &Path) -> Result<(), BuildError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }
    fs::copy(source, dest).map_err(|e| BuildError::io(dest, e))?;
    Ok(())
}

fn write_page(path: &Path, html: &str) -> Result<(), BuildError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }
    fs::write(path, html).map_err(|e| BuildError::io(path, e))
}
