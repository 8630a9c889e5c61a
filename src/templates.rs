//! View resolution: theme and site layouts merged into compiled, cached views.
//!
//! ## Layout Directories
//!
//! ```text
//! themes/<theme>/layouts/        layouts/ (site)
//! ├── base.html                  ├── base.html      (only if the theme has none)
//! ├── single.html                └── single.html    (replaces the theme's)
//! ├── page.html
//! ├── list.html
//! └── home.html
//! ```
//!
//! Every `*.html` file other than the base layout is a view named after its
//! file stem. A view's file list is always `[base, view file]`: a site file
//! with the same name replaces the theme file instead of being appended.
//! Views must extend the base with `{% extends "base.html" %}`; a view that
//! does not fails to compile, so every page is framed by the base layout.
//!
//! The base layout is taken from the theme first, then the site. A site with
//! neither cannot build.
//!
//! ## Caching
//!
//! Each compiled view remembers its file list and the newest modification time
//! across it. [`TemplateResolver::load_templates`] reuses the cached
//! [`CompiledView`] (the same `Arc`) unless caching is off, the file list
//! changed, or a file is now newer than the cached maximum. See
//! [`needs_recompile`].

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;
use tera::{Context, Tera};
use thiserror::Error;

/// File name of the shared outer layout.
pub const BASE_LAYOUT: &str = "base.html";

/// View name under which the bare base layout is registered.
pub const BASE_VIEW: &str = "base";

const TEMPLATE_EXT: &str = "html";

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("no base.html found in {} or {}", theme.display(), site.display())]
    Configuration { theme: PathBuf, site: PathBuf },
    #[error("template not found: {0}")]
    NotFound(String),
    #[error("failed to read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to compile view '{view}': {message}")]
    Compile { view: String, message: String },
    #[error("failed to render view '{view}': {message}")]
    Render { view: String, message: String },
}

/// A view compiled from its file list, ready to render.
#[derive(Debug)]
pub struct CompiledView {
    name: String,
    files: Vec<PathBuf>,
    max_mtime: SystemTime,
    /// Name of the template to render inside `tera`.
    entry: String,
    tera: Tera,
}

impl CompiledView {
    fn compile(name: &str, files: Vec<PathBuf>, max_mtime: SystemTime) -> Result<Self, TemplateError> {
        let mut sources = Vec::with_capacity(files.len());
        for path in &files {
            let source = fs::read_to_string(path).map_err(|source| TemplateError::Io {
                path: path.clone(),
                source,
            })?;
            sources.push((template_name(path), source));
        }
        let entry = sources
            .last()
            .map(|(entry, _)| entry.clone())
            .unwrap_or_else(|| BASE_LAYOUT.to_string());

        let mut tera = Tera::default();
        tera.add_raw_templates(sources)
            .map_err(|e| TemplateError::Compile {
                view: name.to_string(),
                message: describe(&e),
            })?;

        if entry != BASE_LAYOUT && !extends_base(&tera, &entry) {
            return Err(TemplateError::Compile {
                view: name.to_string(),
                message: format!("{entry} must extend \"{BASE_LAYOUT}\""),
            });
        }

        Ok(Self {
            name: name.to_string(),
            files,
            max_mtime,
            entry,
            tera,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source files, base layout first.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn max_mtime(&self) -> SystemTime {
        self.max_mtime
    }

    pub fn render(&self, context: &Context) -> Result<String, TemplateError> {
        self.tera
            .render(&self.entry, context)
            .map_err(|e| TemplateError::Render {
                view: self.name.clone(),
                message: describe(&e),
            })
    }
}

/// Whether the `extends` chain starting at `entry` reaches the base layout.
fn extends_base(tera: &Tera, entry: &str) -> bool {
    let mut current = entry;
    // Tera rejects circular extends while building, so this terminates
    while let Ok(template) = tera.get_template(current) {
        match template.parent.as_deref() {
            Some(BASE_LAYOUT) => return true,
            Some(parent) => current = parent,
            None => return false,
        }
    }
    false
}

/// Counts from one [`TemplateResolver::load_templates`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub views: usize,
    pub compiled: usize,
    pub reused: usize,
}

/// Resolves view names to compiled templates for one theme/site pair.
///
/// The cache is read concurrently while pages render and written only by
/// [`load_templates`](Self::load_templates).
#[derive(Debug)]
pub struct TemplateResolver {
    theme_dir: PathBuf,
    site_dir: PathBuf,
    caching: AtomicBool,
    cache: RwLock<HashMap<String, Arc<CompiledView>>>,
}

impl TemplateResolver {
    pub fn new(theme_dir: impl Into<PathBuf>, site_dir: impl Into<PathBuf>) -> Self {
        Self {
            theme_dir: theme_dir.into(),
            site_dir: site_dir.into(),
            caching: AtomicBool::new(true),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_caching(&self, enabled: bool) {
        self.caching.store(enabled, Ordering::SeqCst);
    }

    pub fn caching_enabled(&self) -> bool {
        self.caching.load(Ordering::SeqCst)
    }

    /// Discover every view and bring the cache up to date.
    ///
    /// Views whose files disappeared are dropped from the cache.
    pub fn load_templates(&self) -> Result<LoadSummary, TemplateError> {
        let base = self.find_base()?;
        let views = self.discover_views(&base)?;
        let caching = self.caching_enabled();

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let mut fresh = HashMap::with_capacity(views.len());
        let mut summary = LoadSummary {
            views: views.len(),
            ..Default::default()
        };

        for (name, files) in views {
            let max_mtime = max_mtime(&files)?;
            let cached = cache.get(&name);
            let stale = needs_recompile(
                cached.map(|view| (view.files(), view.max_mtime())),
                &files,
                max_mtime,
                caching,
            );

            let view = match cached {
                Some(view) if !stale => {
                    tracing::debug!(view = %name, "template cache hit");
                    summary.reused += 1;
                    Arc::clone(view)
                }
                _ => {
                    tracing::debug!(view = %name, files = files.len(), "compiling template");
                    summary.compiled += 1;
                    Arc::new(CompiledView::compile(&name, files, max_mtime)?)
                }
            };
            fresh.insert(name, view);
        }

        *cache = fresh;
        tracing::info!(
            views = summary.views,
            compiled = summary.compiled,
            reused = summary.reused,
            "templates loaded"
        );
        Ok(summary)
    }

    /// The compiled view registered under `name` by the last load.
    pub fn get(&self, name: &str) -> Result<Arc<CompiledView>, TemplateError> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }

    /// Registered view names, sorted.
    pub fn view_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn find_base(&self) -> Result<PathBuf, TemplateError> {
        [&self.theme_dir, &self.site_dir]
            .into_iter()
            .map(|dir| dir.join(BASE_LAYOUT))
            .find(|path| path.is_file())
            .ok_or_else(|| TemplateError::Configuration {
                theme: self.theme_dir.clone(),
                site: self.site_dir.clone(),
            })
    }

    /// View name → file list. Site files replace theme files of the same name.
    fn discover_views(&self, base: &Path) -> Result<BTreeMap<String, Vec<PathBuf>>, TemplateError> {
        let mut views = BTreeMap::new();
        views.insert(BASE_VIEW.to_string(), vec![base.to_path_buf()]);
        for dir in [&self.theme_dir, &self.site_dir] {
            for (name, path) in list_views(dir)? {
                views.insert(name, vec![base.to_path_buf(), path]);
            }
        }
        Ok(views)
    }
}

/// Whether a view must be compiled again.
///
/// `cached` is the cached file list and max mtime, if the view was cached.
pub fn needs_recompile(
    cached: Option<(&[PathBuf], SystemTime)>,
    files: &[PathBuf],
    max_mtime: SystemTime,
    caching: bool,
) -> bool {
    if !caching {
        return true;
    }
    match cached {
        None => true,
        Some((cached_files, cached_mtime)) => cached_files != files || max_mtime > cached_mtime,
    }
}

/// `*.html` files in `dir` other than the base layout, as (view name, path).
fn list_views(dir: &Path) -> Result<Vec<(String, PathBuf)>, TemplateError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|source| TemplateError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut views = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| TemplateError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        let is_view = path.is_file()
            && path.extension().is_some_and(|ext| ext == TEMPLATE_EXT)
            && path.file_name().is_some_and(|name| name != BASE_LAYOUT);
        if !is_view {
            continue;
        }
        if let Some(stem) = path.file_stem() {
            views.push((stem.to_string_lossy().into_owned(), path));
        }
    }
    views.sort();
    Ok(views)
}

fn max_mtime(files: &[PathBuf]) -> Result<SystemTime, TemplateError> {
    let mut newest = SystemTime::UNIX_EPOCH;
    for path in files {
        let modified = fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map_err(|source| TemplateError::Io {
                path: path.clone(),
                source,
            })?;
        newest = newest.max(modified);
    }
    Ok(newest)
}

fn template_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Tera keeps the useful detail in the source chain.
fn describe(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::TempDir;

    const BASE: &str = "<html><body>{% block main %}{% endblock main %}</body></html>";

    struct Dirs {
        _tmp: TempDir,
        theme: PathBuf,
        site: PathBuf,
    }

    fn dirs() -> Dirs {
        let tmp = TempDir::new().unwrap();
        let theme = tmp.path().join("themes/default/layouts");
        let site = tmp.path().join("layouts");
        fs::create_dir_all(&theme).unwrap();
        fs::create_dir_all(&site).unwrap();
        Dirs {
            _tmp: tmp,
            theme,
            site,
        }
    }

    fn view(body: &str) -> String {
        format!("{{% extends \"base.html\" %}}{{% block main %}}{body}{{% endblock main %}}")
    }

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn touch(path: &Path, later_by: Duration) {
        let mtime = fs::metadata(path).unwrap().modified().unwrap() + later_by;
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
    }

    fn render(resolver: &TemplateResolver, name: &str) -> String {
        let mut ctx = Context::new();
        ctx.insert("title", "T");
        resolver.get(name).unwrap().render(&ctx).unwrap()
    }

    // =========================================================================
    // Merging
    // =========================================================================

    #[test]
    fn theme_views_are_registered() {
        let d = dirs();
        write(&d.theme, "base.html", BASE);
        write(&d.theme, "single.html", &view("single {{ title }}"));
        write(&d.theme, "list.html", &view("list"));

        let resolver = TemplateResolver::new(&d.theme, &d.site);
        let summary = resolver.load_templates().unwrap();

        assert_eq!(summary.views, 3);
        assert_eq!(resolver.view_names(), vec!["base", "list", "single"]);
        assert_eq!(render(&resolver, "single"), "<html><body>single T</body></html>");
    }

    #[test]
    fn site_view_replaces_theme_view() {
        let d = dirs();
        let base = write(&d.theme, "base.html", BASE);
        write(&d.theme, "single.html", &view("theme"));
        let site_single = write(&d.site, "single.html", &view("site"));

        let resolver = TemplateResolver::new(&d.theme, &d.site);
        resolver.load_templates().unwrap();

        let single = resolver.get("single").unwrap();
        assert_eq!(single.files(), &[base, site_single]);
        assert_eq!(render(&resolver, "single"), "<html><body>site</body></html>");
    }

    #[test]
    fn site_only_view_is_added() {
        let d = dirs();
        write(&d.theme, "base.html", BASE);
        write(&d.site, "about.html", &view("about"));

        let resolver = TemplateResolver::new(&d.theme, &d.site);
        resolver.load_templates().unwrap();
        assert_eq!(render(&resolver, "about"), "<html><body>about</body></html>");
    }

    #[test]
    fn base_falls_back_to_site_layouts() {
        let d = dirs();
        let base = write(&d.site, "base.html", BASE);
        write(&d.theme, "page.html", &view("page"));

        let resolver = TemplateResolver::new(&d.theme, &d.site);
        resolver.load_templates().unwrap();
        assert_eq!(resolver.get("page").unwrap().files()[0], base);
    }

    #[test]
    fn theme_base_wins_over_site_base() {
        let d = dirs();
        let theme_base = write(&d.theme, "base.html", BASE);
        write(&d.site, "base.html", "<p>site base</p>");

        let resolver = TemplateResolver::new(&d.theme, &d.site);
        resolver.load_templates().unwrap();
        assert_eq!(resolver.get(BASE_VIEW).unwrap().files(), &[theme_base]);
    }

    #[test]
    fn missing_base_is_configuration_error() {
        let d = dirs();
        write(&d.theme, "single.html", &view("x"));

        let err = TemplateResolver::new(&d.theme, &d.site).load_templates().unwrap_err();
        assert!(matches!(err, TemplateError::Configuration { .. }));
    }

    #[test]
    fn missing_layout_dirs_is_configuration_error() {
        let tmp = TempDir::new().unwrap();
        let err = TemplateResolver::new(tmp.path().join("nope"), tmp.path().join("nada"))
            .load_templates()
            .unwrap_err();
        assert!(matches!(err, TemplateError::Configuration { .. }));
    }

    #[test]
    fn unknown_view_is_not_found() {
        let d = dirs();
        write(&d.theme, "base.html", BASE);
        let resolver = TemplateResolver::new(&d.theme, &d.site);
        resolver.load_templates().unwrap();

        let err = resolver.get("missing").unwrap_err();
        assert!(matches!(err, TemplateError::NotFound(ref name) if name == "missing"));
    }

    #[test]
    fn broken_template_is_compile_error() {
        let d = dirs();
        write(&d.theme, "base.html", BASE);
        write(&d.theme, "single.html", "{% extends \"base.html\" %}{% block main %}");

        let err = TemplateResolver::new(&d.theme, &d.site).load_templates().unwrap_err();
        assert!(matches!(err, TemplateError::Compile { ref view, .. } if view == "single"));
    }

    #[test]
    fn view_without_base_is_compile_error() {
        let d = dirs();
        write(&d.theme, "base.html", BASE);
        write(&d.theme, "single.html", &view("s"));
        write(&d.site, "page.html", "<main>{{ title }}</main>");

        let err = TemplateResolver::new(&d.theme, &d.site).load_templates().unwrap_err();
        match err {
            TemplateError::Compile { view, message } => {
                assert_eq!(view, "page");
                assert!(message.contains("base.html"), "{message}");
            }
            other => panic!("expected a compile error, got {other:?}"),
        }
    }

    // =========================================================================
    // Caching
    // =========================================================================

    #[test]
    fn unchanged_views_are_reused() {
        let d = dirs();
        write(&d.theme, "base.html", BASE);
        write(&d.theme, "single.html", &view("s"));

        let resolver = TemplateResolver::new(&d.theme, &d.site);
        resolver.load_templates().unwrap();
        let first = resolver.get("single").unwrap();

        let summary = resolver.load_templates().unwrap();
        let second = resolver.get("single").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(summary.compiled, 0);
        assert_eq!(summary.reused, 2);
    }

    #[test]
    fn touching_a_view_file_recompiles_it() {
        let d = dirs();
        write(&d.theme, "base.html", BASE);
        let single = write(&d.theme, "single.html", &view("s"));
        write(&d.theme, "list.html", &view("l"));

        let resolver = TemplateResolver::new(&d.theme, &d.site);
        resolver.load_templates().unwrap();
        let single_before = resolver.get("single").unwrap();
        let list_before = resolver.get("list").unwrap();

        touch(&single, Duration::from_secs(10));
        resolver.load_templates().unwrap();

        assert!(!Arc::ptr_eq(&single_before, &resolver.get("single").unwrap()));
        assert!(Arc::ptr_eq(&list_before, &resolver.get("list").unwrap()));
    }

    #[test]
    fn touching_base_recompiles_every_view() {
        let d = dirs();
        let base = write(&d.theme, "base.html", BASE);
        write(&d.theme, "single.html", &view("s"));

        let resolver = TemplateResolver::new(&d.theme, &d.site);
        resolver.load_templates().unwrap();
        let before = resolver.get("single").unwrap();

        touch(&base, Duration::from_secs(10));
        let summary = resolver.load_templates().unwrap();

        assert!(!Arc::ptr_eq(&before, &resolver.get("single").unwrap()));
        assert_eq!(summary.compiled, 2);
    }

    #[test]
    fn new_site_override_recompiles_view() {
        let d = dirs();
        write(&d.theme, "base.html", BASE);
        write(&d.theme, "single.html", &view("theme"));

        let resolver = TemplateResolver::new(&d.theme, &d.site);
        resolver.load_templates().unwrap();
        let before = resolver.get("single").unwrap();

        write(&d.site, "single.html", &view("site"));
        resolver.load_templates().unwrap();

        assert!(!Arc::ptr_eq(&before, &resolver.get("single").unwrap()));
        assert_eq!(render(&resolver, "single"), "<html><body>site</body></html>");
    }

    #[test]
    fn removed_view_is_dropped() {
        let d = dirs();
        write(&d.theme, "base.html", BASE);
        let list = write(&d.theme, "list.html", &view("l"));

        let resolver = TemplateResolver::new(&d.theme, &d.site);
        resolver.load_templates().unwrap();
        assert!(resolver.get("list").is_ok());

        fs::remove_file(list).unwrap();
        resolver.load_templates().unwrap();
        assert!(matches!(resolver.get("list"), Err(TemplateError::NotFound(_))));
    }

    #[test]
    fn caching_disabled_always_recompiles() {
        let d = dirs();
        write(&d.theme, "base.html", BASE);
        write(&d.theme, "single.html", &view("s"));

        let resolver = TemplateResolver::new(&d.theme, &d.site);
        resolver.set_caching(false);
        assert!(!resolver.caching_enabled());

        resolver.load_templates().unwrap();
        let first = resolver.get("single").unwrap();
        resolver.load_templates().unwrap();
        assert!(!Arc::ptr_eq(&first, &resolver.get("single").unwrap()));

        resolver.set_caching(true);
        resolver.load_templates().unwrap();
        let cached = resolver.get("single").unwrap();
        resolver.load_templates().unwrap();
        assert!(Arc::ptr_eq(&cached, &resolver.get("single").unwrap()));
    }

    #[test]
    fn needs_recompile_rules() {
        let files = vec![PathBuf::from("base.html"), PathBuf::from("single.html")];
        let other = vec![PathBuf::from("base.html"), PathBuf::from("site/single.html")];
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let t1 = t0 + Duration::from_secs(1);

        assert!(needs_recompile(None, &files, t0, true));
        assert!(!needs_recompile(Some((&files, t0)), &files, t0, true));
        assert!(!needs_recompile(Some((&files, t1)), &files, t0, true));
        assert!(needs_recompile(Some((&files, t0)), &files, t1, true));
        assert!(needs_recompile(Some((&files, t0)), &other, t0, true));
        assert!(needs_recompile(Some((&files, t0)), &files, t0, false));
    }
}
