use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use scribe::build::Builder;
use scribe::content::{self, ContentKind};
use scribe::{config, output, serve, watch};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scribe")]
#[command(about = "Static site generator for markdown content")]
#[command(long_about = "\
Static site generator for markdown content

Markdown files with front matter become HTML pages, rendered through theme
views that the site can override file by file.

Site structure:

  my-site/
  ├── config.toml                  # Site config (optional)
  ├── content/
  │   ├── about.md                 # → about/index.html
  │   └── posts/
  │       └── hello.md             # Post → posts/hello/index.html
  ├── layouts/                     # Site views, replace same-named theme views
  ├── static/                      # Site assets, replace same-named theme assets
  └── themes/default/
      ├── layouts/                 # base.html, single.html, page.html, list.html, home.html
      └── static/

Every build also writes one listing per tag (tags/<tag>/index.html), a home
page of posts (index.html) and sitemap.xml. Drafts are never published.

Run 'scribe serve' for a local preview at http://localhost:8080/ and
'scribe gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Site root directory
    #[arg(long, default_value = ".", global = true)]
    site: PathBuf,

    /// Only log warnings and errors
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a full build
    Build,
    /// Build, then rebuild whenever sources change
    Watch {
        /// Recompile every template on every rebuild
        #[arg(long)]
        no_cache: bool,
    },
    /// Build, watch, and serve the output over HTTP
    Serve {
        /// Port to listen on (localhost)
        #[arg(long, short, default_value_t = serve::DEFAULT_PORT)]
        port: u16,
        /// Recompile every template on every rebuild
        #[arg(long)]
        no_cache: bool,
    },
    /// Create a new post or page
    New {
        kind: NewKind,
        /// Title of the new content
        title: String,
        /// Mark the new content as a draft
        #[arg(long)]
        draft: bool,
    },
    /// Validate config, templates and content without writing output
    Check,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum NewKind {
    Post,
    Page,
}

impl From<NewKind> for ContentKind {
    fn from(kind: NewKind) -> Self {
        match kind {
            NewKind::Post => ContentKind::Post,
            NewKind::Page => ContentKind::Page,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    match cli.command {
        Command::Build => {
            let builder = Builder::open(&cli.site)?;
            let report = builder.build()?;
            output::print_build_report(&report, &cli.site);
        }
        Command::Watch { no_cache } => {
            watch::watch(&cli.site, !no_cache, |report| {
                output::print_build_report(report, &cli.site);
            })?;
        }
        Command::Serve { port, no_cache } => {
            serve::serve(&cli.site, port, !no_cache, |report| {
                output::print_build_report(report, &cli.site);
            })?;
        }
        Command::New { kind, title, draft } => {
            let site_config = config::load_config(&cli.site)?;
            let content_root = site_config.paths(&cli.site).content;
            let path = content::create_content(&content_root, kind.into(), &title, draft, Utc::now())?;
            println!("{}", output::format_created(&path, &cli.site));
        }
        Command::Check => {
            let builder = Builder::open(&cli.site)?;
            let report = builder.check()?;
            output::print_check_report(&report);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`, `warn` when quiet).
fn init_tracing(quiet: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
