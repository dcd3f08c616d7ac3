use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zimview::config::{self, CONFIG_FILENAME, ViewerConfig};
use zimview::source::ArchiveSource;
use zimview::store::{ContentStore, FetchOutcome};
use zimview::{check, output};

#[derive(Parser)]
#[command(name = "zimview")]
#[command(about = "Load and render pages of an offline archive viewer")]
#[command(long_about = "\
Load and render pages of an offline archive viewer

The archive directory holds the viewer's content documents:

  <archive>/
  └── content/
      ├── shared.json              # Page manifest (logo, root page, pages, scripts)
      ├── home.json                # Welcome paragraphs
      ├── page_content_1.json      # One document per page id
      └── ...

Rendering a page runs the full pipeline: the page body is mounted, formula
numbering is configured from the title, WebP images are inlined as PNG when
the target cannot decode them, and long subpage listings are collapsed.

Run 'zimview gen-config' to generate a documented zimview.toml.")]
#[command(version)]
struct Cli {
    /// Archive directory
    #[arg(long, default_value = ".", global = true)]
    archive: PathBuf,

    /// Config file [default: ./zimview.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the pages of the shared manifest
    Pages,
    /// Render one page to a standalone HTML document
    Render {
        /// Page path from the manifest [default: root page]
        path: Option<String>,
        /// Write the document here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Print the welcome paragraphs of the home document
    Home,
    /// Load every page and report failures and unreferenced documents
    Check,
    /// Print a stock zimview.toml with all options documented
    GenConfig,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let viewer_config = resolve_viewer_config(cli.config.as_deref())?;
    let source = ArchiveSource::from_settings(&cli.archive, &viewer_config.archive.base_url)?;
    let store = ContentStore::from_config(source, &viewer_config);

    match cli.command {
        Command::Pages => {
            load_shared(&store).await?;
            if let Some(shared) = store.shared() {
                output::print_pages(&shared);
            }
        }
        Command::Render { path, output } => {
            load_shared(&store).await?;
            let page = match path {
                Some(path) => store
                    .page_for_path(&path)
                    .ok_or_else(|| format!("No page with path {path:?} in the manifest"))?,
                None => store
                    .root_page()
                    .ok_or("The manifest's root page is not among its pages")?,
            };
            if let FetchOutcome::Failed(_) = store.fetch_page_content(&page).await {
                return Err(failure(&store).into());
            }
            let html = store.export_html();
            match output {
                Some(out) => {
                    std::fs::write(&out, html)?;
                    println!("==> Rendered {} → {}", page.title, out.display());
                }
                None => print!("{}", html),
            }
        }
        Command::Home => {
            if let FetchOutcome::Failed(_) = store.fetch_home().await {
                return Err(failure(&store).into());
            }
            if let Some(home) = store.home() {
                output::print_home(&home);
            }
        }
        Command::Check => {
            println!("==> Checking {}", cli.archive.display());
            load_shared(&store).await?;
            let mut report = check::check_pages(&store).await;
            if viewer_config.archive.base_url.is_empty() {
                let known: HashSet<String> = store
                    .shared()
                    .map(|shared| shared.pages.into_iter().map(|p| p.id).collect())
                    .unwrap_or_default();
                report.orphans = check::find_orphans(&cli.archive, &known);
            }
            output::print_check_report(&report);
            if !report.is_clean() {
                return Err("Archive check failed".into());
            }
            println!("==> Archive is valid");
        }
        Command::GenConfig => unreachable!("handled before the store is built"),
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(level)
        .init();
}

/// Load an explicitly requested config file, or `./zimview.toml` if present.
fn resolve_viewer_config(path: Option<&Path>) -> Result<ViewerConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) if !path.exists() => {
            Err(format!("Config file not found: {}", path.display()).into())
        }
        Some(path) => Ok(config::load_config(path)?),
        None => Ok(config::load_config(Path::new(CONFIG_FILENAME))?),
    }
}

async fn load_shared(store: &ContentStore<ArchiveSource>) -> Result<(), String> {
    match store.fetch_shared().await {
        FetchOutcome::Failed(_) => Err(failure(store)),
        _ => Ok(()),
    }
}

/// The store's error message, with details when there are any.
fn failure(store: &ContentStore<ArchiveSource>) -> String {
    let details = store.error_details();
    if details.is_empty() {
        store.error_message()
    } else {
        format!("{} {}", store.error_message(), details)
    }
}
