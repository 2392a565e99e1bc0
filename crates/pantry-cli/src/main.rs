use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use pantry::auth;
use pantry::engine::{Reporter, Uploader};
use pantry::lockfile::TomlLockfile;
use pantry::store::HttpStore;
use pantry::validate::FilesystemValidator;
use pantry_config::{Config, DEFAULT_LOCKFILE, find_config, load_config_from_file};
use pantry_types::{ProcessedCookbook, UploadOutcome};

#[derive(Parser, Debug)]
#[command(name = "pantry", version)]
#[command(about = "Upload locked cookbooks to a cookbook store, dependencies first")]
struct Cli {
    /// Config file to use (default: nearest .pantry.toml above the current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Lockfile to read (default: Pantry.lock next to the config file)
    #[arg(long, global = true)]
    lockfile: Option<PathBuf>,

    /// Cookbook store base URL. Overrides `[store] url`.
    #[arg(long, global = true)]
    store_url: Option<String>,

    /// Only print warnings, errors and results.
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the upload order without contacting the store.
    Plan {
        /// Cookbooks to plan. If omitted, plans every locked dependency.
        names: Vec<String>,
    },
    /// Validate, then upload cookbooks in dependency order.
    Upload {
        /// Cookbooks to upload as given, without their dependencies.
        /// If omitted, uploads every locked dependency.
        names: Vec<String>,

        #[command(flatten)]
        flags: UploadArgs,
    },
    /// Run pre-upload validation only.
    Validate {
        names: Vec<String>,
    },
    /// Print config, lockfile and store diagnostics.
    Doctor,
}

#[derive(Args, Debug, Default)]
struct UploadArgs {
    /// Overwrite versions the store already has, unless frozen.
    #[arg(long)]
    force: bool,

    /// Do not mark uploaded versions as frozen.
    #[arg(long)]
    no_freeze: bool,

    /// Stop at the first frozen version instead of skipping it.
    #[arg(long)]
    halt_on_frozen: bool,

    /// Upload without running validation first.
    #[arg(long)]
    skip_validation: bool,
}

impl UploadArgs {
    /// Only flags actually given override the config file.
    fn apply(&self, config: &mut Config) {
        if self.force {
            config.set_upload_option("force", true);
        }
        if self.no_freeze {
            config.set_upload_option("freeze", false);
        }
        if self.halt_on_frozen {
            config.set_upload_option("halt_on_frozen", true);
        }
        if self.skip_validation {
            config.set_upload_option("validate", false);
        }
    }
}

struct CliReporter {
    quiet: bool,
}

impl Reporter for CliReporter {
    fn info(&mut self, msg: &str) {
        if !self.quiet {
            eprintln!("[info] {msg}");
        }
    }

    fn warn(&mut self, msg: &str) {
        eprintln!("[warn] {msg}");
    }

    fn error(&mut self, msg: &str) {
        eprintln!("[error] {msg}");
    }
}

/// Effective settings for one invocation.
struct Settings {
    config: Config,
    /// Config file in use, if any
    config_file: Option<PathBuf>,
    lockfile: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut reporter = CliReporter { quiet: cli.quiet };

    let mut overrides = Config::new();
    if let Commands::Upload { flags, .. } = &cli.cmd {
        flags.apply(&mut overrides);
    }
    let settings = load_settings(&cli, &overrides)?;

    match &cli.cmd {
        Commands::Plan { names } => {
            let lockfile = TomlLockfile::load(&settings.lockfile)?;
            let store = offline_store(&settings.config);
            let uploader = Uploader::new(&lockfile, &FilesystemValidator, &store);
            for (idx, cb) in uploader.plan(names)?.iter().enumerate() {
                println!("{}. {}", idx + 1, cb.label());
            }
        }
        Commands::Upload { names, .. } => {
            let opts = settings.config.upload_options()?;
            let lockfile = TomlLockfile::load(&settings.lockfile)?;
            let store = http_store(&settings.config)?;
            let uploader = Uploader::new(&lockfile, &FilesystemValidator, &store);
            let processed = uploader.run(names, &opts, &mut reporter)?;
            print_processed(&processed);
        }
        Commands::Validate { names } => {
            let lockfile = TomlLockfile::load(&settings.lockfile)?;
            let store = offline_store(&settings.config);
            let uploader = Uploader::new(&lockfile, &FilesystemValidator, &store);
            let cookbooks = uploader.plan(names)?;
            reporter.info(&format!("validating {} cookbook(s)...", cookbooks.len()));
            uploader.validate(&cookbooks)?;
            println!("ok: {} cookbook(s) valid", cookbooks.len());
        }
        Commands::Doctor => {
            run_doctor(&settings, &mut reporter)?;
        }
    }

    Ok(())
}

/// Config file, then CLI overrides; the lockfile path is anchored to the
/// directory of the config file that named it.
fn load_settings(cli: &Cli, overrides: &Config) -> Result<Settings> {
    let cwd = env::current_dir().context("failed to determine current directory")?;

    let config_file = match &cli.config {
        Some(path) => Some(cwd.join(path)),
        None => find_config(&cwd),
    };
    let file_config = match &config_file {
        Some(path) => load_config_from_file(path)?,
        None => Config::default(),
    };
    let base_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .map_or_else(|| cwd.clone(), Path::to_path_buf);

    let mut overrides = overrides.clone();
    if let Some(url) = &cli.store_url {
        overrides.set_store_url(url.as_str());
    }
    if let Some(lock) = &cli.lockfile {
        overrides.set_lockfile_path(cwd.join(lock));
    }

    let config = file_config.merge(&overrides);
    let lockfile = base_dir.join(config.lockfile_path().unwrap_or(Path::new(DEFAULT_LOCKFILE)));

    Ok(Settings {
        config,
        config_file,
        lockfile,
    })
}

fn http_store(config: &Config) -> Result<HttpStore> {
    let url = config
        .store_url()
        .context("no store URL configured; pass --store-url or set [store] url in .pantry.toml")?;
    let token = auth::resolve_token(url, config.token())?;
    Ok(HttpStore::new(url)
        .with_token(token)
        .with_timeout(config.timeout()))
}

/// Store handle for commands that never connect.
fn offline_store(config: &Config) -> HttpStore {
    HttpStore::new(config.store_url().unwrap_or_default())
}

fn print_processed(processed: &[ProcessedCookbook]) {
    for p in processed {
        let outcome = match &p.outcome {
            UploadOutcome::Uploaded if p.cookbook.frozen => "uploaded, frozen".to_string(),
            UploadOutcome::Skipped { reason } => format!("skipped, {reason}"),
            other => other.short().to_string(),
        };
        let elapsed = Duration::from_millis(u64::try_from(p.duration_ms).unwrap_or(u64::MAX));
        println!(
            "{}: {outcome} ({})",
            p.cookbook.label(),
            humantime::format_duration(elapsed)
        );
    }
}

fn run_doctor(settings: &Settings, reporter: &mut dyn Reporter) -> Result<()> {
    match &settings.config_file {
        Some(path) => println!("config: {}", path.display()),
        None => println!("config: (none)"),
    }

    println!("lockfile: {}", settings.lockfile.display());
    match TomlLockfile::load(&settings.lockfile) {
        Ok(lock) => println!("locked_cookbooks: {}", lock.len()),
        Err(e) => reporter.warn(&format!("{:#}", anyhow::Error::from(e))),
    }

    let Some(url) = settings.config.store_url() else {
        println!("store: (not configured)");
        return Ok(());
    };
    println!("store: {url}");
    println!("user_agent: {}", pantry_store::USER_AGENT);

    let store = http_store(&settings.config)?;
    let client = store.client();
    println!("token_detected: {}", client.has_token());

    match client.ping() {
        Ok(status) => println!("store_status: {status}"),
        Err(e) => reporter.warn(&format!("store unreachable: {e:#}")),
    }

    Ok(())
}
