use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fern::Dispatch;
use locsync_core::{
    current_git_branch, find_rule_for, match_sources, CancelFlag, DownloadTranslations,
    HttpPlatformClient, ProjectCache, RunOutcome, SyncConfig, UploadSources, UploadTranslations,
};
use log::LevelFilter;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "locsync",
    version,
    about = "Synchronize translations with a localization platform"
)]
struct Cli {
    /// Configuration file holding one or more groups
    #[arg(short, long, global = true, default_value = "locsync.yml")]
    config: PathBuf,

    /// Branch to synchronize, defaulting to the checked-out git branch;
    /// ignored by groups that disable branches
    #[arg(short, long, global = true)]
    branch: Option<String>,

    /// Only run the named configuration group
    #[arg(short, long, global = true)]
    group: Option<String>,

    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print run results as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build translations remotely and place them into the project
    Download,
    /// Upload local source files, adding the ones the remote project lacks
    Upload {
        /// Upload only this source file
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Upload existing local translations of remote sources
    UploadTranslations {
        /// Restrict the upload to the translations of this source file
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// List the local sources selected by each group
    Sources,
}

fn setup_logger(verbose: bool, debug: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else if verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    let logger = Dispatch::new()
        .format(move |out, message, record| {
            let (color, reset) = match record.level() {
                log::Level::Error => ("\x1b[31m", "\x1b[0m"), // Red
                log::Level::Warn => ("\x1b[33m", "\x1b[0m"),  // Yellow
                log::Level::Info | log::Level::Debug | log::Level::Trace => ("", ""),
            };
            out.finish(format_args!(
                "{}{}: {}{}",
                color,
                record.level(),
                if debug {
                    format!("({}) {}", record.target(), message)
                } else {
                    message.to_string()
                },
                reset
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Err(e) = logger.apply() {
        eprintln!("Failed to apply logger: {:?}", e);
    }
}

fn cancel_on_ctrl_c() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Cancelling, cleaning up the current run");
            flag.cancel();
        }
    });
    cancel
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints a completed result when asked to; reports whether the run was cancelled.
fn finish<T: Serialize>(outcome: RunOutcome<T>, json: bool) -> Result<bool> {
    match outcome {
        RunOutcome::Completed(result) => {
            if json {
                print_json(&result)?;
            }
            Ok(false)
        }
        RunOutcome::Cancelled => Ok(true),
    }
}

fn branch_for(cli: &Cli, base_path: &Path) -> Option<String> {
    cli.branch.clone().or_else(|| current_git_branch(base_path))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut configs = SyncConfig::load_all(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(group) = &cli.group {
        configs.retain(|config| &config.name == group);
        if configs.is_empty() {
            bail!("no configuration group named {group}");
        }
    }
    setup_logger(cli.verbose, configs.iter().any(|config| config.debug));

    let cancel = cancel_on_ctrl_c();
    let cache = ProjectCache::new();
    let file = match &cli.command {
        Command::Upload { file: Some(file) } | Command::UploadTranslations { file: Some(file) } => {
            let resolved = dunce::canonicalize(file)
                .with_context(|| format!("resolving {}", file.display()))?;
            Some(resolved)
        }
        _ => None,
    };
    if let Some(file) = &file {
        // A single-file upload only touches the groups with a rule for it.
        let mut selected = Vec::new();
        for config in configs {
            if find_rule_for(&config.base_path, &config.rules()?, file).is_some() {
                selected.push(config);
            }
        }
        if selected.is_empty() {
            bail!("couldn't find suitable source pattern for {}", file.display());
        }
        configs = selected;
    }

    // Groups run one after another; a cancelled run stops the rest.
    for config in &configs {
        log::info!("[{}] {:?}", config.name, cli.command);

        if matches!(cli.command, Command::Sources) {
            let mut matched = Vec::new();
            for rule in config.rules()? {
                matched.extend(match_sources(&config.base_path, &rule.source)?);
            }
            if cli.json {
                print_json(&matched)?;
            } else {
                for source in &matched {
                    println!("{}\t{}", config.name, source.relative_path);
                }
            }
            continue;
        }

        let branch = branch_for(&cli, &config.base_path);
        let branch = branch.as_deref();
        let token = config.api_token()?;
        let client = HttpPlatformClient::new(&config.base_url, config.project_id, token)?;
        let cancelled = match &cli.command {
            Command::Download => {
                let outcome = DownloadTranslations::from_config(&client, &cache, config, branch)?
                    .with_cancel_flag(cancel.clone())
                    .process()
                    .await
                    .with_context(|| format!("downloading translations for {}", config.name))?;
                finish(outcome, cli.json)?
            }
            Command::Upload { .. } => {
                let mut upload = UploadSources::from_config(&client, &cache, config, branch)?
                    .with_cancel_flag(cancel.clone());
                if let Some(file) = &file {
                    upload = upload.only_file(file);
                }
                let outcome = upload
                    .process()
                    .await
                    .with_context(|| format!("uploading sources for {}", config.name))?;
                finish(outcome, cli.json)?
            }
            Command::UploadTranslations { .. } => {
                let mut upload = UploadTranslations::from_config(&client, &cache, config, branch)?
                    .with_cancel_flag(cancel.clone());
                if let Some(file) = &file {
                    upload = upload.only_file(file);
                }
                let outcome = upload
                    .process()
                    .await
                    .with_context(|| format!("uploading translations for {}", config.name))?;
                finish(outcome, cli.json)?
            }
            Command::Sources => false,
        };

        if cancelled {
            log::warn!("[{}] cancelled", config.name);
            break;
        }
    }

    Ok(())
}
