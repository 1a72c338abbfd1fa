use std::collections::HashSet;
use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use harvester_core::{
    Collection, CollectionJob, Cursor, ExpandLimit, Governor, GovernorPolicy, HarvestConfig,
    Harvester, JsonDirSink, RedditClient, RequestPacer, RunSummary, TokenProvider, combine,
};
use tracing::{debug, error, info, warn};

use crate::app::exit::{self, ProcessExit};
use crate::app::{progress, terminal};
use crate::cli::{ActivityArgs, Cli, Command, CombineArgs, GlobalArgs, SubredditArgs};

pub(crate) async fn run(cli: Cli) -> Result<ProcessExit> {
    let default_level = terminal::default_log_level(cli.global.quiet, cli.global.verbose);
    terminal::init_tracing(
        default_level,
        terminal::no_color_env_requested() || terminal::is_dumb_terminal(),
    );
    debug!(?cli, "CLI arguments parsed");

    match &cli.command {
        Command::Combine(args) => run_combine(args).await,
        command => run_collection(&cli.global, command).await,
    }
}

async fn run_combine(args: &CombineArgs) -> Result<ProcessExit> {
    let report = combine(&args.input, &args.output)
        .await
        .with_context(|| format!("combining {}", args.input.display()))?;
    for skipped in &report.skipped {
        warn!(error = %skipped, "skipped batch file");
    }
    info!(
        files = report.files_read,
        records = report.records_out,
        duplicates = report.duplicates_removed(),
        output = %args.output.display(),
        "combine complete"
    );
    if report.skipped.is_empty() {
        Ok(ProcessExit::Success)
    } else {
        Ok(ProcessExit::Partial)
    }
}

/// Applies the global flags on top of the environment configuration.
fn apply_overrides(config: &mut HarvestConfig, global: &GlobalArgs) {
    config.output_dir.clone_from(&global.output_dir);
    config.page_size = global.page_size;
    config.page_delay = Duration::from_millis(global.page_delay_ms);
    config.entity_delay = Duration::from_millis(global.entity_delay_ms);
    config.cooldown = Duration::from_secs(global.cooldown_secs);
    config.max_rate_limit_retries = global.max_retries;
    config.request_interval = Duration::from_millis(global.rate_limit);
}

fn subreddit_jobs(args: &SubredditArgs) -> Result<Vec<CollectionJob>> {
    if args.after.is_some() && args.names.len() > 1 {
        bail!("--after can only resume a single subreddit");
    }
    Ok(args
        .names
        .iter()
        .map(|name| {
            CollectionJob::new(Collection::Subreddit(name.clone()), args.limit)
                .with_comments(args.comments)
                .resume_after(args.after.clone().map(Cursor::new))
        })
        .collect())
}

fn activity_jobs<'a>(
    names: impl IntoIterator<Item = &'a str>,
    activity: &ActivityArgs,
) -> Vec<CollectionJob> {
    let mut seen = HashSet::new();
    let mut jobs = Vec::new();
    for name in names {
        if !seen.insert(name.to_ascii_lowercase()) {
            continue;
        }
        if activity.wants_posts() {
            jobs.push(CollectionJob::new(
                Collection::UserSubmissions(name.to_string()),
                activity.target(),
            ));
        }
        if activity.wants_comments() {
            jobs.push(CollectionJob::new(
                Collection::UserComments(name.to_string()),
                activity.target(),
            ));
        }
    }
    jobs
}

fn spawn_interrupt_listener(flag: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current request");
            flag.store(true, Ordering::SeqCst);
        }
    });
}

async fn run_collection(global: &GlobalArgs, command: &Command) -> Result<ProcessExit> {
    let mut config = HarvestConfig::from_env().context("loading Reddit credentials")?;
    apply_overrides(&mut config, global);
    if let Command::Subreddit(args) = command
        && let Some(requests) = args.expand_limit
    {
        config.expand = ExpandLimit::Requests(requests);
    }
    config.validate()?;
    info!(user_agent = %config.user_agent, "harvester starting");

    let credentials = Arc::new(TokenProvider::new(&config)?);
    let api = Arc::new(RedditClient::new(&config)?);
    let pacer = if config.request_interval.is_zero() {
        debug!("request pacing disabled");
        Arc::new(RequestPacer::disabled())
    } else {
        debug!(interval_ms = global.rate_limit, "request pacing enabled");
        Arc::new(RequestPacer::new(config.request_interval))
    };
    let governor = Arc::new(Governor::new(
        credentials,
        pacer,
        GovernorPolicy::from(&config),
    ));

    let interrupted = Arc::new(AtomicBool::new(false));
    spawn_interrupt_listener(Arc::clone(&interrupted));
    let mut harvester = Harvester::new(api, governor, &config).with_interrupt_flag(interrupted);

    let mut discovery_failures = Vec::new();
    let jobs = match command {
        Command::Subreddit(args) => {
            if let Some(author) = &args.exclude_author {
                harvester = harvester.excluding_author(author.clone());
            }
            subreddit_jobs(args)?
        }
        Command::User(args) => activity_jobs(args.names.iter().map(String::as_str), &args.activity),
        Command::Moderators(args) => {
            let discovery = harvester.discover_all_moderators(&args.subreddits).await?;
            discovery_failures = discovery.failures;
            activity_jobs(
                discovery.moderators.iter().map(|m| m.name.as_str()),
                &args.activity,
            )
        }
        Command::Combine(args) => return run_combine(args).await,
    };
    if jobs.is_empty() {
        info!("nothing to collect");
        let summary = RunSummary {
            entities: discovery_failures,
            interrupted: false,
        };
        log_summary(&summary);
        return Ok(exit::summary_exit_outcome(&summary));
    }
    info!(entities = jobs.len(), "collection planned");

    let mut sink = JsonDirSink::create(&config.output_dir).await?;
    let use_spinner = terminal::should_use_spinner(
        io::stderr().is_terminal(),
        global.quiet,
        terminal::is_dumb_terminal(),
    );
    let (spinner, stop) = progress::spawn_progress_ui(use_spinner, harvester.stats());
    let result = harvester.run(&jobs, &mut sink).await;
    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = spinner {
        let _ = handle.await;
    }

    match result {
        Ok(mut summary) => {
            discovery_failures.append(&mut summary.entities);
            summary.entities = discovery_failures;
            log_summary(&summary);
            Ok(exit::summary_exit_outcome(&summary))
        }
        Err(err) => {
            error!(error = %err, "run aborted");
            Ok(ProcessExit::Failure)
        }
    }
}

fn log_summary(summary: &RunSummary) {
    for report in &summary.entities {
        if report.is_skipped() {
            warn!(
                entity = %report.entity,
                items = report.items,
                outcome = ?report.outcome,
                "entity skipped"
            );
        } else {
            info!(
                entity = %report.entity,
                items = report.items,
                outcome = ?report.outcome,
                "entity done"
            );
        }
    }
    if summary.interrupted {
        warn!("run interrupted; batches already written are complete");
    }
}
