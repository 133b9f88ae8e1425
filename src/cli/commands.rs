//! Command dispatch

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use clap::CommandFactory;
use clap_complete::generate;
use tracing::{debug, instrument};

use crate::application::services::{timestamp_now, FetchRequest, WriteMode};
use crate::application::{ApplicationError, IoResultExt};
use crate::cli::args::{Cli, Commands, ConfigCommands, FetchArgs, PartitionArgs, StoreArgs};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{global_config_path, Settings};
use crate::domain::{reachable_clades, TaxonId};
use crate::infrastructure::di::ServiceContainer;
use crate::util::path::expand_path;

/// Number of records listed by `plan --sizes`.
const SIZE_REPORT_LIMIT: usize = 10;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    let Some(command) = &cli.command else {
        Cli::command()
            .print_help()
            .map_err(|e| crate::infrastructure::InfraError::io("print help", e))?;
        return Ok(());
    };
    match command {
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        Commands::Config { command } => config_command(cli, command),
        _ => {
            let container = ServiceContainer::new(load_settings(cli)?)?;
            run(&container, command)
        }
    }
}

/// Run a pipeline command against an already wired container.
pub fn run(container: &ServiceContainer, command: &Commands) -> CliResult<()> {
    match command {
        Commands::Plan {
            fetch,
            partition,
            tree,
            sizes,
            dump,
        } => plan(container, fetch, partition, *tree, *sizes, dump.as_deref()),
        Commands::Sync {
            fetch,
            partition,
            store,
            replace,
        } => sync(container, fetch, partition, store, *replace),
        Commands::Enrich {
            root,
            partition,
            store,
            force,
            prune,
        } => enrich(container, *root, partition, store, *force, *prune),
        Commands::Config { .. } | Commands::Completion { .. } => Err(CliError::InvalidArgs(
            "not a pipeline command".to_string(),
        )),
    }
}

fn load_settings(cli: &Cli) -> CliResult<Settings> {
    let config_file = cli.config.as_deref().map(expand_path);
    Ok(Settings::load(config_file.as_deref())?)
}

fn fetch_request(args: &FetchArgs) -> FetchRequest {
    FetchRequest {
        root: args.root,
        height_limit: args.height_limit,
        max_depth: args.max_depth,
    }
}

#[instrument(skip(container))]
fn plan(
    container: &ServiceContainer,
    fetch: &FetchArgs,
    partition: &PartitionArgs,
    tree: Option<usize>,
    sizes: bool,
    dump: Option<&Path>,
) -> CliResult<()> {
    let thresholds = partition.apply(container.settings.partition);
    let service = container.sync_service(thresholds, container.enrichment_if(!fetch.no_enrich, false))?;
    let plan = service.plan(&fetch_request(fetch))?;
    output::plan_summary(&plan, thresholds);

    if sizes {
        let store = &container.settings.store;
        let sizes = plan.record_sizes(&store.collection, &store.source_tag, &timestamp_now());
        output::record_sizes(&sizes, SIZE_REPORT_LIMIT, store.max_record_bytes);
    }
    if let Some(depth) = tree {
        output::info(&output::clade_tree(&plan, depth));
    }
    if let Some(path) = dump {
        let path = expand_path(path);
        fs::write(&path, plan.to_json()?).with_path_context("write plan", &path)?;
        output::action("Wrote", &path.display());
    }
    Ok(())
}

#[instrument(skip(container))]
fn sync(
    container: &ServiceContainer,
    fetch: &FetchArgs,
    partition: &PartitionArgs,
    store_args: &StoreArgs,
    replace: bool,
) -> CliResult<()> {
    let thresholds = partition.apply(container.settings.partition);
    // credentials are checked before any fetching
    let store = container.store(&store_args.account)?;

    let service = container.sync_service(thresholds, container.enrichment_if(!fetch.no_enrich, false))?;
    let plan = service.plan(&fetch_request(fetch))?;
    output::plan_summary(&plan, thresholds);

    let mode = if replace {
        WriteMode::Replace
    } else {
        WriteMode::SkipExisting
    };
    let writer = container.writer(store, mode, store_args.no_batch);
    let report = writer.write(&plan.clades, &timestamp_now())?;
    output::write_report(&report);

    if report.is_complete() {
        Ok(())
    } else {
        Err(CliError::Incomplete {
            failed: report.failed.len(),
            total: plan.clades.len(),
        })
    }
}

#[instrument(skip(container))]
fn enrich(
    container: &ServiceContainer,
    root: TaxonId,
    partition: &PartitionArgs,
    store_args: &StoreArgs,
    force: bool,
    prune: bool,
) -> CliResult<()> {
    let thresholds = partition.apply(container.settings.partition);
    let store = container.store(&store_args.account)?;
    let writer = container.writer(store, WriteMode::Replace, store_args.no_batch);

    let stored = writer.fetch_clades()?;
    debug!("{} clades stored", stored.len());
    let service = container.sync_service(thresholds, Some(container.enrichment_service(force)))?;
    let plan = service.replan(&stored, root)?;
    output::plan_summary(&plan, thresholds);

    // clades of the old partition that the new one no longer produces
    let reachable = reachable_clades(&stored, root).map_err(ApplicationError::from)?;
    let planned: HashSet<TaxonId> = plan.clades.iter().map(|c| c.root_id).collect();
    let repartitioned = planned.len() != reachable.len() || reachable.iter().any(|id| !planned.contains(id));
    let stale: Vec<String> = reachable
        .into_iter()
        .filter(|id| !planned.contains(id))
        .map(|id| id.to_string())
        .collect();

    let changed = plan.enrichment.as_ref().map_or(0, |report| report.changed);
    if changed == 0 && !repartitioned {
        output::success("No common names changed, nothing to write");
        return Ok(());
    }

    let mut report = writer.write(&plan.clades, &timestamp_now())?;
    if !stale.is_empty() {
        if !prune {
            output::warning(&format!(
                "{} stored clades are no longer part of the partition; they were left in place (use --prune)",
                stale.len()
            ));
        } else if report.is_complete() {
            let pruned = writer.prune(&stale);
            report.deleted = pruned.deleted;
            report.failed.extend(pruned.failed);
        } else {
            output::warning("write incomplete, stale clades were not pruned");
        }
    }
    output::write_report(&report);

    if report.is_complete() {
        Ok(())
    } else {
        Err(CliError::Incomplete {
            failed: report.failed.len(),
            total: plan.clades.len() + stale.len(),
        })
    }
}

fn config_command(cli: &Cli, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            let settings = load_settings(cli)?;
            output::info(&settings.to_toml()?);
        }
        ConfigCommands::Template => output::info(&Settings::template()),
        ConfigCommands::Path => {
            match global_config_path() {
                Some(path) if path.exists() => output::action("Global", &path.display()),
                Some(path) => output::action("Global", &format!("{} (not found)", path.display())),
                None => output::warning("no config directory on this platform"),
            }
            if let Some(path) = &cli.config {
                output::action("Explicit", &expand_path(path).display());
            }
        }
    }
    Ok(())
}
