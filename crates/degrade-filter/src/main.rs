use anyhow::{bail, Context as _, Result};
use clap::{value_parser, Arg, ArgAction, Command};
use degrade_core::{
    CallMethod, DecisionEngine, ExceptionDescriptor, FailureCause, InvocationContext, InvocationHandler,
    InvocationResponse, InvokerSettings, QualityTracker, RpcError,
};
use degrade_filter::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Command::new("degrade-filter")
        .version(degrade_filter::VERSION)
        .about("Compile and exercise invoker degradation policies")
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("check")
                .about("Compile a properties file and print the resulting actions")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML properties file"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run one degraded call through the filter")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML properties file"),
                )
                .arg(
                    Arg::new("key")
                        .long("key")
                        .required(true)
                        .help("Call key as service#method"),
                )
                .arg(
                    Arg::new("convention")
                        .long("convention")
                        .default_value("sync")
                        .value_parser(value_parser!(CallMethod))
                        .help("Calling convention: sync, future, callback or oneway"),
                )
                .arg(
                    Arg::new("reactive")
                        .long("reactive")
                        .action(ArgAction::SetTrue)
                        .help("Dispatch to an unavailable provider and degrade on failure"),
                ),
        );

    let matches = cli.get_matches();
    init_tracing(matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("check", args)) => {
            let file = args.get_one::<PathBuf>("file").context("missing file")?;
            check(file, args.get_flag("json"))
        }
        Some(("simulate", args)) => {
            let file = args.get_one::<PathBuf>("file").context("missing file")?;
            let key = args.get_one::<String>("key").context("missing key")?;
            let convention = *args
                .get_one::<CallMethod>("convention")
                .context("missing convention")?;
            simulate(file, key, convention, args.get_flag("reactive"))
        }
        _ => bail!("unknown command"),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn start(file: &Path) -> Result<(Arc<DegradeActionManager>, Arc<DegradeActionRegistry>)> {
    let properties = PropertiesFile::load(file)?;
    let settings = properties.settings();
    let store = Arc::new(properties.into_store());
    let registry = Arc::new(DegradeActionRegistry::new());
    let manager = DegradeActionManager::start(store, Arc::clone(&registry), settings)?;
    Ok((manager, registry))
}

fn check(file: &Path, json: bool) -> Result<()> {
    let (manager, registry) = start(file)?;
    let snapshot = registry.snapshot();
    let mut aliases: Vec<_> = snapshot.actions().keys().collect();
    aliases.sort();
    let skipped = manager.skipped();

    if json {
        let actions: serde_json::Map<String, serde_json::Value> = aliases
            .iter()
            .filter_map(|alias| snapshot.get(alias).map(|a| ((*alias).clone(), a.describe())))
            .collect();
        let skipped: Vec<_> = skipped
            .iter()
            .map(|s| serde_json::json!({ "pair": s.pair, "reason": format!("{:?}", s.reason) }))
            .collect();
        let report = serde_json::json!({
            "generation": snapshot.generation(),
            "actions": actions,
            "skipped": skipped,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Generation: {}", snapshot.generation());
        println!("Actions: {}", snapshot.len());
        for alias in aliases {
            if let Some(action) = snapshot.get(alias) {
                println!("  {alias}: {}", action.describe());
            }
        }
        for entry in &skipped {
            println!("  skipped {:?}: {:?}", entry.pair, entry.reason);
        }
    }

    if skipped.is_empty() {
        Ok(())
    } else {
        bail!("{} degrade entries were skipped", skipped.len())
    }
}

fn simulate(file: &Path, key: &str, convention: CallMethod, reactive: bool) -> Result<()> {
    let (service, method) = key
        .split_once('#')
        .with_context(|| format!("call key {key:?} is not service#method"))?;
    let (manager, _registry) = start(file)?;

    let engine = Arc::new(LoggingEngine { proactive: !reactive });
    let executor = Arc::new(manager.executor(engine));
    let chain = FilterChain::new(Arc::new(UnavailableProvider))
        .with_filter(Arc::new(DegradationFilter::new(executor, Arc::new(LoggingTracker))));

    let settings = InvokerSettings::new(service).with_call_method(convention);
    let mut ctx = InvocationContext::new(Arc::new(settings), method).with_monitor_data();

    match chain.handle(&mut ctx) {
        Ok(response) => {
            println!("Message type: {:?}", response.message_type());
            if let Some(value) = response.return_value() {
                println!("Return: {value}");
            }
            if let Some(exception) = response.exception() {
                println!("Exception: {exception}");
            }
            if let Some(future) = response.as_future() {
                println!("Future: {:?}", future.try_get().as_ref().map(InvocationResponse::return_value));
            }
            println!("Degraded: {}", ctx.degrade_info().degraded);
            Ok(())
        }
        Err(err) => bail!("call failed without substitute: {err}"),
    }
}

struct LoggingEngine {
    proactive: bool,
}

impl DecisionEngine for LoggingEngine {
    fn need_proactive_degrade(&self, _ctx: &InvocationContext) -> bool {
        self.proactive
    }

    fn need_reactive_degrade(&self, _ctx: &InvocationContext) -> bool {
        !self.proactive
    }

    fn is_opted_into_reactive_degrade(&self, _exception: &ExceptionDescriptor) -> bool {
        false
    }

    fn report_normal(&self, ctx: &InvocationContext) {
        info!(key = %self.resolve_call_key(ctx), "normal");
    }

    fn report_failed(&self, ctx: &InvocationContext, cause: &FailureCause) {
        warn!(key = %self.resolve_call_key(ctx), %cause, "failed");
    }

    fn report_degraded(&self, ctx: &InvocationContext, cause: Option<&FailureCause>) {
        info!(key = %self.resolve_call_key(ctx), cause = ?cause, "degraded");
    }
}

struct LoggingTracker;

impl QualityTracker for LoggingTracker {
    fn report_client_request(&self, ctx: &InvocationContext, failed: bool) {
        info!(method = ctx.method_name(), failed, "client request");
    }
}

struct UnavailableProvider;

impl InvocationHandler for UnavailableProvider {
    fn handle(&self, ctx: &mut InvocationContext) -> Result<InvocationResponse, RpcError> {
        Err(RpcError::unavailable(format!("no provider for {}", ctx.settings().url())))
    }
}
