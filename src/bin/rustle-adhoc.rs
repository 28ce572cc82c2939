use anyhow::{bail, Context, Result};
use clap::Parser;
use rustle_adhoc::{CallArgs, Session, SessionConfig};
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "rustle-adhoc")]
#[command(about = "Run Ansible modules ad-hoc against inventory host patterns")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct RustleAdhocCli {
    /// Host pattern to target
    pattern: String,

    /// Inventory file (searched in the current directory and its ancestors)
    #[arg(short, long, default_value = "inventory")]
    inventory: PathBuf,

    /// Module to run
    #[arg(short, long, default_value = "ping")]
    module: String,

    /// Module arguments
    #[arg(short = 'a', long = "args")]
    module_args: Option<String>,

    /// YAML or JSON file of pattern-scoped variables
    #[arg(long)]
    vars: Option<PathBuf>,

    /// Narrow the target pattern further (repeatable)
    #[arg(long)]
    filter: Vec<String>,

    /// Runner option override as key=value, value parsed as JSON when possible (repeatable)
    #[arg(short = 'o', long = "option")]
    options: Vec<String>,

    /// Parallel processes used by the engine
    #[arg(short, long)]
    forks: Option<usize>,

    /// SSH private key file
    #[arg(long)]
    private_key: Option<PathBuf>,

    /// Disable SSH host key checking
    #[arg(long)]
    no_host_key_checking: bool,

    /// Session config file (defaults to rustle-adhoc.yml discovery)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the response as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = RustleAdhocCli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => SessionConfig::from_file(path)?,
        None => SessionConfig::discover()?,
    };
    if let Some(forks) = cli.forks {
        config.forks = forks;
    }

    let args = call_args(
        cli.module_args.as_deref(),
        config.is_free_form(&cli.module),
        &cli.options,
    )?;

    let mut root = Session::open(&cli.inventory, config)
        .await
        .with_context(|| format!("cannot open inventory {}", cli.inventory.display()))?;
    if let Some(key) = &cli.private_key {
        root.set_private_key_file(key)?;
    }
    if cli.no_host_key_checking {
        root.set_host_key_checking(false);
    }
    if let Some(vars) = &cli.vars {
        root.initvars(vars.clone()).await?;
    }

    let mut session = root.filter(&cli.pattern);
    for filter in &cli.filter {
        session = session.filter(filter);
    }

    info!("Running {} on {}", cli.module, session.pattern());
    let response = session.invoke(&cli.module, args).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("{response}");
    }

    println!(
        "\nok={} changed={} failed={} unreachable={}",
        response.ok_count(),
        response.changed_count(),
        response.err_count(),
        response.dark().len()
    );

    if response.is_empty() {
        bail!("pattern {} matched no hosts", session.pattern());
    }
    if response.some_failed() {
        std::process::exit(2);
    }

    Ok(())
}

/// Free-form modules take `-a` verbatim, minus `key=value` tokens. Other
/// modules get `key=value` keyword arguments and bare tokens as positionals.
fn call_args(raw: Option<&str>, free_form: bool, options: &[String]) -> Result<CallArgs> {
    let mut args = CallArgs::new();

    for option in options {
        let (key, value) = option
            .split_once('=')
            .with_context(|| format!("runner option '{option}' is not key=value"))?;
        args = args.runner_option(key, parse_value(value));
    }

    let Some(raw) = raw else {
        return Ok(args);
    };

    let tokens = shell_words::split(raw).with_context(|| format!("cannot parse arguments: {raw}"))?;
    let mut bare = Vec::new();
    for token in tokens {
        if let Some((key, value)) = keyword(&token) {
            args = args.kwarg(key, value);
            continue;
        }
        bare.push(token);
    }

    if free_form {
        if !bare.is_empty() {
            args = args.arg(shell_words::join(&bare));
        }
    } else {
        for token in bare {
            args = args.arg(token);
        }
    }

    Ok(args)
}

fn keyword(token: &str) -> Option<(&str, &str)> {
    let (key, value) = token.split_once('=')?;
    let valid = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some((key, value))
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
