//! fork-sandbox CLI.
//!
//! Runs single or sequential simulations against a fixture-backed mock
//! fork and prints the result as JSON. Operations are given either as
//! pre-encoded hex bytes or as typed `section.method` calls resolved
//! through the call registry. The fixture file describes the network
//! and the accounts seeded into the fork template:
//!
//! ```json
//! {
//!   "network": "westend",
//!   "existentialDeposit": "0.01",
//!   "accounts": [
//!     {"address": "5Grw...utQY", "free": "1.5", "nonce": 0}
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use fork_exec::{ExecutionArray, ExecutionItem, ExecutionKind, ExecutionRunner, Submitter};
use fork_sandbox_core::{
    BatchItem, BatchSimulationRequest, BuildMode, CallRegistry, ChainInfo, ForkBackend,
    MockBackend, MockProvider, SimulationLog, SimulationRequest, Simulator,
};
use fork_sandbox_types::{to_hex, to_planck};
use fork_transport::{network_by_name, NETWORKS};

#[derive(Parser)]
#[command(name = "fork-sandbox", version, about = "Chain-fork simulation sandbox")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Simulate one operation against a fresh fork of the fixture state.
    Simulate {
        /// Fixture file seeding the fork template.
        #[arg(long)]
        fixture: PathBuf,
        /// Hex call or signed envelope to simulate.
        #[arg(long, conflicts_with_all = ["call", "params"])]
        operation: Option<String>,
        /// Registered call as `section.method`, built from `--params`.
        #[arg(long)]
        call: Option<String>,
        /// JSON parameters for `--call`, e.g. `{"dest": "...", "amount": "1.5"}`.
        #[arg(long)]
        params: Option<String>,
        /// SS58 sender address.
        #[arg(long)]
        sender: String,
        /// Endpoint(s) to fork from; the network default when omitted.
        #[arg(long = "endpoint")]
        endpoints: Vec<String>,
        /// Hex block hash to fork at.
        #[arg(long)]
        block_hash: Option<String>,
    },
    /// Simulate an ordered batch on one shared fork.
    SimulateBatch {
        #[arg(long)]
        fixture: PathBuf,
        /// JSON file with the batch items.
        #[arg(long)]
        batch: PathBuf,
        #[arg(long = "endpoint")]
        endpoints: Vec<String>,
        #[arg(long, value_enum, default_value_t = BuildModeArg::Instant)]
        build_mode: BuildModeArg,
    },
    /// Plan a batch as an execution array: simulate it sequentially and
    /// print the resulting item statuses.
    Plan {
        #[arg(long)]
        fixture: PathBuf,
        #[arg(long)]
        batch: PathBuf,
        #[arg(long = "endpoint")]
        endpoints: Vec<String>,
    },
    /// List the known networks and their defaults.
    Networks,
}

/// Real broadcast lives outside the sandbox; planning never submits.
struct SandboxSubmitter;

#[async_trait::async_trait]
impl Submitter for SandboxSubmitter {
    async fn submit(&self, item: &ExecutionItem) -> Result<serde_json::Value> {
        anyhow::bail!("real submission is outside the sandbox (item '{}')", item.id)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BuildModeArg {
    Instant,
    Batch,
}

impl From<BuildModeArg> for BuildMode {
    fn from(mode: BuildModeArg) -> Self {
        match mode {
            BuildModeArg::Instant => BuildMode::Instant,
            BuildModeArg::Batch => BuildMode::Batch,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Fixture {
    network: String,
    /// Display-unit override; the mock default applies when absent.
    #[serde(default)]
    existential_deposit: Option<String>,
    accounts: Vec<FixtureAccount>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FixtureAccount {
    address: String,
    /// Free balance in display units, e.g. "1.5".
    free: String,
    #[serde(default)]
    nonce: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Simulate {
            fixture,
            operation,
            call,
            params,
            sender,
            endpoints,
            block_hash,
        } => {
            let fixture = load_fixture(&fixture)?;
            let endpoints = resolve_endpoints(endpoints, &fixture.network)?;
            let (simulator, info) = build_simulator(&fixture, BuildMode::Instant)?;
            let operation_bytes = resolve_operation(operation, call, params, &info)?;
            let request = SimulationRequest {
                endpoints,
                operation_bytes,
                sender_address: sender,
                block_hash,
                build_mode: BuildMode::Instant,
            };
            let result = simulator.simulate(&request).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::SimulateBatch {
            fixture,
            batch,
            endpoints,
            build_mode,
        } => {
            let fixture = load_fixture(&fixture)?;
            let endpoints = resolve_endpoints(endpoints, &fixture.network)?;
            let (simulator, info) = build_simulator(&fixture, build_mode.into())?;
            let items = resolve_batch(load_batch(&batch)?, &CallRegistry::standard(), &info)?;
            let request = BatchSimulationRequest {
                endpoints,
                items,
                build_mode: build_mode.into(),
            };
            let result = simulator.simulate_sequential(&request).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Plan {
            fixture,
            batch,
            endpoints,
        } => {
            let fixture = load_fixture(&fixture)?;
            let endpoints = resolve_endpoints(endpoints, &fixture.network)?;
            let (simulator, info) = build_simulator(&fixture, BuildMode::Instant)?;
            let items: Vec<ExecutionItem> =
                resolve_batch(load_batch(&batch)?, &CallRegistry::standard(), &info)?
                    .into_iter()
                    .map(|b| {
                        ExecutionItem::new(&b.description, ExecutionKind::Transaction)
                            .with_params(serde_json::json!({
                                "operationBytes": b.operation_bytes,
                                "senderAddress": b.sender_address,
                            }))
                            .requiring_confirmation()
                    })
                    .collect();
            let array = ExecutionArray::create(items);
            let runner =
                ExecutionRunner::new(Arc::new(simulator), Arc::new(SandboxSubmitter), endpoints);
            let simulation = runner.plan(&array).await?;
            let report = serde_json::json!({
                "simulation": simulation,
                "state": array.get_state(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Networks => {
            println!("{}", serde_json::to_string_pretty(&NETWORKS)?);
        }
    }
    Ok(())
}

fn load_fixture(path: &Path) -> Result<Fixture> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading fixture {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing fixture {}", path.display()))
}

/// One entry of a batch file: either pre-encoded call/envelope bytes or
/// a typed call resolved through the registry.
#[derive(Deserialize)]
#[serde(untagged)]
enum BatchEntry {
    #[serde(rename_all = "camelCase")]
    Raw {
        operation_bytes: String,
        sender_address: String,
        description: String,
    },
    #[serde(rename_all = "camelCase")]
    Call {
        section: String,
        method: String,
        params: serde_json::Value,
        sender_address: String,
        description: String,
    },
}

fn load_batch(path: &Path) -> Result<Vec<BatchEntry>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading batch file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing batch file {}", path.display()))
}

fn resolve_batch(
    entries: Vec<BatchEntry>,
    registry: &CallRegistry,
    info: &ChainInfo,
) -> Result<Vec<BatchItem>> {
    entries
        .into_iter()
        .map(|entry| match entry {
            BatchEntry::Raw {
                operation_bytes,
                sender_address,
                description,
            } => Ok(BatchItem {
                operation_bytes,
                sender_address,
                description,
            }),
            BatchEntry::Call {
                section,
                method,
                params,
                sender_address,
                description,
            } => Ok(BatchItem {
                operation_bytes: to_hex(&registry.construct(&section, &method, &params, info)?),
                sender_address,
                description,
            }),
        })
        .collect()
}

/// Turn the `--operation` / `--call` alternatives into hex call bytes.
fn resolve_operation(
    operation: Option<String>,
    call: Option<String>,
    params: Option<String>,
    info: &ChainInfo,
) -> Result<String> {
    match (operation, call) {
        (Some(operation), None) => Ok(operation),
        (None, Some(call)) => {
            let (section, method) = call
                .split_once('.')
                .ok_or_else(|| anyhow!("--call expects section.method, got '{}'", call))?;
            let params: serde_json::Value = match params {
                Some(raw) => serde_json::from_str(&raw).context("parsing --params")?,
                None => serde_json::json!({}),
            };
            let bytes = CallRegistry::standard().construct(section, method, &params, info)?;
            Ok(to_hex(&bytes))
        }
        _ => anyhow::bail!("exactly one of --operation or --call is required"),
    }
}

fn resolve_endpoints(cli_endpoints: Vec<String>, network: &str) -> Result<Vec<String>> {
    if !cli_endpoints.is_empty() {
        return Ok(cli_endpoints);
    }
    let net = network_by_name(network)
        .ok_or_else(|| anyhow!("unknown network '{}' and no --endpoint given", network))?;
    Ok(vec![net.default_endpoint.to_string()])
}

fn build_simulator(fixture: &Fixture, build_mode: BuildMode) -> Result<(Simulator, ChainInfo)> {
    let net = network_by_name(&fixture.network)
        .ok_or_else(|| anyhow!("unknown network '{}'", fixture.network))?;

    let mut backend = MockBackend::new(net.name)?;
    if let Some(deposit) = &fixture.existential_deposit {
        backend = backend.with_existential_deposit(to_planck(deposit, net.decimals)?);
    }
    for account in &fixture.accounts {
        let free = to_planck(&account.free, net.decimals)
            .with_context(|| format!("balance for {}", account.address))?;
        backend = backend.with_account(&account.address, free, account.nonce)?;
    }

    let info = backend.chain_info();
    let simulator = Simulator::new(
        Arc::new(MockProvider::new(backend)),
        build_mode,
        Arc::new(SimulationLog::new()),
    );
    Ok((simulator, info))
}
