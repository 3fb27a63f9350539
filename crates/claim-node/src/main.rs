//! claim-node — the claim evaluation CLI binary.
//!
//! Wires a sled-backed audit sink, a model-endpoint client, and a chain RPC
//! client into a `claim_orchestrator::Orchestrator` and evaluates exactly
//! one claim per invocation. Grounded on `chronx-node::main`'s startup
//! sequence (open store → configure clients → run → report) and its
//! `clap`/`tracing_subscriber`/`anyhow` wiring.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use claim_core::{AccountAddress, Amount, Claim, Evidence, EvidenceKind, PipelineConfig};
use claim_orchestrator::Orchestrator;
use claim_settlement::{ChainRpc, JsonRpcChainClient, MockChainRpc};
use claim_stages::{HttpLlmClient, LlmClient, MockLlmClient};
use claim_store::SledAuditSink;

#[derive(Parser, Debug)]
#[command(name = "claim-node", version, about = "Evaluate one insurance claim end-to-end")]
struct Args {
    /// Directory for the persistent audit store.
    #[arg(long, default_value = "./claim-data")]
    data_dir: PathBuf,

    /// Claimant account address, hex-encoded (with or without 0x prefix).
    #[arg(long)]
    claimant: String,

    /// Requested claim amount in USD.
    #[arg(long)]
    amount: Amount,

    /// Free-form claim description.
    #[arg(long, default_value = "")]
    description: String,

    /// Path to a document evidence file (invoice, receipt, etc).
    #[arg(long)]
    document: Option<PathBuf>,

    /// MIME type declared for the document evidence.
    #[arg(long, default_value = "application/pdf")]
    document_mime: String,

    /// Path to an image evidence file (damage photo, etc).
    #[arg(long)]
    image: Option<PathBuf>,

    /// MIME type declared for the image evidence.
    #[arg(long, default_value = "image/jpeg")]
    image_mime: String,

    /// Model endpoint URL. Omit to run with the model path unavailable,
    /// forcing the mandatory rule-based fallback at every stage.
    #[arg(long)]
    model_endpoint: Option<String>,

    /// Model name passed to the LLM client.
    #[arg(long, default_value = "claim-agent")]
    model: String,

    /// JSON-RPC chain endpoint. Omit to settle against an in-memory mock chain.
    #[arg(long)]
    chain_rpc_url: Option<String>,

    /// Enable on-chain settlement for auto-approved claims.
    #[arg(long)]
    settlement_enabled: bool,

    /// Cap, in USD, above which auto-approved claims are not auto-settled.
    #[arg(long)]
    settlement_cap: Option<Amount>,

    /// Escrow contract address used by the settlement driver.
    #[arg(long, default_value = "")]
    escrow_address: String,

    /// Settlement token contract address (USDC).
    #[arg(long, default_value = "")]
    token_address: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,claim=debug".parse().unwrap()))
        .init();

    let args = Args::parse();
    info!("claim-node starting");

    std::fs::create_dir_all(&args.data_dir).with_context(|| format!("creating data dir {}", args.data_dir.display()))?;
    let sink = Arc::new(SledAuditSink::open(&args.data_dir).context("opening audit store")?);

    let claimant = AccountAddress::from_hex(&args.claimant).context("parsing --claimant as a 20-byte hex address")?;

    let config = build_config(&args);

    let llm: Arc<dyn LlmClient> = match &args.model_endpoint {
        Some(endpoint) => Arc::new(HttpLlmClient::new(endpoint.clone())),
        None => {
            info!("no --model-endpoint given; stages will fall back to rule-based paths");
            Arc::new(MockLlmClient::unavailable())
        }
    };

    let now = claim_core::now_unix;
    let claim = Claim::new(claimant, args.amount, args.description.clone(), now());
    let claim_id = claim.id;
    sink.put_claim(&claim).await.context("persisting submitted claim")?;
    info!(%claim_id, "claim submitted");

    let evidence = collect_evidence(&args, claim_id)?;

    let outcome = match &args.chain_rpc_url {
        Some(url) => {
            let chain = JsonRpcChainClient::new(url.clone());
            run(sink.clone(), chain, config, llm, &args.model, claim_id, &evidence, now).await?
        }
        None => {
            let chain = MockChainRpc::new();
            run(sink.clone(), chain, config, llm, &args.model, claim_id, &evidence, now).await?
        }
    };

    sink.flush().context("flushing audit store")?;

    let claim = sink.get_claim(claim_id).await.context("reloading claim after evaluation")?.expect("claim persisted by evaluate()");
    print_report(&claim, &outcome);

    Ok(())
}

async fn run<C: ChainRpc>(
    sink: Arc<SledAuditSink>,
    chain: C,
    config: PipelineConfig,
    llm: Arc<dyn LlmClient>,
    model: &str,
    claim_id: claim_core::ClaimId,
    evidence: &[Evidence],
    now: fn() -> claim_core::Timestamp,
) -> anyhow::Result<claim_orchestrator::EvaluationOutcome> {
    let orchestrator = Orchestrator::new(sink, chain, config, llm, model.to_string());
    orchestrator.evaluate(claim_id, evidence, now).await.context("evaluating claim")
}

fn build_config(args: &Args) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.settlement_enabled = args.settlement_enabled;
    config.settlement_amount_cap = args.settlement_cap;
    if !args.escrow_address.is_empty() {
        config.settlement_escrow_address = args.escrow_address.clone();
    }
    if !args.token_address.is_empty() {
        config.settlement_token_address = args.token_address.clone();
    }
    config
}

fn collect_evidence(args: &Args, claim_id: claim_core::ClaimId) -> anyhow::Result<Vec<Evidence>> {
    let mut evidence = Vec::new();
    if let Some(path) = &args.document {
        let byte_size = std::fs::metadata(path).with_context(|| format!("reading metadata for {}", path.display()))?.len();
        evidence.push(Evidence::new(claim_id, EvidenceKind::Document, path.display().to_string(), args.document_mime.clone(), byte_size));
    }
    if let Some(path) = &args.image {
        let byte_size = std::fs::metadata(path).with_context(|| format!("reading metadata for {}", path.display()))?.len();
        evidence.push(Evidence::new(claim_id, EvidenceKind::Image, path.display().to_string(), args.image_mime.clone(), byte_size));
    }
    Ok(evidence)
}

fn print_report(claim: &Claim, outcome: &claim_orchestrator::EvaluationOutcome) {
    let report = serde_json::json!({
        "claim_id": claim.id.to_string(),
        "status": claim.status,
        "verdict": claim.verdict,
        "confidence": claim.confidence,
        "auto_approved": claim.auto_approved,
        "auto_settled": claim.auto_settled,
        "settlement_tx_hash": claim.settlement_tx_hash,
        "contradictions": claim.contradictions,
        "requested_data": claim.requested_data,
        "review_reasons": claim.review_reasons,
        "decision": {
            "verdict": outcome.decision.verdict,
            "auto_approved": outcome.decision.auto_approved,
            "human_review_required": outcome.decision.human_review_required,
            "requested_data": outcome.decision.requested_data,
            "review_reasons": outcome.decision.review_reasons,
        },
        "summary": outcome.summary,
    });
    println!("{}", serde_json::to_string_pretty(&report).unwrap());
}
