//! Liquidity Hub Swap CLI
//!
//! Entry point for quoting and executing hub swaps from the command line.
//!
//! Commands:
//! - quote:   one hub quote plus the hub-vs-dex decision
//! - watch:   live quote polling until Ctrl-C / SIGTERM
//! - swap:    live quote until confirmed (price-guarded), then wrap/approve/sign/submit/settle
//! - unwrap:  convert wrapped native back to native
//! - history: print the order log for an account
//! - control: show or set the routing override and hub preference
//!
//! Secrets come from `.env.{chain}` / `.env` (PRIVATE_KEY, RPC_URL).
//!
//! Created: 2026-10-10

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use lh_swap::amounts::{amount_bn, amount_ui};
use lh_swap::chains::{self, ChainInfo};
use lh_swap::config::SwapConfig;
use lh_swap::history::{ControlFlags, OrderHistory};
use lh_swap::onchain::{AllowanceChecker, AlloyChain, BalanceCache, BalanceKey, BalanceReconciler, ChainClient};
use lh_swap::quote::{poller, HubClient, QuoteEngine, QuoteRequest, QuoteState, SwapPhase};
use lh_swap::routing::{decide_owner, AcceptedQuote, ArbiterInputs, PriceGuard};
use lh_swap::session::SessionRegistry;
use lh_swap::swap::{
    unwrap_native, FailureCircuitBreaker, HubSettlementClient, LocalSigner, RpcWalletSigner, SwapExecutor, SwapInput,
    SwapServices, TypedDataSigner,
};
use lh_swap::telemetry::{HttpTransport, NoopTelemetry, TelemetryRecorder, TelemetrySink};
use lh_swap::types::{LhControl, Token, TradeOwner};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Liquidity Hub swap engine
#[derive(Parser)]
#[command(name = "lh-swap", version)]
struct Cli {
    /// TOML config file
    #[arg(short, long, env = "LH_CONFIG")]
    config: Option<PathBuf>,

    /// Chain name or id (ethereum, bsc, polygon, base, linea)
    #[arg(long, env = "CHAIN", default_value = "polygon")]
    chain: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch one quote and show the routing decision
    Quote(TradeArgs),
    /// Poll quotes until interrupted
    Watch(TradeArgs),
    /// Execute a hub swap
    Swap {
        #[command(flatten)]
        trade: TradeArgs,
        /// Sign and send through the node's account instead of PRIVATE_KEY
        #[arg(long)]
        node_account: Option<Address>,
        /// Confirm the first hub quote without prompting
        #[arg(long, short)]
        yes: bool,
    },
    /// Unwrap wrapped native back to native
    Unwrap {
        /// Human amount, e.g. 0.5
        #[arg(long)]
        amount: String,
    },
    /// Show past hub swaps
    History {
        /// Defaults to the PRIVATE_KEY account
        #[arg(long)]
        account: Option<Address>,
    },
    /// Show or change routing controls
    Control {
        #[arg(long, value_enum)]
        set: Option<ControlArg>,
        /// Enable or disable hub routing
        #[arg(long)]
        hub: Option<bool>,
    },
}

#[derive(Args, Clone)]
struct TradeArgs {
    /// Token address, or "native"
    #[arg(long)]
    from: String,
    /// Token address, or "native"
    #[arg(long)]
    to: String,
    /// Human amount of `from`
    #[arg(long)]
    amount: String,
    /// Dex route minimum output (human amount of `to`)
    #[arg(long)]
    dex_min_out: Option<String>,
    /// Slippage percent, overrides config
    #[arg(long)]
    slippage: Option<f64>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ControlArg {
    None,
    Skip,
    Force,
}

impl From<ControlArg> for LhControl {
    fn from(arg: ControlArg) -> Self {
        match arg {
            ControlArg::None => LhControl::None,
            ControlArg::Skip => LhControl::Skip,
            ControlArg::Force => LhControl::Force,
        }
    }
}

/// Shared per-invocation state
struct App {
    config: SwapConfig,
    chain: &'static ChainInfo,
    data_dir: PathBuf,
    sessions: Arc<SessionRegistry>,
    breaker: Arc<FailureCircuitBreaker>,
    telemetry: Arc<dyn TelemetrySink>,
    shutdown: CancellationToken,
}

impl App {
    fn control_path(&self) -> PathBuf {
        self.data_dir.join(format!("control_{}.json", self.chain.chain_id))
    }

    fn api_url(&self) -> String {
        self.config
            .quote
            .api_url
            .clone()
            .unwrap_or_else(|| self.chain.api_url.to_string())
    }

    fn quote_engine(&self) -> Result<QuoteEngine<HubClient>> {
        let client = HubClient::new(self.config.quote.timeout())?;
        Ok(QuoteEngine::new(
            Arc::new(client),
            self.config.quote.clone(),
            Arc::clone(&self.sessions),
            Arc::clone(&self.breaker),
            Arc::clone(&self.telemetry),
        ))
    }
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    }
}

fn resolve_chain(arg: &str) -> Result<&'static ChainInfo> {
    let info = match arg.parse::<u64>() {
        Ok(id) => chains::chain_info(id),
        Err(_) => chains::chain_by_name(arg),
    };
    info.ok_or_else(|| anyhow!("Unsupported chain: '{}'", arg))
}

fn rpc_url() -> Result<String> {
    std::env::var("RPC_URL").context("RPC_URL not set (.env or environment)")
}

fn private_key() -> Result<PrivateKeySigner> {
    let key = std::env::var("PRIVATE_KEY").context("PRIVATE_KEY not set (.env or environment)")?;
    key.trim().parse().context("Invalid PRIVATE_KEY")
}

async fn resolve_token<P: Provider + Clone>(chain: &AlloyChain<P>, info: &ChainInfo, arg: &str) -> Result<Token> {
    if arg.eq_ignore_ascii_case("native") || arg.eq_ignore_ascii_case(info.native_symbol) {
        return Ok(info.native_token());
    }
    let address: Address = arg.parse().with_context(|| format!("Invalid token address: {}", arg))?;
    if lh_swap::types::is_native_address(address) {
        return Ok(info.native_token());
    }
    chain
        .fetch_token(address)
        .await
        .with_context(|| format!("Failed to read token metadata for {:?}", address))
}

async fn build_request<P: Provider + Clone>(
    ctx: &App,
    chain: &AlloyChain<P>,
    args: &TradeArgs,
    account: Option<Address>,
) -> Result<QuoteRequest> {
    let from_token = resolve_token(chain, ctx.chain, &args.from).await?;
    let to_token = resolve_token(chain, ctx.chain, &args.to).await?;
    let from_amount = amount_bn(from_token.decimals, &args.amount)?;
    let dex_min_amount_out = match args.dex_min_out.as_deref() {
        Some(raw) => Some(amount_bn(to_token.decimals, raw)?),
        None => None,
    };
    Ok(QuoteRequest {
        from_token,
        to_token,
        from_amount,
        dex_min_amount_out,
        slippage: args.slippage.unwrap_or(ctx.config.quote.slippage_percent),
        account,
        chain_id: ctx.chain.chain_id,
        partner: ctx.config.quote.partner.clone(),
    })
}

async fn fetch_once(engine: &mut QuoteEngine<HubClient>, req: &QuoteRequest) -> Result<QuoteState> {
    let ticket = engine
        .issue(req)
        .ok_or_else(|| anyhow!("Quoting disabled: {:?}", engine.disabled_reason(req)))?;
    let (generation, key, result) = ticket.wait().await;
    engine.apply(generation, key, result);
    Ok(engine.state().clone())
}

fn decide(ctx: &App, flags: &ControlFlags, req: &QuoteRequest, state: &QuoteState) -> TradeOwner {
    decide_owner(&ArbiterInputs {
        hub_out_amount: state.out_amount(),
        dex_min_amount_out: req.dex_min_amount_out.unwrap_or(U256::ZERO),
        control: flags.lh_control,
        hub_enabled: flags.hub_enabled,
        disabled: ctx.breaker.is_tripped(),
    })
}

fn print_quote(req: &QuoteRequest, state: &QuoteState, owner: TradeOwner) {
    match (&state.quote, &state.error) {
        (Some(quote), _) => {
            if let Some(reason) = quote.no_route {
                println!("hub: no route ({:?})", reason);
            } else {
                println!(
                    "hub: {} {} -> {} {} (min {}, session {})",
                    amount_ui(req.from_token.decimals, quote.in_amount),
                    req.from_token.symbol,
                    amount_ui(req.to_token.decimals, quote.out_amount),
                    req.to_token.symbol,
                    amount_ui(req.to_token.decimals, quote.min_amount_out),
                    quote.session_id.as_deref().unwrap_or("-"),
                );
            }
        }
        (None, Some(err)) => println!("hub: quote failed ({})", err),
        (None, None) => println!("hub: no quote"),
    }
    println!("route: {}", owner);
}

async fn cmd_quote(ctx: &App, args: &TradeArgs) -> Result<()> {
    let provider = ProviderBuilder::new().connect(&rpc_url()?).await?;
    let account = private_key().ok().map(|s| s.address());
    let chain = AlloyChain::new(provider, account.unwrap_or(Address::ZERO), ctx.chain.chain_id);

    let req = build_request(ctx, &chain, args, account).await?;
    let flags = ControlFlags::load(ctx.control_path())?;
    let mut engine = ctx.quote_engine()?;
    let state = fetch_once(&mut engine, &req).await?;
    print_quote(&req, &state, decide(ctx, &flags, &req, &state));
    Ok(())
}

async fn cmd_watch(ctx: &App, args: &TradeArgs) -> Result<()> {
    let provider = ProviderBuilder::new().connect(&rpc_url()?).await?;
    let account = private_key().ok().map(|s| s.address());
    let chain = AlloyChain::new(provider, account.unwrap_or(Address::ZERO), ctx.chain.chain_id);

    let req = build_request(ctx, &chain, args, account).await?;
    let flags = ControlFlags::load(ctx.control_path())?;
    let handle = poller::spawn(ctx.quote_engine()?, ctx.shutdown.clone());
    handle.set_request(Some(req.clone()));

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let mut updates = WatchStream::new(handle.quotes.clone());
    info!("Watching quotes (Ctrl-C to stop)");

    loop {
        tokio::select! {
            Some(state) = updates.next() => {
                if !state.is_loading && (state.quote.is_some() || state.error.is_some()) {
                    print_quote(&req, &state, decide(ctx, &flags, &req, &state));
                }
            }
            Some(sig) = signals.next() => {
                info!("Received signal {}, stopping", sig);
                break;
            }
            else => break,
        }
    }

    ctx.shutdown.cancel();
    handle.task.await?;
    Ok(())
}

async fn cmd_swap(ctx: &App, args: &TradeArgs, node_account: Option<Address>, yes: bool) -> Result<()> {
    let url = rpc_url()?;
    match node_account {
        Some(account) => {
            let provider = ProviderBuilder::new().connect(&url).await?;
            let signer = Arc::new(RpcWalletSigner::new(provider.clone()));
            run_swap(ctx, provider, account, signer, args, yes).await
        }
        None => {
            let key = private_key()?;
            let account = key.address();
            let provider = ProviderBuilder::new()
                .wallet(EthereumWallet::from(key.clone()))
                .connect(&url)
                .await?;
            run_swap(ctx, provider, account, Arc::new(LocalSigner::new(key)), args, yes).await
        }
    }
}

/// Tokens whose balances `swap` keeps cached: the pair plus the wrapped native
fn tracked_tokens(info: &ChainInfo, req: &QuoteRequest) -> Vec<Address> {
    let mut tokens = vec![req.from_token.address, req.to_token.address];
    if !tokens.contains(&info.wrapped_native) {
        tokens.push(info.wrapped_native);
    }
    tokens
}

/// First settled quote from the poller
async fn first_quote(quotes: &mut watch::Receiver<QuoteState>) -> Result<QuoteState> {
    loop {
        quotes.changed().await.context("Quote poller stopped")?;
        let state = quotes.borrow_and_update().clone();
        if !state.is_loading && (state.quote.is_some() || state.error.is_some()) {
            return Ok(state);
        }
    }
}

/// Keep the quote live while the user decides. Every refresh goes through the
/// price guard; `None` means the user backed out.
async fn confirm_swap(
    ctx: &App,
    flags: &ControlFlags,
    req: &QuoteRequest,
    quotes: &mut watch::Receiver<QuoteState>,
    guard: &mut PriceGuard,
    executor: &SwapExecutor,
    auto_confirm: bool,
) -> Result<Option<AcceptedQuote>> {
    if auto_confirm {
        return Ok(Some(guard.confirmed()?));
    }

    println!("confirm swap? [y]es / [a]ccept new price / [n]o");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            changed = quotes.changed() => {
                if changed.is_err() {
                    bail!("Quote poller stopped");
                }
                let state = quotes.borrow_and_update().clone();
                let Some(quote) = state.quote.as_ref().filter(|_| !state.is_loading) else {
                    continue;
                };
                let already_flagged = guard.should_accept();
                if guard.on_quote(quote, executor.session().status) && !already_flagged {
                    println!(
                        "price dropped: min {} {} (accepted {}), type 'a' to accept",
                        amount_ui(req.to_token.decimals, quote.min_amount_out),
                        req.to_token.symbol,
                        amount_ui(req.to_token.decimals, guard.accepted_min_out().unwrap_or_default()),
                    );
                }
            }
            line = lines.next_line() => {
                match line?.as_deref().map(str::trim) {
                    Some("y") | Some("yes") => {
                        let state = quotes.borrow().clone();
                        let owner = decide(ctx, flags, req, &state);
                        if owner != TradeOwner::Lh {
                            bail!("Trade is now routed to {}, not executing through the hub", owner);
                        }
                        match guard.confirmed() {
                            Ok(accepted) => return Ok(Some(accepted)),
                            Err(e) => println!("{}", e),
                        }
                    }
                    Some("a") | Some("accept") => {
                        guard.accept();
                        println!(
                            "accepted min {} {}",
                            amount_ui(req.to_token.decimals, guard.accepted_min_out().unwrap_or_default()),
                            req.to_token.symbol
                        );
                    }
                    None | Some("n") | Some("no") => return Ok(None),
                    Some(_) => println!("y / a / n"),
                }
            }
        }
    }
}

async fn run_swap<P: Provider + Clone + 'static>(
    ctx: &App,
    provider: P,
    account: Address,
    signer: Arc<dyn TypedDataSigner>,
    args: &TradeArgs,
    auto_confirm: bool,
) -> Result<()> {
    let settings = &ctx.config.swap;
    let chain = AlloyChain::new(provider, account, ctx.chain.chain_id)
        .with_receipt_polling(settings.receipt_timeout(), settings.receipt_poll_interval());
    let req = build_request(ctx, &chain, args, Some(account)).await?;
    let chain: Arc<dyn ChainClient> = Arc::new(chain);

    // Cache the tracked balances; the post-swap refresh merges into this entry
    let tracked = tracked_tokens(ctx.chain, &req);
    let balance_key = BalanceKey {
        account,
        chain_id: ctx.chain.chain_id,
        token_set_size: tracked.len(),
    };
    let cache = Arc::new(BalanceCache::new());
    match chain.balances(account, &tracked).await {
        Ok(balances) => cache.merge(balance_key, &balances),
        Err(e) => warn!("Pre-swap balance read failed: {}", e),
    }

    let reconciler = Arc::new(BalanceReconciler::new(
        Arc::clone(&chain),
        Arc::clone(&cache),
        ctx.config.balances.retry_delay(),
        ctx.config.balances.max_attempts,
    ));
    let history = OrderHistory::open(&ctx.data_dir, ctx.chain.chain_id, account)?;
    let services = SwapServices {
        chain,
        settlement: Arc::new(HubSettlementClient::new(&settings.submit_path, ctx.config.quote.timeout())?),
        signer,
        allowances: Arc::new(AllowanceChecker::default()),
        reconciler,
        sessions: Arc::clone(&ctx.sessions),
        breaker: Arc::clone(&ctx.breaker),
        telemetry: Arc::clone(&ctx.telemetry),
        history: Some(Arc::new(history)),
    };
    let executor = SwapExecutor::new(services, settings.clone(), ctx.api_url());

    // Quote and route
    let flags = ControlFlags::load(ctx.control_path())?;
    let polling = ctx.shutdown.child_token();
    let handle = poller::spawn(ctx.quote_engine()?, polling.clone());
    let mut quotes = handle.quotes.clone();
    handle.set_request(Some(req.clone()));

    let state = first_quote(&mut quotes).await?;
    let owner = decide(ctx, &flags, &req, &state);
    print_quote(&req, &state, owner);
    if owner != TradeOwner::Lh {
        polling.cancel();
        bail!("Trade is routed to {}, not executing through the hub", owner);
    }
    let quote = state.quote.ok_or_else(|| anyhow!("No hub quote"))?;

    let mut guard = PriceGuard::new();
    guard.open(&quote);
    handle.set_phase(SwapPhase::Confirming);
    let confirmed = confirm_swap(ctx, &flags, &req, &mut quotes, &mut guard, &executor, auto_confirm).await;

    handle.set_phase(SwapPhase::Swapping);
    guard.freeze();
    polling.cancel();
    handle.task.await.ok();
    let Some(accepted) = confirmed? else {
        println!("swap cancelled");
        return Ok(());
    };

    let input = SwapInput {
        from_token: req.from_token.clone(),
        to_token: req.to_token.clone(),
        accepted,
        balance_key,
    };
    match executor.execute(input).await {
        Ok(receipt) => {
            println!(
                "swapped {} {} -> {} {}",
                receipt.order.from_amount, req.from_token.symbol, receipt.order.to_amount, req.to_token.symbol
            );
            println!("{}", receipt.order.explorer_link);
            match receipt.reconcile.await {
                Ok(outcome) => info!("Balance refresh: {:?}", outcome),
                Err(e) => warn!("Balance refresh task failed: {}", e),
            }
            let balances = cache.snapshot(&balance_key);
            for token in [&req.from_token, &req.to_token] {
                if let Some(balance) = balances.get(&token.address) {
                    println!("balance: {} {}", amount_ui(token.decimals, *balance), token.symbol);
                }
            }
            Ok(())
        }
        Err(err) => {
            let session = executor.session();
            error!("Swap failed ({:?}): {}", err.kind(), err);
            if session.is_wrapped {
                println!("run `lh-swap unwrap` to convert the wrapped tokens back");
            }
            bail!(session.error.unwrap_or_else(|| err.user_message(session.is_wrapped)))
        }
    }
}

async fn cmd_unwrap(ctx: &App, amount: &str) -> Result<()> {
    let key = private_key()?;
    let account = key.address();
    let provider = ProviderBuilder::new()
        .wallet(EthereumWallet::from(key))
        .connect(&rpc_url()?)
        .await?;
    let settings = &ctx.config.swap;
    let chain = AlloyChain::new(provider, account, ctx.chain.chain_id)
        .with_receipt_polling(settings.receipt_timeout(), settings.receipt_poll_interval());

    let amount = amount_bn(ctx.chain.native_decimals, amount)?;
    let confirmation = unwrap_native(&chain, amount).await?;
    println!("{}", ctx.chain.explorer_tx_link(confirmation.hash));
    Ok(())
}

fn cmd_history(ctx: &App, account: Option<Address>) -> Result<()> {
    let account = match account {
        Some(a) => a,
        None => private_key()?.address(),
    };
    let history = OrderHistory::open(&ctx.data_dir, ctx.chain.chain_id, account)?;
    let orders = history.read_all()?;
    if orders.is_empty() {
        println!("no orders for {:?} on {}", account, ctx.chain.name);
    }
    for order in orders {
        println!(
            "{}  {} {} -> {} {}  {}",
            order.date.format("%Y-%m-%d %H:%M:%S"),
            order.from_amount,
            order.from_token.symbol,
            order.to_amount,
            order.to_token.symbol,
            order.explorer_link
        );
    }
    Ok(())
}

fn cmd_control(ctx: &App, set: Option<ControlArg>, hub: Option<bool>) -> Result<()> {
    let path = ctx.control_path();
    let mut flags = ControlFlags::load(&path)?;
    if set.is_some() || hub.is_some() {
        if let Some(control) = set {
            flags.lh_control = control.into();
        }
        if let Some(enabled) = hub {
            flags.hub_enabled = enabled;
        }
        flags.save(&path)?;
        info!("Control flags updated: {:?}", flags);
    }
    println!("lh_control: {:?}, hub_enabled: {}", flags.lh_control, flags.hub_enabled);
    Ok(())
}

fn start_telemetry(config: &SwapConfig, shutdown: &CancellationToken) -> Result<(Arc<dyn TelemetrySink>, Option<JoinHandle<()>>)> {
    match config.telemetry.endpoint.as_deref() {
        Some(endpoint) => {
            let transport = HttpTransport::new(endpoint)?;
            let (recorder, handle) = TelemetryRecorder::spawn(transport, &config.telemetry, shutdown.clone());
            Ok((Arc::new(recorder), Some(handle)))
        }
        None => Ok((Arc::new(NoopTelemetry), None)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let chain = resolve_chain(&cli.chain)?;

    // Chain-specific .env first, then the generic one
    dotenv::from_filename(format!(".env.{}", chain.name)).ok();
    dotenv::dotenv().ok();

    let config = SwapConfig::load_or_default(cli.config.as_deref())?;
    init_logging(&config.general.log_level, cli.json_logs);
    info!("lh-swap on {} (chain_id {})", chain.name, chain.chain_id);

    let shutdown = CancellationToken::new();
    let (telemetry, telemetry_task) = start_telemetry(&config, &shutdown)?;
    let ctx = App {
        data_dir: PathBuf::from(&config.general.data_dir),
        breaker: Arc::new(FailureCircuitBreaker::new(config.swap.max_failures)),
        config,
        chain,
        sessions: Arc::new(SessionRegistry::new()),
        telemetry,
        shutdown: shutdown.clone(),
    };

    let result = match &cli.command {
        Command::Quote(args) => cmd_quote(&ctx, args).await,
        Command::Watch(args) => cmd_watch(&ctx, args).await,
        Command::Swap { trade, node_account, yes } => cmd_swap(&ctx, trade, *node_account, *yes).await,
        Command::Unwrap { amount } => cmd_unwrap(&ctx, amount).await,
        Command::History { account } => cmd_history(&ctx, *account),
        Command::Control { set, hub } => cmd_control(&ctx, *set, *hub),
    };

    // Flush pending telemetry before exit
    drop(ctx);
    shutdown.cancel();
    if let Some(task) = telemetry_task {
        task.await.ok();
    }
    result
}
