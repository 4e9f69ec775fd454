use std::{error::Error, str::FromStr};

use clap::{Args, Parser, Subcommand};
use engine::{
    BreakdownField, CurrencyCode, Engine, FeeMode, FiscalInputs, ManualOverrides, PaymentLine,
    ReceiptDraft, canonicalize, compute_breakdown, normalize_payment_line, parse_amount,
    plan_receipt,
};
use migration::MigratorTrait;
use rust_decimal::Decimal;
use sea_orm::{Database, DatabaseConnection};
use serde::Serialize;

use settings::Settings;

mod settings;

#[derive(Parser, Debug)]
#[command(name = "tesoro_admin")]
#[command(about = "Admin utilities for Tesoro (counters, fee and fiscal previews, receipt dry runs)")]
struct Cli {
    /// Optional config file path (TOML).
    #[arg(long, global = true)]
    config: Option<String>,

    /// Database connection string (also read from `DATABASE_URL`).
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Override the log level (e.g. `debug`).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Receipts settle the whole booking.
    #[arg(long, global = true)]
    booking_sale_mode: bool,

    /// Fiscal figures are entered by hand.
    #[arg(long, global = true)]
    manual_breakdown: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Agency sequence counters.
    Counter(Counter),
    /// Preview the fee of one payment line.
    Fee(FeeArgs),
    /// Fiscal breakdown of a sale, as JSON.
    Fiscal(FiscalArgs),
    /// Dry run of a receipt draft read from a JSON file.
    Plan(PlanArgs),
}

#[derive(Args, Debug)]
struct Counter {
    #[command(subcommand)]
    command: CounterCommand,
}

#[derive(Subcommand, Debug)]
enum CounterCommand {
    /// Consume and print the next value.
    Next(CounterArgs),
    /// Print the next value without consuming it.
    Peek(CounterArgs),
    /// Raise the next value to at least `--value`.
    SetAtLeast(CounterValueArgs),
    /// Overwrite the next value.
    Set(CounterValueArgs),
}

#[derive(Args, Debug)]
struct CounterArgs {
    #[arg(long)]
    agency: i64,
    #[arg(long, default_value = "receipt")]
    key: String,
}

#[derive(Args, Debug)]
struct CounterValueArgs {
    #[command(flatten)]
    counter: CounterArgs,
    #[arg(long)]
    value: i64,
}

#[derive(Args, Debug)]
struct FeeArgs {
    #[arg(long, value_parser = parse_money)]
    amount: Decimal,
    #[arg(long, default_value = "ARS")]
    currency: String,
    /// `none`, `fixed` or `percent`. Leave out to preview a legacy fee.
    #[arg(long, value_parser = parse_fee_mode)]
    mode: Option<FeeMode>,
    #[arg(long, value_parser = parse_decimal)]
    value: Option<Decimal>,
    /// Fee recorded without a mode.
    #[arg(long, value_parser = parse_money)]
    legacy_fee: Option<Decimal>,
}

#[derive(Args, Debug)]
struct FiscalArgs {
    #[arg(long, default_value = "ARS")]
    currency: String,
    #[arg(long, value_parser = parse_money)]
    sale: Decimal,
    #[arg(long, value_parser = parse_money)]
    cost: Decimal,
    #[arg(long, default_value = "0", value_parser = parse_money)]
    vat_21: Decimal,
    #[arg(long, default_value = "0", value_parser = parse_money)]
    vat_10_5: Decimal,
    #[arg(long, default_value = "0", value_parser = parse_money)]
    exempt: Decimal,
    #[arg(long, default_value = "0", value_parser = parse_money)]
    other_taxes: Decimal,
    #[arg(long, default_value = "0", value_parser = parse_money)]
    card_interest: Decimal,
    #[arg(long, default_value = "0", value_parser = parse_money)]
    card_interest_vat: Decimal,
    /// Fraction of the sale (`0.024`); defaults to the agency setting.
    #[arg(long, value_parser = parse_decimal)]
    transfer_fee_pct: Option<Decimal>,
    /// Manual value for a breakdown field, as `field=value`. Repeatable.
    #[arg(long = "override", value_parser = parse_override)]
    overrides: Vec<(BreakdownField, Decimal)>,
}

#[derive(Args, Debug)]
struct PlanArgs {
    /// JSON file holding a receipt draft.
    path: std::path::PathBuf,
}

#[derive(Serialize)]
struct FiscalOutput {
    report: engine::FiscalReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    adjusted: Option<engine::AdjustedBreakdown>,
}

fn parse_money(raw: &str) -> Result<Decimal, String> {
    parse_amount(raw).map_err(|err| err.to_string())
}

fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw.trim()).map_err(|err| format!("invalid number {raw:?}: {err}"))
}

fn parse_fee_mode(raw: &str) -> Result<FeeMode, String> {
    FeeMode::try_from(raw).map_err(|err| err.to_string())
}

fn parse_override(raw: &str) -> Result<(BreakdownField, Decimal), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got {raw:?}"))?;
    let field = BreakdownField::try_from(field).map_err(|err| err.to_string())?;
    Ok((field, parse_decimal(value)?))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn connect_db(
    database_url: &str,
) -> Result<DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

async fn run_counter(
    settings: &Settings,
    command: CounterCommand,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let db = connect_db(&settings.database_url).await?;
    let engine = Engine::builder().database(db).build().await?;

    match command {
        CounterCommand::Next(args) => {
            let value = engine.next_counter(args.agency, &args.key).await?;
            println!("{value}");
        }
        CounterCommand::Peek(args) => match engine.peek_counter(args.agency, &args.key).await? {
            Some(next) => println!("{next}"),
            None => println!("{} has not been used by agency {}", args.key, args.agency),
        },
        CounterCommand::SetAtLeast(args) => {
            let next = engine
                .set_counter_at_least(args.counter.agency, &args.counter.key, args.value)
                .await?;
            println!("next {} for agency {}: {next}", args.counter.key, args.counter.agency);
        }
        CounterCommand::Set(args) => {
            engine
                .set_counter_exact(args.counter.agency, &args.counter.key, args.value)
                .await?;
            println!(
                "next {} for agency {}: {}",
                args.counter.key, args.counter.agency, args.value
            );
        }
    }

    Ok(())
}

fn run_fee(args: FeeArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut line = PaymentLine::new(args.amount, args.currency, 0);
    line.fee_mode = args.mode;
    line.fee_value = args.value;
    line.fee_amount = args.legacy_fee;
    let normalized = normalize_payment_line(&line)?;
    print_json(&normalized)
}

fn run_fiscal(settings: &Settings, args: FiscalArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let currency: CurrencyCode = canonicalize(&args.currency);
    let inputs = FiscalInputs {
        currency,
        sale_price: args.sale,
        cost: args.cost,
        vat_21: args.vat_21,
        vat_10_5: args.vat_10_5,
        exempt: args.exempt,
        other_taxes: args.other_taxes,
        card_interest: args.card_interest,
        card_interest_vat: args.card_interest_vat,
        transfer_fee_pct: args
            .transfer_fee_pct
            .unwrap_or(settings.agency.transfer_fee_pct),
    };
    let report = compute_breakdown(&inputs, &settings.agency)?;

    let mut overrides = ManualOverrides::new();
    for (field, value) in args.overrides {
        overrides.insert(field, value);
    }
    let adjusted = if overrides.is_empty() {
        None
    } else {
        Some(report.with_overrides(&overrides)?)
    };

    print_json(&FiscalOutput { report, adjusted })
}

fn run_plan(settings: &Settings, args: PlanArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let raw = std::fs::read_to_string(&args.path)?;
    let mut draft: ReceiptDraft = serde_json::from_str(&raw)?;
    if let Some(booking) = draft.booking.as_mut() {
        booking.config = settings.agency;
    }
    let plan = plan_receipt(&draft)?;
    print_json(&plan)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(database_url) = cli.database_url {
        settings.database_url = database_url;
    }
    if let Some(log_level) = cli.log_level {
        settings.log_level = log_level;
    }
    if cli.booking_sale_mode {
        settings.agency.booking_sale_mode = true;
    }
    if cli.manual_breakdown {
        settings.agency.manual_breakdown = true;
    }

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "tesoro_admin={level},engine={level}",
            level = settings.log_level
        ))
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!(?settings, "settings loaded");

    match cli.command {
        Command::Counter(Counter { command }) => run_counter(&settings, command).await?,
        Command::Fee(args) => run_fee(args)?,
        Command::Fiscal(args) => run_fiscal(&settings, args)?,
        Command::Plan(args) => run_plan(&settings, args)?,
    }

    Ok(())
}
