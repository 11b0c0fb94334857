//! Operator CLI for a billbook database.
//!
//! Connection settings come from the environment (`DATABASE_URL`,
//! `DATABASE_MAX_CONNECTIONS`, `BILLBOOK_STORE_TIMEOUT_MS`, ...).

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;

use billbook_core::{CustomerId, DateRange, InvoiceId, SellerId};
use billbook_infra::{BillingEngine, CancelOutcome, DatabaseConfig, EngineConfig, PgStore};
use billbook_invoicing::{InvoiceFilter, InvoiceStatus};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    billbook_observability::init();

    let engine = connect().await?;
    match cli.command {
        Commands::Migrate => {
            engine.store().ensure_schema().await.context("failed to apply schema")?;
            println!("schema is up to date");
        }
        Commands::Sweep(args) => {
            let as_of = args.as_of.unwrap_or_else(|| Utc::now().date_naive());
            let report = engine.sweep_overdue(as_of).await?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!("{} invoice(s) marked overdue as of {as_of}", report.marked.len());
                for id in &report.marked {
                    println!("  {id}");
                }
            }
        }
        Commands::Invoices(args) => {
            let filter = InvoiceFilter {
                customer_id: args.customer_id,
                customer_contains: args.customer,
                status: args.status,
                ..InvoiceFilter::default()
            };
            let invoices = engine.list_invoices(args.seller, &filter).await?;
            if cli.json {
                print_json(&invoices)?;
            } else {
                for invoice in &invoices {
                    println!(
                        "{}  {}  {:>12}  {:<9}  due {}",
                        invoice.id(),
                        invoice.customer_id(),
                        invoice.amount().to_string(),
                        invoice.status().as_str(),
                        invoice
                            .due_date()
                            .map(|d| d.to_string())
                            .unwrap_or_else(|| "-".into()),
                    );
                }
            }
        }
        Commands::Cancel(args) => {
            let outcome = engine.cancel_invoice(args.seller, args.invoice).await?;
            if cli.json {
                print_json(&outcome)?;
            } else {
                match outcome {
                    CancelOutcome::Cancelled(invoice) => println!("cancelled {}", invoice.id()),
                    CancelOutcome::AlreadyCancelled(invoice) => {
                        println!("{} was already cancelled", invoice.id())
                    }
                }
            }
        }
        Commands::Analytics(args) => {
            let range = DateRange::new(args.start, args.end)?;
            let report = engine.analytics(args.seller, range).await?;
            // Rankings have no sensible one-line rendering.
            print_json(&report)?;
        }
        Commands::Dashboard(args) => {
            let board = engine.dashboard(args.seller).await?;
            if cli.json {
                print_json(&board)?;
            } else {
                println!("products   {}", board.product_count);
                println!("customers  {}", board.customer_count);
                println!(
                    "invoices   {} ({} paid, {} pending, {} overdue, {} cancelled)",
                    board.invoice_count,
                    board.paid_count,
                    board.pending_count,
                    board.overdue_count,
                    board.cancelled_count
                );
                println!("collected  {}", board.revenue_collected);
                println!("due        {}", board.revenue_due);
            }
        }
        Commands::Activities(args) => {
            let activities = engine.recent_activities(&args.actor, args.limit).await?;
            if cli.json {
                print_json(&activities)?;
            } else {
                for activity in &activities {
                    println!(
                        "{}  {:<24}  {}",
                        activity.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        activity.action_type,
                        activity.description
                    );
                }
            }
        }
    }

    Ok(())
}

async fn connect() -> Result<BillingEngine<PgStore>> {
    let db = DatabaseConfig::from_env().context("invalid database configuration")?;
    let config = EngineConfig::from_env().context("invalid engine configuration")?;
    let store = PgStore::connect(&db)
        .await
        .context("failed to connect to the database")?;
    tracing::debug!(max_connections = db.max_connections, "connected");
    Ok(BillingEngine::new(store, config))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_status(raw: &str) -> Result<InvoiceStatus, String> {
    InvoiceStatus::parse(raw).map_err(|e| e.to_string())
}

#[derive(Parser)]
#[command(name = "billbook", about = "Invoice and inventory maintenance", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create any missing tables.
    Migrate,
    /// Mark past-due pending invoices as overdue.
    Sweep(SweepArgs),
    Invoices(InvoicesArgs),
    Cancel(CancelArgs),
    Analytics(AnalyticsArgs),
    Dashboard(SellerArgs),
    Activities(ActivitiesArgs),
}

#[derive(Args)]
struct SweepArgs {
    #[arg(long, help = "Sweep date (YYYY-MM-DD), defaults to today in UTC")]
    as_of: Option<NaiveDate>,
}

#[derive(Args)]
struct SellerArgs {
    #[arg(long, help = "Seller id, e.g. S001")]
    seller: SellerId,
}

#[derive(Args)]
struct InvoicesArgs {
    #[arg(long, help = "Seller id, e.g. S001")]
    seller: SellerId,
    #[arg(long, value_parser = parse_status, help = "pending, overdue, paid or cancelled")]
    status: Option<InvoiceStatus>,
    #[arg(long, help = "Customer name or email contains")]
    customer: Option<String>,
    #[arg(long, help = "Exact customer id, e.g. C001")]
    customer_id: Option<CustomerId>,
}

#[derive(Args)]
struct CancelArgs {
    #[arg(long)]
    seller: SellerId,
    #[arg(long, help = "Invoice id, e.g. INV-001")]
    invoice: InvoiceId,
}

#[derive(Args)]
struct AnalyticsArgs {
    #[arg(long)]
    seller: SellerId,
    #[arg(long, help = "First day included (YYYY-MM-DD)")]
    start: Option<NaiveDate>,
    #[arg(long, help = "Last day included (YYYY-MM-DD)")]
    end: Option<NaiveDate>,
}

#[derive(Args)]
struct ActivitiesArgs {
    #[arg(long, help = "Actor id: a seller id, an admin id or \"system\"")]
    actor: String,
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_typed_arguments() {
        let cli = Cli::try_parse_from([
            "billbook", "--json", "invoices", "--seller", "S002", "--status", "overdue",
            "--customer-id", "C007",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Invoices(args) => {
                assert_eq!(args.seller, SellerId::from_number(2));
                assert_eq!(args.status, Some(InvoiceStatus::Overdue));
                assert_eq!(args.customer_id, Some(CustomerId::from_number(7)));
            }
            _ => panic!("Expected invoices"),
        }

        assert!(Cli::try_parse_from(["billbook", "dashboard", "--seller", "C001"]).is_err());
    }
}
