use clap::{Parser, Subcommand};
use einvoice_scan::{
    CaptureOutcome, CaptureSession, Config, Invoice, InvoiceService, JsonFrameScanner, ResolvedBy,
    parse_einvoice,
};
use std::path::PathBuf;
use tokio::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(version, about = "Scan Taiwanese e-invoice QR pairs into a local invoice book")]
struct Cli {
    #[arg(long, global = true, default_value = ".config/einvoice.toml")]
    config: PathBuf,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Capture from JSON frame files (one file per photo) and store complete invoices
    Scan {
        #[arg(long = "frame", required = true)]
        frames: Vec<PathBuf>,
    },
    /// Parse a LEFT/RIGHT payload pair directly
    Parse {
        #[arg(long)]
        left: String,
        #[arg(long)]
        right: Option<String>,
        #[arg(long, default_value_t = false)]
        save: bool,
    },
    /// List stored invoices, newest first
    List {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show one stored invoice with its items
    Show { id: String },
    /// Delete every stored invoice
    Clear,
    /// Point the config file at another database
    SetDb { path: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter("info")
        .init();

    let cli = Cli::parse();
    let mut cfg = Config::load_or_default(&cli.config)?;

    match cli.cmd {
        Cmd::Scan { frames } => {
            let mut svc = InvoiceService::init(&cfg)?;
            scan_frames(&mut svc, frames, Duration::from_millis(cfg.capture.cooldown_ms)).await?;
            svc.dispose()?;
        }
        Cmd::Parse { left, right, save } => {
            let invoice = parse_einvoice(&left, right.as_deref());
            print_invoice(&invoice)?;
            if save {
                let mut svc = InvoiceService::init(&cfg)?;
                svc.save(&invoice)?;
                svc.dispose()?;
            }
        }
        Cmd::List { limit } => {
            if let Some(limit) = limit {
                cfg.list_limit = limit;
            }
            let svc = InvoiceService::init(&cfg)?;
            println!("{}", serde_json::to_string_pretty(svc.summaries())?);
            info!(count = svc.summaries().len(), "Listed invoices");
            svc.dispose()?;
        }
        Cmd::Show { id } => {
            let svc = InvoiceService::init(&cfg)?;
            match svc.get_by_id(&id)? {
                Some(invoice) => print_invoice(&invoice)?,
                None => println!("No invoice with id {id}"),
            }
            svc.dispose()?;
        }
        Cmd::Clear => {
            let mut svc = InvoiceService::init(&cfg)?;
            svc.clear_all()?;
            svc.dispose()?;
        }
        Cmd::SetDb { path } => {
            Config::update_db_path(&cli.config, &path)?;
            info!(config = %cli.config.display(), db_path = %path, "Config updated");
        }
    }

    Ok(())
}

async fn scan_frames(
    svc: &mut InvoiceService,
    frames: Vec<PathBuf>,
    cooldown: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let total = frames.len();
    let session = CaptureSession::new(JsonFrameScanner::new(frames), cooldown);
    let mut attempts = 0;

    while attempts < total {
        let outcome = session.capture().await;
        if !matches!(outcome, Ok(CaptureOutcome::Busy)) {
            attempts += 1;
        }
        match outcome {
            Ok(CaptureOutcome::Busy) => {
                tokio::time::sleep(session.cooldown()).await;
            }
            Ok(CaptureOutcome::NoneDetected) => {
                warn!(attempt = attempts, "No QR code found, move closer and capture again");
            }
            Ok(CaptureOutcome::Waiting(halves)) => {
                warn!(
                    attempt = attempts,
                    left = halves.left.is_some(),
                    right = halves.right.is_some(),
                    "Only one QR code found, keep both codes in frame and capture again"
                );
            }
            Ok(CaptureOutcome::Ready { pair, resolved_by }) => {
                if resolved_by == ResolvedBy::ScanOrder {
                    warn!("LEFT/RIGHT assigned by scan order only, check the result");
                }
                let invoice = svc.ingest(&pair)?;
                print_invoice(&invoice)?;
            }
            Err(e) => {
                error!(attempt = attempts, error = %e, "Capture failed");
            }
        }
    }

    info!(stored = svc.summaries().len(), "Scan finished");
    Ok(())
}

fn print_invoice(invoice: &Invoice) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(invoice)?);

    if !invoice.has_items() {
        println!("\n⚠ No items parsed, raw payload follows.");
        println!("LEFT: {}", invoice.raw_left);
        if let Some(right) = &invoice.raw_right {
            println!("RIGHT: {right}");
        }
        return Ok(());
    }

    println!("\n--- Items ---");
    for item in &invoice.items {
        println!(
            "{:<24} {:>8} x {:>10} = {:>10}",
            item.name,
            item.qty,
            item.unit_price,
            item.subtotal()
        );
    }
    println!("--- Total: {} ---", invoice.computed_total());
    Ok(())
}
