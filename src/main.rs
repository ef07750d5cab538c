use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use ulid::Ulid;

use courtbook::config::Settings;
use courtbook::model::{Addons, Candidate, ReservationStatus};
use courtbook::tenant::TenantManager;

/// Court booking engine: availability, checks, quotes and bookings for one club.
#[derive(Parser, Debug)]
#[command(name = "courtbook", version, about, long_about = None)]
struct Args {
    /// Club whose `<tenant>.json` facility and `<tenant>.wal` ledger to use
    #[arg(short, long, global = true, default_value = "default")]
    tenant: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct CandidateArgs {
    /// Court id
    court: Ulid,
    /// Local start, e.g. 2026-03-02T18:00:00
    start: NaiveDateTime,
    /// Duration in minutes
    minutes: u32,
    #[arg(long)]
    lighting: bool,
    #[arg(long)]
    heating: bool,
}

impl CandidateArgs {
    fn candidate(&self) -> Candidate {
        Candidate::new(self.court, self.start, self.minutes).with_addons(Addons {
            lighting: self.lighting,
            heating: self.heating,
        })
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bookable start times and durations for a date
    Slots {
        date: NaiveDate,
        /// Restrict to these courts (repeatable); all courts when omitted
        #[arg(long)]
        court: Vec<Ulid>,
        /// Restrict to these offered durations (repeatable)
        #[arg(long)]
        duration: Vec<u32>,
        /// Hide starts at or before this instant
        #[arg(long)]
        now: Option<NaiveDateTime>,
    },
    /// Whether a candidate could be booked right now
    Check(CandidateArgs),
    /// Price a candidate
    Quote(CandidateArgs),
    /// Validate, price and commit a reservation
    Book {
        #[command(flatten)]
        candidate: CandidateArgs,
        /// Hold as pending instead of confirmed
        #[arg(long)]
        pending: bool,
        #[arg(long)]
        label: Option<String>,
    },
    /// Cancel a reservation (idempotent)
    Cancel { id: Ulid },
    /// Every reservation of a court on a date, cancelled ones included
    History { court: Ulid, date: NaiveDate },
}

fn print_json(value: &impl Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let args = Args::parse();

    let settings = Settings::from_env();
    courtbook::observability::init(settings.metrics_port)?;
    std::fs::create_dir_all(&settings.data_dir)?;
    info!("data_dir: {}", settings.data_dir.display());

    let tenants = TenantManager::new(settings);
    let tenant = tenants.get_or_create(&args.tenant)?;
    let engine = &tenant.engine;

    match args.command {
        Command::Slots {
            date,
            court,
            duration,
            now,
        } => {
            let durations = (!duration.is_empty()).then_some(duration.as_slice());
            print_json(&engine.enumerate_slots(date, &court, durations, now).await?)?;
        }
        Command::Check(c) => print_json(&engine.check_candidate(&c.candidate()).await?)?,
        Command::Quote(c) => {
            let quote = engine.quote(&c.candidate())?;
            let per_participant = quote.per_participant();
            print_json(&serde_json::json!({
                "quote": quote,
                "per_participant": per_participant,
            }))?;
        }
        Command::Book {
            candidate,
            pending,
            label,
        } => {
            let status = if pending {
                ReservationStatus::Pending
            } else {
                ReservationStatus::Confirmed
            };
            print_json(&engine.book(&candidate.candidate(), status, label).await?)?;
        }
        Command::Cancel { id } => print_json(&engine.cancel(id).await?)?,
        Command::History { court, date } => print_json(&engine.reservations_on(court, date).await?)?,
    }
    Ok(())
}
