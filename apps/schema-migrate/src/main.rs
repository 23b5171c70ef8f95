use anyhow::{bail, Context, Result};
use clap::Parser;
use dotenv::dotenv;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use schema_cell::{
    Admin, Appointment, ClinicStore, Doctor, Entity, EntityStore, Filter, Patient, Prescription,
    Receptionist, Records, Slot, CLINIC_SCHEMA,
};
use shared_config::{AppConfig, StoreBackend};

/// Prints the Postgres DDL for the clinic schema to stdout.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Prefix the DDL with DROP TABLE statements (child tables first)
    #[arg(long)]
    drop: bool,

    /// Instead of printing, query every table through the configured store
    #[arg(long)]
    check: bool,
}

async fn count_rows<E: Entity>(store: &ClinicStore) -> Result<usize> {
    let rows = store
        .list::<E>(&Filter::all())
        .await
        .with_context(|| format!("failed to read table '{}'", E::table().name))?;
    Ok(rows.len())
}

async fn check_tables(config: &AppConfig) -> Result<()> {
    if config.store_backend == StoreBackend::Supabase && !config.is_configured() {
        bail!("CLINIC_STORE=supabase requires SUPABASE_URL and SUPABASE_ANON_PUBLIC_KEY");
    }

    let store = ClinicStore::from_config(config);
    info!("Checking clinic tables against the {} store", store.backend());

    let counts = [
        ("admin", count_rows::<Admin>(&store).await?),
        ("patient", count_rows::<Patient>(&store).await?),
        ("doctor", count_rows::<Doctor>(&store).await?),
        ("receptionist", count_rows::<Receptionist>(&store).await?),
        ("slot", count_rows::<Slot>(&store).await?),
        ("records", count_rows::<Records>(&store).await?),
        ("appointment", count_rows::<Appointment>(&store).await?),
        ("prescription", count_rows::<Prescription>(&store).await?),
    ];

    for (table, count) in counts {
        info!("{}: {} rows", table, count);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Logs go to stderr so the DDL on stdout can be piped into psql
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    CLINIC_SCHEMA
        .validate()
        .map_err(anyhow::Error::msg)
        .context("clinic schema declarations are inconsistent")?;
    info!("Clinic schema declares {} tables", CLINIC_SCHEMA.tables.len());

    if args.check {
        let config = AppConfig::from_env();
        return check_tables(&config).await;
    }

    if args.drop {
        warn!("Emitting DROP TABLE statements; existing clinic data will be lost");
        println!("{}\n", CLINIC_SCHEMA.drop_ddl());
    }
    println!("{}", CLINIC_SCHEMA.to_postgres_ddl());

    Ok(())
}
