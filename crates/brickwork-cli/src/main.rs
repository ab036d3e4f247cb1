use std::sync::Arc;

use anyhow::{Context, Result};
use brickwork_client::{
    BackendClient, Catalog, ClientPolicy, ListParams, MemoryBackend, StaticSession,
};
use brickwork_client::JobSignals;
use brickwork_core::{
    InspectionJob, JobStatus, MarketplaceConfig, Professional, ProfessionalKind, Property,
    Recommendation, SectionCondition, SectionEntry, SectionId, ServiceType,
};
use brickwork_report::ReportSession;
use brickwork_search::{apply, GeoPoint, ListFilter};
use brickwork_web::AppState;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "brickwork-cli")]
#[command(about = "Brickwork property services marketplace CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the JSON API.
    Serve {
        #[arg(long, default_value_t = 8000)]
        port: u16,
        /// Talk to the hosted backend instead of in-memory sample data.
        #[arg(long)]
        live: bool,
    },
    /// Browse a collection through the shared filter engine.
    Browse {
        #[arg(value_enum)]
        collection: Collection,
        #[arg(long, default_value = "")]
        q: String,
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        lat: Option<f64>,
        #[arg(long)]
        lng: Option<f64>,
        #[arg(long, default_value_t = 50.0)]
        radius_km: f64,
    },
    /// Walk a sample report draft through save, submit, and job transition.
    Report,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Collection {
    Professionals,
    Properties,
    Jobs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let config = MarketplaceConfig::from_env();

    match cli.command {
        Commands::Serve { port, live } => {
            let state = if live {
                live_state(&config)?
            } else {
                sample_state()
            };
            info!(port, live, "starting brickwork web API");
            brickwork_web::serve(state, port).await?;
        }
        Commands::Browse {
            collection,
            q,
            kind,
            lat,
            lng,
            radius_km,
        } => {
            let backend = sample_backend();
            let mut filter = ListFilter::new().with_text(q);
            if let Some(kind) = kind {
                filter = filter.with_categorical("kind", kind);
            }
            if let (Some(lat), Some(lng)) = (lat, lng) {
                filter = filter.with_center(GeoPoint { lat, lng }, radius_km);
            }
            browse(&backend, collection, &filter).await?;
        }
        Commands::Report => report_demo(&config).await?,
    }

    Ok(())
}

/// Runs the full draft lifecycle against the in-memory backend and prints
/// each state transition.
async fn report_demo(config: &MarketplaceConfig) -> Result<()> {
    let backend = sample_backend();
    let job = backend
        .list_jobs(&ListParams::new())
        .await?
        .into_iter()
        .next()
        .context("sample backend has no jobs")?;
    backend
        .transition_job_status(job.id, JobStatus::Assigned)
        .await?;

    let inspector_id = Uuid::new_v4();
    let session = ReportSession::new(
        backend.clone(),
        backend.clone(),
        job.id,
        job.requester_id,
        inspector_id,
    );
    println!("opened session for {} ({:?})", job.property_address, session.draft_state());

    session.set_section(
        SectionId::RoofExterior,
        SectionEntry {
            condition: Some(SectionCondition::Fair),
            notes: "two cracked tiles on the southern face".into(),
        },
    )?;
    session.save_now().await?;
    println!("after first save: {:?}", session.draft_state());

    session.set_score(7.5)?;
    session.set_recommendation(Recommendation::WorthConsidering)?;
    session.set_summary("Sound structure, roof maintenance needed within twelve months.")?;
    session.acknowledge_disclaimer()?;

    let id = session.submit(true).await?;
    println!("submitted report {id}");
    let updated = backend
        .job(job.id)
        .context("job vanished from the sample backend")?;
    println!("job status is now {}", updated.status.as_str());
    println!(
        "inspector payout on a $700 job: ${}",
        session.payout_preview(700, config)
    );
    Ok(())
}

fn live_state(config: &MarketplaceConfig) -> Result<AppState> {
    let token =
        std::env::var("BRICKWORK_ACCESS_TOKEN").context("BRICKWORK_ACCESS_TOKEN is required")?;
    let user = std::env::var("BRICKWORK_USER_ID")
        .context("BRICKWORK_USER_ID is required")?
        .parse()
        .context("BRICKWORK_USER_ID must be a UUID")?;
    let session = Arc::new(StaticSession { token, user });
    let policy = ClientPolicy {
        timeout: std::time::Duration::from_secs(config.http_timeout_secs),
        ..ClientPolicy::default()
    };
    let client = Arc::new(
        BackendClient::new(config.backend_base_url.clone(), policy, session.clone())
            .map_err(|e| anyhow::anyhow!("building backend client: {e}"))?,
    );
    Ok(AppState {
        catalog: client.clone(),
        drafts: client,
        session,
    })
}

fn sample_state() -> AppState {
    let backend = sample_backend();
    AppState {
        catalog: backend.clone(),
        drafts: backend,
        session: Arc::new(StaticSession {
            token: "sample".to_string(),
            user: Uuid::new_v4(),
        }),
    }
}

fn sample_backend() -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_professionals(vec![
        sample_professional("Ava Nguyen", ProfessionalKind::BuyersAgent, -33.8915, 151.1543),
        sample_professional("Marcus Bell", ProfessionalKind::Conveyancer, -33.8688, 151.2093),
        sample_professional("Priya Sharma", ProfessionalKind::BuildingInspector, -37.8136, 144.9631),
    ]);
    backend.seed_properties(vec![Property {
        id: Uuid::new_v4(),
        lister_id: Uuid::new_v4(),
        title: "Federation cottage with rear lane access".to_string(),
        address: "14 Foucart St".to_string(),
        suburb: "Rozelle".to_string(),
        latitude: Some(-33.8623),
        longitude: Some(151.1712),
        currency: "AUD".to_string(),
        asking_price: 1_850_000,
        bedrooms: 3,
        bathrooms: 1,
        parking: 0,
        off_market: true,
        created_at: Utc::now(),
    }]);
    backend.seed_jobs(vec![InspectionJob {
        id: Uuid::new_v4(),
        requester_id: Uuid::new_v4(),
        property_address: "2 Garnet Ave".to_string(),
        suburb: "Lilyfield".to_string(),
        latitude: Some(-33.8705),
        longitude: Some(151.1623),
        service_type: ServiceType::Combined,
        status: JobStatus::Open,
        agreed_price: None,
        created_at: Utc::now(),
    }]);
    backend
}

fn sample_professional(
    name: &str,
    kind: ProfessionalKind,
    lat: f64,
    lng: f64,
) -> Professional {
    Professional {
        id: Uuid::new_v4(),
        display_name: name.to_string(),
        kind,
        city: "Sydney".to_string(),
        latitude: Some(lat),
        longitude: Some(lng),
        specializations: vec![],
        verified: true,
        rating: Some(4.6),
        created_at: Utc::now(),
    }
}

async fn browse(
    backend: &Arc<MemoryBackend>,
    collection: Collection,
    filter: &ListFilter,
) -> Result<()> {
    let params = ListParams::new().order_desc("created_at");
    match collection {
        Collection::Professionals => {
            let rows = backend.list_professionals(&params).await?;
            for m in apply(&rows, filter) {
                println!(
                    "{:<28} {:<20} {}",
                    m.entity.display_name,
                    m.entity.kind.as_str(),
                    format_distance(m.distance_km)
                );
            }
        }
        Collection::Properties => {
            let rows = backend.list_properties(&params).await?;
            for m in apply(&rows, filter) {
                println!(
                    "{:<40} {:<16} {}",
                    m.entity.title,
                    m.entity.suburb,
                    format_distance(m.distance_km)
                );
            }
        }
        Collection::Jobs => {
            let rows = backend.list_jobs(&params).await?;
            for m in apply(&rows, filter) {
                println!(
                    "{:<28} {:<10} {:<10} {}",
                    m.entity.property_address,
                    m.entity.service_type.as_str(),
                    m.entity.status.as_str(),
                    format_distance(m.distance_km)
                );
            }
        }
    }
    Ok(())
}

fn format_distance(distance_km: Option<f64>) -> String {
    match distance_km {
        Some(d) => format!("{d:.1} km"),
        None => "distance unknown".to_string(),
    }
}
