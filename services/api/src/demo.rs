use crate::infra::{
    seed_accounts, seed_caspian_fleet, InMemoryDatastore, RecordingMailer, ADMIN_PASSWORD,
    ADMIN_USERNAME,
};
use clap::Args;
use ecoports::auth::AuthGate;
use ecoports::config::AppConfig;
use ecoports::error::AppError;
use ecoports::ingest::{PdfTextExtractor, ReportImporter};
use ecoports::ports::{
    Datastore, PortId, PortPatch, PortService, ReportDraft, ReportService, SortField, SortOrder,
};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Only show ports at or above this green score in the directory listing
    #[arg(long)]
    pub(crate) min_score: Option<f64>,
    /// Include the full metric breakdown for every seeded port
    #[arg(long)]
    pub(crate) list_ports: bool,
}

/// Walks the seeded fleet through every service flow without binding a
/// socket: login, listing, stats, citizen reports, subscription alerts, and
/// inspection PDF ingest.
pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;

    let store = Arc::new(InMemoryDatastore::default());
    seed_accounts(&store)?;
    seed_caspian_fleet(&store)?;

    let mailer = Arc::new(RecordingMailer::default());
    let importer = ReportImporter::new(Box::new(PdfTextExtractor::new()));
    let ports = PortService::new(store.clone(), mailer.clone(), importer);
    let reports = ReportService::new(store.clone());
    let gate = AuthGate::new(store.clone(), &config.auth);

    println!("EcoPorts service demo");

    let grant = match gate.login(ADMIN_USERNAME, ADMIN_PASSWORD) {
        Ok(grant) => grant,
        Err(err) => {
            println!("  Login failed: {}", err);
            return Ok(());
        }
    };
    println!("- Logged in as {} (role {})", ADMIN_USERNAME, grant.role);

    println!("\nPort directory by green score");
    let page = match ports.list(
        SortField::GreenScore,
        SortOrder::Descending,
        args.min_score,
        1,
        10,
    ) {
        Ok(page) => page,
        Err(err) => {
            println!("  Listing unavailable: {}", err);
            return Ok(());
        }
    };
    for port in &page.ports {
        println!(
            "- {}: green score {:.2} ({} incidents)",
            port.name, port.green_score, port.incidents
        );
    }
    if let Some(floor) = args.min_score {
        println!("  {} ports at or above score {:.1}", page.total, floor);
    }

    println!("\nFleet overview");
    match ports.stats() {
        Ok(stats) => {
            println!(
                "- {} ports tracked | average green score {:.2}",
                stats.total_ports, stats.avg_green_score
            );
            println!("- Most polluted:");
            for entry in &stats.top_polluted {
                println!("  - {} ({:.2})", entry.name, entry.score);
            }
        }
        Err(err) => println!("  Stats unavailable: {}", err),
    }

    println!("\nCitizen report intake");
    match reports.create(ReportDraft {
        port_id: PortId(1),
        user_email: "demo.citizen@example.com".to_string(),
        description: "Foam along the waterline by the ferry dock".to_string(),
    }) {
        Ok(report) => println!("- Filed report {} against port {}", report.id, report.port_id),
        Err(err) => println!("  Report rejected: {}", err),
    }

    println!("\nSubscription and alerting");
    match ports.subscribe(PortId(1), "harbormaster@example.com") {
        Ok(outcome) => println!("- Subscription outcome: {:?}", outcome),
        Err(err) => println!("  Subscription failed: {}", err),
    }

    let patch = PortPatch {
        air_quality: Some(80.0),
        ..PortPatch::default()
    };
    match ports.update(PortId(1), patch) {
        Ok(update) => {
            println!(
                "- Updated {}: green score now {:.2}",
                update.view.name, update.view.green_score
            );
            if let Some(handle) = update.alert {
                if let Err(err) = handle.await {
                    println!("  Alert delivery task failed: {}", err);
                }
            }
        }
        Err(err) => println!("  Update failed: {}", err),
    }
    for alert in mailer.deliveries() {
        println!(
            "- Alert '{}' delivered to {}",
            alert.subject,
            alert.recipients.join(", ")
        );
        println!("  {}", alert.body);
    }

    println!("\nInspection report ingest");
    match ports.import_report(PortId(3), &sample_inspection_pdf()) {
        Ok(fields) => println!("- Parsed inspection PDF; updated fields: {}", fields.join(", ")),
        Err(err) => println!("  Ingest failed: {}", err),
    }

    if args.list_ports {
        println!("\nPort metric breakdown");
        let listing = store.list_ports()?;
        for port in listing {
            println!("- {} (lat {:.2}, lng {:.2})", port.name, port.lat, port.lng);
            println!(
                "  air {:.1} | water {:.1} | co2 {:.1} | incidents {} | score {:.2}",
                port.air_quality,
                port.water_quality,
                port.co2_emissions,
                port.incidents,
                port.green_score()
            );
        }
    }

    Ok(())
}

/// Single-page uncompressed document shaped like the inspection PDFs the
/// ingest pipeline expects.
fn sample_inspection_pdf() -> Vec<u8> {
    let mut bytes = b"%PDF-1.4\n1 0 obj\n<< /Length 0 >>\nstream\nBT ".to_vec();
    bytes.extend_from_slice(
        b"(Quarterly inspection summary) Tj (Air Quality: 38.5) Tj (Water Quality: 18.2) Tj \
          (CO2 Emissions: 410) Tj (Incidents: 1) Tj",
    );
    bytes.extend_from_slice(b" ET\nendstream\nendobj\n%%EOF\n");
    bytes
}
