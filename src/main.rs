use anyhow::{bail, Result};
use chrono::Utc;
use std::env;
use std::path::{Path, PathBuf};

use badge_access::{
    get_access_summaries, import_roster, load_roster, open_database, seed_reference_data,
    setup_database,
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("init") => run_init(&db_path()),
        Some("import") => {
            let Some(csv_path) = args.get(2) else {
                bail!("Usage: badge-access import <roster.csv>");
            };
            run_import(&db_path(), Path::new(csv_path))
        }
        Some("status") => run_status(&db_path()),
        _ => {
            eprintln!("Usage: badge-access <init | import <roster.csv> | status>");
            std::process::exit(1);
        }
    }
}

/// Database location: BADGE_ACCESS_DB env var, or ./badge_access.db
fn db_path() -> PathBuf {
    env::var("BADGE_ACCESS_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("badge_access.db"))
}

fn run_init(db: &Path) -> Result<()> {
    println!("🔧 Initializing access-control database at {:?}...", db);

    let conn = open_database(db)?;
    setup_database(&conn)?;
    println!("✓ Schema ready (WAL mode)");

    seed_reference_data(&conn)?;
    println!("✓ Reference data seeded: departments, locations, readers, profiles, rules");

    Ok(())
}

fn run_import(db: &Path, csv_path: &Path) -> Result<()> {
    println!("📂 Importing roster from {:?}...", csv_path);

    let conn = open_database(db)?;
    setup_database(&conn)?;
    seed_reference_data(&conn)?;

    let rows = load_roster(csv_path)?;
    println!("✓ Loaded {} roster rows", rows.len());

    let report = import_roster(&conn, &rows)?;
    println!("✓ Hired: {} employees", report.hired);
    println!("✓ Default grants created: {}", report.grants_created);

    if !report.pending_review.is_empty() {
        println!(
            "⚠ No access rule for {} hire(s), access pending manual review:",
            report.pending_review.len()
        );
        for code in &report.pending_review {
            println!("   {}", code);
        }
    }

    Ok(())
}

fn run_status(db: &Path) -> Result<()> {
    if !db.exists() {
        bail!("Database not found. Run: badge-access init");
    }

    let conn = open_database(db)?;
    let today = Utc::now().date_naive();
    let summaries = get_access_summaries(&conn, today)?;

    println!("👥 {} employees (as of {})\n", summaries.len(), today);
    println!(
        "{:<10} {:<24} {:<18} {:<10} {:<12} {:>7}  {}",
        "CODE", "NAME", "DEPARTMENT", "LOCATION", "EXPIRES", "GRANTS", "ACCESS"
    );

    for s in &summaries {
        println!(
            "{:<10} {:<24} {:<18} {:<10} {:<12} {:>7}  {}",
            s.identity_code,
            s.full_name,
            s.department,
            s.location,
            s.contract_expires,
            s.active_grants,
            if s.access_valid { "valid" } else { "✗" }
        );
    }

    Ok(())
}
