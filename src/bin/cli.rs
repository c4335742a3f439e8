//! GenomeDB CLI - Main entry point for CLI binary
//!
//! This binary provides the `genomedb` CLI tool for querying projects.

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use genomedb_lib::engine::{
    api::create_router,
    cli::{
        formatter::{fit, CliFormatter},
        Cli, Commands, OutputFormat, QueryArgs,
    },
    hybrid::CombinedQueryResult,
    logging::init_logging,
};
use genomedb_lib::engine::relational::PatientId;
use genomedb_lib::Project;
use std::path::Path;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run_cli(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let project_dir = cli.get_project_dir();
    let json_output = cli.format == OutputFormat::Json;

    match cli.command {
        Commands::Init { name } => cmd_init(&project_dir, &name, json_output),
        Commands::Query(args) => cmd_query(&project_dir, args, json_output),
        Commands::Serve { port, host } => cmd_serve(&project_dir, host, port),
        Commands::Status => cmd_status(&project_dir, json_output),
        Commands::Stats => cmd_stats(&project_dir, json_output),
        Commands::Patient { id } => cmd_patient(&project_dir, id, json_output),
    }
}

fn open_project(project_dir: &Path) -> anyhow::Result<Project> {
    let project = Project::open(project_dir)?;
    init_logging(&project.config.logging.level);
    Ok(project)
}

fn cmd_init(project_dir: &Path, name: &str, json: bool) -> anyhow::Result<()> {
    let project = Project::init(project_dir, name)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "success": true,
                "project": project.config.project.name,
                "path": project_dir.display().to_string(),
                "relational": project.relational.db_path().display().to_string(),
                "documents": project.documents.path().display().to_string(),
            }))?
        );
    } else {
        CliFormatter::success(&format!("Initialized project '{}'", name));
        CliFormatter::kv("Path", &project_dir.display().to_string());
        CliFormatter::kv("Relational store", &project.relational.db_path().display().to_string());
        CliFormatter::kv("Document store", &project.documents.path().display().to_string());
    }
    Ok(())
}

#[tokio::main]
async fn cmd_query(project_dir: &Path, args: QueryArgs, json: bool) -> anyhow::Result<()> {
    let project = open_project(project_dir)?;
    let coordinator = project.coordinator();

    let as_of = args.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let (predicates, pagination) = args.into_parts();
    let result = coordinator
        .run_combined_query_as_of(&predicates, &pagination, as_of)
        .await
        .context("combined query failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

fn print_result(result: &CombinedQueryResult) {
    CliFormatter::header("Combined query");
    CliFormatter::kv("Query", &result.query_id.to_string());
    CliFormatter::kv("Ages as of", &result.as_of.to_string());
    CliFormatter::kv("Matched", &result.total.to_string());
    CliFormatter::kv(
        "Showing",
        &format!("{} from offset {} (limit {})", result.records.len(), result.offset, result.limit),
    );
    if result.truncated {
        CliFormatter::warning("Result was cut at the configured result cap");
    }

    if result.records.is_empty() {
        CliFormatter::info("No matching samples");
    } else {
        CliFormatter::blank();
        CliFormatter::table_header(&[
            ("Sample", 8),
            ("Patient", 24),
            ("Sex", 7),
            ("Age", 4),
            ("Type", 8),
            ("Tests", 5),
            ("Variants", 30),
        ]);
        for record in &result.records {
            let sample_id = record.sample.sample_id.to_string();
            let patient = format!("{} {}", record.patient.first_name, record.patient.last_name);
            let age = record.patient.age_on(result.as_of).to_string();
            let tests = record.tests.len().to_string();
            let genes = record
                .variants
                .iter()
                .map(|v| v.gene.as_deref().unwrap_or("?"))
                .collect::<Vec<_>>()
                .join(", ");
            CliFormatter::table_row(&[
                (sample_id.as_str(), 8),
                (patient.as_str(), 24),
                (record.patient.sex.as_str(), 7),
                (age.as_str(), 4),
                (record.sample.sample_type.as_str(), 8),
                (tests.as_str(), 5),
                (genes.as_str(), 30),
            ]);
        }
    }

    if !result.warnings.is_empty() {
        CliFormatter::header("Warnings");
        for warning in &result.warnings {
            CliFormatter::warning(&format!("{:?}: {}", warning.kind, fit(&warning.message, 100).trim_end()));
        }
    }
}

#[tokio::main]
async fn cmd_serve(project_dir: &Path, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let project = open_project(project_dir)?;
    let host = host.unwrap_or_else(|| project.config.api.host.clone());
    let port = port.unwrap_or(project.config.api.port);

    let app = create_router(project.api_state());

    let addr = format!("{}:{}", host, port);
    println!("GenomeDB API Server");
    println!("   Project: {}", project.config.project.name);
    println!("   Listening: http://{}", addr);
    println!("   OpenAPI: http://{}/api/openapi.json", addr);
    println!("   Press Ctrl+C to stop");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn cmd_status(project_dir: &Path, json: bool) -> anyhow::Result<()> {
    let project = open_project(project_dir)?;
    let samples = project.relational.count_samples()?;
    let documents = project.documents.count()?;
    let limits = &project.config.query;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "project": project.config.project.name,
                "relational": {
                    "path": project.relational.db_path().display().to_string(),
                    "samples": samples,
                },
                "documents": {
                    "path": project.documents.path().display().to_string(),
                    "count": documents,
                },
                "query": limits,
            }))?
        );
    } else {
        CliFormatter::header(&format!("GenomeDB project: {}", project.config.project.name));
        CliFormatter::kv("Relational store", &project.relational.db_path().display().to_string());
        CliFormatter::kv("Samples", &samples.to_string());
        CliFormatter::kv("Document store", &project.documents.path().display().to_string());
        CliFormatter::kv("Variant documents", &documents.to_string());
        CliFormatter::header("Query limits");
        CliFormatter::item(&format!("default limit {}, max limit {}", limits.default_limit, limits.max_limit));
        CliFormatter::item(&format!("result cap {}", limits.result_cap));
        CliFormatter::item(&format!("store timeout {} ms", limits.timeout_ms));
    }
    Ok(())
}

fn cmd_stats(project_dir: &Path, json: bool) -> anyhow::Result<()> {
    let project = open_project(project_dir)?;
    let stats = project.documents.variant_stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    CliFormatter::header("Variant statistics");
    CliFormatter::kv("Samples", &stats.total_samples.to_string());
    CliFormatter::kv("Variants", &stats.total_variants.to_string());
    CliFormatter::kv("Copy number variants", &stats.total_cnvs.to_string());
    CliFormatter::kv("Structural variants", &stats.total_svs.to_string());
    CliFormatter::header("By clinical significance");
    for (significance, count) in &stats.significance_counts {
        CliFormatter::item(&format!("{}: {}", significance, count));
    }
    CliFormatter::header("By variant type");
    for (kind, count) in &stats.type_counts {
        CliFormatter::item(&format!("{}: {}", kind, count));
    }
    Ok(())
}

fn cmd_patient(project_dir: &Path, id: i64, json: bool) -> anyhow::Result<()> {
    let project = open_project(project_dir)?;
    let summary = project
        .relational
        .patient_summary(PatientId(id))?
        .ok_or_else(|| anyhow::anyhow!("patient {} not found", id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let patient = &summary.patient;
    CliFormatter::header(&format!("Patient {}: {} {}", id, patient.first_name, patient.last_name));
    CliFormatter::kv("Born", &patient.date_of_birth.to_string());
    CliFormatter::kv("Sex", patient.sex.as_str());
    CliFormatter::kv("Samples", &summary.total_samples.to_string());
    CliFormatter::kv("Tests", &summary.total_tests.to_string());

    if !summary.samples.is_empty() {
        CliFormatter::blank();
        CliFormatter::table_header(&[("Sample", 8), ("Type", 8), ("Status", 10), ("Collected", 10), ("Tests", 30)]);
        for entry in &summary.samples {
            let sample_id = entry.sample.sample_id.to_string();
            let collected = entry
                .sample
                .collection_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string());
            let tests = entry
                .tests
                .iter()
                .map(|t| format!("{} ({})", t.test_type, t.result_status))
                .collect::<Vec<_>>()
                .join(", ");
            CliFormatter::table_row(&[
                (sample_id.as_str(), 8),
                (entry.sample.sample_type.as_str(), 8),
                (entry.sample.status.as_str(), 10),
                (collected.as_str(), 10),
                (tests.as_str(), 30),
            ]);
        }
    }
    Ok(())
}
