//! GenomeDB CLI Module
//! Command-line interface for querying a clinical genomics project

pub mod formatter;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::engine::hybrid::{CombinedPredicates, Pagination};

#[derive(Parser, Debug)]
#[command(name = "genomedb")]
#[command(version)]
#[command(about = "Combined queries over clinical records and variant documents", long_about = None)]
pub struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Output format (json for scripting)
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a project: config file plus empty stores
    Init {
        /// Project name
        #[arg(short, long)]
        name: String,
    },

    /// Run a combined query
    Query(QueryArgs),

    /// Start local API server
    Serve {
        /// Port to listen on (defaults to the configured port)
        #[arg(long)]
        port: Option<u16>,

        /// Host to bind to (defaults to the configured host)
        #[arg(long)]
        host: Option<String>,
    },

    /// Show project status
    Status,

    /// Variant, CNV and SV counts across the document store
    Stats,

    /// Show a patient with their samples and tests
    Patient {
        /// Patient ID
        id: i64,
    },
}

#[derive(Args, Debug, Default, Clone)]
pub struct QueryArgs {
    /// Gene symbol (exact, case-sensitive)
    #[arg(long)]
    pub gene: Option<String>,

    /// Clinical significance, e.g. "Pathogenic"
    #[arg(long)]
    pub significance: Option<String>,

    #[arg(long)]
    pub variant_type: Option<String>,

    #[arg(long)]
    pub min_quality: Option<f64>,

    #[arg(long)]
    pub min_cadd: Option<f64>,

    #[arg(long)]
    pub chromosome: Option<String>,

    #[arg(long)]
    pub position_min: Option<i64>,

    #[arg(long)]
    pub position_max: Option<i64>,

    /// Reference genome build, e.g. GRCh38
    #[arg(long)]
    pub reference_genome: Option<String>,

    #[arg(long)]
    pub sex: Option<String>,

    #[arg(long, allow_negative_numbers = true)]
    pub age_min: Option<i64>,

    #[arg(long, allow_negative_numbers = true)]
    pub age_max: Option<i64>,

    #[arg(long)]
    pub test_type: Option<String>,

    #[arg(long)]
    pub test_result_status: Option<String>,

    /// Gene panel code assigned to a clinical test
    #[arg(long)]
    pub panel_code: Option<String>,

    #[arg(long)]
    pub sample_type: Option<String>,

    #[arg(long)]
    pub sample_status: Option<String>,

    #[arg(long, allow_negative_numbers = true)]
    pub offset: Option<i64>,

    #[arg(long, allow_negative_numbers = true)]
    pub limit: Option<i64>,

    /// Compute ages as of this date (YYYY-MM-DD) instead of today
    #[arg(long)]
    pub as_of: Option<NaiveDate>,
}

impl QueryArgs {
    pub fn into_parts(self) -> (CombinedPredicates, Pagination) {
        let predicates = CombinedPredicates {
            gene: self.gene,
            clinical_significance: self.significance,
            variant_type: self.variant_type,
            min_quality: self.min_quality,
            min_cadd: self.min_cadd,
            chromosome: self.chromosome,
            position_min: self.position_min,
            position_max: self.position_max,
            reference_genome: self.reference_genome,
            sex: self.sex,
            age_min: self.age_min,
            age_max: self.age_max,
            test_type: self.test_type,
            test_result_status: self.test_result_status,
            panel_code: self.panel_code,
            sample_type: self.sample_type,
            sample_status: self.sample_status,
        };
        let pagination = Pagination {
            offset: self.offset,
            limit: self.limit,
        };
        (predicates, pagination)
    }
}

impl Cli {
    pub fn get_project_dir(&self) -> PathBuf {
        self.project
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}
