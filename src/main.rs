use std::path::{Path, PathBuf};
use std::process::ExitCode;

use pdf_regions::config::job::{Job, JobFile};
use pdf_regions::config::load_settings_for_job;
use pdf_regions::config::merged::MergedConfig;
use pdf_regions::config::settings::Settings;
use pdf_regions::error::RegionError;
use pdf_regions::pdf::reader::PdfReader;
use pdf_regions::pipeline::job_runner::{ExternalLayoutConfig, JobConfig};
use pdf_regions::pipeline::orchestrator::run_all_jobs;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
Usage: pdf_regions <jobs.yaml>...
  Detect figure and table regions in PDF files listed in job files.
  settings.yaml next to a job file overrides the defaults.
  Log level follows RUST_LOG (default: info).";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    }
    if args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("{USAGE}");
        return ExitCode::SUCCESS;
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        eprintln!("pdf_regions {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    // ジョブファイルの読込に失敗したら何も実行しない
    let mut job_configs: Vec<JobConfig> = Vec::new();
    for arg in &args {
        match load_job_file(Path::new(arg)) {
            Ok(configs) => job_configs.extend(configs),
            Err(e) => {
                eprintln!("ERROR: {arg}: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    let results = run_all_jobs(&job_configs);

    let mut failed = 0usize;
    for (config, result) in job_configs.iter().zip(&results) {
        match result {
            Ok(r) => eprintln!(
                "OK: {} -> {} ({} pages, {} regions)",
                r.input_path.display(),
                r.output_path.display(),
                r.pages_processed,
                r.regions_found
            ),
            Err(e) => {
                eprintln!(
                    "ERROR: {} -> {}: {e}",
                    config.input_path.display(),
                    config.output_path.display()
                );
                failed += 1;
            }
        }
    }

    if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// ジョブファイルを読み、各ジョブを settings とマージした実行設定に変換する。
///
/// 相対パスはジョブファイルのディレクトリ基準で解決する。
fn load_job_file(job_file_path: &Path) -> Result<Vec<JobConfig>, RegionError> {
    let settings = load_settings_for_job(job_file_path)?;
    let yaml = std::fs::read_to_string(job_file_path)?;
    let job_file: JobFile = serde_yml::from_str(&yaml)?;
    let job_dir = job_file_path.parent().unwrap_or_else(|| Path::new("."));

    job_file
        .jobs
        .iter()
        .map(|job| build_job_config(&settings, job, job_dir))
        .collect()
}

fn build_job_config(
    settings: &Settings,
    job: &Job,
    job_dir: &Path,
) -> Result<JobConfig, RegionError> {
    let merged = MergedConfig::new(settings, job);
    let input_path = resolve_path(job_dir, &job.input);

    // ページ指定は文書のページ数に対して先に検証する
    let page_count = PdfReader::open(&input_path)?.page_count();
    let pages = job.resolve_pages(page_count)?;

    let external_layout = merged
        .external_layout
        .as_deref()
        .map(|path| ExternalLayoutConfig {
            path: resolve_path(job_dir, path),
            source_dpi: merged.external_source_dpi,
            calibration: merged.calibration,
        });

    Ok(JobConfig {
        input_path,
        output_path: resolve_path(job_dir, &job.output),
        pages,
        dpi: merged.dpi,
        raster: merged.raster,
        detector: merged.detector.clone(),
        cache_dir: Some(job_dir.join(&merged.cache_dir)),
        parallel_workers: merged.parallel_workers,
        debug_candidates: merged.debug_candidates,
        external_layout,
    })
}

/// 絶対パスはそのまま、相対パスは `base_dir` 基準で解決する。
fn resolve_path(base_dir: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}
