// Phase 8: ジョブ実行・対話セッションの統合テスト
//
// ラスタ経路を切ってあるので、pdfium の有無に関わらず検出結果は同じになる。
// キャッシュは描画できたページだけに効くため、キャッシュのテストは
// pdfium の有無で分けてある。

use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use pdf_regions::config::detector::DetectorConfig;
use pdf_regions::detect::geometry::{Rect, RegionType};
use pdf_regions::pipeline::job_runner::{ExternalLayoutConfig, JobConfig, run_job};
use pdf_regions::pipeline::orchestrator::run_all_jobs;
use pdf_regions::pipeline::session::{DetectionSession, SessionConfig};

// ============================================================
// Helper: 1ページ目に黒い矩形、2ページ目は空のPDF
// ============================================================

fn create_test_pdf(dir: &Path) -> PathBuf {
    let path = dir.join("input.pdf");
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let figure = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new("rg", vec![0.into(), 0.into(), 0.into()]),
            // ピクセル空間 (100, 200) - (300, 400)
            Operation::new("re", vec![100.into(), 392.into(), 200.into(), 200.into()]),
            Operation::new("f", vec![]),
            Operation::new("Q", vec![]),
        ],
    };
    let mut kids = Vec::new();
    for ops in [figure, Content { operations: vec![] }] {
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            ops.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(Object::from(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => 2,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(&path).expect("save PDF");
    path
}

fn job(input: &Path, output: &Path) -> JobConfig {
    JobConfig {
        input_path: input.to_path_buf(),
        output_path: output.to_path_buf(),
        pages: Vec::new(),
        dpi: 72,
        raster: false,
        detector: DetectorConfig::default(),
        cache_dir: None,
        parallel_workers: 0,
        debug_candidates: false,
        external_layout: None,
    }
}

/// テキスト抽出まで動く環境か。
fn render_available() -> bool {
    cfg!(feature = "render") && std::env::var("PDFIUM_DYNAMIC_LIB_PATH").is_ok()
}

fn read_json(path: &Path) -> serde_json::Value {
    let content = std::fs::read_to_string(path).expect("read output");
    serde_json::from_str(&content).expect("valid JSON")
}

// ============================================================
// 1. run_job
// ============================================================

#[test]
fn test_run_job_detects_vector_figure() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let input = create_test_pdf(dir.path());
    let output = dir.path().join("regions.json");

    let result = run_job(&job(&input, &output)).expect("job should succeed");
    assert_eq!(result.pages_processed, 2);
    assert_eq!(result.regions_found, 1);

    let value = read_json(&output);
    let region = &value["1"][0];
    assert_eq!(region["id"], "region_1_1");
    assert_eq!(region["type"], "image");
    assert_eq!(region["label"], "Figure 1");
    assert_eq!(region["position"]["x"], 100.0);
    assert_eq!(region["position"]["y"], 200.0);
    assert_eq!(region["position"]["width"], 200.0);
    assert_eq!(region["position"]["height"], 200.0);
    assert_eq!(value["2"], serde_json::json!([]));
}

#[test]
fn test_run_job_respects_page_selection_and_dpi() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let input = create_test_pdf(dir.path());
    let output = dir.path().join("regions.json");

    let mut config = job(&input, &output);
    config.pages = vec![1];
    config.dpi = 144;
    let result = run_job(&config).expect("job should succeed");
    assert_eq!(result.pages_processed, 1);

    let value = read_json(&output);
    assert!(value.get("2").is_none());
    assert_eq!(value["1"][0]["position"]["x"], 200.0);
    assert_eq!(value["1"][0]["position"]["width"], 400.0);
}

#[test]
fn test_run_job_rejects_bad_input() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let input = create_test_pdf(dir.path());
    let output = dir.path().join("regions.json");

    let mut out_of_range = job(&input, &output);
    out_of_range.pages = vec![3];
    assert!(run_job(&out_of_range).is_err());

    let mut zero_dpi = job(&input, &output);
    zero_dpi.dpi = 0;
    assert!(run_job(&zero_dpi).is_err());

    let missing = job(&dir.path().join("missing.pdf"), &output);
    assert!(run_job(&missing).is_err());
}

#[test]
fn test_run_job_cache_reuses_results() {
    if !render_available() {
        eprintln!("Skipping: PDFIUM_DYNAMIC_LIB_PATH not set");
        return;
    }
    let dir = tempfile::tempdir().expect("create temp dir");
    let input = create_test_pdf(dir.path());
    let cache_dir = dir.path().join("cache");

    let mut first = job(&input, &dir.path().join("first.json"));
    first.cache_dir = Some(cache_dir.clone());
    run_job(&first).expect("first run");
    let entries = std::fs::read_dir(&cache_dir).expect("cache dir").count();
    assert_eq!(entries, 2, "one entry per page");

    let mut second = first.clone();
    second.output_path = dir.path().join("second.json");
    run_job(&second).expect("second run");
    assert_eq!(read_json(&first.output_path), read_json(&second.output_path));
}

#[test]
fn test_run_job_without_render_data_is_not_cached() {
    if render_available() {
        eprintln!("Skipping: pdfium is available, pages are rendered");
        return;
    }
    let dir = tempfile::tempdir().expect("create temp dir");
    let input = create_test_pdf(dir.path());
    let cache_dir = dir.path().join("cache");

    let mut first = job(&input, &dir.path().join("first.json"));
    first.cache_dir = Some(cache_dir.clone());
    run_job(&first).expect("first run");
    let entries = std::fs::read_dir(&cache_dir)
        .map(|dir| dir.count())
        .unwrap_or(0);
    assert_eq!(entries, 0, "regions without text runs must not be cached");

    // 2回目も検出し直し、同じ結果になる
    let mut second = first.clone();
    second.output_path = dir.path().join("second.json");
    run_job(&second).expect("second run");
    assert_eq!(read_json(&first.output_path), read_json(&second.output_path));
}

#[test]
fn test_run_job_writes_debug_candidates() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let input = create_test_pdf(dir.path());
    let output = dir.path().join("regions.json");

    let mut config = job(&input, &output);
    config.debug_candidates = true;
    run_job(&config).expect("job should succeed");

    let candidates = read_json(&config.candidates_path());
    assert_eq!(candidates["1"][0]["source"], "vector-path");
    assert_eq!(candidates["2"], serde_json::json!([]));
}

#[test]
fn test_run_job_external_layout_bypasses_detection() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let input = create_test_pdf(dir.path());
    let output = dir.path().join("regions.json");
    let layout_path = dir.path().join("layout.json");
    std::fs::write(
        &layout_path,
        r#"{"blocksByPage": {"2": [{"type": "table", "bbox": [10, 20, 110, 70]}]}}"#,
    )
    .expect("write layout");

    let mut config = job(&input, &output);
    config.external_layout = Some(ExternalLayoutConfig {
        path: layout_path,
        source_dpi: 72.0,
        calibration: 1.0,
    });
    let result = run_job(&config).expect("job should succeed");
    assert_eq!(result.regions_found, 1);

    let value = read_json(&output);
    assert_eq!(value["1"], serde_json::json!([]), "page 1 figure is not detected");
    assert_eq!(value["2"][0]["type"], "table");
    assert_eq!(value["2"][0]["position"]["width"], 100.0);
}

#[test]
fn test_run_all_jobs_isolates_failures() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let input = create_test_pdf(dir.path());

    let jobs = vec![
        job(&dir.path().join("missing.pdf"), &dir.path().join("a.json")),
        job(&input, &dir.path().join("b.json")),
    ];
    let results = run_all_jobs(&jobs);
    assert!(results[0].is_err());
    assert!(results[1].is_ok());
    assert!(dir.path().join("b.json").exists());
}

// ============================================================
// 2. DetectionSession
// ============================================================

fn session_config() -> SessionConfig {
    SessionConfig {
        dpi: 72,
        raster: false,
        detector: DetectorConfig::default(),
    }
}

#[test]
fn test_session_caches_per_page() {
    if !render_available() {
        eprintln!("Skipping: PDFIUM_DYNAMIC_LIB_PATH not set");
        return;
    }
    let dir = tempfile::tempdir().expect("create temp dir");
    let input = create_test_pdf(dir.path());
    let mut session = DetectionSession::open(&input, session_config()).expect("open");
    assert_eq!(session.page_count(), 2);

    let first = session.detect_regions(1).expect("detect");
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].region_type, RegionType::Image);
    assert_eq!(first[0].position, Rect::new(100.0, 200.0, 200.0, 200.0));
    assert_eq!(session.cached_pages(), 1);

    let again = session.detect_regions(1).expect("detect again");
    assert_eq!(first, again);

    assert!(session.detect_regions(2).expect("detect page 2").is_empty());
    assert_eq!(session.cached_pages(), 2);

    session.invalidate(1);
    assert_eq!(session.cached_pages(), 1);
    assert_eq!(session.detect_regions(1).expect("re-detect"), first);
}

#[test]
fn test_session_without_render_data_is_not_cached() {
    if render_available() {
        eprintln!("Skipping: pdfium is available, pages are rendered");
        return;
    }
    let dir = tempfile::tempdir().expect("create temp dir");
    let input = create_test_pdf(dir.path());
    let mut session = DetectionSession::open(&input, session_config()).expect("open");

    let first = session.detect_regions(1).expect("detect");
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].position, Rect::new(100.0, 200.0, 200.0, 200.0));
    assert_eq!(session.cached_pages(), 0);

    assert_eq!(session.detect_regions(1).expect("detect again"), first);
    assert_eq!(session.cached_pages(), 0);
}

#[test]
fn test_session_debug_candidates() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let input = create_test_pdf(dir.path());
    let session = DetectionSession::open(&input, session_config()).expect("open");

    let candidates = session.debug_candidates(1).expect("candidates");
    assert_eq!(candidates.len(), 1);
    assert_eq!(session.cached_pages(), 0);
}

#[test]
fn test_session_rejects_bad_input() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let input = create_test_pdf(dir.path());

    let mut zero_dpi = session_config();
    zero_dpi.dpi = 0;
    assert!(DetectionSession::open(&input, zero_dpi).is_err());

    let mut session = DetectionSession::open(&input, session_config()).expect("open");
    assert!(session.detect_regions(5).is_err());
}
