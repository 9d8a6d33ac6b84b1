//! End-to-end properties of the engine over synthetic datasets.

use proptest::prelude::*;
use u_modelrisk::config::EngineConfig;
use u_modelrisk::dataset::{Dataset, DatasetBuilder};
use u_modelrisk::engine::{AnalysisRequest, Engine, InMemorySource, Module};
use u_modelrisk::leakage::LeakageVerdict;
use u_modelrisk::profiler::ImbalanceSeverity;
use u_modelrisk::report::{Report, Severity};
use u_modelrisk::stability::DriftVerdict;

// ── Helpers ───────────────────────────────────────────────────────────

fn engine_with(datasets: Vec<Dataset>, config: EngineConfig) -> Engine<InMemorySource> {
    let mut source = InMemorySource::new();
    for ds in datasets {
        source.insert(ds);
    }
    Engine::new(source, config).unwrap()
}

fn engine(ds: Dataset) -> Engine<InMemorySource> {
    engine_with(vec![ds], EngineConfig::default())
}

/// Scored transactions with a region dimension and an amount column.
fn portfolio(n: usize) -> Dataset {
    let score: Vec<f64> = (0..n).map(|i| (i % 20) as f64 / 20.0 + 0.025).collect();
    let label: Vec<f64> = (0..n).map(|i| f64::from(i % 20 >= 15 || i % 37 == 0)).collect();
    let amount: Vec<f64> = (0..n).map(|i| 10.0 + ((i * 7) % 23) as f64 * 12.5).collect();
    let velocity: Vec<f64> = (0..n).map(|i| ((i * 3) % 11) as f64).collect();
    let region: Vec<&str> = (0..n)
        .map(|i| match i % 3 {
            0 => "north",
            1 => "south",
            _ => "west",
        })
        .collect();
    DatasetBuilder::new("portfolio")
        .numeric("model_score", score)
        .numeric("is_fraud", label)
        .numeric("amount", amount)
        .numeric("velocity", velocity)
        .categories("region", region)
        .build()
        .unwrap()
}

// ── Profiling ─────────────────────────────────────────────────────────

#[test]
fn thousand_records_twenty_positives_is_severe() {
    let ds = DatasetBuilder::new("rare")
        .numeric("is_fraud", (0..1000).map(|i| f64::from(i < 20)).collect())
        .numeric("score", (0..1000).map(|i| (i % 100) as f64 / 100.0).collect())
        .build()
        .unwrap();
    let report = engine(ds).run(&AnalysisRequest::new("rare", Module::Profile)).unwrap();
    let Report::Profile(p) = report else { panic!("expected profile report") };
    let balance = &p.dataset.class_balance;
    assert_eq!(balance.positives, 20);
    assert_eq!(balance.imbalance_ratio, Some(49.0));
    assert_eq!(balance.severity, ImbalanceSeverity::Severe);
}

#[test]
fn dataset_without_target_is_terminal() {
    let ds = DatasetBuilder::new("raw")
        .numeric("score", (0..30).map(|i| i as f64 / 30.0).collect())
        .build()
        .unwrap();
    let err = engine(ds).run(&AnalysisRequest::new("raw", Module::Calibration)).unwrap_err();
    assert!(!err.is_degrading(), "missing target must not degrade silently: {err}");
}

// ── Leakage ───────────────────────────────────────────────────────────

#[test]
fn feature_equal_to_label_is_critical_leakage() {
    let label: Vec<f64> = (0..60).map(|i| f64::from(i % 4 == 0)).collect();
    let ds = DatasetBuilder::new("leaky")
        .numeric("is_fraud", label.clone())
        .numeric("settled_flag", label)
        .numeric("velocity", (0..60).map(|i| ((i * 7) % 13) as f64).collect())
        .build()
        .unwrap();
    let report = engine(ds).run(&AnalysisRequest::new("leaky", Module::Leakage)).unwrap();
    let Report::Leakage(l) = report else { panic!("expected leakage report") };
    assert_eq!(l.verdict, LeakageVerdict::LeakageDetected);
    assert_eq!(l.flags[0].feature, "settled_flag");
    assert_eq!(l.flags[0].severity, Severity::Critical);
}

// ── Stability ─────────────────────────────────────────────────────────

#[test]
fn identical_windows_are_stable_with_flat_trend() {
    let mut score = Vec::new();
    let mut label = Vec::new();
    for _ in 0..4 {
        for i in 0..25 {
            score.push(i as f64 / 25.0);
            label.push(f64::from(i >= 20 || i == 6));
        }
    }
    let ds = DatasetBuilder::new("flat")
        .numeric("score", score)
        .numeric("is_fraud", label)
        .build()
        .unwrap();
    let report = engine(ds).run(&AnalysisRequest::new("flat", Module::Stability)).unwrap();
    let Report::Stability(s) = report else { panic!("expected stability report") };
    let rolling = s.rolling.available().expect("rolling drift available");
    assert_eq!(rolling.verdict, DriftVerdict::Stable);
    assert!(rolling.precision_slope.unwrap().abs() < 1e-9);
    assert!(rolling.recall_slope.unwrap().abs() < 1e-9);
    let population = s.population.available().expect("population stability available");
    assert!(population.score.as_ref().unwrap().psi.abs() < 1e-9);
}

// ── Segments ──────────────────────────────────────────────────────────

#[test]
fn small_segment_with_zero_precision_is_local_disaster() {
    let mut score = Vec::new();
    let mut label = Vec::new();
    let mut region = Vec::new();
    // 90 caught frauds and 30 quiet legit records
    for i in 0..120 {
        score.push(if i < 90 { 0.9 } else { 0.1 });
        label.push(f64::from(i < 90));
        region.push("domestic");
    }
    // 10 false alarms
    for _ in 0..10 {
        score.push(0.9);
        label.push(0.0);
        region.push("offshore");
    }
    let ds = DatasetBuilder::new("segments")
        .numeric("score", score)
        .numeric("is_fraud", label)
        .categories("region", region)
        .build()
        .unwrap();
    let report = engine(ds).run(&AnalysisRequest::new("segments", Module::Taxonomy)).unwrap();
    let Report::Taxonomy(t) = report else { panic!("expected taxonomy report") };
    let decomposition = t.segments.available().expect("segments available");
    assert_eq!(decomposition.disasters.len(), 1);
    let disaster = &decomposition.disasters[0];
    assert_eq!(disaster.value, "offshore");
    assert_eq!(disaster.count, 10);
    assert_eq!(disaster.precision, Some(0.0));
    assert_eq!(disaster.global_precision, Some(0.9));
}

#[test]
fn segment_counts_sum_to_population() {
    let ds = portfolio(300);
    let report = engine(ds).run(&AnalysisRequest::new("portfolio", Module::Taxonomy)).unwrap();
    let Report::Taxonomy(t) = report else { panic!("expected taxonomy report") };
    for table in &t.segments.available().expect("segments available").tables {
        let total: usize = table.segments.iter().map(|s| s.count).sum();
        assert_eq!(total, table.population, "dimension {}", table.dimension);
    }
}

// ── Calibration ───────────────────────────────────────────────────────

#[test]
fn calibration_bins_cover_population() {
    let ds = portfolio(400);
    let report = engine(ds).run(&AnalysisRequest::new("portfolio", Module::Calibration)).unwrap();
    let Report::Calibration(c) = report else { panic!("expected calibration report") };
    let curve = c.curve.available().expect("curve available");
    assert_eq!(curve.bins.iter().map(|b| b.count).sum::<usize>(), curve.population);
    assert_eq!(curve.population, 400);
    assert!(curve.bins.iter().all(|b| (0.0..=1.0).contains(&b.actual_rate)));
}

#[test]
fn missing_score_degrades_sections_to_not_available() {
    let ds = DatasetBuilder::new("unscored")
        .numeric("is_fraud", (0..40).map(|i| f64::from(i % 5 == 0)).collect())
        .numeric("velocity", (0..40).map(|i| (i % 9) as f64).collect())
        .build()
        .unwrap();
    let report = engine(ds).run(&AnalysisRequest::new("unscored", Module::Calibration)).unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["module"], "calibration");
    assert_eq!(json["curve"]["status"], "not_available");
    assert!(json["curve"]["data"]["reason"].as_str().unwrap().contains("score"));
}

// ── Engine behavior ───────────────────────────────────────────────────

#[test]
fn identical_inputs_yield_identical_reports() {
    let engine = engine(portfolio(240));
    for module in Module::ALL {
        let req = AnalysisRequest::new("portfolio", module).dimensions(&["region"]);
        let a = serde_json::to_string(&engine.run(&req).unwrap()).unwrap();
        let b = serde_json::to_string(&engine.run(&req).unwrap()).unwrap();
        assert_eq!(a, b, "module {module:?} is not deterministic");
    }
}

#[test]
fn batch_matches_sequential_runs() {
    let engine = engine(portfolio(200));
    let requests: Vec<AnalysisRequest> = Module::ALL
        .iter()
        .map(|&m| AnalysisRequest::new("portfolio", m))
        .collect();
    let batch = engine.run_batch(&requests);
    for (req, result) in requests.iter().zip(batch) {
        let sequential = serde_json::to_string(&engine.run(req).unwrap()).unwrap();
        assert_eq!(serde_json::to_string(&result.unwrap()).unwrap(), sequential);
    }
}

#[test]
fn expired_deadline_returns_incomplete_report() {
    let config = EngineConfig::default().time_limit_ms(0);
    let engine = engine_with(vec![portfolio(100)], config);
    let report = engine.run(&AnalysisRequest::new("portfolio", Module::Leakage)).unwrap();
    assert!(!report.status().complete);
    assert!(!report.status().notes.is_empty());
}

#[test]
fn engine_rejects_config_no_analysis_can_run_with() {
    let mut config = EngineConfig::default();
    config.stability.buckets = 0;
    assert!(Engine::new(InMemorySource::new(), config).is_err());
}

#[test]
fn target_override_replaces_heuristic() {
    let engine = engine(portfolio(100));
    let req = AnalysisRequest::new("portfolio", Module::Profile).target("velocity");
    let Report::Profile(p) = engine.run(&req).unwrap() else { panic!("expected profile report") };
    assert_eq!(p.dataset.target.column, "velocity");
}

// ── Properties ────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn confusion_matrix_covers_scored_labeled_rows(
        rows in prop::collection::vec((0.0f64..1.0, any::<bool>()), 10..120),
        threshold in 0.05f64..0.95,
    ) {
        let mut score: Vec<f64> = rows.iter().map(|r| r.0).collect();
        let mut label: Vec<f64> = rows.iter().map(|r| f64::from(r.1)).collect();
        // both classes present so a target resolves
        score.extend([0.2, 0.8]);
        label.extend([0.0, 1.0]);
        let n = score.len();
        let ds = DatasetBuilder::new("random")
            .numeric("score", score)
            .numeric("is_fraud", label)
            .build()
            .unwrap();
        let engine = engine_with(vec![ds], EngineConfig::default().decision_threshold(threshold));
        let Report::RootCause(r) = engine.run(&AnalysisRequest::new("random", Module::RootCause)).unwrap() else {
            panic!("expected root-cause report")
        };
        let matrix = r.matrix.available().expect("matrix available");
        prop_assert_eq!(matrix.total(), n);
    }
}
