//! Artifact store and rendering tests
//!
//! Run with: cargo test -p perfscope-report --test artifact_tests

use perfscope_core::{Palette, RunTable, SampleFrame};
use perfscope_report::artifacts::MERGED_FIGURE;
use perfscope_report::combine::figures_to_single_row;
use perfscope_report::load_signal::{plot_load_signal_static, LoadSignal};
use perfscope_report::render::render_svg;
use perfscope_report::violin::{violin_plot_by_run, ViolinOptions};
use perfscope_report::{Artifact, ArtifactStore, ArtifactTable, Figure};
use tempfile::TempDir;

fn samples() -> SampleFrame {
    let mut frame = SampleFrame::new();
    frame.extend_run("WVA", [0.010, 0.012, 0.015, 0.020, 0.011]);
    frame.extend_run("HPA", [0.020, 0.025, 0.030, 0.022]);
    frame
}

fn violin() -> (SampleFrame, Figure) {
    let options = ViolinOptions {
        title: "ITL".into(),
        yscale: 1000.0,
        ytitle: "ms".into(),
        ..Default::default()
    };
    violin_plot_by_run(&samples(), &options, &Palette::default())
}

fn file_names(dir: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_save_without_merged_figure() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path(), 800, 400);
    let (frame, figure) = violin();

    let mut table = RunTable::new(["P50"]);
    table.push_row("WVA", "ITL", [("P50", Some(0.012))]).unwrap();

    store
        .save(
            "itl",
            &[
                Artifact::new("violin", Some(ArtifactTable::Samples(frame.clone())), figure.clone()),
                Artifact::new("table", Some(ArtifactTable::Runs(table.clone())), figure),
            ],
        )
        .await
        .unwrap();

    assert_eq!(
        file_names(&dir),
        vec![
            "itl-01-violin.figure.json",
            "itl-01-violin.svg",
            "itl-01-violin.table.json",
            "itl-02-table.figure.json",
            "itl-02-table.svg",
            "itl-02-table.table.json",
        ]
    );

    let loaded = store.load().await.unwrap();
    assert_eq!(loaded.len(), 2);
    let (violin_table, _) = &loaded["itl-01-violin"];
    assert_eq!(violin_table, &Some(ArtifactTable::Samples(frame)));
    let (runs_table, _) = &loaded["itl-02-table"];
    assert_eq!(runs_table, &Some(ArtifactTable::Runs(table)));
}

#[tokio::test]
async fn test_merged_figure_hides_the_rest() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path(), 800, 400);
    let (_, a) = violin();
    let b = plot_load_signal_static(&LoadSignal::default(), &Palette::default());
    let merged = figures_to_single_row(
        vec![("violin".to_string(), a.clone()), ("load".to_string(), b.clone())],
        false,
        1,
    )
    .unwrap();

    let written = store
        .save(
            "mixed",
            &[
                Artifact::new("violin", None, a),
                Artifact::new("load", None, b),
                Artifact::new(MERGED_FIGURE, None, merged.clone()),
            ],
        )
        .await
        .unwrap();
    assert_eq!(written.len(), 3);

    let names = file_names(&dir);
    assert!(names.contains(&"mixed-01-violin.hidden.figure.json".to_string()));
    assert!(names.contains(&"mixed-02-load.hidden.svg".to_string()));
    assert!(names.contains(&"mixed-03-merged_figure.figure.json".to_string()));

    let loaded = store.load().await.unwrap();
    let keys: Vec<&String> = loaded.keys().collect();
    assert_eq!(keys, vec!["mixed-03-merged_figure"]);
    let (table, figure) = &loaded["mixed-03-merged_figure"];
    assert!(table.is_none());
    assert_eq!(figure, &merged);
}

#[test]
fn test_render_violin_svg() {
    let (_, figure) = violin();
    let svg = render_svg(&figure, 640, 480).unwrap();
    assert!(svg.contains("<svg"));
    assert!(svg.contains("ITL"));
    assert!(svg.contains("WVA"));
}

#[test]
fn test_render_load_signal_svg() {
    let figure = plot_load_signal_static(&LoadSignal::default(), &Palette::default());
    let svg = render_svg(&figure, 640, 480).unwrap();
    assert!(svg.contains("Load Signal"));
    assert!(svg.contains("RPS"));
    assert!(svg.contains("<polyline"));
}

#[test]
fn test_render_empty_figure() {
    let figure = Figure {
        title: String::new(),
        panels: Vec::new(),
        shared_y: false,
    };
    let svg = render_svg(&figure, 100, 100).unwrap();
    assert!(svg.contains("<svg"));
}

#[test]
fn test_render_candles_with_replica_axis() {
    use perfscope_core::{align_series, TimeSeriesPoint, Timestamp};
    use perfscope_query::collect::{RunComparison, SCALE_IN, SCALE_OUT};
    use perfscope_query::study::CandleOptions;
    use perfscope_report::candlestick::candlesticks_over_time_with_scaling_subplots;

    let points = |values: &[f64]| -> Vec<TimeSeriesPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                TimeSeriesPoint::new(Timestamp::from_secs(36_000 + 60 * i as i64).unwrap(), Some(*v))
            })
            .collect()
    };
    let quantiles = align_series(vec![
        ("P10", points(&[5.0, 6.0, 5.5])),
        ("P25", points(&[8.0, 9.0, 8.5])),
        ("P50", points(&[10.0, 15.0, 12.0])),
        ("P75", points(&[12.0, 18.0, 16.0])),
        ("P90", points(&[20.0, 25.0, 22.0])),
    ]);
    let scaling = align_series(vec![(SCALE_OUT, points(&[2.0])), (SCALE_IN, points(&[0.0, 0.0, 1.0]))]);
    let comparisons = vec![
        RunComparison {
            label: "WVA".into(),
            quantiles: quantiles.clone(),
            scaling,
            failures: Vec::new(),
        },
        RunComparison {
            label: "HPA".into(),
            quantiles,
            scaling: Default::default(),
            failures: Vec::new(),
        },
    ];

    let figure = candlesticks_over_time_with_scaling_subplots(
        &comparisons,
        &CandleOptions::default(),
        &Palette::default(),
    )
    .unwrap();
    let svg = render_svg(&figure, 1200, 500).unwrap();
    assert!(svg.contains("Replicas"));
    assert!(svg.contains("Scale Out"));
    assert!(svg.contains("HPA"));
}
