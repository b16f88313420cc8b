use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use perfscope_core::{MetricColormaps, Palette, RunTable, SampleStrategy, TableFormat};
use perfscope_query::collect::{
    compare_runs_quantiles_for_metric, custom_query_range_by_run, gauge_p_table_by_run,
    histogram_p_table_by_run,
};
use perfscope_query::promql::Selector;
use perfscope_query::{PerfscopeConfig, PrometheusClient, Study};
use perfscope_report::artifacts::MERGED_FIGURE;
use perfscope_report::candlestick::{
    candlesticks_over_time_with_scaling, candlesticks_over_time_with_scaling_subplots,
};
use perfscope_report::html::{style_table, to_html};
use perfscope_report::load_signal::{plot_load_signal_static, LoadSignal};
use perfscope_report::violin::{violin_plot_by_run, ViolinOptions};
use perfscope_report::{Artifact, ArtifactStore, ArtifactTable, StylePolicy};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Benchmark run comparison CLI
#[derive(Parser)]
#[command(name = "perfscope")]
#[command(about = "Compare benchmark runs from Prometheus metrics")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output directory, overriding PERFSCOPE_OUTPUT_DIR
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the Prometheus backend is reachable
    Check,

    /// Per-run percentile tables with changes against the baseline
    Tables {
        /// Study file
        study: PathBuf,

        /// Cell coloring: diverging, per-metric or per-run
        #[arg(long, default_value = "diverging")]
        style: StylePolicy,
    },

    /// Latency candlesticks over time with scaling events
    Candles {
        /// Study file
        study: PathBuf,
    },

    /// Violin plots of the study's distributions
    Violin {
        /// Study file
        study: PathBuf,
    },

    /// Illustrate a stepped load profile
    LoadSignal {
        /// Requests per second per instance
        #[arg(long, default_value = "1.5")]
        rps_per_instance: f64,

        /// Instance count of each step
        #[arg(long, value_delimiter = ',', default_value = "0,1,2,3,4,5,6,7,8")]
        instances: Vec<u32>,

        /// Step length in minutes
        #[arg(long, default_value = "5")]
        time_step: f64,

        /// Show the profile ramping down
        #[arg(long)]
        scale_down: bool,
    },

    /// List saved figures
    Show {
        /// Artifact directory; the output directory when unset
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = PerfscopeConfig::load()?;
    if let Some(dir) = &cli.output_dir {
        config.output.directory = dir.clone();
    }
    config.validate()?;

    let store = ArtifactStore::new(
        config.output.directory.clone(),
        config.output.width,
        config.output.height,
    );
    let palette = Palette::default();

    match cli.command {
        Commands::Check => {
            let client = PrometheusClient::new(config.prometheus.clone())?;
            client
                .health_check()
                .await
                .with_context(|| format!("Prometheus at {} is not healthy", client.base_url()))?;
            println!("Prometheus at {} is healthy", client.base_url());
            Ok(())
        }

        Commands::Tables { study, style } => {
            let study = Study::load(&study)?;
            let client = PrometheusClient::new(config.prometheus.clone())?;
            run_tables(&client, &study, style, &palette, store.directory()).await
        }

        Commands::Candles { study } => {
            let study = Study::load(&study)?;
            let client = PrometheusClient::new(config.prometheus.clone())?;
            run_candles(&client, &study, &palette, &store).await
        }

        Commands::Violin { study } => {
            let study = Study::load(&study)?;
            let client = PrometheusClient::new(config.prometheus.clone())?;
            run_violins(&client, &study, &config, &palette, &store).await
        }

        Commands::LoadSignal {
            rps_per_instance,
            instances,
            time_step,
            scale_down,
        } => {
            let signal = LoadSignal {
                rps_per_instance,
                instances_over_time: instances,
                time_step,
                scale_up: !scale_down,
            };
            let figure = plot_load_signal_static(&signal, &palette);
            let paths = store
                .save("load_signal", &[Artifact::new("load_signal", None, figure)])
                .await?;
            report_saved(&paths);
            Ok(())
        }

        Commands::Show { dir } => {
            let store = match dir {
                Some(dir) => ArtifactStore::new(dir, config.output.width, config.output.height),
                None => store,
            };
            show(&store).await
        }
    }
}

fn report_failures(what: &str, table: &RunTable) {
    for failure in table.failures() {
        warn!(table = what, run = %failure.run, item = %failure.item, "{}", failure.reason);
    }
}

fn report_saved(paths: &[PathBuf]) {
    for path in paths {
        println!("📊 {}", path.display());
    }
}

async fn run_tables(
    client: &PrometheusClient,
    study: &Study,
    style: StylePolicy,
    palette: &Palette,
    out_dir: &Path,
) -> Result<()> {
    info!(runs = study.runs.len(), "Collecting comparison tables");
    let selector = Selector::model(&study.model_name, &study.namespace);
    let histograms =
        histogram_p_table_by_run(client, &study.runs, &study.histogram_metrics, &selector).await?;
    let gauges = gauge_p_table_by_run(client, &study.runs, &study.gauge_metrics).await?;

    let baseline = study.baseline();
    let order = study.run_order();
    let format = TableFormat {
        baseline: baseline.to_string(),
        metric_scale: study.metric_scale.clone(),
        metric_unit: study.metric_unit.clone(),
    };

    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    for (name, table) in [("histograms", histograms), ("gauges", gauges)] {
        report_failures(name, &table);
        if table.is_empty() {
            info!(table = name, "No rows, skipping");
            continue;
        }

        let compared = table.with_relative_change(baseline).sorted(&order);
        let colormaps = MetricColormaps::in_order(compared.metrics());
        let styled = style_table(&compared, style, &format, palette, &colormaps);

        let json_path = out_dir.join(format!("{}.table.json", name));
        let json = serde_json::to_vec_pretty(&compared)?;
        tokio::fs::write(&json_path, json)
            .await
            .with_context(|| format!("Failed to write {}", json_path.display()))?;

        let html_path = out_dir.join(format!("{}.html", name));
        tokio::fs::write(&html_path, to_html(&styled, name))
            .await
            .with_context(|| format!("Failed to write {}", html_path.display()))?;

        println!("📄 {} ({} rows)", html_path.display(), compared.len());
    }
    Ok(())
}

async fn run_candles(
    client: &PrometheusClient,
    study: &Study,
    palette: &Palette,
    store: &ArtifactStore,
) -> Result<()> {
    let model = Selector::model(&study.model_name, &study.namespace);
    let variant = Selector::variant(&study.variant_name, &study.accelerator_type);
    let comparisons =
        compare_runs_quantiles_for_metric(client, &study.runs, &model, &variant, &study.candles)
            .await;
    for run in &comparisons {
        for failure in &run.failures {
            warn!(run = %failure.run, item = %failure.item, "{}", failure.reason);
        }
    }

    let figures = candlesticks_over_time_with_scaling(&comparisons, &study.candles, palette)?;
    let merged =
        candlesticks_over_time_with_scaling_subplots(&comparisons, &study.candles, palette)?;

    let mut entries: Vec<Artifact> = comparisons
        .iter()
        .zip(figures)
        .map(|(run, (label, figure))| {
            Artifact::new(
                label,
                Some(ArtifactTable::Aligned(run.quantiles.clone())),
                figure,
            )
        })
        .collect();
    entries.push(Artifact::new(MERGED_FIGURE, None, merged));

    let paths = store.save("candles", &entries).await?;
    report_saved(&paths);
    Ok(())
}

async fn run_violins(
    client: &PrometheusClient,
    study: &Study,
    config: &PerfscopeConfig,
    palette: &Palette,
    store: &ArtifactStore,
) -> Result<()> {
    if study.distributions.is_empty() {
        warn!("Study has no distributions to plot");
        return Ok(());
    }

    let mut rng = match config.sampling.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut entries = Vec::with_capacity(study.distributions.len());
    for distribution in &study.distributions {
        let strategy = if distribution.histogram {
            config.sampling.histogram_strategy()
        } else {
            SampleStrategy::Flat
        };
        info!(name = %distribution.name, ?strategy, "Collecting samples");

        let collected = custom_query_range_by_run(
            client,
            &study.runs,
            &distribution.query,
            &distribution.step,
            &strategy,
            &mut rng,
        )
        .await;
        for failure in &collected.failures {
            warn!(run = %failure.run, item = %failure.item, "{}", failure.reason);
        }

        let options = ViolinOptions {
            title: distribution.name.clone(),
            yscale: distribution.scale,
            ytitle: distribution.y_title.clone().unwrap_or_default(),
            ..Default::default()
        };
        let (samples, figure) = violin_plot_by_run(&collected.frame, &options, palette);
        entries.push(Artifact::new(
            distribution.name.clone(),
            Some(ArtifactTable::Samples(samples)),
            figure,
        ));
    }

    let paths = store.save("distributions", &entries).await?;
    report_saved(&paths);
    Ok(())
}

async fn show(store: &ArtifactStore) -> Result<()> {
    let loaded = store.load().await?;
    if loaded.is_empty() {
        println!("No figures in {}", store.directory().display());
        return Ok(());
    }

    println!("Figures in {}:", store.directory().display());
    for (name, (table, figure)) in &loaded {
        let table = match table {
            Some(ArtifactTable::Runs(t)) => format!("{} table rows", t.len()),
            Some(ArtifactTable::Aligned(t)) => format!("{} aligned rows", t.row_count()),
            Some(ArtifactTable::Samples(s)) => format!("{} samples", s.len()),
            None => "no table".to_string(),
        };
        println!(
            "  {:<40} {} panel(s), {}",
            name,
            figure.panels.len(),
            table
        );
    }
    Ok(())
}
