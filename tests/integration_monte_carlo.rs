//! End-to-end Monte Carlo AEP runs on synthetic plants.

mod common;

use common::{SyntheticPlant, config};
use wind_aep::plant::Resolution;
use wind_aep::aep::{CancellationToken, MonteCarloEngine, ResultsAggregator};
use wind_aep::analysis::{AnalysisInputs, AnalysisReport, build_dataset, run_analysis};
use wind_aep::config::AnalysisConfig;
use wind_aep::error::{AnalysisError, IterationError};
use wind_aep::io::export::write_csv;

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

#[test]
fn constant_plant_yields_exactly_twelve_months() {
    let outcome = run_analysis(
        &config(50, 42),
        &SyntheticPlant::constant().inputs(),
        &CancellationToken::new(),
    );
    let summary = outcome.summary.expect("constant plant converges");

    assert_eq!(summary.succeeded, 50);
    assert_eq!(summary.failed, 0);
    assert!(
        (summary.aep_mwh.mean - 36_000.0).abs() < 1e-6,
        "mean AEP {} should be 36000",
        summary.aep_mwh.mean
    );
    assert!(summary.aep_mwh.std < 1e-6);
    assert_eq!(summary.availability_loss_fraction.mean, 0.0);
    assert_eq!(summary.curtailment_loss_fraction.mean, 0.0);
}

#[test]
fn fixed_calendar_month_energy_lands_near_twelve_months() {
    // 3000 MWh in a 672-hour February is more power than in a 744-hour
    // January, so the estimate carries a small calendar spread.
    let summary = run_analysis(
        &config(50, 42),
        &SyntheticPlant::fixed_monthly().inputs(),
        &CancellationToken::new(),
    )
    .summary
    .expect("converges");
    assert_eq!(summary.succeeded, 50);
    let offset = (summary.aep_mwh.mean - 36_000.0).abs() / 36_000.0;
    assert!(offset < 0.005, "mean AEP {}", summary.aep_mwh.mean);
}

#[test]
fn hourly_meter_matches_monthly_meter() {
    let plant = SyntheticPlant::default();
    let cfg = config(40, 17);
    let monthly = run_analysis(&cfg, &plant.inputs(), &CancellationToken::new())
        .summary
        .expect("monthly converges");
    let hourly_dataset = build_dataset(&cfg, &plant.hourly_inputs()).expect("dataset");
    assert_eq!(hourly_dataset.composite().len(), 24);
    let hourly = run_analysis(&cfg, &plant.hourly_inputs(), &CancellationToken::new())
        .summary
        .expect("hourly converges");
    for (m, h) in monthly.aep_series().iter().zip(hourly.aep_series()) {
        assert!((m - h).abs() < 1e-6 * m, "monthly {m} vs hourly {h}");
    }
}

#[test]
fn stray_hour_before_the_record_is_left_out() {
    // A +01:00 logger converted to UTC starts on 2013-12-31 23:00.
    let mut inputs = SyntheticPlant::constant().hourly_inputs();
    let hourly_mwh = common::STEADY_MW.to_string();
    let stray = "2013-12-31 23:00:00".to_string();
    inputs.meter.push_row(vec![stray.clone(), hourly_mwh]);
    inputs.curtail.push_row(vec![stray, "0".into(), "0".into()]);

    let cfg = config(50, 42);
    let dataset = build_dataset(&cfg, &inputs).expect("dataset");
    assert_eq!(dataset.composite().len(), 24);
    let summary = run_analysis(&cfg, &inputs, &CancellationToken::new())
        .summary
        .expect("converges");
    assert!((summary.aep_mwh.mean - 36_000.0).abs() < 1e-6);
    assert!(summary.aep_mwh.std < 1e-6);

    let mut lenient = cfg.clone();
    lenient.analysis.min_period_completeness = 0.0;
    assert_eq!(build_dataset(&lenient, &inputs).expect("dataset").composite().len(), 25);
    let biased = run_analysis(&lenient, &inputs, &CancellationToken::new())
        .summary
        .expect("converges");
    assert!(biased.aep_mwh.mean < 35_900.0, "mean {}", biased.aep_mwh.mean);
}

#[test]
fn daily_resolution_runs_end_to_end() {
    let plant = SyntheticPlant::constant();
    let mut inputs = plant.hourly_inputs();
    inputs.reanalysis.insert("era5".to_string(), plant.daily_reanalysis());
    let mut cfg = config(30, 5);
    cfg.analysis.aggregation_resolution = Resolution::Daily;

    let dataset = build_dataset(&cfg, &inputs).expect("dataset");
    assert_eq!(dataset.composite().len(), 730);
    assert!(dataset.composite().rows().iter().all(|r| r.period_hours == 24.0));
    assert_eq!(dataset.resource("era5").map(|s| s.normal().periods), Some(7305));

    let summary = run_analysis(&cfg, &inputs, &CancellationToken::new())
        .summary
        .expect("converges");
    assert_eq!(summary.succeeded, 30);
    assert!(
        (summary.aep_mwh.mean - 36_000.0).abs() < 1e-6,
        "mean AEP {}",
        summary.aep_mwh.mean
    );
    assert!(summary.iterations.iter().all(|r| r.long_term_periods == 7305));
}

#[test]
fn daily_and_monthly_resolution_agree_on_a_varying_plant() {
    let plant = SyntheticPlant::default();
    let mut daily_inputs = plant.hourly_inputs();
    daily_inputs.reanalysis.insert("era5".to_string(), plant.daily_reanalysis());
    let monthly_cfg = config(40, 21);
    let mut daily_cfg = monthly_cfg.clone();
    daily_cfg.analysis.aggregation_resolution = Resolution::Daily;

    let monthly = run_analysis(&monthly_cfg, &plant.inputs(), &CancellationToken::new())
        .summary
        .expect("monthly converges");
    let daily = run_analysis(&daily_cfg, &daily_inputs, &CancellationToken::new())
        .summary
        .expect("daily converges");
    let gap = (daily.aep_mwh.mean - monthly.aep_mwh.mean).abs() / monthly.aep_mwh.mean;
    assert!(gap < 0.03, "daily {} vs monthly {}", daily.aep_mwh.mean, monthly.aep_mwh.mean);
}

#[test]
fn six_months_of_data_fails_to_converge() {
    let plant = SyntheticPlant {
        measured_months: 6,
        ..SyntheticPlant::default()
    };
    let outcome = run_analysis(&config(30, 1), &plant.inputs(), &CancellationToken::new());

    assert!(matches!(
        outcome.summary,
        Err(AnalysisError::MonteCarloConvergence {
            failed: 30,
            attempted: 30,
            ..
        })
    ));
    let set = outcome.results.expect("loop ran");
    assert!(set.records().iter().all(|r| matches!(
        r.error(),
        Some(IterationError::InsufficientData {
            observed: 6,
            required: 12
        })
    )));
}

#[test]
fn same_seed_reproduces_every_iteration() {
    let inputs = SyntheticPlant::default().inputs();
    let run = |seed: u64| run_analysis(&config(60, seed), &inputs, &CancellationToken::new());

    let a = run(7);
    let b = run(7);
    assert_eq!(a.results, b.results);
    assert_eq!(
        a.summary.as_ref().ok().map(|s| s.aep_series()),
        b.summary.as_ref().ok().map(|s| s.aep_series())
    );

    let mut csv_a = Vec::new();
    let mut csv_b = Vec::new();
    if let (Some(ra), Some(rb)) = (&a.results, &b.results) {
        write_csv(ra.records(), &mut csv_a).expect("export");
        write_csv(rb.records(), &mut csv_b).expect("export");
    }
    assert!(!csv_a.is_empty());
    assert_eq!(csv_a, csv_b);

    let c = run(8);
    assert_ne!(
        a.summary.as_ref().ok().map(|s| s.aep_series()),
        c.summary.as_ref().ok().map(|s| s.aep_series())
    );
}

#[test]
fn worker_count_does_not_change_results() {
    let inputs = SyntheticPlant::default().inputs();
    let base = config(48, 3);
    let mut sequential = base.clone();
    sequential.analysis.parallel = false;
    let mut pooled = base.clone();
    pooled.analysis.workers = Some(4);

    let cancel = CancellationToken::new();
    let a = run_analysis(&base, &inputs, &cancel).results;
    assert_eq!(a, run_analysis(&sequential, &inputs, &cancel).results);
    assert_eq!(a, run_analysis(&pooled, &inputs, &cancel).results);
}

#[test]
fn estimates_stay_physically_plausible() {
    let mut cfg = config(200, 11);
    cfg.analysis.meter_uncertainty = 0.02;
    cfg.analysis.loss_uncertainty = 0.1;
    cfg.analysis.long_term_years = Some([10, 20]);
    let capacity = cfg.plant.capacity_mw;

    let outcome = run_analysis(&cfg, &SyntheticPlant::default().inputs(), &CancellationToken::new());
    let summary = outcome.summary.expect("converges");

    for r in &summary.iterations {
        assert!(r.aep_mwh >= 0.0 && r.aep_mwh <= capacity * 8760.0);
        assert!((0.0..=1.0).contains(&r.availability_loss_fraction));
        assert!((0.0..=1.0).contains(&r.curtailment_loss_fraction));
        assert!((0.0..=1.0).contains(&r.r_squared));
        assert!(r.observations >= 12);
    }
    // about 2 GWh a month gross of a few percent losses
    assert!(summary.aep_mwh.mean > 20_000.0 && summary.aep_mwh.mean < 30_000.0);
    let p5 = summary.aep_mwh.percentile(5.0).unwrap_or(f64::NAN);
    let p95 = summary.aep_mwh.percentile(95.0).unwrap_or(f64::NAN);
    assert!(p5 <= summary.aep_mwh.mean && summary.aep_mwh.mean <= p95);
}

#[test]
fn mean_estimate_tightens_with_more_iterations() {
    let inputs = SyntheticPlant::default().inputs();
    let spread_of_means = |n: usize| {
        let means: Vec<f64> = (0..8)
            .map(|seed| {
                run_analysis(&config(n, 100 + seed), &inputs, &CancellationToken::new())
                    .summary
                    .map(|s| s.aep_mwh.mean)
                    .expect("converges")
            })
            .collect();
        mean_and_std(&means).1
    };

    let small = spread_of_means(10);
    let large = spread_of_means(200);
    assert!(
        large < small,
        "spread with N=200 ({large}) should be below N=10 ({small})"
    );
}

#[test]
fn cancelled_run_has_no_results_to_aggregate() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = run_analysis(&config(25, 5), &SyntheticPlant::default().inputs(), &cancel);

    assert!(matches!(outcome.summary, Err(AnalysisError::EmptyResultSet)));
    let report = AnalysisReport::from_outcome(&outcome);
    assert_eq!(report.cancelled, 25);
    assert_eq!(report.succeeded + report.failed, 0);
}

#[test]
fn engine_and_aggregator_compose_directly() {
    let cfg = config(30, 9);
    let dataset = build_dataset(&cfg, &SyntheticPlant::default().inputs()).expect("dataset");
    assert_eq!(dataset.composite().len(), 24);
    let normal = dataset.resource("era5").map(|s| s.normal());
    assert!(normal.is_some_and(|n| n.wind_speed_ms > 6.0 && n.periods == 240));

    let engine = MonteCarloEngine::new(&dataset, &cfg.analysis).expect("engine");
    let set = engine.run(&CancellationToken::new()).expect("run");
    let summary = ResultsAggregator::default()
        .summarize(&set)
        .expect("summary");
    assert_eq!(summary.succeeded, 30);
    assert_eq!(summary.aep_mwh.percentiles.len(), 3);
}

#[test]
fn la_haute_borne_files_run_end_to_end() {
    let dir = tempfile::tempdir().expect("temp dir");
    SyntheticPlant::default().write_la_haute_borne(dir.path());

    let mut cfg = AnalysisConfig::la_haute_borne();
    cfg.data.dir = dir.path().to_path_buf();
    cfg.analysis.num_simulations = 40;
    let inputs = AnalysisInputs::load(&cfg.data, &cfg.analysis.reanalysis_sources)
        .expect("fixture files load");
    assert_eq!(inputs.meter, inputs.curtail);

    let outcome = run_analysis(&cfg, &inputs, &CancellationToken::new());
    let set = outcome.results.as_ref().expect("loop ran");
    let sources: std::collections::BTreeSet<_> =
        set.records().iter().filter_map(|r| r.source.clone()).collect();
    assert_eq!(sources.len(), 2, "both reanalysis sources get drawn");

    let report = AnalysisReport::from_outcome(&outcome);
    assert!(report.is_success(), "{:?}", report.message);
    // kWh inputs come out in MWh
    let aep = report.aep_mwh.unwrap_or_default();
    assert!(aep > 20_000.0 && aep < 30_000.0, "aep = {aep}");
    assert!(aep <= 8.2 * 8760.0);
}
