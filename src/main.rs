//! wind-aep entry point: CLI wiring and config-driven analysis runs.

use std::path::{Path, PathBuf};
use std::process;

use wind_aep::aep::CancellationToken;
use wind_aep::analysis::{AnalysisInputs, AnalysisReport, run_analysis};
use wind_aep::config::AnalysisConfig;
use wind_aep::io::export::export_csv;
use wind_aep::logging::init_tracing;

/// Parsed CLI arguments.
struct CliArgs {
    config_path: Option<String>,
    preset: Option<String>,
    data_dir: Option<String>,
    seed_override: Option<u64>,
    simulations_override: Option<usize>,
    results_out: Option<String>,
    json: bool,
    #[cfg(feature = "api")]
    serve: bool,
    #[cfg(feature = "api")]
    port: u16,
}

fn print_help() {
    eprintln!("wind-aep: long-term wind plant AEP estimation");
    eprintln!();
    eprintln!("Usage: wind-aep [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>          Load analysis config from TOML file");
    eprintln!("  --preset <name>          Use a built-in preset (baseline, la_haute_borne)");
    eprintln!("  --data-dir <path>        Override the input data directory");
    eprintln!("  --seed <u64>             Override master random seed");
    eprintln!("  --simulations <n>        Override number of Monte Carlo iterations");
    eprintln!("  --results-out <path>     Export per-iteration results to CSV");
    eprintln!("  --json                   Print the report as JSON");
    #[cfg(feature = "api")]
    {
        eprintln!("  --serve                  Serve POST /calculate instead of running once");
        eprintln!("  --port <u16>             API server port (default: 3000)");
    }
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --config or --preset is given, the baseline preset is used.");
}

/// Returns the value following flag `args[*i]`, or exits with an error.
fn flag_value(args: &[String], i: &mut usize, what: &str) -> String {
    *i += 1;
    if *i >= args.len() {
        eprintln!("error: {} requires {what}", args[*i - 1]);
        process::exit(1);
    }
    args[*i].clone()
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        config_path: None,
        preset: None,
        data_dir: None,
        seed_override: None,
        simulations_override: None,
        results_out: None,
        json: false,
        #[cfg(feature = "api")]
        serve: false,
        #[cfg(feature = "api")]
        port: 3000,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--config" => cli.config_path = Some(flag_value(&args, &mut i, "a path argument")),
            "--preset" => cli.preset = Some(flag_value(&args, &mut i, "a name argument")),
            "--data-dir" => cli.data_dir = Some(flag_value(&args, &mut i, "a path argument")),
            "--seed" => {
                let v = flag_value(&args, &mut i, "a u64 argument");
                if let Ok(s) = v.parse::<u64>() {
                    cli.seed_override = Some(s);
                } else {
                    eprintln!("error: --seed value \"{v}\" is not a valid u64");
                    process::exit(1);
                }
            }
            "--simulations" => {
                let v = flag_value(&args, &mut i, "a count argument");
                if let Ok(n) = v.parse::<usize>() {
                    cli.simulations_override = Some(n);
                } else {
                    eprintln!("error: --simulations value \"{v}\" is not a valid count");
                    process::exit(1);
                }
            }
            "--results-out" => {
                cli.results_out = Some(flag_value(&args, &mut i, "a path argument"));
            }
            "--json" => cli.json = true,
            #[cfg(feature = "api")]
            "--serve" => {
                cli.serve = true;
            }
            #[cfg(feature = "api")]
            "--port" => {
                let v = flag_value(&args, &mut i, "a u16 argument");
                if let Ok(p) = v.parse::<u16>() {
                    cli.port = p;
                } else {
                    eprintln!("error: --port value \"{v}\" is not a valid u16");
                    process::exit(1);
                }
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

/// Loads the config named on the command line and applies overrides.
fn load_config(cli: &CliArgs) -> AnalysisConfig {
    // --config takes priority, then --preset, then baseline default
    let loaded = if let Some(ref path) = cli.config_path {
        AnalysisConfig::from_toml_file(Path::new(path))
    } else if let Some(ref name) = cli.preset {
        AnalysisConfig::from_preset(name)
    } else {
        Ok(AnalysisConfig::baseline())
    };
    let mut config = loaded.unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    if let Some(ref dir) = cli.data_dir {
        config.data.dir = PathBuf::from(dir);
    }
    if let Some(seed) = cli.seed_override {
        config.analysis.master_seed = seed;
    }
    if let Some(n) = cli.simulations_override {
        config.analysis.num_simulations = n;
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }
    config
}

fn main() {
    let cli = parse_args();
    let config = load_config(&cli);

    if let Err(e) = init_tracing(&config.logging) {
        eprintln!("{e}");
        process::exit(1);
    }

    let inputs = AnalysisInputs::load(&config.data, &config.analysis.reanalysis_sources)
        .unwrap_or_else(|e| {
            eprintln!("error: {e}");
            process::exit(1);
        });

    #[cfg(feature = "api")]
    if cli.serve {
        use std::net::SocketAddr;
        use std::sync::Arc;

        let state = Arc::new(wind_aep::api::AppState { config, inputs });
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
        let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
            eprintln!("error: failed to create tokio runtime: {e}");
            process::exit(1);
        });
        if let Err(e) = rt.block_on(wind_aep::api::serve(state, addr)) {
            eprintln!("error: API server failed: {e}");
            process::exit(1);
        }
        return;
    }

    let outcome = run_analysis(&config, &inputs, &CancellationToken::new());

    // Export CSV if requested, even for a failed run
    if let (Some(path), Some(set)) = (&cli.results_out, &outcome.results) {
        if let Err(e) = export_csv(set, Path::new(path)) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        eprintln!("Per-iteration results written to {path}");
    }

    let report = AnalysisReport::from_outcome(&outcome);
    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("error: failed to serialise report: {e}");
                process::exit(1);
            }
        }
    } else {
        match &outcome.summary {
            Ok(summary) => println!("{summary}"),
            Err(e) => eprintln!("error: {e}"),
        }
    }

    if !report.is_success() {
        process::exit(1);
    }
}
