//! Command-line front end: discover variables, submit one evaluation, print the results.

use std::path::{Path, PathBuf};
use std::time::Duration;

use atmos::config;
use atmos::logging;
use atmos::service::HttpEvaluationService;
use atmos::session::types::{CalculationMode, MetricId, PlotRef, UploadFile};
use atmos::session::{EvaluationController, SessionStatus};

const DEFAULT_WAIT_SECS: u64 = 600;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Default, PartialEq)]
struct Options {
    observation: Option<PathBuf>,
    simulation: Option<PathBuf>,
    metrics: Vec<String>,
    mode: Option<CalculationMode>,
    variable: Option<String>,
    base_url: Option<String>,
    list_variables: bool,
    list_metrics: bool,
    plots_dir: Option<PathBuf>,
    wait: Duration,
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };
    if options.list_metrics {
        for id in MetricId::KNOWN {
            println!("{id}");
        }
        return Ok(());
    }
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }

    let mut settings = config::load_or_default().map_err(|err| err.to_string())?;
    if let Some(url) = &options.base_url {
        settings.service.base_url = url.clone();
    }
    if let Some(mode) = options.mode {
        settings.session.default_calc_mode = mode;
    }
    if !options.metrics.is_empty() {
        settings.session.default_metrics = options.metrics.clone();
    }
    let service = HttpEvaluationService::new(&settings.service).map_err(|err| err.to_string())?;
    tracing::info!(base_url = %service.base_url(), "Using evaluation service");
    let mut controller = EvaluationController::with_settings(service, &settings.session);

    let observation_path = options
        .observation
        .as_deref()
        .ok_or_else(|| "--obs is required".to_string())?;
    controller
        .set_observation_file(read_upload(observation_path)?)
        .map_err(|err| err.to_string())?;
    wait_for(&mut controller, options.wait, "variable discovery")?;
    if let Some(err) = controller.state().variables_error() {
        return Err(format!("Could not read variables: {err}"));
    }

    if options.list_variables {
        for name in controller.state().variables() {
            println!("{name}");
        }
        return Ok(());
    }
    println!("Variables: {}", controller.state().variables().join(", "));

    let simulation_path = options
        .simulation
        .as_deref()
        .ok_or_else(|| "--sim is required".to_string())?;
    controller
        .set_simulation_file(read_upload(simulation_path)?)
        .map_err(|err| err.to_string())?;
    if let Some(variable) = &options.variable {
        controller
            .select_variable(variable)
            .map_err(|err| err.to_string())?;
    }

    controller
        .submit_evaluation()
        .map_err(|err| err.to_string())?;
    println!(
        "Evaluating {} against {} ({} mode)...",
        simulation_path.display(),
        observation_path.display(),
        controller.state().mode()
    );
    wait_for(&mut controller, options.wait, "the evaluation")?;

    match controller.status() {
        SessionStatus::Ready => {}
        SessionStatus::Failed => {
            let message = controller
                .state()
                .evaluation_error()
                .map(ToString::to_string)
                .unwrap_or_else(|| "Evaluation failed".to_string());
            return Err(message);
        }
        other => return Err(format!("Unexpected session status: {}", other.label())),
    }

    let view = controller.view();
    println!("Results:");
    for row in &view.results {
        println!("  {}: {}", row.name, row.value);
    }
    if view.plots.is_empty() {
        return Ok(());
    }
    println!("Plots:");
    for (index, plot) in view.plots.iter().enumerate() {
        match controller.service().resolve_plot(plot) {
            Ok(url) => println!("  {url}"),
            Err(err) => println!("  {plot} ({err})"),
        }
        if let Some(dir) = &options.plots_dir {
            save_plot(&controller, index, plot, dir)?;
        }
    }
    Ok(())
}

fn read_upload(path: &Path) -> Result<UploadFile, String> {
    UploadFile::from_path(path).map_err(|err| err.to_string())
}

fn wait_for(
    controller: &mut EvaluationController<HttpEvaluationService>,
    timeout: Duration,
    what: &str,
) -> Result<(), String> {
    if controller.wait_until_settled(timeout) {
        Ok(())
    } else {
        Err(format!(
            "Timed out after {}s waiting for {what}",
            timeout.as_secs()
        ))
    }
}

fn save_plot(
    controller: &EvaluationController<HttpEvaluationService>,
    index: usize,
    plot: &PlotRef,
    dir: &Path,
) -> Result<(), String> {
    let bytes = controller
        .fetch_plot(plot)
        .map_err(|err| format!("Download of {plot} failed: {err}"))?;
    std::fs::create_dir_all(dir)
        .map_err(|err| format!("Create {} failed: {err}", dir.display()))?;
    let path = dir.join(plot_file_name(index, plot));
    std::fs::write(&path, bytes).map_err(|err| format!("Write {} failed: {err}", path.display()))?;
    println!("    saved to {}", path.display());
    Ok(())
}

/// Last path segment of the plot reference, without query or fragment, prefixed
/// with the plot's 1-based position.
fn plot_file_name(index: usize, plot: &PlotRef) -> String {
    let path = plot.as_str().split(['?', '#']).next().unwrap_or_default();
    let name = match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name,
        _ => "plot.png",
    };
    format!("{:02}_{name}", index + 1)
}

fn parse_args(args: Vec<String>) -> Result<Option<Options>, String> {
    let mut options = Options {
        wait: Duration::from_secs(DEFAULT_WAIT_SECS),
        ..Options::default()
    };
    let mut idx = 0usize;
    while idx < args.len() {
        let arg = args[idx].as_str();
        match arg {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--list-variables" => options.list_variables = true,
            "--list-metrics" => options.list_metrics = true,
            "--obs" | "--sim" | "--metric" | "--mode" | "--variable" | "--base-url"
            | "--plots-dir" | "--wait-secs" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| format!("{arg} requires a value"))?
                    .clone();
                match arg {
                    "--obs" => options.observation = Some(PathBuf::from(value)),
                    "--sim" => options.simulation = Some(PathBuf::from(value)),
                    "--metric" => options.metrics.push(value),
                    "--mode" => {
                        let mode = value
                            .parse::<CalculationMode>()
                            .map_err(|err| err.to_string())?;
                        options.mode = Some(mode);
                    }
                    "--variable" => options.variable = Some(value),
                    "--base-url" => options.base_url = Some(value),
                    "--plots-dir" => options.plots_dir = Some(PathBuf::from(value)),
                    _ => {
                        let secs: u64 = value
                            .parse()
                            .map_err(|_| format!("Invalid --wait-secs value: {value}"))?;
                        if secs == 0 {
                            return Err("--wait-secs must be at least 1".to_string());
                        }
                        options.wait = Duration::from_secs(secs);
                    }
                }
            }
            _ => return Err(format!("Unknown argument: {arg}\n\n{}", help_text())),
        }
        idx += 1;
    }
    Ok(Some(options))
}

fn help_text() -> String {
    [
        "Usage: atmos --obs <file.nc> [--sim <file.nc>] [options]",
        "",
        "Options:",
        "  --obs <path>        Observation NetCDF file (required)",
        "  --sim <path>        Simulation NetCDF file (required unless --list-variables)",
        "  --metric <name>     Metric to compute; repeat for several",
        "                      (defaults to session.default_metrics in config.toml)",
        "  --mode <mode>       overall, spatial or temporal",
        "  --variable <name>   Variable to evaluate (defaults to the first one found)",
        "  --base-url <url>    Evaluation Service base URL",
        "  --list-variables    Print the observation file's variables and exit",
        "  --list-metrics      Print the built-in metric names and exit",
        "  --plots-dir <dir>   Download result plots into this directory",
        "  --wait-secs <n>     Give up waiting on the service after n seconds (default 600)",
    ]
    .join("\n")
}
