use std::path::PathBuf;

use anyhow::{Context, bail};

fn main() -> anyhow::Result<()> {
    stockres_observability::init();

    let mut path: Option<PathBuf> = None;
    let mut stop_on_error = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--stop-on-error" => stop_on_error = true,
            "-h" | "--help" => {
                println!("usage: stockres-replay [--stop-on-error] <scenario.json>");
                return Ok(());
            }
            _ if path.is_none() => path = Some(PathBuf::from(&arg)),
            _ => bail!("unexpected argument: {arg}"),
        }
    }
    let Some(path) = path else {
        bail!("usage: stockres-replay [--stop-on-error] <scenario.json>");
    };

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read scenario {}", path.display()))?;
    let scenario: stockres_cli::Scenario = serde_json::from_str(&raw)
        .with_context(|| format!("invalid scenario {}", path.display()))?;

    tracing::info!(scenario = %path.display(), operations = scenario.operations.len(), "replaying scenario");
    let report = stockres_cli::replay(scenario, stop_on_error);

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to encode replay report")?
    );

    if report.failures() > 0 {
        std::process::exit(1);
    }
    Ok(())
}
