use std::path::{Path, PathBuf};

use anyhow::Result;

use paceguard::analyze::{analyze_file, AnalysisReport};
use paceguard::config::Config;

/// Write the commented default config to `path` (or the platform location).
pub fn init_config(path: Option<&Path>, force: bool) -> Result<()> {
    let target: PathBuf = match path {
        Some(p) => p.to_path_buf(),
        None => Config::platform_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine the config directory"))?,
    };

    if target.exists() && !force {
        anyhow::bail!(
            "{} already exists (pass --force to overwrite)",
            target.display()
        );
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&target, Config::generate_default_commented())?;
    println!("Wrote default config to {}", target.display());
    Ok(())
}

pub fn show_config(config: &Config, resolved: Option<&Path>) -> Result<()> {
    match resolved {
        Some(p) => println!("# Loaded from {}", p.display()),
        None => println!("# Built-in defaults"),
    }
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

pub fn analyze(config: &Config, input: &Path, json: bool) -> Result<()> {
    let report = analyze_file(config, input)?;
    if json {
        for point in &report.points {
            println!("{}", serde_json::to_string(point)?);
        }
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &AnalysisReport) {
    for point in &report.points {
        let marker = if point.alert { "  <- alert" } else { "" };
        println!(
            "{:>8.1}s  {:>3} WPM  {:?}{}",
            point.at_secs, point.rate, point.label, marker
        );
    }
    println!(
        "Speech {:.1}s of {:.1}s, {} window(s), {} alert(s)",
        report.speech_secs,
        report.total_secs,
        report.points.len(),
        report.alerts
    );
    if let Some(avg) = report.average_rate() {
        println!("Average rate: {:.0} WPM", avg);
    }
}
