/*++

Licensed under the Apache-2.0 license.

File Name:

    main.rs

Abstract:

    File contains main entrypoint for the SPI TPM responder emulator.

--*/

use anyhow::Context;
use clap::Parser;
use log::info;
use spi_tpm_hw_model::{HostScript, InitParams, Report};

mod cli;
use cli::Args;

const DEMO_SCRIPT: &str = include_str!("../scripts/demo.toml");

fn print_report(report: &Report) {
    for done in &report.completed {
        let source = if done.served_by_hardware { "hw" } else { "fw" };
        println!(
            "[{:>8}] cmd {:#04x} addr {:#08x} {} {:>6} cycles  {:02x?}",
            done.completed_at,
            done.transaction.command(),
            done.transaction.address(),
            source,
            done.latency(),
            done.response,
        );
    }
    let stats = &report.stats;
    println!(
        "{} transactions served ({} reads, {} writes), {} aborted, {} spurious",
        stats.completed(),
        stats.reads,
        stats.writes,
        stats.aborted(),
        stats.spurious
    );
    println!(
        "response delay {} after {} cycles",
        report.final_delay, report.cycles
    );
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let script = match &args.script {
        Some(path) => HostScript::load(path)
            .with_context(|| format!("loading host script {}", path.display()))?,
        None => {
            info!("no script given, running the built-in demo");
            HostScript::from_toml(DEMO_SCRIPT).context("parsing built-in demo script")?
        }
    };

    let params = InitParams {
        spi: args.spi_config(),
    };
    let report = spi_tpm_hw_model::run_script(params, &script, &args.responder_config())?;
    print_report(&report);
    Ok(())
}
