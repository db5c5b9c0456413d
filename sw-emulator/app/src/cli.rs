// Licensed under the Apache-2.0 license

use clap::{Parser, ValueEnum};
use spi_tpm_emu_periph::SpiDeviceConfig;
use spi_tpm_responder::{InterfaceConfig, PrefixPolicy, ResponderConfig};
use std::path::PathBuf;

/// Transactions served by the built-in demo script before stopping.
pub const DEMO_ITERATIONS: u32 = 100;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Host script (TOML). Runs the built-in demo script if omitted
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Stop after serving this many transactions
    #[arg(long)]
    pub iterations: Option<u32>,

    /// Handling of addresses without the TPM prefix
    #[arg(long, value_enum, default_value_t = ArgsPrefixPolicy::Permissive)]
    pub prefix_policy: ArgsPrefixPolicy,

    /// Let the SPI device answer short register reads without firmware
    #[arg(long)]
    pub return_by_hw: bool,

    /// Cycles per unit of programmed response delay
    #[arg(long, default_value_t = ResponderConfig::default().delay_quantum_cycles)]
    pub delay_quantum: u64,

    /// Cycles to wait for a write payload before dropping it
    #[arg(long, default_value_t = ResponderConfig::default().pull_deadline_cycles)]
    pub pull_deadline: u64,

    /// SPI clock cycles per transferred byte
    #[arg(long, default_value_t = SpiDeviceConfig::default().byte_cycles)]
    pub byte_cycles: u64,

    /// Idle cycles between host transactions
    #[arg(long, default_value_t = SpiDeviceConfig::default().inter_transaction_gap)]
    pub gap_cycles: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum ArgsPrefixPolicy {
    Permissive,
    Strict,
}

impl From<ArgsPrefixPolicy> for PrefixPolicy {
    fn from(value: ArgsPrefixPolicy) -> Self {
        match value {
            ArgsPrefixPolicy::Permissive => PrefixPolicy::Permissive,
            ArgsPrefixPolicy::Strict => PrefixPolicy::Strict,
        }
    }
}

impl Args {
    pub fn responder_config(&self) -> ResponderConfig {
        let iterations = match (&self.script, self.iterations) {
            (_, Some(bound)) => Some(bound),
            (None, None) => Some(DEMO_ITERATIONS),
            (Some(_), None) => None,
        };
        ResponderConfig {
            prefix_policy: self.prefix_policy.into(),
            iterations,
            delay_quantum_cycles: self.delay_quantum,
            pull_deadline_cycles: self.pull_deadline,
            interface: InterfaceConfig {
                return_by_hardware: self.return_by_hw,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn spi_config(&self) -> SpiDeviceConfig {
        SpiDeviceConfig {
            byte_cycles: self.byte_cycles,
            inter_transaction_gap: self.gap_cycles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["spi-tpm-emu"]);
        let config = args.responder_config();
        assert_eq!(config.iterations, Some(DEMO_ITERATIONS));
        assert_eq!(config.prefix_policy, PrefixPolicy::Permissive);
        assert!(!config.interface.return_by_hardware);
        assert_eq!(args.spi_config(), SpiDeviceConfig::default());
    }

    #[test]
    fn test_script_runs_unbounded() {
        let args = Args::parse_from([
            "spi-tpm-emu",
            "--script",
            "host.toml",
            "--prefix-policy",
            "strict",
            "--return-by-hw",
        ]);
        let config = args.responder_config();
        assert_eq!(config.iterations, None);
        assert_eq!(config.prefix_policy, PrefixPolicy::Strict);
        assert!(config.interface.return_by_hardware);
    }

    #[test]
    fn test_explicit_iterations() {
        let args = Args::parse_from(["spi-tpm-emu", "--iterations", "7", "--byte-cycles", "2"]);
        assert_eq!(args.responder_config().iterations, Some(7));
        assert_eq!(args.spi_config().byte_cycles, 2);
    }
}
