// Licensed under the Apache-2.0 license

//! Host scripts: the sequence of TPM transactions the emulated SPI host
//! issues, loaded from TOML.
//!
//! ```toml
//! [identity]
//! vendor_id = 0x1234
//!
//! [[transaction]]
//! kind = "write"
//! address = 0xd40018
//! data = [0xa1, 0xb2, 0xc3, 0xd4]
//!
//! [[transaction]]
//! kind = "read"
//! address = 0xd40018
//! length = 4
//! ```

use std::{fmt, fs, path::Path};

use serde::Deserialize;
use spi_tpm_emu_periph::{HostError, TpmTransaction};
use spi_tpm_responder::TpmIdentity;

#[derive(Debug)]
pub enum ScriptError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Transaction { index: usize, source: HostError },
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::Io(err) => write!(f, "unable to read script: {err}"),
            ScriptError::Parse(err) => write!(f, "unable to parse script: {err}"),
            ScriptError::Transaction { index, source } => {
                write!(f, "transaction {index}: {source}")
            }
        }
    }
}

impl std::error::Error for ScriptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScriptError::Io(err) => Some(err),
            ScriptError::Parse(err) => Some(err),
            ScriptError::Transaction { source, .. } => Some(source),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ScriptedTransaction {
    Read { address: u32, length: usize },
    Write { address: u32, data: Vec<u8> },
}

/// Fields of the identity that a script may override. Everything else
/// keeps its default value.
#[derive(Debug, Default, Clone, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct IdentityOverrides {
    pub vendor_id: Option<u16>,
    pub device_id: Option<u16>,
    pub revision: Option<u8>,
}

#[derive(Debug, Default, Clone, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HostScript {
    #[serde(default)]
    pub identity: IdentityOverrides,

    #[serde(default, rename = "transaction")]
    pub transactions: Vec<ScriptedTransaction>,
}

impl HostScript {
    pub fn from_toml(text: &str) -> Result<Self, ScriptError> {
        toml::from_str(text).map_err(ScriptError::Parse)
    }

    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        Self::from_toml(&fs::read_to_string(path).map_err(ScriptError::Io)?)
    }

    pub fn push(&mut self, transaction: ScriptedTransaction) {
        self.transactions.push(transaction);
    }

    pub fn identity(&self) -> TpmIdentity {
        let defaults = TpmIdentity::default();
        TpmIdentity {
            vendor_id: self.identity.vendor_id.unwrap_or(defaults.vendor_id),
            device_id: self.identity.device_id.unwrap_or(defaults.device_id),
            revision: self.identity.revision.unwrap_or(defaults.revision),
            ..defaults
        }
    }

    /// Validated wire transactions, in script order.
    pub fn transactions(&self) -> Result<Vec<TpmTransaction>, ScriptError> {
        self.transactions
            .iter()
            .enumerate()
            .map(|(index, t)| {
                match t {
                    ScriptedTransaction::Read { address, length } => {
                        TpmTransaction::read(*address, *length)
                    }
                    ScriptedTransaction::Write { address, data } => {
                        TpmTransaction::write(*address, data.clone())
                    }
                }
                .map_err(|source| ScriptError::Transaction { index, source })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let script = HostScript::from_toml(
            r#"
            [identity]
            revision = 0x10

            [[transaction]]
            kind = "write"
            address = 0xd40018
            data = [0xa1, 0xb2, 0xc3, 0xd4]

            [[transaction]]
            kind = "read"
            address = 0xd40018
            length = 4
            "#,
        )
        .unwrap();
        assert_eq!(
            script.transactions().unwrap(),
            vec![
                TpmTransaction::write(0xd4_0018, [0xa1, 0xb2, 0xc3, 0xd4]).unwrap(),
                TpmTransaction::read(0xd4_0018, 4).unwrap(),
            ]
        );
        let identity = script.identity();
        assert_eq!(identity.revision, 0x10);
        assert_eq!(identity.vendor_id, 0x1234);
    }

    #[test]
    fn test_empty_script() {
        let script = HostScript::from_toml("").unwrap();
        assert!(script.transactions().unwrap().is_empty());
        assert_eq!(script.identity(), TpmIdentity::default());
    }

    #[test]
    fn test_invalid_length() {
        let script = HostScript::from_toml(
            r#"
            [[transaction]]
            kind = "read"
            address = 0xd40000
            length = 1

            [[transaction]]
            kind = "read"
            address = 0xd40024
            length = 65
            "#,
        )
        .unwrap();
        let err = script.transactions().unwrap_err();
        assert!(matches!(
            err,
            ScriptError::Transaction {
                index: 1,
                source: HostError::InvalidLength(65)
            }
        ));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = HostScript::from_toml(
            r#"
            [[transaction]]
            kind = "erase"
            address = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ScriptError::Parse(_)));
    }
}
