//! DDR PHY training margins
//!
//! Each margin group is indexed `[channel][rank]`. The number of groups
//! depends on which margin family was requested.

use crate::error::DecodeError;
use crate::telemetry::codec::{ByteReader, ByteWriter};
use crate::telemetry::{Record, RecordKind};

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// `[channel][rank]` margin values
pub type MarginGroup = [[u8; 4]; 2];

const GROUP_LEN: usize = 8;

/// Margin family requested from the PHY
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MarginKind {
    /// Rx clock delay, Vref DAC, Tx DQ delay, device Vref
    RxTx,
    /// CS delay, CS Vref, CA delay, CA Vref
    CsCa,
    /// QCS delay, QCA delay
    QcsQca,
}

impl MarginKind {
    pub fn code(self) -> u8 {
        match self {
            Self::RxTx => 0,
            Self::CsCa => 1,
            Self::QcsQca => 2,
        }
    }

    pub fn group_count(self) -> usize {
        match self {
            Self::RxTx | Self::CsCa => 4,
            Self::QcsQca => 2,
        }
    }

    pub fn group_names(self) -> &'static [&'static str] {
        match self {
            Self::RxTx => &["rx_clk_dly", "vref_dac", "tx_dq_dly", "dev_vref"],
            Self::CsCa => &["cs_dly", "cs_vref", "ca_dly", "ca_vref"],
            Self::QcsQca => &["qcs_dly", "qca_dly"],
        }
    }
}

impl TryFrom<u8> for MarginKind {
    type Error = DecodeError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::RxTx),
            1 => Ok(Self::CsCa),
            2 => Ok(Self::QcsQca),
            other => Err(DecodeError::InvalidField {
                field: "margin_kind",
                value: u64::from(other),
            }),
        }
    }
}

impl fmt::Display for MarginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RxTx => write!(f, "rx-tx"),
            Self::CsCa => write!(f, "cs-ca"),
            Self::QcsQca => write!(f, "qcs-qca"),
        }
    }
}

impl FromStr for MarginKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "rx-tx" | "rxtx" => Ok(Self::RxTx),
            "cs-ca" | "csca" => Ok(Self::CsCa),
            "qcs-qca" | "qcsqca" => Ok(Self::QcsQca),
            _ => Err(format!("unknown margin kind '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DdrPhyMargins {
    pub kind: MarginKind,
    pub groups: Vec<MarginGroup>,
}

impl DdrPhyMargins {
    /// Smallest margin across every group, channel and rank
    pub fn worst(&self) -> Option<u8> {
        self.groups.iter().flatten().flatten().copied().min()
    }

    /// Group values by name
    pub fn named_groups(&self) -> Vec<(&'static str, &MarginGroup)> {
        self.kind
            .group_names()
            .iter()
            .copied()
            .zip(self.groups.iter())
            .collect()
    }
}

impl Record for DdrPhyMargins {
    const KIND: RecordKind = RecordKind::DdrPhyMargins;

    fn decode_body(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let kind = MarginKind::try_from(reader.u8()?)?;
        let mut groups = Vec::with_capacity(kind.group_count());
        for _ in 0..kind.group_count() {
            let flat: [u8; GROUP_LEN] = reader.array()?;
            let mut group: MarginGroup = [[0; 4]; 2];
            group[0].copy_from_slice(&flat[..4]);
            group[1].copy_from_slice(&flat[4..]);
            groups.push(group);
        }
        Ok(Self { kind, groups })
    }

    fn encode_body(&self, writer: &mut ByteWriter) {
        writer.u8(self.kind.code());
        for index in 0..self.kind.group_count() {
            let group = self.groups.get(index).copied().unwrap_or_default();
            writer.bytes(&group[0]).bytes(&group[1]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_count_follows_kind() {
        let mut body = vec![MarginKind::QcsQca.code()];
        body.extend(1..=16u8);
        let margins = DdrPhyMargins::decode(&body).unwrap();
        assert_eq!(margins.groups.len(), 2);
        assert_eq!(margins.groups[0][1], [5, 6, 7, 8]);
        assert_eq!(margins.worst(), Some(1));
        assert_eq!(margins.named_groups()[1].0, "qca_dly");
    }

    #[test]
    fn test_rx_tx_body_too_short() {
        let mut body = vec![MarginKind::RxTx.code()];
        body.extend([0u8; 16]);
        assert!(matches!(
            DdrPhyMargins::decode(&body),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("cs_ca".parse::<MarginKind>().unwrap(), MarginKind::CsCa);
        assert!("eye".parse::<MarginKind>().is_err());
    }
}
