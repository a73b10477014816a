//! DIMM temperature sensors and SPD contents

use crate::error::DecodeError;
use crate::telemetry::codec::{bits, sign_extend, ByteReader, ByteWriter};
use crate::telemetry::{Record, RecordKind};

use serde::Serialize;

/// Number of temperature sensors a DDR5 DIMM carries
pub const MAX_TS_SENSORS: usize = 2;

/// Convert a raw TS register reading to degrees Celsius
///
/// Bits 12:2 hold a two's-complement value in 0.25 °C steps; the
/// remaining bits are flags or reserved.
pub fn ts_celsius(raw: u16) -> f32 {
    let quarter_degrees = sign_extend(bits(u64::from(raw), 2, 11), 11);
    quarter_degrees as f32 * 0.25
}

/// Inverse of [`ts_celsius`], rounding to the nearest quarter degree
pub fn ts_raw(celsius: f32) -> u16 {
    let quarters = (celsius * 4.0).round() as i32;
    ((quarters as u16) & 0x7ff) << 2
}

/// Temperature-sensor readout for one DIMM
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DimmThermal {
    pub dimm: u8,
    pub sensor_count: u8,
    pub raw: [u16; MAX_TS_SENSORS],
}

impl DimmThermal {
    pub const BODY_LEN: usize = 2 + 2 * MAX_TS_SENSORS;

    /// Temperatures of the populated sensors
    pub fn temperatures(&self) -> Vec<f32> {
        self.raw
            .iter()
            .take(usize::from(self.sensor_count))
            .map(|&raw| ts_celsius(raw))
            .collect()
    }

    /// Hottest populated sensor
    pub fn max_temperature(&self) -> Option<f32> {
        self.temperatures().into_iter().reduce(f32::max)
    }
}

impl Record for DimmThermal {
    const KIND: RecordKind = RecordKind::DimmThermal;

    fn decode_body(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let dimm = reader.u8()?;
        let sensor_count = reader.u8()?;
        if usize::from(sensor_count) > MAX_TS_SENSORS {
            return Err(DecodeError::InvalidField {
                field: "sensor_count",
                value: u64::from(sensor_count),
            });
        }
        Ok(Self {
            dimm,
            sensor_count,
            raw: [reader.u16()?, reader.u16()?],
        })
    }

    fn encode_body(&self, writer: &mut ByteWriter) {
        writer.u8(self.dimm).u8(self.sensor_count);
        for raw in self.raw {
            writer.u16(raw);
        }
    }
}

/// Length of the SPD part-number field
pub const PART_NUMBER_LEN: usize = 30;

/// Decoded SPD information for one DIMM
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpdInfo {
    pub dies_per_package: u32,
    pub density_gb: u32,
    pub speed_max: u32,
    pub speed_min: u32,
    pub ranks: u32,
    pub capacity_gb: u32,
    pub channels: u32,
    pub channel_width: u32,
    pub io_width: u32,
    pub dimm_type: u32,
    pub ddr5_sdram: u32,
    pub manufacturer_id: u32,
    /// Year (low byte) and week (next byte), both BCD
    pub date_code_bcd: u32,
    pub part_number: String,
    pub manufacturing_location: u32,
    pub serial_number: u32,
}

fn from_bcd(byte: u8) -> Option<u8> {
    let (high, low) = (byte >> 4, byte & 0x0f);
    (high < 10 && low < 10).then_some(high * 10 + low)
}

impl SpdInfo {
    pub const BODY_LEN: usize = 13 * 4 + PART_NUMBER_LEN + 2 * 4;

    /// Manufacturing year and week, if the date code is valid BCD
    pub fn manufacture_date(&self) -> Option<(u16, u8)> {
        let [year, week, ..] = self.date_code_bcd.to_le_bytes();
        let year = from_bcd(year)?;
        let week = from_bcd(week)?;
        Some((2000 + u16::from(year), week))
    }
}

impl Record for SpdInfo {
    const KIND: RecordKind = RecordKind::SpdInfo;

    fn decode_body(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let mut geometry = [0u32; 11];
        for slot in geometry.iter_mut() {
            *slot = reader.u32()?;
        }
        let manufacturer_id = reader.u32()?;
        let date_code_bcd = reader.u32()?;
        let raw_part = reader.take(PART_NUMBER_LEN)?;
        // The part number is padded with trailing spaces or NULs.
        let end = raw_part
            .iter()
            .rposition(|b| *b != 0 && *b != b' ')
            .map_or(0, |last| last + 1);
        let part_number = String::from_utf8_lossy(&raw_part[..end]).into_owned();

        Ok(Self {
            dies_per_package: geometry[0],
            density_gb: geometry[1],
            speed_max: geometry[2],
            speed_min: geometry[3],
            ranks: geometry[4],
            capacity_gb: geometry[5],
            channels: geometry[6],
            channel_width: geometry[7],
            io_width: geometry[8],
            dimm_type: geometry[9],
            ddr5_sdram: geometry[10],
            manufacturer_id,
            date_code_bcd,
            part_number,
            manufacturing_location: reader.u32()?,
            serial_number: reader.u32()?,
        })
    }

    fn encode_body(&self, writer: &mut ByteWriter) {
        for value in [
            self.dies_per_package,
            self.density_gb,
            self.speed_max,
            self.speed_min,
            self.ranks,
            self.capacity_gb,
            self.channels,
            self.channel_width,
            self.io_width,
            self.dimm_type,
            self.ddr5_sdram,
            self.manufacturer_id,
            self.date_code_bcd,
        ] {
            writer.u32(value);
        }
        let mut part = [0u8; PART_NUMBER_LEN];
        let bytes = self.part_number.as_bytes();
        let len = bytes.len().min(PART_NUMBER_LEN);
        part[..len].copy_from_slice(&bytes[..len]);
        writer
            .bytes(&part)
            .u32(self.manufacturing_location)
            .u32(self.serial_number);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ts_conversion() {
        assert_eq!(ts_celsius(0x0190), 25.0);
        assert_eq!(ts_celsius(0x0192), 25.0); // low flag bits ignored
        assert_eq!(ts_celsius(0x0194), 25.25);
        assert_eq!(ts_celsius(0x1ff0), -1.0);
        assert_eq!(ts_raw(25.25), 0x0194);
        assert_eq!(ts_raw(-1.0), 0x1ff0);
    }

    #[test]
    fn test_thermal_populated_sensors_only() {
        let thermal = DimmThermal {
            dimm: 1,
            sensor_count: 1,
            raw: [ts_raw(41.5), ts_raw(90.0)],
        };
        assert_eq!(thermal.temperatures(), vec![41.5]);
        assert_eq!(thermal.max_temperature(), Some(41.5));
    }

    #[test]
    fn test_thermal_rejects_bad_sensor_count() {
        let bytes = [0u8, 3, 0, 0, 0, 0];
        assert_eq!(
            DimmThermal::decode(&bytes),
            Err(DecodeError::InvalidField {
                field: "sensor_count",
                value: 3
            })
        );
    }

    #[test]
    fn test_spd_part_number_trimmed() {
        let spd = SpdInfo {
            capacity_gb: 64,
            part_number: "M321R8GA0BB0-CQK".to_string(),
            date_code_bcd: 0x0000_2324,
            ..Default::default()
        };
        let mut body = spd.encode();
        assert_eq!(body.len(), SpdInfo::BODY_LEN);

        // Space padding is treated like NUL padding.
        let part_offset = 13 * 4;
        body[part_offset + 16..part_offset + PART_NUMBER_LEN].fill(b' ');
        let decoded = SpdInfo::decode(&body).unwrap();
        assert_eq!(decoded.part_number, "M321R8GA0BB0-CQK");
        assert_eq!(decoded.manufacture_date(), Some((2024, 23)));
    }

    #[test]
    fn test_spd_part_number_keeps_inner_space() {
        let spd = SpdInfo {
            part_number: "HMCG 88AGBRA".to_string(),
            ..Default::default()
        };
        let mut body = spd.encode();
        let part_offset = 13 * 4;
        body[part_offset + 12..part_offset + 20].fill(b' ');
        let decoded = SpdInfo::decode(&body).unwrap();
        assert_eq!(decoded.part_number, "HMCG 88AGBRA");
    }

    #[test]
    fn test_invalid_bcd_date() {
        let spd = SpdInfo {
            date_code_bcd: 0x0000_1a24,
            ..Default::default()
        };
        assert_eq!(spd.manufacture_date(), None);
    }
}
