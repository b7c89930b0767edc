//! Range dataset format: newline-delimited JSON records, gzip-compressed.
//!
//! The same format is used for the upstream download and for the local snapshot.

use crate::store::{Interval, IntervalError};

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{AddrParseError, IpAddr};
use thiserror::Error;

#[derive(Debug, Deserialize, Serialize)]
pub struct RangeRecord {
    pub start_ip: String,
    pub end_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continent: Option<String>,
    #[serde(default)]
    pub continent_name: Option<String>,
}

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Record is not a valid JSON object: {0}")]
    Json(#[from] serde_json::Error),
    #[error(r#"Start address "{address}" has wrong format: {error}"#)]
    StartAddress {
        address: String,
        error: AddrParseError,
    },
    #[error(r#"End address "{address}" has wrong format: {error}"#)]
    EndAddress {
        address: String,
        error: AddrParseError,
    },
    #[error(transparent)]
    Interval(#[from] IntervalError),
}

/// A record left out of the decoded dataset
#[derive(Error, Debug)]
#[error(r#"Skipping record on line {line} "{record}": {error}"#)]
pub struct SkippedRecord {
    pub line: usize,
    pub record: String,
    pub error: RecordError,
}

impl TryFrom<RangeRecord> for Interval {
    type Error = RecordError;

    fn try_from(record: RangeRecord) -> Result<Self, Self::Error> {
        let start: IpAddr =
            record
                .start_ip
                .parse()
                .map_err(|error| RecordError::StartAddress {
                    address: record.start_ip.clone(),
                    error,
                })?;
        let end: IpAddr = record
            .end_ip
            .parse()
            .map_err(|error| RecordError::EndAddress {
                address: record.end_ip.clone(),
                error,
            })?;
        Ok(Interval::new(
            start,
            end,
            record.country_name.unwrap_or_default(),
            record.continent_name.unwrap_or_default(),
        )?)
    }
}

impl From<&Interval> for RangeRecord {
    fn from(interval: &Interval) -> Self {
        Self {
            start_ip: interval.start().to_string(),
            end_ip: interval.end().to_string(),
            country: None,
            country_name: Some(interval.country_name().to_owned()),
            continent: None,
            continent_name: Some(interval.continent_name().to_owned()),
        }
    }
}

#[derive(Debug, Default)]
pub struct Decoded {
    pub intervals: Vec<Interval>,
    pub skipped: Vec<SkippedRecord>,
}

fn parse_line(line: &[u8]) -> Result<Interval, RecordError> {
    let record: RangeRecord = serde_json::from_slice(line)?;
    record.try_into()
}

fn trim_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |index| index + 1);
    &bytes[start..end]
}

/// Decode an uncompressed dataset.
///
/// Invalid records are collected into [Decoded::skipped], only I/O errors abort decoding.
pub fn decode<R: BufRead>(mut reader: R) -> std::io::Result<Decoded> {
    let mut decoded = Decoded::default();
    let mut buf = vec![];
    let mut line = 0;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line += 1;
        let trimmed = trim_whitespace(&buf);
        if trimmed.is_empty() {
            continue;
        }
        match parse_line(trimmed) {
            Ok(interval) => decoded.intervals.push(interval),
            Err(error) => decoded.skipped.push(SkippedRecord {
                line,
                record: String::from_utf8_lossy(trimmed).into_owned(),
                error,
            }),
        }
    }
    Ok(decoded)
}

pub fn decode_gzip<R: Read>(reader: R) -> std::io::Result<Decoded> {
    decode(BufReader::new(MultiGzDecoder::new(reader)))
}

/// Write intervals as a gzip-compressed dataset and return the underlying writer
pub fn encode_gzip<W, I>(writer: W, intervals: I) -> std::io::Result<W>
where
    W: Write,
    I: IntoIterator<Item = Interval>,
{
    let mut encoder = GzEncoder::new(writer, Compression::default());
    for interval in intervals {
        serde_json::to_writer(&mut encoder, &RangeRecord::from(&interval))?;
        encoder.write_all(b"\n")?;
    }
    encoder.finish()
}
