//! Dump command implementation.

use super::{hex_encode, open_log, CliResult};
use keel_core::wal::OperationLog;
use keel_core::HashTableOperation;
use serde::Serialize;
use std::path::Path;

/// Output format for dumped records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    /// One line per record.
    Text,
    /// Pretty-printed JSON array.
    Json,
}

/// Log record representation for output.
#[derive(Debug, Serialize)]
pub struct RecordInfo {
    /// Offset of the frame in the log.
    pub offset: u64,
    /// Record kind.
    pub kind: &'static str,
    /// Table the record applies to.
    pub table: String,
    /// Epoch of the operation unit.
    pub epoch: u64,
    /// Counter of the operation unit.
    pub counter: u64,
    /// Key, hex-encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// New value size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_size: Option<usize>,
    /// Previous value size in bytes, when the key was present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value_size: Option<usize>,
    /// Engine version of a created table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<u32>,
    /// Capacity before a resize.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_capacity: Option<u64>,
    /// Capacity after a resize.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_capacity: Option<u64>,
}

impl RecordInfo {
    fn new(offset: u64, op: &HashTableOperation) -> Self {
        let unit = op.operation_unit_id();
        let mut info = Self {
            offset,
            kind: op.kind().label(),
            table: op.name().to_owned(),
            epoch: unit.epoch(),
            counter: unit.counter(),
            key: None,
            value_size: None,
            old_value_size: None,
            engine_version: None,
            old_capacity: None,
            new_capacity: None,
        };
        match op {
            HashTableOperation::Create(create) => {
                info.engine_version = Some(create.engine_version);
            }
            HashTableOperation::Put(put) => {
                info.key = Some(hex_encode(&put.key));
                info.value_size = Some(put.value.len());
                info.old_value_size = put.old_value.as_ref().map(Vec::len);
            }
            HashTableOperation::Remove(remove) => {
                info.key = Some(hex_encode(&remove.key));
                info.old_value_size = remove.old_value.as_ref().map(Vec::len);
            }
            HashTableOperation::Resize(resize) => {
                info.old_capacity = Some(resize.old_capacity);
                info.new_capacity = Some(resize.new_capacity);
            }
        }
        info
    }
}

/// Runs the dump command.
pub fn run(path: &Path, limit: Option<usize>, start_offset: u64, format: Format) -> CliResult<()> {
    let log = open_log(path)?;
    let records = read_records(&log, start_offset, limit)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        Format::Text => print_text_output(&records),
    }
    Ok(())
}

/// Decodes up to `limit` records at or after `start_offset`.
///
/// Stops quietly at a torn tail; corruption is an error.
pub fn read_records(
    log: &OperationLog,
    start_offset: u64,
    limit: Option<usize>,
) -> CliResult<Vec<RecordInfo>> {
    let max_records = limit.unwrap_or(usize::MAX);
    let mut records = Vec::new();

    for item in log.scan()? {
        if records.len() >= max_records {
            break;
        }
        let (offset, op) = item?;
        if offset >= start_offset {
            records.push(RecordInfo::new(offset, &op));
        }
    }
    Ok(records)
}

fn print_text_output(records: &[RecordInfo]) {
    println!("Log Records ({} total)", records.len());
    println!("================");
    println!();

    for record in records {
        print!(
            "[{:08}] {:7} {} unit={}.{}",
            record.offset, record.kind, record.table, record.epoch, record.counter
        );

        if let Some(ref key) = record.key {
            print!(" key={}", key);
        }
        if let Some(size) = record.value_size {
            print!(" value={} bytes", size);
        }
        if let Some(size) = record.old_value_size {
            print!(" old={} bytes", size);
        }
        if let Some(version) = record.engine_version {
            print!(" version={}", version);
        }
        if let (Some(old), Some(new)) = (record.old_capacity, record.new_capacity) {
            print!(" capacity={}->{}", old, new);
        }

        println!();
    }
}
