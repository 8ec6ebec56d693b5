use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

/// Bytes of payload shown in table and pretty output.
const PREVIEW_BYTES: usize = 32;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One framed message found in the input, or the reason it was dropped.
#[derive(Serialize, Debug)]
pub struct MessageOutput {
    pub command: String,
    pub known: bool,
    pub block_like: bool,
    pub extended: bool,
    pub payload_size: u64,
    pub total_length: u64,
    pub checksum_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_hex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub payload: Vec<u8>,
}

#[derive(Serialize, Debug)]
pub struct TypeOutput {
    pub command: &'static str,
    pub policy: String,
    pub max_recv_length: u64,
    pub max_send_length: u64,
}

#[derive(Serialize, Debug)]
pub struct EncodedOutput {
    pub command: String,
    pub payload_size: usize,
    pub wire_size: usize,
    pub extended: bool,
    pub hex: String,
    #[serde(skip)]
    pub wire: Vec<u8>,
}

#[derive(Serialize, Debug)]
pub struct ProtoconfOutput {
    pub max_recv_payload_length: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_policies: Option<String>,
    pub hex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_max_send_payload_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_max_inv_elements: Option<u64>,
    #[serde(skip)]
    pub payload: Vec<u8>,
}

pub fn print_messages(messages: &[MessageOutput], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&messages),
        OutputFormat::Table => {
            let mut table = new_table(vec!["COMMAND", "SIZE", "EXT", "CHECKSUM", "DETAILS"]);
            for msg in messages {
                table.add_row(vec![
                    command_label(msg),
                    msg.payload_size.to_string(),
                    yes_no(msg.extended).to_string(),
                    if msg.checksum_valid { "ok" } else { "BAD" }.to_string(),
                    msg.details
                        .clone()
                        .or_else(|| msg.error.clone())
                        .unwrap_or_else(|| payload_preview(&msg.payload)),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for msg in messages {
                match &msg.error {
                    Some(error) => println!("{} size={} error={error}", command_label(msg), msg.payload_size),
                    None => println!(
                        "{} size={} total={} hash={} {}",
                        command_label(msg),
                        msg.payload_size,
                        msg.total_length,
                        msg.hash.as_deref().unwrap_or("-"),
                        msg.details
                            .clone()
                            .unwrap_or_else(|| payload_preview(&msg.payload)),
                    ),
                }
            }
        }
        OutputFormat::Raw => {
            for msg in messages {
                print_raw(&msg.payload);
            }
        }
    }
}

pub fn print_types(types: &[TypeOutput], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&types),
        OutputFormat::Table => {
            let mut table = new_table(vec!["COMMAND", "POLICY", "MAX RECV", "MAX SEND"]);
            for row in types {
                table.add_row(vec![
                    row.command.to_string(),
                    row.policy.clone(),
                    row.max_recv_length.to_string(),
                    row.max_send_length.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for row in types {
                println!(
                    "{:<12} {:<10} recv<={} send<={}",
                    row.command, row.policy, row.max_recv_length, row.max_send_length
                );
            }
        }
    }
}

pub fn print_encoded(encoded: &EncodedOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(encoded),
        OutputFormat::Table => {
            let mut table = new_table(vec!["COMMAND", "SIZE", "WIRE", "HEX"]);
            table.add_row(vec![
                encoded.command.clone(),
                encoded.payload_size.to_string(),
                encoded.wire_size.to_string(),
                encoded.hex.clone(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", encoded.hex),
        OutputFormat::Raw => print_raw(&encoded.wire),
    }
}

pub fn print_protoconf(protoconf: &ProtoconfOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(protoconf),
        OutputFormat::Table => {
            let mut table = new_table(vec!["FIELD", "VALUE"]);
            table.add_row(vec![
                "max_recv_payload_length".to_string(),
                protoconf.max_recv_payload_length.to_string(),
            ]);
            table.add_row(vec![
                "stream_policies".to_string(),
                protoconf.stream_policies.clone().unwrap_or_else(|| "-".to_string()),
            ]);
            if let Some(max) = protoconf.peer_max_send_payload_length {
                table.add_row(vec!["peer_max_send_payload_length".to_string(), max.to_string()]);
            }
            if let Some(max) = protoconf.peer_max_inv_elements {
                table.add_row(vec!["peer_max_inv_elements".to_string(), max.to_string()]);
            }
            table.add_row(vec!["hex".to_string(), protoconf.hex.clone()]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!(
            "max_recv={} policies={} hex={}",
            protoconf.max_recv_payload_length,
            protoconf.stream_policies.as_deref().unwrap_or("-"),
            protoconf.hex
        ),
        OutputFormat::Raw => print_raw(&protoconf.payload),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn command_label(msg: &MessageOutput) -> String {
    if msg.known {
        msg.command.clone()
    } else {
        format!("{} (unknown)", msg.command)
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn payload_preview(payload: &[u8]) -> String {
    if payload.is_empty() {
        return String::new();
    }
    let shown = &payload[..payload.len().min(PREVIEW_BYTES)];
    if payload.len() > PREVIEW_BYTES {
        format!("{}…", hex::encode(shown))
    } else {
        hex::encode(shown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_long_payloads() {
        assert_eq!(payload_preview(&[]), "");
        assert_eq!(payload_preview(&[0xab, 0xcd]), "abcd");

        let long = vec![0x11; PREVIEW_BYTES + 1];
        let preview = payload_preview(&long);
        assert!(preview.ends_with('…'));
        assert_eq!(preview.chars().count(), PREVIEW_BYTES * 2 + 1);
    }
}
