use std::io::Cursor;
use std::sync::Arc;

use mvcwire_frame::{
    command, header_size_for_payload, registry, FrameError, MessageReader, NetConfig,
    ReceivedMessage,
};
use mvcwire_protocol::{
    decode_addresses, decode_inventory, estimate_max_inv_elements, Protoconf, CADDR_TIME_VERSION,
};
use tracing::{debug, info};

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_messages, MessageOutput, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = Arc::new(args.net.config()?);
    let input = args.input.read(None)?;
    debug!(bytes = input.len(), network = %args.net.network, "decoding input");

    let mut reader = MessageReader::with_config(Cursor::new(input), Arc::clone(&config));
    let mut messages = Vec::new();
    let mut checksum_failures = 0usize;

    loop {
        match reader.read_message() {
            Ok(message) => messages.push(describe(&message, &config, args.payloads)),
            Err(FrameError::ConnectionClosed) if reader.pending().is_empty() => break,
            Err(err @ FrameError::ChecksumMismatch { .. }) => {
                checksum_failures += 1;
                if args.strict {
                    return Err(frame_error("decode failed", err));
                }
                messages.extend(dropped(&err));
            }
            Err(err) => {
                if err.should_ban() {
                    info!(error = %err, "input would get the sending peer banned");
                }
                print_messages(&messages, format);
                return Err(frame_error("decode failed", err));
            }
        }
    }

    print_messages(&messages, format);
    if checksum_failures > 0 {
        return Ok(DATA_INVALID);
    }
    Ok(SUCCESS)
}

fn describe(message: &ReceivedMessage, config: &NetConfig, include_payload: bool) -> MessageOutput {
    let command = message.command();
    MessageOutput {
        known: registry().contains(&command),
        block_like: registry().is_block_like(&command),
        extended: message.header.is_extended(),
        payload_size: message.header.payload_length(),
        total_length: message.total_length(),
        checksum_valid: true,
        hash: Some(message.hash.to_string()),
        details: details(&command, &message.payload, config),
        payload_hex: include_payload.then(|| hex::encode(&message.payload)),
        error: None,
        payload: message.payload.to_vec(),
        command,
    }
}

/// Output row for a message dropped on a checksum mismatch.
fn dropped(err: &FrameError) -> Option<MessageOutput> {
    let FrameError::ChecksumMismatch {
        command,
        size,
        extended,
        ..
    } = err
    else {
        return None;
    };
    Some(MessageOutput {
        command: command.clone(),
        known: registry().contains(command),
        block_like: registry().is_block_like(command),
        extended: *extended,
        payload_size: *size,
        total_length: header_size_for_payload(*size) as u64 + *size,
        checksum_valid: false,
        hash: None,
        details: None,
        payload_hex: None,
        error: Some(err.to_string()),
        payload: Vec::new(),
    })
}

/// Short summary of payloads whose layout is known.
fn details(name: &str, payload: &[u8], config: &NetConfig) -> Option<String> {
    let mut src = payload;
    match name {
        command::PROTOCONF => Some(match Protoconf::decode(&mut src, config) {
            Ok(protoconf) => format!(
                "max_recv={} policies={}",
                protoconf.max_recv_payload_length,
                protoconf.stream_policies.as_deref().unwrap_or("-")
            ),
            Err(err) => format!("invalid protoconf: {err}"),
        }),
        command::INV | command::GETDATA | command::NOTFOUND => {
            let max = estimate_max_inv_elements(payload.len() as u64 + 8);
            Some(match decode_inventory(&mut src, max) {
                Ok(items) => match items.first() {
                    Some(first) => format!("{} items, first {first}", items.len()),
                    None => "0 items".to_string(),
                },
                Err(err) => format!("invalid inventory: {err}"),
            })
        }
        command::ADDR => Some(match decode_addresses(&mut src, CADDR_TIME_VERSION) {
            Ok(records) => format!("{} addresses", records.len()),
            Err(err) => format!("invalid addr: {err}"),
        }),
        _ => None,
    }
}
