use std::sync::Arc;

use mvcwire_frame::config::LEGACY_MAX_PROTOCOL_PAYLOAD_LENGTH;
use mvcwire_frame::header::is_extended_length;
use mvcwire_frame::{MessageWriter, PeerSendLimits};
use tracing::debug;

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_encoded, EncodedOutput, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = Arc::new(args.net.config()?);
    let payload = args.input.read(Some(&[]))?;

    let mut writer = MessageWriter::with_config(Vec::new(), config);
    writer.set_peer_limits(PeerSendLimits {
        peer_max_recv_payload_length: args
            .peer_max_recv
            .unwrap_or(LEGACY_MAX_PROTOCOL_PAYLOAD_LENGTH),
        extended_messages: args.extended,
    });
    writer
        .send(&args.command, &payload)
        .map_err(|err| frame_error("encode failed", err))?;

    let wire = writer.into_inner();
    debug!(command = %args.command, wire_size = wire.len(), "message framed");
    let out = EncodedOutput {
        command: args.command,
        payload_size: payload.len(),
        wire_size: wire.len(),
        extended: is_extended_length(payload.len() as u64),
        hex: hex::encode(&wire),
        wire,
    };
    print_encoded(&out, format);
    Ok(SUCCESS)
}
