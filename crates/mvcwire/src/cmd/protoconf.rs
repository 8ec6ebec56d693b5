use mvcwire_protocol::{Protoconf, ProtoconfNegotiator};
use tracing::debug;

use crate::cmd::{ProtoconfAction, ProtoconfArgs, ProtoconfDecodeArgs, ProtoconfEncodeArgs};
use crate::exit::{protocol_error, CliResult, SUCCESS};
use crate::output::{print_protoconf, OutputFormat, ProtoconfOutput};

pub fn run(args: ProtoconfArgs, format: OutputFormat) -> CliResult<i32> {
    match args.action {
        ProtoconfAction::Encode(args) => encode(args, format),
        ProtoconfAction::Decode(args) => decode(args, format),
    }
}

fn encode(args: ProtoconfEncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.net.config()?;
    let mut protoconf = Protoconf::from_config(&config);
    protoconf.stream_policies = Some(args.policies);
    protoconf
        .policy_names(&config)
        .map_err(|err| protocol_error("invalid stream policies", err))?;

    let mut payload = Vec::new();
    protoconf.encode(&mut payload);
    print_protoconf(
        &ProtoconfOutput {
            max_recv_payload_length: protoconf.max_recv_payload_length,
            stream_policies: protoconf.stream_policies,
            hex: hex::encode(&payload),
            peer_max_send_payload_length: None,
            peer_max_inv_elements: None,
            payload,
        },
        format,
    );
    Ok(SUCCESS)
}

fn decode(args: ProtoconfDecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.net.config()?;
    let payload = args.input.read(None)?;
    let protoconf = Protoconf::decode(&mut payload.as_slice(), &config)
        .map_err(|err| protocol_error("invalid protoconf", err))?;

    let mut negotiator = ProtoconfNegotiator::new(&config);
    let limits = negotiator
        .receive(&protoconf, &config)
        .map_err(|err| protocol_error("protoconf rejected", err))?
        .clone();
    debug!(policies = ?limits.stream_policies, "protoconf decoded");

    print_protoconf(
        &ProtoconfOutput {
            max_recv_payload_length: protoconf.max_recv_payload_length,
            stream_policies: protoconf.stream_policies,
            hex: hex::encode(&payload),
            peer_max_send_payload_length: Some(limits.max_send_payload_length),
            peer_max_inv_elements: Some(limits.max_inv_elements),
            payload,
        },
        format,
    );
    Ok(SUCCESS)
}
