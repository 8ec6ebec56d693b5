use mvcwire_frame::config::LEGACY_MAX_PROTOCOL_PAYLOAD_LENGTH;
use mvcwire_frame::{registry, PeerSendLimits, SizePolicy};

use crate::cmd::TypesArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_types, OutputFormat, TypeOutput};

pub fn run(args: TypesArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.net.config()?;
    let peer = PeerSendLimits {
        peer_max_recv_payload_length: args
            .peer_max_recv
            .unwrap_or(LEGACY_MAX_PROTOCOL_PAYLOAD_LENGTH),
        extended_messages: false,
    };

    let rows: Vec<TypeOutput> = registry()
        .iter()
        .map(|message_type| TypeOutput {
            command: message_type.name(),
            policy: policy_label(message_type.policy()),
            max_recv_length: message_type.max_recv_length(&config),
            max_send_length: message_type.max_send_length(&config, &peer),
        })
        .collect();

    print_types(&rows, format);
    Ok(SUCCESS)
}

fn policy_label(policy: SizePolicy) -> String {
    match policy {
        SizePolicy::Negotiated => "negotiated".to_string(),
        SizePolicy::BlockLike => "block".to_string(),
        SizePolicy::Fixed(max) => format!("fixed({max})"),
    }
}
