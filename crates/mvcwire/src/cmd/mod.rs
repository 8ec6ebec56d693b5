use std::io::Read;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use mvcwire_frame::{NetConfig, Network};

use crate::exit::{frame_error, hex_error, io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod protoconf;
pub mod types;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode framed messages from wire bytes.
    Decode(DecodeArgs),
    /// Frame a payload under a command.
    Encode(EncodeArgs),
    /// List registered message types and their size limits.
    Types(TypesArgs),
    /// Encode or decode a protoconf payload.
    Protoconf(ProtoconfArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Types(args) => types::run(args, format),
        Command::Protoconf(args) => protoconf::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Network and limit flags shared by the commands that frame messages.
#[derive(Args, Debug, Clone)]
pub struct NetArgs {
    /// Network whose magic bytes are expected and written.
    #[arg(long, short = 'n', default_value = "main", env = "MVCWIRE_NETWORK")]
    pub network: Network,
    /// Largest non-block payload accepted (bytes).
    #[arg(long, value_name = "BYTES")]
    pub max_recv_payload_length: Option<u64>,
    /// Absolute ceiling for block-like messages (bytes).
    #[arg(long, value_name = "BYTES")]
    pub max_block_message_length: Option<u64>,
}

impl NetArgs {
    pub fn config(&self) -> CliResult<NetConfig> {
        let mut config = NetConfig::for_network(self.network);
        if let Some(max) = self.max_recv_payload_length {
            config.max_recv_payload_length = max;
        }
        if let Some(max) = self.max_block_message_length {
            config.max_block_message_length = max;
        }
        config
            .validate()
            .map_err(|err| frame_error("invalid configuration", err))?;
        Ok(config)
    }
}

/// Where a command reads its input bytes from.
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Input given inline as hex.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Input given inline as a UTF-8 string.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Read input from a file ("-" for stdin).
    #[arg(long, conflicts_with_all = ["hex", "data"])]
    pub file: Option<PathBuf>,
    /// Treat file or stdin contents as hex text.
    #[arg(long)]
    pub hex_input: bool,
}

impl InputArgs {
    /// Resolve the input bytes. With no source given, `default` is used.
    pub fn read(&self, default: Option<&[u8]>) -> CliResult<Vec<u8>> {
        if let Some(hex) = &self.hex {
            return decode_hex(hex);
        }
        if let Some(data) = &self.data {
            return Ok(data.as_bytes().to_vec());
        }
        let raw = match (&self.file, default) {
            (Some(path), _) if path.as_os_str() == "-" => read_stdin()?,
            (Some(path), _) => std::fs::read(path).map_err(|err| {
                io_error(&format!("failed reading {}", path.display()), err)
            })?,
            (None, Some(default)) => return Ok(default.to_vec()),
            (None, None) => read_stdin()?,
        };
        if self.hex_input {
            let text = String::from_utf8(raw)
                .map_err(|_| CliError::new(USAGE, "hex input is not valid UTF-8"))?;
            return decode_hex(&text);
        }
        Ok(raw)
    }
}

pub fn decode_hex(input: &str) -> CliResult<Vec<u8>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let compact = compact.strip_prefix("0x").unwrap_or(&compact);
    hex::decode(compact).map_err(|err| hex_error("invalid hex input", err))
}

fn read_stdin() -> CliResult<Vec<u8>> {
    let mut buf = Vec::new();
    std::io::stdin()
        .read_to_end(&mut buf)
        .map_err(|err| io_error("failed reading stdin", err))?;
    Ok(buf)
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    #[command(flatten)]
    pub net: NetArgs,
    #[command(flatten)]
    pub input: InputArgs,
    /// Include the full payload as hex in the output.
    #[arg(long)]
    pub payloads: bool,
    /// Stop at the first message with a bad checksum.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Command name (at most 12 ASCII characters).
    pub command: String,
    #[command(flatten)]
    pub net: NetArgs,
    #[command(flatten)]
    pub input: InputArgs,
    /// Receive limit advertised by the peer (bytes); legacy limit if unset.
    #[arg(long, value_name = "BYTES")]
    pub peer_max_recv: Option<u64>,
    /// Peer understands extended headers.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug)]
pub struct TypesArgs {
    #[command(flatten)]
    pub net: NetArgs,
    /// Receive limit advertised by the peer (bytes); legacy limit if unset.
    #[arg(long, value_name = "BYTES")]
    pub peer_max_recv: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ProtoconfArgs {
    #[command(subcommand)]
    pub action: ProtoconfAction,
}

#[derive(Subcommand, Debug)]
pub enum ProtoconfAction {
    /// Build a protoconf payload.
    Encode(ProtoconfEncodeArgs),
    /// Decode a protoconf payload and show the limits it implies.
    Decode(ProtoconfDecodeArgs),
}

#[derive(Args, Debug)]
pub struct ProtoconfEncodeArgs {
    #[command(flatten)]
    pub net: NetArgs,
    /// Comma-separated stream policy names.
    #[arg(long, default_value = mvcwire_protocol::DEFAULT_STREAM_POLICY)]
    pub policies: String,
}

#[derive(Args, Debug)]
pub struct ProtoconfDecodeArgs {
    #[command(flatten)]
    pub net: NetArgs,
    #[command(flatten)]
    pub input: InputArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build information.
    #[arg(long)]
    pub extended: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_input_tolerates_prefix_and_whitespace() {
        assert_eq!(decode_hex("0xde ad\nbe ef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(decode_hex("").unwrap(), Vec::<u8>::new());
        assert_eq!(decode_hex("abc").unwrap_err().code, USAGE);
    }

    #[test]
    fn net_args_build_validated_config() {
        let args = NetArgs {
            network: Network::Regtest,
            max_recv_payload_length: Some(4 * 1024 * 1024),
            max_block_message_length: None,
        };
        let config = args.config().unwrap();
        assert_eq!(config.magic, Network::Regtest.magic());
        assert_eq!(config.max_recv_payload_length, 4 * 1024 * 1024);

        let bad = NetArgs {
            max_recv_payload_length: Some(10),
            ..args
        };
        assert_eq!(bad.config().unwrap_err().code, USAGE);
    }

    #[test]
    fn inline_input_wins_over_default() {
        let input = InputArgs {
            hex: None,
            data: Some("abc".into()),
            file: None,
            hex_input: false,
        };
        assert_eq!(input.read(Some(&b"zzz"[..])).unwrap(), b"abc");

        let empty = InputArgs {
            hex: None,
            data: None,
            file: None,
            hex_input: false,
        };
        assert_eq!(empty.read(Some(&b""[..])).unwrap(), Vec::<u8>::new());
    }
}
