use cvarlink_channel::MAX_COMMAND_LEN;
use cvarlink_transport::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_PAYLOAD, DEFAULT_PACE, MAX_CHUNK_LEN};
use serde::Serialize;

use crate::cmd::EnvinfoArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_json, schema_id, OutputFormat};

const LOG_LEVEL_ENV: &str = "CVARLINK_LOG_LEVEL";

/// Protocol limits compiled into this build.
#[derive(Serialize, Debug, PartialEq, Eq)]
struct Limits {
    max_command_len: usize,
    max_chunk_len: usize,
    default_chunk_size: usize,
    default_pace_ms: u128,
    max_payload: usize,
}

impl Limits {
    fn current() -> Self {
        Self {
            max_command_len: MAX_COMMAND_LEN,
            max_chunk_len: MAX_CHUNK_LEN,
            default_chunk_size: DEFAULT_CHUNK_SIZE,
            default_pace_ms: DEFAULT_PACE.as_millis(),
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

#[derive(Serialize)]
struct EnvInfoOutput {
    schema_id: String,
    version: &'static str,
    target: &'static str,
    limits: Limits,
    log_level: Option<String>,
}

pub fn run(_args: EnvinfoArgs, format: OutputFormat) -> CliResult<i32> {
    let output = EnvInfoOutput {
        schema_id: schema_id("envinfo"),
        version: env!("CARGO_PKG_VERSION"),
        target: option_env!("CVARLINK_BUILD_TARGET").unwrap_or("unknown"),
        limits: Limits::current(),
        log_level: std::env::var(LOG_LEVEL_ENV).ok(),
    };

    match format {
        OutputFormat::Json => print_json(&output),
        OutputFormat::Table | OutputFormat::Pretty => {
            let limits = &output.limits;
            println!("cvarlink {} ({})\n", output.version, output.target);
            println!("  max command length   {}", limits.max_command_len);
            println!("  max chunk length     {}", limits.max_chunk_len);
            println!("  default chunk size   {}", limits.default_chunk_size);
            println!("  default pace         {}ms", limits.default_pace_ms);
            println!("  max payload          {}", limits.max_payload);
            println!(
                "  {LOG_LEVEL_ENV}   {}",
                output.log_level.as_deref().unwrap_or("(not set)")
            );
        }
        OutputFormat::Raw => println!("{}", output.version),
    }
    Ok(SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_match_the_wire_protocol() {
        let limits = Limits::current();
        assert_eq!(limits.max_command_len, 255);
        assert!(limits.max_chunk_len < limits.max_command_len);
        assert_eq!(limits.default_pace_ms, 100);
    }

    #[test]
    fn json_carries_schema_id_and_limits() {
        let out = EnvInfoOutput {
            schema_id: schema_id("envinfo"),
            version: "0.1.0",
            target: "x86_64-unknown-linux-gnu",
            limits: Limits::current(),
            log_level: None,
        };
        let json = serde_json::to_value(&out).expect("envinfo output should serialize");
        assert!(json["schema_id"]
            .as_str()
            .is_some_and(|id| id.ends_with("envinfo.schema.json")));
        assert_eq!(json["limits"]["max_chunk_len"], 250);
        assert!(json["log_level"].is_null());
    }
}
