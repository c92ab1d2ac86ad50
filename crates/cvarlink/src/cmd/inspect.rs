use cvarlink_encode::{parse_cfg, Chain, RecordLayout};
use tracing::warn;

use crate::cmd::{read_text, InspectArgs};
use crate::exit::{encode_error, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_chain, print_raw, schema_id, ChainOutput, OutputFormat, RecordRow};

/// Prints the record table, or the reassembled document with `--format raw`.
///
/// A chain that fails verification is still listed; the exit code reports it.
pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let text = read_text(&args.input)?;
    let chain = parse_cfg(&text).map_err(|err| encode_error("parse failed", err))?;
    let error = check(&chain, args.max_len);
    if let Some(error) = &error {
        warn!(input = %args.input.display(), %error, "chain check failed");
    }

    if format == OutputFormat::Raw {
        if error.is_none() {
            let document = chain
                .reassemble()
                .map_err(|err| encode_error("reassemble failed", err))?;
            print_raw(document.as_bytes());
        }
    } else {
        print_chain(
            &ChainOutput {
                schema_id: schema_id("chain"),
                source: &args.input.display().to_string(),
                output: None,
                entry: chain.entry().map(|record| record.id()),
                valid: error.is_none(),
                error: error.clone(),
                records: RecordRow::rows(&chain, RecordLayout::CfgSet),
            },
            format,
        );
    }

    Ok(if error.is_some() { DATA_INVALID } else { SUCCESS })
}

fn check(chain: &Chain, max_len: usize) -> Option<String> {
    if chain.is_empty() {
        return Some("no records found".to_string());
    }
    chain
        .verify(max_len, RecordLayout::CfgSet)
        .err()
        .map(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use cvarlink_encode::{encode, render_cfg, CfgOptions, ChainNaming, EncoderConfig};

    use super::*;

    #[test]
    fn generated_cfg_passes_check() {
        let naming = ChainNaming::new("m_test").unwrap();
        let chain = encode(
            &"<text>hello world</text>".repeat(40),
            &naming,
            &EncoderConfig::for_cfg(120),
        )
        .unwrap();
        let cfg = render_cfg(
            &chain,
            &CfgOptions {
                max_line: 120,
                ..CfgOptions::default()
            },
        )
        .unwrap();

        let parsed = parse_cfg(&cfg).unwrap();
        assert_eq!(check(&parsed, 120), None);
        assert!(check(&parsed, 60).is_some());
    }

    #[test]
    fn missing_link_is_reported() {
        let cfg = "set m_a_0 \"one<includecvar m_a_1>\"\nset m_a_2 \"two\"\n";
        let parsed = parse_cfg(cfg).unwrap();
        let error = check(&parsed, 255).unwrap();
        assert!(error.contains("unreachable"), "{error}");
    }

    #[test]
    fn empty_file_is_reported() {
        let parsed = parse_cfg("// nothing here\n").unwrap();
        assert_eq!(check(&parsed, 255).as_deref(), Some("no records found"));
    }
}
