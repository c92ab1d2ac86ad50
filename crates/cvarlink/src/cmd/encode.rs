use cvarlink_encode::{
    encode, render_cfg, CfgOptions, ChainNaming, CvarNamer, EncoderConfig, EntryPoint,
    RecordLayout,
};
use tracing::{info, warn};

use crate::cmd::{default_cfg_path, read_text, seed_label, write_text, EncodeArgs};
use crate::exit::{encode_error, CliResult, SUCCESS};
use crate::output::{print_chain, schema_id, ChainOutput, OutputFormat, RecordRow};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let document = read_text(&args.input)?;
    let label = seed_label(&args.input);
    let naming = match &args.base {
        Some(base) => ChainNaming::new(base.as_str()),
        None => CvarNamer::from_seed(&label).naming(),
    }
    .map_err(|err| encode_error("invalid base name", err))?;

    let config = EncoderConfig {
        wrapper: args.wrapper.clone(),
        ..EncoderConfig::for_cfg(args.max_len)
    };
    let chain = encode(&document, &naming, &config)
        .map_err(|err| encode_error("encode failed", err))?;
    if chain.is_empty() {
        warn!(input = %args.input.display(), "document is empty after removing the wrapper");
    }

    let options = CfgOptions {
        max_line: args.max_len,
        entry: EntryPoint::Include,
        source: Some(label),
    };
    let text = render_cfg(&chain, &options).map_err(|err| encode_error("render failed", err))?;
    let output = args.output.unwrap_or_else(|| default_cfg_path(&args.input));
    write_text(&output, &text)?;
    info!(
        output = %output.display(),
        records = chain.len(),
        base = %naming.base,
        "cfg written"
    );

    let output_display = output.display().to_string();
    print_chain(
        &ChainOutput {
            schema_id: schema_id("chain"),
            source: &args.input.display().to_string(),
            output: Some(&output_display),
            entry: chain.entry().map(|record| record.id()),
            valid: true,
            error: None,
            records: RecordRow::rows(&chain, RecordLayout::CfgSet),
        },
        format,
    );
    Ok(SUCCESS)
}
