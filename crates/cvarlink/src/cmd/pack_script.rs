use cvarlink_encode::{
    has_functions, pack_functions, pack_script, parse_script, render_scripts_cfg, CfgOptions,
    ChainNaming, CvarNamer, EntryPoint, PackedScript, ScriptPackerConfig, DEFAULT_HASH_LEN,
    SCRIPT_PREFIX,
};
use tracing::{info, warn};

use crate::cmd::{default_cfg_path, read_text, seed_label, write_text, PackScriptArgs};
use crate::exit::{encode_error, CliResult, SUCCESS};
use crate::output::{print_chain, schema_id, ChainOutput, OutputFormat, RecordRow};

/// Scripts with `function` blocks become one loadable shell per function;
/// anything else is packed into a single exec chain.
pub fn run(args: PackScriptArgs, format: OutputFormat) -> CliResult<i32> {
    let text = read_text(&args.input)?;
    let nodes = parse_script(&text).map_err(|err| encode_error("parse failed", err))?;
    let label = seed_label(&args.input);
    let config = ScriptPackerConfig {
        max_len: args.max_len,
        ..ScriptPackerConfig::default()
    };

    let (scripts, entry) = if has_functions(&nodes) {
        if args.base.is_some() {
            warn!("--base is ignored for function scripts");
        }
        let scripts = pack_functions(&nodes, &config)
            .map_err(|err| encode_error("pack failed", err))?;
        (scripts, EntryPoint::FuncLoad)
    } else {
        let naming = match &args.base {
            Some(base) => ChainNaming::new(base.as_str()),
            None => CvarNamer::with_prefix(&label, SCRIPT_PREFIX, DEFAULT_HASH_LEN).naming(),
        }
        .map_err(|err| encode_error("invalid base name", err))?;
        let script = pack_script(&nodes, &naming, &config)
            .map_err(|err| encode_error("pack failed", err))?;
        if script.main.is_empty() {
            warn!(input = %args.input.display(), "script contains no commands");
        }
        (vec![script], EntryPoint::Exec)
    };

    let options = CfgOptions {
        max_line: args.max_len,
        entry,
        source: Some(label),
    };
    let cfg =
        render_scripts_cfg(&scripts, &options).map_err(|err| encode_error("render failed", err))?;
    let output = args.output.unwrap_or_else(|| default_cfg_path(&args.input));
    write_text(&output, &cfg)?;
    let records: usize = scripts.iter().map(|s| s.records().count()).sum();
    info!(
        output = %output.display(),
        scripts = scripts.len(),
        records,
        "cfg written"
    );

    let output_display = output.display().to_string();
    print_chain(
        &ChainOutput {
            schema_id: schema_id("chain"),
            source: &args.input.display().to_string(),
            output: Some(&output_display),
            entry: scripts.first().and_then(PackedScript::entry),
            valid: true,
            error: None,
            records: RecordRow::rows(scripts.iter().flat_map(|s| s.records()), config.layout),
        },
        format,
    );
    Ok(SUCCESS)
}

#[cfg(test)]
mod tests {
    use cvarlink_encode::ScriptNode;

    use super::*;

    #[test]
    fn inline_comments_end_at_the_line() {
        let nodes = parse_script("// setup\nset a 1 // note\necho b;\n").unwrap();
        assert!(!has_functions(&nodes));
        let naming = ChainNaming::new("f_test").unwrap();
        let script = pack_script(&nodes, &naming, &ScriptPackerConfig::default()).unwrap();
        assert_eq!(script.main.reassemble().unwrap(), "set a 1; echo b");
    }

    #[test]
    fn function_scripts_are_detected() {
        let nodes = parse_script("function hello {\n  echo hi\n}\n").unwrap();
        assert!(has_functions(&nodes));
        assert!(matches!(nodes.as_slice(), [ScriptNode::Block(_)]));
    }
}
