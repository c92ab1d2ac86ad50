//! Script sources with `function NAME { ... }` blocks and control flow.
//!
//! A script is parsed into a tree of commands and brace blocks:
//!
//! ```text
//! function greet
//! {
//!   sp_sc_flow_if number cvar hp < 20 {
//!     echo "low"
//!   } else {
//!     echo ok
//!   }
//! }
//! ```
//!
//! Each function becomes a shell record `f_NAME_0` holding the function
//! text, ready for `sp_sc_func_load_cvar`. A body too large for the shell is
//! moved into an exec-linked `f_NAME_body` chain. Control-flow branches that
//! do not fit inline, or that contain quotes, run from `_autogen_` helper
//! chains instead.

use tracing::{debug, warn};

use crate::chain::{Chain, Record};
use crate::error::{EncodeError, Result};
use crate::naming::{ChainNaming, SCRIPT_PREFIX};
use crate::script::{pack_commands, ScriptPackerConfig};

/// Measured room kept beside an inlined control command.
const CONTROL_HEADROOM: usize = 80;

const FUNCTION_KEYWORD: &str = "function";
const IF_KEYWORD: &str = "sp_sc_flow_if";
const WHILE_KEYWORD: &str = "sp_sc_flow_while";
const ELSE_KEYWORD: &str = "else";
const ANONYMOUS: &str = "anonymous";

/// Kind of a brace block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Function,
    If,
    While,
}

impl BlockKind {
    fn of_header(header: &str) -> Option<Self> {
        let keyword = header.split_whitespace().next()?;
        match keyword {
            FUNCTION_KEYWORD => Some(BlockKind::Function),
            _ if header.starts_with(IF_KEYWORD) => Some(BlockKind::If),
            _ if header.starts_with(WHILE_KEYWORD) => Some(BlockKind::While),
            _ => None,
        }
    }
}

/// A header followed by a brace-delimited body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    /// Header text before the opening brace, e.g. `function greet`.
    pub header: String,
    pub body: Vec<ScriptNode>,
    /// `else` branch of an `sp_sc_flow_if` block.
    pub otherwise: Option<Vec<ScriptNode>>,
    /// Source line of the header.
    pub line: usize,
}

impl Block {
    /// Function name from a `function NAME` header; `anonymous` if missing.
    pub fn function_name(&self) -> &str {
        let rest = self
            .header
            .strip_prefix(FUNCTION_KEYWORD)
            .unwrap_or(&self.header)
            .trim_start();
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        match &rest[..end] {
            "" => ANONYMOUS,
            name => name,
        }
    }
}

/// One element of a parsed script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptNode {
    /// A command line, possibly holding several `; `-separated commands.
    Command(String),
    Block(Block),
}

/// Remove a `//` comment that starts outside double quotes, then trim.
pub fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut in_quote = false;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' => in_quote = !in_quote,
            b'/' if !in_quote && bytes.get(i + 1) == Some(&b'/') => return line[..i].trim(),
            _ => {}
        }
    }
    line.trim()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Text(String),
    Open,
    Close,
}

/// Split comment-free lines into text and braces found outside quotes.
fn lex(source: &str) -> Vec<(usize, Item)> {
    let mut items = Vec::new();
    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let text = strip_comment(raw);
        let push_text = |piece: &str, items: &mut Vec<(usize, Item)>| {
            let piece = piece.trim().trim_end_matches(';').trim_end();
            if !piece.is_empty() {
                items.push((line, Item::Text(piece.to_string())));
            }
        };

        let mut in_quote = false;
        let mut start = 0usize;
        for (i, c) in text.char_indices() {
            match c {
                '"' => in_quote = !in_quote,
                '{' | '}' if !in_quote => {
                    push_text(&text[start..i], &mut items);
                    items.push((line, if c == '{' { Item::Open } else { Item::Close }));
                    start = i + 1;
                }
                _ => {}
            }
        }
        push_text(&text[start..], &mut items);
    }
    items
}

struct Parser {
    items: Vec<(usize, Item)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Item> {
        self.items.get(self.pos).map(|(_, item)| item)
    }

    /// Nodes up to the `}` closing a block opened on line `opened`, or up to
    /// the end of input at top level.
    fn nodes(&mut self, opened: Option<usize>) -> Result<Vec<ScriptNode>> {
        let mut nodes = Vec::new();
        loop {
            let Some((line, item)) = self.items.get(self.pos).cloned() else {
                return match opened {
                    None => Ok(nodes),
                    Some(line) => Err(EncodeError::MalformedScript {
                        line,
                        reason: "unclosed `{`",
                    }),
                };
            };
            self.pos += 1;

            let text = match item {
                Item::Close if opened.is_some() => return Ok(nodes),
                Item::Close => {
                    return Err(EncodeError::MalformedScript {
                        line,
                        reason: "unmatched `}`",
                    })
                }
                Item::Open => {
                    return Err(EncodeError::MalformedScript {
                        line,
                        reason: "`{` without a block header",
                    })
                }
                Item::Text(text) => text,
            };

            let kind = match BlockKind::of_header(&text) {
                Some(kind) if self.peek() == Some(&Item::Open) => kind,
                _ => {
                    nodes.push(ScriptNode::Command(text));
                    continue;
                }
            };
            self.pos += 1;
            let body = self.nodes(Some(line))?;
            let otherwise = if kind == BlockKind::If && self.peek_else() {
                self.pos += 1;
                if self.peek() != Some(&Item::Open) {
                    return Err(EncodeError::MalformedScript {
                        line,
                        reason: "`else` without a `{` block",
                    });
                }
                self.pos += 1;
                Some(self.nodes(Some(line))?)
            } else {
                None
            };
            nodes.push(ScriptNode::Block(Block {
                kind,
                header: text,
                body,
                otherwise,
                line,
            }));
        }
    }

    fn peek_else(&self) -> bool {
        matches!(self.peek(), Some(Item::Text(text)) if text == ELSE_KEYWORD)
    }
}

/// Parse a script into commands and brace blocks.
///
/// `//` comments outside quotes are removed and trailing `;` on a line is
/// dropped. A block header may carry its `{` on the same line or the next.
/// A header not followed by `{` is kept as a plain command.
pub fn parse_script(source: &str) -> Result<Vec<ScriptNode>> {
    let mut parser = Parser {
        items: lex(source),
        pos: 0,
    };
    parser.nodes(None)
}

/// Whether any top-level node is a function block.
pub fn has_functions(nodes: &[ScriptNode]) -> bool {
    nodes
        .iter()
        .any(|node| matches!(node, ScriptNode::Block(b) if b.kind == BlockKind::Function))
}

/// Records generated for one entry point and the chains it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedScript {
    /// Function name, or the chain base for a plain script.
    pub name: String,
    /// Entry chain: the one-record function shell, or the exec chain of a
    /// plain script.
    pub main: Chain,
    /// Exec chain holding a function body moved out of its shell.
    pub body: Option<Chain>,
    /// Exec chains running control-flow branches.
    pub helpers: Vec<Chain>,
}

impl PackedScript {
    /// Identifier of the entry record.
    pub fn entry(&self) -> Option<&str> {
        self.main.entry().map(Record::id)
    }

    /// Every record: main chain, then body, then helpers.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.main
            .iter()
            .chain(self.body.iter().flat_map(Chain::iter))
            .chain(self.helpers.iter().flat_map(Chain::iter))
    }

    /// Every chain, in [`records`](Self::records) order.
    pub fn chains(&self) -> impl Iterator<Item = &Chain> {
        std::iter::once(&self.main)
            .chain(self.body.iter())
            .chain(self.helpers.iter())
    }
}

/// Compiles nodes to `; `-separated commands, spilling branches to helpers.
struct Compiler<'a> {
    config: &'a ScriptPackerConfig,
    helper_base: String,
    helpers: Vec<Chain>,
}

impl<'a> Compiler<'a> {
    fn new(config: &'a ScriptPackerConfig, owner: &str) -> Self {
        Self {
            config,
            helper_base: format!("{owner}_autogen"),
            helpers: Vec::new(),
        }
    }

    fn commands(&mut self, nodes: &[ScriptNode]) -> Result<String> {
        let mut commands = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                ScriptNode::Command(command) => commands.push(command.clone()),
                ScriptNode::Block(block) => commands.push(self.control(block)?),
            }
        }
        Ok(commands.join("; "))
    }

    /// `HEADER "THEN" ["ELSE"]` with oversized or quoted branches replaced
    /// by `sp_sc_exec_cvar HELPER`.
    fn control(&mut self, block: &Block) -> Result<String> {
        if block.kind == BlockKind::Function {
            return Err(EncodeError::MalformedScript {
                line: block.line,
                reason: "nested function",
            });
        }
        let mut branches = [self.commands(&block.body)?, String::new()];
        if let Some(otherwise) = &block.otherwise {
            branches[1] = self.commands(otherwise)?;
        }
        let mut spilled = [false; 2];

        // A quoted argument cannot hold raw quotes.
        for i in 0..2 {
            if branches[i].contains('"') {
                branches[i] = self.helper(&branches[i])?;
                spilled[i] = true;
            }
        }

        let layout = self.config.layout;
        let limit = self.config.max_len.saturating_sub(CONTROL_HEADROOM);
        loop {
            let inline = control_command(&block.header, &branches);
            if layout.measure(&inline) <= limit {
                return Ok(inline);
            }
            let largest = (0..2)
                .filter(|&i| !spilled[i] && !branches[i].is_empty())
                .max_by_key(|&i| (layout.measure(&branches[i]), usize::from(i == 0)));
            let Some(i) = largest else {
                // pack_commands reports the oversized command.
                return Ok(inline);
            };
            branches[i] = self.helper(&branches[i])?;
            spilled[i] = true;
        }
    }

    fn helper(&mut self, command: &str) -> Result<String> {
        if command.is_empty() {
            return Ok(String::new());
        }
        let naming = ChainNaming::new(format!("{}_{}", self.helper_base, self.helpers.len()))?;
        let chain = pack_commands(command, &naming, self.config)?;
        let entry = naming.id(0);
        debug!(helper = %entry, records = chain.len(), "branch moved to helper");
        self.helpers.push(chain);
        Ok(format!("sp_sc_exec_cvar {entry}"))
    }
}

fn control_command(header: &str, [then, otherwise]: &[String; 2]) -> String {
    if otherwise.is_empty() {
        format!("{header} \"{then}\"")
    } else {
        format!("{header} \"{then}\" \"{otherwise}\"")
    }
}

/// Multi-line brace form of `nodes`, as written inside a function shell.
fn block_text(nodes: &[ScriptNode], depth: usize, out: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    for node in nodes {
        match node {
            ScriptNode::Command(command) => out.push(format!("{indent}{command}")),
            ScriptNode::Block(block) => {
                out.push(format!("{indent}{}", block.header));
                out.push(format!("{indent}{{"));
                block_text(&block.body, depth + 1, out);
                out.push(format!("{indent}}}"));
                if let Some(otherwise) = &block.otherwise {
                    out.push(format!("{indent}{ELSE_KEYWORD}"));
                    out.push(format!("{indent}{{"));
                    block_text(otherwise, depth + 1, out);
                    out.push(format!("{indent}}}"));
                }
            }
        }
    }
}

/// Line of the first function block nested anywhere in `nodes`.
fn nested_function(nodes: &[ScriptNode]) -> Option<usize> {
    nodes.iter().find_map(|node| match node {
        ScriptNode::Block(block) if block.kind == BlockKind::Function => Some(block.line),
        ScriptNode::Block(block) => nested_function(&block.body)
            .or_else(|| block.otherwise.as_deref().and_then(nested_function)),
        ScriptNode::Command(_) => None,
    })
}

/// Pack a function block into its shell record, body chain and helpers.
///
/// The body is inlined in brace form when the shell still fits
/// `config.max_len`; otherwise the shell runs `sp_sc_exec_cvar f_NAME_body_0`.
pub fn pack_function(block: &Block, config: &ScriptPackerConfig) -> Result<PackedScript> {
    if let Some(line) = nested_function(&block.body) {
        return Err(EncodeError::MalformedScript {
            line,
            reason: "nested function",
        });
    }
    let name = block.function_name().to_string();
    let base = format!("{SCRIPT_PREFIX}{name}");
    let shell_id = ChainNaming::new(base.as_str())?.id(0);
    let layout = config.layout;
    let prefix = format!("{}\n{{\n", block.header);
    let suffix = "\n}";

    if block.body.is_empty() {
        let shell = Record::terminal(shell_id, format!("{}\n{{\n}}", block.header));
        return Ok(PackedScript {
            name,
            main: Chain::new(vec![shell]),
            body: None,
            helpers: Vec::new(),
        });
    }

    let available = config
        .max_len
        .saturating_sub(layout.overhead(&shell_id))
        .saturating_sub(layout.measure(&prefix) + layout.measure(suffix));
    let mut lines = Vec::new();
    block_text(&block.body, 1, &mut lines);
    let inline = lines.join("\n");

    let mut compiler = Compiler::new(config, &base);
    let (shell, body) = if layout.measure(&inline) <= available {
        (format!("{prefix}{inline}{suffix}"), None)
    } else {
        let commands = compiler.commands(&block.body)?;
        let naming = ChainNaming::new(format!("{base}_body"))?;
        let body = pack_commands(&commands, &naming, config)?;
        let shell = format!("{prefix}  sp_sc_exec_cvar {}{suffix}", naming.id(0));
        if layout.measure(&shell) + layout.overhead(&shell_id) > config.max_len {
            return Err(EncodeError::FunctionTooLarge { name });
        }
        (shell, Some(body))
    };

    let packed = PackedScript {
        name,
        main: Chain::new(vec![Record::terminal(shell_id, shell)]),
        body,
        helpers: compiler.helpers,
    };
    debug!(
        function = %packed.name,
        inlined = packed.body.is_none(),
        helpers = packed.helpers.len(),
        "function packed"
    );
    Ok(packed)
}

/// Pack every top-level function of a parsed script.
///
/// Top-level commands outside functions are skipped with a warning. Two
/// functions with the same name are an error.
pub fn pack_functions(nodes: &[ScriptNode], config: &ScriptPackerConfig) -> Result<Vec<PackedScript>> {
    let mut packed: Vec<PackedScript> = Vec::new();
    for node in nodes {
        match node {
            ScriptNode::Block(block) if block.kind == BlockKind::Function => {
                let function = pack_function(block, config)?;
                if packed.iter().any(|p| p.name == function.name) {
                    return Err(EncodeError::DuplicateFunction(function.name));
                }
                packed.push(function);
            }
            ScriptNode::Block(block) => {
                warn!(line = block.line, header = %block.header, "block outside function skipped");
            }
            ScriptNode::Command(command) => {
                warn!(command = %command, "command outside function skipped");
            }
        }
    }
    Ok(packed)
}

/// Pack a script without functions into one exec chain named by `naming`.
///
/// Control blocks become quoted `sp_sc_flow_*` commands; branches that do
/// not fit run from `{base}_autogen_N` helper chains.
pub fn pack_script(
    nodes: &[ScriptNode],
    naming: &ChainNaming,
    config: &ScriptPackerConfig,
) -> Result<PackedScript> {
    let mut compiler = Compiler::new(config, &naming.base);
    let commands = compiler.commands(nodes)?;
    let main = pack_commands(&commands, naming, config)?;
    Ok(PackedScript {
        name: naming.base.clone(),
        main,
        body: None,
        helpers: compiler.helpers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(text: &str) -> ScriptNode {
        ScriptNode::Command(text.to_string())
    }

    fn only_block(nodes: &[ScriptNode]) -> &Block {
        match nodes {
            [ScriptNode::Block(block)] => block,
            other => panic!("expected one block, got {other:?}"),
        }
    }

    #[test]
    fn strips_comments_outside_quotes() {
        assert_eq!(strip_comment("set a 1 // note"), "set a 1");
        assert_eq!(strip_comment("echo \"http://x\" // c"), "echo \"http://x\"");
        assert_eq!(strip_comment("// whole line"), "");
        assert_eq!(strip_comment("  wait  "), "wait");
    }

    #[test]
    fn inline_comment_does_not_swallow_next_line() {
        let nodes = parse_script("set a 1 // note\necho b;\n").unwrap();
        assert_eq!(nodes, vec![command("set a 1"), command("echo b")]);
    }

    #[test]
    fn parses_functions_with_either_brace_style() {
        let source = "function one {\n  echo 1\n}\n\nfunction two\n{\n  echo 2\n}\n";
        let nodes = parse_script(source).unwrap();
        assert_eq!(nodes.len(), 2);
        let ScriptNode::Block(two) = &nodes[1] else {
            panic!("expected a block");
        };
        assert_eq!(two.kind, BlockKind::Function);
        assert_eq!(two.function_name(), "two");
        assert_eq!(two.body, vec![command("echo 2")]);
        assert_eq!(two.line, 5);
    }

    #[test]
    fn parses_if_else_and_while() {
        let source = "function f {\n\
                      sp_sc_flow_if number cvar hp < 20 {\n\
                      echo low\n\
                      } else {\n\
                      echo ok\n\
                      }\n\
                      sp_sc_flow_while number cvar n > 0 { set n 0 }\n\
                      }";
        let nodes = parse_script(source).unwrap();
        let f = only_block(&nodes);
        let [ScriptNode::Block(cond), ScriptNode::Block(lp)] = f.body.as_slice() else {
            panic!("expected two blocks, got {:?}", f.body);
        };
        assert_eq!(cond.kind, BlockKind::If);
        assert_eq!(cond.header, "sp_sc_flow_if number cvar hp < 20");
        assert_eq!(cond.otherwise, Some(vec![command("echo ok")]));
        assert_eq!(lp.kind, BlockKind::While);
        assert_eq!(lp.body, vec![command("set n 0")]);
    }

    #[test]
    fn braces_inside_quotes_are_text() {
        let nodes = parse_script("echo \"{not a block}\"").unwrap();
        assert_eq!(nodes, vec![command("echo \"{not a block}\"")]);
    }

    #[test]
    fn header_without_brace_is_a_command() {
        let nodes = parse_script("sp_sc_flow_if number cvar a == 1 \"echo a\"\necho b").unwrap();
        assert_eq!(nodes.len(), 2);
        assert!(!has_functions(&nodes));
    }

    #[test]
    fn unbalanced_braces_are_rejected() {
        assert!(matches!(
            parse_script("function f {\n echo\n"),
            Err(EncodeError::MalformedScript { line: 1, reason: "unclosed `{`" })
        ));
        assert!(matches!(
            parse_script("echo\n}\n"),
            Err(EncodeError::MalformedScript { line: 2, reason: "unmatched `}`" })
        ));
        assert!(matches!(
            parse_script("{ echo }"),
            Err(EncodeError::MalformedScript { line: 1, .. })
        ));
    }

    #[test]
    fn anonymous_function_name() {
        let nodes = parse_script("function {\n echo\n}").unwrap();
        assert_eq!(only_block(&nodes).function_name(), "anonymous");
        let nodes = parse_script("function add(a, b) {\n echo\n}").unwrap();
        assert_eq!(only_block(&nodes).function_name(), "add");
    }

    #[test]
    fn small_function_is_inlined_in_its_shell() {
        let nodes = parse_script("function greet {\n  echo hi\n  set seen 1\n}").unwrap();
        let packed = pack_functions(&nodes, &ScriptPackerConfig::default()).unwrap();
        assert_eq!(packed.len(), 1);
        let greet = &packed[0];
        assert_eq!(greet.entry(), Some("f_greet_0"));
        assert!(greet.body.is_none());
        assert_eq!(
            greet.main.records()[0].content(),
            "function greet\n{\n  echo hi\n  set seen 1\n}"
        );
    }

    #[test]
    fn empty_function_keeps_braces() {
        let nodes = parse_script("function noop {\n}").unwrap();
        let packed = pack_function(only_block(&nodes), &ScriptPackerConfig::default()).unwrap();
        assert_eq!(packed.main.records()[0].content(), "function noop\n{\n}");
    }

    #[test]
    fn large_function_body_moves_to_exec_chain() {
        let mut source = String::from("function big {\n");
        for i in 0..30 {
            source.push_str(&format!("  set var_{i} value_{i}\n"));
        }
        source.push('}');
        let nodes = parse_script(&source).unwrap();
        let config = ScriptPackerConfig::default();
        let packed = pack_function(only_block(&nodes), &config).unwrap();

        assert_eq!(
            packed.main.records()[0].content(),
            "function big\n{\n  sp_sc_exec_cvar f_big_body_0\n}"
        );
        let body = packed.body.as_ref().unwrap();
        assert!(body.len() > 1);
        body.verify(config.max_len, config.layout).unwrap();
        let expected = (0..30)
            .map(|i| format!("set var_{i} value_{i}"))
            .collect::<Vec<_>>()
            .join("; ");
        assert_eq!(body.reassemble().unwrap(), expected);
    }

    #[test]
    fn oversized_branch_moves_to_helper() {
        let long = (0..20)
            .map(|i| format!("set branch_{i} {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let source = format!(
            "function check {{\nsp_sc_flow_if number cvar hp < 20 {{\n{long}\n}} else {{\necho ok\n}}\n}}"
        );
        let nodes = parse_script(&source).unwrap();
        let config = ScriptPackerConfig::default();
        let packed = pack_function(only_block(&nodes), &config).unwrap();

        assert_eq!(packed.helpers.len(), 1);
        let helper = &packed.helpers[0];
        assert_eq!(helper.entry().unwrap().id(), "f_check_autogen_0_0");
        let body = packed.body.as_ref().unwrap().reassemble().unwrap();
        assert!(body.starts_with(
            "sp_sc_flow_if number cvar hp < 20 \"sp_sc_exec_cvar f_check_autogen_0_0\" \"echo ok\""
        ));
        for chain in packed.chains() {
            chain.verify(config.max_len, config.layout).unwrap();
        }
    }

    #[test]
    fn quoted_branch_always_uses_helper() {
        let nodes = parse_script("sp_sc_flow_if number cvar a == 1 {\n echo \"yes\"\n}").unwrap();
        let naming = ChainNaming::new("f_boot").unwrap();
        let packed = pack_script(&nodes, &naming, &ScriptPackerConfig::default()).unwrap();
        assert_eq!(
            packed.main.records()[0].content(),
            "sp_sc_flow_if number cvar a == 1 \"sp_sc_exec_cvar f_boot_autogen_0_0\""
        );
        assert_eq!(packed.helpers[0].records()[0].content(), "echo \"yes\"");
        assert_eq!(packed.records().count(), 2);
    }

    #[test]
    fn plain_script_is_one_exec_chain() {
        let nodes = parse_script("// binds\nbind a \"say a\"; bind b \"say b\"\necho done // tail\n")
            .unwrap();
        let naming = ChainNaming::new("f_binds").unwrap();
        let packed = pack_script(&nodes, &naming, &ScriptPackerConfig::default()).unwrap();
        assert!(packed.helpers.is_empty());
        assert_eq!(
            packed.main.reassemble().unwrap(),
            "bind a \"say a\"; bind b \"say b\"; echo done"
        );
    }

    #[test]
    fn nested_and_duplicate_functions_are_rejected() {
        let nested = parse_script("function a {\n function b {\n echo\n }\n echo x\n}").unwrap();
        assert!(matches!(
            pack_functions(&nested, &ScriptPackerConfig::default()),
            Err(EncodeError::MalformedScript { line: 2, reason: "nested function" })
        ));

        let twice = parse_script("function a {\n echo 1\n}\nfunction a {\n echo 2\n}").unwrap();
        assert!(matches!(
            pack_functions(&twice, &ScriptPackerConfig::default()),
            Err(EncodeError::DuplicateFunction(name)) if name == "a"
        ));
    }
}
