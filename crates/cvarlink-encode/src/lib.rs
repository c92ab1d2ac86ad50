//! Tag-preserving encoder for length-bounded cvar chains.
//!
//! A markup document is tokenized into atomic tags and divisible text, then
//! greedily packed into records of at most `max_len` characters. Every
//! non-terminal record ends with a directive naming its successor:
//!
//! ```text
//! <text>Hello wo<includecvar m_1a2b_1>
//! rld</text>
//! ```
//!
//! A tag is never split across records. Chains can be rendered to and parsed
//! from `.cfg` files, and plain console command strings can be packed into
//! exec-linked chains with [`pack_commands`]. Scripts made of
//! `function NAME { ... }` blocks are packed into loadable function cvars
//! with [`pack_functions`].

pub mod cfg;
pub mod chain;
pub mod config;
pub mod error;
pub mod function;
pub mod naming;
pub mod packer;
pub mod script;
pub mod token;

pub use cfg::{parse_cfg, render_cfg, render_scripts_cfg, CfgOptions, EntryPoint};
pub use chain::{Chain, LinkStyle, Record};
pub use config::{EncoderConfig, RecordLayout};
pub use error::{EncodeError, Result};
pub use function::{
    has_functions, pack_function, pack_functions, pack_script, parse_script, strip_comment,
    Block, BlockKind, PackedScript, ScriptNode,
};
pub use naming::{
    validate_name, ChainNaming, CvarNamer, DEFAULT_HASH_LEN, MENU_PREFIX, SCRIPT_PREFIX,
};
pub use packer::{encode, encode_tokens};
pub use script::{pack_commands, split_commands, ScriptPackerConfig};
pub use token::{strip_wrapper, tag_name, tokenize, Token, DEFAULT_WRAPPER};
