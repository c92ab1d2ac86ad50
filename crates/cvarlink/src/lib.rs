//! Move large text through a game console that only accepts short commands.
//!
//! cvarlink covers two halves of the same problem:
//!
//! - Storing a markup document or a script in console variables: the
//!   document is packed into length-bounded records chained by directives
//!   (`<includecvar NEXT>` or `sp_sc_exec_cvar NEXT`) and rendered as a
//!   `.cfg` file.
//! - Transferring a payload at runtime: the payload is escaped, split into
//!   typed chunks, paced out one command at a time and reassembled on the
//!   receiving side, per sending context.
//!
//! # Crate Structure
//!
//! - [`channel`]: Command limits, percent escaping, channel traits
//! - [`encode`]: Tag-preserving chain packer and `.cfg` rendering
//! - [`transport`]: Chunk sender, receiver and session registry
//!   (async sending behind the `async` feature)

/// Re-export channel types.
pub mod channel {
    pub use cvarlink_channel::*;
}

/// Re-export encoder types.
pub mod encode {
    pub use cvarlink_encode::*;
}

/// Re-export transport types.
pub mod transport {
    pub use cvarlink_transport::*;
}
