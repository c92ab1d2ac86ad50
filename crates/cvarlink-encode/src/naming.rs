use crate::error::{EncodeError, Result};

/// Prefix used for menu chains.
pub const MENU_PREFIX: &str = "m_";

/// Prefix used for script chains.
pub const SCRIPT_PREFIX: &str = "f_";

/// Number of hex digits kept from the seed hash.
pub const DEFAULT_HASH_LEN: usize = 4;

/// Identifier policy for the records of one chain.
///
/// Record `k` is named `{base}_{origin + k}`, except that with `bare_first`
/// record 0 uses `base` unchanged (`base`, `base_1`, `base_2`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainNaming {
    /// Base name shared by every record of the chain.
    pub base: String,
    /// First numeric suffix.
    pub origin: usize,
    /// Use the bare base name for record 0.
    pub bare_first: bool,
}

impl ChainNaming {
    /// Naming `base_0, base_1, ...`.
    pub fn new(base: impl Into<String>) -> Result<Self> {
        let base = base.into();
        validate_name(&base)?;
        Ok(Self {
            base,
            origin: 0,
            bare_first: false,
        })
    }

    /// Start numbering at `origin`.
    pub fn with_origin(mut self, origin: usize) -> Self {
        self.origin = origin;
        self
    }

    /// Use the bare base name for record 0.
    pub fn with_bare_first(mut self, bare_first: bool) -> Self {
        self.bare_first = bare_first;
        self
    }

    /// Identifier of record `index`.
    pub fn id(&self, index: usize) -> String {
        if index == 0 && self.bare_first {
            return self.base.clone();
        }
        format!("{}_{}", self.base, self.origin + index)
    }

    /// Append `suffix` to the base, keeping the numbering policy.
    pub fn derive(&self, suffix: &str) -> Result<Self> {
        let base = format!("{}_{suffix}", self.base);
        validate_name(&base)?;
        Ok(Self {
            base,
            origin: self.origin,
            bare_first: self.bare_first,
        })
    }
}

/// Deterministic short base names seeded by a label such as a file name.
///
/// The same label always yields the same base; 4 hex digits give 65,536
/// distinct bases per prefix.
#[derive(Debug, Clone)]
pub struct CvarNamer {
    prefix: String,
    digest: String,
}

impl CvarNamer {
    /// Namer for menu chains (`m_xxxx`).
    pub fn from_seed(seed: &str) -> Self {
        Self::with_prefix(seed, MENU_PREFIX, DEFAULT_HASH_LEN)
    }

    /// Namer with an explicit prefix and hash length (clamped to 64 digits).
    pub fn with_prefix(seed: &str, prefix: &str, hash_len: usize) -> Self {
        let hash = blake3::hash(seed.as_bytes());
        let mut digest = hex::encode(hash.as_bytes());
        digest.truncate(hash_len.clamp(1, digest.len()));
        Self {
            prefix: prefix.to_string(),
            digest,
        }
    }

    /// The generated base name.
    pub fn base(&self) -> String {
        format!("{}{}", self.prefix, self.digest)
    }

    /// Chain naming with the default numbering policy.
    pub fn naming(&self) -> Result<ChainNaming> {
        ChainNaming::new(self.base())
    }
}

/// Cvar names are limited to ASCII alphanumerics and `_`.
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(EncodeError::InvalidBaseName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_numbering_starts_at_zero() {
        let naming = ChainNaming::new("menu").unwrap();
        assert_eq!(naming.id(0), "menu_0");
        assert_eq!(naming.id(2), "menu_2");
    }

    #[test]
    fn bare_first_and_origin() {
        let naming = ChainNaming::new("menu").unwrap().with_bare_first(true);
        assert_eq!(naming.id(0), "menu");
        assert_eq!(naming.id(1), "menu_1");

        let naming = ChainNaming::new("menu").unwrap().with_origin(10);
        assert_eq!(naming.id(0), "menu_10");
        assert_eq!(naming.id(3), "menu_13");
    }

    #[test]
    fn rejects_unusable_names() {
        assert!(ChainNaming::new("").is_err());
        assert!(ChainNaming::new("has space").is_err());
        assert!(ChainNaming::new("quote\"").is_err());
    }

    #[test]
    fn derive_appends_suffix() {
        let naming = ChainNaming::new("f_main").unwrap();
        assert_eq!(naming.derive("body").unwrap().id(1), "f_main_body_1");
        assert!(naming.derive("bad suffix").is_err());
    }

    #[test]
    fn namer_is_deterministic() {
        let a = CvarNamer::from_seed("main.rfm").base();
        let b = CvarNamer::from_seed("main.rfm").base();
        let c = CvarNamer::from_seed("other.rfm").base();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with(MENU_PREFIX));
        assert_eq!(a.len(), MENU_PREFIX.len() + DEFAULT_HASH_LEN);
        assert!(validate_name(&a).is_ok());
    }

    #[test]
    fn namer_prefix_and_length() {
        let base = CvarNamer::with_prefix("x", SCRIPT_PREFIX, 8).base();
        assert!(base.starts_with("f_"));
        assert_eq!(base.len(), 10);
    }
}
