use derive_more::Display;

/// One downloadable piece of a title.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    #[display("manifest")]
    Manifest,
    #[display("ticket")]
    Ticket,
    /// Encrypted content, by content id.
    #[display("content {_0:08X}")]
    Content(u32),
    /// Hash-tree file of a hashed content, by content id.
    #[display("hash tree {_0:08X}")]
    HashTree(u32),
}
