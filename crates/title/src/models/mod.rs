mod manifest;
mod ticket;
mod tree;

pub use self::manifest::{ContentRecord, ContentType, IntegrityMode, TitleManifest};
pub use self::ticket::Ticket;
pub use self::tree::{EntryId, EntryKind, FileData, VirtualEntry, VirtualTree, Walk};
