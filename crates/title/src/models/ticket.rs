/// The fields of a ticket needed to recover its title key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub issuer: String,
    /// The title key, encrypted with the shared key at `key_index`.
    pub wrapped_key: [u8; 16],
    pub ticket_id: u64,
    pub console_id: u32,
    pub title_id: u64,
    pub title_version: u16,
    pub key_index: u8,
}
