use crate::consts::*;
use crate::error::{Result, Structure};
use crate::reader::ByteReader;

/// Length of the signature block for `sig_type`, including the type field
/// itself and the padding that follows the signature.
pub(crate) fn block_len(sig_type: u32) -> Option<usize> {
    match sig_type {
        SIG_RSA4096 | SIG_RSA4096_SHA256 => Some(4 + 0x200 + 0x3C),
        SIG_RSA2048 | SIG_RSA2048_SHA256 => Some(4 + 0x100 + 0x3C),
        SIG_ECDSA | SIG_ECDSA_SHA256 => Some(4 + 0x3C + 0x40),
        _ => None,
    }
}

/// Offset of the signed body in `data`. Signatures are skipped, not checked.
pub(crate) fn body_offset(data: &[u8], structure: Structure) -> Result<usize> {
    let sig_type = ByteReader::new(data, structure).be_u32()?;
    let Some(len) = block_len(sig_type) else {
        exn::bail!(crate::error::ErrorKind::Format {
            structure,
            reason: format!("unknown signature type {sig_type:#010x}"),
        });
    };
    Ok(len)
}
