use crate::consts::*;
use crate::error::{ErrorKind, Result, Structure};
use crate::models::{ContentRecord, ContentType, TitleManifest};
use crate::reader::{ByteReader, fixed_string};
use crate::signature;
use nusdec_crypto::{Sha1Digest, sha256};
use std::collections::HashSet;
use tracing::instrument;

impl TitleManifest {
    /// Parse a manifest, verifying the content-info hash chain when the
    /// format version carries one.
    ///
    /// Nothing is decrypted here and the signature is not checked.
    #[instrument(skip(data), fields(len = data.len()))]
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = signature::body_offset(data, Structure::Manifest)?;
        let mut reader = ByteReader::at(data, header + TMD_ISSUER, Structure::Manifest)?;
        let issuer = fixed_string(reader.bytes(TMD_ISSUER_LEN)?);

        reader.seek(header + TMD_VERSION)?;
        let format_version = reader.u8()?;
        reader.seek(header + TMD_SYSTEM_VERSION)?;
        let system_version = reader.be_u64()?;
        reader.seek(header + TMD_TITLE_ID)?;
        let title_id = reader.be_u64()?;
        reader.seek(header + TMD_TITLE_TYPE)?;
        let title_type = reader.be_u32()?;
        reader.seek(header + TMD_GROUP_ID)?;
        let group_id = reader.be_u16()?;
        reader.seek(header + TMD_ACCESS_RIGHTS)?;
        let access_rights = reader.be_u32()?;
        reader.seek(header + TMD_TITLE_VERSION)?;
        let title_version = reader.be_u16()?;
        reader.seek(header + TMD_CONTENT_COUNT)?;
        let content_count = usize::from(reader.be_u16()?);
        reader.seek(header + TMD_BOOT_INDEX)?;
        let boot_index = reader.be_u16()?;

        let contents = match format_version {
            0 => parse_records(data, header + TMD_V0_RECORDS, content_count, TMD_V0_RECORD_SIZE)?,
            1 => {
                verify_info_table(data, header, content_count)?;
                parse_records(data, header + TMD_V1_RECORDS, content_count, TMD_V1_RECORD_SIZE)?
            },
            other => exn::bail!(ErrorKind::manifest(format!("unsupported format version {other}"))),
        };

        let mut seen = HashSet::with_capacity(contents.len());
        for record in &contents {
            if !seen.insert(record.index) {
                exn::bail!(ErrorKind::manifest(format!("content index {} appears more than once", record.index)));
            }
        }

        tracing::debug!(title_id = %format!("{title_id:016X}"), contents = contents.len(), "parsed manifest");
        Ok(Self {
            format_version,
            issuer,
            system_version,
            title_id,
            title_type,
            group_id,
            access_rights,
            title_version,
            boot_index,
            contents,
        })
    }
}

/// Version 1 manifests hash the content-info table, and each info entry
/// hashes a run of content records. Both levels are checked.
fn verify_info_table(data: &[u8], header: usize, content_count: usize) -> Result<()> {
    let mut reader = ByteReader::at(data, header + TMD_INFO_TABLE_HASH, Structure::Manifest)?;
    let expected: [u8; 32] = reader.array()?;
    reader.seek(header + TMD_INFO_TABLE)?;
    let table = reader.bytes(TMD_INFO_ENTRIES * TMD_INFO_ENTRY_SIZE)?;
    if sha256(table) != expected {
        exn::bail!(ErrorKind::manifest("content info table does not match its hash"));
    }

    reader.seek(header + TMD_V1_RECORDS)?;
    let records = reader.bytes(content_count * TMD_V1_RECORD_SIZE)?;
    let mut entries = ByteReader::new(table, Structure::Manifest);
    for _ in 0..TMD_INFO_ENTRIES {
        let first = usize::from(entries.be_u16()?);
        let count = usize::from(entries.be_u16()?);
        let hash: [u8; 32] = entries.array()?;
        if count == 0 {
            continue;
        }
        let end = first + count;
        if end > content_count {
            exn::bail!(ErrorKind::manifest(format!(
                "content info covers records {first}..{end} but there are only {content_count}"
            )));
        }
        if sha256(&records[first * TMD_V1_RECORD_SIZE..end * TMD_V1_RECORD_SIZE]) != hash {
            exn::bail!(ErrorKind::manifest(format!("content records {first}..{end} do not match their hash")));
        }
    }
    Ok(())
}

fn parse_records(data: &[u8], start: usize, count: usize, record_size: usize) -> Result<Vec<ContentRecord>> {
    let mut reader = ByteReader::at(data, start, Structure::Manifest)?;
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        let record_start = reader.position();
        let id = reader.be_u32()?;
        let index = reader.be_u16()?;
        let content_type = ContentType(reader.be_u16()?);
        let size = reader.be_u64()?;
        let digest = Sha1Digest(reader.array()?);
        // Version 1 records pad the hash field out to 32 bytes.
        reader.seek(record_start + record_size)?;
        records.push(ContentRecord { id, index, content_type, size, digest });
    }
    Ok(records)
}
