//! One bounded copy against an address in this process.

use nofault_core::{UntrustedAddr, copy_string_nofault, legacy_code};
use nofault_membrane::reader_backend;
use serde::Serialize;

use crate::error::HarnessError;
use crate::scenarios::copy_tag;
use crate::structured_log::CopyTag;

/// Largest limit a probe accepts.
pub const MAX_PROBE_LIMIT: usize = 64 * 1024;

/// Parse a decimal or `0x`-prefixed hexadecimal address.
pub fn parse_addr(text: &str) -> Result<UntrustedAddr, HarnessError> {
    let trimmed = text.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => usize::from_str_radix(&hex.replace('_', ""), 16),
        None => trimmed.replace('_', "").parse::<usize>(),
    };
    parsed
        .map(UntrustedAddr::new)
        .map_err(|_| HarnessError::InvalidAddress(text.to_string()))
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeRecord {
    pub addr: String,
    pub limit: i64,
    pub reader: String,
    pub result_code: i64,
    pub copy_tag: CopyTag,
    /// Bytes before the terminator, lossily decoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Copy the string at `addr` with the given limit.
pub fn probe(addr: UntrustedAddr, limit: isize) -> Result<ProbeRecord, HarnessError> {
    let capacity = usize::try_from(limit).unwrap_or(0);
    if capacity > MAX_PROBE_LIMIT {
        return Err(HarnessError::LimitTooLarge {
            limit,
            max: MAX_PROBE_LIMIT,
        });
    }
    let mut dst = vec![0_u8; capacity];
    let result = copy_string_nofault(&mut dst, addr, limit);
    let text = result.as_ref().ok().and_then(|outcome| {
        let valid = outcome.valid_bytes();
        (valid > 0).then(|| String::from_utf8_lossy(&dst[..valid - 1]).into_owned())
    });
    Ok(ProbeRecord {
        addr: format!("{:#x}", addr.get()),
        limit: limit as i64,
        reader: reader_backend().as_str().to_string(),
        result_code: legacy_code(&result),
        copy_tag: copy_tag(&result),
        text,
    })
}
