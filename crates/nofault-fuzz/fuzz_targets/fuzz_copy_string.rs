#![no_main]
use libfuzzer_sys::fuzz_target;
use nofault_core::{CopyOutcome, copy_string_nofault};
use nofault_membrane::GuardedRegion;

// Layout: [limit: i16 LE][offset: u8][bytes...]. The bytes end right before
// the guard page; `offset` shifts the source start into them.
fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }
    let limit = i16::from_le_bytes([data[0], data[1]]) as isize;
    let bytes = &data[3..];
    let Ok(region) = GuardedRegion::new(1) else {
        return;
    };
    if bytes.len() > region.readable_len() {
        return;
    }
    let base = region.place_at_end(bytes);
    let offset = usize::from(data[2]).min(bytes.len());
    let src = base.checked_add(offset).unwrap_or(base);
    let visible = &bytes[offset..];

    let mut dst = vec![0xAA_u8; usize::try_from(limit).unwrap_or(0)];
    let result = copy_string_nofault(&mut dst, src, limit);

    let nul = visible.iter().position(|&b| b == 0);
    match result {
        Ok(CopyOutcome::NoWork) => {
            assert!(limit <= 0);
            assert!(dst.iter().all(|&b| b == 0xAA));
        }
        Ok(CopyOutcome::Copied(n)) => {
            let len = nul.expect("copied implies a terminator");
            assert_eq!(n, len + 1);
            assert!(n <= limit as usize);
            assert_eq!(&dst[..n], &visible[..n]);
        }
        Ok(CopyOutcome::Truncated(n)) => {
            assert_eq!(n, limit as usize);
            assert_eq!(dst[n - 1], 0);
            assert_eq!(&dst[..n - 1], &visible[..n - 1]);
        }
        Err(_) => {
            // Only reachable when no terminator lies within the limit and
            // the readable bytes run out first.
            assert!(nul.is_none());
            assert!(visible.len() < limit as usize);
        }
    }
});
