#![no_main]
use libfuzzer_sys::fuzz_target;
use nofault_core::{LengthOutcome, strnlen_nofault};
use nofault_membrane::GuardedRegion;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let count = i16::from_le_bytes([data[0], data[1]]) as isize;
    let bytes = &data[2..];
    let Ok(region) = GuardedRegion::new(1) else {
        return;
    };
    if bytes.len() > region.readable_len() {
        return;
    }
    let src = region.place_at_end(bytes);
    let nul = bytes.iter().position(|&b| b == 0);

    match strnlen_nofault(src, count) {
        Ok(LengthOutcome::NoWork) => assert!(count <= 0),
        Ok(LengthOutcome::Terminated(n)) => assert_eq!(Some(n - 1), nul),
        Ok(LengthOutcome::ExceedsLimit(c)) => {
            assert_eq!(c, count as usize);
            assert!(nul.is_none_or(|p| p >= c));
        }
        Err(_) => {
            assert!(nul.is_none());
            assert!(bytes.len() < count as usize);
        }
    }
});
