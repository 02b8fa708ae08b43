//! Raw primitives through the configured back end, pinned to the pipe reader.
//!
//! The pipe reader works under every sandbox, so this binary selects it
//! explicitly before any read resolves the environment.

use nofault_membrane::{
    GuardedRegion, NoFaultScope, RawCopy, RawLength, ReaderBackend, SystemReader, UntrustedReader,
    nofault_depth, raw_copy, raw_copy_string, raw_strnlen, reader_backend, set_reader_backend,
};

fn pin_pipe() {
    set_reader_backend(ReaderBackend::Pipe);
    assert_eq!(reader_backend(), ReaderBackend::Pipe);
}

#[test]
fn system_reader_reports_selected_backend() {
    pin_pipe();
    assert_eq!(SystemReader.name(), "pipe");
}

#[test]
fn copies_larger_than_a_pipe_buffer() {
    pin_pipe();
    let region = GuardedRegion::new(3).unwrap();
    let len = region.readable_len();
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8 + 1).collect();
    let src = region.place_at_end(&data);

    let scope = NoFaultScope::enter();
    let mut dst = vec![0_u8; len];
    assert!(raw_copy(&SystemReader, &scope, &mut dst, src).is_ok());
    assert_eq!(dst, data);

    // One byte more runs into the guard page.
    let mut dst = vec![0_u8; len + 1];
    assert!(raw_copy(&SystemReader, &scope, &mut dst, src).is_err());
}

#[test]
fn string_and_length_agree() {
    pin_pipe();
    let region = GuardedRegion::new(1).unwrap();
    let src = region.place_at_end(b"pinned-to-pipe\0");
    let scope = NoFaultScope::enter();

    let mut dst = [0_u8; 64];
    assert_eq!(
        raw_copy_string(&SystemReader, &scope, &mut dst, src),
        RawCopy::Written(14)
    );
    assert_eq!(&dst[..15], b"pinned-to-pipe\0");
    assert_eq!(raw_strnlen(&SystemReader, &scope, src, 64), RawLength::Found(14));
    assert_eq!(raw_strnlen(&SystemReader, &scope, src, 14), RawLength::NotFound);
    assert_eq!(
        raw_strnlen(&SystemReader, &scope, region.unreadable_addr(), 8),
        RawLength::Fault
    );
}

#[test]
fn pipe_recovers_after_faults_on_many_threads() {
    pin_pipe();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                let region = GuardedRegion::new(1).unwrap();
                let text = format!("thread {i}\0");
                let src = region.place_at_end(text.as_bytes());
                for _ in 0..100 {
                    let scope = NoFaultScope::enter();
                    let mut dst = [0_u8; 32];
                    assert_eq!(
                        raw_copy_string(&SystemReader, &scope, &mut dst, region.unreadable_addr()),
                        RawCopy::Fault
                    );
                    assert_eq!(
                        raw_copy_string(&SystemReader, &scope, &mut dst, src),
                        RawCopy::Written(text.len() - 1)
                    );
                }
                nofault_depth()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), 0);
    }
}
