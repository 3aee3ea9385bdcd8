//! Mode detection: raw passthrough vs. framed traffic.
//!
//! A connection starts in raw mode and behaves exactly like a plain
//! interactive shell; every byte goes to the terminal sink verbatim. The
//! remote companion emits [`HANDSHAKE_MAGIC`](super::HANDSHAKE_MAGIC) once,
//! right after it upgrades the shell, and everything after the signature is
//! framed traffic. Against a non-upgraded shell the signature never
//! appears and the session stays raw for its whole lifetime.
//!
//! The scan runs over the accumulator, not individual `feed` calls, so a
//! signature split across transport chunks is still matched.

use bytes::Bytes;

use super::accumulator::ByteAccumulator;
use super::wire_format::HANDSHAKE_MAGIC;

/// Connection operating mode.
///
/// Starts `Raw`; flips to `Framed` exactly once, only on a signature
/// match, and never reverts within a connection's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Unwrapped byte-for-byte terminal I/O.
    Raw,
    /// Typed, length-prefixed frames.
    Framed,
}

/// Result of scanning raw-mode bytes for the handshake signature.
#[derive(Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    /// No signature found. The returned bytes are safe to forward to the
    /// terminal sink; any buffer remainder could still be a signature
    /// prefix and stays in the accumulator.
    Raw(Bytes),
    /// Signature found and consumed. The returned bytes preceded it and
    /// still belong to the terminal sink; everything after it is left in
    /// the accumulator to be reprocessed as the start of framed traffic.
    Upgraded(Bytes),
}

/// Scan the accumulator for the handshake signature.
///
/// Consumes what it can classify: forwarded bytes and (on a match) the
/// signature itself. Bytes that might be a partial signature are held
/// back, so at most `HANDSHAKE_MAGIC.len() - 1` bytes ever sit unflushed.
pub fn scan_for_upgrade(acc: &mut ByteAccumulator) -> ScanOutcome {
    let buf = acc.as_slice();

    if let Some(pos) = find_magic(buf) {
        let before = acc.consume(pos).unwrap_or_default();
        let _ = acc.consume(HANDSHAKE_MAGIC.len());
        return ScanOutcome::Upgraded(before);
    }

    let hold = partial_magic_suffix(buf);
    let flush = buf.len() - hold;
    ScanOutcome::Raw(acc.consume(flush).unwrap_or_default())
}

fn find_magic(buf: &[u8]) -> Option<usize> {
    if buf.len() < HANDSHAKE_MAGIC.len() {
        return None;
    }
    buf.windows(HANDSHAKE_MAGIC.len())
        .position(|w| w == HANDSHAKE_MAGIC)
}

/// Length of the longest buffer suffix that is a proper prefix of the
/// signature (and so could complete into a match on the next feed).
fn partial_magic_suffix(buf: &[u8]) -> usize {
    let max = buf.len().min(HANDSHAKE_MAGIC.len() - 1);
    for k in (1..=max).rev() {
        if buf[buf.len() - k..] == HANDSHAKE_MAGIC[..k] {
            return k;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acc_with(data: &[u8]) -> ByteAccumulator {
        let mut acc = ByteAccumulator::new();
        acc.feed(data);
        acc
    }

    #[test]
    fn plain_shell_output_passes_through() {
        let mut acc = acc_with(b"login: $ ls -la\r\n");
        match scan_for_upgrade(&mut acc) {
            ScanOutcome::Raw(bytes) => assert_eq!(&bytes[..], b"login: $ ls -la\r\n"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(acc.is_empty());
    }

    #[test]
    fn magic_alone_upgrades_with_no_passthrough() {
        let mut acc = acc_with(HANDSHAKE_MAGIC);
        match scan_for_upgrade(&mut acc) {
            ScanOutcome::Upgraded(before) => assert!(before.is_empty()),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(acc.is_empty());
    }

    #[test]
    fn bytes_before_magic_are_forwarded() {
        let mut data = b"shell banner".to_vec();
        data.extend_from_slice(HANDSHAKE_MAGIC);
        let mut acc = acc_with(&data);

        match scan_for_upgrade(&mut acc) {
            ScanOutcome::Upgraded(before) => assert_eq!(&before[..], b"shell banner"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn bytes_after_magic_stay_buffered() {
        let mut data = HANDSHAKE_MAGIC.to_vec();
        data.extend_from_slice(&[3, 5, 0, 0, 0]);
        let mut acc = acc_with(&data);

        match scan_for_upgrade(&mut acc) {
            ScanOutcome::Upgraded(before) => assert!(before.is_empty()),
            other => panic!("unexpected outcome: {other:?}"),
        }
        // Framed remainder is never dropped.
        assert_eq!(acc.as_slice(), &[3, 5, 0, 0, 0]);
    }

    #[test]
    fn magic_split_across_chunks_still_matches() {
        let mid = HANDSHAKE_MAGIC.len() / 2;
        let mut acc = ByteAccumulator::new();

        acc.feed(b"before");
        acc.feed(&HANDSHAKE_MAGIC[..mid]);
        match scan_for_upgrade(&mut acc) {
            ScanOutcome::Raw(bytes) => assert_eq!(&bytes[..], b"before"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        // Partial signature held back, not forwarded.
        assert_eq!(acc.len(), mid);

        acc.feed(&HANDSHAKE_MAGIC[mid..]);
        match scan_for_upgrade(&mut acc) {
            ScanOutcome::Upgraded(before) => assert!(before.is_empty()),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(acc.is_empty());
    }

    #[test]
    fn escape_heavy_output_is_not_a_false_positive() {
        // Lone ESC bytes and other APC-ish sequences must pass through.
        let mut acc = acc_with(b"\x1b[2J\x1b[H\x1b_other\x1b\\plain");
        match scan_for_upgrade(&mut acc) {
            ScanOutcome::Raw(bytes) => {
                assert_eq!(&bytes[..], b"\x1b[2J\x1b[H\x1b_other\x1b\\plain")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn trailing_escape_is_held_back_then_flushed() {
        let mut acc = acc_with(b"output\x1b_tt");
        match scan_for_upgrade(&mut acc) {
            ScanOutcome::Raw(bytes) => assert_eq!(&bytes[..], b"output"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(acc.as_slice(), b"\x1b_tt");

        // Turns out not to be the signature after all.
        acc.feed(b"yX");
        match scan_for_upgrade(&mut acc) {
            ScanOutcome::Raw(bytes) => assert_eq!(&bytes[..], b"\x1b_ttyX"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn partial_magic_suffix_lengths() {
        assert_eq!(partial_magic_suffix(b""), 0);
        assert_eq!(partial_magic_suffix(b"hello"), 0);
        assert_eq!(partial_magic_suffix(b"hello\x1b"), 1);
        assert_eq!(partial_magic_suffix(b"hello\x1b_tty"), 5);
        // A full magic is found by the scan, never held as a suffix.
        assert_eq!(
            partial_magic_suffix(&HANDSHAKE_MAGIC[..HANDSHAKE_MAGIC.len() - 1]),
            HANDSHAKE_MAGIC.len() - 1
        );
    }
}
