// Splits a byte blob into chunk-sized slices.
//
// A tensor's chunks all have the same size except the most recent one, which
// may be short. When a new blob is written after such a short chunk, the
// first slice produced here is sized to top that chunk off (a "continuation"
// slice) and every following slice starts a fresh chunk. The last slice is
// short whenever the remaining bytes don't divide evenly.
//
// No I/O, no compression: the same arguments always give the same slices.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSlice<'a> {
    // Belongs at the end of the existing trailing chunk rather than in a new
    // chunk.
    pub continuation: bool,
    pub bytes: &'a [u8],
}

#[derive(Debug, Clone)]
pub struct Split<'a> {
    data: &'a [u8],
    chunk_size: usize,
    // Room left in the existing trailing chunk, consumed by the first slice.
    room: usize,
    pos: usize,
}

/// Splits `data` into slices for chunks of `chunk_size` bytes, given that the
/// trailing chunk already holds `occupied` bytes (0 if there is none or it
/// is full).
///
/// # Panics
///
/// Panics if `chunk_size` is zero. `WriteOptions::validate` rejects that
/// before any write gets here.
pub fn split(data: &[u8], chunk_size: usize, occupied: usize) -> Split<'_> {
    assert!(chunk_size > 0, "chunk size must be positive");
    let room = if occupied > 0 && occupied < chunk_size {
        chunk_size - occupied
    } else {
        0
    };
    Split {
        data,
        chunk_size,
        room,
        pos: 0,
    }
}

impl<'a> Split<'a> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl<'a> Iterator for Split<'a> {
    type Item = SplitSlice<'a>;

    fn next(&mut self) -> Option<SplitSlice<'a>> {
        if self.remaining() == 0 {
            return None;
        }
        let continuation = self.pos == 0 && self.room > 0;
        let want = if continuation {
            self.room
        } else {
            self.chunk_size
        };
        let n = std::cmp::min(want, self.remaining());
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Some(SplitSlice {
            continuation,
            bytes,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let mut remaining = self.remaining();
        let mut n = 0;
        if self.pos == 0 && self.room > 0 && remaining > 0 {
            n += 1;
            remaining -= std::cmp::min(self.room, remaining);
        }
        n += remaining.div_ceil(self.chunk_size);
        (n, Some(n))
    }
}

impl<'a> ExactSizeIterator for Split<'a> {}

#[cfg(test)]
mod test {
    use super::split;

    fn lens(data: &[u8], chunk_size: usize, occupied: usize) -> Vec<(bool, usize)> {
        split(data, chunk_size, occupied)
            .map(|s| (s.continuation, s.bytes.len()))
            .collect()
    }

    #[test]
    fn test_fresh_split() {
        let data = [0_u8; 25];
        assert_eq!(vec![(false, 10), (false, 10), (false, 5)], lens(&data, 10, 0));
        assert_eq!(vec![(false, 10), (false, 10)], lens(&data[..20], 10, 0));
        assert_eq!(vec![(false, 3)], lens(&data[..3], 10, 0));
        assert!(lens(&[], 10, 0).is_empty());
    }

    #[test]
    fn test_continuation() {
        let data = [0_u8; 7];
        // 5 bytes top off a chunk holding 5, the other 2 start a new one.
        assert_eq!(vec![(true, 5), (false, 2)], lens(&data, 10, 5));
        // Too small to fill the trailing chunk.
        assert_eq!(vec![(true, 3)], lens(&data[..3], 10, 5));
        assert_eq!(vec![(true, 5)], lens(&data[..5], 10, 5));
        // A full trailing chunk isn't continued.
        assert_eq!(vec![(false, 7)], lens(&data, 7, 7));
        assert_eq!(vec![(true, 1), (false, 3), (false, 3)], lens(&data, 3, 2));
    }

    #[test]
    fn test_slices_cover_input() {
        let data: Vec<u8> = (0..=255).collect();
        for chunk_size in 1..40 {
            for occupied in 0..chunk_size {
                let s = split(&data, chunk_size, occupied);
                assert_eq!(s.len(), s.clone().count());
                let joined: Vec<u8> = s.flat_map(|s| s.bytes.iter().copied()).collect();
                assert_eq!(data, joined);
            }
        }
    }

    #[test]
    #[should_panic(expected = "chunk size must be positive")]
    fn test_zero_chunk_size() {
        split(&[1, 2, 3], 0, 0);
    }

    #[test]
    fn test_restartable() {
        let data: Vec<u8> = (0..50).collect();
        let s = split(&data, 8, 3);
        let a: Vec<_> = s.clone().collect();
        let b: Vec<_> = s.collect();
        assert_eq!(a, b);
        assert_eq!(a, split(&data, 8, 3).collect::<Vec<_>>());
    }
}
