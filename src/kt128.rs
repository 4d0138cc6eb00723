//! KT128 (KangarooTwelve, RFC 9861): a parallel tree XOF built on
//! TurboSHAKE128.
//!
//! The buffering strategy — accumulate into a single-node hasher until the
//! chunk size is exceeded, then lazily promote to a tree-mode final node —
//! is grounded on `tiny-keccak`'s `KangarooTwelve`/`KangarooTwelveXof`
//! (`other_examples/.../tiny-keccak/src/k12.rs`), generalized to an
//! incremental `write`/`read`/`sum`/`reset` surface instead of
//! tiny-keccak's consuming `Hasher`/`IntoXof` split.

use crate::encoding::kt_length_encode;
use crate::turboshake::TurboShake128;

/// The chunk/leaf size, in bytes.
pub const CHUNK_SIZE: usize = 8192;
/// The size of a leaf chain value, in bytes.
pub const CV_SIZE: usize = 32;

const SAKURA_MARKER: [u8; 8] = [0x03, 0, 0, 0, 0, 0, 0, 0];

const DS_SINGLE_NODE: u8 = 0x07;
const DS_TREE_ROOT: u8 = 0x06;
const DS_LEAF: u8 = 0x0b;

/// An incremental KT128 hasher.
#[derive(Clone)]
pub struct Kt128 {
    customization: Vec<u8>,
    /// Bytes of the current leaf/single-node buffer not yet committed to a
    /// hasher. Bounded to `CHUNK_SIZE`; at least one byte is always kept
    /// buffered until finalization, so single-node vs tree-mode is decided
    /// correctly even when the message is an exact multiple of `CHUNK_SIZE`.
    leaf_data: Vec<u8>,
    /// The root hasher. In single-node mode this *is* the final hasher
    /// (ds=0x07, fed directly with message bytes). In tree mode this is S0
    /// (ds=0x06), fed with the first chunk, the Sakura marker, and then
    /// leaf chain values.
    root: TurboShake128,
    /// Once true, `root` has absorbed S0's first chunk and the Sakura
    /// marker.
    tree_mode: bool,
    /// Number of leaf chain values written into `root` so far.
    leaves_written: u64,
    finalized: bool,
}

impl Kt128 {
    /// Creates a new hasher with the given customization string.
    pub fn new(customization: &[u8]) -> Self {
        Kt128 {
            customization: customization.to_vec(),
            leaf_data: Vec::with_capacity(CHUNK_SIZE),
            root: TurboShake128::new(DS_SINGLE_NODE),
            tree_mode: false,
            leaves_written: 0,
            finalized: false,
        }
    }

    fn suffix(&self) -> Vec<u8> {
        let mut s = self.customization.clone();
        s.extend_from_slice(&kt_length_encode(self.customization.len() as u64));
        s
    }

    /// Absorbs `data`.
    ///
    /// # Panics
    ///
    /// Panics if called after [`Self::read`].
    pub fn write(&mut self, mut data: &[u8]) {
        assert!(!self.finalized, "cannot write to a Kt128 after finalization");
        while !data.is_empty() {
            let room = CHUNK_SIZE - self.leaf_data.len();
            let take = room.min(data.len());
            self.leaf_data.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.leaf_data.len() == CHUNK_SIZE && !data.is_empty() {
                let chunk = std::mem::replace(&mut self.leaf_data, Vec::with_capacity(CHUNK_SIZE));
                self.commit_full_chunk(&chunk);
            }
        }
    }

    /// Commits one full `CHUNK_SIZE`-byte chunk: either the first chunk
    /// (absorbed directly into S0, promoting to tree mode) or a later chunk
    /// (hashed into a leaf chain value, then absorbed into S0).
    fn commit_full_chunk(&mut self, chunk: &[u8]) {
        debug_assert_eq!(chunk.len(), CHUNK_SIZE);
        if !self.tree_mode {
            self.root.reset(DS_TREE_ROOT);
            self.root.write(chunk);
            self.root.write(&SAKURA_MARKER);
            self.tree_mode = true;
        } else {
            let mut leaf = TurboShake128::new(DS_LEAF);
            leaf.write(chunk);
            let mut cv = [0u8; CV_SIZE];
            leaf.read(&mut cv);
            self.root.write(&cv);
            self.leaves_written += 1;
        }
    }

    /// Absorbs the customization suffix and the final chunk/leaf, and (in
    /// tree mode) the terminator frame.
    fn finalize(&mut self) {
        debug_assert!(!self.finalized);
        let mut last = std::mem::take(&mut self.leaf_data);
        last.extend_from_slice(&self.suffix());

        let mut offset = 0;
        while last.len() - offset > CHUNK_SIZE {
            self.commit_full_chunk(&last[offset..offset + CHUNK_SIZE]);
            offset += CHUNK_SIZE;
        }
        let final_chunk = &last[offset..];

        if self.tree_mode {
            let mut leaf = TurboShake128::new(DS_LEAF);
            leaf.write(final_chunk);
            let mut cv = [0u8; CV_SIZE];
            leaf.read(&mut cv);
            self.root.write(&cv);
            self.leaves_written += 1;

            self.root.write(&kt_length_encode(self.leaves_written));
            self.root.write(&[0xff, 0xff]);
        } else {
            self.root.write(final_chunk);
        }
        self.finalized = true;
    }

    /// Fills `out` with squeezed output, finalizing on first call. After
    /// this, further calls to [`Self::write`] panic.
    pub fn read(&mut self, out: &mut [u8]) {
        if !self.finalized {
            self.finalize();
        }
        self.root.read(out);
    }

    /// Returns `n` bytes of output without consuming `self`: clones the
    /// internal state and finalizes the clone.
    #[cfg(feature = "std")]
    pub fn sum(&self, n: usize) -> Vec<u8> {
        let mut clone = self.clone();
        let mut out = vec![0u8; n];
        clone.read(&mut out);
        out
    }

    /// Resets the hasher, preserving its customization string.
    pub fn reset(&mut self) {
        self.leaf_data.clear();
        self.root = TurboShake128::new(DS_SINGLE_NODE);
        self.tree_mode = false;
        self.leaves_written = 0;
        self.finalized = false;
    }
}
