//! TreeWrap: a nonce-less, tree-parallel authenticated stream cipher built on
//! Keccak-p\[1600,12\].
//!
//! There have historically been two diverging TreeWrap designs floating
//! around (a two-domain-byte stateless pair and a four-domain-byte streaming
//! pair); this module commits to the streaming (four-domain-byte) schedule
//! throughout, since Protocol's Mask/Seal are built on it. There is exactly
//! one TreeWrap algorithm here: the one-shot [`encrypt_and_mac`] /
//! [`decrypt_and_mac`] functions are thin, non-streaming drivers over the
//! same per-chunk engine the streaming [`Encryptor`]/[`Decryptor`] use, so
//! there is no possibility of the two diverging again.

use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::keccak_p;
use crate::turboshake::TurboShake128;
use crate::xor::{xor_and_copy, xor_and_replace};

/// TreeWrap's fixed key size, in bytes.
pub const KEY_LEN: usize = 32;
/// TreeWrap's fixed tag size, in bytes.
pub const TAG_LEN: usize = 32;
/// The chunk size, in bytes.
pub const CHUNK_SIZE: usize = 8192;
/// The sponge rate.
const RATE: usize = 168;
/// Data bytes per block (`RATE - 1`, leaving room for the domain byte).
const BLOCK_DATA: usize = RATE - 1;

const DS_INIT: u8 = 0x60;
const DS_INTERMEDIATE: u8 = 0x61;
const DS_FINAL: u8 = 0x62;
const DS_TAG: u8 = 0x63;

const SAKURA_MARKER: [u8; 8] = [0x03, 0, 0, 0, 0, 0, 0, 0];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Encrypt,
    Decrypt,
}

/// Processes one chunk's worth of data (up to `CHUNK_SIZE` bytes) through a
/// fresh per-chunk sponge, writing plaintext/ciphertext to `dst` and
/// returning the chunk's 32-byte chain value.
///
/// `src` and `dst` must have equal length; `dst` receives ciphertext when
/// `direction` is [`Direction::Encrypt`] and plaintext when
/// [`Direction::Decrypt`].
fn process_chunk(key: &[u8; KEY_LEN], chunk_index: u64, src: &[u8], dst: &mut [u8], direction: Direction) -> [u8; 32] {
    debug_assert_eq!(src.len(), dst.len());
    debug_assert!(src.len() <= CHUNK_SIZE);

    let mut state = keccak_p::new_state();
    state[..KEY_LEN].copy_from_slice(key);
    state[32..40].copy_from_slice(&chunk_index.to_le_bytes());
    state[40] ^= DS_INIT;
    state[RATE - 1] ^= 0x80;
    (keccak_p::backend().p1600)(&mut state);

    let mut blocks = src.chunks(BLOCK_DATA).enumerate().peekable();
    let mut offset = 0;
    // An empty chunk is still processed as a single (empty) block.
    if src.is_empty() {
        let final_pos = 0;
        state[final_pos] ^= DS_FINAL;
        state[RATE - 1] ^= 0x80;
        (keccak_p::backend().p1600)(&mut state);
        let mut cv = [0u8; 32];
        cv.copy_from_slice(&state[..32]);
        state.zeroize();
        return cv;
    }

    while let Some((_, block)) = blocks.next() {
        let len = block.len();
        let dst_block = &mut dst[offset..offset + len];
        match direction {
            Direction::Encrypt => xor_and_copy(dst_block, block, &mut state[..len]),
            Direction::Decrypt => xor_and_replace(dst_block, block, &mut state[..len]),
        }
        offset += len;

        if blocks.peek().is_some() {
            state[len] ^= DS_INTERMEDIATE;
            state[RATE - 1] ^= 0x80;
            (keccak_p::backend().p1600)(&mut state);
        } else {
            state[len] ^= DS_FINAL;
            state[RATE - 1] ^= 0x80;
            (keccak_p::backend().p1600)(&mut state);
        }
    }

    let mut cv = [0u8; 32];
    cv.copy_from_slice(&state[..32]);
    state.zeroize();
    cv
}

/// Aggregates chunk chain values into a 32-byte tag via a TurboSHAKE128
/// hasher, following the Sakura/terminator framing shared with KT128.
struct TagHasher {
    hasher: TurboShake128,
    chunks_seen: u64,
}

impl TagHasher {
    fn new() -> Self {
        TagHasher {
            hasher: TurboShake128::new(DS_TAG),
            chunks_seen: 0,
        }
    }

    fn absorb_cv(&mut self, cv: &[u8; 32]) {
        self.hasher.write(cv);
        if self.chunks_seen == 0 {
            self.hasher.write(&SAKURA_MARKER);
        }
        self.chunks_seen += 1;
    }

    fn finalize(mut self) -> [u8; TAG_LEN] {
        self.hasher
            .write(&crate::encoding::kt_length_encode(self.chunks_seen - 1));
        self.hasher.write(&[0xff, 0xff]);
        let mut tag = [0u8; TAG_LEN];
        self.hasher.read(&mut tag);
        tag
    }
}

/// One-shot encryption: returns a ciphertext of exactly `plaintext.len()`
/// bytes and a 32-byte tag.
pub fn encrypt_and_mac(key: &[u8; KEY_LEN], plaintext: &[u8]) -> (Vec<u8>, [u8; TAG_LEN]) {
    let mut ciphertext = vec![0u8; plaintext.len()];
    let mut tag_hasher = TagHasher::new();

    if plaintext.is_empty() {
        let cv = process_chunk(key, 0, &[], &mut [], Direction::Encrypt);
        tag_hasher.absorb_cv(&cv);
    } else {
        for (i, (src, dst)) in plaintext
            .chunks(CHUNK_SIZE)
            .zip(ciphertext.chunks_mut(CHUNK_SIZE))
            .enumerate()
        {
            let cv = process_chunk(key, i as u64, src, dst, Direction::Encrypt);
            tag_hasher.absorb_cv(&cv);
        }
    }

    (ciphertext, tag_hasher.finalize())
}

/// One-shot decryption: returns a plaintext of exactly `ciphertext.len()`
/// bytes and a 32-byte tag. Callers MUST compare the returned tag against
/// the expected tag in constant time before trusting the plaintext.
pub fn decrypt_and_mac(key: &[u8; KEY_LEN], ciphertext: &[u8]) -> (Vec<u8>, [u8; TAG_LEN]) {
    let mut plaintext = vec![0u8; ciphertext.len()];
    let mut tag_hasher = TagHasher::new();

    if ciphertext.is_empty() {
        let cv = process_chunk(key, 0, &[], &mut [], Direction::Decrypt);
        tag_hasher.absorb_cv(&cv);
    } else {
        for (i, (src, dst)) in ciphertext
            .chunks(CHUNK_SIZE)
            .zip(plaintext.chunks_mut(CHUNK_SIZE))
            .enumerate()
        {
            let cv = process_chunk(key, i as u64, src, dst, Direction::Decrypt);
            tag_hasher.absorb_cv(&cv);
        }
    }

    (plaintext, tag_hasher.finalize())
}

/// Seals `plaintext`, appending the tag. The returned [`Vec`] is `TAG_LEN`
/// bytes longer than `plaintext`.
pub fn seal(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Vec<u8> {
    let (mut ciphertext, tag) = encrypt_and_mac(key, plaintext);
    ciphertext.extend_from_slice(&tag);
    ciphertext
}

/// Opens a sealed ciphertext (`ciphertext ++ tag`). Returns `None` if
/// authentication fails.
pub fn open(key: &[u8; KEY_LEN], sealed: &[u8]) -> Option<Vec<u8>> {
    if sealed.len() < TAG_LEN {
        return None;
    }
    let (ciphertext, expected_tag) = sealed.split_at(sealed.len() - TAG_LEN);
    let (plaintext, tag) = decrypt_and_mac(key, ciphertext);
    if bool::from(tag.ct_eq(expected_tag)) {
        Some(plaintext)
    } else {
        None
    }
}

/// An incremental TreeWrap encryptor. Buffers partial chunks; every full
/// chunk is processed eagerly so only one chunk's worth of plaintext is ever
/// held at a time.
pub struct Encryptor {
    key: [u8; KEY_LEN],
    buffer: Vec<u8>,
    chunk_index: u64,
    tag_hasher: TagHasher,
    wrote_any: bool,
}

impl Encryptor {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Encryptor {
            key,
            buffer: Vec::with_capacity(CHUNK_SIZE),
            chunk_index: 0,
            tag_hasher: TagHasher::new(),
            wrote_any: false,
        }
    }

    /// Encrypts `plaintext`, appending ciphertext bytes to `out` for every
    /// chunk boundary crossed. Bytes that don't yet complete a chunk are
    /// buffered.
    pub fn update(&mut self, plaintext: &[u8], out: &mut Vec<u8>) {
        self.wrote_any = true;
        let mut data = plaintext;
        while !data.is_empty() {
            let room = CHUNK_SIZE - self.buffer.len();
            let take = room.min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.buffer.len() == CHUNK_SIZE && !data.is_empty() {
                self.flush_chunk(out);
            }
        }
    }

    fn flush_chunk(&mut self, out: &mut Vec<u8>) {
        let chunk = std::mem::replace(&mut self.buffer, Vec::with_capacity(CHUNK_SIZE));
        let mut ciphertext = vec![0u8; chunk.len()];
        let cv = process_chunk(&self.key, self.chunk_index, &chunk, &mut ciphertext, Direction::Encrypt);
        self.chunk_index += 1;
        self.tag_hasher.absorb_cv(&cv);
        out.extend_from_slice(&ciphertext);
    }

    /// Finalizes the last (possibly empty, possibly partial) chunk and
    /// returns the 32-byte tag.
    pub fn finalize(mut self, out: &mut Vec<u8>) -> [u8; TAG_LEN] {
        let chunk = std::mem::take(&mut self.buffer);
        let mut ciphertext = vec![0u8; chunk.len()];
        let cv = process_chunk(&self.key, self.chunk_index, &chunk, &mut ciphertext, Direction::Encrypt);
        self.tag_hasher.absorb_cv(&cv);
        out.extend_from_slice(&ciphertext);
        self.tag_hasher.finalize()
    }
}

/// An incremental TreeWrap decryptor, symmetric to [`Encryptor`].
pub struct Decryptor {
    key: [u8; KEY_LEN],
    buffer: Vec<u8>,
    chunk_index: u64,
    tag_hasher: TagHasher,
}

impl Decryptor {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Decryptor {
            key,
            buffer: Vec::with_capacity(CHUNK_SIZE),
            chunk_index: 0,
            tag_hasher: TagHasher::new(),
        }
    }

    pub fn update(&mut self, ciphertext: &[u8], out: &mut Vec<u8>) {
        let mut data = ciphertext;
        while !data.is_empty() {
            let room = CHUNK_SIZE - self.buffer.len();
            let take = room.min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.buffer.len() == CHUNK_SIZE && !data.is_empty() {
                self.flush_chunk(out);
            }
        }
    }

    fn flush_chunk(&mut self, out: &mut Vec<u8>) {
        let chunk = std::mem::replace(&mut self.buffer, Vec::with_capacity(CHUNK_SIZE));
        let mut plaintext = vec![0u8; chunk.len()];
        let cv = process_chunk(&self.key, self.chunk_index, &chunk, &mut plaintext, Direction::Decrypt);
        self.chunk_index += 1;
        self.tag_hasher.absorb_cv(&cv);
        out.extend_from_slice(&plaintext);
    }

    /// Finalizes the last chunk and returns the computed tag. Callers MUST
    /// compare this against the expected tag in constant time.
    pub fn finalize(mut self, out: &mut Vec<u8>) -> [u8; TAG_LEN] {
        let chunk = std::mem::take(&mut self.buffer);
        let mut plaintext = vec![0u8; chunk.len()];
        let cv = process_chunk(&self.key, self.chunk_index, &chunk, &mut plaintext, Direction::Decrypt);
        self.tag_hasher.absorb_cv(&cv);
        out.extend_from_slice(&plaintext);
        self.tag_hasher.finalize()
    }
}
