//! TurboSHAKE128: an incremental sponge over Keccak-p\[1600,12\] with rate 168
//! and capacity 32.
//!
//! Modeled the way `cyclist::CyclistCore` models its own sponge: a plain
//! value type around a `[u8; 200]` state plus a small amount of bookkeeping,
//! mutated through `&mut self` methods rather than hidden behind a trait
//! object. Unlike Cyclist's duplex construction, TurboSHAKE is a one-shot
//! sponge: absorb any number of times, then squeeze any number of times, with
//! no interleaving.

use subtle::{Choice, ConstantTimeEq};

use crate::keccak_p::{self, State, WIDTH};

/// The sponge's rate: the portion of the state mixed with input/output.
pub const RATE: usize = 168;

/// An incremental TurboSHAKE128 sponge.
#[derive(Clone)]
pub struct TurboShake128 {
    state: State,
    pos: usize,
    ds: u8,
    squeezing: bool,
}

impl TurboShake128 {
    /// Creates a new hasher with the given domain-separation byte.
    ///
    /// # Panics
    ///
    /// Panics if `ds` is not in `[0x01, 0x7F]`.
    pub fn new(ds: u8) -> Self {
        assert!((0x01..=0x7F).contains(&ds), "domain byte out of range: {ds:#04x}");
        TurboShake128 {
            state: keccak_p::new_state(),
            pos: 0,
            ds,
            squeezing: false,
        }
    }

    /// Absorbs `data` into the sponge.
    ///
    /// # Panics
    ///
    /// Panics if called after the first call to [`Self::read`].
    pub fn write(&mut self, mut data: &[u8]) {
        assert!(!self.squeezing, "cannot write to a TurboSHAKE128 that is already squeezing");
        while !data.is_empty() {
            if self.pos == RATE {
                (keccak_p::backend().p1600)(&mut self.state);
                self.pos = 0;
            }
            let take = data.len().min(RATE - self.pos);
            crate::xor::xor_in_place(&mut self.state[self.pos..self.pos + take], &data[..take]);
            self.pos += take;
            data = &data[take..];
        }
    }

    /// Fills `buf` with squeezed bytes, finalizing the sponge on first call.
    pub fn read(&mut self, mut buf: &mut [u8]) {
        if !self.squeezing {
            self.pad_and_permute();
            self.squeezing = true;
            self.pos = 0;
        }
        while !buf.is_empty() {
            if self.pos == RATE {
                (keccak_p::backend().p1600)(&mut self.state);
                self.pos = 0;
            }
            let take = buf.len().min(RATE - self.pos);
            buf[..take].copy_from_slice(&self.state[self.pos..self.pos + take]);
            self.pos += take;
            buf = &mut buf[take..];
        }
    }

    /// Returns `n` freshly squeezed bytes.
    #[cfg(feature = "std")]
    pub fn squeeze(&mut self, n: usize) -> Vec<u8> {
        let mut out = vec![0u8; n];
        self.read(&mut out);
        out
    }

    /// XORs the domain byte at the pad position and `0x80` at the last rate
    /// byte, then permutes once. This is the pure padding step shared by
    /// [`Self::read`] and [`Self::chain`].
    fn pad_and_permute(&mut self) {
        self.state[self.pos] ^= self.ds;
        self.state[RATE - 1] ^= 0x80;
        (keccak_p::backend().p1600)(&mut self.state);
    }

    /// Zeroizes the state and reassigns the domain byte, resetting `pos` and
    /// `squeezing`.
    pub fn reset(&mut self, ds: u8) {
        assert!((0x01..=0x7F).contains(&ds), "domain byte out of range: {ds:#04x}");
        use zeroize::Zeroize;
        self.state.zeroize();
        self.pos = 0;
        self.ds = ds;
        self.squeezing = false;
    }

    /// A parallel dual finalization: `a` (not yet squeezing) and `b` (a copy
    /// of `a`'s state with `b`'s own domain byte `ds_b`) finalize together
    /// via a single 2x permutation call. This is the hot path of every
    /// Protocol finalizer.
    ///
    /// # Panics
    ///
    /// Panics if `a` is already squeezing.
    pub fn chain(a: &mut TurboShake128, b: &mut TurboShake128, ds_b: u8) {
        assert!(!a.squeezing, "cannot chain from a TurboSHAKE128 that is already squeezing");
        assert!((0x01..=0x7F).contains(&ds_b), "domain byte out of range: {ds_b:#04x}");

        b.state = a.state;
        b.pos = a.pos;
        b.ds = ds_b;

        a.state[a.pos] ^= a.ds;
        a.state[RATE - 1] ^= 0x80;
        b.state[b.pos] ^= b.ds;
        b.state[RATE - 1] ^= 0x80;

        (keccak_p::backend().p1600x2)(&mut a.state, &mut b.state);

        a.squeezing = true;
        a.pos = 0;
        b.squeezing = true;
        b.pos = 0;
    }

    /// The domain-separation byte this hasher was constructed/reset with.
    pub fn domain(&self) -> u8 {
        self.ds
    }

    /// `true` once squeezing has begun; writes are forbidden from then on.
    pub fn is_squeezing(&self) -> bool {
        self.squeezing
    }
}

impl ConstantTimeEq for TurboShake128 {
    /// Constant-time equality over the full state, `pos`, `ds`, and
    /// `squeezing`. Test-only: comparing whole sponge states like this has
    /// no legitimate use in production paths and must not be used on secret
    /// state there.
    fn ct_eq(&self, other: &Self) -> Choice {
        let state_eq = self.state.ct_eq(&other.state);
        let pos_eq = Choice::from((self.pos == other.pos) as u8);
        let ds_eq = self.ds.ct_eq(&other.ds);
        let squeezing_eq = Choice::from((self.squeezing == other.squeezing) as u8);
        state_eq & pos_eq & ds_eq & squeezing_eq
    }
}

const _: () = assert!(RATE < WIDTH);
