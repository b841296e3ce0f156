//! Identity-based encryption of the 32-byte data encryption key.
//!
//! This is the pairing-based construction the drand beacons use for time
//! lock encryption: the identity is the round digest, and the round
//! signature doubles as the IBE private key. Hash domains and the GT
//! serialization order have to match the drand implementation exactly,
//! otherwise ciphertexts stop being portable.

use crate::errors::{CryptoError, Error};
use bls12_381_plus::{
    ExpandMsg, ExpandMsgXmd, G1Affine, G1Projective, G2Affine, G2Projective, Gt, Scalar,
};
use group::Curve;
use itertools::Itertools;
use rand::RngCore;
use sha2::{digest::BlockInput, Digest, Sha256};
use std::marker::PhantomData;
use zeroize::Zeroizing;

/// Width of the wrapped message and of both masks.
pub const BLOCK_SIZE: usize = 32;
/// Compressed G1 point width.
pub const G1_SIZE: usize = 48;
/// Compressed G2 point width.
pub const G2_SIZE: usize = 96;

const FP_CHUNK_SIZE: usize = 48;

/// Domain separation tag for hashing identities into G2, shared with the
/// beacon signatures themselves.
pub const H2C_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

/// IBE ciphertext of a single 32-byte block.
#[derive(Clone, Debug, PartialEq)]
pub struct Ciphertext {
    pub u: G1Affine,
    pub v: Vec<u8>,
    pub w: Vec<u8>,
}

/// Parses a compressed G1 point, e.g. a chain public key or the `U`
/// component of a wrapped key.
pub fn g1_from_bytes(bytes: &[u8]) -> Result<G1Affine, Error> {
    let bytes: &[u8; G1_SIZE] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidG1Point)?;
    Option::from(G1Affine::from_compressed(bytes)).ok_or_else(|| CryptoError::InvalidG1Point.into())
}

/// Parses a compressed G2 point, e.g. a beacon round signature.
pub fn g2_from_bytes(bytes: &[u8]) -> Result<G2Affine, Error> {
    let bytes: &[u8; G2_SIZE] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidG2Point)?;
    Option::from(G2Affine::from_compressed(bytes)).ok_or_else(|| CryptoError::InvalidG2Point.into())
}

/// Encrypts `msg` so it can only be recovered with the signature over `id`.
pub fn encrypt(public_key: &G1Affine, id: &[u8], msg: &[u8; BLOCK_SIZE]) -> Result<Ciphertext, Error> {
    // 1. Compute Gid = e(public_key, Qid)
    let gid = {
        let qid = G2Projective::hash::<ExpandMsgXmd<Sha256>>(id, H2C_DST).to_affine();
        bls12_381_plus::pairing(public_key, &qid)
    };

    // 2. Derive a random sigma, same width as the message
    let mut sigma = Zeroizing::new([0u8; BLOCK_SIZE]);
    rand::thread_rng().fill_bytes(sigma.as_mut());

    // 3. Derive r from sigma and msg
    let r = h3(sigma.as_ref(), msg)?;

    // 4. Compute U = r * G1
    let u = (G1Projective::generator() * r).to_affine();

    // 5. Compute V = sigma XOR H2(Gid^r)
    let v = xor(sigma.as_ref(), &h2(&(gid * r)));

    // 6. Compute W = msg XOR H4(sigma)
    let w = xor(msg, &h4(sigma.as_ref()));

    Ok(Ciphertext { u, v, w })
}

/// Recovers the wrapped block given the signature over the identity the
/// block was encrypted to.
pub fn decrypt(signature: &G2Affine, c: &Ciphertext) -> Result<Zeroizing<[u8; BLOCK_SIZE]>, Error> {
    if c.v.len() != BLOCK_SIZE {
        return Err(CryptoError::InvalidMaskLength {
            expected: BLOCK_SIZE,
            got: c.v.len(),
        }
        .into());
    }
    if c.w.len() != BLOCK_SIZE {
        return Err(CryptoError::InvalidMaskLength {
            expected: BLOCK_SIZE,
            got: c.w.len(),
        }
        .into());
    }

    // 1. Compute sigma = V XOR H2(e(U, signature))
    let r_gid = bls12_381_plus::pairing(&c.u, signature);
    let sigma = Zeroizing::new(xor(&h2(&r_gid), &c.v));

    // 2. Compute msg = W XOR H4(sigma)
    let msg = Zeroizing::new(xor(&h4(sigma.as_ref()), &c.w));

    // 3. Recompute U = r * G1 and reject a forged ciphertext
    let r = h3(sigma.as_ref(), msg.as_ref())?;
    if (G1Projective::generator() * r).to_affine() != c.u {
        return Err(CryptoError::InvalidProof.into());
    }

    let mut out = Zeroizing::new([0u8; BLOCK_SIZE]);
    out.copy_from_slice(msg.as_ref());
    Ok(out)
}

// H2(gt) = sha256("IBE-H2" || gt), over the GT bytes in the Fp chunk order
// the drand implementation serializes.
fn h2(gt: &Gt) -> [u8; BLOCK_SIZE] {
    Sha256::new()
        .chain(b"IBE-H2")
        .chain(rev_chunks(&gt.to_bytes(), FP_CHUNK_SIZE))
        .finalize()
        .into()
}

// H3(sigma, msg) expands sha256("IBE-H3" || sigma || msg) into a scalar.
fn h3(sigma: &[u8], msg: &[u8]) -> Result<Scalar, Error> {
    let seed = Sha256::new()
        .chain(b"IBE-H3")
        .chain(sigma)
        .chain(msg)
        .finalize();

    let mut buf = [0u8; BLOCK_SIZE];
    ExpandMsgDrand::<Sha256>::expand_message(&seed, &[], &mut buf);
    Option::from(Scalar::from_bytes(&buf)).ok_or_else(|| CryptoError::InvalidScalar.into())
}

// H4(sigma) = sha256("IBE-H4" || sigma).
fn h4(sigma: &[u8]) -> [u8; BLOCK_SIZE] {
    Sha256::new().chain(b"IBE-H4").chain(sigma).finalize().into()
}

fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    if a.len() != b.len() {
        panic!("array length should be the same");
    }
    a.iter().zip(b.iter()).map(|(a, b)| a ^ b).collect()
}

/// Scalar expansion as the drand beacons compute it: hash iteratively with a
/// little-endian counter, drop one bit, and retry until the big-endian value
/// is a canonical scalar.
#[derive(Debug)]
pub struct ExpandMsgDrand<HashT> {
    phantom: PhantomData<HashT>,
}

impl<HashT> ExpandMsg for ExpandMsgDrand<HashT>
where
    HashT: Digest + BlockInput,
{
    fn expand_message(msg: &[u8], _dst: &[u8], buf: &mut [u8]) {
        const BITS_TO_MASK_FOR_BLS12381: usize = 1;
        for i in 1..u16::MAX {
            let mut h = HashT::new()
                .chain(i.to_le_bytes())
                .chain(msg)
                .finalize()
                .to_vec();
            *h.first_mut().unwrap() = h.first().unwrap() >> BITS_TO_MASK_FOR_BLS12381;
            // The hash is big-endian; Scalar::from_bytes wants little-endian.
            let rev = h.iter().copied().rev().collect_vec();
            let candidate: [u8; BLOCK_SIZE] = rev
                .as_slice()
                .try_into()
                .expect("hash output is one block wide");
            if Scalar::from_bytes(&candidate).is_some().unwrap_u8() == 1u8 {
                buf.copy_from_slice(&candidate);
                return;
            }
        }
    }
}

// Reverse a byte slice a chunk at a time: [1, 2, 3, 4] with chunk size 2
// becomes [3, 4, 1, 2].
fn rev_chunks(a: &[u8], chunk_size: usize) -> Vec<u8> {
    a.chunks(chunk_size).rev().collect_vec().concat()
}
