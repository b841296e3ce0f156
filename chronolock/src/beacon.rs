//! Verification of beacon round signatures.
//!
//! A round signature is only admitted as an IBE decryption key after it
//! verifies against the chain's long-term public key. The chains supported
//! here sign each round number on its own: the message is the round digest,
//! with no previous signature mixed in.

use crate::errors::{CryptoError, Error};
use crate::ibe::H2C_DST;
use crate::round_identity;
use bls12_381_plus::{pairing, ExpandMsgXmd, G1Affine, G2Affine, G2Projective};
use group::Curve;
use sha2::Sha256;

/// Scheme identifier of chains this crate can decrypt: one signature per
/// round, decoupled from the previous one, public keys on G1.
pub const UNCHAINED_SCHEME_ID: &str = "pedersen-bls-unchained";

/// Checks that `signature` is the chain's BLS signature over `round_number`.
pub fn verify(public_key: &G1Affine, round_number: u64, signature: &G2Affine) -> Result<(), Error> {
    let message = round_identity(round_number);
    let qid = G2Projective::hash::<ExpandMsgXmd<Sha256>>(&message, H2C_DST).to_affine();

    // e(pk, H(round)) == e(G1, signature)
    if pairing(public_key, &qid) != pairing(&G1Affine::generator(), signature) {
        return Err(CryptoError::InvalidSignature {
            round: round_number,
        }
        .into());
    }

    Ok(())
}
