//! Time lock encryption against a drand randomness beacon.
//!
//! Data is encrypted so it can only be decrypted once the beacon publishes
//! its signature over a chosen future round: a fresh 32-byte data encryption
//! key is wrapped with identity-based encryption under the round's identity,
//! the payload is encrypted in 64 KiB chunks with an AEAD under that key,
//! and every chunk is written as a self-describing frame. Decryption
//! verifies the round signature against the chain's public key before using
//! it to unwrap the key.
//!
//! The network, frame codec, and chunk cipher are injected capabilities;
//! [`codec::FrameCodec`] and [`aead::Cipher`] are the defaults, and a drand
//! HTTP implementation of [`Network`] lives in the `chronolock-drand` crate.

pub mod aead;
pub mod beacon;
pub mod codec;
mod errors;
pub mod ibe;

pub use errors::{CodecError, CryptoError, Error};

use bls12_381_plus::G1Affine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{self, Read, Write};
use std::time::{Duration, SystemTime};
use tracing::{debug, info_span};
use zeroize::Zeroizing;

/// Plaintext bytes carried by one frame. Only the final frame of a stream
/// may be shorter.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Width of the data encryption key.
pub const DEK_SIZE: usize = 32;

/// Everything needed to decrypt a frame once its round has been signed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub round_number: u64,
    pub chain_hash: String,
}

/// The IBE-wrapped data encryption key, in serialized form: `u` is a
/// compressed G1 point, `v` and `w` are masks as wide as the key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WrappedDek {
    pub u: Vec<u8>,
    pub v: Vec<u8>,
    pub w: Vec<u8>,
}

/// One encrypted chunk as it appears on the wire. Every frame of a session
/// repeats the same metadata and wrapped key, so a truncated stream stays
/// decryptable up to its last complete frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub metadata: Metadata,
    pub dek: WrappedDek,
    pub payload: Vec<u8>,
}

/// Outcome of decoding one frame from a stream.
#[derive(Debug)]
pub enum Decoded {
    Frame(Frame),
    /// The stream ended cleanly before the start of another frame.
    End,
}

/// Round and time bookkeeping for one beacon chain, plus retrieval of round
/// signatures. Implementations own their transport, timeouts, and
/// cancellation; an interrupted call surfaces as [`Error::Network`].
pub trait Network {
    /// Identifier of the chain, stored in each frame's metadata.
    fn chain_hash(&self) -> String;

    /// The chain's long-term public key as a compressed G1 point.
    fn public_key(&self) -> Result<Vec<u8>, Error>;

    /// The round that will be signed at or after the given time.
    fn round_number(&self, time: SystemTime) -> Result<u64, Error>;

    /// The round reached `duration` from now, with its identity digest.
    fn encryption_round_and_id(&self, duration: Duration) -> Result<(u64, [u8; 32]), Error>;

    /// The signature over `round_number` if the beacon has produced it,
    /// `None` while the round lies in the future.
    fn is_ready_to_decrypt(&self, round_number: u64) -> Result<Option<Vec<u8>>, Error>;
}

/// Writes one frame to the destination, optionally armored.
pub trait Encoder {
    fn encode<W: Write>(&self, dst: &mut W, frame: &Frame, armor: bool) -> Result<(), Error>;
}

/// Reads exactly one frame from the source, optionally armored.
pub trait Decoder {
    fn decode<R: Read>(&self, src: &mut R, armor: bool) -> Result<Decoded, Error>;
}

/// Encrypts one chunk under a 32-byte key. Implementations must be safe
/// under key reuse across the chunks of a session.
pub trait Encrypter {
    fn encrypt(&self, key: &[u8], plain: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Decrypts one chunk under a 32-byte key.
pub trait Decrypter {
    fn decrypt(&self, key: &[u8], cipher: &[u8]) -> Result<Vec<u8>, Error>;
}

/// The identity a round is encrypted to: the SHA-256 digest of the round
/// number as 8 big-endian bytes. This is also the message the beacon signs,
/// which is what makes the signature usable as the IBE private key.
pub fn round_identity(round_number: u64) -> [u8; 32] {
    Sha256::new()
        .chain(round_number.to_be_bytes())
        .finalize()
        .into()
}

/// Encrypts everything read from `src` so it can be decrypted once
/// `round_number` has been signed. The identity is derived locally; the
/// network is only asked for the chain's public key.
pub fn encrypt_with_round<W, R, E, N, C>(
    dst: W,
    src: R,
    encoder: &E,
    network: &N,
    encrypter: &C,
    round_number: u64,
    armor: bool,
) -> Result<(), Error>
where
    W: Write,
    R: Read,
    E: Encoder,
    N: Network,
    C: Encrypter,
{
    let id = round_identity(round_number);
    encrypt_frames(dst, src, encoder, network, encrypter, round_number, &id, armor)
}

/// Encrypts everything read from `src` towards the round the chain reaches
/// `duration` from now.
pub fn encrypt_with_duration<W, R, E, N, C>(
    dst: W,
    src: R,
    encoder: &E,
    network: &N,
    encrypter: &C,
    duration: Duration,
    armor: bool,
) -> Result<(), Error>
where
    W: Write,
    R: Read,
    E: Encoder,
    N: Network,
    C: Encrypter,
{
    let (round_number, id) = network.encryption_round_and_id(duration)?;
    encrypt_frames(dst, src, encoder, network, encrypter, round_number, &id, armor)
}

#[allow(clippy::too_many_arguments)]
fn encrypt_frames<W, R, E, N, C>(
    mut dst: W,
    mut src: R,
    encoder: &E,
    network: &N,
    encrypter: &C,
    round_number: u64,
    id: &[u8; 32],
    armor: bool,
) -> Result<(), Error>
where
    W: Write,
    R: Read,
    E: Encoder,
    N: Network,
    C: Encrypter,
{
    // One DEK per session, wrapped once, repeated in every frame.
    let mut dek = Zeroizing::new([0u8; DEK_SIZE]);
    OsRng.try_fill_bytes(&mut dek[..])?;

    let public_key = ibe::g1_from_bytes(&network.public_key()?)?;
    let wrapped = info_span!("ibe.encrypt").in_scope(|| ibe::encrypt(&public_key, id, &dek))?;

    let mut frame = Frame {
        metadata: Metadata {
            round_number,
            chain_hash: network.chain_hash(),
        },
        dek: WrappedDek {
            u: wrapped.u.to_compressed().to_vec(),
            v: wrapped.v,
            w: wrapped.w,
        },
        payload: Vec::new(),
    };

    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let (n, eof) = read_chunk(&mut src, &mut buf)?;
        if n > 0 {
            frame.payload = encrypter.encrypt(dek.as_ref(), &buf[..n])?;
            encoder.encode(&mut dst, &frame, armor)?;
        }
        if eof {
            return Ok(());
        }
    }
}

/// Decrypts a stream of frames, writing plaintext chunks in frame order.
///
/// The first frame whose round the beacon has not signed yet terminates the
/// session with [`Error::TooEarly`]; nothing is written for it or any later
/// frame. Frames are gated, verified, and unwrapped independently, so a
/// stream mixing rounds decrypts as long as every round has matured.
pub fn decrypt<W, R, D, N, C>(
    mut dst: W,
    mut src: R,
    decoder: &D,
    network: &N,
    decrypter: &C,
    armor: bool,
) -> Result<(), Error>
where
    W: Write,
    R: Read,
    D: Decoder,
    N: Network,
    C: Decrypter,
{
    let mut session = Session::default();
    loop {
        let frame = match decoder.decode(&mut src, armor)? {
            Decoded::End => return Ok(()),
            Decoded::Frame(frame) => frame,
        };

        let dek = unwrap_dek(network, &frame, &mut session)?;
        let plain = decrypter.decrypt(dek.as_ref(), &frame.payload)?;
        dst.write_all(&plain)?;
    }
}

/// Material shared by the frames of one decryption call: the chain public
/// key is fetched once, and the unwrapped DEK is reused while consecutive
/// frames name the same round.
#[derive(Default)]
struct Session {
    public_key: Option<G1Affine>,
    dek: Option<(u64, Zeroizing<[u8; DEK_SIZE]>)>,
}

fn unwrap_dek<N: Network>(
    network: &N,
    frame: &Frame,
    session: &mut Session,
) -> Result<Zeroizing<[u8; DEK_SIZE]>, Error> {
    let round_number = frame.metadata.round_number;

    if let Some((round, dek)) = &session.dek {
        if *round == round_number {
            debug!(round = round_number, "reusing unwrapped DEK");
            return Ok(dek.clone());
        }
    }

    let signature = network
        .is_ready_to_decrypt(round_number)?
        .ok_or(Error::TooEarly(round_number))?;
    let signature = ibe::g2_from_bytes(&signature)?;

    let ciphertext = ibe::Ciphertext {
        u: ibe::g1_from_bytes(&frame.dek.u)?,
        v: frame.dek.v.clone(),
        w: frame.dek.w.clone(),
    };

    let public_key = match session.public_key {
        Some(public_key) => public_key,
        None => {
            let public_key = ibe::g1_from_bytes(&network.public_key()?)?;
            session.public_key = Some(public_key);
            public_key
        }
    };

    info_span!("beacon.verify")
        .in_scope(|| beacon::verify(&public_key, round_number, &signature))?;
    let dek = info_span!("ibe.decrypt").in_scope(|| ibe::decrypt(&signature, &ciphertext))?;

    session.dek = Some((round_number, dek.clone()));
    Ok(dek)
}

// Fills `buf` from the reader. Returns the number of bytes read and whether
// the stream ended: a full buffer with the stream still open, a short fill
// that ran into end of stream (the final chunk), or nothing at all.
fn read_chunk<R: Read>(src: &mut R, buf: &mut [u8]) -> Result<(usize, bool), Error> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => return Ok((filled, true)),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok((filled, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aead::Cipher;
    use crate::codec::FrameCodec;
    use bls12_381_plus::{ExpandMsgXmd, G1Projective, G2Projective, Scalar};
    use group::Curve;

    /// A beacon with a known master scalar, minting signatures on demand.
    struct TestBeacon {
        secret: Scalar,
        public_key: Vec<u8>,
        chain_hash: String,
        round: u64,
        ready: bool,
        sign_round: Option<u64>,
    }

    impl TestBeacon {
        fn new(round: u64) -> Self {
            let secret = Scalar::from(48715u64);
            let public_key = (G1Projective::generator() * secret)
                .to_affine()
                .to_compressed()
                .to_vec();
            Self {
                secret,
                public_key,
                chain_hash: "1e9b7c3f".repeat(8),
                round,
                ready: true,
                sign_round: None,
            }
        }

        fn sign(&self, round_number: u64) -> Vec<u8> {
            let message = round_identity(round_number);
            let qid = G2Projective::hash::<ExpandMsgXmd<sha2::Sha256>>(&message, ibe::H2C_DST);
            (qid * self.secret).to_affine().to_compressed().to_vec()
        }
    }

    impl Network for TestBeacon {
        fn chain_hash(&self) -> String {
            self.chain_hash.clone()
        }

        fn public_key(&self) -> Result<Vec<u8>, Error> {
            Ok(self.public_key.clone())
        }

        fn round_number(&self, _time: SystemTime) -> Result<u64, Error> {
            Ok(self.round)
        }

        fn encryption_round_and_id(&self, _duration: Duration) -> Result<(u64, [u8; 32]), Error> {
            Ok((self.round, round_identity(self.round)))
        }

        fn is_ready_to_decrypt(&self, round_number: u64) -> Result<Option<Vec<u8>>, Error> {
            if !self.ready {
                return Ok(None);
            }
            Ok(Some(self.sign(self.sign_round.unwrap_or(round_number))))
        }
    }

    fn plaintext(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn lock(network: &TestBeacon, round: u64, plain: &[u8], armor: bool) -> Vec<u8> {
        let mut out = vec![];
        encrypt_with_round(&mut out, plain, &FrameCodec, network, &Cipher, round, armor).unwrap();
        out
    }

    fn unlock(network: &TestBeacon, cipher: &[u8], armor: bool) -> Result<Vec<u8>, Error> {
        let mut out = vec![];
        decrypt(&mut out, cipher, &FrameCodec, network, &Cipher, armor)?;
        Ok(out)
    }

    fn frames(cipher: &[u8]) -> Vec<Frame> {
        let mut src = cipher;
        let mut frames = vec![];
        loop {
            match FrameCodec.decode(&mut src, false).unwrap() {
                Decoded::Frame(f) => frames.push(f),
                Decoded::End => return frames,
            }
        }
    }

    fn reencode(frames: &[Frame]) -> Vec<u8> {
        let mut out = vec![];
        for f in frames {
            FrameCodec.encode(&mut out, f, false).unwrap();
        }
        out
    }

    #[test]
    fn round_identity_is_sha256_of_big_endian_round() {
        let expected: [u8; 32] = Sha256::new()
            .chain([0, 0, 0, 0, 0, 0, 0, 1])
            .finalize()
            .into();
        assert_eq!(round_identity(1), expected);
        assert_ne!(round_identity(1), round_identity(1 << 32));
    }

    #[test]
    fn round_trip_across_chunk_boundaries() {
        let network = TestBeacon::new(1000);
        for len in [0, 1, 5, CHUNK_SIZE - 1, CHUNK_SIZE, CHUNK_SIZE + 1] {
            let plain = plaintext(len);
            let cipher = lock(&network, 1000, &plain, false);
            let recovered = unlock(&network, &cipher, false).unwrap();
            assert_eq!(recovered, plain, "length {len}");
        }
    }

    #[test]
    fn empty_input_emits_no_frames_and_decrypts_to_empty() {
        let network = TestBeacon::new(1);
        let cipher = lock(&network, 1, &[], false);
        assert!(cipher.is_empty());
        assert_eq!(unlock(&network, &cipher, false).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn frames_carry_the_chunk_layout() {
        let network = TestBeacon::new(1000);

        let cipher = lock(&network, 1000, &plaintext(2 * CHUNK_SIZE + 1808), false);
        let sizes: Vec<usize> = frames(&cipher).iter().map(|f| f.payload.len()).collect();
        assert_eq!(
            sizes,
            vec![
                CHUNK_SIZE + aead::OVERHEAD,
                CHUNK_SIZE + aead::OVERHEAD,
                1808 + aead::OVERHEAD
            ]
        );

        let cipher = lock(&network, 1000, &plaintext(130_000), false);
        let sizes: Vec<usize> = frames(&cipher).iter().map(|f| f.payload.len()).collect();
        assert_eq!(
            sizes,
            vec![CHUNK_SIZE + aead::OVERHEAD, 130_000 - CHUNK_SIZE + aead::OVERHEAD]
        );

        // An exact multiple of the chunk size adds no empty tail frame.
        let cipher = lock(&network, 1000, &plaintext(2 * CHUNK_SIZE), false);
        assert_eq!(frames(&cipher).len(), 2);
    }

    #[test]
    fn every_frame_repeats_the_session_key_material() {
        let network = TestBeacon::new(77);
        let cipher = lock(&network, 77, &plaintext(3 * CHUNK_SIZE), false);
        let frames = frames(&cipher);
        assert_eq!(frames.len(), 3);
        for frame in &frames {
            assert_eq!(frame.metadata.round_number, 77);
            assert_eq!(frame.metadata.chain_hash, network.chain_hash);
            assert_eq!(frame.dek, frames[0].dek);
        }
    }

    #[test]
    fn not_ready_round_is_too_early_and_writes_nothing() {
        let mut network = TestBeacon::new(1000);
        let cipher = lock(&network, 1000, &plaintext(100), false);

        network.ready = false;
        let mut out = vec![];
        let err = decrypt(&mut out, &cipher[..], &FrameCodec, &network, &Cipher, false).unwrap_err();
        assert!(matches!(err, Error::TooEarly(1000)));
        assert!(out.is_empty());
    }

    #[test]
    fn tampered_payload_fails_authentication() {
        let network = TestBeacon::new(5);
        let cipher = lock(&network, 5, &plaintext(100), false);

        let mut frames = frames(&cipher);
        let mid = frames[0].payload.len() / 2;
        frames[0].payload[mid] ^= 1;
        let err = unlock(&network, &reencode(&frames), false).unwrap_err();
        assert!(matches!(
            err,
            Error::Crypto(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn tampered_wrapped_key_fails_before_the_payload() {
        let network = TestBeacon::new(5);
        let cipher = lock(&network, 5, &plaintext(100), false);

        let mut tampered = frames(&cipher);
        tampered[0].dek.v[7] ^= 1;
        assert!(matches!(
            unlock(&network, &reencode(&tampered), false).unwrap_err(),
            Error::Crypto(CryptoError::InvalidProof)
        ));

        let mut tampered = frames(&cipher);
        tampered[0].dek.w[0] ^= 0x80;
        assert!(matches!(
            unlock(&network, &reencode(&tampered), false).unwrap_err(),
            Error::Crypto(CryptoError::InvalidProof)
        ));

        let mut tampered = frames(&cipher);
        tampered[0].dek.u[5] ^= 1;
        assert!(matches!(
            unlock(&network, &reencode(&tampered), false).unwrap_err(),
            Error::Crypto(_)
        ));
    }

    #[test]
    fn signature_for_another_round_is_rejected_before_unwrapping() {
        let mut network = TestBeacon::new(40);
        let cipher = lock(&network, 40, &plaintext(64), false);

        network.sign_round = Some(41);
        let err = unlock(&network, &cipher, false).unwrap_err();
        assert!(matches!(
            err,
            Error::Crypto(CryptoError::InvalidSignature { round: 40 })
        ));
    }

    #[test]
    fn armored_round_trip_is_printable_and_lossless() {
        let network = TestBeacon::new(9);
        let plain = plaintext(CHUNK_SIZE + 17);
        let cipher = lock(&network, 9, &plain, true);
        assert!(cipher.iter().all(|b| b.is_ascii()));
        assert_eq!(unlock(&network, &cipher, true).unwrap(), plain);
    }

    #[test]
    fn concatenated_streams_with_different_rounds_decrypt_in_order() {
        let network = TestBeacon::new(800);
        let first = plaintext(CHUNK_SIZE + 5);
        let second = plaintext(33);

        let mut cipher = lock(&network, 800, &first, false);
        cipher.extend_from_slice(&lock(&network, 900, &second, false));

        let recovered = unlock(&network, &cipher, false).unwrap();
        let expected: Vec<u8> = first.into_iter().chain(second).collect();
        assert_eq!(recovered, expected);
    }

    #[test]
    fn duration_target_asks_the_network_for_the_round() {
        let network = TestBeacon::new(1234);
        let mut cipher = vec![];
        encrypt_with_duration(
            &mut cipher,
            &plaintext(10)[..],
            &FrameCodec,
            &network,
            &Cipher,
            Duration::from_secs(90),
            false,
        )
        .unwrap();

        let frames = frames(&cipher);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].metadata.round_number, 1234);
        assert_eq!(unlock(&network, &cipher, false).unwrap(), plaintext(10));
    }

    #[test]
    fn truncated_ciphertext_is_a_codec_error() {
        let network = TestBeacon::new(2);
        let cipher = lock(&network, 2, &plaintext(50), false);
        let err = unlock(&network, &cipher[..cipher.len() - 3], false).unwrap_err();
        assert!(matches!(err, Error::Codec(CodecError::UnexpectedEnd)));
    }

    /// Reader that hands out one byte at a time to exercise short reads.
    struct Dribble<'a>(&'a [u8]);

    impl Read for Dribble<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0.is_empty() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.0[0];
            self.0 = &self.0[1..];
            Ok(1)
        }
    }

    #[test]
    fn read_chunk_assembles_short_reads() {
        let data = plaintext(20);
        let mut src = Dribble(&data);
        let mut buf = [0u8; 8];

        assert_eq!(read_chunk(&mut src, &mut buf).unwrap(), (8, false));
        assert_eq!(buf, data[..8]);
        assert_eq!(read_chunk(&mut src, &mut buf).unwrap(), (8, false));
        assert_eq!(read_chunk(&mut src, &mut buf).unwrap(), (4, true));
        assert_eq!(buf[..4], data[16..]);
    }

    #[test]
    fn dribbled_input_still_chunks_at_the_boundary() {
        let network = TestBeacon::new(6);
        let plain = plaintext(CHUNK_SIZE + 100);
        let mut cipher = vec![];
        encrypt_with_round(
            &mut cipher,
            Dribble(&plain),
            &FrameCodec,
            &network,
            &Cipher,
            6,
            false,
        )
        .unwrap();
        assert_eq!(frames(&cipher).len(), 2);
        assert_eq!(unlock(&network, &cipher, false).unwrap(), plain);
    }
}
