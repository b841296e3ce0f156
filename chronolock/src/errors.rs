use thiserror::Error;

/// Failures inside the pairing, IBE, or AEAD layers.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid compressed G1 point")]
    InvalidG1Point,
    #[error("invalid compressed G2 point")]
    InvalidG2Point,
    #[error("mask has length {got}, expected {expected}")]
    InvalidMaskLength { expected: usize, got: usize },
    #[error("hash does not expand to a canonical scalar")]
    InvalidScalar,
    #[error("ciphertext proof does not match")]
    InvalidProof,
    #[error("signature does not verify for round {round}")]
    InvalidSignature { round: u64 },
    #[error("invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
    #[error("payload authentication failed")]
    AuthenticationFailed,
    #[error("payload encryption failed")]
    EncryptionFailed,
}

/// Failures parsing or producing the frame wire format.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of input inside a frame")]
    UnexpectedEnd,
    #[error("{field} has length {got}, expected {expected}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("{field} of {len} bytes exceeds the frame limit")]
    TooLarge { field: &'static str, len: usize },
    #[error("chain hash is not valid UTF-8")]
    InvalidChainHash,
    #[error("varint does not fit in 64 bits")]
    InvalidVarint,
    #[error("armor: {0}")]
    Armor(&'static str),
}

/// Everything an encryption or decryption session can fail with.
///
/// A session never recovers locally: the first error terminates it, and
/// output already written stays written. Callers match on the variant to
/// tell a round that has not matured apart from genuine failures.
#[derive(Debug, Error)]
pub enum Error {
    /// The beacon has not signed the requested round yet.
    #[error("too early to decrypt round {0}")]
    TooEarly(u64),
    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
    #[error("network: {0}")]
    Network(anyhow::Error),
    #[error("random source: {0}")]
    Random(#[from] rand::Error),
    /// The chain advertises a signing scheme this crate cannot decrypt.
    #[error("unsupported beacon scheme {0:?}, expected an unchained chain")]
    UnsupportedScheme(String),
}
