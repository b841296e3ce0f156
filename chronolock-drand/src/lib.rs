//! drand HTTP implementation of the chronolock network capability.
//!
//! Chain parameters are fetched once at construction and cached: the round
//! schedule is pure arithmetic over genesis time and period, so only
//! signature retrieval talks to the remote afterwards.

use anyhow::anyhow;
use chronolock::{beacon, round_identity, Error, Network};
use drand_core::HttpClient;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// A drand chain reached over its public HTTP API.
pub struct HttpNetwork {
    client: HttpClient,
    chain_hash: String,
    public_key: Vec<u8>,
    genesis_time: u64,
    period: u64,
}

impl HttpNetwork {
    /// Connects to `host/chain_hash` and fails fast unless the chain signs
    /// rounds with the unchained, decoupled-previous-signature scheme:
    /// signatures of chained chains never decrypt these ciphertexts.
    pub fn new(host: &str, chain_hash: &str) -> Result<Self, Error> {
        let url = format!("{}/{}", host.trim_end_matches('/'), chain_hash);
        let client =
            HttpClient::new(&url, None).map_err(|e| Error::Network(anyhow!("client: {e}")))?;
        let info = client
            .chain_info()
            .map_err(|e| Error::Network(anyhow!("chain info: {e}")))?;

        if info.scheme_id() != beacon::UNCHAINED_SCHEME_ID {
            return Err(Error::UnsupportedScheme(info.scheme_id().to_string()));
        }

        debug!(chain = %hex::encode(info.hash()), "connected to drand chain");
        Ok(Self {
            chain_hash: hex::encode(info.hash()),
            public_key: info.public_key(),
            genesis_time: info.genesis_time(),
            period: info.period(),
            client,
        })
    }

    /// Unix timestamp of the chain's first round.
    pub fn genesis_time(&self) -> u64 {
        self.genesis_time
    }

    /// Seconds between consecutive rounds.
    pub fn period(&self) -> u64 {
        self.period
    }

    fn round_at(&self, time: SystemTime) -> u64 {
        round_at(self.genesis_time, self.period, time)
    }
}

impl Network for HttpNetwork {
    fn chain_hash(&self) -> String {
        self.chain_hash.clone()
    }

    fn public_key(&self) -> Result<Vec<u8>, Error> {
        Ok(self.public_key.clone())
    }

    fn round_number(&self, time: SystemTime) -> Result<u64, Error> {
        Ok(self.round_at(time))
    }

    fn encryption_round_and_id(&self, duration: Duration) -> Result<(u64, [u8; 32]), Error> {
        let round_number = self.round_at(SystemTime::now() + duration);
        Ok((round_number, round_identity(round_number)))
    }

    fn is_ready_to_decrypt(&self, round_number: u64) -> Result<Option<Vec<u8>>, Error> {
        if round_number > self.round_at(SystemTime::now()) {
            return Ok(None);
        }
        let beacon = self
            .client
            .get(round_number)
            .map_err(|e| Error::Network(anyhow!("round {round_number}: {e}")))?;
        Ok(Some(beacon.signature()))
    }
}

// The round signed at `time`: rounds start at 1 on genesis and advance every
// `period` seconds.
fn round_at(genesis_time: u64, period: u64, time: SystemTime) -> u64 {
    let now = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    if now < genesis_time || period == 0 {
        return 1;
    }
    (now - genesis_time) / period + 1
}
