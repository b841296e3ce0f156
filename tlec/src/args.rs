use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_HOST: &str = "https://pl-us.testnet.drand.sh";
pub const DEFAULT_CHAIN: &str = "7672797f548f3f4748ac4bf3352fc6c6b6468c9ad40ad456a397545c6e2df5bf";

/// Time lock encryption against a drand randomness beacon
///
/// INPUT defaults to standard input, and OUTPUT defaults to standard output.
///
/// The target can be a specific round (--round-number 123) or a duration
/// from now (--duration 30s, 2h45m). Decryption works once the beacon has
/// published the signature for the round; before that it reports how the
/// attempt was too early.
#[derive(Parser)]
#[command(author, version, about, verbatim_doc_comment)]
#[command(propagate_version = true)]
pub struct Options {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Encrypt towards a future round
    Lock(LockArgs),
    /// Decrypt once the round signature is public
    Unlock(UnlockArgs),
    /// Print the chain parameters
    Metadata(NetworkArgs),
}

#[derive(Args)]
pub struct NetworkArgs {
    /// Base URL of the drand HTTP endpoint.
    #[arg(long, default_value = DEFAULT_HOST)]
    pub network_host: String,
    /// Hex identifier of the beacon chain.
    #[arg(long, default_value = DEFAULT_CHAIN)]
    pub chain_hash: String,
}

#[derive(Args)]
pub struct LockArgs {
    #[clap(flatten)]
    pub network: NetworkArgs,
    /// Round to lock to.
    #[arg(short, long, conflicts_with = "duration")]
    pub round_number: Option<u64>,
    /// Time from now to lock for, e.g. 30s or 2h45m.
    #[arg(short, long)]
    pub duration: Option<humantime::Duration>,
    /// Wrap the output in printable armor.
    #[arg(short, long, default_value_t = false)]
    pub armor: bool,
    /// Write the result to the file at path.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// File to encrypt.
    pub input: Option<PathBuf>,
}

#[derive(Args)]
pub struct UnlockArgs {
    #[clap(flatten)]
    pub network: NetworkArgs,
    /// Read the input as printable armor.
    #[arg(short, long, default_value_t = false)]
    pub armor: bool,
    /// Write the result to the file at path.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// File to decrypt.
    pub input: Option<PathBuf>,
}
