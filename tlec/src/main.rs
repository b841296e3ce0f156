use crate::args::{Command, LockArgs, NetworkArgs, Options, UnlockArgs};
use anyhow::{anyhow, Context};
use chronolock::{aead, codec, Error, Network};
use chronolock_drand::HttpNetwork;
use clap::Parser;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::info;

mod args;

fn main() {
    let opts = Options::parse();

    tracing_subscriber::fmt()
        .with_env_filter(opts.verbose.log_level_filter().to_string().to_lowercase())
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run(opts.command) {
        match err.downcast_ref::<Error>() {
            Some(Error::TooEarly(round)) => {
                eprintln!("too early: round {round} has not been signed yet")
            }
            Some(Error::UnsupportedScheme(scheme)) => {
                eprintln!("chain uses scheme {scheme:?}; only unchained chains are supported")
            }
            _ => eprintln!("{err:#}"),
        }
        std::process::exit(1);
    }
}

fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Lock(args) => lock(args),
        Command::Unlock(args) => unlock(args),
        Command::Metadata(args) => metadata(args),
    }
}

fn lock(args: LockArgs) -> anyhow::Result<()> {
    let network = HttpNetwork::new(&args.network.network_host, &args.network.chain_hash)?;
    let src = open_input(&args.input)?;
    let dst = open_output(&args.output)?;

    match (args.round_number, args.duration) {
        (Some(round_number), _) => {
            info!("locking until round {round_number}");
            chronolock::encrypt_with_round(
                dst,
                src,
                &codec::FrameCodec,
                &network,
                &aead::Cipher,
                round_number,
                args.armor,
            )?;
        }
        (None, Some(duration)) => {
            chronolock::encrypt_with_duration(
                dst,
                src,
                &codec::FrameCodec,
                &network,
                &aead::Cipher,
                duration.into(),
                args.armor,
            )?;
        }
        (None, None) => return Err(anyhow!("either --round-number or --duration is required")),
    }

    Ok(())
}

fn unlock(args: UnlockArgs) -> anyhow::Result<()> {
    let network = HttpNetwork::new(&args.network.network_host, &args.network.chain_hash)?;
    let src = open_input(&args.input)?;
    let dst = open_output(&args.output)?;

    chronolock::decrypt(
        dst,
        src,
        &codec::FrameCodec,
        &network,
        &aead::Cipher,
        args.armor,
    )?;
    Ok(())
}

fn metadata(args: NetworkArgs) -> anyhow::Result<()> {
    let network = HttpNetwork::new(&args.network_host, &args.chain_hash)?;
    let mut out = io::stdout();

    writeln!(out, "chain hash:    {}", network.chain_hash())?;
    writeln!(out, "public key:    {}", hex::encode(network.public_key()?))?;
    writeln!(out, "period:        {}s", network.period())?;
    writeln!(out, "genesis time:  {}", network.genesis_time())?;
    writeln!(
        out,
        "current round: {}",
        network.round_number(SystemTime::now())?
    )?;
    Ok(())
}

fn open_input(path: &Option<PathBuf>) -> anyhow::Result<Box<dyn Read>> {
    Ok(match path {
        Some(path) if path.as_os_str() != "-" => Box::new(
            File::open(path).with_context(|| format!("open input file {}", path.display()))?,
        ),
        _ => Box::new(io::stdin()),
    })
}

fn open_output(path: &Option<PathBuf>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) if path.as_os_str() != "-" => Box::new(
            File::create(path).with_context(|| format!("create output file {}", path.display()))?,
        ),
        _ => Box::new(io::stdout()),
    })
}
