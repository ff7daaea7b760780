//! tmpc Party CLI
//!
//! Command-line interface for running one party of an MPC session over the
//! message relay:
//! - Distributed Key Generation (DKG)
//! - Key Refresh
//! - Signing
//!
//! Every party of a session runs the same command with the same roster and
//! session id, differing only in `--index`.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use msg_relay_client::RelayTransport;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tmpc_core::access::{leaf, threshold, AccessStructure};
use tmpc_core::curve::Curve;
use tmpc_core::eckey::{self, KeyShareMP, ThresholdShare};
use tmpc_core::mpc::{Job2P, JobMP, PartyIndex, Role};
use tmpc_core::{ecdsa_2p, ecdsa_mp, eddsa_mp};
use tracing::{info, Level};

/// tmpc Party - MPC Party Node
#[derive(Parser)]
#[command(name = "tmpc-party")]
#[command(about = "Threshold ECDSA/EdDSA MPC party node")]
#[command(version)]
struct Cli {
    /// Relay service URL
    #[arg(short, long, env = "RELAY_URL", default_value = "http://127.0.0.1:8080")]
    relay: String,

    /// This party's position in the roster (0-indexed)
    #[arg(short, long, env = "PARTY_INDEX")]
    index: usize,

    /// Party names in session order, comma-separated
    #[arg(long, env = "PARTY_ROSTER", value_delimiter = ',')]
    roster: Vec<String>,

    /// Session identifier shared by all parties
    #[arg(short, long, env = "SESSION_ID")]
    session: String,

    /// Data directory for key shares
    #[arg(short, long, env = "DEST", default_value = "./data")]
    dest: PathBuf,

    /// Seconds to wait for a peer message
    #[arg(long, default_value = "120")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run distributed key generation
    Dkg {
        #[arg(short, long, value_enum)]
        protocol: Protocol,

        #[arg(short, long, value_enum, default_value = "secp256k1")]
        curve: CurveArg,

        /// Generate a k-of-n share instead of an additive one
        #[arg(short, long)]
        threshold: Option<usize>,
    },

    /// Refresh key shares
    Refresh {
        #[arg(short, long, value_enum)]
        protocol: Protocol,
    },

    /// Sign a message; the roster is the signing quorum
    Sign {
        #[arg(short, long, value_enum)]
        protocol: Protocol,

        /// Message to sign, hex encoded (a digest for ECDSA)
        #[arg(short, long)]
        message: String,

        /// Roster index of the party that gets the signature
        #[arg(long, default_value = "0")]
        receiver: usize,
    },

    /// Show key share info
    Info {
        #[arg(short, long, value_enum)]
        protocol: Protocol,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Protocol {
    Ecdsa2p,
    EcdsaMp,
    EddsaMp,
}

impl Protocol {
    fn tag(self) -> &'static str {
        match self {
            Protocol::Ecdsa2p => "ecdsa-2p",
            Protocol::EcdsaMp => "ecdsa-mp",
            Protocol::EddsaMp => "eddsa-mp",
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CurveArg {
    Secp256k1,
    P256,
    Ed25519,
}

impl From<CurveArg> for Curve {
    fn from(c: CurveArg) -> Self {
        match c {
            CurveArg::Secp256k1 => Curve::Secp256k1,
            CurveArg::P256 => Curve::P256,
            CurveArg::Ed25519 => Curve::Ed25519,
        }
    }
}

/// Persisted share file
#[derive(Serialize, Deserialize)]
struct ShareFile {
    protocol: String,
    kind: ShareKind,
    /// hex of the marshalled share
    data: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ShareKind {
    TwoParty,
    Additive,
    Threshold,
}

enum StoredShare {
    TwoParty(ecdsa_2p::Share),
    Additive(KeyShareMP),
    Threshold(ThresholdShare),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    if cli.index >= cli.roster.len() {
        bail!("index {} outside a roster of {}", cli.index, cli.roster.len());
    }

    std::fs::create_dir_all(&cli.dest)?;

    match cli.command {
        Commands::Dkg {
            protocol,
            curve,
            threshold,
        } => run_dkg(&cli, protocol, curve.into(), threshold).await,
        Commands::Refresh { protocol } => run_refresh(&cli, protocol).await,
        Commands::Sign {
            protocol,
            ref message,
            receiver,
        } => run_sign(&cli, protocol, message, receiver).await,
        Commands::Info { protocol } => show_info(&cli, protocol),
    }
}

fn transport(cli: &Cli) -> RelayTransport {
    RelayTransport::new(&cli.relay, &cli.session, cli.index, cli.roster.len())
        .with_recv_timeout(Duration::from_secs(cli.timeout))
}

fn job_mp(cli: &Cli) -> Result<JobMP<RelayTransport>> {
    Ok(JobMP::new(transport(cli), cli.index, cli.roster.clone())?)
}

fn job_2p(cli: &Cli) -> Result<Job2P<RelayTransport>> {
    if cli.roster.len() != 2 {
        bail!("ecdsa-2p needs a roster of exactly two parties");
    }
    Ok(Job2P::new(
        transport(cli),
        Role::from_index(cli.index)?,
        &cli.roster[0],
        &cli.roster[1],
    )?)
}

async fn run_dkg(
    cli: &Cli,
    protocol: Protocol,
    curve: Curve,
    k: Option<usize>,
) -> Result<()> {
    info!(
        index = cli.index,
        parties = cli.roster.len(),
        protocol = protocol.tag(),
        curve = curve.name(),
        threshold = ?k,
        "Starting DKG"
    );

    let share = match (protocol, k) {
        (Protocol::Ecdsa2p, None) => StoredShare::TwoParty(ecdsa_2p::dkg(&mut job_2p(cli)?, curve).await?),
        (Protocol::Ecdsa2p, Some(_)) => bail!("ecdsa-2p has no threshold variant"),
        (Protocol::EcdsaMp, None) => StoredShare::Additive(ecdsa_mp::dkg(&mut job_mp(cli)?, curve).await?),
        (Protocol::EddsaMp, None) => StoredShare::Additive(eddsa_mp::dkg(&mut job_mp(cli)?, curve).await?),
        (protocol, Some(k)) => {
            let ac = AccessStructure::new(
                curve,
                &threshold(k, cli.roster.iter().map(|name| leaf(name.as_str())).collect()),
            )?;
            let quorum: Vec<PartyIndex> = (0..cli.roster.len()).collect();
            let mut job = job_mp(cli)?;
            let sid = cli.session.as_bytes();
            let share = if protocol == Protocol::EcdsaMp {
                ecdsa_mp::threshold_dkg(&mut job, curve, sid, &ac, &quorum).await?
            } else {
                eddsa_mp::threshold_dkg(&mut job, curve, sid, &ac, &quorum).await?
            };
            StoredShare::Threshold(share)
        }
    };

    let public_key = public_key_hex(&share);
    let path = save_share(cli, protocol, &share)?;
    info!(public_key = %public_key, path = ?path, "DKG completed, key share saved");

    println!("Public Key: {}", public_key);

    Ok(())
}

async fn run_refresh(cli: &Cli, protocol: Protocol) -> Result<()> {
    let share = load_share(cli, protocol)?;
    let sid = cli.session.as_bytes();

    info!(index = cli.index, protocol = protocol.tag(), "Starting key refresh");

    let refreshed = match share {
        StoredShare::TwoParty(share) => {
            StoredShare::TwoParty(ecdsa_2p::refresh(&mut job_2p(cli)?, &share, sid).await?)
        }
        StoredShare::Additive(share) => {
            let mut job = job_mp(cli)?;
            let share = match protocol {
                Protocol::EddsaMp => eddsa_mp::refresh(&mut job, &share, sid).await?,
                _ => ecdsa_mp::refresh(&mut job, &share, sid).await?,
            };
            StoredShare::Additive(share)
        }
        StoredShare::Threshold(share) => {
            let quorum: Vec<PartyIndex> = (0..cli.roster.len()).collect();
            let ac = share.access_structure().clone();
            StoredShare::Threshold(
                eckey::threshold_refresh(&mut job_mp(cli)?, sid, &ac, &quorum, &share).await?,
            )
        }
    };

    save_share(cli, protocol, &refreshed)?;
    info!("Key refresh completed");

    Ok(())
}

async fn run_sign(cli: &Cli, protocol: Protocol, message: &str, receiver: usize) -> Result<()> {
    let msg = hex::decode(message).context("message must be hex")?;
    let share = load_share(cli, protocol)?;

    info!(
        index = cli.index,
        signers = ?cli.roster,
        receiver,
        protocol = protocol.tag(),
        "Starting signing"
    );

    let signature = match share {
        StoredShare::TwoParty(share) => {
            ecdsa_2p::sign(&mut job_2p(cli)?, &share, cli.session.as_bytes(), &msg).await?
        }
        StoredShare::Additive(share) => sign_mp(cli, protocol, &share, &msg, receiver).await?,
        StoredShare::Threshold(share) => {
            let additive = match protocol {
                Protocol::EddsaMp => eddsa_mp::to_additive_share(&share, cli.roster.as_slice())?,
                _ => ecdsa_mp::to_additive_share(&share, cli.roster.as_slice())?,
            };
            sign_mp(cli, protocol, &additive, &msg, receiver).await?
        }
    };

    if signature.is_empty() {
        info!("Signing completed; signature delivered to the receiver");
    } else {
        info!(signature = %hex::encode(&signature), "Signature generated");
        println!("Signature: {}", hex::encode(&signature));
    }

    Ok(())
}

async fn sign_mp(
    cli: &Cli,
    protocol: Protocol,
    share: &KeyShareMP,
    msg: &[u8],
    receiver: usize,
) -> Result<Vec<u8>> {
    let mut job = job_mp(cli)?;
    let sig = match protocol {
        Protocol::EddsaMp => eddsa_mp::sign(&mut job, share, msg, receiver).await?,
        _ => ecdsa_mp::sign(&mut job, share, msg, receiver).await?,
    };
    Ok(sig)
}

fn show_info(cli: &Cli, protocol: Protocol) -> Result<()> {
    let share = load_share(cli, protocol)?;

    println!("Key Share Info:");
    println!("  Protocol: {}", protocol.tag());
    match &share {
        StoredShare::TwoParty(s) => {
            println!("  Role: {:?}", s.role());
            println!("  Curve: {}", s.curve().name());
        }
        StoredShare::Additive(s) => {
            println!("  Party: {}", s.party_name());
            println!("  Curve: {}", s.curve().name());
            println!("  Parties: {}", s.public_shares().len());
        }
        StoredShare::Threshold(s) => {
            println!("  Party: {}", s.party_name());
            println!("  Curve: {}", s.curve().name());
            println!("  Leaves: {}", s.leaf_shares().len());
        }
    }
    println!("  Public Key: {}", public_key_hex(&share));

    Ok(())
}

fn public_key_hex(share: &StoredShare) -> String {
    let q = match share {
        StoredShare::TwoParty(s) => s.public_key(),
        StoredShare::Additive(s) => s.public_key(),
        StoredShare::Threshold(s) => s.public_key(),
    };
    hex::encode(q.to_bytes())
}

fn share_path(cli: &Cli, protocol: Protocol) -> PathBuf {
    cli.dest
        .join(format!("keyshare.{}.{}.json", protocol.tag(), cli.roster[cli.index]))
}

fn save_share(cli: &Cli, protocol: Protocol, share: &StoredShare) -> Result<PathBuf> {
    let (kind, bytes) = match share {
        StoredShare::TwoParty(s) => (ShareKind::TwoParty, s.marshal()),
        StoredShare::Additive(s) => (ShareKind::Additive, s.marshal()),
        StoredShare::Threshold(s) => (ShareKind::Threshold, s.marshal()),
    };
    let file = ShareFile {
        protocol: protocol.tag().to_string(),
        kind,
        data: hex::encode(bytes),
    };
    let path = share_path(cli, protocol);
    std::fs::write(&path, serde_json::to_string_pretty(&file)?)?;
    Ok(path)
}

fn load_share(cli: &Cli, protocol: Protocol) -> Result<StoredShare> {
    let path = share_path(cli, protocol);
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("reading key share {}", path.display()))?;
    let file: ShareFile = serde_json::from_str(&json)?;
    if file.protocol != protocol.tag() {
        return Err(anyhow!("{} holds a {} share", path.display(), file.protocol));
    }
    let bytes = hex::decode(&file.data)?;
    Ok(match file.kind {
        ShareKind::TwoParty => StoredShare::TwoParty(ecdsa_2p::Share::unmarshal(&bytes)?),
        ShareKind::Additive => StoredShare::Additive(KeyShareMP::unmarshal(&bytes)?),
        ShareKind::Threshold => StoredShare::Threshold(ThresholdShare::unmarshal(&bytes)?),
    })
}
