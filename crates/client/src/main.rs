//! CLI for threshold secret custody.
//!
//! This binary provides commands for:
//! - Inspecting the engine set of a custody contract
//! - Splitting and reconstructing secrets locally
//! - Preparing messages for a wallet to sign, then submitting them with the signature
//!
//! Every remote operation is two-step: a `prepare-*` command (or `--prepare`)
//! writes a bundle and prints the bytes to sign, and the submitting command
//! reads that bundle back together with the signature.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::OsRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use custody_client::{
    ClientConfig, DownloadOutcome, MessageSchema, SignableMessage, ThresholdClient,
};
use custody_crypto::sealed::{public_key_hex, secret_key_from_hex};
use custody_crypto::{
    commit, decode_share, encode_share, generate_ephemeral_key, reconstruct, split,
    BlindedShareSet,
};
use custody_types::{
    AddAddressMessage, DownloadMessage, RemoveAddressMessage, UploadMessage, WalletIdentity,
    WalletType,
};

#[derive(Parser)]
#[command(name = "custody-cli")]
#[command(about = "CLI for threshold secret custody")]
struct Cli {
    /// JSON client configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Custody contract address (overrides the config file)
    #[arg(long)]
    contract: Option<String>,

    /// Chain RPC endpoint (overrides the config file)
    #[arg(long)]
    chain_rpc: Option<String>,

    /// Engines allowed to be offline or malicious (overrides the config file)
    #[arg(long)]
    num_malicious: Option<u32>,

    /// Per-request timeout in seconds (overrides the config file)
    #[arg(long)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct WalletArgs {
    /// Wallet type: evm, near, xrpl, stellar or facesign
    #[arg(long, default_value = "evm")]
    wallet: WalletType,

    /// Wallet address
    #[arg(long, default_value = "")]
    address: String,

    /// Wallet public key (required for non-EVM wallets)
    #[arg(long)]
    public_key: Option<String>,
}

impl WalletArgs {
    fn identity(&self) -> WalletIdentity {
        identity(self.wallet, &self.address, self.public_key.as_deref())
    }
}

#[derive(Args)]
struct MutationArgs {
    /// Secret identifier
    #[arg(long)]
    id: String,

    /// Write the message to sign to --message-file instead of submitting
    #[arg(long)]
    prepare: bool,

    /// Message bundle written by --prepare
    #[arg(long)]
    message_file: PathBuf,

    /// Wallet signature over the prepared message
    #[arg(long)]
    signature: Option<String>,

    #[command(flatten)]
    signer: WalletArgs,

    /// Wallet type of the address to add or remove
    #[arg(long, default_value = "evm")]
    target_wallet: WalletType,

    /// Address to add or remove
    #[arg(long, default_value = "")]
    target_address: String,

    /// Public key of the address to add or remove
    #[arg(long)]
    target_public_key: Option<String>,
}

impl MutationArgs {
    fn target(&self) -> WalletIdentity {
        identity(
            self.target_wallet,
            &self.target_address,
            self.target_public_key.as_deref(),
        )
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and print the engine set and threshold
    Engines,

    /// Split a secret locally and print the shares
    Split {
        /// Secret (hex)
        #[arg(long)]
        secret: String,

        /// Number of shares
        #[arg(short, long)]
        n: u32,

        /// Reconstruction threshold
        #[arg(short, long)]
        t: u32,
    },

    /// Reconstruct a secret locally from shares printed by `split`
    Reconstruct {
        /// Share (hex), repeatable
        #[arg(long = "share", required = true)]
        shares: Vec<String>,
    },

    /// Blind a secret for the engine set and write the upload bundle
    PrepareUpload {
        /// Secret identifier
        #[arg(long)]
        id: String,

        /// Secret (hex)
        #[arg(long)]
        secret: String,

        #[command(flatten)]
        signer: WalletArgs,

        /// Bundle output path
        #[arg(long)]
        out: PathBuf,
    },

    /// Upload a prepared bundle
    Upload {
        #[arg(long)]
        bundle: PathBuf,

        /// Wallet signature over the upload message
        #[arg(long)]
        signature: String,
    },

    /// Generate an ephemeral key and write the download bundle
    PrepareDownload {
        /// Secret identifier
        #[arg(long)]
        id: String,

        #[command(flatten)]
        signer: WalletArgs,

        /// Bundle output path
        #[arg(long)]
        out: PathBuf,
    },

    /// Download and reconstruct a secret using a prepared bundle
    Download {
        #[arg(long)]
        bundle: PathBuf,

        /// Wallet signature over the download message
        #[arg(long)]
        signature: String,
    },

    /// Authorize another recovering address
    AddAddress(MutationArgs),

    /// Revoke a recovering address
    RemoveAddress(MutationArgs),
}

#[derive(Debug, Serialize, Deserialize)]
struct UploadBundle {
    id: String,
    wallet: WalletType,
    threshold: u32,
    message: SignableMessage<UploadMessage>,
    /// Blinded shares (hex), in engine order
    shares: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DownloadBundle {
    id: String,
    wallet: WalletType,
    message: SignableMessage<DownloadMessage>,
    ephemeral_secret_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct MutationBundle<M> {
    id: String,
    wallet: WalletType,
    message: SignableMessage<M>,
}

fn identity(wallet: WalletType, address: &str, public_key: Option<&str>) -> WalletIdentity {
    let identity = WalletIdentity::new(wallet, address);
    match public_key {
        Some(key) => identity.with_public_key(key),
        None => identity,
    }
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => {
            let contract = cli
                .contract
                .clone()
                .ok_or_else(|| anyhow!("either --config or --contract is required"))?;
            ClientConfig::new(contract)
        }
    };

    if let Some(contract) = &cli.contract {
        config.contract = contract.clone();
    }
    if let Some(rpc) = &cli.chain_rpc {
        config.chain_rpc = rpc.clone();
    }
    if let Some(num_malicious) = cli.num_malicious {
        config.num_malicious = num_malicious;
    }
    if let Some(timeout) = cli.timeout_secs {
        config.request_timeout_secs = timeout;
    }
    config.validate()?;
    Ok(config)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    fs::write(path, serde_json::to_vec_pretty(value)?)
        .with_context(|| format!("writing {}", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(serde_json::from_slice(&data)?)
}

fn print_to_sign<M: MessageSchema>(message: &SignableMessage<M>) -> Result<()> {
    println!("Message to sign:");
    println!("{}", String::from_utf8(message.signing_bytes()?)?);
    println!("Digest: {}", hex::encode(message.digest()?));
    Ok(())
}

async fn engines_cmd(config: ClientConfig) -> Result<()> {
    let client = ThresholdClient::connect(config, WalletType::Evm)?;
    let engines = client.engine_set().await?;
    let params = engines.params();

    println!("Engines for {}:", client.config().contract);
    for (index, endpoint) in engines.endpoints().iter().enumerate() {
        println!("  [{}] {}", index, endpoint);
    }
    println!("Threshold: {}/{}", params.threshold, params.total);
    Ok(())
}

fn split_cmd(secret: &str, n: u32, t: u32) -> Result<()> {
    let secret = zeroize::Zeroizing::new(hex::decode(secret)?);
    let mut rng = OsRng;
    let shares = split(&secret, n, t, &mut rng)?;

    println!("Shares ({} of {} needed):", t, n);
    for share in &shares {
        println!("  {}", hex::encode(encode_share(share)?));
    }
    Ok(())
}

fn reconstruct_cmd(encoded: &[String]) -> Result<()> {
    let shares = encoded
        .iter()
        .map(|s| -> Result<_> { Ok(decode_share(&hex::decode(s)?)?) })
        .collect::<Result<Vec<_>>>()?;
    let secret = reconstruct(&shares)?;
    println!("{}", hex::encode(secret.as_slice()));
    Ok(())
}

async fn prepare_upload_cmd(
    config: ClientConfig,
    id: String,
    secret: &str,
    signer: &WalletArgs,
    out: &Path,
) -> Result<()> {
    let client = ThresholdClient::connect(config, signer.wallet)?;
    let secret = zeroize::Zeroizing::new(hex::decode(secret)?);

    let shares = client.blinded_shares(&secret).await?;
    let message = client.upload_message_to_sign(&shares, &[signer.identity()])?;

    let bundle = UploadBundle {
        id,
        wallet: signer.wallet,
        threshold: shares.threshold,
        message,
        shares: shares.shares.iter().map(hex::encode).collect(),
    };
    write_json(out, &bundle)?;
    info!(path = %out.display(), shares = shares.len(), "Wrote upload bundle");

    print_to_sign(&bundle.message)
}

async fn upload_cmd(config: ClientConfig, bundle: &Path, signature: &str) -> Result<()> {
    let bundle: UploadBundle = read_json(bundle)?;
    let client = ThresholdClient::connect(config, bundle.wallet)?;

    let blinded = bundle
        .shares
        .iter()
        .map(hex::decode)
        .collect::<Result<Vec<_>, _>>()?;
    let shares = BlindedShareSet {
        commitments: blinded.iter().map(|s| commit(s)).collect(),
        shares: blinded,
        threshold: bundle.threshold,
    };

    let outcome = client
        .upload_secret(&bundle.id, &bundle.message, signature, &shares)
        .await?;
    println!("Upload {}: {}", bundle.id, outcome);
    Ok(())
}

async fn prepare_download_cmd(
    config: ClientConfig,
    id: String,
    signer: &WalletArgs,
    out: &Path,
) -> Result<()> {
    let client = ThresholdClient::connect(config, signer.wallet)?;
    let mut rng = OsRng;
    let ephemeral = generate_ephemeral_key(&mut rng);

    let message = client.download_message_to_sign(&signer.identity(), &ephemeral.public_key())?;
    let bundle = DownloadBundle {
        id,
        wallet: signer.wallet,
        message,
        ephemeral_secret_key: hex::encode(ephemeral.to_bytes()),
    };
    write_json(out, &bundle)?;
    info!(path = %out.display(), public_key = %public_key_hex(&ephemeral), "Wrote download bundle");

    print_to_sign(&bundle.message)
}

async fn download_cmd(config: ClientConfig, bundle: &Path, signature: &str) -> Result<()> {
    let bundle: DownloadBundle = read_json(bundle)?;
    let client = ThresholdClient::connect(config, bundle.wallet)?;
    let ephemeral = secret_key_from_hex(&bundle.ephemeral_secret_key)?;

    match client
        .download_secret(&bundle.id, &bundle.message, signature, &ephemeral)
        .await?
    {
        DownloadOutcome::Ok(secret) => println!("{}", hex::encode(secret.as_slice())),
        DownloadOutcome::NotStored => println!("Secret {} is not stored", bundle.id),
        DownloadOutcome::Error(reason) => bail!("download of {} failed: {}", bundle.id, reason),
    }
    Ok(())
}

async fn add_address_cmd(config: ClientConfig, args: &MutationArgs) -> Result<()> {
    if args.prepare {
        let client = ThresholdClient::connect(config, args.signer.wallet)?;
        let message = client.add_address_message_to_sign(&args.signer.identity(), &args.target())?;
        let bundle = MutationBundle {
            id: args.id.clone(),
            wallet: args.signer.wallet,
            message,
        };
        write_json(&args.message_file, &bundle)?;
        return print_to_sign(&bundle.message);
    }

    let signature = args
        .signature
        .as_deref()
        .ok_or_else(|| anyhow!("--signature is required unless --prepare is set"))?;
    let bundle: MutationBundle<AddAddressMessage> = read_json(&args.message_file)?;
    let client = ThresholdClient::connect(config, bundle.wallet)?;

    let outcome = client.add_address(&bundle.id, &bundle.message, signature).await?;
    println!("Add {}: {}", bundle.message.message.address_to_add, outcome);
    Ok(())
}

async fn remove_address_cmd(config: ClientConfig, args: &MutationArgs) -> Result<()> {
    if args.prepare {
        let client = ThresholdClient::connect(config, args.signer.wallet)?;
        let message =
            client.remove_address_message_to_sign(&args.signer.identity(), &args.target())?;
        let bundle = MutationBundle {
            id: args.id.clone(),
            wallet: args.signer.wallet,
            message,
        };
        write_json(&args.message_file, &bundle)?;
        return print_to_sign(&bundle.message);
    }

    let signature = args
        .signature
        .as_deref()
        .ok_or_else(|| anyhow!("--signature is required unless --prepare is set"))?;
    let bundle: MutationBundle<RemoveAddressMessage> = read_json(&args.message_file)?;
    let client = ThresholdClient::connect(config, bundle.wallet)?;

    let outcome = client
        .remove_address(&bundle.id, &bundle.message, signature)
        .await?;
    println!("Remove {}: {}", bundle.message.message.address_to_remove, outcome);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("custody_cli=info".parse()?)
                .add_directive("custody_client=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Split { secret, n, t } => return split_cmd(secret, *n, *t),
        Commands::Reconstruct { shares } => return reconstruct_cmd(shares),
        _ => {}
    }

    let config = load_config(&cli)?;
    match &cli.command {
        Commands::Engines => engines_cmd(config).await?,

        Commands::PrepareUpload {
            id,
            secret,
            signer,
            out,
        } => prepare_upload_cmd(config, id.clone(), secret, signer, out).await?,

        Commands::Upload { bundle, signature } => upload_cmd(config, bundle, signature).await?,

        Commands::PrepareDownload { id, signer, out } => {
            prepare_download_cmd(config, id.clone(), signer, out).await?
        }

        Commands::Download { bundle, signature } => {
            download_cmd(config, bundle, signature).await?
        }

        Commands::AddAddress(args) => add_address_cmd(config, args).await?,

        Commands::RemoveAddress(args) => remove_address_cmd(config, args).await?,

        Commands::Split { .. } | Commands::Reconstruct { .. } => {}
    }

    Ok(())
}
