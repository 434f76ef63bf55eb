use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use testca::{IssuanceProfile, RootAuthority, SystemClock, random};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Issues a throwaway root certificate and leaf certificates for TLS tests.
///
/// Writes `ca.pem` plus `<name>.pem` and `<name>-key.pem` for every certificate in the
/// profile. Without a profile, a localhost server and client pair is issued.
#[derive(Parser, Debug)]
#[command(name = "testca")]
#[command(version, about)]
struct Args {
    /// Directory the PEM files are written to. Created if missing.
    #[arg(short = 'o', long)]
    out_dir: PathBuf,

    /// Issuance profile (YAML).
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Derive all keys from this label so repeated runs produce identical files.
    /// Overrides the profile's seed.
    #[arg(long)]
    seed: Option<String>,

    /// Anchor the root's validity at the current time instead of the fixed start epoch.
    #[arg(long, conflicts_with = "seed")]
    now: bool,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args = Args::parse();

    let profile = match &args.config {
        Some(config_path) => IssuanceProfile::load(config_path)
            .with_context(|| format!("failed to load profile from {:?}", config_path))?,
        None => IssuanceProfile::localhost(),
    };

    let seed = args.seed.or(profile.seed.clone());
    let mut builder = RootAuthority::builder();
    if let Some(seed) = &seed {
        info!("using deterministic source {:?}", seed);
        builder = builder.source(random::deterministic_source(seed));
    }
    if args.now {
        builder = builder.clock(&SystemClock);
    }
    let ca = builder.build().context("failed to create certificate authority")?;

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {:?}", args.out_dir))?;
    write(&args.out_dir.join("ca.pem"), ca.root_certificate_pem())?;

    for cert in &profile.certificates {
        let pair = ca
            .issue_certificate(&cert.to_request())
            .with_context(|| format!("failed to issue certificate {}", cert.name))?;
        write(
            &args.out_dir.join(format!("{}.pem", cert.name)),
            pair.certificate_pem(),
        )?;
        write(
            &args.out_dir.join(format!("{}-key.pem", cert.name)),
            pair.private_key_pem(),
        )?;
        info!("issued {}", cert.name);
    }

    Ok(())
}

fn write(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("failed to write {:?}", path))
}
