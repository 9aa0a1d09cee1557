use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use crate::error::Result;
use crate::{CertificateIssuer, TerminalOperator, TrustStores};

#[derive(Parser)]
#[command(name = "devca")]
#[command(version, about = "Locally-trusted development certificates", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Issue a certificate for a local development domain")]
    Issue {
        #[arg(help = "Domain the certificate is issued for")]
        domain: String,

        #[arg(long, default_value = "cert.pem", help = "Certificate output path")]
        cert_out: PathBuf,

        #[arg(long, default_value = "key.pem", help = "Private key output path")]
        key_out: PathBuf,

        #[arg(long, default_value = "ca.pem", help = "Root CA certificate output path")]
        ca_out: PathBuf,

        #[arg(long, help = "Never install missing NSS tooling packages")]
        no_tool_install: bool,
    },
}

pub fn run_cli() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Issue {
            domain,
            cert_out,
            key_out,
            ca_out,
            no_tool_install,
        } => {
            let stores = TrustStores {
                install_missing_tools: !no_tool_install,
                ..TrustStores::default()
            };
            let bundle = CertificateIssuer::new().issue(&domain, &stores, &TerminalOperator)?;

            fs::write(&cert_out, &bundle.cert)?;
            fs::write(&key_out, &bundle.key)?;
            fs::write(&ca_out, &bundle.ca)?;

            println!("{}", "Certificate issued successfully!".green().bold());
            println!("  {}: {}", "Domain".cyan(), domain);
            println!("  {}: {}", "Certificate".cyan(), cert_out.display());
            println!("  {}: {}", "Private Key".cyan(), key_out.display());
            println!("  {}: {}", "Root CA".cyan(), ca_out.display());
        }
    }

    Ok(())
}
