//! SCEP enrollment command-line tool.
//!
//! A small CLI over the `scep-client` library:
//!
//! ```text
//! scep-enroll [OPTIONS] <COMMAND>
//!
//! Commands:
//!   caps      Show the capabilities the CA advertises
//!   ca-info   Fetch and display the CA/RA certificate chain
//!   enroll    Submit a CSR and poll until a terminal state
//!   get-cert  Query an issued certificate by serial number
//!   get-crl   Fetch the CA's certificate revocation list
//! ```
//!
//! The CA certificate is authenticated against `--ca-fingerprint`
//! (SHA-256 over the DER certificate, hex, colons optional). Without it,
//! `--trust-any` must be given explicitly.

use std::process::ExitCode;
use std::time::Duration;

use base64::prelude::*;
use clap::{Parser, Subcommand};
use der::Encode;

use scep_client::csr::CsrBuilder;
use scep_client::trust::{fingerprint, format_fingerprint};
use scep_client::{Client, ClientIdentity, ScepClientConfig, TransactionState};

/// SCEP enrollment command-line tool.
#[derive(Parser)]
#[command(name = "scep-enroll")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Certificate enrollment using SCEP (RFC 8894)", long_about = None)]
struct Cli {
    /// SCEP server URL (e.g. http://ca.example.com/cgi-bin/pkiclient.exe)
    #[arg(short, long, value_name = "URL")]
    url: String,

    /// Path to the PEM identity certificate
    #[arg(long, value_name = "PATH")]
    cert: std::path::PathBuf,

    /// Path to the PEM RSA private key
    #[arg(long, value_name = "PATH")]
    key: std::path::PathBuf,

    /// Expected SHA-256 fingerprint of the CA certificate (hex)
    #[arg(long, value_name = "HEX")]
    ca_fingerprint: Option<String>,

    /// Trust any CA certificate (insecure, for testing only)
    #[arg(long)]
    trust_any: bool,

    /// CA profile passed as the message parameter
    #[arg(long, value_name = "NAME")]
    profile: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the capabilities the CA advertises
    Caps,

    /// Fetch and display the CA/RA certificate chain
    CaInfo {
        /// Print the certificates as PEM
        #[arg(long)]
        pem: bool,
    },

    /// Submit a CSR and poll until a terminal state
    Enroll {
        /// Subject Common Name
        #[arg(long, value_name = "CN")]
        common_name: String,

        /// Subject Organization
        #[arg(long, value_name = "O")]
        organization: Option<String>,

        /// DNS subject alternative names
        #[arg(long = "san-dns", value_name = "DNS")]
        san_dns: Vec<String>,

        /// CA-issued challenge password
        #[arg(long, value_name = "SECRET")]
        challenge: Option<String>,

        /// Seconds to wait between polls while pending
        #[arg(long, default_value = "60")]
        poll_interval: u64,

        /// Give up after this many polls
        #[arg(long, default_value = "10")]
        max_polls: u32,
    },

    /// Query an issued certificate by serial number
    GetCert {
        /// Certificate serial number (hex)
        #[arg(long, value_name = "HEX")]
        serial: String,
    },

    /// Fetch the CA's certificate revocation list
    GetCrl,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_command(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_command(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let client = build_client(&cli)?;

    match &cli.command {
        Commands::Caps => {
            let caps = client.capabilities().await?;
            println!("CA capabilities:");
            println!("  POST PKIOperation: {}", caps.post_supported());
            println!("  Rollover (GetNextCACert): {}", caps.rollover_supported());
            println!("  Renewal: {}", caps.renewal_supported());
            println!("  Strongest cipher: {}", caps.strongest_cipher());
            println!("  Strongest digest: {}", caps.strongest_digest());
        }

        Commands::CaInfo { pem } => {
            let chain = client.ca_certificates().await?;
            println!("Chain contains {} certificate(s)", chain.certificates().len());
            println!();
            for (i, cert) in chain.certificates().iter().enumerate() {
                let role = if std::ptr::eq(cert, chain.ca()) {
                    "CA"
                } else if std::ptr::eq(cert, chain.recipient()) {
                    "RA (encryption)"
                } else {
                    "RA"
                };
                println!("Certificate {} [{}]:", i + 1, role);
                println!("  Subject: {}", cert.tbs_certificate.subject);
                println!("  Issuer:  {}", cert.tbs_certificate.issuer);
                let fp = fingerprint(cert)?;
                println!("  SHA-256: {}", format_fingerprint(&fp));
                if *pem {
                    print_pem(cert)?;
                }
                println!();
            }
        }

        Commands::Enroll {
            common_name,
            organization,
            san_dns,
            challenge,
            poll_interval,
            max_polls,
        } => {
            let identity = ClientIdentity::from_files(&cli.cert, &cli.key)?;

            let mut builder = CsrBuilder::new().common_name(common_name);
            if let Some(org) = organization {
                builder = builder.organization(org);
            }
            for dns in san_dns {
                builder = builder.san_dns(dns.clone());
            }
            if let Some(secret) = challenge {
                builder = builder.challenge_password(secret.clone());
            }
            let csr = builder.build(&identity.private_key)?;

            println!("Submitting enrollment request...");
            let mut transaction = client.enroll(csr).await?;
            println!("  Transaction ID: {}", transaction.transaction_id());

            let mut state = transaction.send().await?;
            let mut polls = 0;
            while state == TransactionState::CertReqPending {
                if polls >= *max_polls {
                    println!("Enrollment still pending after {} polls; giving up.", polls);
                    return Ok(());
                }
                println!("Enrollment pending; polling in {}s...", poll_interval);
                tokio::time::sleep(Duration::from_secs(*poll_interval)).await;
                state = transaction.poll().await?;
                polls += 1;
            }

            match state {
                TransactionState::CertIssued => {
                    let store = transaction.cert_store().expect("issued without store");
                    println!("Certificate issued!");
                    for cert in store.certificates() {
                        println!("  Subject: {}", cert.tbs_certificate.subject);
                        print_pem(cert)?;
                    }
                }
                TransactionState::CertNonExistent => {
                    println!(
                        "Enrollment rejected: {}",
                        transaction
                            .fail_info()
                            .map(|fi| fi.to_string())
                            .unwrap_or_else(|| "unknown".into())
                    );
                }
                _ => unreachable!("send/poll return terminal or pending states"),
            }
        }

        Commands::GetCert { serial } => {
            let bytes = parse_hex(serial)?;
            let serial = x509_cert::serial_number::SerialNumber::new(&bytes)?;
            let certs = client.certificate(&serial).await?;
            println!("CA returned {} certificate(s)", certs.len());
            for cert in &certs {
                println!("  Subject: {}", cert.tbs_certificate.subject);
                print_pem(cert)?;
            }
        }

        Commands::GetCrl => match client.crl().await? {
            Some(crl) => {
                let der = crl.to_der()?;
                println!("-----BEGIN X509 CRL-----");
                print_base64_chunks(&der);
                println!("-----END X509 CRL-----");
            }
            None => println!("The CA returned no CRL."),
        },
    }

    Ok(())
}

fn build_client(cli: &Cli) -> Result<Client, Box<dyn std::error::Error>> {
    let identity = ClientIdentity::from_files(&cli.cert, &cli.key)?;

    let mut builder = ScepClientConfig::builder()
        .url(&cli.url)?
        .identity(identity)
        .timeout(Duration::from_secs(cli.timeout));

    if let Some(profile) = &cli.profile {
        builder = builder.profile(profile.clone());
    }

    builder = match (&cli.ca_fingerprint, cli.trust_any) {
        (Some(expected), _) => {
            let expected = expected.replace(':', "").to_lowercase();
            builder.verifier(move |ca| match fingerprint(ca) {
                Ok(fp) => {
                    let actual: String = fp.iter().map(|b| format!("{:02x}", b)).collect();
                    if actual == expected {
                        true
                    } else {
                        eprintln!("CA fingerprint mismatch:");
                        eprintln!("  expected {}", expected);
                        eprintln!("  actual   {}", actual);
                        false
                    }
                }
                Err(_) => false,
            })
        }
        (None, true) => builder.verifier(|ca| {
            if let Ok(fp) = fingerprint(ca) {
                eprintln!(
                    "WARNING: trusting CA without verification; fingerprint {}",
                    format_fingerprint(&fp)
                );
            }
            true
        }),
        (None, false) => {
            return Err("either --ca-fingerprint or --trust-any is required".into());
        }
    };

    Ok(Client::new(builder.build()?)?)
}

fn print_pem(cert: &x509_cert::Certificate) -> Result<(), Box<dyn std::error::Error>> {
    let der = cert.to_der()?;
    println!("-----BEGIN CERTIFICATE-----");
    print_base64_chunks(&der);
    println!("-----END CERTIFICATE-----");
    Ok(())
}

fn print_base64_chunks(der: &[u8]) {
    let b64 = BASE64_STANDARD.encode(der);
    for chunk in b64.as_bytes().chunks(64) {
        println!("{}", std::str::from_utf8(chunk).unwrap_or(""));
    }
}

fn parse_hex(s: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let cleaned = s.replace(':', "");
    if cleaned.len() % 2 != 0 || cleaned.is_empty() {
        return Err("serial must be an even-length hex string".into());
    }
    (0..cleaned.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&cleaned[i..i + 2], 16).map_err(|e| e.into()))
        .collect()
}
