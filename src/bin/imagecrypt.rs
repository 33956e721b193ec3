//! imagecrypt CLI - Password-based file encryption
//!
//! Command-line interface for encrypting and decrypting files with
//! PBKDF2-HMAC-SHA256 key derivation and AES-256-CBC, and for running the
//! upload web front end.

use clap::{Parser, Subcommand};
use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use std::process;

use imagecrypt::Operation;
use imagecrypt::error::Result;
use imagecrypt::file_ops;
use imagecrypt::passphrase::{PassphraseReader, ReaderPassphraseReader, TerminalPassphraseReader};

#[derive(Parser)]
#[command(name = "imagecrypt")]
#[command(version)]
#[command(about = "Password-based file encryption.", long_about = None)]
struct Cli {
    /// Read password from stdin instead of from terminal. Everything up to
    /// end of input is the password, minus one trailing newline (`\n` or
    /// `\r\n`)
    #[arg(long, global = true)]
    passphrase_stdin: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a file
    #[command(alias = "e")]
    Encrypt {
        /// Path to the file whose contents is to be encrypted
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to write the encrypted file to [default: <base>_encryption<ext>
        /// next to the input]
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Decrypt a file
    #[command(alias = "d")]
    Decrypt {
        /// Path to the file whose contents is to be decrypted
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to write the decrypted file to [default: <base>_decryption<ext>
        /// next to the input]
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Serve the upload form over HTTP
    #[cfg(feature = "web")]
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:5000", env = "IMAGECRYPT_BIND")]
        bind: std::net::SocketAddr,

        /// Directory that encrypted/decrypted results are written to
        #[arg(long, default_value = "output", env = "IMAGECRYPT_OUTPUT_DIR")]
        output_dir: PathBuf,

        /// Largest accepted upload request, in bytes
        #[arg(
            long,
            default_value_t = imagecrypt::web::DEFAULT_MAX_UPLOAD_BYTES,
            env = "IMAGECRYPT_MAX_UPLOAD_BYTES"
        )]
        max_upload_bytes: usize,

        /// Seconds a result stays downloadable before it is deleted
        #[arg(
            long,
            default_value_t = imagecrypt::web::DEFAULT_RETENTION.as_secs(),
            env = "IMAGECRYPT_RETENTION_SECS"
        )]
        retention_secs: u64,

        /// Seconds between sweeps for expired results
        #[arg(
            long,
            default_value_t = imagecrypt::web::DEFAULT_CLEANUP_INTERVAL.as_secs(),
            env = "IMAGECRYPT_CLEANUP_INTERVAL_SECS"
        )]
        cleanup_interval_secs: u64,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.command);

    let result = match cli.command {
        Commands::Encrypt { input, output } => {
            run_file(Operation::Encrypt, &input, output, cli.passphrase_stdin)
        }
        Commands::Decrypt { input, output } => {
            run_file(Operation::Decrypt, &input, output, cli.passphrase_stdin)
        }
        #[cfg(feature = "web")]
        Commands::Serve {
            bind,
            output_dir,
            max_upload_bytes,
            retention_secs,
            cleanup_interval_secs,
        } => serve(imagecrypt::web::WebConfig {
            bind,
            output_dir,
            max_upload_bytes,
            retention: std::time::Duration::from_secs(retention_secs),
            cleanup_interval: std::time::Duration::from_secs(cleanup_interval_secs),
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", error_chain(&e));
        process::exit(1);
    }
}

fn run_file(
    op: Operation,
    input: &Path,
    output: Option<PathBuf>,
    passphrase_stdin: bool,
) -> Result<()> {
    let output = match output {
        Some(path) => path,
        None => file_ops::default_output_path(input, op)?,
    };

    let mut reader = get_passphrase_reader(passphrase_stdin);
    file_ops::process_file(op, input, &output, &mut *reader)?;
    println!("{}", output.display());
    Ok(())
}

#[cfg(feature = "web")]
fn serve(config: imagecrypt::web::WebConfig) -> Result<()> {
    use imagecrypt::error::{ErrorCategory, ErrorKind, ImagecryptError};

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            ImagecryptError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to start async runtime",
                e,
            )
        })?;
    runtime.block_on(imagecrypt::web::serve(config))
}

fn get_passphrase_reader(use_stdin: bool) -> Box<dyn PassphraseReader> {
    if use_stdin {
        Box::new(ReaderPassphraseReader::new(Box::new(std::io::stdin())))
    } else {
        Box::new(TerminalPassphraseReader)
    }
}

/// Logs go to stderr. The server is chatty by default, file commands only
/// report problems. `RUST_LOG` overrides both.
fn init_tracing(command: &Commands) {
    let default_filter = match command {
        #[cfg(feature = "web")]
        Commands::Serve { .. } => "imagecrypt=info,tower_http=info",
        _ => "imagecrypt=warn",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// "outer: inner: innermost"
fn error_chain(err: &dyn StdError) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(s) = source {
        msg.push_str(": ");
        msg.push_str(&s.to_string());
        source = s.source();
    }
    msg
}
