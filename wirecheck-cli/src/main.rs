// Copyright (C) 2022 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt::Debug;
use std::path::PathBuf;
use std::process::ExitCode;

use bytes::Bytes;
use clap::Parser;
use pretty_hex::PrettyHex;
use wirecheck::bits::BitPacked;
use wirecheck::decode::{drive, Terminal};
use wirecheck::{reference, Codec, Config};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
enum Cmd {
    /// Runs every conformance suite over the built-in reference codecs.
    Selftest {
        /// JSON file with `cases`, `expensiveCases`, `maxSize`, and `seed`; `WIRECHECK_*`
        /// environment variables override it.
        #[clap(long)]
        config: Option<PathBuf>,
    },

    /// Feeds a file through a reference decoder in fixed-size chunks.
    Decode {
        #[clap(arg_enum)]
        codec: CodecName,
        filename: PathBuf,

        #[clap(long, default_value = "4096")]
        chunk: usize,
    },
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum CodecName {
    U64be,
    Varint,
    LengthPrefixed,
    NulTerminated,
    PeerCaps,
}

fn selftest(config: Option<PathBuf>) -> Result<bool, BoxError> {
    let cfg = match config {
        Some(path) => serde_json::from_slice(&std::fs::read(path)?[..])?,
        None => Config::default(),
    };
    let cfg = cfg.overridden_by(|var| std::env::var(var).ok())?;
    tracing::info!(?cfg, "running reference suites");
    let report = reference::suite().run(&cfg);
    if report.passed() {
        tracing::info!("{}", &report);
    } else {
        tracing::error!("{}", &report);
    }
    Ok(report.passed())
}

/// Decodes consecutive values from `data`, feeding each attempt `chunk` bytes at a time.
///
/// Returns false if the data didn't decode completely.
fn decode_all<C>(codec: C, data: Bytes, chunk: usize) -> Result<bool, BoxError>
where
    C: Codec,
    C::Value: Debug,
{
    let chunk = chunk.max(1);
    let mut left = data;
    let mut offset = 0;
    while !left.is_empty() {
        let chunks: Vec<Bytes> = (0..left.len())
            .step_by(chunk)
            .map(|i| left.slice(i..left.len().min(i + chunk)))
            .collect();
        match drive(|b| codec.decode(b), chunks)? {
            Terminal::Finished {
                value,
                remaining,
                consumed,
            } => {
                println!("@{}: {:#?}", offset, value);
                if consumed == 0 {
                    println!("decoder consumed nothing; stopping");
                    break;
                }
                offset += consumed;
                left = remaining;
            }
            Terminal::Failed { message, consumed } => {
                println!(
                    "@{}: decode failed after {} bytes: {}",
                    offset, consumed, message
                );
                break;
            }
        }
    }
    if left.is_empty() {
        return Ok(true);
    }
    println!("undecoded data: {:?}", left.hex_dump());
    Ok(false)
}

fn decode(codec: CodecName, filename: PathBuf, chunk: usize) -> Result<bool, BoxError> {
    let data = Bytes::from(std::fs::read(filename)?);
    match codec {
        CodecName::U64be => decode_all(reference::U64Be, data, chunk),
        CodecName::Varint => decode_all(reference::Varint, data, chunk),
        CodecName::LengthPrefixed => {
            decode_all(reference::LengthPrefixed::default(), data, chunk)
        }
        CodecName::NulTerminated => decode_all(reference::NulTerminated, data, chunk),
        CodecName::PeerCaps => decode_all(BitPacked(reference::PeerCapsBits), data, chunk),
    }
}

fn setup_tracing() -> Result<(), BoxError> {
    use tracing_subscriber::prelude::*;
    tracing_log::LogTracer::init()?;
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        .from_env_lossy();
    let sub = tracing_subscriber::registry().with(
        tracing_subscriber::fmt::Layer::new()
            .map_fmt_fields(|f| f.debug_alt())
            .with_thread_names(true)
            .with_timer(tracing_subscriber::fmt::time::LocalTime::rfc_3339())
            .with_filter(filter),
    );
    tracing::subscriber::set_global_default(sub)?;
    Ok(())
}

fn main() -> ExitCode {
    // SAFETY: let's assume nothing touches environment variables.
    unsafe {
        time::util::local_offset::set_soundness(time::util::local_offset::Soundness::Unsound);
    }

    if let Err(e) = setup_tracing() {
        eprintln!("unable to set up logging: {}", e);
        return ExitCode::FAILURE;
    }
    let result = match Cmd::parse() {
        Cmd::Selftest { config } => selftest(config),
        Cmd::Decode {
            codec,
            filename,
            chunk,
        } => decode(codec, filename, chunk),
    };
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(err = %e, "fatal");
            ExitCode::FAILURE
        }
    }
}
