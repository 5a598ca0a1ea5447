//! `ane` — command-line interface for the Apple Neural Engine.
//!
//! ```text
//! USAGE:
//!   ane enumerate                    List neural engine device nodes
//!   ane inspect <model.anec>         Print a model's channel layout
//!   ane run <model.anec> [opts]      Bind a model and execute it
//! ```

use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ane_driver::transports::HostTransport;
use ane_driver::{AneDevice, Model, NetworkInstance};

#[derive(Parser)]
#[command(name = "ane", about = "Apple Neural Engine CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List every accel node that identifies as the `ane` driver.
    Enumerate,
    /// Parse a compiled model and print its channel layout.
    Inspect {
        /// Path to the compiled model file.
        model: String,
    },
    /// Bind a model and execute it with zeroed inputs.
    Run {
        /// Path to the compiled model file.
        model: String,
        /// Device index to bind to.
        #[arg(long, default_value_t = 0)]
        device: usize,
        /// Number of executions.
        #[arg(long, default_value_t = 1)]
        iters: u32,
        /// Use the in-memory host transport instead of hardware.
        #[arg(long)]
        host: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Enumerate => cmd_enumerate(),
        Cmd::Inspect { model } => cmd_inspect(&model),
        Cmd::Run {
            model,
            device,
            iters,
            host,
        } => cmd_run(&model, device, iters, host),
    }
}

fn cmd_enumerate() -> Result<()> {
    let nodes = ane_driver::enumerate();

    println!("Neural engine devices: {}", nodes.len());
    for node in &nodes {
        println!("[{}] {}", node.index, node.path.display());
    }
    if nodes.is_empty() {
        println!("(no `ane` accel nodes found; is the driver loaded?)");
    }

    Ok(())
}

fn cmd_inspect(path: &str) -> Result<()> {
    let model = Model::load(path).with_context(|| format!("loading {path}"))?;
    let desc = model.descriptor();

    println!("Model        : {path}");
    println!("Payload      : {:#x} bytes", desc.payload_size());
    println!(
        "Task         : {:#x} bytes, {} descriptor(s) of {:#x} bytes",
        desc.tsk_size(),
        desc.td_count(),
        desc.td_size()
    );
    println!("Weight slot  : {:#x} bytes", desc.tile_bytes(0));
    println!();

    for idx in 0..desc.dst_count() {
        print_channel(desc, "dst", idx, desc.dst_slot(idx));
    }
    for idx in 0..desc.src_count() {
        print_channel(desc, "src", idx, desc.src_slot(idx));
    }

    Ok(())
}

fn print_channel(
    desc: &ane_driver::Descriptor,
    kind: &str,
    idx: u32,
    slot: Option<usize>,
) {
    let Some(slot) = slot else { return };
    let s = desc.shape(slot);
    println!(
        "{kind} {idx} (slot {slot}): {}x{}x{}x{} fp16, {:#x} bytes tiled ({:#x} logical)",
        s.n,
        s.c,
        s.h,
        s.w,
        desc.tile_bytes(slot),
        s.logical_bytes()
    );
}

fn cmd_run(path: &str, device: usize, iters: u32, host: bool) -> Result<()> {
    let model = Model::load(path).with_context(|| format!("loading {path}"))?;

    let dev = if host {
        AneDevice::with_transport(Box::new(HostTransport::new()))
    } else {
        AneDevice::open(device).with_context(|| format!("opening device {device}"))?
    };

    let mut nn = NetworkInstance::bind(dev, model).context("binding network")?;
    println!(
        "Bound {path}: {} input(s), {} output(s){}",
        nn.src_count(),
        nn.dst_count(),
        if host { " [host transport]" } else { "" }
    );

    for idx in 0..nn.src_count() {
        let input = vec![0u8; nn.src_size(idx)? as usize];
        nn.send(&input, idx)?;
    }

    let start = Instant::now();
    for _ in 0..iters {
        nn.exec().context("executing network")?;
    }
    let elapsed = start.elapsed();

    if iters > 1 {
        println!(
            "{iters} iteration(s) in {elapsed:.2?} ({:.2?} each)",
            elapsed / iters
        );
    } else {
        println!("Executed in {elapsed:.2?}");
    }

    for idx in 0..nn.dst_count() {
        let mut output = vec![0u8; nn.dst_size(idx)? as usize];
        nn.read(&mut output, idx)?;
        let head: Vec<String> =
            output.iter().take(16).map(|b| format!("{b:02x}")).collect();
        println!("output {idx}: {} bytes, head {}", output.len(), head.join(" "));
    }

    Ok(())
}
