//! Load a compiled model, run it once, and print the raw output.
//!
//! Usage: run_model <model.anec>

use ane_driver::{NetworkInstance, Result};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("ane_driver=info")
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "net.anec".into());

    let mut nn = NetworkInstance::from_file(&path, 0)?;
    println!(
        "Bound {path}: {} input(s), {} output(s)",
        nn.src_count(),
        nn.dst_count()
    );

    // Zero inputs are enough to exercise the full path.
    for idx in 0..nn.src_count() {
        let input = vec![0u8; nn.src_size(idx)? as usize];
        nn.send(&input, idx)?;
    }

    nn.exec()?;

    for idx in 0..nn.dst_count() {
        let mut output = vec![0u8; nn.dst_size(idx)? as usize];
        nn.read(&mut output, idx)?;
        let head: Vec<String> = output.iter().take(16).map(|b| format!("{b:02x}")).collect();
        println!("output {idx}: {} bytes, head {}", output.len(), head.join(" "));
    }

    println!("Done.");
    Ok(())
}
