//! Enumerate all neural engine device nodes on the system.
//!
//! Probes the accel nodes and reports which ones answer as `ane`.

use ane_driver::Result;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("ane_driver=debug")
        .init();

    let nodes = ane_driver::enumerate();

    println!("Neural engine devices: {}\n", nodes.len());

    for node in &nodes {
        println!("[{}] {}", node.index, node.path.display());
    }

    if nodes.is_empty() {
        println!("(no `ane` accel nodes found; is the driver loaded?)");
    }

    Ok(())
}
