//! Headless run of the default membrane.
//!
//! Runs two seconds with the default configuration, discards the audio
//! clips, then writes the recording and the final field to the temp dir.
//!
//! Run with:
//!   cargo run -p membrane-core --example headless_run

use membrane_core::wav::write_wav;
use membrane_core::{MembraneParams, NullSink, Simulation};

fn main() -> membrane_core::Result<()> {
    println!("=== Headless Membrane Run ===");

    let params = MembraneParams {
        duration: 2,
        ..MembraneParams::default()
    };
    println!(
        "Domain {}x{}, λ={}, d={}, excitation every {} ticks",
        params.width,
        params.height,
        params.propagation_factor,
        params.damping_factor,
        params.excitation_period()
    );

    let mut sim = Simulation::new(params, NullSink::new())?;
    let summary = sim.run()?;
    println!(
        "Ran {} batches ({} ticks), {} rolling flushes",
        summary.batches, summary.ticks, summary.rolling_flushes
    );

    let out = std::env::temp_dir();
    sim.save_snapshot(out.join("membrane-field.png"))?;
    let rate = sim.params().sample_rate;
    let done = sim.finish()?;
    let peak = done.samples.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
    println!("Recorded {} samples, peak {}", done.samples.len(), peak);

    write_wav(out.join("membrane.wav"), &done.samples, rate)?;
    println!("Wrote {}", out.join("membrane.wav").display());
    Ok(())
}
