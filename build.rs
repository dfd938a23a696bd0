use nalgebra::Vector3;
use std::env;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use wide::{CmpLt, f64x4};

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("tuned_constants.rs");
    let mut f = File::create(&dest_path).unwrap();

    let mut parallel_threshold = 256;

    // Calibration: time a serial per-particle neighbor accumulation and pick
    // the particle count below which spawning rayon tasks does not pay off.
    let n_test = 512;
    let mut pos = Vec::with_capacity(n_test);
    for i in 0..n_test {
        let t = i as f64;
        pos.push(Vector3::new(
            (t * 0.37).fract() * 8.0,
            (t * 0.61).fract() * 8.0,
            (t * 0.83).fract() * 8.0,
        ));
    }
    let cutoff = 1.5;

    let _ = neighbor_accumulate_simd(&pos, cutoff);
    let start = Instant::now();
    let mut checksum = 0.0;
    for _ in 0..5 {
        checksum += neighbor_accumulate_simd(&pos, cutoff);
    }
    let micros = (start.elapsed() / 5).as_micros();

    if micros < 500 {
        parallel_threshold = 512;
    } else if micros > 5000 {
        parallel_threshold = 128;
    }

    writeln!(
        f,
        "pub const PARALLEL_THRESHOLD: usize = {};",
        parallel_threshold
    )
    .unwrap();

    println!(
        "cargo:warning=Auto-tuning: PARALLEL_THRESHOLD={} (calibration {}us, checksum {:.3})",
        parallel_threshold, micros, checksum
    );
    println!("cargo:rerun-if-changed=build.rs");
}

/// Sums `1 / r` over every pair within `cutoff` for each particle, four
/// candidates at a time.
fn neighbor_accumulate_simd(positions: &[Vector3<f64>], cutoff: f64) -> f64 {
    let n = positions.len();
    let cutoff_sq = cutoff * cutoff;
    let cutoff_sq_v = f64x4::splat(cutoff_sq);
    let min_sq_v = f64x4::splat(1e-6);
    let zero = f64x4::splat(0.0);
    let one = f64x4::splat(1.0);

    let px: Vec<f64> = positions.iter().map(|p| p.x).collect();
    let py: Vec<f64> = positions.iter().map(|p| p.y).collect();
    let pz: Vec<f64> = positions.iter().map(|p| p.z).collect();

    let mut total = 0.0;
    for i in 0..n {
        let pix = f64x4::splat(px[i]);
        let piy = f64x4::splat(py[i]);
        let piz = f64x4::splat(pz[i]);
        let mut acc = zero;
        let mut j = 0;
        while j + 4 <= n {
            let pjx = f64x4::new([px[j], px[j + 1], px[j + 2], px[j + 3]]);
            let pjy = f64x4::new([py[j], py[j + 1], py[j + 2], py[j + 3]]);
            let pjz = f64x4::new([pz[j], pz[j + 1], pz[j + 2], pz[j + 3]]);
            let dx = pjx - pix;
            let dy = pjy - piy;
            let dz = pjz - piz;
            let d2 = dx * dx + dy * dy + dz * dz;
            let inside = d2.cmp_lt(cutoff_sq_v) & min_sq_v.cmp_lt(d2);
            let contrib = one / d2.max(min_sq_v).sqrt();
            acc += inside.blend(contrib, zero);
            j += 4;
        }
        let mut tail = acc.reduce_add();
        for k in j..n {
            let dx = px[k] - px[i];
            let dy = py[k] - py[i];
            let dz = pz[k] - pz[i];
            let d2 = dx * dx + dy * dy + dz * dz;
            if d2 < cutoff_sq && d2 > 1e-6 {
                tail += 1.0 / d2.sqrt();
            }
        }
        total += tail;
    }
    total
}
