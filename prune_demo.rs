use std::process;
use std::time::Instant;

use ndarray::{ArrayD, Ix2};
use parameter_pruning::architecture::{build_model, load_architecture};
use parameter_pruning::layers::{Layer, MaskedDense, Prunable};
use parameter_pruning::utils::SimpleRng;

// Linear regression with a sparse ground truth, pruned by weight magnitude.
const NUM_FEATURES: usize = 16;
const NUM_INFORMATIVE: usize = 4;
const NUM_SAMPLES: usize = 256;
const BATCH_SIZE: usize = 32;
// Training hyperparameters.
const LEARNING_RATE: f32 = 0.05;
const EPOCHS: usize = 200;
const SEED: u64 = 42;

// Synthetic dataset: y = x · w_true + noise, where only the first
// NUM_INFORMATIVE entries of w_true are non-zero.
fn make_dataset(rng: &mut SimpleRng) -> (ArrayD<f32>, ArrayD<f32>) {
    let true_weights: Vec<f32> = (0..NUM_FEATURES)
        .map(|i| if i < NUM_INFORMATIVE { 1.0 + i as f32 } else { 0.0 })
        .collect();

    let mut inputs = Vec::with_capacity(NUM_SAMPLES * NUM_FEATURES);
    let mut targets = Vec::with_capacity(NUM_SAMPLES);
    for _ in 0..NUM_SAMPLES {
        let row: Vec<f32> = (0..NUM_FEATURES).map(|_| rng.gen_range_f32(-1.0, 1.0)).collect();
        let y: f32 = row.iter().zip(&true_weights).map(|(x, w)| x * w).sum();
        targets.push(y + 0.01 * rng.next_gaussian());
        inputs.extend(row);
    }

    let inputs = ArrayD::from_shape_vec(vec![NUM_SAMPLES, NUM_FEATURES], inputs);
    let targets = ArrayD::from_shape_vec(vec![NUM_SAMPLES, 1], targets);
    match (inputs, targets) {
        (Ok(x), Ok(y)) => (x, y),
        _ => {
            eprintln!("Failed to shape synthetic dataset");
            process::exit(1);
        }
    }
}

// Mini-batch training with mean squared error. Returns the final epoch loss.
fn train(
    layer: &mut MaskedDense,
    inputs: &ArrayD<f32>,
    targets: &ArrayD<f32>,
    epochs: usize,
) -> parameter_pruning::Result<f32> {
    let x = inputs.view().into_dimensionality::<Ix2>()?;
    let y = targets.view().into_dimensionality::<Ix2>()?;
    let mut epoch_loss = 0.0f32;

    for epoch in 0..epochs {
        epoch_loss = 0.0;
        for start in (0..NUM_SAMPLES).step_by(BATCH_SIZE) {
            let end = (start + BATCH_SIZE).min(NUM_SAMPLES);
            let batch_x = x.slice(ndarray::s![start..end, ..]).to_owned().into_dyn();
            let batch_y = y.slice(ndarray::s![start..end, ..]).to_owned().into_dyn();

            let predictions = layer.call(&batch_x)?;
            let errors = &predictions - &batch_y;
            epoch_loss += errors.mapv(|e| e * e).sum();

            // d(e²)/dpred; the layer averages over the batch.
            let grad_output = errors.mapv(|e| 2.0 * e);
            layer.backward(&batch_x, &grad_output)?;
            layer.update_parameters(LEARNING_RATE);
        }
        epoch_loss /= NUM_SAMPLES as f32;

        if (epoch + 1) % 50 == 0 {
            println!("  Epoch {:4}, MSE: {:.6}", epoch + 1, epoch_loss);
        }
    }
    Ok(epoch_loss)
}

// Keep exactly the `keep` largest-magnitude weights, zero the rest.
// Ties go to the lower index.
fn magnitude_mask(weight: &ArrayD<f32>, keep: usize) -> ArrayD<f32> {
    let magnitudes: Vec<f32> = weight.iter().map(|w| w.abs()).collect();
    let mut order: Vec<usize> = (0..magnitudes.len()).collect();
    order.sort_by(|&a, &b| magnitudes[b].total_cmp(&magnitudes[a]));

    let mut kept = vec![false; magnitudes.len()];
    for &idx in order.iter().take(keep) {
        kept[idx] = true;
    }
    let mut mask = weight.mapv(|_| 0.0f32);
    for (m, &k) in mask.iter_mut().zip(&kept) {
        if k {
            *m = 1.0;
        }
    }
    mask
}

fn run_regression() -> parameter_pruning::Result<()> {
    let mut rng = SimpleRng::new(SEED);
    let (inputs, targets) = make_dataset(&mut rng);

    let mut layer = MaskedDense::new(1)?.with_name("regressor").with_seed(SEED);

    println!("Training dense model ({} features)...", NUM_FEATURES);
    let dense_loss = train(&mut layer, &inputs, &targets, EPOCHS)?;

    let mask = magnitude_mask(layer.weight()?, NUM_INFORMATIVE);
    layer.set_mask(&mask)?;
    println!();
    println!(
        "Pruned '{}' to {:.1}% sparsity",
        layer.name(),
        layer.sparsity()? * 100.0
    );

    println!("Fine-tuning pruned model...");
    let pruned_loss = train(&mut layer, &inputs, &targets, EPOCHS / 2)?;

    let kept: Vec<usize> = mask
        .iter()
        .enumerate()
        .filter(|(_, m)| **m != 0.0)
        .map(|(i, _)| i)
        .collect();
    println!();
    println!("=== Results ===");
    println!("Dense MSE:  {:.6}", dense_loss);
    println!("Pruned MSE: {:.6}", pruned_loss);
    println!("Kept features: {:?}", kept);
    Ok(())
}

// Build every layer of an architecture file and print a parameter summary.
fn summarize_architecture(path: &str) -> parameter_pruning::Result<()> {
    let config = load_architecture(path)?;
    let layers = build_model(&config)?;

    println!("Architecture: {}", path);
    let mut shape = config.input_shape.clone();
    for layer in &layers {
        shape = layer.output_shape(&shape)?;
        println!(
            "  {:<16} output {:?}  trainable {:>8}  mask {:>8}  sparsity {:.2}",
            layer.name(),
            shape,
            layer.parameter_count(),
            layer.non_trainable_parameter_count(),
            layer.sparsity()?
        );
    }
    Ok(())
}

fn main() {
    let start = Instant::now();

    let result = match std::env::args().nth(1) {
        Some(path) => summarize_architecture(&path),
        None => run_regression(),
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    println!();
    println!("Total time: {:.2}s", start.elapsed().as_secs_f32());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnitude_mask_keeps_largest() {
        let weight = ArrayD::from_shape_vec(vec![4, 1], vec![0.1, -3.0, 0.5, 2.0]).unwrap();
        let mask = magnitude_mask(&weight, 2);
        assert_eq!(mask.iter().copied().collect::<Vec<_>>(), vec![0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_magnitude_mask_ties_keep_exact_count() {
        let weight = ArrayD::from_shape_vec(vec![2, 2], vec![1.0, -1.0, 1.0, 0.5]).unwrap();
        let mask = magnitude_mask(&weight, 2);
        assert_eq!(mask.sum(), 2.0);
        assert_eq!(mask.iter().copied().collect::<Vec<_>>(), vec![1.0, 1.0, 0.0, 0.0]);

        assert_eq!(magnitude_mask(&weight, 0).sum(), 0.0);
        assert_eq!(magnitude_mask(&weight, 10).sum(), 4.0);
    }
}
