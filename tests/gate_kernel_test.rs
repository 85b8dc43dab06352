use approx::assert_relative_eq;
use fused_lstm::{AcceleratedKernel, GateKernel, GenericKernel};
use ndarray::Array2;

fn filled_inputs(
    batch: usize,
    input_size: usize,
    output_size: usize,
    hidden_size: usize,
) -> (Array2<f32>, Array2<f32>, Array2<f32>, Array2<f32>) {
    let gate_cols = 4 * hidden_size;
    let x = Array2::from_shape_fn((batch, input_size), |(r, c)| {
        ((r * input_size + c) as f32 * 0.13).sin()
    });
    let h_prev = Array2::from_shape_fn((batch, output_size), |(r, c)| {
        ((r * output_size + c) as f32 * 0.29).cos() * 0.5
    });
    let weight = Array2::from_shape_fn((input_size + output_size, gate_cols), |(r, c)| {
        ((r * gate_cols + c) as f32 * 0.07).sin() * 0.3
    });
    let bias = Array2::from_shape_fn((1, gate_cols), |(_, c)| (c as f32 * 0.11).cos() * 0.1);
    (x, h_prev, weight, bias)
}

#[test]
fn test_gate_activations_stay_in_range() {
    let (batch, input_size, hidden_size) = (3, 4, 5);
    let (x, h_prev, weight, bias) = filled_inputs(batch, input_size, hidden_size, hidden_size);

    let mut gates = Array2::zeros((batch, 4 * hidden_size));
    GenericKernel.compute_gates(
        x.view(),
        h_prev.view(),
        &weight,
        &bias,
        &mut gates,
        hidden_size,
    );

    // Sigmoid quadrants in (0, 1), candidate quadrant in (-1, 1).
    for row in 0..batch {
        for col in 0..3 * hidden_size {
            let v = gates[[row, col]];
            assert!(v > 0.0 && v < 1.0, "sigmoid out of range: {}", v);
        }
        for col in 3 * hidden_size..4 * hidden_size {
            let v = gates[[row, col]];
            assert!(v > -1.0 && v < 1.0, "tanh out of range: {}", v);
        }
    }
}

#[test]
fn test_extreme_pre_activations_do_not_overflow() {
    let (batch, input_size, hidden_size) = (2, 3, 4);
    let x = Array2::from_elem((batch, input_size), 1000.0);
    let h_prev = Array2::from_elem((batch, hidden_size), -1000.0);
    let weight = Array2::from_elem((input_size + hidden_size, 4 * hidden_size), 50.0);
    let bias = Array2::zeros((1, 4 * hidden_size));

    let mut gates = Array2::zeros((batch, 4 * hidden_size));
    GenericKernel.compute_gates(
        x.view(),
        h_prev.view(),
        &weight,
        &bias,
        &mut gates,
        hidden_size,
    );

    assert!(gates.iter().all(|v| v.is_finite()));
}

#[test]
fn test_accelerated_matches_generic_below_threshold() {
    let (batch, input_size, hidden_size) = (2, 3, 4);
    let (x, h_prev, weight, bias) = filled_inputs(batch, input_size, hidden_size, hidden_size);

    let mut generic = Array2::zeros((batch, 4 * hidden_size));
    let mut accelerated = Array2::zeros((batch, 4 * hidden_size));
    GenericKernel.compute_gates(
        x.view(),
        h_prev.view(),
        &weight,
        &bias,
        &mut generic,
        hidden_size,
    );
    AcceleratedKernel.compute_gates(
        x.view(),
        h_prev.view(),
        &weight,
        &bias,
        &mut accelerated,
        hidden_size,
    );

    for (a, b) in generic.iter().zip(accelerated.iter()) {
        assert_relative_eq!(a, b, epsilon = 1e-6);
    }
}

#[test]
fn test_accelerated_matches_generic_above_threshold() {
    // 32 * 4 * 16 = 2048 gate elements, well past the parallel cutoff.
    let (batch, input_size, hidden_size) = (32, 6, 16);
    let (x, h_prev, weight, bias) = filled_inputs(batch, input_size, hidden_size, hidden_size);

    let mut generic = Array2::zeros((batch, 4 * hidden_size));
    let mut accelerated = Array2::zeros((batch, 4 * hidden_size));
    GenericKernel.compute_gates(
        x.view(),
        h_prev.view(),
        &weight,
        &bias,
        &mut generic,
        hidden_size,
    );
    AcceleratedKernel.compute_gates(
        x.view(),
        h_prev.view(),
        &weight,
        &bias,
        &mut accelerated,
        hidden_size,
    );

    for (a, b) in generic.iter().zip(accelerated.iter()) {
        assert_relative_eq!(a, b, epsilon = 1e-6);
    }
}

#[test]
fn test_known_pre_activation_values() {
    // x and h_prev of ones, every weight 0.02 with 5 + 5 rows, zero bias:
    // each pre-activation is exactly 0.2.
    let (batch, input_size, hidden_size) = (1, 5, 5);
    let x = Array2::ones((batch, input_size));
    let h_prev = Array2::ones((batch, hidden_size));
    let weight = Array2::from_elem((input_size + hidden_size, 4 * hidden_size), 0.02);
    let bias = Array2::zeros((1, 4 * hidden_size));

    let mut gates = Array2::zeros((batch, 4 * hidden_size));
    GenericKernel.compute_gates(
        x.view(),
        h_prev.view(),
        &weight,
        &bias,
        &mut gates,
        hidden_size,
    );

    let sigmoid_02 = 1.0 / (1.0 + (-0.2_f32).exp());
    let tanh_02 = 0.2_f32.tanh();
    for col in 0..3 * hidden_size {
        assert_relative_eq!(gates[[0, col]], sigmoid_02, epsilon = 1e-6);
    }
    for col in 3 * hidden_size..4 * hidden_size {
        assert_relative_eq!(gates[[0, col]], tanh_02, epsilon = 1e-6);
    }
}

#[test]
fn test_buffer_contents_fully_overwritten() {
    let (batch, input_size, hidden_size) = (2, 3, 4);
    let (x, h_prev, weight, bias) = filled_inputs(batch, input_size, hidden_size, hidden_size);

    // Stale contents from a previous checkout must not leak through.
    let mut gates = Array2::from_elem((batch, 4 * hidden_size), f32::MAX);
    GenericKernel.compute_gates(
        x.view(),
        h_prev.view(),
        &weight,
        &bias,
        &mut gates,
        hidden_size,
    );

    assert!(gates.iter().all(|v| v.is_finite() && v.abs() <= 1.0));
}
