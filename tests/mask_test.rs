use fused_lstm::SequenceMask;
use ndarray::{Array2, array};

#[test]
fn test_from_lengths_marks_finished_rows() {
    let lengths = [3, 1, 2];

    let step0 = SequenceMask::from_lengths(&lengths, 0);
    assert!(!step0.is_padded(0));
    assert!(!step0.is_padded(1));
    assert!(!step0.is_padded(2));
    assert!(!step0.any_padded());

    let step1 = SequenceMask::from_lengths(&lengths, 1);
    assert!(!step1.is_padded(0));
    assert!(step1.is_padded(1));
    assert!(!step1.is_padded(2));

    let step2 = SequenceMask::from_lengths(&lengths, 2);
    assert!(!step2.is_padded(0));
    assert!(step2.is_padded(1));
    assert!(step2.is_padded(2));
    assert!(step2.any_padded());
}

#[test]
fn test_batch_size_matches_lengths() {
    let mask = SequenceMask::from_lengths(&[4, 4, 1, 2], 0);
    assert_eq!(mask.batch_size(), 4);
}

#[test]
fn test_freeze_rows_restores_padded_rows_only() {
    let mask = SequenceMask::new(array![false, true, false]);
    let mut dst = array![[1.0_f32, 2.0], [3.0, 4.0], [5.0, 6.0]];
    let src = array![[10.0_f32, 20.0], [30.0, 40.0], [50.0, 60.0]];

    mask.freeze_rows(&mut dst, src.view());

    assert_eq!(dst, array![[1.0, 2.0], [30.0, 40.0], [5.0, 6.0]]);
}

#[test]
fn test_zero_rows_clears_padded_rows_only() {
    let mask = SequenceMask::new(array![true, false]);
    let mut dst = array![[1.0_f32, 2.0], [3.0, 4.0]];

    mask.zero_rows(&mut dst);

    assert_eq!(dst, array![[0.0, 0.0], [3.0, 4.0]]);
}

#[test]
fn test_all_unpadded_mask_is_identity() {
    let mask = SequenceMask::from_lengths(&[5, 5], 2);
    let mut dst = Array2::from_elem((2, 3), 7.0_f32);
    let src = Array2::zeros((2, 3));

    mask.freeze_rows(&mut dst, src.view());
    assert_eq!(dst, Array2::from_elem((2, 3), 7.0));

    mask.zero_rows(&mut dst);
    assert_eq!(dst, Array2::from_elem((2, 3), 7.0));
}
