//! End-to-end exercise of the parallel evaluation workflow: a coordinator
//! splits the trial grid into disjoint blocks, independent workers score
//! their blocks, and the merged result aligns against the key and round
//! trips through both container formats.

use sveval_trials::{Format, IdCatalog, Mat, TrialKey, TrialNdx, TrialScores, TrialsError};
use tempfile::tempdir;

fn build_key(n_models: usize, n_segs: usize) -> TrialKey {
    let models = IdCatalog::new((0..n_models).map(|i| format!("spk{i:02}"))).unwrap();
    let segs = IdCatalog::new((0..n_segs).map(|j| format!("utt{j:02}"))).unwrap();
    let mut tar = Mat::zeros(n_models, n_segs);
    let mut non = Mat::zeros(n_models, n_segs);
    for i in 0..n_models {
        for j in 0..n_segs {
            // Each model targets the segments congruent to its own index.
            if j % n_models == i {
                tar[(i, j)] = true;
            } else {
                non[(i, j)] = true;
            }
        }
    }
    TrialKey::new(models, segs, tar, non).unwrap()
}

/// Deterministic stand-in for an external scoring backend.
fn fake_score(model: &str, seg: &str) -> f64 {
    let h = model
        .bytes()
        .chain(seg.bytes())
        .fold(17u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
    (h % 2000) as f64 / 100.0 - 10.0
}

fn score_block(ndx: &TrialNdx) -> TrialScores {
    let mut scr = TrialScores::empty(ndx.model_set().clone(), ndx.seg_set().clone());
    for (i, model) in ndx.model_set().ids().iter().enumerate() {
        for (j, seg) in ndx.seg_set().ids().iter().enumerate() {
            if ndx.trial_mask()[(i, j)] {
                scr.set_score(model, seg, fake_score(model, seg)).unwrap();
            }
        }
    }
    scr
}

#[test]
fn workers_score_disjoint_blocks_and_coordinator_merges() {
    let key = build_key(5, 12);
    let ndx = key.to_ndx();

    // Three row workers, two column workers.
    let mut worker_outputs = Vec::new();
    for i in 1..=3 {
        for j in 1..=2 {
            let block = ndx.split(i, 3, j, 2);
            worker_outputs.push(score_block(&block));
        }
    }

    let merged = TrialScores::merge(&worker_outputs).unwrap();
    let aligned = merged.align_with_ndx(&key, true).unwrap();

    // Every required trial got exactly the score its worker computed.
    let (tar, non) = aligned.get_tar_non(&key).unwrap();
    assert_eq!(tar.len() + non.len(), key.to_ndx().trial_mask().count());
    for (i, model) in key.model_set().ids().iter().enumerate() {
        for (j, seg) in key.seg_set().ids().iter().enumerate() {
            if key.tar()[(i, j)] || key.non()[(i, j)] {
                let r = aligned.model_set().position(model).unwrap();
                let c = aligned.seg_set().position(seg).unwrap();
                assert_eq!(aligned.scores()[(r, c)], fake_score(model, seg));
            }
        }
    }
}

#[test]
fn merged_scores_survive_both_container_formats() {
    let key = build_key(4, 9);
    let ndx = key.to_ndx();
    let scores = score_block(&ndx);

    let dir = tempdir().unwrap();

    let bin_path = dir.path().join("scores.bin");
    scores.save(&bin_path).unwrap();
    let from_bin = TrialScores::load(&bin_path).unwrap();
    assert_eq!(from_bin, scores);

    let txt_path = dir.path().join("scores.txt");
    scores.save_as(&txt_path, Format::Text).unwrap();
    let from_txt = TrialScores::load_as(&txt_path, Format::Text).unwrap();
    let mut sorted = scores.clone();
    sorted.sort();
    assert_eq!(from_txt, sorted);

    // Text and binary agree on the extracted tar/non score sets.
    let mut key_sorted = key.clone();
    key_sorted.sort();
    let (mut tar_a, _) = from_bin.get_tar_non(&key).unwrap();
    let (mut tar_b, _) = from_txt.get_tar_non(&key_sorted).unwrap();
    tar_a.sort_by(f64::total_cmp);
    tar_b.sort_by(f64::total_cmp);
    assert_eq!(tar_a, tar_b);
}

#[test]
fn missing_worker_output_is_detected_then_patched() {
    let key = build_key(3, 6);
    let ndx = key.to_ndx();

    // Only the first of two row blocks gets scored.
    let scored = score_block(&ndx.split(1, 2, 1, 1));

    // The partial block alone cannot cover the key's catalogs.
    let err = scored.align_with_ndx(&key, true).unwrap_err();
    assert!(matches!(err, TrialsError::MissingIdentifier { .. }));

    // Padding out to the full grid exposes the unscored trials instead.
    let empty_rest = TrialScores::empty(key.model_set().clone(), key.seg_set().clone());
    let padded = TrialScores::merge(&[scored, empty_rest]).unwrap();
    match padded.align_with_ndx(&key, true).unwrap_err() {
        TrialsError::MissingScores { count, .. } => assert_eq!(count, 12),
        other => panic!("expected MissingScores, got {other}"),
    }

    // Flooring the holes yields a fully covered container.
    let patched = padded.set_missing_to_value(&key, -100.0).unwrap();
    let (tar, non) = patched.get_tar_non(&key).unwrap();
    assert_eq!(tar.len() + non.len(), 18);
    assert!(non.contains(&-100.0));
}
