mod common;

use curator_core::scorer::{score, score_with};
use curator_core::{NewsTier, Selection, TierTargets};

use common::clean_selection;

#[test]
fn score_is_deterministic_and_bounded() {
    let selection = clean_selection();
    let first = score(&selection);
    let second = score(&selection);
    assert_eq!(first, second);
    assert!((0.0..=100.0).contains(&first.value));
    assert!(
        (first.value - (first.coverage + first.urgency + first.audience + first.full_ratio)).abs()
            < 1e-9
    );
}

#[test]
fn out_of_range_urgency_stays_bounded() {
    let mut selection = clean_selection();
    for (i, entry) in selection.items.iter_mut().enumerate() {
        entry.urgency_score = if i % 2 == 0 { 99 } else { -5 };
    }
    let s = score(&selection);
    assert!((0.0..=100.0).contains(&s.value));
    assert!(s.urgency <= 40.0);
}

#[test]
fn full_coverage_max_urgency_is_must_read() {
    let mut selection = clean_selection();
    for entry in selection.items.iter_mut() {
        entry.urgency_score = 10;
    }
    let s = score(&selection);
    assert!((s.value - 100.0).abs() < 1e-9);
    assert_eq!(s.tier, NewsTier::MustRead);
}

#[test]
fn empty_selection_scores_only_met_targets() {
    let empty = Selection::new("builders", Vec::new());
    let s = score_with(
        &empty,
        &TierTargets {
            full: 0,
            quick: 0,
            trending: 0,
        },
    );
    // Zero targets count as met; nothing else contributes.
    assert!((s.value - 30.0).abs() < 1e-9);
    assert_eq!(s.tier, NewsTier::Interesting);
}

#[test]
fn thin_audience_value_lowers_score() {
    let rich = clean_selection();
    let mut thin = clean_selection();
    for entry in thin.items.iter_mut() {
        entry.audience_value = "useful".to_string();
    }
    assert!(score(&thin).value < score(&rich).value);
    assert!(score(&thin).audience < 30.0);
}
