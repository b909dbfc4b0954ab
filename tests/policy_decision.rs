use pdf_squeeze::{
    engine::QualityPreset::{self, *},
    policy::{judge, Standing, Verdict},
};

fn standing(preset: QualityPreset, size: u64, met_target: bool) -> Standing {
    Standing {
        preset,
        size,
        met_target,
    }
}

#[test]
fn first_success_always_becomes_candidate() {
    assert_eq!(judge(None, Screen, 3, 5), Verdict::Supersede);
    assert_eq!(judge(None, Screen, 9, 5), Verdict::Fallback);
}

#[test]
fn meeting_attempt_replaces_missing_candidate() {
    let best = standing(Screen, 2, false);
    assert_eq!(judge(Some(&best), Ebook, 5, 5), Verdict::Supersede);
}

#[test]
fn higher_quality_meeting_attempt_wins() {
    let best = standing(Screen, 3, true);
    assert_eq!(judge(Some(&best), Printer, 4, 5), Verdict::Supersede);
    assert_eq!(judge(Some(&best), Printer, 3, 5), Verdict::Supersede);
}

#[test]
fn lower_quality_meeting_attempt_loses_even_if_smaller() {
    let best = standing(Printer, 4, true);
    assert_eq!(judge(Some(&best), Ebook, 1, 5), Verdict::Keep);
}

#[test]
fn fallback_only_while_nothing_met() {
    let missing = standing(Ebook, 6, false);
    assert_eq!(judge(Some(&missing), Printer, 5, 4), Verdict::Fallback);
    assert_eq!(judge(Some(&missing), Printer, 6, 4), Verdict::Keep);
    assert_eq!(judge(Some(&missing), Printer, 7, 4), Verdict::Keep);

    let met = standing(Screen, 3, true);
    assert_eq!(judge(Some(&met), Ebook, 4, 3), Verdict::Keep);
}

#[test]
fn verdict_replaces() {
    assert!(Verdict::Supersede.replaces());
    assert!(Verdict::Fallback.replaces());
    assert!(!Verdict::Keep.replaces());
}
