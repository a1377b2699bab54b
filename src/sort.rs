use feruca::Collator;
use std::cmp::Ordering;

use crate::models::{CompanyEntry, SortKey, SortOrder};

/// Returns a display-ordered copy of `entries`; the input is left untouched.
///
/// The sort is stable, so entries comparing equal keep their natural order in
/// both directions.
pub fn sorted_view(entries: &[CompanyEntry], key: SortKey, order: SortOrder) -> Vec<CompanyEntry> {
    let mut collator = Collator::default();
    let mut view = entries.to_vec();
    view.sort_by(|a, b| {
        let ordering = compare(&mut collator, a, b, key);
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
    view
}

pub fn compare(collator: &mut Collator, a: &CompanyEntry, b: &CompanyEntry, key: SortKey) -> Ordering {
    match key {
        SortKey::Name => compare_names(collator, &a.name, &b.name),
        // ISO dates order correctly as strings; empty sorts first.
        SortKey::InterviewDate => a.interview_date.cmp(&b.interview_date),
        SortKey::Status => a.status.position().cmp(&b.status.position()),
    }
}

/// Unicode collation (CLDR root order): accents and case are secondary and
/// tertiary differences, and hiragana sits next to the matching katakana.
fn compare_names(collator: &mut Collator, a: &str, b: &str) -> Ordering {
    collator.collate(a, b).then_with(|| a.cmp(b))
}
