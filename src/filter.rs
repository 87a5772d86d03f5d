use crate::club::{ClubBatch, ClubRecord};

fn matches(record: &ClubRecord, keywords: &[String]) -> bool {
    let address = record.address.to_lowercase();

    keywords
        .iter()
        .any(|keyword| address.contains(&keyword.to_lowercase()))
}

/// Keeps the records whose address contains at least one of `keywords`,
/// ignoring case. An empty keyword list keeps nothing.
pub fn filter(batch: ClubBatch, keywords: &[String]) -> ClubBatch {
    batch
        .into_iter()
        .filter(|record| matches(record, keywords))
        .collect()
}
