
use crate::types::{PaperId, PaperRecord};
use chrono::NaiveDate;

/// Fixed run date used across database tests.
pub(crate) fn test_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
}

/// A minimal paper record for the given id on the test date.
pub(crate) fn record(id: &str) -> PaperRecord {
    PaperRecord {
        id: PaperId::new(id),
        title: format!("Paper {id}"),
        source_url: format!("https://arxiv.org/pdf/{id}.pdf"),
        listing_url: None,
        listing_date: test_date(),
    }
}
