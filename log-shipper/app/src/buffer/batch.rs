use crate::domain::{CanonicalRecord, Destination};
use std::time::Instant;
use uuid::Uuid;

/// Ordered records for one destination, delivered as a single transaction.
#[derive(Debug, Clone)]
pub struct Batch {
    id: String,
    destination: Destination,
    records: Vec<CanonicalRecord>,
    created_at: Instant,
}

impl Batch {
    pub fn new(destination: Destination, records: Vec<CanonicalRecord>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            destination,
            records,
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[CanonicalRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<CanonicalRecord> {
        self.records
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// All batches for one destination out of a single drain, in enqueue order.
#[derive(Debug)]
pub struct DestinationGroup {
    pub destination: Destination,
    pub batches: Vec<Batch>,
}

impl DestinationGroup {
    pub fn record_count(&self) -> usize {
        self.batches.iter().map(Batch::size).sum()
    }
}

/// Groups drained records by destination.
///
/// Groups appear in order of each destination's first record; inside a group
/// records keep their relative order and are split into batches of at most
/// `max_batch_size`.
pub fn group_by_destination(
    records: Vec<CanonicalRecord>,
    max_batch_size: usize,
) -> Vec<DestinationGroup> {
    let max_batch_size = max_batch_size.max(1);
    let mut grouped: Vec<(Destination, Vec<CanonicalRecord>)> = Vec::new();

    for record in records {
        match grouped
            .iter_mut()
            .find(|(dest, _)| dest == record.destination())
        {
            Some((_, bucket)) => bucket.push(record),
            None => grouped.push((record.destination().clone(), vec![record])),
        }
    }

    grouped
        .into_iter()
        .map(|(destination, mut bucket)| {
            let mut batches = Vec::with_capacity(bucket.len().div_ceil(max_batch_size));
            while bucket.len() > max_batch_size {
                let rest = bucket.split_off(max_batch_size);
                batches.push(Batch::new(destination.clone(), bucket));
                bucket = rest;
            }
            batches.push(Batch::new(destination.clone(), bucket));
            DestinationGroup {
                destination,
                batches,
            }
        })
        .collect()
}

/// Size-triggered batching for a single destination.
///
/// Used by file ingestion: records are pushed one at a time and a full batch
/// is handed back as soon as the threshold is reached, so at most one batch is
/// held in memory.
#[derive(Debug)]
pub struct BatchAccumulator {
    destination: Destination,
    threshold: usize,
    pending: Vec<CanonicalRecord>,
}

impl BatchAccumulator {
    pub fn new(destination: Destination, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            destination,
            threshold,
            pending: Vec::with_capacity(threshold.min(8192)),
        }
    }

    pub fn push(&mut self, record: CanonicalRecord) -> Option<Batch> {
        self.pending.push(record);
        if self.pending.len() >= self.threshold {
            let records = std::mem::replace(
                &mut self.pending,
                Vec::with_capacity(self.threshold.min(8192)),
            );
            return Some(Batch::new(self.destination.clone(), records));
        }
        None
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Flushes whatever is left; `None` when nothing is pending.
    pub fn finish(self) -> Option<Batch> {
        (!self.pending.is_empty()).then(|| Batch::new(self.destination, self.pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Fields;

    fn record(dest: &str, seq: usize) -> CanonicalRecord {
        let mut fields = Fields::new();
        fields.insert("seq", seq.to_string());
        CanonicalRecord::new(Destination::new(dest).unwrap(), Some(1), fields)
    }

    fn seqs(batch: &Batch) -> Vec<String> {
        batch
            .records()
            .iter()
            .map(|r| r.field("seq").unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_batch_has_unique_id() {
        let dest = Destination::new("a").unwrap();
        let first = Batch::new(dest.clone(), vec![]);
        let second = Batch::new(dest, vec![]);
        assert_ne!(first.id(), second.id());
        assert!(first.is_empty());
    }

    #[test]
    fn test_grouping_keeps_per_destination_order() {
        let records = vec![
            record("a", 0),
            record("b", 1),
            record("a", 2),
            record("b", 3),
            record("a", 4),
        ];

        let groups = group_by_destination(records, 100);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].destination.as_str(), "a");
        assert_eq!(seqs(&groups[0].batches[0]), vec!["0", "2", "4"]);
        assert_eq!(groups[1].destination.as_str(), "b");
        assert_eq!(seqs(&groups[1].batches[0]), vec!["1", "3"]);
    }

    #[test]
    fn test_large_group_is_chunked_in_order() {
        let records: Vec<_> = (0..7).map(|i| record("a", i)).collect();
        let groups = group_by_destination(records, 3);

        assert_eq!(groups.len(), 1);
        let sizes: Vec<_> = groups[0].batches.iter().map(Batch::size).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(seqs(&groups[0].batches[2]), vec!["6"]);
        assert_eq!(groups[0].record_count(), 7);
    }

    #[test]
    fn test_accumulator_flushes_at_threshold_and_on_finish() {
        let mut acc = BatchAccumulator::new(Destination::new("a").unwrap(), 2);
        assert!(acc.push(record("a", 0)).is_none());
        let full = acc.push(record("a", 1)).unwrap();
        assert_eq!(full.size(), 2);

        assert!(acc.push(record("a", 2)).is_none());
        assert_eq!(acc.pending(), 1);
        let rest = acc.finish().unwrap();
        assert_eq!(seqs(&rest), vec!["2"]);
    }

    #[test]
    fn test_accumulator_finish_empty_is_none() {
        let acc = BatchAccumulator::new(Destination::new("a").unwrap(), 5);
        assert!(acc.finish().is_none());
    }
}
