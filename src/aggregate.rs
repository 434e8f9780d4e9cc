use crate::types::{AggregatedCount, SpatialRecord};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Counts records per postal code, keeping the geometry of the first record
/// seen for each code. Rows come out in ascending postal-code order.
#[instrument(skip_all, fields(records = records.len()))]
pub fn count_by_postal_code(records: &[SpatialRecord]) -> Vec<AggregatedCount> {
    let mut groups: BTreeMap<u32, AggregatedCount> = BTreeMap::new();

    for record in records {
        groups
            .entry(record.postal_code())
            .and_modify(|group| group.count += 1)
            .or_insert_with(|| AggregatedCount {
                postal_code: record.postal_code(),
                count: 1,
                geometry: record.geometry.clone(),
            });
    }

    debug!("{} records fall into {} postal codes", records.len(), groups.len());
    groups.into_values().collect()
}
