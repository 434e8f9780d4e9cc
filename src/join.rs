use crate::data::{parse_postal_code, Table};
use crate::error::{Diagnostics, PipelineWarning, Result};
use crate::types::{GeometryRecord, PostalRecord, SpatialRecord};
use geo::{Geometry, MultiPolygon};
use std::collections::HashMap;
use tracing::{debug, instrument};
use wkt::TryFromWkt;

/// One WKT geometry per postal code. Blank cells are skipped, so the first
/// non-empty geometry wins.
#[derive(Debug, Clone, Default)]
pub struct GeometryLookup {
    records: Vec<GeometryRecord>,
    index: HashMap<u32, usize>,
}

impl GeometryLookup {
    /// Builds the lookup from a geometry table. `key_column` is the join key
    /// and `geometry_column` holds the WKT text.
    pub fn from_table(
        table: &Table,
        key_column: &str,
        geometry_column: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self> {
        let key_idx = table.require_key(key_column)?;
        let geom_idx = table.require_column(geometry_column)?;

        let mut lookup = Self::default();
        for row in table.rows() {
            let raw_key = row.get(key_idx).unwrap_or("");
            let Some(postal_code) = parse_postal_code(raw_key) else {
                diagnostics.push(PipelineWarning::InvalidPostalCode {
                    table: table.name().to_string(),
                    value: raw_key.to_string(),
                });
                continue;
            };
            lookup.insert(GeometryRecord {
                postal_code,
                wkt: row.get(geom_idx).unwrap_or("").to_string(),
            });
        }

        debug!("Geometry lookup holds {} postal codes", lookup.len());
        Ok(lookup)
    }

    pub fn from_records(records: impl IntoIterator<Item = GeometryRecord>) -> Self {
        let mut lookup = Self::default();
        for record in records {
            lookup.insert(record);
        }
        lookup
    }

    fn insert(&mut self, record: GeometryRecord) {
        if record.wkt.trim().is_empty() || self.index.contains_key(&record.postal_code) {
            return;
        }
        self.index.insert(record.postal_code, self.records.len());
        self.records.push(record);
    }

    pub fn get(&self, postal_code: u32) -> Option<&GeometryRecord> {
        self.index.get(&postal_code).map(|&i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parses a WKT cell into a multipolygon. Single polygons are promoted.
pub fn parse_polygon_wkt(text: &str) -> std::result::Result<MultiPolygon<f64>, String> {
    let geometry = Geometry::<f64>::try_from_wkt_str(text).map_err(|e| e.to_string())?;
    match geometry {
        Geometry::MultiPolygon(mp) => Ok(mp),
        Geometry::Polygon(p) => Ok(MultiPolygon::new(vec![p])),
        Geometry::GeometryCollection(gc) => {
            let mut polygons = Vec::new();
            for g in gc {
                match g {
                    Geometry::Polygon(p) => polygons.push(p),
                    Geometry::MultiPolygon(mp) => polygons.extend(mp),
                    _ => {
                        return Err("geometry collection contains non-polygon members".to_string());
                    }
                }
            }
            Ok(MultiPolygon::new(polygons))
        }
        _ => Err("expected POLYGON or MULTIPOLYGON".to_string()),
    }
}

/// Left-joins `records` with `lookup` on postal code.
///
/// Output is sorted ascending by postal code, ties kept in input order. Rows
/// with no geometry are dropped silently. Rows whose WKT does not parse are
/// dropped with a [`PipelineWarning::GeometryParse`].
#[instrument(skip_all, fields(records = records.len()))]
pub fn join_geometry(
    records: &[PostalRecord],
    lookup: &GeometryLookup,
    diagnostics: &mut Diagnostics,
) -> Vec<SpatialRecord> {
    let mut sorted = records.to_vec();
    sorted.sort_by_key(|r| r.postal_code);

    // Each postal code is parsed once
    let mut parsed: HashMap<u32, Option<MultiPolygon<f64>>> = HashMap::new();
    let mut joined = Vec::with_capacity(sorted.len());

    for record in sorted {
        let geometry = parsed.entry(record.postal_code).or_insert_with(|| {
            let geo_record = lookup.get(record.postal_code)?;
            match parse_polygon_wkt(&geo_record.wkt) {
                Ok(mp) => Some(mp),
                Err(message) => {
                    diagnostics.push(PipelineWarning::GeometryParse {
                        postal_code: record.postal_code,
                        message,
                    });
                    None
                }
            }
        });

        if let Some(geometry) = geometry {
            joined.push(SpatialRecord {
                geometry: geometry.clone(),
                record,
            });
        }
    }

    debug!("Joined geometry onto {} records", joined.len());
    joined
}
