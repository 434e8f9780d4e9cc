use crate::config::{ResidentConfig, StationConfig};
use crate::data::{normalize_decimal, parse_decimal, parse_postal_code, Table};
use crate::error::{Diagnostics, PipelineWarning, Result};
use crate::join::{join_geometry, GeometryLookup};
use crate::types::{PostalRecord, SpatialRecord};
use csv::StringRecord;
use tracing::{info, instrument};

/// Filters the charging-station register to one region and postal-code range
/// and attaches postal-code geometry.
#[instrument(skip_all, fields(rows = stations.len()))]
pub fn preprocess_stations(
    stations: &Table,
    geometry: &GeometryLookup,
    config: &StationConfig,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<SpatialRecord>> {
    let cols = &config.columns;
    let plz_idx = stations.require_key(&cols.postal_code)?;
    let region_idx = stations.require_column(&cols.region)?;
    let lat_idx = stations.require_column(&cols.latitude)?;
    let lon_idx = stations.require_column(&cols.longitude)?;
    let power_idx = stations.require_column(&cols.rated_power)?;

    let mut selected = Vec::new();
    for row in stations.rows() {
        let Some(postal_code) = postal_code_of(row, plz_idx, stations.name(), diagnostics) else {
            continue;
        };
        let region = cell(row, region_idx);
        if region != config.region || !config.plz_range.contains(postal_code) {
            continue;
        }

        let raw_power = cell(row, power_idx);
        let attribute_value = parse_decimal(raw_power);
        if attribute_value.is_none() && !raw_power.is_empty() {
            diagnostics.push(PipelineWarning::InvalidValue {
                table: stations.name().to_string(),
                column: cols.rated_power.clone(),
                value: raw_power.to_string(),
            });
        }

        selected.push(PostalRecord {
            postal_code,
            region: Some(region.to_string()),
            latitude: normalize_decimal(cell(row, lat_idx)),
            longitude: normalize_decimal(cell(row, lon_idx)),
            attribute_value,
        });
    }

    info!(
        "{} of {} stations are in {} with {} < PLZ < {}",
        selected.len(),
        stations.len(),
        config.region,
        config.plz_range.lower,
        config.plz_range.upper
    );
    diagnostics.check_empty("station filter", selected.len());

    let joined = join_geometry(&selected, geometry, diagnostics);
    diagnostics.check_empty("station geometry join", joined.len());
    Ok(joined)
}

/// Filters resident counts to a postal-code range and attaches geometry.
/// Rows without a readable resident count are dropped.
#[instrument(skip_all, fields(rows = residents.len()))]
pub fn preprocess_residents(
    residents: &Table,
    geometry: &GeometryLookup,
    config: &ResidentConfig,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<SpatialRecord>> {
    let cols = &config.columns;
    let plz_idx = residents.require_key(&cols.postal_code)?;
    let count_idx = residents.require_column(&cols.residents)?;
    let lat_idx = residents.require_column(&cols.latitude)?;
    let lon_idx = residents.require_column(&cols.longitude)?;

    let mut selected = Vec::new();
    for row in residents.rows() {
        let Some(postal_code) = postal_code_of(row, plz_idx, residents.name(), diagnostics) else {
            continue;
        };
        if !config.plz_range.contains(postal_code) {
            continue;
        }

        let raw_count = cell(row, count_idx);
        let Some(count) = parse_decimal(raw_count) else {
            diagnostics.push(PipelineWarning::InvalidValue {
                table: residents.name().to_string(),
                column: cols.residents.clone(),
                value: raw_count.to_string(),
            });
            continue;
        };

        selected.push(PostalRecord {
            postal_code,
            region: None,
            latitude: normalize_decimal(cell(row, lat_idx)),
            longitude: normalize_decimal(cell(row, lon_idx)),
            attribute_value: Some(count),
        });
    }

    info!(
        "{} of {} resident rows have {} < PLZ < {}",
        selected.len(),
        residents.len(),
        config.plz_range.lower,
        config.plz_range.upper
    );
    diagnostics.check_empty("resident filter", selected.len());

    let joined = join_geometry(&selected, geometry, diagnostics);
    diagnostics.check_empty("resident geometry join", joined.len());
    Ok(joined)
}

fn cell(row: &StringRecord, idx: usize) -> &str {
    row.get(idx).unwrap_or("")
}

fn postal_code_of(
    row: &StringRecord,
    idx: usize,
    table: &str,
    diagnostics: &mut Diagnostics,
) -> Option<u32> {
    let raw = cell(row, idx);
    let code = parse_postal_code(raw);
    if code.is_none() {
        diagnostics.push(PipelineWarning::InvalidPostalCode {
            table: table.to_string(),
            value: raw.to_string(),
        });
    }
    code
}
