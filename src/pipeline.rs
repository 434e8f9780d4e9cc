use crate::aggregate::count_by_postal_code;
use crate::config::AppConfig;
use crate::data::Table;
use crate::error::{Diagnostics, Result};
use crate::join::GeometryLookup;
use crate::processing::{preprocess_residents, preprocess_stations};
use crate::render::MapData;
use tracing::{info, instrument};

#[derive(Debug, Clone, Default)]
pub struct Prepared {
    pub data: MapData,
    pub diagnostics: Diagnostics,
}

/// The three raw input tables.
#[derive(Debug, Clone)]
pub struct RawTables {
    pub geometry: Table,
    pub stations: Table,
    pub residents: Table,
}

impl RawTables {
    pub fn load(config: &AppConfig) -> Result<Self> {
        let input = &config.input;
        Ok(Self {
            geometry: Table::from_path("geometry", &input.geodata_plz, input.delimiter)?,
            stations: Table::from_path(
                "stations",
                &config.stations.file,
                config.stations.delimiter,
            )?,
            residents: Table::from_path(
                "residents",
                &config.residents.file,
                config.residents.delimiter,
            )?,
        })
    }
}

/// Loads the inputs named in `config` and prepares both map layers.
#[instrument(skip_all)]
pub fn prepare(config: &AppConfig) -> Result<Prepared> {
    let tables = RawTables::load(config)?;
    prepare_tables(&tables, config)
}

/// Prepares both map layers from tables that are already loaded.
pub fn prepare_tables(tables: &RawTables, config: &AppConfig) -> Result<Prepared> {
    let mut diagnostics = Diagnostics::new();

    let lookup = GeometryLookup::from_table(
        &tables.geometry,
        &config.input.geocode,
        &config.input.geometry_column,
        &mut diagnostics,
    )?;
    diagnostics.check_empty("geometry lookup", lookup.len());

    let stations =
        preprocess_stations(&tables.stations, &lookup, &config.stations, &mut diagnostics)?;
    let station_counts = count_by_postal_code(&stations);
    let residents =
        preprocess_residents(&tables.residents, &lookup, &config.residents, &mut diagnostics)?;

    info!(
        "Prepared {} station postal codes ({} stations) and {} resident rows, {} warnings",
        station_counts.len(),
        stations.len(),
        residents.len(),
        diagnostics.warnings().len()
    );

    Ok(Prepared {
        data: MapData {
            stations: station_counts,
            residents,
        },
        diagnostics,
    })
}
