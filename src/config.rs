use crate::types::PostalRange;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    pub stations: StationConfig,
    pub residents: ResidentConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Postal-code geometry lookup.
#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub geodata_plz: PathBuf,
    #[serde(default = "semicolon")]
    pub delimiter: char,
    /// Join key shared by the geometry table and the canonical record tables.
    #[serde(default = "default_geocode")]
    pub geocode: String,
    #[serde(default = "default_geometry_column")]
    pub geometry_column: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StationConfig {
    pub file: PathBuf,
    #[serde(default = "semicolon")]
    pub delimiter: char,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_station_range")]
    pub plz_range: PostalRange,
    #[serde(default)]
    pub columns: StationColumns,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StationColumns {
    pub postal_code: String,
    pub region: String,
    pub latitude: String,
    pub longitude: String,
    pub rated_power: String,
}

impl Default for StationColumns {
    fn default() -> Self {
        Self {
            postal_code: "Postleitzahl".to_string(),
            region: "Bundesland".to_string(),
            latitude: "Breitengrad".to_string(),
            longitude: "Längengrad".to_string(),
            rated_power: "Nennleistung Ladeeinrichtung [kW]".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResidentConfig {
    pub file: PathBuf,
    #[serde(default = "comma")]
    pub delimiter: char,
    #[serde(default = "default_resident_range")]
    pub plz_range: PostalRange,
    #[serde(default)]
    pub columns: ResidentColumns,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ResidentColumns {
    pub postal_code: String,
    pub residents: String,
    pub latitude: String,
    pub longitude: String,
}

impl Default for ResidentColumns {
    fn default() -> Self {
        Self {
            postal_code: "plz".to_string(),
            residents: "einwohner".to_string(),
            latitude: "lat".to_string(),
            longitude: "lon".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            title: "Heatmaps: Electric Charging Stations and Residents".to_string(),
            width: 800,
            height: 600,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Re-run the whole pipeline from disk on every map or point-query request.
    pub reload_on_request: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8501,
            reload_on_request: false,
        }
    }
}

fn semicolon() -> char {
    ';'
}

fn comma() -> char {
    ','
}

fn default_geocode() -> String {
    "PLZ".to_string()
}

fn default_geometry_column() -> String {
    "geometry".to_string()
}

fn default_region() -> String {
    "Berlin".to_string()
}

fn default_station_range() -> PostalRange {
    PostalRange::new(10115, 14200)
}

fn default_resident_range() -> PostalRange {
    PostalRange::new(10000, 14200)
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}
