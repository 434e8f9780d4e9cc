use crate::colormap::{LinearColormap, Rgb};
use crate::config::MapConfig;
use crate::types::{AggregatedCount, SpatialRecord};
use anyhow::{Context, Result};
use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

pub const MAP_CENTER: [f64; 2] = [52.52, 13.40];
pub const MAP_ZOOM: u8 = 10;

const BORDER_COLOR: &str = "black";
const BORDER_WEIGHT: f64 = 1.0;
const FILL_OPACITY: f64 = 0.7;
const LEGEND_TICKS: usize = 6;

const MAP_TEMPLATE: &str = include_str!("../static/map.html");
const DASHBOARD_TEMPLATE: &str = include_str!("../static/index.html");
const CHOROPLETH_SCRIPT: &str = include_str!("../static/choropleth.js");

/// The two mutually exclusive map layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum Layer {
    #[serde(rename = "Residents")]
    Residents,
    #[serde(rename = "Charging_Stations")]
    ChargingStations,
}

impl Layer {
    pub const ALL: [Layer; 2] = [Layer::Residents, Layer::ChargingStations];

    pub fn label(&self) -> &'static str {
        match self {
            Layer::Residents => "Residents",
            Layer::ChargingStations => "Charging_Stations",
        }
    }

    /// Name of the value shown in tooltips and the legend.
    pub fn attribute(&self) -> &'static str {
        match self {
            Layer::Residents => "Einwohner",
            Layer::ChargingStations => "Number",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Prepared tables the renderer draws from. Holds no UI state.
#[derive(Debug, Clone, Default)]
pub struct MapData {
    pub stations: Vec<AggregatedCount>,
    pub residents: Vec<SpatialRecord>,
}

/// One drawable row of a layer.
#[derive(Debug, Clone, Copy)]
pub struct LayerRow<'a> {
    pub postal_code: u32,
    pub value: f64,
    pub geometry: &'a MultiPolygon<f64>,
}

impl MapData {
    pub fn rows(&self, layer: Layer) -> Vec<LayerRow<'_>> {
        match layer {
            Layer::ChargingStations => self
                .stations
                .iter()
                .map(|s| LayerRow {
                    postal_code: s.postal_code,
                    value: s.count as f64,
                    geometry: &s.geometry,
                })
                .collect(),
            Layer::Residents => self
                .residents
                .iter()
                .filter_map(|r| {
                    Some(LayerRow {
                        postal_code: r.postal_code(),
                        value: r.record.attribute_value?,
                        geometry: &r.geometry,
                    })
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolygonStyle {
    pub fill_color: Rgb,
    pub color: &'static str,
    pub weight: f64,
    pub fill_opacity: f64,
}

#[derive(Debug, Clone)]
pub struct StyledArea {
    pub postal_code: u32,
    pub value: f64,
    pub tooltip: String,
    pub style: PolygonStyle,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub caption: String,
    pub vmin: f64,
    pub vmax: f64,
    pub low: Rgb,
    pub high: Rgb,
    pub ticks: Vec<f64>,
}

/// A fully styled layer, ready to be drawn by a map frontend.
#[derive(Debug, Clone)]
pub struct Choropleth {
    pub layer: Layer,
    pub center: [f64; 2],
    pub zoom: u8,
    pub legend: Legend,
    pub areas: Vec<StyledArea>,
}

impl Choropleth {
    #[instrument(skip(data))]
    pub fn build(data: &MapData, layer: Layer) -> Self {
        let rows = data.rows(layer);
        let colormap = LinearColormap::yellow_to_red(rows.iter().map(|r| r.value));
        if colormap.is_degenerate() {
            debug!("{} layer has a single value {}, using one fill color", layer, colormap.vmin);
        }

        let areas = rows
            .iter()
            .map(|row| StyledArea {
                postal_code: row.postal_code,
                value: row.value,
                tooltip: format!("PLZ: {}, {}: {}", row.postal_code, layer.attribute(), row.value),
                style: PolygonStyle {
                    fill_color: colormap.color(row.value),
                    color: BORDER_COLOR,
                    weight: BORDER_WEIGHT,
                    fill_opacity: FILL_OPACITY,
                },
                geometry: row.geometry.clone(),
            })
            .collect();

        Self {
            layer,
            center: MAP_CENTER,
            zoom: MAP_ZOOM,
            legend: Legend {
                caption: layer.attribute().to_string(),
                vmin: colormap.vmin,
                vmax: colormap.vmax,
                low: colormap.low,
                high: colormap.high,
                ticks: colormap.ticks(LEGEND_TICKS),
            },
            areas,
        }
    }

    /// GeoJSON features with style and tooltip properties, plus view and legend.
    pub fn to_json(&self) -> Value {
        let features = self
            .areas
            .iter()
            .map(|area| {
                let mut properties = Map::new();
                properties.insert("PLZ".to_string(), json!(area.postal_code));
                properties.insert(self.layer.attribute().to_string(), json!(area.value));
                properties.insert("tooltip".to_string(), json!(area.tooltip));
                properties.insert("style".to_string(), json!(area.style));
                geojson::Feature {
                    bbox: None,
                    geometry: Some(geojson::Geometry::new(geojson::Value::from(&area.geometry))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        let collection = geojson::FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        };

        json!({
            "layer": self.layer,
            "center": self.center,
            "zoom": self.zoom,
            "legend": self.legend,
            "features": collection,
        })
    }
}

/// Standalone HTML page showing one choropleth layer.
pub fn to_html(choropleth: &Choropleth, map: &MapConfig) -> String {
    // Keep "</script>" inside the data from closing the script element
    let data = choropleth.to_json().to_string().replace("</", "<\\/");
    fill_template(MAP_TEMPLATE, map).replace("{{CHOROPLETH}}", &data)
}

/// Dashboard page with the layer selector. Map data is fetched from `/api/map`.
pub fn dashboard_html(map: &MapConfig) -> String {
    let options: String = Layer::ALL
        .iter()
        .enumerate()
        .map(|(i, layer)| {
            format!(
                "<label><input type=\"radio\" name=\"layer\" value=\"{0}\"{1}> {0}</label>\n",
                layer.label(),
                if i == 0 { " checked" } else { "" }
            )
        })
        .collect();
    fill_template(DASHBOARD_TEMPLATE, map).replace("{{LAYER_OPTIONS}}", &options)
}

fn fill_template(template: &str, map: &MapConfig) -> String {
    template
        .replace("{{TITLE}}", &escape_html(&map.title))
        .replace("{{WIDTH}}", &map.width.to_string())
        .replace("{{HEIGHT}}", &map.height.to_string())
        .replace("{{SCRIPT}}", CHOROPLETH_SCRIPT)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn write_html(choropleth: &Choropleth, map: &MapConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
    }
    fs::write(path, to_html(choropleth, map))
        .with_context(|| format!("Failed to write map to {:?}", path))?;
    info!("Wrote {} map with {} areas to {:?}", choropleth.layer, choropleth.areas.len(), path);
    Ok(())
}
