use crate::config::AppConfig;
use crate::pipeline::{prepare, Prepared};
use crate::render::{dashboard_html, Choropleth, Layer, MapData};
use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::{MultiPolygon, Point};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

// Wrapper for RTree indexing
pub struct AreaIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for AreaIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Everything known about one postal code, used for point queries.
#[derive(Debug, Clone)]
pub struct AreaSummary {
    pub postal_code: u32,
    pub geometry: MultiPolygon<f64>,
    pub stations: Option<u32>,
    pub residents: Option<f64>,
}

/// Point-in-polygon lookup over the postal codes of both layers.
pub struct AreaLookup {
    areas: Vec<AreaSummary>,
    tree: RTree<AreaIndex>,
}

impl AreaLookup {
    pub fn build(data: &MapData) -> Self {
        let mut by_code: BTreeMap<u32, AreaSummary> = BTreeMap::new();
        for s in &data.stations {
            let area = by_code.entry(s.postal_code).or_insert_with(|| AreaSummary {
                postal_code: s.postal_code,
                geometry: s.geometry.clone(),
                stations: None,
                residents: None,
            });
            area.stations = Some(s.count);
        }
        for r in &data.residents {
            let area = by_code.entry(r.postal_code()).or_insert_with(|| AreaSummary {
                postal_code: r.postal_code(),
                geometry: r.geometry.clone(),
                stations: None,
                residents: None,
            });
            if area.residents.is_none() {
                area.residents = r.record.attribute_value;
            }
        }
        let areas: Vec<AreaSummary> = by_code.into_values().collect();

        let tree_items: Vec<AreaIndex> = areas
            .iter()
            .enumerate()
            .filter_map(|(i, area)| {
                let rect = area.geometry.bounding_rect()?;
                Some(AreaIndex {
                    index: i,
                    aabb: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();

        Self {
            areas,
            tree: RTree::bulk_load(tree_items),
        }
    }

    pub fn locate(&self, lat: f64, lon: f64) -> Option<&AreaSummary> {
        let point = Point::new(lon, lat);
        let envelope = AABB::from_point([lon, lat]);

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|candidate| self.areas.get(candidate.index))
            .find(|area| area.geometry.contains(&point))
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }
}

pub struct AppState {
    pub config: AppConfig,
    pub prepared: Prepared,
    pub lookup: AreaLookup,
}

impl AppState {
    pub fn new(config: AppConfig, prepared: Prepared) -> Self {
        let lookup = AreaLookup::build(&prepared.data);
        Self {
            config,
            prepared,
            lookup,
        }
    }
}

#[derive(Deserialize)]
pub struct MapParams {
    layer: Layer,
}

#[derive(Deserialize)]
pub struct QueryParams {
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
pub struct QueryResponse {
    postal_code: u32,
    stations: Option<u32>,
    residents: Option<f64>,
}

impl From<&AreaSummary> for QueryResponse {
    fn from(area: &AreaSummary) -> Self {
        Self {
            postal_code: area.postal_code,
            stations: area.stations,
            residents: area.residents,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/api/map", get(map_handler))
        .route("/api/query", get(query_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, prepared: Prepared) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!("Invalid server address {}:{}", config.server.host, config.server.port)
        })?;

    if config.server.reload_on_request {
        info!("Map data and point queries will be reloaded from disk on every request");
    }

    info!("Building spatial index for API...");
    let state = Arc::new(AppState::new(config, prepared));
    info!("Spatial index built over {} postal codes.", state.lookup.len());

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Re-runs the whole pipeline off the async runtime. Failures become a 500.
async fn reload(config: &AppConfig) -> std::result::Result<Prepared, Response> {
    let config = config.clone();
    match tokio::task::spawn_blocking(move || prepare(&config)).await {
        Ok(Ok(prepared)) => Ok(prepared),
        Ok(Err(e)) => {
            error!("Pipeline failed: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response())
        }
        Err(e) => {
            error!("Pipeline task panicked: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "pipeline task failed").into_response())
        }
    }
}

async fn dashboard_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(dashboard_html(&state.config.map))
}

async fn map_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MapParams>,
) -> Response {
    if !state.config.server.reload_on_request {
        let choropleth = Choropleth::build(&state.prepared.data, params.layer);
        return Json(choropleth.to_json()).into_response();
    }

    match reload(&state.config).await {
        Ok(prepared) => {
            let choropleth = Choropleth::build(&prepared.data, params.layer);
            Json(choropleth.to_json()).into_response()
        }
        Err(response) => response,
    }
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Response {
    let answer = |lookup: &AreaLookup| {
        let area = lookup.locate(params.lat, params.lon).map(QueryResponse::from);
        Json(area).into_response()
    };

    if !state.config.server.reload_on_request {
        return answer(&state.lookup);
    }

    match reload(&state.config).await {
        Ok(prepared) => answer(&AreaLookup::build(&prepared.data)),
        Err(response) => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AggregatedCount, PostalRecord, SpatialRecord};
    use geo::polygon;
    use serde_json::Value;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const GEOMETRY: &str = "PLZ;geometry\n\
        10117;POLYGON((13.38 52.51,13.40 52.51,13.40 52.53,13.38 52.53,13.38 52.51))\n\
        10119;POLYGON((13.40 52.51,13.42 52.51,13.42 52.53,13.40 52.53,13.40 52.51))\n";
    const STATION_HEADER: &str =
        "Postleitzahl;Bundesland;Breitengrad;Längengrad;Nennleistung Ladeeinrichtung [kW]";
    const RESIDENTS: &str = "plz,einwohner,lat,lon\n10117,12000,52.517,13.387\n";

    fn cell(x: f64, y: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x, y: y),
            (x: x + 0.1, y: y),
            (x: x + 0.1, y: y + 0.1),
            (x: x, y: y + 0.1),
            (x: x, y: y),
        ]])
    }

    fn data() -> MapData {
        MapData {
            stations: vec![AggregatedCount {
                postal_code: 10117,
                count: 2,
                geometry: cell(13.3, 52.5),
            }],
            residents: vec![
                SpatialRecord {
                    record: PostalRecord {
                        postal_code: 10117,
                        region: None,
                        latitude: "52.55".to_string(),
                        longitude: "13.35".to_string(),
                        attribute_value: Some(12000.0),
                    },
                    geometry: cell(13.3, 52.5),
                },
                SpatialRecord {
                    record: PostalRecord {
                        postal_code: 10405,
                        region: None,
                        latitude: "52.55".to_string(),
                        longitude: "13.45".to_string(),
                        attribute_value: Some(30000.0),
                    },
                    geometry: cell(13.4, 52.5),
                },
            ],
        }
    }

    #[test]
    fn lookup_merges_both_layers() {
        let lookup = AreaLookup::build(&data());
        assert_eq!(lookup.len(), 2);

        let area = lookup.locate(52.55, 13.35).unwrap();
        assert_eq!(area.postal_code, 10117);
        assert_eq!(area.stations, Some(2));
        assert_eq!(area.residents, Some(12000.0));

        let area = lookup.locate(52.55, 13.45).unwrap();
        assert_eq!(area.postal_code, 10405);
        assert_eq!(area.stations, None);
    }

    #[test]
    fn lookup_misses_outside_all_areas() {
        let lookup = AreaLookup::build(&data());
        assert!(lookup.locate(48.1, 11.5).is_none());
    }

    fn write_stations(dir: &Path, codes: &[u32]) {
        let rows: Vec<String> = codes
            .iter()
            .map(|code| format!("{code};Berlin;52,52;13,39;22"))
            .collect();
        let csv = format!("{STATION_HEADER}\n{}\n", rows.join("\n"));
        fs::write(dir.join("stations.csv"), csv).unwrap();
    }

    fn fixture_config(dir: &Path, reload_on_request: bool) -> AppConfig {
        fs::write(dir.join("geodata.csv"), GEOMETRY).unwrap();
        fs::write(dir.join("residents.csv"), RESIDENTS).unwrap();
        write_stations(dir, &[10117, 10117, 10119]);

        let toml = format!(
            "[input]\ngeodata_plz = {:?}\n\n[stations]\nfile = {:?}\n\n\
             [residents]\nfile = {:?}\n\n[server]\nreload_on_request = {}\n",
            dir.join("geodata.csv").to_string_lossy(),
            dir.join("stations.csv").to_string_lossy(),
            dir.join("residents.csv").to_string_lossy(),
            reload_on_request
        );
        AppConfig::from_toml_str(&toml).unwrap()
    }

    fn app_state(config: AppConfig) -> Arc<AppState> {
        let prepared = prepare(&config).unwrap();
        Arc::new(AppState::new(config, prepared))
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX);
        body.await.unwrap().to_vec()
    }

    async fn body_json(response: Response) -> Value {
        assert_eq!(response.status(), StatusCode::OK);
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    async fn station_map(state: &Arc<AppState>) -> Response {
        let params = MapParams {
            layer: Layer::ChargingStations,
        };
        map_handler(State(state.clone()), Query(params)).await
    }

    fn counts(json: &Value) -> Vec<(u64, f64)> {
        json["features"]["features"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| {
                let props = &f["properties"];
                (props["PLZ"].as_u64().unwrap(), props["Number"].as_f64().unwrap())
            })
            .collect()
    }

    #[tokio::test]
    async fn map_endpoint_returns_station_choropleth() {
        let dir = TempDir::new().unwrap();
        let state = app_state(fixture_config(dir.path(), false));

        let json = body_json(station_map(&state).await).await;

        assert_eq!(json["layer"], "Charging_Stations");
        assert_eq!(json["zoom"], 10);
        assert_eq!(json["center"][0], 52.52);
        assert_eq!(json["legend"]["caption"], "Number");
        assert_eq!(json["legend"]["vmin"], 1.0);
        assert_eq!(json["legend"]["vmax"], 2.0);
        assert_eq!(counts(&json), vec![(10117, 2.0), (10119, 1.0)]);

        let style = &json["features"]["features"][0]["properties"]["style"];
        assert_eq!(style["fillColor"], "#ff0000");
        assert_eq!(style["color"], "black");
        assert_eq!(style["weight"], 1.0);
        assert_eq!(style["fillOpacity"], 0.7);
    }

    #[tokio::test]
    async fn map_endpoint_serves_residents_layer() {
        let dir = TempDir::new().unwrap();
        let state = app_state(fixture_config(dir.path(), false));
        let params = MapParams {
            layer: Layer::Residents,
        };

        let json = body_json(map_handler(State(state), Query(params)).await).await;

        assert_eq!(json["layer"], "Residents");
        let feature = &json["features"]["features"][0]["properties"];
        assert_eq!(feature["tooltip"], "PLZ: 10117, Einwohner: 12000");
    }

    #[tokio::test]
    async fn startup_data_is_reused_without_reload() {
        let dir = TempDir::new().unwrap();
        let state = app_state(fixture_config(dir.path(), false));

        write_stations(dir.path(), &[10119, 10119, 10119]);
        let json = body_json(station_map(&state).await).await;

        assert_eq!(counts(&json), vec![(10117, 2.0), (10119, 1.0)]);
    }

    #[tokio::test]
    async fn reload_picks_up_rewritten_inputs() {
        let dir = TempDir::new().unwrap();
        let state = app_state(fixture_config(dir.path(), true));

        let before = body_json(station_map(&state).await).await;
        assert_eq!(counts(&before), vec![(10117, 2.0), (10119, 1.0)]);

        write_stations(dir.path(), &[10117, 10119, 10119, 10119]);
        let after = body_json(station_map(&state).await).await;
        assert_eq!(counts(&after), vec![(10117, 1.0), (10119, 3.0)]);
    }

    #[tokio::test]
    async fn reload_refreshes_point_queries() {
        let dir = TempDir::new().unwrap();
        let state = app_state(fixture_config(dir.path(), true));
        let query = || {
            Query(QueryParams {
                lat: 52.52,
                lon: 13.41,
            })
        };

        let before = body_json(query_handler(State(state.clone()), query()).await).await;
        assert_eq!(before["postal_code"], 10119);
        assert_eq!(before["stations"], 1);

        write_stations(dir.path(), &[10119, 10119, 10119]);
        let after = body_json(query_handler(State(state.clone()), query()).await).await;
        assert_eq!(after["stations"], 3);
    }

    #[tokio::test]
    async fn failed_reload_is_a_server_error() {
        let dir = TempDir::new().unwrap();
        let state = app_state(fixture_config(dir.path(), true));

        fs::remove_file(dir.path().join("stations.csv")).unwrap();
        let response = station_map(&state).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let message = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(message.contains("stations.csv"));
    }

    #[tokio::test]
    async fn dashboard_lists_both_layers() {
        let dir = TempDir::new().unwrap();
        let state = app_state(fixture_config(dir.path(), false));

        let Html(page) = dashboard_handler(State(state)).await;

        assert!(page.contains("value=\"Residents\""));
        assert!(page.contains("value=\"Charging_Stations\""));
    }
}
