use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::centroid::Centroid;
use serde::{Deserialize, Serialize};

use super::result_indexer::{FilteredResultSet, IndexedProperty};

const MIN_FIT_ZOOM: f64 = 1.0;
const MAX_FIT_ZOOM: f64 = 15.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerStyle {
    /// RGBA.
    pub color: [u8; 4],
    /// Meters.
    pub radius: f64,
    /// Placeholders: `{index}`, `{name}`, `{rent}`, `{layout}`, `{address}`, `{floor}`.
    pub tooltip_template: String,
}

impl Default for LayerStyle {
    fn default() -> Self {
        LayerStyle {
            color: [200, 30, 0, 160],
            radius: 200.0,
            tooltip_template: "{index}: {name} / {layout} / {rent}".to_owned(),
        }
    }
}

/// Camera hint for the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewState {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: f64,
    pub pitch: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState {
            latitude: 37.76,
            longitude: -122.4,
            zoom: 11.0,
            pitch: 50.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapSettings {
    pub style: LayerStyle,
    pub view: ViewState,
    /// Center on the listings instead of the configured view when there are any.
    pub recenter: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MapPoint {
    pub display_index: usize,
    pub longitude: f64,
    pub latitude: f64,
    pub color: [u8; 4],
    pub radius: f64,
    pub tooltip: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MapLayerSpec {
    pub points: Vec<MapPoint>,
    pub view: ViewState,
    pub tooltip_template: String,
}

fn render_tooltip(template: &str, entry: &IndexedProperty) -> String {
    let property = entry.property;
    template
        .replace("{index}", &entry.display_index.to_string())
        .replace("{name}", &property.name)
        .replace("{rent}", &property.rent.to_string())
        .replace("{layout}", property.layout.label())
        .replace("{address}", &property.address)
        .replace("{floor}", &property.floor)
}

/// Zoom level at which a span of `extent` degrees roughly fills the viewport.
fn zoom_for_extent(extent: f64) -> f64 {
    if extent <= 0.0 {
        return MAX_FIT_ZOOM;
    }
    (360.0 / extent).log2().max(MIN_FIT_ZOOM).min(MAX_FIT_ZOOM)
}

fn fit_view(results: &FilteredResultSet, default_view: ViewState) -> ViewState {
    let multi_point = geo::MultiPoint::from(
        results
            .iter()
            .map(|entry| entry.property.point())
            .collect::<Vec<_>>(),
    );

    let centroid = match multi_point.centroid() {
        Some(centroid) => centroid,
        None => return default_view,
    };

    let zoom = multi_point
        .bounding_rect()
        .map(|rect| zoom_for_extent((rect.max.x - rect.min.x).max(rect.max.y - rect.min.y)))
        .unwrap_or(default_view.zoom);

    ViewState {
        latitude: centroid.y(),
        longitude: centroid.x(),
        zoom,
        pitch: default_view.pitch,
    }
}

/// One point per result entry; tooltips carry the display index.
pub fn build(results: &FilteredResultSet, settings: &MapSettings) -> MapLayerSpec {
    let style = &settings.style;
    let points: Vec<MapPoint> = results
        .iter()
        .map(|entry| MapPoint {
            display_index: entry.display_index,
            longitude: entry.property.longitude,
            latitude: entry.property.latitude,
            color: style.color,
            radius: style.radius,
            tooltip: render_tooltip(&style.tooltip_template, entry),
        })
        .collect();

    let view = if settings.recenter && !points.is_empty() {
        fit_view(results, settings.view)
    } else {
        settings.view
    };

    MapLayerSpec {
        points,
        view,
        tooltip_template: style.tooltip_template.clone(),
    }
}
