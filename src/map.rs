// src/map.rs
//! Single-file HTML attack-surface map.
//!
//! Every record with coordinates becomes one clustered Leaflet marker coloured
//! by its risk tier. Leaflet and the cluster plugin are pulled from a CDN, so
//! the file needs network access to render but nothing else.

use crate::types::{AggregatedRecord, MapTheme, ReconReport, RiskTier};
use serde::Serialize;

const LEAFLET_CSS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
const LEAFLET_JS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";
const CLUSTER_CSS: &str = "https://unpkg.com/leaflet.markercluster@1.5.3/dist/MarkerCluster.Default.css";
const CLUSTER_BASE_CSS: &str = "https://unpkg.com/leaflet.markercluster@1.5.3/dist/MarkerCluster.css";
const CLUSTER_JS: &str = "https://unpkg.com/leaflet.markercluster@1.5.3/dist/leaflet.markercluster.js";

impl MapTheme {
    fn tile_url(self) -> &'static str {
        match self {
            MapTheme::Dark => "https://{s}.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}{r}.png",
            MapTheme::Light => "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}{r}.png",
        }
    }
}

impl RiskTier {
    /// Marker colour on the map.
    pub fn color(self) -> &'static str {
        match self {
            RiskTier::Safe => "#44ff44",
            RiskTier::Low => "#ffa500",
            RiskTier::Medium => "#4a90d9",
            RiskTier::High => "#ff4444",
        }
    }
}

#[derive(Debug, Serialize)]
struct MapPoint {
    lat: f64,
    lon: f64,
    color: &'static str,
    tooltip: String,
    popup: String,
}

pub struct MapGenerator {
    theme: MapTheme,
}

impl MapGenerator {
    pub fn new(theme: MapTheme) -> Self {
        Self { theme }
    }

    /// Records that can be placed on the map.
    pub fn plottable(records: &[AggregatedRecord]) -> Vec<&AggregatedRecord> {
        records
            .iter()
            .filter(|r| matches!((r.latitude, r.longitude), (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite()))
            .collect()
    }

    /// Render the map page, or `None` when no record has coordinates.
    pub fn render(&self, report: &ReconReport) -> Option<String> {
        let points: Vec<MapPoint> = Self::plottable(&report.records).into_iter().filter_map(point).collect();
        if points.is_empty() {
            return None;
        }

        let center_lat = points.iter().map(|p| p.lat).sum::<f64>() / points.len() as f64;
        let center_lon = points.iter().map(|p| p.lon).sum::<f64>() / points.len() as f64;
        let domain = escape_html(&report.domain);

        let mut html = String::with_capacity(16384 + points.len() * 512);
        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
        html.push_str("<meta charset=\"UTF-8\">\n");
        html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
        html.push_str(&format!("<title>Attack Surface Map: {}</title>\n", domain));
        for css in [LEAFLET_CSS, CLUSTER_BASE_CSS, CLUSTER_CSS] {
            html.push_str(&format!("<link rel=\"stylesheet\" href=\"{}\">\n", css));
        }
        html.push_str(&format!("<script src=\"{}\"></script>\n", LEAFLET_JS));
        html.push_str(&format!("<script src=\"{}\"></script>\n", CLUSTER_JS));
        html.push_str("<style>\n");
        html.push_str(css());
        html.push_str("</style>\n</head>\n<body>\n<div id=\"map\"></div>\n");

        html.push_str("<div class=\"panel title\">\n");
        html.push_str("<span class=\"headline\">RECONMAP</span><br>\n");
        html.push_str(&format!("<span class=\"subtitle\">Attack Surface Map: {}</span><br>\n", domain));
        html.push_str(&format!(
            "<span class=\"count\">{} infrastructure nodes mapped</span>\n",
            points.len()
        ));
        if report.partial {
            html.push_str("<br><span class=\"count\">partial run, results incomplete</span>\n");
        }
        html.push_str("</div>\n");

        html.push_str(&legend());

        html.push_str("<script>\n");
        html.push_str(&format!("const points = {};\n", points_json(&points)));
        html.push_str(&format!(
            "const map = L.map('map').setView([{:.4}, {:.4}], 2);\n",
            center_lat, center_lon
        ));
        html.push_str(&format!(
            "L.tileLayer('{}', {{ attribution: '&copy; OpenStreetMap contributors &copy; CARTO', subdomains: 'abcd', maxZoom: 19 }}).addTo(map);\n",
            self.theme.tile_url()
        ));
        html.push_str(
            r#"const cluster = L.markerClusterGroup({ spiderfyOnMaxZoom: true, showCoverageOnHover: true, zoomToBoundsOnClick: true, maxClusterRadius: 50 });
for (const p of points) {
  L.circleMarker([p.lat, p.lon], { radius: 8, color: '#111', weight: 1, fillColor: p.color, fillOpacity: 0.9 })
    .bindPopup(p.popup, { maxWidth: 400 })
    .bindTooltip(p.tooltip)
    .addTo(cluster);
}
map.addLayer(cluster);
"#,
        );
        html.push_str("</script>\n</body>\n</html>\n");

        Some(html)
    }
}

fn point(record: &AggregatedRecord) -> Option<MapPoint> {
    let unknown = "Unknown";
    let popup = format!(
        "<div class=\"intel\"><b class=\"intel-head\">TARGET INTEL</b><hr>\
         <b>Subdomain:</b> {}<br><b>IP Address:</b> {}<br><b>Location:</b> {}, {}<br>\
         <b>ISP:</b> {}<br><b>Organization:</b> {}<br><b>Priority:</b> {}</div>",
        escape_html(record.name.as_str()),
        record.address,
        escape_html(record.city.as_deref().unwrap_or(unknown)),
        escape_html(record.country.as_deref().unwrap_or(unknown)),
        escape_html(record.isp.as_deref().unwrap_or(unknown)),
        escape_html(record.organization.as_deref().unwrap_or(unknown)),
        record.risk_tier,
    );

    Some(MapPoint {
        lat: record.latitude?,
        lon: record.longitude?,
        color: record.risk_tier.color(),
        tooltip: format!("{} ({})", record.name, record.address),
        popup,
    })
}

/// JSON for an inline `<script>`: `</` is escaped so no string can close the tag.
fn points_json(points: &[MapPoint]) -> String {
    serde_json::to_string(points)
        .unwrap_or_else(|_| "[]".to_string())
        .replace("</", "<\\/")
}

fn legend() -> String {
    let mut html = String::from("<div class=\"panel legend\">\n<b class=\"legend-head\">THREAT PRIORITY</b><br><br>\n");
    for (tier, label) in [
        (RiskTier::High, "On-Premise/Unknown"),
        (RiskTier::Medium, "VPS Provider"),
        (RiskTier::Low, "CDN/Edge"),
        (RiskTier::Safe, "Cloud (WAF)"),
    ] {
        html.push_str(&format!(
            "<span class=\"dot\" style=\"background: {color};\"></span> <span style=\"color: {color};\">{tier}</span> - {label}<br>\n",
            color = tier.color(),
            tier = tier,
            label = label
        ));
    }
    html.push_str("<hr><span class=\"hint\">RED = Shadow IT candidates</span>\n</div>\n");
    html
}

/// Escape HTML special characters
fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn css() -> &'static str {
    r#"
html, body, #map { height: 100%; margin: 0; }
.panel {
  position: fixed; z-index: 1000; background-color: rgba(0,0,0,0.9);
  font-family: 'Courier New', monospace; border-radius: 5px; border: 1px solid #333;
}
.title { top: 10px; left: 50px; padding: 15px 25px; color: #00ff88; border-color: #00ff88; }
.headline { font-size: 18px; font-weight: bold; }
.subtitle { font-size: 12px; color: #888; }
.count { font-size: 11px; color: #666; }
.legend { bottom: 50px; right: 50px; padding: 15px; font-size: 11px; color: white; }
.legend-head { font-size: 13px; color: #00ff88; }
.legend hr { border-color: #444; margin: 8px 0; }
.hint { font-size: 10px; color: #888; }
.dot { display: inline-block; width: 10px; height: 10px; border-radius: 50%; }
.intel { font-family: 'Courier New', monospace; font-size: 12px; min-width: 250px; }
.intel-head { color: #ff6b6b; }
"#
}
