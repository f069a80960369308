// src/output.rs
use crate::map::MapGenerator;
use crate::types::{AggregatedRecord, OutputConfig, ReconMapError, ReconReport, RiskTier};
use crate::utils;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Name fragments that usually point at forgotten or internal hosts.
const SHADOW_IT_PATTERNS: &[&str] = &[
    "dev", "test", "stage", "admin", "internal", "vpn", "api", "beta", "old", "legacy",
];

/// Figures for the text summary.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub live_subdomains: usize,
    pub unique_addresses: usize,
    pub countries: Vec<String>,
    pub top_isps: Vec<(String, usize)>,
    pub tiers: BTreeMap<RiskTier, usize>,
    pub shadow_it: Vec<AggregatedRecord>,
}

impl Summary {
    pub fn from_records(records: &[AggregatedRecord]) -> Self {
        let unique_addresses: BTreeSet<_> = records.iter().map(|r| r.address).collect();
        let countries: BTreeSet<String> = records.iter().filter_map(|r| r.country.clone()).collect();

        let mut isp_counts: HashMap<&str, usize> = HashMap::new();
        for isp in records.iter().filter_map(|r| r.isp.as_deref()) {
            *isp_counts.entry(isp).or_default() += 1;
        }
        let mut top_isps: Vec<(String, usize)> =
            isp_counts.into_iter().map(|(isp, count)| (isp.to_string(), count)).collect();
        top_isps.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        top_isps.truncate(5);

        let mut tiers = BTreeMap::new();
        for record in records {
            *tiers.entry(record.risk_tier).or_default() += 1;
        }

        let shadow_it = records
            .iter()
            .filter(|r| SHADOW_IT_PATTERNS.iter().any(|p| r.name.as_str().contains(p)))
            .take(10)
            .cloned()
            .collect();

        Self {
            live_subdomains: records.len(),
            unique_addresses: unique_addresses.len(),
            countries: countries.into_iter().collect(),
            top_isps,
            tiers,
            shadow_it,
        }
    }
}

pub struct OutputManager {
    config: OutputConfig,
}

impl OutputManager {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Print the summary to stdout, then write every configured file.
    pub fn write_report(&self, report: &ReconReport) -> Result<(), ReconMapError> {
        {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            self.write_text_output(&mut handle, report).map_err(output_error)?;
        }

        if let Some(path) = &self.config.map_file {
            match MapGenerator::new(self.config.theme).render(report) {
                Some(html) => {
                    self.write_to_file(path, |file| file.write_all(html.as_bytes()))?;
                    log::info!("Attack surface map saved: {}", path);
                }
                None => log::warn!("No geolocated hosts, skipping map generation"),
            }
        }
        if let Some(path) = &self.config.csv_file {
            self.write_to_file(path, |file| self.write_csv_output(file, report))?;
            log::info!("CSV export saved: {}", path);
        }
        if let Some(path) = &self.config.json_file {
            self.write_to_file(path, |file| self.write_json_output(file, report))?;
            log::info!("JSON export saved: {}", path);
        }
        Ok(())
    }

    fn write_to_file<F>(&self, file_path: &str, write: F) -> Result<(), ReconMapError>
    where
        F: FnOnce(&mut File) -> std::io::Result<()>,
    {
        if let Some(parent) = Path::new(file_path).parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ReconMapError::OutputError(format!("Failed to create directory: {}", e)))?;
        }

        let mut file = File::create(file_path)
            .map_err(|e| ReconMapError::OutputError(format!("Failed to create file {}: {}", file_path, e)))?;

        write(&mut file).map_err(output_error)
    }

    fn write_text_output<W: Write>(&self, writer: &mut W, report: &ReconReport) -> std::io::Result<()> {
        let summary = Summary::from_records(&report.records);
        let width = utils::terminal_width().clamp(60, 160);
        let rule = "=".repeat(width.min(72));

        writeln!(writer, "\n{}", rule)?;
        writeln!(writer, "[*] Target Domain:       {}", report.domain)?;
        writeln!(writer, "[*] Live Subdomains:     {}", summary.live_subdomains)?;
        writeln!(writer, "[*] Unique IP Addresses: {}", summary.unique_addresses)?;
        writeln!(writer, "[*] Countries Spanned:   {}", summary.countries.len())?;
        if !summary.countries.is_empty() {
            let listed: Vec<&str> = summary.countries.iter().take(10).map(String::as_str).collect();
            let more = if summary.countries.len() > 10 { "..." } else { "" };
            writeln!(writer, "[*] Countries:           {}{}", listed.join(", "), more)?;
        }
        writeln!(
            writer,
            "[*] Candidates: {}  Looked up: {}  Geolocated: {}  Duration: {:.2?}",
            report.stats.candidates, report.stats.looked_up, report.stats.geolocated, report.stats.duration
        )?;
        if report.partial {
            writeln!(writer, "[!] Run was cancelled, results are partial")?;
        }
        writeln!(writer, "{}", rule)?;

        if !summary.top_isps.is_empty() {
            writeln!(writer, "\n[*] Top infrastructure providers:")?;
            for (isp, count) in &summary.top_isps {
                writeln!(writer, "    {:<50} {}", utils::truncate(isp, 50), count)?;
            }
        }

        writeln!(writer, "\n[*] Threat priority:")?;
        for tier in [RiskTier::High, RiskTier::Medium, RiskTier::Low, RiskTier::Safe] {
            writeln!(writer, "    {:<7} {}", tier.to_string(), summary.tiers.get(&tier).copied().unwrap_or(0))?;
        }

        writeln!(writer, "\n[*] Sample targets (potential shadow IT):")?;
        if summary.shadow_it.is_empty() {
            writeln!(writer, "    No obvious shadow IT patterns detected in subdomain names.")?;
        } else {
            for record in &summary.shadow_it {
                writeln!(
                    writer,
                    "    {:<40} {:<15} {}, {}",
                    record.name,
                    record.address,
                    record.city.as_deref().unwrap_or("?"),
                    record.country.as_deref().unwrap_or("?")
                )?;
            }
        }

        writeln!(writer, "\n[*] Results:")?;
        let name_width = width.saturating_sub(60).clamp(30, 60);
        let mut ordered: Vec<&AggregatedRecord> = report.records.iter().collect();
        ordered.sort_by(|a, b| b.risk_tier.cmp(&a.risk_tier).then(a.name.cmp(&b.name)));
        for record in ordered {
            writeln!(
                writer,
                "[{:<6}] {:<name_width$} {:<15} {:<20} {}",
                record.risk_tier.to_string(),
                utils::truncate(record.name.as_str(), name_width),
                record.address,
                utils::truncate(record.organization.as_deref().or(record.isp.as_deref()).unwrap_or("Unknown"), 20),
                record.country_code.as_deref().unwrap_or("--"),
                name_width = name_width
            )?;
            if self.config.verbose {
                if let Some(alias) = &record.alias {
                    writeln!(writer, "         alias of {}", alias)?;
                }
            }
        }

        Ok(())
    }

    fn write_json_output<W: Write>(&self, writer: &mut W, report: &ReconReport) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(report)?;
        writeln!(writer, "{}", json)
    }

    fn write_csv_output<W: Write>(&self, writer: &mut W, report: &ReconReport) -> std::io::Result<()> {
        writeln!(
            writer,
            "subdomain,ip,cname,country,country_code,region,city,lat,lon,isp,org,as_number,geo_success,infrastructure,risk_tier"
        )?;

        for record in &report.records {
            let fields = [
                record.name.to_string(),
                record.address.to_string(),
                record.alias.clone().unwrap_or_default(),
                record.country.clone().unwrap_or_default(),
                record.country_code.clone().unwrap_or_default(),
                record.region.clone().unwrap_or_default(),
                record.city.clone().unwrap_or_default(),
                record.latitude.map(|v| v.to_string()).unwrap_or_default(),
                record.longitude.map(|v| v.to_string()).unwrap_or_default(),
                record.isp.clone().unwrap_or_default(),
                record.organization.clone().unwrap_or_default(),
                record.autonomous_system.clone().unwrap_or_default(),
                record.geo_success.to_string(),
                record.infrastructure.to_string(),
                record.risk_tier.to_string(),
            ];
            let row: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
            writeln!(writer, "{}", row.join(","))?;
        }

        Ok(())
    }
}

fn output_error(e: std::io::Error) -> ReconMapError {
    ReconMapError::OutputError(e.to_string())
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
