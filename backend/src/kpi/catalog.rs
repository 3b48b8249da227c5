//! KPI catalog definition
//!
//! The catalog lists which KPIs a report contains and how each one is derived
//! from raw counter columns.

use serde::{Deserialize, Serialize};

use crate::error::{KpiError, KpiResult};

/// How a KPI value is derived from one row of counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Formula {
    /// `numerator / denominator * scale`, 0 when the denominator is 0.
    Ratio {
        numerator: String,
        denominator: String,
        #[serde(default = "default_scale")]
        scale: f64,
    },
    /// The counter column taken as-is.
    Column { source: String },
}

fn default_scale() -> f64 {
    100.0
}

impl Formula {
    /// Percentage ratio with the default scale of 100.
    pub fn ratio(numerator: &str, denominator: &str) -> Self {
        Formula::Ratio {
            numerator: numerator.to_string(),
            denominator: denominator.to_string(),
            scale: default_scale(),
        }
    }

    pub fn column(source: &str) -> Self {
        Formula::Column {
            source: source.to_string(),
        }
    }

    /// Counter columns this formula reads.
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            Formula::Ratio {
                numerator,
                denominator,
                ..
            } => vec![numerator.as_str(), denominator.as_str()],
            Formula::Column { source } => vec![source.as_str()],
        }
    }
}

/// A named KPI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiDefinition {
    pub name: String,
    pub formula: Formula,
}

impl KpiDefinition {
    pub fn new(name: &str, formula: Formula) -> Self {
        Self {
            name: name.to_string(),
            formula,
        }
    }
}

/// Ordered list of KPI definitions. Order is the row order of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiCatalog {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub description: String,

    pub kpis: Vec<KpiDefinition>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for KpiCatalog {
    /// The 3G daily report: six success/drop ratios plus pass-through counters.
    fn default() -> Self {
        let kpis = vec![
            KpiDefinition::new("CS RRC SR", Formula::ratio("CS_RRC_Num_M", "CS_RRC_Denum_M")),
            KpiDefinition::new("PS RRC SR", Formula::ratio("PS_RRC_Num_M", "PS_RRC_Denum_M")),
            KpiDefinition::new("CS RAB SR", Formula::ratio("CS_RAB_Num_M", "CS_RAB_Denum_M")),
            KpiDefinition::new("PS RAB SR", Formula::ratio("PS_RAB_Num_M", "PS_RAB_Denum_M")),
            KpiDefinition::new("CS DCR", Formula::ratio("CSDROPNOM_C", "CSDROPDENOM_C")),
            KpiDefinition::new("HS DCR", Formula::ratio("HSDROP_NUM_V", "HSDROP_DENOM_V")),
            KpiDefinition::new("Act HS-DSCH end usr thp", Formula::column("Act HS-DSCH end usr thp")),
            KpiDefinition::new("CellAvailabilityexcluding", Formula::column("CellAvailabilityexcluding")),
            KpiDefinition::new("CS Traffic", Formula::column("CS Traffic")),
            KpiDefinition::new("Inter sys RT Hard HO SR", Formula::column("Inter sys RT Hard HO SR")),
            KpiDefinition::new("Max simult HSDPA users", Formula::column("Max simult HSDPA users")),
            KpiDefinition::new("PS Traffic", Formula::column("PS Traffic")),
            KpiDefinition::new("SHO_SR_M", Formula::column("SHO_SR_M")),
            KpiDefinition::new("Average RTWP", Formula::column("Average RTWP")),
        ];

        Self {
            version: default_version(),
            description: "3G cell/site KPIs".to_string(),
            kpis,
        }
    }
}

impl KpiCatalog {
    /// Parse and validate a catalog from JSON.
    pub fn from_json(json: &str) -> KpiResult<Self> {
        let catalog: KpiCatalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog file.
    pub fn from_file(path: &std::path::Path) -> KpiResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            KpiError::InvalidCatalog(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> KpiResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject empty catalogs, blank or duplicate names and blank inputs.
    pub fn validate(&self) -> KpiResult<()> {
        if self.kpis.is_empty() {
            return Err(KpiError::InvalidCatalog("catalog defines no KPIs".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for kpi in &self.kpis {
            if kpi.name.trim().is_empty() {
                return Err(KpiError::InvalidCatalog("KPI with empty name".to_string()));
            }
            if !seen.insert(kpi.name.as_str()) {
                return Err(KpiError::InvalidCatalog(format!("duplicate KPI '{}'", kpi.name)));
            }
            if kpi.formula.inputs().iter().any(|c| c.trim().is_empty()) {
                return Err(KpiError::InvalidCatalog(format!(
                    "KPI '{}' references an empty column name",
                    kpi.name
                )));
            }
        }
        Ok(())
    }

    /// KPI names in report order.
    pub fn names(&self) -> Vec<&str> {
        self.kpis.iter().map(|k| k.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&KpiDefinition> {
        self.kpis.iter().find(|k| k.name == name)
    }

    /// Every counter column referenced, in first-use order, deduplicated.
    pub fn required_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::new();
        for column in self.kpis.iter().flat_map(|k| k.formula.inputs()) {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
        columns
    }

    pub fn len(&self) -> usize {
        self.kpis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kpis.is_empty()
    }
}

/// Human-readable catalog listing for the CLI.
pub fn catalog_description(catalog: &KpiCatalog) -> String {
    let mut out = String::new();
    for kpi in &catalog.kpis {
        let formula = match &kpi.formula {
            Formula::Ratio {
                numerator,
                denominator,
                scale,
            } => format!("{} / {} * {}", numerator, denominator, scale),
            Formula::Column { source } if *source == kpi.name => "(counter)".to_string(),
            Formula::Column { source } => format!("(counter {})", source),
        };
        out.push_str(&format!("  {:<28} {}\n", kpi.name, formula));
    }
    out
}
