//! Metadata model of the IBGE aggregates service
//!
//! The service describes every aggregate (a SIDRA table) through three
//! documents: `metadados` (name, survey, variables, classifications, declared
//! territorial levels), `periodos` and one `localidades` list per territorial
//! level. [`Aggregate`] is the assembled, immutable view of the three.
//!
//! Field names follow the service's Portuguese JSON keys through `serde(rename)`.
//! Ids are accepted either as JSON strings or numbers since the service is not
//! consistent about it.

pub mod client;
pub mod endpoints;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use client::MetadataClient;

/// Category id that stands for "every category" of a classification
pub const ALL_CATEGORIES_ID: u32 = 0;

/// Survey an aggregate belongs to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Survey {
    /// Survey code, e.g. "CA"
    pub id: String,
    /// Survey name
    pub name: String,
}

/// Publication periodicity of an aggregate
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Periodicity {
    /// Frequency name, e.g. "anual" or "mensal"
    #[serde(rename = "frequencia", default)]
    pub frequency: String,
    /// First period covered
    #[serde(rename = "inicio", default, deserialize_with = "ids::string")]
    pub start: String,
    /// Last period covered
    #[serde(rename = "fim", default, deserialize_with = "ids::string")]
    pub end: String,
}

/// Territorial level codes declared by an aggregate, grouped by kind
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerritorialLevels {
    /// Administrative levels (country, state, municipality, ...)
    #[serde(rename = "Administrativo", default)]
    pub administrative: Vec<String>,
    /// Special levels (metropolitan regions, ...)
    #[serde(rename = "Especial", default)]
    pub special: Vec<String>,
    /// IBGE-defined levels (meso/micro regions, ...)
    #[serde(rename = "IBGE", default)]
    pub other: Vec<String>,
}

impl TerritorialLevels {
    /// Every declared level code, administrative first, without duplicates
    pub fn all(&self) -> Vec<&str> {
        let mut levels: Vec<&str> = Vec::new();
        for level in self
            .administrative
            .iter()
            .chain(&self.special)
            .chain(&self.other)
        {
            if !levels.contains(&level.as_str()) {
                levels.push(level);
            }
        }
        levels
    }
}

/// A measured variable
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// Variable id
    #[serde(deserialize_with = "ids::u32")]
    pub id: u32,
    /// Variable name
    #[serde(rename = "nome")]
    pub name: String,
    /// Measurement unit
    #[serde(rename = "unidade", default)]
    pub unit: String,
    /// Supported summarization modes
    #[serde(rename = "sumarizacao", default)]
    pub summarization: Vec<String>,
}

/// Summarization rule of a classification
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summarization {
    /// Whether the classification can be summarized
    #[serde(default)]
    pub status: bool,
    /// Categories excluded from summarization
    #[serde(rename = "excecao", default, deserialize_with = "ids::u32_vec")]
    pub exceptions: Vec<u32>,
}

/// One category of a classification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Category id; [`ALL_CATEGORIES_ID`] is the "all" sentinel
    #[serde(deserialize_with = "ids::u32")]
    pub id: u32,
    /// Category name
    #[serde(rename = "nome")]
    pub name: String,
    /// Measurement unit, when it differs from the variable's
    #[serde(rename = "unidade", default)]
    pub unit: Option<String>,
    /// Nesting level inside the classification tree
    #[serde(rename = "nivel", default)]
    pub level: i32,
}

impl Category {
    /// True for the "all categories" sentinel
    pub fn is_all(&self) -> bool {
        self.id == ALL_CATEGORIES_ID
    }
}

/// A classification (breakdown dimension) of an aggregate
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Classification id
    #[serde(deserialize_with = "ids::u32")]
    pub id: u32,
    /// Classification name
    #[serde(rename = "nome")]
    pub name: String,
    /// Summarization rule
    #[serde(rename = "sumarizacao", default)]
    pub summarization: Summarization,
    /// Categories, possibly including the "all" sentinel
    #[serde(rename = "categorias", default)]
    pub categories: Vec<Category>,
}

impl Classification {
    /// Categories without the "all" sentinel
    pub fn concrete_categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter().filter(|c| !c.is_all())
    }
}

/// A reference period of an aggregate
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    /// Period code, e.g. "202001"
    #[serde(deserialize_with = "ids::string")]
    pub id: String,
    /// Human-readable labels
    #[serde(default)]
    pub literals: Vec<String>,
    /// Date the period's data was last modified
    #[serde(rename = "modificacao", with = "modification_date")]
    pub modified: NaiveDate,
}

/// Territorial level a locality belongs to
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalityLevel {
    /// Level code, e.g. "N6"
    pub id: String,
    /// Level name
    #[serde(rename = "nome")]
    pub name: String,
}

/// A locality (country, state, municipality, ...)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locality {
    /// Locality code
    #[serde(deserialize_with = "ids::string")]
    pub id: String,
    /// Locality name
    #[serde(rename = "nome")]
    pub name: String,
    /// Territorial level
    #[serde(rename = "nivel")]
    pub level: LocalityLevel,
}

/// Contents of an aggregate's `metadados` document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateMetadata {
    /// Aggregate id
    #[serde(deserialize_with = "ids::u32")]
    pub id: u32,
    /// Aggregate name
    #[serde(rename = "nome")]
    pub name: String,
    /// Human-facing URL of the table
    #[serde(rename = "URL", default)]
    pub url: String,
    /// Survey name
    #[serde(rename = "pesquisa", default)]
    pub survey: String,
    /// Subject
    #[serde(rename = "assunto", default)]
    pub subject: String,
    /// Publication periodicity
    #[serde(rename = "periodicidade", default)]
    pub periodicity: Periodicity,
    /// Declared territorial levels
    #[serde(rename = "nivelTerritorial", default)]
    pub territorial_levels: TerritorialLevels,
    /// Variables
    #[serde(rename = "variaveis", default)]
    pub variables: Vec<Variable>,
    /// Classifications
    #[serde(rename = "classificacoes", default)]
    pub classifications: Vec<Classification>,
}

/// A fully loaded aggregate: metadata plus its periods and localities
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Aggregate {
    /// Aggregate id
    pub id: u32,
    /// Aggregate name
    pub name: String,
    /// Human-facing URL of the table
    pub url: String,
    /// Owning survey
    pub survey: Survey,
    /// Subject
    pub subject: String,
    /// Publication periodicity
    pub periodicity: Periodicity,
    /// Declared territorial levels
    pub territorial_levels: TerritorialLevels,
    /// Variables
    pub variables: Vec<Variable>,
    /// Classifications
    pub classifications: Vec<Classification>,
    /// Periods
    pub periods: Vec<Period>,
    /// Localities across every territorial level
    pub localities: Vec<Locality>,
}

impl Aggregate {
    /// Assemble an aggregate from its three service documents
    pub fn assemble(
        survey_id: impl Into<String>,
        metadata: AggregateMetadata,
        periods: Vec<Period>,
        localities: Vec<Locality>,
    ) -> Self {
        Self {
            id: metadata.id,
            name: metadata.name,
            url: metadata.url,
            survey: Survey {
                id: survey_id.into(),
                name: metadata.survey,
            },
            subject: metadata.subject,
            periodicity: metadata.periodicity,
            territorial_levels: metadata.territorial_levels,
            variables: metadata.variables,
            classifications: metadata.classifications,
            periods,
            localities,
        }
    }
}

/// Entry of the survey index listing one aggregate
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateIndexEntry {
    /// Aggregate id
    #[serde(deserialize_with = "ids::u32")]
    pub id: u32,
    /// Aggregate name
    #[serde(rename = "nome")]
    pub name: String,
}

/// One survey of the index with the aggregates it publishes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyIndex {
    /// Survey code
    #[serde(deserialize_with = "ids::string")]
    pub id: String,
    /// Survey name
    #[serde(rename = "nome")]
    pub name: String,
    /// Aggregates of the survey
    #[serde(rename = "agregados", default)]
    pub aggregates: Vec<AggregateIndexEntry>,
}

/// Collections ("acervos") the metadata service can list
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    /// Subjects
    Subjects,
    /// Classifications
    Classifications,
    /// Territorial levels
    TerritorialLevels,
    /// Periods
    Periods,
    /// Periodicities
    Periodicities,
    /// Variables
    Variables,
}

impl CollectionKind {
    /// Every collection kind
    pub const ALL: [CollectionKind; 6] = [
        CollectionKind::Subjects,
        CollectionKind::Classifications,
        CollectionKind::TerritorialLevels,
        CollectionKind::Periods,
        CollectionKind::Periodicities,
        CollectionKind::Variables,
    ];

    /// One-letter code used by the service
    pub fn code(&self) -> &'static str {
        match self {
            CollectionKind::Subjects => "A",
            CollectionKind::Classifications => "C",
            CollectionKind::TerritorialLevels => "N",
            CollectionKind::Periods => "P",
            CollectionKind::Periodicities => "E",
            CollectionKind::Variables => "V",
        }
    }
}

impl std::fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for CollectionKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CollectionKind::ALL
            .into_iter()
            .find(|k| k.code().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::error::Error::Other(format!("unknown collection code: {s}")))
    }
}

// Modification dates travel as dd/mm/yyyy
mod modification_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%d/%m/%Y";

    pub fn serialize<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(raw.trim(), FORMAT).map_err(serde::de::Error::custom)
    }
}

// Ids that may arrive as JSON strings or numbers
mod ids {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(serde_json::Number),
    }

    impl StringOrNumber {
        fn into_string(self) -> String {
            match self {
                StringOrNumber::String(s) => s,
                StringOrNumber::Number(n) => n.to_string(),
            }
        }
    }

    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(StringOrNumber::deserialize(deserializer)?.into_string())
    }

    pub fn u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = StringOrNumber::deserialize(deserializer)?.into_string();
        raw.trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid id: {raw}")))
    }

    pub fn u32_vec<'de, D>(deserializer: D) -> Result<Vec<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<StringOrNumber>::deserialize(deserializer)?
            .into_iter()
            .map(|v| {
                let raw = v.into_string();
                raw.trim()
                    .parse()
                    .map_err(|_| serde::de::Error::custom(format!("invalid id: {raw}")))
            })
            .collect()
    }
}
