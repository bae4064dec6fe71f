//! Values service query codec
//!
//! A [`Query`] is the structured form of a request to the values service. It
//! encodes to the service's slash-segmented grammar in a fixed order:
//!
//! ```text
//! /t/{aggregate}/n{level}/{ids}.../v/{ids}/p/{ids}/c{id}/{ids}.../h/{y|n}/f/{format}/d/{precision}
//! ```
//!
//! and decodes back from it (see [`Query::decode`]). Queries are values: every
//! `with_*` method returns a new query and leaves the receiver untouched.
//!
//! ```
//! use sidra_fetch::query::{Query, Selection};
//!
//! let query = Query::new("1419")
//!     .with_territory("6", Selection::ids(["3304557"]))
//!     .with_periods(Selection::ids(["202001"]));
//!
//! assert_eq!(query.encode(), "/t/1419/n6/3304557/v/all/p/202001/d/m");
//! assert_eq!(Query::decode(&query.encode()), query);
//! ```

mod decode;

use std::fmt;

/// Keyword selecting every member of a dimension
pub const ALL: &str = "all";

/// Members selected along one dimension
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Selection {
    /// Every member
    #[default]
    All,
    /// Explicit member ids, in order
    Ids(Vec<String>),
}

impl Selection {
    /// Selection of explicit ids
    ///
    /// An empty list, or one containing the `all` keyword, is [`Selection::All`].
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() || ids.iter().any(|id| id == ALL) {
            Selection::All
        } else {
            Selection::Ids(ids)
        }
    }

    /// True for [`Selection::All`]
    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }

    fn parse(raw: &str) -> Self {
        Selection::ids(raw.split(',').map(str::trim).filter(|s| !s.is_empty()))
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Ids(ids) if !ids.is_empty() => f.write_str(&ids.join(",")),
            _ => f.write_str(ALL),
        }
    }
}

/// Selection of localities at one territorial level
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TerritorySelection {
    /// Level number without the `N` prefix (e.g. "6" for municipalities)
    pub level: String,
    /// Selected locality codes
    pub selection: Selection,
}

/// Selection of categories within one classification
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClassificationSelection {
    /// Classification id
    pub classification: String,
    /// Selected category ids
    pub selection: Selection,
}

/// Precision code for values
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrecisionCode {
    /// Maximum precision available (`m`)
    Max,
    /// The variable's standard precision (`s`)
    Standard,
    /// Fixed number of decimal places
    Decimals(DecimalPlaces),
}

impl PrecisionCode {
    /// Fixed decimal places, or `None` when `places` exceeds [`DecimalPlaces::MAX`]
    pub fn decimals(places: u8) -> Option<Self> {
        DecimalPlaces::new(places).map(PrecisionCode::Decimals)
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "m" => Some(PrecisionCode::Max),
            "s" => Some(PrecisionCode::Standard),
            d if d.len() == 1 => d.parse::<u8>().ok().and_then(PrecisionCode::decimals),
            _ => None,
        }
    }
}

/// Number of decimal places the values service accepts, 0 to 9
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DecimalPlaces(u8);

impl DecimalPlaces {
    /// Largest accepted value
    pub const MAX: u8 = 9;

    /// Checked constructor
    pub fn new(places: u8) -> Option<Self> {
        (places <= Self::MAX).then_some(Self(places))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for PrecisionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrecisionCode::Max => f.write_str("m"),
            PrecisionCode::Standard => f.write_str("s"),
            PrecisionCode::Decimals(d) => write!(f, "{}", d.get()),
        }
    }
}

/// Precision of the requested values
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Precision {
    /// One code for every variable
    Global(PrecisionCode),
    /// One code per variable id, encoded as `v{id}%20{code}` pairs
    PerVariable(Vec<(String, PrecisionCode)>),
}

impl Default for Precision {
    fn default() -> Self {
        Precision::Global(PrecisionCode::Max)
    }
}

impl Precision {
    /// Per-variable precision; an empty list is maximum precision
    pub fn per_variable<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, PrecisionCode)>,
        S: Into<String>,
    {
        let pairs: Vec<(String, PrecisionCode)> =
            pairs.into_iter().map(|(v, c)| (v.into(), c)).collect();
        if pairs.is_empty() {
            Precision::default()
        } else {
            Precision::PerVariable(pairs)
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Global(code) => write!(f, "{code}"),
            Precision::PerVariable(pairs) if pairs.is_empty() => {
                write!(f, "{}", PrecisionCode::Max)
            }
            Precision::PerVariable(pairs) => {
                let joined: Vec<String> = pairs
                    .iter()
                    .map(|(variable, code)| format!("v{variable}%20{code}"))
                    .collect();
                f.write_str(&joined.join(","))
            }
        }
    }
}

/// Layout of the returned table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    /// Codes and names (`a`)
    CodesAndNames,
    /// Codes only (`c`)
    Codes,
    /// Names only (`n`)
    Names,
    /// Codes and names with units (`u`)
    CodesNamesAndUnits,
}

impl Format {
    /// One-letter code used in the URL
    pub fn code(&self) -> &'static str {
        match self {
            Format::CodesAndNames => "a",
            Format::Codes => "c",
            Format::Names => "n",
            Format::CodesNamesAndUnits => "u",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "a" => Some(Format::CodesAndNames),
            "c" => Some(Format::Codes),
            "n" => Some(Format::Names),
            "u" => Some(Format::CodesNamesAndUnits),
            _ => None,
        }
    }
}

/// Structured request to the values service
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Query {
    aggregate: String,
    territories: Vec<TerritorySelection>,
    variables: Selection,
    periods: Selection,
    classifications: Vec<ClassificationSelection>,
    precision: Precision,
    header: Option<bool>,
    format: Option<Format>,
}

impl Query {
    /// Query for every variable and period of `aggregate`, maximum precision
    pub fn new(aggregate: impl Into<String>) -> Self {
        Self {
            aggregate: aggregate.into(),
            ..Default::default()
        }
    }

    /// Decode a query from a URL or bare path; never fails
    pub fn decode(url: &str) -> Self {
        decode::decode(url)
    }

    /// Aggregate id
    pub fn aggregate(&self) -> &str {
        &self.aggregate
    }

    /// Territory selections in encoding order
    pub fn territories(&self) -> &[TerritorySelection] {
        &self.territories
    }

    /// Variable selection
    pub fn variables(&self) -> &Selection {
        &self.variables
    }

    /// Period selection
    pub fn periods(&self) -> &Selection {
        &self.periods
    }

    /// Classification selections in encoding order
    pub fn classifications(&self) -> &[ClassificationSelection] {
        &self.classifications
    }

    /// Precision
    pub fn precision(&self) -> &Precision {
        &self.precision
    }

    /// Header flag, absent unless set
    pub fn header(&self) -> Option<bool> {
        self.header
    }

    /// Output format, absent unless set
    pub fn format(&self) -> Option<Format> {
        self.format
    }

    /// Same query for another aggregate
    pub fn with_aggregate(&self, aggregate: impl Into<String>) -> Self {
        Self {
            aggregate: aggregate.into(),
            ..self.clone()
        }
    }

    /// Same query with `level` selecting `selection`
    ///
    /// Replaces an existing selection for the level in place, otherwise appends.
    pub fn with_territory(&self, level: impl Into<String>, selection: Selection) -> Self {
        let level = level.into();
        let mut territories = self.territories.clone();
        match territories.iter_mut().find(|t| t.level == level) {
            Some(existing) => existing.selection = selection,
            None => territories.push(TerritorySelection { level, selection }),
        }
        Self {
            territories,
            ..self.clone()
        }
    }

    /// Same query with the whole territory list replaced
    pub fn with_territories(&self, territories: Vec<TerritorySelection>) -> Self {
        Self {
            territories,
            ..self.clone()
        }
    }

    /// Same query with another variable selection
    pub fn with_variables(&self, variables: Selection) -> Self {
        Self {
            variables,
            ..self.clone()
        }
    }

    /// Same query with another period selection
    pub fn with_periods(&self, periods: Selection) -> Self {
        Self {
            periods,
            ..self.clone()
        }
    }

    /// Same query with `classification` selecting `selection`
    ///
    /// Replaces an existing selection for the classification in place, otherwise appends.
    pub fn with_classification(
        &self,
        classification: impl Into<String>,
        selection: Selection,
    ) -> Self {
        let classification = classification.into();
        let mut classifications = self.classifications.clone();
        match classifications
            .iter_mut()
            .find(|c| c.classification == classification)
        {
            Some(existing) => existing.selection = selection,
            None => classifications.push(ClassificationSelection {
                classification,
                selection,
            }),
        }
        Self {
            classifications,
            ..self.clone()
        }
    }

    /// Same query with the whole classification list replaced
    pub fn with_classifications(&self, classifications: Vec<ClassificationSelection>) -> Self {
        Self {
            classifications,
            ..self.clone()
        }
    }

    /// Same query with another precision
    pub fn with_precision(&self, precision: Precision) -> Self {
        Self {
            precision,
            ..self.clone()
        }
    }

    /// Same query with the header flag set or cleared
    pub fn with_header(&self, header: Option<bool>) -> Self {
        Self {
            header,
            ..self.clone()
        }
    }

    /// Same query with the output format set or cleared
    pub fn with_format(&self, format: Option<Format>) -> Self {
        Self {
            format,
            ..self.clone()
        }
    }

    /// Path part of the request, starting with `/t/`
    pub fn encode(&self) -> String {
        let mut out = format!("/t/{}", self.aggregate);
        for territory in &self.territories {
            out.push_str(&format!("/n{}/{}", territory.level, territory.selection));
        }
        out.push_str(&format!("/v/{}", self.variables));
        out.push_str(&format!("/p/{}", self.periods));
        for classification in &self.classifications {
            out.push_str(&format!(
                "/c{}/{}",
                classification.classification, classification.selection
            ));
        }
        if let Some(header) = self.header {
            out.push_str(if header { "/h/y" } else { "/h/n" });
        }
        if let Some(format) = self.format {
            out.push_str(&format!("/f/{}", format.code()));
        }
        out.push_str(&format!("/d/{}", self.precision));
        out
    }

    /// Full request URL under `base`
    pub fn url(&self, base: &str) -> String {
        format!("{}{}", base.trim_end_matches('/'), self.encode())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
