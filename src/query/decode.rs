//! Query decoding
//!
//! Each segment is extracted independently. A segment that is missing or does
//! not match its pattern leaves the corresponding field at its default, so
//! decoding never fails.

use super::{
    ClassificationSelection, Format, Precision, PrecisionCode, Query, Selection,
    TerritorySelection,
};
use regex::Regex;
use std::sync::LazyLock;

fn compile(pattern: &str) -> Option<Regex> {
    regex::RegexBuilder::new(pattern)
        .build()
        .map_err(|e| {
            tracing::warn!("Invalid query segment pattern '{}': {}", pattern, e);
        })
        .ok()
}

static AGGREGATE: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"/t/(\d+)"));
static TERRITORY: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"/n(\d+)/([^/]+)"));
static VARIABLES: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"/v/([^/]+)"));
static PERIODS: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"/p/([^/]+)"));
static CLASSIFICATION: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"/c(\d+)/([^/]+)"));
static HEADER: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"/h/(y|n)(?:/|$)"));
static FORMAT: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"/f/(a|c|n|u)(?:/|$)"));
static PRECISION: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"/d/([^/]+)"));

/// First capture group of `regex` in `path`
fn first<'a>(regex: &LazyLock<Option<Regex>>, path: &'a str) -> Option<&'a str> {
    regex
        .as_ref()?
        .captures(path)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Every (group 1, group 2) pair of `regex` in `path`, in order
fn pairs<'a>(regex: &LazyLock<Option<Regex>>, path: &'a str) -> Vec<(&'a str, &'a str)> {
    let Some(regex) = regex.as_ref() else {
        return Vec::new();
    };
    regex
        .captures_iter(path)
        .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
        .collect()
}

/// Path part of `url`, or `url` itself when it is not absolute
fn strip_base(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    }
}

fn decode_precision(raw: &str) -> Precision {
    if let Some(code) = PrecisionCode::parse(raw) {
        return Precision::Global(code);
    }

    let decoded = urlencoding::decode(raw).map(|s| s.into_owned()).unwrap_or_default();
    let mut entries = Vec::new();
    for pair in decoded.split(',') {
        let parsed = pair
            .trim()
            .strip_prefix('v')
            .and_then(|rest| rest.split_once(' '))
            .and_then(|(variable, code)| {
                let variable = variable.trim();
                let is_id = !variable.is_empty() && variable.chars().all(|c| c.is_ascii_digit());
                let code = PrecisionCode::parse(code.trim())?;
                is_id.then(|| (variable.to_string(), code))
            });
        match parsed {
            Some(entry) => entries.push(entry),
            None => {
                tracing::debug!(segment = raw, "malformed precision segment, using max");
                return Precision::default();
            }
        }
    }
    Precision::per_variable(entries)
}

pub(super) fn decode(url: &str) -> Query {
    let path = strip_base(url);
    let path = path.as_str();

    let territories = pairs(&TERRITORY, path)
        .into_iter()
        .map(|(level, raw)| TerritorySelection {
            level: level.to_string(),
            selection: Selection::parse(raw),
        })
        .collect();

    let classifications = pairs(&CLASSIFICATION, path)
        .into_iter()
        .map(|(id, raw)| ClassificationSelection {
            classification: id.to_string(),
            selection: Selection::parse(raw),
        })
        .collect();

    Query {
        aggregate: first(&AGGREGATE, path).unwrap_or_default().to_string(),
        territories,
        variables: first(&VARIABLES, path)
            .map(Selection::parse)
            .unwrap_or_default(),
        periods: first(&PERIODS, path).map(Selection::parse).unwrap_or_default(),
        classifications,
        precision: first(&PRECISION, path)
            .map(decode_precision)
            .unwrap_or_default(),
        header: first(&HEADER, path).map(|h| h == "y"),
        format: first(&FORMAT, path).and_then(Format::parse),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_VALUES_BASE_URL;

    #[test]
    fn round_trip_with_global_precision() {
        let query = Query::new("5938")
            .with_territory("3", Selection::ids(["33", "35"]))
            .with_territory("6", Selection::All)
            .with_variables(Selection::ids(["37", "498"]))
            .with_periods(Selection::ids(["2019", "2020"]))
            .with_classification("11255", Selection::ids(["90687"]))
            .with_precision(Precision::Global(PrecisionCode::decimals(3).unwrap()))
            .with_header(Some(true))
            .with_format(Some(Format::Codes));

        assert_eq!(Query::decode(&query.url(DEFAULT_VALUES_BASE_URL)), query);
        assert_eq!(Query::decode(&query.encode()), query);
    }

    #[test]
    fn round_trip_with_per_variable_precision() {
        let query = Query::new("1419")
            .with_territory("1", Selection::All)
            .with_variables(Selection::ids(["63", "69"]))
            .with_precision(Precision::per_variable([
                ("63", PrecisionCode::decimals(2).unwrap()),
                ("69", PrecisionCode::Standard),
            ]));

        assert_eq!(Query::decode(&query.encode()), query);
    }

    #[test]
    fn missing_segments_default_to_all() {
        let query = Query::decode("/t/1612/n1/all");

        assert_eq!(query.aggregate(), "1612");
        assert!(query.variables().is_all());
        assert!(query.periods().is_all());
        assert!(query.classifications().is_empty());
        assert_eq!(query.precision(), &Precision::default());
        assert_eq!(query.header(), None);
        assert_eq!(query.format(), None);
    }

    #[test]
    fn all_keyword_decodes_to_all_selection() {
        let query = Query::decode("/t/1/n6/all/v/all/p/all/c2/all/d/m");
        assert!(query.territories()[0].selection.is_all());
        assert!(query.variables().is_all());
        assert!(query.periods().is_all());
        assert!(query.classifications()[0].selection.is_all());
    }

    #[test]
    fn malformed_segments_yield_defaults() {
        let query = Query::decode(
            "https://apisidra.ibge.gov.br/values/t/abc/v/63/h/maybe/f/zz/d/v63%20x",
        );

        assert_eq!(query.aggregate(), "");
        assert_eq!(query.variables(), &Selection::ids(["63"]));
        assert_eq!(query.header(), None);
        assert_eq!(query.format(), None);
        assert_eq!(query.precision(), &Precision::default());
    }

    #[test]
    fn garbage_input_is_default_query() {
        assert_eq!(Query::decode("not a query at all"), Query::default());
        assert_eq!(Query::decode(""), Query::default());
    }

    #[test]
    fn keeps_territory_and_classification_order() {
        let query = Query::decode("/t/1/n6/1,2/n3/33/v/all/p/last%2012/c2/4/c1/all/d/s");

        let levels: Vec<&str> = query.territories().iter().map(|t| t.level.as_str()).collect();
        assert_eq!(levels, vec!["6", "3"]);
        let classes: Vec<&str> = query
            .classifications()
            .iter()
            .map(|c| c.classification.as_str())
            .collect();
        assert_eq!(classes, vec!["2", "1"]);
        assert_eq!(query.periods(), &Selection::ids(["last%2012"]));
        assert_eq!(query.precision(), &Precision::Global(PrecisionCode::Standard));
    }
}
