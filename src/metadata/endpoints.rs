//! URL builders for the metadata service

use super::CollectionKind;
use crate::error::{Error, Result};

fn trim(base: &str) -> &str {
    base.trim_end_matches('/')
}

/// Survey/aggregate index
pub fn index_url(base: &str) -> String {
    trim(base).to_string()
}

/// `metadados` document of an aggregate
pub fn metadata_url(base: &str, aggregate_id: u32) -> String {
    format!("{}/{}/metadados", trim(base), aggregate_id)
}

/// `periodos` document of an aggregate
pub fn periods_url(base: &str, aggregate_id: u32) -> String {
    format!("{}/{}/periodos", trim(base), aggregate_id)
}

/// Localities of an aggregate at one territorial level (e.g. "N6")
pub fn localities_url(base: &str, aggregate_id: u32, level: &str) -> String {
    format!("{}/{}/localidades/{}", trim(base), aggregate_id, level)
}

/// Collection listing (`?acervo={code}`)
pub fn collection_url(base: &str, kind: CollectionKind) -> Result<String> {
    let mut url = url::Url::parse(trim(base))
        .map_err(|e| Error::config("http.metadata_base_url", format!("invalid URL: {e}")))?;
    url.query_pairs_mut().append_pair("acervo", kind.code());
    Ok(url.to_string())
}
