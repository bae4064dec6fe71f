//! On-disk layout of fetched documents
//!
//! ```text
//! {data_dir}/
//!     agregados.json
//!     {collection code}.json
//!     {aggregate id, 6 digits}/
//!         metadados.json
//!         periodos.json
//!         localidades-{level}.json
//!         {aggregate}_{period}[-{level}.{locality}][-{variable}]_{yyyymmdd}.json
//! ```
//!
//! The path functions are pure; the rest of the module reads and writes files in
//! that layout.

use crate::error::{Error, Result};
use crate::metadata::{Aggregate, AggregateMetadata, CollectionKind, Locality, Period};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Survey/aggregate index
pub fn index_path(data_dir: &Path) -> PathBuf {
    data_dir.join("agregados.json")
}

/// Listing of one collection
pub fn collection_path(data_dir: &Path, kind: CollectionKind) -> PathBuf {
    data_dir.join(format!("{}.json", kind.code()))
}

/// Directory holding everything about one aggregate
pub fn aggregate_dir(data_dir: &Path, aggregate_id: u32) -> PathBuf {
    data_dir.join(format!("{:0>6}", aggregate_id))
}

/// Cached `metadados` document
pub fn metadata_path(data_dir: &Path, aggregate_id: u32) -> PathBuf {
    aggregate_dir(data_dir, aggregate_id).join("metadados.json")
}

/// Cached `periodos` document
pub fn periods_path(data_dir: &Path, aggregate_id: u32) -> PathBuf {
    aggregate_dir(data_dir, aggregate_id).join("periodos.json")
}

/// Cached localities of one territorial level
pub fn localities_path(data_dir: &Path, aggregate_id: u32, level: &str) -> PathBuf {
    aggregate_dir(data_dir, aggregate_id).join(format!(
        "localidades-{}.json",
        level.to_lowercase()
    ))
}

/// Values file of one task
///
/// The partition key is the period id, followed by the locality (as
/// `(level id, locality id)`) and variable id when the task is that
/// fine-grained. Locality codes repeat across levels ("1" is both Brasil at N1
/// and Norte at N2), so the lowercased level prefixes the code. The stamp is the
/// period's last modification date so an updated period lands in a new file.
pub fn data_path(
    data_dir: &Path,
    aggregate_id: u32,
    period_id: &str,
    modified: NaiveDate,
    locality: Option<(&str, &str)>,
    variable_id: Option<u32>,
) -> PathBuf {
    let mut partition = period_id.to_string();
    if let Some((level, locality)) = locality {
        partition.push('-');
        partition.push_str(&level.to_lowercase());
        partition.push('.');
        partition.push_str(locality);
    }
    if let Some(variable) = variable_id {
        partition.push('-');
        partition.push_str(&variable.to_string());
    }
    aggregate_dir(data_dir, aggregate_id).join(format!(
        "{}_{}_{}.json",
        aggregate_id,
        partition,
        modified.format("%Y%m%d")
    ))
}

/// Read and decode a JSON file
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    tracing::debug!(path = %path.display(), "reading JSON file");
    let raw = std::fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Write raw bytes, creating parent directories as needed
pub async fn write_data(path: &Path, data: &[u8]) -> Result<()> {
    let wrap = |source: std::io::Error| Error::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(wrap)?;
    }
    tokio::fs::write(path, data).await.map_err(wrap)?;
    tracing::debug!(path = %path.display(), bytes = data.len(), "file written");
    Ok(())
}

/// Rebuild an aggregate from its cached documents
///
/// Returns `Ok(None)` until the aggregate is complete on disk: its `metadados`
/// and `periodos` documents plus one localities file per declared territorial
/// level. A `metadados` document describing another aggregate is
/// [`Error::InvalidMetadata`].
pub fn read_aggregate(
    data_dir: &Path,
    survey_id: &str,
    aggregate_id: u32,
) -> Result<Option<Aggregate>> {
    let metadata_file = metadata_path(data_dir, aggregate_id);
    if !metadata_file.exists() {
        return Ok(None);
    }
    let metadata: AggregateMetadata = read_json(&metadata_file)?;
    if metadata.id != aggregate_id {
        return Err(Error::InvalidMetadata(format!(
            "{} describes aggregate {}, expected {}",
            metadata_file.display(),
            metadata.id,
            aggregate_id
        )));
    }

    let periods_file = periods_path(data_dir, aggregate_id);
    if !periods_file.exists() {
        tracing::debug!(aggregate_id, "periods not on disk yet");
        return Ok(None);
    }
    let periods: Vec<Period> = read_json(&periods_file)?;

    let mut localities: Vec<Locality> = Vec::new();
    for level in metadata.territorial_levels.all() {
        let file = localities_path(data_dir, aggregate_id, level);
        if !file.exists() {
            tracing::debug!(aggregate_id, level, "localities not on disk yet");
            return Ok(None);
        }
        localities.extend(read_json::<Vec<Locality>>(&file)?);
    }

    Ok(Some(Aggregate::assemble(survey_id, metadata, periods, localities)))
}

/// Delete cached documents of an aggregate that no longer parse
///
/// A truncated or non-JSON body is still written to its destination and would
/// otherwise be skipped as existing on every later run. Returns the removed paths.
pub fn remove_unreadable(data_dir: &Path, aggregate_id: u32) -> Result<Vec<PathBuf>> {
    let dir = aggregate_dir(data_dir, aggregate_id);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut removed = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let readable = if name == "metadados.json" {
            read_json::<AggregateMetadata>(&path).is_ok()
        } else if name == "periodos.json" {
            read_json::<Vec<Period>>(&path).is_ok()
        } else if name.starts_with("localidades-") && name.ends_with(".json") {
            read_json::<Vec<Locality>>(&path).is_ok()
        } else {
            continue;
        };
        if !readable {
            std::fs::remove_file(&path)?;
            tracing::warn!(path = %path.display(), "removed unreadable cached document");
            removed.push(path);
        }
    }
    removed.sort();
    Ok(removed)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn aggregate_paths_are_zero_padded() {
        let root = Path::new("/data");
        assert_eq!(aggregate_dir(root, 1419), PathBuf::from("/data/001419"));
        assert_eq!(
            metadata_path(root, 1419),
            PathBuf::from("/data/001419/metadados.json")
        );
        assert_eq!(
            periods_path(root, 1419),
            PathBuf::from("/data/001419/periodos.json")
        );
        assert_eq!(
            localities_path(root, 1419, "N6"),
            PathBuf::from("/data/001419/localidades-n6.json")
        );
        assert_eq!(index_path(root), PathBuf::from("/data/agregados.json"));
        assert_eq!(
            collection_path(root, CollectionKind::Subjects),
            PathBuf::from("/data/A.json")
        );
    }

    #[test]
    fn data_path_encodes_partition_and_stamp() {
        let root = Path::new("/data");
        let date = NaiveDate::from_ymd_opt(2021, 3, 5).unwrap();

        assert_eq!(
            data_path(root, 1419, "202001", date, None, None),
            PathBuf::from("/data/001419/1419_202001_20210305.json")
        );
        assert_eq!(
            data_path(root, 1419, "202001", date, Some(("N6", "3304557")), None),
            PathBuf::from("/data/001419/1419_202001-n6.3304557_20210305.json")
        );
        assert_eq!(
            data_path(root, 1419, "202001", date, Some(("N6", "3304557")), Some(63)),
            PathBuf::from("/data/001419/1419_202001-n6.3304557-63_20210305.json")
        );
    }

    #[test]
    fn data_path_keeps_levels_with_shared_codes_apart() {
        let root = Path::new("/data");
        let date = NaiveDate::from_ymd_opt(2021, 3, 5).unwrap();

        let brasil = data_path(root, 1, "2020", date, Some(("N1", "1")), None);
        let norte = data_path(root, 1, "2020", date, Some(("N2", "1")), None);
        assert_ne!(brasil, norte);
    }

    #[tokio::test]
    async fn write_data_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c.json");

        write_data(&path, b"[]").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"[]");
    }

    #[tokio::test]
    async fn write_data_reports_destination_on_failure() {
        let dir = TempDir::new().unwrap();
        // A file where a directory is expected
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let target = blocker.join("child.json");
        match write_data(&target, b"[]").await {
            Err(Error::Write { path, .. }) => assert_eq!(path, target),
            other => panic!("expected write error, got {other:?}"),
        }
    }

    #[test]
    fn read_aggregate_missing_metadata_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(read_aggregate(dir.path(), "XX", 1).unwrap().is_none());
    }

    #[test]
    fn read_aggregate_rejects_mismatched_metadata() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(aggregate_dir(root, 8)).unwrap();
        std::fs::write(metadata_path(root, 8), r#"{"id": 9, "nome": "Outra"}"#).unwrap();

        assert!(matches!(
            read_aggregate(root, "XX", 8),
            Err(Error::InvalidMetadata(_))
        ));
    }

    fn write_metadata_with_levels(root: &Path, id: u32, levels: &str) {
        std::fs::create_dir_all(aggregate_dir(root, id)).unwrap();
        std::fs::write(
            metadata_path(root, id),
            format!(
                r#"{{"id": {id}, "nome": "Tabela {id}",
                    "nivelTerritorial": {{"Administrativo": {levels}}}}}"#
            ),
        )
        .unwrap();
        std::fs::write(
            periods_path(root, id),
            r#"[{"id": "2010", "literals": ["2010"], "modificacao": "01/02/2011"}]"#,
        )
        .unwrap();
    }

    #[test]
    fn read_aggregate_waits_for_every_declared_level() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_metadata_with_levels(root, 7, r#"["N1", "N3"]"#);
        std::fs::write(
            localities_path(root, 7, "N1"),
            r#"[{"id": "1", "nome": "Brasil", "nivel": {"id": "N1", "nome": "Brasil"}}]"#,
        )
        .unwrap();

        assert!(read_aggregate(root, "XX", 7).unwrap().is_none());

        std::fs::write(
            localities_path(root, 7, "N3"),
            r#"[{"id": "33", "nome": "RJ", "nivel": {"id": "N3", "nome": "UF"}}]"#,
        )
        .unwrap();
        let aggregate = read_aggregate(root, "XX", 7).unwrap().unwrap();
        assert_eq!(aggregate.localities.len(), 2);
    }

    #[test]
    fn read_aggregate_waits_for_periods() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_metadata_with_levels(root, 7, "[]");
        std::fs::remove_file(periods_path(root, 7)).unwrap();

        assert!(read_aggregate(root, "XX", 7).unwrap().is_none());
    }

    #[test]
    fn read_aggregate_ignores_localities_of_undeclared_levels() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_metadata_with_levels(root, 7, r#"["N1"]"#);
        for level in ["N1", "N6"] {
            std::fs::write(
                localities_path(root, 7, level),
                format!(r#"[{{"id": "1", "nome": "L", "nivel": {{"id": "{level}", "nome": "L"}}}}]"#),
            )
            .unwrap();
        }

        let aggregate = read_aggregate(root, "XX", 7).unwrap().unwrap();
        assert_eq!(aggregate.localities.len(), 1);
        assert_eq!(aggregate.localities[0].level.id, "N1");
    }

    #[test]
    fn remove_unreadable_deletes_only_broken_documents() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_metadata_with_levels(root, 7, r#"["N1"]"#);
        std::fs::write(localities_path(root, 7, "N1"), r#"[{"id": "1", "no"#).unwrap();
        let data_file = data_path(
            root,
            7,
            "2010",
            NaiveDate::from_ymd_opt(2011, 2, 1).unwrap(),
            None,
            None,
        );
        std::fs::write(&data_file, "not json").unwrap();

        let removed = remove_unreadable(root, 7).unwrap();

        assert_eq!(removed, vec![localities_path(root, 7, "N1")]);
        assert!(metadata_path(root, 7).exists());
        assert!(periods_path(root, 7).exists());
        assert!(data_file.exists(), "values files are not cached documents");
        assert!(remove_unreadable(root, 8).unwrap().is_empty());
    }

    #[test]
    fn read_aggregate_collects_every_localities_file() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(aggregate_dir(root, 7)).unwrap();
        std::fs::write(
            metadata_path(root, 7),
            r#"{"id": "7", "nome": "Tabela 7", "pesquisa": "Censo",
                "nivelTerritorial": {"Administrativo": ["N1", "N3"], "Especial": [], "IBGE": []},
                "variaveis": [], "classificacoes": []}"#,
        )
        .unwrap();
        std::fs::write(
            periods_path(root, 7),
            r#"[{"id": "2010", "literals": ["2010"], "modificacao": "01/02/2011"}]"#,
        )
        .unwrap();
        std::fs::write(
            localities_path(root, 7, "N1"),
            r#"[{"id": "1", "nome": "Brasil", "nivel": {"id": "N1", "nome": "Brasil"}}]"#,
        )
        .unwrap();
        std::fs::write(
            localities_path(root, 7, "N3"),
            r#"[{"id": "33", "nome": "RJ", "nivel": {"id": "N3", "nome": "UF"}}]"#,
        )
        .unwrap();

        let aggregate = read_aggregate(root, "CD", 7).unwrap().unwrap();
        assert_eq!(aggregate.survey.id, "CD");
        assert_eq!(aggregate.survey.name, "Censo");
        assert_eq!(aggregate.periods.len(), 1);
        assert_eq!(aggregate.localities.len(), 2);
    }
}
