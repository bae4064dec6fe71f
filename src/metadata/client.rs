//! Typed client for the metadata service

use super::endpoints;
use super::{Aggregate, AggregateMetadata, CollectionKind, Locality, Period, SurveyIndex};
use crate::config::{HttpConfig, RetryConfig};
use crate::error::Result;
use crate::fetcher::{Fetch, HttpFetcher};
use crate::retry::with_retry;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Reads and decodes metadata documents, retrying transient failures
#[derive(Clone)]
pub struct MetadataClient {
    fetcher: Arc<dyn Fetch>,
    base_url: String,
    retry: RetryConfig,
}

impl MetadataClient {
    /// Client backed by an [`HttpFetcher`] built from `http`
    pub fn new(http: &HttpConfig, retry: RetryConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(http)?;
        Ok(Self::with_fetcher(
            Arc::new(fetcher),
            http.metadata_base_url.clone(),
            retry,
        ))
    }

    /// Client using an arbitrary fetch implementation
    pub fn with_fetcher(
        fetcher: Arc<dyn Fetch>,
        base_url: impl Into<String>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
            retry,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let body = with_retry(&self.retry, || self.fetcher.fetch(url)).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Survey/aggregate index
    pub async fn index(&self) -> Result<Vec<SurveyIndex>> {
        self.get_json(&endpoints::index_url(&self.base_url)).await
    }

    /// Raw listing of a collection
    pub async fn collection(&self, kind: CollectionKind) -> Result<serde_json::Value> {
        self.get_json(&endpoints::collection_url(&self.base_url, kind)?)
            .await
    }

    /// `metadados` document of an aggregate
    pub async fn metadata(&self, aggregate_id: u32) -> Result<AggregateMetadata> {
        self.get_json(&endpoints::metadata_url(&self.base_url, aggregate_id))
            .await
    }

    /// Periods of an aggregate
    pub async fn periods(&self, aggregate_id: u32) -> Result<Vec<Period>> {
        self.get_json(&endpoints::periods_url(&self.base_url, aggregate_id))
            .await
    }

    /// Localities of an aggregate at one territorial level
    pub async fn localities(&self, aggregate_id: u32, level: &str) -> Result<Vec<Locality>> {
        self.get_json(&endpoints::localities_url(
            &self.base_url,
            aggregate_id,
            level,
        ))
        .await
    }

    /// Fetch all three documents and assemble the aggregate
    ///
    /// Localities are requested once per territorial level the metadata declares.
    pub async fn aggregate(&self, survey_id: &str, aggregate_id: u32) -> Result<Aggregate> {
        let metadata = self.metadata(aggregate_id).await?;
        let periods = self.periods(aggregate_id).await?;

        let mut localities = Vec::new();
        for level in metadata.territorial_levels.all() {
            localities.extend(self.localities(aggregate_id, level).await?);
        }

        tracing::debug!(
            aggregate_id,
            periods = periods.len(),
            localities = localities.len(),
            "aggregate metadata loaded"
        );

        Ok(Aggregate::assemble(survey_id, metadata, periods, localities))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> MetadataClient {
        let http = HttpConfig {
            metadata_base_url: format!("{}/agregados", server.uri()),
            timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let retry = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            ..Default::default()
        };
        MetadataClient::new(&http, retry).unwrap()
    }

    async fn mount_json(server: &MockServer, route: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn aggregate_requests_localities_per_declared_level() {
        let server = MockServer::start().await;
        mount_json(
            &server,
            "/agregados/99/metadados",
            r#"{"id": 99, "nome": "Tabela", "nivelTerritorial": {"Administrativo": ["N1", "N3"]},
                "variaveis": [{"id": 1, "nome": "Pop", "unidade": "Pessoas"}], "classificacoes": []}"#,
        )
        .await;
        mount_json(
            &server,
            "/agregados/99/periodos",
            r#"[{"id": "2010", "literals": ["2010"], "modificacao": "01/06/2012"}]"#,
        )
        .await;
        mount_json(
            &server,
            "/agregados/99/localidades/N1",
            r#"[{"id": "1", "nome": "Brasil", "nivel": {"id": "N1", "nome": "Brasil"}}]"#,
        )
        .await;
        mount_json(
            &server,
            "/agregados/99/localidades/N3",
            r#"[{"id": "33", "nome": "RJ", "nivel": {"id": "N3", "nome": "UF"}},
                {"id": "35", "nome": "SP", "nivel": {"id": "N3", "nome": "UF"}}]"#,
        )
        .await;

        let aggregate = client(&server).aggregate("CD", 99).await.unwrap();

        assert_eq!(aggregate.id, 99);
        assert_eq!(aggregate.survey.id, "CD");
        assert_eq!(aggregate.periods.len(), 1);
        assert_eq!(aggregate.localities.len(), 3);
    }

    #[tokio::test]
    async fn collection_uses_acervo_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/agregados"))
            .and(query_param("acervo", "E"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"id": "anual"}]"#))
            .mount(&server)
            .await;

        let value = client(&server)
            .collection(CollectionKind::Periodicities)
            .await
            .unwrap();
        assert_eq!(value[0]["id"], "anual");
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/agregados"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_json(
            &server,
            "/agregados",
            r#"[{"id": "CD", "nome": "Censo", "agregados": []}]"#,
        )
        .await;

        let index = client(&server).index().await.unwrap();
        assert_eq!(index[0].id, "CD");
    }
}
