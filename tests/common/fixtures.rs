//! Mock IBGE services
//!
//! Survey "XX" publishes two aggregates:
//! - 101: levels N1 (1 locality) and N3 (2 localities), 2 variables, one
//!   classification with 3 categories, 2 periods. 18 rows per period.
//! - 202: level N1, 1 variable, one classification with 25 categories.
//!   25 rows per (period, locality, variable).

use serde_json::{Value, json};
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Values file body served for aggregate 101
pub const VALUES_BODY: &str = r#"[{"NC":"Nível Territorial (Código)","V":"Valor"},{"NC":"1","V":"42"}]"#;

/// Data files the fixture service yields for aggregate 101
pub const AGGREGATE_101_DATA_FILES: [&str; 2] = [
    "000101/101_2019_20200110.json",
    "000101/101_2020_20210115.json",
];

/// Tasks a first run over the fixture service queues:
/// index, 6 collections, 2 metadata, 3 localities, 2 periods, 2 values
pub const FIRST_RUN_TASKS: u64 = 1 + 6 + 2 + 3 + 2 + 2;

pub fn index() -> Value {
    json!([{
        "id": "XX",
        "nome": "Pesquisa de teste",
        "agregados": [
            {"id": "101", "nome": "Tabela pequena"},
            {"id": "202", "nome": "Tabela grande"}
        ]
    }])
}

pub fn metadata_101() -> Value {
    json!({
        "id": 101,
        "nome": "Tabela pequena",
        "URL": "https://sidra.ibge.gov.br/tabela/101",
        "pesquisa": "Pesquisa de teste",
        "assunto": "Teste",
        "periodicidade": {"frequencia": "anual", "inicio": 2019, "fim": 2020},
        "nivelTerritorial": {"Administrativo": ["N1", "N3"], "Especial": [], "IBGE": []},
        "variaveis": [
            {"id": 93, "nome": "População", "unidade": "Pessoas", "sumarizacao": []},
            {"id": 1000093, "nome": "População - percentual", "unidade": "%", "sumarizacao": []}
        ],
        "classificacoes": [{
            "id": 2,
            "nome": "Sexo",
            "sumarizacao": {"status": true, "excecao": []},
            "categorias": [
                {"id": 0, "nome": "Total", "unidade": null, "nivel": 0},
                {"id": 4, "nome": "Homens", "unidade": null, "nivel": 1},
                {"id": 5, "nome": "Mulheres", "unidade": null, "nivel": 1}
            ]
        }]
    })
}

pub fn metadata_202() -> Value {
    let categories: Vec<Value> = (0..25)
        .map(|id| json!({"id": id, "nome": format!("Categoria {id}"), "unidade": null, "nivel": 1}))
        .collect();
    json!({
        "id": 202,
        "nome": "Tabela grande",
        "pesquisa": "Pesquisa de teste",
        "periodicidade": {"frequencia": "anual", "inicio": 2020, "fim": 2020},
        "nivelTerritorial": {"Administrativo": ["N1"], "Especial": [], "IBGE": []},
        "variaveis": [{"id": 1, "nome": "Valor", "unidade": "Mil Reais", "sumarizacao": []}],
        "classificacoes": [{
            "id": 9,
            "nome": "Produto",
            "sumarizacao": {"status": false, "excecao": []},
            "categorias": categories
        }]
    })
}

pub fn periods_101() -> Value {
    json!([
        {"id": "2019", "literals": ["2019"], "modificacao": "10/01/2020"},
        {"id": "2020", "literals": ["2020"], "modificacao": "15/01/2021"}
    ])
}

pub fn periods_202() -> Value {
    json!([{"id": "2020", "literals": ["2020"], "modificacao": "01/06/2021"}])
}

fn brasil() -> Value {
    json!([{"id": "1", "nome": "Brasil", "nivel": {"id": "N1", "nome": "Brasil"}}])
}

fn states() -> Value {
    json!([
        {"id": "33", "nome": "Rio de Janeiro", "nivel": {"id": "N3", "nome": "Unidade da Federação"}},
        {"id": "35", "nome": "São Paulo", "nivel": {"id": "N3", "nome": "Unidade da Federação"}}
    ])
}

async fn mount_json(server: &MockServer, route: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mount the metadata service under `/agregados`
pub async fn mount_metadata_service(server: &MockServer) {
    mount_json(server, "/agregados", index()).await;
    for code in ["A", "C", "N", "P", "E", "V"] {
        Mock::given(method("GET"))
            .and(path("/agregados"))
            .and(query_param("acervo", code))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": format!("{code}1"), "nome": format!("Acervo {code}")}
            ])))
            .with_priority(1)
            .mount(server)
            .await;
    }

    mount_json(server, "/agregados/101/metadados", metadata_101()).await;
    mount_json(server, "/agregados/101/periodos", periods_101()).await;
    mount_json(server, "/agregados/101/localidades/N1", brasil()).await;
    mount_json(server, "/agregados/101/localidades/N3", states()).await;

    mount_json(server, "/agregados/202/metadados", metadata_202()).await;
    mount_json(server, "/agregados/202/periodos", periods_202()).await;
    mount_json(server, "/agregados/202/localidades/N1", brasil()).await;
}

/// Mount the values service under `/values`
///
/// Aggregate 202 must never be requested.
pub async fn mount_values_service(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/values/t/101/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(VALUES_BODY))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/values/t/202/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(VALUES_BODY))
        .expect(0)
        .mount(server)
        .await;
}

/// Mock server with both services mounted
pub async fn sidra_service() -> MockServer {
    let server = MockServer::start().await;
    mount_metadata_service(&server).await;
    mount_values_service(&server).await;
    server
}

/// Number of requests the server has seen so far
pub async fn request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|requests| requests.len())
        .unwrap_or(0)
}
