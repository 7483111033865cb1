use std::cell::RefCell;

use metriclens::{
    ClientConfig, MetricsClient, MetricsError, QueryRequest, SqlApiWarehouse, Transport,
    WarehouseConfig,
};
use reqwest::header::HeaderMap;
use serde_json::{json, Value};

/// In-memory stand-in for the remote service: canned JSON bodies keyed
/// by URL substring, first registered match wins.
struct FakeService {
    responses: Vec<(String, Value)>,
    calls: RefCell<Vec<String>>,
}

impl FakeService {
    fn new() -> Self {
        Self {
            responses: Vec::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    fn respond(mut self, url_part: &str, body: Value) -> Self {
        self.responses.push((url_part.to_string(), body));
        self
    }

    fn lookup(&self, url: &str) -> metriclens::Result<Value> {
        self.calls.borrow_mut().push(url.to_string());
        self.responses
            .iter()
            .find(|(part, _)| url.contains(part.as_str()))
            .map(|(_, body)| body.clone())
            .ok_or_else(|| MetricsError::Decode(format!("no canned response for {}", url)))
    }
}

impl Transport for FakeService {
    fn get(&self, url: &str, _headers: HeaderMap) -> metriclens::Result<Value> {
        self.lookup(url)
    }

    fn post_json(&self, url: &str, _headers: HeaderMap, _body: &Value) -> metriclens::Result<Value> {
        self.lookup(url)
    }
}

/// Three catalogs: customers and orders load cleanly, legacy reports an
/// error status and must be skipped. Metadata entries are registered
/// before the bare listing path so the substring lookup stays specific.
fn service() -> FakeService {
    FakeService::new()
        .respond(
            "/dataCatalog/customers/metadata",
            json!({
                "status": "ok",
                "results": {
                    "name": "customers",
                    "label": "Customers",
                    "fields": [
                        {"name": "lifetime_value", "fieldType": "metric", "basicType": "numeric"},
                        {"name": "region", "fieldType": "dimension", "basicType": "string"}
                    ],
                    "joinedTables": []
                }
            }),
        )
        .respond(
            "/dataCatalog/legacy/metadata",
            json!({"status": "error", "error": {"name": "CompileError"}}),
        )
        .respond(
            "/dataCatalog/orders/metadata",
            json!({
                "status": "ok",
                "results": {
                    "name": "orders",
                    "label": "Orders",
                    "fields": [
                        {"name": "revenue", "fieldType": "metric", "basicType": "numeric",
                         "description": "Total revenue"},
                        {"name": "status", "fieldType": "dimension", "basicType": "string"}
                    ],
                    "joinedTables": ["customers"]
                }
            }),
        )
        .respond(
            "/dataCatalog",
            json!({"results": [
                {"name": "orders"},
                {"name": "customers"},
                {"name": "legacy"}
            ]}),
        )
        .respond(
            "/explores/orders/compileQuery",
            json!({
                "status": "ok",
                "results": "SELECT CUSTOMERS_REGION, ORDERS_REVENUE FROM ORDERS LIMIT 1"
            }),
        )
}

fn connect() -> MetricsClient<FakeService> {
    let config = ClientConfig::new("https://metrics.example.com", "token", "proj");
    MetricsClient::connect(config, service()).unwrap()
}

#[test]
fn test_connect_sorts_names_and_skips_failed_catalogs() {
    let client = connect();

    let names: Vec<&str> = client.catalogs().iter().map(String::as_str).collect();
    assert_eq!(names, vec!["customers", "legacy", "orders"]);

    // legacy contributes no rows; the two healthy catalogs contribute
    // two fields each.
    let frame = client.fields();
    assert_eq!(frame.height(), 4);
    let catalogs: Vec<Option<&str>> = frame
        .column("catalog_name")
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(
        catalogs,
        vec![
            Some("customers"),
            Some("customers"),
            Some("orders"),
            Some("orders")
        ]
    );
}

#[test]
fn test_index_reads_over_the_loaded_frame() {
    let client = connect();

    let metrics = client.all_metrics().unwrap();
    let names: Vec<Option<&str>> = metrics
        .column("field_name")
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(names, vec![Some("lifetime_value"), Some("revenue")]);

    let detail = client.metric_detail("revenue").unwrap();
    assert_eq!(detail.len(), 1);
    assert_eq!(detail[0]["field_description"], json!("Total revenue"));

    // orders joins customers, so both catalogs' dimensions qualify.
    let dimensions = client.dimensions_for_metric("revenue").unwrap();
    let names: Vec<Option<&str>> = dimensions
        .column("field_name")
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(names, vec![Some("region"), Some("status")]);

    let err = client.dimensions_for_metric("nope").unwrap_err();
    assert!(matches!(err, MetricsError::NotFound(_)));
}

#[test]
fn test_compile_and_execute_flow() {
    let client = connect();

    let request = QueryRequest::for_metrics(["revenue"]).with_dimensions(["region"]);
    let compiled = client.build_query(&request).unwrap();
    assert_eq!(
        compiled.query(),
        "select customers_region, orders_revenue from orders "
    );
    assert_eq!(compiled.catalog(), "orders");

    let statements = FakeService::new().respond(
        "/api/v2/statements",
        json!({
            "resultSetMetaData": {"rowType": [{"name": "CUSTOMERS_REGION"}, {"name": "ORDERS_REVENUE"}]},
            "data": [["emea", "10.5"]]
        }),
    );
    let warehouse = SqlApiWarehouse::new(statements);
    let warehouse_config = WarehouseConfig {
        account: "acme-test".into(),
        user: "svc@example.com".into(),
        password: "token".into(),
        database: "ANALYTICS".into(),
        warehouse: "COMPUTE_WH".into(),
        role: "REPORTER".into(),
    };

    let frame = compiled.execute_on(&warehouse, &warehouse_config).unwrap();
    assert_eq!(frame.height(), 1);
    assert_eq!(
        frame.get_column_names(),
        vec!["CUSTOMERS_REGION", "ORDERS_REVENUE"]
    );
}

#[test]
fn test_cross_catalog_query_is_rejected_locally() {
    let client = connect();

    let request = QueryRequest::for_metrics(["revenue", "lifetime_value"]);
    let err = client.build_query(&request).unwrap_err();
    assert!(matches!(err, MetricsError::CrossCatalog(_)));
}
