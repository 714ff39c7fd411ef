//! Resource command handlers: url, get, count

use anyhow::{Context, Result};
use colored::*;
use serde_json::{Map, Value, json};
use std::fs;
use std::time::Instant;

use super::{OutputFormat, ResourceArgs, ResourceCommands};
use crate::api::{ODataClient, RequestOptions, Resource, ResourceKind};

/// Handle a resource command against `client`
pub async fn handle_resource_command(client: &ODataClient, command: ResourceCommands) -> Result<()> {
    match command {
        ResourceCommands::Url { resource } => {
            let resource = build_resource(client, &resource)?;
            println!("{}", request_url(client, &resource));
            Ok(())
        }
        ResourceCommands::Get {
            resource,
            format,
            all,
            output,
        } => {
            let resource = build_resource(client, &resource)?;
            let start = Instant::now();
            let data = fetch_data(&resource, all).await?;
            log::info!(
                "Fetched {} in {:.2}ms",
                resource.path(),
                start.elapsed().as_secs_f64() * 1000.0
            );

            let formatted = format_output(&data, format)?;
            if let Some(output_path) = output {
                fs::write(&output_path, &formatted).with_context(|| {
                    format!("Failed to write output to: {}", output_path.display())
                })?;
                println!(
                    "Results saved to: {}",
                    output_path.display().to_string().bright_green()
                );
            } else {
                println!("{}", formatted);
            }
            Ok(())
        }
        ResourceCommands::Count { resource } => {
            let resource = build_resource(client, &resource)?;
            let count = resource
                .fetch_count(RequestOptions::new())
                .await
                .with_context(|| format!("Failed to count {}", resource.path()))?;
            println!("{}", count.to_string().bold());
            Ok(())
        }
    }
}

/// Absolute URL including the query string, as it would be requested
pub fn request_url(client: &ODataClient, resource: &Resource) -> String {
    format!("{}{}", client.service_root_url(), resource)
}

/// JSON when the text parses as JSON, otherwise the text as a string
fn parse_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Build a resource from command-line flags
pub fn build_resource(client: &ODataClient, args: &ResourceArgs) -> Result<Resource> {
    let type_name = match &args.type_name {
        Some(type_name) => type_name.clone(),
        None => client
            .registry()
            .type_for_set(&args.entity_set)
            .with_context(|| {
                format!(
                    "No type configured for entity set '{}'; pass --type or add a schema",
                    args.entity_set
                )
            })?,
    };

    let mut resource = client.entity_set(&args.entity_set, &type_name)?;
    if let Some(key) = &args.key {
        resource = resource
            .entity(parse_value(key))
            .with_context(|| format!("Invalid key: {}", key))?;
    }
    for nav in &args.nav {
        resource = resource
            .navigation_property(nav)
            .with_context(|| format!("Cannot navigate to '{}'", nav))?;
    }

    if let Some(select) = &args.select {
        let fields: Vec<&str> = select.split(',').map(str::trim).collect();
        resource = resource.select(json!(fields));
    }
    if let Some(filter) = &args.filter {
        resource = resource.filter(parse_value(filter));
    }
    if let Some(search) = &args.search {
        resource = resource.search(search.as_str());
    }
    if let Some(order_by) = &args.order_by {
        resource = resource.order_by(order_by.as_str());
    }
    if let Some(expand) = &args.expand {
        resource = resource.expand(parse_value(expand));
    }
    if let Some(top) = args.top {
        resource = resource.top(top);
    }
    if let Some(skip) = args.skip {
        resource = resource.skip(skip);
    }
    for param in &args.params {
        let (name, value) = param
            .split_once('=')
            .with_context(|| format!("Custom parameter must be name=value: {}", param))?;
        resource = resource.custom(name, value);
    }
    Ok(resource)
}

async fn fetch_data(resource: &Resource, all: bool) -> Result<Value> {
    let options = RequestOptions::new();
    let context = || format!("Failed to fetch {}", resource.path());

    if resource.is_collection() && resource.kind() != ResourceKind::Property {
        let entities = if all {
            resource.fetch_all(options).await.with_context(context)?
        } else {
            resource
                .fetch_entities(options)
                .await
                .with_context(context)?
                .entities
        };
        return Ok(Value::Array(entities.into_iter().map(Value::Object).collect()));
    }

    match resource.kind() {
        ResourceKind::Property => {
            let response = resource.fetch_property(options).await.with_context(context)?;
            Ok(response.property.unwrap_or(Value::Null))
        }
        _ => {
            let response = resource.fetch_entity(options).await.with_context(context)?;
            Ok(response
                .entity
                .map(|e| Value::Object(crate::api::response::entity_attributes(&e)))
                .unwrap_or(Value::Null))
        }
    }
}

/// Format results according to the requested output format
pub fn format_output(data: &Value, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(data).context("Failed to format JSON output"),
        OutputFormat::JsonCompact => serde_json::to_string(data).context("Failed to format JSON output"),
        OutputFormat::Csv => json_to_csv(data),
    }
}

fn json_to_csv(data: &Value) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    match data {
        Value::Array(rows) => {
            if rows.is_empty() {
                return Ok("No data\n".to_string());
            }
            let headers = csv_headers(rows);
            writer
                .write_record(&headers)
                .context("Failed to write CSV header")?;
            let empty = Map::new();
            for row in rows {
                let object = row.as_object().unwrap_or(&empty);
                let record: Vec<String> = headers
                    .iter()
                    .map(|h| value_to_string(object.get(h).unwrap_or(&Value::Null)))
                    .collect();
                writer.write_record(&record).context("Failed to write CSV row")?;
            }
        }
        Value::Object(object) => {
            writer
                .write_record(["key", "value"])
                .context("Failed to write CSV header")?;
            for (key, value) in object {
                writer
                    .write_record([key.as_str(), value_to_string(value).as_str()])
                    .context("Failed to write CSV row")?;
            }
        }
        other => {
            writer.write_record(["value"]).context("Failed to write CSV header")?;
            writer
                .write_record([value_to_string(other)])
                .context("Failed to write CSV row")?;
        }
    }
    let bytes = writer.into_inner().context("Failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

/// Union of the row keys in first-seen order
fn csv_headers(rows: &[Value]) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for row in rows {
        if let Value::Object(object) = row {
            for key in object.keys() {
                if !headers.contains(key) {
                    headers.push(key.clone());
                }
            }
        }
    }
    headers
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixture_client;

    fn args(entity_set: &str) -> ResourceArgs {
        ResourceArgs {
            entity_set: entity_set.to_string(),
            ..ResourceArgs::default()
        }
    }

    #[test]
    fn test_build_resource_from_flags() {
        let (client, _) = fixture_client();
        let args = ResourceArgs {
            select: Some("Name, Price".to_string()),
            filter: Some(r#"{"Price": {"gt": 5}}"#.to_string()),
            top: Some(10),
            params: vec!["sap-client=100".to_string()],
            ..args("Products")
        };
        let resource = build_resource(&client, &args).unwrap();
        let (path, params) = resource.path_and_params();
        assert_eq!(path, "Products");
        assert_eq!(params.get("$select"), Some("Name,Price"));
        assert_eq!(params.get("$filter"), Some("Price gt 5"));
        assert_eq!(params.get("$top"), Some("10"));
        assert_eq!(params.get("sap-client"), Some("100"));
    }

    #[test]
    fn test_build_keyed_navigation() {
        let (client, _) = fixture_client();
        let args = ResourceArgs {
            key: Some("bev".to_string()),
            nav: vec!["Products".to_string()],
            ..args("Categories")
        };
        let resource = build_resource(&client, &args).unwrap();
        assert_eq!(
            request_url(&client, &resource),
            "https://example.org/odata/Categories('bev')/Products"
        );
    }

    #[test]
    fn test_unknown_entity_set_needs_type() {
        let (client, _) = fixture_client();
        let err = build_resource(&client, &args("Nope")).unwrap_err();
        assert!(err.to_string().contains("--type"));

        let bad_param = ResourceArgs {
            params: vec!["novalue".to_string()],
            ..args("Products")
        };
        assert!(build_resource(&client, &bad_param).is_err());
    }

    #[test]
    fn test_csv_output_unions_headers() {
        let data = json!([{"ID": 1, "Name": "a, b"}, {"ID": 2, "Price": 3.5}]);
        let csv = format_output(&data, OutputFormat::Csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "ID,Name,Price");
        assert_eq!(lines[1], "1,\"a, b\",");
        assert_eq!(lines[2], "2,,3.5");

        let single = format_output(&json!({"ID": 1}), OutputFormat::Csv).unwrap();
        assert_eq!(single, "key,value\nID,1\n");
    }

    #[tokio::test]
    async fn test_fetch_data_shapes() {
        let (client, transport) = fixture_client();
        transport.respond_json(json!({"value": [{"ID": 1}]}));
        transport.respond_json(json!({"@odata.etag": "W/\"1\"", "ID": 1, "Name": "Chai"}));

        let products = build_resource(&client, &args("Products")).unwrap();
        assert_eq!(fetch_data(&products, false).await.unwrap(), json!([{"ID": 1}]));

        let one = products.entity(json!(1)).unwrap();
        assert_eq!(
            fetch_data(&one, false).await.unwrap(),
            json!({"ID": 1, "Name": "Chai"})
        );
    }
}
