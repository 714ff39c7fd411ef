//! Interpretation of OData response payloads
//!
//! Splits control annotations (`@odata.*`, legacy `odata.*`, and per-property
//! `Field@...`) from attribute data for entity, entity-set and property bodies.

use crate::api::error::{ODataError, Result};
use crate::api::transport::{HttpResponse, ResponseBody};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Look up `@odata.<name>` or the legacy `odata.<name>` spelling
fn control(payload: &Map<String, Value>, name: &str) -> Option<Value> {
    payload
        .get(&format!("@odata.{}", name))
        .or_else(|| payload.get(&format!("odata.{}", name)))
        .cloned()
}

fn control_str(payload: &Map<String, Value>, name: &str) -> Option<String> {
    control(payload, name).and_then(|v| v.as_str().map(str::to_string))
}

fn is_annotation(key: &str) -> bool {
    key.starts_with('@') || key.starts_with("odata.") || key.contains('@')
}

/// Attribute keys of an entity payload with every annotation removed
pub fn entity_attributes(payload: &Map<String, Value>) -> Map<String, Value> {
    payload
        .iter()
        .filter(|(k, _)| !is_annotation(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Annotations of one entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityAnnotations {
    pub context: Option<String>,
    pub etag: Option<String>,
    pub id: Option<String>,
    pub type_name: Option<String>,
    pub read_link: Option<String>,
    pub edit_link: Option<String>,
    /// `Field@odata.navigationLink`, `Field@odata.count`, ... grouped by field
    pub properties: BTreeMap<String, Map<String, Value>>,
}

impl EntityAnnotations {
    pub fn from_payload(payload: &Map<String, Value>) -> Self {
        let mut properties: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
        for (key, value) in payload {
            let Some((field, annotation)) = key.split_once('@') else {
                continue;
            };
            if field.is_empty() {
                continue;
            }
            let annotation = annotation.strip_prefix("odata.").unwrap_or(annotation);
            properties
                .entry(field.to_string())
                .or_default()
                .insert(annotation.to_string(), value.clone());
        }
        Self {
            context: control_str(payload, "context"),
            etag: control_str(payload, "etag"),
            id: control_str(payload, "id"),
            type_name: control_str(payload, "type").map(|t| t.trim_start_matches('#').to_string()),
            read_link: control_str(payload, "readLink"),
            edit_link: control_str(payload, "editLink"),
            properties,
        }
    }

    /// Use `etag` when the payload itself carries none
    pub fn with_etag_fallback(mut self, etag: Option<&str>) -> Self {
        if self.etag.is_none() {
            self.etag = etag.map(str::to_string);
        }
        self
    }

    pub fn property(&self, field: &str, annotation: &str) -> Option<&Value> {
        self.properties.get(field).and_then(|a| a.get(annotation))
    }

    /// Server-reported size of a collection-valued navigation field
    pub fn property_count(&self, field: &str) -> Option<u64> {
        self.property(field, "count").and_then(Value::as_u64)
    }
}

/// Annotations of an entity collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntitiesAnnotations {
    pub context: Option<String>,
    pub count: Option<u64>,
    pub next_link: Option<String>,
    pub skiptoken: Option<String>,
    pub skip: Option<u64>,
    pub delta_link: Option<String>,
}

impl EntitiesAnnotations {
    pub fn from_payload(payload: &Map<String, Value>) -> Self {
        let count = control(payload, "count").and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        });
        let next_link = control_str(payload, "nextLink");
        let (skiptoken, skip) = next_link
            .as_deref()
            .map(paging_params)
            .unwrap_or((None, None));
        Self {
            context: control_str(payload, "context"),
            count,
            next_link,
            skiptoken,
            skip,
            delta_link: control_str(payload, "deltaLink"),
        }
    }
}

/// `$skiptoken` and `$skip` of a next link; relative links are resolved first
fn paging_params(link: &str) -> (Option<String>, Option<u64>) {
    let Ok(base) = reqwest::Url::parse("http://localhost/") else {
        return (None, None);
    };
    let Ok(url) = base.join(link) else {
        return (None, None);
    };
    let mut skiptoken = None;
    let mut skip = None;
    for (name, value) in url.query_pairs() {
        match name.as_ref() {
            "$skiptoken" => skiptoken = Some(value.into_owned()),
            "$skip" => skip = value.parse().ok(),
            _ => {}
        }
    }
    (skiptoken, skip)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyAnnotations {
    pub context: Option<String>,
    pub type_name: Option<String>,
}

impl PropertyAnnotations {
    pub fn from_payload(payload: &Map<String, Value>) -> Self {
        Self {
            context: control_str(payload, "context"),
            type_name: control_str(payload, "type").map(|t| t.trim_start_matches('#').to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityResponse {
    /// Raw entity payload (annotations included); `None` for empty bodies
    pub entity: Option<Map<String, Value>>,
    pub meta: EntityAnnotations,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntitiesResponse {
    pub entities: Vec<Map<String, Value>>,
    pub meta: EntitiesAnnotations,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyResponse {
    pub property: Option<Value>,
    pub meta: PropertyAnnotations,
}

impl HttpResponse {
    pub fn into_entity(self) -> Result<EntityResponse> {
        let etag = self.etag().map(str::to_string);
        match self.body {
            ResponseBody::Empty => Ok(EntityResponse {
                entity: None,
                meta: EntityAnnotations::default().with_etag_fallback(etag.as_deref()),
            }),
            ResponseBody::Json(Value::Object(map)) => Ok(EntityResponse {
                meta: EntityAnnotations::from_payload(&map).with_etag_fallback(etag.as_deref()),
                entity: Some(map),
            }),
            ResponseBody::Json(Value::Null) => Ok(EntityResponse {
                entity: None,
                meta: EntityAnnotations::default().with_etag_fallback(etag.as_deref()),
            }),
            other => Err(ODataError::payload(format!(
                "expected an entity object, got {:?}",
                other
            ))),
        }
    }

    pub fn into_entities(self) -> Result<EntitiesResponse> {
        match self.body {
            ResponseBody::Json(Value::Object(map)) => {
                let meta = EntitiesAnnotations::from_payload(&map);
                let entities = match map.get("value") {
                    Some(Value::Array(items)) => object_items(items)?,
                    _ => {
                        return Err(ODataError::payload(
                            "entity set payload has no 'value' array",
                        ));
                    }
                };
                Ok(EntitiesResponse { entities, meta })
            }
            ResponseBody::Json(Value::Array(items)) => Ok(EntitiesResponse {
                entities: object_items(&items)?,
                meta: EntitiesAnnotations::default(),
            }),
            ResponseBody::Empty => Ok(EntitiesResponse {
                entities: Vec::new(),
                meta: EntitiesAnnotations::default(),
            }),
            other => Err(ODataError::payload(format!(
                "expected an entity set, got {:?}",
                other
            ))),
        }
    }

    /// `{"value": ...}` wrapper, a bare complex object, or text for `$value`
    pub fn into_property(self) -> Result<PropertyResponse> {
        match self.body {
            ResponseBody::Json(Value::Object(mut map)) => {
                let meta = PropertyAnnotations::from_payload(&map);
                let property = match map.remove("value") {
                    Some(value) => Some(value),
                    None => Some(Value::Object(entity_attributes(&map))),
                };
                Ok(PropertyResponse { property, meta })
            }
            ResponseBody::Json(Value::Null) | ResponseBody::Empty => Ok(PropertyResponse {
                property: None,
                meta: PropertyAnnotations::default(),
            }),
            ResponseBody::Json(value) => Ok(PropertyResponse {
                property: Some(value),
                meta: PropertyAnnotations::default(),
            }),
            ResponseBody::Text(text) => Ok(PropertyResponse {
                property: Some(Value::String(text)),
                meta: PropertyAnnotations::default(),
            }),
        }
    }

    /// Plain-text `$count` body
    pub fn into_count(self) -> Result<u64> {
        let text = self.text();
        text.trim()
            .parse()
            .map_err(|_| ODataError::payload(format!("invalid count '{}'", text.trim())))
    }
}

fn object_items(items: &[Value]) -> Result<Vec<Map<String, Value>>> {
    items
        .iter()
        .map(|item| {
            item.as_object()
                .cloned()
                .ok_or_else(|| ODataError::payload("entity set item is not an object"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_annotations_split_from_attributes() {
        let payload = json!({
            "@odata.context": "$metadata#Products/$entity",
            "@odata.etag": "W/\"1\"",
            "ID": 1,
            "Name": "Chai",
            "Category@odata.navigationLink": "Products(1)/Category",
            "Tags@odata.count": 3
        });
        let map = payload.as_object().unwrap();
        let meta = EntityAnnotations::from_payload(map);
        assert_eq!(meta.etag.as_deref(), Some("W/\"1\""));
        assert_eq!(meta.property_count("Tags"), Some(3));
        assert_eq!(
            meta.property("Category", "navigationLink"),
            Some(&json!("Products(1)/Category"))
        );

        let attrs = entity_attributes(map);
        assert_eq!(attrs.len(), 2);
        assert!(attrs.contains_key("Name"));
    }

    #[test]
    fn test_legacy_annotation_spelling() {
        let payload = json!({"odata.etag": "W/\"2\"", "odata.type": "#Demo.Product", "ID": 1});
        let meta = EntityAnnotations::from_payload(payload.as_object().unwrap());
        assert_eq!(meta.etag.as_deref(), Some("W/\"2\""));
        assert_eq!(meta.type_name.as_deref(), Some("Demo.Product"));
    }

    #[test]
    fn test_etag_header_fallback() {
        let response = HttpResponse::json(200, json!({"ID": 1})).with_header("ETag", "W/\"9\"");
        let entity = response.into_entity().unwrap();
        assert_eq!(entity.meta.etag.as_deref(), Some("W/\"9\""));
    }

    #[test]
    fn test_entities_paging_annotations() {
        let response = HttpResponse::json(
            200,
            json!({
                "@odata.count": 25,
                "@odata.nextLink": "Products?$skiptoken=abc%3D&$top=10",
                "value": [{"ID": 1}, {"ID": 2}]
            }),
        );
        let entities = response.into_entities().unwrap();
        assert_eq!(entities.entities.len(), 2);
        assert_eq!(entities.meta.count, Some(25));
        assert_eq!(entities.meta.skiptoken.as_deref(), Some("abc="));

        let response = HttpResponse::json(
            200,
            json!({"@odata.nextLink": "https://host/svc/Products?$skip=20", "value": []}),
        );
        assert_eq!(response.into_entities().unwrap().meta.skip, Some(20));
    }

    #[test]
    fn test_property_shapes() {
        let wrapped = HttpResponse::json(200, json!({"@odata.context": "x", "value": "Chai"}));
        assert_eq!(wrapped.into_property().unwrap().property, Some(json!("Chai")));

        let complex = HttpResponse::json(200, json!({"@odata.context": "x", "City": "Oslo"}));
        assert_eq!(
            complex.into_property().unwrap().property,
            Some(json!({"City": "Oslo"}))
        );

        let text = HttpResponse::new(200, ResponseBody::Text("42".to_string()));
        assert_eq!(text.into_count().unwrap(), 42);
    }

    #[test]
    fn test_entities_rejects_non_objects() {
        let response = HttpResponse::json(200, json!({"value": [1, 2]}));
        assert!(matches!(response.into_entities(), Err(ODataError::Payload(_))));
    }
}
