//! Entity collections and paging
//!
//! Page state is derived from server annotations only: the record count comes
//! from `@odata.count`, the page size is either set explicitly or taken from
//! the first page the server returned.

use super::Model;
use crate::api::error::{ODataError, Result};
use crate::api::query::{QueryOption, QueryOptions};
use crate::api::resource::{RequestOptions, Resource};
use crate::api::response::{EntitiesAnnotations, EntitiesResponse, EntityAnnotations};
use log::debug;
use serde_json::{Map, Value, json};

/// Paging counters of a collection; `page` is 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageState {
    pub records: Option<u64>,
    pub size: Option<u64>,
    pub page: u64,
    pub pages: Option<u64>,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            records: None,
            size: None,
            page: 1,
            pages: None,
        }
    }
}

impl PageState {
    fn recompute(&mut self) {
        self.pages = match (self.records, self.size) {
            (Some(records), Some(size)) if size > 0 => Some(records.div_ceil(size)),
            _ => None,
        };
        self.page = self.clamp(self.page);
    }

    fn clamp(&self, page: u64) -> u64 {
        match self.pages {
            Some(pages) if pages > 0 => page.clamp(1, pages),
            _ => page.max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Collection {
    resource: Resource,
    models: Vec<Model>,
    meta: EntitiesAnnotations,
    state: PageState,
}

impl Collection {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            models: Vec::new(),
            meta: EntitiesAnnotations::default(),
            state: PageState::default(),
        }
    }

    fn wrap(&self, payload: Map<String, Value>) -> Result<Model> {
        let mut model = Model::with_resource(self.resource.clone())?;
        let meta = EntityAnnotations::from_payload(&payload);
        model.populate(payload, meta)?;
        Ok(model)
    }

    /// Replace the items with an entity set response and refresh page state
    pub fn assign(&mut self, response: EntitiesResponse) -> Result<()> {
        let models = response
            .entities
            .into_iter()
            .map(|entity| self.wrap(entity))
            .collect::<Result<Vec<_>>>()?;
        let observed = models.len() as u64;
        self.models = models;
        if response.meta.count.is_some() {
            self.state.records = response.meta.count;
        }
        if self.state.size.is_none() && observed > 0 {
            self.state.size = Some(observed);
        }
        self.meta = response.meta;
        self.state.recompute();
        Ok(())
    }

    /// Replace the items with inline values (expanded navigation or complex collection)
    pub fn assign_values(&mut self, items: Vec<Value>, count: Option<u64>) -> Result<()> {
        let entities = items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map),
                other => Err(ODataError::payload(format!(
                    "collection item is not an object: {}",
                    other
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        let meta = EntitiesAnnotations {
            count,
            ..EntitiesAnnotations::default()
        };
        self.assign(EntitiesResponse { entities, meta })
    }

    /// Request the current page, or everything the server returns when no
    /// page size is known yet
    pub async fn fetch(&mut self, options: RequestOptions) -> Result<()> {
        self.fetch_page(self.state.page, options).await
    }

    async fn fetch_page(&mut self, page: u64, options: RequestOptions) -> Result<()> {
        let mut resource = self.resource.clone();
        if let Some(size) = self.state.size.filter(|s| *s > 0) {
            let query = resource.query();
            query.option(QueryOption::Top).assign(json!(size));
            let skip = size.checked_mul(page.saturating_sub(1)).ok_or_else(|| {
                ODataError::configuration(format!(
                    "page {} of size {} is out of range",
                    page, size
                ))
            })?;
            query.option(QueryOption::Skip).assign(json!(skip));
        }
        debug!("Fetching page {} of {}", page, resource.path());
        let response = resource.fetch_entities(options.with_count()).await?;
        self.assign(response)?;
        self.state.page = self.state.clamp(page);
        Ok(())
    }

    /// Move to page `page` (clamped to the known bounds) and fetch it
    pub async fn get_page(&mut self, page: u64, options: RequestOptions) -> Result<()> {
        if self.state.size.is_none() {
            return self.fetch_page(1, options).await;
        }
        let page = self.state.clamp(page);
        self.fetch_page(page, options).await
    }

    pub async fn first_page(&mut self, options: RequestOptions) -> Result<()> {
        self.get_page(1, options).await
    }

    pub async fn previous_page(&mut self, options: RequestOptions) -> Result<()> {
        self.get_page(self.state.page.saturating_sub(1), options).await
    }

    pub async fn next_page(&mut self, options: RequestOptions) -> Result<()> {
        self.get_page(self.state.page.saturating_add(1), options).await
    }

    pub async fn last_page(&mut self, options: RequestOptions) -> Result<()> {
        let last = self.state.pages.unwrap_or(self.state.page);
        self.get_page(last, options).await
    }

    /// Change the page size; 0 removes it. The page index is clamped down
    /// when the page count shrinks.
    pub fn set_page_size(&mut self, size: u64) {
        self.state.size = (size > 0).then_some(size);
        self.state.recompute();
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Query options used by the next fetch
    pub fn query(&mut self) -> &mut QueryOptions {
        self.resource.query()
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn models_mut(&mut self) -> &mut [Model] {
        &mut self.models
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Model> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn meta(&self) -> &EntitiesAnnotations {
        &self.meta
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn page(&self) -> u64 {
        self.state.page
    }

    pub fn page_size(&self) -> Option<u64> {
        self.state.size
    }

    pub fn pages(&self) -> Option<u64> {
        self.state.pages
    }

    pub fn records(&self) -> Option<u64> {
        self.state.records
    }

    pub fn to_entities(&self) -> Vec<Map<String, Value>> {
        self.models.iter().map(Model::to_entity).collect()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Model;
    type IntoIter = std::slice::Iter<'a, Model>;

    fn into_iter(self) -> Self::IntoIter {
        self.models.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixture_client;

    fn products_page(ids: std::ops::Range<u64>, count: Option<u64>) -> EntitiesResponse {
        let entities = ids
            .map(|id| json!({"ID": id, "Name": format!("P{}", id)}).as_object().cloned().unwrap())
            .collect();
        EntitiesResponse {
            entities,
            meta: EntitiesAnnotations {
                count,
                ..EntitiesAnnotations::default()
            },
        }
    }

    fn collection() -> (Collection, std::sync::Arc<crate::testing::MockTransport>) {
        let (client, transport) = fixture_client();
        let resource = client.entity_set("Products", "Demo.Product").unwrap();
        (Collection::new(resource), transport)
    }

    #[test]
    fn test_assign_derives_page_state() {
        let (mut collection, _) = collection();
        collection.assign(products_page(1..11, Some(25))).unwrap();

        assert_eq!(collection.len(), 10);
        assert_eq!(collection.records(), Some(25));
        assert_eq!(collection.page_size(), Some(10));
        assert_eq!(collection.pages(), Some(3));
        assert_eq!(collection.models()[2].key(), Some(json!(3)));
    }

    #[test]
    fn test_records_kept_when_count_missing() {
        let (mut collection, _) = collection();
        collection.assign(products_page(1..6, Some(12))).unwrap();
        collection.assign(products_page(6..11, None)).unwrap();
        assert_eq!(collection.records(), Some(12));
        assert_eq!(collection.pages(), Some(3));
    }

    #[test]
    fn test_no_count_no_pages() {
        let (mut collection, _) = collection();
        collection.assign(products_page(1..4, None)).unwrap();
        assert_eq!(collection.records(), None);
        assert_eq!(collection.pages(), None);
    }

    #[test]
    fn test_set_page_size_clamps_page() {
        let mut state = PageState {
            records: Some(25),
            size: Some(5),
            page: 5,
            pages: Some(5),
        };
        state.size = Some(10);
        state.recompute();
        assert_eq!(state.pages, Some(3));
        assert_eq!(state.page, 3);
    }

    #[tokio::test]
    async fn test_page_size_and_clamped_get_page() {
        let (mut collection, transport) = collection();
        collection.assign(products_page(1..6, Some(25))).unwrap();
        collection.set_page_size(10);
        assert_eq!(collection.pages(), Some(3));

        transport.respond_json(json!({"@odata.count": 25, "value": [{"ID": 21}, {"ID": 22}]}));
        collection.get_page(5, RequestOptions::new()).await.unwrap();

        assert_eq!(collection.page(), 3);
        let request = &transport.requests()[0];
        assert_eq!(request.params.get("$top"), Some("10"));
        assert_eq!(request.params.get("$skip"), Some("20"));
        assert_eq!(request.params.get("$count"), Some("true"));
        assert_eq!(collection.len(), 2);
    }

    #[tokio::test]
    async fn test_last_page_skip() {
        let (mut collection, transport) = collection();
        collection.assign(products_page(1..8, Some(30))).unwrap();
        assert_eq!(collection.pages(), Some(5));

        transport.respond_json(json!({"@odata.count": 30, "value": [{"ID": 29}, {"ID": 30}]}));
        collection.last_page(RequestOptions::new()).await.unwrap();
        let request = &transport.requests()[0];
        assert_eq!(request.params.get("$skip"), Some("28"));
        assert_eq!(collection.page(), 5);
    }

    #[tokio::test]
    async fn test_fetch_without_size_is_unpaginated() {
        let (mut collection, transport) = collection();
        transport.respond_json(json!({"value": [{"ID": 1}, {"ID": 2}]}));
        collection.next_page(RequestOptions::new()).await.unwrap();

        let request = &transport.requests()[0];
        assert_eq!(request.params.get("$top"), None);
        assert_eq!(request.params.get("$skip"), None);
        assert_eq!(collection.page(), 1);
        assert_eq!(collection.page_size(), Some(2));
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_page() {
        let (mut collection, transport) = collection();
        collection.assign(products_page(1..11, Some(25))).unwrap();
        transport.respond_status(500, "boom");

        assert!(collection.next_page(RequestOptions::new()).await.is_err());
        assert_eq!(collection.page(), 1);
        assert_eq!(collection.len(), 10);
    }

    #[tokio::test]
    async fn test_huge_page_does_not_overflow() {
        let (mut collection, transport) = collection();
        collection.set_page_size(10);
        assert!(matches!(
            collection.get_page(u64::MAX, RequestOptions::new()).await,
            Err(ODataError::Configuration(_))
        ));

        collection.state.page = u64::MAX;
        assert!(matches!(
            collection.next_page(RequestOptions::new()).await,
            Err(ODataError::Configuration(_))
        ));
        assert!(transport.requests().is_empty());
        assert_eq!(collection.page(), u64::MAX);
    }

    #[test]
    fn test_assign_values_rejects_scalars() {
        let (mut collection, _) = collection();
        assert!(matches!(
            collection.assign_values(vec![json!(1)], None),
            Err(ODataError::Payload(_))
        ));
        collection
            .assign_values(vec![json!({"ID": 1}), json!({"ID": 2})], Some(7))
            .unwrap();
        assert_eq!(collection.records(), Some(7));
        assert_eq!(collection.to_entities().len(), 2);
    }
}
