//! CRM source client
//!
//! Deals and companies are read through the CRM search endpoints, which
//! filter server-side by modification time and page with an opaque `after`
//! token. Deals are additionally limited to won deals closed inside the
//! lookback window and enriched with their primary company.

use super::catalog::CRM_ENTITIES;
use super::types::{EntitySpec, PageResponse, SourceClient};
use crate::error::Result;
use crate::http::{HttpClient, RequestConfig};
use crate::pagination::{AfterCursorPaginator, Paginator};
use crate::types::{id_string, JsonObject, JsonValue, Source};
use async_trait::async_trait;
use chrono::{DateTime, Months, Utc};
use serde_json::json;
use tracing::{debug, warn};

/// Properties requested for deals
pub const DEAL_PROPERTIES: &[&str] = &[
    "dealname",
    "amount",
    "implementation_cost",
    "daily_routes",
    "closedate",
    "createdate",
    "dealstage",
    "pipeline",
    "hs_lastmodifieddate",
];

/// Properties requested for companies
pub const COMPANY_PROPERTIES: &[&str] = &[
    "name",
    "domain",
    "current_business_management_software__cloned_",
    "createdate",
    "hs_lastmodifieddate",
];

/// Tunables of the CRM client
#[derive(Debug, Clone)]
pub struct CrmSettings {
    pub page_size: u32,
    /// Initial-sync window and close-date window, in months
    pub lookback_months: u32,
    /// Deal stage that marks a won deal
    pub won_stage: String,
    /// Account id used to build record URLs
    pub portal_id: Option<String>,
    /// Look up each deal's company
    pub resolve_associations: bool,
}

impl Default for CrmSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            lookback_months: 18,
            won_stage: "closedwon".to_string(),
            portal_id: None,
            resolve_associations: true,
        }
    }
}

/// CRM API client
#[derive(Debug)]
pub struct CrmClient {
    http: HttpClient,
    settings: CrmSettings,
    /// Instant the close-date window is measured from
    reference_time: DateTime<Utc>,
}

impl CrmClient {
    pub fn new(http: HttpClient, settings: CrmSettings) -> Self {
        Self {
            http,
            settings,
            reference_time: Utc::now(),
        }
    }

    /// Pin the instant the close-date window is measured from
    pub fn with_reference_time(mut self, reference_time: DateTime<Utc>) -> Self {
        self.reference_time = reference_time;
        self
    }

    fn months_back(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        from.checked_sub_months(Months::new(self.settings.lookback_months))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Request body of a search page
    pub fn search_body(
        &self,
        entity: &EntitySpec,
        since: Option<DateTime<Utc>>,
        params: JsonObject,
    ) -> JsonValue {
        let mut filters = Vec::new();
        if let Some(since) = since {
            filters.push(json!({
                "propertyName": "hs_lastmodifieddate",
                "operator": "GTE",
                "value": since.timestamp_millis().to_string(),
            }));
        }

        let properties = if entity.name == "deals" {
            let close_cutoff = self.months_back(self.reference_time);
            filters.push(json!({
                "propertyName": "closedate",
                "operator": "GTE",
                "value": close_cutoff.timestamp_millis().to_string(),
            }));
            filters.push(json!({
                "propertyName": "dealstage",
                "operator": "EQ",
                "value": self.settings.won_stage,
            }));
            DEAL_PROPERTIES
        } else {
            COMPANY_PROPERTIES
        };

        let mut body = JsonObject::new();
        if !filters.is_empty() {
            body.insert("filterGroups".into(), json!([{ "filters": filters }]));
        }
        body.insert(
            "sorts".into(),
            json!([{ "propertyName": "hs_lastmodifieddate", "direction": "ASCENDING" }]),
        );
        body.insert("properties".into(), json!(properties));
        body.extend(params);
        JsonValue::Object(body)
    }

    /// Flatten a search result into `{id, archived, ...properties}`
    pub fn flatten(result: &JsonValue) -> Option<JsonValue> {
        let id = result.get("id").and_then(id_string)?;
        let mut record = JsonObject::new();
        record.insert("id".into(), JsonValue::String(id));
        if let Some(JsonValue::Object(properties)) = result.get("properties") {
            for (key, value) in properties {
                if key != "id" {
                    record.insert(key.clone(), value.clone());
                }
            }
        }
        for key in ["archived", "updatedAt"] {
            if let Some(value) = result.get(key) {
                record.entry(key).or_insert_with(|| value.clone());
            }
        }
        Some(JsonValue::Object(record))
    }

    /// First company associated with a deal.
    ///
    /// Lookup failures other than rejected credentials yield `None`.
    pub async fn deal_company(&self, deal_id: &str) -> Result<Option<String>> {
        let url = format!("/crm/v4/objects/deals/{deal_id}/associations/companies");
        match self
            .http
            .get_json::<JsonValue>(&url, RequestConfig::new())
            .await
        {
            Ok(body) => Ok(body
                .get("results")
                .and_then(|r| r.get(0))
                .and_then(|first| first.get("toObjectId"))
                .and_then(id_string)),
            Err(e) if e.is_auth() => Err(e),
            Err(e) => {
                warn!(deal_id, error = %e, "Company association lookup failed");
                Ok(None)
            }
        }
    }

    fn record_url(&self, object_type: &str, id: &str) -> Option<String> {
        self.settings.portal_id.as_ref().map(|portal| {
            format!("https://app.hubspot.com/contacts/{portal}/record/{object_type}/{id}")
        })
    }

    async fn enrich_deal(&self, mut record: JsonValue) -> Result<JsonValue> {
        let Some(deal_id) = record.get("id").and_then(id_string) else {
            return Ok(record);
        };
        let company_id = if self.settings.resolve_associations {
            self.deal_company(&deal_id).await?
        } else {
            None
        };

        if let JsonValue::Object(map) = &mut record {
            if self.settings.resolve_associations {
                map.insert("company_id".into(), json!(company_id));
            }
            if self.settings.portal_id.is_some() {
                map.insert("deal_url".into(), json!(self.record_url("0-3", &deal_id)));
                let company_url = company_id
                    .as_deref()
                    .and_then(|id| self.record_url("0-2", id));
                map.insert("company_url".into(), json!(company_url));
            }
        }
        Ok(record)
    }

    fn enrich_company(&self, mut record: JsonValue) -> JsonValue {
        if let (Some(id), JsonValue::Object(map)) =
            (record.get("id").and_then(id_string), &mut record)
        {
            if let Some(url) = self.record_url("0-2", &id) {
                map.insert("company_url".into(), JsonValue::String(url));
            }
        }
        record
    }
}

#[async_trait]
impl SourceClient for CrmClient {
    fn source(&self) -> Source {
        Source::Crm
    }

    fn entities(&self) -> Vec<EntitySpec> {
        CRM_ENTITIES
            .iter()
            .map(|e| e.with_page_size(self.settings.page_size))
            .collect()
    }

    fn paginator(&self, entity: &EntitySpec) -> Box<dyn Paginator> {
        Box::new(AfterCursorPaginator::new(entity.page_size))
    }

    fn default_since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.months_back(now)
    }

    async fn fetch_page(
        &self,
        entity: &EntitySpec,
        since: Option<DateTime<Utc>>,
        params: JsonObject,
    ) -> Result<PageResponse> {
        let url = format!("/crm/v3/objects/{}/search", entity.resource);
        let body: JsonValue = self
            .http
            .post_json(&url, self.search_body(entity, since, params))
            .await?;

        let results = body
            .get("results")
            .and_then(JsonValue::as_array)
            .cloned()
            .unwrap_or_default();

        let mut records = Vec::with_capacity(results.len());
        for result in &results {
            // Results without an id pass through so the runner can count them
            let record = Self::flatten(result).unwrap_or_else(|| result.clone());
            let record = match entity.name {
                "deals" => self.enrich_deal(record).await?,
                _ => self.enrich_company(record),
            };
            records.push(record);
        }

        debug!(entity = entity.name, records = records.len(), "Fetched CRM page");
        Ok(PageResponse { body, records })
    }
}
