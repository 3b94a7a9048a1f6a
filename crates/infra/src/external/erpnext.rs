//! ERPNext (Frappe) REST client.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use woosync_catalog::{ImageRef, ItemRecord, Price};
use woosync_core::ItemCode;

use super::{RemoteError, send_json};
use crate::config::ErpConfig;
use crate::fetch::ErpCatalog;

/// Used when neither configuration nor ERPNext names a selling price list.
pub const FALLBACK_PRICE_LIST: &str = "Standard Selling";

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct DocResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ItemRow {
    item_code: String,
    #[serde(default)]
    item_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    image: Option<String>,
    /// Configured extra fields, such as the short description.
    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ItemPriceRow {
    item_code: String,
    #[serde(default)]
    price_list_rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FileRow {
    #[serde(default)]
    file_url: Option<String>,
    #[serde(default)]
    content_hash: Option<String>,
    #[serde(default)]
    attached_to_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SellingSettings {
    #[serde(default)]
    selling_price_list: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedRow {
    name: String,
}

/// Client for `/api/resource/...` with `token key:secret` auth.
#[derive(Debug, Clone)]
pub struct ErpNextClient {
    http: reqwest::Client,
    base_url: String,
    price_list: Option<String>,
    short_description_field: Option<String>,
    page_size: usize,
    timeout: Duration,
}

impl ErpNextClient {
    pub fn new(config: &ErpConfig) -> Result<Self, RemoteError> {
        let token = format!(
            "token {}:{}",
            config.api_key.expose(),
            config.api_secret.expose()
        );
        let mut auth = HeaderValue::from_str(&token)
            .map_err(|e| RemoteError::Network(format!("invalid ERPNext credentials: {e}")))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            price_list: config.price_list.clone(),
            short_description_field: config.short_description_field.clone(),
            page_size: config.page_size.max(1),
            timeout: config.timeout,
        })
    }

    fn resource_url(&self, doctype: &str) -> String {
        format!("{}/api/resource/{}", self.base_url, doctype.replace(' ', "%20"))
    }

    /// Page through a doctype list until a short page.
    async fn list_all<T: DeserializeOwned>(
        &self,
        doctype: &str,
        fields: &[&str],
        filters: Value,
        order_by: Option<&str>,
    ) -> Result<Vec<T>, RemoteError> {
        let mut rows = Vec::new();
        let mut start = 0usize;
        loop {
            let mut query = vec![
                ("fields", json!(fields).to_string()),
                ("filters", filters.to_string()),
                ("limit_start", start.to_string()),
                ("limit_page_length", self.page_size.to_string()),
            ];
            if let Some(order_by) = order_by {
                query.push(("order_by", order_by.to_string()));
            }

            let page: ListResponse<T> = send_json(
                self.http.get(self.resource_url(doctype)).query(&query),
                self.timeout,
            )
            .await?;

            let count = page.data.len();
            debug!(doctype, start, count, "fetched ERPNext page");
            rows.extend(page.data);
            if count < self.page_size {
                return Ok(rows);
            }
            start += count;
        }
    }

    /// Active selling price list: configuration, then Selling Settings, then
    /// the first enabled selling Price List, then `Standard Selling`.
    ///
    /// Lookup failures fall through to the next source.
    pub async fn resolve_price_list(&self) -> String {
        if let Some(name) = &self.price_list {
            return name.clone();
        }

        let url = format!("{}/Selling%20Settings", self.resource_url("Selling Settings"));
        match send_json::<DocResponse<SellingSettings>>(self.http.get(url), self.timeout).await {
            Ok(doc) => {
                if let Some(name) = doc.data.selling_price_list.filter(|n| !n.trim().is_empty()) {
                    return name;
                }
            }
            Err(e) => debug!(error = %e, "Selling Settings lookup failed"),
        }

        let query = [
            ("fields", json!(["name"]).to_string()),
            ("filters", json!([["selling", "=", 1], ["enabled", "=", 1]]).to_string()),
            ("limit_page_length", "1".to_string()),
        ];
        match send_json::<ListResponse<NamedRow>>(
            self.http.get(self.resource_url("Price List")).query(&query),
            self.timeout,
        )
        .await
        {
            Ok(list) => {
                if let Some(row) = list.data.into_iter().next() {
                    return row.name;
                }
            }
            Err(e) => debug!(error = %e, "Price List lookup failed"),
        }

        FALLBACK_PRICE_LIST.to_string()
    }

    /// `item_code → price` for one price list. The first row per item wins.
    async fn fetch_prices(&self, price_list: &str) -> Result<HashMap<String, Price>, RemoteError> {
        let rows: Vec<ItemPriceRow> = self
            .list_all(
                "Item Price",
                &["item_code", "price_list_rate"],
                json!([["price_list", "=", price_list]]),
                Some("modified desc"),
            )
            .await?;

        let mut prices = HashMap::new();
        for row in rows {
            let Some(rate) = row.price_list_rate else {
                continue;
            };
            match Price::from_f64(rate) {
                Ok(price) => {
                    prices.entry(row.item_code).or_insert(price);
                }
                Err(e) => warn!(item_code = %row.item_code, error = %e, "ignoring invalid item price"),
            }
        }
        Ok(prices)
    }

    async fn fetch_item_files(&self) -> Result<Vec<FileRow>, RemoteError> {
        self.list_all(
            "File",
            &["file_url", "content_hash", "attached_to_name"],
            json!([["attached_to_doctype", "=", "Item"], ["is_folder", "=", 0]]),
            Some("creation asc"),
        )
        .await
    }

    fn absolute_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.base_url, url.trim_start_matches('/'))
        }
    }
}

/// Text of an optional Item field; `null` reads as empty.
fn field_text(value: Option<Value>) -> String {
    match value {
        Some(Value::String(text)) => text,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn is_image(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[async_trait::async_trait]
impl ErpCatalog for ErpNextClient {
    async fn fetch_items(&self) -> Result<Vec<ItemRecord>, RemoteError> {
        let mut fields = vec!["item_code", "item_name", "description", "image"];
        if let Some(field) = self.short_description_field.as_deref() {
            fields.push(field);
        }
        let rows: Vec<ItemRow> = self
            .list_all(
                "Item",
                &fields,
                json!([["disabled", "=", 0]]),
                Some("item_code asc"),
            )
            .await?;

        let price_list = self.resolve_price_list().await;
        let prices = self.fetch_prices(&price_list).await?;
        let files = self.fetch_item_files().await?;

        let mut hashes: HashMap<&str, &str> = HashMap::new();
        let mut attachments: HashMap<&str, Vec<&str>> = HashMap::new();
        for file in &files {
            let Some(url) = file.file_url.as_deref() else {
                continue;
            };
            if let Some(hash) = file.content_hash.as_deref() {
                hashes.insert(url, hash);
            }
            if let Some(owner) = file.attached_to_name.as_deref() {
                if is_image(url) {
                    attachments.entry(owner).or_default().push(url);
                }
            }
        }

        let mut items = Vec::with_capacity(rows.len());
        for mut row in rows {
            let short_description = self
                .short_description_field
                .as_deref()
                .map(|field| field_text(row.extra.remove(field)));
            let item_code = ItemCode::new(row.item_code.as_str())
                .map_err(|e| RemoteError::Parse(format!("ERPNext item: {e}")))?;

            let mut urls: Vec<&str> = Vec::new();
            if let Some(image) = row.image.as_deref().filter(|s| !s.trim().is_empty()) {
                urls.push(image);
            }
            for url in attachments.get(row.item_code.as_str()).into_iter().flatten().copied() {
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }

            let image_refs = urls
                .into_iter()
                .map(|url| ImageRef {
                    url: self.absolute_url(url),
                    content_hash: hashes.get(url).map(|h| h.to_string()),
                })
                .collect();

            items.push(ItemRecord {
                price: prices.get(row.item_code.as_str()).copied(),
                item_name: row.item_name.unwrap_or_else(|| row.item_code.clone()),
                description: row.description.unwrap_or_default(),
                short_description,
                image_refs,
                price_list: Some(price_list.clone()),
                item_code,
            });
        }

        debug!(count = items.len(), price_list = %price_list, "fetched ERPNext items");
        Ok(items)
    }
}
