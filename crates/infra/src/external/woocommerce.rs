//! WooCommerce REST v3 client (`/wp-json/wc/v3/products`).

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use woosync_catalog::{Price, ProductDraft, ProductRecord};
use woosync_core::{Sku, WcProductId};

use super::{RemoteError, send_json};
use crate::config::{Secret, WcConfig};
use crate::fetch::Storefront;

#[derive(Debug, Deserialize)]
struct WcImage {
    #[serde(default)]
    src: String,
}

#[derive(Debug, Deserialize)]
struct WcProduct {
    id: u64,
    #[serde(default)]
    sku: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    regular_price: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    short_description: String,
    #[serde(default)]
    images: Vec<WcImage>,
    #[serde(default)]
    status: String,
}

impl TryFrom<WcProduct> for ProductRecord {
    type Error = RemoteError;

    fn try_from(raw: WcProduct) -> Result<Self, Self::Error> {
        let product_id = WcProductId::new(raw.id)
            .map_err(|e| RemoteError::Parse(format!("WooCommerce product: {e}")))?;
        let price = Price::parse_optional(&raw.regular_price)
            .map_err(|e| RemoteError::Parse(format!("product {product_id}: {e}")))?;
        Ok(Self {
            product_id,
            // blank SKU means unmanaged
            sku: Sku::new(raw.sku.trim()).ok(),
            name: raw.name,
            price,
            description: raw.description,
            short_description: raw.short_description,
            image_urls: raw.images.into_iter().map(|i| i.src).collect(),
            status: raw.status.into(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ImagePayload<'a> {
    src: &'a str,
}

#[derive(Debug, Serialize)]
struct ProductPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    sku: Option<&'a str>,
    name: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    short_description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    regular_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<ImagePayload<'a>>>,
}

impl<'a> ProductPayload<'a> {
    fn from_draft(draft: &'a ProductDraft, with_sku: bool, with_images: bool) -> Self {
        Self {
            sku: with_sku.then(|| draft.sku.as_str()),
            name: &draft.name,
            description: &draft.description,
            short_description: draft.short_description.as_deref(),
            regular_price: draft.regular_price.map(|p| p.to_wc_string()),
            images: with_images
                .then(|| draft.images.iter().map(|src| ImagePayload { src }).collect()),
        }
    }
}

/// Basic-auth client over consumer key/secret.
#[derive(Debug, Clone)]
pub struct WooCommerceClient {
    http: reqwest::Client,
    api_url: String,
    consumer_key: Secret,
    consumer_secret: Secret,
    page_size: usize,
    timeout: Duration,
}

impl WooCommerceClient {
    pub fn new(config: &WcConfig) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_url: format!("{}/wp-json/wc/v3", config.base_url.trim_end_matches('/')),
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
            page_size: config.page_size.max(1),
            timeout: config.timeout,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.api_url, path))
            .basic_auth(
                self.consumer_key.expose(),
                Some(self.consumer_secret.expose()),
            )
    }

    /// Page through `/products?status=...` until a short or empty page.
    async fn list_products(&self, status: &str) -> Result<Vec<ProductRecord>, RemoteError> {
        let mut products = Vec::new();
        let mut page = 1usize;
        loop {
            let batch: Vec<WcProduct> = send_json(
                self.request(reqwest::Method::GET, "products").query(&[
                    ("per_page", self.page_size.to_string()),
                    ("page", page.to_string()),
                    ("status", status.to_string()),
                ]),
                self.timeout,
            )
            .await?;

            let count = batch.len();
            debug!(status, page, count, "fetched WooCommerce page");
            for raw in batch {
                products.push(ProductRecord::try_from(raw)?);
            }
            if count < self.page_size {
                return Ok(products);
            }
            page += 1;
        }
    }

    async fn delete(&self, id: WcProductId, force: bool) -> Result<(), RemoteError> {
        let _: serde_json::Value = send_json(
            self.request(reqwest::Method::DELETE, &format!("products/{id}"))
                .query(&[("force", force.to_string())]),
            self.timeout,
        )
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Storefront for WooCommerceClient {
    /// `status=any` leaves trashed posts out on stock WordPress, so the trash
    /// is listed separately and merged by id.
    async fn fetch_products(&self) -> Result<Vec<ProductRecord>, RemoteError> {
        let mut products = self.list_products("any").await?;
        let mut seen: HashSet<WcProductId> = products.iter().map(|p| p.product_id).collect();
        for product in self.list_products("trash").await? {
            if seen.insert(product.product_id) {
                products.push(product);
            }
        }
        Ok(products)
    }

    async fn fetch_trashed(&self) -> Result<Vec<ProductRecord>, RemoteError> {
        self.list_products("trash").await
    }

    async fn create_product(&self, draft: &ProductDraft) -> Result<ProductRecord, RemoteError> {
        let raw: WcProduct = send_json(
            self.request(reqwest::Method::POST, "products")
                .json(&ProductPayload::from_draft(draft, true, true)),
            self.timeout,
        )
        .await?;
        raw.try_into()
    }

    async fn update_product(
        &self,
        id: WcProductId,
        draft: &ProductDraft,
        include_images: bool,
    ) -> Result<ProductRecord, RemoteError> {
        let raw: WcProduct = send_json(
            self.request(reqwest::Method::PUT, &format!("products/{id}"))
                .json(&ProductPayload::from_draft(draft, false, include_images)),
            self.timeout,
        )
        .await?;
        raw.try_into()
    }

    async fn trash_product(&self, id: WcProductId) -> Result<(), RemoteError> {
        self.delete(id, false).await
    }

    async fn purge_product(&self, id: WcProductId) -> Result<(), RemoteError> {
        self.delete(id, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer, page_size: usize) -> WcConfig {
        WcConfig {
            base_url: server.uri(),
            consumer_key: Secret::new("ck"),
            consumer_secret: Secret::new("cs"),
            timeout: Duration::from_secs(5),
            page_size,
        }
    }

    fn product_json(id: u64, sku: &str, status: &str) -> serde_json::Value {
        json!({
            "id": id, "sku": sku, "name": format!("Product {id}"), "regular_price": "10.00",
            "description": "", "status": status,
            "images": [{"id": 1, "src": "https://shop/wp-content/uploads/a.jpg"}]
        })
    }

    // "ck:cs" base64-encoded
    const BASIC_AUTH: &str = "Basic Y2s6Y3M=";

    #[tokio::test]
    async fn lists_all_pages_including_trash() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wc/v3/products"))
            .and(query_param("status", "any"))
            .and(query_param("page", "1"))
            .and(header("authorization", BASIC_AUTH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                product_json(1, "SKU1", "publish"),
                product_json(2, "", "draft"),
            ])))
            .mount(&server)
            .await;
        // stock WordPress: the trashed row never shows up under status=any
        Mock::given(method("GET"))
            .and(path("/wp-json/wc/v3/products"))
            .and(query_param("status", "any"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wc/v3/products"))
            .and(query_param("status", "trash"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                product_json(3, "SKU3", "trash"),
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = WooCommerceClient::new(&config(&server, 2)).unwrap();
        let products = client.fetch_products().await.unwrap();

        assert_eq!(products.len(), 3);
        assert_eq!(products[0].sku, Some(Sku::new("SKU1").unwrap()));
        assert_eq!(products[0].price, Some("10".parse().unwrap()));
        assert_eq!(products[0].image_urls.len(), 1);
        assert_eq!(products[1].sku, None);
        assert_eq!(products[2].status, woosync_catalog::ProductStatus::Trash);
    }

    #[tokio::test]
    async fn trashed_rows_listed_twice_are_merged() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wc/v3/products"))
            .and(query_param("status", "any"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                product_json(1, "SKU1", "publish"),
                product_json(3, "SKU3", "trash"),
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wc/v3/products"))
            .and(query_param("status", "trash"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                product_json(3, "SKU3", "trash"),
                product_json(4, "SKU4", "trash"),
            ])))
            .mount(&server)
            .await;

        let client = WooCommerceClient::new(&config(&server, 100)).unwrap();
        let ids: Vec<u64> = client
            .fetch_products()
            .await
            .unwrap()
            .iter()
            .map(|p| p.product_id.get())
            .collect();
        assert_eq!(ids, vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn create_sends_full_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/wp-json/wc/v3/products"))
            .and(body_json(json!({
                "sku": "SKU2", "name": "Desk", "description": "Walnut",
                "short_description": "Walnut desk", "regular_price": "50.00",
                "images": [{"src": "https://erp/files/desk.jpg"}]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(product_json(77, "SKU2", "publish")))
            .mount(&server)
            .await;

        let client = WooCommerceClient::new(&config(&server, 100)).unwrap();
        let draft = ProductDraft {
            sku: Sku::new("SKU2").unwrap(),
            name: "Desk".into(),
            description: "Walnut".into(),
            short_description: Some("Walnut desk".into()),
            regular_price: Some("50".parse().unwrap()),
            images: vec!["https://erp/files/desk.jpg".into()],
        };
        let created = client.create_product(&draft).await.unwrap();
        assert_eq!(created.product_id.get(), 77);
    }

    #[tokio::test]
    async fn update_omits_sku_and_unchanged_images() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/wp-json/wc/v3/products/5"))
            .and(body_json(json!({"name": "Desk", "description": ""})))
            .respond_with(ResponseTemplate::new(200).set_body_json(product_json(5, "SKU2", "publish")))
            .mount(&server)
            .await;

        let client = WooCommerceClient::new(&config(&server, 100)).unwrap();
        let draft = ProductDraft {
            sku: Sku::new("SKU2").unwrap(),
            name: "Desk".into(),
            description: String::new(),
            short_description: None,
            regular_price: None,
            images: vec!["https://erp/files/desk.jpg".into()],
        };
        client
            .update_product(WcProductId::new(5).unwrap(), &draft, false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn duplicate_sku_is_recognised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/wp-json/wc/v3/products"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "product_invalid_sku",
                "message": "Invalid or duplicated SKU.",
                "data": {"status": 400, "resource_id": 3, "unique_sku": "SKU2"}
            })))
            .mount(&server)
            .await;

        let client = WooCommerceClient::new(&config(&server, 100)).unwrap();
        let draft = ProductDraft {
            sku: Sku::new("SKU2").unwrap(),
            name: "Desk".into(),
            description: String::new(),
            short_description: None,
            regular_price: None,
            images: vec![],
        };
        let err = client.create_product(&draft).await.unwrap_err();
        assert!(err.is_duplicate_sku());
    }

    #[tokio::test]
    async fn trash_and_purge_use_force_flag() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/wp-json/wc/v3/products/9"))
            .and(query_param("force", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(product_json(9, "X", "trash")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/wp-json/wc/v3/products/9"))
            .and(query_param("force", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(product_json(9, "X", "trash")))
            .expect(1)
            .mount(&server)
            .await;

        let client = WooCommerceClient::new(&config(&server, 100)).unwrap();
        let id = WcProductId::new(9).unwrap();
        client.trash_product(id).await.unwrap();
        client.purge_product(id).await.unwrap();
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)).set_body_json(json!([])))
            .mount(&server)
            .await;

        let mut cfg = config(&server, 100);
        cfg.timeout = Duration::from_millis(100);
        let client = WooCommerceClient::new(&cfg).unwrap();
        let err = client.fetch_products().await.unwrap_err();
        assert_eq!(err, RemoteError::Timeout(Duration::from_millis(100)));
    }
}
