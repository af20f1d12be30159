#![allow(dead_code)]

use chrono::{Duration, Utc};
use guper_cashback::config::{MerchantConfig, MerchantDirectory};
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SHOP: &str = "acme.myshopify.com";
pub const API_KEY: &str = "key-123";
pub const API_SECRET: &str = "secret-456";
pub const TOKEN: &str = "tok-1";

pub fn merchant(server: &MockServer) -> MerchantConfig {
    MerchantConfig::new(SHOP, server.uri(), API_KEY, API_SECRET)
}

pub fn directory(server: &MockServer) -> MerchantDirectory {
    MerchantDirectory::new([merchant(server)]).unwrap()
}

/// Token endpoint answering a token valid for an hour.
pub async fn mount_token(server: &MockServer, expected_calls: u64) {
    mount_token_valid_for(server, Duration::hours(1), expected_calls).await;
}

pub async fn mount_token_valid_for(server: &MockServer, ttl: Duration, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/api/connect/token"))
        .and(header("x-guper-apikey", API_KEY))
        .and(header("x-guper-apisecret", API_SECRET))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": TOKEN,
            "expiresIn": (Utc::now() + ttl).to_rfc3339(),
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

pub fn quote_body(confirm_token: &str) -> Value {
    json!({
        "confirmToken": confirm_token,
        "expiresAt": (Utc::now() + Duration::minutes(30)).to_rfc3339(),
        "cashback": {
            "thisOrder": {
                "accumulating": { "total": 100 },
                "redeemable": { "total": 500 }
            },
            "userBalance": { "availableAmount": 500 }
        }
    })
}

pub fn calculate_request(cart_token: &str) -> Value {
    json!({
        "cartToken": cart_token,
        "storeId": SHOP,
        "client": {
            "id": "gid://shopify/Customer/7",
            "email": "ana@example.com",
            "name": "Ana Souza",
            "countryCallingCode": 55,
            "cellphone": "11999990000"
        },
        "items": [{ "id": "gid://shopify/ProductVariant/1", "name": "Mug", "quantity": 1, "price": 1000 }]
    })
}
