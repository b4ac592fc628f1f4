//! Token holder snapshots from the Covalent `token_holders` endpoint.

use std::{str::FromStr, time::Duration};

use alloy::primitives::Address;
use anyhow::{bail, Context};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use log::debug;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    config::HolderApiSettings,
    gateways::{HolderSnapshotSource, TokenHolder},
    utils::{address_key, normalize_address},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct CovalentClient {
    client: Client,
    base_url: String,
    api_key: String,
    page_size: u32,
}

#[derive(Debug, Deserialize)]
struct HoldersResponse {
    data: Option<HoldersPage>,
    #[serde(default)]
    error: bool,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HoldersPage {
    #[serde(default)]
    items: Vec<HolderItem>,
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct HolderItem {
    address: String,
    balance: String,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    has_more: bool,
}

impl HoldersResponse {
    /// Holders on this page and whether another page follows.
    fn into_holders(self) -> anyhow::Result<(Vec<TokenHolder>, bool)> {
        if self.error {
            bail!(
                "holder API error: {}",
                self.error_message.as_deref().unwrap_or("unknown")
            );
        }

        let page = self.data.context("holder API response has no data")?;
        let has_more = page.pagination.is_some_and(|p| p.has_more);

        // An empty page that promises more would page forever
        if has_more && page.items.is_empty() {
            bail!("holder API returned an empty page with has_more set");
        }

        let holders = page
            .items
            .into_iter()
            .map(|item| {
                let balance = BigDecimal::from_str(&item.balance)
                    .with_context(|| format!("invalid balance {:?} for {}", item.balance, item.address))?;
                Ok(TokenHolder {
                    address: normalize_address(&item.address),
                    balance,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok((holders, has_more))
    }
}

impl CovalentClient {
    pub fn new(settings: &HolderApiSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            page_size: settings.page_size.max(1),
        })
    }

    async fn fetch_page(
        &self,
        token: Address,
        chain_id: u64,
        block_height: u64,
        page_number: u32,
    ) -> anyhow::Result<HoldersResponse> {
        let url = format!(
            "{}/{}/tokens/{}/token_holders/",
            self.base_url,
            chain_id,
            address_key(&token)
        );

        let response = self
            .client
            .get(&url)
            .query(&[
                ("block-height", block_height.to_string()),
                ("page-size", self.page_size.to_string()),
                ("page-number", page_number.to_string()),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await
            .with_context(|| format!("holder request failed for page {page_number}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("holder API returned HTTP {} for page {}", status.as_u16(), page_number);
        }

        response
            .json::<HoldersResponse>()
            .await
            .context("Failed to parse holder API response")
    }
}

#[async_trait]
impl HolderSnapshotSource for CovalentClient {
    async fn token_holders(
        &self,
        token: Address,
        chain_id: u64,
        block_height: u64,
    ) -> anyhow::Result<Vec<TokenHolder>> {
        let mut holders = Vec::new();
        let mut page_number = 0;

        loop {
            let (page, has_more) = self
                .fetch_page(token, chain_id, block_height, page_number)
                .await?
                .into_holders()?;

            debug!(
                "Fetched {} holders of {} on page {}",
                page.len(),
                address_key(&token),
                page_number
            );
            holders.extend(page);

            if !has_more {
                break;
            }
            page_number += 1;
        }

        Ok(holders)
    }
}
