//! Blocking JSON client for a live identity service.
//!
//! Every call is a single request with no retry. A request that cannot be sent,
//! or whose body does not parse, is a transport error. An HTTP error status
//! whose body parses is returned as the business status it carries.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::config::SutConfig;
use crate::core::errors::{IshError, Result};
use crate::model::duplicate_rule::DuplicateRule;
use crate::model::record::Record;
use crate::sut::{
    CreateResponse, DuplicateSearchResponse, RequestingApp, ResponseStatus, SearchAttribute,
    SearchResponse, StatePurger, SutClient,
};

// ──────────────────── wire bodies ────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody<'a> {
    identity: Record,
    requesting_app: &'a RequestingApp,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchBody<'a> {
    searched_attributes: &'a [SearchAttribute],
}

#[derive(Deserialize)]
struct SearchReply {
    status: ResponseStatus,
    #[serde(default)]
    identities: Vec<Record>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DuplicateBody<'a> {
    identity: Record,
    rule_codes: &'a [String],
}

#[derive(Deserialize)]
struct DuplicateReply {
    status: ResponseStatus,
    #[serde(default)]
    duplicates: BTreeMap<String, Vec<Record>>,
    #[serde(default)]
    identities: Vec<Record>,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct StatusReply {
    status: ResponseStatus,
}

// ──────────────────── client ────────────────────

/// REST adapter over [`SutClient`] and [`StatePurger`].
#[derive(Debug, Clone)]
pub struct HttpSut {
    config: SutConfig,
    base_url: String,
    client: Client,
}

impl HttpSut {
    /// Build a client for `config.base_url`.
    pub fn new(config: &SutConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| IshError::InvalidConfig {
                details: "sut.base_url is required for the http backend".to_string(),
            })?;
        reqwest::Url::parse(&base_url).map_err(|e| IshError::InvalidConfig {
            details: format!("sut.base_url {base_url:?} is not a URL: {e}"),
        })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| IshError::InvalidConfig {
                details: format!("cannot build HTTP client: {e}"),
            })?;
        Ok(Self {
            config: config.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn exchange<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T> {
        let response = request
            .send()
            .map_err(|e| IshError::transport(operation, e.to_string()))?;
        let http_status = response.status();
        let body = response
            .text()
            .map_err(|e| IshError::transport(operation, e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| {
            IshError::transport(
                operation,
                format!("unparseable response (HTTP {}): {e}", http_status.as_u16()),
            )
        })
    }

    fn purge(&self, operation: &'static str, path: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(path))
            .send()
            .map_err(|e| IshError::transport(operation, e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(IshError::Rejected {
                operation,
                details: format!("HTTP {}", status.as_u16()),
            })
        }
    }
}

impl SutClient for HttpSut {
    fn backend_name(&self) -> &'static str {
        "http"
    }

    fn create_record(&self, record: &Record, app: &RequestingApp) -> Result<CreateResponse> {
        let body = CreateBody {
            identity: record.for_wire(),
            requesting_app: app,
        };
        let request = self
            .client
            .post(self.url(&self.config.create_path))
            .json(&body);
        self.exchange("create", request)
    }

    fn search_records(&self, criteria: &[SearchAttribute]) -> Result<SearchResponse> {
        let body = SearchBody {
            searched_attributes: criteria,
        };
        let request = self
            .client
            .post(self.url(&self.config.search_path))
            .json(&body);
        let reply: SearchReply = self.exchange("search", request)?;
        Ok(SearchResponse {
            status: reply.status,
            records: reply.identities,
        })
    }

    fn register_duplicate_rule(&self, rule: &DuplicateRule) -> Result<ResponseStatus> {
        let request = self
            .client
            .post(self.url(&self.config.duplicate_rules_path))
            .json(rule);
        let reply: StatusReply = self.exchange("register_rule", request)?;
        Ok(reply.status)
    }

    fn find_duplicates(
        &self,
        candidate: &Record,
        rule_codes: &[String],
    ) -> Result<DuplicateSearchResponse> {
        let body = DuplicateBody {
            identity: candidate.for_wire(),
            rule_codes,
        };
        let request = self
            .client
            .post(self.url(&self.config.duplicates_path))
            .json(&body);
        let reply: DuplicateReply = self.exchange("find_duplicates", request)?;

        let mut duplicates = reply.duplicates;
        if duplicates.is_empty() && !reply.identities.is_empty() {
            if let Some(first) = rule_codes.first() {
                duplicates.insert(first.clone(), reply.identities);
            }
        }
        Ok(DuplicateSearchResponse {
            status: reply.status,
            duplicates,
            metadata: reply.metadata,
        })
    }
}

impl StatePurger for HttpSut {
    fn truncate_store(&self) -> Result<()> {
        self.purge("truncate", &self.config.purge_path)
    }

    fn reset_index(&self) -> Result<()> {
        self.purge("reset_index", &self.config.index_path)
    }

    fn clear_search_rules(&self) -> Result<()> {
        self.purge("clear_search_rules", &self.config.search_rules_path)
    }
}
