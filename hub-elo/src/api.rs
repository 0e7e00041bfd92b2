use crate::types::{HubMatchesPage, MatchStatsResponse, RawMatch};
use common::RetryPolicy;
use core::future::Future;
use futures::future::join_all;
use metrics::counter;
use reqwest::StatusCode;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Largest page the hub listing endpoint serves.
pub const MAX_PAGE_SIZE: usize = 200;
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Where match ids and match payloads come from.
pub trait MatchSource: Send + Sync {
    /// One page of past match ids for a hub, newest first.
    fn hub_match_page(
        &self,
        hub_id: &str,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = anyhow::Result<Vec<String>>> + Send;

    /// The stats payload of one match. `Ok(None)` means the match has none.
    fn match_stats(
        &self,
        match_id: &str,
    ) -> impl Future<Output = anyhow::Result<Option<RawMatch>>> + Send;
}

impl<S: MatchSource> MatchSource for Arc<S> {
    fn hub_match_page(
        &self,
        hub_id: &str,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = anyhow::Result<Vec<String>>> + Send {
        (**self).hub_match_page(hub_id, offset, limit)
    }

    fn match_stats(
        &self,
        match_id: &str,
    ) -> impl Future<Output = anyhow::Result<Option<RawMatch>>> + Send {
        (**self).match_stats(match_id)
    }
}

#[derive(Debug, Clone)]
pub struct FaceitClient {
    http_client: reqwest::Client,
    api_root: String,
}

impl FaceitClient {
    pub fn new(http_client: reqwest::Client, api_root: impl Into<String>) -> Self {
        Self {
            http_client,
            api_root: api_root.into().trim_end_matches('/').to_string(),
        }
    }

    /// Client configured from `FACEIT_API_KEY` and `FACEIT_API_ROOT`.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::new(
            common::get_faceit_client()?,
            common::FACEIT_API_ROOT.as_str(),
        ))
    }
}

impl MatchSource for FaceitClient {
    #[instrument(skip(self))]
    async fn hub_match_page(
        &self,
        hub_id: &str,
        offset: usize,
        limit: usize,
    ) -> anyhow::Result<Vec<String>> {
        let url = format!("{}/hubs/{hub_id}/matches", self.api_root);
        let page: HubMatchesPage = self
            .http_client
            .get(&url)
            .query(&[
                ("type", "past".to_string()),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)?
            .json()
            .await?;
        Ok(page.items.into_iter().map(|item| item.match_id).collect())
    }

    #[instrument(skip(self))]
    async fn match_stats(&self, match_id: &str) -> anyhow::Result<Option<RawMatch>> {
        let url = format!("{}/matches/{match_id}/stats", self.api_root);
        let response = self.http_client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let stats: MatchStatsResponse = response.error_for_status()?.json().await?;
        Ok(stats.rounds.into_iter().next())
    }
}

/// Lists up to `limit` match ids of a hub starting at `offset`, newest first.
///
/// Pages are requested one after another and each is retried according to
/// `retry`. A page shorter than requested ends the listing. If a page still
/// fails after its retries, the whole listing fails.
#[instrument(skip(source, retry))]
pub async fn get_full_match_list<S: MatchSource>(
    source: &S,
    hub_id: &str,
    offset: usize,
    limit: usize,
    page_size: usize,
    retry: RetryPolicy,
) -> anyhow::Result<Vec<String>> {
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let mut match_ids = Vec::new();
    let mut page_offset = offset;

    while match_ids.len() < limit {
        let page_limit = page_size.min(limit - match_ids.len());
        let page = common::retry_with_policy(retry, || {
            source.hub_match_page(hub_id, page_offset, page_limit)
        })
        .await
        .inspect_err(|_| counter!("hub_elo.list_matches.failure").increment(1))?;

        let received = page.len();
        debug!(page_offset, page_limit, received, "Fetched match list page");
        match_ids.extend(page.into_iter().take(page_limit));
        page_offset += page_limit;

        if received < page_limit {
            break;
        }
    }

    counter!("hub_elo.list_matches.success").increment(1);
    info!("Listed {} matches for hub {hub_id}", match_ids.len());
    Ok(match_ids)
}

/// Fetches every match concurrently. The output lines up with `match_ids`;
/// a match that could not be fetched is `None`.
#[instrument(skip_all, fields(matches = match_ids.len()))]
pub async fn fetch_matches<S: MatchSource>(
    source: &S,
    match_ids: &[String],
) -> Vec<Option<RawMatch>> {
    join_all(match_ids.iter().map(|match_id| async move {
        match source.match_stats(match_id).await {
            Ok(Some(raw)) => {
                counter!("hub_elo.fetch_match.success").increment(1);
                Some(raw)
            }
            Ok(None) => {
                counter!("hub_elo.fetch_match.not_found").increment(1);
                debug!("Match {match_id} has no stats");
                None
            }
            Err(e) => {
                counter!("hub_elo.fetch_match.failure").increment(1);
                warn!("Failed to fetch match {match_id}: {e:?}");
                None
            }
        }
    }))
    .await
}
