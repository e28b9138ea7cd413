use super::{http_client, ThreadSource};
use crate::config::{ContentConfig, ServicesConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::ledger::UsedThreadLedger;
use crate::text;
use crate::thread::{Comment, ThreadContent};
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct RedditListing {
    data: RedditListingData,
}

#[derive(Debug, Deserialize)]
struct RedditListingData {
    children: Vec<RedditChild>,
}

#[derive(Debug, Deserialize)]
struct RedditChild {
    data: RedditPost,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditPost {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
}

/// A comment flattened out of the reply tree.
#[derive(Debug, Clone, PartialEq)]
pub struct RawComment {
    pub id: String,
    pub parent_id: Option<String>,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub stickied: bool,
}

/// Fetches the week's top threads from a random community.
pub struct RedditSource {
    client: Client,
    base_url: String,
    content: ContentConfig,
    rng: StdRng,
}

impl RedditSource {
    pub fn new(
        services: &ServicesConfig,
        content: &ContentConfig,
        seed: Option<u64>,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(services)?,
            base_url: services.reddit_base_url.trim_end_matches('/').to_string(),
            content: content.clone(),
            rng: match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            },
        })
    }

    fn fetch_top(&self, community: &str) -> Result<Vec<RedditPost>> {
        let url = format!(
            "{}/r/{}/top.json?t=week&limit={}&raw_json=1",
            self.base_url, community, self.content.post_limit
        );
        let listing: RedditListing = self
            .client
            .get(url)
            .send()
            .context("Reddit listing request failed")?
            .error_for_status()
            .context("Reddit listing returned an error status")?
            .json()
            .context("invalid Reddit listing JSON")?;
        Ok(listing.data.children.into_iter().map(|c| c.data).collect())
    }

    fn fetch_comments(&self, post_id: &str) -> Result<Vec<RawComment>> {
        let url = format!("{}/comments/{}.json?raw_json=1", self.base_url, post_id);
        let raw: Value = self
            .client
            .get(url)
            .send()
            .context("Reddit comments request failed")?
            .error_for_status()
            .context("Reddit comments returned an error status")?
            .json()
            .context("invalid Reddit comments JSON")?;
        Ok(flatten_comment_tree(&raw))
    }
}

impl ThreadSource for RedditSource {
    fn next_thread(&mut self, ledger: &mut UsedThreadLedger) -> PipelineResult<ThreadContent> {
        let community = self
            .content
            .communities
            .choose(&mut self.rng)
            .cloned()
            .ok_or(PipelineError::SourceUnavailable)?;
        info!(community = %community, "Fetching threads");

        let posts = self.fetch_top(&community).map_err(|e| {
            warn!("Could not fetch r/{}: {:#}", community, e);
            PipelineError::SourceUnavailable
        })?;

        let post = pick_post(&posts, ledger).ok_or_else(|| {
            info!(community = %community, "No unused threads");
            PipelineError::SourceUnavailable
        })?;

        let raw = self.fetch_comments(&post.id).map_err(|e| {
            warn!("Could not fetch comments for {}: {:#}", post.id, e);
            PipelineError::SourceUnavailable
        })?;

        let comments = select_comments(
            raw,
            self.content.max_comment_chars,
            self.content.comment_pool,
            self.content.comment_count,
        );
        if comments.is_empty() {
            warn!(title = %post.title, "Not enough comments, skipping thread");
            ledger.record(&post.title)?;
            return Err(PipelineError::SourceUnavailable);
        }

        let body = post.selftext.trim();
        Ok(ThreadContent {
            title: post.title.trim().to_string(),
            body: (!body.is_empty()).then(|| body.to_string()),
            community: Some(community),
            comments,
        })
    }
}

/// First unused title that is not a link post, else the first unused title.
pub fn pick_post<'p>(posts: &'p [RedditPost], ledger: &UsedThreadLedger) -> Option<&'p RedditPost> {
    let unused = |p: &&RedditPost| !ledger.contains(&p.title);
    posts
        .iter()
        .filter(unused)
        .find(|p| !text::looks_like_media_post(&p.title))
        .or_else(|| posts.iter().find(unused))
}

/// Walk a `/comments/<id>.json` reply into a flat list, parents before replies.
pub fn flatten_comment_tree(raw: &Value) -> Vec<RawComment> {
    let mut out = Vec::new();
    if let Some(listing) = raw.as_array().and_then(|a| a.get(1)) {
        collect_listing(listing, &mut out);
    }
    out
}

fn collect_listing(listing: &Value, out: &mut Vec<RawComment>) {
    let Some(children) = listing["data"]["children"].as_array() else {
        return;
    };
    for child in children {
        if child["kind"].as_str() != Some("t1") {
            continue;
        }
        let data = &child["data"];
        let id = data["id"].as_str().unwrap_or_default().to_string();
        if id.is_empty() {
            continue;
        }
        out.push(RawComment {
            id,
            parent_id: data["parent_id"]
                .as_str()
                .and_then(|p| p.split('_').last())
                .map(str::to_string),
            author: data["author"].as_str().unwrap_or("[deleted]").to_string(),
            body: data["body"].as_str().unwrap_or_default().to_string(),
            score: data["score"].as_i64().unwrap_or(0),
            stickied: data["stickied"].as_bool().unwrap_or(false),
        });
        if data["replies"].is_object() {
            collect_listing(&data["replies"], out);
        }
    }
}

/// Best-scored short comments, each preceded by its parent when the parent is also in the pool.
pub fn select_comments(
    mut raw: Vec<RawComment>,
    max_chars: usize,
    pool_size: usize,
    count: usize,
) -> Vec<Comment> {
    raw.retain(|c| !c.body.trim().is_empty() && !c.stickied && c.body.chars().count() < max_chars);
    raw.sort_by(|a, b| b.score.cmp(&a.score));
    raw.truncate(pool_size);

    let by_id: HashMap<&str, &RawComment> = raw.iter().map(|c| (c.id.as_str(), c)).collect();
    let mut added: HashSet<&str> = HashSet::new();
    let mut ordered: Vec<&RawComment> = Vec::new();

    for comment in &raw {
        // Climb to the highest ancestor in the pool that is not placed yet.
        let mut chain = vec![comment];
        let mut cursor = comment;
        while let Some(&parent) = cursor.parent_id.as_deref().and_then(|p| by_id.get(p)) {
            if added.contains(parent.id.as_str()) || chain.iter().any(|c| c.id == parent.id) {
                break;
            }
            chain.push(parent);
            cursor = parent;
        }
        for c in chain.into_iter().rev() {
            if added.insert(c.id.as_str()) {
                ordered.push(c);
            }
        }
        if ordered.len() >= count {
            break;
        }
    }

    ordered
        .into_iter()
        .take(count)
        .map(|c| Comment::new(Some(c.author.as_str()), &c.body))
        .collect()
}
