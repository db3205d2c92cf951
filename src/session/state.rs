//! The mutable state of one feed session, without any I/O.
//!
//! [`FeedSession`] owns the displayed article list, the pagination cursor
//! and the load generation. The async engine drives it; keeping the
//! transitions here makes them testable without timers or a network.

use std::collections::HashSet;

use crate::feed::{Article, Channel, FeedError, FeedPage, PageRequest};

/// Outcome of the most recent first-page load.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Loaded,
    /// Message suitable for display.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct FeedSession {
    url: String,
    /// Bumped on every first-page load. Async results carrying an older
    /// value are discarded.
    generation: u64,
    articles: Vec<Article>,
    channel: Option<Channel>,
    /// 1-based `start-index` of the next page to request.
    cursor: usize,
    page_size: usize,
    has_more: bool,
    paginated: bool,
    state: LoadState,
    loading_more: bool,
}

impl FeedSession {
    pub fn new(url: impl Into<String>, page_size: usize) -> Self {
        let url = url.into();
        let paginated = crate::feed::supports_pagination(&url);
        Self {
            url,
            generation: 0,
            articles: Vec::new(),
            channel: None,
            cursor: 1,
            page_size: page_size.max(1),
            has_more: false,
            paginated,
            state: LoadState::Idle,
            loading_more: false,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_paginated(&self) -> bool {
        self.paginated
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn is_loading_more(&self) -> bool {
        self.loading_more
    }

    /// Points the session at another feed, dropping everything loaded so far.
    /// The generation keeps counting so results for the old feed stay stale
    /// even if the caller switches back to it.
    pub fn switch_to(&mut self, url: impl Into<String>) {
        let generation = self.generation;
        *self = Self::new(url, self.page_size);
        self.generation = generation;
    }

    /// Starts a fresh first-page load. Returns the generation the result
    /// must carry and the page to request.
    pub fn begin_first_load(&mut self) -> (u64, PageRequest) {
        self.generation += 1;
        self.cursor = 1;
        self.has_more = false;
        self.loading_more = false;
        self.state = LoadState::Loading;
        (self.generation, PageRequest::first(self.page_size))
    }

    /// Replaces the article list with the first page.
    ///
    /// `has_more` is a heuristic: a full page from a paginating feed is
    /// assumed to have a successor.
    pub fn apply_first_page(&mut self, page: &FeedPage) {
        self.channel = Some(page.channel.clone());
        self.articles = page.articles.clone();
        self.has_more = self.paginated && page.articles.len() == self.page_size;
        self.cursor = 1 + self.page_size;
        self.state = LoadState::Loaded;
    }

    pub fn fail_first_load(&mut self, err: &FeedError) {
        self.articles.clear();
        self.channel = None;
        self.has_more = false;
        self.state = LoadState::Failed(err.to_string());
    }

    /// Claims the next page, if there is one and no other page load is
    /// running. The claim is released by `apply_next_page` or
    /// `abort_next_page`.
    pub fn begin_next_page(&mut self) -> Option<PageRequest> {
        if !self.has_more || self.loading_more || self.state != LoadState::Loaded {
            return None;
        }
        self.loading_more = true;
        Some(PageRequest::new(self.cursor, self.page_size))
    }

    /// Appends a following page. Returns how many articles were added.
    ///
    /// Items already shown (for example pushed down the list by a poll
    /// that prepended newer posts) are skipped.
    pub fn apply_next_page(&mut self, page: &FeedPage) -> usize {
        self.loading_more = false;
        let fresh = self.unseen(&page.articles);
        let added = fresh.len();
        self.articles.extend(fresh);
        self.cursor += self.page_size;
        self.has_more = page.articles.len() == self.page_size;
        added
    }

    /// Releases the page claim after a failed load; the cursor is unchanged
    /// so the same page is requested next time.
    pub fn abort_next_page(&mut self) {
        self.loading_more = false;
    }

    /// Prepends polled articles whose guid has not been seen, flagged as new.
    /// Keeps their relative order from the feed. Returns how many were added.
    pub fn merge_polled(&mut self, polled: &[Article]) -> usize {
        let mut fresh = self.unseen(polled);
        let added = fresh.len();
        if added > 0 {
            for article in &mut fresh {
                article.is_new = true;
            }
            fresh.append(&mut self.articles);
            self.articles = fresh;
        }
        added
    }

    /// Clones of `candidates` whose guid is neither in the list nor earlier
    /// in `candidates`, in their original order.
    fn unseen(&self, candidates: &[Article]) -> Vec<Article> {
        let mut seen: HashSet<&str> = self.articles.iter().map(|a| a.guid.as_str()).collect();
        candidates
            .iter()
            .filter(|a| seen.insert(a.guid.as_str()))
            .cloned()
            .collect()
    }
}
