use url::Url;

/// Path fragment of Blogger-style feeds, which honor `start-index` and
/// `max-results` query parameters.
pub const PAGINATED_PATH_FRAGMENT: &str = "/feeds/posts/";

const START_INDEX_PARAM: &str = "start-index";
const MAX_RESULTS_PARAM: &str = "max-results";

/// A window into a feed's backlog. `start_index` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRequest {
    pub start_index: usize,
    pub max_results: usize,
}

impl PageRequest {
    /// The newest `max_results` items. A zero size is bumped to one.
    pub fn first(max_results: usize) -> Self {
        Self::new(1, max_results)
    }

    pub fn new(start_index: usize, max_results: usize) -> Self {
        Self {
            start_index: start_index.max(1),
            max_results: max_results.max(1),
        }
    }

    /// Logical page number, `floor(start_index / max_results) + 1`.
    pub fn page_number(&self) -> usize {
        self.start_index / self.max_results + 1
    }

    /// The request for the page that follows this one.
    pub fn next(&self) -> Self {
        Self::new(self.start_index + self.max_results, self.max_results)
    }
}

/// Whether `url` points at a feed that understands pagination parameters.
pub fn supports_pagination(url: &str) -> bool {
    url.contains(PAGINATED_PATH_FRAGMENT)
}

/// Returns `url` with the page window applied, replacing any existing
/// `start-index`/`max-results` parameters and keeping the rest.
pub fn page_url(url: &Url, page: PageRequest) -> Url {
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != START_INDEX_PARAM && k != MAX_RESULTS_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut paged = url.clone();
    paged
        .query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair(START_INDEX_PARAM, &page.start_index.to_string())
        .append_pair(MAX_RESULTS_PARAM, &page.max_results.to_string());
    paged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_number() {
        assert_eq!(PageRequest::new(1, 25).page_number(), 1);
        assert_eq!(PageRequest::new(26, 25).page_number(), 2);
        assert_eq!(PageRequest::new(51, 25).page_number(), 3);
        assert_eq!(PageRequest::new(1, 5).page_number(), 1);
    }

    #[test]
    fn test_next_advances_by_page_size() {
        let page = PageRequest::first(25);
        assert_eq!(page.next(), PageRequest::new(26, 25));
        assert_eq!(page.next().next().start_index, 51);
    }

    #[test]
    fn test_zero_values_clamped() {
        let page = PageRequest::new(0, 0);
        assert_eq!(page.start_index, 1);
        assert_eq!(page.max_results, 1);
    }

    #[test]
    fn test_supports_pagination() {
        assert!(supports_pagination("https://blog.example.com/feeds/posts/default"));
        assert!(supports_pagination("https://blog.example.com/feeds/posts/default?alt=rss"));
        assert!(!supports_pagination("https://example.com/rss.xml"));
    }

    #[test]
    fn test_page_url_replaces_existing_params() {
        let url = Url::parse(
            "https://blog.example.com/feeds/posts/default?alt=rss&start-index=99&max-results=1",
        )
        .unwrap();
        let paged = page_url(&url, PageRequest::new(26, 25));
        assert_eq!(
            paged.as_str(),
            "https://blog.example.com/feeds/posts/default?alt=rss&start-index=26&max-results=25"
        );
    }
}
