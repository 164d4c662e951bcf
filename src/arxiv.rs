//! arXiv API client
//!
//! Pulls abstracts for one category and quarter from the arXiv Atom search
//! API, one calendar month at a time.
//!
//! API notes:
//! - Query `search_query=cat:<category> AND submittedDate:[from TO to]`
//! - Page with `start` / `max_results`
//! - Be polite: a fixed pause after every page
//!
//! A failed request (network, HTTP status, or malformed XML) is logged and
//! ends paging for that month. Nothing is retried.

use crate::aggregate::AbstractRecord;
use crate::config::Config;
use crate::error::{BuzzError, Result};
use crate::quarter::Quarter;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// One `<entry>` from an Atom feed, with only the fields we need.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    pub summary: Option<String>,
    pub published: Option<String>,
}

/// arXiv API client with a fixed inter-request delay
pub struct ArxivClient {
    client: Client,
    api_url: String,
    delay: Duration,
    max_results_per_month: usize,
    results_per_request: usize,
}

impl ArxivClient {
    /// Create a client from the pipeline configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("rustbuzz/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BuzzError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            delay: config.request_delay(),
            max_results_per_month: config.max_results_per_month,
            results_per_request: config.results_per_request.max(1),
        })
    }

    /// Fetch every abstract submitted in `quarter` for `category`.
    pub async fn fetch_quarter(&self, category: &str, quarter: Quarter) -> Vec<AbstractRecord> {
        let mut records = Vec::new();

        for month in quarter.months() {
            let fetched = self.fetch_month(category, quarter.year(), month).await;
            debug!(
                category = category,
                year = quarter.year(),
                month = month,
                count = fetched.len(),
                "Fetched month"
            );
            records.extend(fetched);
        }

        info!(
            category = category,
            quarter = %quarter,
            count = records.len(),
            "Fetched quarter"
        );
        records
    }

    async fn fetch_month(&self, category: &str, year: i32, month: u32) -> Vec<AbstractRecord> {
        let mut records = Vec::new();

        for start in (0..self.max_results_per_month).step_by(self.results_per_request) {
            let url = match build_query_url(
                &self.api_url,
                category,
                year,
                month,
                start,
                self.results_per_request,
            ) {
                Ok(url) => url,
                Err(e) => {
                    warn!(category = category, error = %e, "Bad query URL");
                    break;
                }
            };

            let entries = match self.fetch_page(url.as_str()).await.and_then(|body| parse_feed(&body)) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        category = category,
                        year = year,
                        month = month,
                        start = start,
                        error = %e,
                        "Error fetching page"
                    );
                    break;
                }
            };

            if entries.is_empty() {
                break;
            }

            records.extend(entries.into_iter().filter_map(|e| e.into_record(category)));
            tokio::time::sleep(self.delay).await;
        }

        records
    }

    /// Fetch raw page content
    async fn fetch_page(&self, url: &str) -> Result<String> {
        debug!(url = %url, "Fetching arXiv page");
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(BuzzError::Api {
                code: status.as_u16() as i32,
                message: format!("arXiv API error: {}", status),
            });
        }

        Ok(response.text().await?)
    }
}

impl FeedEntry {
    /// Entries missing a summary or a publication date are dropped.
    fn into_record(self, category: &str) -> Option<AbstractRecord> {
        Some(AbstractRecord {
            text: self.summary?,
            published: self.published?,
            category: category.to_string(),
        })
    }
}

/// `submittedDate` bounds covering a whole month.
///
/// The end day is always 31; the API accepts it for shorter months.
pub fn month_window(year: i32, month: u32) -> (String, String) {
    (
        format!("{}{:02}010000", year, month),
        format!("{}{:02}312359", year, month),
    )
}

/// Build an arXiv API query URL for one page of one month.
pub fn build_query_url(
    api_url: &str,
    category: &str,
    year: i32,
    month: u32,
    start: usize,
    max_results: usize,
) -> Result<Url> {
    let (from, to) = month_window(year, month);
    let search = format!("cat:{} AND submittedDate:[{} TO {}]", category, from, to);

    Url::parse_with_params(
        api_url,
        &[
            ("search_query", search),
            ("start", start.to_string()),
            ("max_results", max_results.to_string()),
        ],
    )
    .map_err(|e| BuzzError::Config(format!("Invalid API URL {:?}: {}", api_url, e)))
}

/// Extract `<entry>` summaries and publication dates from an Atom feed.
///
/// Text is kept verbatim, including line breaks.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Field {
        Summary,
        Published,
    }

    let mut reader = Reader::from_str(xml);
    let mut entries = Vec::new();
    let mut current: Option<FeedEntry> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"entry" => current = Some(FeedEntry::default()),
                b"summary" if current.is_some() => {
                    field = Some(Field::Summary);
                    if let Some(entry) = current.as_mut() {
                        entry.summary = Some(String::new());
                    }
                }
                b"published" if current.is_some() => {
                    field = Some(Field::Published);
                    if let Some(entry) = current.as_mut() {
                        entry.published = Some(String::new());
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if let Some(entry) = current.as_mut() {
                    match e.local_name().as_ref() {
                        b"summary" => entry.summary = Some(String::new()),
                        b"published" => entry.published = Some(String::new()),
                        _ => {}
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    let text = t
                        .unescape()
                        .map_err(|e| BuzzError::Parse(format!("Bad text in feed: {}", e)))?;
                    let target = match f {
                        Field::Summary => &mut entry.summary,
                        Field::Published => &mut entry.published,
                    };
                    target.get_or_insert_with(String::new).push_str(&text);
                }
            }
            Ok(Event::CData(t)) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    let text = String::from_utf8_lossy(&t.into_inner()).into_owned();
                    let target = match f {
                        Field::Summary => &mut entry.summary,
                        Field::Published => &mut entry.published,
                    };
                    target.get_or_insert_with(String::new).push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"entry" => {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                    field = None;
                }
                b"summary" | b"published" => field = None,
                _ => {}
            },
            Err(e) => {
                return Err(BuzzError::Parse(format!(
                    "Failed to parse Atom feed at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">
  <title type="html">ArXiv Query</title>
  <opensearch:totalResults>3</opensearch:totalResults>
  <entry>
    <id>http://arxiv.org/abs/2204.00001v1</id>
    <published>2022-04-15T17:59:59Z</published>
    <title>First</title>
    <summary>  We leverage a novel
framework &amp; show results.
</summary>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2204.00002v1</id>
    <published>2022-05-01T00:00:00Z</published>
    <title>No abstract</title>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2204.00003v1</id>
    <published>2022-06-30T10:00:00Z</published>
    <summary/>
  </entry>
</feed>"#;

    const EMPTY_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"><title>ArXiv Query</title></feed>"#;

    #[test]
    fn test_parse_feed() {
        let entries = parse_feed(FEED).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[0].summary.as_deref(),
            Some("  We leverage a novel\nframework & show results.\n")
        );
        assert_eq!(entries[0].published.as_deref(), Some("2022-04-15T17:59:59Z"));
        assert_eq!(entries[1].summary, None);
        assert_eq!(entries[2].summary.as_deref(), Some(""));
    }

    #[test]
    fn test_entries_without_summary_are_dropped() {
        let records: Vec<AbstractRecord> = parse_feed(FEED)
            .unwrap()
            .into_iter()
            .filter_map(|e| e.into_record("cs.*"))
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].text, "");
        assert_eq!(records[0].category, "cs.*");
    }

    #[test]
    fn test_parse_empty_feed() {
        assert!(parse_feed(EMPTY_FEED).unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed_feed() {
        let err = parse_feed("<feed><entry><summary>x</entry></feed>").unwrap_err();
        assert!(matches!(err, BuzzError::Parse(_)));
    }

    #[test]
    fn test_month_window() {
        assert_eq!(
            month_window(2022, 2),
            ("202202010000".to_string(), "202202312359".to_string())
        );
    }

    #[test]
    fn test_build_query_url() {
        let url =
            build_query_url("http://export.arxiv.org/api/query", "cs.*", 2022, 4, 250, 250).unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs[0],
            (
                "search_query".to_string(),
                "cat:cs.* AND submittedDate:[202204010000 TO 202204312359]".to_string()
            )
        );
        assert_eq!(pairs[1], ("start".to_string(), "250".to_string()));
        assert_eq!(pairs[2], ("max_results".to_string(), "250".to_string()));
    }

    /// Serve the same canned HTTP response to every connection.
    async fn serve(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/atom+xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}/api/query", addr)
    }

    fn test_config(api_url: String) -> Config {
        Config {
            api_url,
            request_delay_secs: 0.0,
            max_results_per_month: 2,
            results_per_request: 1,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_quarter_pages_every_month() {
        let url = serve("200 OK", FEED).await;
        let client = ArxivClient::new(&test_config(url)).unwrap();

        let records = client
            .fetch_quarter("cs.*", Quarter::new(2022, 2).unwrap())
            .await;
        // 3 months x 2 pages x 2 usable entries, overlapping pages included
        assert_eq!(records.len(), 12);
    }

    #[tokio::test]
    async fn test_fetch_failure_yields_nothing() {
        let url = serve("500 Internal Server Error", "oops").await;
        let client = ArxivClient::new(&test_config(url)).unwrap();

        let records = client
            .fetch_quarter("cs.*", Quarter::new(2022, 2).unwrap())
            .await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_empty_page_stops_month() {
        let url = serve("200 OK", EMPTY_FEED).await;
        let client = ArxivClient::new(&test_config(url)).unwrap();

        let records = client
            .fetch_quarter("cs.*", Quarter::new(2022, 1).unwrap())
            .await;
        assert!(records.is_empty());
    }
}
