use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::{Client, ClientBuilder, Response, Url};
use tracing::debug;

use crate::api::models::{Article, InteractionEvent, SearchResult, UserId};
use crate::error::{AppError, Result};

// Create a static client to reuse connections
static CLIENT: Lazy<Client> = Lazy::new(|| {
    ClientBuilder::new()
        .timeout(Duration::from_secs(10))
        .connect_timeout(Duration::from_secs(5))
        .pool_max_idle_per_host(10)
        .build()
        .expect("Failed to build HTTP client")
});

/// The feed/search/interaction service.
#[async_trait]
pub trait NewsBackend: Send + Sync {
    /// Articles for `user`, in display order.
    async fn fetch_feed(&self, user: &UserId) -> Result<Vec<Article>>;

    /// Record one engagement signal. The acknowledgement body is ignored.
    async fn record_interaction(&self, event: &InteractionEvent) -> Result<()>;

    async fn search(&self, query: &str) -> Result<SearchResult>;
}

#[derive(Clone, Debug)]
pub struct HttpBackend {
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    fn endpoint(&self, name: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                AppError::ConfigError(format!("Backend URL cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .push(name);
        Ok(url)
    }
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(AppError::FetchError(format!("{} returned {}", response.url(), status)))
    }
}

#[async_trait]
impl NewsBackend for HttpBackend {
    async fn fetch_feed(&self, user: &UserId) -> Result<Vec<Article>> {
        let url = self.endpoint("feed")?;
        debug!(%url, user_id = %user, "fetching feed");
        let response = CLIENT
            .get(url)
            .query(&[("user_id", user.as_str())])
            .send()
            .await?;
        let articles = check_status(response)?.json::<Vec<Article>>().await?;
        Ok(articles)
    }

    async fn record_interaction(&self, event: &InteractionEvent) -> Result<()> {
        let url = self.endpoint("interact")?;
        let response = CLIENT
            .post(url)
            .query(&[
                ("user_id", event.user_id().as_str()),
                ("article_id", event.article_id().as_str()),
                ("action", event.action().as_str()),
            ])
            .send()
            .await?;
        check_status(response)?;
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<SearchResult> {
        let url = self.endpoint("search")?;
        debug!(%url, query, "searching");
        let response = CLIENT.get(url).query(&[("query", query)]).send().await?;
        let result = check_status(response)?.json::<SearchResult>().await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_append_to_base_path() {
        let backend = HttpBackend::new(Url::parse("http://localhost:8000").unwrap());
        assert_eq!(backend.endpoint("feed").unwrap().as_str(), "http://localhost:8000/feed");

        let backend = HttpBackend::new(Url::parse("https://news.example/api/").unwrap());
        assert_eq!(backend.endpoint("search").unwrap().as_str(), "https://news.example/api/search");

        let backend = HttpBackend::new(Url::parse("https://news.example/api").unwrap());
        assert_eq!(
            backend.endpoint("interact").unwrap().as_str(),
            "https://news.example/api/interact"
        );
    }
}
