//! Document sources
//!
//! A source turns a query into the ordered page sequence a scan walks over.
//! Real deployments would back this with a document index; the crate ships a
//! static source and a small demo corpus.

use crate::error::Result;
use std::time::Duration;
use tracing::info;

/// Supplies the ordered page texts for a query
#[allow(async_fn_in_trait)]
pub trait DocumentSource {
    /// Fetch the pages for `query`.
    ///
    /// Failures are reported to the caller of a scan as `SourceUnavailable`.
    async fn fetch(&self, query: &str) -> Result<Vec<String>>;
}

/// A source that returns the same pages for every query
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    pages: Vec<String>,
    latency: Option<Duration>,
}

impl StaticSource {
    pub fn new<I, P>(pages: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            pages: pages.into_iter().map(Into::into).collect(),
            latency: None,
        }
    }

    /// The built-in demo corpus
    pub fn demo() -> Self {
        Self::new(demo_pages())
    }

    /// Simulate a slow document store
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn pages(&self) -> &[String] {
        &self.pages
    }
}

impl DocumentSource for StaticSource {
    async fn fetch(&self, _query: &str) -> Result<Vec<String>> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        info!(pages = self.pages.len(), "document structure fetched");
        Ok(self.pages.clone())
    }
}

/// Demo corpus: an internal wiki where the last page overrides the cafeteria
/// menu found earlier.
pub const DEMO_PAGES: [&str; 8] = [
    "Page 1: System Architecture Overview.
The platform is built on a microservices architecture hosted on Google Kubernetes Engine (GKE).
Services communicate via gRPC. The frontend is a React SPA hosted on Cloud Storage.
Note: Legacy systems are being deprecated by Q4 2024.",
    "Page 2: HR Policies - Remote Work.
Employees are allowed to work remotely 2 days a week.
Core hours are 10:00 AM to 4:00 PM.
Please refer to the employee handbook for holiday request procedures.",
    "Page 3: Cafeteria Weekly Menu (Standard).
- Monday: Pizza Day (Margherita and Pepperoni options available).
- Tuesday: Taco Tuesday (Beef and Vegan options).
- Wednesday: Roast Chicken.
- Thursday: Pasta / Lasagna.
- Friday: Fish & Chips.",
    "Page 4: Backend Code Style Guide (Python).
When creating factory patterns, avoid generic names.
BAD EXAMPLE:
class PizzaFactory:
    def create_cheese(self): ...
GOOD EXAMPLE:
class RequestHandlerFactory:
    def create_handler(self): ...
DO NOT use food metaphors in production code documentation.",
    "Page 5: Database Infrastructure.
Primary data is stored in Cloud Spanner for global consistency.
Redis is used for caching user sessions.
Backups are performed every 6 hours automatically.",
    "Page 6: API Error Handling & Retry Logic.
The API implements the 'Exponential Backoff' algorithm.
- Initial retry: 200ms
- Multiplier: 1.5x
- Max retries: 3
If the error persists after 3 tries, a 503 Service Unavailable is returned to the client.",
    "Page 7: Office Party Photos 2023.
Link to Google Drive folder: [LINK_REDACTED].
Please do not share these outside the organization.",
    "Page 8: URGENT UPDATE - Cafeteria Menu Change.
Effective immediately, due to supply chain issues:
Monday's Pizza Day is CANCELLED.
Monday is now Salad Bar Day.
Pizza Day is moved to Friday (replacing Fish & Chips).",
];

/// The demo corpus as owned page texts
pub fn demo_pages() -> Vec<String> {
    DEMO_PAGES.iter().map(|page| page.to_string()).collect()
}
