//! Polling worker for one source

use super::chain::{extract_ids, ReplaceWith};
use super::request::{generate_url, RequestFactory};
use super::response::ResponseProcessor;
use super::types::{ChainKind, IntervalStats, SourceConfig, StepConfig};
use crate::context::{Cursor, TransformContext};
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpResponse};
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::pagination::{NextPage, Paginator};
use crate::publisher::{Event, Publisher};
use crate::state::CheckpointStore;
use crate::tracer::Tracer;
use crate::transform::Transformable;
use crate::types::{JsonObject, JsonValue};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// A step with the HTTP client that sends its requests
struct Step {
    client: HttpClient,
    request: RequestFactory,
    response: ResponseProcessor,
}

impl Step {
    fn new(config: StepConfig, client: HttpClient) -> Self {
        Self {
            client,
            request: config.request,
            response: config.response,
        }
    }
}

struct Link {
    kind: ChainKind,
    step: Step,
    replace: String,
    replace_with: Option<ReplaceWith>,
}

/// One polling worker.
///
/// Intervals run strictly one after another; the cursor is loaded from the
/// checkpoint store before the first interval and saved after every
/// successful one.
pub struct Input {
    id: String,
    interval: Duration,
    root: Step,
    chain: Vec<Link>,
    cursor: Cursor,
    ctx: TransformContext,
    cursor_loaded: bool,
    store: Arc<dyn CheckpointStore>,
    publisher: Arc<dyn Publisher>,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Input")
            .field("id", &self.id)
            .field("interval", &self.interval)
            .field("chain_steps", &self.chain.len())
            .finish_non_exhaustive()
    }
}

impl Input {
    /// Build the HTTP clients of a source.
    ///
    /// Chain steps without their own auth share the root authenticator and
    /// its token cache.
    pub fn new(
        config: SourceConfig,
        store: Arc<dyn CheckpointStore>,
        publisher: Arc<dyn Publisher>,
    ) -> Result<Self> {
        let tracer = config
            .tracer
            .as_ref()
            .map(|config| Arc::new(Tracer::new(config)));

        let root_client = HttpClient::new(config.root.client.clone())?
            .with_auth(config.auth.clone())
            .with_tracer(tracer.clone());
        let shared_auth = root_client.authenticator().cloned();

        let mut chain = Vec::with_capacity(config.chain.len());
        for link in config.chain {
            let client = HttpClient::new(link.step.client.clone())?;
            let client = match link.auth {
                Some(strategy) => client.with_auth(strategy),
                None => client.with_authenticator(shared_auth.clone()),
            }
            .with_tracer(tracer.clone());
            chain.push(Link {
                kind: link.kind,
                step: Step::new(link.step, client),
                replace: link.replace,
                replace_with: link.replace_with,
            });
        }

        Ok(Self {
            id: config.id,
            interval: config.interval,
            root: Step::new(config.root, root_client),
            chain,
            cursor: config.cursor,
            ctx: TransformContext::default(),
            cursor_loaded: false,
            store,
            publisher,
            metrics: Arc::new(NoopMetrics),
        })
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Cursor as it stands after the last interval
    pub fn cursor(&self) -> &JsonObject {
        self.ctx.cursor()
    }

    /// Poll on the configured interval until `cancel` fires.
    ///
    /// The first interval starts immediately. A failed interval is logged and
    /// the worker waits for the next tick.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        let span = info_span!("input", id = %self.id);
        async {
            info!(interval = ?self.interval, "input started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match self.run_once(&cancel).await {
                    Ok(_) => {}
                    Err(Error::Cancelled) => break,
                    Err(e) => error!(error = %e, "interval failed"),
                }
            }
            info!("input stopped");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Run a single interval.
    ///
    /// On failure the cursor goes back to its value at the start of the
    /// interval and nothing is saved.
    pub async fn run_once(&mut self, cancel: &CancellationToken) -> Result<IntervalStats> {
        self.load_cursor().await?;
        self.ctx.clear_interval();
        let start_cursor = self.ctx.cursor().clone();
        let started = Instant::now();

        let mut interval = Interval {
            cursor: &self.cursor,
            publisher: self.publisher.as_ref(),
            metrics: self.metrics.as_ref(),
            cancel,
            stats: IntervalStats::new(),
        };
        let outcome = interval.run(&mut self.ctx, &self.root, &self.chain).await;
        let mut stats = interval.stats;
        stats.set_duration(started.elapsed());
        self.metrics.interval_executed(stats.duration, stats.pages);

        if let Err(e) = outcome {
            self.ctx.update_cursor(start_cursor);
            self.metrics.interval_failed();
            return Err(e);
        }

        if !self.cursor.is_empty() {
            self.store.save(&self.id, self.ctx.cursor()).await?;
        }
        info!(
            pages = stats.pages,
            "request finished: {} events published", stats.events_published
        );
        Ok(stats)
    }

    async fn load_cursor(&mut self) -> Result<()> {
        if self.cursor_loaded {
            return Ok(());
        }
        if let Some(cursor) = self.store.load(&self.id).await? {
            debug!(cursor = ?cursor, "resuming from checkpoint");
            self.ctx.update_cursor(cursor);
        }
        self.cursor_loaded = true;
        Ok(())
    }
}

// ============================================================================
// Interval
// ============================================================================

enum PageOutcome {
    /// Page handled; carries the decoded body
    Processed(JsonValue),
    /// Stop processing the current response list
    Stop,
}

/// Borrowed state of one running interval
struct Interval<'a> {
    cursor: &'a Cursor,
    publisher: &'a dyn Publisher,
    metrics: &'a dyn MetricsSink,
    cancel: &'a CancellationToken,
    stats: IntervalStats,
}

impl Interval<'_> {
    async fn run(&mut self, ctx: &mut TransformContext, root: &Step, chain: &[Link]) -> Result<()> {
        let url = root.request.url().clone();
        let tr = root.request.transformable(ctx, &url)?;
        let req = root.request.http_request(tr.clone())?;
        let resp = root.client.execute(&req, self.cancel).await?;
        self.process_pages(ctx, root, tr, resp, chain).await
    }

    /// Walk the pages of the root request. Without a chain every page is
    /// published; with one, each page feeds the chain instead.
    async fn process_pages(
        &mut self,
        ctx: &mut TransformContext,
        step: &Step,
        mut tr: Transformable,
        mut resp: HttpResponse,
        chain: &[Link],
    ) -> Result<()> {
        let processor = &step.response;
        let publish = chain.is_empty();
        let mut page = 0;

        loop {
            let started = Instant::now();
            let outcome = self.process_page(ctx, processor, &resp, page, publish).await?;
            self.record_page(started);
            let PageOutcome::Processed(body) = outcome else {
                return Ok(());
            };

            if let Some(first) = chain.first() {
                let ids = extract_ids(&body, &first.replace)?;
                self.run_chain(ctx, chain, ids).await?;
            }

            if processor.pagination().is_none() {
                return Ok(());
            }
            let next = match processor.pagination().next_page(ctx, &tr) {
                Ok(NextPage::Continue(next)) => next,
                Ok(NextPage::Done) => return Ok(()),
                Err(e) => {
                    warn!(page, error = %e, "failed to compute next page");
                    return Ok(());
                }
            };
            let req = match step.request.http_request(next.clone()) {
                Ok(req) => req,
                Err(e) => {
                    warn!(page, error = %e, "failed to build next page request");
                    return Ok(());
                }
            };
            resp = match step.client.execute(&req, self.cancel).await {
                Ok(resp) => resp,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    error!(url = %req.url, error = %e, "failed to fetch next page");
                    return Ok(());
                }
            };
            tr = next;
            page += 1;
        }
    }

    async fn run_chain(
        &mut self,
        ctx: &mut TransformContext,
        chain: &[Link],
        mut ids: Vec<String>,
    ) -> Result<()> {
        for (i, link) in chain.iter().enumerate() {
            if ids.is_empty() {
                debug!(step = i, "no ids collected, chain stops");
                return Ok(());
            }
            let last = i + 1 == chain.len();
            let mut child = ctx.child();

            let base = match &link.replace_with {
                Some(replace_with) => {
                    let value = replace_with.resolve(&child)?;
                    link.step
                        .request
                        .raw_url()
                        .replacen(replace_with.pattern(), &value, 1)
                }
                None => link.step.request.raw_url().to_string(),
            };

            let mut responses = Vec::with_capacity(ids.len());
            for id in &ids {
                let url = generate_url(&link.replace, &base, id)?;
                let tr = link.step.request.transformable(&child, &url)?;
                let req = link.step.request.http_request(tr)?;
                let resp = link
                    .step
                    .client
                    .execute(&req, self.cancel)
                    .await
                    .map_err(|e| match e {
                        Error::Cancelled => e,
                        other => Error::Other(format!(
                            "failed to collect tail response {}: {other}",
                            i + 1
                        )),
                    })?;
                debug!(step = i + 1, kind = ?link.kind, url = %req.url, "chain request finished");
                responses.push(resp);
            }

            if let Some(next) = chain.get(i + 1) {
                let mut next_ids = Vec::new();
                for resp in &responses {
                    match link.step.response.decode(resp) {
                        Ok(body) => next_ids.extend(extract_ids(&body, &next.replace)?),
                        Err(e) => {
                            error!(step = i + 1, url = %resp.url, error = %e, "failed to decode response, no ids collected");
                        }
                    }
                }
                ids = next_ids;
            }

            for resp in &responses {
                let started = Instant::now();
                let outcome = self
                    .process_page(&mut child, &link.step.response, resp, 0, last)
                    .await?;
                self.record_page(started);
                if matches!(outcome, PageOutcome::Stop) {
                    break;
                }
            }
            ctx.adopt_events(&child);
        }
        Ok(())
    }

    /// Decode one response and hand its events to the publisher.
    ///
    /// Decode, transform and split failures stop the response list but not
    /// the interval.
    async fn process_page(
        &mut self,
        ctx: &mut TransformContext,
        processor: &ResponseProcessor,
        resp: &HttpResponse,
        page: u64,
        publish: bool,
    ) -> Result<PageOutcome> {
        let body = match processor.decode(resp) {
            Ok(body) => body,
            Err(e) => {
                error!(page, url = %resp.url, error = %e, "failed to decode response");
                return Ok(PageOutcome::Stop);
            }
        };

        if page == 0 && processor.save_first_response() {
            ctx.update_first_response(ResponseProcessor::snapshot(resp, body.clone(), page));
        }

        let documents = ResponseProcessor::documents(&body);
        if documents.is_empty() {
            debug!(page, "response has no events");
            return Ok(PageOutcome::Stop);
        }
        ctx.update_last_response(ResponseProcessor::snapshot(resp, body.clone(), page));

        let (events, outcome) = processor.events(ctx, documents);
        for event in events {
            self.emit(ctx, event, publish).await?;
        }
        match outcome {
            Ok(()) => Ok(PageOutcome::Processed(body)),
            Err(e) => {
                error!(page, error = %e, "error processing response");
                Ok(PageOutcome::Stop)
            }
        }
    }

    async fn emit(&mut self, ctx: &mut TransformContext, body: JsonValue, publish: bool) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if publish {
            let published = match Event::new(&body, ctx.cursor()) {
                Ok(event) => self.publisher.publish(event).await,
                Err(e) => Err(e),
            };
            if let Err(e) = published {
                error!(error = %e, "error publishing event");
                self.metrics.event_publish_failed();
                return Ok(());
            }
            self.metrics.event_published();
            self.stats.add_event();
        }
        ctx.record_event(&body);
        self.cursor.update(ctx);
        Ok(())
    }

    fn record_page(&mut self, started: Instant) {
        self.stats.add_page();
        self.metrics.page_executed(started.elapsed());
    }
}
