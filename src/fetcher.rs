use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, info, warn};

use crate::{
    config::MonitoringConfig,
    metrics::{self, QueryTimer},
    models::{MetricFilter, QueryWindow, RawSeries},
    proto::{self, ListTimeSeriesRequest, MetricServiceClient, TimeInterval, TimeSeriesView},
    ReportError, Result,
};

/// One bounded, filtered query as handed to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesQuery {
    /// Resource name, `projects/<id>`.
    pub name: String,
    pub filter: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub view: TimeSeriesView,
}

/// Source of time series. Implementations return the full result set.
#[async_trait]
pub trait MetricBackend: Send + Sync {
    async fn list_time_series(&self, query: TimeSeriesQuery) -> Result<Vec<RawSeries>>;
}

pub struct GrpcBackend {
    client: MetricServiceClient<Channel>,
    auth_header: Option<MetadataValue<Ascii>>,
}

impl GrpcBackend {
    /// Builds a lazily connecting client; no network traffic until the first query.
    pub fn connect(config: &MonitoringConfig) -> Result<Self> {
        let mut endpoint = Endpoint::from_shared(config.endpoint.clone()).map_err(|e| {
            ReportError::Configuration(format!("invalid endpoint {}: {}", config.endpoint, e))
        })?;
        if config.endpoint.starts_with("https://") {
            endpoint = endpoint.tls_config(ClientTlsConfig::new())?;
        }

        debug!(endpoint = %config.endpoint, "Monitoring backend channel configured");
        let channel = endpoint.connect_lazy();

        let auth_header: Option<MetadataValue<Ascii>> = match &config.access_token {
            Some(token) => Some(format!("Bearer {}", token).parse().map_err(|_| {
                ReportError::Configuration("access token is not a valid header value".to_string())
            })?),
            None => None,
        };

        Ok(Self {
            client: MetricServiceClient::new(channel),
            auth_header,
        })
    }
}

#[async_trait]
impl MetricBackend for GrpcBackend {
    async fn list_time_series(&self, query: TimeSeriesQuery) -> Result<Vec<RawSeries>> {
        let mut client = self.client.clone();
        let mut series = Vec::new();
        let mut page_token = String::new();

        // The backend streams results in pages; drain them all before returning.
        loop {
            let mut request = tonic::Request::new(list_request(&query, &page_token));
            if let Some(header) = &self.auth_header {
                request.metadata_mut().insert("authorization", header.clone());
            }

            let response = client.list_time_series(request).await?.into_inner();
            debug!(
                series = response.time_series.len(),
                more = !response.next_page_token.is_empty(),
                "Received time series page"
            );
            series.extend(response.time_series.into_iter().map(RawSeries::from));

            if response.next_page_token.is_empty() {
                break;
            }
            page_token = response.next_page_token;
        }

        Ok(series)
    }
}

/// Wire request for one page of `query`.
pub fn list_request(query: &TimeSeriesQuery, page_token: &str) -> ListTimeSeriesRequest {
    ListTimeSeriesRequest {
        name: query.name.clone(),
        filter: query.filter.clone(),
        interval: Some(TimeInterval {
            start_time: Some(proto::to_timestamp(query.start)),
            end_time: Some(proto::to_timestamp(query.end)),
        }),
        view: query.view as i32,
        page_size: 0,
        page_token: page_token.to_string(),
    }
}

/// Issues bounded queries for one project against a backend.
pub struct Fetcher<B> {
    config: MonitoringConfig,
    backend: B,
}

impl<B: MetricBackend> Fetcher<B> {
    pub fn new(config: MonitoringConfig, backend: B) -> Self {
        Self { config, backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn query_for(&self, filter: &MetricFilter, window: &QueryWindow) -> Result<TimeSeriesQuery> {
        if self.config.project_id.trim().is_empty() {
            return Err(ReportError::Configuration(
                "project identifier must not be empty".to_string(),
            ));
        }
        if filter.as_str().trim().is_empty() {
            return Err(ReportError::Configuration(
                "metric filter must not be empty".to_string(),
            ));
        }

        Ok(TimeSeriesQuery {
            name: self.config.project_path(),
            filter: filter.as_str().to_string(),
            start: window.start(),
            end: window.end(),
            view: TimeSeriesView::Full,
        })
    }

    /// Runs exactly one query and returns the backend's series in order.
    pub async fn fetch(&self, filter: &MetricFilter, window: &QueryWindow) -> Result<Vec<RawSeries>> {
        let query = self.query_for(filter, window)?;
        info!(
            project = %self.config.project_id,
            filter = %filter,
            start = %window.start(),
            end = %window.end(),
            "Fetching time series"
        );

        let timer = QueryTimer::new();
        let result = self.backend.list_time_series(query).await;
        drop(timer);

        match result {
            Ok(series) => {
                metrics::record_series(series.len());
                info!(series = series.len(), filter = %filter, "Fetched time series");
                Ok(series)
            }
            Err(e) => {
                metrics::record_query_failure();
                warn!(error = %e, filter = %filter, "Time series query failed");
                Err(e)
            }
        }
    }

    /// Fetches independent filters concurrently, concatenated in filter order.
    pub async fn fetch_all(
        &self,
        filters: &[MetricFilter],
        window: &QueryWindow,
    ) -> Result<Vec<RawSeries>> {
        let batches = try_join_all(filters.iter().map(|filter| self.fetch(filter, window))).await?;
        Ok(batches.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PointValue, RawPoint};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBackend {
        queries: Mutex<Vec<TimeSeriesQuery>>,
        responses: HashMap<String, Vec<RawSeries>>,
        fail_with: Option<tonic::Code>,
    }

    #[async_trait]
    impl MetricBackend for RecordingBackend {
        async fn list_time_series(&self, query: TimeSeriesQuery) -> Result<Vec<RawSeries>> {
            self.queries.lock().unwrap().push(query.clone());
            if let Some(code) = self.fail_with {
                return Err(tonic::Status::new(code, "permission denied on project").into());
            }
            Ok(self.responses.get(&query.filter).cloned().unwrap_or_default())
        }
    }

    fn series(name: &str) -> RawSeries {
        RawSeries {
            labels: HashMap::from([("instance_name".to_string(), name.to_string())]),
            points: vec![RawPoint {
                end_time: Utc.timestamp_opt(60, 0).unwrap(),
                value: Some(PointValue::Double(1.0)),
            }],
            ..Default::default()
        }
    }

    fn window() -> QueryWindow {
        QueryWindow::new(
            Utc.timestamp_opt(1_000, 0).unwrap(),
            Utc.timestamp_opt(4_600, 0).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn issues_one_full_view_query() {
        let backend = RecordingBackend {
            responses: HashMap::from([("F".to_string(), vec![series("b"), series("a")])]),
            ..Default::default()
        };
        let fetcher = Fetcher::new(MonitoringConfig::new("proj1").unwrap(), backend);

        let result = fetcher
            .fetch(&MetricFilter::new("F").unwrap(), &window())
            .await
            .unwrap();

        let queries = fetcher.backend.queries.lock().unwrap();
        assert_eq!(
            *queries,
            vec![TimeSeriesQuery {
                name: "projects/proj1".into(),
                filter: "F".into(),
                start: window().start(),
                end: window().end(),
                view: TimeSeriesView::Full,
            }]
        );
        assert_eq!(result, vec![series("b"), series("a")]);
    }

    #[test]
    fn wire_request_carries_every_query_field() {
        let fetcher = Fetcher::new(
            MonitoringConfig::new("proj1").unwrap(),
            RecordingBackend::default(),
        );
        let query = fetcher
            .query_for(&MetricFilter::new("F").unwrap(), &window())
            .unwrap();

        let request = list_request(&query, "page-2");

        assert_eq!(request.name, "projects/proj1");
        assert_eq!(request.filter, "F");
        let interval = request.interval.unwrap();
        assert_eq!(interval.start_time.unwrap().seconds, 1_000);
        assert_eq!(interval.end_time.unwrap().seconds, 4_600);
        assert_eq!(request.view, TimeSeriesView::Full as i32);
        assert_eq!(request.page_token, "page-2");
        assert_eq!(request.page_size, 0);
    }

    #[tokio::test]
    async fn lazy_channel_does_not_dial() {
        let mut config = MonitoringConfig::new("proj1").unwrap();
        config.endpoint = "http://127.0.0.1:1".into();
        assert!(GrpcBackend::connect(&config).is_ok());
    }

    #[tokio::test]
    async fn backend_errors_surface_unmodified() {
        let backend = RecordingBackend {
            fail_with: Some(tonic::Code::PermissionDenied),
            ..Default::default()
        };
        let fetcher = Fetcher::new(MonitoringConfig::new("proj1").unwrap(), backend);

        let err = fetcher
            .fetch(&MetricFilter::new("F").unwrap(), &window())
            .await
            .unwrap_err();

        match err {
            ReportError::Backend(status) => {
                assert_eq!(status.code(), tonic::Code::PermissionDenied);
                assert_eq!(status.message(), "permission denied on project");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fetcher.backend.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blank_project_fails_before_querying() {
        let config = MonitoringConfig {
            project_id: " ".into(),
            endpoint: String::new(),
            access_token: None,
        };
        let fetcher = Fetcher::new(config, RecordingBackend::default());

        let err = fetcher
            .fetch(&MetricFilter::default(), &window())
            .await
            .unwrap_err();

        assert!(matches!(err, ReportError::Configuration(_)));
        assert!(fetcher.backend.queries.lock().unwrap().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn fetch_all_keeps_filter_order() {
        let backend = RecordingBackend {
            responses: HashMap::from([
                ("F1".to_string(), vec![series("a")]),
                ("F2".to_string(), vec![series("b"), series("c")]),
            ]),
            ..Default::default()
        };
        let fetcher = Fetcher::new(MonitoringConfig::new("proj1").unwrap(), backend);
        let filters = vec![MetricFilter::new("F1").unwrap(), MetricFilter::new("F2").unwrap()];

        let result = fetcher.fetch_all(&filters, &window()).await.unwrap();

        let names: Vec<_> = result
            .iter()
            .map(|s| s.label("instance_name").unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(fetcher.backend.queries.lock().unwrap().len(), 2);
    }
}
