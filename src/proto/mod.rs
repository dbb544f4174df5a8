//! Subset of `google.monitoring.v3` needed for `ListTimeSeries`.
//!
//! Field tags follow the published `metric_service.proto`; fields this crate
//! never reads are omitted and skipped by the decoder.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{PointValue, RawPoint, RawSeries};

pub const LIST_TIME_SERIES_PATH: &str = "/google.monitoring.v3.MetricService/ListTimeSeries";

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListTimeSeriesRequest {
    #[prost(string, tag = "10")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub filter: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "4")]
    pub interval: ::core::option::Option<TimeInterval>,
    #[prost(enumeration = "TimeSeriesView", tag = "7")]
    pub view: i32,
    #[prost(int32, tag = "8")]
    pub page_size: i32,
    #[prost(string, tag = "9")]
    pub page_token: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListTimeSeriesResponse {
    #[prost(message, repeated, tag = "1")]
    pub time_series: ::prost::alloc::vec::Vec<TimeSeries>,
    #[prost(string, tag = "2")]
    pub next_page_token: ::prost::alloc::string::String,
    #[prost(string, tag = "5")]
    pub unit: ::prost::alloc::string::String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TimeSeriesView {
    Full = 0,
    Headers = 1,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TimeInterval {
    #[prost(message, optional, tag = "2")]
    pub end_time: ::core::option::Option<::prost_types::Timestamp>,
    #[prost(message, optional, tag = "1")]
    pub start_time: ::core::option::Option<::prost_types::Timestamp>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Metric {
    #[prost(string, tag = "3")]
    pub r#type: ::prost::alloc::string::String,
    #[prost(map = "string, string", tag = "2")]
    pub labels: HashMap<::prost::alloc::string::String, ::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MonitoredResource {
    #[prost(string, tag = "1")]
    pub r#type: ::prost::alloc::string::String,
    #[prost(map = "string, string", tag = "2")]
    pub labels: HashMap<::prost::alloc::string::String, ::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TimeSeries {
    #[prost(message, optional, tag = "1")]
    pub metric: ::core::option::Option<Metric>,
    #[prost(message, optional, tag = "2")]
    pub resource: ::core::option::Option<MonitoredResource>,
    #[prost(message, repeated, tag = "5")]
    pub points: ::prost::alloc::vec::Vec<Point>,
    #[prost(string, tag = "8")]
    pub unit: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Point {
    #[prost(message, optional, tag = "1")]
    pub interval: ::core::option::Option<TimeInterval>,
    #[prost(message, optional, tag = "2")]
    pub value: ::core::option::Option<TypedValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TypedValue {
    #[prost(oneof = "typed_value::Value", tags = "1, 2, 3, 4")]
    pub value: ::core::option::Option<typed_value::Value>,
}

pub mod typed_value {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        #[prost(bool, tag = "1")]
        BoolValue(bool),
        #[prost(int64, tag = "2")]
        Int64Value(i64),
        #[prost(double, tag = "3")]
        DoubleValue(f64),
        #[prost(string, tag = "4")]
        StringValue(::prost::alloc::string::String),
    }
}

pub fn to_timestamp(at: DateTime<Utc>) -> ::prost_types::Timestamp {
    ::prost_types::Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    }
}

pub fn from_timestamp(ts: &::prost_types::Timestamp) -> Option<DateTime<Utc>> {
    let nanos = u32::try_from(ts.nanos).ok()?;
    DateTime::from_timestamp(ts.seconds, nanos)
}

/// Numeric payload of a typed value; bool and string payloads yield `None`.
pub fn point_value(value: &TypedValue) -> Option<PointValue> {
    match value.value.as_ref()? {
        typed_value::Value::DoubleValue(v) => Some(PointValue::Double(*v)),
        typed_value::Value::Int64Value(v) => Some(PointValue::Int64(*v)),
        typed_value::Value::BoolValue(_) | typed_value::Value::StringValue(_) => None,
    }
}

impl From<TimeSeries> for RawSeries {
    fn from(series: TimeSeries) -> Self {
        let (metric_type, labels) = series
            .metric
            .map(|m| (m.r#type, m.labels))
            .unwrap_or_default();
        let (resource_type, resource_labels) = series
            .resource
            .map(|r| (r.r#type, r.labels))
            .unwrap_or_default();

        // Points without a parseable end time cannot be placed on the time axis.
        let points = series
            .points
            .iter()
            .filter_map(|point| {
                let end_time = point
                    .interval
                    .as_ref()?
                    .end_time
                    .as_ref()
                    .and_then(from_timestamp)?;
                let value = point.value.as_ref().and_then(point_value);
                Some(RawPoint { end_time, value })
            })
            .collect();

        RawSeries {
            metric_type,
            resource_type,
            labels,
            resource_labels,
            points,
        }
    }
}

/// Hand-written equivalent of the tonic-generated `MetricServiceClient`.
pub mod metric_service_client {
    use tonic::codegen::*;

    use super::{ListTimeSeriesRequest, ListTimeSeriesResponse, LIST_TIME_SERIES_PATH};

    #[derive(Debug, Clone)]
    pub struct MetricServiceClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl<T> MetricServiceClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }

        pub async fn list_time_series(
            &mut self,
            request: impl tonic::IntoRequest<ListTimeSeriesRequest>,
        ) -> std::result::Result<tonic::Response<ListTimeSeriesResponse>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(LIST_TIME_SERIES_PATH);
            self.inner.unary(request.into_request(), path, codec).await
        }
    }
}

pub use self::metric_service_client::MetricServiceClient;

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    fn point(secs: i64, value: typed_value::Value) -> Point {
        Point {
            interval: Some(TimeInterval {
                end_time: Some(::prost_types::Timestamp { seconds: secs, nanos: 0 }),
                start_time: None,
            }),
            value: Some(TypedValue { value: Some(value) }),
        }
    }

    #[test]
    fn time_series_converts_to_raw_series() {
        let series = TimeSeries {
            metric: Some(Metric {
                r#type: "compute.googleapis.com/instance/cpu/utilization".into(),
                labels: HashMap::from([("instance_name".to_string(), "vm-1".to_string())]),
            }),
            resource: Some(MonitoredResource {
                r#type: "gce_instance".into(),
                labels: HashMap::from([("zone".to_string(), "us-central1-a".to_string())]),
            }),
            points: vec![
                point(20, typed_value::Value::DoubleValue(0.5)),
                point(10, typed_value::Value::Int64Value(3)),
                point(5, typed_value::Value::BoolValue(true)),
            ],
            unit: String::new(),
        };

        let raw = RawSeries::from(series);
        assert_eq!(raw.resource_type, "gce_instance");
        assert_eq!(raw.label("instance_name"), Some("vm-1"));
        assert_eq!(raw.label("zone"), Some("us-central1-a"));
        assert_eq!(raw.points.len(), 3);
        assert_eq!(raw.points[0].value, Some(PointValue::Double(0.5)));
        assert_eq!(raw.points[1].value, Some(PointValue::Int64(3)));
        assert_eq!(raw.points[2].value, None);
        assert_eq!(raw.points[1].end_time.timestamp(), 10);
    }

    #[test]
    fn zero_double_survives_the_wire() {
        let value = TypedValue {
            value: Some(typed_value::Value::DoubleValue(0.0)),
        };
        let decoded = TypedValue::decode(value.encode_to_vec().as_slice()).unwrap();
        assert_eq!(point_value(&decoded), Some(PointValue::Double(0.0)));
    }

    #[test]
    fn request_defaults_to_full_view() {
        let request = ListTimeSeriesRequest::default();
        assert_eq!(request.view(), TimeSeriesView::Full);
    }

    #[test]
    fn negative_nanos_are_rejected() {
        let ts = ::prost_types::Timestamp { seconds: 1, nanos: -1 };
        assert!(from_timestamp(&ts).is_none());
    }
}
