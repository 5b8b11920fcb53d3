use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use telemetry_client::query::{DeviceListQuery, WindowedQuery};
use time::OffsetDateTime;

use super::{FluxRow, Point, RowStream, StoreError, TimeSeriesStore};

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<String, Vec<Point>>,
    org_missing: bool,
    stale_existence_checks: bool,
    fail_query_after: Option<usize>,
    create_calls: usize,
    write_calls: usize,
    query_calls: usize,
}

/// Process-local store with InfluxDB's windowing semantics.
///
/// Windows are aligned to the Unix epoch, clipped to the query range, and
/// stamped with their stop time. Writing the same series, timestamp and
/// field twice keeps the last value.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_bucket(self, name: &str) -> Self {
        self.lock().buckets.entry(name.to_string()).or_default();
        self
    }

    /// Make `create_bucket` fail with `OrganizationNotFound`.
    pub fn without_organization(self) -> Self {
        self.lock().org_missing = true;
        self
    }

    /// Make `bucket_exists` always answer `false`, as a writer that lost a
    /// creation race would observe.
    pub fn with_stale_existence_checks(self) -> Self {
        self.lock().stale_existence_checks = true;
        self
    }

    /// Make query result streams fail after yielding `rows` rows.
    pub fn fail_queries_after(self, rows: usize) -> Self {
        self.lock().fail_query_after = Some(rows);
        self
    }

    pub fn points(&self, bucket: &str) -> Vec<Point> {
        self.lock().buckets.get(bucket).cloned().unwrap_or_default()
    }

    pub fn create_calls(&self) -> usize {
        self.lock().create_calls
    }

    pub fn write_calls(&self) -> usize {
        self.lock().write_calls
    }

    pub fn query_calls(&self) -> usize {
        self.lock().query_calls
    }
}

fn window_start(ts: i128, every: i128) -> i128 {
    ts - ts.rem_euclid(every)
}

fn to_time(nanos: i128) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::from_unix_timestamp_nanos(nanos).map_err(|e| StoreError::Decode(e.to_string()))
}

/// Mean per window for every `(device, field)` series with data in range.
fn evaluate(points: &[Point], q: &WindowedQuery) -> Result<Vec<FluxRow>, StoreError> {
    let start = q.start.unix_timestamp_nanos();
    let stop = q.stop.unix_timestamp_nanos();
    let every = q.every.as_nanos() as i128;
    let wanted: BTreeSet<&str> = q.fields.iter().map(String::as_str).collect();

    let mut series: BTreeMap<(String, String), BTreeMap<i128, (f64, u32)>> = BTreeMap::new();
    for p in points {
        let ts = p.timestamp.unix_timestamp_nanos();
        if p.measurement != q.measurement || ts < start || ts >= stop {
            continue;
        }
        let device_id = p.tags.get("device_id").map(String::as_str).unwrap_or("");
        if device_id != q.device_id {
            continue;
        }
        for (field, value) in p.fields.iter().filter(|(f, _)| wanted.contains(f.as_str())) {
            let acc = series
                .entry((device_id.to_string(), field.clone()))
                .or_default()
                .entry(window_start(ts, every))
                .or_insert((0.0, 0));
            acc.0 += value;
            acc.1 += 1;
        }
    }

    let mut rows = Vec::new();
    for ((device_id, field), windows) in series {
        let mut ws = window_start(start, every);
        while ws < stop {
            let stamp = (ws + every).min(stop);
            let value = windows.get(&ws).map(|(sum, n)| sum / f64::from(*n));
            if value.is_some() || q.create_empty {
                rows.push(FluxRow {
                    time: to_time(stamp)?,
                    device_id: device_id.clone(),
                    field: field.clone(),
                    value,
                });
            }
            ws += every;
        }
    }
    Ok(rows)
}

#[async_trait::async_trait]
impl TimeSeriesStore for InMemoryStore {
    async fn health(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn bucket_exists(&self, name: &str) -> Result<bool, StoreError> {
        let state = self.lock();
        Ok(!state.stale_existence_checks && state.buckets.contains_key(name))
    }

    async fn create_bucket(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.create_calls += 1;
        if state.org_missing {
            return Err(StoreError::OrganizationNotFound("in-memory".to_string()));
        }
        if state.buckets.contains_key(name) {
            return Err(StoreError::BucketAlreadyExists(name.to_string()));
        }
        state.buckets.insert(name.to_string(), Vec::new());
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock().buckets.keys().cloned().collect())
    }

    async fn write_point(&self, bucket: &str, point: &Point) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.write_calls += 1;
        let points = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::BucketNotFound(bucket.to_string()))?;

        let existing = points.iter_mut().find(|p| {
            p.measurement == point.measurement && p.tags == point.tags && p.timestamp == point.timestamp
        });
        match existing {
            Some(p) => p.fields.extend(point.fields.iter().map(|(k, v)| (k.clone(), *v))),
            None => points.push(point.clone()),
        }
        Ok(())
    }

    async fn query(&self, query: &WindowedQuery) -> Result<RowStream, StoreError> {
        let (rows, fail_after) = {
            let mut state = self.lock();
            state.query_calls += 1;
            let points = state
                .buckets
                .get(&query.bucket)
                .ok_or_else(|| StoreError::BucketNotFound(query.bucket.clone()))?;
            (evaluate(points, query)?, state.fail_query_after)
        };

        let mut items: Vec<Result<FluxRow, StoreError>> = rows.into_iter().map(Ok).collect();
        if let Some(n) = fail_after {
            items.truncate(n);
            items.push(Err(StoreError::QueryProcessing("injected failure".to_string())));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }

    async fn list_devices(&self, query: &DeviceListQuery) -> Result<Vec<String>, StoreError> {
        let state = self.lock();
        let points = state
            .buckets
            .get(&query.bucket)
            .ok_or_else(|| StoreError::BucketNotFound(query.bucket.clone()))?;

        let devices: BTreeSet<&str> = points
            .iter()
            .filter(|p| p.measurement == query.measurement)
            .filter_map(|p| p.tags.get("device_id"))
            .map(String::as_str)
            .collect();
        Ok(devices.into_iter().map(str::to_string).collect())
    }
}
