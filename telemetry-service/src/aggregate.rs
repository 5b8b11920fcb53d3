//! Folding of store rows into per-device, per-field series.

use std::collections::BTreeMap;

use futures::{Stream, StreamExt};
use telemetry_client::domain::{ConsumptionQueryResponse, DataPoint, SensorQueryResponse};

use crate::{
    error::ServiceError,
    store::{FluxRow, StoreError},
};

/// device_id -> field -> points in time order.
pub type Grouped = BTreeMap<String, BTreeMap<String, Vec<DataPoint>>>;

/// Drain `rows` into a [`Grouped`] map. Any error aborts the whole result;
/// rows already grouped are dropped.
pub async fn group_rows<S>(mut rows: S) -> Result<Grouped, ServiceError>
where
    S: Stream<Item = Result<FluxRow, StoreError>> + Unpin,
{
    let mut grouped = Grouped::new();

    while let Some(row) = rows.next().await {
        let row = row.map_err(|e| {
            tracing::error!(error = %e, "query result stream failed");
            ServiceError::QueryProcessing(e.to_string())
        })?;

        grouped
            .entry(row.device_id)
            .or_default()
            .entry(row.field)
            .or_default()
            .push(DataPoint {
                time: row.time,
                value: row.value,
            });
    }

    for series in grouped.values_mut().flat_map(|fields| fields.values_mut()) {
        series.sort_by_key(|p| p.time);
    }
    Ok(grouped)
}

/// One response per device found in the result.
pub async fn collect_sensor<S>(rows: S) -> Result<Vec<SensorQueryResponse>, ServiceError>
where
    S: Stream<Item = Result<FluxRow, StoreError>> + Unpin,
{
    let grouped = group_rows(rows).await?;
    Ok(grouped
        .into_iter()
        .map(|(device_id, readings)| SensorQueryResponse { device_id, readings })
        .collect())
}

/// A single response for `device_id`; the query was already restricted to
/// that device, so all series are merged under it.
pub async fn collect_consumption<S>(device_id: &str, rows: S) -> Result<ConsumptionQueryResponse, ServiceError>
where
    S: Stream<Item = Result<FluxRow, StoreError>> + Unpin,
{
    let grouped = group_rows(rows).await?;

    let mut readings = BTreeMap::new();
    for (_, fields) in grouped {
        for (field, points) in fields {
            readings.entry(field).or_insert_with(Vec::new).extend(points);
        }
    }

    Ok(ConsumptionQueryResponse {
        device_id: device_id.to_string(),
        readings,
    })
}
