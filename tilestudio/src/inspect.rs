//! Point queries against a handle's features.

use std::cmp::Ordering;

use serde_json::{Map, Value};
use tracing::debug;

use crate::backend::{BackendError, Feature, TileHandle};
use crate::coord::inspect_tolerance;
use crate::fetch::FetchError;
use crate::request::InspectRequest;

/// Queries features around a point and groups them by layer.
///
/// Features are ordered by distance from the point (missing distance counts
/// as zero) before grouping, so each layer's list is nearest first.
pub async fn inspect(handle: &TileHandle, request: InspectRequest) -> Result<Value, FetchError> {
    let tolerance = inspect_tolerance(request.zoom);
    debug!(
        id = handle.id(),
        zoom = request.zoom,
        lon = request.lon,
        lat = request.lat,
        tolerance,
        "Inspecting features"
    );

    let features = handle
        .backend()
        .query_features(request.zoom, request.lon, request.lat, tolerance)
        .await
        .map_err(|e| match e {
            BackendError::NotReady => FetchError::NotReady,
            BackendError::Failed(message) => FetchError::Render {
                message,
                errors: None,
            },
        })?;

    Ok(group_by_layer(features))
}

/// Sorts by distance and groups features into `{layer: [feature, ...]}`.
pub fn group_by_layer(mut features: Vec<Feature>) -> Value {
    features.sort_by(|a, b| {
        let ad = a.distance.unwrap_or(0.0);
        let bd = b.distance.unwrap_or(0.0);
        ad.partial_cmp(&bd).unwrap_or(Ordering::Equal)
    });

    let mut layers: Map<String, Value> = Map::new();
    for feature in features {
        let entry = layers
            .entry(feature.layer.clone())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let (Value::Array(list), Ok(value)) = (entry, serde_json::to_value(&feature)) {
            list.push(value);
        }
    }
    Value::Object(layers)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::tests::MockBackend;
    use crate::backend::SourceHandle;

    fn feature(layer: &str, distance: Option<f64>, id: u32) -> Feature {
        let mut properties = Map::new();
        properties.insert("id".into(), Value::from(id));
        Feature {
            layer: layer.to_string(),
            distance,
            properties,
        }
    }

    #[test]
    fn test_group_sorts_by_distance_within_layer() {
        let grouped = group_by_layer(vec![
            feature("roads", Some(30.0), 1),
            feature("water", Some(5.0), 2),
            feature("roads", Some(10.0), 3),
            feature("roads", None, 4),
        ]);

        let roads: Vec<u64> = grouped["roads"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["properties"]["id"].as_u64().unwrap())
            .collect();
        assert_eq!(roads, vec![4, 3, 1]);
        assert_eq!(grouped["water"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_group_empty() {
        assert_eq!(group_by_layer(Vec::new()), serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_inspect_through_handle() {
        let mut mock = MockBackend::ok(b"");
        mock.features = vec![feature("poi", Some(2.0), 9)];
        let handle = TileHandle::Source(Arc::new(SourceHandle::new("src", Arc::new(mock))));

        let value = inspect(
            &handle,
            InspectRequest {
                zoom: 3,
                lon: 10.0,
                lat: 20.0,
            },
        )
        .await
        .unwrap();
        assert_eq!(value["poi"][0]["layer"], "poi");
        assert_eq!(value["poi"][0]["distance"], 2.0);
    }
}
