//! Built-in logistics tools
//!
//! These back the function calls a dispatch agent makes mid-call: truck
//! position lookup, load details, and driver status logging. Backends here
//! are simulated; a deployment swaps them for fleet-telematics clients
//! behind the same trait.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::registry::{DispatchTool, ToolError, ToolRegistry};

/// Truck position lookup
pub struct LookupLocation {
    positions: RwLock<HashMap<String, (f64, f64)>>,
}

impl LookupLocation {
    pub fn new() -> Self {
        // Seed a few plausible positions so development calls get answers.
        let mut positions = HashMap::new();
        positions.insert("42".to_string(), (39.7392, -104.9903));
        positions.insert("7".to_string(), (41.8781, -87.6298));
        positions.insert("108".to_string(), (32.7767, -96.7970));
        Self {
            positions: RwLock::new(positions),
        }
    }

    pub fn set_position(&self, truck_id: &str, lat: f64, lon: f64) {
        self.positions
            .write()
            .insert(truck_id.to_string(), (lat, lon));
    }
}

impl Default for LookupLocation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DispatchTool for LookupLocation {
    fn name(&self) -> &str {
        "lookup_location"
    }

    fn description(&self) -> &str {
        "Look up the current GPS position of a truck by its fleet number"
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "truck_id": {
                    "type": "string",
                    "description": "Fleet number of the truck"
                }
            },
            "required": ["truck_id"]
        })
    }

    async fn execute(&self, arguments: &serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let truck_id = arguments
            .get("truck_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments {
                tool: "lookup_location".to_string(),
                message: "truck_id is required".to_string(),
            })?;

        match self.positions.read().get(truck_id) {
            Some((lat, lon)) => Ok(serde_json::json!({
                "truck_id": truck_id,
                "lat": lat,
                "lon": lon,
            })),
            None => Ok(serde_json::json!({
                "truck_id": truck_id,
                "found": false,
            })),
        }
    }
}

/// Load detail lookup
pub struct LookupLoadDetails;

#[async_trait]
impl DispatchTool for LookupLoadDetails {
    fn name(&self) -> &str {
        "get_load_details"
    }

    fn description(&self) -> &str {
        "Fetch pickup, delivery, and commodity details for a load number"
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "load_id": {
                    "type": "string",
                    "description": "Load reference number"
                }
            },
            "required": ["load_id"]
        })
    }

    async fn execute(&self, arguments: &serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let load_id = arguments
            .get("load_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments {
                tool: "get_load_details".to_string(),
                message: "load_id is required".to_string(),
            })?;

        Ok(serde_json::json!({
            "load_id": load_id,
            "pickup": "Denver, CO",
            "delivery": "Chicago, IL",
            "commodity": "dry goods",
            "appointment": "08:00",
        }))
    }
}

/// Driver status logging
///
/// Records statuses reported mid-call so dispatch boards update without
/// waiting for post-call analysis.
pub struct LogDriverStatus {
    log: RwLock<Vec<(String, String)>>,
}

impl LogDriverStatus {
    pub fn new() -> Self {
        Self {
            log: RwLock::new(Vec::new()),
        }
    }

    pub fn entries(&self) -> Vec<(String, String)> {
        self.log.read().clone()
    }
}

impl Default for LogDriverStatus {
    fn default() -> Self {
        Self::new()
    }
}

const VALID_STATUSES: &[&str] = &["driving", "delayed", "arrived", "unloading"];

#[async_trait]
impl DispatchTool for LogDriverStatus {
    fn name(&self) -> &str {
        "log_driver_status"
    }

    fn description(&self) -> &str {
        "Record the driver's reported status (driving, delayed, arrived, unloading)"
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "driver_id": {
                    "type": "string",
                    "description": "Driver identifier"
                },
                "status": {
                    "type": "string",
                    "enum": VALID_STATUSES,
                }
            },
            "required": ["driver_id", "status"]
        })
    }

    async fn execute(&self, arguments: &serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let driver_id = arguments
            .get("driver_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments {
                tool: "log_driver_status".to_string(),
                message: "driver_id is required".to_string(),
            })?;

        let status = arguments
            .get("status")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments {
                tool: "log_driver_status".to_string(),
                message: "status is required".to_string(),
            })?;

        if !VALID_STATUSES.contains(&status) {
            return Err(ToolError::InvalidArguments {
                tool: "log_driver_status".to_string(),
                message: format!("unknown status '{}'", status),
            });
        }

        self.log
            .write()
            .push((driver_id.to_string(), status.to_string()));

        Ok(serde_json::json!({ "logged": true }))
    }
}

/// Registry with the built-in dispatch tools
pub fn create_default_registry(execution_timeout: Duration) -> ToolRegistry {
    let mut registry = ToolRegistry::new(execution_timeout);
    registry.register(Arc::new(LookupLocation::new()));
    registry.register(Arc::new(LookupLoadDetails));
    registry.register(Arc::new(LogDriverStatus::new()));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_location_known_truck() {
        let tool = LookupLocation::new();
        let result = tool
            .execute(&serde_json::json!({ "truck_id": "42" }))
            .await
            .unwrap();
        assert!(result["lat"].is_f64());
        assert!(result["lon"].is_f64());
    }

    #[tokio::test]
    async fn test_lookup_location_unknown_truck() {
        let tool = LookupLocation::new();
        let result = tool
            .execute(&serde_json::json!({ "truck_id": "999" }))
            .await
            .unwrap();
        assert_eq!(result["found"], false);
    }

    #[tokio::test]
    async fn test_lookup_location_missing_argument() {
        let tool = LookupLocation::new();
        let err = tool.execute(&serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn test_log_driver_status_validates_enum() {
        let tool = LogDriverStatus::new();
        let err = tool
            .execute(&serde_json::json!({ "driver_id": "d1", "status": "napping" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));

        tool.execute(&serde_json::json!({ "driver_id": "d1", "status": "delayed" }))
            .await
            .unwrap();
        assert_eq!(tool.entries(), vec![("d1".to_string(), "delayed".to_string())]);
    }

    #[tokio::test]
    async fn test_default_registry_has_all_tools() {
        let registry = create_default_registry(Duration::from_secs(5));
        assert!(registry.has("lookup_location"));
        assert!(registry.has("get_load_details"));
        assert!(registry.has("log_driver_status"));
        assert_eq!(registry.len(), 3);
    }
}
