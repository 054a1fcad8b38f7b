//! Output composition

use crate::error::{Result, ServiceError};
use crate::graph::SERVICE_NODE;
use miniflux_cloud::{ResourceKind, ServiceState, outputs};
use serde::{Deserialize, Serialize};

/// Output of the composite service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceResult {
    /// Network address of the application (`host:port`)
    pub endpoint: String,
}

impl ServiceResult {
    /// HTTP URL for the endpoint
    pub fn url(&self) -> String {
        format!("http://{}", self.endpoint)
    }
}

/// Derive the service output from state. Pure; safe to call repeatedly.
pub fn compose(state: &ServiceState) -> Result<ServiceResult> {
    let Some((node, record)) = state.by_kind(ResourceKind::ServiceCompute).next() else {
        return Err(ServiceError::NotReady {
            node: SERVICE_NODE.to_string(),
            status: "missing".to_string(),
        });
    };

    if !record.is_ready() {
        return Err(ServiceError::NotReady {
            node: node.clone(),
            status: record.status.to_string(),
        });
    }

    let endpoint = record
        .output(outputs::ADDRESS)
        .ok_or_else(|| ServiceError::MissingOutput {
            node: node.clone(),
            output: outputs::ADDRESS.to_string(),
        })?;

    Ok(ServiceResult {
        endpoint: endpoint.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use miniflux_cloud::{ResourceState, ResourceStatus};

    fn state_with(record: ResourceState) -> ServiceState {
        let mut state = ServiceState::new("feeds");
        state.set_resource("service", record);
        state
    }

    #[test]
    fn test_compose_ready() {
        let state = state_with(
            ResourceState::new(ResourceKind::ServiceCompute)
                .with_id("svc-1")
                .with_status(ResourceStatus::Ready)
                .with_output(outputs::ADDRESS, "10.0.0.5:8080"),
        );

        let result = compose(&state).unwrap();
        assert_eq!(
            result,
            ServiceResult {
                endpoint: "10.0.0.5:8080".to_string()
            }
        );
        assert_eq!(result.url(), "http://10.0.0.5:8080");
        assert_eq!(compose(&state).unwrap(), result);
    }

    #[test]
    fn test_compose_pending() {
        let state = state_with(ResourceState::new(ResourceKind::ServiceCompute));

        let err = compose(&state).unwrap_err();
        match err {
            ServiceError::NotReady { node, status } => {
                assert_eq!(node, "service");
                assert_eq!(status, "pending");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_compose_without_service_record() {
        let state = ServiceState::new("feeds");
        assert!(matches!(
            compose(&state).unwrap_err(),
            ServiceError::NotReady { .. }
        ));
    }

    #[test]
    fn test_compose_missing_address() {
        let state = state_with(
            ResourceState::new(ResourceKind::ServiceCompute)
                .with_id("svc-1")
                .with_status(ResourceStatus::Ready),
        );
        assert!(matches!(
            compose(&state).unwrap_err(),
            ServiceError::MissingOutput { .. }
        ));
    }
}
